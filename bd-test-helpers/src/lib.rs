// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use std::fmt::{Display, Formatter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const DEFAULT_FILTER_RULES: &str = "info";

// Installs the global logger for a test binary. `log` records are forwarded into the tracing
// subscriber. Meant to be called once from a ctor, but later calls are ignored.
pub fn test_global_init() {
  let stderr = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_ansi(std::env::var("BD_LOG_ANSI").is_ok())
    .with_line_number(true)
    .with_thread_ids(true)
    .compact();

  let filter = EnvFilter::new(
    std::env::var("RUST_LOG")
      .as_deref()
      .unwrap_or(DEFAULT_FILTER_RULES),
  );

  if Registry::default()
    .with(filter)
    .with(stderr)
    .try_init()
    .is_err()
  {
    log::debug!("test logger already installed");
  }
}

//
// FailingDisplay
//

// A value whose `Display` implementation always fails, for exercising stringification errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingDisplay;

impl Display for FailingDisplay {
  fn fmt(&self, _: &mut Formatter<'_>) -> std::fmt::Result {
    Err(std::fmt::Error)
  }
}
