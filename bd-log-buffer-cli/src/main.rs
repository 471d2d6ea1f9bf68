// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::cli::Options;
use bd_log_buffer::{BufferManager, BufferingConfig, ConfigWatch};
use bd_log_buffer_cli::output::SharedWriter;
use bd_log_buffer_cli::replay::{ConfigReload, Replay};
use bd_time::SystemTimeProvider;
use clap::Parser;
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

mod cli;

fn main() -> anyhow::Result<()> {
  init_tracing();
  let options = Options::parse();

  let config = BufferingConfig::load(&options.config)?;
  log::info!(
    "loaded {} buffering rules from {}",
    config.rules.len(),
    options.config.display()
  );

  let watch = ConfigWatch::new(config)?;
  let time_provider = Arc::new(SystemTimeProvider);
  let manager = BufferManager::new(watch.clone(), time_provider.clone());
  let out: SharedWriter = Arc::new(Mutex::new(std::io::stdout()));

  let replay = Replay::new(
    &manager,
    time_provider.as_ref(),
    out,
    options.flush_trigger,
  )
  .with_reload(ConfigReload {
    watch,
    path: options.config,
    trigger: options.reload_trigger,
  });

  let summary = match &options.input {
    Some(path) => replay.run(BufReader::new(File::open(path)?))?,
    None => replay.run(std::io::stdin().lock())?,
  };

  let stats = manager.stats();
  log::info!(
    "replayed {} records: {} buffered, {} written directly, {} flushed, {} skipped",
    summary.records,
    summary.buffered,
    summary.emitted,
    summary.flushed,
    summary.skipped
  );
  log::info!(
    "buffer stats: {} evicted, {} oversized, {} suppressed, {} unserializable",
    stats.evicted,
    stats.rejected_oversized,
    stats.suppressed,
    stats.serialization_failures
  );

  Ok(())
}

fn init_tracing() {
  let stderr = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_ansi(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .compact();

  let filter = EnvFilter::new(std::env::var("RUST_LOG").as_deref().unwrap_or("info"));

  Registry::default().with(filter).with(stderr).init();
}
