// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![deny(
  clippy::expect_used,
  clippy::panic,
  clippy::todo,
  clippy::unimplemented,
  clippy::unreachable,
  clippy::unwrap_used
)]

//! In-memory buffering of log records. Records matching a configured rule are held per category
//! in a byte-bounded queue instead of being emitted, and are handed to a sink when the buffers are
//! flushed.

pub mod buffer;
pub mod config;
pub mod manager;
pub mod rule_selector;
pub mod serializer;
pub mod sink;
pub mod stats;


pub use buffer::CategoryBuffer;
pub use config::{
  BufferingConfig,
  ConfigError,
  ConfigListener,
  ConfigWatch,
  FilterRule,
  Subscription,
};
pub use manager::BufferManager;
pub use rule_selector::RuleSelector;
pub use serializer::{SerializeError, SerializedRecord};
pub use sink::BufferSink;
pub use stats::{BufferStats, BufferStatsSnapshot};

#[cfg(test)]
#[ctor::ctor]
fn test_global_init() {
  // Errors created by tests carry a backtrace so that exception rendering can be checked. This
  // runs before any test thread exists and before the first backtrace capture.
  unsafe {
    std::env::set_var("RUST_LIB_BACKTRACE", "1");
  }

  bd_test_helpers::test_global_init();
}
