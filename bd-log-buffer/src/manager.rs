// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./manager_test.rs"]
mod manager_test;

use crate::buffer::CategoryBuffer;
use crate::config::{BufferingConfig, ConfigListener, ConfigWatch, Subscription};
use crate::sink::BufferSink;
use crate::stats::{BufferStats, BufferStatsSnapshot};
use bd_log_primitives::LogEntry;
use bd_time::TimeProvider;
use dashmap::DashMap;
use std::sync::{Arc, Weak};

//
// ManagerState
//

struct ManagerState {
  buffers: DashMap<String, Arc<CategoryBuffer>, ahash::RandomState>,
  config: Arc<ConfigWatch>,
  time_provider: Arc<dyn TimeProvider>,
  stats: Arc<BufferStats>,
}

impl ManagerState {
  // Copies out the current buffers so that no map lock is held while calling into them.
  fn buffers(&self) -> Vec<Arc<CategoryBuffer>> {
    self
      .buffers
      .iter()
      .map(|entry| entry.value().clone())
      .collect()
  }
}

impl ConfigListener for ManagerState {
  fn on_config_changed(&self, config: &Arc<BufferingConfig>) {
    let buffers = self.buffers();
    log::debug!(
      "applying buffering configuration to {} category buffers",
      buffers.len()
    );

    for buffer in buffers {
      buffer.on_configuration_changed(config);
    }
  }
}

//
// BufferManager
//

// Owns one buffer per log category, created the first time a record for that category is offered,
// and keeps them in sync with the live configuration. Meant to be created once by whatever wires
// up the logging pipeline and shared from there.
pub struct BufferManager {
  state: Arc<ManagerState>,

  // Keeps the manager registered for configuration updates until it is dropped.
  _subscription: Subscription,
}

impl BufferManager {
  #[must_use]
  pub fn new(config: Arc<ConfigWatch>, time_provider: Arc<dyn TimeProvider>) -> Self {
    let state = Arc::new(ManagerState {
      buffers: DashMap::with_hasher(ahash::RandomState::new()),
      config: config.clone(),
      time_provider,
      stats: Arc::new(BufferStats::default()),
    });

    let listener: Weak<ManagerState> = Arc::downgrade(&state);
    let subscription = config.subscribe(listener);

    Self {
      state,
      _subscription: subscription,
    }
  }

  // Offers a record to the buffer of its category. Returns true if the record was buffered and
  // must not be emitted by the caller. The sink is only used if this is the first record seen for
  // the category; it receives that category's records on every later flush.
  pub fn try_enqueue(&self, sink: &Arc<dyn BufferSink>, entry: &LogEntry<'_>) -> bool {
    self.buffer_for(entry.category, sink).try_enqueue(entry)
  }

  fn buffer_for(&self, category: &str, sink: &Arc<dyn BufferSink>) -> Arc<CategoryBuffer> {
    if let Some(buffer) = self.state.buffers.get(category) {
      return buffer.clone();
    }

    let config = self.state.config.current();
    let buffer = self
      .state
      .buffers
      .entry(category.to_string())
      .or_insert_with(|| {
        Arc::new(CategoryBuffer::new(
          category,
          sink.clone(),
          &config,
          self.state.time_provider.clone(),
          self.state.stats.clone(),
        ))
      })
      .clone();

    // A configuration update may have been published after `config` was read but before the
    // buffer became visible to the update listener. Catch up until the applied configuration is
    // the live one, as the listener may apply a newer one concurrently.
    let mut applied = config;
    loop {
      let latest = self.state.config.current();
      if Arc::ptr_eq(&applied, &latest) {
        break;
      }
      buffer.on_configuration_changed(&latest);
      applied = latest;
    }

    buffer
  }

  // Flushes every buffer. Returns the total number of records handed to sinks.
  pub fn flush(&self) -> usize {
    let flushed: usize = self
      .state
      .buffers()
      .iter()
      .map(|buffer| buffer.flush())
      .sum();

    log::debug!("flushed {flushed} buffered records");
    flushed
  }

  // Flushes a single category. Returns None if no buffer exists for it.
  pub fn flush_category(&self, category: &str) -> Option<usize> {
    let buffer = self.buffer(category)?;
    Some(buffer.flush())
  }

  #[must_use]
  pub fn buffer(&self, category: &str) -> Option<Arc<CategoryBuffer>> {
    self
      .state
      .buffers
      .get(category)
      .map(|buffer| buffer.value().clone())
  }

  #[must_use]
  pub fn categories(&self) -> Vec<String> {
    self
      .state
      .buffers
      .iter()
      .map(|entry| entry.key().clone())
      .collect()
  }

  #[must_use]
  pub fn stats(&self) -> BufferStatsSnapshot {
    self.state.stats.snapshot()
  }
}

impl Drop for BufferManager {
  fn drop(&mut self) {
    log::debug!(
      "shutting down buffer manager with {} category buffers",
      self.state.buffers.len()
    );
  }
}
