// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./buffer_test.rs"]
mod buffer_test;

use crate::config::BufferingConfig;
use crate::rule_selector::{RuleSelector, select_by_category};
use crate::serializer::{self, SerializedRecord};
use crate::sink::BufferSink;
use crate::stats::BufferStats;
use arc_swap::ArcSwap;
use bd_log_primitives::LogEntry;
use bd_time::{OffsetDateTimeExt as _, TimeProvider};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

// Marks a buffer that has never been flushed.
const NEVER_FLUSHED: i64 = i64::MIN;

//
// BufferLimits
//

#[derive(Debug, Clone, Copy)]
struct BufferLimits {
  auto_flush_duration_micros: i64,
  max_log_record_size: usize,
  max_buffer_size: usize,
}

impl From<&BufferingConfig> for BufferLimits {
  fn from(config: &BufferingConfig) -> Self {
    let micros = config.auto_flush_duration().whole_microseconds();
    Self {
      auto_flush_duration_micros: i64::try_from(micros).unwrap_or(i64::MAX),
      max_log_record_size: config.max_log_record_size(),
      max_buffer_size: config.max_buffer_size(),
    }
  }
}

//
// Queue
//

// The buffered records and their accounted size. The two are only ever changed together under
// the buffer's lock.
#[derive(Default)]
struct Queue {
  records: VecDeque<SerializedRecord>,
  size_bytes: usize,
}

impl Queue {
  // Drops the oldest records until the queue fits in `max_size`. Returns how many were dropped.
  fn evict_to(&mut self, max_size: usize) -> usize {
    let mut evicted = 0;
    while self.size_bytes > max_size {
      let Some(oldest) = self.records.pop_front() else {
        debug_assert!(false, "accounted size without records");
        self.size_bytes = 0;
        break;
      };
      self.size_bytes -= oldest.size_bytes();
      evicted += 1;
    }
    evicted
  }
}

//
// CategoryBuffer
//

// Holds buffered records for a single log category. Any number of threads may offer records
// concurrently; flushes drain everything buffered so far, oldest first.
pub struct CategoryBuffer {
  category: String,
  sink: Arc<dyn BufferSink>,
  selector: RuleSelector,
  limits: ArcSwap<BufferLimits>,
  queue: Mutex<Queue>,

  // Time of the last flush in microseconds since the epoch, or `NEVER_FLUSHED`.
  last_flush_micros: AtomicI64,

  time_provider: Arc<dyn TimeProvider>,
  stats: Arc<BufferStats>,
}

impl CategoryBuffer {
  #[must_use]
  pub fn new(
    category: impl Into<String>,
    sink: Arc<dyn BufferSink>,
    config: &BufferingConfig,
    time_provider: Arc<dyn TimeProvider>,
    stats: Arc<BufferStats>,
  ) -> Self {
    let category = category.into();
    log::debug!("creating log buffer for category {category:?}");

    Self {
      selector: RuleSelector::for_category(&config.rules, &category),
      limits: ArcSwap::from_pointee(config.into()),
      category,
      sink,
      queue: Mutex::new(Queue::default()),
      last_flush_micros: AtomicI64::new(NEVER_FLUSHED),
      time_provider,
      stats,
    }
  }

  #[must_use]
  pub fn category(&self) -> &str {
    &self.category
  }

  #[must_use]
  pub fn rule_count(&self) -> usize {
    self.selector.rule_count()
  }

  #[must_use]
  pub fn current_size_bytes(&self) -> usize {
    self.queue.lock().size_bytes
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.queue.lock().records.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.queue.lock().records.is_empty()
  }

  // Offers a record for buffering. Returns true if the record was buffered, in which case the
  // caller must not emit it. Never fails: anything that prevents buffering results in false so the
  // record is emitted normally.
  pub fn try_enqueue(&self, entry: &LogEntry<'_>) -> bool {
    let now = self.time_provider.now();
    let limits = self.limits.load();

    if self.is_suppressed(now.unix_timestamp_micros(), limits.auto_flush_duration_micros) {
      log::trace!(
        "buffering suppressed for {:?} after a recent flush",
        self.category
      );
      self.stats.record_suppressed();
      return false;
    }

    if self
      .selector
      .select(entry.level, &entry.event_id, entry.attributes)
      .is_none()
    {
      return false;
    }

    let record = match serializer::serialize(entry, now) {
      Ok(record) => record,
      Err(e) => {
        log::debug!("not buffering record for {:?}: {e}", self.category);
        self.stats.record_serialization_failure();
        return false;
      },
    };

    let record_size = record.size_bytes();
    if record_size > limits.max_log_record_size || record_size > limits.max_buffer_size {
      log::trace!(
        "record of {record_size} bytes for {:?} is too large to buffer",
        self.category
      );
      self.stats.record_rejected_oversized();
      return false;
    }

    let evicted = {
      let mut queue = self.queue.lock();
      queue.size_bytes += record_size;
      queue.records.push_back(record);
      queue.evict_to(limits.max_buffer_size)
    };

    if evicted > 0 {
      log::trace!("evicted {evicted} records from {:?}", self.category);
      self.stats.record_evicted(evicted);
    }
    self.stats.record_buffered();

    true
  }

  // Drains every buffered record and hands them to the sink. Returns the number of records
  // flushed. Buffering stays suppressed for the configured duration afterwards.
  pub fn flush(&self) -> usize {
    let records = {
      let mut queue = self.queue.lock();
      queue.size_bytes = 0;
      std::mem::take(&mut queue.records)
    };

    self.last_flush_micros.store(
      self.time_provider.now().unix_timestamp_micros(),
      Ordering::Release,
    );

    let count = records.len();
    if count == 0 {
      return 0;
    }

    log::debug!("flushing {count} buffered records for {:?}", self.category);
    self.stats.record_flushed(count);
    self.sink.log_records(records.into());

    count
  }

  // Applies a new configuration: re-resolves the rules for this category, which also discards any
  // cached rule matches, and trims the queue if the budget shrank.
  pub fn on_configuration_changed(&self, config: &BufferingConfig) {
    let limits: BufferLimits = config.into();
    self.limits.store(Arc::new(limits));
    self
      .selector
      .update_rules(select_by_category(&config.rules, &self.category));

    let evicted = self.queue.lock().evict_to(limits.max_buffer_size);
    if evicted > 0 {
      self.stats.record_evicted(evicted);
    }

    log::debug!(
      "applied buffering configuration to {:?}: {} rules",
      self.category,
      self.selector.rule_count()
    );
  }

  fn is_suppressed(&self, now_micros: i64, auto_flush_duration_micros: i64) -> bool {
    let last_flush = self.last_flush_micros.load(Ordering::Acquire);
    last_flush != NEVER_FLUSHED
      && now_micros < last_flush.saturating_add(auto_flush_duration_micros)
  }
}
