// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use std::sync::atomic::{AtomicU64, Ordering};

//
// BufferStats
//

// Counters describing what happened to records offered for buffering, shared by all buffers of a
// manager.
#[derive(Debug, Default)]
pub struct BufferStats {
  buffered: AtomicU64,
  evicted: AtomicU64,
  rejected_oversized: AtomicU64,
  serialization_failures: AtomicU64,
  suppressed: AtomicU64,
  flushed: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatsSnapshot {
  pub buffered: u64,
  pub evicted: u64,
  pub rejected_oversized: u64,
  pub serialization_failures: u64,
  pub suppressed: u64,
  pub flushed: u64,
}

impl BufferStats {
  pub(crate) fn record_buffered(&self) {
    self.buffered.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_evicted(&self, count: usize) {
    self.evicted.fetch_add(count as u64, Ordering::Relaxed);
  }

  pub(crate) fn record_rejected_oversized(&self) {
    self.rejected_oversized.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_serialization_failure(&self) {
    self.serialization_failures.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_suppressed(&self) {
    self.suppressed.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_flushed(&self, count: usize) {
    self.flushed.fetch_add(count as u64, Ordering::Relaxed);
  }

  #[must_use]
  pub fn snapshot(&self) -> BufferStatsSnapshot {
    BufferStatsSnapshot {
      buffered: self.buffered.load(Ordering::Relaxed),
      evicted: self.evicted.load(Ordering::Relaxed),
      rejected_oversized: self.rejected_oversized.load(Ordering::Relaxed),
      serialization_failures: self.serialization_failures.load(Ordering::Relaxed),
      suppressed: self.suppressed.load(Ordering::Relaxed),
      flushed: self.flushed.load(Ordering::Relaxed),
    }
  }
}
