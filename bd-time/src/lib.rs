// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt


use parking_lot::Mutex;
use std::sync::Arc;
use time::OffsetDateTime;

//
// OffsetDateTimeExt
//

// Whole-microsecond epoch timestamps, saturating at the bounds of `i64`. This is the
// representation used when a timestamp has to live inside an atomic.
pub trait OffsetDateTimeExt {
  fn unix_timestamp_micros(&self) -> i64;
}

impl OffsetDateTimeExt for OffsetDateTime {
  fn unix_timestamp_micros(&self) -> i64 {
    let micros = self.unix_timestamp_nanos() / 1_000;
    i64::try_from(micros).unwrap_or(if micros < 0 { i64::MIN } else { i64::MAX })
  }
}

//
// TimeProvider
//

// Source of wall clock time. Components that make time based decisions take one of these so that
// tests can drive the clock explicitly.
pub trait TimeProvider: Send + Sync {
  fn now(&self) -> OffsetDateTime;
}

//
// SystemTimeProvider
//

pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
  fn now(&self) -> OffsetDateTime {
    OffsetDateTime::now_utc()
  }
}

//
// TestTimeProvider
//

// A manually driven clock. Clones share the same underlying time.
#[derive(Clone)]
pub struct TestTimeProvider {
  now: Arc<Mutex<OffsetDateTime>>,
}

impl TestTimeProvider {
  #[must_use]
  pub fn new(now: OffsetDateTime) -> Self {
    Self {
      now: Arc::new(Mutex::new(now)),
    }
  }

  pub fn advance(&self, duration: time::Duration) {
    *self.now.lock() += duration;
  }

  pub fn set_time(&self, new_time: OffsetDateTime) {
    *self.now.lock() = new_time;
  }
}

impl TimeProvider for TestTimeProvider {
  fn now(&self) -> OffsetDateTime {
    *self.now.lock()
  }
}
