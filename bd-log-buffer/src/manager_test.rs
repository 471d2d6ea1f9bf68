// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![allow(clippy::unwrap_used)]

use super::BufferManager;
use crate::config::{BufferingConfig, ConfigWatch, FilterRule};
use crate::sink::BufferSink;
use crate::test::{RecordingSink, entry};
use bd_log_primitives::{LogLevel, attributes};
use bd_time::TestTimeProvider;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use time::ext::NumericalDuration;
use time::macros::datetime;

struct Setup {
  manager: BufferManager,
  watch: Arc<ConfigWatch>,
  sink: Arc<RecordingSink>,
  time_provider: TestTimeProvider,
}

impl Setup {
  fn new(config: BufferingConfig) -> Self {
    let watch = ConfigWatch::new(config).unwrap();
    let time_provider = TestTimeProvider::new(datetime!(2024-01-01 00:00:00 UTC));
    let manager = BufferManager::new(watch.clone(), Arc::new(time_provider.clone()));

    Self {
      manager,
      watch,
      sink: Arc::new(RecordingSink::default()),
      time_provider,
    }
  }

  fn offer(&self, level: LogLevel, category: &str, message: &str) -> bool {
    let sink: Arc<dyn BufferSink> = self.sink.clone();
    self.offer_to(&sink, level, category, message)
  }

  fn offer_to(
    &self,
    sink: &Arc<dyn BufferSink>,
    level: LogLevel,
    category: &str,
    message: &str,
  ) -> bool {
    let attributes = attributes!("message" => message);
    self
      .manager
      .try_enqueue(sink, &entry(level, category, &attributes))
  }
}

fn debug_rules() -> BufferingConfig {
  BufferingConfig::with_rules(vec![FilterRule::default().with_max_level(LogLevel::Debug)])
}

#[test]
fn buffers_are_created_lazily_per_category() {
  let setup = Setup::new(debug_rules());
  assert!(setup.manager.categories().is_empty());

  assert!(setup.offer(LogLevel::Debug, "App.A", "a1"));
  assert!(setup.offer(LogLevel::Debug, "App.A", "a2"));
  assert!(setup.offer(LogLevel::Debug, "App.B", "b1"));

  let mut categories = setup.manager.categories();
  categories.sort();
  assert_eq!(vec!["App.A", "App.B"], categories);
  assert_eq!(2, setup.manager.buffer("App.A").unwrap().len());
  assert_eq!(1, setup.manager.buffer("App.B").unwrap().len());
  assert!(setup.manager.buffer("App.C").is_none());
}

#[test]
fn records_that_are_not_buffered_still_create_the_buffer() {
  let setup = Setup::new(debug_rules());

  assert!(!setup.offer(LogLevel::Warning, "App.A", "w1"));
  assert_eq!(vec!["App.A"], setup.manager.categories());
  assert!(setup.manager.buffer("App.A").unwrap().is_empty());
}

#[test]
fn first_sink_for_a_category_is_kept() {
  let setup = Setup::new(debug_rules());
  let other = Arc::new(RecordingSink::default());
  let other_sink: Arc<dyn BufferSink> = other.clone();

  assert!(setup.offer(LogLevel::Debug, "App.A", "a1"));
  assert!(setup.offer_to(&other_sink, LogLevel::Debug, "App.A", "a2"));

  assert_eq!(2, setup.manager.flush());
  assert_eq!(vec!["a1", "a2"], setup.sink.take_messages());
  assert!(other.batches().is_empty());
}

#[test]
fn flush_drains_every_category() {
  let setup = Setup::new(debug_rules());

  assert!(setup.offer(LogLevel::Debug, "App.A", "a1"));
  assert!(setup.offer(LogLevel::Debug, "App.B", "b1"));
  assert!(setup.offer(LogLevel::Trace, "App.B", "b2"));

  assert_eq!(3, setup.manager.flush());
  assert_eq!(2, setup.sink.batches().len());

  let mut messages = setup.sink.take_messages();
  messages.sort();
  assert_eq!(vec!["a1", "b1", "b2"], messages);

  assert_eq!(0, setup.manager.flush());
}

#[test]
fn flush_category_only_touches_that_category() {
  let setup = Setup::new(BufferingConfig {
    auto_flush_duration_ms: 10_000,
    ..debug_rules()
  });

  assert!(setup.offer(LogLevel::Debug, "App.A", "a1"));
  assert!(setup.offer(LogLevel::Debug, "App.B", "b1"));

  assert_eq!(Some(1), setup.manager.flush_category("App.A"));
  assert_eq!(None, setup.manager.flush_category("App.C"));
  assert_eq!(vec!["a1"], setup.sink.take_messages());

  // Only the flushed category is suppressed.
  setup.time_provider.advance(1.seconds());
  assert!(!setup.offer(LogLevel::Debug, "App.A", "a2"));
  assert!(setup.offer(LogLevel::Debug, "App.B", "b2"));
}

#[test]
fn stats_are_shared_across_categories() {
  let setup = Setup::new(debug_rules());

  assert!(setup.offer(LogLevel::Debug, "App.A", "a1"));
  assert!(setup.offer(LogLevel::Debug, "App.B", "b1"));
  setup.manager.flush();

  let stats = setup.manager.stats();
  assert_eq!(2, stats.buffered);
  assert_eq!(2, stats.flushed);
}

#[test]
fn configuration_update_reaches_existing_buffers() {
  let setup = Setup::new(debug_rules());
  assert!(setup.offer(LogLevel::Debug, "App.A", "a1"));
  assert_eq!(1, setup.manager.buffer("App.A").unwrap().rule_count());

  setup
    .watch
    .update(BufferingConfig::with_rules(vec![
      FilterRule::default().with_category("Other.*"),
    ]))
    .unwrap();

  let buffer = setup.manager.buffer("App.A").unwrap();
  assert_eq!(0, buffer.rule_count());
  assert!(!setup.offer(LogLevel::Debug, "App.A", "a2"));

  // What was buffered before the update is still flushed.
  assert_eq!(1, setup.manager.flush());
  assert_eq!(vec!["a1"], setup.sink.take_messages());
}

#[test]
fn new_buffers_use_the_current_configuration() {
  let setup = Setup::new(BufferingConfig::default());
  assert!(!setup.offer(LogLevel::Debug, "App.A", "a1"));

  setup.watch.update(debug_rules()).unwrap();

  assert!(setup.offer(LogLevel::Debug, "App.A", "a2"));
  assert!(setup.offer(LogLevel::Debug, "App.B", "b1"));
}

#[test]
fn dropping_the_manager_unsubscribes() {
  let setup = Setup::new(debug_rules());
  assert_eq!(1, setup.watch.listener_count());

  let watch = setup.watch.clone();
  drop(setup);
  assert_eq!(0, watch.listener_count());

  watch.update(BufferingConfig::default()).unwrap();
}

#[test]
fn concurrent_enqueue_across_categories() {
  const THREADS: usize = 8;
  const RECORDS_PER_THREAD: usize = 250;
  const CATEGORIES: [&str; 4] = ["App.A", "App.B", "App.C", "App.D"];

  let setup = Setup::new(BufferingConfig {
    auto_flush_duration_ms: 0,
    ..debug_rules()
  });

  std::thread::scope(|scope| {
    for thread in 0 .. THREADS {
      let setup = &setup;
      scope.spawn(move || {
        for i in 0 .. RECORDS_PER_THREAD {
          let category = CATEGORIES[(thread + i) % CATEGORIES.len()];
          assert!(setup.offer(LogLevel::Debug, category, "m"));
        }
      });
    }

    scope.spawn(|| {
      for _ in 0 .. 50 {
        setup.manager.flush();
      }
    });
  });

  setup.manager.flush();
  assert_eq!(CATEGORIES.len(), setup.manager.categories().len());
  assert_eq!(THREADS * RECORDS_PER_THREAD, setup.sink.messages().len());
  assert_eq!(
    (THREADS * RECORDS_PER_THREAD) as u64,
    setup.manager.stats().flushed
  );
}

#[test]
fn concurrent_updates_and_buffer_creation_converge() {
  let setup = Setup::new(BufferingConfig::default());

  std::thread::scope(|scope| {
    scope.spawn(|| {
      for i in 0 .. 100 {
        let config = if i % 2 == 0 {
          debug_rules()
        } else {
          BufferingConfig::default()
        };
        setup.watch.update(config).unwrap();
      }
      setup.watch.update(debug_rules()).unwrap();
    });

    scope.spawn(|| {
      for i in 0 .. 100 {
        setup.offer(LogLevel::Debug, &format!("App.{i}"), "m");
      }
    });
  });

  for category in setup.manager.categories() {
    assert_eq!(1, setup.manager.buffer(&category).unwrap().rule_count());
  }
}
