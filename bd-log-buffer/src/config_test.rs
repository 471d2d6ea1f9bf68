// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![allow(clippy::unwrap_used)]

use super::{BufferingConfig, ConfigError, ConfigListener, ConfigWatch, FilterRule, RuleAttribute};
use assert_matches::assert_matches;
use bd_log_primitives::LogLevel;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::io::Write as _;
use std::sync::Arc;

#[derive(Default)]
struct RecordingListener {
  seen: Mutex<Vec<usize>>,
}

impl ConfigListener for RecordingListener {
  fn on_config_changed(&self, config: &Arc<BufferingConfig>) {
    self.seen.lock().push(config.rules.len());
  }
}

#[test]
fn defaults() {
  let config = BufferingConfig::default();
  assert_eq!(30_000, config.auto_flush_duration_ms);
  assert_eq!(50_000, config.max_log_record_size_bytes);
  assert_eq!(500_000_000, config.max_buffer_size_bytes);
  assert!(config.rules.is_empty());
  assert_eq!(time::Duration::seconds(30), config.auto_flush_duration());
  config.validate().unwrap();
}

#[test]
fn two_wildcards_are_rejected() {
  let config = BufferingConfig::with_rules(vec![
    FilterRule::default().with_category("App.*"),
    FilterRule::default().with_category("*.Service.*"),
  ]);

  let error = config.validate().unwrap_err();
  assert_matches!(
    &error,
    ConfigError::MultipleWildcards { field, pattern }
      if field == "rules[1].category_pattern" && pattern == "*.Service.*"
  );
  assert!(error.to_string().contains("rules[1].category_pattern"));
}

#[test]
fn size_limits_are_range_checked() {
  let config = BufferingConfig {
    max_log_record_size_bytes: 0,
    ..Default::default()
  };
  assert_matches!(
    config.validate(),
    Err(ConfigError::OutOfRange {
      field: "max_log_record_size_bytes",
      ..
    })
  );

  let config = BufferingConfig {
    max_log_record_size_bytes: 10 * 1024 * 1024 + 1,
    ..Default::default()
  };
  assert_matches!(
    config.validate(),
    Err(ConfigError::OutOfRange {
      field: "max_log_record_size_bytes",
      ..
    })
  );

  let config = BufferingConfig {
    max_buffer_size_bytes: 10 * 1024 * 1024 * 1024 + 1,
    ..Default::default()
  };
  assert_matches!(
    config.validate(),
    Err(ConfigError::OutOfRange {
      field: "max_buffer_size_bytes",
      ..
    })
  );

  let config = BufferingConfig {
    auto_flush_duration_ms: 24 * 60 * 60 * 1_000 + 1,
    ..Default::default()
  };
  assert_matches!(
    config.validate(),
    Err(ConfigError::OutOfRange {
      field: "auto_flush_duration_ms",
      ..
    })
  );
}

#[test]
fn parse_yaml() {
  let config = BufferingConfig::from_yaml_str(
    r"
auto_flush_duration_ms: 1000
max_buffer_size_bytes: 4096
rules:
  - category_pattern: App.*
    max_level: Information
  - event_id: 42
    event_name: checkout
    attributes:
      - key: tenant
        value: x
",
  )
  .unwrap();

  assert_eq!(
    BufferingConfig {
      auto_flush_duration_ms: 1000,
      max_log_record_size_bytes: 50_000,
      max_buffer_size_bytes: 4096,
      rules: vec![
        FilterRule::default()
          .with_category("App.*")
          .with_max_level(LogLevel::Information),
        FilterRule {
          event_id: Some(42),
          event_name: Some("checkout".to_string()),
          attributes: Some(vec![RuleAttribute {
            key: "tenant".to_string(),
            value: "x".to_string(),
          }]),
          ..Default::default()
        },
      ],
    },
    config
  );
}

#[test]
fn parse_rejects_invalid_rules() {
  assert_matches!(
    BufferingConfig::from_json_str(r#"{"rules": [{"category_pattern": "a*b*"}]}"#),
    Err(ConfigError::MultipleWildcards { .. })
  );
  assert_matches!(
    BufferingConfig::from_json_str(r#"{"rules": [{"unknown": 1}]}"#),
    Err(ConfigError::Json(_))
  );
}

#[test]
fn load_from_file() {
  let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
  file
    .write_all(br#"{"max_log_record_size_bytes": 128}"#)
    .unwrap();

  let config = BufferingConfig::load(file.path()).unwrap();
  assert_eq!(128, config.max_log_record_size_bytes);

  assert_matches!(
    BufferingConfig::load(std::path::Path::new("/does/not/exist.yaml")),
    Err(ConfigError::Io(_))
  );
}

#[test]
fn watch_notifies_subscribers() {
  let watch = ConfigWatch::new(BufferingConfig::default()).unwrap();
  let listener = Arc::new(RecordingListener::default());
  let weak: std::sync::Weak<dyn ConfigListener> = Arc::downgrade(&listener) as _;
  let subscription = watch.subscribe(weak);
  assert_eq!(1, watch.listener_count());

  watch
    .update(BufferingConfig::with_rules(vec![FilterRule::default()]))
    .unwrap();
  assert_eq!(vec![1], *listener.seen.lock());
  assert_eq!(1, watch.current().rules.len());

  drop(subscription);
  assert_eq!(0, watch.listener_count());

  watch.update(BufferingConfig::default()).unwrap();
  assert_eq!(vec![1], *listener.seen.lock());
}

#[test]
fn invalid_update_keeps_previous_config() {
  let watch = ConfigWatch::new(BufferingConfig::with_rules(vec![FilterRule::default()])).unwrap();
  let listener = Arc::new(RecordingListener::default());
  let weak: std::sync::Weak<dyn ConfigListener> = Arc::downgrade(&listener) as _;
  let _subscription = watch.subscribe(weak);

  assert_matches!(
    watch.update(BufferingConfig::with_rules(vec![
      FilterRule::default().with_category("**")
    ])),
    Err(ConfigError::MultipleWildcards { .. })
  );

  assert_eq!(1, watch.current().rules.len());
  assert!(listener.seen.lock().is_empty());
}

#[test]
fn dropped_listeners_are_pruned() {
  let watch = ConfigWatch::new(BufferingConfig::default()).unwrap();
  let listener = Arc::new(RecordingListener::default());
  let weak: std::sync::Weak<dyn ConfigListener> = Arc::downgrade(&listener) as _;
  let subscription = watch.subscribe(weak);

  drop(listener);
  watch.update(BufferingConfig::default()).unwrap();
  assert_eq!(0, watch.listener_count());

  // Dropping the subscription after the listener went away is a no-op.
  drop(subscription);
}
