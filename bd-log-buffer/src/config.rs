// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

use arc_swap::ArcSwap;
use bd_log_primitives::LogLevel;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub const DEFAULT_AUTO_FLUSH_DURATION_MS: u64 = 30_000;
pub const DEFAULT_MAX_LOG_RECORD_SIZE_BYTES: u64 = 50_000;
pub const DEFAULT_MAX_BUFFER_SIZE_BYTES: u64 = 500_000_000;

pub const MAX_LOG_RECORD_SIZE_BYTES_LIMIT: u64 = 10 * 1024 * 1024;
pub const MAX_BUFFER_SIZE_BYTES_LIMIT: u64 = 10 * 1024 * 1024 * 1024;
pub const MAX_AUTO_FLUSH_DURATION_MS: u64 = 24 * 60 * 60 * 1_000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("{field}: category pattern {pattern:?} contains more than one '*' wildcard")]
  MultipleWildcards { field: String, pattern: String },
  #[error("{field}: {value} is outside of the allowed range {min}..={max}")]
  OutOfRange {
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
  },
  #[error("invalid buffering configuration: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("invalid buffering configuration: {0}")]
  Json(#[from] serde_json::Error),
  #[error("unable to read buffering configuration: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

//
// RuleAttribute
//

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuleAttribute {
  pub key: String,
  pub value: String,
}

//
// FilterRule
//

// Decides which records are candidates for buffering. Every populated field narrows the rule,
// unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterRule {
  // Category name, optionally containing a single '*' wildcard. Compared case-insensitively.
  pub category_pattern: Option<String>,

  // The most severe level this rule still buffers. Records above it are not matched.
  pub max_level: Option<LogLevel>,

  pub event_id: Option<i32>,
  pub event_name: Option<String>,

  // All of these must be present on the record, compared by their string form.
  pub attributes: Option<Vec<RuleAttribute>>,
}

impl FilterRule {
  #[must_use]
  pub fn with_category(mut self, pattern: impl Into<String>) -> Self {
    self.category_pattern = Some(pattern.into());
    self
  }

  #[must_use]
  pub const fn with_max_level(mut self, level: LogLevel) -> Self {
    self.max_level = Some(level);
    self
  }

  #[must_use]
  pub const fn with_event_id(mut self, event_id: i32) -> Self {
    self.event_id = Some(event_id);
    self
  }

  #[must_use]
  pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
    self.event_name = Some(event_name.into());
    self
  }

  #[must_use]
  pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self
      .attributes
      .get_or_insert_with(Vec::new)
      .push(RuleAttribute {
        key: key.into(),
        value: value.to_string(),
      });
    self
  }

  #[must_use]
  pub fn required_attributes(&self) -> &[RuleAttribute] {
    self.attributes.as_deref().unwrap_or_default()
  }
}

//
// BufferingConfig
//

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferingConfig {
  // How long buffering stays disabled after a flush.
  pub auto_flush_duration_ms: u64,

  // Records whose serialized size exceeds this are never buffered.
  pub max_log_record_size_bytes: u64,

  // Per category budget. The oldest records are evicted to stay within it.
  pub max_buffer_size_bytes: u64,

  pub rules: Vec<FilterRule>,
}

impl Default for BufferingConfig {
  fn default() -> Self {
    Self {
      auto_flush_duration_ms: DEFAULT_AUTO_FLUSH_DURATION_MS,
      max_log_record_size_bytes: DEFAULT_MAX_LOG_RECORD_SIZE_BYTES,
      max_buffer_size_bytes: DEFAULT_MAX_BUFFER_SIZE_BYTES,
      rules: Vec::new(),
    }
  }
}

impl BufferingConfig {
  #[must_use]
  pub fn with_rules(rules: Vec<FilterRule>) -> Self {
    Self {
      rules,
      ..Default::default()
    }
  }

  #[must_use]
  pub fn auto_flush_duration(&self) -> time::Duration {
    time::Duration::milliseconds(i64::try_from(self.auto_flush_duration_ms).unwrap_or(i64::MAX))
  }

  #[must_use]
  pub fn max_log_record_size(&self) -> usize {
    usize::try_from(self.max_log_record_size_bytes).unwrap_or(usize::MAX)
  }

  #[must_use]
  pub fn max_buffer_size(&self) -> usize {
    usize::try_from(self.max_buffer_size_bytes).unwrap_or(usize::MAX)
  }

  pub fn validate(&self) -> Result<()> {
    check_range(
      "max_log_record_size_bytes",
      self.max_log_record_size_bytes,
      1,
      MAX_LOG_RECORD_SIZE_BYTES_LIMIT,
    )?;
    check_range(
      "max_buffer_size_bytes",
      self.max_buffer_size_bytes,
      1,
      MAX_BUFFER_SIZE_BYTES_LIMIT,
    )?;
    check_range(
      "auto_flush_duration_ms",
      self.auto_flush_duration_ms,
      0,
      MAX_AUTO_FLUSH_DURATION_MS,
    )?;

    for (index, rule) in self.rules.iter().enumerate() {
      if let Some(pattern) = &rule.category_pattern
        && pattern.matches('*').count() > 1
      {
        return Err(ConfigError::MultipleWildcards {
          field: format!("rules[{index}].category_pattern"),
          pattern: pattern.clone(),
        });
      }
    }

    Ok(())
  }

  pub fn from_yaml_str(contents: &str) -> Result<Self> {
    let config: Self = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_json_str(contents: &str) -> Result<Self> {
    let config: Self = serde_json::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  // Loads a configuration file, picking the format from the extension. Anything that is not
  // `.json` is read as YAML.
  pub fn load(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)?;
    if path.extension().is_some_and(|extension| extension == "json") {
      Self::from_json_str(&contents)
    } else {
      Self::from_yaml_str(&contents)
    }
  }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
  if (min ..= max).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::OutOfRange {
      field,
      value,
      min,
      max,
    })
  }
}

//
// ConfigListener
//

pub trait ConfigListener: Send + Sync {
  fn on_config_changed(&self, config: &Arc<BufferingConfig>);
}

//
// ConfigWatch
//

// Holds the live buffering configuration. Readers get the current snapshot without locking, and
// registered listeners are told about every accepted update.
pub struct ConfigWatch {
  current: ArcSwap<BufferingConfig>,
  listeners: Mutex<Vec<(u64, Weak<dyn ConfigListener>)>>,

  // Serializes updates so listeners observe them in publication order.
  update_lock: Mutex<()>,
  next_listener_id: AtomicU64,
}

impl ConfigWatch {
  pub fn new(config: BufferingConfig) -> Result<Arc<Self>> {
    config.validate()?;

    Ok(Arc::new(Self {
      current: ArcSwap::from_pointee(config),
      listeners: Mutex::new(Vec::new()),
      update_lock: Mutex::new(()),
      next_listener_id: AtomicU64::new(0),
    }))
  }

  #[must_use]
  pub fn current(&self) -> Arc<BufferingConfig> {
    self.current.load_full()
  }

  // Validates and publishes a new configuration. An invalid configuration is rejected and the
  // previous one remains in effect. Listeners must not call back into `update`.
  pub fn update(&self, config: BufferingConfig) -> Result<()> {
    config.validate()?;

    let _update = self.update_lock.lock();

    let config = Arc::new(config);
    self.current.store(config.clone());
    log::debug!(
      "buffering configuration updated: {} rules, max buffer size {} bytes",
      config.rules.len(),
      config.max_buffer_size_bytes
    );

    // Listeners are invoked outside of the listener lock so they are free to subscribe or
    // unsubscribe.
    let listeners: Vec<Arc<dyn ConfigListener>> = {
      let mut listeners = self.listeners.lock();
      listeners.retain(|(_, listener)| listener.strong_count() > 0);
      listeners
        .iter()
        .filter_map(|(_, listener)| listener.upgrade())
        .collect()
    };

    for listener in listeners {
      listener.on_config_changed(&config);
    }

    Ok(())
  }

  // Registers a listener for future updates. The listener is held weakly and is removed when the
  // returned subscription is dropped.
  #[must_use]
  pub fn subscribe(self: &Arc<Self>, listener: Weak<dyn ConfigListener>) -> Subscription {
    let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
    self.listeners.lock().push((id, listener));

    Subscription {
      watch: Arc::downgrade(self),
      id,
    }
  }

  #[must_use]
  pub fn listener_count(&self) -> usize {
    self.listeners.lock().len()
  }

  fn unsubscribe(&self, id: u64) {
    self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
  }
}

//
// Subscription
//

pub struct Subscription {
  watch: Weak<ConfigWatch>,
  id: u64,
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(watch) = self.watch.upgrade() {
      watch.unsubscribe(self.id);
    }
  }
}
