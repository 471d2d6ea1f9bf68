// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./replay_test.rs"]
mod replay_test;

use crate::output::{SharedWriter, WriterSink, format_record};
use bd_log_buffer::serializer::serialize;
use bd_log_buffer::{BufferManager, BufferSink, BufferingConfig, ConfigWatch};
use bd_log_primitives::{AttributeValue, EventId, LogAttribute, LogEntry, LogLevel};
use bd_time::TimeProvider;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

//
// InputRecord
//

// One line of replay input.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRecord {
  pub level: LogLevel,
  pub category: String,
  #[serde(default)]
  pub event_id: i32,
  #[serde(default)]
  pub event_name: Option<String>,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub exception: Option<String>,
  #[serde(default)]
  // Kept in input order.
  pub attributes: Map<String, Value>,
}

fn attribute_value(value: &Value) -> AttributeValue<'_> {
  match value {
    Value::String(s) => AttributeValue::Str(s),
    Value::Bool(b) => AttributeValue::Bool(*b),
    Value::Number(n) => n
      .as_i64()
      .map(AttributeValue::I64)
      .or_else(|| n.as_u64().map(AttributeValue::U64))
      .or_else(|| n.as_f64().map(AttributeValue::F64))
      .unwrap_or(AttributeValue::Display(n)),
    other => AttributeValue::Display(other),
  }
}

//
// ReplaySummary
//

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
  pub records: usize,
  pub buffered: usize,
  pub emitted: usize,
  pub flushed: usize,
  pub skipped: usize,
  pub reloads: usize,
}

//
// ConfigReload
//

// Re-reads a configuration file into a watch when the reload trigger line is seen.
pub struct ConfigReload {
  pub watch: Arc<ConfigWatch>,
  pub path: PathBuf,
  pub trigger: String,
}

//
// Replay
//

// Feeds JSON-lines records through a buffer manager. Records that are not buffered are written out
// immediately, buffered ones when a flush trigger line is seen and once more at the end of input.
pub struct Replay<'a> {
  manager: &'a BufferManager,
  time_provider: &'a dyn TimeProvider,
  out: SharedWriter,
  flush_trigger: String,
  reload: Option<ConfigReload>,
  sinks: HashMap<String, Arc<dyn BufferSink>>,
  summary: ReplaySummary,
}

impl<'a> Replay<'a> {
  #[must_use]
  pub fn new(
    manager: &'a BufferManager,
    time_provider: &'a dyn TimeProvider,
    out: SharedWriter,
    flush_trigger: impl Into<String>,
  ) -> Self {
    Self {
      manager,
      time_provider,
      out,
      flush_trigger: flush_trigger.into(),
      reload: None,
      sinks: HashMap::new(),
      summary: ReplaySummary::default(),
    }
  }

  #[must_use]
  pub fn with_reload(mut self, reload: ConfigReload) -> Self {
    self.reload = Some(reload);
    self
  }

  pub fn run(mut self, input: impl BufRead) -> anyhow::Result<ReplaySummary> {
    for (index, line) in input.lines().enumerate() {
      let line = line?;
      let line = line.trim();
      if line.is_empty() {
        continue;
      }

      if line == self.flush_trigger {
        self.flush();
        continue;
      }

      if let Some(reload) = &self.reload
        && line == reload.trigger
      {
        self.reload();
        continue;
      }

      match serde_json::from_str::<InputRecord>(line) {
        Ok(record) => self.offer(&record)?,
        Err(e) => {
          log::warn!("skipping input line {}: {e}", index + 1);
          self.summary.skipped += 1;
        },
      }
    }

    self.flush();
    self.out.lock().flush()?;

    Ok(self.summary)
  }

  fn flush(&mut self) {
    let flushed = self.manager.flush();
    log::info!("flushed {flushed} buffered records");
    self.summary.flushed += flushed;
  }

  fn reload(&mut self) {
    let Some(reload) = &self.reload else {
      return;
    };

    // A bad configuration leaves the current one in effect.
    match BufferingConfig::load(&reload.path).and_then(|config| reload.watch.update(config)) {
      Ok(()) => {
        log::info!("reloaded buffering configuration from {}", reload.path.display());
        self.summary.reloads += 1;
      },
      Err(e) => log::warn!("keeping current buffering configuration: {e}"),
    }
  }

  fn sink_for(&mut self, category: &str) -> Arc<dyn BufferSink> {
    let out = self.out.clone();
    self
      .sinks
      .entry(category.to_string())
      .or_insert_with(|| Arc::new(WriterSink::new(category, out)))
      .clone()
  }

  fn offer(&mut self, record: &InputRecord) -> anyhow::Result<()> {
    let attributes: Vec<LogAttribute<'_>> = record
      .attributes
      .iter()
      .map(|(key, value)| LogAttribute::new(key, attribute_value(value)))
      .collect();
    let exception = record
      .exception
      .as_ref()
      .map(|exception| anyhow::anyhow!(exception.clone()));
    let event_id = match &record.event_name {
      Some(name) => EventId::named(record.event_id, name),
      None => EventId::new(record.event_id),
    };

    let entry = LogEntry {
      level: record.level,
      category: &record.category,
      event_id,
      attributes: &attributes,
      exception: exception.as_ref(),
      formatter: &|_, _| record.message.clone(),
    };

    self.summary.records += 1;
    let sink = self.sink_for(&record.category);
    if self.manager.try_enqueue(&sink, &entry) {
      self.summary.buffered += 1;
      return Ok(());
    }

    self.summary.emitted += 1;
    let line = match serialize(&entry, self.time_provider.now()) {
      Ok(serialized) => format_record(&record.category, &serialized),
      Err(e) => {
        log::debug!("emitting unformatted record: {e}");
        format!("{} [{}] {}", record.level, record.category, record.message)
      },
    };
    writeln!(self.out.lock(), "{line}")?;

    Ok(())
  }
}
