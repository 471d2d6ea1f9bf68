// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./serializer_test.rs"]
mod serializer_test;

use bd_log_primitives::size::MemorySized;
use bd_log_primitives::{EXCEPTION_STACKTRACE_KEY, LogAttribute, LogEntry, LogLevel};
use std::backtrace::BacktraceStatus;
use std::fmt::Write as _;
use time::OffsetDateTime;

// Fixed cost charged to every record on top of its string content: timestamp (8 bytes), event id
// (4 bytes) and level (4 bytes).
pub const RECORD_OVERHEAD_BYTES: usize = 16;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SerializeError {
  #[error("failed to render value of attribute {key:?}")]
  AttributeFormat { key: String },
  #[error("failed to render exception")]
  ExceptionFormat,
}

//
// SerializedRecord
//

// A self-contained, string only snapshot of a log record. Nothing in it borrows from the call site
// that produced it, so it can be held until the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedRecord {
  timestamp: OffsetDateTime,
  level: LogLevel,
  event_id: i32,
  event_name: Option<String>,
  formatted_message: Option<String>,
  exception: Option<String>,
  attributes: Vec<(String, String)>,
  size_bytes: usize,
}

impl SerializedRecord {
  #[must_use]
  pub fn new(
    timestamp: OffsetDateTime,
    level: LogLevel,
    event_id: i32,
    event_name: Option<String>,
    formatted_message: Option<String>,
    exception: Option<String>,
    attributes: Vec<(String, String)>,
  ) -> Self {
    let size_bytes = RECORD_OVERHEAD_BYTES
      + event_name.size()
      + formatted_message.size()
      + exception.size()
      + attributes.size();

    Self {
      timestamp,
      level,
      event_id,
      event_name,
      formatted_message,
      exception,
      attributes,
      size_bytes,
    }
  }

  #[must_use]
  pub const fn timestamp(&self) -> OffsetDateTime {
    self.timestamp
  }

  #[must_use]
  pub const fn level(&self) -> LogLevel {
    self.level
  }

  #[must_use]
  pub const fn event_id(&self) -> i32 {
    self.event_id
  }

  #[must_use]
  pub fn event_name(&self) -> Option<&str> {
    self.event_name.as_deref()
  }

  #[must_use]
  pub fn formatted_message(&self) -> Option<&str> {
    self.formatted_message.as_deref()
  }

  #[must_use]
  pub fn exception(&self) -> Option<&str> {
    self.exception.as_deref()
  }

  #[must_use]
  pub fn attributes(&self) -> &[(String, String)] {
    &self.attributes
  }

  #[must_use]
  pub fn attribute(&self, key: &str) -> Option<&str> {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  #[must_use]
  pub const fn size_bytes(&self) -> usize {
    self.size_bytes
  }
}

impl MemorySized for SerializedRecord {
  fn size(&self) -> usize {
    self.size_bytes
  }
}

//
// Serialization
//

// Snapshots a live record. Fails if any attribute (or the exception) cannot be rendered, in which
// case the record must not be buffered.
pub fn serialize(
  entry: &LogEntry<'_>,
  timestamp: OffsetDateTime,
) -> Result<SerializedRecord, SerializeError> {
  let attributes = entry
    .attributes
    .iter()
    .map(|attribute| {
      let mut value = String::new();
      attribute
        .value
        .write_to(&mut value)
        .map_err(|_| SerializeError::AttributeFormat {
          key: attribute.key.to_string(),
        })?;
      Ok((attribute.key.to_string(), value))
    })
    .collect::<Result<Vec<_>, SerializeError>>()?;

  let exception = entry
    .exception
    .map(|error| serialize_exception(error, entry.attributes))
    .transpose()?;

  let formatted_message = Some((entry.formatter)(entry.attributes, entry.exception))
    .filter(|message| !message.is_empty());

  Ok(SerializedRecord::new(
    timestamp,
    entry.level,
    entry.event_id.id,
    entry.event_id.name.map(str::to_string),
    formatted_message,
    exception,
    attributes,
  ))
}

// Renders the error and its chain of causes. The backtrace is appended only when one was captured
// and the record does not already carry it as an attribute.
fn serialize_exception(
  error: &anyhow::Error,
  attributes: &[LogAttribute<'_>],
) -> Result<String, SerializeError> {
  let mut out = String::new();
  write!(out, "{error:#}").map_err(|_| SerializeError::ExceptionFormat)?;

  let backtrace = error.backtrace();
  if backtrace.status() == BacktraceStatus::Captured
    && !attributes
      .iter()
      .any(|attribute| attribute.key == EXCEPTION_STACKTRACE_KEY)
  {
    write!(out, "\n{backtrace}").map_err(|_| SerializeError::ExceptionFormat)?;
  }

  Ok(out)
}
