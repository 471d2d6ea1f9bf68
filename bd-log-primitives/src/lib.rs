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

#[cfg(test)]
#[path = "./lib_test.rs"]
mod lib_test;

pub mod size;

use std::fmt::{Debug, Display, Write as _};
use std::str::FromStr;

/// The attribute key under which producers may attach an already rendered backtrace. When present
/// the exception serialization skips its own copy of the backtrace.
pub const EXCEPTION_STACKTRACE_KEY: &str = "exception.stacktrace";

//
// LogLevel
//

/// Severity of a log record, ordered from least to most severe.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum LogLevel {
  #[serde(alias = "trace", alias = "TRACE")]
  Trace,
  #[serde(alias = "debug", alias = "DEBUG")]
  Debug,
  #[serde(alias = "Info", alias = "info", alias = "information", alias = "INFO")]
  Information,
  #[serde(alias = "Warn", alias = "warn", alias = "warning", alias = "WARN")]
  Warning,
  #[serde(alias = "error", alias = "ERROR")]
  Error,
  #[serde(alias = "critical", alias = "CRITICAL", alias = "fatal")]
  Critical,
}

impl LogLevel {
  #[must_use]
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Trace => "trace",
      Self::Debug => "debug",
      Self::Information => "info",
      Self::Warning => "warn",
      Self::Error => "error",
      Self::Critical => "critical",
    }
  }
}

impl Display for LogLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct UnknownLogLevel(pub String);

impl FromStr for LogLevel {
  type Err = UnknownLogLevel;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "trace" => Ok(Self::Trace),
      "debug" => Ok(Self::Debug),
      "info" | "information" => Ok(Self::Information),
      "warn" | "warning" => Ok(Self::Warning),
      "error" => Ok(Self::Error),
      "critical" | "fatal" => Ok(Self::Critical),
      _ => Err(UnknownLogLevel(s.to_string())),
    }
  }
}

//
// EventId
//

/// Identifies the kind of event a log record describes. Only `id` participates in equality, the
/// name is informational.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventId<'a> {
  pub id: i32,
  pub name: Option<&'a str>,
}

impl<'a> EventId<'a> {
  #[must_use]
  pub const fn new(id: i32) -> Self {
    Self { id, name: None }
  }

  #[must_use]
  pub const fn named(id: i32, name: &'a str) -> Self {
    Self {
      id,
      name: Some(name),
    }
  }
}

impl PartialEq for EventId<'_> {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for EventId<'_> {}

impl From<i32> for EventId<'_> {
  fn from(id: i32) -> Self {
    Self::new(id)
  }
}

//
// AttributeValue
//

/// A borrowed attribute value as supplied by the emitting call site. Values are only ever read
/// through their string form, which is what gets retained once a record is buffered.
#[derive(Clone, Copy)]
pub enum AttributeValue<'a> {
  Str(&'a str),
  I64(i64),
  U64(u64),
  F64(f64),
  Bool(bool),
  Display(&'a dyn Display),
}

impl AttributeValue<'_> {
  /// Appends the string form of the value to `out`. Fails only if a `Display` implementation
  /// reports an error.
  pub fn write_to(&self, out: &mut String) -> std::fmt::Result {
    match self {
      Self::Str(s) => {
        out.push_str(s);
        Ok(())
      },
      Self::I64(v) => write!(out, "{v}"),
      Self::U64(v) => write!(out, "{v}"),
      Self::F64(v) => write!(out, "{v}"),
      Self::Bool(v) => write!(out, "{v}"),
      Self::Display(v) => write!(out, "{v}"),
    }
  }

  /// Returns whether the string form of this value equals `expected`. A value that cannot be
  /// rendered never matches.
  #[must_use]
  pub fn string_eq(&self, expected: &str) -> bool {
    if let Self::Str(s) = self {
      return *s == expected;
    }

    let mut rendered = String::new();
    self.write_to(&mut rendered).is_ok() && rendered == expected
  }
}

impl<'a> AttributeValue<'a> {
  #[must_use]
  pub fn display(value: &'a dyn Display) -> Self {
    Self::Display(value)
  }
}

impl Debug for AttributeValue<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
      Self::I64(v) => f.debug_tuple("I64").field(v).finish(),
      Self::U64(v) => f.debug_tuple("U64").field(v).finish(),
      Self::F64(v) => f.debug_tuple("F64").field(v).finish(),
      Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
      Self::Display(_) => f.debug_tuple("Display").finish(),
    }
  }
}

impl<'a> From<&'a str> for AttributeValue<'a> {
  fn from(s: &'a str) -> Self {
    Self::Str(s)
  }
}

impl<'a> From<&'a String> for AttributeValue<'a> {
  fn from(s: &'a String) -> Self {
    Self::Str(s.as_str())
  }
}

impl From<bool> for AttributeValue<'_> {
  fn from(v: bool) -> Self {
    Self::Bool(v)
  }
}

impl From<f64> for AttributeValue<'_> {
  fn from(v: f64) -> Self {
    Self::F64(v)
  }
}

macro_rules! signed_attribute_value {
  ($($t:ty),*) => {
    $(
      impl From<$t> for AttributeValue<'_> {
        fn from(v: $t) -> Self {
          Self::I64(v.into())
        }
      }
    )*
  };
}

macro_rules! unsigned_attribute_value {
  ($($t:ty),*) => {
    $(
      impl From<$t> for AttributeValue<'_> {
        fn from(v: $t) -> Self {
          Self::U64(v.into())
        }
      }
    )*
  };
}

signed_attribute_value!(i8, i16, i32, i64);
unsigned_attribute_value!(u8, u16, u32, u64);

//
// LogAttribute
//

#[derive(Debug, Clone, Copy)]
pub struct LogAttribute<'a> {
  pub key: &'a str,
  pub value: AttributeValue<'a>,
}

impl<'a> LogAttribute<'a> {
  #[must_use]
  pub fn new(key: &'a str, value: impl Into<AttributeValue<'a>>) -> Self {
    Self {
      key,
      value: value.into(),
    }
  }
}

/// Builds a `Vec<LogAttribute>` from `key => value` pairs.
#[macro_export]
macro_rules! attributes {
  ( $( $key:expr => $value:expr ),* $(,)? ) => {
    vec![ $( $crate::LogAttribute::new($key, $value) ),* ]
  };
}

//
// LogEntry
//

/// Renders the final message of a record from its attributes and exception.
pub type MessageFormatter<'a> =
  &'a dyn Fn(&[LogAttribute<'_>], Option<&anyhow::Error>) -> String;

/// The single normalized shape in which producers hand a log record to the buffering engine.
/// Everything is borrowed from the emitting call site.
#[derive(Clone, Copy)]
pub struct LogEntry<'a> {
  pub level: LogLevel,
  pub category: &'a str,
  pub event_id: EventId<'a>,
  pub attributes: &'a [LogAttribute<'a>],
  pub exception: Option<&'a anyhow::Error>,
  pub formatter: MessageFormatter<'a>,
}

impl Debug for LogEntry<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LogEntry")
      .field("level", &self.level)
      .field("category", &self.category)
      .field("event_id", &self.event_id)
      .field("attributes", &self.attributes)
      .field("exception", &self.exception)
      .finish_non_exhaustive()
  }
}

impl<'a> LogEntry<'a> {
  /// Looks up the first attribute with the given key.
  #[must_use]
  pub fn attribute(&self, key: &str) -> Option<&AttributeValue<'a>> {
    self
      .attributes
      .iter()
      .find(|attribute| attribute.key == key)
      .map(|attribute| &attribute.value)
  }
}
