// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![allow(clippy::unwrap_used)]

use crate::size::MemorySized;
use crate::{AttributeValue, EventId, LogAttribute, LogLevel, UnknownLogLevel};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::fmt::Display;

struct Broken;

impl Display for Broken {
  fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    Err(std::fmt::Error)
  }
}

#[test]
fn log_levels_are_ordered_by_severity() {
  assert!(LogLevel::Trace < LogLevel::Debug);
  assert!(LogLevel::Debug < LogLevel::Information);
  assert!(LogLevel::Information < LogLevel::Warning);
  assert!(LogLevel::Warning < LogLevel::Error);
  assert!(LogLevel::Error < LogLevel::Critical);
}

#[test]
fn log_level_parsing() {
  assert_eq!(Ok(LogLevel::Information), "Information".parse());
  assert_eq!(Ok(LogLevel::Information), "info".parse());
  assert_eq!(Ok(LogLevel::Warning), "WARN".parse());
  assert_matches!("loud".parse::<LogLevel>(), Err(UnknownLogLevel(s)) if s == "loud");

  let level: LogLevel = serde_json::from_str("\"Warning\"").unwrap();
  assert_eq!(LogLevel::Warning, level);
  let level: LogLevel = serde_json::from_str("\"debug\"").unwrap();
  assert_eq!(LogLevel::Debug, level);
}

#[test]
fn event_id_equality_ignores_name() {
  assert_eq!(EventId::named(5, "a"), EventId::named(5, "b"));
  assert_eq!(EventId::new(5), EventId::from(5));
  assert!(EventId::new(5) != EventId::new(6));
}

#[test]
fn attribute_values_render_to_strings() {
  let owned = "owned".to_string();
  let values: Vec<(AttributeValue<'_>, &str)> = vec![
    ("str".into(), "str"),
    ((&owned).into(), "owned"),
    ((-3_i32).into(), "-3"),
    (7_u16.into(), "7"),
    (1.5_f64.into(), "1.5"),
    (true.into(), "true"),
    (AttributeValue::display(&LogLevel::Error), "error"),
  ];

  for (value, expected) in values {
    let mut out = String::new();
    value.write_to(&mut out).unwrap();
    assert_eq!(expected, out);
    assert!(value.string_eq(expected));
  }
}

#[test]
fn failing_display_never_matches() {
  let value = AttributeValue::display(&Broken);
  let mut out = String::new();
  assert!(value.write_to(&mut out).is_err());
  assert!(!value.string_eq(""));
}

#[test]
fn attributes_macro() {
  let attributes = crate::attributes!("tenant" => "x", "count" => 3_i64);
  assert_eq!(2, attributes.len());
  assert_eq!("tenant", attributes[0].key);
  assert!(attributes[1].value.string_eq("3"));

  let single = LogAttribute::new("k", "v");
  assert!(single.value.string_eq("v"));
}

#[test]
fn memory_sized() {
  assert_eq!(5, "hello".to_string().size());
  assert_eq!(0, None::<String>.size());
  assert_eq!(3, ("a".to_string(), "bc".to_string()).size());
  assert_eq!(
    4,
    vec![("a".to_string(), "b".to_string()), ("c".to_string(), "d".to_string())].size()
  );
}
