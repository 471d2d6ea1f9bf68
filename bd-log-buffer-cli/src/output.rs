// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use bd_log_buffer::{BufferSink, SerializedRecord};
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;

// Destination shared by every category sink and by records that are emitted directly.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

// Renders a record as a single line, followed by an indented exception if there is one.
#[must_use]
pub fn format_record(category: &str, record: &SerializedRecord) -> String {
  let timestamp = record
    .timestamp()
    .format(&Rfc3339)
    .unwrap_or_else(|_| record.timestamp().to_string());

  let mut line = format!("{timestamp} {} [{category}]", record.level());
  match record.event_name() {
    Some(name) => {
      let _ = write!(line, " {name}({})", record.event_id());
    },
    None if record.event_id() != 0 => {
      let _ = write!(line, " ({})", record.event_id());
    },
    None => {},
  }

  if let Some(message) = record.formatted_message() {
    let _ = write!(line, " {message}");
  }

  for (key, value) in record.attributes() {
    let _ = write!(line, " {key}={value}");
  }

  if let Some(exception) = record.exception() {
    let _ = write!(line, "\n  {}", exception.replace('\n', "\n  "));
  }

  line
}

//
// WriterSink
//

// Writes the flushed records of one category to the shared output.
pub struct WriterSink {
  category: String,
  out: SharedWriter,
}

impl WriterSink {
  #[must_use]
  pub fn new(category: impl Into<String>, out: SharedWriter) -> Self {
    Self {
      category: category.into(),
      out,
    }
  }
}

impl BufferSink for WriterSink {
  fn log_records(&self, records: Vec<SerializedRecord>) {
    let mut out = self.out.lock();
    for record in &records {
      if let Err(e) = writeln!(out, "{}", format_record(&self.category, record)) {
        log::warn!("failed to write flushed records for {:?}: {e}", self.category);
        return;
      }
    }
  }
}
