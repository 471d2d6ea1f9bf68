// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::serializer::SerializedRecord;

//
// BufferSink
//

/// Destination for records drained from a buffer. Implementations forward the records to the real
/// log outputs. The records are owned by the sink once handed over, and any failure to write them
/// is the sink's concern.
pub trait BufferSink: Send + Sync {
  /// Receives the drained records of a single category, oldest first.
  fn log_records(&self, records: Vec<SerializedRecord>);
}
