// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

//
// MemorySized
//

// Interface for reporting the number of bytes an object accounts for against a memory budget.
// Implementations must be deterministic: the same value always reports the same size, so that
// budgets which add on insert and subtract on removal never drift.
pub trait MemorySized {
  // Returns the accounted size of the object, expressed in bytes.
  fn size(&self) -> usize;
}

// Strings are accounted by their UTF-8 payload only.
impl MemorySized for String {
  fn size(&self) -> usize {
    self.len()
  }
}

impl MemorySized for str {
  fn size(&self) -> usize {
    self.len()
  }
}

impl<T: MemorySized> MemorySized for Option<T> {
  fn size(&self) -> usize {
    self.as_ref().map_or(0, MemorySized::size)
  }
}

impl<A: MemorySized, B: MemorySized> MemorySized for (A, B) {
  fn size(&self) -> usize {
    self.0.size() + self.1.size()
  }
}

impl<T: MemorySized> MemorySized for Vec<T> {
  fn size(&self) -> usize {
    self.iter().map(MemorySized::size).sum()
  }
}
