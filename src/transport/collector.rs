use tracing::warn;

use super::record::Record;

/// Global working buffer for sequential mode. Records drained from every
/// per-thread queue land here and are sorted by sequence before sending.
#[derive(Debug)]
pub struct Collector {
    records: Vec<Record>,
    capacity: usize,
}

impl Collector {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `record`. Returns false when the buffer is full; the caller
    /// must stop draining for this cycle and leave the record queued.
    pub fn add(&mut self, record: Record) -> bool {
        if self.records.len() == self.capacity {
            warn!(capacity = self.capacity, "collector buffer overflow");
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn sort(&mut self) {
        self.records.sort_unstable_by_key(|r| r.sequence);
    }

    /// Empties the buffer, keeping its allocation.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn memory_overhead(&self) -> usize {
        self.capacity * std::mem::size_of::<Record>()
    }
}
