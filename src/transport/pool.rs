use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::error::PoolError;
use super::record::Record;

/// Handle to a pooled record. The generation makes a handle that outlived
/// its `free` detectable instead of silently aliasing the reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordHandle {
    index: u32,
    generation: u32,
}

impl RecordHandle {
    pub fn index(&self) -> u32 {
        self.index
    }
}

struct Entry {
    generation: u32,
    record: Option<Record>,
}

struct PoolInner {
    segments: Vec<Vec<Entry>>,
    free: Vec<u32>,
    live: usize,
}

/// Segmented record arena.
///
/// Grows one segment of `segment_len` entries at a time, up to
/// `max_segments` when capped. Allocation and free go through one internal
/// lock, so producers on any thread may share the pool.
pub struct RecordPool {
    inner: Mutex<PoolInner>,
    segment_len: usize,
    max_segments: Option<usize>,
}

impl RecordPool {
    pub fn new(segment_len: usize, max_segments: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                segments: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
            segment_len: segment_len.max(1),
            max_segments,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores `record` and returns its handle, or `None` when the pool is
    /// exhausted and may not grow. Exhaustion is not an error: the caller
    /// skips the record.
    pub fn allocate(&self, record: Record) -> Option<RecordHandle> {
        let mut inner = self.lock();

        if inner.free.is_empty() && !self.grow(&mut inner) {
            return None;
        }
        let index = inner.free.pop()?;
        let entry = Self::entry_mut(&mut inner, index, self.segment_len);
        entry.record = Some(record);
        let generation = entry.generation;
        inner.live += 1;

        Some(RecordHandle { index, generation })
    }

    fn grow(&self, inner: &mut PoolInner) -> bool {
        if let Some(max) = self.max_segments {
            if inner.segments.len() >= max {
                return false;
            }
        }
        let base = inner.segments.len() * self.segment_len;
        if base + self.segment_len > u32::MAX as usize {
            return false;
        }

        let mut segment = Vec::with_capacity(self.segment_len);
        segment.resize_with(self.segment_len, || Entry { generation: 0, record: None });
        inner.segments.push(segment);

        // Lowest index on top so a fresh pool hands out 0, 1, 2...
        inner.free.extend((base..base + self.segment_len).rev().map(|i| i as u32));
        debug!(segments = inner.segments.len(), "record pool grew");
        true
    }

    fn entry_mut(inner: &mut PoolInner, index: u32, segment_len: usize) -> &mut Entry {
        let index = index as usize;
        &mut inner.segments[index / segment_len][index % segment_len]
    }

    fn entry<'a>(&self, inner: &'a PoolInner, handle: RecordHandle) -> Option<&'a Entry> {
        let index = handle.index as usize;
        inner
            .segments
            .get(index / self.segment_len)
            .and_then(|segment| segment.get(index % self.segment_len))
            .filter(|entry| entry.generation == handle.generation && entry.record.is_some())
    }

    /// Copy of the record behind `handle`, if the handle is still live.
    pub fn get(&self, handle: RecordHandle) -> Option<Record> {
        let inner = self.lock();
        self.entry(&inner, handle).and_then(|entry| entry.record)
    }

    /// Returns the slot to the pool and hands back its record.
    pub fn free(&self, handle: RecordHandle) -> Result<Record, PoolError> {
        let mut inner = self.lock();
        if self.entry(&inner, handle).is_none() {
            return Err(PoolError::StaleHandle(handle));
        }

        let entry = Self::entry_mut(&mut inner, handle.index, self.segment_len);
        let record = entry.record.take().ok_or(PoolError::StaleHandle(handle))?;
        entry.generation = entry.generation.wrapping_add(1);
        inner.free.push(handle.index);
        inner.live -= 1;
        Ok(record)
    }

    /// Handles of every record currently allocated, lowest slot first.
    pub fn outstanding(&self) -> Vec<RecordHandle> {
        let inner = self.lock();
        let mut handles = Vec::with_capacity(inner.live);
        for (s, segment) in inner.segments.iter().enumerate() {
            for (i, entry) in segment.iter().enumerate() {
                if entry.record.is_some() {
                    handles.push(RecordHandle {
                        index: (s * self.segment_len + i) as u32,
                        generation: entry.generation,
                    });
                }
            }
        }
        handles
    }

    /// Frees every outstanding record. Handles still held elsewhere go
    /// stale. Returns how many were released.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        for handle in self.outstanding() {
            if self.free(handle).is_ok() {
                released += 1;
            }
        }
        released
    }

    pub fn len(&self) -> usize {
        self.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots allocated so far across all segments.
    pub fn capacity(&self) -> usize {
        self.lock().segments.len() * self.segment_len
    }

    pub fn memory_usage(&self) -> usize {
        self.capacity() * std::mem::size_of::<Entry>()
    }
}
