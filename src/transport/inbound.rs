use std::sync::{Mutex, MutexGuard};

use tracing::warn;

#[derive(Debug, Default)]
struct Pending {
    bytes: Vec<u8>,
    // Set on the first overflow, cleared once the reader catches up.
    overflowed: bool,
}

/// Text received from the peer between polls. The tracer thread appends,
/// the public read call swaps it out; both under the same lock.
#[derive(Debug)]
pub struct InboundBuffer {
    pending: Mutex<Pending>,
    capacity: usize,
}

impl InboundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends what fits and returns how many bytes were dropped. Warns
    /// once per overflow until the buffer is drained.
    pub fn append(&self, bytes: &[u8]) -> usize {
        let mut pending = self.lock();
        let room = self.capacity.saturating_sub(pending.bytes.len());
        let kept = room.min(bytes.len());
        pending.bytes.extend_from_slice(&bytes[..kept]);

        let dropped = bytes.len() - kept;
        if dropped > 0 && !pending.overflowed {
            pending.overflowed = true;
            warn!(capacity = self.capacity, dropped, "inbound buffer overflow, peer text dropped");
        }
        dropped
    }

    /// Everything accumulated so far, leaving the buffer empty. `None` when
    /// nothing arrived. A multi-byte character cut by the last read stays
    /// buffered until the rest of it arrives; other invalid bytes are
    /// replaced.
    pub fn drain(&self) -> Option<String> {
        let mut pending = self.lock();
        if pending.bytes.is_empty() {
            return None;
        }

        let complete = match std::str::from_utf8(&pending.bytes) {
            Ok(_) => pending.bytes.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.bytes.len(),
        };
        if complete == 0 {
            return None;
        }

        let rest = pending.bytes.split_off(complete);
        let taken = std::mem::replace(&mut pending.bytes, rest);
        pending.overflowed = false;
        Some(String::from_utf8_lossy(&taken).into_owned())
    }

    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().bytes.is_empty()
    }

    pub fn clear(&self) {
        let mut pending = self.lock();
        pending.bytes.clear();
        pending.overflowed = false;
    }
}
