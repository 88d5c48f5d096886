use std::sync::atomic::{AtomicU64, Ordering};

static PROCESS_SEQUENCER: Sequencer = Sequencer::new();

/// Record counter. Transports stamp from the process-wide instance so
/// numbers keep rising across close and re-init; every record is stamped
/// from it exactly once.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: AtomicU64,
}

impl Sequencer {
    pub const fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    /// The counter shared by every `Connector` in this process.
    pub fn global() -> &'static Sequencer {
        &PROCESS_SEQUENCER
    }

    /// Returns the current value and advances. Never rolls back.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
