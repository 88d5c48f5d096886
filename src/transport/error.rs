use thiserror::Error;

use super::pool::RecordHandle;

/// Lifecycle and configuration failures. These are the only errors that
/// reach the embedding application; steady-state emits never return one.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("queue capacity {0} is not a power of two")]
    InvalidQueueCapacity(usize),

    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn the tracer thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("tracer thread exited before a peer attached")]
    WorkerExited,

    #[error("failed to load transport config: {0}")]
    Config(String),
}

/// Precondition violations on the record pool. With generation-checked
/// handles these are detected instead of corrupting a reused slot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("record handle {0:?} is stale (already freed or released)")]
    StaleHandle(RecordHandle),
}

/// Slot reservation failure: every registry slot is already bound.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no free trace slot, {max} threads already traced")]
    Exhausted { max: usize },
}

/// Why a push did not land in the calling thread's queue. The item is
/// handed back so the caller can return it to the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError<T> {
    #[error("calling thread has no trace slot")]
    NoSlot(T),

    #[error("queue stayed full until the connection went away")]
    Abandoned(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::NoSlot(item) | PushError::Abandoned(item) => item,
        }
    }
}
