//! Tracing transport: streams fixed-size trace records from any number of
//! application threads to one remote observer, and takes control text back.
//!
//! # DATA FLOW
//! producer thread -> `RecordPool` (allocate) -> its per-thread queue (push)
//! -> tracer thread (drain, optionally sort in the `Collector`) -> socket.
//! Peer bytes -> `InboundBuffer` -> message hook or `Tracer::read_text`.
//!
//! # CONCURRENCY INVARIANT
//! Each per-thread queue has exactly one producer (the thread bound to its
//! slot) and exactly one consumer (the tracer thread), for the queue's whole
//! lifetime. Only slot reservation and the pool take a lock.
//!
//! # LOSS POLICY
//! Emits are best-effort. Records are dropped, never blocked on
//! indefinitely, when the pool is exhausted, the thread has no slot, the
//! queue stays full until the peer leaves, or the session ends unflushed.

pub mod collector;
pub mod connector;
pub mod error;
pub mod hooks;
pub mod inbound;
pub mod outbox;
pub mod pool;
pub mod queue;
pub mod record;
pub mod registry;
pub mod sequence;
pub mod state;

mod worker;

pub use connector::{Connector, Tracer};
pub use error::{PoolError, PushError, RegistryError, TransportError};
pub use hooks::{ConnectionHooks, NoHooks};
pub use record::{CommandId, Record, WIRE_RECORD_SIZE};
pub use state::ConnectionState;
