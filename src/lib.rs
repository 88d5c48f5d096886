pub mod config;
pub mod trace;
pub mod transport;

pub use config::TransportConfig;
pub use trace::TraceWriter;
pub use transport::{CommandId, ConnectionHooks, ConnectionState, Connector, NoHooks, Tracer, TransportError, WIRE_RECORD_SIZE};
