//! Text trace lines for the observer: node actions, variable snapshots,
//! profiler samples and application log lines, shipped as text records.

pub mod format;

pub use format::{ActionResult, AgentName, LogMode, TraceWriter};
