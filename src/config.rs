use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::error::TransportError;

/// Tracing transport settings. Every field has a default so a partial JSON
/// document (or none at all) is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound on threads that may emit records at the same time.
    pub max_traced_threads: usize,
    /// Listen port. 0 picks an ephemeral port (see `Tracer::local_port`).
    pub port: u16,
    pub bind_address: String,
    /// When set, `init` returns only once a peer attached and the
    /// connection hook finished.
    pub blocking: bool,
    /// Per-thread queue size. Must be a power of two.
    pub queue_capacity: usize,
    /// Global collection buffer used in sequential mode.
    pub collector_capacity: usize,
    /// Sort every flush by sequence number before sending.
    pub sequential: bool,
    pub pool_segment_len: usize,
    /// `None` lets the record pool grow without bound.
    pub pool_max_segments: Option<usize>,
    /// Pause between flush cycles (also the socket read timeout).
    pub flush_interval_ms: u64,
    pub accept_poll_ms: u64,
    pub write_timeout_ms: u64,
    /// Route inbound text to the message hook instead of leaving it for
    /// `read_text`.
    pub handle_messages: bool,
    /// Most peer bytes held while nobody reads them. The excess is dropped.
    pub inbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_traced_threads: 16,
            port: 60636,
            bind_address: "127.0.0.1".to_string(),
            blocking: false,
            queue_capacity: 1024,
            collector_capacity: 8192,
            sequential: true,
            pool_segment_len: 4096,
            pool_max_segments: None,
            flush_interval_ms: 1,
            accept_poll_ms: 10,
            write_timeout_ms: 1000,
            handle_messages: true,
            inbound_capacity: 64 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if !self.queue_capacity.is_power_of_two() {
            return Err(TransportError::InvalidQueueCapacity(self.queue_capacity));
        }
        if self.max_traced_threads == 0 {
            return Err(TransportError::InvalidConfig("max_traced_threads must be at least 1".into()));
        }
        if self.sequential && self.collector_capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "collector_capacity must be non-zero in sequential mode".into(),
            ));
        }
        if self.pool_segment_len == 0 {
            return Err(TransportError::InvalidConfig("pool_segment_len must be non-zero".into()));
        }
        if self.inbound_capacity == 0 {
            return Err(TransportError::InvalidConfig("inbound_capacity must be non-zero".into()));
        }
        if self.pool_max_segments == Some(0) {
            return Err(TransportError::InvalidConfig("pool_max_segments must be non-zero".into()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, TransportError> {
        let config: Self = serde_json::from_str(json).map_err(|e| TransportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TransportError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }

    pub fn flush_interval(&self) -> Duration {
        // A zero socket read timeout is rejected by the OS.
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = TransportConfig::from_json_str(r#"{ "port": 9999, "sequential": false }"#).unwrap();
        assert_eq!(config.port, 9999);
        assert!(!config.sequential);
        assert_eq!(config.queue_capacity, TransportConfig::default().queue_capacity);
    }

    #[test]
    fn non_power_of_two_queue_is_rejected() {
        let err = TransportConfig::from_json_str(r#"{ "queue_capacity": 1000 }"#).unwrap_err();
        assert!(matches!(err, TransportError::InvalidQueueCapacity(1000)));
    }

    #[test]
    fn zero_inbound_capacity_is_rejected() {
        let err = TransportConfig::from_json_str(r#"{ "inbound_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }
}
