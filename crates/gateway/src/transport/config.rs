//! Transport configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs shared by the built-in transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum time to establish the connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Buffered items per submit stream before the reader applies backpressure
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,

    /// Largest frame accepted in either direction
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Disable Nagle's algorithm on TCP sockets
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_stream_capacity() -> usize {
    64
}

fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_nodelay() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            stream_capacity: default_stream_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
            nodelay: default_nodelay(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    pub fn with_max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit;
        self
    }
}

/// Split an endpoint URL into the `host:port` authority used to dial it
///
/// Accepts a bare `host:port` or one prefixed with `tcp://`, `grpc://` or
/// `http://`. A trailing `/` is ignored.
pub fn endpoint_authority(endpoint: &str) -> Option<&str> {
    let rest = match endpoint.split_once("://") {
        Some(("tcp" | "grpc" | "http", rest)) => rest,
        Some(_) => return None,
        None => endpoint,
    };
    let authority = rest.strip_suffix('/').unwrap_or(rest);
    let (host, port) = authority.rsplit_once(':')?;
    if host.is_empty() || authority.contains('/') || port.parse::<u16>().is_err() {
        return None;
    }
    Some(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.stream_capacity, 64);
        assert_eq!(config.max_frame_bytes, 4 * 1024 * 1024);
        assert!(config.nodelay);
    }

    #[test]
    fn test_config_partial_json() {
        let config: TransportConfig = serde_json::from_str(r#"{"stream_capacity": 8}"#).unwrap();
        assert_eq!(config.stream_capacity, 8);
        assert_eq!(config.connect_timeout_ms, 5_000);
    }

    #[test]
    fn test_endpoint_authority() {
        assert_eq!(endpoint_authority("localhost:7053"), Some("localhost:7053"));
        assert_eq!(endpoint_authority("grpc://peer0:7051"), Some("peer0:7051"));
        assert_eq!(endpoint_authority("tcp://127.0.0.1:9000/"), Some("127.0.0.1:9000"));
        assert_eq!(endpoint_authority("https://peer0:7051"), None);
        assert_eq!(endpoint_authority("peer0"), None);
        assert_eq!(endpoint_authority(":7051"), None);
        assert_eq!(endpoint_authority("peer0:notaport"), None);
        assert_eq!(endpoint_authority("peer0:7051/path"), None);
    }
}
