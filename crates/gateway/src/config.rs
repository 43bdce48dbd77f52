//! Client configuration loading
//!
//! JSON configuration for a gateway client:
//! - Endpoint URL
//! - Transport credentials (insecure or TLS)
//! - Default call deadline
//! - Transport tuning
//!
//! The signer is never part of a config file; set it on the builder.

use crate::error::ConfigError;
use crate::transport::{TlsSettings, TransportConfig, TransportCredentials};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Credential mode selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsMode {
    /// Plaintext, unauthenticated (default)
    #[default]
    Insecure,
    Tls,
}

/// Credential configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub mode: CredentialsMode,

    /// PEM file with the CA certificate(s) (TLS only)
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    /// Server name override (TLS only)
    #[serde(default)]
    pub server_name: Option<String>,
}

/// Root client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayClientConfig {
    /// Gateway endpoint, e.g. `localhost:7053` or `grpc://peer0:7051`
    pub endpoint: String,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Deadline applied to calls that do not set one
    #[serde(default)]
    pub default_deadline_ms: Option<u64>,

    #[serde(default)]
    pub transport: TransportConfig,
}

impl GatewayClientConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = read_file(path.as_ref())?;
        Self::from_json(&String::from_utf8_lossy(&content))
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.default_deadline_ms == Some(0) {
            return Err(ConfigError::Parse(
                "default_deadline_ms must be greater than 0".to_string(),
            ));
        }
        Ok(config)
    }

    /// Zero is treated as no deadline
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Build transport credentials, reading the CA file if one is configured
    pub fn credentials(&self) -> Result<TransportCredentials, ConfigError> {
        match self.credentials.mode {
            CredentialsMode::Insecure => Ok(TransportCredentials::Insecure),
            CredentialsMode::Tls => {
                let ca_cert_pem = self
                    .credentials
                    .ca_cert_path
                    .as_deref()
                    .map(|path| read_file(Path::new(path)))
                    .transpose()?;
                Ok(TransportCredentials::Tls(TlsSettings {
                    ca_cert_pem,
                    server_name: self.credentials.server_name.clone(),
                }))
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = GatewayClientConfig::from_json(r#"{"endpoint": "localhost:7053"}"#).unwrap();
        assert_eq!(config.endpoint, "localhost:7053");
        assert_eq!(config.credentials.mode, CredentialsMode::Insecure);
        assert_eq!(config.default_deadline(), None);
        assert_eq!(config.transport, TransportConfig::default());
        assert_eq!(config.credentials().unwrap(), TransportCredentials::Insecure);
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let err = GatewayClientConfig::from_json(
            r#"{"endpoint": "localhost:7053", "default_deadline_ms": 0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(ref msg) if msg.contains("default_deadline_ms")));

        let mut config = GatewayClientConfig::from_json(r#"{"endpoint": "localhost:7053"}"#).unwrap();
        config.default_deadline_ms = Some(0);
        assert_eq!(config.default_deadline(), None);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "endpoint": "grpc://peer0:7051",
            "credentials": { "mode": "tls", "server_name": "peer0.org1" },
            "default_deadline_ms": 2500,
            "transport": { "stream_capacity": 16, "nodelay": false }
        }"#;
        let config = GatewayClientConfig::from_json(json).unwrap();
        assert_eq!(config.default_deadline(), Some(Duration::from_millis(2500)));
        assert_eq!(config.transport.stream_capacity, 16);
        assert!(!config.transport.nodelay);
        assert_eq!(
            config.credentials().unwrap(),
            TransportCredentials::Tls(TlsSettings {
                ca_cert_pem: None,
                server_name: Some("peer0.org1".to_string()),
            })
        );
    }

    #[test]
    fn test_missing_endpoint_is_parse_error() {
        let err = GatewayClientConfig::from_json("{}").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayClientConfig::from_file("/nonexistent/gateway.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path == "/nonexistent/gateway.json"));
    }

    #[test]
    fn test_missing_ca_file() {
        let json = r#"{
            "endpoint": "peer0:7051",
            "credentials": { "mode": "tls", "ca_cert_path": "/nonexistent/ca.pem" }
        }"#;
        let config = GatewayClientConfig::from_json(json).unwrap();
        assert!(matches!(config.credentials(), Err(ConfigError::Io { .. })));
    }
}
