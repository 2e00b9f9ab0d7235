//! Connector configuration
//!
//! Loaded from an optional TOML file (path in `CONNECTOR_CONFIG`), then
//! overridden by the `HOST`, `PORT`, and `CONNECTOR_UID` environment
//! variables. Everything has a default so the connector starts bare.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Runtime configuration of the connector server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Interface the server binds to
    pub host: String,
    /// Port the server binds to
    pub port: u16,
    /// Uid of the supervisor hosted by this connector
    pub uid: String,
    /// Monitoring host announced on chains deployed through this connector
    pub monitoring_host: Option<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            uid: "connector".to_string(),
            monitoring_host: None,
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from file and environment
    pub fn load() -> Self {
        let mut config = match std::env::var("CONNECTOR_CONFIG") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Self::default(),
        };
        config.apply_env(
            std::env::var("HOST").ok(),
            std::env::var("PORT").ok(),
            std::env::var("CONNECTOR_UID").ok(),
        );
        config
    }

    /// Parse a TOML config file, falling back to defaults on failure
    pub fn from_file(path: &str) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(%path, error = %e, "cannot read config file, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                warn!(%path, error = %e, "cannot parse config file, using defaults");
                Self::default()
            }
        }
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self, host: Option<String>, port: Option<String>, uid: Option<String>) {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(%port, "PORT is not a valid u16, keeping {}", self.port),
            }
        }
        if let Some(uid) = uid {
            self.uid = uid;
        }
    }

    /// Socket address string the server binds to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
