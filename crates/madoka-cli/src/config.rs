//! Configuration file
//!
//! ```toml
//! [connection]
//! connect_backoff_ms = 2000
//! write_attempts = 5
//!
//! [mqtt]
//! broker_host = "broker.local"
//! root_topic = "/madoka"
//! ```

use anyhow::{Context, Result};
use madoka_bridge::MqttBridgeConfig;
use madoka_client::ConnectionConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub connection: ConnectionConfig,
    pub mqtt: MqttBridgeConfig,
}

impl FileConfig {
    /// Defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
