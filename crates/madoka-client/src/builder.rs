//! Thermostat builder pattern

use madoka_transport::{Discovery, Link};
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::controller::Thermostat;
use crate::Result;

/// Builder for a [`Thermostat`]
pub struct ThermostatBuilder {
    address: String,
    config: ConnectionConfig,
}

impl ThermostatBuilder {
    /// Create a new builder
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            config: ConnectionConfig::default(),
        }
    }

    /// Replace the whole connection configuration
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Pause between failed connection attempts
    pub fn connect_backoff(mut self, backoff: Duration) -> Self {
        self.config.connect_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Write attempts per chunk
    pub fn write_attempts(mut self, attempts: u32) -> Self {
        self.config.write_attempts = attempts;
        self
    }

    /// Pause between write attempts of the same chunk
    pub fn write_retry_delay(mut self, delay: Duration) -> Self {
        self.config.write_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Bound the wait for each response
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Build without connecting
    pub fn build<L: Link>(self) -> Thermostat<L> {
        Thermostat::new(&self.address, self.config)
    }

    /// Build and connect using `discovery` for device selection
    pub async fn connect<L: Link>(self, discovery: &Discovery<L>) -> Result<Thermostat<L>> {
        let thermostat = self.build();
        thermostat.start(discovery).await?;
        Ok(thermostat)
    }
}
