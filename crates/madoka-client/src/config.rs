//! Connection tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry policy of a [`Connection`](crate::Connection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Pause between failed connection attempts
    pub connect_backoff_ms: u64,
    /// Write attempts per chunk before the send is given up
    pub write_attempts: u32,
    /// Pause between write attempts of the same chunk
    pub write_retry_delay_ms: u64,
    /// Upper bound on waiting for a response; unbounded when unset
    pub response_timeout_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_backoff_ms: 2000,
            write_attempts: 5,
            write_retry_delay_ms: 1000,
            response_timeout_ms: None,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn write_retry_delay(&self) -> Duration {
        Duration::from_millis(self.write_retry_delay_ms)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}
