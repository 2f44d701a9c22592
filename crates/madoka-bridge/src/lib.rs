//! Madoka MQTT Bridge
//!
//! Publishes the aggregated thermostat status to an MQTT broker and applies
//! commands received on the device's `.../set` topics.

pub mod commands;
pub mod error;
pub mod mqtt;

pub use commands::{apply_command, Command};
pub use error::{BridgeError, Result};
pub use mqtt::{DeviceTopics, MqttBridge, MqttBridgeConfig, StatusUpdate};
