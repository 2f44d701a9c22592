//! Madoka Client Library
//!
//! High-level async client for Daikin BRC1H ("Madoka") thermostats.
//!
//! # Example
//!
//! ```ignore
//! use madoka_client::prelude::*;
//! use madoka_transport::BleScanner;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scanner = BleScanner::new(Some("hci0")).await?;
//!     let discovery = scanner.discover(Duration::from_secs(5)).await?;
//!
//!     let thermostat = ThermostatBuilder::new("AA:BB:CC:DD:EE:FF")
//!         .connect(&discovery)
//!         .await?;
//!
//!     thermostat.set_point.update(SetPointStatus::new(24, 21)).await?;
//!     thermostat.refresh().await?;
//!     println!("{}", serde_json::Value::Object(thermostat.status()));
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod feature;
pub mod ledger;

pub use builder::ThermostatBuilder;
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState};
pub use controller::Thermostat;
pub use error::{ClientError, Result};
pub use feature::FeatureClient;
pub use ledger::{PendingResponse, RequestLedger};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::ThermostatBuilder;
    pub use crate::config::ConnectionConfig;
    pub use crate::connection::{Connection, ConnectionState};
    pub use crate::controller::Thermostat;
    pub use crate::error::{ClientError, Result};
    pub use crate::feature::FeatureClient;
    pub use madoka_core::features::*;
    pub use madoka_core::{FeatureStatus, Operation};
    pub use std::time::Duration;
}
