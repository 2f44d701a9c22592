//! Madoka Transport Layer
//!
//! This crate provides the link to a thermostat:
//! - The [`Link`] trait the connection manager drives
//! - Discovery results ([`Discovery`]) passed to device selection
//! - GATT identifiers of the protocol service ([`gatt`])
//! - A btleplug backed implementation (feature `ble`)

pub mod ble;
pub mod error;
pub mod gatt;
pub mod traits;

pub use ble::{force_disconnect, BleLink, BleScanner};
pub use error::{Result, TransportError};
pub use traits::{Attribute, DiscoveredDevice, Discovery, Link, TransportEvent};
