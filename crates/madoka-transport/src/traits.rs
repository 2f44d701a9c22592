//! Link trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Write as _;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Events that can occur on a link
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Notification received
    Data(Bytes),
    /// Error occurred
    Error(String),
}

/// A readable characteristic and its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub uuid: Uuid,
    /// Standard name when known, the UUID otherwise
    pub name: String,
    pub value: Bytes,
}

impl Attribute {
    pub fn new(uuid: Uuid, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            uuid,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Value as presented to users.
    ///
    /// Identifiers ("System ID", "PnP ID") are rendered as hex with 0xFE bytes
    /// shown as `-` and 0xFF padding dropped. Everything else is text, or
    /// plain hex when it is not valid UTF-8.
    pub fn display_value(&self) -> String {
        if self.name.ends_with(" ID") {
            let mut out = String::with_capacity(self.value.len() * 2);
            for byte in self.value.iter() {
                match byte {
                    0xfe => out.push('-'),
                    0xff => {}
                    b => {
                        let _ = write!(out, "{:02x}", b);
                    }
                }
            }
            return out;
        }

        match std::str::from_utf8(&self.value) {
            Ok(text) => text.trim_end_matches('\0').to_string(),
            Err(_) => self.value.iter().fold(
                String::with_capacity(self.value.len() * 2),
                |mut out, b| {
                    let _ = write!(out, "{:02x}", b);
                    out
                },
            ),
        }
    }
}

/// A point-to-point link to one thermostat.
///
/// Implementations are cheap handles; clones refer to the same device.
#[async_trait]
pub trait Link: Clone + Send + Sync + 'static {
    /// Device address used for selection and logging
    fn address(&self) -> String;

    /// Connect and subscribe to notifications.
    ///
    /// The returned receiver yields [`TransportEvent::Data`] per notified chunk
    /// and ends with [`TransportEvent::Disconnected`] when the link drops.
    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Write one chunk to the request characteristic
    async fn write(&self, chunk: Bytes) -> Result<()>;

    /// Tear the link down
    async fn disconnect(&self) -> Result<()>;

    /// Read every readable characteristic the device exposes
    async fn read_attributes(&self) -> Result<Vec<Attribute>>;
}

/// A device seen during a scan
#[derive(Debug, Clone)]
pub struct DiscoveredDevice<L> {
    pub address: String,
    /// Advertised name, if any
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub link: L,
}

/// Result of one discovery run.
///
/// Passed explicitly to whoever needs to select a device; there is no
/// process-wide device cache.
#[derive(Debug, Clone)]
pub struct Discovery<L> {
    devices: Vec<DiscoveredDevice<L>>,
}

impl<L> Discovery<L> {
    pub fn new(devices: Vec<DiscoveredDevice<L>>) -> Self {
        Self { devices }
    }

    /// Look a device up by address, ignoring case
    pub fn find(&self, address: &str) -> Option<&DiscoveredDevice<L>> {
        self.devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
    }

    pub fn devices(&self) -> &[DiscoveredDevice<L>] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl<L> Default for Discovery<L> {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
        }
    }
}

impl<L> FromIterator<DiscoveredDevice<L>> for Discovery<L> {
    fn from_iter<T: IntoIterator<Item = DiscoveredDevice<L>>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
