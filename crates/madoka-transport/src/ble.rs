//! Bluetooth Low Energy link implementation
//!
//! Uses the platform BLE stack through btleplug. Requests are written without
//! response to [`WRITE_CHAR_UUID`]; response chunks arrive as notifications on
//! [`NOTIFY_CHAR_UUID`].

#[cfg(feature = "ble")]
pub use self::platform::{BleLink, BleScanner};

#[cfg(not(feature = "ble"))]
pub use self::stub::{BleLink, BleScanner};

use tracing::debug;

use crate::error::Result;

/// Disconnect a device through BlueZ so it shows up in the next scan.
///
/// A thermostat that is still connected from a previous session does not
/// advertise. Failures are logged and otherwise ignored.
#[cfg(target_os = "linux")]
pub async fn force_disconnect(address: &str) -> Result<()> {
    debug!("Forcing disconnect of {}", address);
    let output = tokio::process::Command::new("bluetoothctl")
        .args(["disconnect", address])
        .output()
        .await?;

    if !output.status.success() {
        debug!(
            "Disconnect failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub async fn force_disconnect(address: &str) -> Result<()> {
    debug!("Forced disconnect of {} is only supported with BlueZ", address);
    Ok(())
}

#[cfg(feature = "ble")]
mod platform {
    use async_trait::async_trait;
    use btleplug::api::{
        Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
        ScanFilter, WriteType,
    };
    use btleplug::platform::{Adapter, Manager, Peripheral};
    use bytes::Bytes;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, warn};

    use crate::error::{Result, TransportError};
    use crate::gatt::{characteristic_name, NOTIFY_CHAR_UUID, WRITE_CHAR_UUID};
    use crate::traits::{Attribute, DiscoveredDevice, Discovery, Link, TransportEvent};

    /// Scans one adapter for nearby devices
    pub struct BleScanner {
        adapter: Adapter,
    }

    impl BleScanner {
        /// Open the named adapter (e.g. `hci0`), or the first one available
        pub async fn new(adapter_name: Option<&str>) -> Result<Self> {
            let manager = Manager::new().await.map_err(|e| {
                TransportError::ConnectionFailed(format!("BLE manager error: {}", e))
            })?;

            let adapters = manager.adapters().await?;
            let mut selected = None;
            for adapter in adapters {
                let info = adapter.adapter_info().await.unwrap_or_default();
                debug!("Found adapter {}", info);
                match adapter_name {
                    Some(name) if !info.contains(name) => continue,
                    _ => {
                        selected = Some(adapter);
                        break;
                    }
                }
            }

            let adapter = selected.ok_or_else(|| {
                TransportError::AdapterNotFound(adapter_name.unwrap_or("default").to_string())
            })?;

            info!("BLE adapter initialized");
            Ok(Self { adapter })
        }

        /// Scan for `timeout` and return every device seen
        pub async fn discover(&self, timeout: Duration) -> Result<Discovery<BleLink>> {
            info!("Starting BLE scan for {:?}", timeout);

            self.adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(|e| TransportError::ConnectionFailed(format!("Scan failed: {}", e)))?;
            tokio::time::sleep(timeout).await;
            self.adapter.stop_scan().await?;

            let mut devices = Vec::new();
            for peripheral in self.adapter.peripherals().await? {
                let props = match peripheral.properties().await {
                    Ok(Some(props)) => props,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Failed to read peripheral properties: {}", e);
                        continue;
                    }
                };

                let address = props.address.to_string();
                devices.push(DiscoveredDevice {
                    address: address.clone(),
                    name: props.local_name,
                    rssi: props.rssi,
                    link: BleLink::new(self.adapter.clone(), peripheral, address),
                });
            }

            info!("Found {} BLE devices", devices.len());
            Ok(Discovery::new(devices))
        }
    }

    /// Link to one thermostat over the platform BLE stack
    #[derive(Clone)]
    pub struct BleLink {
        adapter: Adapter,
        peripheral: Peripheral,
        address: String,
        write_char: Arc<Mutex<Option<Characteristic>>>,
    }

    impl std::fmt::Debug for BleLink {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("BleLink")
                .field("address", &self.address)
                .finish()
        }
    }

    impl BleLink {
        fn new(adapter: Adapter, peripheral: Peripheral, address: String) -> Self {
            Self {
                adapter,
                peripheral,
                address,
                write_char: Arc::new(Mutex::new(None)),
            }
        }

        fn find_characteristic(&self, uuid: uuid::Uuid) -> Result<Characteristic> {
            self.peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == uuid)
                .ok_or(TransportError::CharacteristicNotFound(uuid))
        }
    }

    #[async_trait]
    impl Link for BleLink {
        fn address(&self) -> String {
            self.address.clone()
        }

        async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>> {
            info!("Connecting to {}", self.address);

            if !self.peripheral.is_connected().await? {
                self.peripheral.connect().await.map_err(|e| {
                    TransportError::ConnectionFailed(format!("Connect failed: {}", e))
                })?;
            }
            self.peripheral.discover_services().await.map_err(|e| {
                TransportError::ConnectionFailed(format!("Service discovery failed: {}", e))
            })?;

            let write_char = self.find_characteristic(WRITE_CHAR_UUID)?;
            let notify_char = self.find_characteristic(NOTIFY_CHAR_UUID)?;

            self.peripheral.subscribe(&notify_char).await.map_err(|e| {
                TransportError::ConnectionFailed(format!("Subscribe failed: {}", e))
            })?;

            let mut notifications = self.peripheral.notifications().await?;
            let mut central_events = self.adapter.events().await?;
            let peripheral_id = self.peripheral.id();

            *self.write_char.lock() = Some(write_char);

            let (tx, rx) = mpsc::channel(100);
            let _ = tx.try_send(TransportEvent::Connected);

            let write_char = Arc::clone(&self.write_char);
            let address = self.address.clone();
            tokio::spawn(async move {
                let reason = loop {
                    tokio::select! {
                        notification = notifications.next() => match notification {
                            Some(n) if n.uuid == NOTIFY_CHAR_UUID => {
                                let chunk = Bytes::from(n.value);
                                if tx.send(TransportEvent::Data(chunk)).await.is_err() {
                                    return;
                                }
                            }
                            Some(_) => {}
                            None => break Some("notification stream closed".to_string()),
                        },
                        event = central_events.next() => match event {
                            Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                                break None;
                            }
                            Some(_) => {}
                            None => break Some("adapter event stream closed".to_string()),
                        },
                    }
                };

                info!("Disconnected {}", address);
                *write_char.lock() = None;
                let _ = tx.send(TransportEvent::Disconnected { reason }).await;
            });

            info!("Connected to {}", self.address);
            Ok(rx)
        }

        async fn write(&self, chunk: Bytes) -> Result<()> {
            let characteristic = self
                .write_char
                .lock()
                .clone()
                .ok_or(TransportError::NotConnected)?;

            self.peripheral
                .write(&characteristic, &chunk, WriteType::WithoutResponse)
                .await
                .map_err(|e| TransportError::SendFailed(format!("BLE write failed: {}", e)))?;

            debug!("BLE sent {} bytes", chunk.len());
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.write_char.lock() = None;
            if let Ok(notify_char) = self.find_characteristic(NOTIFY_CHAR_UUID) {
                if let Err(e) = self.peripheral.unsubscribe(&notify_char).await {
                    debug!("Unsubscribe failed: {}", e);
                }
            }
            self.peripheral
                .disconnect()
                .await
                .map_err(|e| TransportError::Other(format!("Disconnect failed: {}", e)))
        }

        async fn read_attributes(&self) -> Result<Vec<Attribute>> {
            let mut attributes = Vec::new();

            for characteristic in self.peripheral.characteristics() {
                if !characteristic.properties.contains(CharPropFlags::READ) {
                    continue;
                }

                match self.peripheral.read(&characteristic).await {
                    Ok(value) => {
                        let name = characteristic_name(&characteristic.uuid)
                            .map(str::to_string)
                            .unwrap_or_else(|| characteristic.uuid.to_string());
                        debug!(
                            "[Characteristic] {} ({}): {} bytes",
                            characteristic.uuid,
                            name,
                            value.len()
                        );
                        attributes.push(Attribute::new(characteristic.uuid, name, value));
                    }
                    Err(e) => error!("Failed to read {}: {}", characteristic.uuid, e),
                }
            }

            Ok(attributes)
        }
    }
}

// Stub implementation when the BLE feature is disabled
#[cfg(not(feature = "ble"))]
mod stub {
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::error::{Result, TransportError};
    use crate::traits::{Attribute, Discovery, Link, TransportEvent};

    pub struct BleScanner;

    impl BleScanner {
        pub async fn new(_adapter_name: Option<&str>) -> Result<Self> {
            Err(TransportError::ConnectionFailed(
                "BLE feature not enabled. Compile with --features ble".into(),
            ))
        }

        pub async fn discover(&self, _timeout: Duration) -> Result<Discovery<BleLink>> {
            Ok(Discovery::default())
        }
    }

    /// Never constructed without the `ble` feature
    #[derive(Debug, Clone)]
    pub enum BleLink {}

    #[async_trait]
    impl Link for BleLink {
        fn address(&self) -> String {
            match *self {}
        }

        async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>> {
            match *self {}
        }

        async fn write(&self, _chunk: Bytes) -> Result<()> {
            match *self {}
        }

        async fn disconnect(&self) -> Result<()> {
            match *self {}
        }

        async fn read_attributes(&self) -> Result<Vec<Attribute>> {
            match *self {}
        }
    }
}
