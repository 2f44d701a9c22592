//! In-memory thermostat
//!
//! Implements [`Link`] without a radio. Written chunks are reassembled with
//! the real [`ChunkAssembler`], answered from a register table keyed by query
//! command id, and the response is notified back in chunks.

use async_trait::async_trait;
use bytes::Bytes;
use madoka_core::{envelope, split_into_chunks, ChunkAssembler, ParameterList, Reassembly};
use madoka_transport::gatt::sig_uuid;
use madoka_transport::{
    Attribute, DiscoveredDevice, Discovery, Link, Result, TransportError, TransportEvent,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Bit that turns a query command id into the matching update command id
pub const UPDATE_FLAG: u16 = 0x4000;

/// A scriptable thermostat
#[derive(Clone)]
pub struct FakeThermostat {
    address: String,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    registers: Mutex<HashMap<u16, ParameterList>>,
    assembler: Mutex<ChunkAssembler>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    writes: Mutex<Vec<Bytes>>,
    requests: Mutex<Vec<Bytes>>,
    attributes: Mutex<Vec<Attribute>>,
    fail_writes: AtomicU32,
    fail_connects: AtomicU32,
    drop_after_writes: AtomicU32,
    write_delay_ms: AtomicU64,
    connects: AtomicU32,
    silent: AtomicBool,
}

impl FakeThermostat {
    /// A thermostat in cooling mode, powered on, with a 24/21 °C set point
    pub fn new(address: &str) -> Self {
        let fake = Self {
            address: address.to_string(),
            shared: Arc::new(Shared::default()),
        };

        fake.set_register(80, ParameterList::new().with(0x20, vec![1]).with(0x21, vec![5]));
        fake.set_register(48, ParameterList::new().with(0x20, vec![3]));
        fake.set_register(32, ParameterList::new().with(0x20, vec![1]));
        fake.set_register(
            64,
            ParameterList::new()
                .with(0x20, vec![0x0c, 0x00])
                .with(0x21, vec![0x0a, 0x80]),
        );
        fake.set_register(
            272,
            ParameterList::new().with(0x40, vec![23]).with(0x41, vec![0xff]),
        );
        fake.set_register(256, ParameterList::new().with(0x62, vec![0]));

        *fake.shared.attributes.lock() = vec![
            Attribute::new(sig_uuid(0x2a24), "Model Number String", &b"BRC1H"[..]),
            Attribute::new(sig_uuid(0x2a26), "Firmware Revision String", &b"1.2.3"[..]),
            Attribute::new(sig_uuid(0x2a23), "System ID", vec![0x12u8, 0xfe, 0x34, 0xff]),
        ];

        fake
    }

    /// Discovery result listing only this device
    pub fn discovery(&self) -> Discovery<FakeThermostat> {
        Discovery::new(vec![DiscoveredDevice {
            address: self.address.clone(),
            name: Some("BRC1H".to_string()),
            rssi: Some(-55),
            link: self.clone(),
        }])
    }

    /// Replace the stored answer to a query command
    pub fn set_register(&self, query_command: u16, values: ParameterList) {
        self.shared.registers.lock().insert(query_command, values);
    }

    pub fn register(&self, query_command: u16) -> Option<ParameterList> {
        self.shared.registers.lock().get(&query_command).cloned()
    }

    /// Fail the next `count` chunk writes
    pub fn fail_next_writes(&self, count: u32) {
        self.shared.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` connection attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Drop the link right after the next `count` successful chunk writes
    pub fn drop_link_after_writes(&self, count: u32) {
        self.shared.drop_after_writes.store(count, Ordering::SeqCst);
    }

    /// Make every chunk write take `delay`
    pub fn set_write_delay(&self, delay: Duration) {
        self.shared
            .write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Stop answering requests
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::SeqCst);
    }

    /// Chunks written so far
    pub fn writes(&self) -> Vec<Bytes> {
        self.shared.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.shared.writes.lock().len()
    }

    /// Request envelopes rebuilt from the written chunks
    pub fn requests(&self) -> Vec<Bytes> {
        self.shared.requests.lock().clone()
    }

    /// Successful connection attempts
    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn is_linked(&self) -> bool {
        self.shared.events.lock().is_some()
    }

    /// Simulate the device going out of range
    pub async fn drop_link(&self) {
        let events = self.shared.events.lock().take();
        if let Some(events) = events {
            let _ = events
                .send(TransportEvent::Disconnected {
                    reason: Some("link lost".to_string()),
                })
                .await;
        }
    }

    /// Deliver a raw notification
    pub async fn inject(&self, chunk: impl Into<Bytes>) {
        let events = self.shared.events.lock().clone();
        if let Some(events) = events {
            let _ = events.send(TransportEvent::Data(chunk.into())).await;
        }
    }

    /// Deliver an envelope, chunked
    pub async fn notify_envelope(&self, envelope: &[u8]) {
        for chunk in split_into_chunks(envelope) {
            self.inject(chunk).await;
        }
    }

    fn answer(&self, request: &[u8]) -> Option<Bytes> {
        let command_id = envelope::command_id(request)?;
        let values = match ParameterList::decode(request) {
            Ok(values) => values,
            Err(e) => {
                debug!("Fake thermostat ignoring malformed request: {}", e);
                return None;
            }
        };

        let mut registers = self.shared.registers.lock();
        let reply = if command_id & UPDATE_FLAG != 0 {
            // Echo the state from before the update, then apply it
            let query_command = command_id & !UPDATE_FLAG;
            let previous = registers.get(&query_command).cloned();
            registers.insert(query_command, values.clone());
            previous.unwrap_or(values)
        } else {
            registers.get(&command_id).cloned().unwrap_or_default()
        };
        drop(registers);

        let parameters = reply.encode().ok()?;
        envelope::frame(command_id, &parameters).ok()
    }
}

#[async_trait]
impl Link for FakeThermostat {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn connect(&self) -> Result<mpsc::Receiver<TransportEvent>> {
        let failures = self.shared.fail_connects.load(Ordering::SeqCst);
        if failures > 0 {
            self.shared.fail_connects.store(failures - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectionFailed("injected failure".into()));
        }

        let (tx, rx) = mpsc::channel(100);
        let _ = tx.try_send(TransportEvent::Connected);
        *self.shared.events.lock() = Some(tx);
        self.shared.assembler.lock().reset();
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn write(&self, chunk: Bytes) -> Result<()> {
        let delay = self.shared.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let events = self
            .shared
            .events
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let failures = self.shared.fail_writes.load(Ordering::SeqCst);
        if failures > 0 {
            self.shared.fail_writes.store(failures - 1, Ordering::SeqCst);
            return Err(TransportError::SendFailed("injected failure".into()));
        }

        self.shared.writes.lock().push(chunk.clone());

        let rebuilt = self.shared.assembler.lock().push(&chunk);
        for event in rebuilt {
            let Reassembly::Rebuilt(request) = event else {
                continue;
            };
            self.shared.requests.lock().push(request.clone());

            if self.shared.silent.load(Ordering::SeqCst) {
                continue;
            }
            if let Some(response) = self.answer(&request) {
                for chunk in split_into_chunks(&response) {
                    let _ = events.send(TransportEvent::Data(chunk)).await;
                }
            }
        }

        let remaining = self.shared.drop_after_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.shared.drop_after_writes.store(remaining - 1, Ordering::SeqCst);
            if remaining == 1 {
                self.drop_link().await;
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let events = self.shared.events.lock().take();
        if let Some(events) = events {
            let _ = events
                .send(TransportEvent::Disconnected {
                    reason: Some("local disconnect".to_string()),
                })
                .await;
        }
        Ok(())
    }

    async fn read_attributes(&self) -> Result<Vec<Attribute>> {
        if !self.is_linked() {
            return Err(TransportError::NotConnected);
        }
        Ok(self.shared.attributes.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_echoes_previous_state() {
        let fake = FakeThermostat::new("AA:BB:CC:DD:EE:FF");
        let mut events = fake.connect().await.unwrap();
        assert!(matches!(events.recv().await, Some(TransportEvent::Connected)));

        // Set operation mode to HEAT
        let request = envelope::frame(48 | UPDATE_FLAG, &[0x20, 0x01, 0x04]).unwrap();
        for chunk in split_into_chunks(&request) {
            fake.write(chunk).await.unwrap();
        }

        match events.recv().await {
            Some(TransportEvent::Data(chunk)) => {
                assert_eq!(chunk.as_ref(), &[0x00, 0x07, 0x00, 0x40, 0x30, 0x20, 0x01, 0x03]);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(fake.register(48).unwrap().get(0x20), Some(&[0x04][..]));
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let fake = FakeThermostat::new("AA:BB:CC:DD:EE:FF");
        assert!(fake.write(Bytes::from_static(&[0x00])).await.is_err());
        assert_eq!(fake.write_count(), 0);
    }
}
