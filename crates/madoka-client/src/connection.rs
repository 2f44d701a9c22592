//! Connection manager
//!
//! Owns the link to one thermostat: device selection, connect with retry,
//! notification dispatch into the chunk assembler, disconnect detection with
//! automatic reconnection, and the chunked `send` path.

use bytes::Bytes;
use madoka_core::{envelope, split_into_chunks, ChunkAssembler, Reassembly};
use madoka_transport::{Discovery, Link, TransportEvent};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{ClientError, Result};
use crate::ledger::{PendingResponse, RequestLedger};

/// Lifecycle of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The device was not found during discovery. Terminal.
    Aborted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Connection to one thermostat.
///
/// Cheap to clone; all clones share the same link, ledger and state.
pub struct Connection<L: Link> {
    inner: Arc<Inner<L>>,
}

impl<L: Link> Clone for Connection<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<L: Link> {
    address: String,
    config: ConnectionConfig,
    state: watch::Sender<ConnectionState>,
    link: RwLock<Option<L>>,
    name: RwLock<String>,
    ledger: RequestLedger,
    assembler: Mutex<ChunkAssembler>,
    info: RwLock<Option<BTreeMap<String, String>>>,
    /// Held for the whole chunk sequence of one outgoing message
    write_lock: AsyncMutex<()>,
    /// Dispatch and reconnect tasks, aborted on stop
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl<L: Link> Connection<L> {
    pub fn new(address: &str, config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                address: address.to_string(),
                config,
                state,
                link: RwLock::new(None),
                name: RwLock::new(address.to_string()),
                ledger: RequestLedger::new(),
                assembler: Mutex::new(ChunkAssembler::new()),
                info: RwLock::new(None),
                write_lock: AsyncMutex::new(()),
                tasks: Mutex::new(Vec::new()),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Advertised device name, or the address until the device is selected
    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.inner.ledger.pending_count()
    }

    /// Select the device from `discovery` and connect, retrying until the
    /// link is up.
    ///
    /// Fails with [`ClientError::Aborted`] if the address is not part of the
    /// discovery result; the connection then stays aborted.
    pub async fn start(&self, discovery: &Discovery<L>) -> Result<()> {
        info!("Starting connection manager on {}", self.inner.address);

        if self.state() == ConnectionState::Aborted {
            return Err(self.inner.aborted());
        }
        self.inner.stopped.store(false, Ordering::SeqCst);

        if self.inner.link.read().is_none() {
            self.inner.select_device(discovery)?;
        }

        Inner::connect_loop(&self.inner).await
    }

    /// Disconnect and cancel everything in flight
    pub async fn stop(&self) {
        info!("Stopping connection to {}", self.inner.address);
        self.inner.stopped.store(true, Ordering::SeqCst);

        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.ledger.cancel_all();
        self.inner.assembler.lock().reset();

        let was_linked = matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Connecting
        );
        if self.state() != ConnectionState::Aborted {
            self.inner.set_state(ConnectionState::Disconnected);
        }

        let link = self.inner.link.read().clone();
        if let (true, Some(link)) = (was_linked, link) {
            if let Err(e) = link.disconnect().await {
                debug!("Disconnect of {} failed: {}", self.inner.address, e);
            }
        }
    }

    /// Wait until the connection is up.
    ///
    /// Returns early with [`ClientError::Aborted`] if it never will be.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Aborted => return Err(self.inner.aborted()),
                _ => {}
            }
            rx.changed().await.map_err(|_| ClientError::NotConnected)?;
        }
    }

    /// Frame, chunk and write a request.
    ///
    /// The returned handle is already cancelled if the connection was not up,
    /// or dropped out of `Connected` while the chunks were being written.
    /// Exhausting the write retries while still connected is an error.
    ///
    /// Messages never interleave on the wire: a send waits for the one in
    /// progress to write its last chunk.
    pub async fn send(&self, command_id: u16, parameters: &[u8]) -> Result<PendingResponse> {
        let envelope = envelope::frame(command_id, parameters)?;

        let _writing = self.inner.write_lock.lock().await;

        // Registered under the write lock, before the first write, so ledger
        // order matches wire order and a fast response finds its handle
        let pending = self.inner.ledger.register(command_id);

        let link = match (self.state(), self.inner.link.read().clone()) {
            (ConnectionState::Connected, Some(link)) => link,
            (state, _) => {
                debug!("Command {} not sent, connection is {}", command_id, state);
                self.inner.ledger.cancel(command_id, pending.ticket());
                return Ok(pending);
            }
        };

        debug!("Sending command {}: {:02x?}", command_id, envelope.as_ref());

        let chunks = split_into_chunks(&envelope);
        let total = chunks.len();
        let attempts = self.inner.config.write_attempts.max(1);
        let mut sent = 0;

        'chunks: for (index, chunk) in chunks.into_iter().enumerate() {
            for attempt in 1..=attempts {
                if !self.is_connected() {
                    break 'chunks;
                }

                match link.write(chunk.clone()).await {
                    Ok(()) => {
                        debug!(
                            "Command {}: chunk {}/{} sent ({} bytes)",
                            command_id,
                            index + 1,
                            total,
                            chunk.len()
                        );
                        sent += 1;
                        continue 'chunks;
                    }
                    Err(e) => {
                        debug!(
                            "Write of chunk {} failed, attempt {}/{}: {}",
                            index, attempt, attempts, e
                        );
                        if attempt < attempts {
                            tokio::time::sleep(self.inner.config.write_retry_delay()).await;
                        }
                    }
                }
            }
            break;
        }

        if sent != total {
            self.inner.ledger.cancel(command_id, pending.ticket());
            if self.is_connected() {
                return Err(ClientError::SendFailed(format!(
                    "command {}: only {} of {} chunks could be written",
                    command_id, sent, total
                )));
            }
            debug!("Command {} abandoned, connection lost while sending", command_id);
        }

        Ok(pending)
    }

    /// Wait for the response to a sent request.
    ///
    /// A configured response timeout removes the handle from the ledger so a
    /// late response is not mistaken for the answer to a later request.
    pub async fn await_response(&self, pending: PendingResponse) -> Result<Bytes> {
        let command_id = pending.command_id();
        let ticket = pending.ticket();

        let result = match self.inner.config.response_timeout() {
            Some(limit) => match tokio::time::timeout(limit, pending.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    self.inner.ledger.cancel(command_id, ticket);
                    warn!("Command {} timed out after {:?}", command_id, limit);
                    return Err(ClientError::Timeout);
                }
            },
            None => pending.wait().await,
        };

        match result {
            Err(ClientError::Cancelled) => Err(match self.state() {
                ConnectionState::Aborted => self.inner.aborted(),
                ConnectionState::Connected => ClientError::Cancelled,
                _ => ClientError::NotConnected,
            }),
            other => other,
        }
    }

    /// Send a request and wait for its response envelope
    pub async fn request(&self, command_id: u16, parameters: &[u8]) -> Result<Bytes> {
        if self.state() == ConnectionState::Aborted {
            return Err(self.inner.aborted());
        }
        let pending = self.send(command_id, parameters).await?;
        let response = self.await_response(pending).await?;
        debug!(
            "Command {} response received ({} bytes)",
            command_id,
            response.len()
        );
        Ok(response)
    }

    /// Device information from the readable characteristics.
    ///
    /// Read once per connection instance and cached afterwards.
    pub async fn read_info(&self) -> Result<BTreeMap<String, String>> {
        if let Some(info) = self.inner.info.read().clone() {
            return Ok(info);
        }

        let link = match (self.state(), self.inner.link.read().clone()) {
            (ConnectionState::Connected, Some(link)) => link,
            _ => return Err(ClientError::NotConnected),
        };

        let info: BTreeMap<String, String> = link
            .read_attributes()
            .await?
            .into_iter()
            .map(|attribute| {
                let value = attribute.display_value();
                debug!("[Info] {}: {}", attribute.name, value);
                (attribute.name, value)
            })
            .collect();

        *self.inner.info.write() = Some(info.clone());
        Ok(info)
    }
}

impl<L: Link> Inner<L> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection {}: {} -> {}", self.address, previous, state);
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn aborted(&self) -> ClientError {
        ClientError::Aborted(format!(
            "could not find bluetooth device for the address {}",
            self.address
        ))
    }

    fn select_device(&self, discovery: &Discovery<L>) -> Result<()> {
        match discovery.find(&self.address) {
            Some(device) => {
                *self.link.write() = Some(device.link.clone());
                if let Some(name) = &device.name {
                    *self.name.write() = name.clone();
                }
                debug!("Selected device {} ({})", device.address, self.name.read());
                Ok(())
            }
            None => {
                self.set_state(ConnectionState::Aborted);
                error!(
                    "Could not find bluetooth device for the address {}. Please follow the instructions on device pairing.",
                    self.address
                );
                Err(self.aborted())
            }
        }
    }

    async fn connect_loop(self: &Arc<Self>) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Err(ClientError::Cancelled);
            }

            let link = self.link.read().clone().ok_or(ClientError::NotConnected)?;
            match link.connect().await {
                Ok(events) => {
                    if self.stopped.load(Ordering::SeqCst) {
                        let _ = link.disconnect().await;
                        return Err(ClientError::Cancelled);
                    }
                    self.on_connected(events);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", self.address, e);
                    debug!("Reconnecting in {:?}", self.config.connect_backoff());
                    tokio::time::sleep(self.config.connect_backoff()).await;
                }
            }
        }
    }

    fn on_connected(self: &Arc<Self>, events: mpsc::Receiver<TransportEvent>) {
        self.assembler.lock().reset();
        self.set_state(ConnectionState::Connected);
        info!("Connected to {}", self.address);

        let inner = Arc::clone(self);
        self.track(tokio::spawn(async move { inner.dispatch(events).await }));
    }

    async fn dispatch(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        let reason = loop {
            match events.recv().await {
                Some(TransportEvent::Data(chunk)) => self.on_chunk(&chunk),
                Some(TransportEvent::Connected) => {}
                Some(TransportEvent::Error(e)) => warn!("Link error on {}: {}", self.address, e),
                Some(TransportEvent::Disconnected { reason }) => break reason,
                None => break Some("event stream closed".to_string()),
            }
        };

        self.on_link_lost(reason);
    }

    fn on_chunk(&self, chunk: &[u8]) {
        debug!("Chunk received: {:02x?}", chunk);
        let events = self.assembler.lock().push(chunk);

        for event in events {
            match event {
                Reassembly::Rebuilt(response) => match envelope::command_id(&response) {
                    Some(command_id) => {
                        self.ledger.resolve(command_id, response);
                    }
                    None => debug!("Ignoring rebuilt message of {} bytes", response.len()),
                },
                Reassembly::Failed(partial) => match envelope::command_id(&partial) {
                    Some(command_id) => {
                        warn!("Response to command {} could not be rebuilt", command_id);
                        self.ledger.fail(command_id);
                    }
                    None => debug!("Discarded {} bytes of an unknown message", partial.len()),
                },
            }
        }
    }

    fn on_link_lost(self: &Arc<Self>, reason: Option<String>) {
        self.ledger.cancel_all();
        self.assembler.lock().reset();

        if self.stopped.load(Ordering::SeqCst) || self.state() == ConnectionState::Aborted {
            return;
        }

        self.set_state(ConnectionState::Disconnected);
        match reason {
            Some(reason) => info!("Disconnected {}: {}", self.address, reason),
            None => info!("Disconnected {}!", self.address),
        }

        let inner = Arc::clone(self);
        self.track(tokio::spawn(async move {
            if let Err(e) = inner.connect_loop().await {
                debug!("Reconnect of {} ended: {}", inner.address, e);
            }
        }));
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}
