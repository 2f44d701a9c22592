//! MQTT Bridge for Madoka thermostats
//!
//! Topics, relative to the device topic `<root_topic>/<normalized address>`:
//! - `available`: `1` or `0`
//! - `state/get`: aggregated status JSON, published every update interval
//! - `<feature>/set`: commands, see [`crate::commands`]

use madoka_client::{ClientError, Thermostat};
use madoka_transport::{Discovery, Link};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS as MqttQoS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::commands::{apply_command, Command};
use crate::error::{BridgeError, Result};

const AVAILABLE_TOPIC: &str = "available";
const STATE_TOPIC: &str = "state/get";
const BROKER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// MQTT Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttBridgeConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT broker port
    pub broker_port: u16,
    /// Client ID; `madoka_mqtt_<address>` when unset
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prefix of every topic
    pub root_topic: String,
    /// Use the root topic as the device topic, without the address
    pub root_topic_only: bool,
    /// QoS level (0, 1, or 2)
    pub qos: u8,
    /// Keep alive interval in seconds
    pub keep_alive_secs: u16,
    /// Seconds between status refreshes
    pub update_interval_secs: u64,
}

impl Default for MqttBridgeConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: None,
            username: None,
            password: None,
            root_topic: "/madoka".to_string(),
            root_topic_only: false,
            qos: 0,
            keep_alive_secs: 60,
            update_interval_secs: 60,
        }
    }
}

impl MqttBridgeConfig {
    pub fn client_id_for(&self, address: &str) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("madoka_mqtt_{}", address))
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs.max(1))
    }

    /// Parse MQTT QoS level
    fn mqtt_qos(&self) -> MqttQoS {
        match self.qos {
            0 => MqttQoS::AtMostOnce,
            1 => MqttQoS::AtLeastOnce,
            _ => MqttQoS::ExactlyOnce,
        }
    }
}

/// Topic layout of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    device: String,
}

impl DeviceTopics {
    pub fn new(config: &MqttBridgeConfig, address: &str) -> Self {
        let device = if config.root_topic_only {
            config.root_topic.clone()
        } else {
            format!("{}/{}", config.root_topic, normalize(address))
        };
        Self { device }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn available(&self) -> String {
        format!("{}/{}", self.device, AVAILABLE_TOPIC)
    }

    pub fn state(&self) -> String {
        format!("{}/{}", self.device, STATE_TOPIC)
    }

    pub fn command(&self, command: Command) -> String {
        format!("{}/{}/set", self.device, command.topic_name())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        Command::ALL.iter().map(|c| self.command(*c)).collect()
    }

    /// The command a received topic addresses, if any
    pub fn command_for(&self, topic: &str) -> Option<Command> {
        let name = topic
            .strip_prefix(self.device.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")?;
        Command::from_topic_name(name)
    }
}

/// Address characters that would split or break a topic level
fn normalize(address: &str) -> String {
    address.replace([' ', ':', '/'], "_")
}

/// Outcome of one status refresh
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Available(serde_json::Value),
    Unavailable,
}

/// Bridges one thermostat to an MQTT broker
pub struct MqttBridge<L: Link> {
    config: MqttBridgeConfig,
    thermostat: Arc<Thermostat<L>>,
    topics: DeviceTopics,
    reconnect: bool,
}

impl<L: Link> MqttBridge<L> {
    pub fn new(thermostat: Arc<Thermostat<L>>, config: MqttBridgeConfig) -> Self {
        let topics = DeviceTopics::new(&config, thermostat.connection().address());
        Self {
            config,
            thermostat,
            topics,
            reconnect: false,
        }
    }

    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    fn mqtt_options(&self) -> MqttOptions {
        let client_id = self
            .config
            .client_id_for(self.thermostat.connection().address());
        let mut options = MqttOptions::new(
            client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs as u64));

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            options.set_credentials(user, pass);
        }
        options
    }

    /// Run until the thermostat is aborted.
    ///
    /// Connection errors towards the broker are retried by the event loop;
    /// only a terminal device abort ends the bridge.
    pub async fn run(&mut self, discovery: &Discovery<L>) -> Result<()> {
        let (client, eventloop) = AsyncClient::new(self.mqtt_options(), 100);
        info!(
            "MQTT bridge connecting to {}:{} for {}",
            self.config.broker_host,
            self.config.broker_port,
            self.topics.device()
        );

        let events = tokio::spawn(event_loop(
            eventloop,
            client.clone(),
            Arc::clone(&self.thermostat),
            self.topics.clone(),
            self.config.mqtt_qos(),
        ));

        let result = self.update_loop(&client, discovery).await;

        events.abort();
        let _ = client.disconnect().await;
        info!("MQTT bridge stopped");
        result
    }

    async fn update_loop(&mut self, client: &AsyncClient, discovery: &Discovery<L>) -> Result<()> {
        let qos = self.config.mqtt_qos();
        let mut interval = tokio::time::interval(self.config.update_interval());

        loop {
            interval.tick().await;

            match self.refresh_status(discovery).await? {
                Some(StatusUpdate::Available(status)) => {
                    publish(client, &self.topics.available(), qos, "1").await;
                    publish(client, &self.topics.state(), qos, status.to_string()).await;
                }
                Some(StatusUpdate::Unavailable) => {
                    publish(client, &self.topics.available(), qos, "0").await;
                }
                None => {}
            }
        }
    }

    /// Refresh the thermostat, restarting its connection after a failed cycle.
    ///
    /// `None` means nothing should be published this cycle.
    pub async fn refresh_status(&mut self, discovery: &Discovery<L>) -> Result<Option<StatusUpdate>> {
        if self.reconnect {
            info!("Restarting connection to {}", self.thermostat.connection().address());
            self.thermostat.stop().await;
            match self.thermostat.start(discovery).await {
                Ok(()) => self.reconnect = false,
                Err(ClientError::Aborted(reason)) => return Err(BridgeError::Aborted(reason)),
                Err(e) => {
                    warn!("Restart failed: {}", e);
                    return Ok(Some(StatusUpdate::Unavailable));
                }
            }
        }

        match self.thermostat.refresh().await {
            Ok(()) => Ok(Some(StatusUpdate::Available(serde_json::Value::Object(
                self.thermostat.status(),
            )))),
            Err(ClientError::Aborted(reason)) => Err(BridgeError::Aborted(reason)),
            Err(ClientError::Cancelled) => {
                error!("Status refresh cancelled");
                Ok(None)
            }
            Err(ClientError::Protocol(e)) => {
                error!("Status refresh failed: {}", e);
                Ok(None)
            }
            Err(e) => {
                warn!("Thermostat unavailable: {}", e);
                self.reconnect = true;
                Ok(Some(StatusUpdate::Unavailable))
            }
        }
    }
}

async fn publish(client: &AsyncClient, topic: &str, qos: MqttQoS, payload: impl Into<Vec<u8>>) {
    match client.publish(topic, qos, false, payload).await {
        Ok(()) => debug!("MQTT sent to topic: {}", topic),
        Err(e) => warn!("MQTT publish to {} failed: {}", topic, e),
    }
}

async fn event_loop<L: Link>(
    mut eventloop: EventLoop,
    client: AsyncClient,
    thermostat: Arc<Thermostat<L>>,
    topics: DeviceTopics,
    qos: MqttQoS,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected to broker");
                for topic in topics.subscriptions() {
                    match client.try_subscribe(&topic, qos) {
                        Ok(()) => debug!("MQTT subscribed to: {}", topic),
                        Err(e) => error!("MQTT subscribe to {} failed: {}", topic, e),
                    }
                }
                let available = if thermostat.connection().is_connected() { "1" } else { "0" };
                if let Err(e) = client.try_publish(topics.available(), qos, false, available) {
                    warn!("MQTT availability publish failed: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(command) = topics.command_for(&publish.topic) else {
                    continue;
                };
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                debug!("MQTT received: {} ({} bytes)", publish.topic, payload.len());

                let thermostat = Arc::clone(&thermostat);
                tokio::spawn(async move {
                    if let Err(e) = apply_command(&thermostat, command, &payload).await {
                        error!("Could not update {}: {}", command.topic_name(), e);
                    }
                });
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT disconnected from broker");
            }
            Err(e) => {
                error!("MQTT error: {:?}", e);
                tokio::time::sleep(BROKER_RETRY_DELAY).await;
            }
            _ => {}
        }
    }
}
