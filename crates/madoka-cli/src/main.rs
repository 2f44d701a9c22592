//! Madoka CLI - Command-line interface for Daikin BRC1H thermostats
//!
//! Every command prints its result as JSON on stdout; logs go to stderr or
//! to the file given with `--log-output`.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use madoka_client::ThermostatBuilder;
use madoka_core::features::{FanSpeed, OperationMode};
use madoka_transport::{force_disconnect, BleScanner};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use config::FileConfig;

/// Control Daikin BRC1H ("Madoka") thermostats over Bluetooth
#[derive(Parser, Debug)]
#[command(name = "madoka")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bluetooth MAC address of the thermostat
    #[arg(short, long, global = true, env = "MADOKA_ADDRESS")]
    address: Option<String>,

    /// Bluetooth adapter used for the connection
    #[arg(short = 'd', long, global = true, default_value = "hci0")]
    adapter: String,

    /// Disconnect the device through BlueZ before scanning so it advertises
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    force_disconnect: bool,

    /// Bluetooth scan duration in seconds
    #[arg(short = 't', long, global = true, default_value_t = 5)]
    discovery_timeout: u64,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Write logs to this file instead of stderr
    #[arg(short = 'o', long, global = true)]
    log_output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Get the status of every thermostat feature
    GetStatus,

    /// Get the device information
    GetInfo,

    /// List the Bluetooth devices in range
    Scan,

    /// Get cooling and heating fan speeds
    GetFanSpeed,

    /// Set cooling and heating fan speeds (AUTO, LOW, MID, HIGH)
    SetFanSpeed { cooling: FanSpeed, heating: FanSpeed },

    /// Get the operation mode
    GetOperationMode,

    /// Set the operation mode (FAN, DRY, AUTO, COOL, HEAT, VENTILATION)
    SetOperationMode { operation_mode: OperationMode },

    /// Check if the HVAC is turned on
    GetPowerState,

    /// Turn the HVAC on or off
    SetPowerState {
        #[arg(value_enum, ignore_case = true)]
        power_state: PowerArg,
    },

    /// Get indoor and outdoor temperatures
    GetTemperatures,

    /// Get cooling and heating target temperatures in °C
    GetSetPoint,

    /// Set cooling and heating target temperatures in °C (clamped to 0-30)
    #[command(allow_negative_numbers = true)]
    SetSetPoint { cooling: i16, heating: i16 },

    /// Get the state of the clean filter indicator
    GetCleanFilterIndicator,

    /// Reset the clean filter timer
    ResetCleanFilterTimer,

    /// Bridge the thermostat to an MQTT broker until interrupted
    Mqtt {
        /// MQTT broker host
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// MQTT broker port
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, env = "MADOKA_MQTT_USERNAME")]
        username: Option<String>,

        #[arg(long, env = "MADOKA_MQTT_PASSWORD")]
        password: Option<String>,

        /// Topic prefix
        #[arg(long)]
        root_topic: Option<String>,

        /// Publish directly below the root topic, without the device address
        #[arg(long)]
        root_topic_only: bool,

        /// Seconds between status updates
        #[arg(long)]
        update_interval: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerArg {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs, cli.log_output.as_deref())?;

    let config = FileConfig::load(cli.config.as_deref())?;

    let scanner = BleScanner::new(Some(&cli.adapter))
        .await
        .with_context(|| format!("Failed to open Bluetooth adapter {}", cli.adapter))?;
    let timeout = Duration::from_secs(cli.discovery_timeout);

    if let Commands::Scan = cli.command {
        let discovery = scanner.discover(timeout).await.context("Scan failed")?;
        return print_json(&commands::scan_report(&discovery));
    }

    let address = cli
        .address
        .clone()
        .context("--address is required for this command")?;

    if cli.force_disconnect {
        if let Err(e) = force_disconnect(&address).await {
            warn!("Forced disconnect failed: {}", e);
        }
    }

    let discovery = scanner.discover(timeout).await.context("Scan failed")?;
    info!("Discovered {} devices", discovery.len());

    let thermostat = Arc::new(
        ThermostatBuilder::new(&address)
            .config(config.connection.clone())
            .connect(&discovery)
            .await
            .with_context(|| format!("Could not connect to {}", address))?,
    );

    let result = commands::execute(&thermostat, &cli.command, &discovery, &config).await;
    thermostat.stop().await;

    if let Some(output) = result? {
        print_json(&output)?;
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn setup_logging(level: &str, json: bool, output: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    let writer = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact().with_writer(writer))
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_fan_speed() {
        let cli = Cli::try_parse_from(["madoka", "-a", "AA:BB:CC:DD:EE:FF", "set-fan-speed", "LOW", "mid"])
            .unwrap();

        assert_eq!(cli.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(matches!(
            cli.command,
            Commands::SetFanSpeed {
                cooling: FanSpeed::Low,
                heating: FanSpeed::Mid
            }
        ));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "madoka",
            "get-status",
            "--address",
            "AA:BB:CC:DD:EE:FF",
            "--force-disconnect",
            "false",
            "-t",
            "10",
        ])
        .unwrap();

        assert!(!cli.force_disconnect);
        assert_eq!(cli.discovery_timeout, 10);
        assert_eq!(cli.adapter, "hci0");
    }

    #[test]
    fn test_parse_set_point_accepts_negative() {
        let cli = Cli::try_parse_from(["madoka", "set-set-point", "-5", "40"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::SetSetPoint {
                cooling: -5,
                heating: 40
            }
        ));
    }

    #[test]
    fn test_parse_power_state_case_insensitive() {
        let cli = Cli::try_parse_from(["madoka", "set-power-state", "on"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::SetPowerState {
                power_state: PowerArg::On
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_operation_mode() {
        assert!(Cli::try_parse_from(["madoka", "set-operation-mode", "BOOST"]).is_err());
    }
}
