//! Zapcli - Operator Tool for the Zapline Actuator Bus
//!
//! Command-line access to the RS485 actuator bus: scan for live slaves,
//! read actuator status, issue motion commands, and inspect bus counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use zapline_comlink::{PortConfig, SerialChannel};
use zapline_drivers::MightyZap;
use zapline_protocols::modbus::ModbusRtuMaster;

/// Bus configuration loaded from YAML and `ZAPLINE_`-prefixed environment
/// variables
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZaplineConfig {
    #[serde(default)]
    bus: PortConfig,

    #[serde(default = "default_response_timeout_ms")]
    response_timeout_ms: u64,

    /// Slave ids probed by `scan` and `stats`
    #[serde(default = "default_actuator_ids")]
    actuator_ids: Vec<u8>,
}

impl Default for ZaplineConfig {
    fn default() -> Self {
        Self {
            bus: PortConfig::default(),
            response_timeout_ms: default_response_timeout_ms(),
            actuator_ids: default_actuator_ids(),
        }
    }
}

fn default_response_timeout_ms() -> u64 {
    100
}

fn default_actuator_ids() -> Vec<u8> {
    (1..=10).collect()
}

fn load_config(path: Option<&Path>) -> Result<ZaplineConfig> {
    let mut figment = Figment::from(Serialized::defaults(ZaplineConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(Env::prefixed("ZAPLINE_").split("__"))
        .extract()
        .context("invalid configuration")
}

#[derive(Parser)]
#[command(name = "zapcli", about = "Operator tool for the Zapline actuator bus", version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging (includes TX/RX hex dumps)
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the configured slave ids and list responding actuators
    Scan,
    /// Show one actuator's position, current, voltage and motion state
    Status { id: u8 },
    /// Command a goal position (optionally with speed and current)
    Move {
        id: u8,
        position: u16,
        #[arg(long)]
        speed: Option<u16>,
        #[arg(long)]
        current: Option<u16>,
    },
    /// Set the actuator LED state (0=off, 1=on)
    Led { id: u8, state: u8 },
    /// Probe the bus, then print the transaction counters as JSON
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    info!(
        "opening bus {} @{}baud",
        config.bus.port, config.bus.baud_rate
    );

    let channel = Arc::new(
        SerialChannel::open(&config.bus)
            .await
            .with_context(|| format!("cannot open bus {}", config.bus.port))?,
    );
    let master = Arc::new(ModbusRtuMaster::with_timeout(
        channel,
        Duration::from_millis(config.response_timeout_ms),
    ));

    match cli.command {
        Command::Scan => scan(&master, &config.actuator_ids).await?,
        Command::Status { id } => status(&master, id).await?,
        Command::Move {
            id,
            position,
            speed,
            current,
        } => move_actuator(&master, id, position, speed, current).await?,
        Command::Led { id, state } => {
            let driver = MightyZap::new(master.clone(), id)?;
            driver.set_led(state).await?;
            println!("{} LED on actuator {id} set to {state}", "✓".green());
        },
        Command::Stats => {
            scan(&master, &config.actuator_ids).await?;
            let snapshot = master.stats();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        },
    }

    Ok(())
}

async fn scan(master: &Arc<ModbusRtuMaster>, ids: &[u8]) -> Result<()> {
    println!("Scanning {} slave ids...", ids.len());
    let mut found = 0;

    for &id in ids {
        let driver = MightyZap::new(master.clone(), id)?;
        match driver.get_model().await {
            Ok(model) => {
                found += 1;
                println!(
                    "  {} id {:3}  model 0x{model:04X}",
                    "✓".green(),
                    id.to_string().bold()
                );
            },
            Err(e) => {
                println!("  {} id {:3}  {}", "-".dimmed(), id, e.to_string().dimmed());
            },
        }
    }

    if found == 0 {
        println!("{}", "No actuators responded.".yellow());
    } else {
        println!("{found} actuator(s) online.");
    }
    Ok(())
}

async fn status(master: &Arc<ModbusRtuMaster>, id: u8) -> Result<()> {
    let driver = MightyZap::new(master.clone(), id)?;
    let model = driver.get_model().await?;
    let status = driver.get_status().await?;

    println!("Actuator {id} (model 0x{model:04X})");
    println!("  position : {}", status.position);
    println!("  current  : {} mA", status.current);
    println!(
        "  voltage  : {}.{} V",
        status.voltage / 10,
        status.voltage % 10
    );
    println!(
        "  moving   : {}",
        if status.moving {
            "yes".green()
        } else {
            "no".dimmed()
        }
    );
    Ok(())
}

async fn move_actuator(
    master: &Arc<ModbusRtuMaster>,
    id: u8,
    position: u16,
    speed: Option<u16>,
    current: Option<u16>,
) -> Result<()> {
    let mut driver = MightyZap::new(master.clone(), id)?;
    driver.set_force_enable(true).await?;

    match (speed, current) {
        (None, None) => driver.set_position(position).await?,
        (speed, current) => {
            driver
                .set_goal(
                    position,
                    speed.unwrap_or(zapline_drivers::DEFAULT_SPEED_LIMIT),
                    current.unwrap_or(zapline_drivers::DEFAULT_CURRENT_LIMIT),
                )
                .await?
        },
    }

    println!("{} actuator {id} commanded to {position}", "✓".green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = load_config(None).expect("defaults should load");
        assert_eq!(config.response_timeout_ms, 100);
        assert_eq!(config.actuator_ids, (1..=10).collect::<Vec<_>>());
        assert_eq!(config.bus.baud_rate, 57600);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "bus:\n  port: /dev/ttyAMA2\n  baud_rate: 115200\nresponse_timeout_ms: 250\nactuator_ids: [1, 2, 3]"
        )
        .expect("write yaml");

        let config = load_config(Some(file.path())).expect("config should load");
        assert_eq!(config.bus.port, "/dev/ttyAMA2");
        assert_eq!(config.bus.baud_rate, 115200);
        assert_eq!(config.response_timeout_ms, 250);
        assert_eq!(config.actuator_ids, vec![1, 2, 3]);
        // Untouched fields keep their defaults
        assert_eq!(config.bus.parity, "None");
    }
}
