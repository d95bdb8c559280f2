//! Command-line interface for the Telebridge device bridge.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use telebridge_bridge::{CommandOutcome, DeviceBridge};
use telebridge_core::config::env_vars;
use telebridge_core::BridgeConfig;

/// Telebridge - synchronous access to MQTT devices.
#[derive(Parser, Debug)]
#[command(name = "telebridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file. Environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API.
    Serve {
        /// Host to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one periodic sync window and print the report.
    Sync {
        /// Window length in seconds; defaults to the configured cron window.
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// List known devices.
    Devices {
        /// Only devices reporting online.
        #[arg(long)]
        online_only: bool,
    },
    /// Show the latest state of one device.
    Status {
        device_id: String,
    },
    /// Send a command and wait for the device to report back.
    Send {
        device_id: String,
        action: String,
        /// Command value; parsed as JSON, otherwise sent as a string.
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            run_server(config).await
        }
        Command::Sync { duration } => {
            if let Some(secs) = duration {
                anyhow::ensure!(secs > 0, "--duration must be positive");
                config.sync.cron_window_secs = secs;
            }
            let bridge = DeviceBridge::from_config(&config);
            let report = bridge.run_cron_sync().await?;
            print_json(&report)
        }
        Command::Devices { online_only } => {
            let bridge = DeviceBridge::from_config(&config);
            let devices = bridge.list_devices(online_only).await?;
            print_json(&devices)
        }
        Command::Status { device_id } => {
            let bridge = DeviceBridge::from_config(&config);
            let record = bridge.get_device_status(&device_id).await?;
            print_json(&record)
        }
        Command::Send {
            device_id,
            action,
            value,
        } => {
            let bridge = DeviceBridge::from_config(&config);
            let outcome = bridge
                .send_command(&device_id, &action, parse_value(value))
                .await?;
            report_outcome(&outcome, bridge.timing().ack_timeout)
        }
    }
}

fn init_logging(verbose: bool) {
    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_directive = if verbose { "telebridge=debug" } else { "telebridge=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Defaults, then the optional file, then the environment.
fn load_config(path: Option<&std::path::Path>) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config
        .apply_env(|name| std::env::var(name).ok())
        .context("Invalid environment configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run_server(config: BridgeConfig) -> Result<()> {
    let bind: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.api.host, config.api.port
            )
        })?;

    tracing::info!(
        broker = %config.mqtt.broker_addr(),
        data_topic = %config.topics.data_topic,
        control_root = %config.topics.control_root,
        "Starting Telebridge"
    );
    let bridge = DeviceBridge::from_config(&config);
    telebridge_api::run(bind, &config.api.prefix, bridge).await
}

/// JSON when it parses as JSON, a plain string otherwise.
fn parse_value(raw: Option<String>) -> Value {
    match raw {
        None => Value::Null,
        Some(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    }
}

fn report_outcome(outcome: &CommandOutcome, ack_timeout: Duration) -> Result<()> {
    let command = outcome.command();
    match outcome {
        CommandOutcome::Accepted { record, .. } => {
            println!("Command {} accepted by {}", command.command_id, command.device_id);
            print_json(record)
        }
        CommandOutcome::Rejected { record, .. } => {
            print_json(record)?;
            anyhow::bail!(
                "Device '{}' rejected command {}",
                command.device_id,
                command.command_id
            )
        }
        CommandOutcome::Timeout { .. } => anyhow::bail!(
            "Command {} sent, but device '{}' did not report back within {} ms",
            command.command_id,
            command.device_id,
            ack_timeout.as_millis()
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let args = Args::try_parse_from(["telebridge", "send", "lamp1", "set_brightness", "40"]).unwrap();
        match args.command {
            Command::Send {
                device_id,
                action,
                value,
            } => {
                assert_eq!(device_id, "lamp1");
                assert_eq!(action, "set_brightness");
                assert_eq!(parse_value(value), json!(40));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(None), Value::Null);
        assert_eq!(parse_value(Some("true".into())), json!(true));
        assert_eq!(parse_value(Some(r#"{"level":3}"#.into())), json!({"level": 3}));
        assert_eq!(parse_value(Some("warm white".into())), json!("warm white"));
    }

    #[test]
    fn test_global_config_flag() {
        let args = Args::try_parse_from(["telebridge", "status", "lamp1", "--config", "bridge.toml", "-v"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("bridge.toml")));
        assert!(args.verbose);
    }
}
