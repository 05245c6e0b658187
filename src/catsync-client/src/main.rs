// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod latency;
mod mirror;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use catsync_app::init_logging;
use catsync_bus::{mqtt, tcp, ConnectOptions};
use catsync_core::{
    diff_state, Capabilities, DynResult, Split, State, StateField, StateListener, UpdateRequest,
};
use catsync_protocol::Topics;

use config::{BusProtocol, ClientConfig};
use mirror::{MirrorWriter, RemoteMirror, Replica};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - remote rig client");
/// How long to wait for the radio's retained snapshot after connecting.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a write may take to show up in a snapshot.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Station identifier used in topic names
    #[arg(short = 's', long = "station")]
    station: Option<String>,
    /// Radio identifier used in topic names
    #[arg(long = "radio")]
    radio: Option<String>,
    /// Broker address (host:port)
    #[arg(short = 'b', long = "bus")]
    bus: Option<String>,
    /// Broker protocol
    #[arg(long = "protocol", value_enum)]
    protocol: Option<BusProtocol>,
    /// User id sent with updates and pings
    #[arg(short = 'u', long = "user-id")]
    user_id: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Follow the radio and print changes (default)
    Monitor,
    /// Print the current state and exit
    State {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the frequency in Hz
    SetFreq { hz: f64 },
    /// Set mode and passband (0 = normal for the mode)
    SetMode {
        mode: String,
        #[arg(default_value_t = 0)]
        passband: i32,
    },
    /// Set the passband in Hz
    SetPb { hz: i32 },
    /// Switch the current VFO
    SetVfo { vfo: String },
    /// Execute VFO operations in order (e.g. CPY, XCHG, TOGGLE)
    VfoOp {
        #[arg(required = true, num_args = 1..)]
        ops: Vec<String>,
    },
    /// Key or unkey the transmitter
    SetPtt {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        on: bool,
    },
    /// Power the radio on or off
    SetPower {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        on: bool,
    },
    /// Enable or disable split
    SetSplit {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        on: bool,
        /// Transmit VFO; the other of VFOA/VFOB when unset
        #[arg(long)]
        vfo: Option<String>,
        /// Transmit frequency in Hz
        #[arg(long)]
        freq: Option<f64>,
        /// Transmit mode
        #[arg(long)]
        mode: Option<String>,
        /// Transmit passband in Hz
        #[arg(long, default_value_t = 0)]
        pb: i32,
    },
    /// Switch a function (e.g. NB, VOX)
    SetFunc {
        name: String,
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        on: bool,
    },
    /// Set a level (e.g. AF, RFPOWER)
    SetLevel {
        name: String,
        #[arg(allow_negative_numbers = true)]
        value: f32,
    },
    /// Set a parameter (e.g. BACKLIGHT)
    SetParm {
        name: String,
        #[arg(allow_negative_numbers = true)]
        value: f32,
    },
    /// Set the RIT offset in Hz
    SetRit {
        #[arg(allow_negative_numbers = true)]
        hz: i32,
    },
    /// Set the XIT offset in Hz
    SetXit {
        #[arg(allow_negative_numbers = true)]
        hz: i32,
    },
    /// Select an antenna
    SetAnt { ant: i32 },
    /// Set the tuning step in Hz
    SetTs { hz: i32 },
    /// Meter refresh period in ms (0 stops it)
    SetPolling { ms: i32 },
    /// Full resync period in seconds (0 stops it)
    SetSync { secs: i32 },
}

impl Command {
    /// Request for a write command; None for the read-only ones.
    fn to_request(&self, base: UpdateRequest) -> Option<UpdateRequest> {
        let req = match self {
            Command::Monitor | Command::State { .. } => return None,
            Command::SetFreq { hz } => base.with_frequency(*hz),
            Command::SetMode { mode, passband } => {
                base.with_mode(&mode.to_ascii_uppercase(), *passband)
            }
            Command::SetPb { hz } => base.with_pb_width(*hz),
            Command::SetVfo { vfo } => base.with_current_vfo(&vfo.to_ascii_uppercase()),
            Command::VfoOp { ops } => ops
                .iter()
                .fold(base, |req, op| req.with_vfo_op(&op.to_ascii_uppercase())),
            Command::SetPtt { on } => base.with_ptt(*on),
            Command::SetPower { on } => base.with_radio_on(*on),
            Command::SetSplit {
                on,
                vfo,
                freq,
                mode,
                pb,
            } => {
                let split = Split {
                    enabled: *on,
                    vfo: vfo.as_deref().unwrap_or("").to_ascii_uppercase(),
                    frequency: freq.unwrap_or(0.0),
                    mode: mode.as_deref().unwrap_or("").to_ascii_uppercase(),
                    pb_width: *pb,
                };
                base.with_split(split.normalized())
            }
            Command::SetFunc { name, on } => base.with_function(&name.to_ascii_uppercase(), *on),
            Command::SetLevel { name, value } => {
                base.with_level(&name.to_ascii_uppercase(), *value)
            }
            Command::SetParm { name, value } => {
                base.with_parameter(&name.to_ascii_uppercase(), *value)
            }
            Command::SetRit { hz } => base.with_rit(*hz),
            Command::SetXit { hz } => base.with_xit(*hz),
            Command::SetAnt { ant } => base.with_ant(*ant),
            Command::SetTs { hz } => base.with_tuning_step(*hz),
            Command::SetPolling { ms } => base.with_polling_interval(*ms),
            Command::SetSync { secs } => base.with_sync_interval(*secs),
        };
        Some(req)
    }
}

/// Prints replica events to stdout.
struct PrintListener;

impl StateListener for PrintListener {
    fn on_field_change(&self, field: StateField, _old: &State, new: &State) {
        println!("{:<17} {}", field.name(), field.describe(new));
    }

    fn on_initial_state(&self, state: &State) {
        print_state(state);
    }

    fn on_capabilities(&self, caps: &Capabilities) {
        println!(
            "radio: {} {} ({} modes)",
            caps.mfg_name,
            caps.model_name,
            caps.modes.len()
        );
    }

    fn on_radio_gone(&self) {
        println!("radio gone");
    }

    fn on_online_change(&self, online: bool) {
        println!("server {}", if online { "online" } else { "offline" });
    }
}

fn print_state(state: &State) {
    for field in StateField::ALL {
        println!("{:<17} {}", field.name(), field.describe(state));
    }
}

/// Wait until the replica holds a state snapshot.
async fn wait_for_state(rx: &mut watch::Receiver<Replica>) -> Option<State> {
    loop {
        if let Some(state) = rx.borrow_and_update().state.clone() {
            return Some(state);
        }
        rx.changed().await.ok()?;
    }
}

/// Wait for a snapshot that differs from `before`.
async fn wait_for_change(rx: &mut watch::Receiver<Replica>, before: &State) -> Option<State> {
    loop {
        rx.changed().await.ok()?;
        if let Some(state) = rx.borrow_and_update().state.as_ref() {
            if state != before {
                return Some(state.clone());
            }
        }
    }
}

async fn run_write(
    writer: &MirrorWriter,
    replica_rx: &mut watch::Receiver<Replica>,
    req: UpdateRequest,
    prefix: &str,
) -> DynResult<()> {
    let before = timeout(SNAPSHOT_TIMEOUT, wait_for_state(replica_rx))
        .await
        .ok()
        .flatten()
        .ok_or_else(|| format!("No state received for {}", prefix))?;

    writer.send(&req)?;

    match timeout(CONFIRM_TIMEOUT, wait_for_change(replica_rx, &before)).await {
        Ok(Some(after)) => {
            for field in diff_state(&before, &after) {
                println!("{:<17} {}", field.name(), field.describe(&after));
            }
        }
        _ => warn!(
            "No change confirmed within {:?}; the radio may already be in that state or refused it",
            CONFIRM_TIMEOUT
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ClientConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ClientConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ClientConfig::load_from_default_paths()?
    };
    if let Some(ref station) = cli.station {
        cfg.general.station = station.clone();
    }
    if let Some(ref radio) = cli.radio {
        cfg.general.radio = radio.clone();
    }
    if let Some(ref user_id) = cli.user_id {
        cfg.general.user_id = Some(user_id.clone());
    }
    if let Some(ref addr) = cli.bus {
        cfg.bus.set_addr(addr)?;
    }
    if let Some(protocol) = cli.protocol {
        cfg.bus.protocol = protocol;
    }
    cfg.validate()
        .map_err(|e| format!("Invalid client configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());
    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let command = cli.command.clone().unwrap_or(Command::Monitor);
    let topics = Topics::new(&cfg.general.station, &cfg.general.radio);
    let user_id = cfg.general.resolved_user_id();
    info!(
        "Starting catsync-client (bus: {} {:?}, radio: {}, user: {})",
        cfg.bus.addr(),
        cfg.bus.protocol,
        topics.prefix(),
        user_id
    );

    let prefix = topics.prefix().to_string();
    let opts = ConnectOptions::new(format!("catsync-client-{}", user_id));
    let session = match cfg.bus.protocol {
        BusProtocol::Catsync => tcp::connect(cfg.bus.addr(), opts),
        BusProtocol::Mqtt => mqtt::connect(cfg.bus.host.clone(), cfg.bus.port, opts),
    };
    let bus = session.handle.clone();
    let mut mirror = RemoteMirror::new(session.handle, topics, user_id);
    if matches!(command, Command::Monitor) && cfg.print_updates {
        mirror.register(Arc::new(PrintListener));
    }
    let writer = mirror.writer();
    let mut replica_rx = mirror.subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mirror_handle = tokio::spawn(mirror.run(session.events, shutdown_rx));

    let result = match command {
        Command::Monitor => {
            signal::ctrl_c().await?;
            info!("Ctrl+C received, shutting down");
            Ok(())
        }
        Command::State { json } => {
            match timeout(SNAPSHOT_TIMEOUT, wait_for_state(&mut replica_rx))
                .await
                .ok()
                .flatten()
            {
                Some(state) if json => {
                    println!("{}", serde_json::to_string_pretty(&state)?);
                    Ok(())
                }
                Some(state) => {
                    print_state(&state);
                    Ok(())
                }
                None => Err(format!("No state received for {}", prefix).into()),
            }
        }
        write => match write.to_request(writer.request()) {
            Some(req) => run_write(&writer, &mut replica_rx, req, &prefix).await,
            None => Ok(()),
        },
    };

    let _ = shutdown_tx.send(true);
    let _ = bus.disconnect().await;
    let _ = mirror_handle.await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_for(args: &[&str]) -> Option<UpdateRequest> {
        let mut argv = vec!["catsync-client"];
        argv.extend_from_slice(args);
        let cli = Cli::parse_from(argv);
        cli.command
            .unwrap_or(Command::Monitor)
            .to_request(UpdateRequest::new("op"))
    }

    #[test]
    fn test_protocol_flag() {
        let cli = Cli::parse_from(["catsync-client", "--protocol", "mqtt", "-b", "mqtt.lan:1883"]);
        assert_eq!(cli.protocol, Some(BusProtocol::Mqtt));
        assert_eq!(cli.bus.as_deref(), Some("mqtt.lan:1883"));
        assert!(Cli::try_parse_from(["catsync-client", "--protocol", "amqp"]).is_err());
    }

    #[test]
    fn test_read_commands_send_nothing() {
        assert!(request_for(&[]).is_none());
        assert!(request_for(&["state", "--json"]).is_none());
    }

    #[test]
    fn test_set_mode_uppercases() {
        let req = request_for(&["set-mode", "cw", "500"]).unwrap();
        assert_eq!(req, UpdateRequest::new("op").with_mode("CW", 500));
    }

    #[test]
    fn test_negative_rit() {
        let req = request_for(&["set-rit", "-150"]).unwrap();
        assert_eq!(req, UpdateRequest::new("op").with_rit(-150));
    }

    #[test]
    fn test_boolish_ptt() {
        let req = request_for(&["set-ptt", "on"]).unwrap();
        assert_eq!(req, UpdateRequest::new("op").with_ptt(true));
    }

    #[test]
    fn test_vfo_ops_keep_order() {
        let req = request_for(&["vfo-op", "cpy", "TOGGLE"]).unwrap();
        assert_eq!(req.vfo_operations, vec!["CPY", "TOGGLE"]);
    }

    #[test]
    fn test_split_off_is_normalized() {
        let req = request_for(&["set-split", "false", "--vfo", "VFOB"]).unwrap();
        assert_eq!(req, UpdateRequest::new("op").with_split(Split::default()));

        let req = request_for(&["set-split", "yes", "--freq", "14080000"]).unwrap();
        assert!(req.vfo.split.enabled);
        assert_eq!(req.vfo.split.vfo, "");
        assert_eq!(req.vfo.split.frequency, 14_080_000.0);
    }
}
