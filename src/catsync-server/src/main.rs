// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod distributor;
mod rig_task;
mod router;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use catsync_app::{init_logging, normalize_name};
use catsync_backend::{register_builtin_backends_on, RegistrationContext};
use catsync_bus::{mqtt, tcp, BusSession, ConnectOptions, LocalBroker};
use catsync_core::DynResult;
use catsync_protocol::Topics;

use config::{BusMode, ServerConfig};
use distributor::{status_will, StateDistributor};
use rig_task::{RigRequest, RigTaskConfig, ShutdownPhase};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - rig state server");
const RIG_TASK_CHANNEL_BUFFER: usize = 32;
/// Time given to in-flight publishes before the device is closed.
const DRAIN_DELAY: Duration = Duration::from_millis(500);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

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
    /// Rig driver to use (e.g. dummy)
    #[arg(short = 'r', long = "rig")]
    rig: Option<String>,
    /// Station identifier used in topic names
    #[arg(short = 's', long = "station")]
    station: Option<String>,
    /// Radio identifier used in topic names
    #[arg(long = "radio")]
    radio: Option<String>,
    /// IP address for the embedded broker listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the embedded broker listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Connect to a remote broker at <host>:<port> instead of embedding one
    #[arg(long = "remote", value_name = "ADDR")]
    remote: Option<String>,
}

/// Configuration after merging the config file and CLI arguments.
struct ResolvedConfig {
    rig: String,
    station: String,
    radio: String,
}

fn resolve_config(
    cli: &Cli,
    cfg: &ServerConfig,
    registry: &RegistrationContext,
) -> DynResult<ResolvedConfig> {
    let rig = match cli.rig.as_deref().or(cfg.rig.model.as_deref()) {
        Some(name) => normalize_name(name),
        None => {
            return Err("Rig model not specified. Use --rig or set [rig].model in config.".into())
        }
    };
    if !registry.is_backend_registered(&rig) {
        return Err(format!(
            "Unknown rig model: {} (available: {})",
            rig,
            registry.registered_backends().join(", ")
        )
        .into());
    }

    Ok(ResolvedConfig {
        rig,
        station: cli
            .station
            .clone()
            .unwrap_or_else(|| cfg.general.station.clone()),
        radio: cli
            .radio
            .clone()
            .unwrap_or_else(|| cfg.general.radio.clone()),
    })
}

/// Open the server's bus session: an embedded broker (optionally exposed
/// over TCP), a bridge to a remote one or an external MQTT broker.
async fn open_bus(
    cli: &Cli,
    cfg: &ServerConfig,
    opts: ConnectOptions,
    shutdown_rx: watch::Receiver<bool>,
    task_handles: &mut Vec<JoinHandle<()>>,
) -> DynResult<BusSession> {
    if cli.remote.is_none() && cfg.bus.mode == BusMode::Mqtt {
        let host = cfg.bus.remote_host.clone().unwrap_or_default();
        info!("Using MQTT broker at {}:{}", host, cfg.bus.remote_port);
        return Ok(mqtt::connect(host, cfg.bus.remote_port, opts));
    }
    let remote = cli.remote.clone().or_else(|| match cfg.bus.mode {
        BusMode::Remote => cfg.bus.remote_addr(),
        BusMode::Embedded | BusMode::Mqtt => None,
    });
    if let Some(addr) = remote {
        info!("Using remote broker at {}", addr);
        return Ok(tcp::connect(addr, opts));
    }

    let broker = LocalBroker::new();
    if cfg.bus.listen_enabled {
        let ip = cli.listen.unwrap_or(cfg.bus.listen);
        let port = cli.port.unwrap_or(cfg.bus.port);
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let serve_broker = broker.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = tcp::serve(serve_broker, listener, shutdown_rx).await {
                error!("Bus listener error: {:?}", e);
            }
        }));
    } else {
        info!("Embedded broker is not exposed over TCP");
    }
    Ok(broker.connect(opts))
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);
    let resolved = resolve_config(&cli, &cfg, &registry)?;
    info!("Starting catsync-server (rig: {})", resolved.rig);

    let topics = Topics::new(&resolved.station, &resolved.radio);
    info!("Serving radio at {}", topics.prefix());

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (phase_tx, phase_rx) = watch::channel(ShutdownPhase::Running);

    let client_id = format!("catsync-server-{}", Uuid::new_v4());
    let opts = ConnectOptions::new(client_id).with_will(status_will(&topics)?);
    let BusSession { handle: bus, events } =
        open_bus(&cli, &cfg, opts, shutdown_rx.clone(), &mut task_handles).await?;
    let distributor = StateDistributor::new(bus.clone(), topics);

    let (tx, rx) = mpsc::channel::<RigRequest>(RIG_TASK_CHANNEL_BUFFER);
    task_handles.push(tokio::spawn(router::run_router(
        events,
        bus.clone(),
        distributor.clone(),
        tx,
        shutdown_rx.clone(),
    )));

    let (fatal_tx, mut fatal_rx) = mpsc::channel::<String>(1);
    let rig_task_config = RigTaskConfig {
        registry: Arc::new(registry),
        rig_model: resolved.rig,
        session: cfg.behavior.session_config(),
    };
    let rig_distributor = distributor.clone();
    let mut rig_handle = tokio::spawn(async move {
        if let Err(e) = rig_task::run_rig_task(rig_task_config, rx, rig_distributor, phase_rx).await
        {
            error!("Rig task error: {}", e);
            let _ = fatal_tx.send(e.to_string()).await;
        }
    });

    let fatal = tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Ctrl+C received, shutting down");
            None
        }
        Some(reason) = fatal_rx.recv() => Some(reason),
    };

    let _ = phase_tx.send(ShutdownPhase::Prepare);
    if let Err(e) = distributor.publish_status(false) {
        warn!("Failed to publish offline status: {}", e);
    }
    tokio::time::sleep(DRAIN_DELAY).await;
    let _ = bus.disconnect().await;
    let _ = phase_tx.send(ShutdownPhase::Shutdown);
    let _ = shutdown_tx.send(true);

    tokio::select! {
        _ = &mut rig_handle => {}
        _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
            warn!("Rig task did not stop within {:?}, aborting", SHUTDOWN_TIMEOUT);
            rig_handle.abort();
        }
    }
    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }

    match fatal {
        Some(reason) => Err(format!("Fatal session error: {}", reason).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["catsync-server"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_resolve_defaults_to_dummy() {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        let resolved = resolve_config(&cli(&[]), &ServerConfig::default(), &registry).unwrap();
        assert_eq!(resolved.rig, "dummy");
        assert_eq!(resolved.station, "station");
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        let args = cli(&["-r", "Dummy", "--station", "qth", "--radio", "vhf"]);
        let resolved = resolve_config(&args, &ServerConfig::default(), &registry).unwrap();
        assert_eq!(resolved.rig, "dummy");
        assert_eq!(resolved.station, "qth");
        assert_eq!(resolved.radio, "vhf");
    }

    #[test]
    fn test_unknown_rig_rejected() {
        let registry = RegistrationContext::new();
        let err = resolve_config(&cli(&["-r", "ic-7300"]), &ServerConfig::default(), &registry)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknown rig model: ic7300"));
    }
}
