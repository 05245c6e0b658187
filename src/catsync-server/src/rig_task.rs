// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The rig actor: sole owner of the driver and the canonical state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use catsync_backend::RegistrationContext;
use catsync_core::{
    ApplyReport, DynResult, PollingScheduler, RigController, SessionConfig, Tick, UpdateRequest,
};

use crate::distributor::StateDistributor;

const SLOW_COMMAND: Duration = Duration::from_millis(500);

/// Input to the rig task.
#[derive(Debug)]
pub enum RigRequest {
    Update(UpdateRequest),
    /// Publish caps and state again, e.g. after the bus reconnected.
    Republish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    /// Stop timers and withdraw the retained snapshots.
    Prepare,
    /// Close the device.
    Shutdown,
}

pub struct RigTaskConfig {
    pub registry: Arc<RegistrationContext>,
    pub rig_model: String,
    pub session: SessionConfig,
}

/// Open the configured rig and run it until shutdown.
pub async fn run_rig_task(
    config: RigTaskConfig,
    rx: mpsc::Receiver<RigRequest>,
    distributor: StateDistributor,
    phase_rx: watch::Receiver<ShutdownPhase>,
) -> DynResult<()> {
    info!("Opening rig backend {}", config.rig_model);
    let rig = config.registry.build_rig(&config.rig_model)?;
    let controller = RigController::new(rig, config.session);
    let caps = controller.caps();
    info!(
        "Rig backend ready: {} {} {} ({})",
        caps.mfg_name, caps.model_name, caps.version, caps.status
    );
    run_controller(controller, rx, distributor, phase_rx).await
}

enum LoopEnd {
    Shutdown,
    RequestsClosed,
}

/// Event loop over update requests, timer ticks and the shutdown phase.
pub async fn run_controller(
    mut controller: RigController,
    mut rx: mpsc::Receiver<RigRequest>,
    distributor: StateDistributor,
    mut phase_rx: watch::Receiver<ShutdownPhase>,
) -> DynResult<()> {
    let report = controller.query_state().await;
    publish_failures(&distributor, &report);
    publish_all(&mut controller, &distributor);

    let mut scheduler = PollingScheduler::new(controller.config().sync_holdoff);
    scheduler.set_meter_period(controller.state().polling_interval);
    scheduler.set_sync_period(controller.state().sync_interval);

    let end = loop {
        tokio::select! {
            changed = phase_rx.changed() => {
                if changed.is_err() || *phase_rx.borrow() != ShutdownPhase::Running {
                    break LoopEnd::Shutdown;
                }
            }

            maybe_req = rx.recv() => {
                let Some(first) = maybe_req else {
                    break LoopEnd::RequestsClosed;
                };
                let mut batch = vec![first];
                while let Ok(next) = rx.try_recv() {
                    batch.push(next);
                }
                for req in batch {
                    handle_request(&mut controller, &mut scheduler, &distributor, req).await;
                }
                publish_if_dirty(&mut controller, &distributor);
            }

            tick = scheduler.tick() => {
                match tick {
                    Tick::Meter => {
                        controller.refresh_meters().await;
                    }
                    Tick::Sync if scheduler.sync_due() => {
                        let report = controller.query_state().await;
                        publish_failures(&distributor, &report);
                    }
                    Tick::Sync => debug!("Resync skipped, update in progress"),
                }
                publish_if_dirty(&mut controller, &distributor);
            }
        }
    };

    scheduler.stop();
    if let Err(e) = distributor.publish_tombstones() {
        warn!("Failed to withdraw snapshots: {}", e);
    }

    match end {
        LoopEnd::Shutdown => {
            wait_for_phase(&mut phase_rx, ShutdownPhase::Shutdown).await;
            controller.close().await;
            info!("rig_task shutting down");
            Ok(())
        }
        LoopEnd::RequestsClosed => {
            controller.close().await;
            Err("rig request channel closed".into())
        }
    }
}

async fn wait_for_phase(rx: &mut watch::Receiver<ShutdownPhase>, phase: ShutdownPhase) {
    while *rx.borrow() < phase {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn handle_request(
    controller: &mut RigController,
    scheduler: &mut PollingScheduler,
    distributor: &StateDistributor,
    req: RigRequest,
) {
    let update = match req {
        RigRequest::Update(update) => update,
        RigRequest::Republish => {
            publish_all(controller, distributor);
            return;
        }
    };

    scheduler.note_update();
    let started = Instant::now();
    let report = controller.apply(&update).await;

    if report.polling_changed {
        scheduler.set_meter_period(controller.state().polling_interval);
    }
    if report.sync_changed {
        scheduler.set_sync_period(controller.state().sync_interval);
    }
    publish_failures(distributor, &report);

    let elapsed = started.elapsed();
    if elapsed > SLOW_COMMAND {
        warn!(
            "Update from {} took {:?} ({} applied, {} failed)",
            update.user_id,
            elapsed,
            report.applied.len(),
            report.failed.len()
        );
    } else {
        debug!("Update from {} completed in {:?}", update.user_id, elapsed);
    }
}

fn publish_all(controller: &mut RigController, distributor: &StateDistributor) {
    if let Err(e) = distributor.publish_caps(controller.caps()) {
        warn!("Failed to publish capabilities: {}", e);
    }
    controller.take_dirty();
    if let Err(e) = distributor.publish_state(controller.state()) {
        warn!("Failed to publish state: {}", e);
    }
}

fn publish_if_dirty(controller: &mut RigController, distributor: &StateDistributor) {
    if !controller.take_dirty() {
        return;
    }
    if let Err(e) = distributor.publish_state(controller.state()) {
        warn!("Failed to publish state: {}", e);
    }
}

fn publish_failures(distributor: &StateDistributor, report: &ApplyReport) {
    for failure in &report.failed {
        if let Err(e) = distributor.publish_log(&failure.to_string()) {
            debug!("Failed to publish log line: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use catsync_backend::DummyRig;
    use catsync_bus::{BusEvent, BusMessage, BusSession, ConnectOptions, LocalBroker};
    use catsync_core::State;
    use catsync_protocol::{decode, decode_retained, Topics};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Harness {
        broker: LocalBroker,
        watcher: BusSession,
        tx: mpsc::Sender<RigRequest>,
        phase_tx: watch::Sender<ShutdownPhase>,
        task: JoinHandle<DynResult<()>>,
    }

    async fn start() -> Harness {
        let broker = LocalBroker::new();
        let mut watcher = broker.connect(ConnectOptions::new("watcher"));
        watcher.handle.subscribe("st/radios/r1/cat/#").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let server = broker.connect(ConnectOptions::new("server"));
        let distributor = StateDistributor::new(server.handle, Topics::new("st", "r1"));
        let session = SessionConfig {
            polling_interval_ms: 0,
            sync_interval_s: 0,
            ..Default::default()
        };
        let controller = RigController::new(Box::new(DummyRig::new()), session);
        let (tx, rx) = mpsc::channel(8);
        let (phase_tx, phase_rx) = watch::channel(ShutdownPhase::Running);
        let task = tokio::spawn(run_controller(controller, rx, distributor, phase_rx));
        Harness {
            broker,
            watcher,
            tx,
            phase_tx,
            task,
        }
    }

    async fn next_on(session: &mut BusSession, leaf: &str) -> BusMessage {
        let topic = format!("st/radios/r1/cat/{}", leaf);
        loop {
            let event = timeout(Duration::from_secs(1), session.events.recv())
                .await
                .expect("event timeout")
                .expect("events closed");
            if let BusEvent::Message(msg) = event {
                if msg.topic == topic {
                    return msg;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_initial_snapshots_published() {
        let mut h = start().await;
        let caps = next_on(&mut h.watcher, "caps").await;
        assert!(caps.retain);
        let state = decode::<State>(&next_on(&mut h.watcher, "state").await.payload).unwrap();
        assert!(state.radio_on);
        assert_eq!(state.vfo.frequency, 14_074_000.0);
    }

    #[tokio::test]
    async fn test_update_publishes_new_state() {
        let mut h = start().await;
        next_on(&mut h.watcher, "state").await;

        h.tx.send(RigRequest::Update(
            UpdateRequest::new("op").with_frequency(7_030_000.0),
        ))
        .await
        .unwrap();
        let state = decode::<State>(&next_on(&mut h.watcher, "state").await.payload).unwrap();
        assert_eq!(state.vfo.frequency, 7_030_000.0);
    }

    #[tokio::test]
    async fn test_failure_goes_to_log_topic() {
        let mut h = start().await;
        next_on(&mut h.watcher, "state").await;

        h.tx.send(RigRequest::Update(
            UpdateRequest::new("op").with_frequency(1.0),
        ))
        .await
        .unwrap();
        let line = next_on(&mut h.watcher, "log").await;
        let text = String::from_utf8(line.payload.to_vec()).unwrap();
        assert!(text.starts_with("frequency"), "{}", text);
    }

    #[tokio::test]
    async fn test_two_phase_shutdown() {
        let mut h = start().await;
        next_on(&mut h.watcher, "state").await;

        h.phase_tx.send(ShutdownPhase::Prepare).unwrap();
        let tomb = next_on(&mut h.watcher, "state").await;
        assert_eq!(decode_retained::<State>(&tomb.payload).unwrap(), None);
        assert!(next_on(&mut h.watcher, "caps").await.payload.is_empty());
        assert!(h.broker.retained("st/radios/r1/cat/state").is_none());
        assert!(!h.task.is_finished());

        h.phase_tx.send(ShutdownPhase::Shutdown).unwrap();
        let result = timeout(Duration::from_secs(1), h.task).await.unwrap();
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_request_channel_is_an_error() {
        let h = start().await;
        drop(h.tx);
        let result = timeout(Duration::from_secs(1), h.task).await.unwrap();
        assert!(result.unwrap().is_err());
    }
}
