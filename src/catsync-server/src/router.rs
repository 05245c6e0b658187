// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dispatch of inbound bus traffic for the server session.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use catsync_bus::{BusEvent, BusHandle, BusMessage};
use catsync_core::UpdateRequest;
use catsync_protocol::{decode, Ping, TopicKind};

use crate::distributor::StateDistributor;
use crate::rig_task::RigRequest;

/// Consume bus events until shutdown or until the rig task goes away.
pub async fn run_router(
    mut events: mpsc::Receiver<BusEvent>,
    bus: BusHandle,
    distributor: StateDistributor,
    requests: mpsc::Sender<RigRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Bus event stream closed");
                    break;
                };
                let keep_going = match event {
                    BusEvent::Connected => on_connected(&bus, &distributor, &requests).await,
                    BusEvent::Disconnected => {
                        warn!("Bus connection lost");
                        true
                    }
                    BusEvent::Message(msg) => route(msg, &distributor, &requests).await,
                };
                if !keep_going {
                    break;
                }
            }
            changed = shutdown_rx.changed() => {
                match changed {
                    Ok(()) if *shutdown_rx.borrow() => break,
                    Ok(()) => {}
                    Err(_) => break,
                }
            }
        }
    }
    debug!("Bus router stopped");
}

async fn on_connected(
    bus: &BusHandle,
    distributor: &StateDistributor,
    requests: &mpsc::Sender<RigRequest>,
) -> bool {
    let topics = distributor.topics();
    info!("Bus connected, serving {}", topics.prefix());
    for filter in [topics.setstate(), topics.ping()] {
        if let Err(e) = bus.subscribe(filter).await {
            warn!("Subscribe failed: {}", e);
        }
    }
    if let Err(e) = distributor.publish_status(true) {
        warn!("Failed to publish online status: {}", e);
    }
    requests.send(RigRequest::Republish).await.is_ok()
}

/// Returns false once the rig task has stopped accepting requests.
async fn route(
    msg: BusMessage,
    distributor: &StateDistributor,
    requests: &mpsc::Sender<RigRequest>,
) -> bool {
    match distributor.topics().classify(&msg.topic) {
        Some(TopicKind::SetState) => match decode::<UpdateRequest>(&msg.payload) {
            Ok(req) => {
                debug!("Update request from {}", req.user_id);
                return requests.send(RigRequest::Update(req)).await.is_ok();
            }
            Err(e) => warn!("Dropping malformed update on {}: {}", msg.topic, e),
        },
        Some(TopicKind::Ping) => match decode::<Ping>(&msg.payload) {
            Ok(_) => {
                if let Err(e) = distributor.publish_pong(msg.payload) {
                    debug!("Pong not sent: {}", e);
                }
            }
            Err(e) => debug!("Ignoring malformed ping: {}", e),
        },
        _ => debug!("Ignoring message on {}", msg.topic),
    }
    true
}
