// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bus sessions over an external MQTT broker.
//!
//! Offers the same [`BusSession`] as [`crate::tcp::connect`]: retained
//! messages, last-will and empty-payload tombstones map onto their MQTT
//! counterparts, so servers and clients do not care which one they got.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    Publish,
};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use crate::message::{
    BusCommand, BusEvent, BusHandle, BusMessage, BusSession, ConnectOptions, QoS,
};

const KEEP_ALIVE: Duration = Duration::from_secs(10);
const REQUEST_CAPACITY: usize = 256;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Open a session against the MQTT broker at `host:port`.
///
/// Like the TCP bridge, the session survives connection drops: it
/// reconnects with a doubling backoff, re-subscribes and reports every
/// transition. Messages published while disconnected are dropped.
pub fn connect(host: impl Into<String>, port: u16, opts: ConnectOptions) -> BusSession {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(1024);
    let options = mqtt_options(host, port, &opts);
    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    tokio::spawn(run_client(client, eventloop, cmd_rx, event_tx));
    BusSession {
        handle: BusHandle::new(cmd_tx),
        events: event_rx,
    }
}

fn mqtt_options(host: impl Into<String>, port: u16, opts: &ConnectOptions) -> MqttOptions {
    let mut options = MqttOptions::new(opts.client_id.clone(), host, port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    if let Some(will) = &opts.will {
        options.set_last_will(LastWill::new(
            will.topic.clone(),
            will.payload.to_vec(),
            to_mqtt_qos(will.qos),
            will.retain,
        ));
    }
    options
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
    }
}

fn from_mqtt_qos(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce | rumqttc::QoS::ExactlyOnce => QoS::AtLeastOnce,
    }
}

fn bus_message(publish: Publish) -> BusMessage {
    BusMessage {
        topic: publish.topic,
        payload: publish.payload,
        qos: from_mqtt_qos(publish.qos),
        retain: publish.retain,
    }
}

fn remember(subscriptions: &mut Vec<String>, filter: String) {
    if !subscriptions.contains(&filter) {
        subscriptions.push(filter);
    }
}

fn subscribe(client: &AsyncClient, filter: &str) {
    if let Err(e) = client.try_subscribe(filter, rumqttc::QoS::AtLeastOnce) {
        warn!("MQTT subscribe to {} failed: {}", filter, e);
    }
}

enum Step {
    Command(Option<BusCommand>),
    Polled(Result<Event, ConnectionError>),
}

async fn run_client(
    client: AsyncClient,
    mut eventloop: EventLoop,
    mut commands: mpsc::Receiver<BusCommand>,
    events: mpsc::Sender<BusEvent>,
) {
    let mut subscriptions: Vec<String> = Vec::new();
    let mut reconnect_delay = Duration::from_secs(1);
    let mut connected = false;

    loop {
        let step = tokio::select! {
            cmd = commands.recv() => Step::Command(cmd),
            polled = eventloop.poll() => Step::Polled(polled),
        };
        match step {
            Step::Command(Some(BusCommand::Publish(msg))) => {
                if !connected {
                    debug!("MQTT offline, dropping message on {}", msg.topic);
                    continue;
                }
                let qos = to_mqtt_qos(msg.qos);
                if let Err(e) =
                    client.try_publish(msg.topic, qos, msg.retain, msg.payload.to_vec())
                {
                    warn!("MQTT publish failed: {}", e);
                }
            }
            Step::Command(Some(BusCommand::Subscribe(filter))) => {
                if connected {
                    subscribe(&client, &filter);
                }
                remember(&mut subscriptions, filter);
            }
            Step::Command(Some(BusCommand::Disconnect)) => {
                if connected {
                    disconnect(&client, &mut eventloop).await;
                }
                info!("MQTT session closed");
                return;
            }
            // all handles dropped without disconnect: let the will fire
            Step::Command(None) => return,
            Step::Polled(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                info!("MQTT connected");
                connected = true;
                reconnect_delay = Duration::from_secs(1);
                for filter in &subscriptions {
                    subscribe(&client, filter);
                }
                if events.send(BusEvent::Connected).await.is_err() {
                    return;
                }
            }
            Step::Polled(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                if events
                    .send(BusEvent::Message(bus_message(publish)))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Step::Polled(Ok(_)) => {}
            Step::Polled(Err(e)) => {
                warn!("MQTT connection error: {}", e);
                if connected {
                    connected = false;
                    if events.send(BusEvent::Disconnected).await.is_err() {
                        return;
                    }
                }
                if !wait_offline(&mut commands, &mut subscriptions, reconnect_delay).await {
                    return;
                }
                reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
            }
        }
    }
}

/// Sit out the backoff while still taking commands. Returns false when the
/// session should end.
async fn wait_offline(
    commands: &mut mpsc::Receiver<BusCommand>,
    subscriptions: &mut Vec<String>,
    delay: Duration,
) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                Some(BusCommand::Subscribe(filter)) => remember(subscriptions, filter),
                Some(BusCommand::Publish(msg)) => {
                    debug!("MQTT offline, dropping message on {}", msg.topic);
                }
                Some(BusCommand::Disconnect) | None => return false,
            },
        }
    }
}

/// Flush a DISCONNECT so the broker discards the will.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        warn!("MQTT disconnect failed: {}", e);
        return;
    }
    let flushed = time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => return,
                Ok(_) => {}
            }
        }
    })
    .await;
    if flushed.is_err() {
        warn!("MQTT disconnect not flushed within {:?}", DISCONNECT_TIMEOUT);
    }
}
