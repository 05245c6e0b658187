// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Client-side replica of a remote radio.
//!
//! The replica is rebuilt only from retained snapshots; writes are sent as
//! [`UpdateRequest`]s and count as done once a later snapshot shows them.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use catsync_app::unix_time_ns;
use catsync_bus::{BusError, BusEvent, BusHandle, BusMessage};
use catsync_core::{
    diff_state, Capabilities, ListenerId, State, StateEventEmitter, StateListener, UpdateRequest,
};
use catsync_protocol::{decode, decode_retained, encode, CodecError, Status, TopicKind, Topics};

use crate::latency::{LatencyProbe, PING_INTERVAL};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// What the client currently knows about the radio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replica {
    pub caps: Option<Capabilities>,
    pub state: Option<State>,
    /// None until the first status message.
    pub online: Option<bool>,
    pub rtt: Option<Duration>,
}

/// Sending side of the mirror; cheap to clone.
#[derive(Debug, Clone)]
pub struct MirrorWriter {
    bus: BusHandle,
    topics: Topics,
    user_id: String,
}

impl MirrorWriter {
    /// Empty request tagged with this client's user id.
    pub fn request(&self) -> UpdateRequest {
        UpdateRequest::new(self.user_id.clone())
    }

    pub fn send(&self, req: &UpdateRequest) -> Result<(), MirrorError> {
        if req.is_empty() {
            debug!("Not sending empty update");
            return Ok(());
        }
        let msg = BusMessage::new(self.topics.setstate(), encode(req)?);
        self.bus.publish(msg)?;
        Ok(())
    }
}

pub struct RemoteMirror {
    bus: BusHandle,
    topics: Topics,
    user_id: String,
    emitter: StateEventEmitter,
    probe: LatencyProbe,
    replica_tx: watch::Sender<Replica>,
}

impl RemoteMirror {
    pub fn new(bus: BusHandle, topics: Topics, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let (replica_tx, _) = watch::channel(Replica::default());
        Self {
            bus,
            topics,
            probe: LatencyProbe::new(user_id.clone()),
            user_id,
            emitter: StateEventEmitter::new(),
            replica_tx,
        }
    }

    pub fn writer(&self) -> MirrorWriter {
        MirrorWriter {
            bus: self.bus.clone(),
            topics: self.topics.clone(),
            user_id: self.user_id.clone(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Replica> {
        self.replica_tx.subscribe()
    }

    pub fn register(&mut self, listener: Arc<dyn StateListener>) -> ListenerId {
        self.emitter.register(listener)
    }

    pub fn replica(&self) -> Replica {
        self.replica_tx.borrow().clone()
    }

    /// Process bus events until shutdown or until the session ends.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<BusEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ping_timer = time::interval(PING_INTERVAL);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut connected = false;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Bus event stream closed");
                        break;
                    };
                    match event {
                        BusEvent::Connected => {
                            connected = true;
                            self.on_connected().await;
                        }
                        BusEvent::Disconnected => {
                            connected = false;
                            warn!("Bus connection lost, replica may be stale");
                        }
                        BusEvent::Message(msg) => self.handle_message(&msg),
                    }
                }
                _ = ping_timer.tick(), if connected => self.send_ping(),
                changed = shutdown_rx.changed() => {
                    match changed {
                        Ok(()) if *shutdown_rx.borrow() => break,
                        Ok(()) => {}
                        Err(_) => break,
                    }
                }
            }
        }
        debug!("Remote mirror stopped");
    }

    async fn on_connected(&self) {
        info!("Bus connected, following {}", self.topics.prefix());
        let filters = [
            self.topics.caps(),
            self.topics.state(),
            self.topics.status(),
            self.topics.pong(),
            self.topics.log(),
        ];
        for filter in filters {
            if let Err(e) = self.bus.subscribe(filter).await {
                warn!("Subscribe failed: {}", e);
            }
        }
    }

    fn send_ping(&self) {
        match self.probe.ping_message(&self.topics, unix_time_ns()) {
            Ok(msg) => {
                if let Err(e) = self.bus.publish(msg) {
                    debug!("Ping not sent: {}", e);
                }
            }
            Err(e) => debug!("Ping not encoded: {}", e),
        }
    }

    /// Fold one bus message into the replica.
    pub fn handle_message(&mut self, msg: &BusMessage) {
        match self.topics.classify(&msg.topic) {
            Some(TopicKind::State) => self.apply_state(&msg.payload),
            Some(TopicKind::Caps) => self.apply_caps(&msg.payload),
            Some(TopicKind::Status) => self.apply_status(&msg.payload),
            Some(TopicKind::Pong) => {
                if let Some(rtt) = self.probe.on_pong(&msg.payload, unix_time_ns()) {
                    debug!("Round trip {:?}", rtt);
                    self.replica_tx.send_modify(|r| r.rtt = Some(rtt));
                }
            }
            Some(TopicKind::Log) => {
                info!("server: {}", String::from_utf8_lossy(&msg.payload));
            }
            _ => debug!("Ignoring message on {}", msg.topic),
        }
    }

    fn apply_state(&mut self, payload: &[u8]) {
        let new = match decode_retained::<State>(payload) {
            Ok(Some(state)) => state,
            Ok(None) => return self.radio_gone(),
            Err(e) => {
                warn!("Dropping malformed state snapshot: {}", e);
                return;
            }
        };
        let old = self.replica_tx.borrow().state.clone();
        self.replica_tx.send_modify(|r| r.state = Some(new.clone()));
        match old {
            None => self.emitter.notify_initial_state(&new),
            Some(old) => {
                for field in diff_state(&old, &new) {
                    self.emitter.notify_field_change(field, &old, &new);
                }
            }
        }
    }

    fn apply_caps(&mut self, payload: &[u8]) {
        match decode_retained::<Capabilities>(payload) {
            Ok(Some(caps)) => {
                self.replica_tx.send_modify(|r| r.caps = Some(caps.clone()));
                self.emitter.notify_capabilities(&caps);
            }
            Ok(None) => self.radio_gone(),
            Err(e) => warn!("Dropping malformed capabilities: {}", e),
        }
    }

    fn apply_status(&mut self, payload: &[u8]) {
        let status = match decode::<Status>(payload) {
            Ok(status) => status,
            Err(e) => {
                debug!("Ignoring malformed status: {}", e);
                return;
            }
        };
        let previous = self.replica_tx.borrow().online;
        if previous == Some(status.online) {
            return;
        }
        self.replica_tx
            .send_modify(|r| r.online = Some(status.online));
        self.emitter.notify_online_change(status.online);
    }

    /// A tombstone on either snapshot topic; notifies once for the pair.
    fn radio_gone(&mut self) {
        let had_radio = {
            let r = self.replica_tx.borrow();
            r.state.is_some() || r.caps.is_some()
        };
        if !had_radio {
            return;
        }
        self.replica_tx.send_modify(|r| {
            r.state = None;
            r.caps = None;
        });
        self.emitter.notify_radio_gone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use catsync_bus::{ConnectOptions, LocalBroker};
    use catsync_core::StateField;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Recorder {
        fields: Mutex<Vec<StateField>>,
        initial: Mutex<u32>,
        gone: Mutex<u32>,
        online: Mutex<Vec<bool>>,
    }

    impl StateListener for Recorder {
        fn on_field_change(&self, field: StateField, _old: &State, _new: &State) {
            self.fields.lock().unwrap().push(field);
        }

        fn on_initial_state(&self, _state: &State) {
            *self.initial.lock().unwrap() += 1;
        }

        fn on_radio_gone(&self) {
            *self.gone.lock().unwrap() += 1;
        }

        fn on_online_change(&self, online: bool) {
            self.online.lock().unwrap().push(online);
        }
    }

    fn setup() -> (LocalBroker, RemoteMirror, Arc<Recorder>) {
        let broker = LocalBroker::new();
        let session = broker.connect(ConnectOptions::new("client"));
        let mut mirror = RemoteMirror::new(session.handle, Topics::new("st", "r1"), "op");
        let recorder = Arc::new(Recorder::default());
        mirror.register(recorder.clone());
        (broker, mirror, recorder)
    }

    fn snapshot(state: &State) -> BusMessage {
        BusMessage::new("st/radios/r1/cat/state", encode(state).unwrap()).retained()
    }

    fn base() -> State {
        let mut state = State {
            current_vfo: "VFOA".to_string(),
            radio_on: true,
            ..Default::default()
        };
        state.vfo.frequency = 14_074_000.0;
        state.vfo.mode = "USB".to_string();
        state
    }

    #[tokio::test]
    async fn test_ptt_change_notifies_once() {
        let (_broker, mut mirror, recorder) = setup();
        let old = base();
        let mut new = base();
        new.ptt = true;

        mirror.handle_message(&snapshot(&old));
        mirror.handle_message(&snapshot(&new));

        assert_eq!(*recorder.initial.lock().unwrap(), 1);
        assert_eq!(*recorder.fields.lock().unwrap(), vec![StateField::Ptt]);
        assert_eq!(mirror.replica().state, Some(new));
    }

    #[tokio::test]
    async fn test_identical_snapshot_is_silent() {
        let (_broker, mut mirror, recorder) = setup();
        mirror.handle_message(&snapshot(&base()));
        mirror.handle_message(&snapshot(&base()));
        assert!(recorder.fields.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tombstones_reset_replica() {
        let (_broker, mut mirror, recorder) = setup();
        mirror.handle_message(&snapshot(&base()));
        let caps = BusMessage::new(
            "st/radios/r1/cat/caps",
            encode(&Capabilities::default()).unwrap(),
        );
        mirror.handle_message(&caps);
        assert!(mirror.replica().caps.is_some());

        mirror.handle_message(&BusMessage::tombstone("st/radios/r1/cat/state"));
        mirror.handle_message(&BusMessage::tombstone("st/radios/r1/cat/caps"));
        let replica = mirror.replica();
        assert!(replica.state.is_none());
        assert!(replica.caps.is_none());
        assert_eq!(*recorder.gone.lock().unwrap(), 1);

        // radio comes back: first snapshot is initial again
        mirror.handle_message(&snapshot(&base()));
        assert_eq!(*recorder.initial.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_keeps_replica() {
        let (_broker, mut mirror, _recorder) = setup();
        mirror.handle_message(&snapshot(&base()));
        mirror.handle_message(&BusMessage::new("st/radios/r1/cat/state", vec![9u8, 9, 9]));
        assert_eq!(mirror.replica().state, Some(base()));
    }

    #[tokio::test]
    async fn test_status_changes_only() {
        let (_broker, mut mirror, recorder) = setup();
        for online in [true, true, false] {
            let msg = BusMessage::new(
                "st/radios/r1/cat/status",
                encode(&Status { online }).unwrap(),
            );
            mirror.handle_message(&msg);
        }
        assert_eq!(*recorder.online.lock().unwrap(), vec![true, false]);
        assert_eq!(mirror.replica().online, Some(false));
    }

    #[tokio::test]
    async fn test_writer_publishes_setstate() {
        let (broker, mirror, _recorder) = setup();
        let mut server = broker.connect(ConnectOptions::new("server"));
        server
            .handle
            .subscribe("st/radios/r1/cat/setstate")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let writer = mirror.writer();
        writer.send(&writer.request()).unwrap();
        let req = writer.request().with_ptt(true);
        writer.send(&req).unwrap();

        loop {
            let event = timeout(Duration::from_secs(1), server.events.recv())
                .await
                .unwrap()
                .unwrap();
            if let BusEvent::Message(msg) = event {
                let got = decode::<UpdateRequest>(&msg.payload).unwrap();
                assert_eq!(got, req);
                assert_eq!(got.user_id, "op");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_run_follows_retained_state() {
        let broker = LocalBroker::new();
        let state = base();
        broker.publish(snapshot(&state));

        let session = broker.connect(ConnectOptions::new("client"));
        let mirror = RemoteMirror::new(session.handle, Topics::new("st", "r1"), "op");
        let mut replica_rx = mirror.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(mirror.run(session.events, shutdown_rx));

        let got = timeout(Duration::from_secs(1), async {
            loop {
                if let Some(s) = replica_rx.borrow_and_update().state.clone() {
                    return s;
                }
                replica_rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert_eq!(got, state);

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
