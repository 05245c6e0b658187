// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-process broker.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::message::{BusCommand, BusEvent, BusHandle, BusMessage, BusSession, ConnectOptions};

const COMMAND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 1024;

/// MQTT-style filter match: `+` matches one level, a trailing `#` matches
/// the rest (including the parent level itself).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(a), Some(b)) if a == b => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

struct Subscriber {
    client_id: String,
    filters: Vec<String>,
    events: mpsc::Sender<BusEvent>,
}

impl Subscriber {
    fn wants(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| topic_matches(f, topic))
    }

    fn deliver(&self, msg: BusMessage) {
        match self.events.try_send(BusEvent::Message(msg)) {
            Ok(()) => {}
            Err(TrySendError::Full(BusEvent::Message(msg))) => {
                warn!(
                    "Subscriber {} is lagging, dropped message on {}",
                    self.client_id, msg.topic
                );
            }
            Err(_) => {}
        }
    }
}

#[derive(Default)]
struct Inner {
    retained: BTreeMap<String, BusMessage>,
    sessions: HashMap<u64, Subscriber>,
    next_id: u64,
}

/// Shared broker state. Cloning gives another reference to the same broker.
#[derive(Clone, Default)]
pub struct LocalBroker {
    inner: Arc<Mutex<Inner>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panic while holding the lock leaves the maps consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a session. Must be called from within a Tokio runtime.
    pub fn connect(&self, opts: ConnectOptions) -> BusSession {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let _ = event_tx.try_send(BusEvent::Connected);

        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.sessions.insert(
                id,
                Subscriber {
                    client_id: opts.client_id.clone(),
                    filters: Vec::new(),
                    events: event_tx,
                },
            );
            id
        };
        debug!("Bus session {} opened for {}", id, opts.client_id);

        tokio::spawn(run_session(self.clone(), id, opts, cmd_rx));

        BusSession {
            handle: BusHandle::new(cmd_tx),
            events: event_rx,
        }
    }

    /// Route a message to every matching session and update the retained store.
    pub fn publish(&self, msg: BusMessage) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if msg.retain {
            if msg.payload.is_empty() {
                inner.retained.remove(&msg.topic);
            } else {
                inner.retained.insert(msg.topic.clone(), msg.clone());
            }
        }
        for sub in inner.sessions.values().filter(|s| s.wants(&msg.topic)) {
            sub.deliver(msg.clone());
        }
    }

    /// Current retained message for `topic`.
    pub fn retained(&self, topic: &str) -> Option<BusMessage> {
        self.lock().retained.get(topic).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    fn subscribe(&self, id: u64, filter: String) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(sub) = inner.sessions.get_mut(&id) else {
            return;
        };
        for msg in inner.retained.values() {
            if topic_matches(&filter, &msg.topic) && !sub.wants(&msg.topic) {
                sub.deliver(msg.clone());
            }
        }
        if !sub.filters.contains(&filter) {
            sub.filters.push(filter);
        }
    }

    fn remove(&self, id: u64) {
        self.lock().sessions.remove(&id);
    }
}

async fn run_session(
    broker: LocalBroker,
    id: u64,
    opts: ConnectOptions,
    mut commands: mpsc::Receiver<BusCommand>,
) {
    let mut graceful = false;
    while let Some(cmd) = commands.recv().await {
        match cmd {
            BusCommand::Publish(msg) => broker.publish(msg),
            BusCommand::Subscribe(filter) => broker.subscribe(id, filter),
            BusCommand::Disconnect => {
                graceful = true;
                break;
            }
        }
    }
    broker.remove(id);
    if graceful {
        debug!("Bus session {} ({}) disconnected", id, opts.client_id);
    } else if let Some(will) = opts.will {
        debug!("Bus session {} ({}) lost, publishing will", id, opts.client_id);
        broker.publish(will);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    async fn next_message(session: &mut BusSession) -> BusMessage {
        loop {
            let event = timeout(Duration::from_secs(1), session.events.recv())
                .await
                .expect("event timeout")
                .expect("events closed");
            if let BusEvent::Message(msg) = event {
                return msg;
            }
        }
    }

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(topic_matches("a/+/c", "a/x/c"));
        assert!(topic_matches("a/#", "a/b/c"));
        assert!(topic_matches("a/#", "a"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("a/+", "a/b/c"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
    }

    #[tokio::test]
    async fn test_connected_event_first() {
        let broker = LocalBroker::new();
        let mut s = broker.connect(ConnectOptions::new("a"));
        assert_eq!(s.events.recv().await, Some(BusEvent::Connected));
    }

    #[tokio::test]
    async fn test_live_delivery() {
        let broker = LocalBroker::new();
        let mut sub = broker.connect(ConnectOptions::new("sub"));
        let publisher = broker.connect(ConnectOptions::new("pub"));
        sub.handle.subscribe("st/radios/+/cat/state").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        publisher
            .handle
            .publish(BusMessage::new("st/radios/r1/cat/state", "x"))
            .unwrap();
        let msg = next_message(&mut sub).await;
        assert_eq!(msg.topic, "st/radios/r1/cat/state");
        assert_eq!(&msg.payload[..], b"x");
    }

    #[tokio::test]
    async fn test_retained_replayed_and_erased() {
        let broker = LocalBroker::new();
        broker.publish(BusMessage::new("t/state", "v1").retained());
        broker.publish(BusMessage::new("t/state", "v2").retained());
        broker.publish(BusMessage::new("t/other", "o").retained());

        let mut late = broker.connect(ConnectOptions::new("late"));
        late.handle.subscribe("t/state").await.unwrap();
        let msg = next_message(&mut late).await;
        assert_eq!(&msg.payload[..], b"v2");
        assert!(msg.retain);

        broker.publish(BusMessage::tombstone("t/state"));
        assert!(broker.retained("t/state").is_none());
        let msg = next_message(&mut late).await;
        assert!(msg.payload.is_empty());
        assert!(broker.retained("t/other").is_some());
    }

    #[tokio::test]
    async fn test_will_on_drop_but_not_on_disconnect() {
        let broker = LocalBroker::new();
        let mut watcher = broker.connect(ConnectOptions::new("watcher"));
        watcher.handle.subscribe("srv/status").await.unwrap();

        let graceful = broker.connect(
            ConnectOptions::new("g").with_will(BusMessage::new("srv/status", "gone").retained()),
        );
        graceful.handle.disconnect().await.unwrap();

        let lost = broker.connect(
            ConnectOptions::new("l").with_will(BusMessage::new("srv/status", "lost").retained()),
        );
        drop(lost);

        let msg = next_message(&mut watcher).await;
        assert_eq!(&msg.payload[..], b"lost");
        assert_eq!(
            broker.retained("srv/status").map(|m| m.payload),
            Some(bytes::Bytes::from("lost"))
        );
    }

    #[tokio::test]
    async fn test_closed_session_rejects_publish() {
        let broker = LocalBroker::new();
        let s = broker.connect(ConnectOptions::new("x"));
        s.handle.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            s.handle.publish(BusMessage::new("a", "b")),
            Err(crate::BusError::Closed)
        ));
        assert_eq!(broker.session_count(), 0);
    }
}
