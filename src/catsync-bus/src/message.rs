// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Delivery guarantee requested by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

impl QoS {
    pub fn as_u8(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    /// Retained messages replace the broker's stored value for the topic;
    /// an empty retained payload erases it.
    pub retain: bool,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Empty retained message that withdraws `topic`.
    pub fn tombstone(topic: impl Into<String>) -> Self {
        Self::new(topic, Bytes::new())
            .retained()
            .with_qos(QoS::AtLeastOnce)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub client_id: String,
    /// Published by the broker if the session ends without a disconnect.
    pub will: Option<BusMessage>,
}

impl ConnectOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            will: None,
        }
    }

    pub fn with_will(mut self, will: BusMessage) -> Self {
        self.will = Some(will);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connected,
    Disconnected,
    Message(BusMessage),
}

#[derive(Debug)]
pub enum BusCommand {
    Publish(BusMessage),
    Subscribe(String),
    Disconnect,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus session closed")]
    Closed,
    #[error("bus send queue full, dropped message for {0}")]
    Backpressure(String),
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed bus frame: {0}")]
    Malformed(String),
}

/// Cloneable sending side of a bus session.
#[derive(Debug, Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusCommand>,
}

impl BusHandle {
    pub fn new(tx: mpsc::Sender<BusCommand>) -> Self {
        Self { tx }
    }

    /// Queue a message. Never waits: a full queue drops the message.
    pub fn publish(&self, msg: BusMessage) -> Result<(), BusError> {
        match self.tx.try_send(BusCommand::Publish(msg)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(BusCommand::Publish(msg))) => {
                Err(BusError::Backpressure(msg.topic))
            }
            Err(TrySendError::Full(_)) => Err(BusError::Backpressure(String::new())),
            Err(TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    pub async fn subscribe(&self, filter: impl Into<String>) -> Result<(), BusError> {
        self.tx
            .send(BusCommand::Subscribe(filter.into()))
            .await
            .map_err(|_| BusError::Closed)
    }

    /// End the session gracefully; the last-will is not published.
    pub async fn disconnect(&self) -> Result<(), BusError> {
        self.tx
            .send(BusCommand::Disconnect)
            .await
            .map_err(|_| BusError::Closed)
    }
}

/// One connection to a bus: a handle for sending and a stream of events.
#[derive(Debug)]
pub struct BusSession {
    pub handle: BusHandle,
    pub events: mpsc::Receiver<BusEvent>,
}
