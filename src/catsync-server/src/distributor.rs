// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Publishes the server's view of the rig onto the bus.

use bytes::Bytes;
use thiserror::Error;

use catsync_bus::{BusError, BusHandle, BusMessage, QoS};
use catsync_core::{Capabilities, State};
use catsync_protocol::{encode, CodecError, Status, Topics};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Retained `status = offline`, registered as the session's last-will.
pub fn status_will(topics: &Topics) -> Result<BusMessage, CodecError> {
    status_message(topics, false)
}

fn status_message(topics: &Topics, online: bool) -> Result<BusMessage, CodecError> {
    Ok(BusMessage::new(topics.status(), encode(&Status { online })?)
        .retained()
        .with_qos(QoS::AtLeastOnce))
}

/// Serializes snapshots and publishes them on the radio's topics.
#[derive(Debug, Clone)]
pub struct StateDistributor {
    bus: BusHandle,
    topics: Topics,
}

impl StateDistributor {
    pub fn new(bus: BusHandle, topics: Topics) -> Self {
        Self { bus, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn publish_caps(&self, caps: &Capabilities) -> Result<(), PublishError> {
        let msg = BusMessage::new(self.topics.caps(), encode(caps)?).retained();
        self.bus.publish(msg)?;
        Ok(())
    }

    pub fn publish_state(&self, state: &State) -> Result<(), PublishError> {
        let msg = BusMessage::new(self.topics.state(), encode(state)?).retained();
        self.bus.publish(msg)?;
        Ok(())
    }

    /// Withdraw the retained snapshots so late subscribers see the radio gone.
    pub fn publish_tombstones(&self) -> Result<(), PublishError> {
        self.bus.publish(BusMessage::tombstone(self.topics.state()))?;
        self.bus.publish(BusMessage::tombstone(self.topics.caps()))?;
        Ok(())
    }

    pub fn publish_status(&self, online: bool) -> Result<(), PublishError> {
        self.bus.publish(status_message(&self.topics, online)?)?;
        Ok(())
    }

    /// Human-readable line on the `log` topic.
    pub fn publish_log(&self, line: &str) -> Result<(), PublishError> {
        let payload = Bytes::copy_from_slice(line.as_bytes());
        self.bus.publish(BusMessage::new(self.topics.log(), payload))?;
        Ok(())
    }

    /// Send a ping payload back unchanged.
    pub fn publish_pong(&self, payload: Bytes) -> Result<(), PublishError> {
        self.bus.publish(BusMessage::new(self.topics.pong(), payload))?;
        Ok(())
    }
}
