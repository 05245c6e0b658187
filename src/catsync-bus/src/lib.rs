// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Publish/subscribe transport with retained messages and last-will.
//!
//! [`LocalBroker`] routes messages in-process; [`tcp`] exposes a broker to
//! other processes and connects to a remote one. [`mqtt`] connects to an
//! external MQTT broker instead.

pub mod broker;
pub mod frame;
pub mod message;
pub mod mqtt;
pub mod tcp;

pub use broker::{topic_matches, LocalBroker};
pub use message::{
    BusCommand, BusError, BusEvent, BusHandle, BusMessage, BusSession, ConnectOptions, QoS,
};
