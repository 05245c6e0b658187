// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Round-trip measurement over the ping/pong topics.

use std::time::Duration;

use catsync_bus::BusMessage;
use catsync_protocol::{decode, encode, CodecError, Ping, Topics};

pub const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Builds pings and matches the server's echoes.
///
/// Pongs go to every client of the radio, so only echoes carrying our own
/// user id are counted.
#[derive(Debug)]
pub struct LatencyProbe {
    user_id: String,
    last_rtt: Option<Duration>,
}

impl LatencyProbe {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            last_rtt: None,
        }
    }

    pub fn ping_message(&self, topics: &Topics, now_ns: i64) -> Result<BusMessage, CodecError> {
        let ping = Ping {
            user_id: self.user_id.clone(),
            timestamp_ns: now_ns,
        };
        Ok(BusMessage::new(topics.ping(), encode(&ping)?))
    }

    /// Returns the round-trip time if the pong answers one of our pings.
    pub fn on_pong(&mut self, payload: &[u8], now_ns: i64) -> Option<Duration> {
        let ping = decode::<Ping>(payload).ok()?;
        if ping.user_id != self.user_id {
            return None;
        }
        let elapsed = now_ns.checked_sub(ping.timestamp_ns)?;
        let rtt = Duration::from_nanos(u64::try_from(elapsed).ok()?);
        self.last_rtt = Some(rtt);
        Some(rtt)
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtt_from_own_pong() {
        let topics = Topics::new("st", "r1");
        let mut probe = LatencyProbe::new("me");
        let ping = probe.ping_message(&topics, 1_000_000).unwrap();
        assert_eq!(ping.topic, "st/radios/r1/cat/ping");

        let rtt = probe.on_pong(&ping.payload, 6_000_000);
        assert_eq!(rtt, Some(Duration::from_millis(5)));
        assert_eq!(probe.last_rtt(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_foreign_and_bad_pongs_ignored() {
        let topics = Topics::new("st", "r1");
        let mut probe = LatencyProbe::new("me");
        let other = LatencyProbe::new("someone-else")
            .ping_message(&topics, 0)
            .unwrap();
        assert_eq!(probe.on_pong(&other.payload, 10), None);
        assert_eq!(probe.on_pong(&[1, 2, 3], 10), None);

        // clock stepped backwards
        let own = probe.ping_message(&topics, 100).unwrap();
        assert_eq!(probe.on_pong(&own.payload, 50), None);
        assert_eq!(probe.last_rtt(), None);
    }
}
