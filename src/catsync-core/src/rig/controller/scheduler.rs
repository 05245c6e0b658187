// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Two independent timers driving meter refreshes and full resyncs.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Meter,
    Sync,
}

pub struct PollingScheduler {
    meter: Option<Interval>,
    sync: Option<Interval>,
    holdoff: Duration,
    last_update: Option<Instant>,
}

fn interval(period: Duration) -> Interval {
    let mut iv = time::interval_at(Instant::now() + period, period);
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}

async fn next(slot: &mut Option<Interval>) -> Instant {
    match slot {
        Some(iv) => iv.tick().await,
        None => std::future::pending().await,
    }
}

impl PollingScheduler {
    /// `holdoff` suppresses resyncs for that long after an update request.
    pub fn new(holdoff: Duration) -> Self {
        Self {
            meter: None,
            sync: None,
            holdoff,
            last_update: None,
        }
    }

    /// Restart the meter timer; a period of 0 or less stops it.
    pub fn set_meter_period(&mut self, ms: i32) {
        self.meter = (ms > 0).then(|| interval(Duration::from_millis(ms as u64)));
        debug!("Meter polling period set to {} ms", ms.max(0));
    }

    /// Restart the resync timer; a period of 0 or less stops it.
    pub fn set_sync_period(&mut self, secs: i32) {
        self.sync = (secs > 0).then(|| interval(Duration::from_secs(secs as u64)));
        debug!("Sync period set to {} s", secs.max(0));
    }

    pub fn stop(&mut self) {
        self.meter = None;
        self.sync = None;
    }

    pub fn is_meter_running(&self) -> bool {
        self.meter.is_some()
    }

    pub fn is_sync_running(&self) -> bool {
        self.sync.is_some()
    }

    /// Record that an update request was just processed.
    pub fn note_update(&mut self) {
        self.last_update = Some(Instant::now());
    }

    /// Whether a resync may run now without racing a recent update.
    pub fn sync_due(&self) -> bool {
        match self.last_update {
            Some(at) => at.elapsed() >= self.holdoff,
            None => true,
        }
    }

    /// Wait for the next tick of either timer. Never resolves when both
    /// are stopped. Cancel safe.
    pub async fn tick(&mut self) -> Tick {
        tokio::select! {
            _ = next(&mut self.meter) => Tick::Meter,
            _ = next(&mut self.sync) => Tick::Sync,
        }
    }
}
