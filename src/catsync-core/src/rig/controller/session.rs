// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

/// Per-session settings handed to the controller when the device opens.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for a single driver call.
    pub call_timeout: Duration,
    /// Largest difference between a requested and a read-back level or
    /// parameter that is still considered the same value.
    pub level_tolerance: f32,
    /// Periodic resyncs are skipped this long after an update request.
    pub sync_holdoff: Duration,
    /// Initial meter refresh period (ms), 0 = off.
    pub polling_interval_ms: i32,
    /// Initial full resync period (s), 0 = off.
    pub sync_interval_s: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(2),
            level_tolerance: 0.1,
            sync_holdoff: Duration::from_secs(3),
            polling_interval_ms: 100,
            sync_interval_s: 5,
        }
    }
}
