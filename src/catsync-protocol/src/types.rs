// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Small control messages carried next to the state snapshots.

use serde::{Deserialize, Serialize};

/// Server liveness, retained on the `status` topic and used as last-will.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub online: bool,
}

/// Latency probe. The server echoes it unchanged on `pong`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub user_id: String,
    /// Sender's clock in nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
}
