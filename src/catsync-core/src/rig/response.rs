// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use thiserror::Error;

/// Error type returned by driver calls and field updates.
///
/// None of these are fatal for the session: they are scoped to the single
/// field that was being read or written when they occurred.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RigError {
    /// A symbolic name (mode, VFO, function, ...) has no entry in its table.
    #[error("unknown {kind}: {name}")]
    Unknown { kind: &'static str, name: String },

    /// The device (or its capability descriptor) does not offer the operation.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// I/O failure talking to the device.
    #[error("communication error: {0}")]
    Communication(String),

    /// The driver did not answer within the configured call timeout.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: String, after: Duration },

    /// The request cannot be carried out in the current device state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type RigResult<T> = Result<T, RigError>;

impl RigError {
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Unknown {
            kind,
            name: name.into(),
        }
    }

    pub fn not_supported(op: impl Into<String>) -> Self {
        Self::NotSupported(op.into())
    }

    pub fn communication(msg: impl Into<String>) -> Self {
        Self::Communication(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Transient errors may succeed on a later poll without any user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Communication(_) | Self::Timeout { .. })
    }
}

impl From<std::io::Error> for RigError {
    fn from(value: std::io::Error) -> Self {
        RigError::Communication(value.to_string())
    }
}
