// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod rig;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use rig::caps::{Capabilities, ValueRange};
pub use rig::controller::{
    ApplyReport, FieldFailure, PollingScheduler, RigController, SessionConfig, SplitPhase, Tick,
};
pub use rig::diff::{diff_state, StateField};
pub use rig::events::{ListenerId, StateEventEmitter, StateListener};
pub use rig::request::{UpdateFlags, UpdateRequest};
pub use rig::response::{RigError, RigResult};
pub use rig::state::{RigStore, Split, State, VfoState};
pub use rig::RigDriver;
