// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device-side session logic: apply requests, re-query, poll meters.

mod applier;
mod scheduler;
mod session;
mod split;

#[cfg(test)]
pub(crate) mod mock;

pub use applier::{ApplyReport, FieldFailure, RigController};
pub use scheduler::{PollingScheduler, Tick};
pub use session::SessionConfig;
pub use split::SplitPhase;
