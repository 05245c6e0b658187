// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

use crate::rig::state::{Split, VfoState};

/// Field-presence bitmap of an [`UpdateRequest`].
///
/// A cleared flag means "leave this field alone", whatever value the
/// request happens to carry for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFlags {
    pub has_frequency: bool,
    pub has_mode: bool,
    pub has_pb_width: bool,
    pub has_ant: bool,
    pub has_rit: bool,
    pub has_xit: bool,
    pub has_split: bool,
    pub has_tuning_step: bool,
    pub has_functions: bool,
    pub has_levels: bool,
    pub has_parameters: bool,
    pub has_ptt: bool,
    pub has_radio_on: bool,
    pub has_polling_interval: bool,
    pub has_sync_interval: bool,
}

impl UpdateFlags {
    pub const FREQUENCY: u16 = 1 << 0;
    pub const MODE: u16 = 1 << 1;
    pub const PB_WIDTH: u16 = 1 << 2;
    pub const ANT: u16 = 1 << 3;
    pub const RIT: u16 = 1 << 4;
    pub const XIT: u16 = 1 << 5;
    pub const SPLIT: u16 = 1 << 6;
    pub const TUNING_STEP: u16 = 1 << 7;
    pub const FUNCTIONS: u16 = 1 << 8;
    pub const LEVELS: u16 = 1 << 9;
    pub const PARAMETERS: u16 = 1 << 10;
    pub const PTT: u16 = 1 << 11;
    pub const RADIO_ON: u16 = 1 << 12;
    pub const POLLING_INTERVAL: u16 = 1 << 13;
    pub const SYNC_INTERVAL: u16 = 1 << 14;

    fn table(&self) -> [(u16, bool); 15] {
        [
            (Self::FREQUENCY, self.has_frequency),
            (Self::MODE, self.has_mode),
            (Self::PB_WIDTH, self.has_pb_width),
            (Self::ANT, self.has_ant),
            (Self::RIT, self.has_rit),
            (Self::XIT, self.has_xit),
            (Self::SPLIT, self.has_split),
            (Self::TUNING_STEP, self.has_tuning_step),
            (Self::FUNCTIONS, self.has_functions),
            (Self::LEVELS, self.has_levels),
            (Self::PARAMETERS, self.has_parameters),
            (Self::PTT, self.has_ptt),
            (Self::RADIO_ON, self.has_radio_on),
            (Self::POLLING_INTERVAL, self.has_polling_interval),
            (Self::SYNC_INTERVAL, self.has_sync_interval),
        ]
    }

    pub fn bits(&self) -> u16 {
        self.table()
            .iter()
            .filter(|(_, set)| *set)
            .fold(0, |acc, (bit, _)| acc | bit)
    }

    /// Unknown high bits are ignored.
    pub fn from_bits(bits: u16) -> Self {
        let has = |bit: u16| bits & bit != 0;
        Self {
            has_frequency: has(Self::FREQUENCY),
            has_mode: has(Self::MODE),
            has_pb_width: has(Self::PB_WIDTH),
            has_ant: has(Self::ANT),
            has_rit: has(Self::RIT),
            has_xit: has(Self::XIT),
            has_split: has(Self::SPLIT),
            has_tuning_step: has(Self::TUNING_STEP),
            has_functions: has(Self::FUNCTIONS),
            has_levels: has(Self::LEVELS),
            has_parameters: has(Self::PARAMETERS),
            has_ptt: has(Self::PTT),
            has_radio_on: has(Self::RADIO_ON),
            has_polling_interval: has(Self::POLLING_INTERVAL),
            has_sync_interval: has(Self::SYNC_INTERVAL),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }
}

/// Partial update sent by a controller to the server.
///
/// Built with the `with_*` methods, each of which stores the value and
/// raises the matching presence flag, so only fields the user touched are
/// ever applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub user_id: String,
    /// Switch to this VFO first when non-empty.
    pub current_vfo: String,
    /// VFO operations to execute, in order.
    pub vfo_operations: Vec<String>,
    pub vfo: VfoState,
    pub radio_on: bool,
    pub ptt: bool,
    pub polling_interval: i32,
    pub sync_interval: i32,
    pub md: UpdateFlags,
}

impl UpdateRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// True when applying the request cannot touch anything.
    pub fn is_empty(&self) -> bool {
        self.md.is_empty() && self.current_vfo.is_empty() && self.vfo_operations.is_empty()
    }

    pub fn with_current_vfo(mut self, vfo: &str) -> Self {
        self.current_vfo = vfo.to_string();
        self
    }

    pub fn with_vfo_op(mut self, op: &str) -> Self {
        self.vfo_operations.push(op.to_string());
        self
    }

    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.vfo.frequency = hz;
        self.md.has_frequency = true;
        self
    }

    /// `pb_width` of 0 keeps the current filter.
    pub fn with_mode(mut self, mode: &str, pb_width: i32) -> Self {
        self.vfo.mode = mode.to_string();
        self.vfo.pb_width = pb_width;
        self.md.has_mode = true;
        self
    }

    pub fn with_pb_width(mut self, hz: i32) -> Self {
        self.vfo.pb_width = hz;
        self.md.has_pb_width = true;
        self
    }

    pub fn with_ant(mut self, ant: i32) -> Self {
        self.vfo.ant = ant;
        self.md.has_ant = true;
        self
    }

    pub fn with_rit(mut self, hz: i32) -> Self {
        self.vfo.rit = hz;
        self.md.has_rit = true;
        self
    }

    pub fn with_xit(mut self, hz: i32) -> Self {
        self.vfo.xit = hz;
        self.md.has_xit = true;
        self
    }

    pub fn with_split(mut self, split: Split) -> Self {
        self.vfo.split = split;
        self.md.has_split = true;
        self
    }

    pub fn with_tuning_step(mut self, hz: i32) -> Self {
        self.vfo.tuning_step = hz;
        self.md.has_tuning_step = true;
        self
    }

    pub fn with_function(mut self, name: &str, on: bool) -> Self {
        self.vfo.functions.insert(name.to_string(), on);
        self.md.has_functions = true;
        self
    }

    pub fn with_level(mut self, name: &str, value: f32) -> Self {
        self.vfo.levels.insert(name.to_string(), value);
        self.md.has_levels = true;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: f32) -> Self {
        self.vfo.parameters.insert(name.to_string(), value);
        self.md.has_parameters = true;
        self
    }

    pub fn with_ptt(mut self, ptt: bool) -> Self {
        self.ptt = ptt;
        self.md.has_ptt = true;
        self
    }

    pub fn with_radio_on(mut self, on: bool) -> Self {
        self.radio_on = on;
        self.md.has_radio_on = true;
        self
    }

    pub fn with_polling_interval(mut self, ms: i32) -> Self {
        self.polling_interval = ms;
        self.md.has_polling_interval = true;
        self
    }

    pub fn with_sync_interval(mut self, secs: i32) -> Self {
        self.sync_interval = secs;
        self.md.has_sync_interval = true;
        self
    }
}
