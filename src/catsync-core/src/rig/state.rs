// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rig::caps::Capabilities;

/// Transmit side of a split operation.
///
/// When `enabled` is false every other field is at its zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub enabled: bool,
    pub vfo: String,
    pub frequency: f64,
    pub mode: String,
    pub pb_width: i32,
}

impl Split {
    /// Enabled split towards `vfo` with no frequency or mode known yet.
    pub fn on(vfo: &str) -> Self {
        Self {
            enabled: true,
            vfo: vfo.to_string(),
            ..Default::default()
        }
    }

    /// Apply the disabled-means-empty rule.
    pub fn normalized(self) -> Self {
        if self.enabled {
            self
        } else {
            Self::default()
        }
    }
}

/// Settings of the active VFO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VfoState {
    /// Hz
    pub frequency: f64,
    pub mode: String,
    /// Filter bandwidth, Hz
    pub pb_width: i32,
    pub ant: i32,
    pub rit: i32,
    pub xit: i32,
    pub split: Split,
    pub tuning_step: i32,
    pub functions: BTreeMap<String, bool>,
    pub levels: BTreeMap<String, f32>,
    pub parameters: BTreeMap<String, f32>,
}

/// Full snapshot of the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub current_vfo: String,
    pub vfo: VfoState,
    pub radio_on: bool,
    pub ptt: bool,
    /// Meter refresh period in milliseconds, 0 = stopped.
    pub polling_interval: i32,
    /// Full resync period in seconds, 0 = stopped.
    pub sync_interval: i32,
}

/// The canonical, single-writer copy of [`State`].
///
/// Reads are public; every mutation goes through the controller in this
/// crate. Each mutator reports whether the stored value changed and marks
/// the store dirty so the owner knows a new snapshot must be published.
#[derive(Debug, Clone)]
pub struct RigStore {
    state: State,
    caps: Arc<Capabilities>,
    dirty: bool,
}

impl RigStore {
    pub fn new(caps: Arc<Capabilities>) -> Self {
        Self {
            state: State::default(),
            caps,
            dirty: false,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub fn caps_arc(&self) -> Arc<Capabilities> {
        Arc::clone(&self.caps)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning its previous value.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn set_current_vfo(&mut self, name: &str) -> bool {
        if self.state.current_vfo == name {
            return false;
        }
        self.state.current_vfo = name.to_string();
        self.dirty = true;
        true
    }

    pub(crate) fn set_frequency(&mut self, hz: f64) -> bool {
        assign(&mut self.state.vfo.frequency, hz, &mut self.dirty)
    }

    pub(crate) fn set_mode(&mut self, mode: &str, pb_width: i32) -> bool {
        let mut changed = false;
        if self.state.vfo.mode != mode {
            self.state.vfo.mode = mode.to_string();
            changed = true;
        }
        changed |= assign(&mut self.state.vfo.pb_width, pb_width, &mut self.dirty);
        self.dirty |= changed;
        changed
    }

    pub(crate) fn set_ant(&mut self, ant: i32) -> bool {
        assign(&mut self.state.vfo.ant, ant, &mut self.dirty)
    }

    pub(crate) fn set_rit(&mut self, rit: i32) -> bool {
        assign(&mut self.state.vfo.rit, rit, &mut self.dirty)
    }

    pub(crate) fn set_xit(&mut self, xit: i32) -> bool {
        assign(&mut self.state.vfo.xit, xit, &mut self.dirty)
    }

    pub(crate) fn set_tuning_step(&mut self, ts: i32) -> bool {
        assign(&mut self.state.vfo.tuning_step, ts, &mut self.dirty)
    }

    pub(crate) fn set_split(&mut self, split: Split) -> bool {
        assign(&mut self.state.vfo.split, split.normalized(), &mut self.dirty)
    }

    pub(crate) fn set_function(&mut self, name: &str, on: bool) -> bool {
        if !self.caps.can_get_function(name) {
            debug!("Not storing function {}: not readable on this rig", name);
            return false;
        }
        insert(&mut self.state.vfo.functions, name, on, &mut self.dirty)
    }

    pub(crate) fn set_level(&mut self, name: &str, value: f32) -> bool {
        if !self.caps.can_get_level(name) {
            debug!("Not storing level {}: not readable on this rig", name);
            return false;
        }
        insert(&mut self.state.vfo.levels, name, value, &mut self.dirty)
    }

    pub(crate) fn set_parameter(&mut self, name: &str, value: f32) -> bool {
        if !self.caps.can_get_parameter(name) {
            debug!("Not storing parameter {}: not readable on this rig", name);
            return false;
        }
        insert(&mut self.state.vfo.parameters, name, value, &mut self.dirty)
    }

    pub(crate) fn set_radio_on(&mut self, on: bool) -> bool {
        assign(&mut self.state.radio_on, on, &mut self.dirty)
    }

    pub(crate) fn set_ptt(&mut self, ptt: bool) -> bool {
        assign(&mut self.state.ptt, ptt, &mut self.dirty)
    }

    pub(crate) fn set_polling_interval(&mut self, ms: i32) -> bool {
        assign(&mut self.state.polling_interval, ms, &mut self.dirty)
    }

    pub(crate) fn set_sync_interval(&mut self, secs: i32) -> bool {
        assign(&mut self.state.sync_interval, secs, &mut self.dirty)
    }

    /// Drop everything that only makes sense while the device is powered.
    pub(crate) fn reset_on_power_off(&mut self) {
        let cleared = VfoState::default();
        if self.state.vfo != cleared {
            self.state.vfo = cleared;
            self.dirty = true;
        }
        assign(&mut self.state.radio_on, false, &mut self.dirty);
        assign(&mut self.state.ptt, false, &mut self.dirty);
    }
}

fn assign<T: PartialEq>(slot: &mut T, value: T, dirty: &mut bool) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    *dirty = true;
    true
}

fn insert<V: PartialEq + Copy>(
    map: &mut BTreeMap<String, V>,
    name: &str,
    value: V,
    dirty: &mut bool,
) -> bool {
    if map.get(name) == Some(&value) {
        return false;
    }
    map.insert(name.to_string(), value);
    *dirty = true;
    true
}
