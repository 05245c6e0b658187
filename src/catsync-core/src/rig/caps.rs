// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Legal range of a level or parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl ValueRange {
    pub fn new(name: &str, min: f32, max: f32, step: f32) -> Self {
        Self {
            name: name.to_string(),
            min,
            max,
            step,
        }
    }
}

/// Immutable descriptor of what the connected device can do.
///
/// Built once when the session opens. The `has_*` flags say whether a field
/// can be read back from the device at all; fields that cannot be read are
/// stored as requested after a successful set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub rig_model: i32,
    pub mfg_name: String,
    pub model_name: String,
    pub version: String,
    /// Driver maturity ("Stable", "Beta", ...).
    pub status: String,
    pub vfos: Vec<String>,
    pub modes: Vec<String>,
    pub vfo_ops: Vec<String>,
    pub get_functions: Vec<String>,
    pub set_functions: Vec<String>,
    pub get_levels: Vec<ValueRange>,
    pub set_levels: Vec<ValueRange>,
    pub get_parameters: Vec<ValueRange>,
    pub set_parameters: Vec<ValueRange>,
    /// Mode name -> available filter widths (Hz).
    pub filters: BTreeMap<String, Vec<i32>>,
    /// Mode name -> available tuning steps (Hz).
    pub tuning_steps: BTreeMap<String, Vec<i32>>,
    pub preamps: Vec<i32>,
    pub attenuators: Vec<i32>,
    pub max_rit: i32,
    pub max_xit: i32,
    pub max_if_shift: i32,
    pub has_power_stat: bool,
    pub has_vfo: bool,
    pub has_freq: bool,
    pub has_mode: bool,
    pub has_ptt: bool,
    pub has_rit: bool,
    pub has_xit: bool,
    pub has_split: bool,
    pub has_ts: bool,
    pub has_ant: bool,
}

impl Capabilities {
    pub fn can_get_function(&self, name: &str) -> bool {
        self.get_functions.iter().any(|f| f == name)
    }

    pub fn can_set_function(&self, name: &str) -> bool {
        self.set_functions.iter().any(|f| f == name)
    }

    pub fn can_get_level(&self, name: &str) -> bool {
        find_range(&self.get_levels, name).is_some()
    }

    pub fn can_set_level(&self, name: &str) -> bool {
        find_range(&self.set_levels, name).is_some()
    }

    pub fn can_get_parameter(&self, name: &str) -> bool {
        find_range(&self.get_parameters, name).is_some()
    }

    pub fn can_set_parameter(&self, name: &str) -> bool {
        find_range(&self.set_parameters, name).is_some()
    }

    pub fn supports_vfo_op(&self, name: &str) -> bool {
        self.vfo_ops.iter().any(|op| op == name)
    }

    pub fn supports_mode(&self, name: &str) -> bool {
        self.modes.iter().any(|m| m == name)
    }

    pub fn level_range(&self, name: &str) -> Option<&ValueRange> {
        find_range(&self.set_levels, name).or_else(|| find_range(&self.get_levels, name))
    }

    /// Whether power status can be read. A device that cannot report it is
    /// treated as permanently on.
    pub fn assumes_always_on(&self) -> bool {
        !self.has_power_stat
    }
}

fn find_range<'a>(ranges: &'a [ValueRange], name: &str) -> Option<&'a ValueRange> {
    ranges.iter().find(|r| r.name == name)
}
