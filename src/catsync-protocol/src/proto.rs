// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Protobuf bodies of the bus messages.
//!
//! Field numbers are part of the wire contract: never renumber, only add.

use std::collections::BTreeMap;

use prost::Message;

use catsync_core::{Capabilities, Split, State, UpdateFlags, UpdateRequest, ValueRange, VfoState};

use crate::types::{Ping, Status};

#[derive(Clone, PartialEq, Message)]
pub struct ValueRangeMsg {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(float, tag = "2")]
    pub min: f32,
    #[prost(float, tag = "3")]
    pub max: f32,
    #[prost(float, tag = "4")]
    pub step: f32,
}

/// Map values cannot be repeated directly.
#[derive(Clone, PartialEq, Message)]
pub struct IntList {
    #[prost(int32, repeated, tag = "1")]
    pub values: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SplitMsg {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(string, tag = "2")]
    pub vfo: String,
    #[prost(double, tag = "3")]
    pub frequency: f64,
    #[prost(string, tag = "4")]
    pub mode: String,
    #[prost(int32, tag = "5")]
    pub pb_width: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VfoMsg {
    #[prost(double, tag = "1")]
    pub frequency: f64,
    #[prost(string, tag = "2")]
    pub mode: String,
    #[prost(int32, tag = "3")]
    pub pb_width: i32,
    #[prost(int32, tag = "4")]
    pub ant: i32,
    #[prost(sint32, tag = "5")]
    pub rit: i32,
    #[prost(sint32, tag = "6")]
    pub xit: i32,
    #[prost(message, optional, tag = "7")]
    pub split: Option<SplitMsg>,
    #[prost(int32, tag = "8")]
    pub tuning_step: i32,
    #[prost(btree_map = "string, bool", tag = "9")]
    pub functions: BTreeMap<String, bool>,
    #[prost(btree_map = "string, float", tag = "10")]
    pub levels: BTreeMap<String, f32>,
    #[prost(btree_map = "string, float", tag = "11")]
    pub parameters: BTreeMap<String, f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StateMsg {
    #[prost(string, tag = "1")]
    pub current_vfo: String,
    #[prost(message, optional, tag = "2")]
    pub vfo: Option<VfoMsg>,
    #[prost(bool, tag = "3")]
    pub radio_on: bool,
    #[prost(bool, tag = "4")]
    pub ptt: bool,
    #[prost(int32, tag = "5")]
    pub polling_interval: i32,
    #[prost(int32, tag = "6")]
    pub sync_interval: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct UpdateMsg {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(string, tag = "2")]
    pub current_vfo: String,
    #[prost(string, repeated, tag = "3")]
    pub vfo_operations: Vec<String>,
    #[prost(message, optional, tag = "4")]
    pub vfo: Option<VfoMsg>,
    #[prost(bool, tag = "5")]
    pub radio_on: bool,
    #[prost(bool, tag = "6")]
    pub ptt: bool,
    #[prost(int32, tag = "7")]
    pub polling_interval: i32,
    #[prost(int32, tag = "8")]
    pub sync_interval: i32,
    /// Field-presence bitmap, see [`UpdateFlags`].
    #[prost(uint32, tag = "9")]
    pub md: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct CapsMsg {
    #[prost(int32, tag = "1")]
    pub rig_model: i32,
    #[prost(string, tag = "2")]
    pub mfg_name: String,
    #[prost(string, tag = "3")]
    pub model_name: String,
    #[prost(string, tag = "4")]
    pub version: String,
    #[prost(string, tag = "5")]
    pub status: String,
    #[prost(string, repeated, tag = "6")]
    pub vfos: Vec<String>,
    #[prost(string, repeated, tag = "7")]
    pub modes: Vec<String>,
    #[prost(string, repeated, tag = "8")]
    pub vfo_ops: Vec<String>,
    #[prost(string, repeated, tag = "9")]
    pub get_functions: Vec<String>,
    #[prost(string, repeated, tag = "10")]
    pub set_functions: Vec<String>,
    #[prost(message, repeated, tag = "11")]
    pub get_levels: Vec<ValueRangeMsg>,
    #[prost(message, repeated, tag = "12")]
    pub set_levels: Vec<ValueRangeMsg>,
    #[prost(message, repeated, tag = "13")]
    pub get_parameters: Vec<ValueRangeMsg>,
    #[prost(message, repeated, tag = "14")]
    pub set_parameters: Vec<ValueRangeMsg>,
    #[prost(btree_map = "string, message", tag = "15")]
    pub filters: BTreeMap<String, IntList>,
    #[prost(btree_map = "string, message", tag = "16")]
    pub tuning_steps: BTreeMap<String, IntList>,
    #[prost(int32, repeated, tag = "17")]
    pub preamps: Vec<i32>,
    #[prost(int32, repeated, tag = "18")]
    pub attenuators: Vec<i32>,
    #[prost(int32, tag = "19")]
    pub max_rit: i32,
    #[prost(int32, tag = "20")]
    pub max_xit: i32,
    #[prost(int32, tag = "21")]
    pub max_if_shift: i32,
    #[prost(bool, tag = "22")]
    pub has_power_stat: bool,
    #[prost(bool, tag = "23")]
    pub has_vfo: bool,
    #[prost(bool, tag = "24")]
    pub has_freq: bool,
    #[prost(bool, tag = "25")]
    pub has_mode: bool,
    #[prost(bool, tag = "26")]
    pub has_ptt: bool,
    #[prost(bool, tag = "27")]
    pub has_rit: bool,
    #[prost(bool, tag = "28")]
    pub has_xit: bool,
    #[prost(bool, tag = "29")]
    pub has_split: bool,
    #[prost(bool, tag = "30")]
    pub has_ts: bool,
    #[prost(bool, tag = "31")]
    pub has_ant: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct StatusMsg {
    #[prost(bool, tag = "1")]
    pub online: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct PingMsg {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(int64, tag = "2")]
    pub timestamp_ns: i64,
}

impl From<&ValueRange> for ValueRangeMsg {
    fn from(r: &ValueRange) -> Self {
        Self {
            name: r.name.clone(),
            min: r.min,
            max: r.max,
            step: r.step,
        }
    }
}

impl From<ValueRangeMsg> for ValueRange {
    fn from(r: ValueRangeMsg) -> Self {
        Self {
            name: r.name,
            min: r.min,
            max: r.max,
            step: r.step,
        }
    }
}

impl From<&Split> for SplitMsg {
    fn from(s: &Split) -> Self {
        Self {
            enabled: s.enabled,
            vfo: s.vfo.clone(),
            frequency: s.frequency,
            mode: s.mode.clone(),
            pb_width: s.pb_width,
        }
    }
}

impl From<SplitMsg> for Split {
    fn from(s: SplitMsg) -> Self {
        Self {
            enabled: s.enabled,
            vfo: s.vfo,
            frequency: s.frequency,
            mode: s.mode,
            pb_width: s.pb_width,
        }
    }
}

impl From<&VfoState> for VfoMsg {
    fn from(v: &VfoState) -> Self {
        Self {
            frequency: v.frequency,
            mode: v.mode.clone(),
            pb_width: v.pb_width,
            ant: v.ant,
            rit: v.rit,
            xit: v.xit,
            split: Some(SplitMsg::from(&v.split)),
            tuning_step: v.tuning_step,
            functions: v.functions.clone(),
            levels: v.levels.clone(),
            parameters: v.parameters.clone(),
        }
    }
}

impl From<VfoMsg> for VfoState {
    fn from(v: VfoMsg) -> Self {
        Self {
            frequency: v.frequency,
            mode: v.mode,
            pb_width: v.pb_width,
            ant: v.ant,
            rit: v.rit,
            xit: v.xit,
            split: v.split.map(Split::from).unwrap_or_default(),
            tuning_step: v.tuning_step,
            functions: v.functions,
            levels: v.levels,
            parameters: v.parameters,
        }
    }
}

impl From<&State> for StateMsg {
    fn from(s: &State) -> Self {
        Self {
            current_vfo: s.current_vfo.clone(),
            vfo: Some(VfoMsg::from(&s.vfo)),
            radio_on: s.radio_on,
            ptt: s.ptt,
            polling_interval: s.polling_interval,
            sync_interval: s.sync_interval,
        }
    }
}

impl From<StateMsg> for State {
    fn from(s: StateMsg) -> Self {
        Self {
            current_vfo: s.current_vfo,
            vfo: s.vfo.map(VfoState::from).unwrap_or_default(),
            radio_on: s.radio_on,
            ptt: s.ptt,
            polling_interval: s.polling_interval,
            sync_interval: s.sync_interval,
        }
    }
}

impl From<&UpdateRequest> for UpdateMsg {
    fn from(r: &UpdateRequest) -> Self {
        Self {
            user_id: r.user_id.clone(),
            current_vfo: r.current_vfo.clone(),
            vfo_operations: r.vfo_operations.clone(),
            vfo: Some(VfoMsg::from(&r.vfo)),
            radio_on: r.radio_on,
            ptt: r.ptt,
            polling_interval: r.polling_interval,
            sync_interval: r.sync_interval,
            md: u32::from(r.md.bits()),
        }
    }
}

impl From<UpdateMsg> for UpdateRequest {
    fn from(r: UpdateMsg) -> Self {
        Self {
            user_id: r.user_id,
            current_vfo: r.current_vfo,
            vfo_operations: r.vfo_operations,
            vfo: r.vfo.map(VfoState::from).unwrap_or_default(),
            radio_on: r.radio_on,
            ptt: r.ptt,
            polling_interval: r.polling_interval,
            sync_interval: r.sync_interval,
            // bits above the known flags are dropped
            md: UpdateFlags::from_bits((r.md & 0xffff) as u16),
        }
    }
}

fn lists_to_wire(map: &BTreeMap<String, Vec<i32>>) -> BTreeMap<String, IntList> {
    map.iter()
        .map(|(k, v)| (k.clone(), IntList { values: v.clone() }))
        .collect()
}

fn lists_from_wire(map: BTreeMap<String, IntList>) -> BTreeMap<String, Vec<i32>> {
    map.into_iter().map(|(k, v)| (k, v.values)).collect()
}

fn ranges_to_wire(list: &[ValueRange]) -> Vec<ValueRangeMsg> {
    list.iter().map(ValueRangeMsg::from).collect()
}

fn ranges_from_wire(list: Vec<ValueRangeMsg>) -> Vec<ValueRange> {
    list.into_iter().map(ValueRange::from).collect()
}

impl From<&Capabilities> for CapsMsg {
    fn from(c: &Capabilities) -> Self {
        Self {
            rig_model: c.rig_model,
            mfg_name: c.mfg_name.clone(),
            model_name: c.model_name.clone(),
            version: c.version.clone(),
            status: c.status.clone(),
            vfos: c.vfos.clone(),
            modes: c.modes.clone(),
            vfo_ops: c.vfo_ops.clone(),
            get_functions: c.get_functions.clone(),
            set_functions: c.set_functions.clone(),
            get_levels: ranges_to_wire(&c.get_levels),
            set_levels: ranges_to_wire(&c.set_levels),
            get_parameters: ranges_to_wire(&c.get_parameters),
            set_parameters: ranges_to_wire(&c.set_parameters),
            filters: lists_to_wire(&c.filters),
            tuning_steps: lists_to_wire(&c.tuning_steps),
            preamps: c.preamps.clone(),
            attenuators: c.attenuators.clone(),
            max_rit: c.max_rit,
            max_xit: c.max_xit,
            max_if_shift: c.max_if_shift,
            has_power_stat: c.has_power_stat,
            has_vfo: c.has_vfo,
            has_freq: c.has_freq,
            has_mode: c.has_mode,
            has_ptt: c.has_ptt,
            has_rit: c.has_rit,
            has_xit: c.has_xit,
            has_split: c.has_split,
            has_ts: c.has_ts,
            has_ant: c.has_ant,
        }
    }
}

impl From<CapsMsg> for Capabilities {
    fn from(c: CapsMsg) -> Self {
        Self {
            rig_model: c.rig_model,
            mfg_name: c.mfg_name,
            model_name: c.model_name,
            version: c.version,
            status: c.status,
            vfos: c.vfos,
            modes: c.modes,
            vfo_ops: c.vfo_ops,
            get_functions: c.get_functions,
            set_functions: c.set_functions,
            get_levels: ranges_from_wire(c.get_levels),
            set_levels: ranges_from_wire(c.set_levels),
            get_parameters: ranges_from_wire(c.get_parameters),
            set_parameters: ranges_from_wire(c.set_parameters),
            filters: lists_from_wire(c.filters),
            tuning_steps: lists_from_wire(c.tuning_steps),
            preamps: c.preamps,
            attenuators: c.attenuators,
            max_rit: c.max_rit,
            max_xit: c.max_xit,
            max_if_shift: c.max_if_shift,
            has_power_stat: c.has_power_stat,
            has_vfo: c.has_vfo,
            has_freq: c.has_freq,
            has_mode: c.has_mode,
            has_ptt: c.has_ptt,
            has_rit: c.has_rit,
            has_xit: c.has_xit,
            has_split: c.has_split,
            has_ts: c.has_ts,
            has_ant: c.has_ant,
        }
    }
}

impl From<&Status> for StatusMsg {
    fn from(s: &Status) -> Self {
        Self { online: s.online }
    }
}

impl From<StatusMsg> for Status {
    fn from(s: StatusMsg) -> Self {
        Self { online: s.online }
    }
}

impl From<&Ping> for PingMsg {
    fn from(p: &Ping) -> Self {
        Self {
            user_id: p.user_id.clone(),
            timestamp_ns: p.timestamp_ns,
        }
    }
}

impl From<PingMsg> for Ping {
    fn from(p: PingMsg) -> Self {
        Self {
            user_id: p.user_id,
            timestamp_ns: p.timestamp_ns,
        }
    }
}
