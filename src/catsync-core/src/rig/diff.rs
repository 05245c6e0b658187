// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Field-level comparison of two [`State`] snapshots.

use std::fmt;

use crate::rig::state::State;

/// A top-level field of [`State`] as seen by observers.
///
/// `Split` and the three maps are compared as a whole: any difference
/// inside them yields a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    CurrentVfo,
    Frequency,
    Mode,
    PbWidth,
    Antenna,
    Rit,
    Xit,
    Split,
    TuningStep,
    Functions,
    Levels,
    Parameters,
    RadioOn,
    Ptt,
    PollingInterval,
    SyncInterval,
}

impl StateField {
    /// Every field, in snapshot order.
    pub const ALL: [StateField; 16] = [
        StateField::CurrentVfo,
        StateField::Frequency,
        StateField::Mode,
        StateField::PbWidth,
        StateField::Antenna,
        StateField::Rit,
        StateField::Xit,
        StateField::Split,
        StateField::TuningStep,
        StateField::Functions,
        StateField::Levels,
        StateField::Parameters,
        StateField::RadioOn,
        StateField::Ptt,
        StateField::PollingInterval,
        StateField::SyncInterval,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StateField::CurrentVfo => "current_vfo",
            StateField::Frequency => "frequency",
            StateField::Mode => "mode",
            StateField::PbWidth => "pb_width",
            StateField::Antenna => "antenna",
            StateField::Rit => "rit",
            StateField::Xit => "xit",
            StateField::Split => "split",
            StateField::TuningStep => "tuning_step",
            StateField::Functions => "functions",
            StateField::Levels => "levels",
            StateField::Parameters => "parameters",
            StateField::RadioOn => "radio_on",
            StateField::Ptt => "ptt",
            StateField::PollingInterval => "polling_interval",
            StateField::SyncInterval => "sync_interval",
        }
    }

    /// Render this field of `state` for display.
    pub fn describe(self, state: &State) -> String {
        let vfo = &state.vfo;
        match self {
            StateField::CurrentVfo => state.current_vfo.clone(),
            StateField::Frequency => format!("{:.3} kHz", vfo.frequency / 1000.0),
            StateField::Mode => vfo.mode.clone(),
            StateField::PbWidth => format!("{} Hz", vfo.pb_width),
            StateField::Antenna => vfo.ant.to_string(),
            StateField::Rit => format!("{} Hz", vfo.rit),
            StateField::Xit => format!("{} Hz", vfo.xit),
            StateField::Split => {
                let split = &vfo.split;
                if split.enabled {
                    format!(
                        "on (tx {} {:.3} kHz {} {} Hz)",
                        split.vfo,
                        split.frequency / 1000.0,
                        split.mode,
                        split.pb_width
                    )
                } else {
                    "off".to_string()
                }
            }
            StateField::TuningStep => format!("{} Hz", vfo.tuning_step),
            StateField::Functions => {
                let on: Vec<&str> = vfo
                    .functions
                    .iter()
                    .filter(|(_, on)| **on)
                    .map(|(name, _)| name.as_str())
                    .collect();
                format!("[{}]", on.join(", "))
            }
            StateField::Levels => format_map(vfo.levels.iter()),
            StateField::Parameters => format_map(vfo.parameters.iter()),
            StateField::RadioOn => on_off(state.radio_on).to_string(),
            StateField::Ptt => on_off(state.ptt).to_string(),
            StateField::PollingInterval => format!("{} ms", state.polling_interval),
            StateField::SyncInterval => format!("{} s", state.sync_interval),
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

fn format_map<'a>(entries: impl Iterator<Item = (&'a String, &'a f32)>) -> String {
    let parts: Vec<String> = entries.map(|(k, v)| format!("{}={:.2}", k, v)).collect();
    format!("[{}]", parts.join(", "))
}

/// List the fields that differ between `old` and `new`, in declaration order.
pub fn diff_state(old: &State, new: &State) -> Vec<StateField> {
    let (a, b) = (&old.vfo, &new.vfo);
    let checks = [
        (StateField::CurrentVfo, old.current_vfo != new.current_vfo),
        (StateField::Frequency, a.frequency != b.frequency),
        (StateField::Mode, a.mode != b.mode),
        (StateField::PbWidth, a.pb_width != b.pb_width),
        (StateField::Antenna, a.ant != b.ant),
        (StateField::Rit, a.rit != b.rit),
        (StateField::Xit, a.xit != b.xit),
        (StateField::Split, a.split != b.split),
        (StateField::TuningStep, a.tuning_step != b.tuning_step),
        (StateField::Functions, a.functions != b.functions),
        (StateField::Levels, a.levels != b.levels),
        (StateField::Parameters, a.parameters != b.parameters),
        (StateField::RadioOn, old.radio_on != new.radio_on),
        (StateField::Ptt, old.ptt != new.ptt),
        (
            StateField::PollingInterval,
            old.polling_interval != new.polling_interval,
        ),
        (StateField::SyncInterval, old.sync_interval != new.sync_interval),
    ];
    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::state::Split;

    fn base() -> State {
        let mut state = State {
            current_vfo: "VFOA".to_string(),
            radio_on: true,
            polling_interval: 100,
            sync_interval: 5,
            ..Default::default()
        };
        state.vfo.frequency = 14_074_000.0;
        state.vfo.mode = "USB".to_string();
        state.vfo.levels.insert("STRENGTH".to_string(), -20.0);
        state
    }

    #[test]
    fn test_identical_states_have_no_diff() {
        assert!(diff_state(&base(), &base()).is_empty());
    }

    #[test]
    fn test_ptt_only_change_yields_one_field() {
        let old = base();
        let mut new = base();
        new.ptt = true;
        assert_eq!(diff_state(&old, &new), vec![StateField::Ptt]);
    }

    #[test]
    fn test_nested_changes_collapse_per_field() {
        let old = base();
        let mut new = base();
        new.vfo.split = Split::on("VFOB");
        new.vfo.split.frequency = 14_080_000.0;
        new.vfo.levels.insert("STRENGTH".to_string(), -10.0);
        new.vfo.levels.insert("AF".to_string(), 0.5);
        assert_eq!(
            diff_state(&old, &new),
            vec![StateField::Split, StateField::Levels]
        );
    }

    #[test]
    fn test_describe() {
        let mut state = base();
        assert_eq!(StateField::Frequency.describe(&state), "14074.000 kHz");
        assert_eq!(StateField::Split.describe(&state), "off");
        state.vfo.functions.insert("NB".to_string(), true);
        state.vfo.functions.insert("NR".to_string(), false);
        assert_eq!(StateField::Functions.describe(&state), "[NB]");
        assert_eq!(StateField::Levels.describe(&state), "[STRENGTH=-20.00]");
    }
}
