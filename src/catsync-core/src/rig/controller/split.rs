// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Split (separate transmit VFO) handling.
//!
//! Devices are free to refuse split, or to drop it as a side effect of an
//! unrelated query, so every step is confirmed against the device and the
//! store ends up with whatever the device reports last.

use tracing::{debug, warn};

use crate::rig::names::{Mode, Vfo};
use crate::rig::response::RigError;
use crate::rig::state::Split;

use super::applier::{call, guarded, ApplyReport, ModeTarget, RigController};

/// How much of a split configuration is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SplitPhase {
    Disabled,
    VfoOnly,
    VfoFreq,
    VfoFreqMode,
}

impl SplitPhase {
    pub fn of(split: &Split) -> Self {
        if !split.enabled {
            SplitPhase::Disabled
        } else if split.frequency <= 0.0 {
            SplitPhase::VfoOnly
        } else if split.mode.is_empty() {
            SplitPhase::VfoFreq
        } else {
            SplitPhase::VfoFreqMode
        }
    }
}

impl RigController {
    pub(super) async fn update_split(&mut self, target: &Split, report: &mut ApplyReport) {
        let target = target.clone().normalized();
        let phase = SplitPhase::of(&target);
        debug!("Split update towards {:?}", phase);

        if phase == SplitPhase::Disabled {
            self.disable_split(report).await;
            return;
        }

        let vfo = self.vfo();
        let current = self.state().vfo.split.clone();
        let tx_name = if !target.vfo.is_empty() {
            target.vfo.clone()
        } else if !current.vfo.is_empty() {
            current.vfo.clone()
        } else {
            match vfo.opposite().name() {
                Ok(name) => name.to_string(),
                Err(e) => return report.fail("split", e),
            }
        };
        let tx = match Vfo::from_name(&tx_name) {
            Ok(v) => v,
            Err(e) => return report.fail("split", e),
        };

        let toggled = !current.enabled || current.vfo != tx_name;
        if toggled {
            if let Err(e) = call!(self.set_split_vfo(vfo, true, tx)).await {
                report.fail("split", e);
                self.confirm_split_vfo(vfo, &tx_name, report).await;
                return;
            }
        }
        if !self.confirm_split_vfo(vfo, &tx_name, report).await {
            return;
        }

        if phase >= SplitPhase::VfoFreq
            && (toggled || target.frequency != self.state().vfo.split.frequency)
        {
            self.update_split_freq(tx, target.frequency, report).await;
        } else if toggled {
            self.read_split_freq(tx, report).await;
        }

        if phase == SplitPhase::VfoFreqMode {
            let stored = &self.state().vfo.split;
            let pb_differs = target.pb_width > 0 && target.pb_width != stored.pb_width;
            if toggled || target.mode != stored.mode || pb_differs {
                self.update_split_mode(tx, &target.mode, target.pb_width, report)
                    .await;
            }
        } else if toggled {
            self.read_split_mode(tx, report).await;
        }

        self.recheck_split(vfo, report).await;
        report.ok("split");
    }

    /// The tx VFO and its frequency, mode and passband are dropped on every
    /// disable attempt; only `enabled` follows the device.
    async fn disable_split(&mut self, report: &mut ApplyReport) {
        let vfo = self.vfo();
        let tx = Vfo::from_name(&self.state().vfo.split.vfo).unwrap_or_else(|_| vfo.opposite());
        if let Err(e) = call!(self.set_split_vfo(vfo, false, tx)).await {
            self.clear_split_params();
            return report.fail("split", e);
        }
        if !self.caps().has_split {
            self.store.set_split(Split::default());
            return report.ok("split");
        }
        match call!(self.get_split_vfo(vfo)).await {
            Ok((false, _)) => {
                self.store.set_split(Split::default());
                report.ok("split");
            }
            Ok((true, _)) => {
                warn!("Rig kept split enabled after disable request");
                self.patch_split(|s| s.enabled = true);
                self.clear_split_params();
                report.fail(
                    "split",
                    RigError::invalid_state("split still enabled after disable"),
                );
            }
            Err(e) => {
                self.clear_split_params();
                report.fail("split", e);
            }
        }
    }

    fn clear_split_params(&mut self) {
        self.patch_split(|s| {
            s.vfo.clear();
            s.frequency = 0.0;
            s.mode.clear();
            s.pb_width = 0;
        });
    }

    /// Read back the enabled/tx pair after a toggle. Returns whether split
    /// is confirmed on.
    async fn confirm_split_vfo(
        &mut self,
        vfo: Vfo,
        requested_tx: &str,
        report: &mut ApplyReport,
    ) -> bool {
        if !self.caps().has_split {
            self.patch_split(|s| {
                s.enabled = true;
                s.vfo = requested_tx.to_string();
            });
            return true;
        }
        let (enabled, tx) = match call!(self.get_split_vfo(vfo)).await {
            Ok(pair) => pair,
            Err(e) => {
                report.fail("split", e);
                return false;
            }
        };
        if !enabled {
            warn!("Rig refused to enable split towards {}", requested_tx);
            self.store.set_split(Split::default());
            return false;
        }
        let tx_name = match tx.name() {
            Ok(name) => name,
            Err(e) => {
                report.fail("split", e);
                return false;
            }
        };
        if tx_name != requested_tx {
            warn!("split: requested tx {}, rig reports {}", requested_tx, tx_name);
        }
        self.patch_split(|s| {
            s.enabled = true;
            s.vfo = tx_name.to_string();
        });
        true
    }

    async fn update_split_freq(&mut self, tx: Vfo, hz: f64, report: &mut ApplyReport) {
        if let Err(e) = call!(self.set_split_freq(tx, hz)).await {
            return report.fail("split frequency", e);
        }
        if self.caps().has_split {
            if let Some(confirmed) = self.read_split_freq(tx, report).await {
                if confirmed != hz {
                    warn!(
                        "split frequency: requested {} Hz, rig reports {} Hz",
                        hz, confirmed
                    );
                }
            }
        } else {
            self.patch_split(|s| s.frequency = hz);
        }
    }

    async fn update_split_mode(
        &mut self,
        tx: Vfo,
        name: &str,
        pb_width: i32,
        report: &mut ApplyReport,
    ) {
        let mode = match self.resolve_mode(name) {
            Ok(m) => m,
            Err(e) => return report.fail("split mode", e),
        };
        let pb = if pb_width > 0 {
            pb_width
        } else {
            self.state().vfo.split.pb_width
        };
        if let Err(e) = self.set_mode_checked(ModeTarget::Split(tx), mode, pb).await {
            return report.fail("split mode", e);
        }
        if self.caps().has_split {
            if let Some(confirmed) = self.read_split_mode(tx, report).await {
                if confirmed != name {
                    warn!("split mode: requested {}, rig reports {}", name, confirmed);
                }
            }
        } else {
            let name = name.to_string();
            self.patch_split(|s| {
                s.mode = name;
                s.pb_width = pb;
            });
        }
    }

    /// Some firmwares drop split as a side effect of other split queries.
    async fn recheck_split(&mut self, vfo: Vfo, report: &mut ApplyReport) {
        if !self.caps().has_split {
            return;
        }
        match call!(self.get_split_vfo(vfo)).await {
            Ok((false, _)) => {
                if self.state().vfo.split.enabled {
                    warn!("Rig dropped split while it was being configured");
                }
                self.store.set_split(Split::default());
            }
            Ok((true, _)) => {}
            Err(e) => report.fail("split", e),
        }
    }

    /// Read the whole split sub-state from the device.
    pub(super) async fn read_split(&mut self, vfo: Vfo, report: &mut ApplyReport) {
        let (enabled, tx) = match call!(self.get_split_vfo(vfo)).await {
            Ok(pair) => pair,
            Err(e) => return report.fail("split", e),
        };
        if !enabled {
            self.store.set_split(Split::default());
            return;
        }
        let tx_name = match tx.name() {
            Ok(name) => name,
            Err(e) => return report.fail("split", e),
        };
        self.patch_split(|s| {
            s.enabled = true;
            s.vfo = tx_name.to_string();
        });
        self.read_split_freq(tx, report).await;
        self.read_split_mode(tx, report).await;
    }

    async fn read_split_freq(&mut self, tx: Vfo, report: &mut ApplyReport) -> Option<f64> {
        match call!(self.get_split_freq(tx)).await {
            Ok(hz) => {
                self.patch_split(|s| s.frequency = hz);
                Some(hz)
            }
            Err(e) => {
                report.fail("split frequency", e);
                None
            }
        }
    }

    async fn read_split_mode(&mut self, tx: Vfo, report: &mut ApplyReport) -> Option<String> {
        let (mode, pb) = match call!(self.get_split_mode(tx)).await {
            Ok(v) => v,
            Err(e) => {
                report.fail("split mode", e);
                return None;
            }
        };
        let name = match mode_name(mode) {
            Some(name) => name,
            None => {
                let err = RigError::unknown("mode", format!("{:#x}", mode.0));
                report.fail("split mode", err);
                return None;
            }
        };
        self.patch_split(|s| {
            s.mode = name.to_string();
            s.pb_width = pb;
        });
        Some(name.to_string())
    }

    fn patch_split(&mut self, f: impl FnOnce(&mut Split)) -> bool {
        let mut split = self.state().vfo.split.clone();
        f(&mut split);
        self.store.set_split(split)
    }
}

/// Split mode 0 means "no separate transmit mode".
fn mode_name(mode: Mode) -> Option<&'static str> {
    if mode.0 == 0 {
        return Some("");
    }
    mode.name().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::controller::mock::{mock_caps, MockRig};
    use crate::rig::controller::SessionConfig;
    use crate::rig::request::UpdateRequest;

    async fn ready() -> (RigController, MockRig) {
        let rig = MockRig::new(mock_caps());
        let mut ctl = RigController::new(Box::new(rig.clone()), SessionConfig::default());
        ctl.query_state().await;
        rig.clear_calls();
        (ctl, rig)
    }

    fn split(vfo: &str, hz: f64, mode: &str, pb: i32) -> Split {
        Split {
            enabled: true,
            vfo: vfo.to_string(),
            frequency: hz,
            mode: mode.to_string(),
            pb_width: pb,
        }
    }

    #[test]
    fn test_phase_of() {
        assert_eq!(SplitPhase::of(&Split::default()), SplitPhase::Disabled);
        assert_eq!(SplitPhase::of(&Split::on("VFOB")), SplitPhase::VfoOnly);
        assert_eq!(
            SplitPhase::of(&split("VFOB", 14_080_000.0, "", 0)),
            SplitPhase::VfoFreq
        );
        assert_eq!(
            SplitPhase::of(&split("VFOB", 14_080_000.0, "USB", 0)),
            SplitPhase::VfoFreqMode
        );
        let mut off = split("VFOB", 14_080_000.0, "USB", 2400);
        off.enabled = false;
        assert_eq!(SplitPhase::of(&off), SplitPhase::Disabled);
    }

    #[tokio::test]
    async fn test_enable_full_split() {
        let (mut ctl, _rig) = ready().await;
        let req = UpdateRequest::new("op").with_split(split("VFOB", 14_080_000.0, "CW", 500));
        let report = ctl.apply(&req).await;
        assert!(report.is_clean(), "{:?}", report.failed);
        assert_eq!(
            ctl.state().vfo.split,
            split("VFOB", 14_080_000.0, "CW", 500)
        );
    }

    #[tokio::test]
    async fn test_enable_defaults_to_opposite_vfo() {
        let (mut ctl, rig) = ready().await;
        let req = UpdateRequest::new("op").with_split(Split {
            enabled: true,
            ..Default::default()
        });
        ctl.apply(&req).await;
        assert!(ctl.state().vfo.split.enabled);
        assert_eq!(ctl.state().vfo.split.vfo, "VFOB");
        assert_eq!(rig.device().split_tx, Vfo::VFOB);
    }

    #[tokio::test]
    async fn test_refused_split_stays_disabled() {
        let (mut ctl, rig) = ready().await;
        rig.device().refuse_split = true;
        let req = UpdateRequest::new("op").with_split(split("VFOB", 14_080_000.0, "USB", 0));
        ctl.apply(&req).await;
        assert_eq!(ctl.state().vfo.split, Split::default());
        assert!(!rig.calls().contains(&"set_split_freq"));
    }

    #[tokio::test]
    async fn test_disable_clears_dependent_fields() {
        let (mut ctl, _rig) = ready().await;
        ctl.apply(&UpdateRequest::new("op").with_split(split("VFOB", 7_010_000.0, "CW", 500)))
            .await;
        assert!(ctl.state().vfo.split.enabled);

        let mut off = split("VFOB", 7_020_000.0, "LSB", 2400);
        off.enabled = false;
        let report = ctl.apply(&UpdateRequest::new("op").with_split(off)).await;
        assert!(report.is_clean());
        assert_eq!(ctl.state().vfo.split, Split::default());
    }

    #[tokio::test]
    async fn test_ignored_disable_is_reported() {
        let (mut ctl, rig) = ready().await;
        ctl.apply(&UpdateRequest::new("op").with_split(split("VFOB", 7_010_000.0, "CW", 500)))
            .await;
        rig.device().refuse_split_off = true;

        let report = ctl
            .apply(&UpdateRequest::new("op").with_split(Split::default()))
            .await;
        assert!(report.has_failed("split"));
        assert!(!report.applied.contains(&"split".to_string()));
        assert_eq!(
            ctl.state().vfo.split,
            Split {
                enabled: true,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_split_dropped_by_device_is_cleared() {
        let (mut ctl, rig) = ready().await;
        rig.device().split_drops_on_freq_read = true;
        ctl.apply(&UpdateRequest::new("op").with_split(split("VFOB", 14_080_000.0, "", 0)))
            .await;
        assert_eq!(ctl.state().vfo.split, Split::default());
    }

    #[tokio::test]
    async fn test_split_mode_uses_passband_fallback() {
        let (mut ctl, rig) = ready().await;
        rig.device().max_pb = Some(3000);
        let report = ctl
            .apply(&UpdateRequest::new("op").with_split(split("VFOB", 14_080_000.0, "CW", 9000)))
            .await;
        assert!(report.is_clean(), "{:?}", report.failed);
        assert!(rig.calls().contains(&"get_pb_normal"));
        assert_eq!(ctl.state().vfo.split.mode, "CW");
        assert_eq!(ctl.state().vfo.split.pb_width, 500);
    }

    #[tokio::test]
    async fn test_split_frequency_only_change() {
        let (mut ctl, rig) = ready().await;
        ctl.apply(&UpdateRequest::new("op").with_split(split("VFOB", 14_080_000.0, "USB", 2400)))
            .await;
        rig.clear_calls();
        ctl.apply(&UpdateRequest::new("op").with_split(split("VFOB", 14_081_000.0, "USB", 2400)))
            .await;
        let calls = rig.calls();
        assert!(!calls.contains(&"set_split_vfo"));
        assert!(!calls.contains(&"set_split_mode"));
        assert!(calls.contains(&"set_split_freq"));
        assert_eq!(ctl.state().vfo.split.frequency, 14_081_000.0);
    }
}
