// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Applies partial update requests to the device.
//!
//! Every write is followed by a read-back where the device allows it, and
//! the store only ever receives the value the device reports. Failures are
//! scoped to the field being processed; the rest of the request carries on.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use crate::rig::caps::Capabilities;
use crate::rig::names::{Func, Level, Mode, Parm, Vfo, VfoOp};
use crate::rig::request::UpdateRequest;
use crate::rig::response::{RigError, RigResult};
use crate::rig::state::{RigStore, State};
use crate::rig::{DriverFuture, RigDriver};

use super::session::SessionConfig;

/// Run a driver method under the session's call timeout.
macro_rules! call {
    ($self:ident . $op:ident ( $($arg:expr),* $(,)? )) => {
        guarded($self.config.call_timeout, stringify!($op), $self.driver.$op($($arg),*))
    };
}
pub(super) use call;

pub(super) async fn guarded<T>(
    limit: Duration,
    op: &'static str,
    fut: DriverFuture<'_, T>,
) -> RigResult<T> {
    match time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RigError::Timeout {
            op: op.to_string(),
            after: limit,
        }),
    }
}

/// A field that could not be applied or read.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub field: String,
    pub error: RigError,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

/// Outcome of [`RigController::apply`] or [`RigController::query_state`].
///
/// A field is listed in at most one of `applied` and `failed`; any failure
/// during the operation wins over an earlier or later success.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub failed: Vec<FieldFailure>,
    /// A full re-query ran as part of this operation.
    pub requeried: bool,
    pub polling_changed: bool,
    pub sync_changed: bool,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_failed(&self, field: &str) -> bool {
        self.failed.iter().any(|f| f.field == field)
    }

    pub(super) fn ok(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.has_failed(&field) && !self.applied.contains(&field) {
            self.applied.push(field);
        }
    }

    pub(super) fn fail(&mut self, field: impl Into<String>, error: RigError) {
        let field = field.into();
        warn!("{}: {}", field, error);
        self.applied.retain(|f| *f != field);
        self.failed.push(FieldFailure { field, error });
    }
}

/// Where a mode change is sent.
#[derive(Debug, Clone, Copy)]
pub(super) enum ModeTarget {
    Main(Vfo),
    Split(Vfo),
}

/// Owns the driver and the canonical store for one device session.
pub struct RigController {
    pub(super) driver: Box<dyn RigDriver>,
    pub(super) store: RigStore,
    pub(super) config: SessionConfig,
}

impl RigController {
    pub fn new(driver: Box<dyn RigDriver>, config: SessionConfig) -> Self {
        let caps = Arc::new(driver.caps().clone());
        let mut store = RigStore::new(Arc::clone(&caps));
        store.set_polling_interval(config.polling_interval_ms.max(0));
        store.set_sync_interval(config.sync_interval_s.max(0));
        if caps.assumes_always_on() {
            store.set_radio_on(true);
        }
        Self {
            driver,
            store,
            config,
        }
    }

    pub fn state(&self) -> &State {
        self.store.state()
    }

    pub fn caps(&self) -> &Capabilities {
        self.store.caps()
    }

    pub fn store(&self) -> &RigStore {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the store changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        self.store.take_dirty()
    }

    /// Whether the device is expected to answer field reads right now.
    pub fn is_addressable(&self) -> bool {
        self.caps().assumes_always_on() || self.state().radio_on
    }

    pub(super) fn vfo(&self) -> Vfo {
        Vfo::from_name(&self.state().current_vfo).unwrap_or(Vfo::CURR)
    }

    /// Apply every flagged field of `req` whose value differs from the store.
    pub async fn apply(&mut self, req: &UpdateRequest) -> ApplyReport {
        let mut report = ApplyReport::default();
        let md = req.md;
        debug!(
            "Applying update from {} (flags {:#06x}, vfo ops {:?})",
            req.user_id,
            md.bits(),
            req.vfo_operations
        );

        if md.has_radio_on && req.radio_on != self.state().radio_on {
            self.update_power(req.radio_on, &mut report).await;
        }

        if self.is_addressable() {
            self.apply_vfo_fields(req, &mut report).await;
        } else if !req.is_empty() {
            debug!("Radio is off; skipping VFO fields from {}", req.user_id);
        }

        if md.has_ptt && req.ptt != self.state().ptt {
            self.update_ptt(req.ptt, &mut report).await;
        }

        if md.has_polling_interval && req.polling_interval != self.state().polling_interval {
            if req.polling_interval < 0 {
                report.fail(
                    "polling_interval",
                    RigError::invalid_state(format!("negative period {}", req.polling_interval)),
                );
            } else {
                self.store.set_polling_interval(req.polling_interval);
                report.polling_changed = true;
                report.ok("polling_interval");
            }
        }

        if md.has_sync_interval && req.sync_interval != self.state().sync_interval {
            if req.sync_interval < 0 {
                report.fail(
                    "sync_interval",
                    RigError::invalid_state(format!("negative period {}", req.sync_interval)),
                );
            } else {
                self.store.set_sync_interval(req.sync_interval);
                report.sync_changed = true;
                report.ok("sync_interval");
            }
        }

        report
    }

    async fn apply_vfo_fields(&mut self, req: &UpdateRequest, report: &mut ApplyReport) {
        let md = req.md;
        let wanted = &req.vfo;

        if !req.current_vfo.is_empty() && req.current_vfo != self.state().current_vfo {
            self.update_current_vfo(&req.current_vfo, report).await;
        }

        if !req.vfo_operations.is_empty() {
            self.exec_vfo_ops(&req.vfo_operations, report).await;
        }

        if md.has_frequency && wanted.frequency != self.state().vfo.frequency {
            self.update_frequency(wanted.frequency, report).await;
        }

        let mut mode_sent = false;
        if md.has_mode {
            let current = &self.state().vfo;
            let pb_differs = wanted.pb_width > 0 && wanted.pb_width != current.pb_width;
            if wanted.mode != current.mode || pb_differs {
                self.update_mode(&wanted.mode, wanted.pb_width, report).await;
                mode_sent = true;
            }
        }

        if md.has_pb_width && !mode_sent && wanted.pb_width != self.state().vfo.pb_width {
            self.update_pb_width(wanted.pb_width, report).await;
        }

        if md.has_ant && wanted.ant != self.state().vfo.ant {
            self.update_ant(wanted.ant, report).await;
        }

        if md.has_rit && wanted.rit != self.state().vfo.rit {
            self.update_rit(wanted.rit, report).await;
        }

        if md.has_xit && wanted.xit != self.state().vfo.xit {
            self.update_xit(wanted.xit, report).await;
        }

        if md.has_split && wanted.split.clone().normalized() != self.state().vfo.split {
            self.update_split(&wanted.split, report).await;
        }

        if md.has_tuning_step && wanted.tuning_step != self.state().vfo.tuning_step {
            self.update_tuning_step(wanted.tuning_step, report).await;
        }

        if md.has_functions {
            self.update_functions(&wanted.functions, report).await;
        }

        if md.has_levels {
            self.update_levels(&wanted.levels, report).await;
        }

        if md.has_parameters {
            self.update_parameters(&wanted.parameters, report).await;
        }
    }

    async fn update_power(&mut self, on: bool, report: &mut ApplyReport) {
        if let Err(e) = call!(self.set_power(on)).await {
            report.fail("radio_on", e);
            return;
        }
        let confirmed = if self.caps().has_power_stat {
            match call!(self.get_power()).await {
                Ok(v) => v,
                Err(e) => {
                    report.fail("radio_on", e);
                    return;
                }
            }
        } else {
            on
        };
        if confirmed != on {
            warn!("radio_on: requested {}, rig reports {}", on, confirmed);
        }
        report.ok("radio_on");

        if confirmed {
            info!("Radio powered on");
            self.store.set_radio_on(true);
            self.requery_into(report).await;
        } else {
            info!("Radio powered off");
            self.store.reset_on_power_off();
        }
    }

    async fn update_current_vfo(&mut self, name: &str, report: &mut ApplyReport) {
        let vfo = match Vfo::from_name(name) {
            Ok(v) => v,
            Err(e) => return report.fail("current_vfo", e),
        };
        let caps = self.caps();
        if !caps.vfos.is_empty() && !caps.vfos.iter().any(|v| v == name) {
            return report.fail(
                "current_vfo",
                RigError::not_supported(format!("vfo {}", name)),
            );
        }
        if let Err(e) = call!(self.set_vfo(vfo)).await {
            return report.fail("current_vfo", e);
        }
        if !self.caps().has_vfo {
            self.store.set_current_vfo(name);
        }
        report.ok("current_vfo");
        self.requery_into(report).await;
    }

    async fn exec_vfo_ops(&mut self, ops: &[String], report: &mut ApplyReport) {
        let vfo = self.vfo();
        let mut executed = 0;
        for name in ops {
            let field = format!("vfo_op {}", name);
            let op = match VfoOp::from_name(name) {
                Ok(op) => op,
                Err(e) => {
                    report.fail(field, e);
                    continue;
                }
            };
            if !self.caps().supports_vfo_op(name) {
                report.fail(field, RigError::not_supported(format!("vfo op {}", name)));
                continue;
            }
            match call!(self.vfo_op(vfo, op)).await {
                Ok(()) => {
                    executed += 1;
                    report.ok(field);
                }
                Err(e) => report.fail(field, e),
            }
        }
        if executed > 0 {
            debug!("{} vfo op(s) executed, re-querying rig", executed);
            self.requery_into(report).await;
        }
    }

    async fn update_frequency(&mut self, hz: f64, report: &mut ApplyReport) {
        let vfo = self.vfo();
        if let Err(e) = call!(self.set_freq(vfo, hz)).await {
            return report.fail("frequency", e);
        }
        if self.caps().has_freq {
            let Some(confirmed) = self.read_frequency(vfo, report).await else {
                return;
            };
            if confirmed != hz {
                warn!("frequency: requested {} Hz, rig reports {} Hz", hz, confirmed);
            }
        } else {
            self.store.set_frequency(hz);
        }
        report.ok("frequency");
    }

    /// `pb_width` of 0 keeps the current filter width.
    async fn update_mode(&mut self, name: &str, pb_width: i32, report: &mut ApplyReport) {
        let mode = match self.resolve_mode(name) {
            Ok(m) => m,
            Err(e) => return report.fail("mode", e),
        };
        let vfo = self.vfo();
        let pb = if pb_width > 0 {
            pb_width
        } else {
            self.state().vfo.pb_width
        };
        if let Err(e) = self.set_mode_checked(ModeTarget::Main(vfo), mode, pb).await {
            return report.fail("mode", e);
        }
        if self.caps().has_mode {
            if let Some((confirmed, confirmed_pb)) = self.read_mode(vfo, report).await {
                if confirmed != name {
                    warn!("mode: requested {}, rig reports {}", name, confirmed);
                }
                if pb_width > 0 && confirmed_pb != pb_width {
                    debug!(
                        "pb_width: requested {} Hz, rig reports {} Hz",
                        pb_width, confirmed_pb
                    );
                }
            }
        } else {
            self.store.set_mode(name, pb);
        }
        if self.caps().has_ts {
            self.read_tuning_step(vfo, report).await;
        }
        report.ok("mode");
    }

    async fn update_pb_width(&mut self, pb_width: i32, report: &mut ApplyReport) {
        let name = self.state().vfo.mode.clone();
        if name.is_empty() {
            return report.fail(
                "pb_width",
                RigError::invalid_state("no mode known to pair the filter with"),
            );
        }
        let mode = match Mode::from_name(&name) {
            Ok(m) => m,
            Err(e) => return report.fail("pb_width", e),
        };
        let vfo = self.vfo();
        if let Err(e) = self
            .set_mode_checked(ModeTarget::Main(vfo), mode, pb_width)
            .await
        {
            return report.fail("pb_width", e);
        }
        if self.caps().has_mode {
            if let Some((_, confirmed)) = self.read_mode(vfo, report).await {
                if confirmed != pb_width {
                    warn!(
                        "pb_width: requested {} Hz, rig reports {} Hz",
                        pb_width, confirmed
                    );
                }
            }
        } else {
            self.store.set_mode(&name, pb_width);
        }
        report.ok("pb_width");
    }

    async fn update_ant(&mut self, ant: i32, report: &mut ApplyReport) {
        let vfo = self.vfo();
        if let Err(e) = call!(self.set_ant(vfo, ant)).await {
            return report.fail("antenna", e);
        }
        if self.caps().has_ant {
            if let Some(confirmed) = self.read_ant(vfo, report).await {
                if confirmed != ant {
                    warn!("antenna: requested {}, rig reports {}", ant, confirmed);
                }
            }
        } else {
            self.store.set_ant(ant);
        }
        report.ok("antenna");
    }

    /// RIT and XIT interact on many rigs and may shift the displayed
    /// frequency, so all three are read back.
    async fn update_rit(&mut self, hz: i32, report: &mut ApplyReport) {
        let vfo = self.vfo();
        if let Err(e) = call!(self.set_rit(vfo, hz)).await {
            return report.fail("rit", e);
        }
        if self.caps().has_rit {
            if let Some(confirmed) = self.read_rit(vfo, report).await {
                if confirmed != hz {
                    warn!("rit: requested {} Hz, rig reports {} Hz", hz, confirmed);
                }
            }
        } else {
            self.store.set_rit(hz);
        }
        self.read_offsets_and_freq(vfo, report).await;
        report.ok("rit");
    }

    async fn update_xit(&mut self, hz: i32, report: &mut ApplyReport) {
        let vfo = self.vfo();
        if let Err(e) = call!(self.set_xit(vfo, hz)).await {
            return report.fail("xit", e);
        }
        if self.caps().has_xit {
            if let Some(confirmed) = self.read_xit(vfo, report).await {
                if confirmed != hz {
                    warn!("xit: requested {} Hz, rig reports {} Hz", hz, confirmed);
                }
            }
        } else {
            self.store.set_xit(hz);
        }
        self.read_offsets_and_freq(vfo, report).await;
        report.ok("xit");
    }

    async fn read_offsets_and_freq(&mut self, vfo: Vfo, report: &mut ApplyReport) {
        if self.caps().has_rit {
            self.read_rit(vfo, report).await;
        }
        if self.caps().has_xit {
            self.read_xit(vfo, report).await;
        }
        if self.caps().has_freq {
            self.read_frequency(vfo, report).await;
        }
    }

    async fn update_tuning_step(&mut self, hz: i32, report: &mut ApplyReport) {
        let vfo = self.vfo();
        if let Err(e) = call!(self.set_ts(vfo, hz)).await {
            return report.fail("tuning_step", e);
        }
        if self.caps().has_ts {
            if let Some(confirmed) = self.read_tuning_step(vfo, report).await {
                if confirmed != hz {
                    warn!(
                        "tuning_step: requested {} Hz, rig reports {} Hz",
                        hz, confirmed
                    );
                }
            }
        } else {
            self.store.set_tuning_step(hz);
        }
        report.ok("tuning_step");
    }

    async fn update_ptt(&mut self, ptt: bool, report: &mut ApplyReport) {
        let vfo = self.vfo();
        if let Err(e) = call!(self.set_ptt(vfo, ptt)).await {
            return report.fail("ptt", e);
        }
        if self.caps().has_ptt {
            if let Some(confirmed) = self.read_ptt(vfo, report).await {
                if confirmed != ptt {
                    warn!("ptt: requested {}, rig reports {}", ptt, confirmed);
                }
            }
        } else {
            self.store.set_ptt(ptt);
        }
        report.ok("ptt");
    }

    async fn update_functions(&mut self, wanted: &BTreeMap<String, bool>, report: &mut ApplyReport) {
        let vfo = self.vfo();
        for (name, &on) in wanted {
            if self.state().vfo.functions.get(name) == Some(&on) {
                continue;
            }
            let field = format!("function {}", name);
            let func = match Func::from_name(name) {
                Ok(f) => f,
                Err(e) => {
                    report.fail(field, e);
                    continue;
                }
            };
            if !self.caps().can_set_function(name) {
                report.fail(field, RigError::not_supported(format!("set function {}", name)));
                continue;
            }
            if let Err(e) = call!(self.set_func(vfo, func, on)).await {
                report.fail(field, e);
                continue;
            }
            if self.caps().can_get_function(name) {
                match call!(self.get_func(vfo, func)).await {
                    Ok(confirmed) => {
                        if confirmed != on {
                            warn!("{}: requested {}, rig reports {}", field, on, confirmed);
                        }
                        self.store.set_function(name, confirmed);
                    }
                    Err(e) => {
                        report.fail(field, e);
                        continue;
                    }
                }
            }
            report.ok(field);
        }
    }

    async fn update_levels(&mut self, wanted: &BTreeMap<String, f32>, report: &mut ApplyReport) {
        let vfo = self.vfo();
        let tolerance = self.config.level_tolerance;
        for (name, &value) in wanted {
            if self.state().vfo.levels.get(name) == Some(&value) {
                continue;
            }
            let field = format!("level {}", name);
            let level = match Level::from_name(name) {
                Ok(l) => l,
                Err(e) => {
                    report.fail(field, e);
                    continue;
                }
            };
            if !self.caps().can_set_level(name) {
                report.fail(field, RigError::not_supported(format!("set level {}", name)));
                continue;
            }
            if let Err(e) = call!(self.set_level(vfo, level, value)).await {
                report.fail(field, e);
                continue;
            }
            if self.caps().can_get_level(name) {
                match call!(self.get_level(vfo, level)).await {
                    Ok(confirmed) => {
                        if (confirmed - value).abs() > tolerance {
                            warn!("{}: requested {}, rig reports {}", field, value, confirmed);
                        }
                        self.store.set_level(name, confirmed);
                    }
                    Err(e) => {
                        report.fail(field, e);
                        continue;
                    }
                }
            }
            report.ok(field);
        }
    }

    async fn update_parameters(&mut self, wanted: &BTreeMap<String, f32>, report: &mut ApplyReport) {
        let tolerance = self.config.level_tolerance;
        for (name, &value) in wanted {
            if self.state().vfo.parameters.get(name) == Some(&value) {
                continue;
            }
            let field = format!("parameter {}", name);
            let parm = match Parm::from_name(name) {
                Ok(p) => p,
                Err(e) => {
                    report.fail(field, e);
                    continue;
                }
            };
            if !self.caps().can_set_parameter(name) {
                report.fail(
                    field,
                    RigError::not_supported(format!("set parameter {}", name)),
                );
                continue;
            }
            if let Err(e) = call!(self.set_parm(parm, value)).await {
                report.fail(field, e);
                continue;
            }
            if self.caps().can_get_parameter(name) {
                match call!(self.get_parm(parm)).await {
                    Ok(confirmed) => {
                        if (confirmed - value).abs() > tolerance {
                            warn!("{}: requested {}, rig reports {}", field, value, confirmed);
                        }
                        self.store.set_parameter(name, confirmed);
                    }
                    Err(e) => {
                        report.fail(field, e);
                        continue;
                    }
                }
            }
            report.ok(field);
        }
    }

    pub(super) fn resolve_mode(&self, name: &str) -> RigResult<Mode> {
        let mode = Mode::from_name(name)?;
        let caps = self.caps();
        if !caps.modes.is_empty() && !caps.supports_mode(name) {
            return Err(RigError::not_supported(format!("mode {}", name)));
        }
        Ok(mode)
    }

    /// Send a mode change; when the device rejects it, retry once with the
    /// device's normal filter width for that mode.
    pub(super) async fn set_mode_checked(
        &mut self,
        target: ModeTarget,
        mode: Mode,
        pb_width: i32,
    ) -> RigResult<()> {
        let first = match self.send_mode(target, mode, pb_width).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        let normal = match call!(self.get_pb_normal(mode)).await {
            Ok(pb) => pb,
            Err(e) => {
                debug!("No normal passband for fallback: {}", e);
                return Err(first);
            }
        };
        warn!(
            "Mode change with {} Hz filter failed ({}); retrying with {} Hz",
            pb_width, first, normal
        );
        self.send_mode(target, mode, normal).await
    }

    async fn send_mode(&mut self, target: ModeTarget, mode: Mode, pb_width: i32) -> RigResult<()> {
        match target {
            ModeTarget::Main(vfo) => call!(self.set_mode(vfo, mode, pb_width)).await,
            ModeTarget::Split(tx) => call!(self.set_split_mode(tx, mode, pb_width)).await,
        }
    }

    /// Re-read everything the device exposes.
    pub async fn query_state(&mut self) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.requery_into(&mut report).await;
        report
    }

    pub(super) async fn requery_into(&mut self, report: &mut ApplyReport) {
        report.requeried = true;
        let caps = self.store.caps_arc();

        if caps.has_power_stat {
            match call!(self.get_power()).await {
                Ok(on) => {
                    self.store.set_radio_on(on);
                }
                Err(e) => report.fail("radio_on", e),
            }
        } else {
            self.store.set_radio_on(true);
        }
        if !self.state().radio_on {
            self.store.reset_on_power_off();
            return;
        }

        if caps.has_vfo {
            self.read_current_vfo(report).await;
        }
        let vfo = self.vfo();
        if caps.has_freq {
            self.read_frequency(vfo, report).await;
        }
        if caps.has_mode {
            self.read_mode(vfo, report).await;
        }
        if caps.has_ant {
            self.read_ant(vfo, report).await;
        }
        if caps.has_rit {
            self.read_rit(vfo, report).await;
        }
        if caps.has_xit {
            self.read_xit(vfo, report).await;
        }
        if caps.has_split {
            self.read_split(vfo, report).await;
        }
        if caps.has_ts {
            self.read_tuning_step(vfo, report).await;
        }
        if caps.has_ptt {
            self.read_ptt(vfo, report).await;
        }
        for name in &caps.get_functions {
            self.read_function(vfo, name, report).await;
        }
        for range in &caps.get_levels {
            self.read_level(vfo, &range.name, report).await;
        }
        for range in &caps.get_parameters {
            self.read_parameter(&range.name, report).await;
        }
    }

    async fn read_current_vfo(&mut self, report: &mut ApplyReport) -> Option<Vfo> {
        let vfo = match call!(self.get_vfo()).await {
            Ok(v) => v,
            Err(e) => {
                report.fail("current_vfo", e);
                return None;
            }
        };
        match vfo.name() {
            Ok(name) => {
                self.store.set_current_vfo(name);
                Some(vfo)
            }
            Err(e) => {
                report.fail("current_vfo", e);
                None
            }
        }
    }

    async fn read_frequency(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<f64> {
        match call!(self.get_freq(vfo)).await {
            Ok(hz) => {
                self.store.set_frequency(hz);
                Some(hz)
            }
            Err(e) => {
                report.fail("frequency", e);
                None
            }
        }
    }

    async fn read_mode(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<(String, i32)> {
        let (mode, pb) = match call!(self.get_mode(vfo)).await {
            Ok(v) => v,
            Err(e) => {
                report.fail("mode", e);
                return None;
            }
        };
        match mode.name() {
            Ok(name) => {
                self.store.set_mode(name, pb);
                Some((name.to_string(), pb))
            }
            Err(e) => {
                report.fail("mode", e);
                None
            }
        }
    }

    async fn read_ant(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<i32> {
        match call!(self.get_ant(vfo)).await {
            Ok(ant) => {
                self.store.set_ant(ant);
                Some(ant)
            }
            Err(e) => {
                report.fail("antenna", e);
                None
            }
        }
    }

    async fn read_rit(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<i32> {
        match call!(self.get_rit(vfo)).await {
            Ok(hz) => {
                self.store.set_rit(hz);
                Some(hz)
            }
            Err(e) => {
                report.fail("rit", e);
                None
            }
        }
    }

    async fn read_xit(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<i32> {
        match call!(self.get_xit(vfo)).await {
            Ok(hz) => {
                self.store.set_xit(hz);
                Some(hz)
            }
            Err(e) => {
                report.fail("xit", e);
                None
            }
        }
    }

    async fn read_tuning_step(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<i32> {
        match call!(self.get_ts(vfo)).await {
            Ok(hz) => {
                self.store.set_tuning_step(hz);
                Some(hz)
            }
            Err(e) => {
                report.fail("tuning_step", e);
                None
            }
        }
    }

    async fn read_ptt(&mut self, vfo: Vfo, report: &mut ApplyReport) -> Option<bool> {
        match call!(self.get_ptt(vfo)).await {
            Ok(ptt) => {
                self.store.set_ptt(ptt);
                Some(ptt)
            }
            Err(e) => {
                report.fail("ptt", e);
                None
            }
        }
    }

    async fn read_function(&mut self, vfo: Vfo, name: &str, report: &mut ApplyReport) {
        let field = format!("function {}", name);
        let func = match Func::from_name(name) {
            Ok(f) => f,
            Err(e) => return report.fail(field, e),
        };
        match call!(self.get_func(vfo, func)).await {
            Ok(on) => {
                self.store.set_function(name, on);
            }
            Err(e) => report.fail(field, e),
        }
    }

    async fn read_level(&mut self, vfo: Vfo, name: &str, report: &mut ApplyReport) {
        let field = format!("level {}", name);
        let level = match Level::from_name(name) {
            Ok(l) => l,
            Err(e) => return report.fail(field, e),
        };
        match call!(self.get_level(vfo, level)).await {
            Ok(value) => {
                self.store.set_level(name, value);
            }
            Err(e) => report.fail(field, e),
        }
    }

    async fn read_parameter(&mut self, name: &str, report: &mut ApplyReport) {
        let field = format!("parameter {}", name);
        let parm = match Parm::from_name(name) {
            Ok(p) => p,
            Err(e) => return report.fail(field, e),
        };
        match call!(self.get_parm(parm)).await {
            Ok(value) => {
                self.store.set_parameter(name, value);
            }
            Err(e) => report.fail(field, e),
        }
    }

    /// Refresh the meters relevant to the current PTT state.
    ///
    /// Returns whether any stored value changed.
    pub async fn refresh_meters(&mut self) -> bool {
        if !self.is_addressable() {
            return false;
        }
        let meters: &[&str] = if self.state().ptt {
            &["SWR", "ALC"]
        } else {
            &["STRENGTH"]
        };
        let vfo = self.vfo();
        let mut changed = false;
        for &name in meters {
            if !self.caps().can_get_level(name) {
                continue;
            }
            let level = match Level::from_name(name) {
                Ok(l) => l,
                Err(_) => continue,
            };
            match call!(self.get_level(vfo, level)).await {
                Ok(value) => changed |= self.store.set_level(name, value),
                Err(e) => debug!("Meter {} read failed: {}", name, e),
            }
        }
        changed
    }

    /// Release the device.
    pub async fn close(&mut self) {
        match call!(self.close()).await {
            Ok(()) => info!("Rig closed"),
            Err(e) => warn!("Closing rig failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::controller::mock::{mock_caps, MockRig};
    use crate::rig::request::UpdateRequest;

    fn controller() -> (RigController, MockRig) {
        let rig = MockRig::new(mock_caps());
        let handle = rig.clone();
        (
            RigController::new(Box::new(rig), SessionConfig::default()),
            handle,
        )
    }

    async fn ready() -> (RigController, MockRig) {
        let (mut ctl, rig) = controller();
        let report = ctl.query_state().await;
        assert!(report.is_clean(), "{:?}", report.failed);
        ctl.take_dirty();
        rig.clear_calls();
        (ctl, rig)
    }

    #[tokio::test]
    async fn test_query_populates_store() {
        let (ctl, _rig) = ready().await;
        let state = ctl.state();
        assert!(state.radio_on);
        assert_eq!(state.current_vfo, "VFOA");
        assert_eq!(state.vfo.frequency, 14_074_000.0);
        assert_eq!(state.vfo.mode, "USB");
        assert_eq!(state.vfo.pb_width, 2400);
        assert_eq!(state.vfo.functions.get("NB"), Some(&false));
        assert!(state.vfo.levels.contains_key("STRENGTH"));
        assert!(!state.vfo.split.enabled);
    }

    #[tokio::test]
    async fn test_empty_request_changes_nothing() {
        let (mut ctl, rig) = ready().await;
        let before = ctl.state().clone();
        let req = UpdateRequest {
            user_id: "op".to_string(),
            ..Default::default()
        };
        let report = ctl.apply(&req).await;
        assert!(report.applied.is_empty());
        assert_eq!(ctl.state(), &before);
        assert!(!ctl.take_dirty());
        assert!(rig.calls().is_empty());
    }

    #[tokio::test]
    async fn test_frequency_is_set_then_read_back() {
        let (mut ctl, rig) = ready().await;
        let req = UpdateRequest::new("op").with_frequency(14_205_000.0);
        let report = ctl.apply(&req).await;
        assert!(report.is_clean());
        assert_eq!(rig.calls(), vec!["set_freq", "get_freq"]);
        assert_eq!(ctl.state().vfo.frequency, 14_205_000.0);
        assert!(ctl.take_dirty());
    }

    #[tokio::test]
    async fn test_store_keeps_device_value_not_request() {
        let (mut ctl, rig) = ready().await;
        rig.device().freq_step = 100.0;
        let report = ctl
            .apply(&UpdateRequest::new("op").with_frequency(14_205_037.0))
            .await;
        assert!(report.is_clean());
        assert_eq!(ctl.state().vfo.frequency, 14_205_000.0);
    }

    #[tokio::test]
    async fn test_clamped_mode_is_stored_as_read() {
        let (mut ctl, rig) = ready().await;
        rig.device().clamp_mode = Some((Mode::PKTUSB, Mode::USB));
        ctl.apply(&UpdateRequest::new("op").with_mode("LSB", 0)).await;
        assert_eq!(ctl.state().vfo.mode, "LSB");

        let report = ctl
            .apply(&UpdateRequest::new("op").with_mode("PKTUSB", 0))
            .await;
        assert!(report.is_clean());
        assert_eq!(ctl.state().vfo.mode, "USB");
    }

    #[tokio::test]
    async fn test_mode_falls_back_to_normal_passband() {
        let (mut ctl, rig) = ready().await;
        rig.device().max_pb = Some(3000);
        let report = ctl
            .apply(&UpdateRequest::new("op").with_mode("CW", 6000))
            .await;
        assert!(report.is_clean(), "{:?}", report.failed);
        let calls = rig.calls();
        assert_eq!(&calls[..3], &["set_mode", "get_pb_normal", "set_mode"]);
        assert_eq!(ctl.state().vfo.mode, "CW");
        assert_eq!(ctl.state().vfo.pb_width, 500);
    }

    #[tokio::test]
    async fn test_unknown_names_do_not_abort_request() {
        let (mut ctl, _rig) = ready().await;
        let req = UpdateRequest::new("op")
            .with_mode("SSB", 0)
            .with_function("WARP", true)
            .with_function("NB", true)
            .with_frequency(7_100_000.0);
        let report = ctl.apply(&req).await;
        let failed: Vec<&str> = report.failed.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(failed, vec!["mode", "function WARP"]);
        assert!(matches!(
            report.failed[0].error,
            RigError::Unknown { kind: "mode", .. }
        ));
        assert_eq!(ctl.state().vfo.frequency, 7_100_000.0);
        assert_eq!(ctl.state().vfo.functions.get("NB"), Some(&true));
    }

    #[tokio::test]
    async fn test_driver_error_is_field_scoped() {
        let (mut ctl, rig) = ready().await;
        rig.device().fail_set_freq = true;
        let req = UpdateRequest::new("op")
            .with_frequency(7_100_000.0)
            .with_ptt(true);
        let report = ctl.apply(&req).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].field, "frequency");
        assert_eq!(ctl.state().vfo.frequency, 14_074_000.0);
        assert!(ctl.state().ptt);
    }

    #[tokio::test]
    async fn test_failed_read_back_is_not_applied() {
        let (mut ctl, rig) = ready().await;
        rig.device().fail_get_freq = true;
        let report = ctl
            .apply(&UpdateRequest::new("op").with_frequency(7_100_000.0))
            .await;
        assert!(report.has_failed("frequency"));
        assert!(!report.applied.contains(&"frequency".to_string()));
    }

    #[test]
    fn test_report_keeps_fields_exclusive() {
        let mut report = ApplyReport::default();
        report.ok("ptt");
        report.fail("ptt", RigError::communication("lost"));
        report.ok("ptt");
        report.ok("mode");
        report.ok("mode");
        assert_eq!(report.applied, vec!["mode".to_string()]);
        assert!(report.has_failed("ptt"));
    }

    #[tokio::test]
    async fn test_unsettable_level_is_skipped() {
        let (mut ctl, rig) = ready().await;
        let req = UpdateRequest::new("op")
            .with_level("STRENGTH", 10.0)
            .with_level("AF", 0.5);
        let report = ctl.apply(&req).await;
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, RigError::NotSupported(_)));
        assert_eq!(rig.calls(), vec!["set_level", "get_level"]);
        assert_eq!(ctl.state().vfo.levels.get("AF"), Some(&0.5));
    }

    #[tokio::test]
    async fn test_level_read_back_wins() {
        let (mut ctl, rig) = ready().await;
        rig.device().level_quantum = Some(0.25);
        ctl.apply(&UpdateRequest::new("op").with_level("RFPOWER", 0.6))
            .await;
        assert_eq!(ctl.state().vfo.levels.get("RFPOWER"), Some(&0.5));
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let (mut ctl, rig) = ready().await;
        let req = UpdateRequest::new("op")
            .with_frequency(3_573_000.0)
            .with_mode("PKTUSB", 3000)
            .with_rit(100)
            .with_function("NR", true)
            .with_level("AF", 0.25);
        ctl.apply(&req).await;
        let first = ctl.state().clone();
        rig.clear_calls();

        let report = ctl.apply(&req).await;
        assert_eq!(ctl.state(), &first);
        assert!(report.applied.is_empty());
        assert!(rig.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rit_reads_back_related_fields() {
        let (mut ctl, rig) = ready().await;
        ctl.apply(&UpdateRequest::new("op").with_rit(-250)).await;
        assert_eq!(
            rig.calls(),
            vec!["set_rit", "get_rit", "get_rit", "get_xit", "get_freq"]
        );
        assert_eq!(ctl.state().vfo.rit, -250);
    }

    #[tokio::test]
    async fn test_vfo_op_triggers_requery() {
        let (mut ctl, rig) = ready().await;
        rig.device().vfo_b_freq = 7_010_000.0;
        let report = ctl
            .apply(&UpdateRequest::new("op").with_vfo_op("XCHG"))
            .await;
        assert!(report.requeried);
        assert_eq!(ctl.state().vfo.frequency, 7_010_000.0);
    }

    #[tokio::test]
    async fn test_unsupported_vfo_op_is_skipped() {
        let (mut ctl, rig) = ready().await;
        let report = ctl
            .apply(&UpdateRequest::new("op").with_vfo_op("BAND_UP"))
            .await;
        assert!(!report.requeried);
        assert_eq!(report.failed.len(), 1);
        assert!(rig.calls().is_empty());
    }

    #[tokio::test]
    async fn test_current_vfo_change() {
        let (mut ctl, rig) = ready().await;
        rig.device().vfo_b_freq = 21_074_000.0;
        let report = ctl
            .apply(&UpdateRequest::new("op").with_current_vfo("VFOB"))
            .await;
        assert!(report.is_clean(), "{:?}", report.failed);
        assert_eq!(ctl.state().current_vfo, "VFOB");
        assert_eq!(ctl.state().vfo.frequency, 21_074_000.0);
    }

    #[tokio::test]
    async fn test_power_off_resets_and_power_on_requeries() {
        let (mut ctl, _rig) = ready().await;
        ctl.apply(&UpdateRequest::new("op").with_radio_on(false))
            .await;
        let state = ctl.state();
        assert!(!state.radio_on);
        assert!(state.vfo.levels.is_empty());
        assert_eq!(state.vfo.frequency, 0.0);

        // no VFO fields are sent to a rig that is off
        let report = ctl
            .apply(&UpdateRequest::new("op").with_frequency(7_000_000.0))
            .await;
        assert!(report.applied.is_empty());

        let report = ctl
            .apply(&UpdateRequest::new("op").with_radio_on(true))
            .await;
        assert!(report.requeried);
        assert!(ctl.state().radio_on);
        assert_eq!(ctl.state().vfo.frequency, 14_074_000.0);
    }

    #[tokio::test]
    async fn test_interval_fields_do_not_touch_driver() {
        let (mut ctl, rig) = ready().await;
        let report = ctl
            .apply(
                &UpdateRequest::new("op")
                    .with_polling_interval(0)
                    .with_sync_interval(30),
            )
            .await;
        assert!(report.polling_changed);
        assert!(report.sync_changed);
        assert!(rig.calls().is_empty());
        assert_eq!(ctl.state().polling_interval, 0);
        assert_eq!(ctl.state().sync_interval, 30);

        let report = ctl
            .apply(&UpdateRequest::new("op").with_polling_interval(-5))
            .await;
        assert!(!report.polling_changed);
        assert_eq!(ctl.state().polling_interval, 0);
    }

    #[tokio::test]
    async fn test_meters_follow_ptt() {
        let (mut ctl, rig) = ready().await;
        rig.device().strength = -33.0;
        assert!(ctl.refresh_meters().await);
        assert_eq!(rig.calls(), vec!["get_level"]);
        assert!(!ctl.refresh_meters().await);

        ctl.apply(&UpdateRequest::new("op").with_ptt(true)).await;
        rig.clear_calls();
        rig.device().swr = 1.5;
        assert!(ctl.refresh_meters().await);
        assert_eq!(rig.calls(), vec!["get_level", "get_level"]);
        assert_eq!(ctl.state().vfo.levels.get("SWR"), Some(&1.5));
    }

    #[tokio::test]
    async fn test_meters_skip_when_off() {
        let (mut ctl, rig) = ready().await;
        ctl.apply(&UpdateRequest::new("op").with_radio_on(false))
            .await;
        rig.clear_calls();
        assert!(!ctl.refresh_meters().await);
        assert!(rig.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rig_without_power_status_is_always_on() {
        let mut caps = mock_caps();
        caps.has_power_stat = false;
        let rig = MockRig::new(caps);
        rig.device().power = false;
        let mut ctl = RigController::new(Box::new(rig.clone()), SessionConfig::default());
        assert!(ctl.is_addressable());
        ctl.query_state().await;
        assert!(ctl.state().radio_on);
        rig.device().strength = -10.0;
        assert!(ctl.refresh_meters().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_driver_call_times_out() {
        let (mut ctl, rig) = ready().await;
        rig.device().hang_get_freq = true;
        let report = ctl
            .apply(&UpdateRequest::new("op").with_frequency(7_050_000.0))
            .await;
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, RigError::Timeout { .. }));
    }
}
