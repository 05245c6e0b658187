// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scriptable in-memory rig for controller tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::rig::caps::{Capabilities, ValueRange};
use crate::rig::names::{Func, Level, Mode, Parm, Vfo, VfoOp};
use crate::rig::response::{RigError, RigResult};
use crate::rig::{DriverFuture, RigDriver};

pub(crate) fn mock_caps() -> Capabilities {
    let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    Capabilities {
        rig_model: 1,
        mfg_name: "Mock".to_string(),
        model_name: "Test Rig".to_string(),
        version: "0.1".to_string(),
        status: "Stable".to_string(),
        vfos: names(&["VFOA", "VFOB"]),
        modes: names(&["AM", "CW", "USB", "LSB", "FM", "PKTUSB"]),
        vfo_ops: names(&["CPY", "XCHG", "TOGGLE"]),
        get_functions: names(&["NB", "NR"]),
        set_functions: names(&["NB", "NR"]),
        get_levels: vec![
            ValueRange::new("AF", 0.0, 1.0, 0.0),
            ValueRange::new("RFPOWER", 0.0, 1.0, 0.0),
            ValueRange::new("STRENGTH", -54.0, 60.0, 0.0),
            ValueRange::new("SWR", 1.0, 10.0, 0.0),
            ValueRange::new("ALC", 0.0, 1.0, 0.0),
        ],
        set_levels: vec![
            ValueRange::new("AF", 0.0, 1.0, 0.0),
            ValueRange::new("RFPOWER", 0.0, 1.0, 0.0),
        ],
        get_parameters: vec![ValueRange::new("BACKLIGHT", 0.0, 1.0, 0.0)],
        set_parameters: vec![ValueRange::new("BACKLIGHT", 0.0, 1.0, 0.0)],
        max_rit: 9999,
        max_xit: 9999,
        has_power_stat: true,
        has_vfo: true,
        has_freq: true,
        has_mode: true,
        has_ptt: true,
        has_rit: true,
        has_xit: true,
        has_split: true,
        has_ts: true,
        has_ant: true,
        ..Default::default()
    }
}

pub(crate) struct MockDevice {
    pub power: bool,
    pub current: Vfo,
    pub vfo_a_freq: f64,
    pub vfo_b_freq: f64,
    pub mode: Mode,
    pub pb_width: i32,
    pub ant: i32,
    pub rit: i32,
    pub xit: i32,
    pub ts: i32,
    pub ptt: bool,
    pub split_on: bool,
    pub split_tx: Vfo,
    pub split_freq: f64,
    pub split_mode: Mode,
    pub split_pb: i32,
    pub functions: HashMap<Func, bool>,
    pub levels: HashMap<Level, f32>,
    pub parms: HashMap<Parm, f32>,
    pub strength: f32,
    pub swr: f32,
    pub alc: f32,

    /// Frequencies are rounded to this step when > 0.
    pub freq_step: f64,
    /// Setting the first mode selects the second.
    pub clamp_mode: Option<(Mode, Mode)>,
    /// Wider passbands are rejected.
    pub max_pb: Option<i32>,
    /// Levels are rounded to this step.
    pub level_quantum: Option<f32>,
    pub fail_set_freq: bool,
    pub hang_get_freq: bool,
    pub fail_get_freq: bool,
    pub refuse_split: bool,
    /// Split disable is acknowledged but ignored.
    pub refuse_split_off: bool,
    pub split_drops_on_freq_read: bool,

    pub calls: Vec<&'static str>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            power: true,
            current: Vfo::VFOA,
            vfo_a_freq: 14_074_000.0,
            vfo_b_freq: 7_074_000.0,
            mode: Mode::USB,
            pb_width: 2400,
            ant: 1,
            rit: 0,
            xit: 0,
            ts: 10,
            ptt: false,
            split_on: false,
            split_tx: Vfo::VFOA,
            split_freq: 0.0,
            split_mode: Mode::USB,
            split_pb: 2400,
            functions: HashMap::new(),
            levels: HashMap::new(),
            parms: HashMap::new(),
            strength: -54.0,
            swr: 1.0,
            alc: 0.0,
            freq_step: 0.0,
            clamp_mode: None,
            max_pb: None,
            level_quantum: None,
            fail_set_freq: false,
            hang_get_freq: false,
            fail_get_freq: false,
            refuse_split: false,
            refuse_split_off: false,
            split_drops_on_freq_read: false,
            calls: Vec::new(),
        }
    }
}

impl MockDevice {
    fn freq_slot(&mut self, vfo: Vfo) -> &mut f64 {
        let vfo = if vfo == Vfo::CURR { self.current } else { vfo };
        if vfo == Vfo::VFOB {
            &mut self.vfo_b_freq
        } else {
            &mut self.vfo_a_freq
        }
    }

    fn check_pb(&self, pb_width: i32) -> RigResult<()> {
        match self.max_pb {
            Some(max) if pb_width > max => Err(RigError::invalid_state(format!(
                "passband {} too wide",
                pb_width
            ))),
            _ => Ok(()),
        }
    }

    fn clamp(&self, mode: Mode) -> Mode {
        match self.clamp_mode {
            Some((from, to)) if from == mode => to,
            _ => mode,
        }
    }
}

#[derive(Clone)]
pub(crate) struct MockRig {
    caps: Capabilities,
    dev: Arc<Mutex<MockDevice>>,
}

impl MockRig {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            dev: Arc::new(Mutex::new(MockDevice::default())),
        }
    }

    pub fn device(&self) -> MutexGuard<'_, MockDevice> {
        self.dev.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.device().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.device().calls.clear();
    }

    fn run<'a, T: Send + 'static>(
        &'a self,
        op: &'static str,
        f: impl FnOnce(&mut MockDevice) -> RigResult<T>,
    ) -> DriverFuture<'a, T> {
        let mut dev = self.device();
        dev.calls.push(op);
        Box::pin(std::future::ready(f(&mut dev)))
    }
}

impl RigDriver for MockRig {
    fn caps(&self) -> &Capabilities {
        &self.caps
    }

    fn get_freq<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, f64> {
        if self.device().hang_get_freq {
            self.device().calls.push("get_freq");
            return Box::pin(std::future::pending());
        }
        self.run("get_freq", |d| {
            if d.fail_get_freq {
                return Err(RigError::communication("garbled reply"));
            }
            Ok(*d.freq_slot(vfo))
        })
    }

    fn set_freq<'a>(&'a mut self, vfo: Vfo, hz: f64) -> DriverFuture<'a, ()> {
        self.run("set_freq", |d| {
            if d.fail_set_freq {
                return Err(RigError::communication("no answer"));
            }
            let hz = if d.freq_step > 0.0 {
                (hz / d.freq_step).round() * d.freq_step
            } else {
                hz
            };
            *d.freq_slot(vfo) = hz;
            Ok(())
        })
    }

    fn get_mode<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, (Mode, i32)> {
        self.run("get_mode", |d| Ok((d.mode, d.pb_width)))
    }

    fn set_mode<'a>(&'a mut self, _vfo: Vfo, mode: Mode, pb_width: i32) -> DriverFuture<'a, ()> {
        self.run("set_mode", |d| {
            d.check_pb(pb_width)?;
            d.mode = d.clamp(mode);
            d.pb_width = pb_width;
            Ok(())
        })
    }

    fn get_pb_normal<'a>(&'a mut self, mode: Mode) -> DriverFuture<'a, i32> {
        self.run("get_pb_normal", |_| {
            Ok(if mode == Mode::CW { 500 } else { 2400 })
        })
    }

    fn get_power<'a>(&'a mut self) -> DriverFuture<'a, bool> {
        self.run("get_power", |d| Ok(d.power))
    }

    fn set_power<'a>(&'a mut self, on: bool) -> DriverFuture<'a, ()> {
        self.run("set_power", |d| {
            d.power = on;
            Ok(())
        })
    }

    fn get_vfo<'a>(&'a mut self) -> DriverFuture<'a, Vfo> {
        self.run("get_vfo", |d| Ok(d.current))
    }

    fn set_vfo<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, ()> {
        self.run("set_vfo", |d| {
            d.current = vfo;
            Ok(())
        })
    }

    fn get_ant<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        self.run("get_ant", |d| Ok(d.ant))
    }

    fn set_ant<'a>(&'a mut self, _vfo: Vfo, ant: i32) -> DriverFuture<'a, ()> {
        self.run("set_ant", |d| {
            d.ant = ant;
            Ok(())
        })
    }

    fn get_rit<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        self.run("get_rit", |d| Ok(d.rit))
    }

    fn set_rit<'a>(&'a mut self, _vfo: Vfo, hz: i32) -> DriverFuture<'a, ()> {
        self.run("set_rit", |d| {
            d.rit = hz;
            Ok(())
        })
    }

    fn get_xit<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        self.run("get_xit", |d| Ok(d.xit))
    }

    fn set_xit<'a>(&'a mut self, _vfo: Vfo, hz: i32) -> DriverFuture<'a, ()> {
        self.run("set_xit", |d| {
            d.xit = hz;
            Ok(())
        })
    }

    fn get_ts<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        self.run("get_ts", |d| Ok(d.ts))
    }

    fn set_ts<'a>(&'a mut self, _vfo: Vfo, hz: i32) -> DriverFuture<'a, ()> {
        self.run("set_ts", |d| {
            d.ts = hz;
            Ok(())
        })
    }

    fn get_ptt<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, bool> {
        self.run("get_ptt", |d| Ok(d.ptt))
    }

    fn set_ptt<'a>(&'a mut self, _vfo: Vfo, ptt: bool) -> DriverFuture<'a, ()> {
        self.run("set_ptt", |d| {
            d.ptt = ptt;
            Ok(())
        })
    }

    fn get_split_vfo<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, (bool, Vfo)> {
        self.run("get_split_vfo", |d| Ok((d.split_on, d.split_tx)))
    }

    fn set_split_vfo<'a>(
        &'a mut self,
        _vfo: Vfo,
        enabled: bool,
        tx_vfo: Vfo,
    ) -> DriverFuture<'a, ()> {
        self.run("set_split_vfo", |d| {
            if (enabled && d.refuse_split) || (!enabled && d.refuse_split_off) {
                return Ok(());
            }
            d.split_on = enabled;
            d.split_tx = tx_vfo;
            Ok(())
        })
    }

    fn get_split_freq<'a>(&'a mut self, _tx_vfo: Vfo) -> DriverFuture<'a, f64> {
        self.run("get_split_freq", |d| {
            if d.split_drops_on_freq_read {
                d.split_on = false;
            }
            Ok(d.split_freq)
        })
    }

    fn set_split_freq<'a>(&'a mut self, _tx_vfo: Vfo, hz: f64) -> DriverFuture<'a, ()> {
        self.run("set_split_freq", |d| {
            d.split_freq = hz;
            Ok(())
        })
    }

    fn get_split_mode<'a>(&'a mut self, _tx_vfo: Vfo) -> DriverFuture<'a, (Mode, i32)> {
        self.run("get_split_mode", |d| Ok((d.split_mode, d.split_pb)))
    }

    fn set_split_mode<'a>(
        &'a mut self,
        _tx_vfo: Vfo,
        mode: Mode,
        pb_width: i32,
    ) -> DriverFuture<'a, ()> {
        self.run("set_split_mode", |d| {
            d.check_pb(pb_width)?;
            d.split_mode = d.clamp(mode);
            d.split_pb = pb_width;
            Ok(())
        })
    }

    fn get_func<'a>(&'a mut self, _vfo: Vfo, func: Func) -> DriverFuture<'a, bool> {
        self.run("get_func", |d| {
            Ok(d.functions.get(&func).copied().unwrap_or(false))
        })
    }

    fn set_func<'a>(&'a mut self, _vfo: Vfo, func: Func, on: bool) -> DriverFuture<'a, ()> {
        self.run("set_func", |d| {
            d.functions.insert(func, on);
            Ok(())
        })
    }

    fn get_level<'a>(&'a mut self, _vfo: Vfo, level: Level) -> DriverFuture<'a, f32> {
        self.run("get_level", |d| {
            Ok(match level {
                Level::STRENGTH => d.strength,
                Level::SWR => d.swr,
                Level::ALC => d.alc,
                other => d.levels.get(&other).copied().unwrap_or(0.0),
            })
        })
    }

    fn set_level<'a>(&'a mut self, _vfo: Vfo, level: Level, value: f32) -> DriverFuture<'a, ()> {
        self.run("set_level", |d| {
            let value = match d.level_quantum {
                Some(q) => (value / q).round() * q,
                None => value,
            };
            d.levels.insert(level, value);
            Ok(())
        })
    }

    fn get_parm<'a>(&'a mut self, parm: Parm) -> DriverFuture<'a, f32> {
        self.run("get_parm", |d| Ok(d.parms.get(&parm).copied().unwrap_or(0.0)))
    }

    fn set_parm<'a>(&'a mut self, parm: Parm, value: f32) -> DriverFuture<'a, ()> {
        self.run("set_parm", |d| {
            d.parms.insert(parm, value);
            Ok(())
        })
    }

    fn vfo_op<'a>(&'a mut self, _vfo: Vfo, op: VfoOp) -> DriverFuture<'a, ()> {
        self.run("vfo_op", |d| {
            match op {
                VfoOp::XCHG => std::mem::swap(&mut d.vfo_a_freq, &mut d.vfo_b_freq),
                VfoOp::CPY => d.vfo_b_freq = d.vfo_a_freq,
                VfoOp::TOGGLE => d.current = d.current.opposite(),
                _ => return Err(RigError::not_supported("vfo op")),
            }
            Ok(())
        })
    }
}
