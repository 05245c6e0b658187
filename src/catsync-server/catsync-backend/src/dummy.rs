// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dummy rig backend for development and testing.
//!
//! Holds a two-VFO transceiver in memory and answers every command
//! immediately. No hardware or serial port required. It behaves like a
//! real device where that matters to the controller: it quantizes levels
//! to their step, rejects filter widths the mode does not offer and stops
//! answering reads while switched off.

use std::collections::{BTreeMap, HashMap};

use catsync_core::rig::names::{Func, Level, Mode, Parm, Vfo, VfoOp};
use catsync_core::rig::{DriverFuture, RigDriver};
use catsync_core::{Capabilities, RigError, RigResult, ValueRange};

const MIN_FREQ_HZ: f64 = 30_000.0;
const MAX_FREQ_HZ: f64 = 470_000_000.0;

#[derive(Debug, Clone)]
struct VfoSlot {
    freq: f64,
    mode: Mode,
    pb_width: i32,
}

pub struct DummyRig {
    caps: Capabilities,
    powered: bool,
    current: Vfo,
    vfo_a: VfoSlot,
    vfo_b: VfoSlot,
    ant: i32,
    rit: i32,
    xit: i32,
    ts: i32,
    ptt: bool,
    split: bool,
    split_tx: Vfo,
    functions: HashMap<Func, bool>,
    levels: HashMap<Level, f32>,
    parms: HashMap<Parm, f32>,
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn dummy_caps() -> Capabilities {
    let mut filters = BTreeMap::new();
    for (mode, widths) in [
        ("AM", vec![3000, 6000, 9000]),
        ("CW", vec![250, 500, 1200]),
        ("USB", vec![1800, 2400, 3000]),
        ("LSB", vec![1800, 2400, 3000]),
        ("FM", vec![12000, 15000]),
        ("PKTUSB", vec![500, 3000]),
    ] {
        filters.insert(mode.to_string(), widths);
    }
    let mut tuning_steps = BTreeMap::new();
    for mode in ["AM", "CW", "USB", "LSB", "PKTUSB"] {
        tuning_steps.insert(mode.to_string(), vec![1, 10, 100, 1000]);
    }
    tuning_steps.insert("FM".to_string(), vec![5000, 12500, 25000]);

    let rx_levels = vec![
        ValueRange::new("AF", 0.0, 1.0, 0.01),
        ValueRange::new("RF", 0.0, 1.0, 0.01),
        ValueRange::new("SQL", 0.0, 1.0, 0.01),
        ValueRange::new("RFPOWER", 0.05, 1.0, 0.05),
        ValueRange::new("MICGAIN", 0.0, 1.0, 0.01),
        ValueRange::new("KEYSPD", 4.0, 60.0, 1.0),
    ];
    let mut get_levels = rx_levels.clone();
    get_levels.extend([
        ValueRange::new("STRENGTH", -54.0, 60.0, 1.0),
        ValueRange::new("SWR", 1.0, 10.0, 0.1),
        ValueRange::new("ALC", 0.0, 1.0, 0.01),
    ]);
    let parameters = vec![
        ValueRange::new("BACKLIGHT", 0.0, 1.0, 0.1),
        ValueRange::new("BEEP", 0.0, 1.0, 1.0),
    ];

    Capabilities {
        rig_model: 1,
        mfg_name: "Dummy".to_string(),
        model_name: "Dummy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "Stable".to_string(),
        vfos: names(&["VFOA", "VFOB"]),
        modes: names(&["AM", "CW", "USB", "LSB", "FM", "PKTUSB"]),
        vfo_ops: names(&["CPY", "XCHG", "TOGGLE", "UP", "DOWN"]),
        get_functions: names(&["NB", "NR", "COMP", "VOX", "LOCK"]),
        set_functions: names(&["NB", "NR", "COMP", "VOX", "LOCK"]),
        get_levels,
        set_levels: rx_levels,
        get_parameters: parameters.clone(),
        set_parameters: parameters,
        filters,
        tuning_steps,
        preamps: vec![10, 20],
        attenuators: vec![6, 12, 18],
        max_rit: 9990,
        max_xit: 9990,
        max_if_shift: 1200,
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
    }
}

fn pb_normal(mode: Mode) -> i32 {
    match mode {
        Mode::AM => 6000,
        Mode::CW => 500,
        Mode::FM => 15000,
        Mode::PKTUSB => 3000,
        _ => 2400,
    }
}

fn quantize(value: f32, range: &ValueRange) -> f32 {
    let clamped = value.clamp(range.min, range.max);
    if range.step > 0.0 {
        range.min + ((clamped - range.min) / range.step).round() * range.step
    } else {
        clamped
    }
}

impl DummyRig {
    pub fn new() -> Self {
        let mut levels = HashMap::new();
        levels.insert(Level::AF, 0.5);
        levels.insert(Level::RF, 1.0);
        levels.insert(Level::SQL, 0.0);
        levels.insert(Level::RFPOWER, 0.5);
        levels.insert(Level::MICGAIN, 0.5);
        levels.insert(Level::KEYSPD, 20.0);
        let mut parms = HashMap::new();
        parms.insert(Parm::BACKLIGHT, 0.5);
        parms.insert(Parm::BEEP, 1.0);

        Self {
            caps: dummy_caps(),
            powered: true,
            current: Vfo::VFOA,
            vfo_a: VfoSlot {
                freq: 14_074_000.0,
                mode: Mode::USB,
                pb_width: 2400,
            },
            vfo_b: VfoSlot {
                freq: 7_100_000.0,
                mode: Mode::LSB,
                pb_width: 2400,
            },
            ant: 1,
            rit: 0,
            xit: 0,
            ts: 10,
            ptt: false,
            split: false,
            split_tx: Vfo::VFOB,
            functions: HashMap::new(),
            levels,
            parms,
        }
    }

    fn ensure_on(&self) -> RigResult<()> {
        if self.powered {
            Ok(())
        } else {
            Err(RigError::invalid_state("rig is powered off"))
        }
    }

    fn resolve(&self, vfo: Vfo) -> RigResult<Vfo> {
        match vfo {
            Vfo::CURR | Vfo::NONE => Ok(self.current),
            Vfo::VFOA | Vfo::VFOB => Ok(vfo),
            other => Err(RigError::not_supported(format!(
                "vfo {}",
                other.name().unwrap_or("?")
            ))),
        }
    }

    fn slot(&mut self, vfo: Vfo) -> RigResult<&mut VfoSlot> {
        self.ensure_on()?;
        Ok(match self.resolve(vfo)? {
            Vfo::VFOB => &mut self.vfo_b,
            _ => &mut self.vfo_a,
        })
    }

    fn tune(&mut self, vfo: Vfo, hz: f64) -> RigResult<()> {
        if !(MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&hz) {
            return Err(RigError::invalid_state(format!(
                "{} Hz is outside the tuning range",
                hz
            )));
        }
        self.slot(vfo)?.freq = hz.round();
        Ok(())
    }

    fn select_mode(&mut self, vfo: Vfo, mode: Mode, pb_width: i32) -> RigResult<()> {
        let name = mode.name()?;
        let widths = self
            .caps
            .filters
            .get(name)
            .cloned()
            .ok_or_else(|| RigError::invalid_state(format!("mode {} not available", name)))?;
        let width = match pb_width {
            0 => pb_normal(mode),
            w if widths.contains(&w) => w,
            w => {
                return Err(RigError::invalid_state(format!(
                    "no {} Hz filter for {}",
                    w, name
                )))
            }
        };
        let slot = self.slot(vfo)?;
        slot.mode = mode;
        slot.pb_width = width;
        Ok(())
    }

    fn step(&mut self, sign: f64) -> RigResult<()> {
        let ts = f64::from(self.ts.max(1));
        let current = self.current;
        let freq = self.slot(current)?.freq;
        self.tune(current, freq + sign * ts)
    }

    fn run_op(&mut self, op: VfoOp) -> RigResult<()> {
        self.ensure_on()?;
        match op {
            VfoOp::CPY => {
                if self.current == Vfo::VFOA {
                    self.vfo_b = self.vfo_a.clone();
                } else {
                    self.vfo_a = self.vfo_b.clone();
                }
            }
            VfoOp::XCHG => std::mem::swap(&mut self.vfo_a, &mut self.vfo_b),
            VfoOp::TOGGLE => self.current = self.current.opposite(),
            VfoOp::UP => self.step(1.0)?,
            VfoOp::DOWN => self.step(-1.0)?,
            other => {
                return Err(RigError::not_supported(format!(
                    "vfo op {}",
                    other.name().unwrap_or("?")
                )))
            }
        }
        Ok(())
    }

    fn range_for<'r>(
        ranges: &'r [ValueRange],
        name: &str,
        kind: &str,
    ) -> RigResult<&'r ValueRange> {
        ranges
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| RigError::not_supported(format!("{} {}", kind, name)))
    }

    fn read_level(&self, level: Level) -> RigResult<f32> {
        self.ensure_on()?;
        let name = level.name()?;
        Self::range_for(&self.caps.get_levels, name, "level")?;
        let power = self.levels.get(&Level::RFPOWER).copied().unwrap_or(0.0);
        Ok(match level {
            Level::STRENGTH if self.ptt => -54.0,
            Level::STRENGTH => noise_floor(),
            Level::SWR if self.ptt => 1.0 + (power * 5.0).round() / 10.0,
            Level::SWR => 1.0,
            Level::ALC if self.ptt => (power * 30.0).round() / 100.0,
            Level::ALC => 0.0,
            other => self.levels.get(&other).copied().unwrap_or(0.0),
        })
    }

    fn write_level(&mut self, level: Level, value: f32) -> RigResult<()> {
        self.ensure_on()?;
        let name = level.name()?;
        let range = Self::range_for(&self.caps.set_levels, name, "level")?;
        let stored = quantize(value, range);
        self.levels.insert(level, stored);
        Ok(())
    }

    fn write_parm(&mut self, parm: Parm, value: f32) -> RigResult<()> {
        self.ensure_on()?;
        let name = parm.name()?;
        let range = Self::range_for(&self.caps.set_parameters, name, "parameter")?;
        let stored = quantize(value, range);
        self.parms.insert(parm, stored);
        Ok(())
    }

    fn check_func(&self, func: Func) -> RigResult<()> {
        self.ensure_on()?;
        let name = func.name()?;
        if self.caps.can_get_function(name) {
            Ok(())
        } else {
            Err(RigError::not_supported(format!("function {}", name)))
        }
    }
}

impl Default for DummyRig {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver noise between S2 and S8, taken from the clock's low bits.
fn noise_floor() -> f32 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    -42.0 + (nanos % 7) as f32 * 6.0
}

impl RigDriver for DummyRig {
    fn caps(&self) -> &Capabilities {
        &self.caps
    }

    fn get_freq<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, f64> {
        Box::pin(async move { Ok(self.slot(vfo)?.freq) })
    }

    fn set_freq<'a>(&'a mut self, vfo: Vfo, hz: f64) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.tune(vfo, hz) })
    }

    fn get_mode<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, (Mode, i32)> {
        Box::pin(async move {
            let slot = self.slot(vfo)?;
            Ok((slot.mode, slot.pb_width))
        })
    }

    fn set_mode<'a>(&'a mut self, vfo: Vfo, mode: Mode, pb_width: i32) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.select_mode(vfo, mode, pb_width) })
    }

    fn get_pb_normal<'a>(&'a mut self, mode: Mode) -> DriverFuture<'a, i32> {
        Box::pin(async move { Ok(pb_normal(mode)) })
    }

    fn get_power<'a>(&'a mut self) -> DriverFuture<'a, bool> {
        Box::pin(async move { Ok(self.powered) })
    }

    fn set_power<'a>(&'a mut self, on: bool) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.powered = on;
            if !on {
                self.ptt = false;
            }
            Ok(())
        })
    }

    fn get_vfo<'a>(&'a mut self) -> DriverFuture<'a, Vfo> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok(self.current)
        })
    }

    fn set_vfo<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            self.current = self.resolve(vfo)?;
            Ok(())
        })
    }

    fn get_ant<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok(self.ant)
        })
    }

    fn set_ant<'a>(&'a mut self, _vfo: Vfo, ant: i32) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            if !(1..=2).contains(&ant) {
                return Err(RigError::invalid_state(format!("no antenna port {}", ant)));
            }
            self.ant = ant;
            Ok(())
        })
    }

    fn get_rit<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok(self.rit)
        })
    }

    fn set_rit<'a>(&'a mut self, _vfo: Vfo, hz: i32) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            self.rit = hz.clamp(-self.caps.max_rit, self.caps.max_rit);
            Ok(())
        })
    }

    fn get_xit<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok(self.xit)
        })
    }

    fn set_xit<'a>(&'a mut self, _vfo: Vfo, hz: i32) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            self.xit = hz.clamp(-self.caps.max_xit, self.caps.max_xit);
            Ok(())
        })
    }

    fn get_ts<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok(self.ts)
        })
    }

    fn set_ts<'a>(&'a mut self, _vfo: Vfo, hz: i32) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            if hz <= 0 {
                return Err(RigError::invalid_state(format!("tuning step {} Hz", hz)));
            }
            self.ts = hz;
            Ok(())
        })
    }

    fn get_ptt<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, bool> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok(self.ptt)
        })
    }

    fn set_ptt<'a>(&'a mut self, _vfo: Vfo, ptt: bool) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            self.ptt = ptt;
            Ok(())
        })
    }

    fn get_split_vfo<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, (bool, Vfo)> {
        Box::pin(async move {
            self.ensure_on()?;
            Ok((self.split, self.split_tx))
        })
    }

    fn set_split_vfo<'a>(
        &'a mut self,
        _vfo: Vfo,
        enabled: bool,
        tx_vfo: Vfo,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_on()?;
            if enabled {
                let tx = self.resolve(tx_vfo)?;
                if tx == self.current {
                    return Err(RigError::invalid_state(
                        "transmit VFO must differ from the receive VFO",
                    ));
                }
                self.split_tx = tx;
            }
            self.split = enabled;
            Ok(())
        })
    }

    fn get_split_freq<'a>(&'a mut self, tx_vfo: Vfo) -> DriverFuture<'a, f64> {
        Box::pin(async move { Ok(self.slot(tx_vfo)?.freq) })
    }

    fn set_split_freq<'a>(&'a mut self, tx_vfo: Vfo, hz: f64) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.tune(tx_vfo, hz) })
    }

    fn get_split_mode<'a>(&'a mut self, tx_vfo: Vfo) -> DriverFuture<'a, (Mode, i32)> {
        Box::pin(async move {
            let slot = self.slot(tx_vfo)?;
            Ok((slot.mode, slot.pb_width))
        })
    }

    fn set_split_mode<'a>(
        &'a mut self,
        tx_vfo: Vfo,
        mode: Mode,
        pb_width: i32,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.select_mode(tx_vfo, mode, pb_width) })
    }

    fn get_func<'a>(&'a mut self, _vfo: Vfo, func: Func) -> DriverFuture<'a, bool> {
        Box::pin(async move {
            self.check_func(func)?;
            Ok(self.functions.get(&func).copied().unwrap_or(false))
        })
    }

    fn set_func<'a>(&'a mut self, _vfo: Vfo, func: Func, on: bool) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.check_func(func)?;
            self.functions.insert(func, on);
            Ok(())
        })
    }

    fn get_level<'a>(&'a mut self, _vfo: Vfo, level: Level) -> DriverFuture<'a, f32> {
        Box::pin(async move { self.read_level(level) })
    }

    fn set_level<'a>(&'a mut self, _vfo: Vfo, level: Level, value: f32) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.write_level(level, value) })
    }

    fn get_parm<'a>(&'a mut self, parm: Parm) -> DriverFuture<'a, f32> {
        Box::pin(async move {
            self.ensure_on()?;
            let name = parm.name()?;
            Self::range_for(&self.caps.get_parameters, name, "parameter")?;
            Ok(self.parms.get(&parm).copied().unwrap_or(0.0))
        })
    }

    fn set_parm<'a>(&'a mut self, parm: Parm, value: f32) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.write_parm(parm, value) })
    }

    fn vfo_op<'a>(&'a mut self, _vfo: Vfo, op: VfoOp) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.run_op(op) })
    }
}
