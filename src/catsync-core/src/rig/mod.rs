// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

pub mod caps;
pub mod controller;
pub mod diff;
pub mod events;
pub mod names;
pub mod request;
pub mod response;
pub mod state;

use caps::Capabilities;
use names::{Func, Level, Mode, Parm, Vfo, VfoOp};
use response::{RigError, RigResult};

/// Alias to reduce type complexity in RigDriver.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = RigResult<T>> + Send + 'a>>;

fn unsupported<'a, T: Send + 'a>(op: &'static str) -> DriverFuture<'a, T> {
    Box::pin(std::future::ready(Err(RigError::not_supported(op))))
}

/// Typed access to a radio.
///
/// One instance per device session. Calls are serialized by the owner, so
/// implementations never see two operations at once. Everything except
/// frequency and mode is optional and reports `NotSupported` by default;
/// callers consult [`Capabilities`] before relying on an operation.
pub trait RigDriver: Send {
    fn caps(&self) -> &Capabilities;

    fn get_freq<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, f64>;

    fn set_freq<'a>(&'a mut self, vfo: Vfo, hz: f64) -> DriverFuture<'a, ()>;

    /// Returns the mode and its filter width in Hz.
    fn get_mode<'a>(&'a mut self, vfo: Vfo) -> DriverFuture<'a, (Mode, i32)>;

    fn set_mode<'a>(&'a mut self, vfo: Vfo, mode: Mode, pb_width: i32) -> DriverFuture<'a, ()>;

    /// Default filter width the device uses for `mode`.
    fn get_pb_normal<'a>(&'a mut self, _mode: Mode) -> DriverFuture<'a, i32> {
        unsupported("get_pb_normal")
    }

    fn get_power<'a>(&'a mut self) -> DriverFuture<'a, bool> {
        unsupported("get_power")
    }

    fn set_power<'a>(&'a mut self, _on: bool) -> DriverFuture<'a, ()> {
        unsupported("set_power")
    }

    fn get_vfo<'a>(&'a mut self) -> DriverFuture<'a, Vfo> {
        unsupported("get_vfo")
    }

    fn set_vfo<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, ()> {
        unsupported("set_vfo")
    }

    fn get_ant<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        unsupported("get_ant")
    }

    fn set_ant<'a>(&'a mut self, _vfo: Vfo, _ant: i32) -> DriverFuture<'a, ()> {
        unsupported("set_ant")
    }

    fn get_rit<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        unsupported("get_rit")
    }

    fn set_rit<'a>(&'a mut self, _vfo: Vfo, _hz: i32) -> DriverFuture<'a, ()> {
        unsupported("set_rit")
    }

    fn get_xit<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        unsupported("get_xit")
    }

    fn set_xit<'a>(&'a mut self, _vfo: Vfo, _hz: i32) -> DriverFuture<'a, ()> {
        unsupported("set_xit")
    }

    fn get_ts<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, i32> {
        unsupported("get_ts")
    }

    fn set_ts<'a>(&'a mut self, _vfo: Vfo, _hz: i32) -> DriverFuture<'a, ()> {
        unsupported("set_ts")
    }

    fn get_ptt<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, bool> {
        unsupported("get_ptt")
    }

    fn set_ptt<'a>(&'a mut self, _vfo: Vfo, _ptt: bool) -> DriverFuture<'a, ()> {
        unsupported("set_ptt")
    }

    /// Returns `(enabled, tx_vfo)`.
    fn get_split_vfo<'a>(&'a mut self, _vfo: Vfo) -> DriverFuture<'a, (bool, Vfo)> {
        unsupported("get_split_vfo")
    }

    fn set_split_vfo<'a>(
        &'a mut self,
        _vfo: Vfo,
        _enabled: bool,
        _tx_vfo: Vfo,
    ) -> DriverFuture<'a, ()> {
        unsupported("set_split_vfo")
    }

    fn get_split_freq<'a>(&'a mut self, _tx_vfo: Vfo) -> DriverFuture<'a, f64> {
        unsupported("get_split_freq")
    }

    fn set_split_freq<'a>(&'a mut self, _tx_vfo: Vfo, _hz: f64) -> DriverFuture<'a, ()> {
        unsupported("set_split_freq")
    }

    fn get_split_mode<'a>(&'a mut self, _tx_vfo: Vfo) -> DriverFuture<'a, (Mode, i32)> {
        unsupported("get_split_mode")
    }

    fn set_split_mode<'a>(
        &'a mut self,
        _tx_vfo: Vfo,
        _mode: Mode,
        _pb_width: i32,
    ) -> DriverFuture<'a, ()> {
        unsupported("set_split_mode")
    }

    fn get_func<'a>(&'a mut self, _vfo: Vfo, _func: Func) -> DriverFuture<'a, bool> {
        unsupported("get_func")
    }

    fn set_func<'a>(&'a mut self, _vfo: Vfo, _func: Func, _on: bool) -> DriverFuture<'a, ()> {
        unsupported("set_func")
    }

    fn get_level<'a>(&'a mut self, _vfo: Vfo, _level: Level) -> DriverFuture<'a, f32> {
        unsupported("get_level")
    }

    fn set_level<'a>(&'a mut self, _vfo: Vfo, _level: Level, _value: f32) -> DriverFuture<'a, ()> {
        unsupported("set_level")
    }

    fn get_parm<'a>(&'a mut self, _parm: Parm) -> DriverFuture<'a, f32> {
        unsupported("get_parm")
    }

    fn set_parm<'a>(&'a mut self, _parm: Parm, _value: f32) -> DriverFuture<'a, ()> {
        unsupported("set_parm")
    }

    fn vfo_op<'a>(&'a mut self, _vfo: Vfo, _op: VfoOp) -> DriverFuture<'a, ()> {
        unsupported("vfo_op")
    }

    /// Release the device. Called once during shutdown.
    fn close<'a>(&'a mut self) -> DriverFuture<'a, ()> {
        Box::pin(std::future::ready(Ok(())))
    }
}
