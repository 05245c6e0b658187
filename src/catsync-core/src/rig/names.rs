// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Static name <-> value tables for the driver boundary.
//!
//! Everything above the driver speaks in symbolic names ("USB", "VFOB",
//! "NB", "RFPOWER"); drivers take and return the typed values below.
//! The numeric values follow the usual CAT library bit assignments so a
//! native binding can pass them straight through.

use crate::rig::response::{RigError, RigResult};

macro_rules! symbol_table {
    (
        $(#[$meta:meta])*
        $ty:ident, $kind:literal {
            $($const_name:ident = $sym:literal => $val:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $ty(pub u64);

        impl $ty {
            $(pub const $const_name: $ty = $ty($val);)*

            const TABLE: &'static [(&'static str, u64)] = &[$(($sym, $val)),*];

            /// Resolve a symbolic name.
            pub fn from_name(name: &str) -> RigResult<Self> {
                Self::TABLE
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| $ty(*v))
                    .ok_or_else(|| RigError::unknown($kind, name))
            }

            /// Symbolic name of this value.
            pub fn name(self) -> RigResult<&'static str> {
                Self::TABLE
                    .iter()
                    .find(|(_, v)| *v == self.0)
                    .map(|(n, _)| *n)
                    .ok_or_else(|| RigError::unknown($kind, format!("{:#x}", self.0)))
            }

            /// All names known to the table, in table order.
            pub fn names() -> impl Iterator<Item = &'static str> {
                Self::TABLE.iter().map(|(n, _)| *n)
            }
        }
    };
}

symbol_table! {
    /// Operating mode.
    Mode, "mode" {
        AM = "AM" => 1 << 0,
        CW = "CW" => 1 << 1,
        USB = "USB" => 1 << 2,
        LSB = "LSB" => 1 << 3,
        RTTY = "RTTY" => 1 << 4,
        FM = "FM" => 1 << 5,
        WFM = "WFM" => 1 << 6,
        CWR = "CWR" => 1 << 7,
        RTTYR = "RTTYR" => 1 << 8,
        AMS = "AMS" => 1 << 9,
        PKTLSB = "PKTLSB" => 1 << 10,
        PKTUSB = "PKTUSB" => 1 << 11,
        PKTFM = "PKTFM" => 1 << 12,
        ECSSUSB = "ECSSUSB" => 1 << 13,
        ECSSLSB = "ECSSLSB" => 1 << 14,
        FAX = "FAX" => 1 << 15,
        SAM = "SAM" => 1 << 16,
        SAL = "SAL" => 1 << 17,
        SAH = "SAH" => 1 << 18,
        DSB = "DSB" => 1 << 19,
    }
}

symbol_table! {
    /// VFO selector.
    Vfo, "vfo" {
        NONE = "NONE" => 0,
        VFOA = "VFOA" => 1 << 0,
        VFOB = "VFOB" => 1 << 1,
        VFOC = "VFOC" => 1 << 2,
        SUB = "SUB" => 1 << 25,
        MAIN = "MAIN" => 1 << 26,
        MEM = "MEM" => 1 << 28,
        CURR = "CURR" => 1 << 29,
    }
}

impl Vfo {
    /// The other half of the A/B pair, used as the default transmit VFO.
    pub fn opposite(self) -> Vfo {
        if self == Vfo::VFOA {
            Vfo::VFOB
        } else {
            Vfo::VFOA
        }
    }
}

symbol_table! {
    /// VFO operation.
    VfoOp, "vfo operation" {
        CPY = "CPY" => 1 << 0,
        XCHG = "XCHG" => 1 << 1,
        FROM_VFO = "FROM_VFO" => 1 << 2,
        TO_VFO = "TO_VFO" => 1 << 3,
        MCL = "MCL" => 1 << 4,
        UP = "UP" => 1 << 5,
        DOWN = "DOWN" => 1 << 6,
        BAND_UP = "BAND_UP" => 1 << 7,
        BAND_DOWN = "BAND_DOWN" => 1 << 8,
        LEFT = "LEFT" => 1 << 9,
        RIGHT = "RIGHT" => 1 << 10,
        TUNE = "TUNE" => 1 << 11,
        TOGGLE = "TOGGLE" => 1 << 12,
    }
}

symbol_table! {
    /// Boolean rig function.
    Func, "function" {
        FAGC = "FAGC" => 1 << 0,
        NB = "NB" => 1 << 1,
        COMP = "COMP" => 1 << 2,
        VOX = "VOX" => 1 << 3,
        TONE = "TONE" => 1 << 4,
        TSQL = "TSQL" => 1 << 5,
        SBKIN = "SBKIN" => 1 << 6,
        FBKIN = "FBKIN" => 1 << 7,
        ANF = "ANF" => 1 << 8,
        NR = "NR" => 1 << 9,
        AIP = "AIP" => 1 << 10,
        APF = "APF" => 1 << 11,
        MON = "MON" => 1 << 12,
        MN = "MN" => 1 << 13,
        RF = "RF" => 1 << 14,
        ARO = "ARO" => 1 << 15,
        LOCK = "LOCK" => 1 << 16,
        MUTE = "MUTE" => 1 << 17,
        VSC = "VSC" => 1 << 18,
        REV = "REV" => 1 << 19,
        SQL = "SQL" => 1 << 20,
        ABM = "ABM" => 1 << 21,
        BC = "BC" => 1 << 22,
        MBC = "MBC" => 1 << 23,
        AFC = "AFC" => 1 << 25,
        SATMODE = "SATMODE" => 1 << 26,
        SCOPE = "SCOPE" => 1 << 27,
        RESUME = "RESUME" => 1 << 28,
        TBURST = "TBURST" => 1 << 29,
        TUNER = "TUNER" => 1 << 30,
    }
}

symbol_table! {
    /// Analog level, including the read-only meters.
    Level, "level" {
        PREAMP = "PREAMP" => 1 << 0,
        ATT = "ATT" => 1 << 1,
        VOXDELAY = "VOXDELAY" => 1 << 2,
        AF = "AF" => 1 << 3,
        RF = "RF" => 1 << 4,
        SQL = "SQL" => 1 << 5,
        IF = "IF" => 1 << 6,
        APF = "APF" => 1 << 7,
        NR = "NR" => 1 << 8,
        PBT_IN = "PBT_IN" => 1 << 9,
        PBT_OUT = "PBT_OUT" => 1 << 10,
        CWPITCH = "CWPITCH" => 1 << 11,
        RFPOWER = "RFPOWER" => 1 << 12,
        MICGAIN = "MICGAIN" => 1 << 13,
        KEYSPD = "KEYSPD" => 1 << 14,
        NOTCHF = "NOTCHF" => 1 << 15,
        COMP = "COMP" => 1 << 16,
        AGC = "AGC" => 1 << 17,
        BKINDL = "BKINDL" => 1 << 18,
        BALANCE = "BAL" => 1 << 19,
        METER = "METER" => 1 << 20,
        VOXGAIN = "VOXGAIN" => 1 << 21,
        ANTIVOX = "ANTIVOX" => 1 << 22,
        SLOPE_LOW = "SLOPE_LOW" => 1 << 23,
        SLOPE_HIGH = "SLOPE_HIGH" => 1 << 24,
        RAWSTR = "RAWSTR" => 1 << 26,
        SWR = "SWR" => 1 << 28,
        ALC = "ALC" => 1 << 29,
        STRENGTH = "STRENGTH" => 1 << 30,
    }
}

symbol_table! {
    /// Rig-wide parameter.
    Parm, "parameter" {
        ANN = "ANN" => 1 << 0,
        APO = "APO" => 1 << 1,
        BACKLIGHT = "BACKLIGHT" => 1 << 2,
        BEEP = "BEEP" => 1 << 4,
        TIME = "TIME" => 1 << 5,
        BAT = "BAT" => 1 << 6,
        KEYLIGHT = "KEYLIGHT" => 1 << 7,
    }
}
