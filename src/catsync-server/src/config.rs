// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for catsync-server.
//!
//! Config is loaded from the `[catsync-server]` section of `catsync.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./catsync.toml`
//! 3. `~/.config/catsync/catsync.toml`
//! 4. `/etc/catsync/catsync.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use catsync_app::{validate_log_level, ConfigError, ConfigFile};
use catsync_core::SessionConfig;

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub rig: RigConfig,
    pub behavior: BehaviorConfig,
    pub bus: BusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Station identifier, first topic level
    pub station: String,
    /// Radio identifier within the station
    pub radio: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            station: "station".to_string(),
            radio: "radio1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Driver name (e.g. "dummy")
    pub model: Option<String>,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            model: Some("dummy".to_string()),
        }
    }
}

/// Session timing and verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Initial meter refresh period in milliseconds, 0 = off
    pub polling_interval_ms: i32,
    /// Initial full resync period in seconds, 0 = off
    pub sync_interval_s: i32,
    /// Upper bound for a single driver call
    pub call_timeout_ms: u64,
    /// Largest level/parameter read-back difference still treated as equal
    pub level_tolerance: f32,
    /// Resyncs are skipped this long after an update request
    pub sync_holdoff_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 100,
            sync_interval_s: 5,
            call_timeout_ms: 2000,
            level_tolerance: 0.1,
            sync_holdoff_ms: 3000,
        }
    }
}

impl BehaviorConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            level_tolerance: self.level_tolerance,
            sync_holdoff: Duration::from_millis(self.sync_holdoff_ms),
            polling_interval_ms: self.polling_interval_ms,
            sync_interval_s: self.sync_interval_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusMode {
    /// Run the broker inside this process.
    Embedded,
    /// Connect to another catsync broker over its TCP bridge.
    Remote,
    /// Connect to an external MQTT broker.
    Mqtt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub mode: BusMode,
    /// Expose the embedded broker over TCP
    pub listen_enabled: bool,
    /// IP address for the embedded broker listener
    pub listen: IpAddr,
    /// TCP port for the embedded broker listener
    pub port: u16,
    /// Broker host (remote and mqtt modes)
    pub remote_host: Option<String>,
    /// Broker port (remote and mqtt modes; MQTT brokers usually use 1883)
    pub remote_port: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mode: BusMode::Embedded,
            listen_enabled: true,
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4540,
            remote_host: None,
            remote_port: 4540,
        }
    }
}

impl BusConfig {
    /// `host:port` of the broker, when configured.
    pub fn remote_addr(&self) -> Option<String> {
        self.remote_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .map(|h| format!("{}:{}", h, self.remote_port))
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        validate_topic_level("[general].station", &self.general.station)?;
        validate_topic_level("[general].radio", &self.general.radio)?;

        let b = &self.behavior;
        if b.polling_interval_ms < 0 {
            return Err("[behavior].polling_interval_ms must be >= 0".to_string());
        }
        if b.sync_interval_s < 0 {
            return Err("[behavior].sync_interval_s must be >= 0".to_string());
        }
        if b.call_timeout_ms == 0 {
            return Err("[behavior].call_timeout_ms must be > 0".to_string());
        }
        if !(b.level_tolerance.is_finite() && b.level_tolerance >= 0.0) {
            return Err("[behavior].level_tolerance must be a non-negative number".to_string());
        }

        match self.bus.mode {
            BusMode::Embedded => {
                if self.bus.listen_enabled && self.bus.port == 0 {
                    return Err("[bus].port must be > 0 when the listener is enabled".to_string());
                }
            }
            BusMode::Remote | BusMode::Mqtt => {
                if self.bus.remote_addr().is_none() {
                    return Err(
                        "[bus].remote_host must be set in remote and mqtt modes".to_string()
                    );
                }
                if self.bus.remote_port == 0 {
                    return Err("[bus].remote_port must be > 0".to_string());
                }
            }
        }
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load from the default search paths, or defaults when none has the section.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Example configuration wrapped under the `[catsync-server]` header.
    pub fn example_combined_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "catsync-server")]
            inner: ServerConfig,
        }
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
                station: "home".to_string(),
                radio: "hf".to_string(),
            },
            rig: RigConfig {
                model: Some("dummy".to_string()),
            },
            behavior: BehaviorConfig::default(),
            bus: BusConfig::default(),
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_topic_level(path: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", path));
    }
    if value.contains(['/', '+', '#']) {
        return Err(format!("{} must not contain '/', '+' or '#'", path));
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "catsync-server"
    }
}
