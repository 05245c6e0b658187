// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for catsync-client.
//!
//! Config is loaded from the `[catsync-client]` section of `catsync.toml`,
//! searched in the same locations as the server's.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use catsync_app::{validate_log_level, ConfigError, ConfigFile};

/// Top-level client configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub general: GeneralConfig,
    pub bus: BusConfig,
    /// Print every field change seen in the replica
    pub print_updates: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            bus: BusConfig::default(),
            print_updates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    pub station: String,
    pub radio: String,
    /// Identifies this client in update requests and pings.
    /// A random one is generated when unset.
    pub user_id: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            station: "station".to_string(),
            radio: "radio1".to_string(),
            user_id: None,
        }
    }
}

impl GeneralConfig {
    pub fn resolved_user_id(&self) -> String {
        match self.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        }
    }
}

/// Wire protocol spoken to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BusProtocol {
    /// The TCP bridge of a catsync-server's embedded broker.
    #[default]
    Catsync,
    Mqtt,
}

/// Broker the client connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub protocol: BusProtocol,
    pub host: String,
    pub port: u16,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            protocol: BusProtocol::Catsync,
            host: "127.0.0.1".to_string(),
            port: 4540,
        }
    }
}

impl BusConfig {
    /// Override host and port from a `host:port` string. IPv6 hosts must
    /// be bracketed.
    pub fn set_addr(&mut self, addr: &str) -> Result<(), String> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| format!("Broker address '{}' must be host:port", addr))?;
        let port: u16 = port
            .parse()
            .map_err(|e| format!("Invalid broker port '{}': {}", port, e))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("Broker address '{}' has no host", addr));
        }
        self.host = host.to_string();
        self.port = port;
        Ok(())
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        for (path, value) in [
            ("[general].station", &self.general.station),
            ("[general].radio", &self.general.radio),
        ] {
            if value.trim().is_empty() || value.contains(['/', '+', '#']) {
                return Err(format!(
                    "{} must be non-empty and free of '/', '+' and '#'",
                    path
                ));
            }
        }
        if self.bus.host.trim().is_empty() {
            return Err("[bus].host must not be empty".to_string());
        }
        if self.bus.port == 0 {
            return Err("[bus].port must be > 0".to_string());
        }
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Example configuration wrapped under the `[catsync-client]` header.
    pub fn example_combined_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "catsync-client")]
            inner: ClientConfig,
        }
        let example = ClientConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
                station: "home".to_string(),
                radio: "hf".to_string(),
                user_id: Some("operator".to_string()),
            },
            ..Default::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

impl ConfigFile for ClientConfig {
    fn section_key() -> &'static str {
        "catsync-client"
    }
}
