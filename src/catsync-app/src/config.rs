// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

const FILE_NAME: &str = "catsync.toml";

/// Default locations of `catsync.toml`, in search order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("catsync").join(FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/catsync").join(FILE_NAME));
    paths
}

fn parse_err(path: &Path, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::ParseError(path.to_path_buf(), e.to_string())
}

fn parse_section<T: DeserializeOwned>(
    content: &str,
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let table: toml::Table = toml::from_str(content).map_err(|e| parse_err(path, e))?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // round-trip through text so serde defaults on T apply
    let section_toml = toml::to_string(section).map_err(|e| parse_err(path, e))?;
    let cfg = toml::from_str::<T>(&section_toml).map_err(|e| parse_err(path, e))?;
    Ok(Some(cfg))
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(&content, path, key)
}

/// A configuration stored as one `[section]` of `catsync.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key (`"catsync-server"` or `"catsync-client"`).
    fn section_key() -> &'static str;

    /// Load the section from `path`; a missing section is an error.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the first default-path file that has the section, or defaults.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// Parse the section out of an in-memory document.
    fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let origin = Path::new("<inline>");
        parse_section::<Self>(content, origin, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                origin.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }
}

/// Accepts the level names understood by `init_logging`.
pub fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    match level {
        None => Ok(()),
        Some(l) => match l.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(format!(
                "[general].log_level '{}' is not one of trace, debug, info, warn, error",
                l
            )),
        },
    }
}
