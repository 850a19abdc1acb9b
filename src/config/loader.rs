// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), "read config file");
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a config file and validate it.
///
/// Validation rejects configs without modules, unknown names in
/// `always_run`, `critical` or `catalogue`, self dependencies and cycles.
/// Dependencies on modules that are not configured only produce a warning.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_str(contents)?)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Routeweave.toml")
}
