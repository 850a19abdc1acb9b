// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads a config file from disk or a string.
//! - [`validate`] turns a [`RawConfigFile`] into a [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_from_path, load_from_str, parse_and_validate,
};
pub use model::{
    ConfigFile, CooldownSection, DelayConfig, DelaySection, EngineSection, ModuleConfig,
    RawConfigFile,
};
