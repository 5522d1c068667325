// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs` defines the TOML-backed data model and its defaults.
//! - `loader.rs` reads a config file from disk.
//! - `validate.rs` turns a `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    AccessSection, ConfigFile, HistorySection, PublisherSection, RawConfigFile, SchedulerSection,
    ServerSection, SupervisorSection, WorkerSection,
};
pub use validate::validate_config;
