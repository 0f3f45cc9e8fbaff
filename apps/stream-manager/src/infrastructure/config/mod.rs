//! Configuration Module
//!
//! Configuration loading for the stream manager service.

mod settings;

pub use settings::{BackendSettings, ConfigError, DEFAULT_STATE_PATH, ManagerConfig, ServerSettings};
