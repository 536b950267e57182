//! Configuration and shared application state for the Etrel OCEAN bridge.

pub mod app_state;
pub mod config;

pub use crate::app_state::AppState;
pub use crate::config::{BridgeConfig, ConfigError, DEFAULT_BASE_URL};
