//! Persistence and configuration.

mod config;
pub mod database;
pub mod migrations;

pub use config::{BreakIntervals, Config, GateSection, SessionSection};
pub use database::{Database, NewTask, SessionSummary};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/deepfocus[-dev]/` based on DEEPFOCUS_ENV.
///
/// Set DEEPFOCUS_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("DEEPFOCUS_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("deepfocus-dev")
    } else {
        base_dir.join("deepfocus")
    };

    std::fs::create_dir_all(&dir).map_err(|err| ConfigError::DataDir {
        path: dir.clone(),
        message: err.to_string(),
    })?;
    Ok(dir)
}
