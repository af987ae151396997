//! Engine configuration loader.
//!
//! Reads `config.toml` (from `--config` or the data directory) into
//! [`EngineConfig`]. Falls back to defaults when the file is missing or
//! malformed, so a fresh install runs without any setup.

use std::path::{Path, PathBuf};

use nodeflow_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "NODEFLOW_DATA_DIR";

/// Load configuration from `path`.
///
/// - Missing file: returns [`EngineConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

/// Data directory: `NODEFLOW_DATA_DIR`, else `~/.nodeflow`, else `./.nodeflow`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nodeflow")
}

/// Default config file location inside `data_dir`.
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// SQLite URL from `[database] url`, else `<data_dir>/nodeflow.db`.
pub fn database_url(config: &EngineConfig, data_dir: &Path) -> String {
    config
        .database
        .url
        .clone()
        .unwrap_or_else(|| format!("sqlite://{}?mode=rwc", data_dir.join("nodeflow.db").display()))
}

/// Artifact directory from `[storage] output_dir`, else `<data_dir>/outputs`.
pub fn output_dir(config: &EngineConfig, data_dir: &Path) -> PathBuf {
    config
        .storage
        .output_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("outputs"))
}
