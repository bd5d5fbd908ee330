//! Config loader — reads `~/.pingcord/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.pingcord/config.json` (or an explicit path)
//! 3. Environment variables `PINGCORD_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from `path` (or the default path) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    apply_env_overrides(load_config_from_path(&config_path))
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// - `PINGCORD_DISCORD__TOKEN` → `discord.token`
/// - `PINGCORD_DISCORD__API_BASE` → `discord.api_base`
/// - `PINGCORD_DISCORD__TIMEOUT_SECS` → `discord.timeout_secs`
/// - `PINGCORD_DELIVERY__MODE` → `delivery.mode`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("PINGCORD_DISCORD__TOKEN") {
        config.discord.token = val;
    }
    if let Ok(val) = std::env::var("PINGCORD_DISCORD__API_BASE") {
        config.discord.api_base = val;
    }
    if let Ok(val) = std::env::var("PINGCORD_DISCORD__TIMEOUT_SECS") {
        match val.parse::<u64>() {
            Ok(n) => config.discord.timeout_secs = n,
            Err(_) => warn!(value = %val, "ignoring invalid PINGCORD_DISCORD__TIMEOUT_SECS"),
        }
    }
    if let Ok(val) = std::env::var("PINGCORD_DELIVERY__MODE") {
        match val.parse() {
            Ok(mode) => config.delivery.mode = mode,
            Err(e) => warn!(error = %e, "ignoring PINGCORD_DELIVERY__MODE"),
        }
    }
    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
