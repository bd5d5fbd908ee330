//! Utility helpers — data directory resolution.

use std::path::PathBuf;

/// Get the PingCord data directory (e.g. `~/.pingcord/`).
pub fn get_data_path() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pingcord")
}
