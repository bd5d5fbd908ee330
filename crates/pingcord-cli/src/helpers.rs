//! Shared CLI helpers — path expansion, status marks.

use std::path::PathBuf;

use colored::Colorize;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Green check with `ok` text, or dimmed `missing` text.
pub fn mark(present: bool, ok: &str, missing: &str) -> String {
    if present {
        format!("{} {}", "✓".green(), ok)
    } else {
        format!("{}", format!("· {missing}").dimmed())
    }
}
