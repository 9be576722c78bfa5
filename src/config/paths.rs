//! Configuration paths
//!
//! Utilities for resolving configuration file paths.

use std::path::{Path, PathBuf};

/// Get the host configuration directory
pub fn config_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("CLAWHOST_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("clawhost"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("clawhost"))
                .unwrap_or_else(|| PathBuf::from(".clawhost"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    // Check for explicit override
    if let Ok(path) = std::env::var("CLAWHOST_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("clawhost.json")
}

/// Get the gateway home (secrets file, config documents)
pub fn gateway_home() -> PathBuf {
    if let Ok(dir) = std::env::var("CLAWDBOT_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::home_dir()
        .map(|h| h.join(".clawdbot"))
        .unwrap_or_else(|| PathBuf::from(".clawdbot"))
}

/// Get the gateway workspace directory
pub fn workspace_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("OPENCLAW_WORKSPACE") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::home_dir()
        .map(|h| h.join("clawd"))
        .unwrap_or_else(|| PathBuf::from("./clawd"))
}

/// Ensure a directory exists
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
