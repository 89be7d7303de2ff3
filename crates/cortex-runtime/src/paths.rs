//! Platform directory resolution.
//!
//! Config: `$CORTEX_CONFIG_DIR`, then `$XDG_CONFIG_HOME/cortex`, then the
//! platform config dir. Data: `$CORTEX_DATA_DIR`, then the platform data
//! dir (`~/Library/Application Support/Cortex` on Darwin,
//! `$XDG_DATA_HOME/cortex` elsewhere).

use std::path::PathBuf;

use crate::error::{Error, Result};

pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CORTEX_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join("cortex"));
    }
    dirs::config_dir()
        .map(|d| d.join("cortex"))
        .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.yaml"))
}

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("CORTEX_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if cfg!(target_os = "macos") {
        return dirs::data_dir()
            .map(|d| d.join("Cortex"))
            .ok_or_else(|| Error::Config("cannot determine data directory".to_string()));
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME")
        && !xdg.is_empty()
    {
        return Ok(PathBuf::from(xdg).join("cortex"));
    }
    dirs::data_dir()
        .map(|d| d.join("cortex"))
        .ok_or_else(|| Error::Config("cannot determine data directory".to_string()))
}

pub fn store_file() -> Result<PathBuf> {
    Ok(data_dir()?.join("cortex.db"))
}

/// PID files live in the data directory under well-known names.
pub fn pid_file(name: &str) -> Result<PathBuf> {
    Ok(data_dir()?.join(format!("{name}.pid")))
}
