//! File system paths for the sync daemon.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for the daemon.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.courier-sync)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.courier-sync`.
    pub fn new() -> CoreResult<Self> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".courier-sync"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (`<base>/config.json`).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the queue database file path (`<base>/courier-sync.sqlite`).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("courier-sync.sqlite")
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}
