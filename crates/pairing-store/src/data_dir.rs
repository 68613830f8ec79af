use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Default location for all pairing state.
fn default_base_dir() -> PathBuf {
    dirs_home().join(".pairing")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// On-disk layout:
///
/// ```text
/// ~/.pairing/
/// ├── config.toml   (optional)
/// ├── profile.db
/// └── pairing.pid
/// ```
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// `base_dir` overrides the default (env var or tests). The directory is
    /// created if missing.
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let root = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        fs::create_dir_all(&root).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_db(&self) -> PathBuf {
        self.root.join("profile.db")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join("pairing.pid")
    }

    pub fn open_store(&self) -> Result<Store> {
        Store::open(&self.profile_db())
    }
}
