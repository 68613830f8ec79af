use std::fs;
use std::path::Path;

use pairing_core::{PROFILE_VERSION, Profile, Timestamp};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Parse an exported document, refusing other versions. Unlike a stale
/// database row, an import the user asked for should fail loudly.
pub fn parse_profile(json: &str) -> Result<Profile> {
    let profile: Profile = serde_json::from_str(json)?;
    if profile.version != PROFILE_VERSION {
        return Err(StoreError::InvalidData(format!(
            "profile version {} is not supported (expected {PROFILE_VERSION})",
            profile.version
        )));
    }
    Ok(profile)
}

impl Store {
    /// Import a profile export file, replacing the stored profile.
    pub fn import_json_file(&self, path: &Path, now: Timestamp) -> Result<Profile> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json, now)
    }

    pub fn import_json_str(&self, json: &str, now: Timestamp) -> Result<Profile> {
        let profile = parse_profile(json)?;
        self.save_profile(&profile, now)?;
        Ok(profile)
    }

    /// Export the stored profile to a pretty-printed JSON file.
    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_json_string(&self) -> Result<String> {
        let profile = self
            .load_profile()?
            .ok_or_else(|| StoreError::InvalidData("no profile has been saved yet".into()))?;
        Ok(serde_json::to_string_pretty(&profile)?)
    }
}
