use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use pairing_core::{PROFILE_VERSION, Profile, Timestamp};

use crate::error::{Result, StoreError};
use crate::schema;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Profile document ---

    /// Replace the stored document.
    pub fn save_profile(&self, profile: &Profile, saved_at: Timestamp) -> Result<()> {
        let document = serde_json::to_string(profile)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO profile_state (id, version, document, saved_at)
             VALUES (1, ?1, ?2, ?3)",
            params![profile.version, document, saved_at.to_iso8601()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('profile_id', ?1)",
            [&profile.profile_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// The stored profile, or `None` when there is nothing usable to resume:
    /// no row yet, or a document written under a different version.
    pub fn load_profile(&self) -> Result<Option<Profile>> {
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT version, document FROM profile_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((version, document)) = row else {
            return Ok(None);
        };
        if version != i64::from(PROFILE_VERSION) {
            tracing::info!(
                stored = version,
                current = PROFILE_VERSION,
                "profile version mismatch, starting fresh"
            );
            return Ok(None);
        }
        let profile: Profile = serde_json::from_str(&document)?;
        if profile.version != PROFILE_VERSION {
            return Err(StoreError::InvalidData(format!(
                "document version {} disagrees with row version {version}",
                profile.version
            )));
        }
        Ok(Some(profile))
    }

    pub fn last_saved_at(&self) -> Result<Option<Timestamp>> {
        let saved: Option<String> = self
            .conn
            .query_row("SELECT saved_at FROM profile_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(saved.and_then(|s| Timestamp::parse_iso8601(&s)))
    }

    pub fn clear_profile(&self) -> Result<()> {
        self.conn.execute("DELETE FROM profile_state", [])?;
        Ok(())
    }

    /// Fold the WAL back into the main file and truncate it.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairing_core::{Construct, EventDetails, Pipeline, Signal};

    const T0: Timestamp = Timestamp::from_unix(1_771_632_000);

    fn busy_profile() -> Profile {
        let mut p = Pipeline::new(Profile::new(T0));
        for h in 0..6 {
            let at = T0.plus_hours(f64::from(h));
            p.process(
                Signal::event(EventDetails::new("FEATURE_SHIPPED"), "scoreboard", at),
                at,
            );
        }
        p.add_override(Construct::ActionStyle, "QS", 8.0, "fast", T0);
        p.profile().clone()
    }

    #[test]
    fn test_empty_store_loads_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_profile().unwrap().is_none());
        assert!(store.last_saved_at().unwrap().is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let profile = busy_profile();
        store.save_profile(&profile, T0.plus_hours(6.0)).unwrap();

        let loaded = store.load_profile().unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(store.last_saved_at().unwrap(), Some(T0.plus_hours(6.0)));
        assert_eq!(
            store.get_metadata("profile_id").unwrap().as_deref(),
            Some(profile.profile_id.as_str())
        );
    }

    #[test]
    fn test_save_overwrites() {
        let store = Store::open_in_memory().unwrap();
        store.save_profile(&Profile::new(T0), T0).unwrap();
        let second = busy_profile();
        store.save_profile(&second, T0.plus_hours(1.0)).unwrap();

        let rows: i64 = store
            .conn()
            .query_row("SELECT count(*) FROM profile_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(store.load_profile().unwrap().unwrap().profile_id, second.profile_id);
    }

    #[test]
    fn test_version_mismatch_starts_fresh() {
        let store = Store::open_in_memory().unwrap();
        store.save_profile(&busy_profile(), T0).unwrap();
        store
            .conn()
            .execute("UPDATE profile_state SET version = version + 1", [])
            .unwrap();
        assert!(store.load_profile().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO profile_state (id, version, document, saved_at) VALUES (1, ?1, 'not json', '')",
                [i64::from(PROFILE_VERSION)],
            )
            .unwrap();
        assert!(matches!(store.load_profile(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_clear_profile() {
        let store = Store::open_in_memory().unwrap();
        store.save_profile(&busy_profile(), T0).unwrap();
        store.clear_profile().unwrap();
        assert!(store.load_profile().unwrap().is_none());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_metadata("missing").unwrap(), None);
        store.set_metadata("dropped_signals", "3").unwrap();
        assert_eq!(store.get_metadata("dropped_signals").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.db");
        let profile = busy_profile();
        {
            let store = Store::open(&path).unwrap();
            store.save_profile(&profile, T0).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.load_profile().unwrap(), Some(profile));
    }

    #[test]
    fn test_checkpoint_truncates_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.db");
        let store = Store::open(&path).unwrap();
        store.save_profile(&busy_profile(), T0).unwrap();
        store.checkpoint().unwrap();

        let wal = path.with_extension("db-wal");
        let wal_size = std::fs::metadata(&wal).map(|m| m.len()).unwrap_or(0);
        assert_eq!(wal_size, 0);
        assert!(store.load_profile().unwrap().is_some());
    }
}
