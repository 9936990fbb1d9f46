//! Usage Store Adapter
//!
//! Persists the usage record as a JSON document under the local state
//! directory, one file per identity (`<identity>_usage.json`). Writes are
//! whole-file replacements; concurrent clients sharing an identity get
//! last-writer-wins semantics.

use std::fs;
use std::path::{Path, PathBuf};

use crate::application::ports::{UsageStore, UsageStoreError};
use crate::domain::quota::UsageRecord;

/// File-backed usage store keyed by identity.
#[derive(Debug, Clone)]
pub struct JsonUsageStore {
    path: PathBuf,
}

impl JsonUsageStore {
    /// Create a store for `identity` under `state_dir`.
    ///
    /// Creates the state directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory cannot be created.
    pub fn open(state_dir: &Path, identity: &str) -> Result<Self, UsageStoreError> {
        fs::create_dir_all(state_dir)?;
        Ok(Self {
            path: state_dir.join(format!("{}_usage.json", sanitize_identity(identity))),
        })
    }

    /// Path of the backing usage document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStore for JsonUsageStore {
    fn load(&self) -> Result<Option<UsageRecord>, UsageStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&bytes)?;
        Ok(Some(record))
    }

    fn save(&self, record: &UsageRecord) -> Result<(), UsageStoreError> {
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Replace path-hostile characters so identities like `auth0|abc` stay
/// single-file.
fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonUsageStore::open(dir.path(), "alice").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = JsonUsageStore::open(dir.path(), "alice").unwrap();

        let mut record = UsageRecord::new(Utc::now());
        record.publish_count = 9;
        record.bytes_published = 4096;
        store.save(&record).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn file_is_named_after_identity() {
        let dir = TempDir::new().unwrap();
        let store = JsonUsageStore::open(dir.path(), "alice").unwrap();
        assert!(store.path().ends_with("alice_usage.json"));
    }

    #[test]
    fn hostile_identity_characters_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = JsonUsageStore::open(dir.path(), "auth0|user/1").unwrap();
        assert!(store.path().ends_with("auth0_user_1_usage.json"));

        let record = UsageRecord::new(Utc::now());
        store.save(&record).unwrap();
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonUsageStore::open(dir.path(), "alice").unwrap();
        fs::write(store.path(), b"not json").unwrap();
        assert!(matches!(
            store.load(),
            Err(UsageStoreError::Serde(_))
        ));
    }

    #[test]
    fn identities_do_not_share_state() {
        let dir = TempDir::new().unwrap();
        let alice = JsonUsageStore::open(dir.path(), "alice").unwrap();
        let bob = JsonUsageStore::open(dir.path(), "bob").unwrap();

        let mut record = UsageRecord::new(Utc::now());
        record.publish_count = 3;
        alice.save(&record).unwrap();

        assert!(bob.load().unwrap().is_none());
    }
}
