//! Persistent storage for the process identity.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smc_crypto::Identity;
use tracing::debug;
use zeroize::Zeroize;

use crate::errors::CoreError;

/// Backend that keeps the identity between process restarts.
pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<Option<Identity>, CoreError>;
    fn store(&self, identity: &Identity) -> Result<(), CoreError>;
    fn delete(&self) -> Result<(), CoreError>;
}

/// On-disk form of the identity
#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    version: u32,
    /// Ed25519 seed (32 bytes, hex encoded)
    sign_seed: String,
    created_at: DateTime<Utc>,
}

impl StoredIdentity {
    const CURRENT_VERSION: u32 = 1;

    fn new(identity: &Identity) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            sign_seed: hex::encode(&identity.seed()[..]),
            created_at: Utc::now(),
        }
    }

    fn to_identity(&self) -> Result<Identity, CoreError> {
        if self.version != Self::CURRENT_VERSION {
            return Err(CoreError::Storage(format!(
                "unsupported identity file version {}",
                self.version
            )));
        }
        Identity::from_secret_hex(&self.sign_seed)
            .map_err(|e| CoreError::Storage(format!("stored identity is corrupt: {e}")))
    }
}

impl Drop for StoredIdentity {
    fn drop(&mut self) {
        self.sign_seed.zeroize();
    }
}

/// JSON file readable only by the owner.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Always creates a fresh file, so a leftover from an interrupted write
    /// never lends its permissions to the new contents.
    fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<Identity>, CoreError> {
        let mut contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let parsed = serde_json::from_str::<StoredIdentity>(&contents);
        contents.zeroize();
        let stored = parsed.map_err(|e| CoreError::Storage(e.to_string()))?;

        debug!(path = %self.path.display(), created_at = %stored.created_at, "Loaded identity");
        stored.to_identity().map(Some)
    }

    fn store(&self, identity: &Identity) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut json = serde_json::to_vec_pretty(&StoredIdentity::new(identity))
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        // Write the temp file then rename over the old one
        let temp_path = self.path.with_extension("tmp");
        let written = Self::write_private(&temp_path, &json);
        json.zeroize();
        written?;
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), "Stored identity");
        Ok(())
    }

    fn delete(&self) -> Result<(), CoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the seed in memory only. Used by tests and hosts without storage.
#[derive(Default)]
pub struct InMemoryKeyStore {
    seed: Mutex<Option<zeroize::Zeroizing<[u8; 32]>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn load(&self) -> Result<Option<Identity>, CoreError> {
        Ok(self.seed.lock().as_ref().map(|seed| Identity::from_seed(seed)))
    }

    fn store(&self, identity: &Identity) -> Result<(), CoreError> {
        *self.seed.lock() = Some(identity.seed());
        Ok(())
    }

    fn delete(&self) -> Result<(), CoreError> {
        *self.seed.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("identity.json"));
        assert!(store.load().unwrap().is_none());
        assert!(store.delete().is_ok());
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("nested").join("identity.json"));

        let identity = Identity::generate().unwrap();
        store.store(&identity).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_file_format() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("identity.json"));
        let identity = Identity::from_seed(&[7u8; 32]);
        store.store(&identity).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["sign_seed"], "07".repeat(32));
        assert!(raw["created_at"].as_str().unwrap().contains('T'));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("identity.json"));
        store.store(&Identity::generate().unwrap()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_leftover_temp_file_does_not_widen_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.json");
        let leftover = path.with_extension("tmp");
        fs::write(&leftover, b"partial").unwrap();
        fs::set_permissions(&leftover, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileKeyStore::new(path);
        let identity = Identity::generate().unwrap();
        store.store(&identity).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!leftover.exists());
        assert_eq!(
            store.load().unwrap().unwrap().public_key_hex(),
            identity.public_key_hex()
        );
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, r#"{"version":1,"sign_seed":"abcd","created_at":"2024-01-01T00:00:00Z"}"#)
            .unwrap();
        assert!(matches!(
            FileKeyStore::new(path.clone()).load(),
            Err(CoreError::Storage(_))
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileKeyStore::new(path).load(),
            Err(CoreError::Storage(_))
        ));
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("identity.json"));
        store.store(&Identity::generate().unwrap()).unwrap();
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryKeyStore::new();
        assert!(store.load().unwrap().is_none());

        let identity = Identity::generate().unwrap();
        store.store(&identity).unwrap();
        assert_eq!(store.load().unwrap().unwrap().public_key(), identity.public_key());

        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
