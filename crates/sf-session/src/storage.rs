//! Credential Store
//!
//! Durable client-side storage for the access token, the refresh token and the
//! cached identity. Each lives in its own slot of a [`KeyValueStorage`], so a
//! partially written session is representable and is reported as "no session".
//!
//! Storage failures never propagate: they are logged and the store behaves as if
//! it were empty, leaving the session non-persistent.

use crate::session::Session;
use parking_lot::Mutex;
use sf_common::Identity;
use sf_config::StorageConfig;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Slot holding the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Slot holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Slot holding the serialized identity
pub const IDENTITY_KEY: &str = "user";

const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage contents are corrupt: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// String key/value slots, the shape of browser local storage.
pub trait KeyValueStorage: Send + Sync + fmt::Debug {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}

/// Slots kept as one JSON object in `<data_dir>/session.json`.
///
/// Writes go to a temporary file that is renamed over the original, so a crash
/// mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SESSION_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", self.path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, document: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn modify<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self.lock.lock();
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(StorageError::Corrupt(reason)) => {
                warn!(%reason, "Replacing corrupt session file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        f(&mut document);
        self.write_document(&document)
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_document()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|doc| {
            doc.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|doc| {
            doc.remove(key);
        })
    }
}

/// Build the storage backend named by the configuration.
pub fn from_config(config: &StorageConfig) -> Arc<dyn KeyValueStorage> {
    match config.backend.as_str() {
        "memory" => Arc::new(MemoryStorage::new()),
        _ => Arc::new(FileStorage::new(&config.data_dir)),
    }
}

/// Raw slot contents; any combination of present and absent is possible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub identity: Option<Identity>,
}

impl StoredCredentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.identity.is_none()
    }

    /// A usable session needs both an access token and an identity.
    pub fn into_session(self) -> Option<Session> {
        match (self.access_token, self.identity) {
            (Some(access_token), Some(identity)) => Some(Session {
                access_token,
                refresh_token: self.refresh_token,
                identity,
            }),
            _ => None,
        }
    }
}

/// Opaque storage of the three session slots.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Store backed by [`MemoryStorage`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Write all three slots. A session without a refresh token empties that slot.
    pub fn save(&self, session: &Session) {
        let identity = match serde_json::to_string(&session.identity) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize identity, session will not persist");
                return;
            }
        };

        self.write(ACCESS_TOKEN_KEY, Some(&session.access_token));
        self.write(REFRESH_TOKEN_KEY, session.refresh_token.as_deref());
        self.write(IDENTITY_KEY, Some(&identity));
    }

    /// Load the stored session, or `None` when any required slot is missing
    pub fn load(&self) -> Option<Session> {
        self.load_slots().into_session()
    }

    /// Read every slot without judging whether they form a session
    pub fn load_slots(&self) -> StoredCredentials {
        let identity = self.read(IDENTITY_KEY).and_then(|json| {
            serde_json::from_str::<Identity>(&json)
                .map_err(|e| warn!(error = %e, "Ignoring unreadable identity slot"))
                .ok()
        });

        StoredCredentials {
            access_token: self.read(ACCESS_TOKEN_KEY),
            refresh_token: self.read(REFRESH_TOKEN_KEY),
            identity,
        }
    }

    /// Whether any slot holds a value, readable or not
    pub fn has_any_slot(&self) -> bool {
        [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY]
            .into_iter()
            .any(|key| self.read(key).is_some())
    }

    /// Empty all three slots
    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY] {
            if let Err(e) = self.storage.remove_item(key) {
                warn!(key, error = %e, "Failed to clear credential slot");
            }
        }
        debug!("Credential store cleared");
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get_item(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Credential storage unavailable, treating slot as empty");
                None
            }
        }
    }

    fn write(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(value) => self.storage.set_item(key, value),
            None => self.storage.remove_item(key),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to persist credential slot");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sf_common::Role;

    /// Storage whose every operation fails, as with a full quota.
    #[derive(Debug, Default)]
    pub(crate) struct UnavailableStorage;

    impl KeyValueStorage for UnavailableStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }

        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }
    }

    pub(crate) fn session(role: Role) -> Session {
        Session {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            identity: Identity {
                id: "u1".to_string(),
                email: "a@x.com".to_string(),
                display_name: None,
                first_name: None,
                last_name: None,
                role,
            },
        }
    }

    #[test]
    fn test_save_load_clear() {
        let store = CredentialStore::in_memory();
        assert!(store.load().is_none());

        store.save(&session(Role::Vendor));
        let loaded = store.load().unwrap();
        assert_eq!(loaded, session(Role::Vendor));

        store.clear();
        assert!(store.load_slots().is_empty());
    }

    #[test]
    fn test_partial_slots_are_not_a_session() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(storage.clone());

        storage
            .set_item(IDENTITY_KEY, r#"{"id":"u1","email":"a@x.com","role":"USER"}"#)
            .unwrap();
        let slots = store.load_slots();
        assert!(slots.identity.is_some());
        assert!(store.load().is_none());

        storage.remove_item(IDENTITY_KEY).unwrap();
        storage.set_item(ACCESS_TOKEN_KEY, "token").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_missing_refresh_token_still_loads() {
        let store = CredentialStore::in_memory();
        let mut s = session(Role::User);
        s.refresh_token = None;
        store.save(&s);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.refresh_token, None);
    }

    #[test]
    fn test_corrupt_identity_is_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(storage.clone());
        storage.set_item(ACCESS_TOKEN_KEY, "token").unwrap();
        storage.set_item(IDENTITY_KEY, "{not json").unwrap();

        let slots = store.load_slots();
        assert_eq!(slots.access_token.as_deref(), Some("token"));
        assert!(slots.identity.is_none());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_unavailable_storage_degrades_to_empty() {
        let store = CredentialStore::new(Arc::new(UnavailableStorage));
        store.save(&session(Role::Admin));
        assert!(store.load().is_none());
        store.clear();
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = CredentialStore::new(Arc::new(FileStorage::new(dir.path())));
        store.save(&session(Role::Support));

        let reopened = CredentialStore::new(Arc::new(FileStorage::new(dir.path())));
        assert_eq!(reopened.load(), Some(session(Role::Support)));

        reopened.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_file_storage_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        std::fs::write(storage.path(), "garbage").unwrap();

        assert!(matches!(
            storage.get_item(ACCESS_TOKEN_KEY),
            Err(StorageError::Corrupt(_))
        ));
        let store = CredentialStore::new(Arc::new(storage));
        assert!(store.load().is_none());

        store.save(&session(Role::User));
        assert_eq!(store.load(), Some(session(Role::User)));
    }

    #[test]
    fn test_from_config_selects_backend() {
        let config = StorageConfig {
            backend: "memory".to_string(),
            data_dir: "./unused".to_string(),
        };
        let storage = from_config(&config);
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
