//! Session persistence.
//!
//! `SessionStore` keeps the bearer token and the user record in a
//! `StorageBackend` chosen when the store is built. Interactive front ends
//! get durable storage; non-interactive runs (scripts, server-side
//! rendering) get `NoopStorage`, where every read is empty and every write
//! succeeds without effect.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::User;

/// Storage key for the raw bearer token
pub const TOKEN_KEY: &str = "auth_token";

/// Storage key for the JSON-serialized user
pub const USER_KEY: &str = "current_user";

/// File holding the durable key-value document
const STORAGE_FILE: &str = "local_storage.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Key-value storage capability, modelled on browser `Storage`.
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    /// Read several keys from one snapshot, in the order given.
    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>>;

    /// Write several keys so that readers see all of them or none of them.
    fn set_items(&self, items: &[(&str, &str)]) -> Result<(), StorageError>;

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError>;

    fn clear(&self) -> Result<(), StorageError>;
}

/// Durable storage: a single JSON document replaced by atomic rename.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STORAGE_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_document(&self, doc: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = match self.read_document() {
            Ok(doc) => doc,
            Err(StorageError::Corrupt(e)) => {
                warn!(error = %e, path = %self.path.display(), "Discarding corrupt storage document");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        f(&mut doc);
        self.write_document(&doc)
    }
}

impl StorageBackend for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.read_document() {
            Ok(mut doc) => doc.remove(key),
            Err(e) => {
                warn!(error = %e, key, "Failed to read storage document");
                None
            }
        }
    }

    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.read_document() {
            Ok(mut doc) => keys.iter().map(|key| doc.remove(*key)).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read storage document");
                vec![None; keys.len()]
            }
        }
    }

    fn set_items(&self, items: &[(&str, &str)]) -> Result<(), StorageError> {
        self.modify(|doc| {
            for (key, value) in items {
                doc.insert((*key).to_string(), (*value).to_string());
            }
        })
    }

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.modify(|doc| {
            for key in keys {
                doc.remove(*key);
            }
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Process-scoped storage. Used as the ephemeral tier and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>> {
        let map = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        keys.iter().map(|key| map.get(*key).cloned()).collect()
    }

    fn set_items(&self, items: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut map = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in items {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_items(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut map = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

/// Storage for non-interactive execution: nothing is ever kept.
pub struct NoopStorage;

impl StorageBackend for NoopStorage {
    fn get_item(&self, _key: &str) -> Option<String> {
        None
    }

    fn get_items(&self, keys: &[&str]) -> Vec<Option<String>> {
        vec![None; keys.len()]
    }

    fn set_items(&self, _items: &[(&str, &str)]) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove_items(&self, _keys: &[&str]) -> Result<(), StorageError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// The execution context a store is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Interactive,
    NonInteractive,
}

/// A persisted token together with the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct SessionStore {
    durable: Arc<dyn StorageBackend>,
    ephemeral: Arc<dyn StorageBackend>,
    environment: Environment,
}

impl SessionStore {
    /// Store backed by durable storage, plus an ephemeral tier purged on clear.
    pub fn interactive(
        durable: Arc<dyn StorageBackend>,
        ephemeral: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            environment: Environment::Interactive,
        }
    }

    pub fn non_interactive() -> Self {
        Self {
            durable: Arc::new(NoopStorage),
            ephemeral: Arc::new(NoopStorage),
            environment: Environment::NonInteractive,
        }
    }

    /// File-backed durable storage in `dir` with in-memory ephemeral storage.
    pub fn on_disk(dir: impl AsRef<Path>) -> Self {
        Self::interactive(
            Arc::new(FileStorage::new(dir)),
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Store for `environment`, on disk under the configured storage dir.
    pub fn for_environment(environment: Environment, config: &Config) -> anyhow::Result<Self> {
        Ok(match environment {
            Environment::Interactive => Self::on_disk(config.storage_dir()?),
            Environment::NonInteractive => Self::non_interactive(),
        })
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Persist token and user in one write.
    pub fn save(&self, token: &str, user: &User) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(user)?;
        self.durable
            .set_items(&[(TOKEN_KEY, token), (USER_KEY, user_json.as_str())])?;
        debug!(user_id = %user.id, "Session saved");
        Ok(())
    }

    /// Load the persisted session. Returns both parts or nothing.
    pub fn load(&self) -> Option<StoredSession> {
        let mut items = self.durable.get_items(&[TOKEN_KEY, USER_KEY]).into_iter();
        let token = items.next().flatten();
        let user_json = items.next().flatten();

        match (token, user_json) {
            (Some(token), Some(user_json)) => match serde_json::from_str::<User>(&user_json) {
                Ok(user) => Some(StoredSession { token, user }),
                Err(e) => {
                    warn!(error = %e, "Stored user record is unreadable, dropping session");
                    self.remove_session_keys();
                    None
                }
            },
            (None, None) => None,
            _ => {
                warn!("Found half of a stored session, dropping it");
                self.remove_session_keys();
                None
            }
        }
    }

    /// The stored bearer token, only when a complete session is stored.
    pub fn token(&self) -> Option<String> {
        self.load().map(|s| s.token)
    }

    /// Remove the session keys and purge ephemeral storage. Best effort.
    pub fn clear(&self) {
        self.remove_session_keys();
        if let Err(e) = self.ephemeral.clear() {
            warn!(error = %e, "Failed to clear ephemeral storage");
        }
        debug!("Session cleared");
    }

    fn remove_session_keys(&self) {
        if let Err(e) = self.durable.remove_items(&[TOKEN_KEY, USER_KEY]) {
            warn!(error = %e, "Failed to remove stored session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "1".to_string(),
            username: "a".to_string(),
            email: "a@x.com".to_string(),
            role: "user".to_string(),
        }
    }

    fn memory_store() -> (SessionStore, Arc<MemoryStorage>, Arc<MemoryStorage>) {
        let durable = Arc::new(MemoryStorage::new());
        let ephemeral = Arc::new(MemoryStorage::new());
        let store = SessionStore::interactive(durable.clone(), ephemeral.clone());
        (store, durable, ephemeral)
    }

    #[test]
    fn test_save_then_load_returns_both() {
        let (store, durable, _) = memory_store();
        store.save("T", &user()).unwrap();

        assert_eq!(
            store.load(),
            Some(StoredSession { token: "T".to_string(), user: user() })
        );
        assert_eq!(durable.get_item(TOKEN_KEY).as_deref(), Some("T"));
        assert_eq!(
            durable.get_item(USER_KEY).as_deref(),
            Some(r#"{"id":"1","username":"a","email":"a@x.com","role":"user"}"#)
        );
    }

    #[test]
    fn test_load_empty_store() {
        let (store, _, _) = memory_store();
        assert_eq!(store.load(), None);
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_token_without_user_is_not_returned() {
        let (store, durable, _) = memory_store();
        durable.set_items(&[(TOKEN_KEY, "T")]).unwrap();

        assert_eq!(store.load(), None);
        // The orphan token is dropped
        assert!(durable.is_empty());
    }

    #[test]
    fn test_unreadable_user_drops_session() {
        let (store, durable, _) = memory_store();
        durable
            .set_items(&[(TOKEN_KEY, "T"), (USER_KEY, "{not json")])
            .unwrap();

        assert_eq!(store.load(), None);
        assert_eq!(durable.get_item(TOKEN_KEY), None);
    }

    #[test]
    fn test_clear_removes_keys_and_purges_ephemeral() {
        let (store, durable, ephemeral) = memory_store();
        durable.set_items(&[("theme", "dark")]).unwrap();
        ephemeral.set_items(&[("draft", "x")]).unwrap();
        store.save("T", &user()).unwrap();

        store.clear();

        assert_eq!(store.load(), None);
        assert!(ephemeral.is_empty());
        // Unrelated durable keys survive
        assert_eq!(durable.get_item("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn test_non_interactive_store_is_inert() {
        let store = SessionStore::non_interactive();
        assert_eq!(store.environment(), Environment::NonInteractive);
        store.save("T", &user()).unwrap();
        assert_eq!(store.load(), None);
        store.clear();
    }

    #[test]
    fn test_for_environment_picks_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };

        let store = SessionStore::for_environment(Environment::Interactive, &config).unwrap();
        assert_eq!(store.environment(), Environment::Interactive);
        store.save("T", &user()).unwrap();
        assert!(dir.path().join(STORAGE_FILE).exists());

        let inert = SessionStore::for_environment(Environment::NonInteractive, &config).unwrap();
        assert_eq!(inert.environment(), Environment::NonInteractive);
        assert_eq!(inert.load(), None);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        SessionStore::on_disk(dir.path()).save("T", &user()).unwrap();

        let reopened = SessionStore::on_disk(dir.path());
        assert_eq!(reopened.token().as_deref(), Some("T"));

        reopened.clear();
        assert_eq!(SessionStore::on_disk(dir.path()).load(), None);
    }

    #[test]
    fn test_file_storage_corrupt_document_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        std::fs::write(storage.path(), "garbage").unwrap();

        assert_eq!(storage.get_item(TOKEN_KEY), None);
        storage.set_items(&[(TOKEN_KEY, "T")]).unwrap();
        assert_eq!(storage.get_item(TOKEN_KEY).as_deref(), Some("T"));
    }

    #[test]
    fn test_load_never_mixes_two_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::on_disk(dir.path());
        let mut other = user();
        other.id = "2".to_string();
        store.save("T1", &user()).unwrap();

        let writer = {
            let store = store.clone();
            let other = other.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    if i % 2 == 0 {
                        store.save("T2", &other).unwrap();
                    } else {
                        store.save("T1", &user()).unwrap();
                    }
                }
            })
        };

        for _ in 0..200 {
            let session = store.load().expect("a complete session is always stored");
            let expected = if session.token == "T1" { "1" } else { "2" };
            assert_eq!(session.user.id, expected);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_get_items_reads_in_key_order() {
        let storage = MemoryStorage::new();
        storage.set_items(&[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(
            storage.get_items(&["b", "missing", "a"]),
            vec![Some("2".to_string()), None, Some("1".to_string())]
        );
        assert_eq!(NoopStorage.get_items(&["a", "b"]), vec![None, None]);
    }

    #[test]
    fn test_file_storage_clear_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.set_items(&[("k", "v")]).unwrap();
        assert!(storage.path().exists());

        storage.clear().unwrap();
        assert!(!storage.path().exists());
        storage.clear().unwrap();
    }
}
