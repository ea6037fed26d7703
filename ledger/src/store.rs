use punchcoin_types::UserTable;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[cfg(any(test, feature = "mocks"))]
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
#[cfg(any(test, feature = "mocks"))]
use std::sync::{Mutex, PoisonError};

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed state at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable backing for the user table.
///
/// The ledger holds state in memory and treats the store as a write-through
/// image: `save` receives the complete table after every committed mutation.
/// `load` must distinguish "nothing persisted yet" (an empty table) from a
/// real failure, which is propagated rather than swallowed.
pub trait Store {
    fn load(&self) -> impl Future<Output = Result<UserTable, StoreError>> + Send;
    fn save(&self, table: &UserTable) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// File-backed JSON store.
///
/// The persisted layout is one JSON object mapping user id to record, the
/// shape external tooling expects. Writes go to a sibling temp file first and
/// are renamed into place, so a crash mid-save never leaves a torn file.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Store for JsonStore {
    async fn load(&self) -> Result<UserTable, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            // First run: nothing persisted yet.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted state, starting empty");
                return Ok(UserTable::new());
            }
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, table: &UserTable) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(table).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        debug!(path = %self.path.display(), users = table.len(), "state saved");
        Ok(())
    }
}

/// In-memory store for tests, with save-fault injection.
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    table: Mutex<UserTable>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

#[cfg(any(test, feature = "mocks"))]
impl Memory {
    /// Start from an already-populated table.
    pub fn with_table(table: UserTable) -> Self {
        Self {
            table: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Copy of the persisted image.
    pub fn snapshot(&self) -> UserTable {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent save fail until cleared.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "mocks"))]
impl Store for Memory {
    async fn load(&self) -> Result<UserTable, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, table: &UserTable) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: io::Error::new(io::ErrorKind::Other, "injected save failure"),
            });
        }
        *self.table.lock().unwrap_or_else(PoisonError::into_inner) = table.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punchcoin_types::{Task, UserRecord};

    fn sample_table() -> UserTable {
        let mut record = UserRecord::new();
        record.coins = 42;
        record.referral_count = 2;
        record.completed_tasks.insert(Task::Telegram);
        let mut table = UserTable::new();
        table.insert("alice".to_string(), record);
        table
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("users.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("users.json"));
        let table = sample_table();
        store.save(&table).await.unwrap();
        assert_eq!(store.load().await.unwrap(), table);
        assert!(
            !dir.path().join("users.tmp").exists(),
            "temp file must be renamed away"
        );
    }

    #[tokio::test]
    async fn test_malformed_file_errors_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        tokio::fs::write(&path, b"not json{").await.unwrap();

        let store = JsonStore::new(path);
        assert!(matches!(
            store.load().await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_persisted_shape_matches_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = JsonStore::new(&path);
        store.save(&sample_table()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        let alice = &raw["alice"];
        assert_eq!(alice["coins"], 42);
        assert_eq!(alice["referrals"], 2);
        assert_eq!(alice["level"], 1);
        assert!(alice["badges"].as_array().unwrap().is_empty());
        assert_eq!(alice["tasks"][0], "Telegram");
    }

    #[tokio::test]
    async fn test_legacy_task_map_form_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let legacy = r#"{"alice": {"coins": 100000, "referrals": 0, "level": 1,
            "badges": [], "tasks": {"Instagram": true, "YouTube": false}}}"#;
        tokio::fs::write(&path, legacy).await.unwrap();

        let table = JsonStore::new(path).load().await.unwrap();
        assert!(table["alice"].has_completed(Task::Instagram));
        assert!(!table["alice"].has_completed(Task::YouTube));
    }

    #[tokio::test]
    async fn test_memory_fault_injection() {
        let store = Memory::default();
        store.save(&sample_table()).await.unwrap();
        assert_eq!(store.save_count(), 1);

        store.fail_saves(true);
        assert!(store.save(&UserTable::new()).await.is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot(), sample_table(), "failed save leaves image");

        store.fail_saves(false);
        store.save(&UserTable::new()).await.unwrap();
        assert!(store.snapshot().is_empty());
    }
}
