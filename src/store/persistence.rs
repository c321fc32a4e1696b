//! Persistence collaborators for the subscription store
//!
//! A [`Persistence`] owns the raw mapping and runs each read-modify-write
//! block under its lock, so every store operation is atomic with respect to
//! other writers (including other processes sharing the same file).

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Stored value per key, `{"topics": [...]}` on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicRecord {
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Raw mapping from key string to record
pub type StoreData = BTreeMap<String, TopicRecord>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store contents are not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Timed out after {0:?} waiting for the store lock")]
    LockTimeout(Duration),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Atomic load/modify/save over the whole mapping
pub trait Persistence: Send + Sync {
    /// Run `f` against the current mapping while holding the lock and
    /// persist whatever it leaves behind.
    fn transact<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> PersistenceResult<R>;
}

/// In-process persistence, used by tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    data: Mutex<StoreData>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: StoreData) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

impl Persistence for MemoryPersistence {
    fn transact<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> PersistenceResult<R> {
        let mut guard = self.data.lock().map_err(|_| PersistenceError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

/// JSON file guarded by an exclusive advisory lock on `<path>.lock`
///
/// Lock acquisition polls on the calling thread and gives up after
/// `lock_timeout`, so one operation blocks for at most that long plus the
/// file read and write.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_name),
            path,
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
        let path = path.to_path_buf();
        move |source| PersistenceError::Io { path, source }
    }

    fn acquire_lock(&self) -> PersistenceResult<File> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(self.io_error(&self.lock_path))?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(_) if Instant::now() < deadline => std::thread::sleep(LOCK_POLL_INTERVAL),
                Err(_) => return Err(PersistenceError::LockTimeout(self.lock_timeout)),
            }
        }
    }

    fn load(&self) -> PersistenceResult<StoreData> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(StoreData::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::new()),
            Err(e) => Err(self.io_error(&self.path)(e)),
        }
    }

    /// Write next to the target and rename over it so readers never see a
    /// half-written file.
    fn save(&self, data: &StoreData) -> PersistenceResult<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let content = serde_json::to_vec_pretty(data)?;
        let mut file = File::create(&tmp_path).map_err(self.io_error(&tmp_path))?;
        file.write_all(&content).map_err(self.io_error(&tmp_path))?;
        file.sync_all().map_err(self.io_error(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(self.io_error(&self.path))?;
        Ok(())
    }
}

impl Persistence for JsonFilePersistence {
    fn transact<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> PersistenceResult<R> {
        let lock_file = self.acquire_lock()?;
        let mut data = self.load()?;
        let before = data.clone();
        let result = f(&mut data);
        if data != before {
            self.save(&data)?;
            debug!(path = %self.path.display(), "Store saved");
        }
        // Unlock errors only mean the lock is already gone
        let _ = FileExt::unlock(&lock_file);
        Ok(result)
    }
}
