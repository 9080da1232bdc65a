use std::collections::HashMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::{DeployGuardError, Result};

/// Append-only log of records, keyed by pipeline id.
///
/// `append` must be durable before it returns. Callers serialize appends per
/// key through [`PipelineLocks`].
#[async_trait]
pub trait HistoryStore<T>: Send + Sync {
    async fn append(&self, key: &str, record: T) -> Result<()>;

    /// Returns records in append order; an unknown key yields an empty list.
    async fn list(&self, key: &str) -> Result<Vec<T>>;
}

/// Single mutable record per key.
#[async_trait]
pub trait RecordStore<T>: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<T>>;
    async fn put(&self, key: &str, record: T) -> Result<()>;
}

/// In-process store used by tests and by non-durable runs.
pub struct MemoryStore<T> {
    entries: RwLock<HashMap<String, Vec<T>>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<T> HistoryStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn append(&self, key: &str, record: T) -> Result<()> {
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.entries.read().await.get(key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl<T> RecordStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .and_then(|records| records.last().cloned()))
    }

    async fn put(&self, key: &str, record: T) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), vec![record]);
        Ok(())
    }
}

/// Durable store keeping one JSON file per key:
/// `{dir}/{percent-encoded pipeline id}.json`.
///
/// Every write goes to a temporary file which is fsynced and then renamed over
/// the previous file, so a crash never leaves a half-written log behind.
pub struct JsonFileStore<T> {
    dir: PathBuf,
    write_lock: Mutex<()>,
    _records: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Opens (and creates if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!("History store opened at: {}", dir.display());

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            _records: PhantomData,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }

    async fn read_records(&self, key: &str) -> Result<Vec<T>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                DeployGuardError::Store(format!("Corrupt history file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_records(&self, key: &str, records: &[T]) -> Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec(records)?;

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path).await?;
        sync_dir(&self.dir).await?;

        debug!("Saved {} records to: {}", records.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl<T> HistoryStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn append(&self, key: &str, record: T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records(key).await?;
        records.push(record);
        self.write_records(key, &records).await
    }

    async fn list(&self, key: &str) -> Result<Vec<T>> {
        self.read_records(key).await
    }
}

#[async_trait]
impl<T> RecordStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.read_records(key).await?.pop())
    }

    async fn put(&self, key: &str, record: T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_records(key, std::slice::from_ref(&record)).await
    }
}

/// Percent-encoded so distinct keys never share a file,
/// e.g. "team/checkout" -> "team%2Fcheckout.json", "team-checkout" -> "team-checkout.json".
fn file_name(key: &str) -> String {
    format!("{}.json", urlencoding::encode(key))
}

/// Persists the rename itself.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Platform data directory for durable state:
/// - Linux: `~/.local/share/deployguard`
/// - macOS: `~/Library/Application Support/deployguard`
///
/// # Errors
///
/// Returns an error if the platform exposes no data directory.
pub fn default_state_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("deployguard"))
        .ok_or_else(|| DeployGuardError::Store("No data directory found".into()))
}

/// Removes all persisted history below `state_dir`.
pub fn clear_state(state_dir: &Path) -> Result<()> {
    if state_dir.exists() {
        std::fs::remove_dir_all(state_dir)?;
        info!("State cleared: {}", state_dir.display());
    } else {
        info!("No state found at: {}", state_dir.display());
    }
    Ok(())
}

/// Single-writer discipline per pipeline id.
#[derive(Default)]
pub struct PipelineLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PipelineLocks {
    pub async fn acquire(&self, pipeline_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(pipeline_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
