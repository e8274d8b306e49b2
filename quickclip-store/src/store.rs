use std::{collections::HashMap, future::Future, path::PathBuf};

use quickclip_core::{HistoryLog, decode_history, encode_history};
use tokio::{
    fs,
    sync::{RwLock, watch},
};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Defensive bound on the persisted document: image entries are data URIs,
/// so the file can grow well past what a text-only history would need, but a
/// corrupted or replaced file must never make a context read unbounded data.
pub const MAX_STORE_BYTES: u64 = 8 * 1024 * 1024;

/// The asynchronous key-value store shared by every context.
///
/// No transactions, no locks: `set` is a full-value replace and the last
/// writer wins. `subscribe` yields a receiver that observes the latest value
/// after any context's write.
pub trait PersistentStore: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<HistoryLog>, StoreError>> + Send;

    fn set(
        &self,
        key: &str,
        value: &HistoryLog,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn subscribe(&self) -> watch::Receiver<HistoryLog>;
}

/// In-process store modeling browser-local storage: serialized values in a
/// map, an optional byte quota on the serialized size, last writer wins.
#[derive(Debug)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    notify: watch::Sender<HistoryLog>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self::build(Some(quota_bytes))
    }

    fn build(quota_bytes: Option<usize>) -> Self {
        let (notify, _) = watch::channel(HistoryLog::new());
        Self {
            values: RwLock::new(HashMap::new()),
            quota_bytes,
            notify,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<HistoryLog>, StoreError> {
        let values = self.values.read().await;
        let Some(payload) = values.get(key) else {
            return Ok(None);
        };
        match decode_history(payload) {
            Ok(log) => Ok(Some(log)),
            Err(err) => {
                warn!(key, "stored value is unreadable, treating as absent: {err}");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &HistoryLog) -> Result<(), StoreError> {
        let payload = encode_history(value)?;
        if let Some(max) = self.quota_bytes
            && payload.len() > max
        {
            return Err(StoreError::QuotaExceeded {
                size: payload.len(),
                max,
            });
        }

        self.values.write().await.insert(key.to_owned(), payload);
        let _ = self.notify.send(value.clone());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<HistoryLog> {
        self.notify.subscribe()
    }
}

/// One JSON document on disk, written atomically (tmp + rename) so a torn
/// write never leaves a half-serialized history behind.
///
/// Loading is tolerant: a missing, oversized, or unparseable file reads as an
/// absent value with a warning, and the next successful write replaces it.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota_bytes: Option<usize>,
    notify: watch::Sender<HistoryLog>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(path.into(), None)
    }

    #[must_use]
    pub fn with_quota(path: impl Into<PathBuf>, quota_bytes: usize) -> Self {
        Self::build(path.into(), Some(quota_bytes))
    }

    fn build(path: PathBuf, quota_bytes: Option<usize>) -> Self {
        let (notify, _) = watch::channel(HistoryLog::new());
        Self {
            path,
            quota_bytes,
            notify,
        }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl PersistentStore for FileStore {
    async fn get(&self, _key: &str) -> Result<Option<HistoryLog>, StoreError> {
        let meta = match fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                warn!(path = %self.path.display(), "store metadata read failed: {err}");
                return Ok(None);
            }
        };

        if meta.len() > MAX_STORE_BYTES {
            warn!(
                path = %self.path.display(),
                size = meta.len(),
                max = MAX_STORE_BYTES,
                "store document too large, treating as absent"
            );
            return Ok(None);
        }

        let payload = match fs::read_to_string(&self.path).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(path = %self.path.display(), "store read failed: {err}");
                return Ok(None);
            }
        };

        match decode_history(&payload) {
            Ok(log) => Ok(Some(log)),
            Err(err) => {
                warn!(path = %self.path.display(), "store document unreadable, treating as absent: {err}");
                Ok(None)
            }
        }
    }

    async fn set(&self, _key: &str, value: &HistoryLog) -> Result<(), StoreError> {
        let payload = encode_history(value)?;
        if let Some(max) = self.quota_bytes
            && payload.len() > max
        {
            return Err(StoreError::QuotaExceeded {
                size: payload.len(),
                max,
            });
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload.as_bytes()).await?;

        if fs::try_exists(&self.path).await.unwrap_or(false) {
            let _ = fs::remove_file(&self.path).await;
        }
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), entries = value.len(), "store document written");
        let _ = self.notify.send(value.clone());
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<HistoryLog> {
        self.notify.subscribe()
    }
}
