// src/storage.rs
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use scylla::{query::Query, Session, SessionBuilder};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const WATCHLISTS_KEY: &str = "watchlists";
pub const THEME_KEY: &str = "theme";

/// Asynchronous string storage keyed by name. Values outlive the process.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// All keys in one JSON object on disk.
pub struct FileStorage {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value.to_string());

        // Write beside the target then rename so readers never see a torn file.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&all)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote key {} to {}", key, self.path.display());
        Ok(())
    }
}

pub struct ScyllaStorage {
    session: Session,
}

impl ScyllaStorage {
    pub async fn connect(node: &str) -> Result<Self, StorageError> {
        let session = SessionBuilder::new()
            .known_node(node)
            .build()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        session.query("CREATE KEYSPACE IF NOT EXISTS stock_watch WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        session.query("CREATE TABLE IF NOT EXISTS stock_watch.kv (key TEXT PRIMARY KEY, value TEXT, updated_at TIMESTAMP)", &[]).await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        info!("Successfully connected to ScyllaDB at {}.", node);
        Ok(Self { session })
    }
}

#[async_trait]
impl KeyValueStorage for ScyllaStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let query = Query::new("SELECT value FROM stock_watch.kv WHERE key = ?");
        let result = self
            .session
            .query(query, (key,))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let value = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|row| row.columns.into_iter().next().flatten())
            .and_then(|column| column.as_text().cloned());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let query =
            Query::new("INSERT INTO stock_watch.kv (key, value, updated_at) VALUES (?, ?, ?)");
        let updated_at = Utc::now().timestamp_millis();
        self.session
            .query(query, (key, value, updated_at))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Process-local storage. Reads and writes can be made to fail on demand.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage.insert(key, value);
        storage
    }

    pub fn insert(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|v| v.get(key).cloned())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("read refused".to_string()));
        }
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("write refused".to_string()));
        }
        self.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
