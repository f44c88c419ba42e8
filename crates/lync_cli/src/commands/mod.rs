//! CLI command implementations.

pub mod compact;
pub mod dump_queue;
pub mod inspect;

use lync_storage::FileStore;
use lync_sync_engine::EventLog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Where the terminal's data lives.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    /// Store directory.
    pub path: PathBuf,
    /// Storage key of the event queue.
    pub queue_key: String,
    /// Key prefix of the fetch cache.
    pub cache_namespace: String,
}

impl StoreLocation {
    /// Opens the store directory, which must already exist.
    pub fn open_store(&self) -> Result<Arc<FileStore>, Box<dyn std::error::Error>> {
        if !self.path.is_dir() {
            return Err(format!("No store found at {:?}", self.path).into());
        }
        debug!(path = ?self.path, "opening store");
        Ok(Arc::new(FileStore::open(&self.path)?))
    }

    /// Opens the event log.
    pub fn open_log(&self) -> Result<EventLog, Box<dyn std::error::Error>> {
        let store = self.open_store()?;
        Ok(EventLog::open(store, self.queue_key.clone())?)
    }
}
