//! Inspect command implementation.

use super::StoreLocation;
use lync_storage::{Namespaced, PersistedStore};
use lync_sync_engine::{EventLog, LogStats};
use serde::Serialize;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Storage key of the event queue.
    pub queue_key: String,
    /// Size of the serialized queue in bytes.
    pub queue_size: u64,
    /// Event counts by status.
    pub events: LogStats,
    /// Creation time of the oldest pending event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending: Option<String>,
    /// Highest retry count among pending events.
    pub max_retry_count: u32,
    /// Cached queries.
    pub cache_keys: Vec<String>,
}

/// Runs the inspect command.
pub fn run(location: &StoreLocation, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(location)?;

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects the inspection result.
pub fn inspect(location: &StoreLocation) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = location.open_store()?;
    let queue_size = store
        .get(&location.queue_key)?
        .map_or(0, |bytes| bytes.len() as u64);

    let log = EventLog::open(store.clone(), location.queue_key.clone())?;
    let pending = log.pending();

    let cache = Namespaced::new(store, location.cache_namespace.clone());

    Ok(InspectResult {
        path: location.path.display().to_string(),
        queue_key: location.queue_key.clone(),
        queue_size,
        events: log.stats(),
        oldest_pending: pending.first().map(|e| e.timestamp().to_rfc3339()),
        max_retry_count: pending.iter().map(|e| e.retry_count()).max().unwrap_or(0),
        cache_keys: cache.keys()?,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Lync Store Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Event queue ({}):", result.queue_key);
    println!("  Size:      {}", format_size(result.queue_size));
    println!("  Total:     {}", result.events.total);
    println!("  Pending:   {}", result.events.pending);
    println!("  Synced:    {}", result.events.synced);
    println!("  Failed:    {}", result.events.failed);
    if let Some(oldest) = &result.oldest_pending {
        println!("  Oldest pending: {oldest}");
        println!("  Max retries:    {}", result.max_retry_count);
    }
    println!();
    println!("Cache:");
    if result.cache_keys.is_empty() {
        println!("  (empty)");
    }
    for key in &result.cache_keys {
        println!("  {key}");
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lync_protocol::{EventPayload, TripEnd};
    use lync_storage::FileStore;
    use lync_sync_engine::{DEFAULT_CACHE_NAMESPACE, DEFAULT_QUEUE_KEY};
    use std::sync::Arc;

    fn location(path: &std::path::Path) -> StoreLocation {
        StoreLocation {
            path: path.to_path_buf(),
            queue_key: DEFAULT_QUEUE_KEY.into(),
            cache_namespace: DEFAULT_CACHE_NAMESPACE.into(),
        }
    }

    #[test]
    fn inspect_counts_events_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let log = EventLog::open(store.clone(), DEFAULT_QUEUE_KEY).unwrap();
        let synced = log.add_event(EventPayload::TripEnd(TripEnd::now("t1"))).unwrap();
        log.add_event(EventPayload::TripEnd(TripEnd::now("t2"))).unwrap();
        log.mark_synced(synced.id());
        store.set("lync_db_routes", b"[]").unwrap();

        let result = inspect(&location(dir.path())).unwrap();
        assert_eq!(result.events.total, 2);
        assert_eq!(result.events.pending, 1);
        assert_eq!(result.events.synced, 1);
        assert!(result.queue_size > 0);
        assert!(result.oldest_pending.is_some());
        assert_eq!(result.cache_keys, vec!["routes".to_string()]);
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(&location(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
