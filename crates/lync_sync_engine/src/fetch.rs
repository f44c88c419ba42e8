//! Live-then-cache-then-default read path.

use crate::monitor::ConnectionMonitor;
use crate::transport::RemoteTransport;
use lync_protocol::RemoteCommand;
use lync_storage::PersistedStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Answered by the core.
    Live,
    /// Last-known-good cached value.
    Cache,
    /// The caller's static default.
    Fallback,
}

/// Answers queries with graceful degradation.
///
/// Preference order is live data, then the last value cached for the query,
/// then the caller's fallback, so a caller always gets something usable.
/// Every remote outcome is reported to the [`ConnectionMonitor`].
pub struct HybridFetcher<T: ?Sized> {
    transport: Arc<T>,
    monitor: Arc<ConnectionMonitor>,
    cache: Arc<dyn PersistedStore>,
}

impl<T: RemoteTransport + ?Sized> HybridFetcher<T> {
    /// Creates a fetcher.
    pub fn new(
        transport: Arc<T>,
        monitor: Arc<ConnectionMonitor>,
        cache: Arc<dyn PersistedStore>,
    ) -> Self {
        Self {
            transport,
            monitor,
            cache,
        }
    }

    /// Runs `command`, degrading to the cache under `cache_key` and then to
    /// `fallback`.
    pub async fn fetch<V>(&self, command: &RemoteCommand, cache_key: Option<&str>, fallback: V) -> V
    where
        V: DeserializeOwned,
    {
        self.fetch_with_source(command, cache_key, fallback).await.0
    }

    /// Like [`HybridFetcher::fetch`], also reporting which tier answered.
    pub async fn fetch_with_source<V>(
        &self,
        command: &RemoteCommand,
        cache_key: Option<&str>,
        fallback: V,
    ) -> (V, FetchSource)
    where
        V: DeserializeOwned,
    {
        // With a cache to fall back on, don't wait out a timeout the breaker
        // already predicts.
        let fail_fast = cache_key.is_some() && self.monitor.is_disconnected();

        if fail_fast {
            debug!(command = command.name(), "breaker open, skipping remote call");
        } else {
            match self.fetch_live::<V>(command).await {
                Some((value, raw)) => {
                    self.monitor.record_success();
                    if let Some(key) = cache_key {
                        self.write_cache(key, &raw);
                    }
                    return (value, FetchSource::Live);
                }
                None => self.monitor.record_failure(),
            }
        }

        if let Some(value) = cache_key.and_then(|key| self.read_cache::<V>(key)) {
            return (value, FetchSource::Cache);
        }

        debug!(command = command.name(), "using fallback value");
        (fallback, FetchSource::Fallback)
    }

    async fn fetch_live<V: DeserializeOwned>(&self, command: &RemoteCommand) -> Option<(V, Value)> {
        let raw = match self.transport.call_data(command).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(command = command.name(), error = %e, "core fetch failed");
                return None;
            }
        };

        match serde_json::from_value(raw.clone()) {
            Ok(value) => Some((value, raw)),
            Err(e) => {
                warn!(command = command.name(), error = %e, "core returned malformed data");
                None
            }
        }
    }

    fn read_cache<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let bytes = match self.cache.get(key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "ignoring undecodable cache entry");
                None
            }
        }
    }

    fn write_cache(&self, key: &str, raw: &Value) {
        let result = serde_json::to_vec(raw)
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.cache.set(key, &bytes).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!(key, error = %e, "cache write failed");
        }
    }
}
