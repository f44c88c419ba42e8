//! Configuration for the sync engine.

use lync_protocol::RemoteCommand;
use std::time::Duration;

/// Storage key holding the serialized event queue.
pub const DEFAULT_QUEUE_KEY: &str = "lyncapp_event_queue";

/// Prefix applied to every fetch cache key.
pub const DEFAULT_CACHE_NAMESPACE: &str = "lync_db_";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address of the core.
    pub endpoint: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Consecutive failures before the link is considered disconnected.
    pub max_failures: u32,
    /// Retry policy for event delivery.
    pub retry: RetryPolicy,
    /// Interval of the background sync worker.
    pub sync_interval: Duration,
    /// Lightweight command used by manual connection probes.
    pub probe_command: RemoteCommand,
    /// Storage key of the event queue.
    pub queue_key: String,
    /// Prefix of fetch cache keys.
    pub cache_namespace: String,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(12),
            max_failures: 3,
            retry: RetryPolicy::default(),
            sync_interval: Duration::from_secs(5),
            probe_command: RemoteCommand::GetRoutes,
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the failure threshold of the circuit breaker.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the background sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the probe command.
    pub fn with_probe_command(mut self, command: RemoteCommand) -> Self {
        self.probe_command = command;
        self
    }

    /// Sets the event queue key.
    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = key.into();
        self
    }

    /// Sets the cache namespace.
    pub fn with_cache_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cache_namespace = namespace.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Retry policy for event delivery.
///
/// A failing event is resubmitted once per sync cycle, with no backoff
/// beyond the cycle interval, until its retry count exceeds `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts tolerated before the event is abandoned.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy tolerating `max_retries` failed attempts.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Creates a policy that abandons an event on its first failure.
    pub fn no_retry() -> Self {
        Self { max_retries: 0 }
    }

    /// Returns true once `retry_count` failed attempts exhaust the policy.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count > self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}
