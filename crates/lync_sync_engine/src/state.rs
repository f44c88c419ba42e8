//! Sync engine: drains the event log against the core.

use crate::config::RetryPolicy;
use crate::error::SyncError;
use crate::event_log::EventLog;
use crate::monitor::ConnectionMonitor;
use crate::transport::RemoteTransport;
use lync_protocol::{Event, EventStatus, RemoteCommand};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    #[default]
    Idle,
    /// Engine is delivering pending events.
    Draining,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Draining)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of drains that attempted at least one event.
    pub cycles_completed: u64,
    /// Total number of events delivered.
    pub events_synced: u64,
    /// Total number of events abandoned after exhausting their retries.
    pub events_abandoned: u64,
    /// Total number of failed delivery attempts.
    pub delivery_failures: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCycleResult {
    /// Events submitted to the core.
    pub attempted: usize,
    /// Events delivered.
    pub synced: usize,
    /// Events that failed and stay pending.
    pub retried: usize,
    /// Events that failed for the last time.
    pub abandoned: usize,
    /// Duration of the sync cycle.
    pub duration: Duration,
    /// True if another sync was already running and this call did nothing.
    pub skipped: bool,
}

impl SyncCycleResult {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Returns true if every attempted event was delivered.
    pub fn is_clean(&self) -> bool {
        !self.skipped && self.synced == self.attempted
    }
}

/// The sync engine delivers pending events to the core.
///
/// # Delivery model
///
/// Events are submitted one at a time, in insertion order. Each outcome is
/// persisted before the next event is attempted, so a crash mid-drain loses
/// no completed work. A failed event never stops the drain.
///
/// Only one drain runs at a time. A `sync` call made while another is in
/// flight returns immediately with [`SyncCycleResult::skipped`] set.
pub struct SyncEngine<T: ?Sized> {
    log: Arc<EventLog>,
    monitor: Arc<ConnectionMonitor>,
    transport: Arc<T>,
    retry: RetryPolicy,
    drain: tokio::sync::Mutex<()>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: RemoteTransport + ?Sized> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(
        log: Arc<EventLog>,
        monitor: Arc<ConnectionMonitor>,
        transport: Arc<T>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            log,
            monitor,
            transport,
            retry,
            drain: tokio::sync::Mutex::new(()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a drain is running.
    pub fn is_syncing(&self) -> bool {
        self.state().is_active()
    }

    /// Returns the event log being drained.
    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Returns the connection monitor updated by deliveries.
    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sets the state.
    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Attempts delivery of every event pending when the call starts.
    ///
    /// Events recorded while the drain runs wait for the next call. With
    /// nothing pending this changes no state.
    pub async fn sync(&self) -> SyncCycleResult {
        let Ok(_guard) = self.drain.try_lock() else {
            debug!("sync already in progress, skipping");
            return SyncCycleResult::skipped();
        };

        let pending = self.log.pending();
        if pending.is_empty() {
            return SyncCycleResult::default();
        }

        let start = Instant::now();
        self.set_state(SyncState::Draining);
        debug!(pending = pending.len(), "draining event log");

        let mut result = SyncCycleResult {
            attempted: pending.len(),
            ..SyncCycleResult::default()
        };
        let mut last_error = None;

        for event in pending {
            match self.deliver(&event).await {
                Ok(()) => {
                    self.log.mark_synced(event.id());
                    self.monitor.record_success();
                    result.synced += 1;
                }
                Err(message) => {
                    match self.log.record_failure(event.id(), &self.retry) {
                        Some(EventStatus::Failed) => {
                            warn!(
                                id = %event.id(),
                                kind = %event.kind(),
                                error = %message,
                                "event abandoned after exhausting retries"
                            );
                            result.abandoned += 1;
                        }
                        Some(_) => result.retried += 1,
                        None => debug!(id = %event.id(), "event left the log during sync"),
                    }
                    self.monitor.record_failure();
                    last_error = Some(message);
                }
            }
        }

        result.duration = start.elapsed();
        self.set_state(SyncState::Idle);

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.events_synced += result.synced as u64;
            stats.events_abandoned += result.abandoned as u64;
            stats.delivery_failures += (result.retried + result.abandoned) as u64;
            stats.last_sync_time = Some(Instant::now());
            if last_error.is_some() {
                stats.last_error = last_error;
            }
        }

        if result.synced > 0 || result.abandoned > 0 {
            info!(
                synced = result.synced,
                retried = result.retried,
                abandoned = result.abandoned,
                "sync cycle finished"
            );
        }

        result
    }

    async fn deliver(&self, event: &Event) -> Result<(), String> {
        let command = RemoteCommand::SyncEvent(event.clone());
        match self.transport.call_data(&command).await {
            Ok(ack) if is_acknowledged(&ack) => {
                debug!(id = %event.id(), kind = %event.kind(), "event delivered");
                Ok(())
            }
            Ok(ack) => {
                debug!(id = %event.id(), %ack, "core declined event");
                Err(SyncError::Rejected("Sync rejected".into()).to_string())
            }
            Err(e) => {
                debug!(
                    id = %event.id(),
                    retry_count = event.retry_count(),
                    error = %e,
                    "event delivery failed"
                );
                Err(e.to_string())
            }
        }
    }
}

/// A `syncEvent` reply only counts as delivered when its data is truthy.
///
/// `false`, zero and the empty string are refusals, not acknowledgements.
fn is_acknowledged(ack: &Value) -> bool {
    match ack {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

impl<T: ?Sized> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &*self.state.read())
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockTransport};
    use lync_protocol::{ConnectionState, EventPayload, Route, Ticket, Trip};
    use lync_storage::InMemoryStore;
    use serde_json::json;

    fn engine(transport: Arc<MockTransport>) -> SyncEngine<MockTransport> {
        let store = Arc::new(InMemoryStore::new());
        let log = Arc::new(EventLog::open(store, "queue").unwrap());
        SyncEngine::new(
            log,
            Arc::new(ConnectionMonitor::new(3)),
            transport,
            RetryPolicy::default(),
        )
    }

    fn trip(id: &str) -> EventPayload {
        EventPayload::TripStart(Trip::start(id, &Route::new("r1", "Town", 80), "KDA 001B"))
    }

    #[test]
    fn sync_state_checks() {
        assert!(!SyncState::Idle.is_active());
        assert!(SyncState::Draining.is_active());
    }

    #[tokio::test]
    async fn empty_sync_is_a_noop() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(transport.clone());

        let result = engine.sync().await;
        assert_eq!(result, SyncCycleResult::default());
        assert!(transport.calls().is_empty());
        assert_eq!(engine.stats().cycles_completed, 0);
        assert!(engine.stats().last_sync_time.is_none());
    }

    #[tokio::test]
    async fn successful_sync_marks_events() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response("syncEvent", MockReply::Success(json!({"accepted": true})));
        let engine = engine(transport.clone());

        let event = engine.log().add_event(trip("t1")).unwrap();
        let result = engine.sync().await;

        assert_eq!(result.attempted, 1);
        assert_eq!(result.synced, 1);
        assert!(result.is_clean());
        assert_eq!(engine.log().get(event.id()).unwrap().status(), EventStatus::Synced);
        assert_eq!(engine.log().pending_count(), 0);
        assert_eq!(engine.state(), SyncState::Idle);

        let calls = transport.calls();
        let (command, payload) = &calls[0];
        assert_eq!(command, "syncEvent");
        assert_eq!(payload["type"], "TRIP_START");
    }

    #[tokio::test]
    async fn failure_does_not_abort_drain() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response("syncEvent", MockReply::Reject("Sync rejected".into()));
        transport.set_response("syncEvent", MockReply::Success(json!(true)));
        let engine = engine(transport.clone());

        let first = engine.log().add_event(trip("t1")).unwrap();
        let second = engine
            .log()
            .add_event(EventPayload::TicketIssue(Ticket::cash("k1", "t1", 50)))
            .unwrap();

        let result = engine.sync().await;
        assert_eq!(result.retried, 1);
        assert_eq!(result.synced, 1);

        let first = engine.log().get(first.id()).unwrap();
        assert_eq!(first.status(), EventStatus::Pending);
        assert_eq!(first.retry_count(), 1);
        assert_eq!(engine.log().get(second.id()).unwrap().status(), EventStatus::Synced);

        // The later success closed the breaker again.
        assert_eq!(engine.monitor().state(), ConnectionState::Connected);
        assert_eq!(engine.stats().last_error.as_deref(), Some("core rejected request: Sync rejected"));
    }

    #[tokio::test]
    async fn events_are_submitted_in_order() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response("syncEvent", MockReply::Success(json!(true)));
        let engine = engine(transport.clone());

        let ids: Vec<_> = (0..5)
            .map(|i| engine.log().add_event(trip(&format!("t{i}"))).unwrap().id())
            .collect();
        engine.sync().await;

        let submitted: Vec<String> = transport
            .calls()
            .iter()
            .map(|(_, payload)| payload["id"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(submitted, expected);
    }

    #[tokio::test]
    async fn empty_reply_counts_as_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response("syncEvent", MockReply::Success(serde_json::Value::Null));
        let engine = engine(transport);

        engine.log().add_event(trip("t1")).unwrap();
        let result = engine.sync().await;
        assert_eq!(result.retried, 1);
        assert_eq!(engine.monitor().failure_count(), 1);
    }

    #[tokio::test]
    async fn falsy_ack_keeps_event_pending() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response("syncEvent", MockReply::Success(json!(false)));
        transport.push_response("syncEvent", MockReply::Success(json!(0)));
        transport.push_response("syncEvent", MockReply::Success(json!("")));
        transport.set_response("syncEvent", MockReply::Success(json!({})));
        let engine = engine(transport);

        let event = engine.log().add_event(trip("t1")).unwrap();
        for attempt in 1..=3 {
            let result = engine.sync().await;
            assert_eq!(result.retried, 1);
            assert_eq!(result.synced, 0);
            let stored = engine.log().get(event.id()).unwrap();
            assert_eq!(stored.status(), EventStatus::Pending);
            assert_eq!(stored.retry_count(), attempt);
        }
        assert_eq!(engine.stats().last_error.as_deref(), Some("core rejected request: Sync rejected"));

        // Any other payload, even an empty object, acknowledges delivery.
        assert_eq!(engine.sync().await.synced, 1);
        assert_eq!(engine.log().get(event.id()).unwrap().status(), EventStatus::Synced);
    }

    #[test]
    fn acknowledgement_truthiness() {
        assert!(is_acknowledged(&json!(true)));
        assert!(is_acknowledged(&json!(1)));
        assert!(is_acknowledged(&json!("ok")));
        assert!(is_acknowledged(&json!([])));
        assert!(!is_acknowledged(&json!(null)));
        assert!(!is_acknowledged(&json!(false)));
        assert!(!is_acknowledged(&json!(0.0)));
        assert!(!is_acknowledged(&json!("")));
    }

    #[tokio::test]
    async fn retry_limit_abandons_event() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let engine = engine(transport);

        let event = engine.log().add_event(trip("t1")).unwrap();
        for _ in 0..10 {
            let result = engine.sync().await;
            assert_eq!(result.retried, 1);
        }
        let result = engine.sync().await;
        assert_eq!(result.abandoned, 1);

        let event = engine.log().get(event.id()).unwrap();
        assert_eq!(event.status(), EventStatus::Failed);
        assert_eq!(event.retry_count(), 11);
        assert!(engine.log().pending().is_empty());
        assert_eq!(engine.stats().events_abandoned, 1);
        assert_eq!(engine.stats().delivery_failures, 11);

        // Nothing left to do.
        assert_eq!(engine.sync().await.attempted, 0);
    }

    #[tokio::test]
    async fn concurrent_sync_is_skipped() {
        let transport = Arc::new(MockTransport::new());
        transport.set_response("syncEvent", MockReply::Success(json!(true)));
        let engine = engine(transport.clone());
        engine.log().add_event(trip("t1")).unwrap();

        let guard = engine.drain.try_lock().unwrap();
        let result = engine.sync().await;
        assert!(result.skipped);
        assert!(!result.is_clean());
        drop(guard);

        assert_eq!(engine.sync().await.synced, 1);
        assert_eq!(transport.call_count("syncEvent"), 1);
    }
}
