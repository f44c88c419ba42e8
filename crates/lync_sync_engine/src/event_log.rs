//! Durable, append-only queue of domain events.

use crate::config::RetryPolicy;
use crate::error::SyncResult;
use lync_protocol::{Event, EventPayload, EventStatus};
use lync_storage::PersistedStore;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Whether the log's latest state reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Durability {
    /// The last write succeeded.
    #[default]
    Durable,
    /// Writes are failing. The in-memory log is ahead of the store.
    Degraded {
        /// Consecutive failed writes.
        failed_writes: u64,
        /// Error of the latest failed write.
        last_error: String,
    },
}

impl Durability {
    /// Returns true if the latest state is persisted.
    pub fn is_durable(&self) -> bool {
        matches!(self, Durability::Durable)
    }
}

/// Which terminal events a compaction removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompactPolicy {
    /// Remove delivered events only.
    #[default]
    SyncedOnly,
    /// Remove delivered and abandoned events.
    AllTerminal,
}

impl CompactPolicy {
    fn removes(&self, status: EventStatus) -> bool {
        match self {
            CompactPolicy::SyncedOnly => status == EventStatus::Synced,
            CompactPolicy::AllTerminal => status.is_terminal(),
        }
    }
}

/// Event counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    /// All events in the log.
    pub total: usize,
    /// Events awaiting delivery.
    pub pending: usize,
    /// Delivered events.
    pub synced: usize,
    /// Abandoned events.
    pub failed: usize,
}

struct LogState {
    events: Vec<Event>,
    durability: Durability,
}

/// The durable event log.
///
/// Events are kept in insertion order and the whole log is written to the
/// store as one document under a single key after every mutation. Writes
/// happen under the log's lock, so they are serialized and never torn by a
/// concurrent append.
///
/// A failing store never fails an append: the event stays in memory and the
/// log reports [`Durability::Degraded`] until a later write succeeds.
pub struct EventLog {
    store: Arc<dyn PersistedStore>,
    key: String,
    state: Mutex<LogState>,
}

impl EventLog {
    /// Opens the log stored under `key`, restoring any persisted events.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read or the document does not decode.
    pub fn open(store: Arc<dyn PersistedStore>, key: impl Into<String>) -> SyncResult<Self> {
        let key = key.into();
        let events = match store.get(&key)? {
            Some(bytes) => Self::decode(&bytes)?,
            None => Vec::new(),
        };

        let pending = events.iter().filter(|e| e.is_pending()).count();
        info!(key = %key, events = events.len(), pending, "event log opened");

        Ok(Self {
            store,
            key,
            state: Mutex::new(LogState {
                events,
                durability: Durability::Durable,
            }),
        })
    }

    /// Decodes a serialized log document.
    pub fn decode(bytes: &[u8]) -> SyncResult<Vec<Event>> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Returns the storage key of the log.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Records a new pending event and persists the log.
    ///
    /// # Errors
    ///
    /// Only a malformed payload is an error. Store failures are reported
    /// through [`EventLog::durability`].
    pub fn add_event(&self, payload: EventPayload) -> SyncResult<Event> {
        let event = Event::new(payload)?;

        let mut state = self.state.lock();
        state.events.push(event.clone());
        self.persist(&mut state);

        debug!(id = %event.id(), kind = %event.kind(), "event recorded");
        Ok(event)
    }

    /// Returns pending events in insertion order.
    pub fn pending(&self) -> Vec<Event> {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.is_pending())
            .cloned()
            .collect()
    }

    /// Returns the number of pending events.
    pub fn pending_count(&self) -> usize {
        self.state.lock().events.iter().filter(|e| e.is_pending()).count()
    }

    /// Returns an event by ID.
    pub fn get(&self, id: Uuid) -> Option<Event> {
        self.state.lock().events.iter().find(|e| e.id() == id).cloned()
    }

    /// Returns every event in insertion order.
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    /// Returns the number of events.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Returns true if the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Returns event counts by status.
    pub fn stats(&self) -> LogStats {
        let state = self.state.lock();
        let mut stats = LogStats {
            total: state.events.len(),
            ..LogStats::default()
        };
        for event in &state.events {
            match event.status() {
                EventStatus::Pending => stats.pending += 1,
                EventStatus::Synced => stats.synced += 1,
                EventStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Returns the durability of the latest state.
    pub fn durability(&self) -> Durability {
        self.state.lock().durability.clone()
    }

    /// Marks an event delivered.
    ///
    /// Returns false if the event is unknown or already terminal.
    pub fn mark_synced(&self, id: Uuid) -> bool {
        self.update(id, Event::mark_synced)
    }

    /// Abandons an event.
    ///
    /// Returns false if the event is unknown or already terminal.
    pub fn mark_failed(&self, id: Uuid) -> bool {
        self.update(id, Event::mark_failed)
    }

    /// Counts a failed delivery attempt against `policy`.
    ///
    /// Returns the resulting status, or `None` for an unknown event.
    pub fn record_failure(&self, id: Uuid, policy: &RetryPolicy) -> Option<EventStatus> {
        let mut state = self.state.lock();
        let event = state.events.iter_mut().find(|e| e.id() == id)?;
        if event.status().is_terminal() {
            return Some(event.status());
        }

        let status = event.record_failure(policy.max_retries);
        self.persist(&mut state);
        Some(status)
    }

    /// Returns how many events `compact` would remove.
    pub fn compactable(&self, policy: CompactPolicy) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| policy.removes(e.status()))
            .count()
    }

    /// Removes terminal events selected by `policy` and persists the log.
    ///
    /// Pending events are never removed. Returns the number removed.
    pub fn compact(&self, policy: CompactPolicy) -> usize {
        let mut state = self.state.lock();
        let before = state.events.len();
        state.events.retain(|e| !policy.removes(e.status()));
        let removed = before - state.events.len();

        if removed > 0 {
            self.persist(&mut state);
            info!(removed, remaining = state.events.len(), "event log compacted");
        }
        removed
    }

    /// Serializes the log as stored.
    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.state.lock().events)?)
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Event) -> bool) -> bool {
        let mut state = self.state.lock();
        let Some(event) = state.events.iter_mut().find(|e| e.id() == id) else {
            return false;
        };
        if !apply(event) {
            return false;
        }
        self.persist(&mut state);
        true
    }

    fn persist(&self, state: &mut LogState) {
        let result = serde_json::to_vec(&state.events)
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.store.set(&self.key, &bytes).map_err(|e| e.to_string()));

        match result {
            Ok(()) => {
                if !state.durability.is_durable() {
                    info!(key = %self.key, "event log durable again");
                    state.durability = Durability::Durable;
                }
            }
            Err(e) => {
                let failed_writes = match &state.durability {
                    Durability::Durable => 1,
                    Durability::Degraded { failed_writes, .. } => failed_writes + 1,
                };
                if failed_writes == 1 {
                    error!(key = %self.key, error = %e, "event log write failed");
                } else {
                    warn!(key = %self.key, error = %e, failed_writes, "event log still not durable");
                }
                state.durability = Durability::Degraded {
                    failed_writes,
                    last_error: e,
                };
            }
        }
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("key", &self.key)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use lync_protocol::{Route, Ticket, Trip, TripEnd};
    use lync_storage::InMemoryStore;

    const KEY: &str = "lyncapp_event_queue";

    fn trip_start(id: &str) -> EventPayload {
        EventPayload::TripStart(Trip::start(id, &Route::new("r1", "Town - Airport", 100), "KBX 123A"))
    }

    fn open_log() -> (Arc<InMemoryStore>, EventLog) {
        let store = Arc::new(InMemoryStore::new());
        let log = EventLog::open(store.clone(), KEY).unwrap();
        (store, log)
    }

    #[test]
    fn empty_store_opens_empty_log() {
        let (_store, log) = open_log();
        assert!(log.is_empty());
        assert_eq!(log.pending_count(), 0);
        assert!(log.durability().is_durable());
    }

    #[test]
    fn add_event_persists_before_returning() {
        let (store, log) = open_log();
        let event = log.add_event(trip_start("t1")).unwrap();

        assert_eq!(event.status(), EventStatus::Pending);
        assert_eq!(event.retry_count(), 0);

        let persisted = EventLog::decode(&store.get(KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted, vec![event]);
    }

    #[test]
    fn pending_keeps_insertion_order() {
        let (_store, log) = open_log();
        let first = log.add_event(trip_start("t1")).unwrap();
        let second = log
            .add_event(EventPayload::TicketIssue(Ticket::cash("k1", "t1", 100)))
            .unwrap();
        let third = log.add_event(EventPayload::TripEnd(TripEnd::now("t1"))).unwrap();

        let ids: Vec<_> = log.pending().iter().map(Event::id).collect();
        assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let (store, log) = open_log();
        let result = log.add_event(EventPayload::TicketIssue(Ticket::cash("k1", "t1", 0)));

        assert!(matches!(result, Err(SyncError::InvalidEvent(_))));
        assert!(log.is_empty());
        assert!(store.get(KEY).unwrap().is_none());
    }

    #[test]
    fn status_updates_are_terminal() {
        let (_store, log) = open_log();
        let event = log.add_event(trip_start("t1")).unwrap();

        assert!(log.mark_synced(event.id()));
        assert!(!log.mark_failed(event.id()));
        assert!(!log.mark_synced(event.id()));
        assert_eq!(log.get(event.id()).unwrap().status(), EventStatus::Synced);
        assert!(!log.mark_synced(Uuid::new_v4()));
    }

    #[test]
    fn record_failure_abandons_after_limit() {
        let (_store, log) = open_log();
        let event = log.add_event(trip_start("t1")).unwrap();
        let policy = RetryPolicy::new(2);

        assert_eq!(log.record_failure(event.id(), &policy), Some(EventStatus::Pending));
        assert_eq!(log.record_failure(event.id(), &policy), Some(EventStatus::Pending));
        assert_eq!(log.record_failure(event.id(), &policy), Some(EventStatus::Failed));
        assert_eq!(log.get(event.id()).unwrap().retry_count(), 3);

        // Terminal events are not counted further.
        assert_eq!(log.record_failure(event.id(), &policy), Some(EventStatus::Failed));
        assert_eq!(log.get(event.id()).unwrap().retry_count(), 3);
        assert_eq!(log.pending_count(), 0);

        assert_eq!(log.record_failure(Uuid::new_v4(), &policy), None);
    }

    #[test]
    fn reopen_restores_state() {
        let (store, log) = open_log();
        let synced = log.add_event(trip_start("t1")).unwrap();
        let pending = log.add_event(trip_start("t2")).unwrap();
        log.mark_synced(synced.id());
        log.record_failure(pending.id(), &RetryPolicy::default());
        drop(log);

        let reopened = EventLog::open(store, KEY).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get(synced.id()).unwrap().status(), EventStatus::Synced);
        assert_eq!(reopened.get(pending.id()).unwrap().retry_count(), 1);
        assert_eq!(reopened.pending_count(), 1);
    }

    #[test]
    fn corrupted_document_fails_open() {
        let store = Arc::new(InMemoryStore::with_entries([(KEY, b"not json".to_vec())]));
        let result = EventLog::open(store, KEY);
        assert!(matches!(result, Err(SyncError::Codec(_))));
    }

    #[test]
    fn failing_store_degrades_durability() {
        let (store, log) = open_log();
        store.set_read_only(true);

        let event = log.add_event(trip_start("t1")).unwrap();
        log.add_event(trip_start("t2")).unwrap();

        assert_eq!(log.pending_count(), 2);
        match log.durability() {
            Durability::Degraded { failed_writes, .. } => assert_eq!(failed_writes, 2),
            Durability::Durable => panic!("expected degraded durability"),
        }

        store.set_read_only(false);
        log.mark_synced(event.id());
        assert!(log.durability().is_durable());
        assert_eq!(EventLog::decode(&store.get(KEY).unwrap().unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn compact_policies() {
        let (store, log) = open_log();
        let synced = log.add_event(trip_start("t1")).unwrap();
        let failed = log.add_event(trip_start("t2")).unwrap();
        let pending = log.add_event(trip_start("t3")).unwrap();
        log.mark_synced(synced.id());
        log.mark_failed(failed.id());

        assert_eq!(log.compactable(CompactPolicy::SyncedOnly), 1);
        assert_eq!(log.compactable(CompactPolicy::AllTerminal), 2);

        assert_eq!(log.compact(CompactPolicy::SyncedOnly), 1);
        assert!(log.get(failed.id()).is_some());
        assert_eq!(log.compact(CompactPolicy::AllTerminal), 1);
        assert_eq!(log.compact(CompactPolicy::AllTerminal), 0);

        let persisted = EventLog::decode(&store.get(KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id(), pending.id());
    }

    #[test]
    fn stats_count_by_status() {
        let (_store, log) = open_log();
        let a = log.add_event(trip_start("t1")).unwrap();
        let b = log.add_event(trip_start("t2")).unwrap();
        log.add_event(trip_start("t3")).unwrap();
        log.mark_synced(a.id());
        log.mark_failed(b.id());

        assert_eq!(
            log.stats(),
            LogStats {
                total: 3,
                pending: 1,
                synced: 1,
                failed: 1
            }
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pending_count_matches_appends(ids in prop::collection::vec("[a-z0-9]{1,8}", 0..24)) {
                let (_store, log) = open_log();
                for id in &ids {
                    log.add_event(trip_start(id)).unwrap();
                }
                prop_assert_eq!(log.pending().len(), ids.len());
                prop_assert_eq!(log.pending_count(), ids.len());
            }

            #[test]
            fn serialization_preserves_order_and_status(
                outcomes in prop::collection::vec(0u8..3, 0..16),
            ) {
                let (store, log) = open_log();
                for (i, outcome) in outcomes.iter().enumerate() {
                    let event = log.add_event(trip_start(&format!("t{i}"))).unwrap();
                    match outcome {
                        1 => { log.mark_synced(event.id()); }
                        2 => { log.mark_failed(event.id()); }
                        _ => {}
                    }
                }

                let restored = EventLog::decode(&log.to_bytes().unwrap()).unwrap();
                prop_assert_eq!(&restored, &log.events());

                let reopened = EventLog::open(store, KEY).unwrap();
                prop_assert_eq!(reopened.events(), log.events());
            }
        }
    }
}
