//! # Lync Sync Engine
//!
//! Offline-first synchronization for Lync terminals.
//!
//! This crate provides:
//! - A durable, append-only [`EventLog`] of business events
//! - The [`SyncEngine`] that drains pending events to the core
//! - A [`ConnectionMonitor`] circuit breaker classifying the link
//! - The [`HybridFetcher`] read path (live, then cache, then default)
//! - The [`RemoteTransport`] abstraction with a correlation-based
//!   [`BridgeTransport`] and a scripted [`MockTransport`]
//! - A [`SyncWorker`] and the [`OfflineClient`] facade used by UI code
//!
//! ## Architecture
//!
//! Recording an event always succeeds locally: the event is appended to the
//! log and the whole log is persisted before the call returns. Delivery
//! happens later, when a sync is triggered explicitly, by the worker's
//! interval, or right after an event is recorded.
//!
//! ## Key Invariants
//!
//! - Events are delivered one at a time, in insertion order
//! - Every status change is persisted before the next delivery
//! - Terminal statuses (`SYNCED`, `FAILED`) never change
//! - Only one drain runs at a time
//! - Reads never fail: they degrade to cached data, then to a default

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod client;
mod config;
mod error;
mod event_log;
mod fetch;
mod monitor;
mod state;
mod transport;
mod worker;

pub use bridge::{
    BridgeChannel, BridgeMessage, BridgeReply, BridgeTransport, MpscChannel, COMMAND_PREFIX,
};
pub use client::{ClientStatus, OfflineClient, ACTIVE_TRIP_KEY};
pub use config::{RetryPolicy, SyncConfig, DEFAULT_CACHE_NAMESPACE, DEFAULT_QUEUE_KEY};
pub use error::{SyncError, SyncResult};
pub use event_log::{CompactPolicy, Durability, EventLog, LogStats};
pub use fetch::{FetchSource, HybridFetcher};
pub use monitor::{ConnectionMonitor, ListenerHandle};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use transport::{MockReply, MockTransport, RemoteTransport};
pub use worker::SyncWorker;
