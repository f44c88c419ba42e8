//! Collaborator-facing facade over the engine's services.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::event_log::{CompactPolicy, Durability, EventLog};
use crate::fetch::HybridFetcher;
use crate::monitor::{ConnectionMonitor, ListenerHandle};
use crate::state::{SyncCycleResult, SyncEngine};
use crate::transport::RemoteTransport;
use crate::worker::SyncWorker;
use lync_protocol::{
    ConnectionState, DeviceConfig, DeviceRegistration, Event, EventPayload, RemoteCommand, Route,
    Seat, TerminalContext, Ticket, Trip, TripEnd,
};
use lync_storage::{Namespaced, PersistedStore};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{info, warn};
use uuid::Uuid;

/// Cache key of the trip currently running on this terminal.
pub const ACTIVE_TRIP_KEY: &str = "active_trip";

/// Snapshot of what the client exposes to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// Events awaiting delivery.
    pub pending_count: usize,
    /// Whether a drain is running.
    pub is_syncing: bool,
    /// Health of the link to the core.
    pub connection_state: ConnectionState,
    /// Whether the event log's latest state is persisted.
    pub durability: Durability,
}

/// Entry point for UI code.
///
/// Owns one instance of each service, wired together over a single
/// persisted store: the event log lives under the configured queue key and
/// fetch results are cached under the configured namespace.
///
/// ```ignore
/// let transport = Arc::new(BridgeTransport::from_config(&config, channel));
/// let client = OfflineClient::new(config, transport, store)?;
/// client.add_event(EventPayload::TripEnd(TripEnd::now("t1")))?;
/// let routes = client.fetch_routes().await;
/// ```
pub struct OfflineClient<T: ?Sized> {
    config: SyncConfig,
    transport: Arc<T>,
    log: Arc<EventLog>,
    monitor: Arc<ConnectionMonitor>,
    engine: Arc<SyncEngine<T>>,
    fetcher: HybridFetcher<T>,
    cache: Arc<dyn PersistedStore>,
    wake: Arc<Notify>,
}

impl<T: RemoteTransport + ?Sized> OfflineClient<T> {
    /// Opens the client over `store`.
    ///
    /// # Errors
    ///
    /// Fails if the persisted event log cannot be read or decoded.
    pub fn new(config: SyncConfig, transport: Arc<T>, store: Arc<dyn PersistedStore>) -> SyncResult<Self> {
        let log = Arc::new(EventLog::open(Arc::clone(&store), config.queue_key.clone())?);
        let cache: Arc<dyn PersistedStore> =
            Arc::new(Namespaced::new(store, config.cache_namespace.clone()));
        let monitor = Arc::new(ConnectionMonitor::new(config.max_failures));

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&log),
            Arc::clone(&monitor),
            Arc::clone(&transport),
            config.retry,
        ));
        let fetcher = HybridFetcher::new(
            Arc::clone(&transport),
            Arc::clone(&monitor),
            Arc::clone(&cache),
        );

        info!(endpoint = %config.endpoint, pending = log.pending_count(), "offline client ready");

        Ok(Self {
            config,
            transport,
            log,
            monitor,
            engine,
            fetcher,
            cache,
            wake: Arc::new(Notify::new()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the event log.
    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Returns the connection monitor.
    pub fn monitor(&self) -> &Arc<ConnectionMonitor> {
        &self.monitor
    }

    /// Returns the sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }

    // Event recording

    /// Records a business fact and requests a sync.
    ///
    /// # Errors
    ///
    /// Only a malformed payload is an error.
    pub fn add_event(&self, payload: EventPayload) -> SyncResult<Event> {
        let event = self.log.add_event(payload)?;
        self.wake.notify_one();
        Ok(event)
    }

    /// Returns the number of events awaiting delivery.
    pub fn pending_count(&self) -> usize {
        self.log.pending_count()
    }

    /// Drains the log now.
    pub async fn trigger_sync(&self) -> SyncCycleResult {
        self.engine.sync().await
    }

    /// Compacts the event log.
    pub fn compact(&self, policy: CompactPolicy) -> usize {
        self.log.compact(policy)
    }

    // Connectivity

    /// Returns the health of the link to the core.
    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Registers a listener for connection state changes.
    pub fn on_connection_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.monitor.on_change(listener)
    }

    /// Returns a channel view of the connection state.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.monitor.watch()
    }

    /// Probes the core. Returns true if it answered.
    pub async fn retry_connection(&self) -> bool {
        self.monitor
            .probe(&*self.transport, &self.config.probe_command)
            .await
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            pending_count: self.log.pending_count(),
            is_syncing: self.engine.is_syncing(),
            connection_state: self.monitor.state(),
            durability: self.log.durability(),
        }
    }

    // Reads

    /// Runs a query with live, cached and default tiers.
    pub async fn fetch<V>(&self, command: &RemoteCommand, cache_key: Option<&str>, fallback: V) -> V
    where
        V: DeserializeOwned,
    {
        self.fetcher.fetch(command, cache_key, fallback).await
    }

    /// Lists routes. Offline with an empty cache, two offline routes are
    /// offered.
    pub async fn fetch_routes(&self) -> Vec<Route> {
        let command = RemoteCommand::GetRoutes;
        let key = command.default_cache_key();
        self.fetch(&command, key.as_deref(), offline_routes()).await
    }

    /// Fetches the operator's terminal context.
    pub async fn fetch_terminal_context(&self, operator_id: &str) -> TerminalContext {
        let command = RemoteCommand::GetTerminalContext {
            operator_id: operator_id.to_string(),
        };
        let key = command.default_cache_key();
        self.fetch(&command, key.as_deref(), TerminalContext::default()).await
    }

    /// Fetches a vehicle's seat plan.
    pub async fn fetch_vehicle_seats(&self, vehicle_id: &str) -> Vec<Seat> {
        let command = RemoteCommand::GetVehicleSeats {
            vehicle_id: vehicle_id.to_string(),
        };
        let key = command.default_cache_key();
        self.fetch(&command, key.as_deref(), Vec::new()).await
    }

    /// Reports a ticket live. Never cached; returns true if the core took it.
    pub async fn report_ticket(&self, ticket: &Ticket) -> bool {
        let command = RemoteCommand::IssueTicket {
            trip_id: ticket.trip_id.clone(),
            phone: ticket.passenger_phone.clone().unwrap_or_default(),
            amount: ticket.amount,
        };
        self.fetch::<Option<Value>>(&command, None, None).await.is_some()
    }

    /// Registers this device with the core.
    ///
    /// # Errors
    ///
    /// Transport failures and rejections are returned as-is.
    pub async fn register_device(&self, config: &DeviceConfig) -> SyncResult<DeviceRegistration> {
        let command = RemoteCommand::RegisterDevice(config.clone());
        match self.transport.call_data(&command).await {
            Ok(data) => {
                self.monitor.record_success();
                Ok(serde_json::from_value(data)?)
            }
            Err(e) => {
                self.monitor.record_failure();
                Err(e)
            }
        }
    }

    // Trip workflow

    /// Returns the trip running on this terminal, if any.
    pub fn active_trip(&self) -> Option<Trip> {
        let bytes = match self.cache.get(ACTIVE_TRIP_KEY) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, "failed to read active trip");
                return None;
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| warn!(error = %e, "ignoring undecodable active trip"))
            .ok()
    }

    /// Starts a trip on `route` and records it.
    ///
    /// # Errors
    ///
    /// Fails if the trip is malformed (e.g. a route with an empty ID).
    pub fn start_trip(&self, route: &Route, vehicle_reg: &str) -> SyncResult<Trip> {
        let trip = Trip::start(Uuid::new_v4().to_string(), route, vehicle_reg);
        self.add_event(EventPayload::TripStart(trip.clone()))?;
        self.save_active_trip(Some(&trip));
        Ok(trip)
    }

    /// Ends the active trip, if any, and records it.
    ///
    /// # Errors
    ///
    /// Fails only if the trip end cannot be recorded.
    pub fn end_trip(&self) -> SyncResult<Option<TripEnd>> {
        let Some(trip) = self.active_trip() else {
            return Ok(None);
        };
        let end = TripEnd::now(trip.id);
        self.add_event(EventPayload::TripEnd(end.clone()))?;
        self.save_active_trip(None);
        Ok(Some(end))
    }

    /// Issues a cash ticket on `trip_id`.
    ///
    /// With a valid passenger phone the ticket is also reported live. It is
    /// always recorded in the event log, whether or not the report reached
    /// the core.
    ///
    /// # Errors
    ///
    /// Fails if the ticket is malformed (e.g. a zero amount).
    pub async fn issue_ticket(
        &self,
        trip_id: &str,
        amount: u32,
        passenger_phone: Option<&str>,
    ) -> SyncResult<Ticket> {
        let mut ticket = Ticket::cash(Uuid::new_v4().to_string(), trip_id, amount);
        if let Some(phone) = passenger_phone.filter(|p| Ticket::is_valid_phone(p)) {
            ticket = ticket.with_passenger_phone(phone);
        }

        EventPayload::TicketIssue(ticket.clone()).validate()?;

        if ticket.passenger_phone.is_some() && !self.report_ticket(&ticket).await {
            info!(ticket = %ticket.id, "live ticket report failed, recorded locally");
        }

        self.add_event(EventPayload::TicketIssue(ticket.clone()))?;
        Ok(ticket)
    }

    fn save_active_trip(&self, trip: Option<&Trip>) {
        let result = match trip {
            Some(trip) => serde_json::to_vec(trip)
                .map_err(|e| e.to_string())
                .and_then(|bytes| self.cache.set(ACTIVE_TRIP_KEY, &bytes).map_err(|e| e.to_string())),
            None => self.cache.remove(ACTIVE_TRIP_KEY).map_err(|e| e.to_string()),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist active trip");
        }
    }
}

impl<T: RemoteTransport + ?Sized + 'static> OfflineClient<T> {
    /// Spawns a background worker syncing every configured interval and
    /// after every recorded event.
    pub fn spawn_worker(&self) -> SyncWorker {
        SyncWorker::spawn(
            Arc::clone(&self.engine),
            self.config.sync_interval,
            Arc::clone(&self.wake),
        )
    }
}

fn offline_routes() -> Vec<Route> {
    vec![
        Route::new("off-1", "Westlands Express (Offline)", 50),
        Route::new("off-2", "Rongai Direct (Offline)", 100),
    ]
}
