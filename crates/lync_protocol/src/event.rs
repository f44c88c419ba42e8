//! Domain events recorded by the client.

use crate::domain::{Ticket, Trip, TripEnd};
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Kind of a domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A trip started.
    TripStart,
    /// A ticket was issued.
    TicketIssue,
    /// A trip ended.
    TripEnd,
}

impl EventKind {
    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TripStart => "TRIP_START",
            EventKind::TicketIssue => "TICKET_ISSUE",
            EventKind::TripEnd => "TRIP_END",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of an event.
///
/// `Pending` is the only non-terminal status. `Synced` and `Failed` never
/// change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Not yet delivered and not abandoned.
    Pending,
    /// Accepted by the core.
    Synced,
    /// Abandoned after exhausting retries.
    Failed,
}

impl EventStatus {
    /// Returns true for `Synced` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Pending)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventStatus::Pending => "PENDING",
            EventStatus::Synced => "SYNCED",
            EventStatus::Failed => "FAILED",
        })
    }
}

/// Body of an event, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A trip started.
    TripStart(Trip),
    /// A ticket was issued.
    TicketIssue(Ticket),
    /// A trip ended.
    TripEnd(TripEnd),
}

impl EventPayload {
    /// Returns the kind matching this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TripStart(_) => EventKind::TripStart,
            EventPayload::TicketIssue(_) => EventKind::TicketIssue,
            EventPayload::TripEnd(_) => EventKind::TripEnd,
        }
    }

    /// Checks the payload is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEvent`] describing the first problem.
    pub fn validate(&self) -> ProtocolResult<()> {
        match self {
            EventPayload::TripStart(trip) => {
                require_non_empty("trip id", &trip.id)?;
                require_non_empty("route id", &trip.route_id)
            }
            EventPayload::TicketIssue(ticket) => {
                require_non_empty("ticket id", &ticket.id)?;
                require_non_empty("ticket trip id", &ticket.trip_id)?;
                if ticket.amount == 0 {
                    return Err(ProtocolError::invalid("ticket amount must be positive"));
                }
                if let Some(phone) = &ticket.passenger_phone {
                    if !Ticket::is_valid_phone(phone) {
                        return Err(ProtocolError::invalid(format!(
                            "passenger phone {phone:?} has fewer than 10 digits"
                        )));
                    }
                }
                Ok(())
            }
            EventPayload::TripEnd(end) => require_non_empty("trip id", &end.trip_id),
        }
    }

    fn to_value(&self) -> ProtocolResult<Value> {
        let value = match self {
            EventPayload::TripStart(trip) => serde_json::to_value(trip)?,
            EventPayload::TicketIssue(ticket) => serde_json::to_value(ticket)?,
            EventPayload::TripEnd(end) => serde_json::to_value(end)?,
        };
        Ok(value)
    }

    fn from_value(kind: EventKind, value: Value) -> ProtocolResult<Self> {
        let payload = match kind {
            EventKind::TripStart => EventPayload::TripStart(serde_json::from_value(value)?),
            EventKind::TicketIssue => EventPayload::TicketIssue(serde_json::from_value(value)?),
            EventKind::TripEnd => EventPayload::TripEnd(serde_json::from_value(value)?),
        };
        Ok(payload)
    }
}

fn require_non_empty(field: &str, value: &str) -> ProtocolResult<()> {
    if value.trim().is_empty() {
        Err(ProtocolError::invalid(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// A recorded business fact awaiting or having completed delivery.
///
/// # Invariants
///
/// - `id` is unique and never changes
/// - `status` only moves from `Pending` to a terminal status
/// - `retry_count` never decreases
///
/// Serialized as
/// `{"id", "type", "payload", "timestamp", "status", "retryCount"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord", into = "EventRecord")]
pub struct Event {
    id: Uuid,
    payload: EventPayload,
    timestamp: DateTime<Utc>,
    status: EventStatus,
    retry_count: u32,
}

impl Event {
    /// Creates a pending event with a fresh ID.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEvent`] if the payload is malformed.
    pub fn new(payload: EventPayload) -> ProtocolResult<Self> {
        payload.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            payload,
            timestamp: Utc::now(),
            status: EventStatus::Pending,
            retry_count: 0,
        })
    }

    /// Returns the event ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the event kind.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Returns the payload.
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Returns the creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the delivery status.
    pub fn status(&self) -> EventStatus {
        self.status
    }

    /// Returns the number of failed delivery attempts.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns true while the event awaits delivery.
    pub fn is_pending(&self) -> bool {
        self.status == EventStatus::Pending
    }

    /// Marks the event delivered.
    ///
    /// Returns false (and changes nothing) if the event was already terminal.
    pub fn mark_synced(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = EventStatus::Synced;
        true
    }

    /// Abandons the event.
    ///
    /// Returns false (and changes nothing) if the event was already terminal.
    pub fn mark_failed(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = EventStatus::Failed;
        true
    }

    /// Counts one failed delivery attempt.
    ///
    /// Once `retry_count` exceeds `max_retries` the event becomes `Failed`.
    /// Terminal events are left untouched. Returns the resulting status.
    pub fn record_failure(&mut self, max_retries: u32) -> EventStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        self.retry_count = self.retry_count.saturating_add(1);
        if self.retry_count > max_retries {
            self.status = EventStatus::Failed;
        }
        self.status
    }
}

/// Wire shape of an [`Event`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
    id: Uuid,
    #[serde(rename = "type")]
    kind: EventKind,
    payload: Value,
    timestamp: DateTime<Utc>,
    status: EventStatus,
    #[serde(default)]
    retry_count: u32,
}

impl TryFrom<EventRecord> for Event {
    type Error = ProtocolError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            payload: EventPayload::from_value(record.kind, record.payload)?,
            timestamp: record.timestamp,
            status: record.status,
            retry_count: record.retry_count,
        })
    }
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        // Domain records contain only strings, numbers and timestamps, which
        // always encode.
        let payload = event.payload.to_value().unwrap_or(Value::Null);
        Self {
            id: event.id,
            kind: event.payload.kind(),
            payload,
            timestamp: event.timestamp,
            status: event.status,
            retry_count: event.retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Route, Ticket, Trip, TripEnd};

    fn trip_start() -> EventPayload {
        EventPayload::TripStart(Trip::start("t1", &Route::new("r1", "CBD", 50), "KDA 123A"))
    }

    #[test]
    fn new_event_is_pending() {
        let event = Event::new(trip_start()).unwrap();
        assert_eq!(event.status(), EventStatus::Pending);
        assert_eq!(event.retry_count(), 0);
        assert_eq!(event.kind(), EventKind::TripStart);
    }

    #[test]
    fn ids_are_unique() {
        let a = Event::new(trip_start()).unwrap();
        let b = Event::new(trip_start()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn rejects_malformed_payloads() {
        let zero_fare = EventPayload::TicketIssue(Ticket::cash("k1", "t1", 0));
        assert!(matches!(Event::new(zero_fare), Err(ProtocolError::InvalidEvent(_))));

        let no_trip = EventPayload::TripEnd(TripEnd::now(" "));
        assert!(Event::new(no_trip).is_err());

        let short_phone =
            EventPayload::TicketIssue(Ticket::cash("k1", "t1", 50).with_passenger_phone("0712"));
        assert!(Event::new(short_phone).is_err());

        let good_phone = EventPayload::TicketIssue(
            Ticket::cash("k1", "t1", 50).with_passenger_phone("0712345678"),
        );
        assert!(Event::new(good_phone).is_ok());
    }

    #[test]
    fn failure_counting_reaches_failed() {
        let mut event = Event::new(trip_start()).unwrap();
        for attempt in 1..=10 {
            assert_eq!(event.record_failure(10), EventStatus::Pending);
            assert_eq!(event.retry_count(), attempt);
        }
        assert_eq!(event.record_failure(10), EventStatus::Failed);
        assert_eq!(event.retry_count(), 11);

        // Terminal: nothing moves any more.
        assert_eq!(event.record_failure(10), EventStatus::Failed);
        assert_eq!(event.retry_count(), 11);
        assert!(!event.mark_synced());
        assert_eq!(event.status(), EventStatus::Failed);
    }

    #[test]
    fn synced_is_terminal() {
        let mut event = Event::new(trip_start()).unwrap();
        assert!(event.mark_synced());
        assert!(!event.mark_failed());
        assert!(!event.mark_synced());
        assert_eq!(event.status(), EventStatus::Synced);
    }

    #[test]
    fn wire_format() {
        let event = Event::new(EventPayload::TripEnd(TripEnd::now("t1"))).unwrap();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "TRIP_END");
        assert_eq!(json["payload"]["tripId"], "t1");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["id"], event.id().to_string());
    }

    #[test]
    fn decode_rejects_payload_of_wrong_kind() {
        let event = Event::new(EventPayload::TripEnd(TripEnd::now("t1"))).unwrap();
        let mut json = serde_json::to_value(&event).unwrap();
        json["type"] = "TICKET_ISSUE".into();

        assert!(serde_json::from_value::<Event>(json).is_err());
    }

    #[test]
    fn decode_roundtrip_keeps_status_and_retries() {
        let mut event = Event::new(trip_start()).unwrap();
        event.record_failure(10);
        event.record_failure(10);

        let bytes = serde_json::to_vec(&event).unwrap();
        let decoded: Event = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.retry_count(), 2);
    }
}
