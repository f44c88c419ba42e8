//! Named command surface of the core.

use crate::domain::DeviceConfig;
use crate::event::Event;
use crate::error::ProtocolResult;
use serde_json::{json, Value};

/// A command understood by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    /// List routes.
    GetRoutes,
    /// Fetch the operator's terminal context.
    GetTerminalContext {
        /// Operator phone or ID.
        operator_id: String,
    },
    /// Report a ticket live.
    IssueTicket {
        /// Trip the ticket belongs to.
        trip_id: String,
        /// Passenger phone.
        phone: String,
        /// Fare in whole shillings.
        amount: u32,
    },
    /// Deliver a recorded event.
    SyncEvent(Event),
    /// Fetch a vehicle's seat plan.
    GetVehicleSeats {
        /// Vehicle ID.
        vehicle_id: String,
    },
    /// Register this device.
    RegisterDevice(DeviceConfig),
    /// Look up crew by phone number.
    GetCrew {
        /// Phone numbers.
        phones: Vec<String>,
    },
}

impl RemoteCommand {
    /// Returns the command name sent to the core.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::GetRoutes => "getRoutes",
            RemoteCommand::GetTerminalContext { .. } => "getTerminalContext",
            RemoteCommand::IssueTicket { .. } => "ticket",
            RemoteCommand::SyncEvent(_) => "syncEvent",
            RemoteCommand::GetVehicleSeats { .. } => "getVehicleSeats",
            RemoteCommand::RegisterDevice(_) => "registerDevice",
            RemoteCommand::GetCrew { .. } => "getCrew",
        }
    }

    /// Builds the command payload.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload cannot be encoded.
    pub fn payload(&self) -> ProtocolResult<Value> {
        let payload = match self {
            RemoteCommand::GetRoutes => json!({}),
            RemoteCommand::GetTerminalContext { operator_id } => json!(operator_id),
            RemoteCommand::IssueTicket {
                trip_id,
                phone,
                amount,
            } => json!({ "tripId": trip_id, "phone": phone, "amount": amount }),
            RemoteCommand::SyncEvent(event) => serde_json::to_value(event)?,
            RemoteCommand::GetVehicleSeats { vehicle_id } => json!(vehicle_id),
            RemoteCommand::RegisterDevice(config) => serde_json::to_value(config)?,
            RemoteCommand::GetCrew { phones } => json!(phones),
        };
        Ok(payload)
    }

    /// Returns the cache key conventionally used for this query's result.
    ///
    /// Commands with side effects have no cache key.
    pub fn default_cache_key(&self) -> Option<String> {
        match self {
            RemoteCommand::GetRoutes => Some("routes".into()),
            RemoteCommand::GetTerminalContext { .. } => Some("terminal_context".into()),
            RemoteCommand::GetVehicleSeats { vehicle_id } => {
                Some(format!("seats_{}", escape_key_part(vehicle_id)))
            }
            _ => None,
        }
    }
}

/// Escapes `part` into the storage key alphabet.
///
/// ASCII letters, digits, `-` and `.` pass through. Every other byte,
/// `_` included, becomes `_` plus two hex digits, so distinct ids never
/// share a key.
fn escape_key_part(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for b in part.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("_{b:02X}"));
        }
    }
    out
}
