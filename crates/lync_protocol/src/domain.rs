//! Domain records carried by events and queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A route a vehicle can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Standard fare in whole shillings.
    pub standard_fare: u32,
}

impl Route {
    /// Creates a route.
    pub fn new(id: impl Into<String>, name: impl Into<String>, standard_fare: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            standard_fare,
        }
    }
}

/// Lifecycle of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    /// Trip is running.
    Active,
    /// Trip has ended.
    Completed,
}

/// A vehicle trip along a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Trip ID.
    pub id: String,
    /// Route being run.
    pub route_id: String,
    /// Route display name at trip start.
    pub route_name: String,
    /// When the trip started.
    pub start_time: DateTime<Utc>,
    /// Vehicle registration plate.
    pub vehicle_reg: String,
    /// Trip status.
    pub status: TripStatus,
}

impl Trip {
    /// Starts a new active trip on `route` now.
    pub fn start(id: impl Into<String>, route: &Route, vehicle_reg: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            route_id: route.id.clone(),
            route_name: route.name.clone(),
            start_time: Utc::now(),
            vehicle_reg: vehicle_reg.into(),
            status: TripStatus::Active,
        }
    }
}

/// How a fare was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    /// Cash collected on board.
    Cash,
    /// Mobile money.
    Mobile,
}

/// A ticket issued on a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Ticket ID.
    pub id: String,
    /// Trip the ticket belongs to.
    pub trip_id: String,
    /// Fare in whole shillings.
    pub amount: u32,
    /// When the ticket was issued.
    pub timestamp: DateTime<Utc>,
    /// Passenger phone number, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_phone: Option<String>,
    /// Payment method.
    pub payment_type: PaymentType,
    /// Whether the ticket was reported live.
    pub synced: bool,
}

impl Ticket {
    /// Creates an unsynced cash ticket issued now.
    pub fn cash(id: impl Into<String>, trip_id: impl Into<String>, amount: u32) -> Self {
        Self {
            id: id.into(),
            trip_id: trip_id.into(),
            amount,
            timestamp: Utc::now(),
            passenger_phone: None,
            payment_type: PaymentType::Cash,
            synced: false,
        }
    }

    /// Attaches a passenger phone number.
    pub fn with_passenger_phone(mut self, phone: impl Into<String>) -> Self {
        self.passenger_phone = Some(phone.into());
        self
    }

    /// Returns true if `phone` carries at least 10 digits.
    ///
    /// Separators such as spaces, dashes and a leading `+` are ignored.
    pub fn is_valid_phone(phone: &str) -> bool {
        phone.chars().filter(char::is_ascii_digit).count() >= 10
    }
}

/// Marker recorded when a trip ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripEnd {
    /// Trip that ended.
    pub trip_id: String,
    /// When it ended.
    pub end_time: DateTime<Utc>,
}

impl TripEnd {
    /// Ends `trip_id` now.
    pub fn now(trip_id: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
            end_time: Utc::now(),
        }
    }
}

/// Operator context returned by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalContext {
    /// Trip currently running on this terminal, if any.
    #[serde(default)]
    pub active_trip: Option<Trip>,
}

/// One seat of a vehicle's seat plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    /// Seat label.
    pub seat_number: String,
    /// Whether the seat is taken.
    pub booked: bool,
}

/// Device activation details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Operator cooperative code.
    pub sacco_code: String,
    /// Branch name.
    pub branch: String,
    /// Vehicle registration plate.
    pub vehicle_reg: String,
    /// Operator PIN.
    pub operator_pin: String,
    /// Operator phone number.
    pub operator_phone: String,
    /// Cooperative display name, filled in after registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sacco_name: Option<String>,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("sacco_code", &self.sacco_code)
            .field("branch", &self.branch)
            .field("vehicle_reg", &self.vehicle_reg)
            .field("operator_pin", &"<redacted>")
            .field("operator_phone", &self.operator_phone)
            .field("sacco_name", &self.sacco_name)
            .finish()
    }
}

/// Core's answer to a device registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    /// Cooperative display name.
    pub sacco_name: String,
}
