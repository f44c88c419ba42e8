//! # Lync Protocol
//!
//! Event, command and response types shared by the Lync sync engine and
//! anything that talks to the remote core.
//!
//! This crate provides:
//! - [`Event`] and its tagged [`EventPayload`] for the durable event log
//! - Domain records carried by events and queries ([`Trip`], [`Ticket`], [`Route`], ...)
//! - [`RemoteCommand`], the named command surface of the core
//! - [`CoreResponse`], the `{ok, data, error, timestamp}` reply envelope
//! - [`ConnectionState`], the circuit breaker's health classification
//!
//! This is a pure protocol crate with no I/O operations. Everything
//! serializes as camelCase JSON so persisted queues stay readable by other
//! clients of the core.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod command;
mod connection;
mod domain;
mod error;
mod event;
mod response;

pub use command::RemoteCommand;
pub use connection::ConnectionState;
pub use domain::{
    DeviceConfig, DeviceRegistration, PaymentType, Route, Seat, TerminalContext, Ticket, Trip,
    TripEnd, TripStatus,
};
pub use error::{ProtocolError, ProtocolResult};
pub use event::{Event, EventKind, EventPayload, EventStatus};
pub use response::CoreResponse;
