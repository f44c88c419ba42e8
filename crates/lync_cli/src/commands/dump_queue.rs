//! Dump queue command implementation.

use super::StoreLocation;
use lync_protocol::{Event, EventPayload, EventStatus};
use serde::Serialize;

/// Queued event representation for output.
#[derive(Debug, Serialize)]
pub struct EventInfo {
    /// Position in the queue.
    pub index: usize,
    /// Event ID.
    pub id: String,
    /// Event kind.
    pub kind: String,
    /// Delivery status.
    pub status: String,
    /// Failed delivery attempts.
    pub retry_count: u32,
    /// Creation time.
    pub timestamp: String,
    /// One-line description of the payload.
    pub summary: String,
}

/// Runs the dump-queue command.
pub fn run(
    location: &StoreLocation,
    limit: Option<usize>,
    status: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = status.map(parse_status).transpose()?;
    let events = location.open_log()?.events();
    let records = select(&events, status, limit);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn parse_status(status: &str) -> Result<EventStatus, String> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Ok(EventStatus::Pending),
        "synced" => Ok(EventStatus::Synced),
        "failed" => Ok(EventStatus::Failed),
        other => Err(format!("Unknown status {other:?} (expected pending, synced or failed)")),
    }
}

fn select(events: &[Event], status: Option<EventStatus>, limit: Option<usize>) -> Vec<EventInfo> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| status.map_or(true, |s| e.status() == s))
        .take(limit.unwrap_or(usize::MAX))
        .map(|(index, e)| EventInfo {
            index,
            id: e.id().to_string(),
            kind: e.kind().to_string(),
            status: e.status().to_string(),
            retry_count: e.retry_count(),
            timestamp: e.timestamp().to_rfc3339(),
            summary: summarize(e.payload()),
        })
        .collect()
}

fn summarize(payload: &EventPayload) -> String {
    match payload {
        EventPayload::TripStart(trip) => format!(
            "trip {} on {} ({}) by {}",
            trip.id, trip.route_id, trip.route_name, trip.vehicle_reg
        ),
        EventPayload::TicketIssue(ticket) => {
            let mut summary = format!(
                "ticket {} on trip {}: KES {}",
                ticket.id, ticket.trip_id, ticket.amount
            );
            if let Some(phone) = &ticket.passenger_phone {
                summary.push_str(&format!(" for {phone}"));
            }
            summary
        }
        EventPayload::TripEnd(end) => format!("trip {} ended", end.trip_id),
    }
}

fn print_text_output(records: &[EventInfo]) {
    println!(
        "{:>5}  {:<36}  {:<12}  {:<7}  {:>5}  SUMMARY",
        "#", "ID", "TYPE", "STATUS", "TRIES"
    );
    println!("{}", "-".repeat(100));

    for record in records {
        println!(
            "{:>5}  {:<36}  {:<12}  {:<7}  {:>5}  {}",
            record.index, record.id, record.kind, record.status, record.retry_count, record.summary
        );
    }

    println!();
    println!("Total: {} events", records.len());
}
