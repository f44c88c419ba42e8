//! Connectivity classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse health of the link to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Last remote call succeeded.
    #[default]
    Connected,
    /// Some consecutive failures, below the threshold.
    Degraded,
    /// Consecutive failures reached the threshold.
    Disconnected,
}

impl ConnectionState {
    /// Classifies `failure_count` consecutive failures against a threshold.
    ///
    /// `0` is `Connected`, `1..max_failures` is `Degraded`, anything at or
    /// above `max_failures` is `Disconnected`. A threshold of zero behaves
    /// like a threshold of one.
    pub fn from_failures(failure_count: u32, max_failures: u32) -> Self {
        let threshold = max_failures.max(1);
        if failure_count == 0 {
            ConnectionState::Connected
        } else if failure_count < threshold {
            ConnectionState::Degraded
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Returns the wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Degraded => "DEGRADED",
            ConnectionState::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
