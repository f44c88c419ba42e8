//! Reply envelope of the core.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reply from the core: `{ok, data, error?, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreResponse {
    /// Whether the core accepted the request.
    pub ok: bool,
    /// Reply data.
    #[serde(default)]
    pub data: Option<Value>,
    /// Error message when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the reply was produced.
    pub timestamp: DateTime<Utc>,
}

impl CoreResponse {
    /// Creates a successful reply carrying `data`.
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a rejection carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// Returns true if the reply is `ok` and carries non-null data.
    pub fn is_success(&self) -> bool {
        self.ok && self.data.as_ref().is_some_and(|d| !d.is_null())
    }

    /// Extracts the data of a well-formed success.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Rejected`] with the core's message when `ok` is false
    /// - [`ProtocolError::EmptyResponse`] when `ok` is true but data is null
    pub fn into_data(self) -> ProtocolResult<Value> {
        if !self.ok {
            return Err(ProtocolError::Rejected(
                self.error.unwrap_or_else(|| "core rejected request".into()),
            ));
        }
        match self.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(ProtocolError::EmptyResponse),
        }
    }
}
