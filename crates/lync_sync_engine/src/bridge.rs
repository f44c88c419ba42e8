//! Correlation-based message bridge transport.
//!
//! The core is reached through a one-way message channel (a hosted frame,
//! a websocket, an in-process queue). Every request carries a fresh request
//! ID; replies come back on a separate path and are matched to the waiting
//! request by that ID. The actual channel is abstracted via a trait so the
//! engine stays transport-agnostic.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use async_trait::async_trait;
use lync_protocol::CoreResponse;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::{Origin, Url};
use uuid::Uuid;

/// Prefix of the message type of every outgoing command.
pub const COMMAND_PREFIX: &str = "MOS_COMMAND:";

/// Outgoing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMessage {
    /// `MOS_COMMAND:<command>`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Command payload.
    pub payload: Value,
    /// Correlation ID.
    pub request_id: Uuid,
}

impl BridgeMessage {
    /// Creates a request for `command`.
    pub fn new(command: &str, payload: Value, request_id: Uuid) -> Self {
        Self {
            kind: format!("{COMMAND_PREFIX}{command}"),
            payload,
            request_id,
        }
    }

    /// Returns the command name, if the message type is well-formed.
    pub fn command(&self) -> Option<&str> {
        self.kind.strip_prefix(COMMAND_PREFIX)
    }
}

/// Incoming reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeReply {
    /// Correlation ID of the request being answered.
    pub request_id: Uuid,
    /// Reply data.
    #[serde(default)]
    pub payload: Value,
    /// Error reported by the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeReply {
    /// Creates a successful reply.
    pub fn success(request_id: Uuid, payload: Value) -> Self {
        Self {
            request_id,
            payload,
            error: None,
        }
    }

    /// Creates an error reply.
    pub fn error(request_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            request_id,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    fn into_response(self) -> CoreResponse {
        match self.error {
            Some(error) => CoreResponse::failure(error),
            None => CoreResponse::success(self.payload),
        }
    }
}

/// Outgoing half of the bridge.
///
/// Implement this trait to provide the actual message channel.
pub trait BridgeChannel: Send + Sync {
    /// Posts a request. Must not block waiting for the reply.
    fn post(&self, message: BridgeMessage) -> Result<(), String>;
}

/// A bridge channel backed by a tokio mpsc queue.
///
/// The receiving half is handed to whatever serves the requests in-process;
/// it answers through [`BridgeTransport::deliver`].
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: mpsc::UnboundedSender<BridgeMessage>,
}

impl MpscChannel {
    /// Creates a channel and its receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BridgeMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl BridgeChannel for MpscChannel {
    fn post(&self, message: BridgeMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "bridge receiver dropped".to_string())
    }
}

type PendingMap = Mutex<HashMap<Uuid, oneshot::Sender<BridgeReply>>>;

/// Removes a request's correlation record when the request finishes,
/// whichever way it finishes.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    request_id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
    }
}

fn parse_origin(url: &str) -> Option<Origin> {
    Url::parse(url).ok().map(|url| url.origin())
}

/// Bridge-based transport.
///
/// # Timeouts
///
/// A request with no matching reply within the timeout resolves as
/// [`SyncError::Timeout`] and its correlation record is removed, so a late
/// reply is dropped instead of being mistaken for another request's answer.
pub struct BridgeTransport<C: BridgeChannel> {
    /// Endpoint of the core (e.g., "https://core.example.com/api").
    endpoint: String,
    /// Channel implementation.
    channel: C,
    /// Per-request timeout.
    timeout: Duration,
    /// Origins whose replies are accepted, the endpoint's own first.
    trusted_origins: Vec<Origin>,
    /// Requests waiting for a reply.
    pending: PendingMap,
}

impl<C: BridgeChannel> BridgeTransport<C> {
    /// Creates a bridge transport with the default 12 second timeout.
    ///
    /// Replies are accepted from the endpoint's origin (scheme, host and
    /// port). An endpoint that is not an absolute URL trusts nobody until
    /// [`with_trusted_origin`](Self::with_trusted_origin) adds someone.
    pub fn new(endpoint: impl Into<String>, channel: C) -> Self {
        let endpoint = endpoint.into();
        let trusted_origins = parse_origin(&endpoint).into_iter().collect();
        Self {
            endpoint,
            channel,
            timeout: Duration::from_secs(12),
            trusted_origins,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a bridge transport from the engine configuration.
    pub fn from_config(config: &SyncConfig, channel: C) -> Self {
        Self::new(config.endpoint.clone(), channel).with_timeout(config.request_timeout)
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accepts replies from an additional origin.
    ///
    /// An origin that does not parse as a URL is ignored.
    pub fn with_trusted_origin(mut self, origin: &str) -> Self {
        match parse_origin(origin) {
            Some(origin) => self.trusted_origins.push(origin),
            None => warn!(origin, "ignoring unparseable trusted origin"),
        }
        self
    }

    /// Returns the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns true if replies from `origin` are accepted.
    ///
    /// Origins are compared whole after parsing, so a prefix of the
    /// endpoint such as `https://core` is not trusted.
    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        parse_origin(origin).is_some_and(|origin| self.trusted_origins.contains(&origin))
    }

    /// Hands a reply received from `origin` to the request waiting for it.
    ///
    /// Returns false if the reply was dropped: untrusted origin, or no
    /// request with that ID is waiting (it already timed out or never
    /// existed).
    pub fn deliver(&self, origin: &str, reply: BridgeReply) -> bool {
        if !self.is_trusted_origin(origin) {
            debug!(origin, "ignoring bridge reply from untrusted origin");
            return false;
        }

        let Some(waiter) = self.pending.lock().remove(&reply.request_id) else {
            debug!(request_id = %reply.request_id, "dropping late or unknown bridge reply");
            return false;
        };

        // The requester may have given up between the lookup and the send.
        waiter.send(reply).is_ok()
    }

    /// Fails every waiting request.
    pub fn close(&self) {
        self.pending.lock().clear();
    }
}

#[async_trait]
impl<C: BridgeChannel> RemoteTransport for BridgeTransport<C> {
    async fn send(&self, command: &str, payload: Value) -> SyncResult<CoreResponse> {
        let request_id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();

        self.pending.lock().insert(request_id, sender);
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id,
        };

        let message = BridgeMessage::new(command, payload, request_id);
        if let Err(e) = self.channel.post(message) {
            warn!(command, error = %e, "bridge fault");
            return Err(SyncError::transport_fatal(format!("bridge fault: {e}")));
        }

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(reply)) => Ok(reply.into_response()),
            Ok(Err(_)) => Err(SyncError::transport_retryable(
                "bridge closed before reply",
            )),
            Err(_) => {
                warn!(command, %request_id, timeout = ?self.timeout, "core request timed out");
                Err(SyncError::Timeout {
                    command: command.to_string(),
                })
            }
        }
    }
}
