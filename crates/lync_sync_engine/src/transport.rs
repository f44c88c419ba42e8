//! Transport layer abstraction for talking to the core.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use lync_protocol::{CoreResponse, RemoteCommand};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A request/response channel to the core.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (message bridge, HTTP, mock for testing, etc.).
///
/// `Ok` carries whatever the core answered, including rejections
/// (`ok = false`). `Err` means no answer was obtained: the request timed out
/// or the transport itself failed.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Sends `command` with `payload` and waits for the core's reply.
    async fn send(&self, command: &str, payload: Value) -> SyncResult<CoreResponse>;

    /// Sends a typed command.
    async fn call(&self, command: &RemoteCommand) -> SyncResult<CoreResponse> {
        let payload = command.payload()?;
        self.send(command.name(), payload).await
    }

    /// Sends a typed command and extracts the data of a successful reply.
    ///
    /// Rejections and empty replies become errors.
    async fn call_data(&self, command: &RemoteCommand) -> SyncResult<Value> {
        Ok(self.call(command).await?.into_data()?)
    }
}

#[async_trait]
impl<T: RemoteTransport + ?Sized> RemoteTransport for Arc<T> {
    async fn send(&self, command: &str, payload: Value) -> SyncResult<CoreResponse> {
        (**self).send(command, payload).await
    }
}

/// A scripted reply of the [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Answer `ok` with this data.
    Success(Value),
    /// Answer `ok = false` with this message.
    Reject(String),
    /// Fail with a timeout.
    Timeout,
    /// Fail with a retryable transport error.
    TransportError(String),
}

impl MockReply {
    fn into_result(self, command: &str) -> SyncResult<CoreResponse> {
        match self {
            MockReply::Success(data) => Ok(CoreResponse::success(data)),
            MockReply::Reject(message) => Ok(CoreResponse::failure(message)),
            MockReply::Timeout => Err(SyncError::Timeout {
                command: command.to_string(),
            }),
            MockReply::TransportError(message) => Err(SyncError::transport_retryable(message)),
        }
    }
}

/// A mock transport for testing.
///
/// Each command answers with its queued one-shot replies first, then with
/// its standing reply. While disconnected every call fails with a retryable
/// transport error.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    standing: Mutex<HashMap<String, MockReply>>,
    queued: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    /// Creates a new, connected mock transport with nothing scripted.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            standing: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the reply `command` gives whenever nothing is queued.
    pub fn set_response(&self, command: &str, reply: MockReply) {
        self.standing.lock().insert(command.to_string(), reply);
    }

    /// Queues a one-shot reply for `command`.
    pub fn push_response(&self, command: &str, reply: MockReply) {
        self.queued
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true while connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Returns how many times `command` was sent.
    pub fn call_count(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|(c, _)| c == command).count()
    }

    fn next_reply(&self, command: &str) -> Option<MockReply> {
        if let Some(reply) = self
            .queued
            .lock()
            .get_mut(command)
            .and_then(VecDeque::pop_front)
        {
            return Some(reply);
        }
        self.standing.lock().get(command).cloned()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn send(&self, command: &str, payload: Value) -> SyncResult<CoreResponse> {
        self.calls.lock().push((command.to_string(), payload));

        if !self.is_connected() {
            return Err(SyncError::transport_retryable("connection refused"));
        }

        match self.next_reply(command) {
            Some(reply) => reply.into_result(command),
            None => Err(SyncError::transport_fatal(format!(
                "no mock response scripted for {command}"
            ))),
        }
    }
}
