//! Session notifications
//!
//! Events go out on broadcast channels. Delivery may happen on the
//! notifier thread; subscribers marshal onto their own thread if needed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::SessionError;

/// Bytes received while in Response mode
#[derive(Debug, Clone)]
pub struct DataEvent {
    /// Received bytes, never empty
    pub raw_bytes: Vec<u8>,
    /// Bytes decoded with the session's text encoding
    pub decoded_text: String,
    /// Bytes as space-separated uppercase hex
    pub hex_text: String,
    /// When the bytes were read
    pub timestamp: DateTime<Utc>,
}

/// Connection status change or background failure
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// Whether the port is open after this event
    pub connected: bool,
    /// Human-readable status line
    pub message: String,
    /// When the event was raised
    pub timestamp: DateTime<Utc>,
    /// Underlying error, if any
    pub error: Option<Arc<SessionError>>,
}

impl ConnectionEvent {
    pub(crate) fn new(
        connected: bool,
        message: impl Into<String>,
        error: Option<Arc<SessionError>>,
    ) -> Self {
        Self {
            connected,
            message: message.into(),
            timestamp: Utc::now(),
            error,
        }
    }
}

/// An event waiting to be published once the session lock is released
#[derive(Debug)]
pub(crate) enum Pending {
    Data(DataEvent),
    Status(ConnectionEvent),
}

/// Fan-out for both event streams
pub(crate) struct Notifier {
    data: broadcast::Sender<DataEvent>,
    status: broadcast::Sender<ConnectionEvent>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (data, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        Self { data, status }
    }

    pub(crate) fn subscribe_data(&self) -> broadcast::Receiver<DataEvent> {
        self.data.subscribe()
    }

    pub(crate) fn subscribe_status(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.status.subscribe()
    }

    pub(crate) fn publish(&self, events: Vec<Pending>) {
        for event in events {
            // A send error only means nobody is subscribed right now
            match event {
                Pending::Data(e) => {
                    let _ = self.data.send(e);
                }
                Pending::Status(e) => {
                    let _ = self.status.send(e);
                }
            }
        }
    }
}
