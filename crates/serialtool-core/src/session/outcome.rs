//! Operation results
//!
//! Session operations report failures as values instead of `Err`, so the
//! front-end can show `message` directly and keep `error` for diagnostics.

use std::sync::Arc;

use super::SessionError;
use crate::codec::{bytes_to_hex, bytes_to_text, TextEncoding};

/// Outcome of a mutating session operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable status line
    pub message: String,
    /// Underlying error, if the operation failed
    pub error: Option<Arc<SessionError>>,
}

impl OperationResult {
    /// Successful result with the given message
    pub fn successful(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
        }
    }

    /// Failed result carrying the underlying error
    pub fn failed(message: impl Into<String>, error: SessionError) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(Arc::new(error)),
        }
    }

    /// Failed result whose message is the error's own description
    pub fn from_error(error: SessionError) -> Self {
        Self::failed(error.to_string(), error)
    }

    /// Borrow the underlying error
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_deref()
    }
}

/// Outcome of a read, with the received bytes in every view
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    /// Whether the read succeeded (an empty read is still a success)
    pub success: bool,
    /// Human-readable status line
    pub message: String,
    /// Underlying error, if the read failed
    pub error: Option<Arc<SessionError>>,
    /// Bytes read; empty when nothing was pending
    pub raw_bytes: Vec<u8>,
    /// `raw_bytes` decoded with the session's text encoding
    pub decoded_text: String,
    /// `raw_bytes` as space-separated uppercase hex
    pub hex_text: String,
}

impl ReadOutcome {
    pub(crate) fn data(raw_bytes: Vec<u8>, encoding: TextEncoding) -> Self {
        let message = if raw_bytes.is_empty() {
            "No data available to read".to_string()
        } else {
            format!("Read {} bytes successfully", raw_bytes.len())
        };
        Self {
            success: true,
            message,
            error: None,
            decoded_text: bytes_to_text(&raw_bytes, encoding),
            hex_text: bytes_to_hex(&raw_bytes, " "),
            raw_bytes,
        }
    }

    pub(crate) fn failed(message: impl Into<String>, error: SessionError) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(Arc::new(error)),
            raw_bytes: Vec::new(),
            decoded_text: String::new(),
            hex_text: String::new(),
        }
    }

    /// True when the read succeeded but nothing was pending
    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }

    /// Borrow the underlying error
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_deref()
    }
}

impl From<ReadOutcome> for OperationResult {
    fn from(outcome: ReadOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message,
            error: outcome.error,
        }
    }
}
