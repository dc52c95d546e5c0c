//! Session errors

use std::fmt;
use std::io;
use thiserror::Error;

use crate::codec::CodecError;

/// The OS-level call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    Enumerate,
    Open,
    Write,
    Read,
    Close,
    Subscribe,
}

impl fmt::Display for IoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoOperation::Enumerate => "Port enumeration",
            IoOperation::Open => "Open",
            IoOperation::Write => "Write",
            IoOperation::Read => "Read",
            IoOperation::Close => "Close",
            IoOperation::Subscribe => "Receive notifier start",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Serial port is not connected")]
    NotConnected,

    #[error("Data cannot be empty")]
    EmptyPayload,

    #[error(transparent)]
    InvalidFormat(#[from] CodecError),

    #[error("Invalid port configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{op} failed: {source}")]
    Io {
        op: IoOperation,
        #[source]
        source: io::Error,
    },

    #[error("Session has been disposed")]
    AlreadyDisposed,
}

impl SessionError {
    pub(crate) fn io(op: IoOperation, source: io::Error) -> Self {
        SessionError::Io { op, source }
    }

    /// Underlying OS error kind, if this is an I/O failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            SessionError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
