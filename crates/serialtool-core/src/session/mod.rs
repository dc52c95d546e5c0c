//! Serial Session
//!
//! Owns a single serial port and serializes every open, close, read, write
//! and mode switch on it behind one lock.
//!
//! Received data reaches the caller in one of two ways:
//! - Response mode: a notifier thread reads pending bytes and publishes
//!   [`DataEvent`]s
//! - Acknowledgment mode: bytes stay buffered until [`Session::read`]

mod config;
mod error;
mod events;
mod lifecycle;
mod outcome;
mod watcher;

pub use config::{DataBits, Parity, PortConfiguration, ReceiveMode, SessionOptions, StopBits};
pub use error::{IoOperation, SessionError};
pub use events::{ConnectionEvent, DataEvent};
pub use lifecycle::Session;
pub use outcome::{OperationResult, ReadOutcome};

/// Default baud rate for new port configurations
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read and write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Default interval between Response-mode receive checks, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
