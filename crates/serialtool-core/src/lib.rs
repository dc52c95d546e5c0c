//! # SerialTool Core Library
//!
//! Core functionality for the SerialTool serial link tester.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Byte / hex / text conversions for the send and receive views
//! - A serial session that owns one port and serializes all I/O on it
//! - Response mode (push notifications) and Acknowledgment mode (polling)
//! - An in-memory loopback backend for tests and offline use
//!
//! ## Example
//!
//! ```rust,ignore
//! use serialtool_core::session::{PortConfiguration, ReceiveMode, Session};
//!
//! let session = Session::system();
//! let mut events = session.subscribe_data();
//!
//! let result = session.open(PortConfiguration::new("/dev/ttyUSB0", 115200));
//! assert!(result.success, "{}", result.message);
//!
//! session.send_hex("01 02 FF");
//! let event = events.blocking_recv()?;
//! println!("RX {}", event.hex_text);
//! ```

pub mod codec;
pub mod session;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{bytes_to_hex, hex_to_bytes, CodecError, TextEncoding};
    pub use crate::session::{
        ConnectionEvent, DataEvent, OperationResult, PortConfiguration, ReadOutcome, ReceiveMode,
        Session, SessionError, SessionOptions,
    };
    pub use crate::transport::{LoopbackBackend, PortBackend, PortInfo, SystemBackend};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
