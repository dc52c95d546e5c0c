//! Serial transports
//!
//! The seam between a session and the operating system. A [`PortBackend`]
//! enumerates and opens ports; each open port is a [`SerialChannel`].

mod loopback;
mod serial;

pub use loopback::{LoopbackBackend, LoopbackPort};
pub use serial::{list_ports, SystemBackend};

use std::io::{self, Read, Write};

use crate::session::PortConfiguration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Port with a name and no USB details
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

/// One open OS serial handle
pub trait SerialChannel: Read + Write + Send {
    /// Name the channel was opened with
    fn port_name(&self) -> &str;

    /// Number of bytes waiting in the receive buffer
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Release the handle. The handle is gone afterwards even on error.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// Source of serial ports
pub trait PortBackend: Send + Sync {
    /// Currently available ports
    fn available_ports(&self) -> io::Result<Vec<PortInfo>>;

    /// Open a fresh handle configured with `config`
    fn open(&self, config: &PortConfiguration) -> io::Result<Box<dyn SerialChannel>>;
}
