//! Serial port handling
//!
//! OS-backed transport built on the `serialport` crate.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{PortBackend, PortInfo, SerialChannel};
use crate::session::{PortConfiguration, StopBits};

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
                usb_info.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then COM* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyACM"), (1, "ttyUSB"), (2, "COM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List available serial ports, with /dev fallbacks and deterministic ordering.
///
/// Fails only when the OS query fails and no fallback device was found.
pub fn list_ports() -> io::Result<Vec<PortInfo>> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();

    // Linux-only: Add /dev/ttyACM* and /dev/ttyUSB* entries the API may miss
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.insert(full.clone(), PortInfo::named(full));
                }
            }
        }
    }

    match serialport::available_ports() {
        Ok(infos) => {
            // API entries carry USB details, so they win over fallbacks
            for info in infos {
                let p = PortInfo::from(info);
                map.insert(p.name.clone(), p);
            }
        }
        Err(e) if map.is_empty() => return Err(e.into()),
        Err(e) => {
            tracing::warn!("serial port enumeration failed, using /dev fallback: {e}");
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    Ok(v)
}

fn driver_stop_bits(stop_bits: StopBits) -> io::Result<serialport::StopBits> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} stop bits are not supported by the serial driver", other),
        )),
    }
}

/// Backend for the machine's real serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SystemBackend {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl PortBackend for SystemBackend {
    fn available_ports(&self) -> io::Result<Vec<PortInfo>> {
        list_ports()
    }

    fn open(&self, config: &PortConfiguration) -> io::Result<Box<dyn SerialChannel>> {
        let port = serialport::new(config.port_name.as_str(), config.baud_rate)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(driver_stop_bits(config.stop_bits)?)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout())
            .open()?;

        Ok(Box::new(SystemChannel {
            name: config.port_name.clone(),
            port,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            active_timeout: config.read_timeout(),
        }))
    }
}

/// Serial port wrapper implementing SerialChannel.
///
/// `serialport` has a single timeout, so it is switched between the read
/// and write values on demand.
struct SystemChannel {
    name: String,
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
    write_timeout: Duration,
    active_timeout: Duration,
}

impl SystemChannel {
    fn use_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        if self.active_timeout != timeout {
            self.port.set_timeout(timeout)?;
            self.active_timeout = timeout;
        }
        Ok(())
    }
}

impl Read for SystemChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.use_timeout(self.read_timeout)?;
        self.port.read(buf)
    }
}

impl Write for SystemChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.use_timeout(self.write_timeout)?;
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialChannel for SystemChannel {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        // serialport releases the descriptor on drop
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // This test just ensures the function doesn't panic
        if let Ok(ports) = list_ports() {
            for port in &ports {
                println!("Found port: {} - {:?}", port.name, port.product);
            }
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "COM10",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "COM3",
            "/dev/ttyACM10",
        ];
        let mut ports: Vec<PortInfo> = names.into_iter().map(PortInfo::named).collect();

        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<String> = ports.into_iter().map(|p| p.name).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "COM3",
                "COM10",
                "/dev/someport",
            ]
        );
    }

    #[test]
    fn test_unsupported_stop_bits_rejected() {
        let err = driver_stop_bits(StopBits::OnePointFive).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(driver_stop_bits(StopBits::None).is_err());
        assert!(driver_stop_bits(StopBits::Two).is_ok());
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = PortConfiguration::new("/dev/serialtool-does-not-exist", 9600);
        assert!(SystemBackend::new().open(&config).is_err());
    }
}
