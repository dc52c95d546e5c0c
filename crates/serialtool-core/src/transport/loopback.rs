//! In-memory loopback transport
//!
//! Each [`LoopbackPort`] behaves like a serial device with TX wired back to
//! RX. Tests and offline demos use it to drive a session without hardware,
//! and the fault switches simulate driver failures.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{PortBackend, PortInfo, SerialChannel};
use crate::session::PortConfiguration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct PortState {
    open: bool,
    echo: bool,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
    fail_close: bool,
    max_read_chunk: Option<usize>,
    last_config: Option<PortConfiguration>,
    open_count: usize,
}

/// A simulated serial device
#[derive(Debug)]
pub struct LoopbackPort {
    name: String,
    state: Mutex<PortState>,
}

impl LoopbackPort {
    fn new(name: String) -> Self {
        Self {
            name,
            state: Mutex::new(PortState {
                echo: true,
                ..PortState::default()
            }),
        }
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulate bytes arriving from the remote end
    pub fn inject(&self, data: &[u8]) {
        lock(&self.state).rx.extend(data);
    }

    /// Everything written so far, without clearing it
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).tx.clone()
    }

    /// Everything written so far, clearing the log
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).tx)
    }

    /// Bytes waiting to be read
    pub fn pending(&self) -> usize {
        lock(&self.state).rx.len()
    }

    /// Whether a channel currently holds this port
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// How many times the port has been opened
    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    /// Configuration of the most recent open
    pub fn last_configuration(&self) -> Option<PortConfiguration> {
        lock(&self.state).last_config.clone()
    }

    /// Echo written bytes back into the receive buffer (on by default)
    pub fn set_echo(&self, echo: bool) {
        lock(&self.state).echo = echo;
    }

    /// Make every read fail as if the device had gone away
    pub fn set_fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    /// Make every write fail with a timeout
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Make close report an error (the port is still released)
    pub fn set_fail_close(&self, fail: bool) {
        lock(&self.state).fail_close = fail;
    }

    /// Cap how many bytes a single read returns, to simulate short reads
    pub fn set_max_read_chunk(&self, chunk: Option<usize>) {
        lock(&self.state).max_read_chunk = chunk;
    }
}

/// Backend serving [`LoopbackPort`]s by name
#[derive(Debug, Default)]
pub struct LoopbackBackend {
    ports: Mutex<BTreeMap<String, Arc<LoopbackPort>>>,
    fail_enumeration: AtomicBool,
}

impl LoopbackBackend {
    /// Backend with no ports
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with one port per name
    pub fn with_ports<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        for name in names {
            backend.add_port(name);
        }
        backend
    }

    /// Add a port, or return the existing one with that name
    pub fn add_port(&self, name: impl Into<String>) -> Arc<LoopbackPort> {
        let name = name.into();
        lock(&self.ports)
            .entry(name.clone())
            .or_insert_with(|| Arc::new(LoopbackPort::new(name)))
            .clone()
    }

    /// Look up a port
    pub fn port(&self, name: &str) -> Option<Arc<LoopbackPort>> {
        lock(&self.ports).get(name).cloned()
    }

    /// Make enumeration fail
    pub fn set_enumeration_failure(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }
}

impl PortBackend for LoopbackBackend {
    fn available_ports(&self) -> io::Result<Vec<PortInfo>> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "simulated enumeration failure",
            ));
        }
        Ok(lock(&self.ports).keys().map(PortInfo::named).collect())
    }

    fn open(&self, config: &PortConfiguration) -> io::Result<Box<dyn SerialChannel>> {
        let port = self.port(&config.port_name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("port {} not found", config.port_name),
            )
        })?;

        {
            let mut state = lock(&port.state);
            if state.open {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("port {} is already in use", config.port_name),
                ));
            }
            state.open = true;
            state.open_count += 1;
            state.last_config = Some(config.clone());
        }

        Ok(Box::new(LoopbackChannel { port }))
    }
}

struct LoopbackChannel {
    port: Arc<LoopbackPort>,
}

impl LoopbackChannel {
    fn state(&self) -> io::Result<MutexGuard<'_, PortState>> {
        let state = lock(&self.port.state);
        if !state.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        Ok(state)
    }
}

impl Read for LoopbackChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state()?;
        if state.fail_reads {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated read failure",
            ));
        }
        if state.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        let limit = state.max_read_chunk.unwrap_or(usize::MAX).max(1);
        let count = buf.len().min(state.rx.len()).min(limit);
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Write for LoopbackChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state()?;
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
        }
        state.tx.extend_from_slice(buf);
        if state.echo {
            state.rx.extend(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialChannel for LoopbackChannel {
    fn port_name(&self) -> &str {
        &self.port.name
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let state = self.state()?;
        Ok(u32::try_from(state.rx.len()).unwrap_or(u32::MAX))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut state = lock(&self.port.state);
        state.open = false;
        if state.fail_close {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "simulated close failure",
            ));
        }
        Ok(())
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        lock(&self.port.state).open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_round_trip() {
        let backend = LoopbackBackend::with_ports(["LOOP0"]);
        let mut channel = backend
            .open(&PortConfiguration::new("LOOP0", 9600))
            .unwrap();

        channel.write_all(b"ping").unwrap();
        assert_eq!(channel.bytes_to_read().unwrap(), 4);

        let mut buf = [0u8; 8];
        let n = channel.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(backend.port("LOOP0").unwrap().written(), b"ping".to_vec());
    }

    #[test]
    fn test_second_open_is_rejected_until_close() {
        let backend = LoopbackBackend::with_ports(["LOOP0"]);
        let config = PortConfiguration::new("LOOP0", 9600);

        let channel = backend.open(&config).unwrap();
        let err = backend.open(&config).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        channel.close().unwrap();
        assert!(backend.open(&config).is_ok());
    }

    #[test]
    fn test_unknown_port() {
        let backend = LoopbackBackend::new();
        let err = backend
            .open(&PortConfiguration::new("LOOP9", 9600))
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_failed_close_still_releases() {
        let backend = LoopbackBackend::with_ports(["LOOP0"]);
        let port = backend.port("LOOP0").unwrap();
        port.set_fail_close(true);

        let channel = backend.open(&PortConfiguration::new("LOOP0", 9600)).unwrap();
        assert!(channel.close().is_err());
        assert!(!port.is_open());
    }

    #[test]
    fn test_short_reads() {
        let backend = LoopbackBackend::with_ports(["LOOP0"]);
        let port = backend.port("LOOP0").unwrap();
        port.set_max_read_chunk(Some(2));
        port.inject(&[1, 2, 3, 4, 5]);

        let mut channel = backend.open(&PortConfiguration::new("LOOP0", 9600)).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(channel.read(&mut buf).unwrap(), 2);
        assert_eq!(port.pending(), 3);
    }

    #[test]
    fn test_enumeration() {
        let backend = LoopbackBackend::with_ports(["LOOP1", "LOOP0"]);
        let names: Vec<String> = backend
            .available_ports()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["LOOP0", "LOOP1"]);

        backend.set_enumeration_failure(true);
        assert!(backend.available_ports().is_err());
    }
}
