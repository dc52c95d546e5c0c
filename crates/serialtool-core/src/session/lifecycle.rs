//! Session lifecycle
//!
//! Handles open/close, reads and writes, and receive-mode switching for the
//! one port a session owns.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{Notifier, Pending};
use super::watcher::{PollOutcome, Watcher};
use super::{
    ConnectionEvent, DataEvent, IoOperation, OperationResult, PortConfiguration, ReadOutcome,
    ReceiveMode, SessionError, SessionOptions,
};
use crate::codec::{bytes_to_hex, hex_to_bytes, text_to_bytes, TextEncoding};
use crate::transport::{PortBackend, PortInfo, SerialChannel, SystemBackend};

/// Mutable session state, only touched with the lock held
struct SessionState {
    /// Open OS handle; `None` means Closed
    channel: Option<Box<dyn SerialChannel>>,
    /// Last configuration that opened successfully
    config: Option<PortConfiguration>,
    mode: ReceiveMode,
    /// Notifier for the current Response-mode subscription
    watcher: Option<Watcher>,
    /// Bumped on every subscribe/unsubscribe
    generation: u64,
    disposed: bool,
}

impl SessionState {
    /// Read whatever the receive buffer holds right now
    fn read_pending(&mut self) -> Result<Vec<u8>, SessionError> {
        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;

        let available = channel
            .bytes_to_read()
            .map_err(|e| SessionError::io(IoOperation::Read, e))? as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; available];
        let read = channel
            .read(&mut buffer)
            .map_err(|e| SessionError::io(IoOperation::Read, e))?;
        buffer.truncate(read);

        debug!(
            "read {} of {} pending bytes: {}",
            read,
            available,
            bytes_to_hex(&buffer, " ")
        );
        Ok(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let channel = self.channel.as_mut().ok_or(SessionError::NotConnected)?;
        channel
            .write_all(data)
            .map_err(|e| SessionError::io(IoOperation::Write, e))?;
        channel
            .flush()
            .map_err(|e| SessionError::io(IoOperation::Write, e))
    }
}

/// Work deferred until the session lock is released
#[derive(Default)]
struct Effects {
    events: Vec<Pending>,
    retired: Vec<Watcher>,
}

impl Effects {
    fn status(&mut self, connected: bool, message: &str, error: Option<Arc<SessionError>>) {
        self.events.push(Pending::Status(ConnectionEvent::new(
            connected, message, error,
        )));
    }
}

pub(crate) struct Shared {
    backend: Arc<dyn PortBackend>,
    options: SessionOptions,
    notifier: Notifier,
    state: Mutex<SessionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join retired notifiers, then publish queued events
    fn finish(&self, effects: Effects) {
        for watcher in effects.retired {
            watcher.join();
        }
        self.notifier.publish(effects.events);
    }

    fn subscribe(self: &Arc<Self>, state: &mut SessionState) -> Result<(), SessionError> {
        state.generation += 1;
        let watcher = Watcher::spawn(
            Arc::downgrade(self),
            state.generation,
            self.options.poll_interval(),
        )
        .map_err(|e| SessionError::io(IoOperation::Subscribe, e))?;
        state.watcher = Some(watcher);
        Ok(())
    }

    fn unsubscribe(state: &mut SessionState, effects: &mut Effects) {
        state.generation += 1;
        if let Some(watcher) = state.watcher.take() {
            watcher.signal_stop();
            effects.retired.push(watcher);
        }
    }

    fn open_locked(
        self: &Arc<Self>,
        state: &mut SessionState,
        config: PortConfiguration,
        effects: &mut Effects,
    ) -> OperationResult {
        if state.channel.is_some() {
            let closed = Self::close_locked(state, effects);
            if !closed.success {
                warn!("implicit close before reopen failed: {}", closed.message);
            }
        }

        if let Err(e) = config.validate() {
            let message = format!("Failed to open serial port: {}", e);
            return Self::open_failed(message, e, effects);
        }

        let channel = match self.backend.open(&config) {
            Ok(channel) => channel,
            Err(e) => {
                let message = format!("Failed to open serial port {}: {}", config.port_name, e);
                return Self::open_failed(message, SessionError::io(IoOperation::Open, e), effects);
            }
        };
        state.channel = Some(channel);

        if state.mode == ReceiveMode::Response {
            if let Err(e) = self.subscribe(state) {
                if let Some(channel) = state.channel.take() {
                    let _ = channel.close();
                }
                let message = format!("Failed to open serial port {}: {}", config.port_name, e);
                return Self::open_failed(message, e, effects);
            }
        }

        let message = format!("Serial port {} opened successfully", config.port_name);
        info!("opened {} in {} mode", config, state.mode);
        state.config = Some(config);
        effects.status(true, &message, None);
        OperationResult::successful(message)
    }

    fn open_failed(message: String, error: SessionError, effects: &mut Effects) -> OperationResult {
        warn!("{}", message);
        let error = Arc::new(error);
        effects.status(false, &message, Some(Arc::clone(&error)));
        OperationResult {
            success: false,
            message,
            error: Some(error),
        }
    }

    fn close_locked(state: &mut SessionState, effects: &mut Effects) -> OperationResult {
        // Stop notifications before the handle goes away
        Self::unsubscribe(state, effects);

        let Some(channel) = state.channel.take() else {
            let message = "Serial port closed successfully";
            effects.status(false, message, None);
            return OperationResult::successful(message);
        };

        let name = channel.port_name().to_string();
        match channel.close() {
            Ok(()) => {
                info!("closed {}", name);
                let message = "Serial port closed successfully";
                effects.status(false, message, None);
                OperationResult::successful(message)
            }
            Err(e) => {
                let message = format!("Error closing serial port {}: {}", name, e);
                warn!("{}", message);
                let error = Arc::new(SessionError::io(IoOperation::Close, e));
                effects.status(false, &message, Some(Arc::clone(&error)));
                OperationResult {
                    success: false,
                    message,
                    error: Some(error),
                }
            }
        }
    }

    /// Response-mode handler, called from the notifier thread
    pub(crate) fn handle_data_available(&self, generation: u64, report_faults: bool) -> PollOutcome {
        let mut events = Vec::new();
        let outcome = {
            let mut state = self.lock();
            if state.disposed
                || state.generation != generation
                || state.mode != ReceiveMode::Response
            {
                return PollOutcome::Stale;
            }

            match state.read_pending() {
                Ok(bytes) if bytes.is_empty() => PollOutcome::Idle,
                Ok(bytes) => {
                    let received = ReadOutcome::data(bytes, self.options.text_encoding);
                    events.push(Pending::Data(DataEvent {
                        raw_bytes: received.raw_bytes,
                        decoded_text: received.decoded_text,
                        hex_text: received.hex_text,
                        timestamp: chrono::Utc::now(),
                    }));
                    PollOutcome::Delivered
                }
                Err(SessionError::NotConnected) => PollOutcome::Stale,
                Err(e) => {
                    if report_faults {
                        let message = format!("Error in data received handler: {}", e);
                        warn!("{}", message);
                        events.push(Pending::Status(ConnectionEvent::new(
                            state.channel.is_some(),
                            message,
                            Some(Arc::new(e)),
                        )));
                    }
                    PollOutcome::Faulted
                }
            }
        };
        self.notifier.publish(events);
        outcome
    }
}

/// Mode switch on an open port. The mode only becomes Response once the
/// notifier is running; if it cannot start, the port stays in
/// Acknowledgment mode.
fn switch_open_mode<F>(
    state: &mut SessionState,
    mode: ReceiveMode,
    effects: &mut Effects,
    start_notifier: F,
) -> OperationResult
where
    F: FnOnce(&mut SessionState) -> Result<(), SessionError>,
{
    Shared::unsubscribe(state, effects);
    if mode == ReceiveMode::Response {
        if let Err(e) = start_notifier(state) {
            state.mode = ReceiveMode::Acknowledgment;
            let message = format!(
                "Failed to start receive notifier, staying in {} mode: {}",
                state.mode, e
            );
            warn!("{}", message);
            return OperationResult::failed(message, e);
        }
    }
    state.mode = mode;
    debug!("receive mode now {}", mode);
    OperationResult::successful(format!("Receive mode set to {}", mode))
}

/// A serial session owning at most one open port.
///
/// Every operation returns a result value instead of an error; failures
/// carry a message for display and the underlying [`SessionError`].
/// All methods take `&self` and may be called from any thread.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Create a closed session in Response mode
    pub fn new(backend: Arc<dyn PortBackend>, options: SessionOptions) -> Self {
        let notifier = Notifier::new(options.event_capacity);
        Self {
            shared: Arc::new(Shared {
                backend,
                options,
                notifier,
                state: Mutex::new(SessionState {
                    channel: None,
                    config: None,
                    mode: ReceiveMode::Response,
                    watcher: None,
                    generation: 0,
                    disposed: false,
                }),
            }),
        }
    }

    /// Session over the machine's real serial ports with default options
    pub fn system() -> Self {
        Self::new(Arc::new(SystemBackend::new()), SessionOptions::default())
    }

    /// Session options
    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    /// Encoding used for `decoded_text` on received data
    pub fn text_encoding(&self) -> TextEncoding {
        self.shared.options.text_encoding
    }

    /// Receive data events. Delivery may happen on the notifier thread.
    pub fn subscribe_data(&self) -> broadcast::Receiver<DataEvent> {
        self.shared.notifier.subscribe_data()
    }

    /// Receive connection status events
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.notifier.subscribe_status()
    }

    /// Whether a port is currently open
    pub fn is_connected(&self) -> bool {
        self.shared.lock().channel.is_some()
    }

    /// Configuration of the last successful open
    pub fn current_configuration(&self) -> Option<PortConfiguration> {
        self.shared.lock().config.clone()
    }

    /// Active receive mode
    pub fn receive_mode(&self) -> ReceiveMode {
        self.shared.lock().mode
    }

    /// Names of the available ports. Never fails: on enumeration failure
    /// the list is empty and a status event carries the error.
    pub fn list_ports(&self) -> Vec<String> {
        self.list_port_details()
            .into_iter()
            .map(|port| port.name)
            .collect()
    }

    /// Available ports with USB details where the OS reports them
    pub fn list_port_details(&self) -> Vec<PortInfo> {
        match self.shared.backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                let message = format!("Failed to get available ports: {}", e);
                warn!("{}", message);
                let error = Arc::new(SessionError::io(IoOperation::Enumerate, e));
                self.shared
                    .notifier
                    .publish(vec![Pending::Status(ConnectionEvent::new(
                        false,
                        message,
                        Some(error),
                    ))]);
                Vec::new()
            }
        }
    }

    /// Open a port, closing any port already open first
    pub fn open(&self, config: PortConfiguration) -> OperationResult {
        let mut effects = Effects::default();
        let result = {
            let mut state = self.shared.lock();
            if state.disposed {
                return OperationResult::from_error(SessionError::AlreadyDisposed);
            }
            self.shared.open_locked(&mut state, config, &mut effects)
        };
        self.shared.finish(effects);
        result
    }

    /// Close the port. Closing a closed session succeeds. A failed close
    /// is reported, but the session is Closed afterwards either way.
    pub fn close(&self) -> OperationResult {
        let mut effects = Effects::default();
        let result = {
            let mut state = self.shared.lock();
            if state.disposed {
                return OperationResult::from_error(SessionError::AlreadyDisposed);
            }
            Shared::close_locked(&mut state, &mut effects)
        };
        self.shared.finish(effects);
        result
    }

    /// Write all of `data`
    pub fn send(&self, data: &[u8]) -> OperationResult {
        if data.is_empty() {
            return OperationResult::from_error(SessionError::EmptyPayload);
        }

        let mut state = self.shared.lock();
        if state.disposed {
            return OperationResult::from_error(SessionError::AlreadyDisposed);
        }

        match state.write(data) {
            Ok(()) => {
                debug!("sent {} bytes: {}", data.len(), bytes_to_hex(data, " "));
                OperationResult::successful(format!("Sent {} bytes successfully", data.len()))
            }
            Err(SessionError::NotConnected) => {
                OperationResult::from_error(SessionError::NotConnected)
            }
            Err(e) => OperationResult::failed(format!("Failed to send data: {}", e), e),
        }
    }

    /// Encode `text` and send it
    pub fn send_text(&self, text: &str, encoding: TextEncoding) -> OperationResult {
        self.send(&text_to_bytes(text, encoding))
    }

    /// Parse `text` as hex and send it. Malformed hex is never sent.
    pub fn send_hex(&self, text: &str) -> OperationResult {
        match hex_to_bytes(text) {
            Ok(bytes) => self.send(&bytes),
            Err(e) => OperationResult::failed(
                format!("Invalid hex string format: {}", e),
                SessionError::InvalidFormat(e),
            ),
        }
    }

    /// Read whatever is currently buffered. An empty buffer is a
    /// successful, empty outcome.
    pub fn read(&self) -> ReadOutcome {
        let mut state = self.shared.lock();
        if state.disposed {
            return ReadOutcome::failed(
                SessionError::AlreadyDisposed.to_string(),
                SessionError::AlreadyDisposed,
            );
        }

        match state.read_pending() {
            Ok(bytes) => ReadOutcome::data(bytes, self.shared.options.text_encoding),
            Err(SessionError::NotConnected) => ReadOutcome::failed(
                SessionError::NotConnected.to_string(),
                SessionError::NotConnected,
            ),
            Err(e) => ReadOutcome::failed(format!("Failed to read data: {}", e), e),
        }
    }

    /// Switch receive mode. While open, the Response-mode subscription is
    /// dropped and re-created only if the new mode is Response.
    pub fn set_receive_mode(&self, mode: ReceiveMode) -> OperationResult {
        let mut effects = Effects::default();
        let result = {
            let mut state = self.shared.lock();
            if state.disposed {
                return OperationResult::from_error(SessionError::AlreadyDisposed);
            }

            if state.channel.is_some() {
                switch_open_mode(&mut state, mode, &mut effects, |state| {
                    self.shared.subscribe(state)
                })
            } else {
                state.mode = mode;
                OperationResult::successful(format!("Receive mode set to {}", mode))
            }
        };
        self.shared.finish(effects);
        result
    }

    /// Release the port and shut the session down. Idempotent and never
    /// fails; later operations report [`SessionError::AlreadyDisposed`].
    pub fn dispose(&self) {
        let mut effects = Effects::default();
        {
            let mut state = self.shared.lock();
            if state.disposed {
                return;
            }
            Shared::unsubscribe(&mut state, &mut effects);
            if let Some(channel) = state.channel.take() {
                if let Err(e) = channel.close() {
                    warn!("error closing serial port during dispose: {}", e);
                }
                effects.status(false, "Serial port closed (session disposed)", None);
            }
            state.disposed = true;
        }
        self.shared.finish(effects);
    }

    /// Whether [`Session::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::system()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackBackend;
    use std::io;

    fn open_state(mode: ReceiveMode) -> SessionState {
        let backend = LoopbackBackend::with_ports(["LOOP0"]);
        let channel = backend
            .open(&PortConfiguration::new("LOOP0", 9600))
            .unwrap();
        SessionState {
            channel: Some(channel),
            config: None,
            mode,
            watcher: None,
            generation: 0,
            disposed: false,
        }
    }

    #[test]
    fn test_notifier_start_failure_falls_back_to_acknowledgment() {
        let mut state = open_state(ReceiveMode::Acknowledgment);
        let mut effects = Effects::default();

        let result = switch_open_mode(&mut state, ReceiveMode::Response, &mut effects, |_| {
            Err(SessionError::io(
                IoOperation::Subscribe,
                io::Error::new(io::ErrorKind::Other, "no threads left"),
            ))
        });

        assert!(!result.success);
        assert!(matches!(
            result.error(),
            Some(SessionError::Io {
                op: IoOperation::Subscribe,
                ..
            })
        ));
        assert_eq!(state.mode, ReceiveMode::Acknowledgment);
        assert!(state.watcher.is_none());
        assert!(state.channel.is_some());
        assert!(effects.events.is_empty());
    }

    #[test]
    fn test_switch_to_response_starts_notifier_once() {
        let mut state = open_state(ReceiveMode::Acknowledgment);
        let mut effects = Effects::default();
        let mut starts = 0;

        let result = switch_open_mode(&mut state, ReceiveMode::Response, &mut effects, |_| {
            starts += 1;
            Ok(())
        });

        assert!(result.success);
        assert_eq!(starts, 1);
        assert_eq!(state.mode, ReceiveMode::Response);
    }

    #[test]
    fn test_switch_to_acknowledgment_never_starts_notifier() {
        let mut state = open_state(ReceiveMode::Response);
        let mut effects = Effects::default();

        let result = switch_open_mode(
            &mut state,
            ReceiveMode::Acknowledgment,
            &mut effects,
            |_| panic!("notifier must not start in acknowledgment mode"),
        );

        assert!(result.success);
        assert_eq!(state.mode, ReceiveMode::Acknowledgment);
        assert!(state.generation > 0);
    }
}
