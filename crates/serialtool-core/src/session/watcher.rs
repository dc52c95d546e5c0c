//! Response-mode receive notifier
//!
//! `serialport` exposes no "data available" callback, so a dedicated thread
//! checks the receive buffer every poll interval and hands off to the
//! session's handler. Each notifier is bound to one subscription
//! generation; once the session moves past that generation the handler
//! refuses to run and the thread exits.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::lifecycle::Shared;

/// What one handler invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    /// Nothing pending
    Idle,
    /// Bytes were read and published
    Delivered,
    /// The read failed
    Faulted,
    /// The subscription is no longer current
    Stale,
}

pub(crate) struct Watcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub(crate) fn spawn(
        shared: Weak<Shared>,
        generation: u64,
        interval: Duration,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("serial-rx-{}", generation))
            .spawn(move || run(shared, generation, interval, flag))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the thread to exit without waiting for it
    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    /// Wait for the thread to exit. Must not be called with the session
    /// lock held, since the thread may be waiting on it.
    pub(crate) fn join(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("receive notifier thread panicked");
            }
        }
    }
}

fn run(shared: Weak<Shared>, generation: u64, interval: Duration, stop: Arc<AtomicBool>) {
    tracing::debug!(generation, "receive notifier started");
    // Only the first failure of a streak is reported
    let mut faulted = false;

    loop {
        thread::park_timeout(interval);
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match shared.handle_data_available(generation, !faulted) {
            PollOutcome::Stale => break,
            PollOutcome::Faulted => faulted = true,
            PollOutcome::Idle | PollOutcome::Delivered => faulted = false,
        }
    }

    tracing::debug!(generation, "receive notifier stopped");
}
