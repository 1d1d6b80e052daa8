//! # Reactor
//!
//! Readiness multiplexer mapping descriptors to callbacks.
//!
//! ## Key Concepts
//! - Registrations live in one mutex scoped to the reactor instance.
//!   Callbacks are always invoked after that lock is released, so a callback
//!   may add or remove descriptors, including its own.
//! - The largest registered descriptor is tracked; it is `None` exactly when
//!   nothing is registered.
//! - A self-pipe waker is always part of the wait set. Registration changes,
//!   [`Reactor::wake`] and [`Reactor::stop`] interrupt a thread blocked in
//!   [`Reactor::wait`], so the waiter re-snapshots.
//!
//! ## Design Principles
//! - [`Reactor::run`] is the single-threaded loop; the leader/followers pool
//!   drives [`Reactor::snapshot`] and [`Reactor::wait`] itself so it can hand
//!   off leadership between readiness and callback execution.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{error, info, warn};

use super::sys::{self, Waker, POLLERR, POLLHUP, POLLIN, POLLNVAL};
use crate::error::ReactorError;
use crate::{log_reactor, panic_message};

/// Descriptors at or above this value are rejected.
pub const MAX_FDS: RawFd = 1024;

/// Invoked with the ready descriptor. `Break` asks the dispatcher not to
/// re-register the descriptor (the connection is finished).
pub type Callback = Arc<dyn Fn(RawFd) -> ControlFlow<()> + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(RawFd) -> ControlFlow<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct ReactorState {
    callbacks: BTreeMap<RawFd, Callback>,
    max_fd: Option<RawFd>,
    running: bool,
}

/// Outcome of one [`Reactor::wait`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Descriptors that are readable, hung up, or in error
    pub ready: Vec<RawFd>,
    /// Descriptors the OS reported as not open
    pub invalid: Vec<RawFd>,
    /// The waker fired
    pub woken: bool,
}

pub struct Reactor {
    state: Mutex<ReactorState>,
    waker: Waker,
}

impl Reactor {
    /// Allocates an empty, running reactor.
    pub fn start() -> Result<Self, ReactorError> {
        let waker = Waker::new().map_err(ReactorError::Setup)?;
        info!("reactor started");
        Ok(Self {
            state: Mutex::new(ReactorState {
                callbacks: BTreeMap::new(),
                max_fd: None,
                running: true,
            }),
            waker,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ReactorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fd(fd: RawFd) -> Result<(), ReactorError> {
        if (0..MAX_FDS).contains(&fd) {
            Ok(())
        } else {
            Err(ReactorError::InvalidDescriptor(fd))
        }
    }

    /// Registers `fd`, replacing any callback it already had.
    pub fn add_fd(&self, fd: RawFd, callback: Callback) -> Result<(), ReactorError> {
        Self::check_fd(fd)?;
        {
            let mut state = self.lock();
            if !state.running {
                return Err(ReactorError::Stopped);
            }
            state.callbacks.insert(fd, callback);
            state.max_fd = Some(state.max_fd.map_or(fd, |max| max.max(fd)));
            log_reactor!(fd, "added", max_fd = state.max_fd.unwrap_or(-1));
        }
        self.waker.wake();
        Ok(())
    }

    /// Unregisters `fd` and returns the new largest descriptor, `None` when
    /// the reactor is empty. Removing an unregistered descriptor is a no-op.
    pub fn remove_fd(&self, fd: RawFd) -> Result<Option<RawFd>, ReactorError> {
        Self::check_fd(fd)?;
        let max_fd = {
            let mut state = self.lock();
            if state.callbacks.remove(&fd).is_some() && state.max_fd == Some(fd) {
                state.max_fd = state.callbacks.keys().next_back().copied();
            }
            log_reactor!(fd, "removed", max_fd = state.max_fd.unwrap_or(-1));
            state.max_fd
        };
        self.waker.wake();
        Ok(max_fd)
    }

    pub fn max_fd(&self) -> Option<RawFd> {
        self.lock().max_fd
    }

    pub fn callback(&self, fd: RawFd) -> Option<Callback> {
        self.lock().callbacks.get(&fd).cloned()
    }

    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.lock().callbacks.contains_key(&fd)
    }

    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().callbacks.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Registered descriptors, taken under the lock. Empty once stopped.
    pub fn snapshot(&self) -> Vec<RawFd> {
        let state = self.lock();
        if !state.running {
            return Vec::new();
        }
        state.callbacks.keys().copied().collect()
    }

    /// Blocks until one of `fds` or the waker is ready, or `timeout` elapses.
    ///
    /// No lock is held while waiting.
    pub fn wait(&self, fds: &[RawFd], timeout: Option<Duration>) -> Result<Readiness, ReactorError> {
        let mut pollfds = Vec::with_capacity(fds.len() + 1);
        pollfds.push(sys::poll_entry(self.waker.fd(), POLLIN));
        pollfds.extend(fds.iter().map(|fd| sys::poll_entry(*fd, POLLIN)));

        sys::poll(&mut pollfds, timeout).map_err(ReactorError::Wait)?;

        let mut readiness = Readiness::default();
        if pollfds[0].revents != 0 {
            self.waker.drain();
            readiness.woken = true;
        }
        for entry in &pollfds[1..] {
            if entry.revents & POLLNVAL != 0 {
                readiness.invalid.push(entry.fd);
            } else if entry.revents & (POLLIN | POLLHUP | POLLERR) != 0 {
                readiness.ready.push(entry.fd);
            }
        }
        Ok(readiness)
    }

    /// Unregisters descriptors the OS no longer recognises.
    pub fn prune(&self, invalid: &[RawFd]) {
        for fd in invalid {
            warn!(fd, "descriptor closed while registered, removing");
            let _ = self.remove_fd(*fd);
        }
    }

    /// Interrupts a thread blocked in [`Reactor::wait`].
    pub fn wake(&self) {
        self.waker.wake();
    }

    /// One snapshot/wait/dispatch round. Returns the number of callbacks run.
    pub fn poll_once(&self, timeout: Option<Duration>) -> Result<usize, ReactorError> {
        if !self.is_running() {
            return Err(ReactorError::Stopped);
        }
        let fds = self.snapshot();
        let readiness = self.wait(&fds, timeout)?;
        self.prune(&readiness.invalid);

        let mut dispatched = 0;
        for fd in readiness.ready {
            let Some(callback) = self.callback(fd) else {
                continue;
            };
            log_reactor!(fd, "ready");
            dispatched += 1;
            if let ControlFlow::Break(()) = invoke(&callback, fd) {
                let _ = self.remove_fd(fd);
            }
        }
        Ok(dispatched)
    }

    /// Dispatch loop; returns once [`Reactor::stop`] is called.
    pub fn run(&self) -> Result<(), ReactorError> {
        while self.is_running() {
            match self.poll_once(None) {
                Ok(_) | Err(ReactorError::Stopped) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Clears all registrations and releases waiters. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.callbacks.clear();
            state.max_fd = None;
        }
        self.waker.wake();
        info!("reactor stopped");
    }
}

/// Runs a callback, converting a panic into `Break`.
pub(crate) fn invoke(callback: &Callback, fd: RawFd) -> ControlFlow<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(fd))) {
        Ok(flow) => flow,
        Err(payload) => {
            error!(fd, panic = %panic_message(payload.as_ref()), "reactor callback panicked");
            ControlFlow::Break(())
        }
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Reactor")
            .field("registered", &state.callbacks.len())
            .field("max_fd", &state.max_fd)
            .field("running", &state.running)
            .finish()
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}
