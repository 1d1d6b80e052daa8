//! # Handle Set
//!
//! Registry of `(handle, event type) -> handler` entries, each with a
//! suspended flag. A suspended entry is never waited on and never
//! dispatched to.
//!
//! Handlers always run with the registry lock released, so a handler may
//! register or remove entries (an accept handler registers every new
//! client from inside its own dispatch).

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tandem_api::{Disposition, EventHandler, EventType, Handle};
use tracing::{debug, error, warn};

use super::sys::{self, Waker, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, POLLPRI};
use crate::error::ReactorError;
use crate::panic_message;

/// Handlers claimed for one dispatch, see [`HandleSet::claim`].
pub type Claimed = Vec<(EventType, Arc<dyn EventHandler>)>;

struct Entry {
    handler: Arc<dyn EventHandler>,
    suspended: bool,
}

pub struct HandleSet {
    entries: Mutex<BTreeMap<(Handle, EventType), Entry>>,
    waker: Waker,
}

fn interest(event: EventType) -> i16 {
    if event.wants_read() {
        POLLIN
    } else if event.wants_write() {
        POLLOUT
    } else {
        POLLPRI
    }
}

impl HandleSet {
    pub fn new() -> Result<Self, ReactorError> {
        Ok(Self {
            entries: Mutex::new(BTreeMap::new()),
            waker: Waker::new().map_err(ReactorError::Setup)?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(Handle, EventType), Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` for `event` on `handle`, replacing any existing
    /// entry. Returns false for an invalid handle.
    pub fn register_handler(&self, handle: Handle, event: EventType, handler: Arc<dyn EventHandler>) -> bool {
        if !handle.is_valid() {
            warn!(%handle, "refusing to register invalid handle");
            return false;
        }
        self.lock().insert(
            (handle, event),
            Entry {
                handler,
                suspended: false,
            },
        );
        debug!(%handle, ?event, "handler registered");
        self.waker.wake();
        true
    }

    pub fn remove_handler(&self, handle: Handle, event: EventType) -> bool {
        let removed = self.lock().remove(&(handle, event)).is_some();
        if removed {
            debug!(%handle, ?event, "handler removed");
            self.waker.wake();
        }
        removed
    }

    /// Removes every entry on `handle`, returning how many there were.
    pub fn remove_handle(&self, handle: Handle) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(h, _), _| *h != handle);
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            self.waker.wake();
        }
        removed
    }

    /// Drops every registration, returning how many there were.
    pub fn clear(&self) -> usize {
        let entries = std::mem::take(&mut *self.lock());
        self.waker.wake();
        entries.len()
    }

    pub fn suspend_handler(&self, handle: Handle, event: EventType) -> bool {
        self.set_suspended(handle, event, true)
    }

    pub fn resume_handler(&self, handle: Handle, event: EventType) -> bool {
        self.set_suspended(handle, event, false)
    }

    fn set_suspended(&self, handle: Handle, event: EventType, suspended: bool) -> bool {
        let found = match self.lock().get_mut(&(handle, event)) {
            Some(entry) => {
                entry.suspended = suspended;
                true
            }
            None => false,
        };
        if found {
            self.waker.wake();
        }
        found
    }

    pub fn is_registered(&self, handle: Handle, event: EventType) -> bool {
        self.lock().contains_key(&(handle, event))
    }

    pub fn is_suspended(&self, handle: Handle, event: EventType) -> Option<bool> {
        self.lock().get(&(handle, event)).map(|entry| entry.suspended)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Entries that are currently waited on.
    pub fn active_len(&self) -> usize {
        self.lock().values().filter(|entry| !entry.suspended).count()
    }

    /// Waits for activity on any non-suspended entry and returns its handle.
    ///
    /// Returns [`Handle::INVALID`] immediately when nothing is active, and
    /// also on timeout, wake-up, or wait failure. Handles the OS reports as
    /// closed are unregistered.
    pub fn wait_for_events(&self, timeout: Option<Duration>) -> Handle {
        let mut pollfds = vec![sys::poll_entry(self.waker.fd(), POLLIN)];
        {
            let entries = self.lock();
            for ((handle, event), entry) in entries.iter() {
                if entry.suspended {
                    continue;
                }
                match pollfds.last_mut() {
                    Some(last) if last.fd == handle.raw() => last.events |= interest(*event),
                    _ => pollfds.push(sys::poll_entry(handle.raw(), interest(*event))),
                }
            }
        }
        if pollfds.len() == 1 {
            return Handle::INVALID;
        }

        if let Err(err) = sys::poll(&mut pollfds, timeout) {
            error!(error = %err, "handle set wait failed");
            return Handle::INVALID;
        }

        if pollfds[0].revents != 0 {
            self.waker.drain();
        }
        let mut ready = Handle::INVALID;
        for entry in &pollfds[1..] {
            if entry.revents & POLLNVAL != 0 {
                let handle = Handle::new(entry.fd);
                warn!(%handle, "handle closed while registered, removing");
                self.remove_handle(handle);
            } else if entry.revents & (entry.events | POLLERR | POLLHUP) != 0 && !ready.is_valid() {
                ready = Handle::new(entry.fd);
            }
        }
        ready
    }

    /// Blocks until the registry changes or `timeout` elapses.
    pub fn wait_for_change(&self, timeout: Duration) {
        let mut pollfds = [sys::poll_entry(self.waker.fd(), POLLIN)];
        if let Ok(n) = sys::poll(&mut pollfds, Some(timeout)) {
            if n > 0 {
                self.waker.drain();
            }
        }
    }

    /// Interrupts a thread blocked in [`HandleSet::wait_for_events`].
    pub fn wake(&self) {
        self.waker.wake();
    }

    /// Invokes every non-suspended handler registered on `handle`.
    ///
    /// Returns false when a handler asked for the handle to be closed; the
    /// caller owns that cleanup.
    pub fn dispatch_event(&self, handle: Handle) -> bool {
        let handlers: Claimed = self
            .lock()
            .range((handle, EventType::Read)..=(handle, EventType::Connect))
            .filter(|(_, entry)| !entry.suspended)
            .map(|((_, event), entry)| (*event, Arc::clone(&entry.handler)))
            .collect();
        self.run_handlers(handle, &handlers)
    }

    /// Suspends every active entry on `handle` and returns their handlers, so
    /// no other thread can be handed the same readiness while they run.
    pub fn claim(&self, handle: Handle) -> Claimed {
        self.lock()
            .range_mut((handle, EventType::Read)..=(handle, EventType::Connect))
            .filter(|(_, entry)| !entry.suspended)
            .map(|((_, event), entry)| {
                entry.suspended = true;
                (*event, Arc::clone(&entry.handler))
            })
            .collect()
    }

    /// Runs handlers obtained from [`HandleSet::claim`].
    pub fn dispatch_claimed(&self, handle: Handle, claimed: &Claimed) -> bool {
        self.run_handlers(handle, claimed)
    }

    /// Resumes the claimed entries that are still registered with the same handler.
    pub fn release_claim(&self, handle: Handle, claimed: &Claimed) {
        {
            let mut entries = self.lock();
            for (event, handler) in claimed {
                if let Some(entry) = entries.get_mut(&(handle, *event)) {
                    if Arc::ptr_eq(&entry.handler, handler) {
                        entry.suspended = false;
                    }
                }
            }
        }
        self.waker.wake();
    }

    fn run_handlers(&self, handle: Handle, handlers: &Claimed) -> bool {
        let mut healthy = true;
        for (event, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_event(handle, *event))) {
                Ok(Ok(Disposition::Keep)) => {}
                Ok(Ok(Disposition::Close)) => healthy = false,
                Ok(Err(err)) => {
                    error!(%handle, ?event, error = %err, "event handler failed");
                }
                Err(payload) => {
                    error!(%handle, ?event, panic = %panic_message(payload.as_ref()), "event handler panicked");
                    healthy = false;
                }
            }
        }
        healthy
    }
}

impl fmt::Debug for HandleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.lock();
        f.debug_struct("HandleSet")
            .field("entries", &entries.len())
            .field("suspended", &entries.values().filter(|e| e.suspended).count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tandem_api::handler::HandlerResult;

    struct Counting {
        handle: Handle,
        stream: UnixStream,
        calls: AtomicUsize,
        outcome: Disposition,
    }

    impl EventHandler for Counting {
        fn handle_event(&self, _handle: Handle, _event: EventType) -> HandlerResult {
            let mut buf = [0u8; 16];
            let _ = (&self.stream).read(&mut buf);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome)
        }

        fn handle(&self) -> Handle {
            self.handle
        }
    }

    fn counting(outcome: Disposition) -> (Arc<Counting>, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let handler = Arc::new(Counting {
            handle: Handle::new(ours.as_raw_fd()),
            stream: ours,
            calls: AtomicUsize::new(0),
            outcome,
        });
        (handler, theirs)
    }

    #[test]
    fn test_register_suspend_resume_remove() {
        let set = HandleSet::new().unwrap();
        let (handler, _peer) = counting(Disposition::Keep);
        let handle = handler.handle();

        assert!(!set.register_handler(Handle::INVALID, EventType::Read, handler.clone()));
        assert!(set.register_handler(handle, EventType::Read, handler.clone()));
        assert!(set.suspend_handler(handle, EventType::Read));
        assert_eq!(set.is_suspended(handle, EventType::Read), Some(true));
        assert!(set.resume_handler(handle, EventType::Read));
        assert!(!set.suspend_handler(handle, EventType::Write));
        assert!(set.remove_handler(handle, EventType::Read));
        assert!(!set.remove_handler(handle, EventType::Read));
    }

    #[test]
    fn test_wait_on_empty_set_returns_invalid() {
        let set = HandleSet::new().unwrap();
        assert!(!set.wait_for_events(None).is_valid());
    }

    #[test]
    fn test_wait_and_dispatch() {
        let set = HandleSet::new().unwrap();
        let (handler, mut peer) = counting(Disposition::Keep);
        let handle = handler.handle();
        set.register_handler(handle, EventType::Read, handler.clone());

        peer.write_all(b"ping").unwrap();
        let mut ready = Handle::INVALID;
        for _ in 0..10 {
            ready = set.wait_for_events(Some(Duration::from_secs(1)));
            if ready.is_valid() {
                break;
            }
        }
        assert_eq!(ready, handle);
        assert!(set.dispatch_event(ready));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_suspended_entry_is_not_dispatched() {
        let set = HandleSet::new().unwrap();
        let (handler, _peer) = counting(Disposition::Keep);
        let handle = handler.handle();
        set.register_handler(handle, EventType::Read, handler.clone());
        set.suspend_handler(handle, EventType::Read);

        assert!(set.dispatch_event(handle));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_disposition_reported() {
        let set = HandleSet::new().unwrap();
        let (handler, _peer) = counting(Disposition::Close);
        let handle = handler.handle();
        set.register_handler(handle, EventType::Read, handler.clone());

        assert!(!set.dispatch_event(handle));
        // cleanup is left to the caller
        assert!(set.is_registered(handle, EventType::Read));
    }

    #[test]
    fn test_claim_and_release() {
        let set = HandleSet::new().unwrap();
        let (handler, _peer) = counting(Disposition::Keep);
        let handle = handler.handle();
        set.register_handler(handle, EventType::Read, handler.clone());

        let claimed = set.claim(handle);
        assert_eq!(claimed.len(), 1);
        assert!(set.claim(handle).is_empty());
        assert_eq!(set.active_len(), 0);

        assert!(set.dispatch_claimed(handle, &claimed));
        set.release_claim(handle, &claimed);
        assert_eq!(set.active_len(), 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
