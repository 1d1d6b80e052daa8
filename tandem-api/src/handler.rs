//! Handle set vocabulary: OS handles, the readiness kinds a handler can be
//! registered for, and the handler interface itself.

use std::error::Error;
use std::fmt;
use std::os::fd::RawFd;

/// Thin wrapper around an OS descriptor. Negative values are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(RawFd);

impl Handle {
    pub const INVALID: Handle = Handle(-1);

    pub fn new(fd: RawFd) -> Self {
        Self(fd)
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<RawFd> for Handle {
    fn from(fd: RawFd) -> Self {
        Self(fd)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Kind of readiness a handler is registered for.
///
/// `Accept` is read readiness on a listening socket and `Connect` is write
/// readiness on a connecting one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    Read,
    Write,
    Exception,
    Accept,
    Connect,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Read,
        EventType::Write,
        EventType::Exception,
        EventType::Accept,
        EventType::Connect,
    ];

    /// True for kinds that wait on read readiness.
    pub fn wants_read(&self) -> bool {
        matches!(self, Self::Read | Self::Accept)
    }

    /// True for kinds that wait on write readiness.
    pub fn wants_write(&self) -> bool {
        matches!(self, Self::Write | Self::Connect)
    }
}

/// What the dispatcher should do with a handle after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the registration.
    Keep,
    /// The handle is finished (peer closed, fatal read error); its entries
    /// should be removed by whoever owns the registrations.
    Close,
}

pub type HandlerResult = Result<Disposition, Box<dyn Error + Send + Sync>>;

/// Object that reacts to readiness on a handle.
pub trait EventHandler: Send + Sync {
    /// Processes one readiness notification of `event` on `handle`.
    fn handle_event(&self, handle: Handle, event: EventType) -> HandlerResult;

    /// The handle this handler serves.
    fn handle(&self) -> Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_validity() {
        assert!(!Handle::INVALID.is_valid());
        assert!(!Handle::default().is_valid());
        assert!(Handle::new(0).is_valid());
        assert_eq!(Handle::from(7).raw(), 7);
    }

    #[test]
    fn test_event_interest() {
        assert!(EventType::Accept.wants_read());
        assert!(EventType::Connect.wants_write());
        assert!(!EventType::Exception.wants_read());
        assert!(!EventType::Exception.wants_write());
    }
}
