use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::SystemError;

pub const DEFAULT_GUARD_BACKOFF: Duration = Duration::from_millis(10);
pub const DEFAULT_EVENT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_PORT: u16 = 9034;

// --- Active Object ---

/// What the scheduler does with a request whose guard is false.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GuardPolicy {
    #[default]
    /// Park the request and re-check it only after the servant's state
    /// generation changes. Later satisfiable requests are not held behind it.
    Park,
    /// Re-enqueue at the tail and sleep for `backoff` before the next dequeue.
    Requeue { backoff: Duration },
}

/// Configuration for an active-object [`crate::active_object::Scheduler`].
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Activation queue capacity; `None` is unbounded.
    pub queue_capacity: Option<usize>,

    /// Handling of requests whose precondition does not hold yet.
    pub guard_policy: GuardPolicy,

    /// Name given to the dispatch thread.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            guard_policy: GuardPolicy::default(),
            thread_name: "tandem-scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SystemError> {
        if self.queue_capacity == Some(0) {
            return Err(SystemError::InvalidConfig("queue capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

// --- Leader/Followers ---

/// Configuration for [`crate::leader_followers::LeaderFollowersPool`].
#[derive(Clone, Debug)]
pub struct LeaderFollowersConfig {
    /// Number of worker threads contending for leadership.
    pub num_threads: usize,

    /// Worker threads are named `{prefix}{index}`.
    pub thread_name_prefix: String,
}

impl Default for LeaderFollowersConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            thread_name_prefix: "tandem-lf-worker-".to_string(),
        }
    }
}

/// Configuration for [`crate::leader_followers::HandleSetPool`].
#[derive(Clone, Debug)]
pub struct HandleSetPoolConfig {
    pub num_threads: usize,

    /// Upper bound on one `wait_for_events` call, so a leader notices shutdown.
    pub event_wait_timeout: Duration,

    pub thread_name_prefix: String,
}

impl Default for HandleSetPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            event_wait_timeout: DEFAULT_EVENT_WAIT_TIMEOUT,
            thread_name_prefix: "tandem-hs-worker-".to_string(),
        }
    }
}

pub(crate) fn validate_threads(num_threads: usize) -> Result<(), SystemError> {
    if num_threads == 0 {
        return Err(SystemError::InvalidConfig("thread count must be at least 1".to_string()));
    }
    Ok(())
}

// --- Server ---

/// Dispatch strategy used by the TCP server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ServerStrategy {
    /// Reactor callbacks driven by a leader/followers pool.
    #[default]
    Reactor,
    /// Handle-set registry with accept and command handlers.
    HandleSet,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: IpAddr,
    /// `0` asks the OS for an ephemeral port.
    pub port: u16,
    pub strategy: ServerStrategy,
    pub threads: usize,
    /// Scheduler settings applied to every session's proxy.
    pub scheduler: SchedulerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            strategy: ServerStrategy::default(),
            threads: num_cpus::get(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
