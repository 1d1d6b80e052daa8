//! # Leader/Followers Pool
//!
//! N worker threads take turns being the single thread that waits on the
//! shared [`Reactor`]. When a descriptor becomes ready the leader claims it,
//! promotes a follower, and only then runs the callback, so event
//! processing overlaps with the next leader's wait.
//!
//! ## Implementation Details
//! ### Leader turn
//! 1. Acquire the [`LeaderToken`]
//! 2. If the pool is stopping, release and exit (the release admits the next
//!    waiter, so shutdown cascades through every worker)
//! 3. If a queued task exists, promote a follower and run the task
//! 4. Snapshot the reactor and wait on it without holding any lock
//! 5. On a ready descriptor: take its callback, remove it from the reactor so
//!    no other leader can claim it, promote a follower, run the callback,
//!    then re-register the descriptor with the same callback
//! 6. On a spurious wake or a wait failure: release and start over
//!
//! ### Safety Considerations
//! - Panicking tasks and callbacks are caught; a panicking callback's
//!   descriptor is not re-registered

use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;
use tracing::{debug, error, info, warn};

use super::reactor::{self, Callback, Reactor};
use super::token::LeaderToken;
use crate::config::{validate_threads, LeaderFollowersConfig};
use crate::error::{ReactorError, SystemError};
use crate::{log_error, log_reactor, panic_message};

/// Work item run by whichever thread is leader.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Pool-wide counters.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub events_dispatched: AtomicUsize,
    pub tasks_run: AtomicUsize,
    pub spurious_wakeups: AtomicUsize,
    pub wait_errors: AtomicUsize,
}

struct Shared {
    reactor: Arc<Reactor>,
    token: LeaderToken,
    tasks: SegQueue<Task>,
    running: AtomicBool,
    stats: PoolStats,
}

pub struct LeaderFollowersPool {
    shared: Arc<Shared>,
    config: LeaderFollowersConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LeaderFollowersPool {
    /// Creates a pool around a fresh reactor.
    pub fn new(config: LeaderFollowersConfig) -> Result<Self, SystemError> {
        let reactor = Arc::new(Reactor::start()?);
        Ok(Self::with_reactor(reactor, config))
    }

    /// Creates a pool that drives an existing reactor.
    pub fn with_reactor(reactor: Arc<Reactor>, config: LeaderFollowersConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                reactor,
                token: LeaderToken::new(),
                tasks: SegQueue::new(),
                running: AtomicBool::new(false),
                stats: PoolStats::default(),
            }),
            config,
            workers: Mutex::new(Vec::new()),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns `num_threads` workers.
    pub fn start(&self, num_threads: usize) -> Result<(), SystemError> {
        validate_threads(num_threads)?;
        let mut workers = self.workers();
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SystemError::AlreadyRunning);
        }

        for index in 0..num_threads {
            let shared = Arc::clone(&self.shared);
            let name = format!("{}{}", self.config.thread_name_prefix, index);
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    error!(thread = %name, error = %err, "failed to spawn worker");
                    drop(workers);
                    self.stop();
                    return Err(SystemError::ThreadSpawn(err.to_string()));
                }
            }
        }
        info!(threads = num_threads, "leader/followers pool started");
        Ok(())
    }

    /// Signals shutdown and joins every worker. Idempotent.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.reactor.wake();

        let handles: Vec<_> = self.workers().drain(..).collect();
        let count = handles.len();
        for handle in handles {
            if let Err(payload) = handle.join() {
                error!(panic = %panic_message(payload.as_ref()), "worker thread panicked");
            }
        }
        if count > 0 {
            info!(threads = count, "leader/followers pool stopped");
        }
    }

    /// Queues `task` for the next leader and wakes the current one.
    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.tasks.push(Box::new(task));
        self.shared.reactor.wake();
    }

    pub fn add_fd(&self, fd: RawFd, callback: Callback) -> Result<(), ReactorError> {
        self.shared.reactor.add_fd(fd, callback)
    }

    pub fn remove_fd(&self, fd: RawFd) -> Result<Option<RawFd>, ReactorError> {
        self.shared.reactor.remove_fd(fd)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// True when the calling thread currently leads.
    pub fn is_leader(&self) -> bool {
        self.shared.token.is_leader()
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.shared.reactor
    }

    pub fn token(&self) -> &LeaderToken {
        &self.shared.token
    }

    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.len()
    }
}

impl Drop for LeaderFollowersPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        shared.token.acquire();

        if !shared.running.load(Ordering::SeqCst) {
            shared.token.release();
            break;
        }

        if let Some(task) = shared.tasks.pop() {
            promote(shared);
            run_task(shared, task);
            continue;
        }

        let fds = shared.reactor.snapshot();
        let readiness = match shared.reactor.wait(&fds, None) {
            Ok(readiness) => readiness,
            Err(err) => {
                log_error!(err, component = "leader_followers");
                shared.stats.wait_errors.fetch_add(1, Ordering::Relaxed);
                shared.token.release();
                continue;
            }
        };
        shared.reactor.prune(&readiness.invalid);

        let claimed = readiness
            .ready
            .iter()
            .find_map(|fd| shared.reactor.callback(*fd).map(|cb| (*fd, cb)));

        let Some((fd, callback)) = claimed else {
            shared.stats.spurious_wakeups.fetch_add(1, Ordering::Relaxed);
            shared.token.release();
            continue;
        };

        let _ = shared.reactor.remove_fd(fd);
        promote(shared);

        log_reactor!(fd, "ready");
        shared.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
        match reactor::invoke(&callback, fd) {
            ControlFlow::Continue(()) => {
                if let Err(err) = shared.reactor.add_fd(fd, callback) {
                    debug!(fd, error = %err, "descriptor not re-registered");
                }
            }
            ControlFlow::Break(()) => {
                log_reactor!(fd, "closed");
            }
        }
    }
}

fn promote(shared: &Shared) {
    if let Err(err) = shared.token.promote_follower() {
        warn!(error = %err, "leadership handoff failed");
    }
}

fn run_task(shared: &Shared, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(panic = %panic_message(payload.as_ref()), "pool task panicked");
    }
    shared.stats.tasks_run.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn config() -> LeaderFollowersConfig {
        LeaderFollowersConfig {
            num_threads: 3,
            thread_name_prefix: "lf-test-".to_string(),
        }
    }

    #[test]
    fn test_tasks_run_on_pool() {
        let pool = LeaderFollowersPool::new(config()).unwrap();
        pool.start(3).unwrap();

        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.add_task(move || tx.send(i).unwrap());
        }
        let mut seen: Vec<_> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        pool.stop();
        assert!(!pool.is_running());
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = LeaderFollowersPool::new(config()).unwrap();
        pool.start(1).unwrap();

        pool.add_task(|| panic!("task failure"));
        let (tx, rx) = mpsc::channel();
        pool.add_task(move || tx.send(()).unwrap());

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.stop();
    }

    #[test]
    fn test_double_start_rejected() {
        let pool = LeaderFollowersPool::new(config()).unwrap();
        pool.start(2).unwrap();
        assert!(matches!(pool.start(2), Err(SystemError::AlreadyRunning)));
        assert!(matches!(pool.start(0), Err(SystemError::InvalidConfig(_))));
        pool.stop();
        pool.stop();
    }
}
