//! # Handle Set Pool
//!
//! Leader/followers over a [`HandleSet`]. The leader waits for a ready
//! handle, claims that handle's handlers, promotes a follower, dispatches,
//! then either resumes the handlers or drops the handle when one of them
//! asked to close it.
//!
//! Waits are bounded by [`HandleSetPoolConfig::event_wait_timeout`] so a
//! leader notices shutdown even if nobody wakes it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_queue::SegQueue;
use tracing::{debug, error, info, warn};

use super::handle_set::HandleSet;
use super::pool::Task;
use super::token::LeaderToken;
use crate::config::{validate_threads, HandleSetPoolConfig};
use crate::error::SystemError;
use crate::panic_message;

/// Handle-set pool counters.
#[derive(Debug, Default)]
pub struct HandleSetPoolStats {
    pub events_dispatched: AtomicUsize,
    pub handles_closed: AtomicUsize,
    pub tasks_run: AtomicUsize,
    pub idle_waits: AtomicUsize,
}

struct Shared {
    handle_set: Arc<HandleSet>,
    token: LeaderToken,
    tasks: SegQueue<Task>,
    running: AtomicBool,
    config: HandleSetPoolConfig,
    stats: HandleSetPoolStats,
}

pub struct HandleSetPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl HandleSetPool {
    pub fn new(config: HandleSetPoolConfig, handle_set: Arc<HandleSet>) -> Self {
        Self {
            shared: Arc::new(Shared {
                handle_set,
                token: LeaderToken::new(),
                tasks: SegQueue::new(),
                running: AtomicBool::new(false),
                config,
                stats: HandleSetPoolStats::default(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the configured number of workers.
    pub fn start(&self) -> Result<(), SystemError> {
        let num_threads = self.shared.config.num_threads;
        validate_threads(num_threads)?;
        let mut workers = self.workers();
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SystemError::AlreadyRunning);
        }

        for index in 0..num_threads {
            let shared = Arc::clone(&self.shared);
            let name = format!("{}{}", self.shared.config.thread_name_prefix, index);
            match thread::Builder::new().name(name.clone()).spawn(move || worker_loop(&shared)) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    error!(thread = %name, error = %err, "failed to spawn worker");
                    drop(workers);
                    self.stop();
                    return Err(SystemError::ThreadSpawn(err.to_string()));
                }
            }
        }
        info!(threads = num_threads, "handle set pool started");
        Ok(())
    }

    /// Signals shutdown and joins every worker. Idempotent.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.handle_set.wake();

        let handles: Vec<_> = self.workers().drain(..).collect();
        let count = handles.len();
        for handle in handles {
            if let Err(payload) = handle.join() {
                error!(panic = %panic_message(payload.as_ref()), "worker thread panicked");
            }
        }
        if count > 0 {
            info!(threads = count, "handle set pool stopped");
        }
    }

    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.tasks.push(Box::new(task));
        self.shared.handle_set.wake();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_leader(&self) -> bool {
        self.shared.token.is_leader()
    }

    pub fn handle_set(&self) -> &Arc<HandleSet> {
        &self.shared.handle_set
    }

    pub fn token(&self) -> &LeaderToken {
        &self.shared.token
    }

    pub fn stats(&self) -> &HandleSetPoolStats {
        &self.shared.stats
    }
}

impl Drop for HandleSetPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared) {
    let timeout = shared.config.event_wait_timeout;
    loop {
        shared.token.acquire();

        if !shared.running.load(Ordering::SeqCst) {
            shared.token.release();
            break;
        }

        if let Some(task) = shared.tasks.pop() {
            promote(shared);
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                error!(panic = %panic_message(payload.as_ref()), "pool task panicked");
            }
            shared.stats.tasks_run.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let handle = shared.handle_set.wait_for_events(Some(timeout));
        if !handle.is_valid() {
            if shared.handle_set.active_len() == 0 {
                // nothing to poll; sleep until something is registered
                shared.handle_set.wait_for_change(timeout);
            }
            shared.stats.idle_waits.fetch_add(1, Ordering::Relaxed);
            shared.token.release();
            continue;
        }

        let claimed = shared.handle_set.claim(handle);
        promote(shared);
        if claimed.is_empty() {
            continue;
        }

        shared.stats.events_dispatched.fetch_add(1, Ordering::Relaxed);
        if shared.handle_set.dispatch_claimed(handle, &claimed) {
            shared.handle_set.release_claim(handle, &claimed);
        } else {
            let removed = shared.handle_set.remove_handle(handle);
            shared.stats.handles_closed.fetch_add(1, Ordering::Relaxed);
            debug!(%handle, removed, "handle closed");
        }
    }
}

fn promote(shared: &Shared) {
    if let Err(err) = shared.token.promote_follower() {
        warn!(error = %err, "leadership handoff failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn config(num_threads: usize) -> HandleSetPoolConfig {
        HandleSetPoolConfig {
            num_threads,
            event_wait_timeout: Duration::from_millis(50),
            thread_name_prefix: "hs-test-".to_string(),
        }
    }

    #[test]
    fn test_tasks_run_and_pool_stops() {
        let set = Arc::new(HandleSet::new().unwrap());
        let pool = HandleSetPool::new(config(2), set);
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(SystemError::AlreadyRunning)));

        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            pool.add_task(move || tx.send(i).unwrap());
        }
        for _ in 0..5 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        pool.stop();
        assert!(!pool.is_running());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let set = Arc::new(HandleSet::new().unwrap());
        let pool = HandleSetPool::new(config(0), set);
        assert!(matches!(pool.start(), Err(SystemError::InvalidConfig(_))));
    }
}
