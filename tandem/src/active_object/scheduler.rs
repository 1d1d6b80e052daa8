//! # Active Object Scheduler
//!
//! A dedicated thread that drains an activation queue of method requests,
//! checks each guard, and executes ready requests against the servant it
//! owns.
//!
//! ## Key Concepts
//! - Lifecycle: `Stopped -> Running -> Stopping -> Stopped`, restartable
//! - Guard handling, per [`GuardPolicy`]:
//!   - `Park`: an unsatisfied request leaves the queue and waits in a parked
//!     list. After every execution that changes the servant's generation the
//!     parked list is re-evaluated in arrival order. Nothing is polled, and
//!     requests behind an unsatisfiable one keep flowing.
//!   - `Requeue`: the request goes back to the tail and the thread sleeps for
//!     the backoff before the next dequeue.
//! - Shutdown: `stop` closes admission, waits out producers already past
//!   the state check, flips the running flag, enqueues a wake sentinel,
//!   joins the thread, and discards whatever is still queued. Discarded
//!   two-way requests resolve their futures to `TaskError::Abandoned`.
//!
//! ## Design Principles
//! - Only the dispatch thread touches the servant while running; the servant
//!   moves into the thread on start and comes back through `join`.
//! - A failing or panicking request never takes the dispatch thread down.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use super::queue::BoundedQueue;
use super::request::{Envelope, MethodRequest, Servant};
use crate::config::{GuardPolicy, SchedulerConfig};
use crate::error::SystemError;
use crate::{log_error, log_request, panic_message};

/// States a scheduler can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

/// Request counters, updated by the dispatch thread.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Requests whose call returned `Ok`
    pub executed: AtomicUsize,
    /// Requests whose call returned an error or panicked
    pub failed: AtomicUsize,
    /// Requests parked because their guard was false
    pub deferred: AtomicUsize,
    /// Guard re-evaluations (parked re-checks and requeues)
    pub retried: AtomicUsize,
    /// Requests dropped at shutdown without running
    pub discarded: AtomicUsize,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub executed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub retried: usize,
    pub discarded: usize,
}

impl SchedulerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs method requests of type `R` against a servant `S` on one thread.
pub struct Scheduler<S, R>
where
    S: Servant,
    R: MethodRequest<S>,
{
    queue: BoundedQueue<Envelope<R>>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    /// Held shared by `enqueue` from the state check through the push
    admission: RwLock<()>,
    /// Read by the dispatch thread after every dequeue
    running: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
    /// Present while stopped; moved into the dispatch thread while running
    servant: Mutex<Option<S>>,
    thread_handle: Mutex<Option<JoinHandle<S>>>,
    _request: PhantomData<fn(R)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S, R> Scheduler<S, R>
where
    S: Servant,
    R: MethodRequest<S>,
{
    pub fn new(servant: S, config: SchedulerConfig) -> Result<Self, SystemError> {
        config.validate()?;
        Ok(Self {
            queue: BoundedQueue::with_capacity(config.queue_capacity),
            config,
            state: Mutex::new(SchedulerState::Stopped),
            admission: RwLock::new(()),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SchedulerStats::default()),
            servant: Mutex::new(Some(servant)),
            thread_handle: Mutex::new(None),
            _request: PhantomData,
        })
    }

    /// Spawns the dispatch thread.
    pub fn start(&self) -> Result<(), SystemError> {
        let mut state = lock(&self.state);
        if *state != SchedulerState::Stopped {
            return Err(SystemError::AlreadyRunning);
        }
        let servant = lock(&self.servant)
            .take()
            .ok_or_else(|| SystemError::Other(anyhow::anyhow!("servant lost after dispatch thread panic")))?;

        self.running.store(true, Ordering::SeqCst);
        let dispatcher = Dispatcher {
            queue: self.queue.clone(),
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            policy: self.config.guard_policy,
            parked: VecDeque::new(),
            _request: PhantomData,
        };

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || dispatcher.run(servant));

        match spawned {
            Ok(handle) => {
                *lock(&self.thread_handle) = Some(handle);
                *state = SchedulerState::Running;
                info!(thread = %self.config.thread_name, "scheduler started");
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                // the closure, and the servant with it, is gone
                Err(SystemError::ThreadSpawn(err.to_string()))
            }
        }
    }

    /// Stops the dispatch thread and discards pending requests. Idempotent.
    pub fn stop(&self) -> Result<(), SystemError> {
        {
            let mut state = lock(&self.state);
            match *state {
                SchedulerState::Stopped => return Ok(()),
                SchedulerState::Stopping => return Ok(()),
                SchedulerState::Running => *state = SchedulerState::Stopping,
            }
        }

        // the dispatch thread keeps draining, so producers blocked on a full
        // queue finish and release their shared guard
        drop(self.admission.write().unwrap_or_else(PoisonError::into_inner));

        self.running.store(false, Ordering::SeqCst);
        self.queue.enqueue(Envelope::Wake);

        let handle = lock(&self.thread_handle).take();
        let mut outcome = Ok(());
        if let Some(handle) = handle {
            match handle.join() {
                Ok(servant) => *lock(&self.servant) = Some(servant),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(panic = %message, "scheduler thread panicked");
                    outcome = Err(SystemError::Other(anyhow::anyhow!("scheduler thread panicked: {}", message)));
                }
            }
        }

        let mut drained = 0;
        while let Some(envelope) = self.queue.try_dequeue() {
            if let Envelope::Request(request) = envelope {
                log_request!(request.name(), "discarded");
                drained += 1;
            }
        }
        self.stats.discarded.fetch_add(drained, Ordering::Relaxed);

        *lock(&self.state) = SchedulerState::Stopped;
        info!(thread = %self.config.thread_name, drained, "scheduler stopped");
        outcome
    }

    /// Queues `request`, blocking while the activation queue is full.
    ///
    /// Rejected unless the scheduler is running; the request is dropped,
    /// which resolves any attached future to `TaskError::Abandoned`.
    pub fn enqueue(&self, request: R) -> Result<(), SystemError> {
        let _admitted = self.admission.read().unwrap_or_else(PoisonError::into_inner);
        if self.state() != SchedulerState::Running {
            log_request!(request.name(), "rejected");
            return Err(SystemError::NotRunning);
        }
        log_request!(request.name(), "enqueued");
        self.queue.enqueue(Envelope::Request(request));
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Runs `f` against the servant while the scheduler is stopped.
    pub fn with_servant<T>(&self, f: impl FnOnce(&mut S) -> T) -> Option<T> {
        lock(&self.servant).as_mut().map(f)
    }
}

impl<S, R> Drop for Scheduler<S, R>
where
    S: Servant,
    R: MethodRequest<S>,
{
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_error!(err, component = "scheduler");
        }
    }
}

impl<S, R> fmt::Debug for Scheduler<S, R>
where
    S: Servant,
    R: MethodRequest<S>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("thread", &self.config.thread_name)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .field("policy", &self.config.guard_policy)
            .finish()
    }
}

/// State owned by the dispatch thread.
struct Dispatcher<S, R> {
    queue: BoundedQueue<Envelope<R>>,
    running: Arc<AtomicBool>,
    stats: Arc<SchedulerStats>,
    policy: GuardPolicy,
    /// Requests whose guard was false, oldest first
    parked: VecDeque<R>,
    _request: PhantomData<fn(S)>,
}

impl<S, R> Dispatcher<S, R>
where
    S: Servant,
    R: MethodRequest<S>,
{
    fn run(mut self, mut servant: S) -> S {
        loop {
            let envelope = self.queue.dequeue();
            if !self.running.load(Ordering::SeqCst) {
                if let Envelope::Request(request) = envelope {
                    log_request!(request.name(), "discarded");
                    SchedulerStats::bump(&self.stats.discarded);
                }
                break;
            }
            match envelope {
                Envelope::Wake => continue,
                Envelope::Request(request) => self.dispatch(request, &mut servant),
            }
        }

        for request in self.parked.drain(..) {
            log_request!(request.name(), "discarded");
            SchedulerStats::bump(&self.stats.discarded);
        }
        servant
    }

    fn dispatch(&mut self, request: R, servant: &mut S) {
        if request.guard(servant) {
            let before = servant.generation();
            self.execute(request, servant);
            if servant.generation() != before {
                self.recheck_parked(servant);
            }
            return;
        }

        match self.policy {
            GuardPolicy::Park => {
                log_request!(request.name(), "parked", parked = self.parked.len() + 1);
                SchedulerStats::bump(&self.stats.deferred);
                self.parked.push_back(request);
            }
            GuardPolicy::Requeue { backoff } => {
                log_request!(request.name(), "retried", backoff_ms = backoff.as_millis() as u64);
                SchedulerStats::bump(&self.stats.retried);
                // a blocking enqueue here could wait on ourselves
                if let Err(Envelope::Request(request)) = self.queue.try_enqueue(Envelope::Request(request)) {
                    warn!(request = request.name(), "activation queue full, parking request");
                    SchedulerStats::bump(&self.stats.deferred);
                    self.parked.push_back(request);
                }
                thread::sleep(backoff);
            }
        }
    }

    /// Re-evaluates parked requests until a pass changes nothing.
    fn recheck_parked(&mut self, servant: &mut S) {
        loop {
            if self.parked.is_empty() {
                return;
            }
            let before = servant.generation();
            let mut still_parked = VecDeque::with_capacity(self.parked.len());
            while let Some(request) = self.parked.pop_front() {
                SchedulerStats::bump(&self.stats.retried);
                if request.guard(servant) {
                    self.execute(request, servant);
                } else {
                    still_parked.push_back(request);
                }
            }
            self.parked = still_parked;
            if servant.generation() == before {
                return;
            }
        }
    }

    fn execute(&self, request: R, servant: &mut S) {
        let name = request.name();
        match panic::catch_unwind(AssertUnwindSafe(|| request.call(servant))) {
            Ok(Ok(())) => {
                log_request!(name, "executed");
                SchedulerStats::bump(&self.stats.executed);
            }
            Ok(Err(err)) => {
                log_error!(err, request = name);
                SchedulerStats::bump(&self.stats.failed);
            }
            Err(payload) => {
                error!(request = name, panic = %panic_message(payload.as_ref()), "method request panicked");
                SchedulerStats::bump(&self.stats.failed);
            }
        }
    }
}
