//! # Future / Promise
//!
//! Single-write, multiple-read result cell for two-way method requests.
//!
//! ## Key Concepts
//! - [`Promise`]: the single writer, carried inside a method request
//! - [`Future`]: cloneable reader handed back to the caller; every clone
//!   observes the same underlying state
//!
//! ## Design Principles
//! - The first write wins; later writes are rejected with
//!   [`FutureError::AlreadyCompleted`] and leave the value untouched
//! - A promise dropped without being written resolves its future to
//!   [`TaskError::Abandoned`], so no reader can block forever on a request
//!   that was discarded at shutdown

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{FutureError, TaskError};

pub type TaskResult<T> = Result<T, TaskError>;

struct Inner<T> {
    /// `Some` once the promise has been written
    slot: Mutex<Option<TaskResult<T>>>,
    /// Signalled on the single transition from empty to written
    ready: Condvar,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, Option<TaskResult<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, result: TaskResult<T>) -> Result<(), FutureError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(FutureError::AlreadyCompleted);
        }
        *slot = Some(result);
        drop(slot);
        self.ready.notify_all();
        Ok(())
    }
}

/// Write side of a [`Future`].
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Promise<T> {
    /// Creates an empty cell, returning its writer and a reader.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Promise<T>, Future<T>) {
        let inner = Arc::new(Inner {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        });
        (
            Promise {
                inner: Arc::clone(&inner),
            },
            Future { inner },
        )
    }

    pub fn set(&self, value: T) -> Result<(), FutureError> {
        self.inner.complete(Ok(value))
    }

    pub fn fail(&self, error: TaskError) -> Result<(), FutureError> {
        self.inner.complete(Err(error))
    }

    pub fn complete(&self, result: TaskResult<T>) -> Result<(), FutureError> {
        self.inner.complete(result)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        let _ = self.inner.complete(Err(TaskError::Abandoned));
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Read side of a [`Promise`].
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Future<T> {
    /// Blocks until the promise is written and returns its result.
    pub fn get(&self) -> TaskResult<T> {
        let slot = self
            .inner
            .ready
            .wait_while(self.inner.lock(), |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(result) => result.clone(),
            None => unreachable!("wait_while returned with an empty slot"),
        }
    }

    /// Like [`Future::get`], giving up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<TaskResult<T>> {
        let (slot, _) = self
            .inner
            .ready
            .wait_timeout_while(self.inner.lock(), timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }

    /// Non-blocking read.
    pub fn try_get(&self) -> Option<TaskResult<T>> {
        self.inner.lock().clone()
    }
}

impl<T> Future<T> {
    pub fn is_ready(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.is_ready())
            .finish()
    }
}
