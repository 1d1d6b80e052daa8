//! Traits tying a servant to the method requests its scheduler runs.

use crate::error::ExecutionError;

/// State owner driven by a [`super::Scheduler`].
///
/// Implementations are not required to be thread safe: the scheduler's
/// dispatch thread is the only caller once the servant has been handed over.
pub trait Servant: Send + 'static {
    /// Counter bumped on every state change that can flip a guard.
    ///
    /// Parked requests are re-evaluated only after this value moves.
    fn generation(&self) -> u64;
}

/// One deferred call against a servant `S`.
pub trait MethodRequest<S>: Send + 'static {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Precondition evaluated immediately before execution. Must be pure.
    fn guard(&self, servant: &S) -> bool;

    /// Runs the request. Two-way requests complete their promise here,
    /// with the error variant when execution fails.
    fn call(self, servant: &mut S) -> Result<(), ExecutionError>;
}

/// What travels through the activation queue.
#[derive(Debug)]
pub(crate) enum Envelope<R> {
    Request(R),
    /// No-op that unblocks a dispatch thread waiting on an empty queue.
    Wake,
}
