//! # Active Object
//!
//! Decouples method invocation from method execution: a [`MstProxy`] turns
//! calls into [`Command`]s, a [`Scheduler`] thread runs them one at a time
//! against the [`MstServant`] it owns, and two-way calls hand results back
//! through [`Future`]s.
//!
//! ## Key Concepts
//! - [`BoundedQueue`]: activation queue with capacity backpressure
//! - [`Future`] / [`Promise`]: single-write result cell
//! - [`MethodRequest`] / [`Servant`]: the seam between the generic scheduler
//!   and a concrete service

pub mod command;
pub mod future;
pub mod proxy;
pub mod queue;
pub mod request;
pub mod scheduler;
pub mod servant;

pub use command::Command;
pub use future::{Future, Promise, TaskResult};
pub use proxy::MstProxy;
pub use queue::BoundedQueue;
pub use request::{MethodRequest, Servant};
pub use scheduler::{Scheduler, SchedulerState, SchedulerStats, StatsSnapshot};
pub use servant::MstServant;
