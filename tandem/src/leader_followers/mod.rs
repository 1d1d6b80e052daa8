//! # Leader/Followers
//!
//! A fixed pool of threads shares one readiness source. Exactly one thread,
//! the leader, waits on it; the rest queue on the [`LeaderToken`]. On an event
//! the leader promotes the next follower before processing, so waiting and
//! processing overlap without any thread ever owning a connection.
//!
//! Two sources are provided:
//! - [`Reactor`]: descriptor to callback map, driven by [`LeaderFollowersPool`]
//! - [`HandleSet`]: `(handle, event)` to [`tandem_api::EventHandler`] registry
//!   with suspend/resume, driven by [`HandleSetPool`]

pub mod handle_set;
pub mod handle_set_pool;
pub mod pool;
pub mod reactor;
pub(crate) mod sys;
pub mod token;

pub use handle_set::{Claimed, HandleSet};
pub use handle_set_pool::{HandleSetPool, HandleSetPoolStats};
pub use pool::{LeaderFollowersPool, PoolStats, Task};
pub use reactor::{callback, Callback, Reactor, Readiness, MAX_FDS};
pub use token::{LeaderStats, LeaderToken};
