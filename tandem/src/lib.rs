// Tandem Dispatch Substrate
//
// Two concurrency strategies over a shared MST engine: an active object
// (proxy, activation queue, scheduler thread, futures) and a leader/followers
// thread pool over a reactor or a handle set. The TCP server in `server`
// wires both together.

pub mod active_object;
pub mod config;
pub mod error;
pub mod leader_followers;
pub mod logging;
pub mod server;

use std::any::Any;

// Re-export commonly used types
pub use active_object::{Future, MstProxy, Promise, Scheduler};
pub use config::*;
pub use error::*;
pub use leader_followers::{HandleSet, HandleSetPool, LeaderFollowersPool, LeaderToken, Reactor};
pub use server::MstServer;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
