//! # Leader Token
//!
//! Mutual-exclusion token encoding "who is the leader".
//!
//! ## Key Concepts
//! - Ticket order: callers of [`LeaderToken::acquire`] are admitted strictly
//!   in the order they arrived, so leadership handoff is FIFO among blocked
//!   followers.
//! - Ownership is tracked by thread id, which makes [`LeaderToken::is_leader`]
//!   answerable and lets a promote from a non-leader be refused.
//! - [`LeaderStats`] records holder counts so tests can assert that no two
//!   threads ever lead at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::error;

use crate::error::LeaderError;
use crate::log_leader;
use crate::logging::thread_label;

#[derive(Debug)]
struct TokenState {
    /// Ticket handed to the next caller of `acquire`
    next_ticket: u64,
    /// Ticket currently allowed to lead
    now_serving: u64,
    leader: Option<ThreadId>,
}

/// Leadership counters.
#[derive(Debug, Default)]
pub struct LeaderStats {
    pub acquisitions: AtomicUsize,
    pub promotions: AtomicUsize,
    /// Threads holding the token right now; never above one
    pub holders: AtomicUsize,
    /// Highest value `holders` has reached
    pub peak_holders: AtomicUsize,
}

#[derive(Debug)]
pub struct LeaderToken {
    state: Mutex<TokenState>,
    turn: Condvar,
    stats: LeaderStats,
}

impl Default for LeaderToken {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderToken {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TokenState {
                next_ticket: 0,
                now_serving: 0,
                leader: None,
            }),
            turn: Condvar::new(),
            stats: LeaderStats::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the calling thread is the sole leader.
    pub fn acquire(&self) {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let mut state = self
            .turn
            .wait_while(state, |s| s.now_serving != ticket)
            .unwrap_or_else(PoisonError::into_inner);
        state.leader = Some(thread::current().id());

        let holders = self.stats.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_holders.fetch_max(holders, Ordering::SeqCst);
        self.stats.acquisitions.fetch_add(1, Ordering::Relaxed);
        log_leader!(thread_label(), "acquired", ticket);
    }

    /// Hands leadership to the next waiting follower.
    ///
    /// Only the current leader may promote; anyone else gets
    /// [`LeaderError::NotLeader`] and nothing changes.
    pub fn promote_follower(&self) -> Result<(), LeaderError> {
        let mut state = self.lock();
        if state.leader != Some(thread::current().id()) {
            error!(thread = %thread_label(), "promote_follower called by a non-leader");
            return Err(LeaderError::NotLeader);
        }
        self.hand_off(&mut state);
        self.stats.promotions.fetch_add(1, Ordering::Relaxed);
        log_leader!(thread_label(), "promoted follower");
        Ok(())
    }

    /// Relinquishes leadership held by the calling thread. Never fails; a
    /// call from a thread that does not lead is ignored.
    pub fn release(&self) {
        let mut state = self.lock();
        if state.leader == Some(thread::current().id()) {
            self.hand_off(&mut state);
            log_leader!(thread_label(), "released");
        }
    }

    fn hand_off(&self, state: &mut TokenState) {
        state.leader = None;
        state.now_serving += 1;
        self.stats.holders.fetch_sub(1, Ordering::SeqCst);
        self.turn.notify_all();
    }

    pub fn is_leader(&self) -> bool {
        self.lock().leader == Some(thread::current().id())
    }

    pub fn leader(&self) -> Option<ThreadId> {
        self.lock().leader
    }

    /// Threads blocked in `acquire`.
    pub fn waiting(&self) -> usize {
        let state = self.lock();
        let queued = state.next_ticket - state.now_serving;
        (queued as usize).saturating_sub(usize::from(state.leader.is_some()))
    }

    pub fn stats(&self) -> &LeaderStats {
        &self.stats
    }
}
