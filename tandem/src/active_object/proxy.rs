//! Typed client interface to one graph servant.
//!
//! Each method builds a [`Command`] and hands it to the scheduler, so callers
//! never touch the servant directly.

use tandem_api::{Graph, Mst, Weight};
use tracing::warn;

use super::command::Command;
use super::future::{Future, Promise};
use super::request::MethodRequest;
use super::scheduler::{Scheduler, SchedulerState, StatsSnapshot};
use super::servant::MstServant;
use crate::config::SchedulerConfig;
use crate::error::SystemError;

/// Client-facing façade over one [`MstServant`] and its scheduler thread.
///
/// One-way calls return immediately with nothing; failures are only logged
/// by the dispatch thread. Two-way calls return a [`Future`] at once.
/// Dropping the proxy stops the scheduler and resolves every still-pending
/// future to `TaskError::Abandoned`.
#[derive(Debug)]
pub struct MstProxy {
    scheduler: Scheduler<MstServant, Command>,
}

impl MstProxy {
    /// Creates a proxy with a default scheduler and starts its thread.
    pub fn new() -> Result<Self, SystemError> {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Result<Self, SystemError> {
        let scheduler = Scheduler::new(MstServant::new(), config)?;
        scheduler.start()?;
        Ok(Self { scheduler })
    }

    pub fn init_graph(&self, vertices: usize) {
        self.send(Command::InitGraph { vertices });
    }

    pub fn add_edge(&self, u: usize, v: usize, weight: Weight) {
        self.send(Command::AddEdge { u, v, weight });
    }

    pub fn remove_edge(&self, u: usize, v: usize) {
        self.send(Command::RemoveEdge { u, v });
    }

    pub fn compute_mst(&self, algorithm: &str) -> Future<Mst> {
        let (reply, future) = Promise::new();
        self.send(Command::ComputeMst {
            algorithm: algorithm.to_string(),
            reply,
        });
        future
    }

    pub fn get_weight(&self) -> Future<Weight> {
        let (reply, future) = Promise::new();
        self.send(Command::GetWeight { reply });
        future
    }

    pub fn get_longest_dist(&self) -> Future<Weight> {
        let (reply, future) = Promise::new();
        self.send(Command::GetLongestDist { reply });
        future
    }

    /// Shortest `src -> dst` path in `graph` that uses at least one edge of
    /// the servant's current MST; `-1` when there is none.
    pub fn get_shortest_dist(&self, graph: Graph, src: usize, dst: usize) -> Future<Weight> {
        let (reply, future) = Promise::new();
        self.send(Command::GetShortestDist {
            graph,
            src,
            dst,
            reply,
        });
        future
    }

    pub fn get_avg_dist(&self) -> Future<f64> {
        let (reply, future) = Promise::new();
        self.send(Command::GetAvgDist { reply });
        future
    }

    /// Text rendering of the graph and, when computed, its MST.
    pub fn describe(&self) -> Future<String> {
        let (reply, future) = Promise::new();
        self.send(Command::Describe { reply });
        future
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats()
    }

    /// Stops the scheduler early; later calls are rejected.
    pub fn shutdown(&self) -> Result<(), SystemError> {
        self.scheduler.stop()
    }

    fn send(&self, command: Command) {
        let name = command.name();
        if let Err(err) = self.scheduler.enqueue(command) {
            warn!(request = name, error = %err, "proxy call dropped");
        }
    }
}
