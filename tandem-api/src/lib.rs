//! # Tandem API
//!
//! Collaborator interfaces consumed by the tandem dispatch substrate.
//!
//! ## Key Concepts
//! - [`graph::Graph`]: undirected weighted graph owned by a servant
//! - [`mst::Mst`]: minimum spanning tree (or forest) plus distance queries
//! - [`algorithm::Algorithm`]: closed set of MST strategies (Kruskal, Prim)
//! - [`handler`]: handle/event vocabulary shared by handle-set dispatchers
//!
//! Everything in this crate is synchronous and single-threaded; thread safety
//! is supplied by whichever dispatch strategy wraps it.

pub mod algorithm;
pub mod errors;
pub mod graph;
pub mod handler;
pub mod mst;
pub mod union_find;

pub use algorithm::Algorithm;
pub use errors::EngineError;
pub use graph::Graph;
pub use handler::{Disposition, EventHandler, EventType, Handle};
pub use mst::Mst;

/// Edge weight and path length type used throughout the engine.
pub type Weight = i64;

/// Largest vertex count a graph may be created with.
pub const MAX_VERTICES: usize = 10_000;
