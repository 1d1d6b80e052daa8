//! Undirected weighted graph stored as adjacency lists.
//!
//! Vertices are numbered `0..vertices`. Adding an edge that already exists
//! overwrites its weight rather than creating a parallel edge. Weights are
//! non-negative and a graph holds at most [`MAX_VERTICES`] vertices.

use std::fmt;

use crate::errors::EngineError;
use crate::{Weight, MAX_VERTICES};

/// Undirected weighted graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    /// `adjacency[u]` holds `(v, weight)` for every edge incident to `u`
    adjacency: Vec<Vec<(usize, Weight)>>,
    /// Number of distinct undirected edges
    edge_count: usize,
}

impl Graph {
    /// Creates a graph with `vertices` isolated vertices. Callers holding an
    /// untrusted count go through [`Graph::try_new`].
    pub fn new(vertices: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); vertices],
            edge_count: 0,
        }
    }

    /// Creates a graph, rejecting counts above [`MAX_VERTICES`].
    pub fn try_new(vertices: usize) -> Result<Self, EngineError> {
        check_vertex_count(vertices)?;
        Ok(Self::new(vertices))
    }

    /// Creates a graph from a signed vertex count, rejecting negative values.
    pub fn with_vertex_count(vertices: i64) -> Result<Self, EngineError> {
        let count = usize::try_from(vertices).map_err(|_| EngineError::NegativeVertexCount(vertices))?;
        Self::try_new(count)
    }

    pub fn vertices(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// True when the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Inserts the undirected edge `u - v`, or updates its weight if present.
    pub fn add_edge(&mut self, u: usize, v: usize, weight: Weight) -> Result<(), EngineError> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        check_weight(weight)?;

        if let Some(slot) = self.adjacency[u].iter_mut().find(|(to, _)| *to == v) {
            slot.1 = weight;
            if u != v {
                if let Some(back) = self.adjacency[v].iter_mut().find(|(to, _)| *to == u) {
                    back.1 = weight;
                }
            }
            return Ok(());
        }

        self.adjacency[u].push((v, weight));
        if u != v {
            self.adjacency[v].push((u, weight));
        }
        self.edge_count += 1;
        Ok(())
    }

    /// Removes the undirected edge `u - v`. Returns whether an edge was removed.
    pub fn remove_edge(&mut self, u: usize, v: usize) -> Result<bool, EngineError> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;

        let before = self.adjacency[u].len();
        self.adjacency[u].retain(|(to, _)| *to != v);
        if self.adjacency[u].len() == before {
            return Ok(false);
        }
        if u != v {
            self.adjacency[v].retain(|(to, _)| *to != u);
        }
        self.edge_count -= 1;
        Ok(true)
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.weight(u, v).is_some()
    }

    /// Weight of the edge `u - v`, if it exists.
    pub fn weight(&self, u: usize, v: usize) -> Option<Weight> {
        self.adjacency
            .get(u)?
            .iter()
            .find(|(to, _)| *to == v)
            .map(|(_, w)| *w)
    }

    pub fn neighbors(&self, u: usize) -> &[(usize, Weight)] {
        self.adjacency.get(u).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn adjacency(&self) -> &[Vec<(usize, Weight)>] {
        &self.adjacency
    }

    /// Every edge exactly once as `(u, v, weight)` with `u <= v`, ordered by `(u, v)`.
    pub fn edges(&self) -> Vec<(usize, usize, Weight)> {
        let mut edges: Vec<_> = self
            .adjacency
            .iter()
            .enumerate()
            .flat_map(|(u, neighbors)| {
                neighbors
                    .iter()
                    .filter(move |(v, _)| u <= *v)
                    .map(move |(v, w)| (u, *v, *w))
            })
            .collect();
        edges.sort_unstable_by_key(|(u, v, _)| (*u, *v));
        edges
    }

    fn check_vertex(&self, vertex: usize) -> Result<(), EngineError> {
        if vertex < self.vertices() {
            Ok(())
        } else {
            Err(EngineError::VertexOutOfRange {
                vertex,
                vertices: self.vertices(),
            })
        }
    }
}

/// Fails when `vertices` exceeds [`MAX_VERTICES`].
pub fn check_vertex_count(vertices: usize) -> Result<(), EngineError> {
    if vertices > MAX_VERTICES {
        return Err(EngineError::TooManyVertices {
            requested: vertices as u64,
            max: MAX_VERTICES,
        });
    }
    Ok(())
}

pub(crate) fn check_weight(weight: Weight) -> Result<(), EngineError> {
    if weight < 0 {
        return Err(EngineError::NegativeWeight(weight));
    }
    Ok(())
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph with {} vertices and {} edges:", self.vertices(), self.edge_count)?;
        for (u, neighbors) in self.adjacency.iter().enumerate() {
            write!(f, "  {}:", u)?;
            for (v, w) in neighbors {
                write!(f, " {}({})", v, w)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
