//! Minimum spanning tree (or forest, for disconnected graphs) and the
//! distance queries a servant answers about it.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};
use std::fmt;

use crate::errors::EngineError;
use crate::graph::{check_weight, Graph};
use crate::Weight;

/// Result of running an [`crate::Algorithm`] over a [`Graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mst {
    vertices: usize,
    total_weight: Weight,
    /// Normalised so that `u <= v`
    edges: BTreeSet<(usize, usize, Weight)>,
    adjacency: Vec<Vec<(usize, Weight)>>,
}

impl Mst {
    pub fn new(vertices: usize) -> Self {
        Self {
            vertices,
            total_weight: 0,
            edges: BTreeSet::new(),
            adjacency: vec![Vec::new(); vertices],
        }
    }

    /// Builds a tree from an edge list, validating every endpoint.
    pub fn from_edges<I>(vertices: usize, edges: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (usize, usize, Weight)>,
    {
        let mut mst = Self::new(vertices);
        for (u, v, w) in edges {
            mst.add_edge(u, v, w)?;
        }
        Ok(mst)
    }

    pub fn add_edge(&mut self, u: usize, v: usize, weight: Weight) -> Result<(), EngineError> {
        for vertex in [u, v] {
            if vertex >= self.vertices {
                return Err(EngineError::VertexOutOfRange {
                    vertex,
                    vertices: self.vertices,
                });
            }
        }
        check_weight(weight)?;
        let (u, v) = if u > v { (v, u) } else { (u, v) };
        self.edges.insert((u, v, weight));
        self.total_weight = self.total_weight.saturating_add(weight);
        self.adjacency[u].push((v, weight));
        self.adjacency[v].push((u, weight));
        Ok(())
    }

    pub fn total_weight(&self) -> Weight {
        self.total_weight
    }

    pub fn edges(&self) -> &BTreeSet<(usize, usize, Weight)> {
        &self.edges
    }

    pub fn vertices(&self) -> usize {
        self.vertices
    }

    pub fn adjacency(&self) -> &[Vec<(usize, Weight)>] {
        &self.adjacency
    }

    /// Longest simple path in the tree (its weighted diameter).
    ///
    /// Uses the classic two-sweep search: the farthest vertex from any start
    /// is one end of a diameter. Each component of a forest is swept
    /// separately and the largest diameter wins.
    pub fn longest_distance(&self) -> Weight {
        if self.vertices <= 1 {
            return 0;
        }
        let mut seen = vec![false; self.vertices];
        let mut longest = 0;
        for start in 0..self.vertices {
            if seen[start] {
                continue;
            }
            let (far, _) = self.farthest_from(start, &mut seen);
            let mut scratch = vec![false; self.vertices];
            let (_, diameter) = self.farthest_from(far, &mut scratch);
            longest = longest.max(diameter);
        }
        longest
    }

    /// Mean distance over all ordered pairs of distinct, mutually reachable vertices.
    ///
    /// Tree paths are unique, so one traversal per source gives every
    /// distance from it without an `n * n` table.
    pub fn average_distance(&self) -> f64 {
        if self.vertices <= 1 {
            return 0.0;
        }
        let mut total: i128 = 0;
        let mut pairs: u64 = 0;
        let mut seen = vec![false; self.vertices];
        let mut stack = Vec::new();
        for source in 0..self.vertices {
            seen.fill(false);
            seen[source] = true;
            stack.push((source, 0 as Weight));
            while let Some((node, dist)) = stack.pop() {
                if node != source {
                    total += i128::from(dist);
                    pairs += 1;
                }
                for &(next, weight) in &self.adjacency[node] {
                    if !seen[next] {
                        seen[next] = true;
                        stack.push((next, dist.saturating_add(weight)));
                    }
                }
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total as f64 / pairs as f64
        }
    }

    /// Shortest `src -> dst` path in `graph` that traverses at least one tree edge.
    ///
    /// Runs Dijkstra over `(vertex, used_tree_edge)` states. Returns `-1` when
    /// no such path exists.
    pub fn shortest_path_with_mst_edge(
        &self,
        graph: &Graph,
        src: usize,
        dst: usize,
    ) -> Result<Weight, EngineError> {
        let n = graph.vertices();
        for vertex in [src, dst] {
            if vertex >= n || vertex >= self.vertices {
                return Err(EngineError::VertexOutOfRange {
                    vertex,
                    vertices: n.min(self.vertices),
                });
            }
        }

        let tree_edges: HashSet<(usize, usize)> =
            self.edges.iter().map(|(u, v, _)| (*u, *v)).collect();
        let is_tree_edge = |a: usize, b: usize| tree_edges.contains(&(a.min(b), a.max(b)));

        let mut best = vec![[Weight::MAX; 2]; n];
        let mut heap = BinaryHeap::new();
        best[src][0] = 0;
        heap.push(Reverse((0, src, false)));

        while let Some(Reverse((dist, node, used))) = heap.pop() {
            if node == dst && used {
                return Ok(dist);
            }
            if dist > best[node][usize::from(used)] {
                continue;
            }
            for &(next, weight) in graph.neighbors(node) {
                let candidate = dist.saturating_add(weight);
                let next_used = used || is_tree_edge(node, next);
                let slot = &mut best[next][usize::from(next_used)];
                if candidate < *slot {
                    *slot = candidate;
                    heap.push(Reverse((candidate, next, next_used)));
                }
            }
        }
        Ok(-1)
    }

    fn farthest_from(&self, start: usize, seen: &mut [bool]) -> (usize, Weight) {
        let mut best = (start, 0);
        let mut stack = vec![(start, 0 as Weight)];
        seen[start] = true;
        while let Some((node, dist)) = stack.pop() {
            if dist > best.1 {
                best = (node, dist);
            }
            for &(next, weight) in &self.adjacency[node] {
                if !seen[next] {
                    seen[next] = true;
                    stack.push((next, dist.saturating_add(weight)));
                }
            }
        }
        best
    }
}

impl fmt::Display for Mst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MST with {} vertices and {} edges:", self.vertices, self.edges.len())?;
        for (u, v, w) in &self.edges {
            writeln!(f, "  {} - {} ({})", u, v, w)?;
        }
        writeln!(f, "Total weight: {}", self.total_weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_tree() -> Mst {
        // 0 -5- 1 -3- 2 -2- 3
        Mst::from_edges(4, [(0, 1, 5), (1, 2, 3), (2, 3, 2)]).unwrap()
    }

    #[test]
    fn test_edges_are_normalised() {
        let mst = Mst::from_edges(3, [(2, 0, 4)]).unwrap();
        assert!(mst.edges().contains(&(0, 2, 4)));
        assert_eq!(mst.total_weight(), 4);
    }

    #[test]
    fn test_longest_distance_is_diameter() {
        assert_eq!(path_tree().longest_distance(), 10);
        assert_eq!(Mst::new(1).longest_distance(), 0);
    }

    #[test]
    fn test_average_distance() {
        // pair distances: 5, 8, 10, 3, 5, 2 -> 33 / 6
        let avg = path_tree().average_distance();
        assert!((avg - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_average_distance_skips_unreachable_pairs() {
        let forest = Mst::from_edges(3, [(0, 1, 4)]).unwrap();
        assert!((forest.average_distance() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_shortest_path_must_use_tree_edge() {
        let mut graph = Graph::new(4);
        graph.add_edge(0, 1, 5).unwrap();
        graph.add_edge(1, 2, 3).unwrap();
        graph.add_edge(2, 3, 2).unwrap();
        graph.add_edge(0, 3, 9).unwrap();
        let mst = path_tree();

        // 0-3 directly costs 9 but is not a tree edge; 0-1-2-3 costs 10
        assert_eq!(mst.shortest_path_with_mst_edge(&graph, 0, 3).unwrap(), 10);
        assert_eq!(mst.shortest_path_with_mst_edge(&graph, 1, 2).unwrap(), 3);
    }

    #[test]
    fn test_negative_tree_edge_is_rejected() {
        let mut mst = Mst::new(3);
        assert_eq!(mst.add_edge(0, 1, -4), Err(EngineError::NegativeWeight(-4)));
        assert!(mst.edges().is_empty());
        assert_eq!(mst.total_weight(), 0);
    }

    #[test]
    fn test_average_distance_on_large_path() {
        // 0 - 1 - ... - (n-1), unit weights: mean |i - j| over i != j is (n + 1) / 3
        let n = 2_000;
        let mst = Mst::from_edges(n, (1..n).map(|v| (v - 1, v, 1))).unwrap();
        let expected = (n as f64 + 1.0) / 3.0;
        assert!((mst.average_distance() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_shortest_path_unreachable() {
        let graph = Graph::new(3);
        let mst = Mst::new(3);
        assert_eq!(mst.shortest_path_with_mst_edge(&graph, 0, 2).unwrap(), -1);
        assert!(mst.shortest_path_with_mst_edge(&graph, 0, 7).is_err());
    }
}
