//! MST strategies.
//!
//! The set of algorithms is closed, so it is an enum rather than a trait
//! object; [`Algorithm::from_name`] plays the role of the factory.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::errors::EngineError;
use crate::graph::Graph;
use crate::mst::Mst;
use crate::union_find::UnionFind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Kruskal,
    Prim,
}

impl Algorithm {
    /// Resolves an algorithm by name, case-insensitively.
    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "kruskal" => Ok(Self::Kruskal),
            "prim" => Ok(Self::Prim),
            _ => Err(EngineError::UnknownAlgorithm(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kruskal => "kruskal",
            Self::Prim => "prim",
        }
    }

    /// Computes a minimum spanning forest of `graph`.
    pub fn execute(&self, graph: &Graph) -> Mst {
        debug!(algorithm = self.name(), vertices = graph.vertices(), edges = graph.edge_count(), "computing MST");
        let edges = match self {
            Self::Kruskal => kruskal(graph),
            Self::Prim => prim(graph),
        };
        let mut mst = Mst::new(graph.vertices());
        for (u, v, w) in edges {
            // endpoints come from the graph itself, so they are always in range
            let _ = mst.add_edge(u, v, w);
        }
        mst
    }
}

impl FromStr for Algorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn kruskal(graph: &Graph) -> Vec<(usize, usize, i64)> {
    let mut edges = graph.edges();
    edges.sort_by_key(|(_, _, w)| *w);

    let mut sets = UnionFind::new(graph.vertices());
    edges
        .into_iter()
        .filter(|(u, v, _)| sets.unite(*u, *v))
        .collect()
}

/// Lazy Prim, restarted from every unvisited vertex so disconnected graphs
/// yield a spanning forest.
fn prim(graph: &Graph) -> Vec<(usize, usize, i64)> {
    let n = graph.vertices();
    let mut in_tree = vec![false; n];
    let mut tree = Vec::with_capacity(n.saturating_sub(1));

    for root in 0..n {
        if in_tree[root] {
            continue;
        }
        let mut heap = BinaryHeap::new();
        in_tree[root] = true;
        for &(to, w) in graph.neighbors(root) {
            heap.push(Reverse((w, root, to)));
        }
        while let Some(Reverse((w, from, to))) = heap.pop() {
            if in_tree[to] {
                continue;
            }
            in_tree[to] = true;
            tree.push((from, to, w));
            for &(next, nw) in graph.neighbors(to) {
                if !in_tree[next] {
                    heap.push(Reverse((nw, to, next)));
                }
            }
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Graph {
        let mut graph = Graph::new(4);
        graph.add_edge(0, 1, 5).unwrap();
        graph.add_edge(1, 2, 3).unwrap();
        graph.add_edge(2, 3, 2).unwrap();
        graph.add_edge(0, 3, 9).unwrap();
        graph
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Algorithm::from_name("Kruskal").unwrap(), Algorithm::Kruskal);
        assert_eq!("PRIM".parse::<Algorithm>().unwrap(), Algorithm::Prim);
        assert!(matches!(
            Algorithm::from_name("boruvka"),
            Err(EngineError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_both_algorithms_agree() {
        let graph = square();
        let kruskal = Algorithm::Kruskal.execute(&graph);
        let prim = Algorithm::Prim.execute(&graph);

        assert_eq!(kruskal.total_weight(), 10);
        assert_eq!(prim.total_weight(), 10);
        assert_eq!(kruskal.edges(), prim.edges());
    }

    #[test]
    fn test_disconnected_graph_yields_forest() {
        let mut graph = Graph::new(4);
        graph.add_edge(0, 1, 1).unwrap();
        graph.add_edge(2, 3, 2).unwrap();

        for algorithm in [Algorithm::Kruskal, Algorithm::Prim] {
            let mst = algorithm.execute(&graph);
            assert_eq!(mst.edges().len(), 2);
            assert_eq!(mst.total_weight(), 3);
        }
    }

    #[test]
    fn test_empty_graph() {
        let mst = Algorithm::Prim.execute(&Graph::new(0));
        assert_eq!(mst.total_weight(), 0);
        assert!(mst.edges().is_empty());
    }
}
