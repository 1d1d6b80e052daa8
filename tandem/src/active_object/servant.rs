//! Graph/MST servant: the state behind one [`super::MstProxy`].

use std::fmt::Write as _;

use tandem_api::{Algorithm, EngineError, Graph, Mst, Weight};

use super::request::Servant;

/// Owns one graph and the most recently computed MST.
///
/// Every mutation bumps [`Servant::generation`]. `init_graph` discards the
/// MST; edge edits keep it until the next computation.
#[derive(Debug, Default)]
pub struct MstServant {
    graph: Option<Graph>,
    mst: Option<Mst>,
    generation: u64,
}

impl Servant for MstServant {
    fn generation(&self) -> u64 {
        self.generation
    }
}

impl MstServant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_graph_initialized(&self) -> bool {
        self.graph.is_some()
    }

    pub fn has_mst(&self) -> bool {
        self.mst.is_some()
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn mst(&self) -> Option<&Mst> {
        self.mst.as_ref()
    }

    /// Replaces the graph. An oversized count leaves the servant untouched.
    pub fn init_graph(&mut self, vertices: usize) -> Result<(), EngineError> {
        self.graph = Some(Graph::try_new(vertices)?);
        self.mst = None;
        self.bump();
        Ok(())
    }

    pub fn add_edge(&mut self, u: usize, v: usize, weight: Weight) -> Result<(), EngineError> {
        self.graph_mut()?.add_edge(u, v, weight)?;
        self.bump();
        Ok(())
    }

    pub fn remove_edge(&mut self, u: usize, v: usize) -> Result<bool, EngineError> {
        let removed = self.graph_mut()?.remove_edge(u, v)?;
        if removed {
            self.bump();
        }
        Ok(removed)
    }

    pub fn compute_mst(&mut self, algorithm: &str) -> Result<Mst, EngineError> {
        let algorithm = Algorithm::from_name(algorithm)?;
        let graph = self.graph.as_ref().ok_or(EngineError::GraphNotInitialized)?;
        let mst = algorithm.execute(graph);
        self.mst = Some(mst.clone());
        self.bump();
        Ok(mst)
    }

    pub fn weight(&self) -> Result<Weight, EngineError> {
        Ok(self.current_mst()?.total_weight())
    }

    pub fn longest_distance(&self) -> Result<Weight, EngineError> {
        Ok(self.current_mst()?.longest_distance())
    }

    pub fn shortest_distance(&self, graph: &Graph, src: usize, dst: usize) -> Result<Weight, EngineError> {
        self.current_mst()?.shortest_path_with_mst_edge(graph, src, dst)
    }

    pub fn average_distance(&self) -> Result<f64, EngineError> {
        Ok(self.current_mst()?.average_distance())
    }

    /// Graph, then MST when one exists; a fixed line when there is no graph.
    pub fn describe(&self) -> String {
        let Some(graph) = &self.graph else {
            return "No graph initialized\n".to_string();
        };
        let mut out = graph.to_string();
        if let Some(mst) = &self.mst {
            let _ = write!(out, "{}", mst);
        }
        out
    }

    fn graph_mut(&mut self) -> Result<&mut Graph, EngineError> {
        self.graph.as_mut().ok_or(EngineError::GraphNotInitialized)
    }

    fn current_mst(&self) -> Result<&Mst, EngineError> {
        self.mst.as_ref().ok_or(EngineError::MstNotComputed)
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
