use thiserror::Error;

/// Errors raised by the graph/MST compute engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Number of vertices cannot be negative: {0}")]
    NegativeVertexCount(i64),

    #[error("Too many vertices: {requested} (at most {max})")]
    TooManyVertices { requested: u64, max: usize },

    #[error("Edge weight cannot be negative: {0}")]
    NegativeWeight(i64),

    #[error("Vertex {vertex} out of range (graph has {vertices} vertices)")]
    VertexOutOfRange { vertex: usize, vertices: usize },

    #[error("Unknown MST algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Graph is not initialized")]
    GraphNotInitialized,

    #[error("MST has not been computed")]
    MstNotComputed,
}
