//! Method requests accepted by an [`MstServant`].
//!
//! Guards:
//!
//! | request | requires |
//! |---|---|
//! | `InitGraph`, `Describe` | nothing |
//! | `AddEdge`, `RemoveEdge`, `ComputeMst` | an initialized graph |
//! | `GetWeight`, `GetLongestDist`, `GetShortestDist`, `GetAvgDist` | a computed MST |

use std::panic::{self, AssertUnwindSafe};

use tandem_api::{EngineError, Graph, Mst, Weight};

use super::future::Promise;
use super::request::MethodRequest;
use super::servant::MstServant;
use crate::error::{ExecutionError, TaskError};
use crate::panic_message;

#[derive(Debug)]
pub enum Command {
    InitGraph {
        vertices: usize,
    },
    AddEdge {
        u: usize,
        v: usize,
        weight: Weight,
    },
    RemoveEdge {
        u: usize,
        v: usize,
    },
    ComputeMst {
        algorithm: String,
        reply: Promise<Mst>,
    },
    GetWeight {
        reply: Promise<Weight>,
    },
    GetLongestDist {
        reply: Promise<Weight>,
    },
    GetShortestDist {
        graph: Graph,
        src: usize,
        dst: usize,
        reply: Promise<Weight>,
    },
    GetAvgDist {
        reply: Promise<f64>,
    },
    Describe {
        reply: Promise<String>,
    },
}

/// Runs `op`, completes `reply` with its outcome, and reports failures.
fn answer<T, F>(reply: Promise<T>, op: F) -> Result<(), ExecutionError>
where
    F: FnOnce() -> Result<T, EngineError>,
{
    let outcome = match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ExecutionError::from(err)),
        Err(payload) => Err(ExecutionError::Panicked(panic_message(payload.as_ref()))),
    };
    match outcome {
        Ok(value) => {
            let _ = reply.set(value);
            Ok(())
        }
        Err(err) => {
            let _ = reply.fail(TaskError::from(err.clone()));
            Err(err)
        }
    }
}

impl MethodRequest<MstServant> for Command {
    fn name(&self) -> &'static str {
        match self {
            Command::InitGraph { .. } => "InitGraph",
            Command::AddEdge { .. } => "AddEdge",
            Command::RemoveEdge { .. } => "RemoveEdge",
            Command::ComputeMst { .. } => "ComputeMst",
            Command::GetWeight { .. } => "GetWeight",
            Command::GetLongestDist { .. } => "GetLongestDist",
            Command::GetShortestDist { .. } => "GetShortestDist",
            Command::GetAvgDist { .. } => "GetAvgDist",
            Command::Describe { .. } => "Describe",
        }
    }

    fn guard(&self, servant: &MstServant) -> bool {
        match self {
            Command::InitGraph { .. } | Command::Describe { .. } => true,
            Command::AddEdge { .. } | Command::RemoveEdge { .. } | Command::ComputeMst { .. } => {
                servant.is_graph_initialized()
            }
            Command::GetWeight { .. }
            | Command::GetLongestDist { .. }
            | Command::GetShortestDist { .. }
            | Command::GetAvgDist { .. } => servant.has_mst(),
        }
    }

    fn call(self, servant: &mut MstServant) -> Result<(), ExecutionError> {
        match self {
            Command::InitGraph { vertices } => Ok(servant.init_graph(vertices)?),
            Command::AddEdge { u, v, weight } => Ok(servant.add_edge(u, v, weight)?),
            Command::RemoveEdge { u, v } => servant.remove_edge(u, v).map(|_| ()).map_err(Into::into),
            Command::ComputeMst { algorithm, reply } => answer(reply, || servant.compute_mst(&algorithm)),
            Command::GetWeight { reply } => answer(reply, || servant.weight()),
            Command::GetLongestDist { reply } => answer(reply, || servant.longest_distance()),
            Command::GetShortestDist {
                graph,
                src,
                dst,
                reply,
            } => answer(reply, || servant.shortest_distance(&graph, src, dst)),
            Command::GetAvgDist { reply } => answer(reply, || servant.average_distance()),
            Command::Describe { reply } => answer(reply, || Ok(servant.describe())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guards_follow_servant_state() {
        let mut servant = MstServant::new();
        let (reply, _future) = Promise::new();
        let weight = Command::GetWeight { reply };
        let edge = Command::AddEdge { u: 0, v: 1, weight: 2 };

        assert!(!edge.guard(&servant));
        assert!(!weight.guard(&servant));

        servant.init_graph(2).unwrap();
        assert!(edge.guard(&servant));
        assert!(!weight.guard(&servant));

        servant.compute_mst("kruskal").unwrap();
        assert!(weight.guard(&servant));
    }

    #[test]
    fn test_failed_execution_resolves_future_with_error() {
        let mut servant = MstServant::new();
        servant.init_graph(2).unwrap();

        let (reply, future) = Promise::new();
        let request = Command::ComputeMst {
            algorithm: "boruvka".to_string(),
            reply,
        };
        assert!(request.call(&mut servant).is_err());
        assert_eq!(
            future.get(),
            Err(TaskError::Execution("Unknown MST algorithm: boruvka".to_string()))
        );
    }

    #[test]
    fn test_describe_has_no_guard() {
        let mut servant = MstServant::new();
        let (reply, future) = Promise::new();
        let request = Command::Describe { reply };

        assert!(request.guard(&servant));
        request.call(&mut servant).unwrap();
        assert_eq!(future.get().unwrap(), "No graph initialized\n");
    }
}
