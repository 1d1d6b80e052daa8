//! Line-oriented client protocol.
//!
//! One command per line, whitespace separated, command names matched
//! case-insensitively. A bare `u v w` line adds an edge.

use std::str::FromStr;

use tandem_api::{Algorithm, EngineError, Weight, MAX_VERTICES};
use thiserror::Error;

pub const WELCOME: &str = "Welcome to the MST Server.\nType 'help' for available commands.\n";

pub const HELP: &str = "Available commands:\n\
  new_graph <vertices> [<edges>] - Create a new graph\n\
  add_edge <u> <v> <weight>      - Add (or re-weight) an undirected edge\n\
  <u> <v> <weight>               - Same as add_edge\n\
  remove_edge <u> <v>            - Remove an edge\n\
  mst_kruskal | mst_prim         - Compute the MST and report its metrics\n\
  mst <kruskal|prim>             - Same, algorithm given by name\n\
  print_graph                    - Display the graph and current MST\n\
  reset_graph                    - Replace the graph with an empty one\n\
  help                           - Display this help text\n\
  exit                           - Close the connection\n";

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    NewGraph { vertices: usize, edges: Option<usize> },
    AddEdge { u: usize, v: usize, weight: Weight },
    RemoveEdge { u: usize, v: usize },
    Mst { algorithm: Algorithm },
    PrintGraph,
    ResetGraph,
    Help,
    Exit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty command")]
    Empty,
    #[error("{command} requires {usage}")]
    MissingArguments { command: &'static str, usage: &'static str },
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

fn number<T: FromStr>(token: &str) -> Result<T, ProtocolError> {
    token
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(token.to_string()))
}

fn vertex(token: &str) -> Result<usize, ProtocolError> {
    let value: i64 = number(token)?;
    usize::try_from(value).map_err(|_| ProtocolError::InvalidNumber(token.to_string()))
}

fn vertex_count(token: &str) -> Result<usize, ProtocolError> {
    let value: i128 = number(token)?;
    if value < 0 {
        let clamped = i64::try_from(value).unwrap_or(i64::MIN);
        return Err(EngineError::NegativeVertexCount(clamped).into());
    }
    let count = usize::try_from(value).unwrap_or(usize::MAX);
    if count > MAX_VERTICES {
        return Err(EngineError::TooManyVertices {
            requested: u64::try_from(value).unwrap_or(u64::MAX),
            max: MAX_VERTICES,
        }
        .into());
    }
    Ok(count)
}

fn args<'a, const N: usize>(
    rest: &[&'a str],
    command: &'static str,
    usage: &'static str,
) -> Result<[&'a str; N], ProtocolError> {
    rest.get(..N)
        .and_then(|slice| <[&str; N]>::try_from(slice).ok())
        .ok_or(ProtocolError::MissingArguments { command, usage })
}

/// Parses one line.
pub fn parse(line: &str) -> Result<Request, ProtocolError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((first, rest)) = tokens.split_first() else {
        return Err(ProtocolError::Empty);
    };

    match first.to_ascii_lowercase().as_str() {
        "new_graph" | "newgraph" => {
            let [n] = args::<1>(rest, "new_graph", "<vertices>")?;
            let vertices = vertex_count(n)?;
            let edges = rest.get(1).map(|m| number(m)).transpose()?;
            Ok(Request::NewGraph { vertices, edges })
        }
        "add_edge" | "addedge" => {
            let [u, v, w] = args::<3>(rest, "add_edge", "<u> <v> <weight>")?;
            edge(u, v, w)
        }
        "remove_edge" | "removeedge" => {
            let [u, v] = args::<2>(rest, "remove_edge", "<u> <v>")?;
            Ok(Request::RemoveEdge {
                u: vertex(u)?,
                v: vertex(v)?,
            })
        }
        "mst_kruskal" => Ok(Request::Mst {
            algorithm: Algorithm::Kruskal,
        }),
        "mst_prim" => Ok(Request::Mst {
            algorithm: Algorithm::Prim,
        }),
        "mst" => {
            let [name] = args::<1>(rest, "mst", "an algorithm name (kruskal or prim)")?;
            Ok(Request::Mst {
                algorithm: Algorithm::from_name(name)?,
            })
        }
        "print_graph" | "printgraph" => Ok(Request::PrintGraph),
        "reset_graph" | "resetgraph" => Ok(Request::ResetGraph),
        "help" => Ok(Request::Help),
        "exit" | "quit" => Ok(Request::Exit),
        _ => match tokens.as_slice() {
            [u, v, w] if u.parse::<i64>().is_ok() => edge(u, v, w),
            _ => Err(ProtocolError::UnknownCommand(line.trim().to_string())),
        },
    }
}

fn edge(u: &str, v: &str, w: &str) -> Result<Request, ProtocolError> {
    let weight: Weight = number(w)?;
    if weight < 0 {
        return Err(EngineError::NegativeWeight(weight).into());
    }
    Ok(Request::AddEdge {
        u: vertex(u)?,
        v: vertex(v)?,
        weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_and_aliases() {
        assert_eq!(
            parse("new_graph 4").unwrap(),
            Request::NewGraph {
                vertices: 4,
                edges: None
            }
        );
        assert_eq!(
            parse("Newgraph 4 3").unwrap(),
            Request::NewGraph {
                vertices: 4,
                edges: Some(3)
            }
        );
        assert_eq!(parse("addedge 0 1 5").unwrap(), Request::AddEdge { u: 0, v: 1, weight: 5 });
        assert_eq!(parse("  2 3 4 ").unwrap(), Request::AddEdge { u: 2, v: 3, weight: 4 });
        assert_eq!(parse("remove_edge 1 2").unwrap(), Request::RemoveEdge { u: 1, v: 2 });
        assert_eq!(
            parse("MST Prim").unwrap(),
            Request::Mst {
                algorithm: Algorithm::Prim
            }
        );
        assert_eq!(
            parse("mst_kruskal").unwrap(),
            Request::Mst {
                algorithm: Algorithm::Kruskal
            }
        );
        assert_eq!(parse("printgraph").unwrap(), Request::PrintGraph);
        assert_eq!(parse("EXIT").unwrap(), Request::Exit);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(ProtocolError::Empty));
        assert!(matches!(parse("add_edge 0 1"), Err(ProtocolError::MissingArguments { .. })));
        assert_eq!(parse("new_graph x"), Err(ProtocolError::InvalidNumber("x".to_string())));
        assert_eq!(
            parse("new_graph -3"),
            Err(ProtocolError::Engine(EngineError::NegativeVertexCount(-3)))
        );
        assert_eq!(parse("add_edge -1 0 2"), Err(ProtocolError::InvalidNumber("-1".to_string())));
        assert_eq!(
            parse("mst boruvka"),
            Err(ProtocolError::Engine(EngineError::UnknownAlgorithm("boruvka".to_string())))
        );
        assert_eq!(parse("frobnicate"), Err(ProtocolError::UnknownCommand("frobnicate".to_string())));
    }

    #[test]
    fn test_vertex_count_is_bounded() {
        assert_eq!(
            parse("new_graph 1000000000000"),
            Err(ProtocolError::Engine(EngineError::TooManyVertices {
                requested: 1_000_000_000_000,
                max: MAX_VERTICES,
            }))
        );
        assert!(matches!(
            parse("new_graph 99999999999999999999999"),
            Err(ProtocolError::Engine(EngineError::TooManyVertices { .. }))
        ));
        assert_eq!(
            parse(&format!("new_graph {}", MAX_VERTICES)).unwrap(),
            Request::NewGraph {
                vertices: MAX_VERTICES,
                edges: None
            }
        );
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        assert_eq!(parse("2 3 -4"), Err(ProtocolError::Engine(EngineError::NegativeWeight(-4))));
        assert_eq!(
            parse("add_edge 0 1 -1"),
            Err(ProtocolError::Engine(EngineError::NegativeWeight(-1)))
        );
        assert_eq!(parse("add_edge 0 1 0").unwrap(), Request::AddEdge { u: 0, v: 1, weight: 0 });
    }

    #[test]
    fn test_error_display() {
        let err = parse("remove_edge 1").unwrap_err();
        assert_eq!(err.to_string(), "remove_edge requires <u> <v>");
    }
}
