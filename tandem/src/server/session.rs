//! Per-connection state.
//!
//! A [`Session`] owns its own [`MstProxy`], so every client gets a private
//! servant and scheduler thread. The session also keeps a mirror of the
//! graph it has sent, which lets it answer range errors synchronously and
//! hand a graph snapshot to the shortest-distance query.

use std::fmt::Write as _;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tandem_api::{Algorithm, Disposition, EngineError, Graph, Weight};
use tracing::{debug, info};
use uuid::Uuid;

use super::protocol::{self, Request, HELP, WELCOME};
use crate::active_object::{Future, MstProxy};
use crate::config::SchedulerConfig;
use crate::error::{SystemError, TaskError};
use crate::log_error;

const READ_BUFFER_SIZE: usize = 4096;

/// Upper bound on waiting for one query result.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Text to send back, and whether the connection ends after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub close: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            close: false,
        }
    }

    fn error(err: impl std::fmt::Display) -> Self {
        Self::text(format!("Error: {}\n", err))
    }
}

pub struct Session {
    id: Uuid,
    proxy: MstProxy,
    graph: Option<Graph>,
    pending: String,
}

impl Session {
    pub fn new(scheduler: SchedulerConfig) -> Result<Self, SystemError> {
        Ok(Self {
            id: Uuid::new_v4(),
            proxy: MstProxy::with_config(scheduler)?,
            graph: None,
            pending: String::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn proxy(&self) -> &MstProxy {
        &self.proxy
    }

    /// Buffers `bytes` and answers every complete line. Lines after an
    /// `exit` are ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Reply> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut replies = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if line.trim().is_empty() {
                continue;
            }
            let reply = self.handle_line(&line);
            let close = reply.close;
            replies.push(reply);
            if close {
                self.pending.clear();
                break;
            }
        }
        replies
    }

    /// Executes one command line.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        debug!(session = %self.id, command = line.trim(), "command received");
        match protocol::parse(line) {
            Ok(request) => self.execute(request),
            Err(err) => Reply::error(err),
        }
    }

    fn execute(&mut self, request: Request) -> Reply {
        match request {
            Request::NewGraph { vertices, edges } => {
                self.graph = Some(Graph::new(vertices));
                self.proxy.init_graph(vertices);
                let mut text = format!("Created new graph with {} vertices\n", vertices);
                if let Some(count) = edges.filter(|count| *count > 0) {
                    let _ = writeln!(text, "Ready to receive {} edges", count);
                }
                Reply::text(text)
            }
            Request::AddEdge { u, v, weight } => self.add_edge(u, v, weight),
            Request::RemoveEdge { u, v } => self.remove_edge(u, v),
            Request::Mst { algorithm } => self.compute_mst(algorithm),
            Request::PrintGraph => match self.graph {
                None => Reply::error(EngineError::GraphNotInitialized),
                Some(_) => match wait(self.proxy.describe()) {
                    Ok(text) => Reply::text(text),
                    Err(err) => Reply::error(err),
                },
            },
            Request::ResetGraph => {
                self.graph = Some(Graph::new(0));
                self.proxy.init_graph(0);
                Reply::text("Graph has been reset\n")
            }
            Request::Help => Reply::text(HELP),
            Request::Exit => Reply {
                text: "Goodbye!\n".to_string(),
                close: true,
            },
        }
    }

    fn add_edge(&mut self, u: usize, v: usize, weight: Weight) -> Reply {
        let Some(graph) = self.graph.as_mut() else {
            return Reply::error(EngineError::GraphNotInitialized);
        };
        if let Err(err) = graph.add_edge(u, v, weight) {
            return Reply::error(err);
        }
        self.proxy.add_edge(u, v, weight);
        Reply::text(format!("Added edge from {} to {} with weight {}\n", u, v, weight))
    }

    fn remove_edge(&mut self, u: usize, v: usize) -> Reply {
        let Some(graph) = self.graph.as_mut() else {
            return Reply::error(EngineError::GraphNotInitialized);
        };
        match graph.remove_edge(u, v) {
            Ok(true) => {
                self.proxy.remove_edge(u, v);
                Reply::text(format!("Removed edge between {} and {}\n", u, v))
            }
            Ok(false) => Reply::error(format!("No edge between {} and {}", u, v)),
            Err(err) => Reply::error(err),
        }
    }

    /// Computes the MST and gathers every metric through the proxy.
    fn compute_mst(&mut self, algorithm: Algorithm) -> Reply {
        let Some(graph) = self.graph.as_ref() else {
            return Reply::error(EngineError::GraphNotInitialized);
        };
        let vertices = graph.vertices();

        let mst = self.proxy.compute_mst(algorithm.name());
        let weight = self.proxy.get_weight();
        let longest = self.proxy.get_longest_dist();
        let shortest = (vertices > 0).then(|| self.proxy.get_shortest_dist(graph.clone(), 0, vertices - 1));
        let average = self.proxy.get_avg_dist();

        let mut text = match wait(mst) {
            Ok(mst) => format!("MST using {}'s algorithm:\n{}", algorithm.name(), mst),
            Err(err) => return Reply::error(err),
        };
        let metrics = (|| -> Result<(), TaskError> {
            let _ = writeln!(text, "Total Weight: {}", wait(weight)?);
            let _ = writeln!(text, "Longest Distance: {}", wait(longest)?);
            if let Some(shortest) = shortest {
                let _ = writeln!(text, "Shortest Distance (0 -> {}): {}", vertices - 1, wait(shortest)?);
            }
            let _ = writeln!(text, "Average Distance: {:.2}", wait(average)?);
            Ok(())
        })();
        match metrics {
            Ok(()) => Reply::text(text),
            Err(err) => Reply::error(err),
        }
    }
}

fn wait<T: Clone>(future: Future<T>) -> Result<T, TaskError> {
    future
        .get_timeout(REPLY_TIMEOUT)
        .unwrap_or_else(|| Err(TaskError::Execution("timed out waiting for result".to_string())))
}

/// A client socket and its session.
pub struct Connection {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    session: Mutex<Session>,
}

impl Connection {
    pub fn new(stream: TcpStream, scheduler: SchedulerConfig) -> Result<Self, SystemError> {
        stream.set_nonblocking(false)?;
        let peer = stream.peer_addr().ok();
        let session = Session::new(scheduler)?;
        info!(session = %session.id(), peer = ?peer, "client connected");
        Ok(Self {
            stream,
            peer,
            session: Mutex::new(session),
        })
    }

    pub fn id(&self) -> Uuid {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).id()
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn greet(&self) -> io::Result<()> {
        (&self.stream).write_all(WELCOME.as_bytes())
    }

    /// Reads what is available, answers complete lines, and reports whether
    /// the connection should stay open.
    pub fn on_readable(&self) -> Disposition {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let n = match (&self.stream).read(&mut buf) {
            Ok(0) => {
                info!(peer = ?self.peer, "client disconnected");
                return Disposition::Close;
            }
            Ok(n) => n,
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return Disposition::Keep;
            }
            Err(err) => {
                log_error!(err, peer = ?self.peer, "read failed");
                return Disposition::Close;
            }
        };

        let replies = self.session.lock().unwrap_or_else(PoisonError::into_inner).feed(&buf[..n]);
        for reply in replies {
            if let Err(err) = (&self.stream).write_all(reply.text.as_bytes()) {
                log_error!(err, peer = ?self.peer, "write failed");
                return Disposition::Close;
            }
            if reply.close {
                return Disposition::Close;
            }
        }
        Disposition::Keep
    }

    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
