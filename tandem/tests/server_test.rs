use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use tandem::config::{ServerConfig, ServerStrategy};
use tandem::MstServer;

const DEADLINE: Duration = Duration::from_secs(10);

fn start(strategy: ServerStrategy) -> MstServer {
    MstServer::start(ServerConfig {
        port: 0,
        strategy,
        threads: 3,
        ..Default::default()
    })
    .unwrap()
}

struct Client {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(server: &MstServer) -> Self {
        let stream = TcpStream::connect(server.local_addr()).unwrap();
        stream.set_read_timeout(Some(DEADLINE)).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = Self { writer: stream, reader };
        client.read_until("Type 'help'");
        client
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\n").unwrap();
    }

    /// Collects lines up to and including the first one starting with `prefix`.
    fn read_until(&mut self, prefix: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).unwrap();
            assert!(n > 0, "connection closed before {:?}; got {:?}", prefix, lines);
            let line = line.trim_end().to_string();
            let done = line.starts_with(prefix);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn run_session(server: &MstServer) {
    let mut client = Client::connect(server);

    client.send("new_graph 4");
    assert_eq!(client.read_until("Created"), vec!["Created new graph with 4 vertices"]);
    for edge in ["0 1 5", "add_edge 1 2 3", "addedge 2 3 2", "0 3 9"] {
        client.send(edge);
        client.read_until("Added edge");
    }

    client.send("mst_kruskal");
    let reply = client.read_until("Average Distance");
    assert_eq!(reply[0], "MST using kruskal's algorithm:");
    assert!(reply.contains(&"Total Weight: 10".to_string()));
    assert!(reply.contains(&"Longest Distance: 10".to_string()));
    assert!(reply.contains(&"Shortest Distance (0 -> 3): 10".to_string()));
    assert_eq!(reply.last().unwrap(), "Average Distance: 5.50");

    client.send("remove_edge 1 2");
    client.read_until("Removed edge");
    client.send("mst prim");
    let reply = client.read_until("Average Distance");
    assert!(reply.contains(&"Total Weight: 16".to_string()));

    client.send("add_edge 0 9 1");
    assert_eq!(
        client.read_until("Error"),
        vec!["Error: Vertex 9 out of range (graph has 4 vertices)"]
    );
    client.send("frobnicate");
    assert_eq!(client.read_until("Error"), vec!["Error: Unknown command: frobnicate"]);

    client.send("exit");
    client.read_until("Goodbye!");
}

// Test a full session against the reactor strategy
#[test]
fn test_reactor_server_session() {
    let server = start(ServerStrategy::Reactor);
    run_session(&server);
    assert!(wait_until(|| server.connection_count() == 0));
    server.stop();
    assert!(!server.is_running());
}

// Test a full session against the handle set strategy
#[test]
fn test_handle_set_server_session() {
    let server = start(ServerStrategy::HandleSet);
    run_session(&server);
    assert!(wait_until(|| server.connection_count() == 0));
    server.stop();
}

// Test that concurrent clients get independent graphs
#[test]
fn test_clients_are_isolated() {
    for strategy in [ServerStrategy::Reactor, ServerStrategy::HandleSet] {
        let server = start(strategy);
        let mut first = Client::connect(&server);
        let mut second = Client::connect(&server);
        assert!(wait_until(|| server.connection_count() == 2));

        first.send("new_graph 2");
        first.read_until("Created");
        first.send("0 1 4");
        first.read_until("Added edge");

        second.send("mst_prim");
        assert_eq!(second.read_until("Error"), vec!["Error: Graph is not initialized"]);

        first.send("mst_prim");
        let reply = first.read_until("Average Distance");
        assert!(reply.contains(&"Total Weight: 4".to_string()));

        server.stop();
        assert_eq!(server.connection_count(), 0);
    }
}

// Test that stop closes connected clients
#[test]
fn test_stop_disconnects_clients() {
    let server = start(ServerStrategy::Reactor);
    let mut client = Client::connect(&server);
    server.stop();

    let mut line = String::new();
    let n = client.reader.read_line(&mut line).unwrap_or(0);
    assert_eq!(n, 0);
}
