//! tandem-server: MST service over TCP.
//!
//! Each client gets a private graph behind an active object; connections are
//! multiplexed by a leader/followers pool. Runs until stdin reaches EOF or a
//! `quit` line is typed.

use std::io::{self, BufRead};
use std::net::IpAddr;

use clap::{Parser, ValueEnum};
use tandem::config::{GuardPolicy, SchedulerConfig, ServerConfig, ServerStrategy, DEFAULT_PORT};
use tandem::logging::{self, LogConfig};
use tandem::MstServer;
use tracing::{info, Level};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Reactor callbacks driven by a leader/followers pool
    Reactor,
    /// Accept and command handlers in a handle set
    HandleSet,
}

#[derive(Parser, Debug)]
#[command(name = "tandem-server", version, about)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    address: IpAddr,

    /// TCP port; 0 picks an ephemeral one.
    #[arg(short, long, env = "TANDEM_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Worker threads in the leader/followers pool.
    #[arg(short, long, env = "TANDEM_THREADS")]
    threads: Option<usize>,

    /// Dispatch strategy.
    #[arg(long, value_enum, default_value_t = Mode::Reactor)]
    mode: Mode,

    /// Per-session activation queue capacity (unbounded when omitted).
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Requeue unready requests with this backoff instead of parking them.
    #[arg(long)]
    requeue_backoff_ms: Option<u64>,

    /// Emit JSON logs.
    #[arg(long)]
    json: bool,

    /// Minimum log level.
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Extra per-target filters, e.g. "tandem::leader_followers=trace".
    #[arg(long)]
    log_filter: Option<String>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            address: self.address,
            port: self.port,
            strategy: match self.mode {
                Mode::Reactor => ServerStrategy::Reactor,
                Mode::HandleSet => ServerStrategy::HandleSet,
            },
            threads: self.threads.unwrap_or(defaults.threads),
            scheduler: SchedulerConfig {
                queue_capacity: self.queue_capacity,
                guard_policy: match self.requeue_backoff_ms {
                    Some(ms) => GuardPolicy::Requeue {
                        backoff: std::time::Duration::from_millis(ms),
                    },
                    None => GuardPolicy::Park,
                },
                ..defaults.scheduler
            },
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(LogConfig {
        level: cli.log_level,
        json_format: cli.json,
        target_filters: cli.log_filter.clone(),
        ..Default::default()
    });

    let server = MstServer::start(cli.server_config())?;
    info!(addr = %server.local_addr(), "type 'quit' or send EOF to stop");

    for line in io::stdin().lock().lines() {
        if line?.trim().eq_ignore_ascii_case("quit") {
            break;
        }
    }

    server.stop();
    Ok(())
}
