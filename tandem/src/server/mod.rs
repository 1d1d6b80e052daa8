//! # MST Server
//!
//! TCP front end that gives every client its own [`crate::MstProxy`] and
//! serves the line protocol from [`protocol`] with one of two
//! leader/followers strategies:
//!
//! - [`ServerStrategy::Reactor`]: the listener and every client are reactor
//!   callbacks driven by a [`LeaderFollowersPool`]
//! - [`ServerStrategy::HandleSet`]: an [`AcceptHandler`] and one
//!   [`CommandHandler`] per client in a [`HandleSet`] driven by a
//!   [`HandleSetPool`]

pub mod handlers;
pub mod protocol;
pub mod session;

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::ops::ControlFlow;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tandem_api::{Disposition, EventHandler, EventType};
use tracing::{error, info, warn};
use uuid::Uuid;

pub use handlers::{AcceptHandler, CommandHandler};
pub use session::{Connection, Reply, Session};

use crate::config::{
    HandleSetPoolConfig, LeaderFollowersConfig, SchedulerConfig, ServerConfig, ServerStrategy,
};
use crate::error::SystemError;
use crate::leader_followers::{callback, HandleSet, HandleSetPool, LeaderFollowersPool, Reactor};
use crate::log_error;

/// Live client connections keyed by session id.
#[derive(Default)]
pub struct Connections {
    inner: Mutex<HashMap<Uuid, Arc<Connection>>>,
}

impl Connections {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Connection>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: Uuid, connection: Arc<Connection>) {
        self.lock().insert(id, connection);
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Connection>> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Closes and forgets every connection.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, connection)| connection).collect();
        for connection in drained {
            connection.close();
        }
    }
}

enum Runtime {
    Reactor(LeaderFollowersPool),
    HandleSet(HandleSetPool),
}

pub struct MstServer {
    local_addr: SocketAddr,
    strategy: ServerStrategy,
    connections: Arc<Connections>,
    runtime: Mutex<Option<Runtime>>,
}

impl MstServer {
    /// Binds the listener and starts serving.
    pub fn start(config: ServerConfig) -> Result<Self, SystemError> {
        config.scheduler.validate()?;
        let listener = TcpListener::bind(config.socket_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let connections = Arc::new(Connections::default());

        let runtime = match config.strategy {
            ServerStrategy::Reactor => Runtime::Reactor(start_reactor(&config, listener, &connections)?),
            ServerStrategy::HandleSet => {
                Runtime::HandleSet(start_handle_set(&config, listener, &connections)?)
            }
        };
        info!(addr = %local_addr, strategy = ?config.strategy, threads = config.threads, "MST server listening");

        Ok(Self {
            local_addr,
            strategy: config.strategy,
            connections,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn strategy(&self) -> ServerStrategy {
        self.strategy
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Stops the worker pool and closes every session. Idempotent.
    pub fn stop(&self) {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(runtime) = runtime else {
            return;
        };
        match runtime {
            Runtime::Reactor(pool) => {
                pool.stop();
                pool.reactor().stop();
            }
            Runtime::HandleSet(pool) => {
                pool.stop();
                pool.handle_set().clear();
            }
        }
        self.connections.close_all();
        info!(addr = %self.local_addr, "MST server stopped");
    }
}

impl Drop for MstServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn start_reactor(
    config: &ServerConfig,
    listener: TcpListener,
    connections: &Arc<Connections>,
) -> Result<LeaderFollowersPool, SystemError> {
    let pool = LeaderFollowersPool::new(LeaderFollowersConfig {
        num_threads: config.threads,
        ..Default::default()
    })?;

    let reactor = Arc::downgrade(pool.reactor());
    let connections = Arc::clone(connections);
    let scheduler = config.scheduler.clone();
    let listener_fd = listener.as_raw_fd();
    pool.add_fd(
        listener_fd,
        callback(move |_| {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(err) = register_client(&reactor, &connections, stream, &scheduler) {
                        log_error!(err, "client setup failed");
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => {
                    log_error!(err, "accept failed");
                }
            }
            ControlFlow::Continue(())
        }),
    )?;
    pool.start(config.threads)?;
    Ok(pool)
}

fn register_client(
    reactor: &Weak<Reactor>,
    connections: &Arc<Connections>,
    stream: std::net::TcpStream,
    scheduler: &SchedulerConfig,
) -> Result<(), SystemError> {
    let Some(reactor) = reactor.upgrade() else {
        return Ok(());
    };
    let connection = Arc::new(Connection::new(stream, scheduler.clone())?);
    connection.greet()?;
    let id = connection.id();
    let fd = connection.fd();
    connections.insert(id, Arc::clone(&connection));

    let registry = Arc::downgrade(connections);
    let client = callback(move |_| match connection.on_readable() {
        Disposition::Keep => ControlFlow::Continue(()),
        Disposition::Close => {
            connection.close();
            if let Some(registry) = registry.upgrade() {
                registry.remove(&id);
            }
            ControlFlow::Break(())
        }
    });
    if let Err(err) = reactor.add_fd(fd, client) {
        warn!(fd, error = %err, "client rejected by reactor");
        if let Some(connection) = connections.remove(&id) {
            connection.close();
        }
        return Err(err.into());
    }
    Ok(())
}

fn start_handle_set(
    config: &ServerConfig,
    listener: TcpListener,
    connections: &Arc<Connections>,
) -> Result<HandleSetPool, SystemError> {
    let handle_set = Arc::new(HandleSet::new()?);
    let acceptor = AcceptHandler::new(
        listener,
        Arc::downgrade(&handle_set),
        Arc::clone(connections),
        config.scheduler.clone(),
    );
    let handle = acceptor.handle();
    if !handle_set.register_handler(handle, EventType::Accept, Arc::new(acceptor)) {
        error!(%handle, "listener handle rejected");
        return Err(SystemError::InvalidConfig(format!("cannot register listener {}", handle)));
    }

    let pool = HandleSetPool::new(
        HandleSetPoolConfig {
            num_threads: config.threads,
            ..Default::default()
        },
        handle_set,
    );
    pool.start()?;
    Ok(pool)
}
