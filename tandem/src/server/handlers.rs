//! Event handlers used with the handle-set strategy.

use std::io;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Weak};

use tandem_api::handler::HandlerResult;
use tandem_api::{Disposition, EventHandler, EventType, Handle};
use tracing::{debug, warn};

use super::session::Connection;
use super::Connections;
use crate::config::SchedulerConfig;
use crate::leader_followers::HandleSet;

/// Accepts clients on a listening socket and registers a
/// [`CommandHandler`] for each.
pub struct AcceptHandler {
    listener: TcpListener,
    handle_set: Weak<HandleSet>,
    connections: Arc<Connections>,
    scheduler: SchedulerConfig,
}

impl AcceptHandler {
    pub fn new(
        listener: TcpListener,
        handle_set: Weak<HandleSet>,
        connections: Arc<Connections>,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            listener,
            handle_set,
            connections,
            scheduler,
        }
    }
}

impl EventHandler for AcceptHandler {
    fn handle_event(&self, _handle: Handle, _event: EventType) -> HandlerResult {
        let Some(handle_set) = self.handle_set.upgrade() else {
            return Ok(Disposition::Close);
        };
        let stream = match self.listener.accept() {
            Ok((stream, _)) => stream,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Disposition::Keep),
            Err(err) => return Err(err.into()),
        };

        let connection = Arc::new(Connection::new(stream, self.scheduler.clone())?);
        connection.greet()?;
        let id = connection.id();
        let handler = CommandHandler::new(Arc::clone(&connection), Arc::clone(&self.connections));
        self.connections.insert(id, connection);

        let handle = handler.handle();
        if !handle_set.register_handler(handle, EventType::Read, Arc::new(handler)) {
            warn!(%handle, "could not register client");
            self.connections.remove(&id);
        }
        Ok(Disposition::Keep)
    }

    fn handle(&self) -> Handle {
        Handle::new(self.listener.as_raw_fd())
    }
}

/// Serves commands arriving on one client connection.
pub struct CommandHandler {
    connection: Arc<Connection>,
    connections: Arc<Connections>,
}

impl CommandHandler {
    pub fn new(connection: Arc<Connection>, connections: Arc<Connections>) -> Self {
        Self {
            connection,
            connections,
        }
    }
}

impl EventHandler for CommandHandler {
    fn handle_event(&self, handle: Handle, _event: EventType) -> HandlerResult {
        if handle != self.handle() {
            return Err(format!("handle mismatch: got {}, expected {}", handle, self.handle()).into());
        }
        let disposition = self.connection.on_readable();
        if disposition == Disposition::Close {
            debug!(%handle, "closing client");
            self.connection.close();
            self.connections.remove(&self.connection.id());
        }
        Ok(disposition)
    }

    fn handle(&self) -> Handle {
        Handle::new(self.connection.fd())
    }
}
