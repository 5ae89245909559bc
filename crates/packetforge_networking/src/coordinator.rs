//! # Connection Coordinator
//!
//! Owns the network library, at most one client and at most one server.
//! Instances come from injected factories, so each gameplay context can
//! hand out transports with its own packet handlers already registered.
//! Every start builds a fresh instance; stopped instances are never reused.
//!
//! ## Shutdown Order
//!
//! ```text
//! stop server ─▶ poll until Stopped ─▶ stop client ─▶ poll until Stopped ─▶ release library
//! ```
//!
//! The library is only released once no host holds a lease on it.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use packetforge_core::Protocol;

use crate::client::GameClient;
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::library::NetworkLibrary;
use crate::queue::DrainSummary;
use crate::reason::DisconnectReason;
use crate::server::GameServer;
use crate::state::ConnectionState;
use crate::ticket::StartTicket;

/// Builds client instances.
pub trait ClientFactory<P: Protocol> {
    /// Returns a fresh, stopped client.
    fn create(&mut self, library: &NetworkLibrary, config: &TransportConfig) -> GameClient<P>;
}

impl<P, F> ClientFactory<P> for F
where
    P: Protocol,
    F: FnMut(&NetworkLibrary, &TransportConfig) -> GameClient<P>,
{
    fn create(&mut self, library: &NetworkLibrary, config: &TransportConfig) -> GameClient<P> {
        self(library, config)
    }
}

/// Builds server instances.
pub trait ServerFactory<P: Protocol> {
    /// Returns a fresh, stopped server.
    fn create(&mut self, library: &NetworkLibrary, config: &TransportConfig) -> GameServer<P>;
}

impl<P, F> ServerFactory<P> for F
where
    P: Protocol,
    F: FnMut(&NetworkLibrary, &TransportConfig) -> GameServer<P>,
{
    fn create(&mut self, library: &NetworkLibrary, config: &TransportConfig) -> GameServer<P> {
        self(library, config)
    }
}

/// Owner of the active client and server of protocol `P`.
pub struct Coordinator<P: Protocol> {
    library: NetworkLibrary,
    config: TransportConfig,
    client_factory: Box<dyn ClientFactory<P>>,
    server_factory: Box<dyn ServerFactory<P>>,
    client: Option<GameClient<P>>,
    server: Option<GameServer<P>>,
}

impl<P: Protocol> Coordinator<P> {
    /// Creates a coordinator with no instances.
    pub fn new(
        library: NetworkLibrary,
        config: TransportConfig,
        client_factory: impl ClientFactory<P> + 'static,
        server_factory: impl ServerFactory<P> + 'static,
    ) -> Self {
        Self {
            library,
            config,
            client_factory: Box::new(client_factory),
            server_factory: Box::new(server_factory),
            client: None,
            server: None,
        }
    }

    /// The library the instances are created from.
    #[inline]
    #[must_use]
    pub const fn library(&self) -> &NetworkLibrary {
        &self.library
    }

    /// Starts a fresh server on `bind`.
    pub fn start_server(&mut self, bind: SocketAddr) -> StartTicket<SocketAddr> {
        if self
            .server
            .as_ref()
            .is_some_and(|server| server.state() != ConnectionState::Stopped)
        {
            return StartTicket::ready(Err(TransportError::AlreadyRunning));
        }
        let server = self
            .server
            .insert(self.server_factory.create(&self.library, &self.config));
        server.start(bind)
    }

    /// Starts a fresh client connecting to `server`.
    pub fn start_client(&mut self, server: SocketAddr) -> StartTicket<()> {
        if self
            .client
            .as_ref()
            .is_some_and(|client| client.state() != ConnectionState::Stopped)
        {
            return StartTicket::ready(Err(TransportError::AlreadyRunning));
        }
        let client = self
            .client
            .insert(self.client_factory.create(&self.library, &self.config));
        client.connect(server)
    }

    /// Requests the server to stop.
    pub fn stop_server(&mut self, reason: DisconnectReason) {
        if let Some(server) = &self.server {
            server.disconnect(reason);
        }
    }

    /// Requests the client to disconnect.
    pub fn stop_client(&mut self, reason: DisconnectReason) {
        if let Some(client) = &self.client {
            client.disconnect(reason);
        }
    }

    /// Drains the server, then the client. Call once per tick.
    pub fn update(&mut self) -> DrainSummary {
        let mut summary = DrainSummary::default();
        if let Some(server) = self.server.as_mut() {
            summary += server.drain();
        }
        if let Some(client) = self.client.as_mut() {
            summary += client.drain();
        }
        summary
    }

    /// The current client, if one was started.
    #[must_use]
    pub fn client_mut(&mut self) -> Option<&mut GameClient<P>> {
        self.client.as_mut()
    }

    /// The current server, if one was started.
    #[must_use]
    pub fn server_mut(&mut self) -> Option<&mut GameServer<P>> {
        self.server.as_mut()
    }

    /// Whether a server is running.
    #[must_use]
    pub fn is_server_running(&self) -> bool {
        self.server.as_ref().is_some_and(GameServer::is_running)
    }

    /// Whether a client is connected.
    #[must_use]
    pub fn is_client_running(&self) -> bool {
        self.client.as_ref().is_some_and(GameClient::is_running)
    }

    /// Stops the server, then the client, then releases the library, all
    /// within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ShutdownTimeout`] when an instance is still
    /// running at the deadline, or [`TransportError::LibraryBusy`] when a
    /// host outside this coordinator still holds the library.
    pub fn shutdown(&mut self, timeout: Duration) -> TransportResult<()> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.shutdown_poll();
        let remaining = || deadline.saturating_duration_since(Instant::now());

        if let Some(server) = self.server.as_mut() {
            server.stop();
            server
                .wait_stopped(remaining(), poll)
                .map_err(|_| TransportError::ShutdownTimeout(timeout))?;
        }
        if let Some(client) = self.client.as_mut() {
            client.stop();
            client
                .wait_stopped(remaining(), poll)
                .map_err(|_| TransportError::ShutdownTimeout(timeout))?;
        }

        self.library.release()?;
        tracing::info!("networking shut down");
        Ok(())
    }
}

impl<P: Protocol> std::fmt::Debug for Coordinator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("library", &self.library)
            .field("client", &self.client)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}
