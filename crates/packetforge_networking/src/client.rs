//! # Game Client
//!
//! Client side of the dual-threaded transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────┐  WorkerCommand  ┌───────────────────────────┐
//! │ consumer thread        │ ──────────────▶ │ packetforge-client thread │
//! │  send / stop / drain   │                 │  owns the Host            │
//! │  handlers + callbacks  │ ◀────────────── │  decodes inbound frames   │
//! └────────────────────────┘ packets, events └───────────────────────────┘
//! ```
//!
//! The consumer calls [`GameClient::drain`] once per tick; nothing ever
//! blocks on the network from the consumer side.

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use packetforge_core::{PacketKind, PacketSet, Protocol};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::handlers::HandlerTable;
use crate::host::{check_datagram_frame, Host, HostEvent, PeerId};
use crate::library::NetworkLibrary;
use crate::queue::{decode_inbound, record_sent, ClientEvent, DrainSummary, Queue, WorkerCommand};
use crate::reason::DisconnectReason;
use crate::state::{CancellationToken, ConnectionState, SharedState, StoppedGuard};
use crate::stats::{SharedStats, TransportStats};
use crate::ticket::StartTicket;

/// Name of the client worker thread.
pub const CLIENT_THREAD_NAME: &str = "packetforge-client";

/// Client transport for protocol `P`.
///
/// Not `Send`: handlers and callbacks belong to the consumer thread.
pub struct GameClient<P: Protocol> {
    library: NetworkLibrary,
    config: TransportConfig,
    disabled: bool,
    state: SharedState,
    stats: SharedStats,
    cancel: CancellationToken,
    commands: Queue<WorkerCommand>,
    packets: Queue<P::ServerPackets>,
    events: Queue<ClientEvent>,
    handlers: HandlerTable<P::ServerPackets, ()>,
    on_connected: Option<Box<dyn FnMut()>>,
    on_disconnected: Option<Box<dyn FnMut(DisconnectReason)>>,
    on_timed_out: Option<Box<dyn FnMut()>>,
    worker: Option<JoinHandle<()>>,
    _protocol: PhantomData<P>,
}

impl<P: Protocol> GameClient<P> {
    /// Creates a stopped client. A client created from an unavailable
    /// library runs disabled.
    #[must_use]
    pub fn new(library: &NetworkLibrary, config: &TransportConfig) -> Self {
        let disabled = !library.is_available();
        if disabled {
            tracing::warn!("network library unavailable, client disabled");
        }
        Self {
            library: library.clone(),
            config: config.clone(),
            disabled,
            state: SharedState::new(),
            stats: SharedStats::default(),
            cancel: CancellationToken::new(),
            commands: Queue::new(),
            packets: Queue::new(),
            events: Queue::new(),
            handlers: HandlerTable::new(),
            on_connected: None,
            on_disconnected: None,
            on_timed_out: None,
            worker: None,
            _protocol: PhantomData,
        }
    }

    /// Whether the client was created without a usable network library.
    #[inline]
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether a worker is alive, in any state but `Stopped`.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.get() != ConnectionState::Stopped
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        *self.stats.lock()
    }

    /// Registers the handler of server packet `T`.
    pub fn register_packet_handler<T, F>(&mut self, mut handler: F)
    where
        T: PacketKind<P::ServerPackets>,
        F: FnMut(T) + 'static,
    {
        self.handlers.register::<T, _>(move |(), packet| handler(packet));
    }

    /// Called on the consumer thread when the handshake completes.
    pub fn on_connected(&mut self, callback: impl FnMut() + 'static) {
        self.on_connected = Some(Box::new(callback));
    }

    /// Called on the consumer thread when the connection ends.
    pub fn on_disconnected(&mut self, callback: impl FnMut(DisconnectReason) + 'static) {
        self.on_disconnected = Some(Box::new(callback));
    }

    /// Called on the consumer thread when the server goes silent.
    pub fn on_timed_out(&mut self, callback: impl FnMut() + 'static) {
        self.on_timed_out = Some(Box::new(callback));
    }

    /// Starts connecting to `server` on a new worker thread.
    ///
    /// The returned ticket resolves once the handshake completes or fails.
    pub fn connect(&mut self, server: SocketAddr) -> StartTicket<()> {
        if self.disabled {
            tracing::warn!(%server, "connect ignored, client disabled");
            return StartTicket::ready(Err(TransportError::Disabled));
        }
        if !self
            .state
            .transition(ConnectionState::Stopped, ConnectionState::Starting)
        {
            return StartTicket::ready(Err(TransportError::AlreadyRunning));
        }
        self.reap_worker();

        let stale = self.commands.clear() + self.packets.clear() + self.events.clear();
        if stale > 0 {
            tracing::debug!(stale, "discarded queues of the previous connection");
        }
        self.cancel = CancellationToken::new();

        let (ready, ticket) = StartTicket::channel();
        let worker = ClientWorker::<P::ServerPackets> {
            library: self.library.clone(),
            config: self.config.clone(),
            server,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            stats: self.stats.clone(),
            commands: self.commands.receiver.clone(),
            packets: self.packets.sender.clone(),
            events: self.events.sender.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(CLIENT_THREAD_NAME.into())
            .spawn(move || worker.run(&ready));
        match spawned {
            Ok(handle) => {
                tracing::info!(%server, "client connecting");
                self.worker = Some(handle);
                ticket
            }
            Err(err) => {
                self.state.set(ConnectionState::Stopped);
                tracing::error!(error = %err, "failed to spawn client worker");
                StartTicket::ready(Err(TransportError::Spawn(err)))
            }
        }
    }

    /// Encodes `packet` and queues it for the server.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRunning`] when not connected, or
    /// [`TransportError::Protocol`] when the frame exceeds the size ceiling.
    pub fn send<T: PacketKind<P::ClientPackets>>(&self, packet: &T) -> TransportResult<()> {
        if self.skip_disabled("send") {
            return Ok(());
        }
        self.ensure_running()?;
        let frame = packet.to_frame()?;
        self.queue_frame(frame)
    }

    /// Encodes a packet of the client set and queues it.
    ///
    /// # Errors
    ///
    /// Same as [`GameClient::send`].
    pub fn send_packet(&self, packet: &P::ClientPackets) -> TransportResult<()> {
        if self.skip_disabled("send") {
            return Ok(());
        }
        self.ensure_running()?;
        let frame = packet.to_frame()?;
        self.queue_frame(frame)
    }

    /// Queues a pre-encoded frame without checking its contents.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRunning`] when not connected, or
    /// [`TransportError::FrameTooLarge`] when no datagram can carry it.
    pub fn send_raw_frame(&self, frame: Vec<u8>) -> TransportResult<()> {
        if self.skip_disabled("send") {
            return Ok(());
        }
        self.ensure_running()?;
        check_datagram_frame(frame.len())?;
        self.queue_frame(frame)
    }

    /// Runs handlers for every packet, then callbacks for every event,
    /// queued when the call starts. Never blocks.
    pub fn drain(&mut self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        let queued = self.packets.receiver.len();
        for packet in self.packets.receiver.try_iter().take(queued) {
            if self.handlers.dispatch((), packet) {
                summary.packets += 1;
            } else {
                summary.unhandled += 1;
            }
        }

        let queued = self.events.receiver.len();
        for event in self.events.receiver.try_iter().take(queued) {
            summary.events += 1;
            match event {
                ClientEvent::Connected => {
                    if let Some(callback) = self.on_connected.as_mut() {
                        callback();
                    }
                }
                ClientEvent::Disconnected(reason) => {
                    if let Some(callback) = self.on_disconnected.as_mut() {
                        callback(reason);
                    }
                }
                ClientEvent::TimedOut => {
                    if let Some(callback) = self.on_timed_out.as_mut() {
                        callback();
                    }
                }
            }
        }

        summary
    }

    /// Requests a normal disconnect. Repeated calls are harmless.
    pub fn stop(&self) {
        self.disconnect(DisconnectReason::Normal);
    }

    /// Requests a disconnect with `reason`. Repeated calls are harmless.
    pub fn disconnect(&self, reason: DisconnectReason) {
        if self.skip_disabled("disconnect") {
            return;
        }
        let stopping = self
            .state
            .transition(ConnectionState::Running, ConnectionState::Stopping)
            || self
                .state
                .transition(ConnectionState::Starting, ConnectionState::Stopping);
        if !stopping {
            tracing::debug!(state = ?self.state.get(), "stop ignored");
            return;
        }
        self.cancel.cancel();
        // the worker owns the receiver until it exits
        let _ = self.commands.sender.send(WorkerCommand::Disconnect(reason));
        tracing::info!(%reason, "client stopping");
    }

    /// Polls every `poll` until the worker has stopped, then reaps it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ShutdownTimeout`] when still running after
    /// `timeout`.
    pub fn wait_stopped(&mut self, timeout: Duration, poll: Duration) -> TransportResult<()> {
        let deadline = Instant::now() + timeout;
        while self.state.get() != ConnectionState::Stopped {
            if Instant::now() >= deadline {
                return Err(TransportError::ShutdownTimeout(timeout));
            }
            std::thread::sleep(poll);
        }
        self.reap_worker();
        Ok(())
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("client worker panicked");
            }
        }
    }

    fn skip_disabled(&self, operation: &'static str) -> bool {
        if self.disabled {
            tracing::warn!(operation, "ignored, client disabled");
        }
        self.disabled
    }

    fn ensure_running(&self) -> TransportResult<()> {
        if self.state.get() == ConnectionState::Running {
            Ok(())
        } else {
            Err(TransportError::NotRunning)
        }
    }

    fn queue_frame(&self, frame: Vec<u8>) -> TransportResult<()> {
        self.commands
            .sender
            .send(WorkerCommand::Send {
                peer: PeerId::SERVER,
                frame,
            })
            .map_err(|_| TransportError::WorkerExited)
    }
}

impl<P: Protocol> Drop for GameClient<P> {
    fn drop(&mut self) {
        if !self.disabled && self.state.get() != ConnectionState::Stopped {
            self.stop();
        }
    }
}

impl<P: Protocol> std::fmt::Debug for GameClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("state", &self.state.get())
            .field("disabled", &self.disabled)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Everything the worker thread owns.
struct ClientWorker<S: PacketSet> {
    library: NetworkLibrary,
    config: TransportConfig,
    server: SocketAddr,
    state: SharedState,
    cancel: CancellationToken,
    stats: SharedStats,
    commands: Receiver<WorkerCommand>,
    packets: Sender<S>,
    events: Sender<ClientEvent>,
}

impl<S: PacketSet> ClientWorker<S> {
    fn run(self, ready: &Sender<TransportResult<()>>) {
        let _guard = StoppedGuard::new(self.state.clone());

        let (mut host, early) = match self.establish() {
            Ok(established) => established,
            Err(err) => {
                tracing::warn!(server = %self.server, error = %err, "client failed to connect");
                let _ = ready.send(Err(err));
                return;
            }
        };

        if !self
            .state
            .transition(ConnectionState::Starting, ConnectionState::Running)
        {
            host.disconnect_all(DisconnectReason::Stopping);
            let _ = ready.send(Err(TransportError::Cancelled));
            return;
        }
        let _ = ready.send(Ok(()));
        let _ = self.events.send(ClientEvent::Connected);
        tracing::info!(server = %self.server, "client connected");

        if self.handle_events(early) {
            self.service_loop(&mut host);
        }
        self.state.set(ConnectionState::Stopping);
        drop(host);
        tracing::info!(server = %self.server, "client stopped");
    }

    /// Opens the host and completes the handshake. Events that arrived
    /// together with the handshake are returned with the host.
    fn establish(&self) -> TransportResult<(Host, Vec<HostEvent>)> {
        let mut host = Host::client(&self.library, self.server, &self.config)?;
        host.connect(self.server)?;

        let deadline = Instant::now() + self.config.connect_timeout();
        loop {
            if self.cancel.is_cancelled() {
                host.disconnect_all(DisconnectReason::Stopping);
                return Err(TransportError::Cancelled);
            }
            if Instant::now() >= deadline {
                host.disconnect_all(DisconnectReason::Normal);
                return Err(TransportError::ConnectTimeout(self.config.connect_timeout()));
            }
            let mut events = host.service(self.config.poll_interval())?.into_iter();
            while let Some(event) = events.next() {
                match event {
                    HostEvent::Connected(_) => return Ok((host, events.collect())),
                    HostEvent::Disconnected(_, reason) => {
                        return Err(TransportError::Rejected(reason))
                    }
                    HostEvent::TimedOut(_) | HostEvent::Received(..) => {}
                }
            }
        }
    }

    fn service_loop(&self, host: &mut Host) {
        loop {
            for command in self.commands.try_iter() {
                match command {
                    WorkerCommand::Send { peer, frame } => {
                        let len = frame.len();
                        match host.send(peer, frame) {
                            Ok(()) => record_sent(&self.stats, len, 1),
                            Err(err) => tracing::warn!(error = %err, "send failed"),
                        }
                    }
                    WorkerCommand::Broadcast(frame) => {
                        let copies = host.peer_count();
                        match host.broadcast(&frame) {
                            Ok(()) => record_sent(&self.stats, frame.len(), copies),
                            Err(err) => tracing::warn!(error = %err, "broadcast failed"),
                        }
                    }
                    WorkerCommand::Kick(peer, _) => {
                        tracing::debug!(%peer, "kick ignored by client");
                    }
                    WorkerCommand::Disconnect(reason) => {
                        host.disconnect_all(reason);
                        let _ = self.events.send(ClientEvent::Disconnected(reason));
                        return;
                    }
                }
            }

            let events = match host.service(self.config.poll_interval()) {
                Ok(events) => events,
                Err(err) => {
                    tracing::error!(error = %err, "client host failed");
                    let _ = self.events.send(ClientEvent::Disconnected(DisconnectReason::Failed));
                    return;
                }
            };
            self.stats.lock().resends += host.take_resends();

            if !self.handle_events(events) {
                return;
            }
        }
    }

    /// Forwards host events to the consumer; false once the connection ended.
    fn handle_events(&self, events: Vec<HostEvent>) -> bool {
        for event in events {
            match event {
                HostEvent::Received(_, frame) => {
                    if let Some(packet) = decode_inbound::<S>(&frame, &self.stats) {
                        let _ = self.packets.send(packet);
                    }
                }
                HostEvent::Disconnected(_, reason) => {
                    tracing::info!(%reason, "server closed the connection");
                    let _ = self.events.send(ClientEvent::Disconnected(reason));
                    return false;
                }
                HostEvent::TimedOut(_) => {
                    tracing::warn!("server timed out");
                    let _ = self.events.send(ClientEvent::TimedOut);
                    return false;
                }
                HostEvent::Connected(_) => {}
            }
        }
        true
    }
}
