//! # Game Server
//!
//! Server side of the dual-threaded transport. One worker thread named
//! `packetforge-server` owns the host and serves every peer; the consumer
//! thread sends, kicks and drains exactly like a [`crate::GameClient`].

use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use packetforge_core::{PacketKind, PacketSet, Protocol};
use parking_lot::Mutex;

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::handlers::HandlerTable;
use crate::host::{check_datagram_frame, Host, HostEvent, PeerId};
use crate::library::NetworkLibrary;
use crate::queue::{decode_inbound, record_sent, DrainSummary, Queue, ServerEvent, WorkerCommand};
use crate::reason::DisconnectReason;
use crate::state::{CancellationToken, ConnectionState, SharedState, StoppedGuard};
use crate::stats::{SharedStats, TransportStats};
use crate::ticket::StartTicket;

/// Name of the server worker thread.
pub const SERVER_THREAD_NAME: &str = "packetforge-server";

type PeerCallback = Box<dyn FnMut(PeerId)>;

/// Server transport for protocol `P`.
pub struct GameServer<P: Protocol> {
    library: NetworkLibrary,
    config: TransportConfig,
    disabled: bool,
    state: SharedState,
    stats: SharedStats,
    cancel: CancellationToken,
    peer_count: Arc<AtomicUsize>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
    commands: Queue<WorkerCommand>,
    packets: Queue<(PeerId, P::ClientPackets)>,
    events: Queue<ServerEvent>,
    handlers: HandlerTable<P::ClientPackets, PeerId>,
    on_peer_connected: Option<PeerCallback>,
    on_peer_disconnected: Option<Box<dyn FnMut(PeerId, DisconnectReason)>>,
    on_peer_timed_out: Option<PeerCallback>,
    worker: Option<JoinHandle<()>>,
    _protocol: PhantomData<P>,
}

impl<P: Protocol> GameServer<P> {
    /// Creates a stopped server. A server created from an unavailable
    /// library runs disabled.
    #[must_use]
    pub fn new(library: &NetworkLibrary, config: &TransportConfig) -> Self {
        let disabled = !library.is_available();
        if disabled {
            tracing::warn!("network library unavailable, server disabled");
        }
        Self {
            library: library.clone(),
            config: config.clone(),
            disabled,
            state: SharedState::new(),
            stats: SharedStats::default(),
            cancel: CancellationToken::new(),
            peer_count: Arc::new(AtomicUsize::new(0)),
            local_addr: Arc::new(Mutex::new(None)),
            commands: Queue::new(),
            packets: Queue::new(),
            events: Queue::new(),
            handlers: HandlerTable::new(),
            on_peer_connected: None,
            on_peer_disconnected: None,
            on_peer_timed_out: None,
            worker: None,
            _protocol: PhantomData,
        }
    }

    /// Whether the server was created without a usable network library.
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

    /// Number of connected peers, as last seen by the worker.
    #[inline]
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peer_count.load(Ordering::Acquire)
    }

    /// Address of the last successful bind.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        *self.stats.lock()
    }

    /// Registers the handler of client packet `T`.
    pub fn register_packet_handler<T, F>(&mut self, handler: F)
    where
        T: PacketKind<P::ClientPackets>,
        F: FnMut(PeerId, T) + 'static,
    {
        self.handlers.register::<T, F>(handler);
    }

    /// Called on the consumer thread when a peer connects.
    pub fn on_peer_connected(&mut self, callback: impl FnMut(PeerId) + 'static) {
        self.on_peer_connected = Some(Box::new(callback));
    }

    /// Called on the consumer thread when a peer leaves or is kicked.
    pub fn on_peer_disconnected(&mut self, callback: impl FnMut(PeerId, DisconnectReason) + 'static) {
        self.on_peer_disconnected = Some(Box::new(callback));
    }

    /// Called on the consumer thread when a peer goes silent.
    pub fn on_peer_timed_out(&mut self, callback: impl FnMut(PeerId) + 'static) {
        self.on_peer_timed_out = Some(Box::new(callback));
    }

    /// Binds `bind` and starts serving on a new worker thread.
    ///
    /// The ticket resolves to the bound address.
    pub fn start(&mut self, bind: SocketAddr) -> StartTicket<SocketAddr> {
        if self.disabled {
            tracing::warn!(%bind, "start ignored, server disabled");
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
            tracing::debug!(stale, "discarded queues of the previous run");
        }
        self.cancel = CancellationToken::new();

        let (ready, ticket) = StartTicket::channel();
        let worker = ServerWorker::<P::ClientPackets> {
            library: self.library.clone(),
            config: self.config.clone(),
            bind,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            stats: self.stats.clone(),
            peer_count: Arc::clone(&self.peer_count),
            local_addr: Arc::clone(&self.local_addr),
            commands: self.commands.receiver.clone(),
            packets: self.packets.sender.clone(),
            events: self.events.sender.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(SERVER_THREAD_NAME.into())
            .spawn(move || worker.run(&ready));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                ticket
            }
            Err(err) => {
                self.state.set(ConnectionState::Stopped);
                tracing::error!(error = %err, "failed to spawn server worker");
                StartTicket::ready(Err(TransportError::Spawn(err)))
            }
        }
    }

    /// Encodes `packet` and queues it for `peer`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRunning`] when stopped, or
    /// [`TransportError::Protocol`] when the frame exceeds the size ceiling.
    pub fn send<T: PacketKind<P::ServerPackets>>(&self, peer: PeerId, packet: &T) -> TransportResult<()> {
        if self.skip_disabled("send") {
            return Ok(());
        }
        self.ensure_running()?;
        let frame = packet.to_frame()?;
        self.queue(WorkerCommand::Send { peer, frame })
    }

    /// Encodes a packet of the server set and queues it for `peer`.
    ///
    /// # Errors
    ///
    /// Same as [`GameServer::send`].
    pub fn send_packet(&self, peer: PeerId, packet: &P::ServerPackets) -> TransportResult<()> {
        if self.skip_disabled("send") {
            return Ok(());
        }
        self.ensure_running()?;
        let frame = packet.to_frame()?;
        self.queue(WorkerCommand::Send { peer, frame })
    }

    /// Queues a pre-encoded frame for `peer` without checking its contents.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRunning`] when stopped, or
    /// [`TransportError::FrameTooLarge`] when no datagram can carry it.
    pub fn send_raw_frame(&self, peer: PeerId, frame: Vec<u8>) -> TransportResult<()> {
        if self.skip_disabled("send") {
            return Ok(());
        }
        self.ensure_running()?;
        check_datagram_frame(frame.len())?;
        self.queue(WorkerCommand::Send { peer, frame })
    }

    /// Encodes `packet` once and queues it for every peer.
    ///
    /// # Errors
    ///
    /// Same as [`GameServer::send`].
    pub fn broadcast<T: PacketKind<P::ServerPackets>>(&self, packet: &T) -> TransportResult<()> {
        if self.skip_disabled("broadcast") {
            return Ok(());
        }
        self.ensure_running()?;
        let frame = packet.to_frame()?;
        self.queue(WorkerCommand::Broadcast(frame))
    }

    /// Disconnects `peer` with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRunning`] when stopped.
    pub fn kick(&self, peer: PeerId, reason: DisconnectReason) -> TransportResult<()> {
        if self.skip_disabled("kick") {
            return Ok(());
        }
        self.ensure_running()?;
        self.queue(WorkerCommand::Kick(peer, reason))
    }

    /// Runs handlers for every packet, then callbacks for every event,
    /// queued when the call starts. Never blocks.
    pub fn drain(&mut self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        let queued = self.packets.receiver.len();
        for (peer, packet) in self.packets.receiver.try_iter().take(queued) {
            if self.handlers.dispatch(peer, packet) {
                summary.packets += 1;
            } else {
                summary.unhandled += 1;
            }
        }

        let queued = self.events.receiver.len();
        for event in self.events.receiver.try_iter().take(queued) {
            summary.events += 1;
            match event {
                ServerEvent::PeerConnected(peer) => {
                    if let Some(callback) = self.on_peer_connected.as_mut() {
                        callback(peer);
                    }
                }
                ServerEvent::PeerDisconnected(peer, reason) => {
                    if let Some(callback) = self.on_peer_disconnected.as_mut() {
                        callback(peer, reason);
                    }
                }
                ServerEvent::PeerTimedOut(peer) => {
                    if let Some(callback) = self.on_peer_timed_out.as_mut() {
                        callback(peer);
                    }
                }
            }
        }

        summary
    }

    /// Requests a stop, telling peers the server is stopping. Repeated
    /// calls are harmless.
    pub fn stop(&self) {
        self.disconnect(DisconnectReason::Stopping);
    }

    /// Requests a stop with `reason` sent to every peer.
    pub fn disconnect(&self, reason: DisconnectReason) {
        if self.skip_disabled("stop") {
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
        let _ = self.commands.sender.send(WorkerCommand::Disconnect(reason));
        tracing::info!(%reason, "server stopping");
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
                tracing::error!("server worker panicked");
            }
        }
    }

    fn skip_disabled(&self, operation: &'static str) -> bool {
        if self.disabled {
            tracing::warn!(operation, "ignored, server disabled");
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

    fn queue(&self, command: WorkerCommand) -> TransportResult<()> {
        self.commands
            .sender
            .send(command)
            .map_err(|_| TransportError::WorkerExited)
    }
}

impl<P: Protocol> Drop for GameServer<P> {
    fn drop(&mut self) {
        if !self.disabled && self.state.get() != ConnectionState::Stopped {
            self.stop();
        }
    }
}

impl<P: Protocol> std::fmt::Debug for GameServer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("state", &self.state.get())
            .field("disabled", &self.disabled)
            .field("peers", &self.peer_count())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

struct ServerWorker<S: PacketSet> {
    library: NetworkLibrary,
    config: TransportConfig,
    bind: SocketAddr,
    state: SharedState,
    cancel: CancellationToken,
    stats: SharedStats,
    peer_count: Arc<AtomicUsize>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
    commands: Receiver<WorkerCommand>,
    packets: Sender<(PeerId, S)>,
    events: Sender<ServerEvent>,
}

impl<S: PacketSet> ServerWorker<S> {
    fn run(self, ready: &Sender<TransportResult<SocketAddr>>) {
        let _guard = StoppedGuard::new(self.state.clone());

        let opened = Host::server(&self.library, self.bind, &self.config)
            .and_then(|host| host.local_addr().map(|addr| (host, addr)));
        let (mut host, addr) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                tracing::warn!(bind = %self.bind, error = %err, "server failed to start");
                let _ = ready.send(Err(err));
                return;
            }
        };

        if self.cancel.is_cancelled()
            || !self
                .state
                .transition(ConnectionState::Starting, ConnectionState::Running)
        {
            let _ = ready.send(Err(TransportError::Cancelled));
            return;
        }
        *self.local_addr.lock() = Some(addr);
        let _ = ready.send(Ok(addr));
        tracing::info!(%addr, max_peers = self.config.max_peers, "server listening");

        self.service_loop(&mut host);
        self.state.set(ConnectionState::Stopping);
        self.peer_count.store(0, Ordering::Release);
        drop(host);
        tracing::info!(%addr, "server stopped");
    }

    fn service_loop(&self, host: &mut Host) {
        loop {
            for command in self.commands.try_iter() {
                match command {
                    WorkerCommand::Send { peer, frame } => {
                        let len = frame.len();
                        match host.send(peer, frame) {
                            Ok(()) => record_sent(&self.stats, len, 1),
                            Err(err) => tracing::warn!(%peer, error = %err, "send failed"),
                        }
                    }
                    WorkerCommand::Broadcast(frame) => {
                        let copies = host.peer_count();
                        match host.broadcast(&frame) {
                            Ok(()) => record_sent(&self.stats, frame.len(), copies),
                            Err(err) => tracing::warn!(error = %err, "broadcast failed"),
                        }
                    }
                    WorkerCommand::Kick(peer, reason) => {
                        if host.is_connected(peer) {
                            host.disconnect(peer, reason);
                            tracing::info!(%peer, %reason, "peer kicked");
                            let _ = self.events.send(ServerEvent::PeerDisconnected(peer, reason));
                        }
                    }
                    WorkerCommand::Disconnect(reason) => {
                        for peer in host.peers() {
                            let _ = self.events.send(ServerEvent::PeerDisconnected(peer, reason));
                        }
                        host.disconnect_all(reason);
                        return;
                    }
                }
            }

            let events = match host.service(self.config.poll_interval()) {
                Ok(events) => events,
                Err(err) => {
                    tracing::error!(error = %err, "server host failed");
                    for peer in host.peers() {
                        let _ = self
                            .events
                            .send(ServerEvent::PeerDisconnected(peer, DisconnectReason::Failed));
                    }
                    return;
                }
            };
            self.stats.lock().resends += host.take_resends();

            for event in events {
                match event {
                    HostEvent::Connected(peer) => {
                        tracing::info!(%peer, "peer connected");
                        let _ = self.events.send(ServerEvent::PeerConnected(peer));
                    }
                    HostEvent::Disconnected(peer, reason) => {
                        tracing::info!(%peer, %reason, "peer disconnected");
                        let _ = self.events.send(ServerEvent::PeerDisconnected(peer, reason));
                    }
                    HostEvent::TimedOut(peer) => {
                        tracing::warn!(%peer, "peer timed out");
                        let _ = self.events.send(ServerEvent::PeerTimedOut(peer));
                    }
                    HostEvent::Received(peer, frame) => {
                        if let Some(packet) = decode_inbound::<S>(&frame, &self.stats) {
                            let _ = self.packets.send((peer, packet));
                        }
                    }
                }
            }
            self.peer_count.store(host.peer_count(), Ordering::Release);
        }
    }
}
