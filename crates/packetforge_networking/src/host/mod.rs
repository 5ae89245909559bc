//! # Reliable UDP Host
//!
//! The network endpoint a worker thread owns. One host is either a server
//! accepting many peers or a client talking to one server.
//!
//! ```text
//! client                         server
//!   │ ── Connect (resent) ────────▶ │   capacity check
//!   │ ◀──────── Accept{peer_id} ─── │   or Disconnect{ServerFull}
//!   │ ── Data{seq, frame} ────────▶ │
//!   │ ◀─────────────── Ack{seq} ─── │
//!   │ ── Ping (when idle) ────────▶ │
//!   │ ── Disconnect{reason} ──────▶ │
//! ```
//!
//! [`Host::service`] blocks for at most its timeout, then returns every
//! connect, disconnect, timeout and receive event of that call.

mod peer;
pub mod wire;

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::library::{LibraryLease, NetworkLibrary};
use crate::reason::DisconnectReason;

pub use peer::{PeerChannel, Received, REORDER_CAPACITY};
use wire::{Datagram, DATA_HEADER_LEN};

/// Receive buffer size; larger than any frame so oversized frames can be
/// recognized and dropped by the transport.
const RECV_BUFFER_SIZE: usize = 65536;

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest frame one data datagram can carry.
pub const MAX_DATAGRAM_FRAME: usize = MAX_DATAGRAM_SIZE - DATA_HEADER_LEN;

/// Fails when `len` bytes cannot travel in one data datagram.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`].
#[inline]
pub fn check_datagram_frame(len: usize) -> TransportResult<()> {
    if len > MAX_DATAGRAM_FRAME {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_DATAGRAM_FRAME,
        });
    }
    Ok(())
}

/// Identifies a remote peer of a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl PeerId {
    /// The server, as seen by a client host.
    pub const SERVER: Self = Self(0);
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Something that happened during [`Host::service`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// A peer finished the handshake.
    Connected(PeerId),
    /// A peer sent a disconnect, or refused the handshake.
    Disconnected(PeerId, DisconnectReason),
    /// A peer went silent for longer than the peer timeout.
    TimedOut(PeerId),
    /// A frame arrived, in sequence order.
    Received(PeerId, Vec<u8>),
}

#[derive(Debug)]
struct PeerSlot {
    addr: SocketAddr,
    channel: PeerChannel,
}

#[derive(Debug)]
struct Handshake {
    server: SocketAddr,
    last_attempt: Instant,
}

#[derive(Debug)]
enum Role {
    Server { next_peer_id: u32 },
    Client { handshake: Option<Handshake> },
}

/// Reliable UDP endpoint.
#[derive(Debug)]
pub struct Host {
    socket: UdpSocket,
    role: Role,
    config: TransportConfig,
    peers: HashMap<PeerId, PeerSlot>,
    by_addr: HashMap<SocketAddr, PeerId>,
    buffer: Vec<u8>,
    resends: u64,
    _lease: LibraryLease,
}

impl Host {
    /// Creates a server host bound to `bind`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disabled`] without a usable library, or
    /// [`TransportError::Bind`] when the address cannot be bound.
    pub fn server(
        library: &NetworkLibrary,
        bind: SocketAddr,
        config: &TransportConfig,
    ) -> TransportResult<Self> {
        Self::open(library, bind, config, Role::Server { next_peer_id: 1 })
    }

    /// Creates a client host on an ephemeral port of `server`'s family.
    ///
    /// # Errors
    ///
    /// Same as [`Host::server`].
    pub fn client(
        library: &NetworkLibrary,
        server: SocketAddr,
        config: &TransportConfig,
    ) -> TransportResult<Self> {
        let bind = match server {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        Self::open(library, bind, config, Role::Client { handshake: None })
    }

    fn open(
        library: &NetworkLibrary,
        bind: SocketAddr,
        config: &TransportConfig,
        role: Role,
    ) -> TransportResult<Self> {
        let lease = library.lease()?;
        let socket = UdpSocket::bind(bind).map_err(|source| TransportError::Bind {
            addr: bind,
            source,
        })?;
        tracing::debug!(addr = ?socket.local_addr().ok(), "host bound");

        Ok(Self {
            socket,
            role,
            config: config.clone(),
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            buffer: vec![0u8; RECV_BUFFER_SIZE],
            resends: 0,
            _lease: lease,
        })
    }

    /// Address the socket is bound to.
    ///
    /// # Errors
    ///
    /// Propagates the OS error.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of connected peers.
    #[inline]
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Ids of the connected peers, ascending.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.keys().copied().collect();
        peers.sort_unstable();
        peers
    }

    /// Whether `peer` is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self, peer: PeerId) -> bool {
        self.peers.contains_key(&peer)
    }

    /// Datagrams resent since the last call.
    pub fn take_resends(&mut self) -> u64 {
        std::mem::take(&mut self.resends)
    }

    /// Starts the handshake with `server`. Client hosts only.
    ///
    /// # Errors
    ///
    /// Propagates socket errors of the first attempt.
    pub fn connect(&mut self, server: SocketAddr) -> TransportResult<()> {
        if let Role::Client { handshake } = &mut self.role {
            *handshake = Some(Handshake {
                server,
                last_attempt: Instant::now(),
            });
            self.send_datagram(server, &Datagram::Connect)?;
        }
        Ok(())
    }

    /// Sends `frame` reliably to `peer`. Unknown peers are ignored.
    ///
    /// A frame the socket refuses is not kept for resending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FrameTooLarge`] for frames no datagram can
    /// carry, and socket errors other than a full send buffer.
    pub fn send(&mut self, peer: PeerId, frame: Vec<u8>) -> TransportResult<()> {
        check_datagram_frame(frame.len())?;
        let Some(slot) = self.peers.get_mut(&peer) else {
            tracing::debug!(%peer, "send to unknown peer ignored");
            return Ok(());
        };
        let addr = slot.addr;
        let (seq, datagram) = slot.channel.prepare_send(frame, Instant::now());
        let sent = self.send_bytes(addr, &datagram);
        if sent.is_err() {
            if let Some(slot) = self.peers.get_mut(&peer) {
                slot.channel.discard(seq);
            }
        }
        sent
    }

    /// Sends `frame` reliably to every peer.
    ///
    /// # Errors
    ///
    /// Returns the first socket error; remaining peers are still served.
    pub fn broadcast(&mut self, frame: &[u8]) -> TransportResult<()> {
        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        let mut first_error = None;
        for peer in peers {
            if let Err(err) = self.send(peer, frame.to_vec()) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Notifies `peer` and forgets it.
    pub fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason) {
        if let Some(slot) = self.remove_peer(peer) {
            if let Err(err) = self.send_datagram(slot.addr, &Datagram::Disconnect { reason }) {
                tracing::debug!(%peer, error = %err, "disconnect notice not sent");
            }
        }
        self.abandon_handshake(reason);
    }

    /// Disconnects every peer.
    pub fn disconnect_all(&mut self, reason: DisconnectReason) {
        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            self.disconnect(peer, reason);
        }
        self.abandon_handshake(reason);
    }

    /// Waits up to `timeout` for traffic, handles everything that arrived,
    /// and runs resends, heartbeats and timeouts.
    ///
    /// Failures to reach one peer are logged and leave the others served.
    ///
    /// # Errors
    ///
    /// Propagates errors of the socket itself.
    pub fn service(&mut self, timeout: Duration) -> TransportResult<Vec<HostEvent>> {
        let mut events = Vec::new();

        self.socket.set_nonblocking(false)?;
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut more = self.receive_one(&mut events)?;

        self.socket.set_nonblocking(true)?;
        while more {
            more = self.receive_one(&mut events)?;
        }

        self.maintain(Instant::now(), &mut events);
        Ok(events)
    }

    /// Receives and handles one datagram; false when nothing was waiting.
    fn receive_one(&mut self, events: &mut Vec<HostEvent>) -> TransportResult<bool> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((len, from)) => {
                match Datagram::decode(&self.buffer[..len]) {
                    Some(datagram) => self.handle(from, datagram, events),
                    None => tracing::trace!(%from, len, "ignored foreign datagram"),
                }
                Ok(true)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(false)
            }
            // ICMP port unreachable of an earlier send
            Err(err) if is_peer_scoped(&err) => {
                tracing::debug!(error = %err, "remote endpoint unreachable");
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn handle(&mut self, from: SocketAddr, datagram: Datagram, events: &mut Vec<HostEvent>) {
        let now = Instant::now();

        if let Some(&peer) = self.by_addr.get(&from) {
            if let Some(slot) = self.peers.get_mut(&peer) {
                slot.channel.touch_received(now);
            }
            match datagram {
                Datagram::Connect => self.notify(from, &Datagram::Accept { peer_id: peer.0 }),
                Datagram::Accept { .. } | Datagram::Ping => {}
                Datagram::Data { seq, frame } => {
                    let received = match self.peers.get_mut(&peer) {
                        Some(slot) => slot.channel.receive(seq, frame),
                        None => Received::default(),
                    };
                    if received.ack {
                        self.notify(from, &Datagram::Ack { seq });
                    }
                    events.extend(
                        received
                            .delivered
                            .into_iter()
                            .map(|frame| HostEvent::Received(peer, frame)),
                    );
                }
                Datagram::Ack { seq } => {
                    if let Some(slot) = self.peers.get_mut(&peer) {
                        slot.channel.acknowledge(seq);
                    }
                }
                Datagram::Disconnect { reason } => {
                    self.remove_peer(peer);
                    tracing::debug!(%peer, %reason, "peer disconnected");
                    events.push(HostEvent::Disconnected(peer, reason));
                }
            }
            return;
        }

        let handshake_server = match &self.role {
            Role::Client {
                handshake: Some(pending),
            } => Some(pending.server),
            _ => None,
        };
        match datagram {
            Datagram::Connect if matches!(self.role, Role::Server { .. }) => {
                self.accept(from, now, events)
            }
            Datagram::Accept { peer_id } if handshake_server == Some(from) => {
                self.clear_handshake();
                self.add_peer(PeerId::SERVER, from, now);
                tracing::debug!(%from, peer_id, "handshake complete");
                events.push(HostEvent::Connected(PeerId::SERVER));
            }
            Datagram::Disconnect { reason } if handshake_server == Some(from) => {
                self.clear_handshake();
                events.push(HostEvent::Disconnected(PeerId::SERVER, reason));
            }
            datagram => {
                tracing::trace!(%from, ?datagram, "datagram from unknown address ignored");
            }
        }
    }

    fn accept(&mut self, from: SocketAddr, now: Instant, events: &mut Vec<HostEvent>) {
        if self.peers.len() >= self.config.max_peers {
            tracing::warn!(%from, max_peers = self.config.max_peers, "server full, refusing peer");
            let refusal = Datagram::Disconnect {
                reason: DisconnectReason::ServerFull,
            };
            self.notify(from, &refusal);
            return;
        }
        let Role::Server { next_peer_id } = &mut self.role else {
            return;
        };
        let peer = PeerId(*next_peer_id);
        *next_peer_id = next_peer_id.wrapping_add(1).max(1);

        self.add_peer(peer, from, now);
        tracing::debug!(%peer, %from, "peer accepted");
        events.push(HostEvent::Connected(peer));
        self.notify(from, &Datagram::Accept { peer_id: peer.0 });
    }

    fn clear_handshake(&mut self) -> Option<Handshake> {
        match &mut self.role {
            Role::Client { handshake } => handshake.take(),
            Role::Server { .. } => None,
        }
    }

    /// Tells a server still in the handshake that this client gave up.
    fn abandon_handshake(&mut self, reason: DisconnectReason) {
        if let Some(pending) = self.clear_handshake() {
            if let Err(err) = self.send_datagram(pending.server, &Datagram::Disconnect { reason }) {
                tracing::debug!(error = %err, "handshake abort not sent");
            }
        }
    }

    fn maintain(&mut self, now: Instant, events: &mut Vec<HostEvent>) {
        let resend_interval = self.config.resend_interval();

        if let Role::Client {
            handshake: Some(pending),
        } = &mut self.role
        {
            if now.duration_since(pending.last_attempt) >= resend_interval {
                pending.last_attempt = now;
                let server = pending.server;
                self.notify(server, &Datagram::Connect);
            }
        }

        let peer_timeout = self.config.peer_timeout();
        let heartbeat = self.config.heartbeat_interval();
        let mut timed_out = Vec::new();
        let mut outgoing = Vec::new();

        for (&peer, slot) in &mut self.peers {
            if slot.channel.is_timed_out(now, peer_timeout) {
                timed_out.push(peer);
                continue;
            }
            let resends = slot.channel.due_resends(now, resend_interval);
            self.resends += resends.len() as u64;
            outgoing.extend(resends.into_iter().map(|datagram| (slot.addr, datagram)));

            if slot.channel.needs_heartbeat(now, heartbeat) {
                slot.channel.touch_sent(now);
                outgoing.push((slot.addr, Datagram::Ping.encode()));
            }
        }

        for (addr, datagram) in outgoing {
            if let Err(err) = self.send_bytes(addr, &datagram) {
                tracing::debug!(%addr, error = %err, "datagram not sent");
            }
        }
        for peer in timed_out {
            self.remove_peer(peer);
            tracing::info!(%peer, "peer timed out");
            events.push(HostEvent::TimedOut(peer));
        }
    }

    fn add_peer(&mut self, peer: PeerId, addr: SocketAddr, now: Instant) {
        self.by_addr.insert(addr, peer);
        self.peers.insert(
            peer,
            PeerSlot {
                addr,
                channel: PeerChannel::new(now),
            },
        );
    }

    fn remove_peer(&mut self, peer: PeerId) -> Option<PeerSlot> {
        let slot = self.peers.remove(&peer)?;
        self.by_addr.remove(&slot.addr);
        Some(slot)
    }

    fn send_datagram(&self, addr: SocketAddr, datagram: &Datagram) -> TransportResult<()> {
        self.send_bytes(addr, &datagram.encode())
    }

    /// Sends a control datagram, logging failures.
    fn notify(&self, addr: SocketAddr, datagram: &Datagram) {
        if let Err(err) = self.send_datagram(addr, datagram) {
            tracing::debug!(%addr, ?datagram, error = %err, "control datagram not sent");
        }
    }

    fn send_bytes(&self, addr: SocketAddr, bytes: &[u8]) -> TransportResult<()> {
        match self.socket.send_to(bytes, addr) {
            Ok(_) => Ok(()),
            // reliable datagrams are resent; control datagrams are retried by their protocol
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Errors that concern one remote endpoint, not the socket.
fn is_peer_scoped(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
    )
}
