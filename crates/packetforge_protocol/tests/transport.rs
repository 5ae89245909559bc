//! # Transport Tests
//!
//! Client/server pairs over loopback UDP:
//!
//! 1. **Delivery**: 100 packets arrive complete and in send order
//! 2. **Size ceiling**: an oversized frame is dropped, the link survives
//! 3. **Bounded stop**: `stop()` finishes within a few poll steps
//! 4. **Reasons**: kicks and server stops reach the client verbatim
//! 5. **Coordinator**: fresh instances per start, ordered shutdown
//! 6. **Disabled mode**: every call is a logged no-op
//!
//! Run with: cargo test -p packetforge_protocol --test transport

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use packetforge_core::{PacketKind, Vec3, MAX_PACKET_SIZE};
use packetforge_networking::{
    ConnectionState, Coordinator, DisconnectReason, GameClient, GameServer, NetworkLibrary, PeerId,
    TransportConfig, TransportError, MAX_DATAGRAM_FRAME,
};
use packetforge_protocol::{
    CPacketPosition, CPacketReady, CPacketTimeRequest, ClientPacket, GameProtocol, SPacketPong,
    SPacketWelcome,
};

type Client = GameClient<GameProtocol>;
type Server = GameServer<GameProtocol>;

const START_TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> TransportConfig {
    TransportConfig {
        poll_interval_ms: 2,
        resend_interval_ms: 50,
        ..TransportConfig::default()
    }
}

fn any_port() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn position(tick: u32) -> CPacketPosition {
    CPacketPosition {
        tick,
        position: Vec3::new(tick as f32, 0.5, -1.0),
        velocity: Vec3::new(0.0, -9.81, 0.0),
        on_ground: tick % 2 == 0,
    }
}

/// Drains both sides until `done` holds or `timeout` passes.
fn pump_until(
    server: &mut Server,
    client: &mut Client,
    timeout: Duration,
    mut done: impl FnMut(&Server, &Client) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        server.drain();
        client.drain();
        if done(server, client) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// A started server and a client connected to it.
fn connected_pair(library: &NetworkLibrary) -> (Server, Client) {
    let mut server = Server::new(library, &config());
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();

    let mut client = Client::new(library, &config());
    client.connect(addr).wait(START_TIMEOUT).unwrap();
    assert!(client.is_running());
    (server, client)
}

// ============================================================================
// DELIVERY
// ============================================================================

#[test]
fn test_hundred_packets_arrive_in_order() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut server = Server::new(&library, &config());
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    server.register_packet_handler(move |_peer: PeerId, packet: CPacketPosition| {
        sink.borrow_mut().push(packet);
    });
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();

    let mut client = Client::new(&library, &config());
    client.connect(addr).wait(START_TIMEOUT).unwrap();

    let sent: Vec<CPacketPosition> = (0..100).map(position).collect();
    for packet in &sent {
        client.send(packet).unwrap();
    }

    let arrived = pump_until(&mut server, &mut client, Duration::from_secs(10), |_, _| {
        received.borrow().len() >= sent.len()
    });
    assert!(arrived, "only {} of 100 packets arrived", received.borrow().len());
    assert_eq!(*received.borrow(), sent);

    let stats = server.stats();
    assert_eq!(stats.packets_received, 100);
    assert_eq!(stats.dropped_malformed, 0);
    assert_eq!(client.stats().packets_sent, 100);
}

#[test]
fn test_unhandled_packets_are_counted() {
    let library = NetworkLibrary::initialize().unwrap();
    let (mut server, mut client) = connected_pair(&library);

    client.send(&CPacketReady {}).unwrap();
    client
        .send_packet(&ClientPacket::from(CPacketReady {}))
        .unwrap();

    let mut unhandled = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while unhandled < 2 && Instant::now() < deadline {
        unhandled += server.drain().unhandled;
        client.drain();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(unhandled, 2);
}

#[test]
fn test_time_request_answered_with_pong() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut server = Server::new(&library, &config());
    let requests = Rc::new(RefCell::new(Vec::new()));
    let inbox = Rc::clone(&requests);
    server.register_packet_handler(move |peer: PeerId, request: CPacketTimeRequest| {
        inbox.borrow_mut().push((peer, request));
    });
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();

    let mut client = Client::new(&library, &config());
    let pongs = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&pongs);
    client.register_packet_handler(move |pong: SPacketPong| sink.borrow_mut().push(pong));
    client.connect(addr).wait(START_TIMEOUT).unwrap();

    client.send(&CPacketTimeRequest { stamp: 1_000 }).unwrap();

    let answered = pump_until(&mut server, &mut client, Duration::from_secs(5), |server, _| {
        for (peer, request) in requests.borrow_mut().drain(..) {
            server
                .send(peer, &SPacketPong::answer(&request, 1_017))
                .unwrap();
        }
        !pongs.borrow().is_empty()
    });
    assert!(answered);
    assert_eq!(
        pongs.borrow()[0],
        SPacketPong {
            stamp: 1_000,
            server_time: 1_017,
        }
    );
}

#[test]
fn test_broadcast_reaches_every_client() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut server = Server::new(&library, &config());
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();

    let welcomes = Rc::new(Cell::new(0));
    let mut clients: Vec<Client> = (0..3)
        .map(|_| {
            let mut client = Client::new(&library, &config());
            let counter = Rc::clone(&welcomes);
            client.register_packet_handler(move |_: SPacketWelcome| counter.set(counter.get() + 1));
            client.connect(addr).wait(START_TIMEOUT).unwrap();
            client
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.peer_count() < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(server.peer_count(), 3);

    server
        .broadcast(&SPacketWelcome {
            player_id: 0,
            tick_rate: 20,
            server_name: "lobby".to_string(),
        })
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while welcomes.get() < 3 && Instant::now() < deadline {
        server.drain();
        for client in &mut clients {
            client.drain();
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(welcomes.get(), 3);
    assert_eq!(server.stats().packets_sent, 3);
}

// ============================================================================
// SIZE CEILING
// ============================================================================

#[test]
fn test_oversized_frame_dropped_connection_survives() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut server = Server::new(&library, &config());
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    server.register_packet_handler(move |_peer: PeerId, packet: CPacketPosition| {
        sink.borrow_mut().push(packet);
    });
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();
    let mut client = Client::new(&library, &config());
    client.connect(addr).wait(START_TIMEOUT).unwrap();

    let mut oversized = position(1).to_frame().unwrap();
    oversized.resize(MAX_PACKET_SIZE + 1, 0);
    client.send_raw_frame(oversized).unwrap();
    client.send(&position(2)).unwrap();

    let survived = pump_until(&mut server, &mut client, Duration::from_secs(5), |server, _| {
        server.stats().dropped_oversized == 1 && !received.borrow().is_empty()
    });
    assert!(survived);
    assert_eq!(*received.borrow(), vec![position(2)]);
    assert!(client.is_running());
    assert!(server.is_running());
    assert_eq!(server.peer_count(), 1);
    assert_eq!(server.stats().dropped_malformed, 0);
}

#[test]
fn test_frame_beyond_datagram_limit_is_refused() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut server = Server::new(&library, &config());
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    server.register_packet_handler(move |_peer: PeerId, packet: CPacketPosition| {
        sink.borrow_mut().push(packet);
    });
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();
    let mut client = Client::new(&library, &config());
    client.connect(addr).wait(START_TIMEOUT).unwrap();

    let result = client.send_raw_frame(vec![0u8; 70_000]);
    assert!(matches!(
        result,
        Err(TransportError::FrameTooLarge { len: 70_000, max: MAX_DATAGRAM_FRAME })
    ));
    client.send(&position(3)).unwrap();

    let arrived = pump_until(&mut server, &mut client, Duration::from_secs(5), |_, _| {
        !received.borrow().is_empty()
    });
    assert!(arrived);
    assert_eq!(*received.borrow(), vec![position(3)]);
    assert_eq!(client.state(), ConnectionState::Running);
    assert_eq!(client.stats().packets_sent, 1);
}

#[test]
fn test_malformed_frame_dropped() {
    let library = NetworkLibrary::initialize().unwrap();
    let (mut server, mut client) = connected_pair(&library);

    client.send_raw_frame(vec![250, 1, 2, 3]).unwrap();

    let dropped = pump_until(&mut server, &mut client, Duration::from_secs(5), |server, _| {
        server.stats().dropped_malformed == 1
    });
    assert!(dropped);
    assert!(client.is_running());
}

#[test]
fn test_oversized_packet_rejected_before_queueing() {
    let library = NetworkLibrary::initialize().unwrap();
    let (server, client) = connected_pair(&library);

    let result = server.send(
        PeerId(1),
        &SPacketWelcome {
            server_name: "x".repeat(MAX_PACKET_SIZE),
            ..SPacketWelcome::default()
        },
    );
    assert!(matches!(result, Err(TransportError::Protocol(_))));
    assert!(client.is_running());
}

// ============================================================================
// BOUNDED STOP
// ============================================================================

#[test]
fn test_client_stop_is_bounded() {
    let library = NetworkLibrary::initialize().unwrap();
    let (mut server, mut client) = connected_pair(&library);

    let left = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&left);
    server.on_peer_disconnected(move |peer, reason| sink.borrow_mut().push((peer, reason)));

    let stopped_reason = Rc::new(Cell::new(None));
    let sink = Rc::clone(&stopped_reason);
    client.on_disconnected(move |reason| sink.set(Some(reason)));

    client.stop();
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.is_running() {
        assert!(Instant::now() < deadline, "client still running after 5 s");
        std::thread::sleep(Duration::from_millis(50));
    }
    client.stop();
    client.disconnect(DisconnectReason::Kicked);
    assert!(client.wait_stopped(Duration::from_secs(1), Duration::from_millis(50)).is_ok());

    client.drain();
    assert_eq!(stopped_reason.get(), Some(DisconnectReason::Normal));

    let noticed = pump_until(&mut server, &mut client, Duration::from_secs(5), |_, _| {
        !left.borrow().is_empty()
    });
    assert!(noticed);
    assert_eq!(left.borrow()[0].1, DisconnectReason::Normal);
    assert!(matches!(client.send(&position(0)), Err(TransportError::NotRunning)));
}

#[test]
fn test_client_reconnects_after_stop() {
    let library = NetworkLibrary::initialize().unwrap();
    let (server, mut client) = connected_pair(&library);
    let addr = server.local_addr().unwrap();

    server.broadcast(&SPacketWelcome::default()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.stats().packets_received == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(client.stats().packets_received, 1);

    client.stop();
    client
        .wait_stopped(Duration::from_secs(5), Duration::from_millis(50))
        .unwrap();

    client.connect(addr).wait(START_TIMEOUT).unwrap();
    assert!(client.is_running());

    let summary = client.drain();
    assert_eq!(summary.packets + summary.unhandled, 0);
    assert!(summary.events <= 1);
}

#[test]
fn test_second_connect_is_rejected() {
    let library = NetworkLibrary::initialize().unwrap();
    let (server, mut client) = connected_pair(&library);
    let addr = server.local_addr().unwrap();

    let result = client.connect(addr).wait(START_TIMEOUT);
    assert!(matches!(result, Err(TransportError::AlreadyRunning)));
}

#[test]
fn test_connect_to_silent_address_times_out() {
    let library = NetworkLibrary::initialize().unwrap();
    let silent = std::net::UdpSocket::bind(any_port()).unwrap();
    let config = TransportConfig {
        connect_timeout_ms: 200,
        ..config()
    };

    let mut client = Client::new(&library, &config);
    let result = client
        .connect(silent.local_addr().unwrap())
        .wait(Duration::from_secs(5));
    assert!(matches!(result, Err(TransportError::ConnectTimeout(_))));
    client
        .wait_stopped(Duration::from_secs(1), Duration::from_millis(10))
        .unwrap();
    assert_eq!(library.active_leases(), 0);
}

// ============================================================================
// REASONS
// ============================================================================

#[test]
fn test_kick_reason_reaches_client() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut server = Server::new(&library, &config());
    let joined = Rc::new(Cell::new(None));
    let sink = Rc::clone(&joined);
    server.on_peer_connected(move |peer| sink.set(Some(peer)));
    let addr = server.start(any_port()).wait(START_TIMEOUT).unwrap();

    let mut client = Client::new(&library, &config());
    let reason = Rc::new(Cell::new(None));
    let sink = Rc::clone(&reason);
    client.on_disconnected(move |why| sink.set(Some(why)));
    client.connect(addr).wait(START_TIMEOUT).unwrap();

    assert!(pump_until(&mut server, &mut client, START_TIMEOUT, |_, _| joined.get().is_some()));
    let peer = joined.get().unwrap();
    server.kick(peer, DisconnectReason::Banned).unwrap();

    assert!(pump_until(&mut server, &mut client, START_TIMEOUT, |_, _| reason.get().is_some()));
    assert_eq!(reason.get(), Some(DisconnectReason::Banned));
    client
        .wait_stopped(Duration::from_secs(5), Duration::from_millis(50))
        .unwrap();
}

#[test]
fn test_server_stop_reaches_client() {
    let library = NetworkLibrary::initialize().unwrap();
    let (mut server, mut client) = connected_pair(&library);
    let reason = Rc::new(Cell::new(None));
    let sink = Rc::clone(&reason);
    client.on_disconnected(move |why| sink.set(Some(why)));

    server.stop();
    server
        .wait_stopped(Duration::from_secs(5), Duration::from_millis(50))
        .unwrap();
    assert_eq!(server.peer_count(), 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    while reason.get().is_none() && Instant::now() < deadline {
        client.drain();
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(reason.get(), Some(DisconnectReason::Stopping));
}

// ============================================================================
// COORDINATOR
// ============================================================================

fn coordinator(library: &NetworkLibrary) -> Coordinator<GameProtocol> {
    Coordinator::new(
        library.clone(),
        config(),
        |library: &NetworkLibrary, config: &TransportConfig| Client::new(library, config),
        |library: &NetworkLibrary, config: &TransportConfig| Server::new(library, config),
    )
}

#[test]
fn test_coordinator_runs_and_shuts_down() {
    let library = NetworkLibrary::initialize().unwrap();
    let mut coordinator = coordinator(&library);

    let addr = coordinator.start_server(any_port()).wait(START_TIMEOUT).unwrap();
    coordinator.start_client(addr).wait(START_TIMEOUT).unwrap();
    assert!(coordinator.is_server_running());
    assert!(coordinator.is_client_running());
    assert!(matches!(
        coordinator.start_server(any_port()).wait(START_TIMEOUT),
        Err(TransportError::AlreadyRunning)
    ));

    let mut events = 0;
    let deadline = Instant::now() + START_TIMEOUT;
    while events < 2 && Instant::now() < deadline {
        events += coordinator.update().events;
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(events, 2, "client connected and peer connected");

    coordinator.shutdown(Duration::from_secs(5)).unwrap();
    assert!(!coordinator.is_server_running());
    assert!(!coordinator.is_client_running());
    assert_eq!(library.active_leases(), 0);
    assert!(!library.is_available());
}

#[test]
fn test_coordinator_restarts_with_fresh_instances() {
    let library = NetworkLibrary::initialize().unwrap();
    let created = Rc::new(Cell::new(0));
    let counter = Rc::clone(&created);
    let mut coordinator = Coordinator::new(
        library.clone(),
        config(),
        |library: &NetworkLibrary, config: &TransportConfig| Client::new(library, config),
        move |library: &NetworkLibrary, config: &TransportConfig| {
            counter.set(counter.get() + 1);
            Server::new(library, config)
        },
    );

    coordinator.start_server(any_port()).wait(START_TIMEOUT).unwrap();
    coordinator.stop_server(DisconnectReason::Restarting);
    coordinator
        .server_mut()
        .unwrap()
        .wait_stopped(Duration::from_secs(5), Duration::from_millis(50))
        .unwrap();

    coordinator.start_server(any_port()).wait(START_TIMEOUT).unwrap();
    assert_eq!(created.get(), 2);
    assert!(coordinator.is_server_running());
    coordinator.shutdown(Duration::from_secs(5)).unwrap();
}

#[test]
fn test_library_busy_while_host_alive() {
    let library = NetworkLibrary::initialize().unwrap();
    let (_server, _client) = connected_pair(&library);

    assert_eq!(library.active_leases(), 2);
    assert!(matches!(library.release(), Err(TransportError::LibraryBusy(2))));
}

// ============================================================================
// DISABLED MODE
// ============================================================================

#[test]
fn test_disabled_transports_are_no_ops() {
    let library = NetworkLibrary::disabled();
    let mut client = Client::new(&library, &config());
    let mut server = Server::new(&library, &config());
    assert!(client.is_disabled());
    assert!(server.is_disabled());

    assert!(matches!(
        client.connect(any_port()).wait(START_TIMEOUT),
        Err(TransportError::Disabled)
    ));
    assert!(matches!(
        server.start(any_port()).wait(START_TIMEOUT),
        Err(TransportError::Disabled)
    ));

    client.send(&position(0)).unwrap();
    server.broadcast(&SPacketWelcome::default()).unwrap();
    server.kick(PeerId(1), DisconnectReason::Kicked).unwrap();
    assert!(client.drain().is_empty());
    assert!(server.drain().is_empty());
    client.stop();
    server.stop();
    assert_eq!(client.state(), ConnectionState::Stopped);

    let mut coordinator = coordinator(&library);
    assert!(coordinator.start_server(any_port()).wait(START_TIMEOUT).is_err());
    coordinator.shutdown(Duration::from_secs(1)).unwrap();
}
