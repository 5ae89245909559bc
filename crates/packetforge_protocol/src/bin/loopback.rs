//! # Loopback Demo
//!
//! Runs a lobby server and one client in the same process through the
//! coordinator, plays a short session and prints the transport counters.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=packetforge_networking=debug loopback --port 7777 --count 500 --config transport.toml
//! ```

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use packetforge_core::Vec3;
use packetforge_networking::{
    Coordinator, GameClient, GameServer, NetworkLibrary, PeerId, TransportConfig, TransportError,
    TransportResult,
};
use packetforge_protocol::chat::{CPacketChatMessage, SPacketChatBroadcast};
use packetforge_protocol::{
    CPacketJoin, CPacketPosition, CPacketTimeRequest, GameProtocol, SPacketPong, SPacketWelcome,
    PROTOCOL_VERSION,
};
use tracing_subscriber::EnvFilter;

/// Requests the server answers from the tick loop, outside the handlers.
#[derive(Debug)]
enum Reply {
    Welcome(PeerId, String),
    Pong(PeerId, CPacketTimeRequest),
    Chat(PeerId, CPacketChatMessage),
}

#[derive(Debug)]
struct Options {
    port: u16,
    count: u32,
    config: Option<String>,
}

fn parse_options() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        port: 0,
        count: 200,
        config: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--port" | "-p" => {
                options.port = value.and_then(|v| v.parse().ok()).unwrap_or(0);
                i += 1;
            }
            "--count" | "-c" => {
                options.count = value.and_then(|v| v.parse().ok()).unwrap_or(200);
                i += 1;
            }
            "--config" => {
                options.config = value.cloned();
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: loopback [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>      UDP port of the server (default: any)");
                println!("  -c, --count <NUM>      Movement packets to send (default: 200)");
                println!("      --config <FILE>    Transport settings in TOML");
                println!("  -h, --help             Show this help");
                return None;
            }
            other => tracing::warn!(argument = other, "unknown argument ignored"),
        }
        i += 1;
    }
    Some(options)
}

fn load_config(path: Option<&str>) -> TransportResult<TransportConfig> {
    match path {
        Some(path) => TransportConfig::from_toml_str(&std::fs::read_to_string(path)?),
        None => Ok(TransportConfig::default()),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

fn build_server(replies: &Rc<RefCell<Vec<Reply>>>) -> impl FnMut(&NetworkLibrary, &TransportConfig) -> GameServer<GameProtocol> {
    let replies = Rc::clone(replies);
    move |library: &NetworkLibrary, config: &TransportConfig| {
        let mut server = GameServer::<GameProtocol>::new(library, config);

        let sink = Rc::clone(&replies);
        server.register_packet_handler(move |peer, join: CPacketJoin| {
            if join.version != PROTOCOL_VERSION {
                tracing::warn!(%peer, version = join.version, "client version mismatch");
            }
            sink.borrow_mut().push(Reply::Welcome(peer, join.name));
        });
        let sink = Rc::clone(&replies);
        server.register_packet_handler(move |peer, request: CPacketTimeRequest| {
            sink.borrow_mut().push(Reply::Pong(peer, request));
        });
        let sink = Rc::clone(&replies);
        server.register_packet_handler(move |peer, message: CPacketChatMessage| {
            sink.borrow_mut().push(Reply::Chat(peer, message));
        });
        server.register_packet_handler(|peer, position: CPacketPosition| {
            tracing::trace!(%peer, tick = position.tick, "movement");
        });
        server.on_peer_connected(|peer| tracing::info!(%peer, "player joined the lobby"));
        server.on_peer_disconnected(|peer, reason| tracing::info!(%peer, %reason, "player left"));
        server
    }
}

fn build_client(library: &NetworkLibrary, config: &TransportConfig) -> GameClient<GameProtocol> {
    let mut client = GameClient::<GameProtocol>::new(library, config);
    client.register_packet_handler(|welcome: SPacketWelcome| {
        tracing::info!(
            player_id = welcome.player_id,
            server = %welcome.server_name,
            "welcomed"
        );
    });
    client.register_packet_handler(|pong: SPacketPong| {
        tracing::info!(rtt_ms = pong.round_trip_ms(now_ms()), "pong");
    });
    client.register_packet_handler(|chat: SPacketChatBroadcast| {
        tracing::info!(sender = chat.sender, text = %chat.text, "chat");
    });
    client.on_disconnected(|reason| tracing::info!(%reason, "disconnected"));
    client
}

fn answer(coordinator: &mut Coordinator<GameProtocol>, replies: &RefCell<Vec<Reply>>) -> TransportResult<()> {
    let Some(server) = coordinator.server_mut() else {
        return Ok(());
    };
    for reply in replies.borrow_mut().drain(..) {
        match reply {
            Reply::Welcome(peer, name) => server.send(
                peer,
                &SPacketWelcome {
                    player_id: peer.0,
                    tick_rate: 20,
                    server_name: format!("loopback lobby ({name})"),
                },
            )?,
            Reply::Pong(peer, request) => server.send(peer, &SPacketPong::answer(&request, now_ms()))?,
            Reply::Chat(peer, message) => server.broadcast(&SPacketChatBroadcast {
                sender: peer.0,
                text: message.text,
                mentions: Vec::new(),
            })?,
        }
    }
    Ok(())
}

fn run(options: &Options) -> TransportResult<()> {
    let config = load_config(options.config.as_deref())?;
    let library = NetworkLibrary::initialize()?;
    let replies = Rc::new(RefCell::new(Vec::new()));
    let mut coordinator = Coordinator::new(library, config, build_client, build_server(&replies));

    let bind = SocketAddr::from(([127, 0, 0, 1], options.port));
    let addr = coordinator.start_server(bind).wait(Duration::from_secs(5))?;
    coordinator.start_client(addr).wait(Duration::from_secs(5))?;

    let client = coordinator.client_mut().ok_or(TransportError::NotRunning)?;
    client.send(&CPacketJoin {
        name: "loopback".to_string(),
        version: PROTOCOL_VERSION,
        skin: None,
        local_session: now_ms(),
    })?;
    client.send(&CPacketTimeRequest { stamp: now_ms() })?;
    for tick in 0..options.count {
        client.send(&CPacketPosition {
            tick,
            position: Vec3::new(tick as f32 * 0.1, 64.0, 0.0),
            velocity: Vec3::new(0.1, 0.0, 0.0),
            on_ground: true,
        })?;
    }
    client.send(&CPacketChatMessage {
        text: "hello lobby".to_string(),
        channel: 0,
    })?;

    let started = Instant::now();
    let deadline = started + Duration::from_secs(10);
    let expected = u64::from(options.count) + 3;
    while Instant::now() < deadline {
        coordinator.update();
        answer(&mut coordinator, &replies)?;
        let received = coordinator
            .server_mut()
            .map_or(0, |server| server.stats().packets_received);
        if received >= expected {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    // let the last replies reach the client
    for _ in 0..20 {
        coordinator.update();
        answer(&mut coordinator, &replies)?;
        std::thread::sleep(Duration::from_millis(5));
    }

    if let Some(server) = coordinator.server_mut() {
        let stats = server.stats();
        println!("┌─ SERVER ─────────────────────────────────────────┐");
        println!("│ received   {:>8} packets {:>10} bytes", stats.packets_received, stats.bytes_received);
        println!("│ sent       {:>8} packets {:>10} bytes", stats.packets_sent, stats.bytes_sent);
        println!("│ dropped    {:>8} oversized {:>8} malformed", stats.dropped_oversized, stats.dropped_malformed);
        println!("│ resends    {:>8}", stats.resends);
    }
    if let Some(client) = coordinator.client_mut() {
        let stats = client.stats();
        println!("├─ CLIENT ─────────────────────────────────────────┤");
        println!("│ received   {:>8} packets {:>10} bytes", stats.packets_received, stats.bytes_received);
        println!("│ sent       {:>8} packets {:>10} bytes", stats.packets_sent, stats.bytes_sent);
        println!("│ resends    {:>8}", stats.resends);
    }
    println!("└─ {:.2?} ──────────────────────────────────────────", started.elapsed());

    coordinator.shutdown(Duration::from_secs(5))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(options) = parse_options() else {
        return;
    };
    if let Err(err) = run(&options) {
        tracing::error!(error = %err, "loopback session failed");
        std::process::exit(1);
    }
}
