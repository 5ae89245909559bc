//! # Codec Round-Trip Tests
//!
//! Every generated packet decodes back to a deeply equal value:
//!
//! 1. **Nested shapes**: list of arrays, map of lists, optional arrays
//! 2. **Randomised lobbies**: seeded inputs across many sizes
//! 3. **Exclusions**: excluded fields never reach the wire
//! 4. **Rejection**: truncated, padded and oversized frames fail cleanly
//!
//! Run with: cargo test -p packetforge_protocol --test codec_roundtrip

use std::collections::HashMap;

use packetforge_core::{PacketKind, PacketSet, ProtocolError, Vec3, MAX_PACKET_SIZE};
use packetforge_protocol::chat::{CPacketChatMessage, SPacketChatBroadcast};
use packetforge_protocol::{
    CPacketJoin, CPacketPosition, CPacketReady, ClientPacket, PlayerInfo, SPacketLobbyState,
    SPacketWelcome, ServerPacket,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn player(rng: &mut StdRng, id: u32) -> PlayerInfo {
    PlayerInfo {
        id,
        name: format!("player-{id}"),
        position: Vec3::new(rng.gen(), rng.gen(), rng.gen()),
        ready: rng.gen(),
    }
}

fn lobby(rng: &mut StdRng, size: usize) -> SPacketLobbyState {
    let players: Vec<PlayerInfo> = (0..size as u32).map(|id| player(rng, id)).collect();
    let score_history: Vec<Box<[i32]>> = (0..size)
        .map(|round| (0..round % 5).map(|_| rng.gen_range(-1000..1000)).collect())
        .collect();
    let team_rosters: HashMap<String, Vec<i32>> = ["red", "blue", "green"]
        .iter()
        .take(size % 4)
        .map(|team| {
            let roster = (0..rng.gen_range(0..6)).map(|_| rng.gen()).collect();
            ((*team).to_string(), roster)
        })
        .collect();

    SPacketLobbyState {
        host: players.first().cloned(),
        players,
        score_history,
        team_rosters,
        motd: (size % 2 == 0).then(|| vec!["welcome".to_string(), String::new()].into_boxed_slice()),
        map_seed: (0..size).map(|_| rng.gen()).collect(),
    }
}

// ============================================================================
// NESTED SHAPES
// ============================================================================

#[test]
fn test_nested_collections_roundtrip() {
    let mut rosters = HashMap::new();
    rosters.insert("red".to_string(), vec![1, 2, 3]);
    rosters.insert("blue".to_string(), vec![]);
    rosters.insert("ünïcode".to_string(), vec![-7]);

    let state = SPacketLobbyState {
        players: Vec::new(),
        score_history: vec![
            vec![10, 20, 30].into_boxed_slice(),
            Vec::new().into_boxed_slice(),
            vec![i32::MIN, i32::MAX].into_boxed_slice(),
        ],
        team_rosters: rosters,
        host: None,
        motd: Some(vec!["line one".to_string(), "line two".to_string()].into_boxed_slice()),
        map_seed: vec![0xde, 0xad, 0xbe, 0xef],
    };

    let frame = state.to_frame().unwrap();
    let decoded = SPacketLobbyState::from_frame(&frame).unwrap();

    assert_eq!(decoded.score_history.len(), 3);
    assert_eq!(&*decoded.score_history[0], &[10, 20, 30]);
    assert!(decoded.score_history[1].is_empty());
    assert_eq!(decoded.team_rosters["red"], vec![1, 2, 3]);
    assert_eq!(decoded.team_rosters["ünïcode"], vec![-7]);
    assert_eq!(decoded, state);
}

#[test]
fn test_randomised_lobbies_roundtrip() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for size in [0, 1, 2, 3, 7, 16, 25] {
        let state = lobby(&mut rng, size);
        let frame = state.to_frame().unwrap();
        assert!(frame.len() <= MAX_PACKET_SIZE);

        let decoded = SPacketLobbyState::from_frame(&frame).unwrap();
        assert_eq!(decoded, state, "lobby of {size} players");
    }
}

#[test]
fn test_every_client_packet_roundtrips_through_the_set() {
    let packets = vec![
        ClientPacket::from(CPacketJoin {
            name: "ada".to_string(),
            version: packetforge_protocol::PROTOCOL_VERSION,
            skin: Some("default".to_string()),
            local_session: 0,
        }),
        ClientPacket::from(CPacketPosition {
            tick: 9,
            position: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::new(-0.5, 0.0, 0.25),
            on_ground: true,
        }),
        ClientPacket::from(CPacketReady {}),
        ClientPacket::from(CPacketChatMessage {
            text: "gg".to_string(),
            channel: 2,
        }),
    ];

    for packet in packets {
        let frame = packet.to_frame().unwrap();
        assert_eq!(u32::from(frame[0]), packet.opcode());

        let decoded = ClientPacket::from_frame(&frame).unwrap();
        assert_eq!(decoded.type_name(), packet.type_name());
        assert_eq!(decoded, packet);
    }
}

#[test]
fn test_server_packets_use_wide_opcodes() {
    let welcome = SPacketWelcome {
        player_id: 4,
        tick_rate: 30,
        server_name: "eu-1".to_string(),
    };
    let frame = welcome.to_frame().unwrap();
    assert_eq!(&frame[..2], &(SPacketWelcome::OPCODE as u16).to_le_bytes());

    let broadcast = SPacketChatBroadcast {
        sender: 4,
        text: "hi @bob".to_string(),
        mentions: vec![7],
    };
    let decoded = ServerPacket::from_frame(&broadcast.to_frame().unwrap()).unwrap();
    assert_eq!(decoded, ServerPacket::from(broadcast));
}

// ============================================================================
// EXCLUSIONS
// ============================================================================

#[test]
fn test_excluded_field_is_not_encoded() {
    let join = CPacketJoin {
        name: "ada".to_string(),
        version: 3,
        skin: None,
        local_session: 0xfeed,
    };
    let frame = join.to_frame().unwrap();
    let decoded = CPacketJoin::from_frame(&frame).unwrap();

    assert_eq!(decoded.local_session, 0);
    assert_eq!(decoded.name, join.name);

    let without_session = CPacketJoin {
        local_session: 0,
        ..join.clone()
    };
    assert_eq!(frame, without_session.to_frame().unwrap());
}

// ============================================================================
// REJECTION
// ============================================================================

#[test]
fn test_truncated_frame_is_rejected() {
    let position = CPacketPosition {
        tick: 1,
        ..CPacketPosition::default()
    };
    let frame = position.to_frame().unwrap();

    let result = CPacketPosition::from_frame(&frame[..frame.len() - 1]);
    assert!(matches!(result, Err(ProtocolError::UnexpectedEnd { .. })));
}

#[test]
fn test_trailing_bytes_are_rejected() {
    let mut frame = CPacketReady {}.to_frame().unwrap();
    frame.push(0);

    assert_eq!(
        ClientPacket::from_frame(&frame),
        Err(ProtocolError::TrailingBytes(1))
    );
}

#[test]
fn test_unknown_opcode_is_rejected() {
    let frame = [200u8];
    assert_eq!(
        ClientPacket::from_frame(&frame),
        Err(ProtocolError::UnknownOpcode(200))
    );
}

#[test]
fn test_oversized_lobby_does_not_encode() {
    let state = SPacketLobbyState {
        map_seed: vec![7; MAX_PACKET_SIZE],
        ..SPacketLobbyState::default()
    };
    assert!(matches!(
        state.to_frame(),
        Err(ProtocolError::FrameTooLarge { max: MAX_PACKET_SIZE, .. })
    ));
}
