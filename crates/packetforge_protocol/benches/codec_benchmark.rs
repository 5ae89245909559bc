//! # Codec Benchmark
//!
//! Encode and decode cost of generated packets:
//! - a primitive-only movement packet, sent every tick
//! - lobby snapshots of growing size, with nested collections
//!
//! Run with: `cargo bench --package packetforge_protocol`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use packetforge_core::{NetHash, PacketKind, PacketSet, Vec3};
use packetforge_protocol::{CPacketPosition, ClientPacket, PlayerInfo, SPacketLobbyState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lobby sizes to measure.
const LOBBY_SIZES: [usize; 3] = [4, 16, 64];

fn position() -> CPacketPosition {
    CPacketPosition {
        tick: 42,
        position: Vec3::new(10.0, 64.0, -3.5),
        velocity: Vec3::new(0.1, 0.0, 0.2),
        on_ground: true,
    }
}

fn lobby(players: usize) -> SPacketLobbyState {
    let mut rng = StdRng::seed_from_u64(players as u64);
    let mut team_rosters = HashMap::new();
    for team in ["red", "blue"] {
        let roster: Vec<i32> = (0..players / 2).map(|_| rng.gen_range(0..1000)).collect();
        team_rosters.insert(team.to_string(), roster);
    }

    SPacketLobbyState {
        players: (0..players as u32)
            .map(|id| PlayerInfo {
                id,
                name: format!("player-{id}"),
                position: Vec3::new(rng.gen(), rng.gen(), rng.gen()),
                ready: rng.gen(),
            })
            .collect(),
        score_history: (0..players)
            .map(|_| (0..4).map(|_| rng.gen_range(-50..50)).collect::<Box<[i32]>>())
            .collect(),
        team_rosters,
        host: None,
        motd: Some(vec!["welcome".to_string()].into_boxed_slice()),
        map_seed: (0..32).map(|_| rng.gen()).collect(),
    }
}

/// Benchmark: movement packet through the typed and the set paths.
fn bench_position(c: &mut Criterion) {
    let packet = position();
    let frame = packet.to_frame().unwrap_or_default();

    c.bench_function("position_encode", |b| {
        b.iter(|| black_box(&packet).to_frame());
    });
    c.bench_function("position_decode", |b| {
        b.iter(|| CPacketPosition::from_frame(black_box(&frame)));
    });
    c.bench_function("position_decode_set", |b| {
        b.iter(|| ClientPacket::from_frame(black_box(&frame)));
    });
}

/// Benchmark: lobby snapshots with nested collections.
fn bench_lobby(c: &mut Criterion) {
    let mut group = c.benchmark_group("lobby");

    for players in LOBBY_SIZES {
        let state = lobby(players);
        let frame = state.to_frame().unwrap_or_default();

        group.bench_with_input(BenchmarkId::new("encode", players), &state, |b, state| {
            b.iter(|| black_box(state).to_frame());
        });
        group.bench_with_input(BenchmarkId::new("decode", players), &frame, |b, frame| {
            b.iter(|| SPacketLobbyState::from_frame(black_box(frame)));
        });
        group.bench_with_input(BenchmarkId::new("hash", players), &state, |b, state| {
            b.iter(|| black_box(state).net_hash());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_position, bench_lobby);
criterion_main!(benches);
