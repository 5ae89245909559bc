//! # PacketForge Protocol
//!
//! The lobby protocol of the demo game, generated from
//! `schema/packets.toml` by the build script.
//!
//! ## Opcodes
//!
//! ```text
//! client (u8)                       server (u16)
//! 0  CPacketJoin                    0  SPacketLobbyState
//! 1  CPacketPosition                1  SPacketPong        (manual codec)
//! 2  CPacketReady                   2  SPacketWelcome
//! 3  CPacketTimeRequest             3  chat::SPacketChatBroadcast
//! 4  chat::CPacketChatMessage
//! ```
//!
//! Module-qualified names sort after root names because `c` > `S`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod generated {
    #![allow(clippy::all, clippy::pedantic, missing_docs, unused_mut)]
    include!(concat!(env!("OUT_DIR"), "/protocol.rs"));
}

pub use generated::*;

use packetforge_core::{NetCodec, PacketReader, PacketWriter, ProtocolResult};

/// Version carried in [`CPacketJoin::version`].
pub const PROTOCOL_VERSION: u16 = 3;

/// The server clock travels as a delta from the echoed stamp.
impl NetCodec for SPacketPong {
    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_u64(self.stamp);
        writer.write_u64(self.server_time.wrapping_sub(self.stamp));
    }

    fn decode(&mut self, reader: &mut PacketReader<'_>) -> ProtocolResult<()> {
        self.stamp = reader.read_u64()?;
        self.server_time = self.stamp.wrapping_add(reader.read_u64()?);
        Ok(())
    }
}

impl SPacketPong {
    /// Answers a time request at `server_time`.
    #[inline]
    #[must_use]
    pub const fn answer(request: &CPacketTimeRequest, server_time: u64) -> Self {
        Self {
            stamp: request.stamp,
            server_time,
        }
    }

    /// Milliseconds between the request and `now`, both on the client clock.
    #[inline]
    #[must_use]
    pub const fn round_trip_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetforge_core::{NetType, PacketKind};

    #[test]
    fn test_pong_codec_is_hand_written() {
        assert!(<SPacketPong as NetType>::MANUAL_CODEC);

        let pong = SPacketPong {
            stamp: 1_000,
            server_time: 1_250,
        };
        let frame = pong.to_frame().unwrap();
        // u16 opcode, stamp, delta
        assert_eq!(frame.len(), 2 + 8 + 8);
        assert_eq!(&frame[10..], &250u64.to_le_bytes());

        let decoded = SPacketPong::from_frame(&frame).unwrap();
        assert_eq!(decoded, pong);
    }

    #[test]
    fn test_pong_answers_request() {
        let pong = SPacketPong::answer(&CPacketTimeRequest { stamp: 40 }, 99);
        assert_eq!(pong.stamp, 40);
        assert_eq!(pong.round_trip_ms(65), 25);
        assert_eq!(pong.round_trip_ms(10), 0);
    }
}
