//! # Datagram Format
//!
//! ```text
//! ┌──────────────┬──────────┬─────────────────────────────────────┐
//! │ Magic "PF"   │ Kind u8  │ Kind fields                         │
//! │ (2 bytes)    │          │                                     │
//! └──────────────┴──────────┴─────────────────────────────────────┘
//!
//! Connect     -
//! Accept      peer_id u32
//! Data        seq u32, frame (rest of the datagram)
//! Ack         seq u32
//! Ping        -
//! Disconnect  reason u8
//! ```

use packetforge_core::{PacketReader, PacketWriter};

use crate::reason::DisconnectReason;

/// Datagram magic.
pub const MAGIC: u16 = u16::from_le_bytes(*b"PF");

/// Bytes in front of a data frame.
pub const DATA_HEADER_LEN: usize = 7;

const KIND_CONNECT: u8 = 1;
const KIND_ACCEPT: u8 = 2;
const KIND_DATA: u8 = 3;
const KIND_ACK: u8 = 4;
const KIND_PING: u8 = 5;
const KIND_DISCONNECT: u8 = 6;

/// One host datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Datagram {
    /// Client asks to connect.
    Connect,
    /// Server accepted the client under `peer_id`.
    Accept {
        /// Id the server assigned.
        peer_id: u32,
    },
    /// Reliable frame.
    Data {
        /// Per-peer sequence number.
        seq: u32,
        /// Opcode-prefixed packet frame.
        frame: Vec<u8>,
    },
    /// Acknowledges a data datagram.
    Ack {
        /// Acknowledged sequence number.
        seq: u32,
    },
    /// Heartbeat.
    Ping,
    /// Connection closed by the sender.
    Disconnect {
        /// Why.
        reason: DisconnectReason,
    },
}

impl Datagram {
    /// Encodes the datagram.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PacketWriter::with_capacity(match self {
            Self::Data { frame, .. } => DATA_HEADER_LEN + frame.len(),
            _ => 8,
        });
        writer.write_u16(MAGIC);
        match self {
            Self::Connect => writer.write_u8(KIND_CONNECT),
            Self::Accept { peer_id } => {
                writer.write_u8(KIND_ACCEPT);
                writer.write_u32(*peer_id);
            }
            Self::Data { seq, frame } => {
                writer.write_u8(KIND_DATA);
                writer.write_u32(*seq);
                writer.write_raw(frame);
            }
            Self::Ack { seq } => {
                writer.write_u8(KIND_ACK);
                writer.write_u32(*seq);
            }
            Self::Ping => writer.write_u8(KIND_PING),
            Self::Disconnect { reason } => {
                writer.write_u8(KIND_DISCONNECT);
                writer.write_u8(reason.as_u8());
            }
        }
        writer.into_bytes()
    }

    /// Decodes a datagram; anything malformed yields `None`.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut reader = PacketReader::new(bytes);
        if reader.read_u16().ok()? != MAGIC {
            return None;
        }
        let datagram = match reader.read_u8().ok()? {
            KIND_CONNECT => Self::Connect,
            KIND_ACCEPT => Self::Accept {
                peer_id: reader.read_u32().ok()?,
            },
            KIND_DATA => {
                let seq = reader.read_u32().ok()?;
                let frame = reader.take(reader.remaining()).ok()?.to_vec();
                Self::Data { seq, frame }
            }
            KIND_ACK => Self::Ack {
                seq: reader.read_u32().ok()?,
            },
            KIND_PING => Self::Ping,
            KIND_DISCONNECT => Self::Disconnect {
                reason: DisconnectReason::from_u8(reader.read_u8().ok()?)?,
            },
            _ => return None,
        };
        (reader.remaining() == 0).then_some(datagram)
    }
}
