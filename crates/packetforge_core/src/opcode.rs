//! # Opcode Registry Runtime
//!
//! Traits the generated opcode tables implement.
//!
//! ## Lookup Structures
//!
//! ```text
//! type   -> opcode      PacketKind::OPCODE
//! type   -> prototype   PacketSet::prototype(PacketKind::OPCODE)
//! opcode -> type        PacketSet::ENTRIES / PacketSet::entry
//! opcode -> prototype   PacketSet::prototype
//! ```
//!
//! One [`PacketSet`] exists per direction; it is a closed enum with one
//! variant per packet type, so dispatch never needs open-ended inheritance.

use std::fmt;

use crate::codec::{NetCodec, NetType};
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame;
use crate::stream::{PacketReader, PacketWriter};

/// Width of the opcode prefix on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum OpcodeWidth {
    /// One byte (default).
    #[default]
    U8,
    /// Two bytes.
    U16,
    /// Four bytes.
    U32,
}

impl OpcodeWidth {
    /// Largest value representable by the width.
    #[must_use]
    pub const fn max_value(self) -> u64 {
        match self {
            Self::U8 => u8::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
        }
    }

    /// Bytes the prefix occupies.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// Parses a schema width name (`u8`, `u16`, `u32`).
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "u8" => Some(Self::U8),
            "u16" => Some(Self::U16),
            "u32" => Some(Self::U32),
            _ => None,
        }
    }

    /// Rust path of the width, as emitted by the generator.
    #[must_use]
    pub const fn variant_name(self) -> &'static str {
        match self {
            Self::U8 => "U8",
            Self::U16 => "U16",
            Self::U32 => "U32",
        }
    }
}

/// Packet family a type belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sent by clients, handled by the server.
    Client,
    /// Sent by the server, handled by clients.
    Server,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// One row of an opcode table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeEntry {
    /// Assigned opcode.
    pub opcode: u32,
    /// Fully-qualified display name of the packet type.
    pub type_name: &'static str,
}

/// Closed set of packet types for one direction.
pub trait PacketSet: Sized + Send + fmt::Debug + 'static {
    /// Direction of every packet in the set.
    const DIRECTION: Direction;
    /// Width of the opcode prefix.
    const OPCODE_WIDTH: OpcodeWidth;
    /// Opcode table, sorted by opcode; `ENTRIES[i].opcode == i`.
    const ENTRIES: &'static [OpcodeEntry];

    /// Opcode of the contained packet.
    fn opcode(&self) -> u32;

    /// Fully-qualified name of the contained packet type.
    fn type_name(&self) -> &'static str;

    /// Fresh default instance for the opcode, used as the decode target.
    fn prototype(opcode: u32) -> Option<Self>;

    /// Encodes the contained packet's properties (no opcode).
    fn encode_body(&self, writer: &mut PacketWriter);

    /// Decodes properties into the contained prototype.
    ///
    /// # Errors
    ///
    /// Propagates the packet's decode error.
    fn decode_body(&mut self, reader: &mut PacketReader<'_>) -> ProtocolResult<()>;

    /// Looks up the table row of an opcode.
    #[must_use]
    fn entry(opcode: u32) -> Option<&'static OpcodeEntry> {
        Self::ENTRIES
            .get(opcode as usize)
            .filter(|entry| entry.opcode == opcode)
    }

    /// Looks up the opcode of a type by its fully-qualified name.
    #[must_use]
    fn opcode_of(type_name: &str) -> Option<u32> {
        Self::ENTRIES
            .iter()
            .find(|entry| entry.type_name == type_name)
            .map(|entry| entry.opcode)
    }

    /// Encodes opcode and body into one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] past the size ceiling.
    fn to_frame(&self) -> ProtocolResult<Vec<u8>> {
        frame::encode_frame(Self::OPCODE_WIDTH, self.opcode(), |writer| {
            self.encode_body(writer);
        })
    }

    /// Decodes a frame into a packet of this set.
    ///
    /// # Errors
    ///
    /// Oversized frames are rejected unread; unknown opcodes, short bodies
    /// and trailing bytes are errors.
    fn from_frame(frame: &[u8]) -> ProtocolResult<Self> {
        frame::decode_frame(frame)
    }
}

/// A packet type that belongs to the set `S`.
pub trait PacketKind<S: PacketSet>: NetCodec + NetType + Default + Send + 'static {
    /// Opcode assigned to the type.
    const OPCODE: u32;

    /// Wraps the packet into its set.
    fn into_set(self) -> S;

    /// Unwraps the packet from its set, handing back other variants.
    ///
    /// # Errors
    ///
    /// Returns the set unchanged when it holds a different type.
    fn from_set(set: S) -> Result<Self, S>;

    /// Encodes the packet into one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] past the size ceiling.
    fn to_frame(&self) -> ProtocolResult<Vec<u8>> {
        frame::encode_frame(S::OPCODE_WIDTH, Self::OPCODE, |writer| self.encode(writer))
    }

    /// Decodes a frame that must hold this packet type.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownOpcode`] when the frame holds another type.
    fn from_frame(frame: &[u8]) -> ProtocolResult<Self> {
        let set = S::from_frame(frame)?;
        let opcode = set.opcode();
        Self::from_set(set).map_err(|_| ProtocolError::UnknownOpcode(opcode))
    }
}

/// Both directions of one protocol, as emitted for the registry marker.
pub trait Protocol: 'static {
    /// Packets clients send.
    type ClientPackets: PacketSet;
    /// Packets the server sends.
    type ServerPackets: PacketSet;
}
