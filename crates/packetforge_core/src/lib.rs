//! # PacketForge Core
//!
//! The wire runtime every generated protocol links against.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Opcode (1, 2 or 4 bytes, per direction)                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Encoded property values, in declared order                   │
//! │ (max MAX_PACKET_SIZE bytes in total)                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Collections are prefixed with a `u32`
//! element count, strings and blobs with a `u32` byte count.
//!
//! ## Example
//!
//! ```rust
//! use packetforge_core::{PacketReader, PacketWriter};
//!
//! let mut writer = PacketWriter::new();
//! writer.write_u16(7);
//! writer.write_string("hello");
//!
//! let mut reader = PacketReader::new(writer.as_slice());
//! assert_eq!(reader.read_u16().unwrap(), 7);
//! assert_eq!(reader.read_string().unwrap(), "hello");
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod math;
pub mod opcode;
pub mod stream;

pub use codec::{combine_hash, NetCodec, NetHash, NetType, HASH_MULTIPLIER};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{check_frame_size, decode_frame, encode_frame, peek_opcode};
pub use math::{Vec2, Vec3};
pub use opcode::{Direction, OpcodeEntry, OpcodeWidth, PacketKind, PacketSet, Protocol};
pub use stream::{PacketReader, PacketWriter};

/// Maximum size of one frame (opcode prefix included) in bytes.
///
/// Senders refuse to queue larger frames; receivers drop them unread.
pub const MAX_PACKET_SIZE: usize = 4096;
