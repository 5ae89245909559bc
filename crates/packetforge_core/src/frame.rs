//! # Frame Handling
//!
//! `[opcode][body]` framing with the [`MAX_PACKET_SIZE`] ceiling.

use crate::error::{ProtocolError, ProtocolResult};
use crate::opcode::{OpcodeWidth, PacketSet};
use crate::stream::{PacketReader, PacketWriter};
use crate::MAX_PACKET_SIZE;

/// Rejects frames above the size ceiling.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] when `size > MAX_PACKET_SIZE`.
#[inline]
pub const fn check_frame_size(size: usize) -> ProtocolResult<()> {
    if size > MAX_PACKET_SIZE {
        Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_PACKET_SIZE,
        })
    } else {
        Ok(())
    }
}

/// Writes the opcode, lets `body` write the properties, and checks the result.
///
/// # Errors
///
/// Returns [`ProtocolError::LengthOverflow`] when a collection count did not
/// fit, or [`ProtocolError::FrameTooLarge`] past the ceiling.
pub fn encode_frame(
    width: OpcodeWidth,
    opcode: u32,
    body: impl FnOnce(&mut PacketWriter),
) -> ProtocolResult<Vec<u8>> {
    let mut writer = PacketWriter::with_capacity(64);
    writer.write_opcode(width, opcode);
    body(&mut writer);

    if let Some(len) = writer.length_overflow() {
        return Err(ProtocolError::LengthOverflow(len));
    }
    check_frame_size(writer.len())?;
    Ok(writer.into_bytes())
}

/// Reads only the opcode prefix of a frame.
///
/// # Errors
///
/// Returns an error when the frame is shorter than the prefix.
pub fn peek_opcode(width: OpcodeWidth, frame: &[u8]) -> ProtocolResult<u32> {
    PacketReader::new(frame).read_opcode(width)
}

/// Decodes a complete frame into a packet of the set `S`.
///
/// The size check happens before any byte is interpreted.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`], [`ProtocolError::UnknownOpcode`],
/// any body decode error, or [`ProtocolError::TrailingBytes`].
pub fn decode_frame<S: PacketSet>(frame: &[u8]) -> ProtocolResult<S> {
    check_frame_size(frame.len())?;

    let mut reader = PacketReader::new(frame);
    let opcode = reader.read_opcode(S::OPCODE_WIDTH)?;
    let mut packet = S::prototype(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;
    packet.decode_body(&mut reader)?;

    match reader.remaining() {
        0 => Ok(packet),
        extra => Err(ProtocolError::TrailingBytes(extra)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_ceiling() {
        assert!(check_frame_size(MAX_PACKET_SIZE).is_ok());
        assert_eq!(
            check_frame_size(MAX_PACKET_SIZE + 1),
            Err(ProtocolError::FrameTooLarge {
                size: MAX_PACKET_SIZE + 1,
                max: MAX_PACKET_SIZE
            })
        );
    }

    #[test]
    fn test_encode_frame_prefixes_opcode() {
        let frame = encode_frame(OpcodeWidth::U16, 3, |writer| writer.write_u8(0xAA)).unwrap();
        assert_eq!(frame, vec![3, 0, 0xAA]);
        assert_eq!(peek_opcode(OpcodeWidth::U16, &frame).unwrap(), 3);
    }

    #[test]
    fn test_encode_frame_rejects_oversized_body() {
        let result = encode_frame(OpcodeWidth::U8, 0, |writer| {
            writer.write_bytes(&vec![0u8; MAX_PACKET_SIZE]);
        });
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }
}
