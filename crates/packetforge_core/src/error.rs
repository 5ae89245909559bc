//! # Protocol Error Types
//!
//! Everything that can go wrong while reading or framing wire data.

use thiserror::Error;

/// Errors raised by value streams and frame handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input ended before a value could be read.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the read required.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    /// A char value was not a Unicode scalar value.
    #[error("invalid char value: {0:#x}")]
    InvalidChar(u32),

    /// A string payload was not valid UTF-8.
    #[error("invalid utf-8 in string value")]
    InvalidUtf8,

    /// No packet type is registered for the opcode.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),

    /// A frame exceeds the maximum packet size.
    #[error("frame too large: {size} bytes, maximum is {max}")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// The configured ceiling.
        max: usize,
    },

    /// A frame decoded fully but bytes were left over.
    #[error("{0} trailing bytes after packet body")]
    TrailingBytes(usize),

    /// A collection is too large for its count prefix.
    #[error("collection length {0} does not fit the wire count")]
    LengthOverflow(usize),
}

/// Result type for wire operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
