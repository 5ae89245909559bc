//! # Schema Format
//!
//! Serde layout of a packet schema file.
//!
//! ```toml
//! [registry]
//! name = "GameProtocol"
//! client_opcode = "u8"      # optional, u8 | u16 | u32
//! server_opcode = "u16"
//!
//! [[types]]
//! name = "CPacketJoin"
//! base = "ClientPacket"     # ClientPacket | ServerPacket | absent = complex
//! module = ""               # optional namespace
//! manual_codec = false
//! fields = [
//!     { name = "name", type = "String" },
//!     { name = "session", type = "u64", exclude = true },
//! ]
//! ```

use serde::Deserialize;

/// Base declaring a client packet.
pub const CLIENT_BASE: &str = "ClientPacket";
/// Base declaring a server packet.
pub const SERVER_BASE: &str = "ServerPacket";

/// A whole schema file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSchema {
    /// Registry marker.
    #[serde(default)]
    pub registry: Option<RawRegistry>,
    /// Declared types, in file order.
    #[serde(default)]
    pub types: Vec<RawType>,
}

/// The `[registry]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRegistry {
    /// Name of the emitted protocol marker struct.
    pub name: String,
    /// Opcode width of client packets.
    #[serde(default)]
    pub client_opcode: Option<String>,
    /// Opcode width of server packets.
    #[serde(default)]
    pub server_opcode: Option<String>,
    /// Doc comment for the marker struct.
    #[serde(default)]
    pub doc: Option<String>,
}

/// One `[[types]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawType {
    /// Type name.
    pub name: String,
    /// Namespace, empty for the root.
    #[serde(default)]
    pub module: String,
    /// `ClientPacket`, `ServerPacket`, or absent for complex types.
    #[serde(default)]
    pub base: Option<String>,
    /// Encode/decode are written by hand.
    #[serde(default)]
    pub manual_codec: bool,
    /// Doc comment for the struct.
    #[serde(default)]
    pub doc: Option<String>,
    /// Fields, in declared order.
    #[serde(default)]
    pub fields: Vec<RawField>,
}

/// One field of a type.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawField {
    /// Field name.
    pub name: String,
    /// Declared type, see [`crate::types`].
    #[serde(rename = "type")]
    pub ty: String,
    /// Skip the field when encoding and decoding.
    #[serde(default)]
    pub exclude: bool,
    /// Doc comment for the field.
    #[serde(default)]
    pub doc: Option<String>,
}

/// Parses schema text.
///
/// # Errors
///
/// Returns the TOML error for malformed input or unknown keys.
pub fn parse_schema(source: &str) -> Result<RawSchema, toml::de::Error> {
    toml::from_str(source)
}
