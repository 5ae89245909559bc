//! # Schema Model
//!
//! Validated, resolved view of a schema that the emitters work from.

use std::collections::BTreeSet;

use packetforge_core::{Direction, OpcodeWidth};

use crate::types::TypeShape;

/// The registry marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryModel {
    /// Name of the protocol marker struct.
    pub name: String,
    /// Opcode width of client packets.
    pub client_width: OpcodeWidth,
    /// Opcode width of server packets.
    pub server_width: OpcodeWidth,
    /// Doc comment.
    pub doc: Option<String>,
}

impl RegistryModel {
    /// Width configured for a direction.
    #[must_use]
    pub const fn width(&self, direction: Direction) -> OpcodeWidth {
        match direction {
            Direction::Client => self.client_width,
            Direction::Server => self.server_width,
        }
    }
}

/// One field of a declared type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyModel {
    /// Field name.
    pub name: String,
    /// Type as written in the schema.
    pub declared: String,
    /// Parsed and resolved type.
    pub shape: TypeShape,
    /// Skipped by encode and decode.
    pub exclude: bool,
    /// Doc comment.
    pub doc: Option<String>,
}

/// One declared type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketTypeModel {
    /// Type name.
    pub name: String,
    /// Namespace, empty for the root.
    pub module: String,
    /// Fully-qualified display name, `module::Name` or `Name`.
    pub fqn: String,
    /// Packet direction; `None` for complex types.
    pub direction: Option<Direction>,
    /// All fields in declared order, excluded ones included.
    pub fields: Vec<PropertyModel>,
    /// Encode/decode are hand-written.
    pub manual_codec: bool,
    /// Doc comment.
    pub doc: Option<String>,
}

impl PacketTypeModel {
    /// Builds the display name of a type.
    #[must_use]
    pub fn qualify(module: &str, name: &str) -> String {
        if module.is_empty() {
            name.to_string()
        } else {
            format!("{module}::{name}")
        }
    }

    /// True for client and server packets.
    #[must_use]
    pub const fn is_packet(&self) -> bool {
        self.direction.is_some()
    }

    /// Fields that take part in encode, decode, equality and hashing.
    pub fn serializable(&self) -> impl Iterator<Item = &PropertyModel> {
        self.fields.iter().filter(|field| !field.exclude)
    }

    /// Fields opted out of serialization.
    pub fn excluded(&self) -> impl Iterator<Item = &PropertyModel> {
        self.fields.iter().filter(|field| field.exclude)
    }

    /// True when no field is serialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.serializable().next().is_none()
    }
}

/// A validated schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaModel {
    /// Registry marker, if declared.
    pub registry: Option<RegistryModel>,
    /// Every declared type, in file order.
    pub types: Vec<PacketTypeModel>,
}

impl SchemaModel {
    /// Finds a type by its display name.
    #[must_use]
    pub fn find(&self, fqn: &str) -> Option<&PacketTypeModel> {
        self.types.iter().find(|ty| ty.fqn == fqn)
    }

    /// Packets of one direction, in file order.
    pub fn packets(&self, direction: Direction) -> impl Iterator<Item = &PacketTypeModel> {
        self.types
            .iter()
            .filter(move |ty| ty.direction == Some(direction))
    }

    /// True if any packet type is declared.
    #[must_use]
    pub fn has_packets(&self) -> bool {
        self.types.iter().any(PacketTypeModel::is_packet)
    }

    /// Non-root modules, sorted.
    #[must_use]
    pub fn modules(&self) -> BTreeSet<&str> {
        self.types
            .iter()
            .filter(|ty| !ty.module.is_empty())
            .map(|ty| ty.module.as_str())
            .collect()
    }

    /// Resolves a type reference written inside `from_module`.
    ///
    /// Qualified names are looked up as written; bare names are looked up in
    /// `from_module` first, then at the root.
    #[must_use]
    pub fn resolve(&self, from_module: &str, name: &str) -> Option<&PacketTypeModel> {
        if name.contains("::") {
            return self.find(name);
        }
        self.find(&PacketTypeModel::qualify(from_module, name))
            .or_else(|| self.find(name))
    }
}
