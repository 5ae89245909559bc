//! # Opcode Registry Generator
//!
//! Packets of each direction are sorted by fully-qualified display name
//! (byte order) and numbered from zero, so the same schema always yields the
//! same opcodes. Per direction the generator emits a closed enum
//! implementing `PacketSet`, a `PacketKind` and `From` impl per packet type,
//! and finally the protocol marker implementing `Protocol`.

use packetforge_core::{Direction, OpcodeWidth};

use crate::context::GenerationContext;
use crate::diagnostics::Diagnostics;
use crate::model::{PacketTypeModel, RegistryModel, SchemaModel};

/// One assigned opcode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpcodeAssignment {
    /// Assigned opcode.
    pub opcode: u32,
    /// Fully-qualified display name.
    pub fqn: String,
    /// Type name, also the enum variant name.
    pub name: String,
}

/// Opcode table of one direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpcodeTable {
    /// Direction of the packets.
    pub direction: Direction,
    /// Opcode width on the wire.
    pub width: OpcodeWidth,
    /// Assignments sorted by opcode.
    pub entries: Vec<OpcodeAssignment>,
}

impl OpcodeTable {
    /// Name of the emitted enum.
    #[must_use]
    pub const fn enum_name(&self) -> &'static str {
        match self.direction {
            Direction::Client => "ClientPacket",
            Direction::Server => "ServerPacket",
        }
    }

    /// Opcode assigned to a type, by display name.
    #[must_use]
    pub fn opcode_of(&self, fqn: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.fqn == fqn)
            .map(|entry| entry.opcode)
    }
}

/// Assigns opcodes to the packets of one direction.
///
/// Reports `PF0100` when the packet count exceeds the largest value of the
/// width; the table is still returned so further errors can be found.
pub fn assign_opcodes(
    schema: &SchemaModel,
    direction: Direction,
    width: OpcodeWidth,
    diagnostics: &mut Diagnostics,
) -> OpcodeTable {
    let mut packets: Vec<&PacketTypeModel> = schema.packets(direction).collect();
    packets.sort_by(|a, b| a.fqn.as_bytes().cmp(b.fqn.as_bytes()));

    let count = packets.len() as u64;
    if count > width.max_value() {
        diagnostics.error(
            "PF0100",
            format!("registry.{direction}"),
            format!(
                "{count} {direction} packet types do not fit a {} opcode (max {})",
                width.variant_name().to_lowercase(),
                width.max_value()
            ),
        );
    }

    let entries = packets
        .into_iter()
        .zip(0u32..)
        .map(|(packet, opcode)| OpcodeAssignment {
            opcode,
            fqn: packet.fqn.clone(),
            name: packet.name.clone(),
        })
        .collect();

    OpcodeTable {
        direction,
        width,
        entries,
    }
}

/// Emits the packet enum, conversions and the `PacketSet` impl of a table.
pub fn emit_table(out: &mut GenerationContext<'_>, table: &OpcodeTable) {
    let set = table.enum_name();

    match table.direction {
        Direction::Client => out.line("/// Every packet a client can send, keyed by opcode."),
        Direction::Server => out.line("/// Every packet the server can send, keyed by opcode."),
    }
    out.line("#[derive(Debug, Clone, PartialEq)]");
    out.open(format!("pub enum {set}"));
    for entry in &table.entries {
        out.line(format!("/// `{}` (opcode {}).", entry.fqn, entry.opcode));
        out.line(format!("{}({}),", entry.name, entry.fqn));
    }
    out.close("}");
    out.line("");

    emit_packet_set(out, table);

    for entry in &table.entries {
        out.line("");
        emit_packet_kind(out, table, entry);
    }
}

fn emit_packet_set(out: &mut GenerationContext<'_>, table: &OpcodeTable) {
    let set = table.enum_name();
    let direction = match table.direction {
        Direction::Client => "Client",
        Direction::Server => "Server",
    };

    out.open(format!("impl PacketSet for {set}"));
    out.line(format!("const DIRECTION: Direction = Direction::{direction};"));
    out.line(format!(
        "const OPCODE_WIDTH: OpcodeWidth = OpcodeWidth::{};",
        table.width.variant_name()
    ));
    out.open_raw("const ENTRIES: &'static [OpcodeEntry] = &[");
    for entry in &table.entries {
        out.line(format!(
            "OpcodeEntry {{ opcode: {}, type_name: \"{}\" }},",
            entry.opcode, entry.fqn
        ));
    }
    out.close("];");
    out.line("");

    match_each_variant(out, table, "fn opcode(&self) -> u32", None, |entry| {
        format!("Self::{}(_) => {},", entry.name, entry.opcode)
    });
    out.line("");
    match_each_variant(out, table, "fn type_name(&self) -> &'static str", None, |entry| {
        format!("Self::{}(_) => \"{}\",", entry.name, entry.fqn)
    });
    out.line("");

    out.open("fn prototype(opcode: u32) -> Option<Self>");
    if table.entries.is_empty() {
        out.line("let _ = opcode;");
        out.line("None");
    } else {
        out.open("match opcode");
        for entry in &table.entries {
            out.line(format!(
                "{} => Some(Self::{}({}::default())),",
                entry.opcode, entry.name, entry.fqn
            ));
        }
        out.line("_ => None,");
        out.close("}");
    }
    out.close("}");
    out.line("");

    match_each_variant(
        out,
        table,
        "fn encode_body(&self, writer: &mut PacketWriter)",
        Some("writer"),
        |entry| format!("Self::{}(packet) => packet.encode(writer),", entry.name),
    );
    out.line("");
    match_each_variant(
        out,
        table,
        "fn decode_body(&mut self, reader: &mut PacketReader<'_>) -> ProtocolResult<()>",
        Some("reader"),
        |entry| format!("Self::{}(packet) => packet.decode(reader),", entry.name),
    );
    out.close("}");
}

/// Emits a method whose body matches on every variant. An empty set has no
/// variants, so the body matches on the uninhabited `*self`.
fn match_each_variant(
    out: &mut GenerationContext<'_>,
    table: &OpcodeTable,
    header: &str,
    argument: Option<&str>,
    arm: impl Fn(&OpcodeAssignment) -> String,
) {
    out.open(header);
    if table.entries.is_empty() {
        if let Some(argument) = argument {
            out.line(format!("let _ = {argument};"));
        }
        out.line("match *self {}");
    } else {
        out.open("match self");
        for entry in &table.entries {
            out.line(arm(entry));
        }
        out.close("}");
    }
    out.close("}");
}

fn emit_packet_kind(out: &mut GenerationContext<'_>, table: &OpcodeTable, entry: &OpcodeAssignment) {
    let set = table.enum_name();
    let name = &entry.name;
    let path = &entry.fqn;

    out.open(format!("impl PacketKind<{set}> for {path}"));
    out.line(format!("const OPCODE: u32 = {};", entry.opcode));
    out.line("");
    out.open(format!("fn into_set(self) -> {set}"));
    out.line(format!("{set}::{name}(self)"));
    out.close("}");
    out.line("");
    out.open(format!("fn from_set(set: {set}) -> Result<Self, {set}>"));
    out.open("match set");
    out.line(format!("{set}::{name}(packet) => Ok(packet),"));
    if table.entries.len() > 1 {
        out.line("other => Err(other),");
    }
    out.close("}");
    out.close("}");
    out.close("}");
    out.line("");

    out.open(format!("impl From<{path}> for {set}"));
    out.open(format!("fn from(packet: {path}) -> Self"));
    out.line(format!("Self::{name}(packet)"));
    out.close("}");
    out.close("}");
}

/// Emits the protocol marker struct.
pub fn emit_protocol(out: &mut GenerationContext<'_>, registry: &RegistryModel) {
    match &registry.doc {
        Some(doc) => {
            for line in doc.trim().lines() {
                out.line(format!("/// {}", line.trim()).trim_end());
            }
        }
        None => out.line("/// Protocol marker tying `ClientPacket` and `ServerPacket` together."),
    }
    out.line("#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]");
    out.line(format!("pub struct {};", registry.name));
    out.line("");
    out.open(format!("impl Protocol for {}", registry.name));
    out.line("type ClientPackets = ClientPacket;");
    out.line("type ServerPackets = ServerPacket;");
    out.close("}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_schema;

    fn schema(packets: &[(&str, &str)]) -> String {
        let mut source = String::from("[registry]\nname = \"Demo\"\n");
        for (module, name) in packets {
            source.push_str(&format!(
                "\n[[types]]\nname = \"{name}\"\nmodule = \"{module}\"\nbase = \"ClientPacket\"\n"
            ));
        }
        source
    }

    fn table(packets: &[(&str, &str)], width: OpcodeWidth) -> (OpcodeTable, Diagnostics) {
        let model = scan_schema(&schema(packets)).unwrap().model;
        let mut diagnostics = Diagnostics::new();
        let table = assign_opcodes(&model, Direction::Client, width, &mut diagnostics);
        (table, diagnostics)
    }

    #[test]
    fn test_opcodes_follow_sorted_names() {
        let (table, diagnostics) = table(&[("", "CPacketPosition"), ("", "CPacketJoin")], OpcodeWidth::U8);
        assert!(diagnostics.is_empty());
        assert_eq!(table.opcode_of("CPacketJoin"), Some(0));
        assert_eq!(table.opcode_of("CPacketPosition"), Some(1));
    }

    #[test]
    fn test_later_sorting_type_keeps_existing_opcodes() {
        let (before, _) = table(&[("", "CPacketJoin"), ("", "CPacketPosition")], OpcodeWidth::U8);
        let (after, _) = table(
            &[("", "CPacketZoom"), ("", "CPacketJoin"), ("", "CPacketPosition")],
            OpcodeWidth::U8,
        );
        assert_eq!(before.entries[..], after.entries[..2]);
        assert_eq!(after.opcode_of("CPacketZoom"), Some(2));
    }

    #[test]
    fn test_module_is_part_of_sort_key() {
        let (table, _) = table(&[("zz", "CPacketA"), ("", "CPacketB"), ("chat", "CPacketC")], OpcodeWidth::U8);
        let order: Vec<&str> = table.entries.iter().map(|entry| entry.fqn.as_str()).collect();
        assert_eq!(order, vec!["CPacketB", "chat::CPacketC", "zz::CPacketA"]);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let names: Vec<String> = (0..256).map(|i| format!("CPacket{i:03}")).collect();
        let packets: Vec<(&str, &str)> = names.iter().map(|name| ("", name.as_str())).collect();

        let (_, diagnostics) = table(&packets, OpcodeWidth::U8);
        assert!(diagnostics.contains_code("PF0100"));

        let (wide, diagnostics) = table(&packets, OpcodeWidth::U16);
        assert!(diagnostics.is_empty());
        assert_eq!(wide.opcode_of("CPacket255"), Some(255));

        let (fits, diagnostics) = table(&packets[..255], OpcodeWidth::U8);
        assert!(diagnostics.is_empty());
        assert_eq!(fits.entries.len(), 255);
    }

    #[test]
    fn test_single_variant_has_no_fallback_arm() {
        let model = scan_schema(&schema(&[("", "CPacketJoin")])).unwrap().model;
        let mut diagnostics = Diagnostics::new();
        let table = assign_opcodes(&model, Direction::Client, OpcodeWidth::U8, &mut diagnostics);
        let ty = model.find("CPacketJoin").unwrap();
        let mut out = GenerationContext::new(&model, ty);
        emit_table(&mut out, &table);
        let source = out.finish().0.join("\n");

        assert!(source.contains("pub enum ClientPacket {"));
        assert!(source.contains("OpcodeEntry { opcode: 0, type_name: \"CPacketJoin\" },"));
        assert!(source.contains("0 => Some(Self::CPacketJoin(CPacketJoin::default())),"));
        assert!(!source.contains("other => Err(other),"));
    }

    #[test]
    fn test_empty_set_matches_on_never() {
        let model = scan_schema(&schema(&[("", "CPacketJoin")])).unwrap().model;
        let mut diagnostics = Diagnostics::new();
        let table = assign_opcodes(&model, Direction::Server, OpcodeWidth::U8, &mut diagnostics);
        let ty = model.find("CPacketJoin").unwrap();
        let mut out = GenerationContext::new(&model, ty);
        emit_table(&mut out, &table);
        let source = out.finish().0.join("\n");

        assert!(source.contains("pub enum ServerPacket {\n}"));
        assert!(source.contains("match *self {}"));
        assert!(source.contains("const ENTRIES: &'static [OpcodeEntry] = &[\n    ];"));
    }

    #[test]
    fn test_entries_array_is_a_plain_slice() {
        let (table, _) = table(&[("", "CPacketJoin"), ("chat", "CPacketSay")], OpcodeWidth::U8);
        let model = scan_schema(&schema(&[("", "CPacketJoin")])).unwrap().model;
        let ty = model.find("CPacketJoin").unwrap();
        let mut out = GenerationContext::new(&model, ty);
        emit_table(&mut out, &table);
        let lines = out.finish().0;

        let start = lines
            .iter()
            .position(|line| line.trim_start().starts_with("const ENTRIES"))
            .unwrap();
        assert_eq!(
            lines[start..start + 4],
            [
                "    const ENTRIES: &'static [OpcodeEntry] = &[",
                "        OpcodeEntry { opcode: 0, type_name: \"CPacketJoin\" },",
                "        OpcodeEntry { opcode: 1, type_name: \"chat::CPacketSay\" },",
                "    ];",
            ]
        );
    }
}
