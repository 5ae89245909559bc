//! # Schema Scan
//!
//! Entry point of the compiler: parses a schema, validates it and resolves
//! every type reference. The result is a [`SchemaModel`] plus the
//! diagnostics gathered on the way; the model is only meaningful when no
//! error was reported.

use std::collections::{HashMap, HashSet};

use packetforge_core::{Direction, OpcodeWidth};

use crate::diagnostics::Diagnostics;
use crate::error::CodegenResult;
use crate::model::{PacketTypeModel, PropertyModel, RegistryModel, SchemaModel};
use crate::schema::{parse_schema, RawRegistry, RawSchema, RawType, CLIENT_BASE, SERVER_BASE};
use crate::types::TypeShape;

/// Names the generated file declares or imports at its root.
const RESERVED_TYPE_NAMES: &[&str] = &[
    "ClientPacket",
    "ServerPacket",
    "HashMap",
    "NetCodec",
    "NetHash",
    "NetType",
    "PacketReader",
    "PacketWriter",
    "PacketSet",
    "PacketKind",
    "Protocol",
    "ProtocolResult",
    "OpcodeEntry",
    "OpcodeWidth",
    "Direction",
    "Vec2",
    "Vec3",
    "Vec",
    "Option",
    "Box",
    "String",
    "Self",
];

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "gen", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Output of [`scan_schema`].
#[derive(Clone, Debug, Default)]
pub struct ScanResult {
    /// Validated model.
    pub model: SchemaModel,
    /// Everything reported while scanning.
    pub diagnostics: Diagnostics,
}

/// Returns true for a plain Rust identifier that is not a keyword.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name != "_"
        && !KEYWORDS.contains(&name)
}

/// Parses and validates a schema.
///
/// # Errors
///
/// Returns [`crate::CodegenError::Schema`] when the text is not a schema at
/// all; validation problems are reported as diagnostics instead.
pub fn scan_schema(source: &str) -> CodegenResult<ScanResult> {
    let raw = parse_schema(source)?;
    let mut diagnostics = Diagnostics::new();

    let registry = raw
        .registry
        .as_ref()
        .map(|registry| scan_registry(registry, &mut diagnostics));
    let mut model = SchemaModel {
        registry,
        types: scan_types(&raw, &mut diagnostics),
    };

    match (&model.registry, model.has_packets()) {
        (None, true) => diagnostics.error(
            "PF0003",
            "registry",
            "packet types are declared but the schema has no [registry] table",
        ),
        (Some(registry), false) => diagnostics.warning(
            "PF0004",
            registry.name.as_str(),
            "registry declared without any packet types",
        ),
        _ => {}
    }

    resolve_references(&mut model, &mut diagnostics);
    check_cycles(&model, &mut diagnostics);

    for ty in &model.types {
        if !ty.manual_codec && ty.is_empty() {
            diagnostics.info(
                "PF0040",
                ty.fqn.as_str(),
                "no serializable properties; encode and decode do nothing",
            );
        }
    }

    tracing::debug!(
        types = model.types.len(),
        diagnostics = diagnostics.len(),
        "schema scanned"
    );
    Ok(ScanResult { model, diagnostics })
}

fn scan_registry(raw: &RawRegistry, diagnostics: &mut Diagnostics) -> RegistryModel {
    let mut width = |key: &str, value: Option<&String>| match value {
        None => OpcodeWidth::default(),
        Some(name) => OpcodeWidth::from_type_name(name).unwrap_or_else(|| {
            diagnostics.error(
                "PF0002",
                format!("registry.{key}"),
                format!("opcode width must be u8, u16 or u32, found `{name}`"),
            );
            OpcodeWidth::default()
        }),
    };
    let client_width = width("client_opcode", raw.client_opcode.as_ref());
    let server_width = width("server_opcode", raw.server_opcode.as_ref());

    if !is_identifier(&raw.name) {
        diagnostics.error(
            "PF0010",
            "registry",
            format!("`{}` is not a valid type name", raw.name),
        );
    }

    RegistryModel {
        name: raw.name.clone(),
        client_width,
        server_width,
        doc: raw.doc.clone(),
    }
}

fn scan_types(raw: &RawSchema, diagnostics: &mut Diagnostics) -> Vec<PacketTypeModel> {
    let registry_name = raw.registry.as_ref().map(|registry| registry.name.as_str());
    let mut seen_types = HashSet::new();
    let mut seen_variants: HashMap<(Direction, &str), &str> = HashMap::new();
    let mut types = Vec::with_capacity(raw.types.len());

    for raw_type in &raw.types {
        let fqn = PacketTypeModel::qualify(&raw_type.module, &raw_type.name);

        if !is_identifier(&raw_type.name) {
            diagnostics.error(
                "PF0010",
                fqn.as_str(),
                format!("`{}` is not a valid type name", raw_type.name),
            );
            continue;
        }
        if !raw_type.module.is_empty() && !is_identifier(&raw_type.module) {
            diagnostics.error(
                "PF0011",
                fqn.as_str(),
                format!("`{}` is not a valid module name", raw_type.module),
            );
            continue;
        }
        if RESERVED_TYPE_NAMES.contains(&raw_type.name.as_str())
            || Some(raw_type.name.as_str()) == registry_name
        {
            diagnostics.error(
                "PF0015",
                fqn.as_str(),
                format!("`{}` is reserved by the generated code", raw_type.name),
            );
            continue;
        }
        if !seen_types.insert(fqn.clone()) {
            diagnostics.error("PF0013", fqn.as_str(), "type declared more than once");
            continue;
        }

        let direction = match raw_type.base.as_deref() {
            None => None,
            Some(CLIENT_BASE) => Some(Direction::Client),
            Some(SERVER_BASE) => Some(Direction::Server),
            Some(other) => {
                diagnostics.error(
                    "PF0012",
                    fqn.as_str(),
                    format!("unknown base `{other}`; expected `{CLIENT_BASE}` or `{SERVER_BASE}`"),
                );
                continue;
            }
        };

        if let Some(direction) = direction {
            if let Some(previous) = seen_variants.insert((direction, raw_type.name.as_str()), raw_type.module.as_str()) {
                diagnostics.error(
                    "PF0014",
                    fqn.as_str(),
                    format!(
                        "{direction} packet name `{}` is already used by `{}`",
                        raw_type.name,
                        PacketTypeModel::qualify(previous, &raw_type.name)
                    ),
                );
                continue;
            }
        } else if raw_type.manual_codec {
            diagnostics.warning(
                "PF0041",
                fqn.as_str(),
                "manual codec on a complex type; enclosing types call its NetCodec impl",
            );
        }

        types.push(PacketTypeModel {
            name: raw_type.name.clone(),
            module: raw_type.module.clone(),
            fields: scan_fields(raw_type, &fqn, diagnostics),
            fqn,
            direction,
            manual_codec: raw_type.manual_codec,
            doc: raw_type.doc.clone(),
        });
    }

    types
}

fn scan_fields(raw_type: &RawType, fqn: &str, diagnostics: &mut Diagnostics) -> Vec<PropertyModel> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(raw_type.fields.len());

    for raw_field in &raw_type.fields {
        let subject = format!("{fqn}.{}", raw_field.name);

        if !is_identifier(&raw_field.name) {
            diagnostics.error(
                "PF0020",
                subject,
                format!("`{}` is not a valid field name", raw_field.name),
            );
            continue;
        }
        if !seen.insert(raw_field.name.as_str()) {
            diagnostics.error("PF0021", subject, "field declared more than once");
            continue;
        }

        let shape = match TypeShape::parse(&raw_field.ty) {
            Ok(shape) => shape,
            Err(message) => {
                diagnostics.error(
                    "PF0022",
                    subject,
                    format!("cannot parse type `{}`: {message}", raw_field.ty),
                );
                continue;
            }
        };
        for key in shape.invalid_map_keys() {
            diagnostics.error(
                "PF0024",
                subject.as_str(),
                format!("`{key}` cannot key a map; use an integer, bool, char or String"),
            );
        }

        fields.push(PropertyModel {
            name: raw_field.name.clone(),
            declared: raw_field.ty.clone(),
            shape,
            exclude: raw_field.exclude,
            doc: raw_field.doc.clone(),
        });
    }

    fields
}

fn resolve_references(model: &mut SchemaModel, diagnostics: &mut Diagnostics) {
    let lookup = model.clone();
    for ty in &mut model.types {
        let module = ty.module.clone();
        for field in &mut ty.fields {
            let unresolved = field.shape.resolve_complex(&mut |name| {
                lookup
                    .resolve(&module, name)
                    .map(|target| target.fqn.clone())
            });
            for name in unresolved {
                diagnostics.error(
                    "PF0023",
                    format!("{}.{}", ty.fqn, field.name),
                    format!("unknown type `{name}`"),
                );
            }
        }
    }
}

/// Reports every type that reaches itself through its fields.
///
/// Manual-codec types end a path: their contents are not inlined.
fn check_cycles(model: &SchemaModel, diagnostics: &mut Diagnostics) {
    let edges: HashMap<&str, Vec<String>> = model
        .types
        .iter()
        .map(|ty| {
            let mut targets = Vec::new();
            for field in &ty.fields {
                field.shape.for_each_complex(&mut |name| {
                    if model.find(name).is_some_and(|target| !target.manual_codec) {
                        targets.push(name.to_string());
                    }
                });
            }
            (ty.fqn.as_str(), targets)
        })
        .collect();

    for ty in &model.types {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = edges
            .get(ty.fqn.as_str())
            .map(|targets| targets.iter().map(String::as_str).collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if current == ty.fqn {
                diagnostics.error(
                    "PF0025",
                    ty.fqn.as_str(),
                    "type contains itself; recursive types cannot be inlined",
                );
                break;
            }
            if visited.insert(current) {
                if let Some(targets) = edges.get(current) {
                    stack.extend(targets.iter().map(String::as_str));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> ScanResult {
        scan_schema(source).unwrap()
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("player_name"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("match"));
        assert!(!is_identifier("_"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn test_valid_schema_resolves_references() {
        let result = scan(
            r#"
            [registry]
            name = "Demo"

            [[types]]
            name = "Info"
            module = "lobby"
            fields = [{ name = "id", type = "u32" }]

            [[types]]
            name = "SPacketLobby"
            module = "lobby"
            base = "ServerPacket"
            fields = [{ name = "players", type = "Vec<Info>" }]

            [[types]]
            name = "SPacketSpotlight"
            base = "ServerPacket"
            fields = [{ name = "player", type = "Option<lobby::Info>" }]
            "#,
        );

        assert!(!result.diagnostics.has_errors(), "{:?}", result.diagnostics);
        let lobby = result.model.find("lobby::SPacketLobby").unwrap();
        assert_eq!(lobby.fields[0].shape.to_string(), "Vec<lobby::Info>");
        assert_eq!(result.model.packets(Direction::Server).count(), 2);
    }

    #[test]
    fn test_packets_without_registry() {
        let result = scan(
            r#"
            [[types]]
            name = "CPacketPing"
            base = "ClientPacket"
            "#,
        );
        assert!(result.diagnostics.contains_code("PF0003"));
    }

    #[test]
    fn test_registry_without_packets_warns() {
        let result = scan(
            r#"
            [registry]
            name = "Demo"
            "#,
        );
        assert!(result.diagnostics.contains_code("PF0004"));
        assert!(!result.diagnostics.has_errors());
    }

    #[test]
    fn test_bad_width() {
        let result = scan(
            r#"
            [registry]
            name = "Demo"
            client_opcode = "u24"
            "#,
        );
        assert!(result.diagnostics.contains_code("PF0002"));
    }

    #[test]
    fn test_type_level_errors() {
        let result = scan(
            r#"
            [registry]
            name = "Demo"

            [[types]]
            name = "fn"

            [[types]]
            name = "A"
            base = "Packet"

            [[types]]
            name = "B"

            [[types]]
            name = "B"

            [[types]]
            name = "CPacketX"
            base = "ClientPacket"

            [[types]]
            name = "CPacketX"
            module = "other"
            base = "ClientPacket"

            [[types]]
            name = "ClientPacket"

            [[types]]
            name = "Demo"
            "#,
        );
        let d = &result.diagnostics;
        for code in ["PF0010", "PF0012", "PF0013", "PF0014", "PF0015"] {
            assert!(d.contains_code(code), "missing {code}: {d:?}");
        }
    }

    #[test]
    fn test_field_errors() {
        let result = scan(
            r#"
            [registry]
            name = "Demo"

            [[types]]
            name = "CPacketBad"
            base = "ClientPacket"
            fields = [
                { name = "type", type = "u8" },
                { name = "a", type = "u8" },
                { name = "a", type = "u16" },
                { name = "b", type = "Vec<u8" },
                { name = "c", type = "Skin" },
                { name = "d", type = "HashMap<f64, u8>" },
            ]
            "#,
        );
        let d = &result.diagnostics;
        for code in ["PF0020", "PF0021", "PF0022", "PF0023", "PF0024"] {
            assert!(d.contains_code(code), "missing {code}: {d:?}");
        }
    }

    #[test]
    fn test_recursive_types() {
        let result = scan(
            r#"
            [[types]]
            name = "Node"
            fields = [{ name = "children", type = "Vec<Leaf>" }]

            [[types]]
            name = "Leaf"
            fields = [{ name = "parent", type = "Option<Node>" }]
            "#,
        );
        assert_eq!(
            result
                .diagnostics
                .iter()
                .filter(|d| d.code == "PF0025")
                .count(),
            2
        );
    }

    #[test]
    fn test_manual_codec_breaks_cycles() {
        let result = scan(
            r#"
            [[types]]
            name = "Tree"
            manual_codec = true
            fields = [{ name = "children", type = "Vec<Tree>" }]
            "#,
        );
        assert!(!result.diagnostics.contains_code("PF0025"));
        assert!(result.diagnostics.contains_code("PF0041"));
    }

    #[test]
    fn test_empty_type_is_info() {
        let result = scan(
            r#"
            [registry]
            name = "Demo"

            [[types]]
            name = "CPacketReady"
            base = "ClientPacket"
            fields = [{ name = "local", type = "u32", exclude = true }]
            "#,
        );
        assert!(result.diagnostics.contains_code("PF0040"));
        assert!(!result.diagnostics.has_errors());
    }
}
