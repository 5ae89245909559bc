//! # Generation Orchestrator
//!
//! Emits everything one declared type needs:
//!
//! - the struct (`Debug`, `Clone`, `Default`)
//! - `NetCodec` (skipped for manual-codec types)
//! - `PartialEq`, `NetHash` and `Hash` over the serializable properties
//! - `NetType` with the type's static descriptor
//! - an inherent impl holding deep equality/hash helpers, when needed
//!
//! Each property is emitted through its own [`GenerationContext`]; the
//! resulting lines are spliced into the impl bodies.

use std::collections::BTreeSet;

use packetforge_core::Direction;

use crate::context::GenerationContext;
use crate::equality::{equality_fragment, hash_fragment};
use crate::handlers::{Access, TypeHandlerRegistry};
use crate::model::{PacketTypeModel, PropertyModel, SchemaModel};

/// Source emitted for one type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmittedType {
    /// Module the source belongs in, empty for the root.
    pub module: String,
    /// Source lines, unindented.
    pub lines: Vec<String>,
    /// Imports the source needs.
    pub imports: BTreeSet<String>,
    /// Number of deep helper functions emitted.
    pub deep_helpers: usize,
}

/// Emits the struct and impls of one type.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    schema: &'a SchemaModel,
    handlers: &'a TypeHandlerRegistry,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator over a validated schema.
    #[must_use]
    pub const fn new(schema: &'a SchemaModel, handlers: &'a TypeHandlerRegistry) -> Self {
        Self { schema, handlers }
    }

    /// Emits one type.
    #[must_use]
    pub fn emit(&self, ty: &'a PacketTypeModel) -> EmittedType {
        let mut out = GenerationContext::new(self.schema, ty);
        let mut imports = BTreeSet::new();
        let mut helpers: Vec<Vec<String>> = Vec::new();

        self.emit_struct(&mut out, ty);
        if !ty.manual_codec {
            out.line("");
            self.emit_codec(&mut out, ty, &mut imports);
        }
        out.line("");
        self.emit_equality(&mut out, ty, &mut imports, &mut helpers);
        out.line("");
        self.emit_hash(&mut out, ty, &mut imports, &mut helpers);
        out.line("");
        emit_net_type(&mut out, ty);

        if !helpers.is_empty() {
            out.line("");
            out.open(format!("impl {}", ty.name));
            for (index, helper) in helpers.iter().enumerate() {
                if index > 0 {
                    out.line("");
                }
                for line in helper {
                    out.line(line);
                }
            }
            out.close("}");
        }

        let deep_helpers = helpers.len();
        let (lines, struct_imports) = out.finish();
        imports.extend(struct_imports);
        tracing::trace!(ty = %ty.fqn, deep_helpers, "type emitted");

        EmittedType {
            module: ty.module.clone(),
            lines,
            imports,
            deep_helpers,
        }
    }

    /// Runs `emit` in a fresh context scoped to `property`.
    fn scoped<R>(
        &self,
        ty: &'a PacketTypeModel,
        property: &'a PropertyModel,
        imports: &mut BTreeSet<String>,
        emit: impl FnOnce(&mut GenerationContext<'a>) -> R,
    ) -> (R, Vec<String>) {
        let mut ctx = GenerationContext::for_property(self.schema, ty, property);
        let result = emit(&mut ctx);
        let (lines, property_imports) = ctx.finish();
        imports.extend(property_imports);
        (result, lines)
    }

    fn emit_struct(&self, out: &mut GenerationContext<'a>, ty: &'a PacketTypeModel) {
        match (&ty.doc, ty.direction) {
            (Some(doc), _) => emit_doc(out, doc),
            (None, Some(Direction::Client)) => out.line(format!("/// Client packet `{}`.", ty.fqn)),
            (None, Some(Direction::Server)) => out.line(format!("/// Server packet `{}`.", ty.fqn)),
            (None, None) => out.line(format!("/// Declared type `{}`.", ty.fqn)),
        }
        out.line("#[derive(Debug, Clone, Default)]");
        out.open(format!("pub struct {}", ty.name));
        for field in &ty.fields {
            match (&field.doc, field.exclude) {
                (Some(doc), _) => emit_doc(out, doc),
                (None, false) => out.line(format!("/// Serialized as `{}`.", field.shape)),
                (None, true) => out.line("/// Not serialized; keeps its default after decode."),
            }
            let rust_type = out.rust_type(&field.shape);
            out.line(format!("pub {}: {rust_type},", field.name));
        }
        out.close("}");
    }

    fn emit_codec(
        &self,
        out: &mut GenerationContext<'a>,
        ty: &'a PacketTypeModel,
        imports: &mut BTreeSet<String>,
    ) {
        out.open(format!("impl NetCodec for {}", ty.name));
        if ty.is_empty() {
            out.line("fn encode(&self, _writer: &mut PacketWriter) {}");
            out.line("");
            out.open("fn decode(&mut self, _reader: &mut PacketReader<'_>) -> ProtocolResult<()>");
            out.line("Ok(())");
            out.close("}");
            out.close("}");
            return;
        }

        out.open("fn encode(&self, writer: &mut PacketWriter)");
        for property in ty.serializable() {
            let ((), lines) = self.scoped(ty, property, imports, |ctx| {
                ctx.line(format!("// {}: {}", property.name, property.shape));
                let access = Access::Place(format!("self.{}", property.name));
                self.handlers.emit_encode(ctx, &property.shape, &access);
            });
            splice(out, &lines);
        }
        out.close("}");
        out.line("");

        out.open("fn decode(&mut self, reader: &mut PacketReader<'_>) -> ProtocolResult<()>");
        for property in ty.serializable() {
            let ((), lines) = self.scoped(ty, property, imports, |ctx| {
                ctx.line(format!("// {}: {}", property.name, property.shape));
                let value = self.handlers.emit_decode(ctx, &property.shape);
                ctx.line(format!("self.{} = {value};", property.name));
            });
            splice(out, &lines);
        }
        out.line("Ok(())");
        out.close("}");
        out.close("}");
    }

    fn emit_equality(
        &self,
        out: &mut GenerationContext<'a>,
        ty: &'a PacketTypeModel,
        imports: &mut BTreeSet<String>,
        helpers: &mut Vec<Vec<String>>,
    ) {
        out.open(format!("impl PartialEq for {}", ty.name));
        if ty.is_empty() {
            out.open("fn eq(&self, _other: &Self) -> bool");
            out.line("true");
            out.close("}");
            out.close("}");
            return;
        }

        out.open("fn eq(&self, other: &Self) -> bool");
        out.open("if std::ptr::eq(self, other)");
        out.line("return true;");
        out.close("}");
        for property in ty.serializable() {
            let (fragment, helper) =
                self.scoped(ty, property, imports, |ctx| equality_fragment(ctx, property));
            if fragment.deep {
                helpers.push(helper);
            }
            out.line(&fragment.comment);
            out.open(format!("if {}", fragment.mismatch));
            out.line("return false;");
            out.close("}");
        }
        out.line("true");
        out.close("}");
        out.close("}");
    }

    fn emit_hash(
        &self,
        out: &mut GenerationContext<'a>,
        ty: &'a PacketTypeModel,
        imports: &mut BTreeSet<String>,
        helpers: &mut Vec<Vec<String>>,
    ) {
        out.open(format!("impl NetHash for {}", ty.name));
        out.open("fn net_hash(&self) -> i32");
        if ty.is_empty() {
            out.line("0");
        } else {
            out.line("let mut hash = 0i32;");
            for property in ty.serializable() {
                let (fragment, helper) =
                    self.scoped(ty, property, imports, |ctx| hash_fragment(ctx, property));
                if fragment.deep {
                    helpers.push(helper);
                }
                out.line(&fragment.comment);
                out.line(format!("hash = combine_hash(hash, {});", fragment.expression));
            }
            out.line("hash");
        }
        out.close("}");
        out.close("}");
        out.line("");

        out.open(format!("impl std::hash::Hash for {}", ty.name));
        out.open("fn hash<H: std::hash::Hasher>(&self, state: &mut H)");
        out.line("state.write_i32(self.net_hash());");
        out.close("}");
        out.close("}");
    }
}

fn emit_net_type(out: &mut GenerationContext<'_>, ty: &PacketTypeModel) {
    let list = |names: Vec<&str>| {
        let quoted: Vec<String> = names.iter().map(|name| format!("\"{name}\"")).collect();
        format!("&[{}]", quoted.join(", "))
    };
    let fields = list(ty.serializable().map(|field| field.name.as_str()).collect());
    let excluded = list(ty.excluded().map(|field| field.name.as_str()).collect());

    out.open(format!("impl NetType for {}", ty.name));
    out.line(format!("const TYPE_NAME: &'static str = \"{}\";", ty.fqn));
    out.line(format!("const FIELDS: &'static [&'static str] = {fields};"));
    out.line(format!("const EXCLUDED_FIELDS: &'static [&'static str] = {excluded};"));
    out.line(format!("const MANUAL_CODEC: bool = {};", ty.manual_codec));
    out.close("}");
}

fn emit_doc(out: &mut GenerationContext<'_>, doc: &str) {
    for line in doc.trim().lines() {
        let line = line.trim();
        if line.is_empty() {
            out.line("///");
        } else {
            out.line(format!("/// {line}"));
        }
    }
}

fn splice(out: &mut GenerationContext<'_>, lines: &[String]) {
    for line in lines {
        out.line(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_schema;

    const SCHEMA: &str = r#"
        [registry]
        name = "Demo"

        [[types]]
        name = "CPacketJoin"
        base = "ClientPacket"
        doc = "Sent once after connecting."
        fields = [
            { name = "name", type = "String" },
            { name = "scores", type = "Vec<u32>" },
            { name = "session", type = "u64", exclude = true },
        ]

        [[types]]
        name = "CPacketReady"
        base = "ClientPacket"

        [[types]]
        name = "SPacketPong"
        base = "ServerPacket"
        manual_codec = true
        fields = [{ name = "stamp", type = "u64" }]
    "#;

    fn emit(fqn: &str) -> EmittedType {
        let model = scan_schema(SCHEMA).unwrap().model;
        let handlers = TypeHandlerRegistry::new();
        let orchestrator = Orchestrator::new(&model, &handlers);
        orchestrator.emit(model.find(fqn).unwrap())
    }

    #[test]
    fn test_full_type() {
        let emitted = emit("CPacketJoin");
        let source = emitted.lines.join("\n");

        assert!(source.contains("/// Sent once after connecting.\n#[derive(Debug, Clone, Default)]\npub struct CPacketJoin {"));
        assert!(source.contains("    pub session: u64,"));
        assert!(source.contains("impl NetCodec for CPacketJoin {"));
        assert!(source.contains("        writer.write_string(&self.name);"));
        assert!(source.contains("        self.name = reader.read_string()?;"));
        assert!(!source.contains("self.session ="));
        assert!(source.contains("        if std::ptr::eq(self, other) {"));
        assert!(source.contains("        if !Self::deep_eq_scores(&self.scores, &other.scores) {"));
        assert!(source.contains("        hash = combine_hash(hash, self.name.net_hash());"));
        assert!(source.contains("    const FIELDS: &'static [&'static str] = &[\"name\", \"scores\"];"));
        assert!(source.contains("    const EXCLUDED_FIELDS: &'static [&'static str] = &[\"session\"];"));
        assert!(source.contains("impl CPacketJoin {"));
        assert_eq!(emitted.deep_helpers, 2);
    }

    #[test]
    fn test_empty_type_gets_noop_bodies() {
        let source = emit("CPacketReady").lines.join("\n");
        assert!(source.contains("    fn encode(&self, _writer: &mut PacketWriter) {}"));
        assert!(source.contains("    fn eq(&self, _other: &Self) -> bool {\n        true\n    }"));
        assert!(!source.contains("impl CPacketReady {"));
    }

    #[test]
    fn test_manual_codec_is_skipped() {
        let source = emit("SPacketPong").lines.join("\n");
        assert!(!source.contains("impl NetCodec"));
        assert!(source.contains("impl PartialEq for SPacketPong"));
        assert!(source.contains("const MANUAL_CODEC: bool = true;"));
    }
}
