//! # Generator
//!
//! Runs the whole pipeline over schema text and renders one Rust source
//! file:
//!
//! ```text
//! // @generated header
//! use <runtime>::{...};            runtime items the code refers to
//! root types
//! pub mod <module> { types }       one block per schema module
//! ClientPacket / ServerPacket      opcode tables and conversions
//! <Registry>                       protocol marker
//! ```

use std::collections::{BTreeMap, BTreeSet};

use packetforge_core::Direction;

use crate::context::{GenerationContext, INDENT};
use crate::diagnostics::Diagnostics;
use crate::error::CodegenResult;
use crate::handlers::TypeHandlerRegistry;
use crate::model::{PacketTypeModel, RegistryModel, SchemaModel};
use crate::orchestrator::Orchestrator;
use crate::registry::{assign_opcodes, emit_protocol, emit_table, OpcodeTable};
use crate::scan::scan_schema;

/// Runtime items every generated file imports.
const RUNTIME_ITEMS: &[&str] = &[
    "combine_hash",
    "NetCodec",
    "NetHash",
    "NetType",
    "PacketReader",
    "PacketWriter",
    "ProtocolResult",
];

/// Runtime items the registry code needs.
const REGISTRY_ITEMS: &[&str] = &[
    "Direction",
    "OpcodeEntry",
    "OpcodeWidth",
    "PacketKind",
    "PacketSet",
    "Protocol",
];

/// Knobs of one generator run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Crate path the generated code imports its runtime from.
    pub runtime_crate: String,
    /// Name of the schema, shown in the file header.
    pub source_name: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            runtime_crate: "packetforge_core".to_string(),
            source_name: "schema".to_string(),
        }
    }
}

/// Result of one generator run.
#[derive(Clone, Debug, Default)]
pub struct GenerationOutput {
    /// Rendered source; empty when an error was reported.
    pub code: String,
    /// Everything reported during the run.
    pub diagnostics: Diagnostics,
    /// Opcode tables, one per direction, when a registry is declared.
    pub tables: Vec<OpcodeTable>,
}

impl GenerationOutput {
    /// Table of one direction.
    #[must_use]
    pub fn table(&self, direction: Direction) -> Option<&OpcodeTable> {
        self.tables.iter().find(|table| table.direction == direction)
    }
}

/// Compiles schema text into Rust source.
///
/// # Errors
///
/// Returns [`crate::CodegenError::Schema`] when the text is not a schema.
/// Validation problems are returned in [`GenerationOutput::diagnostics`],
/// with empty `code` when any of them is an error.
pub fn generate(source: &str, options: &GenerateOptions) -> CodegenResult<GenerationOutput> {
    let scan = scan_schema(source)?;
    let model = scan.model;
    let mut diagnostics = scan.diagnostics;

    let tables: Vec<OpcodeTable> = match &model.registry {
        Some(registry) => [Direction::Client, Direction::Server]
            .into_iter()
            .map(|direction| {
                assign_opcodes(&model, direction, registry.width(direction), &mut diagnostics)
            })
            .collect(),
        None => Vec::new(),
    };

    if diagnostics.has_errors() {
        return Ok(GenerationOutput {
            code: String::new(),
            diagnostics,
            tables,
        });
    }

    let handlers = TypeHandlerRegistry::new();
    let orchestrator = Orchestrator::new(&model, &handlers);
    let mut imports = BTreeSet::new();
    let mut modules: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for ty in &model.types {
        let emitted = orchestrator.emit(ty);
        imports.extend(emitted.imports);
        let lines = modules.entry(ty.module.as_str()).or_default();
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.extend(emitted.lines);
    }

    let registry_lines = model
        .registry
        .as_ref()
        .map(|registry| emit_registry(&model, registry, &tables))
        .unwrap_or_default();

    let code = render(
        options,
        &imports,
        &modules,
        &registry_lines,
        model.registry.is_some(),
    );
    tracing::debug!(
        types = model.types.len(),
        modules = modules.len(),
        bytes = code.len(),
        "schema compiled"
    );

    Ok(GenerationOutput {
        code,
        diagnostics,
        tables,
    })
}

fn emit_registry(model: &SchemaModel, registry: &RegistryModel, tables: &[OpcodeTable]) -> Vec<String> {
    // registry code lives at the root, next to the marker struct
    let anchor = PacketTypeModel {
        name: registry.name.clone(),
        module: String::new(),
        fqn: registry.name.clone(),
        direction: None,
        fields: Vec::new(),
        manual_codec: false,
        doc: None,
    };
    let mut out = GenerationContext::new(model, &anchor);
    for table in tables {
        emit_table(&mut out, table);
        out.line("");
    }
    emit_protocol(&mut out, registry);
    out.finish().0
}

fn render(
    options: &GenerateOptions,
    imports: &BTreeSet<String>,
    modules: &BTreeMap<&str, Vec<String>>,
    registry_lines: &[String],
    with_registry: bool,
) -> String {
    let mut runtime: Vec<&str> = RUNTIME_ITEMS.to_vec();
    if with_registry {
        runtime.extend_from_slice(REGISTRY_ITEMS);
    }
    let mut external = Vec::new();
    for import in imports {
        if import.contains("::") {
            external.push(import.as_str());
        } else if !runtime.contains(&import.as_str()) {
            runtime.push(import.as_str());
        }
    }
    runtime.sort_unstable();

    let mut code = String::new();
    let mut push = |line: &str| {
        code.push_str(line);
        code.push('\n');
    };

    push(&format!(
        "// @generated by packetforge_codegen from {}. Do not edit.",
        options.source_name
    ));
    push("");
    push("#[allow(unused_imports)]");
    push(&format!("use {}::{{{}}};", options.runtime_crate, runtime.join(", ")));
    for path in &external {
        push("#[allow(unused_imports)]");
        push(&format!("use {path};"));
    }

    if let Some(root) = modules.get("") {
        push("");
        for line in root {
            push(line);
        }
    }

    for (module, lines) in modules.iter().filter(|(module, _)| !module.is_empty()) {
        push("");
        push(&format!("pub mod {module} {{"));
        push(&format!("{INDENT}#[allow(unused_imports)]"));
        push(&format!("{INDENT}use super::*;"));
        push("");
        for line in lines {
            if line.is_empty() {
                push("");
            } else {
                push(&format!("{INDENT}{line}"));
            }
        }
        push("}");
    }

    if !registry_lines.is_empty() {
        push("");
        for line in registry_lines {
            push(line);
        }
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        [registry]
        name = "DemoProtocol"
        server_opcode = "u16"

        [[types]]
        name = "CPacketPosition"
        base = "ClientPacket"
        fields = [{ name = "position", type = "Vec3" }]

        [[types]]
        name = "CPacketJoin"
        base = "ClientPacket"
        fields = [{ name = "name", type = "String" }]

        [[types]]
        name = "CPacketChatMessage"
        module = "chat"
        base = "ClientPacket"
        fields = [{ name = "text", type = "String" }]

        [[types]]
        name = "SPacketLobby"
        base = "ServerPacket"
        fields = [{ name = "players", type = "HashMap<u32, String>" }]
    "#;

    #[test]
    fn test_generate_renders_all_sections() {
        let output = generate(SCHEMA, &GenerateOptions::default()).unwrap();
        assert!(!output.diagnostics.has_errors());

        let code = &output.code;
        assert!(code.starts_with("// @generated by packetforge_codegen from schema."));
        assert!(code.contains("use packetforge_core::{"));
        assert!(code.contains("Vec3"));
        assert!(code.contains("use std::collections::HashMap;"));
        assert!(code.contains("pub mod chat {\n    #[allow(unused_imports)]\n    use super::*;"));
        assert!(code.contains("    pub struct CPacketChatMessage {"));
        assert!(code.contains("pub enum ClientPacket {"));
        assert!(code.contains("CPacketChatMessage(chat::CPacketChatMessage),"));
        assert!(code.contains("const OPCODE_WIDTH: OpcodeWidth = OpcodeWidth::U16;"));
        assert!(code.contains("impl Protocol for DemoProtocol {"));
    }

    #[test]
    fn test_generate_assigns_sorted_opcodes() {
        let output = generate(SCHEMA, &GenerateOptions::default()).unwrap();
        let client = output.table(Direction::Client).unwrap();
        assert_eq!(client.opcode_of("CPacketJoin"), Some(0));
        assert_eq!(client.opcode_of("CPacketPosition"), Some(1));
        assert_eq!(client.opcode_of("chat::CPacketChatMessage"), Some(2));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let first = generate(SCHEMA, &GenerateOptions::default()).unwrap().code;
        let second = generate(SCHEMA, &GenerateOptions::default()).unwrap().code;
        assert_eq!(first, second);
    }

    #[test]
    fn test_errors_suppress_code() {
        let output = generate(
            r#"
            [[types]]
            name = "CPacketJoin"
            base = "ClientPacket"
            fields = [{ name = "skin", type = "Skin" }]
            "#,
            &GenerateOptions::default(),
        )
        .unwrap();
        assert!(output.code.is_empty());
        assert!(output.diagnostics.contains_code("PF0003"));
        assert!(output.diagnostics.contains_code("PF0023"));
    }

    /// Checks `{}`, `[]` and `()` pair up outside comments and string
    /// literals.
    fn delimiters_balance(code: &str) -> bool {
        let mut stack = Vec::new();
        for line in code.lines().filter(|line| !line.trim_start().starts_with("//")) {
            let mut in_string = false;
            for c in line.chars() {
                match c {
                    '"' => in_string = !in_string,
                    _ if in_string => {}
                    '{' | '[' | '(' => stack.push(c),
                    '}' | ']' | ')' => {
                        let open = match c {
                            '}' => '{',
                            ']' => '[',
                            _ => '(',
                        };
                        if stack.pop() != Some(open) {
                            return false;
                        }
                    }
                    _ => {}
                }
            }
        }
        stack.is_empty()
    }

    #[test]
    fn test_generated_delimiters_balance() {
        let output = generate(SCHEMA, &GenerateOptions::default()).unwrap();
        assert!(delimiters_balance(&output.code));
        assert!(!delimiters_balance("const ENTRIES: &[u8] = &[ {\n];"));
    }

    #[test]
    fn test_custom_runtime_path() {
        let options = GenerateOptions {
            runtime_crate: "crate::runtime".to_string(),
            source_name: "demo.toml".to_string(),
        };
        let code = generate(SCHEMA, &options).unwrap().code;
        assert!(code.contains("use crate::runtime::{"));
        assert!(code.contains("from demo.toml."));
    }
}
