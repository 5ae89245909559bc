//! # Generation Context
//!
//! Scratch state for emitting the code of one property: output lines,
//! indentation, imports the code needs and a counter for fresh local names.
//! A context is created per property and discarded once its lines are
//! spliced into the type's impl blocks.

use std::collections::BTreeSet;

use crate::model::{PacketTypeModel, PropertyModel, SchemaModel};
use crate::types::{relative_path, TypeShape};

/// One indentation level in emitted code.
pub const INDENT: &str = "    ";

/// Emission state for one property of one type.
#[derive(Debug)]
pub struct GenerationContext<'a> {
    schema: &'a SchemaModel,
    current_type: &'a PacketTypeModel,
    current_property: Option<&'a PropertyModel>,
    lines: Vec<String>,
    indent: usize,
    imports: BTreeSet<String>,
    counter: usize,
}

impl<'a> GenerationContext<'a> {
    /// Creates a context for `current_type`.
    #[must_use]
    pub const fn new(schema: &'a SchemaModel, current_type: &'a PacketTypeModel) -> Self {
        Self {
            schema,
            current_type,
            current_property: None,
            lines: Vec::new(),
            indent: 0,
            imports: BTreeSet::new(),
            counter: 0,
        }
    }

    /// Creates a context scoped to one property.
    #[must_use]
    pub fn for_property(
        schema: &'a SchemaModel,
        current_type: &'a PacketTypeModel,
        property: &'a PropertyModel,
    ) -> Self {
        let mut ctx = Self::new(schema, current_type);
        ctx.current_property = Some(property);
        ctx
    }

    /// The schema being compiled.
    #[must_use]
    pub const fn schema(&self) -> &'a SchemaModel {
        self.schema
    }

    /// The type being emitted.
    #[must_use]
    pub const fn current_type(&self) -> &'a PacketTypeModel {
        self.current_type
    }

    /// The property being emitted, if scoped to one.
    #[must_use]
    pub const fn current_property(&self) -> Option<&'a PropertyModel> {
        self.current_property
    }

    /// Appends one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{text}", INDENT.repeat(self.indent)));
        }
    }

    /// Appends one line one level deeper than the current indentation.
    pub fn indent_block(&mut self, text: impl AsRef<str>) {
        self.indent += 1;
        self.line(text);
        self.indent -= 1;
    }

    /// Opens a `{` block after `header`.
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.open_raw(format!("{} {{", header.as_ref()));
    }

    /// Opens a block whose opening delimiter already ends `line`, such as
    /// `= &[` or `(`.
    pub fn open_raw(&mut self, line: impl AsRef<str>) {
        self.line(line);
        self.indent += 1;
    }

    /// Closes the innermost block with `closer` (usually `}`).
    pub fn close(&mut self, closer: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(closer);
    }

    /// Returns a local name no other emitted local uses.
    pub fn fresh(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_{}", self.counter)
    }

    /// Records an import the emitted code relies on.
    pub fn require_import(&mut self, path: impl Into<String>) {
        self.imports.insert(path.into());
    }

    /// Renders the Rust type of a shape as seen from the current type's
    /// module, recording imports.
    pub fn rust_type(&mut self, shape: &TypeShape) -> String {
        match shape {
            TypeShape::Primitive(primitive) => {
                if let Some(import) = primitive.runtime_import() {
                    self.require_import(import);
                }
                primitive.rust_type().to_string()
            }
            TypeShape::Array(inner) => format!("Box<[{}]>", self.rust_type(inner)),
            TypeShape::List(inner) => format!("Vec<{}>", self.rust_type(inner)),
            TypeShape::Map(key, value) => {
                self.require_import("std::collections::HashMap");
                let key = self.rust_type(key);
                let value = self.rust_type(value);
                format!("HashMap<{key}, {value}>")
            }
            TypeShape::Optional(inner) => format!("Option<{}>", self.rust_type(inner)),
            TypeShape::Complex(fqn) => self.type_path(fqn),
        }
    }

    /// Path of a declared type as seen from the current type's module.
    #[must_use]
    pub fn type_path(&self, fqn: &str) -> String {
        relative_path(&self.current_type.module, fqn)
    }

    /// Consumes the context, returning its lines and imports.
    #[must_use]
    pub fn finish(self) -> (Vec<String>, BTreeSet<String>) {
        (self.lines, self.imports)
    }
}
