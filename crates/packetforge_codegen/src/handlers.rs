//! # Type Handlers
//!
//! Emit the encode and decode statements of one property. Each handler
//! covers one family of shapes; the [`TypeHandlerRegistry`] picks the first
//! handler that accepts a shape and hands itself down so element, key and
//! value shapes recurse to any depth.
//!
//! ## Emitted Shapes
//!
//! ```text
//! primitive   writer.write_u32(v)               reader.read_u32()?
//! list/array  write_len, then each element      read_len, bounded alloc, loop, push
//! map         write_len, then key and value     read_len, bounded alloc, loop, insert
//! optional    write_bool, then the value        read_bool, then the value
//! complex     each serializable field inline    default, then each field
//! ```
//!
//! Encode statements read from an [`Access`]; decode returns an expression
//! holding the decoded value, after emitting any statements it needs.

use crate::context::GenerationContext;
use crate::types::{Primitive, TypeShape};

/// How emitted code reaches the value being encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// A place expression such as `self.name` or `item_1.name`.
    Place(String),
    /// A local holding a reference, such as a loop binding.
    Ref(String),
}

impl Access {
    /// Expression usable for method calls and field access.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Place(path) | Self::Ref(path) => path,
        }
    }

    /// Expression yielding the value itself (for `Copy` types).
    #[must_use]
    pub fn value(&self) -> String {
        match self {
            Self::Place(path) => path.clone(),
            Self::Ref(name) => format!("*{name}"),
        }
    }

    /// Expression yielding a shared reference to the value.
    #[must_use]
    pub fn reference(&self) -> String {
        match self {
            Self::Place(path) => format!("&{path}"),
            Self::Ref(name) => name.clone(),
        }
    }

    /// Access to a field of the value.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        Self::Place(format!("{}.{name}", self.path()))
    }
}

/// Emits code for one family of shapes.
pub trait TypeHandler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// True when the handler emits code for `shape`.
    fn handles(&self, shape: &TypeShape) -> bool;

    /// Emits statements writing the value at `access` to `writer`.
    fn emit_encode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    );

    /// Emits statements reading a value from `reader`, returning the
    /// expression that holds it.
    fn emit_decode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String;
}

/// Ordered set of handlers.
pub struct TypeHandlerRegistry {
    handlers: Vec<Box<dyn TypeHandler>>,
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: vec![
                Box::new(PrimitiveHandler),
                Box::new(ArrayHandler),
                Box::new(ListHandler),
                Box::new(MapHandler),
                Box::new(OptionalHandler),
                Box::new(ComplexHandler),
            ],
        }
    }
}

impl std::fmt::Debug for TypeHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|handler| handler.name()))
            .finish()
    }
}

impl TypeHandlerRegistry {
    /// Creates the registry with every built-in handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the handler for a shape.
    #[must_use]
    pub fn handler_for(&self, shape: &TypeShape) -> Option<&dyn TypeHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.handles(shape))
            .map(AsRef::as_ref)
    }

    /// Emits encode statements for `shape`.
    pub fn emit_encode(&self, ctx: &mut GenerationContext<'_>, shape: &TypeShape, access: &Access) {
        match self.handler_for(shape) {
            Some(handler) => handler.emit_encode(self, ctx, shape, access),
            None => ctx.line(format!("compile_error!(\"no encoder for `{shape}`\");")),
        }
    }

    /// Emits decode statements for `shape`, returning the value expression.
    pub fn emit_decode(&self, ctx: &mut GenerationContext<'_>, shape: &TypeShape) -> String {
        match self.handler_for(shape) {
            Some(handler) => handler.emit_decode(self, ctx, shape),
            None => format!("compile_error!(\"no decoder for `{shape}`\")"),
        }
    }
}

/// Scalars, strings, blobs and vectors: one stream call.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveHandler;

impl TypeHandler for PrimitiveHandler {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn handles(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Primitive(_))
    }

    fn emit_encode(
        &self,
        _registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    ) {
        if let TypeShape::Primitive(primitive) = shape {
            let argument = if primitive.is_copy() {
                access.value()
            } else {
                access.reference()
            };
            ctx.line(format!("writer.write_{}({argument});", primitive.method()));
        }
    }

    fn emit_decode(
        &self,
        _registry: &TypeHandlerRegistry,
        _ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String {
        let method = match shape {
            TypeShape::Primitive(primitive) => primitive.method(),
            _ => Primitive::U8.method(),
        };
        format!("reader.read_{method}()?")
    }
}

fn encode_sequence(
    registry: &TypeHandlerRegistry,
    ctx: &mut GenerationContext<'_>,
    element: &TypeShape,
    access: &Access,
) {
    ctx.line(format!("writer.write_len({}.len());", access.path()));
    let item = ctx.fresh("item");
    ctx.open(format!("for {item} in {}.iter()", access.path()));
    registry.emit_encode(ctx, element, &Access::Ref(item));
    ctx.close("}");
}

fn decode_sequence(
    registry: &TypeHandlerRegistry,
    ctx: &mut GenerationContext<'_>,
    element: &TypeShape,
) -> String {
    let count = ctx.fresh("count");
    let list = ctx.fresh("list");
    ctx.line(format!("let {count} = reader.read_len()?;"));
    ctx.line(format!(
        "let mut {list} = Vec::with_capacity(reader.capacity_hint({count}));"
    ));
    ctx.open(format!("for _ in 0..{count}"));
    let value = registry.emit_decode(ctx, element);
    ctx.line(format!("{list}.push({value});"));
    ctx.close("}");
    list
}

/// `[T]`, emitted as `Box<[T]>`.
#[derive(Debug, Clone, Copy)]
pub struct ArrayHandler;

impl TypeHandler for ArrayHandler {
    fn name(&self) -> &'static str {
        "array"
    }

    fn handles(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Array(_))
    }

    fn emit_encode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    ) {
        if let TypeShape::Array(element) = shape {
            encode_sequence(registry, ctx, element, access);
        }
    }

    fn emit_decode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String {
        match shape {
            TypeShape::Array(element) => {
                let list = decode_sequence(registry, ctx, element);
                format!("{list}.into_boxed_slice()")
            }
            _ => "Box::default()".to_string(),
        }
    }
}

/// `Vec<T>`.
#[derive(Debug, Clone, Copy)]
pub struct ListHandler;

impl TypeHandler for ListHandler {
    fn name(&self) -> &'static str {
        "list"
    }

    fn handles(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::List(_))
    }

    fn emit_encode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    ) {
        if let TypeShape::List(element) = shape {
            encode_sequence(registry, ctx, element, access);
        }
    }

    fn emit_decode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String {
        match shape {
            TypeShape::List(element) => decode_sequence(registry, ctx, element),
            _ => "Vec::new()".to_string(),
        }
    }
}

/// `HashMap<K, V>`.
#[derive(Debug, Clone, Copy)]
pub struct MapHandler;

impl TypeHandler for MapHandler {
    fn name(&self) -> &'static str {
        "map"
    }

    fn handles(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Map(..))
    }

    fn emit_encode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    ) {
        let TypeShape::Map(key, value) = shape else {
            return;
        };
        ctx.line(format!("writer.write_len({}.len());", access.path()));
        let key_name = ctx.fresh("key");
        let value_name = ctx.fresh("value");
        ctx.open(format!(
            "for ({key_name}, {value_name}) in {}.iter()",
            access.path()
        ));
        registry.emit_encode(ctx, key, &Access::Ref(key_name));
        registry.emit_encode(ctx, value, &Access::Ref(value_name));
        ctx.close("}");
    }

    fn emit_decode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String {
        let TypeShape::Map(key, value) = shape else {
            return "HashMap::new()".to_string();
        };
        ctx.require_import("std::collections::HashMap");
        let count = ctx.fresh("count");
        let map = ctx.fresh("map");
        ctx.line(format!("let {count} = reader.read_len()?;"));
        ctx.line(format!(
            "let mut {map} = HashMap::with_capacity(reader.capacity_hint({count}));"
        ));
        ctx.open(format!("for _ in 0..{count}"));
        let key_name = ctx.fresh("key");
        let key_expr = registry.emit_decode(ctx, key);
        ctx.line(format!("let {key_name} = {key_expr};"));
        let value_name = ctx.fresh("value");
        let value_expr = registry.emit_decode(ctx, value);
        ctx.line(format!("let {value_name} = {value_expr};"));
        ctx.line(format!("{map}.insert({key_name}, {value_name});"));
        ctx.close("}");
        map
    }
}

/// `Option<T>`: presence flag, then the value.
#[derive(Debug, Clone, Copy)]
pub struct OptionalHandler;

impl TypeHandler for OptionalHandler {
    fn name(&self) -> &'static str {
        "optional"
    }

    fn handles(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Optional(_))
    }

    fn emit_encode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    ) {
        let TypeShape::Optional(inner) = shape else {
            return;
        };
        let name = ctx.fresh("inner");
        ctx.open(format!("match {}", access.reference()));
        ctx.open(format!("Some({name}) =>"));
        ctx.line("writer.write_bool(true);");
        registry.emit_encode(ctx, inner, &Access::Ref(name));
        ctx.close("}");
        ctx.line("None => writer.write_bool(false),");
        ctx.close("}");
    }

    fn emit_decode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String {
        let TypeShape::Optional(inner) = shape else {
            return "None".to_string();
        };
        let optional = ctx.fresh("optional");
        ctx.open(format!("let {optional} = if reader.read_bool()?"));
        let value = registry.emit_decode(ctx, inner);
        ctx.line(format!("Some({value})"));
        ctx.close("} else {");
        ctx.indent_block("None");
        ctx.line("};");
        optional
    }
}

/// Declared types: fields inlined, or the type's own `NetCodec` when it is
/// hand-written.
#[derive(Debug, Clone, Copy)]
pub struct ComplexHandler;

impl TypeHandler for ComplexHandler {
    fn name(&self) -> &'static str {
        "complex"
    }

    fn handles(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Complex(_))
    }

    fn emit_encode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
        access: &Access,
    ) {
        let TypeShape::Complex(fqn) = shape else {
            return;
        };
        let Some(target) = ctx.schema().find(fqn) else {
            ctx.line(format!("compile_error!(\"unknown type `{fqn}`\");"));
            return;
        };

        if target.manual_codec {
            ctx.line(format!("NetCodec::encode({}, writer);", access.reference()));
            return;
        }
        for field in target.serializable() {
            ctx.line(format!("// {}.{}: {}", target.name, field.name, field.shape));
            registry.emit_encode(ctx, &field.shape, &access.field(&field.name));
        }
    }

    fn emit_decode(
        &self,
        registry: &TypeHandlerRegistry,
        ctx: &mut GenerationContext<'_>,
        shape: &TypeShape,
    ) -> String {
        let TypeShape::Complex(fqn) = shape else {
            return "Default::default()".to_string();
        };
        let Some(target) = ctx.schema().find(fqn) else {
            return format!("compile_error!(\"unknown type `{fqn}`\")");
        };

        let path = ctx.type_path(fqn);
        let nested = ctx.fresh("nested");
        if target.manual_codec {
            ctx.line(format!("let mut {nested} = {path}::default();"));
            ctx.line(format!("NetCodec::decode(&mut {nested}, reader)?;"));
            return nested;
        }
        if target.is_empty() {
            ctx.line(format!("let {nested} = {path}::default();"));
            return nested;
        }

        ctx.line(format!("let mut {nested} = {path}::default();"));
        for field in target.serializable() {
            let value = registry.emit_decode(ctx, &field.shape);
            ctx.line(format!("{nested}.{} = {value};", field.name));
        }
        nested
    }
}
