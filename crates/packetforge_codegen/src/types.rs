//! # Property Type Model
//!
//! Parses declared field types into a [`TypeShape`] tree.
//!
//! ```text
//! ty     := '[' ty ']'                      array  -> Box<[T]>
//!         | path ( '<' ty ( ',' ty )* '>' )?
//! path   := ident ( '::' ident )*
//! ```
//!
//! `Vec<T>`/`List<T>` are lists, `HashMap<K, V>`/`Map<K, V>` are maps,
//! `Option<T>` is an optional. Primitive names map to [`Primitive`]; every
//! other path names a declared complex type.

use std::fmt;

/// Built-in value types with a dedicated stream method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `bool`, one byte 0/1.
    Bool,
    /// `u8`.
    U8,
    /// `i8`.
    I8,
    /// `u16`.
    U16,
    /// `i16`.
    I16,
    /// `u32`.
    U32,
    /// `i32`.
    I32,
    /// `u64`.
    U64,
    /// `i64`.
    I64,
    /// `u128`.
    U128,
    /// `i128`.
    I128,
    /// `f32`.
    F32,
    /// `f64`.
    F64,
    /// `char`, as its scalar value.
    Char,
    /// Length-prefixed UTF-8 string.
    String,
    /// Length-prefixed binary blob (`Vec<u8>`).
    Bytes,
    /// 2D float vector.
    Vec2,
    /// 3D float vector.
    Vec3,
}

impl Primitive {
    /// Every primitive, in stream method order.
    pub const ALL: [Self; 18] = [
        Self::Bool,
        Self::U8,
        Self::I8,
        Self::U16,
        Self::I16,
        Self::U32,
        Self::I32,
        Self::U64,
        Self::I64,
        Self::U128,
        Self::I128,
        Self::F32,
        Self::F64,
        Self::Char,
        Self::String,
        Self::Bytes,
        Self::Vec2,
        Self::Vec3,
    ];

    /// Looks up a primitive by its schema name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.schema_name() == name)
    }

    /// Name used in schemas.
    #[must_use]
    pub const fn schema_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::U128 => "u128",
            Self::I128 => "i128",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::String => "String",
            Self::Bytes => "Bytes",
            Self::Vec2 => "Vec2",
            Self::Vec3 => "Vec3",
        }
    }

    /// Rust type emitted for the primitive.
    #[must_use]
    pub const fn rust_type(self) -> &'static str {
        match self {
            Self::Bytes => "Vec<u8>",
            other => other.schema_name(),
        }
    }

    /// Suffix of the `write_*`/`read_*` stream methods.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            other => other.schema_name(),
        }
    }

    /// Runtime import the type needs, if any.
    #[must_use]
    pub const fn runtime_import(self) -> Option<&'static str> {
        match self {
            Self::Vec2 => Some("Vec2"),
            Self::Vec3 => Some("Vec3"),
            _ => None,
        }
    }

    /// True when the writer takes the value by copy rather than by reference.
    #[must_use]
    pub const fn is_copy(self) -> bool {
        !matches!(self, Self::String | Self::Bytes)
    }

    /// True when the type can key a map (`Eq + Hash`).
    #[must_use]
    pub const fn is_hashable_key(self) -> bool {
        !matches!(self, Self::F32 | Self::F64 | Self::Vec2 | Self::Vec3)
    }
}

/// Parsed shape of a property type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// Built-in value.
    Primitive(Primitive),
    /// Fixed-size after construction, emitted as `Box<[T]>`.
    Array(Box<TypeShape>),
    /// Growable list, emitted as `Vec<T>`.
    List(Box<TypeShape>),
    /// Key/value map, emitted as `HashMap<K, V>`.
    Map(Box<TypeShape>, Box<TypeShape>),
    /// Optional value, emitted as `Option<T>`.
    Optional(Box<TypeShape>),
    /// Declared complex type; holds the name as written until resolved,
    /// then its fully-qualified display name.
    Complex(String),
}

impl TypeShape {
    /// Parses a declared type.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first syntax problem.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut parser = Parser {
            text,
            position: 0,
        };
        let shape = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.position < text.len() {
            return Err(format!(
                "unexpected `{}` at offset {}",
                &text[parser.position..],
                parser.position
            ));
        }
        Ok(shape)
    }

    /// True when equality/hash must walk the value element by element.
    #[must_use]
    pub fn needs_deep(&self) -> bool {
        match self {
            Self::Array(_) | Self::List(_) | Self::Map(..) => true,
            Self::Optional(inner) => inner.needs_deep(),
            Self::Primitive(_) | Self::Complex(_) => false,
        }
    }

    /// Calls `visit` for every complex type name in the tree.
    pub fn for_each_complex(&self, visit: &mut impl FnMut(&str)) {
        match self {
            Self::Primitive(_) => {}
            Self::Array(inner) | Self::List(inner) | Self::Optional(inner) => {
                inner.for_each_complex(visit);
            }
            Self::Map(key, value) => {
                key.for_each_complex(visit);
                value.for_each_complex(visit);
            }
            Self::Complex(name) => visit(name),
        }
    }

    /// Rewrites every complex name through `resolve`, collecting failures.
    pub fn resolve_complex(&mut self, resolve: &mut impl FnMut(&str) -> Option<String>) -> Vec<String> {
        let mut unresolved = Vec::new();
        self.resolve_into(resolve, &mut unresolved);
        unresolved
    }

    fn resolve_into(
        &mut self,
        resolve: &mut impl FnMut(&str) -> Option<String>,
        unresolved: &mut Vec<String>,
    ) {
        match self {
            Self::Primitive(_) => {}
            Self::Array(inner) | Self::List(inner) | Self::Optional(inner) => {
                inner.resolve_into(resolve, unresolved);
            }
            Self::Map(key, value) => {
                key.resolve_into(resolve, unresolved);
                value.resolve_into(resolve, unresolved);
            }
            Self::Complex(name) => match resolve(name) {
                Some(fqn) => *name = fqn,
                None => unresolved.push(name.clone()),
            },
        }
    }

    /// Map keys whose type cannot key a `HashMap`.
    #[must_use]
    pub fn invalid_map_keys(&self) -> Vec<&TypeShape> {
        let mut invalid = Vec::new();
        self.collect_invalid_keys(&mut invalid);
        invalid
    }

    fn collect_invalid_keys<'a>(&'a self, invalid: &mut Vec<&'a TypeShape>) {
        match self {
            Self::Primitive(_) | Self::Complex(_) => {}
            Self::Array(inner) | Self::List(inner) | Self::Optional(inner) => {
                inner.collect_invalid_keys(invalid);
            }
            Self::Map(key, value) => {
                if !matches!(key.as_ref(), Self::Primitive(p) if p.is_hashable_key()) {
                    invalid.push(key);
                }
                key.collect_invalid_keys(invalid);
                value.collect_invalid_keys(invalid);
            }
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.write_str(p.schema_name()),
            Self::Array(inner) => write!(f, "[{inner}]"),
            Self::List(inner) => write!(f, "Vec<{inner}>"),
            Self::Map(key, value) => write!(f, "HashMap<{key}, {value}>"),
            Self::Optional(inner) => write!(f, "Option<{inner}>"),
            Self::Complex(name) => f.write_str(name),
        }
    }
}

/// Path from `from_module` to the type `fqn`, both relative to the root of
/// the generated file. Modules are one level deep.
#[must_use]
pub fn relative_path(from_module: &str, fqn: &str) -> String {
    let (module, name) = fqn.rsplit_once("::").unwrap_or(("", fqn));
    match (from_module.is_empty(), module == from_module) {
        (_, true) => name.to_string(),
        (true, false) => fqn.to_string(),
        (false, false) => format!("super::{fqn}"),
    }
}

struct Parser<'a> {
    text: &'a str,
    position: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        let rest = &self.text[self.position..];
        self.position += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.text[self.position..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(match self.peek() {
                Some(found) => format!("expected `{expected}`, found `{found}`"),
                None => format!("expected `{expected}`, found end of type"),
            })
        }
    }

    fn parse_ident(&mut self) -> Result<&str, String> {
        self.skip_whitespace();
        let start = self.position;
        let rest = &self.text[start..];
        let mut end = 0;
        for (index, c) in rest.char_indices() {
            let valid = if index == 0 {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || c == '_'
            };
            if !valid {
                break;
            }
            end = index + c.len_utf8();
        }
        if end == 0 {
            return Err(match rest.chars().next() {
                Some(found) => format!("expected a type name, found `{found}`"),
                None => "expected a type name, found end of type".to_string(),
            });
        }
        self.position += end;
        Ok(&self.text[start..start + end])
    }

    fn parse_path(&mut self) -> Result<String, String> {
        let mut path = self.parse_ident()?.to_string();
        while self.text[self.position..].starts_with("::") {
            self.position += 2;
            path.push_str("::");
            path.push_str(self.parse_ident()?);
        }
        Ok(path)
    }

    fn parse_arguments(&mut self) -> Result<Vec<TypeShape>, String> {
        let mut arguments = Vec::new();
        if !self.eat('<') {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_type()?);
            if self.eat('>') {
                return Ok(arguments);
            }
            self.expect(',')?;
        }
    }

    fn parse_type(&mut self) -> Result<TypeShape, String> {
        if self.eat('[') {
            let inner = self.parse_type()?;
            self.expect(']')?;
            return Ok(TypeShape::Array(Box::new(inner)));
        }

        let path = self.parse_path()?;
        let mut arguments = self.parse_arguments()?;
        let arity = |expected: usize, arguments: &[TypeShape]| {
            if arguments.len() == expected {
                Ok(())
            } else {
                Err(format!(
                    "`{path}` takes {expected} type argument(s), found {}",
                    arguments.len()
                ))
            }
        };

        match path.as_str() {
            "Vec" | "List" => {
                arity(1, &arguments)?;
                Ok(TypeShape::List(Box::new(arguments.remove(0))))
            }
            "Option" => {
                arity(1, &arguments)?;
                Ok(TypeShape::Optional(Box::new(arguments.remove(0))))
            }
            "HashMap" | "Map" => {
                arity(2, &arguments)?;
                let value = arguments.remove(1);
                let key = arguments.remove(0);
                Ok(TypeShape::Map(Box::new(key), Box::new(value)))
            }
            name => {
                arity(0, &arguments)?;
                Ok(Primitive::from_name(name)
                    .map_or_else(|| TypeShape::Complex(path.clone()), TypeShape::Primitive))
            }
        }
    }
}
