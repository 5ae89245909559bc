//! # Equality and Hash Emitters
//!
//! One [`EqualityFragment`] and one [`HashFragment`] per serializable
//! property. Scalars, strings, vectors and declared types compare with `!=`
//! and hash through `NetHash`; arrays, lists, maps (and optionals holding
//! them) are deep and get a helper function on the type:
//!
//! ```text
//! fn deep_eq_scores(left: &Vec<Box<[u16]>>, right: &Vec<Box<[u16]>>) -> bool
//! fn deep_hash_scores(value: &Vec<Box<[u16]>>) -> i32
//! ```
//!
//! Helpers are written into the property's [`GenerationContext`]; a type
//! without deep properties gets none.

use crate::context::GenerationContext;
use crate::model::PropertyModel;
use crate::types::TypeShape;

/// Equality test of one property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EqualityFragment {
    /// Comment naming the property and its type.
    pub comment: String,
    /// Boolean expression that is true when `self` and `other` differ.
    pub mismatch: String,
    /// True when a deep helper was emitted.
    pub deep: bool,
}

/// Hash contribution of one property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashFragment {
    /// Comment naming the property and its type.
    pub comment: String,
    /// `i32` expression hashing the property of `self`.
    pub expression: String,
    /// True when a deep helper was emitted.
    pub deep: bool,
}

/// Builds the equality fragment of `property`, emitting its helper if deep.
pub fn equality_fragment(ctx: &mut GenerationContext<'_>, property: &PropertyModel) -> EqualityFragment {
    let name = &property.name;
    let comment = format!("// {name}: {}", property.shape);
    if !property.shape.needs_deep() {
        return EqualityFragment {
            comment,
            mismatch: format!("self.{name} != other.{name}"),
            deep: false,
        };
    }

    let ty = ctx.rust_type(&property.shape);
    let body = eq_expr(ctx, &property.shape, "left", "right");
    ctx.line(format!("/// Element-wise equality of `{name}`."));
    ctx.open(format!(
        "fn deep_eq_{name}(left: &{ty}, right: &{ty}) -> bool"
    ));
    ctx.line(body);
    ctx.close("}");

    EqualityFragment {
        comment,
        mismatch: format!("!Self::deep_eq_{name}(&self.{name}, &other.{name})"),
        deep: true,
    }
}

/// Builds the hash fragment of `property`, emitting its helper if deep.
pub fn hash_fragment(ctx: &mut GenerationContext<'_>, property: &PropertyModel) -> HashFragment {
    let name = &property.name;
    let comment = format!("// {name}: {}", property.shape);
    if !property.shape.needs_deep() {
        return HashFragment {
            comment,
            expression: format!("self.{name}.net_hash()"),
            deep: false,
        };
    }

    let ty = ctx.rust_type(&property.shape);
    let body = hash_expr(ctx, &property.shape, "value");
    ctx.line(format!("/// Element-wise hash of `{name}`."));
    ctx.open(format!("fn deep_hash_{name}(value: &{ty}) -> i32"));
    ctx.line(body);
    ctx.close("}");

    HashFragment {
        comment,
        expression: format!("Self::deep_hash_{name}(&self.{name})"),
        deep: true,
    }
}

/// Boolean expression comparing two references of `shape`.
fn eq_expr(ctx: &mut GenerationContext<'_>, shape: &TypeShape, left: &str, right: &str) -> String {
    if !shape.needs_deep() {
        return format!("{left} == {right}");
    }
    match shape {
        TypeShape::Array(element) | TypeShape::List(element) => {
            let a = ctx.fresh("a");
            let b = ctx.fresh("b");
            let inner = eq_expr(ctx, element, &a, &b);
            format!(
                "{left}.len() == {right}.len() && {left}.iter().zip({right}.iter()).all(|({a}, {b})| {inner})"
            )
        }
        TypeShape::Map(_, value) => {
            let key = ctx.fresh("k");
            let a = ctx.fresh("a");
            let b = ctx.fresh("b");
            let inner = eq_expr(ctx, value, &a, &b);
            format!(
                "{left}.len() == {right}.len() && {left}.iter().all(|({key}, {a})| {right}.get({key}).is_some_and(|{b}| {inner}))"
            )
        }
        TypeShape::Optional(inner_shape) => {
            let a = ctx.fresh("a");
            let b = ctx.fresh("b");
            let inner = eq_expr(ctx, inner_shape, &a, &b);
            format!(
                "match ({left}, {right}) {{ (Some({a}), Some({b})) => {inner}, (None, None) => true, _ => false }}"
            )
        }
        TypeShape::Primitive(_) | TypeShape::Complex(_) => format!("{left} == {right}"),
    }
}

/// `i32` expression hashing a reference of `shape`.
fn hash_expr(ctx: &mut GenerationContext<'_>, shape: &TypeShape, value: &str) -> String {
    if !shape.needs_deep() {
        return format!("{value}.net_hash()");
    }
    match shape {
        TypeShape::Array(element) | TypeShape::List(element) => {
            let hash = ctx.fresh("hash");
            let a = ctx.fresh("a");
            let inner = hash_expr(ctx, element, &a);
            format!("{value}.iter().fold(0i32, |{hash}, {a}| combine_hash({hash}, {inner}))")
        }
        TypeShape::Map(key_shape, value_shape) => {
            let hash = ctx.fresh("hash");
            let key = ctx.fresh("k");
            let a = ctx.fresh("a");
            let key_hash = hash_expr(ctx, key_shape, &key);
            let inner = hash_expr(ctx, value_shape, &a);
            format!(
                "{value}.iter().fold(0i32, |{hash}, ({key}, {a})| {hash}.wrapping_add(combine_hash({key_hash}, {inner})))"
            )
        }
        TypeShape::Optional(inner_shape) => {
            let a = ctx.fresh("a");
            let inner = hash_expr(ctx, inner_shape, &a);
            format!("{value}.as_ref().map_or(0, |{a}| {inner})")
        }
        TypeShape::Primitive(_) | TypeShape::Complex(_) => format!("{value}.net_hash()"),
    }
}
