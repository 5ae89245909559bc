//! # PacketForge Codegen
//!
//! Build-time schema compiler. A protocol crate calls it from `build.rs`:
//!
//! ```rust,ignore
//! fn main() {
//!     if let Err(err) = packetforge_codegen::build::compile_schema("schema/packets.toml", "protocol.rs") {
//!         panic!("packet schema failed to compile: {err}");
//!     }
//! }
//! ```
//!
//! and includes the result:
//!
//! ```rust,ignore
//! mod generated {
//!     include!(concat!(env!("OUT_DIR"), "/protocol.rs"));
//! }
//! pub use generated::*;
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! schema.toml ──► scan ──► SchemaModel ──► orchestrator ──► per-type source
//!                   │                          │
//!                   │                  handlers (encode/decode)
//!                   │                  equality (eq/hash)
//!                   │
//!                   └──────────────► registry ──► opcode tables + enums
//! ```
//!
//! Every stage reports through [`Diagnostics`]; any error diagnostic fails
//! the build.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod build;
pub mod context;
pub mod diagnostics;
pub mod equality;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod scan;
pub mod schema;
pub mod types;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{CodegenError, CodegenResult};
pub use generator::{generate, GenerateOptions, GenerationOutput};
pub use model::{PacketTypeModel, PropertyModel, RegistryModel, SchemaModel};
pub use registry::{assign_opcodes, OpcodeAssignment, OpcodeTable};
pub use scan::{scan_schema, ScanResult};
pub use types::{Primitive, TypeShape};
