//! # Codegen Error Types

use thiserror::Error;

/// Fatal schema compiler errors.
///
/// Problems inside a well-formed schema are [`crate::Diagnostic`]s instead;
/// this type covers what stops the compiler from producing diagnostics at all.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// The schema is not valid TOML or does not match the schema layout.
    #[error("invalid schema: {0}")]
    Schema(#[from] toml::de::Error),

    /// Reading the schema or writing the output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// `OUT_DIR` is not set; not running inside a build script.
    #[error("OUT_DIR is not set; compile_schema must run from a build script")]
    MissingOutDir,

    /// The schema produced error diagnostics.
    #[error("{errors} schema error(s), first: {first}")]
    Diagnostics {
        /// Number of error diagnostics.
        errors: usize,
        /// Rendering of the first error.
        first: String,
    },
}

/// Result type for the schema compiler.
pub type CodegenResult<T> = Result<T, CodegenError>;
