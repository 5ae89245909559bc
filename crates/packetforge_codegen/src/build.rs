//! # Build Script Helper
//!
//! Glue between a `build.rs` and [`generate`]: reads the schema, reports
//! diagnostics the way Cargo shows them and writes the source into
//! `OUT_DIR`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::Severity;
use crate::error::{CodegenError, CodegenResult};
use crate::generator::{generate, GenerateOptions, GenerationOutput};

/// Compiles `schema_path` into `$OUT_DIR/<out_file>`.
///
/// Prints `cargo:rerun-if-changed` for the schema and one `cargo:warning`
/// line per warning or error.
///
/// # Errors
///
/// Returns [`CodegenError::Diagnostics`] when the schema has errors, so the
/// build fails; I/O and schema syntax errors are returned as they are.
pub fn compile_schema(schema_path: impl AsRef<Path>, out_file: &str) -> CodegenResult<PathBuf> {
    let schema_path = schema_path.as_ref();
    println!("cargo:rerun-if-changed={}", schema_path.display());

    let out_dir = env::var_os("OUT_DIR").ok_or(CodegenError::MissingOutDir)?;
    let source = fs::read_to_string(schema_path)?;
    let options = GenerateOptions {
        source_name: schema_path
            .file_name()
            .map_or_else(|| schema_path.display().to_string(), |name| name.to_string_lossy().into_owned()),
        ..GenerateOptions::default()
    };

    let output = generate(&source, &options)?;
    report(&output);
    check(&output)?;

    let target = Path::new(&out_dir).join(out_file);
    write_if_changed(&target, &output.code)?;
    Ok(target)
}

/// Prints diagnostics as Cargo build-script messages.
pub fn report(output: &GenerationOutput) {
    for diagnostic in output.diagnostics.iter() {
        match diagnostic.severity {
            Severity::Error | Severity::Warning => println!("cargo:warning={diagnostic}"),
            Severity::Info => tracing::debug!(%diagnostic, "schema note"),
        }
    }
}

/// Converts error diagnostics into a failure.
///
/// # Errors
///
/// Returns [`CodegenError::Diagnostics`] when any error was reported.
pub fn check(output: &GenerationOutput) -> CodegenResult<()> {
    match output.diagnostics.first_error() {
        Some(first) => Err(CodegenError::Diagnostics {
            errors: output.diagnostics.error_count(),
            first: first.to_string(),
        }),
        None => Ok(()),
    }
}

/// Writes `contents` unless the file already holds them, keeping the
/// timestamp stable for unchanged schemas.
fn write_if_changed(path: &Path, contents: &str) -> CodegenResult<()> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
        return Ok(());
    }
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_reports_first_error() {
        let output = generate(
            r#"
            [registry]
            name = "Demo"

            [[types]]
            name = "CPacketJoin"
            base = "ClientPacket"
            fields = [
                { name = "a", type = "Vec<" },
                { name = "b", type = "Nope" },
            ]
            "#,
            &GenerateOptions::default(),
        )
        .unwrap();

        match check(&output) {
            Err(CodegenError::Diagnostics { errors, first }) => {
                assert_eq!(errors, 2);
                assert!(first.starts_with("error[PF0022] CPacketJoin.a:"));
            }
            other => panic!("expected diagnostics error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_if_changed() {
        let path = env::temp_dir().join(format!("packetforge_codegen_{}.rs", std::process::id()));
        write_if_changed(&path, "a").unwrap();
        write_if_changed(&path, "a").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a");
        write_if_changed(&path, "b").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b");
        let _ = fs::remove_file(path);
    }
}
