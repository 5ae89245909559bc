//! # Diagnostics
//!
//! Compiler-style messages with a severity, a stable code and a subject
//! (`Type` or `Type.field`).
//!
//! | Code   | Severity | Meaning                                  |
//! |--------|----------|------------------------------------------|
//! | PF0002 | error    | unknown opcode width in registry marker  |
//! | PF0003 | error    | packet types declared without registry   |
//! | PF0004 | warning  | registry marker without packet types     |
//! | PF0010 | error    | invalid type name                        |
//! | PF0011 | error    | invalid module name                      |
//! | PF0012 | error    | unknown base                             |
//! | PF0013 | error    | duplicate type                           |
//! | PF0014 | error    | duplicate packet name in one direction   |
//! | PF0015 | error    | type name reserved by the generator      |
//! | PF0020 | error    | invalid field name                       |
//! | PF0021 | error    | duplicate field                          |
//! | PF0022 | error    | malformed field type                     |
//! | PF0023 | error    | unknown field type                       |
//! | PF0024 | error    | map key type is not hashable             |
//! | PF0025 | error    | recursive type                           |
//! | PF0040 | info     | type has no serializable properties      |
//! | PF0041 | warning  | manual codec on a complex type           |
//! | PF0100 | error    | opcode space overflow                    |

use std::fmt;

/// Severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, never fails the build.
    Info,
    /// Suspicious but valid.
    Warning,
    /// Fails the build.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// One compiler message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Stable code, e.g. `PF0022`.
    pub code: &'static str,
    /// What the message is about (`Type`, `Type.field` or `registry`).
    pub subject: String,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.code, self.subject, self.message
        )
    }
}

/// Ordered collection of diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a diagnostic.
    pub fn push(
        &mut self,
        severity: Severity,
        code: &'static str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            severity,
            code,
            subject: subject.into(),
            message: message.into(),
        });
    }

    /// Adds an error.
    pub fn error(&mut self, code: &'static str, subject: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, code, subject, message);
    }

    /// Adds a warning.
    pub fn warning(&mut self, code: &'static str, subject: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, code, subject, message);
    }

    /// Adds an informational message.
    pub fn info(&mut self, code: &'static str, subject: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Info, code, subject, message);
    }

    /// Appends every diagnostic of `other`.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Returns true if any error was reported.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// Number of error diagnostics.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// First error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.entries.iter().find(|d| d.severity == Severity::Error)
    }

    /// Returns true if a diagnostic with `code` was reported.
    #[must_use]
    pub fn contains_code(&self, code: &str) -> bool {
        self.entries.iter().any(|d| d.code == code)
    }

    /// Iterates in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
