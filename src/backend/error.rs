//! Error and diagnostic types for symbol operations.

use std::fmt;

/// Errors reported by fallible symbol-table operations.
///
/// Running out of memory is not an error here: creation under memory
/// pressure yields `None` and rule edits report "no change", with a
/// `tracing` warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// Write, assignment or removal on a Protected symbol
    Protected { symbol: String },
    /// A rule pattern rejected by the pattern matcher
    InvalidPattern { pattern: String },
    /// The owning table has been shut down or dropped
    TableClosed,
    /// Malformed table configuration
    Config(String),
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protected { symbol } => write!(f, "Symbol {} is Protected", symbol),
            Self::InvalidPattern { pattern } => write!(f, "Invalid pattern: {}", pattern),
            Self::TableClosed => write!(f, "Symbol table is closed"),
            Self::Config(msg) => write!(f, "Invalid symbol table configuration: {}", msg),
        }
    }
}

impl std::error::Error for SymbolError {}

impl From<toml::de::Error> for SymbolError {
    fn from(err: toml::de::Error) -> Self {
        SymbolError::Config(err.to_string())
    }
}

pub type SymbolResult<T> = Result<T, SymbolError>;

/// User-visible messages the table emits through the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// `General::wrsym`: attempted write to a Protected symbol
    WriteProtected,
    /// `General::rmptc`: attempted removal of a Protected symbol
    RemoveProtected,
}

impl DiagnosticKind {
    pub fn tag(self) -> &'static str {
        match self {
            DiagnosticKind::WriteProtected => "wrsym",
            DiagnosticKind::RemoveProtected => "rmptc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Qualified name of the offending symbol
    pub symbol: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, symbol: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::WriteProtected => {
                write!(f, "General::wrsym: Symbol {} is Protected.", self.symbol)
            }
            DiagnosticKind::RemoveProtected => write!(
                f,
                "General::rmptc: Symbol {} is Protected and cannot be removed.",
                self.symbol
            ),
        }
    }
}
