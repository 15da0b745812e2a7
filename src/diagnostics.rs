use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Represents a byte span within a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Reference,
    Type,
    Range,
    Runtime,
    Module,
}

impl DiagnosticKind {
    /// Name of the script error class a diagnostic surfaces as.
    pub fn error_name(self) -> &'static str {
        match self {
            DiagnosticKind::Lexer | DiagnosticKind::Parser => "SyntaxError",
            DiagnosticKind::Reference => "ReferenceError",
            DiagnosticKind::Type => "TypeError",
            DiagnosticKind::Range => "RangeError",
            DiagnosticKind::Runtime | DiagnosticKind::Module => "Error",
        }
    }
}

/// Rich diagnostic information surfaced to end users.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.error_name(), self.message)?;
        if let Some(span) = self.span {
            write!(f, " ({}..{})", span.start, span.end)?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            for note in &self.notes {
                writeln!(f, "  note: {note}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the pad.
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("Uncaught {0}")]
    Thrown(Value),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReplError {
    pub fn runtime(kind: DiagnosticKind, message: impl Into<String>, span: SourceSpan) -> Self {
        ReplError::Diagnostic(Diagnostic::new(kind, message).with_span(span))
    }

    /// Short message without the error class or span, as shown in a result row.
    pub fn message(&self) -> String {
        match self {
            ReplError::Diagnostic(diag) => diag.message.clone(),
            ReplError::Thrown(value) => value
                .error_message()
                .unwrap_or_else(|| value.to_string()),
            ReplError::Io(err) => err.to_string(),
            ReplError::Config(msg) => msg.clone(),
        }
    }

    /// The script-visible value of this error, as seen by `catch` or a rejected promise.
    pub fn into_value(self) -> Value {
        match self {
            ReplError::Thrown(value) => value,
            ReplError::Diagnostic(diag) => Value::error(diag.kind.error_name(), diag.message),
            ReplError::Io(err) => Value::error("Error", err.to_string()),
            ReplError::Config(msg) => Value::error("Error", msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReplError>;
