//! Live script pad: a source buffer is split into top-level statements, imports
//! are resolved, and every statement is re-evaluated against an accumulating
//! context with one formatted result per source line.

pub mod ast;
pub mod blocks;
pub mod config;
pub mod console;
pub mod diagnostics;
pub mod environment;
pub mod execute;
pub mod imports;
pub mod lexer;
pub mod link;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod session;
pub mod statements;
pub mod stdlib;
pub mod text;
pub mod value;

pub use blocks::{BlockKind, ExecutionBlock, Import, ParseResult, parse, parse_with};
pub use config::{PadConfig, ReplOptions};
pub use console::{ConsoleIntercept, ConsoleListener, ConsoleMessage, MessageType, Transcript};
pub use diagnostics::{Diagnostic, DiagnosticKind, ReplError, SourceSpan};
pub use execute::{ExecutionResult, ExecutionState, execute, format_value};
pub use imports::{FsModuleLoader, ImportResults, MemoryModuleLoader, ModuleLoader, resolve_imports};
pub use repl::Repl;
pub use runtime::{EvalMode, ExecutionContext, Interpreter};
pub use session::{PassOutcome, PassReport, Row, Session};
pub use statements::{ScriptStatements, StatementKind, StatementProvider, TopLevelStatement};
pub use text::{LineSpan, Range};
