//! Evaluation of one block against a pass's context, and result formatting.

use serde::Serialize;

use crate::{
    blocks::ExecutionBlock,
    config::ReplOptions,
    diagnostics::{ReplError, Result},
    runtime::{EvalMode, ExecutionContext, Interpreter, await_value},
    stdlib::json_text,
    value::{Value, ValueKind, number_to_string},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExecutionState {
    #[default]
    #[serde(rename = "")]
    Normal,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "info")]
    Info,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Normal => "",
            ExecutionState::Error => "error",
            ExecutionState::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub msg: String,
    pub state: ExecutionState,
    pub keep: bool,
    pub details: String,
}

impl ExecutionResult {
    /// Filler for a source line with no result of its own.
    pub fn blank() -> Self {
        Self {
            msg: String::new(),
            state: ExecutionState::Normal,
            keep: true,
            details: String::new(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self {
            details: msg.clone(),
            msg,
            state: ExecutionState::Info,
            keep: true,
        }
    }

    pub fn error(msg: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            state: ExecutionState::Error,
            keep: false,
            details: details.into(),
        }
    }

    /// Result row for a failed evaluation. Error-family values show their
    /// message; anything else thrown shows its string form.
    pub fn failure(err: ReplError) -> Self {
        let value = err.into_value();
        let details = value.to_string();
        match value.error_message() {
            Some(message) => Self::error(message, details),
            None => Self::error(details.clone(), details),
        }
    }

    pub fn is_error(&self) -> bool {
        self.state == ExecutionState::Error
    }
}

/// Display message, detail text and state for a resolved value.
pub fn format_value(value: &Value) -> Result<(String, String, ExecutionState)> {
    let formatted = match &*value.0 {
        ValueKind::Undefined => (
            "undefined".to_string(),
            "undefined".to_string(),
            ExecutionState::Info,
        ),
        ValueKind::Null => ("null".to_string(), "null".to_string(), ExecutionState::Info),
        ValueKind::Number(n) => {
            let text = number_to_string(*n);
            (text.clone(), text, ExecutionState::Normal)
        }
        ValueKind::String(text) => (
            format!("\"{}\"", text.replace('\n', "\\n")),
            text.clone(),
            ExecutionState::Normal,
        ),
        ValueKind::Function(_) | ValueKind::NativeFunction(_) => {
            ("fn()".to_string(), value.to_string(), ExecutionState::Info)
        }
        ValueKind::Array(_)
        | ValueKind::Object(_)
        | ValueKind::Module(_)
        | ValueKind::Promise(_)
        | ValueKind::Error(_) => {
            let json = json_text(value, 0)?.unwrap_or_else(|| "undefined".to_string());
            (json, value.to_string(), ExecutionState::Normal)
        }
        ValueKind::Bool(_) => {
            let text = value.to_string();
            (
                format!("{text} [{}]", value.type_of()),
                text,
                ExecutionState::Normal,
            )
        }
    };
    Ok(formatted)
}

/// Evaluates `prepend + block.statement` against `context`. Never fails:
/// evaluation errors come back as an error-state result.
pub async fn execute(
    block: &ExecutionBlock,
    context: &ExecutionContext,
    prepend: &str,
    opts: &ReplOptions,
) -> ExecutionResult {
    let code = format!("{prepend}{}", block.statement);
    let mode = if opts.wrap_async {
        EvalMode::Async
    } else {
        EvalMode::Sync
    };
    tracing::trace!(%code, ?mode, "evaluating block");

    let mut interpreter = Interpreter::with_context(context.clone());
    let evaluated = interpreter.eval_source(&code, mode);
    tokio::task::yield_now().await;

    let outcome = evaluated
        .and_then(|value| await_value(&value))
        .and_then(|value| format_value(&value).map(|formatted| (value, formatted)));

    match outcome {
        Ok((value, (msg, details, state))) => ExecutionResult {
            msg,
            state,
            keep: !(value.is_undefined() && !opts.reeval_undef),
            details,
        },
        Err(err) => {
            tracing::debug!(error = %err, statement = %block.statement, "block failed");
            ExecutionResult::failure(err)
        }
    }
}
