//! Turns a source buffer into ordered execution blocks.

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    config::ReplOptions,
    statements::{ImportForm, ScriptStatements, StatementKind, StatementProvider},
    text::{LineSpan, line_span, split_ranges},
};

/// One binding introduced by an import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    /// Module specifier as written, quotes included.
    pub module: String,
    /// `false` for `import * as name`.
    pub named: bool,
    /// Name looked up in the module; differs from the binding name for `as` aliases.
    pub export_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Run,
    Import,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBlock {
    pub statement: String,
    pub span: LineSpan,
    pub cumulative: bool,
    pub wrap_async: bool,
    pub kind: BlockKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imports: Option<IndexMap<String, Import>>,
    /// Syntax error of a `Skip` block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ExecutionBlock {
    fn new(statement: String, span: LineSpan) -> Self {
        Self {
            statement,
            span,
            cumulative: true,
            wrap_async: false,
            kind: BlockKind::Run,
            imports: None,
            diagnostic: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub blocks: Vec<ExecutionBlock>,
}

pub fn parse(source: &str, opts: &ReplOptions) -> ParseResult {
    parse_with(&ScriptStatements, source, opts)
}

pub fn parse_with(
    provider: &dyn StatementProvider,
    source: &str,
    opts: &ReplOptions,
) -> ParseResult {
    let ranges = split_ranges(source, "\n");
    let mut blocks = Vec::new();

    for stmt in provider.statements(source) {
        let span = line_span(&ranges, stmt.start, stmt.end);
        let mut block = ExecutionBlock::new(stmt.text, span);
        block.wrap_async = stmt.awaits;

        match stmt.kind {
            StatementKind::Variable { names } => {
                for name in names {
                    block.statement.push(';');
                    block.statement.push_str(&name);
                }
            }
            StatementKind::Function { is_async } => {
                block.wrap_async |= is_async;
            }
            StatementKind::ForOf { is_await } => {
                block.wrap_async |= is_await;
            }
            StatementKind::Expression => {
                if !opts.reeval_console && block.statement.starts_with("console.") {
                    block.cumulative = false;
                }
            }
            StatementKind::Import(form) => {
                let mut imports = IndexMap::new();
                match form {
                    ImportForm::Named { module, bindings } => {
                        for (local, export_name) in bindings {
                            imports.insert(
                                local,
                                Import {
                                    module: module.clone(),
                                    named: true,
                                    export_name,
                                },
                            );
                        }
                    }
                    ImportForm::Namespace { module, name } => {
                        imports.insert(
                            name,
                            Import {
                                module,
                                named: false,
                                export_name: "*".to_string(),
                            },
                        );
                    }
                    ImportForm::Unsupported { module, form } => {
                        tracing::warn!(%module, form, statement = %block.statement, "skipping import");
                        continue;
                    }
                }
                block.kind = BlockKind::Import;
                block.imports = Some(imports);
            }
            StatementKind::Invalid { message } => {
                tracing::debug!(%message, statement = %block.statement, "statement did not parse");
                block.kind = BlockKind::Skip;
                block.cumulative = false;
                block.diagnostic = Some(message);
            }
            StatementKind::Other => {}
        }

        blocks.push(block);
    }

    ParseResult { blocks }
}
