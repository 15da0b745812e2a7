//! Runs full passes over a pad buffer and aligns results with source lines.

use std::{
    cell::{Cell, RefCell},
    fmt::Write as _,
    rc::Rc,
};

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    blocks::{BlockKind, ExecutionBlock, parse},
    config::ReplOptions,
    console::{ConsoleIntercept, ConsoleMessage, Transcript},
    execute::{ExecutionResult, ExecutionState, execute},
    imports::{MemoryModuleLoader, ModuleLoader, resolve_imports},
    link,
    runtime::ExecutionContext,
    text::split_ranges,
};

/// One output row, aligned with one source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub line: usize,
    pub source: String,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub epoch: u64,
    pub options: ReplOptions,
    pub blocks: Vec<ExecutionBlock>,
    /// One result per block, in block order.
    pub results: Vec<ExecutionResult>,
    pub rows: Vec<Row>,
    pub console: Vec<ConsoleMessage>,
    pub link: String,
}

impl PassReport {
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(ExecutionResult::is_error)
    }

    /// Two-column text rendering: source line, then its result.
    pub fn render_table(&self, column_width: usize) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let marker = match row.result.state {
                ExecutionState::Error => "! ",
                ExecutionState::Info | ExecutionState::Normal => "",
            };
            let _ = writeln!(
                out,
                "{:<column_width$} | {marker}{}",
                row.source, row.result.msg
            );
        }
        out
    }
}

#[derive(Debug, Clone)]
pub enum PassOutcome {
    Completed(PassReport),
    /// A newer pass started while this one was suspended; its results were dropped.
    Superseded { epoch: u64 },
}

pub struct Session {
    loader: Rc<dyn ModuleLoader>,
    options: ReplOptions,
    base_uri: String,
    console: Rc<ConsoleIntercept>,
    epoch: Cell<u64>,
    last: RefCell<Option<PassReport>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ReplOptions::default())
    }
}

impl Session {
    pub fn new(options: ReplOptions) -> Self {
        Self {
            loader: Rc::new(MemoryModuleLoader::new()),
            options,
            base_uri: "pad.html".to_string(),
            console: Rc::new(ConsoleIntercept::new()),
            epoch: Cell::new(0),
            last: RefCell::new(None),
        }
    }

    pub fn with_loader(mut self, loader: Rc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    pub fn options(&self) -> &ReplOptions {
        &self.options
    }

    /// Receives the console output of every pass; module loaders may route
    /// their own output here.
    pub fn console(&self) -> Rc<ConsoleIntercept> {
        Rc::clone(&self.console)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// Report of the most recent pass that ran to completion.
    pub fn last_report(&self) -> Option<PassReport> {
        self.last.borrow().clone()
    }

    pub fn link(&self, source: &str) -> String {
        link::encode(source, &self.base_uri)
    }

    /// Parses `source`, resolves its imports and evaluates every block in
    /// order against a fresh context.
    pub async fn run_pass(&self, source: &str) -> PassOutcome {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);

        let mut options = self.options;
        let parsed = parse(source, &options);
        options.wrap_async = parsed.blocks.iter().any(|block| block.wrap_async);
        tracing::debug!(epoch, blocks = parsed.blocks.len(), wrap_async = options.wrap_async, "starting pass");

        // Each pass records its own console output so an overlapping pass
        // cannot pick it up.
        let transcript = Transcript::new();
        let console = Rc::new(ConsoleIntercept::new());
        console.add_listener(transcript.clone());
        console.add_listener(self.console());
        let context = ExecutionContext::new(console);
        let mut prepend = String::new();
        let mut results = Vec::with_capacity(parsed.blocks.len());

        for block in &parsed.blocks {
            let result = match block.kind {
                BlockKind::Import => {
                    let empty = IndexMap::new();
                    let imports = block.imports.as_ref().unwrap_or(&empty);
                    let resolved = resolve_imports(imports, self.loader.as_ref(), &context).await;
                    if resolved.errors.is_empty() {
                        ExecutionResult::info("(imported)")
                    } else {
                        ExecutionResult::error(resolved.errors.clone(), resolved.errors)
                    }
                }
                BlockKind::Skip => {
                    let message = block.diagnostic.clone().unwrap_or_default();
                    ExecutionResult::error(message.clone(), format!("SyntaxError: {message}"))
                }
                BlockKind::Run => {
                    let result = execute(block, &context, &prepend, &options).await;
                    if result.keep && block.cumulative {
                        prepend.push_str(&block.statement);
                        prepend.push(';');
                    }
                    result
                }
            };
            results.push(result);
        }

        if self.epoch.get() != epoch {
            tracing::debug!(epoch, current = self.epoch.get(), "discarding superseded pass");
            return PassOutcome::Superseded { epoch };
        }

        let rows = align_rows(source, &parsed.blocks, &results);
        let report = PassReport {
            epoch,
            options,
            blocks: parsed.blocks,
            results,
            rows,
            console: transcript.take(),
            link: self.link(source),
        };
        *self.last.borrow_mut() = Some(report.clone());
        PassOutcome::Completed(report)
    }
}

/// One row per source line; each block's result sits on its first line and
/// every other line gets a blank filler. When blocks share a first line the
/// last error wins, else the last result.
fn align_rows(source: &str, blocks: &[ExecutionBlock], results: &[ExecutionResult]) -> Vec<Row> {
    let mut rows: Vec<Row> = split_ranges(source, "\n")
        .into_iter()
        .map(|range| Row {
            line: range.index,
            source: range.text,
            result: ExecutionResult::blank(),
        })
        .collect();
    for (block, result) in blocks.iter().zip(results) {
        if let Some(row) = rows.get_mut(block.span.start) {
            if result.is_error() || !row.result.is_error() {
                row.result = result.clone();
            }
        }
    }
    rows
}
