//! Top-level statement boundaries and their syntactic classification.
//!
//! The block builder only talks to a [`StatementProvider`]; [`ScriptStatements`]
//! backs it with the pad script parser.

use crate::{
    ast::{Expr, ExprKind, ForInit, ImportClause, PropertyKey, Stmt, StmtKind, TemplatePart},
    parser::{TopLevel, parse_top_level},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelStatement {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub kind: StatementKind,
    /// An `await` appears outside any nested function body.
    pub awaits: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Variable { names: Vec<String> },
    Expression,
    Function { is_async: bool },
    ForOf { is_await: bool },
    Import(ImportForm),
    Invalid { message: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportForm {
    /// `import { a, b as c } from m`; pairs of (local name, exported name).
    Named {
        module: String,
        bindings: Vec<(String, String)>,
    },
    /// `import * as ns from m`
    Namespace { module: String, name: String },
    /// Default-only and side-effect imports.
    Unsupported { module: String, form: &'static str },
}

pub trait StatementProvider {
    /// Every top-level statement of `source`, in order.
    fn statements(&self, source: &str) -> Vec<TopLevelStatement>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptStatements;

impl StatementProvider for ScriptStatements {
    fn statements(&self, source: &str) -> Vec<TopLevelStatement> {
        parse_top_level(source)
            .into_iter()
            .map(|item| {
                let span = item.span();
                let text = source[span.start..span.end].to_string();
                let (kind, awaits) = match item {
                    TopLevel::Parsed(stmt) => (classify(&stmt), stmt_awaits(&stmt)),
                    TopLevel::Invalid { diagnostic, .. } => (
                        StatementKind::Invalid {
                            message: diagnostic.message,
                        },
                        false,
                    ),
                };
                TopLevelStatement {
                    text,
                    start: span.start,
                    end: span.end,
                    kind,
                    awaits,
                }
            })
            .collect()
    }
}

fn classify(stmt: &Stmt) -> StatementKind {
    match &stmt.kind {
        StmtKind::VarDecl { .. } => StatementKind::Variable {
            names: stmt.declared_names(),
        },
        StmtKind::Expr(_) => StatementKind::Expression,
        StmtKind::Function(def) => StatementKind::Function {
            is_async: def.is_async,
        },
        StmtKind::ForOf { is_await, .. } => StatementKind::ForOf {
            is_await: *is_await,
        },
        StmtKind::Import(decl) => {
            let module = decl.source_text.clone();
            StatementKind::Import(match &decl.clause {
                ImportClause::Named { specifiers, .. } => ImportForm::Named {
                    module,
                    bindings: specifiers
                        .iter()
                        .map(|spec| (spec.local.clone(), spec.imported.clone()))
                        .collect(),
                },
                ImportClause::Namespace(name) => ImportForm::Namespace {
                    module,
                    name: name.clone(),
                },
                ImportClause::Default(_) => ImportForm::Unsupported {
                    module,
                    form: "default import",
                },
                ImportClause::SideEffect => ImportForm::Unsupported {
                    module,
                    form: "side-effect import",
                },
            })
        }
        _ => StatementKind::Other,
    }
}

fn stmts_await(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_awaits)
}

fn stmt_awaits(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::VarDecl { declarations, .. } => declarations
            .iter()
            .any(|decl| decl.init.as_ref().is_some_and(expr_awaits)),
        StmtKind::Function(_) | StmtKind::Import(_) | StmtKind::Break | StmtKind::Continue
        | StmtKind::Empty => false,
        StmtKind::Expr(expr) | StmtKind::Throw(expr) | StmtKind::ExportDefault(expr) => {
            expr_awaits(expr)
        }
        StmtKind::Return(expr) => expr.as_ref().is_some_and(expr_awaits),
        StmtKind::Block(items) => stmts_await(items),
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            expr_awaits(condition)
                || stmt_awaits(then_branch)
                || else_branch.as_deref().is_some_and(stmt_awaits)
        }
        StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
            expr_awaits(condition) || stmt_awaits(body)
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            let init = match init {
                Some(ForInit::Decl { declarations, .. }) => declarations
                    .iter()
                    .any(|decl| decl.init.as_ref().is_some_and(expr_awaits)),
                Some(ForInit::Expr(expr)) => expr_awaits(expr),
                None => false,
            };
            init || condition.as_ref().is_some_and(expr_awaits)
                || update.as_ref().is_some_and(expr_awaits)
                || stmt_awaits(body)
        }
        StmtKind::ForOf {
            iterable,
            body,
            is_await,
            ..
        } => *is_await || expr_awaits(iterable) || stmt_awaits(body),
        StmtKind::ForIn { object, body, .. } => expr_awaits(object) || stmt_awaits(body),
        StmtKind::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            stmts_await(block)
                || handler.as_deref().is_some_and(stmts_await)
                || finalizer.as_deref().is_some_and(stmts_await)
        }
        StmtKind::Export(inner) => stmt_awaits(inner),
    }
}

fn expr_awaits(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Await(_) => true,
        // Nested function bodies get their own async context.
        ExprKind::Function(_) | ExprKind::Literal(_) | ExprKind::Variable(_) => false,
        ExprKind::Template(parts) => parts.iter().any(|part| match part {
            TemplatePart::Expr(expr) => expr_awaits(expr),
            TemplatePart::Text(_) => false,
        }),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            expr_awaits(left) || expr_awaits(right)
        }
        ExprKind::Unary { expr, .. } | ExprKind::Group(expr) => expr_awaits(expr),
        ExprKind::Update { target, .. } | ExprKind::Field { target, .. } => expr_awaits(target),
        ExprKind::Assign { target, value, .. } => expr_awaits(target) || expr_awaits(value),
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => expr_awaits(test) || expr_awaits(consequent) || expr_awaits(alternate),
        ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
            expr_awaits(callee) || args.iter().any(expr_awaits)
        }
        ExprKind::ArrayLiteral(items) => items.iter().any(expr_awaits),
        ExprKind::ObjectLiteral(entries) => entries.iter().any(|(key, value)| {
            matches!(key, PropertyKey::Computed(expr) if expr_awaits(expr)) || expr_awaits(value)
        }),
        ExprKind::Index { target, index } => expr_awaits(target) || expr_awaits(index),
    }
}

