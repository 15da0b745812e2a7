use std::rc::Rc;

use crate::diagnostics::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

impl DeclKind {
    pub fn is_lexical(self) -> bool {
        !matches!(self, DeclKind::Var)
    }
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

/// Shared by declarations, function expressions and arrows.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<FunctionBody>,
    pub is_async: bool,
    pub is_arrow: bool,
    /// Source text of the whole function, used when it is shown or stringified.
    pub text: Rc<str>,
}

#[derive(Debug, Clone)]
pub enum PropertyKey {
    Named(String),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Template(Vec<TemplatePart>),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Assign {
        /// `None` for plain `=`, otherwise the operator of a compound assignment.
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    ObjectLiteral(Vec<(PropertyKey, Expr)>),
    Group(Box<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        target: Box<Expr>,
        field: String,
    },
    Function(FunctionDef),
    Await(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Decl {
        kind: DeclKind,
        declarations: Vec<Declarator>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    /// Name exported by the module.
    pub imported: String,
    /// Name bound in the importing scope.
    pub local: String,
}

#[derive(Debug, Clone)]
pub enum ImportClause {
    /// `import { a, b as c } from "m"`, optionally preceded by a default binding.
    Named {
        default: Option<String>,
        specifiers: Vec<ImportSpecifier>,
    },
    /// `import * as ns from "m"`
    Namespace(String),
    /// `import def from "m"`
    Default(String),
    /// `import "m"`
    SideEffect,
}

#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub clause: ImportClause,
    /// Decoded module specifier.
    pub source: String,
    /// Module specifier exactly as written, quotes included.
    pub source_text: String,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    VarDecl {
        kind: DeclKind,
        declarations: Vec<Declarator>,
    },
    Function(FunctionDef),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    For {
        init: Option<ForInit>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForOf {
        kind: Option<DeclKind>,
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
        is_await: bool,
    },
    ForIn {
        kind: Option<DeclKind>,
        binding: String,
        object: Expr,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<String>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Import(ImportDecl),
    Export(Box<Stmt>),
    ExportDefault(Expr),
    Empty,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

impl Stmt {
    /// Names a declaration statement introduces into its scope.
    pub fn declared_names(&self) -> Vec<String> {
        match &self.kind {
            StmtKind::VarDecl { declarations, .. } => {
                declarations.iter().map(|d| d.name.clone()).collect()
            }
            StmtKind::Function(def) => def.name.iter().cloned().collect(),
            StmtKind::Export(inner) => inner.declared_names(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Stmt>,
}
