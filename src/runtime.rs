use std::{cmp::Ordering, mem, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{
        BinaryOp, DeclKind, Expr, ExprKind, ForInit, FunctionBody, FunctionDef, Literal,
        LogicalOp, Program, PropertyKey, Stmt, StmtKind, TemplatePart, UnaryOp, UpdateOp,
    },
    console::ConsoleIntercept,
    diagnostics::{Diagnostic, DiagnosticKind, ReplError, Result, SourceSpan},
    environment::{Environment, EnvironmentRef},
    parser,
    value::{PromiseState, UserFunction, Value, ValueKind, number_to_string},
};

const MAX_CALL_DEPTH: usize = 512;
/// Deepest chain of nested statement and expression evaluations.
const MAX_NESTING: usize = 4096;
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Global scope and console shared by every evaluation of one pass.
#[derive(Clone)]
pub struct ExecutionContext {
    pub globals: EnvironmentRef,
    pub console: Rc<ConsoleIntercept>,
}

impl ExecutionContext {
    pub fn new(console: Rc<ConsoleIntercept>) -> Self {
        let globals = Environment::new();
        crate::stdlib::install(&globals);
        Self { globals, console }
    }

    pub fn bind_global(&self, name: &str, value: Value) {
        self.globals
            .borrow_mut()
            .define(name.to_string(), value, true);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get_own(name)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Rc::new(ConsoleIntercept::new()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Sync,
    /// Top-level `await` allowed; the completion value comes back as a settled promise.
    Async,
}

struct ModuleScope {
    exported: Vec<String>,
    default: Option<Value>,
}

pub struct Interpreter {
    env: EnvironmentRef,
    context: ExecutionContext,
    in_async: bool,
    in_function: bool,
    module: Option<ModuleScope>,
    depth: usize,
    nesting: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_context(ExecutionContext::default())
    }

    /// Evaluations run in a fresh child scope of the context's globals.
    pub fn with_context(context: ExecutionContext) -> Self {
        let env = Environment::function_scope(Rc::clone(&context.globals));
        Self {
            env,
            context,
            in_async: false,
            in_function: false,
            module: None,
            depth: 0,
            nesting: 0,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn eval_source(&mut self, source: &str, mode: EvalMode) -> Result<Value> {
        let program = parser::parse_program(source)?;
        self.eval_program(&program, mode)
    }

    pub fn eval_program(&mut self, program: &Program, mode: EvalMode) -> Result<Value> {
        let previous = mem::replace(&mut self.in_async, mode == EvalMode::Async);
        let outcome = self
            .run_items(&program.items)
            .and_then(|flow| self.completion(flow));
        self.in_async = previous;
        match mode {
            EvalMode::Sync => outcome,
            EvalMode::Async => Ok(promise_from(outcome)),
        }
    }

    /// Runs a module body and returns its export table. Imports inside the
    /// module must already be bound in this interpreter's scope.
    pub fn run_module(&mut self, program: &Program) -> Result<IndexMap<String, Value>> {
        self.module = Some(ModuleScope {
            exported: Vec::new(),
            default: None,
        });
        self.in_async = true;
        let outcome = self.run_items(&program.items).and_then(|flow| self.completion(flow));
        let scope = self.module.take();
        outcome?;

        let mut exports = IndexMap::new();
        if let Some(scope) = scope {
            for name in scope.exported {
                let value = Environment::lookup(&self.env, &name).unwrap_or_else(Value::undefined);
                exports.insert(name, value);
            }
            if let Some(default) = scope.default {
                exports.insert("default".to_string(), default);
            }
        }
        Ok(exports)
    }

    /// Binds a value in the scope evaluations run in.
    pub fn define(&mut self, name: &str, value: Value) {
        self.env.borrow_mut().define(name.to_string(), value, true);
    }

    fn completion(&self, flow: FlowControl) -> Result<Value> {
        match flow {
            FlowControl::Next => Ok(Value::undefined()),
            FlowControl::NextValue(value) | FlowControl::Return(value) => Ok(value),
            FlowControl::Break => Err(syntax_error("Illegal break statement")),
            FlowControl::Continue => Err(syntax_error("Illegal continue statement")),
        }
    }

    fn with_env<T>(
        &mut self,
        env: EnvironmentRef,
        run: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let previous = mem::replace(&mut self.env, env);
        let result = run(self);
        self.env = previous;
        result
    }

    fn run_items(&mut self, items: &[Stmt]) -> Result<FlowControl> {
        self.hoist_functions(items);
        let mut last_value: Option<Value> = None;
        for stmt in items {
            match self.execute_statement(stmt)? {
                FlowControl::Next => {}
                FlowControl::NextValue(value) => last_value = Some(value),
                other => return Ok(other),
            }
        }
        Ok(completion_of(last_value))
    }

    fn hoist_functions(&mut self, items: &[Stmt]) {
        for stmt in items {
            let def = match &stmt.kind {
                StmtKind::Function(def) => def,
                StmtKind::Export(inner) => match &inner.kind {
                    StmtKind::Function(def) => def,
                    _ => continue,
                },
                _ => continue,
            };
            if let Some(name) = &def.name {
                let function = self.make_function(def);
                self.env.borrow_mut().define(name.clone(), function, true);
            }
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> Result<FlowControl> {
        let child = Environment::with_parent(Rc::clone(&self.env));
        self.with_env(child, |this| this.run_items(statements))
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        self.nested(stmt.span, |this| this.execute_statement_kind(stmt))
    }

    fn execute_statement_kind(&mut self, stmt: &Stmt) -> Result<FlowControl> {
        match &stmt.kind {
            StmtKind::VarDecl { kind, declarations } => {
                for declarator in declarations {
                    let value = match &declarator.init {
                        Some(init) => Some(self.evaluate(init)?),
                        None if kind.is_lexical() => Some(Value::undefined()),
                        None => None,
                    };
                    Environment::declare(&self.env, &declarator.name, value, *kind, declarator.span)?;
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Function(_) | StmtKind::Empty => Ok(FlowControl::Next),
            StmtKind::Expr(expr) => Ok(FlowControl::NextValue(self.evaluate(expr)?)),
            StmtKind::Block(statements) => self.execute_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_statement(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_statement(branch)
                } else {
                    Ok(FlowControl::Next)
                }
            }
            StmtKind::While { condition, body } => {
                let mut last = None;
                while self.evaluate(condition)?.is_truthy() {
                    let flow = self.execute_statement(body)?;
                    if let Some(exit) = loop_body(flow, &mut last) {
                        return Ok(exit);
                    }
                }
                Ok(completion_of(last))
            }
            StmtKind::DoWhile { body, condition } => {
                let mut last = None;
                loop {
                    let flow = self.execute_statement(body)?;
                    if let Some(exit) = loop_body(flow, &mut last) {
                        return Ok(exit);
                    }
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                }
                Ok(completion_of(last))
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let loop_env = Environment::with_parent(Rc::clone(&self.env));
                self.with_env(loop_env, |this| {
                    match init {
                        Some(ForInit::Decl { kind, declarations }) => {
                            for declarator in declarations {
                                let value = match &declarator.init {
                                    Some(init) => Some(this.evaluate(init)?),
                                    None if kind.is_lexical() => Some(Value::undefined()),
                                    None => None,
                                };
                                Environment::declare(
                                    &this.env,
                                    &declarator.name,
                                    value,
                                    *kind,
                                    declarator.span,
                                )?;
                            }
                        }
                        Some(ForInit::Expr(expr)) => {
                            this.evaluate(expr)?;
                        }
                        None => {}
                    }
                    let mut last = None;
                    loop {
                        if let Some(condition) = condition {
                            if !this.evaluate(condition)?.is_truthy() {
                                break;
                            }
                        }
                        let flow = this.execute_statement(body)?;
                        if let Some(exit) = loop_body(flow, &mut last) {
                            return Ok(exit);
                        }
                        if let Some(update) = update {
                            this.evaluate(update)?;
                        }
                    }
                    Ok(completion_of(last))
                })
            }
            StmtKind::ForOf {
                kind,
                binding,
                iterable,
                body,
                is_await,
            } => {
                if *is_await && !self.in_async {
                    return Err(await_outside_async(stmt.span));
                }
                let iterable_value = self.evaluate(iterable)?;
                let items = self.iterate(&iterable_value, iterable.span)?;
                let mut last = None;
                for item in items {
                    let item = if *is_await { await_value(&item)? } else { item };
                    let flow = self.run_iteration(*kind, binding, item, body, stmt.span)?;
                    if let Some(exit) = loop_body(flow, &mut last) {
                        return Ok(exit);
                    }
                }
                Ok(completion_of(last))
            }
            StmtKind::ForIn {
                kind,
                binding,
                object,
                body,
            } => {
                let object_value = self.evaluate(object)?;
                let mut last = None;
                for key in property_keys(&object_value) {
                    let flow =
                        self.run_iteration(*kind, binding, Value::string(key), body, stmt.span)?;
                    if let Some(exit) = loop_body(flow, &mut last) {
                        return Ok(exit);
                    }
                }
                Ok(completion_of(last))
            }
            StmtKind::Return(expr) => {
                if !self.in_function {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Parser,
                        "Illegal return statement",
                        stmt.span,
                    ));
                }
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::undefined(),
                };
                Ok(FlowControl::Return(value))
            }
            StmtKind::Break => Ok(FlowControl::Break),
            StmtKind::Continue => Ok(FlowControl::Continue),
            StmtKind::Throw(expr) => {
                let value = self.evaluate(expr)?;
                Err(ReplError::Thrown(value))
            }
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let mut outcome = self.execute_block(block);
                if let Some(handler) = handler {
                    outcome = match outcome {
                        Err(err) => {
                            let env = Environment::with_parent(Rc::clone(&self.env));
                            if let Some(name) = param {
                                env.borrow_mut()
                                    .define(name.clone(), err.into_value(), true);
                            }
                            self.with_env(env, |this| this.run_items(handler))
                        }
                        ok => ok,
                    };
                }
                if let Some(finalizer) = finalizer {
                    match self.execute_block(finalizer)? {
                        FlowControl::Next | FlowControl::NextValue(_) => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                outcome
            }
            StmtKind::Import(_) => {
                if self.module.is_none() {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Parser,
                        "Cannot use import statement outside a module",
                        stmt.span,
                    ));
                }
                Ok(FlowControl::Next)
            }
            StmtKind::Export(inner) => {
                if self.module.is_none() {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Parser,
                        "Unexpected token 'export'",
                        stmt.span,
                    ));
                }
                self.execute_statement(inner)?;
                if let Some(scope) = self.module.as_mut() {
                    scope.exported.extend(inner.declared_names());
                }
                Ok(FlowControl::Next)
            }
            StmtKind::ExportDefault(expr) => {
                if self.module.is_none() {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Parser,
                        "Unexpected token 'export'",
                        stmt.span,
                    ));
                }
                let value = self.evaluate(expr)?;
                if let Some(scope) = self.module.as_mut() {
                    scope.default = Some(value);
                }
                Ok(FlowControl::Next)
            }
        }
    }

    fn run_iteration(
        &mut self,
        kind: Option<DeclKind>,
        binding: &str,
        item: Value,
        body: &Stmt,
        span: SourceSpan,
    ) -> Result<FlowControl> {
        let iteration_env = Environment::with_parent(Rc::clone(&self.env));
        self.with_env(iteration_env, |this| {
            match kind {
                Some(kind) => Environment::declare(&this.env, binding, Some(item), kind, span)?,
                None => Environment::assign(&this.env, binding, item, span)?,
            }
            this.execute_statement(body)
        })
    }

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        self.nested(expr.span, |this| this.evaluate_kind(expr))
    }

    /// Runs `eval` one nesting level deeper, growing the stack when it runs low.
    fn nested<T>(
        &mut self,
        span: SourceSpan,
        eval: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.nesting >= MAX_NESTING {
            return Err(stack_exceeded(span));
        }
        self.nesting += 1;
        let outcome = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || eval(self));
        self.nesting -= 1;
        outcome
    }

    fn evaluate_kind(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(chunk) => text.push_str(chunk),
                        TemplatePart::Expr(inner) => {
                            text.push_str(&self.evaluate(inner)?.to_string())
                        }
                    }
                }
                Ok(Value::string(text))
            }
            ExprKind::Variable(name) => Environment::get(&self.env, name, expr.span),
            ExprKind::Binary { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let right_value = self.evaluate(right)?;
                binary(*op, left_value, right_value, expr.span)
            }
            ExprKind::Logical { op, left, right } => {
                let left_value = self.evaluate(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left_value.is_truthy(),
                    LogicalOp::Or => left_value.is_truthy(),
                    LogicalOp::Nullish => !left_value.is_nullish(),
                };
                if short_circuit {
                    Ok(left_value)
                } else {
                    self.evaluate(right)
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                if let (UnaryOp::Typeof, ExprKind::Variable(name)) = (op, &operand.kind) {
                    let value = Environment::lookup(&self.env, name);
                    return Ok(Value::string(
                        value.map_or("undefined", |value| value.type_of()),
                    ));
                }
                let value = self.evaluate(operand)?;
                Ok(match op {
                    UnaryOp::Negate => Value::number(-value.to_number()),
                    UnaryOp::Plus => Value::number(value.to_number()),
                    UnaryOp::Not => Value::bool(!value.is_truthy()),
                    UnaryOp::Typeof => Value::string(value.type_of()),
                })
            }
            ExprKind::Update { op, prefix, target } => {
                let place = self.place(target)?;
                let old = self.read_place(&place, target.span)?.to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_place(place, Value::number(new), target.span)?;
                Ok(Value::number(if *prefix { new } else { old }))
            }
            ExprKind::Assign { op, target, value } => {
                let place = self.place(target)?;
                let assigned = match op {
                    None => self.evaluate(value)?,
                    Some(op) => {
                        let current = self.read_place(&place, target.span)?;
                        let rhs = self.evaluate(value)?;
                        binary(*op, current, rhs, expr.span)?
                    }
                };
                self.write_place(place, assigned.clone(), target.span)?;
                Ok(assigned)
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test)?.is_truthy() {
                    self.evaluate(consequent)
                } else {
                    self.evaluate(alternate)
                }
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.evaluate(callee)?;
                if !callee_value.is_callable() {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Type,
                        format!("{} is not a function", describe(callee)),
                        expr.span,
                    ));
                }
                let args = self.evaluate_args(args)?;
                self.call_function(&callee_value, args, expr.span)
            }
            ExprKind::New { callee, args } => {
                let callee_value = self.evaluate(callee)?;
                let is_constructor = matches!(
                    &*callee_value.0,
                    ValueKind::NativeFunction(native) if native.constructor
                );
                if !is_constructor {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Type,
                        format!("{} is not a constructor", describe(callee)),
                        expr.span,
                    ));
                }
                let args = self.evaluate_args(args)?;
                self.call_function(&callee_value, args, expr.span)
            }
            ExprKind::ArrayLiteral(elements) => Ok(Value::array(self.evaluate_args(elements)?)),
            ExprKind::ObjectLiteral(entries) => {
                let mut map = IndexMap::new();
                for (key, value_expr) in entries {
                    let key = match key {
                        PropertyKey::Named(name) => name.clone(),
                        PropertyKey::Computed(key_expr) => property_key(&self.evaluate(key_expr)?),
                    };
                    let value = self.evaluate(value_expr)?;
                    map.insert(key, value);
                }
                Ok(Value::object(map))
            }
            ExprKind::Group(inner) => self.evaluate(inner),
            ExprKind::Index { target, index } => {
                let target_value = self.evaluate(target)?;
                let index_value = self.evaluate(index)?;
                self.get_property(&target_value, &property_key(&index_value), expr.span)
            }
            ExprKind::Field { target, field } => {
                let target_value = self.evaluate(target)?;
                self.get_property(&target_value, field, expr.span)
            }
            ExprKind::Function(def) => Ok(self.make_function(def)),
            ExprKind::Await(inner) => {
                if !self.in_async {
                    return Err(await_outside_async(expr.span));
                }
                let value = self.evaluate(inner)?;
                await_value(&value)
            }
        }
    }

    fn evaluate_args(&mut self, args: &[Expr]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg)?);
        }
        Ok(values)
    }

    fn make_function(&self, def: &FunctionDef) -> Value {
        Value::new(ValueKind::Function(UserFunction {
            def: def.clone(),
            env: Rc::clone(&self.env),
        }))
    }

    pub(crate) fn call_function(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        span: SourceSpan,
    ) -> Result<Value> {
        match &*callee.0 {
            ValueKind::NativeFunction(native) => native.call(self, &args),
            ValueKind::Function(fun) => self.call_user(fun, args, span),
            _ => Err(ReplError::runtime(
                DiagnosticKind::Type,
                format!("{} is not a function", callee.type_of()),
                span,
            )),
        }
    }

    fn call_user(&mut self, fun: &UserFunction, args: Vec<Value>, span: SourceSpan) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(stack_exceeded(span));
        }
        let env = Environment::function_scope(Rc::clone(&fun.env));
        {
            let mut scope = env.borrow_mut();
            let mut args = args.into_iter();
            for name in &fun.def.params {
                scope.define(name.clone(), args.next().unwrap_or_else(Value::undefined), true);
            }
        }

        let body = Rc::clone(&fun.def.body);
        let previous_async = mem::replace(&mut self.in_async, fun.def.is_async);
        let previous_function = mem::replace(&mut self.in_function, true);
        let previous_module = self.module.take();
        self.depth += 1;
        let outcome = self.with_env(env, |this| match &*body {
            FunctionBody::Block(statements) => match this.run_items(statements)? {
                FlowControl::Return(value) => Ok(value),
                FlowControl::Next | FlowControl::NextValue(_) => Ok(Value::undefined()),
                FlowControl::Break => Err(syntax_error("Illegal break statement")),
                FlowControl::Continue => Err(syntax_error("Illegal continue statement")),
            },
            FunctionBody::Expr(expr) => this.evaluate(expr),
        });
        self.depth -= 1;
        self.module = previous_module;
        self.in_function = previous_function;
        self.in_async = previous_async;

        if fun.def.is_async {
            Ok(promise_from(outcome))
        } else {
            outcome
        }
    }

    pub(crate) fn get_property(&mut self, target: &Value, key: &str, span: SourceSpan) -> Result<Value> {
        let own = match &*target.0 {
            ValueKind::Undefined | ValueKind::Null => {
                return Err(ReplError::runtime(
                    DiagnosticKind::Type,
                    format!("Cannot read properties of {target} (reading '{key}')"),
                    span,
                ));
            }
            ValueKind::Object(entries) => entries.borrow().get(key).cloned(),
            ValueKind::Module(module) => module.exports.get(key).cloned(),
            ValueKind::Array(items) => {
                let items = items.borrow();
                match key {
                    "length" => Some(Value::number(items.len() as f64)),
                    _ => array_index(key).and_then(|idx| items.get(idx).cloned()),
                }
            }
            ValueKind::String(text) => match key {
                "length" => Some(Value::number(text.encode_utf16().count() as f64)),
                _ => array_index(key)
                    .and_then(|idx| text.chars().nth(idx))
                    .map(|ch| Value::string(ch.to_string())),
            },
            ValueKind::Error(err) => match key {
                "name" => Some(Value::string(err.name.clone())),
                "message" => Some(Value::string(err.message.clone())),
                "stack" => Some(Value::string(target.to_string())),
                _ => None,
            },
            ValueKind::Function(fun) => match key {
                "name" => Some(Value::string(fun.def.name.clone().unwrap_or_default())),
                "length" => Some(Value::number(fun.def.params.len() as f64)),
                _ => None,
            },
            ValueKind::NativeFunction(native) => match key {
                "name" => Some(Value::string(native.name)),
                "length" => Some(Value::number(native.arity as f64)),
                _ => None,
            },
            _ => None,
        };
        Ok(own
            .or_else(|| crate::stdlib::method(target, key))
            .unwrap_or_else(Value::undefined))
    }

    fn set_property(&mut self, target: &Value, key: &str, value: Value, span: SourceSpan) -> Result<()> {
        match &*target.0 {
            ValueKind::Undefined | ValueKind::Null => Err(ReplError::runtime(
                DiagnosticKind::Type,
                format!("Cannot set properties of {target} (setting '{key}')"),
                span,
            )),
            ValueKind::Object(entries) => {
                entries.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            ValueKind::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 {
                        return Err(ReplError::runtime(
                            DiagnosticKind::Range,
                            "Invalid array length",
                            span,
                        ));
                    }
                    items.resize(len as usize, Value::undefined());
                } else if let Some(idx) = array_index(key) {
                    if idx >= items.len() {
                        items.resize(idx + 1, Value::undefined());
                    }
                    items[idx] = value;
                }
                Ok(())
            }
            ValueKind::Module(_) => Err(ReplError::runtime(
                DiagnosticKind::Type,
                format!("Cannot assign to read only property '{key}' of object '[object Module]'"),
                span,
            )),
            // Writes to primitives and other built-ins are silently dropped.
            _ => Ok(()),
        }
    }

    fn place(&mut self, target: &Expr) -> Result<Place> {
        match &target.kind {
            ExprKind::Variable(name) => Ok(Place::Binding(name.clone())),
            ExprKind::Field {
                target: owner,
                field,
            } => Ok(Place::Property(self.evaluate(owner)?, field.clone())),
            ExprKind::Index {
                target: owner,
                index,
            } => {
                let owner = self.evaluate(owner)?;
                let key = property_key(&self.evaluate(index)?);
                Ok(Place::Property(owner, key))
            }
            ExprKind::Group(inner) => self.place(inner),
            _ => Err(ReplError::runtime(
                DiagnosticKind::Parser,
                "Invalid left-hand side in assignment",
                target.span,
            )),
        }
    }

    fn read_place(&mut self, place: &Place, span: SourceSpan) -> Result<Value> {
        match place {
            Place::Binding(name) => Environment::get(&self.env, name, span),
            Place::Property(owner, key) => self.get_property(owner, key, span),
        }
    }

    fn write_place(&mut self, place: Place, value: Value, span: SourceSpan) -> Result<()> {
        match place {
            Place::Binding(name) => Environment::assign(&self.env, &name, value, span),
            Place::Property(owner, key) => self.set_property(&owner, &key, value, span),
        }
    }

    fn iterate(&self, value: &Value, span: SourceSpan) -> Result<Vec<Value>> {
        match &*value.0 {
            ValueKind::Array(items) => Ok(items.borrow().clone()),
            ValueKind::String(text) => Ok(text
                .chars()
                .map(|ch| Value::string(ch.to_string()))
                .collect()),
            _ => Err(ReplError::runtime(
                DiagnosticKind::Type,
                format!("{} is not iterable", value.type_of()),
                span,
            )),
        }
    }
}

enum Place {
    Binding(String),
    Property(Value, String),
}

enum FlowControl {
    Next,
    NextValue(Value),
    Return(Value),
    Break,
    Continue,
}

fn completion_of(last: Option<Value>) -> FlowControl {
    last.map_or(FlowControl::Next, FlowControl::NextValue)
}

/// Folds one loop-body completion into `last`; `Some` ends the loop.
fn loop_body(flow: FlowControl, last: &mut Option<Value>) -> Option<FlowControl> {
    match flow {
        FlowControl::Next | FlowControl::Continue => None,
        FlowControl::NextValue(value) => {
            *last = Some(value);
            None
        }
        FlowControl::Break => Some(completion_of(last.take())),
        FlowControl::Return(value) => Some(FlowControl::Return(value)),
    }
}

/// Wraps the outcome of an async body the way an `async` function returns it.
pub(crate) fn promise_from(outcome: Result<Value>) -> Value {
    match outcome {
        Ok(value) if matches!(&*value.0, ValueKind::Promise(_)) => value,
        Ok(value) => Value::fulfilled(value),
        Err(err) => Value::rejected(err.into_value()),
    }
}

/// Unwraps a settled promise; plain values pass through.
pub fn await_value(value: &Value) -> Result<Value> {
    match &*value.0 {
        ValueKind::Promise(state) => match &*state.borrow() {
            PromiseState::Fulfilled(inner) => Ok(inner.clone()),
            PromiseState::Rejected(reason) => Err(ReplError::Thrown(reason.clone())),
            PromiseState::Pending => Err(ReplError::from(Diagnostic::new(
                DiagnosticKind::Runtime,
                "awaited promise never settles",
            ))),
        },
        _ => Ok(value.clone()),
    }
}

fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::number(*n),
        Literal::String(s) => Value::string(s.clone()),
        Literal::Bool(b) => Value::bool(*b),
        Literal::Null => Value::null(),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value, span: SourceSpan) -> Result<Value> {
    use BinaryOp::*;
    let value = match op {
        Add => {
            let (left, right) = (to_primitive(left), to_primitive(right));
            if left.as_str().is_some() || right.as_str().is_some() {
                Value::string(format!("{left}{right}"))
            } else {
                Value::number(left.to_number() + right.to_number())
            }
        }
        Sub => Value::number(left.to_number() - right.to_number()),
        Mul => Value::number(left.to_number() * right.to_number()),
        Div => Value::number(left.to_number() / right.to_number()),
        Mod => Value::number(left.to_number() % right.to_number()),
        Pow => Value::number(left.to_number().powf(right.to_number())),
        Equal => Value::bool(left.loose_equals(&right)),
        NotEqual => Value::bool(!left.loose_equals(&right)),
        StrictEqual => Value::bool(left.strict_equals(&right)),
        StrictNotEqual => Value::bool(!left.strict_equals(&right)),
        Less => Value::bool(compare(left, right) == Some(Ordering::Less)),
        LessEqual => Value::bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Greater => Value::bool(compare(left, right) == Some(Ordering::Greater)),
        GreaterEqual => Value::bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        In => {
            let key = property_key(&left);
            let found = match &*right.0 {
                ValueKind::Object(entries) => entries.borrow().contains_key(&key),
                ValueKind::Module(module) => module.exports.contains_key(&key),
                ValueKind::Array(items) => {
                    key == "length" || array_index(&key).is_some_and(|idx| idx < items.borrow().len())
                }
                ValueKind::Error(_) => key == "name" || key == "message",
                _ => {
                    return Err(ReplError::runtime(
                        DiagnosticKind::Type,
                        format!("Cannot use 'in' operator to search for '{key}' in {right}"),
                        span,
                    ));
                }
            };
            Value::bool(found)
        }
    };
    Ok(value)
}

fn compare(left: Value, right: Value) -> Option<Ordering> {
    let (left, right) = (to_primitive(left), to_primitive(right));
    match (left.as_str(), right.as_str()) {
        (Some(a), Some(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn to_primitive(value: Value) -> Value {
    match &*value.0 {
        ValueKind::Undefined
        | ValueKind::Null
        | ValueKind::Bool(_)
        | ValueKind::Number(_)
        | ValueKind::String(_) => value,
        _ => Value::string(value.to_string()),
    }
}

pub(crate) fn property_key(value: &Value) -> String {
    match &*value.0 {
        ValueKind::Number(n) => number_to_string(*n),
        _ => value.to_string(),
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Keys visited by `for ... in`.
pub(crate) fn property_keys(value: &Value) -> Vec<String> {
    match &*value.0 {
        ValueKind::Object(entries) => entries.borrow().keys().cloned().collect(),
        ValueKind::Module(module) => module.exports.keys().cloned().collect(),
        ValueKind::Array(items) => (0..items.borrow().len()).map(|i| i.to_string()).collect(),
        ValueKind::String(text) => (0..text.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Variable(name) => name.clone(),
        ExprKind::Field { target, field } => format!("{}.{field}", describe(target)),
        ExprKind::Index { target, .. } => format!("{}[...]", describe(target)),
        ExprKind::Call { callee, .. } => format!("{}(...)", describe(callee)),
        ExprKind::Group(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}

fn stack_exceeded(span: SourceSpan) -> ReplError {
    ReplError::runtime(DiagnosticKind::Range, "Maximum call stack size exceeded", span)
}

fn syntax_error(message: &str) -> ReplError {
    ReplError::from(Diagnostic::new(DiagnosticKind::Parser, message))
}

fn await_outside_async(span: SourceSpan) -> ReplError {
    ReplError::runtime(
        DiagnosticKind::Parser,
        "await is only valid in async functions and the top level bodies of modules",
        span,
    )
}
