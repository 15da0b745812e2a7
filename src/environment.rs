use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::DeclKind,
    diagnostics::{DiagnosticKind, ReplError, Result, SourceSpan},
    value::Value,
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Binding>,
    /// Function bodies and evaluation roots; `var` declarations land here.
    var_scope: bool,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            bindings: IndexMap::new(),
            var_scope: true,
        }))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
            var_scope: false,
        }))
    }

    /// A child scope that collects `var` declarations, used for function
    /// calls and for each evaluation against a shared global scope.
    pub fn function_scope(parent: EnvironmentRef) -> EnvironmentRef {
        let env = Self::with_parent(parent);
        env.borrow_mut().var_scope = true;
        env
    }

    pub fn define(&mut self, name: String, value: Value, mutable: bool) {
        self.bindings.insert(
            name,
            Binding {
                value,
                mutable,
                lexical: false,
            },
        );
    }

    /// Declares `name` the way a `var`, `let` or `const` statement does.
    /// A `var` without initializer keeps an existing value.
    pub fn declare(
        env: &EnvironmentRef,
        name: &str,
        value: Option<Value>,
        kind: DeclKind,
        span: SourceSpan,
    ) -> Result<()> {
        let target = if kind.is_lexical() {
            Rc::clone(env)
        } else {
            Environment::nearest_var_scope(env)
        };
        let mut scope = target.borrow_mut();
        if let Some(existing) = scope.bindings.get_mut(name) {
            if kind.is_lexical() || existing.lexical {
                return Err(ReplError::runtime(
                    DiagnosticKind::Parser,
                    format!("Identifier '{name}' has already been declared"),
                    span,
                ));
            }
            if let Some(value) = value {
                existing.value = value;
            }
            return Ok(());
        }
        scope.bindings.insert(
            name.to_string(),
            Binding {
                value: value.unwrap_or_else(Value::undefined),
                mutable: kind != DeclKind::Const,
                lexical: kind.is_lexical(),
            },
        );
        Ok(())
    }

    fn nearest_var_scope(env: &EnvironmentRef) -> EnvironmentRef {
        let mut current = Rc::clone(env);
        loop {
            let parent = {
                let scope = current.borrow();
                if scope.var_scope {
                    None
                } else {
                    scope.parent.clone()
                }
            };
            match parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    pub fn assign(env: &EnvironmentRef, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        if let Some(binding) = env.borrow_mut().bindings.get_mut(name) {
            if !binding.mutable {
                return Err(ReplError::runtime(
                    DiagnosticKind::Type,
                    "Assignment to constant variable.",
                    span,
                ));
            }
            binding.value = value;
            return Ok(());
        }
        let parent = env.borrow().parent.clone();
        match parent {
            Some(parent) => Environment::assign(&parent, name, value, span),
            None => Err(not_defined(name, span)),
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str, span: SourceSpan) -> Result<Value> {
        Environment::lookup(env, name).ok_or_else(|| not_defined(name, span))
    }

    pub fn lookup(env: &EnvironmentRef, name: &str) -> Option<Value> {
        if let Some(binding) = env.borrow().bindings.get(name) {
            return Some(binding.value.clone());
        }
        let parent = env.borrow().parent.clone();
        parent.and_then(|parent| Environment::lookup(&parent, name))
    }

    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).map(|binding| binding.value.clone())
    }
}

fn not_defined(name: &str, span: SourceSpan) -> ReplError {
    ReplError::runtime(
        DiagnosticKind::Reference,
        format!("{name} is not defined"),
        span,
    )
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
    /// Declared by `let`/`const`; such names cannot be redeclared in the same scope.
    pub lexical: bool,
}
