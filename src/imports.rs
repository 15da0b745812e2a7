//! Module loading and the binding of imported names into a pass's globals.

use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::{
    ast::{ImportClause, StmtKind},
    blocks::Import,
    console::ConsoleIntercept,
    diagnostics::{Diagnostic, DiagnosticKind, ReplError, Result},
    parser,
    runtime::{ExecutionContext, Interpreter},
    text::unwrap,
    value::{Value, ValueKind},
};

#[async_trait(?Send)]
pub trait ModuleLoader {
    /// Loads the module named by a bare specifier and returns its module object.
    async fn load(&self, specifier: &str) -> Result<Value>;
}

/// Outcome of resolving one import block.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResults {
    #[serde(serialize_with = "serialize_bindings")]
    pub resolved: IndexMap<String, Value>,
    pub errors: String,
}

fn serialize_bindings<S: Serializer>(
    bindings: &IndexMap<String, Value>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(bindings.iter().map(|(name, value)| (name, value.to_string())))
}

/// Loads every import and binds it into `context`'s globals. A failing import
/// contributes its message to `errors` and does not stop the others.
pub async fn resolve_imports(
    imports: &IndexMap<String, Import>,
    loader: &dyn ModuleLoader,
    context: &ExecutionContext,
) -> ImportResults {
    let mut results = ImportResults::default();
    let mut errors = String::new();
    for (name, import) in imports {
        match resolve_one(import, loader).await {
            Ok(value) => {
                context.bind_global(name, value.clone());
                results.resolved.insert(name.clone(), value);
            }
            Err(err) => {
                tracing::debug!(%name, module = %import.module, error = %err, "import failed");
                errors.push_str(&err.message());
                errors.push(' ');
            }
        }
    }
    results.errors = errors.trim().to_string();
    results
}

async fn resolve_one(import: &Import, loader: &dyn ModuleLoader) -> Result<Value> {
    let specifier = unwrap(&import.module, &["'", "\""]);
    let module = loader.load(specifier).await?;
    if !import.named {
        return Ok(module);
    }
    module_export(&module, &import.export_name)
        .ok_or_else(|| module_error(format!("{} not found in {specifier}", import.export_name)))
}

fn module_export(module: &Value, name: &str) -> Option<Value> {
    let value = match &*module.0 {
        ValueKind::Module(module) => module.exports.get(name).cloned(),
        ValueKind::Object(entries) => entries.borrow().get(name).cloned(),
        _ => None,
    };
    value.filter(|value| !value.is_undefined())
}

fn module_error(message: impl Into<String>) -> ReplError {
    ReplError::from(Diagnostic::new(DiagnosticKind::Module, message))
}

/// Parses and runs a module body, loading its own imports through `loader`.
async fn evaluate_module(
    loader: &dyn ModuleLoader,
    specifier: &str,
    source: &str,
    console: &Rc<ConsoleIntercept>,
) -> Result<Value> {
    let program = parser::parse_program(source).map_err(|diag| {
        ReplError::from(Diagnostic {
            message: format!("{specifier}: {}", diag.message),
            ..diag
        })
    })?;

    let mut interpreter = Interpreter::with_context(ExecutionContext::new(Rc::clone(console)));
    for stmt in &program.items {
        let StmtKind::Import(decl) = &stmt.kind else {
            continue;
        };
        let nested_specifier = unwrap(&decl.source, &["'", "\""]);
        let nested = loader.load(nested_specifier).await?;
        match &decl.clause {
            ImportClause::Named {
                default,
                specifiers,
            } => {
                if let Some(local) = default {
                    let value = module_export(&nested, "default").ok_or_else(|| {
                        module_error(format!("default not found in {nested_specifier}"))
                    })?;
                    interpreter.define(local, value);
                }
                for spec in specifiers {
                    let value = module_export(&nested, &spec.imported).ok_or_else(|| {
                        module_error(format!("{} not found in {nested_specifier}", spec.imported))
                    })?;
                    interpreter.define(&spec.local, value);
                }
            }
            ImportClause::Namespace(local) => interpreter.define(local, nested),
            ImportClause::Default(local) => {
                let value = module_export(&nested, "default").ok_or_else(|| {
                    module_error(format!("default not found in {nested_specifier}"))
                })?;
                interpreter.define(local, value);
            }
            ImportClause::SideEffect => {}
        }
    }

    let exports = interpreter.run_module(&program)?;
    Ok(Value::module(specifier, exports))
}

/// Module objects by key, plus the keys currently being evaluated.
#[derive(Default)]
struct ModuleCache {
    loaded: RefCell<HashMap<String, Value>>,
    loading: RefCell<Vec<String>>,
}

impl ModuleCache {
    /// A module already loaded under `key`; fails when `key` is still being
    /// evaluated further up the import chain.
    fn lookup(&self, key: &str, specifier: &str) -> Result<Option<Value>> {
        if let Some(module) = self.loaded.borrow().get(key) {
            return Ok(Some(module.clone()));
        }
        if self.loading.borrow().iter().any(|pending| pending == key) {
            return Err(module_error(format!(
                "Circular import of '{specifier}' is not supported"
            )));
        }
        Ok(None)
    }

    async fn evaluate(
        &self,
        key: String,
        specifier: &str,
        source: &str,
        loader: &dyn ModuleLoader,
        console: &Rc<ConsoleIntercept>,
    ) -> Result<Value> {
        self.loading.borrow_mut().push(key.clone());
        let outcome = evaluate_module(loader, specifier, source, console).await;
        self.loading.borrow_mut().retain(|pending| pending != &key);

        let module = outcome?;
        tracing::debug!(%specifier, "module loaded");
        self.loaded.borrow_mut().insert(key, module.clone());
        Ok(module)
    }
}

/// Loads modules from files below a root directory.
pub struct FsModuleLoader {
    root: PathBuf,
    console: Rc<ConsoleIntercept>,
    cache: ModuleCache,
}

impl FsModuleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            console: Rc::new(ConsoleIntercept::new()),
            cache: ModuleCache::default(),
        }
    }

    /// Routes `console.*` calls made by module code through `console`.
    pub fn with_console(mut self, console: Rc<ConsoleIntercept>) -> Self {
        self.console = console;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait(?Send)]
impl ModuleLoader for FsModuleLoader {
    async fn load(&self, specifier: &str) -> Result<Value> {
        let relative = specifier.trim_start_matches("./");
        let path = tokio::fs::canonicalize(self.root.join(relative))
            .await
            .map_err(|_| module_error(format!("Cannot find module '{specifier}'")))?;
        let key = path.to_string_lossy().into_owned();
        if let Some(module) = self.cache.lookup(&key, specifier)? {
            return Ok(module);
        }
        let source = tokio::fs::read_to_string(&path).await?;
        self.cache
            .evaluate(key, specifier, &source, self, &self.console)
            .await
    }
}

/// Serves module sources from memory, keyed by specifier.
#[derive(Default)]
pub struct MemoryModuleLoader {
    sources: IndexMap<String, String>,
    console: Rc<ConsoleIntercept>,
    cache: ModuleCache,
}

impl MemoryModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, specifier: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.insert(specifier.into(), source.into());
        self
    }

    pub fn with_console(mut self, console: Rc<ConsoleIntercept>) -> Self {
        self.console = console;
        self
    }
}

#[async_trait(?Send)]
impl ModuleLoader for MemoryModuleLoader {
    async fn load(&self, specifier: &str) -> Result<Value> {
        let key = specifier.trim_start_matches("./").to_string();
        let Some(source) = self.sources.get(&key) else {
            return Err(module_error(format!("Cannot find module '{specifier}'")));
        };
        if let Some(module) = self.cache.lookup(&key, specifier)? {
            return Ok(module);
        }
        self.cache
            .evaluate(key.clone(), specifier, source, self, &self.console)
            .await
    }
}
