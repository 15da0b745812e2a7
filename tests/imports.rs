use std::fs;

use indexmap::IndexMap;
use replpad::{
    blocks::Import,
    imports::{FsModuleLoader, MemoryModuleLoader, ModuleLoader, resolve_imports},
    runtime::ExecutionContext,
    value::{Value, ValueKind},
};
use tempfile::tempdir;

fn named(module: &str, export_name: &str) -> Import {
    Import {
        module: module.to_string(),
        named: true,
        export_name: export_name.to_string(),
    }
}

fn namespace(module: &str) -> Import {
    Import {
        module: module.to_string(),
        named: false,
        export_name: "*".to_string(),
    }
}

fn expect_number(value: &Value) -> f64 {
    match value.0.as_ref() {
        ValueKind::Number(n) => *n,
        _ => panic!("expected number, found {}", value.type_of()),
    }
}

#[tokio::test]
async fn missing_named_export_is_reported() {
    let loader = MemoryModuleLoader::new().with_module("mod.js", "export const bar = 1;");
    let mut imports = IndexMap::new();
    imports.insert("foo".to_string(), named("\"mod.js\"", "foo"));

    let results = resolve_imports(&imports, &loader, &ExecutionContext::default()).await;
    assert!(results.errors.contains("foo not found in mod.js"), "{}", results.errors);
    assert!(!results.resolved.contains_key("foo"));
}

#[tokio::test]
async fn failing_imports_do_not_block_siblings() {
    let loader = MemoryModuleLoader::new()
        .with_module("math.js", "export function square(n) { return n * n; }\nexport const two = 2;");
    let mut imports = IndexMap::new();
    imports.insert("square".to_string(), named("'math.js'", "square"));
    imports.insert("gone".to_string(), named("'nowhere.js'", "gone"));
    imports.insert("two".to_string(), named("'math.js'", "two"));

    let context = ExecutionContext::default();
    let results = resolve_imports(&imports, &loader, &context).await;

    assert!(!results.errors.is_empty());
    assert!(results.errors.contains("nowhere.js"), "{}", results.errors);
    assert!(results.resolved.contains_key("square"));
    assert_eq!(expect_number(&results.resolved["two"]), 2.0);
    assert!(context.global("square").is_some());
    assert!(context.global("gone").is_none());
}

#[tokio::test]
async fn errors_are_space_joined_and_trimmed() {
    let loader = MemoryModuleLoader::new().with_module("m.js", "export const a = 1;");
    let mut imports = IndexMap::new();
    imports.insert("x".to_string(), named("'m.js'", "x"));
    imports.insert("y".to_string(), named("'m.js'", "y"));

    let results = resolve_imports(&imports, &loader, &ExecutionContext::default()).await;
    assert_eq!(results.errors, "x not found in m.js y not found in m.js");
}

#[tokio::test]
async fn namespace_imports_bind_the_module() {
    let loader = MemoryModuleLoader::new()
        .with_module("lib.js", "export const answer = 42;\nexport default 'hello';");
    let mut imports = IndexMap::new();
    imports.insert("lib".to_string(), namespace("\"lib.js\""));

    let context = ExecutionContext::default();
    let results = resolve_imports(&imports, &loader, &context).await;
    assert_eq!(results.errors, "");

    let module = context.global("lib").expect("namespace bound");
    let ValueKind::Module(module) = module.0.as_ref() else {
        panic!("expected a module object");
    };
    assert_eq!(expect_number(&module.exports["answer"]), 42.0);
    assert_eq!(module.exports["default"].to_string(), "hello");
}

#[tokio::test]
async fn aliased_imports_look_up_the_exported_name() {
    let loader = MemoryModuleLoader::new().with_module("m.js", "export const original = 5;");
    let mut imports = IndexMap::new();
    imports.insert("renamed".to_string(), named("'m.js'", "original"));

    let context = ExecutionContext::default();
    let results = resolve_imports(&imports, &loader, &context).await;
    assert_eq!(results.errors, "");
    assert_eq!(expect_number(&context.global("renamed").expect("bound")), 5.0);
}

#[tokio::test]
async fn modules_are_cached_between_loads() {
    let loader = MemoryModuleLoader::new().with_module("state.js", "export const items = [];");
    let first = loader.load("state.js").await.expect("load");
    let second = loader.load("./state.js").await.expect("load again");
    assert!(first.ptr_eq(&second));
}

#[tokio::test]
async fn nested_imports_and_cycles() {
    let loader = MemoryModuleLoader::new()
        .with_module("base.js", "export const base = 10;")
        .with_module("derived.js", "import { base } from './base.js';\nexport const derived = base + 1;")
        .with_module("a.js", "import { b } from 'b.js';\nexport const a = 1;")
        .with_module("b.js", "import { a } from 'a.js';\nexport const b = 2;");

    let mut imports = IndexMap::new();
    imports.insert("derived".to_string(), named("'derived.js'", "derived"));
    imports.insert("a".to_string(), named("'a.js'", "a"));

    let results = resolve_imports(&imports, &loader, &ExecutionContext::default()).await;
    assert_eq!(expect_number(&results.resolved["derived"]), 11.0);
    assert!(results.errors.contains("Circular import"), "{}", results.errors);
}

#[tokio::test]
async fn fs_loader_reads_modules_below_its_root() {
    let dir = tempdir().expect("create temp dir");
    fs::write(
        dir.path().join("greet.js"),
        "export function greet(name) { return `hi ${name}`; }",
    )
    .expect("write module");
    fs::write(dir.path().join("broken.js"), "export const = ;").expect("write module");

    let loader = FsModuleLoader::new(dir.path());
    let mut imports = IndexMap::new();
    imports.insert("greet".to_string(), named("'./greet.js'", "greet"));
    imports.insert("oops".to_string(), named("'broken.js'", "oops"));
    imports.insert("absent".to_string(), named("'absent.js'", "absent"));

    let context = ExecutionContext::default();
    let results = resolve_imports(&imports, &loader, &context).await;
    assert!(results.resolved.contains_key("greet"));
    assert!(results.errors.contains("broken.js"), "{}", results.errors);
    assert!(results.errors.contains("Cannot find module 'absent.js'"), "{}", results.errors);
}
