use replpad::{
    blocks::{BlockKind, parse, parse_with},
    config::ReplOptions,
    statements::{StatementKind, StatementProvider, TopLevelStatement},
};

fn options() -> ReplOptions {
    ReplOptions::default()
}

#[test]
fn empty_source_yields_no_blocks() {
    assert!(parse("", &options()).blocks.is_empty());
    assert!(parse("\n\n  // just a comment\n", &options()).blocks.is_empty());
}

#[test]
fn declarations_append_their_names() {
    let parsed = parse("let x = 1;\nx + 2;", &options());
    assert_eq!(parsed.blocks.len(), 2);

    let first = &parsed.blocks[0];
    assert_eq!(first.statement, "let x = 1;;x");
    assert!(first.cumulative);
    assert_eq!(first.kind, BlockKind::Run);
    assert_eq!((first.span.start, first.span.end), (0, 1));

    let second = &parsed.blocks[1];
    assert_eq!(second.statement, "x + 2;");
    assert_eq!((second.span.start, second.span.end), (1, 2));
}

#[test]
fn every_declared_name_is_appended() {
    let parsed = parse("const a = 1, b = 2, c = a + b;", &options());
    assert_eq!(parsed.blocks[0].statement, "const a = 1, b = 2, c = a + b;;a;b;c");
}

#[test]
fn console_statements_are_not_cumulative_by_default() {
    let parsed = parse("console.log(1);", &options());
    assert_eq!(parsed.blocks.len(), 1);
    assert!(!parsed.blocks[0].cumulative);

    let opts = ReplOptions {
        reeval_console: true,
        ..ReplOptions::default()
    };
    assert!(parse("console.log(1);", &opts).blocks[0].cumulative);
}

#[test]
fn async_constructs_request_wrapping() {
    let parsed = parse(
        "async function f() { return 1; }\nfunction g() { return 2; }\nawait f();\nfor await (const x of [1]) { x; }",
        &options(),
    );
    let flags: Vec<bool> = parsed.blocks.iter().map(|block| block.wrap_async).collect();
    assert_eq!(flags, [true, false, true, true]);
}

#[test]
fn await_inside_nested_functions_does_not_wrap() {
    let parsed = parse("const f = async () => await 1;", &options());
    assert!(!parsed.blocks[0].wrap_async);
}

#[test]
fn named_and_namespace_imports_become_import_blocks() {
    let parsed = parse(
        "import { a, b as c } from 'm.js';\nimport * as ns from \"n.js\";",
        &options(),
    );
    assert_eq!(parsed.blocks.len(), 2);

    let named = &parsed.blocks[0];
    assert_eq!(named.kind, BlockKind::Import);
    let imports = named.imports.as_ref().expect("named imports");
    let keys: Vec<_> = imports.keys().cloned().collect();
    assert_eq!(keys, ["a", "c"]);
    assert!(imports["a"].named);
    assert_eq!(imports["a"].module, "'m.js'");
    assert_eq!(imports["c"].export_name, "b");

    let namespace = parsed.blocks[1].imports.as_ref().expect("namespace import");
    assert!(!namespace["ns"].named);
    assert_eq!(namespace["ns"].module, "\"n.js\"");
}

#[test]
fn other_import_forms_are_dropped() {
    let parsed = parse("import def from 'm.js';\nimport 'side.js';\n1;", &options());
    assert_eq!(parsed.blocks.len(), 1);
    assert_eq!(parsed.blocks[0].statement, "1;");
}

#[test]
fn broken_statements_become_skip_blocks() {
    let parsed = parse("let = ;\n1 + 1;", &options());
    assert_eq!(parsed.blocks.len(), 2);
    let broken = &parsed.blocks[0];
    assert_eq!(broken.kind, BlockKind::Skip);
    assert!(!broken.cumulative);
    assert!(broken.diagnostic.is_some());
    assert_eq!(parsed.blocks[1].kind, BlockKind::Run);
    assert_eq!(parsed.blocks[1].statement, "1 + 1;");
}

#[test]
fn parsing_is_idempotent() {
    let source = "let a = [1, 2];\nconst f = (x) => x * 2;\nimport {q} from 'q.js';\nconsole.log(a.map(f));\nif (a) {\n  a.push(3);\n}";
    assert_eq!(parse(source, &options()), parse(source, &options()));
}

struct LineStatements;

impl StatementProvider for LineStatements {
    fn statements(&self, source: &str) -> Vec<TopLevelStatement> {
        let mut offset = 0;
        let mut statements = Vec::new();
        for line in source.split('\n') {
            if let Some(name) = line.strip_prefix("def ") {
                statements.push(TopLevelStatement {
                    text: line.to_string(),
                    start: offset,
                    end: offset + line.len(),
                    kind: StatementKind::Variable {
                        names: vec![name.to_string()],
                    },
                    awaits: false,
                });
            } else if !line.is_empty() {
                statements.push(TopLevelStatement {
                    text: line.to_string(),
                    start: offset,
                    end: offset + line.len(),
                    kind: StatementKind::Expression,
                    awaits: false,
                });
            }
            offset += line.len() + 1;
        }
        statements
    }
}

#[test]
fn any_statement_provider_can_drive_the_parser() {
    let parsed = parse_with(&LineStatements, "def x\n\nprint x", &options());
    assert_eq!(parsed.blocks.len(), 2);
    assert_eq!(parsed.blocks[0].statement, "def x;x");
    assert_eq!(parsed.blocks[1].span.start, 2);
}

#[test]
fn unterminated_comment_becomes_a_skip_block() {
    let parsed = parse("let a = 1;\n/* open", &options());
    assert_eq!(parsed.blocks.len(), 2);
    assert_eq!(parsed.blocks[0].kind, BlockKind::Run);
    assert_eq!(parsed.blocks[1].kind, BlockKind::Skip);
    assert_eq!(parsed.blocks[1].diagnostic.as_deref(), Some("Unterminated comment"));
    assert_eq!(parsed.blocks[1].span.start, 1);
}

#[test]
fn leading_byte_order_mark_is_ignored() {
    let parsed = parse("\u{feff}let a = 1;\na;", &options());
    assert_eq!(parsed.blocks.len(), 2);
    assert!(parsed.blocks.iter().all(|block| block.kind == BlockKind::Run));
    assert_eq!(parsed.blocks[0].statement, "let a = 1;;a");
}
