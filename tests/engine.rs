use replpad::{
    blocks::{BlockKind, ExecutionBlock, parse},
    config::ReplOptions,
    execute::{ExecutionResult, ExecutionState, execute},
    runtime::ExecutionContext,
    text::LineSpan,
};

fn block(statement: &str) -> ExecutionBlock {
    ExecutionBlock {
        statement: statement.to_string(),
        span: LineSpan::new(0, 1),
        cumulative: true,
        wrap_async: false,
        kind: BlockKind::Run,
        imports: None,
        diagnostic: None,
    }
}

async fn run(statement: &str, opts: &ReplOptions) -> ExecutionResult {
    execute(&block(statement), &ExecutionContext::default(), "", opts).await
}

#[tokio::test]
async fn declaration_then_expression_accumulates() {
    let opts = ReplOptions::default();
    let parsed = parse("let x = 1;\nx + 2;", &opts);
    let context = ExecutionContext::default();

    let first = execute(&parsed.blocks[0], &context, "", &opts).await;
    assert_eq!(first.msg, "1");
    assert_eq!(first.state, ExecutionState::Normal);
    assert!(first.keep);

    let prepend = format!("{};", parsed.blocks[0].statement);
    assert_eq!(prepend, "let x = 1;;x;");
    let second = execute(&parsed.blocks[1], &context, &prepend, &opts).await;
    assert_eq!(second.msg, "3");
    assert!(second.keep);
}

#[tokio::test]
async fn undefined_results_follow_reeval_undef() {
    let dropping = ReplOptions {
        reeval_undef: false,
        ..ReplOptions::default()
    };
    let result = run("undefined;", &dropping).await;
    assert_eq!(result.msg, "undefined");
    assert_eq!(result.state, ExecutionState::Info);
    assert!(!result.keep);

    let keeping = run("undefined;", &ReplOptions::default()).await;
    assert!(keeping.keep);
}

#[tokio::test]
async fn thrown_errors_show_their_message() {
    let result = run("throw new Error('boom');", &ReplOptions::default()).await;
    assert_eq!(result.state, ExecutionState::Error);
    assert!(!result.keep);
    assert_eq!(result.msg, "boom");
    assert_eq!(result.details, "Error: boom");
}

#[tokio::test]
async fn non_error_throws_are_stringified() {
    let result = run("throw 'plain';", &ReplOptions::default()).await;
    assert_eq!(result.state, ExecutionState::Error);
    assert!(!result.keep);
    assert_eq!(result.msg, "plain");
    assert_eq!(result.details, "plain");
}

#[tokio::test]
async fn runtime_diagnostics_are_errors() {
    let result = run("missing + 1;", &ReplOptions::default()).await;
    assert_eq!(result.state, ExecutionState::Error);
    assert!(!result.keep);
    assert_eq!(result.msg, "missing is not defined");
    assert_eq!(result.details, "ReferenceError: missing is not defined");

    let syntax = run("1 +;", &ReplOptions::default()).await;
    assert_eq!(syntax.state, ExecutionState::Error);
    assert!(!syntax.keep);
}

#[tokio::test]
async fn values_are_formatted_by_type() {
    let opts = ReplOptions::default();

    let number = run("0.1 + 0.2;", &opts).await;
    assert_eq!(number.msg, "0.30000000000000004");

    let string = run("'two\\nlines\\nhere';", &opts).await;
    assert_eq!(string.msg, "\"two\\nlines\\nhere\"");
    assert_eq!(string.details, "two\nlines\nhere");

    let object = run("({ a: 1, b: [true, null, 'x'] });", &opts).await;
    assert_eq!(object.msg, r#"{"a":1,"b":[true,null,"x"]}"#);
    assert_eq!(object.details, "[object Object]");

    let array = run("[1, 2, 3];", &opts).await;
    assert_eq!(array.msg, "[1,2,3]");
    assert_eq!(array.details, "1,2,3");

    let null = run("null;", &opts).await;
    assert_eq!((null.msg.as_str(), null.state), ("null", ExecutionState::Info));

    let boolean = run("1 < 2;", &opts).await;
    assert_eq!(boolean.msg, "true [boolean]");
    assert_eq!(boolean.state, ExecutionState::Normal);
}

#[tokio::test]
async fn functions_show_their_source_in_details() {
    let result = run("(function add(a, b) { return a + b; });", &ReplOptions::default()).await;
    assert_eq!(result.msg, "fn()");
    assert_eq!(result.state, ExecutionState::Info);
    assert_eq!(result.details, "function add(a, b) { return a + b; }");
}

#[tokio::test]
async fn circular_structures_fail_to_format() {
    let result = run("const o = {}; o.self = o; o", &ReplOptions::default()).await;
    assert_eq!(result.state, ExecutionState::Error);
    assert_eq!(result.msg, "Converting circular structure to JSON");
}

#[tokio::test]
async fn promises_are_awaited() {
    let opts = ReplOptions::default();
    let fulfilled = run("Promise.resolve(7);", &opts).await;
    assert_eq!(fulfilled.msg, "7");

    let rejected = run("Promise.reject(new TypeError('nope'));", &opts).await;
    assert_eq!(rejected.state, ExecutionState::Error);
    assert_eq!(rejected.msg, "nope");
    assert_eq!(rejected.details, "TypeError: nope");
}

#[tokio::test]
async fn wrapped_evaluation_allows_top_level_await() {
    let opts = ReplOptions {
        wrap_async: true,
        ..ReplOptions::default()
    };
    let context = ExecutionContext::default();
    let prepend = "async function twice(n) { return n * 2; };";
    let result = execute(&block("await twice(21);"), &context, prepend, &opts).await;
    assert_eq!(result.msg, "42");

    let unwrapped = run("await 1;", &ReplOptions::default()).await;
    assert_eq!(unwrapped.state, ExecutionState::Error);
}

#[tokio::test]
async fn failures_never_keep() {
    let opts = ReplOptions::default();
    for source in ["throw 1;", "null.x;", "const c = 1; c = 2;", "undefinedFn();", "throw {};"] {
        let result = run(source, &opts).await;
        assert_eq!(result.state, ExecutionState::Error, "{source}");
        assert!(!result.keep, "{source}");
    }
}
