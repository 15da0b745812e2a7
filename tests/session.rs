use std::rc::Rc;

use replpad::{
    ConsoleMessage, ExecutionState, MemoryModuleLoader, MessageType, PassOutcome, PassReport,
    ReplOptions, Session,
};

async fn completed(session: &Session, source: &str) -> PassReport {
    match session.run_pass(source).await {
        PassOutcome::Completed(report) => report,
        PassOutcome::Superseded { epoch } => panic!("pass {epoch} was superseded"),
    }
}

#[tokio::test]
async fn rows_follow_source_lines() {
    let session = Session::default();
    let report = completed(&session, "let a = 1;\n\na + 1;").await;

    let messages: Vec<&str> = report.rows.iter().map(|row| row.result.msg.as_str()).collect();
    assert_eq!(messages, ["1", "", "2"]);
    assert_eq!(report.rows[1].source, "");
    assert_eq!(report.rows[2].line, 2);
    assert!(!report.has_errors());
}

#[tokio::test]
async fn multi_line_blocks_report_on_their_first_line() {
    let session = Session::default();
    let report = completed(&session, "const point = {\n  x: 1,\n  y: 2\n};\npoint.x + point.y;").await;

    assert_eq!(report.rows.len(), 5);
    assert_eq!(report.rows[0].result.msg, r#"{"x":1,"y":2}"#);
    assert_eq!(report.rows[1].result.msg, "");
    assert_eq!(report.rows[4].result.msg, "3");
}

#[tokio::test]
async fn errors_do_not_stop_later_blocks() {
    let session = Session::default();
    let report = completed(&session, "let x = 1;\nmissing + 1;\nx + 1;").await;

    assert_eq!(report.results.len(), 3);
    assert!(report.results[1].is_error());
    assert_eq!(report.results[1].msg, "missing is not defined");
    assert_eq!(report.results[2].msg, "2");
    assert!(report.has_errors());
}

#[tokio::test]
async fn syntax_errors_become_error_rows() {
    let session = Session::default();
    let report = completed(&session, "let = ;\n1 + 1;").await;

    assert_eq!(report.results[0].state, ExecutionState::Error);
    assert!(report.results[0].details.starts_with("SyntaxError: "));
    assert_eq!(report.results[1].msg, "2");
}

#[tokio::test]
async fn console_output_is_collected_per_pass() {
    let session = Session::default();
    let report = completed(&session, "console.log('hi', 1);").await;
    assert_eq!(
        report.console,
        [ConsoleMessage {
            kind: MessageType::Log,
            text: "hi 1".to_string(),
        }]
    );

    let report = completed(&session, "1;").await;
    assert!(report.console.is_empty());
}

#[tokio::test]
async fn console_statements_run_once_unless_folded() {
    let source = "console.log('a');\n1;\n2;";

    let report = completed(&Session::default(), source).await;
    assert_eq!(report.console.len(), 1);

    let options = ReplOptions {
        reeval_console: true,
        ..ReplOptions::default()
    };
    let report = completed(&Session::new(options), source).await;
    assert_eq!(report.console.len(), 3);
}

#[tokio::test]
async fn top_level_await_runs_the_pass_asynchronously() {
    let session = Session::default();
    let report = completed(&session, "async function f() { return 5; }\nawait f();").await;

    assert!(report.options.wrap_async);
    assert_eq!(report.rows[1].result.msg, "5");
}

#[tokio::test]
async fn import_rows_show_the_outcome() {
    let loader = MemoryModuleLoader::new().with_module("util.js", "export const two = 2;");
    let session = Session::default().with_loader(Rc::new(loader));
    let report = completed(
        &session,
        "import { two } from 'util.js';\nimport { three } from 'util.js';\ntwo * 2;",
    )
    .await;

    assert_eq!(report.rows[0].result.msg, "(imported)");
    assert_eq!(report.rows[0].result.state, ExecutionState::Info);
    assert_eq!(report.rows[1].result.msg, "three not found in util.js");
    assert!(report.rows[1].result.is_error());
    assert_eq!(report.rows[2].result.msg, "4");
}

#[tokio::test]
async fn a_newer_pass_supersedes_a_running_one() {
    let session = Session::default();
    let (first, second) = tokio::join!(session.run_pass("1 + 1;"), session.run_pass("2 + 2;"));

    let outcomes = [first, second];
    let superseded = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, PassOutcome::Superseded { .. }))
        .count();
    assert_eq!(superseded, 1);

    let completed = outcomes
        .iter()
        .find_map(|outcome| match outcome {
            PassOutcome::Completed(report) => Some(report),
            PassOutcome::Superseded { .. } => None,
        })
        .expect("one pass completes");
    assert_eq!(completed.epoch, 2);
    assert_eq!(completed.results[0].msg, "4");
    assert_eq!(session.epoch(), 2);
    assert_eq!(session.last_report().map(|report| report.epoch), Some(2));
}

#[tokio::test]
async fn rendered_table_marks_errors() {
    let session = Session::default();
    let report = completed(&session, "1;\nnope;").await;
    let table = report.render_table(6);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines, ["1;     | 1", "nope;  | ! nope is not defined"]);
}

#[tokio::test]
async fn reports_carry_a_link() {
    let session = Session::default().with_base_uri("https://pad.example/");
    let report = completed(&session, "a").await;
    assert_eq!(report.link, "https://pad.example/#YQ==");
}

#[tokio::test]
async fn an_error_keeps_its_row_when_blocks_share_a_line() {
    let session = Session::default();
    let report = completed(&session, "missing(); 2").await;

    assert_eq!(report.blocks.len(), 2);
    assert_eq!(report.results[1].msg, "2");
    assert_eq!(report.rows.len(), 1);
    assert!(report.rows[0].result.is_error());
    assert_eq!(report.rows[0].result.msg, "missing is not defined");

    let report = completed(&session, "1; 2").await;
    assert_eq!(report.rows[0].result.msg, "2");
}

#[tokio::test]
async fn deep_recursion_and_nesting_become_rows() {
    let session = Session::default();
    let report = completed(
        &session,
        "function f(n) { if (n == 0) { return 0; } return 1 + f(n - 1); }\nf(90)\nfunction g() { return g(); }\ng();",
    )
    .await;
    assert_eq!(report.rows[1].result.msg, "90");
    assert_eq!(report.rows[3].result.msg, "Maximum call stack size exceeded");
    assert!(report.rows[3].result.is_error());

    let nested = format!("{}1{};\n2;", "(".repeat(3000), ")".repeat(3000));
    let report = completed(&session, &nested).await;
    assert!(report.rows[0].result.is_error());
    assert_eq!(report.rows[1].result.msg, "2");
}

#[tokio::test]
async fn unterminated_comments_are_error_rows() {
    let session = Session::default();
    let report = completed(&session, "1;\n/* still open").await;

    assert_eq!(report.rows[0].result.msg, "1");
    assert!(report.rows[1].result.is_error());
    assert_eq!(report.rows[1].result.msg, "Unterminated comment");
}

#[tokio::test]
async fn overlapping_passes_keep_their_console_output_apart() {
    let session = Session::default();
    let (first, second) = tokio::join!(
        session.run_pass("1;\nconsole.log('first');\n2;"),
        session.run_pass("console.log('second');\n3;"),
    );
    assert!(matches!(first, PassOutcome::Superseded { epoch: 1 }));
    let PassOutcome::Completed(report) = second else {
        panic!("newest pass completes");
    };
    assert_eq!(
        report.console,
        [ConsoleMessage {
            kind: MessageType::Log,
            text: "second".to_string(),
        }]
    );
}

#[tokio::test]
async fn session_console_sees_every_pass() {
    use replpad::Transcript;

    let session = Session::default();
    let transcript = Transcript::new();
    session.console().add_listener(transcript.clone());

    completed(&session, "console.info('one');").await;
    completed(&session, "console.warn('two');").await;

    let kinds: Vec<MessageType> = transcript.messages().iter().map(|m| m.kind).collect();
    assert_eq!(kinds, [MessageType::Info, MessageType::Warn]);
}
