use replpad::{EvalMode, Interpreter, ReplError, runtime::await_value};

fn eval(source: &str) -> String {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source, EvalMode::Sync) {
        Ok(value) => value.to_string(),
        Err(err) => panic!("evaluation failed: {err}"),
    }
}

fn eval_err(source: &str) -> ReplError {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source, EvalMode::Sync) {
        Ok(value) => panic!("expected failure, got {value}"),
        Err(err) => err,
    }
}

#[test]
fn closures_capture_their_scope() {
    let source = "
        function counter() {
            let count = 0;
            return () => { count += 1; return count; };
        }
        const next = counter();
        next();
        next();
        next();
    ";
    assert_eq!(eval(source), "3");
}

#[test]
fn loops_and_conditionals() {
    let source = "
        let total = 0;
        for (let i = 0; i < 10; i++) {
            if (i % 2 === 0) { continue; }
            total += i;
        }
        let n = 0;
        while (true) { n++; if (n > 4) { break; } }
        total * 100 + n;
    ";
    assert_eq!(eval(source), "2505");
}

#[test]
fn array_methods_chain() {
    let source = "
        const values = [5, 3, 8, 1];
        values
            .filter(v => v > 2)
            .map(v => v * 2)
            .sort((a, b) => a - b)
            .join('-');
    ";
    assert_eq!(eval(source), "6-10-16");
    assert_eq!(eval("[1, 2, 3, 4].reduce((acc, v) => acc + v, 0);"), "10");
    assert_eq!(eval("[1, [2, [3]]].flat().length;"), "3");
    assert_eq!(eval("[1, 2, 3].at(-1);"), "3");
}

#[test]
fn for_of_and_for_in_iterate() {
    let source = "
        const seen = [];
        for (const v of ['a', 'b']) seen.push(v);
        for (const k in { x: 1, y: 2 }) seen.push(k);
        seen.join('');
    ";
    assert_eq!(eval(source), "abxy");
}

#[test]
fn strings_and_templates() {
    assert_eq!(eval("const who = 'pad'; `hello ${who.toUpperCase()}!`;"), "hello PAD!");
    assert_eq!(eval("'a,b,c'.split(',').reverse().join('');"), "cba");
    assert_eq!(eval("'7'.padStart(3, '0');"), "007");
    assert_eq!(eval("'héllo'.length;"), "5");
}

#[test]
fn json_round_trips_objects() {
    assert_eq!(
        eval("JSON.stringify({ a: [1, 2], b: 'x', c: undefined });"),
        r#"{"a":[1,2],"b":"x"}"#
    );
    assert_eq!(eval("JSON.parse('{\"n\": 4}').n + 1;"), "5");
}

#[test]
fn thrown_values_are_caught() {
    let source = "
        let message;
        try {
            throw new TypeError('bad input');
        } catch (err) {
            message = err.name + ': ' + err.message;
        } finally {
            message += '!';
        }
        message;
    ";
    assert_eq!(eval(source), "TypeError: bad input!");
}

#[test]
fn uncaught_errors_surface_as_error_values() {
    let err = eval_err("undefinedThing + 1;");
    assert_eq!(err.message(), "undefinedThing is not defined");
    assert_eq!(err.into_value().to_string(), "ReferenceError: undefinedThing is not defined");

    let err = eval_err("throw 'plain';");
    assert_eq!(err.into_value().to_string(), "plain");
}

#[test]
fn constants_cannot_be_reassigned() {
    let err = eval_err("const c = 1; c = 2;");
    assert_eq!(err.message(), "Assignment to constant variable.");
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let err = eval_err("const n = 1; n();");
    assert!(err.message().ends_with("is not a function"), "{}", err.message());
    assert!(err.into_value().to_string().starts_with("TypeError"));
}

#[test]
fn runaway_recursion_is_reported() {
    let err = eval_err("function f() { return f(); } f();");
    assert!(err.message().contains("call stack"), "{}", err.message());
}

#[test]
fn await_requires_async_mode() {
    let err = eval_err("await 1;");
    assert!(err.message().contains("await is only valid"), "{}", err.message());

    let mut interpreter = Interpreter::new();
    let promise = interpreter
        .eval_source(
            "async function double(n) { return n * 2; }\nawait double(21);",
            EvalMode::Async,
        )
        .expect("async evaluation");
    let value = await_value(&promise).expect("settled promise");
    assert_eq!(value.to_string(), "42");
}

#[test]
fn promise_chains_settle_eagerly() {
    let mut interpreter = Interpreter::new();
    let promise = interpreter
        .eval_source(
            "Promise.resolve(1).then(v => v + 1).then(v => { throw new Error('at ' + v); }).catch(e => e.message);",
            EvalMode::Sync,
        )
        .expect("evaluation");
    assert_eq!(await_value(&promise).expect("settled").to_string(), "at 2");
}

#[test]
fn math_helpers() {
    assert_eq!(eval("Math.max(1, 7, 3) + Math.round(2.5);"), "10");
    assert_eq!(eval("Math.round(-2.5);"), "-2");
    assert_eq!(eval("(0.1 + 0.2).toFixed(2);"), "0.30");
    assert_eq!(eval("parseInt('42px') + parseFloat('1.5e1');"), "57");
    assert_eq!(eval("isNaN(parseFloat('inf'));"), "true");
}

#[test]
fn deep_recursion_stays_within_the_call_limit() {
    let source = "function f(n) { if (n == 0) { return 0; } return 1 + f(n - 1); }\n";
    assert_eq!(eval(&format!("{source}f(90);")), "90");
    assert_eq!(eval(&format!("{source}f(400);")), "400");

    let err = eval_err(&format!("{source}f(100000);"));
    assert_eq!(err.message(), "Maximum call stack size exceeded");
    assert!(err.into_value().to_string().starts_with("RangeError"));
}

#[test]
fn deeply_nested_expressions_evaluate() {
    let source = format!("{}1{};", "(".repeat(200), ")".repeat(200));
    assert_eq!(eval(&source), "1");
    assert_eq!(eval(&format!("{}1;", "- ".repeat(101))), "-1");
}

#[test]
fn excessive_nesting_is_a_syntax_error() {
    let err = eval_err(&format!("{}1{};", "(".repeat(3000), ")".repeat(3000)));
    assert_eq!(err.message(), "maximum nesting depth exceeded");
    assert!(err.into_value().to_string().starts_with("SyntaxError"));

    let err = eval_err(&format!("{}1;", "!".repeat(3000)));
    assert_eq!(err.message(), "maximum nesting depth exceeded");

    let err = eval_err(&format!("{}1;{}", "{".repeat(3000), "}".repeat(3000)));
    assert_eq!(err.message(), "maximum nesting depth exceeded");
}

#[test]
fn unterminated_block_comments_are_reported() {
    let err = eval_err("1 + 1; /* never closed");
    assert_eq!(err.message(), "Unterminated comment");
}

#[test]
fn byte_order_mark_is_whitespace() {
    assert_eq!(eval("\u{feff}let a = 2;\na * 3;"), "6");
}
