use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn replpad() -> Command {
    Command::cargo_bin("replpad").expect("binary exists")
}

#[test]
fn eval_prints_one_row_per_line() {
    replpad()
        .args(["eval", "let x = 1;\nx + 2;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| 1"))
        .stdout(predicate::str::contains("| 3"));
}

#[test]
fn eval_marks_errors_and_lists_console_output() {
    replpad()
        .args(["eval", "console.log('hey');\nnope;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| ! nope is not defined"))
        .stdout(predicate::str::contains("-- console --"))
        .stdout(predicate::str::contains("[log] hey"));
}

#[test]
fn json_output_contains_rows() {
    replpad()
        .args(["eval", "--json", "let x = 1;\nx + 2;"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""msg": "3""#))
        .stdout(predicate::str::contains(r#""link": "pad.html#"#));
}

#[test]
fn query_options_are_applied() {
    replpad()
        .args(["eval", "--json", "--query", "reevalUndef=false", "undefined;"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""reevalUndef": false"#))
        .stdout(predicate::str::contains(r#""keep": false"#));
}

#[test]
fn link_encodes_a_pad_file() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("pad.js");
    fs::write(&script, "  a").expect("write script");

    replpad()
        .arg("link")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::diff("pad.html#YQ==\n"));

    replpad()
        .arg("link")
        .arg(&script)
        .args(["--base", "https://pad.example/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://pad.example/#YQ=="));
}

#[test]
fn open_evaluates_a_link() {
    let uri = replpad::link::encode("const n = 20;\nn + 1;", "pad.html");
    replpad()
        .args(["open", &uri])
        .assert()
        .success()
        .stdout(predicate::str::contains("| 21"));
}

#[test]
fn open_rejects_garbage() {
    replpad()
        .args(["open", "pad.html#***"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid pad link"));
}

#[test]
fn run_resolves_modules_from_a_directory() {
    let dir = tempdir().expect("create temp dir");
    fs::write(
        dir.path().join("shapes.js"),
        "export function area(w, h) { return w * h; }",
    )
    .expect("write module");
    let script = dir.path().join("pad.js");
    fs::write(&script, "import { area } from './shapes.js';\narea(3, 4);").expect("write script");

    replpad()
        .arg("run")
        .arg(&script)
        .arg("--modules")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("| (imported)"))
        .stdout(predicate::str::contains("| 12"));
}

#[test]
fn missing_script_fails() {
    replpad()
        .args(["run", "definitely-not-here.js"])
        .assert()
        .failure();
}
