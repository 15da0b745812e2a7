use std::{fs, path::Path};

use replpad::{PadConfig, ReplOptions, link};
use tempfile::tempdir;

#[test]
fn options_default_to_reevaluating_undefined() {
    let options = ReplOptions::default();
    assert!(!options.reeval_console);
    assert!(options.reeval_undef);
    assert!(!options.wrap_async);
}

#[test]
fn toml_accepts_camel_case_and_snake_case_keys() {
    let config = PadConfig::from_toml_str(
        r#"
[options]
reevalConsole = true
reeval_undef = false

[session]
module_root = "lib"
base_uri = "https://pad.example/"
column_width = 24
"#,
    )
    .expect("valid config");

    assert!(config.options.reeval_console);
    assert!(!config.options.reeval_undef);
    assert_eq!(config.session.module_root.as_deref(), Some(Path::new("lib")));
    assert_eq!(config.session.base_uri, "https://pad.example/");
    assert_eq!(config.session.column_width, 24);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = PadConfig::from_toml_str("").expect("empty config");
    assert_eq!(config, PadConfig::default());
    assert_eq!(config.session.base_uri, "pad.html");
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = PadConfig::from_toml_str("[options\nreevalConsole = ").expect_err("invalid toml");
    assert!(err.to_string().contains("config"), "{err}");
}

#[test]
fn explicit_config_path_is_loaded() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("pad.toml");
    fs::write(&path, "[options]\nreevalConsole = true\n").expect("write config");

    let config = PadConfig::discover(Some(&path)).expect("load config");
    assert!(config.options.reeval_console);
}

#[test]
fn query_strings_toggle_options() {
    let mut options = ReplOptions::default();
    options.apply_query("?reevalConsole=true&reevalUndef=0");
    assert!(options.reeval_console);
    assert!(!options.reeval_undef);

    options.apply_query("reeval_undef=yes&reevalConsole=maybe&unknown=1");
    assert!(options.reeval_undef);
    assert!(options.reeval_console);

    options.apply_query("reevalConsole");
    assert!(options.reeval_console);
}

#[test]
fn dedent_removes_common_indentation() {
    assert_eq!(link::dedent("    a\n      b\n\n    c"), "a\n  b\n\nc");
    assert_eq!(link::dedent("a\n  b"), "a\n  b");
}

#[test]
fn links_carry_the_dedented_source() {
    assert_eq!(link::encode("  a", "pad.html"), "pad.html#YQ==");
    assert_eq!(link::encode("  a", "pad.html#"), "pad.html#YQ==");
}

#[test]
fn links_decode_back_to_the_source() {
    let source = "const greeting = 'héllo';\nconsole.log(greeting);";
    let encoded = link::encode(source, "https://pad.example/");
    assert_eq!(link::decode(&encoded).expect("decode link"), source);
    assert_eq!(link::decode("YQ==").expect("decode fragment"), "a");
}

#[test]
fn invalid_links_are_rejected() {
    let err = link::decode("pad.html#not base64!").expect_err("invalid link");
    assert!(err.to_string().contains("invalid pad link"), "{err}");
}
