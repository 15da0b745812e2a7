use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    console::MessageType,
    diagnostics::{Diagnostic, DiagnosticKind, ReplError, Result, SourceSpan},
    environment::EnvironmentRef,
    runtime::{Interpreter, await_value, promise_from, property_key, property_keys},
    value::{NativeCallback, NativeFunction, PromiseState, Value, ValueKind, number_to_string},
};

pub fn install(env: &EnvironmentRef) {
    let mut console = IndexMap::new();
    console.insert("log".into(), native("log", 0, console_log));
    console.insert("info".into(), native("info", 0, console_info));
    console.insert("warn".into(), native("warn", 0, console_warn));
    console.insert("error".into(), native("error", 0, console_error));
    console.insert("debug".into(), native("debug", 0, console_debug));
    console.insert("dir".into(), native("dir", 0, console_dir));
    console.insert("table".into(), native("table", 0, console_table));
    console.insert("trace".into(), native("trace", 0, console_trace));

    let mut math = IndexMap::new();
    math.insert("PI".into(), Value::number(std::f64::consts::PI));
    math.insert("E".into(), Value::number(std::f64::consts::E));
    math.insert("abs".into(), native("abs", 1, math_abs));
    math.insert("floor".into(), native("floor", 1, math_floor));
    math.insert("ceil".into(), native("ceil", 1, math_ceil));
    math.insert("round".into(), native("round", 1, math_round));
    math.insert("trunc".into(), native("trunc", 1, math_trunc));
    math.insert("sign".into(), native("sign", 1, math_sign));
    math.insert("sqrt".into(), native("sqrt", 1, math_sqrt));
    math.insert("pow".into(), native("pow", 2, math_pow));
    math.insert("log".into(), native("log", 1, math_log));
    math.insert("exp".into(), native("exp", 1, math_exp));
    math.insert("sin".into(), native("sin", 1, math_sin));
    math.insert("cos".into(), native("cos", 1, math_cos));
    math.insert("min".into(), native("min", 2, math_min));
    math.insert("max".into(), native("max", 2, math_max));
    math.insert("random".into(), native("random", 0, math_random));

    let mut json = IndexMap::new();
    json.insert("stringify".into(), native("stringify", 3, json_stringify));
    json.insert("parse".into(), native("parse", 1, json_parse));

    let mut array = IndexMap::new();
    array.insert("isArray".into(), native("isArray", 1, array_is_array));
    array.insert("of".into(), native("of", 0, array_of));
    array.insert("from".into(), native("from", 1, array_from));

    let mut object = IndexMap::new();
    object.insert("keys".into(), native("keys", 1, object_keys));
    object.insert("values".into(), native("values", 1, object_values));
    object.insert("entries".into(), native("entries", 1, object_entries));
    object.insert("assign".into(), native("assign", 2, object_assign));

    let mut scope = env.borrow_mut();
    scope.define("console".into(), Value::object(console), true);
    scope.define("Math".into(), Value::object(math), true);
    scope.define("JSON".into(), Value::object(json), true);
    scope.define("Array".into(), Value::object(array), true);
    scope.define("Object".into(), Value::object(object), true);
    scope.define("Promise".into(), constructor("Promise", 1, promise_new), true);
    scope.define("Error".into(), constructor("Error", 1, error_ctor), true);
    scope.define("TypeError".into(), constructor("TypeError", 1, type_error_ctor), true);
    scope.define("RangeError".into(), constructor("RangeError", 1, range_error_ctor), true);
    scope.define(
        "ReferenceError".into(),
        constructor("ReferenceError", 1, reference_error_ctor),
        true,
    );
    scope.define(
        "SyntaxError".into(),
        constructor("SyntaxError", 1, syntax_error_ctor),
        true,
    );
    scope.define("String".into(), native("String", 1, to_string_fn), true);
    scope.define("Number".into(), native("Number", 1, to_number_fn), true);
    scope.define("Boolean".into(), native("Boolean", 1, to_boolean_fn), true);
    scope.define("parseInt".into(), native("parseInt", 2, parse_int), true);
    scope.define("parseFloat".into(), native("parseFloat", 1, parse_float), true);
    scope.define("isNaN".into(), native("isNaN", 1, is_nan), true);
    scope.define("isFinite".into(), native("isFinite", 1, is_finite), true);
    scope.define("NaN".into(), Value::number(f64::NAN), false);
    scope.define("Infinity".into(), Value::number(f64::INFINITY), false);
    scope.define("undefined".into(), Value::undefined(), false);
}

fn native(name: &'static str, arity: usize, callback: NativeCallback) -> Value {
    Value::native(name, arity, callback)
}

fn constructor(name: &'static str, arity: usize, callback: NativeCallback) -> Value {
    Value::new(ValueKind::NativeFunction(NativeFunction {
        name,
        arity,
        callback,
        this: None,
        constructor: true,
    }))
}

fn bound(name: &'static str, arity: usize, callback: NativeCallback, this: &Value) -> Value {
    Value::new(ValueKind::NativeFunction(NativeFunction {
        name,
        arity,
        callback,
        this: Some(this.clone()),
        constructor: false,
    }))
}

/// Built-in method or static member `key` of `value`, bound to `value`.
pub(crate) fn method(value: &Value, key: &str) -> Option<Value> {
    let (name, arity, callback): (&'static str, usize, NativeCallback) = match &*value.0 {
        ValueKind::Array(_) => array_method(key)?,
        ValueKind::String(_) => string_method(key)?,
        ValueKind::Number(_) => match key {
            "toFixed" => ("toFixed", 1, number_to_fixed),
            "toString" => ("toString", 1, number_to_string_method),
            _ => return None,
        },
        ValueKind::Promise(_) => match key {
            "then" => ("then", 2, promise_then),
            "catch" => ("catch", 1, promise_catch),
            "finally" => ("finally", 1, promise_finally),
            _ => return None,
        },
        ValueKind::Object(_) => match key {
            "hasOwnProperty" => ("hasOwnProperty", 1, object_has_own),
            "toString" => ("toString", 0, to_string_method),
            _ => return None,
        },
        ValueKind::NativeFunction(native) => return statics(native.name, key),
        _ => match key {
            "toString" => ("toString", 0, to_string_method),
            _ => return None,
        },
    };
    Some(bound(name, arity, callback, value))
}

fn statics(owner: &str, key: &str) -> Option<Value> {
    let member = match (owner, key) {
        ("Promise", "resolve") => native("resolve", 1, promise_resolve_static),
        ("Promise", "reject") => native("reject", 1, promise_reject_static),
        ("Promise", "all") => native("all", 1, promise_all),
        ("Number", "isInteger") => native("isInteger", 1, number_is_integer),
        ("Number", "isFinite") => native("isFinite", 1, is_finite),
        ("Number", "isNaN") => native("isNaN", 1, is_nan),
        ("Number", "parseFloat") => native("parseFloat", 1, parse_float),
        ("Number", "parseInt") => native("parseInt", 2, parse_int),
        ("Number", "MAX_SAFE_INTEGER") => Value::number(9_007_199_254_740_991.0),
        ("Number", "EPSILON") => Value::number(f64::EPSILON),
        _ => return None,
    };
    Some(member)
}

fn array_method(key: &str) -> Option<(&'static str, usize, NativeCallback)> {
    let entry: (&'static str, usize, NativeCallback) = match key {
        "push" => ("push", 1, array_push),
        "pop" => ("pop", 0, array_pop),
        "shift" => ("shift", 0, array_shift),
        "unshift" => ("unshift", 1, array_unshift),
        "slice" => ("slice", 2, array_slice),
        "splice" => ("splice", 2, array_splice),
        "concat" => ("concat", 1, array_concat),
        "join" => ("join", 1, array_join),
        "indexOf" => ("indexOf", 1, array_index_of),
        "includes" => ("includes", 1, array_includes),
        "reverse" => ("reverse", 0, array_reverse),
        "at" => ("at", 1, array_at),
        "flat" => ("flat", 0, array_flat),
        "map" => ("map", 1, array_map),
        "filter" => ("filter", 1, array_filter),
        "forEach" => ("forEach", 1, array_for_each),
        "find" => ("find", 1, array_find),
        "findIndex" => ("findIndex", 1, array_find_index),
        "some" => ("some", 1, array_some),
        "every" => ("every", 1, array_every),
        "reduce" => ("reduce", 1, array_reduce),
        "sort" => ("sort", 1, array_sort),
        "toString" => ("toString", 0, to_string_method),
        _ => return None,
    };
    Some(entry)
}

fn string_method(key: &str) -> Option<(&'static str, usize, NativeCallback)> {
    let entry: (&'static str, usize, NativeCallback) = match key {
        "toUpperCase" => ("toUpperCase", 0, string_to_upper),
        "toLowerCase" => ("toLowerCase", 0, string_to_lower),
        "trim" => ("trim", 0, string_trim),
        "trimStart" => ("trimStart", 0, string_trim_start),
        "trimEnd" => ("trimEnd", 0, string_trim_end),
        "split" => ("split", 1, string_split),
        "includes" => ("includes", 1, string_includes),
        "startsWith" => ("startsWith", 1, string_starts_with),
        "endsWith" => ("endsWith", 1, string_ends_with),
        "indexOf" => ("indexOf", 1, string_index_of),
        "slice" => ("slice", 2, string_slice),
        "substring" => ("substring", 2, string_substring),
        "replace" => ("replace", 2, string_replace),
        "replaceAll" => ("replaceAll", 2, string_replace_all),
        "repeat" => ("repeat", 1, string_repeat),
        "padStart" => ("padStart", 2, string_pad_start),
        "padEnd" => ("padEnd", 2, string_pad_end),
        "charAt" => ("charAt", 1, string_char_at),
        "charCodeAt" => ("charCodeAt", 1, string_char_code_at),
        "at" => ("at", 1, string_at),
        "concat" => ("concat", 1, string_concat),
        "toString" => ("toString", 0, to_string_method),
        _ => return None,
    };
    Some(entry)
}

fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).cloned().unwrap_or_else(Value::undefined)
}

fn type_error(message: impl Into<String>) -> ReplError {
    ReplError::from(Diagnostic::new(DiagnosticKind::Type, message))
}

fn this_array(this: &Value) -> Result<&std::cell::RefCell<Vec<Value>>> {
    match &*this.0 {
        ValueKind::Array(items) => Ok(items),
        _ => Err(type_error("receiver is not an array")),
    }
}

fn this_string(this: &Value) -> Result<&str> {
    this.as_str()
        .ok_or_else(|| type_error("receiver is not a string"))
}

fn this_number(this: &Value) -> Result<f64> {
    this.as_number()
        .ok_or_else(|| type_error("receiver is not a number"))
}

fn callback_arg(args: &[Value], method: &str) -> Result<Value> {
    let callback = arg(args, 0);
    if callback.is_callable() {
        Ok(callback)
    } else {
        Err(type_error(format!("{callback} is not a function (in {method})")))
    }
}

/// Resolves a relative index argument the way `slice` does.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn emit(interpreter: &mut Interpreter, kind: MessageType, args: &[Value]) -> Result<Value> {
    interpreter.context().console.emit(kind, args);
    Ok(Value::undefined())
}

fn console_log(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Log, args)
}

fn console_info(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Info, args)
}

fn console_warn(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Warn, args)
}

fn console_error(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Error, args)
}

fn console_debug(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Debug, args)
}

fn console_dir(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Dir, &args[..args.len().min(1)])
}

fn console_table(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Table, &args[..args.len().min(1)])
}

fn console_trace(interpreter: &mut Interpreter, _this: &Value, args: &[Value]) -> Result<Value> {
    emit(interpreter, MessageType::Trace, args)
}

fn unary_math(args: &[Value], op: fn(f64) -> f64) -> Result<Value> {
    Ok(Value::number(op(arg(args, 0).to_number())))
}

fn math_abs(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::abs)
}

fn math_floor(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::floor)
}

fn math_ceil(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::ceil)
}

fn math_round(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    // Halves round towards +Infinity.
    unary_math(args, |n| (n + 0.5).floor())
}

fn math_trunc(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::trunc)
}

fn math_sign(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, |n| if n == 0.0 || n.is_nan() { n } else { n.signum() })
}

fn math_sqrt(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::sqrt)
}

fn math_log(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::ln)
}

fn math_exp(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::exp)
}

fn math_sin(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::sin)
}

fn math_cos(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    unary_math(args, f64::cos)
}

fn math_pow(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(
        arg(args, 0).to_number().powf(arg(args, 1).to_number()),
    ))
}

fn math_min(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let mut result = f64::INFINITY;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return Ok(Value::number(f64::NAN));
        }
        result = result.min(n);
    }
    Ok(Value::number(result))
}

fn math_max(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let mut result = f64::NEG_INFINITY;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return Ok(Value::number(f64::NAN));
        }
        result = result.max(n);
    }
    Ok(Value::number(result))
}

fn math_random(_: &mut Interpreter, _: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::number(rand::random::<f64>()))
}

/// `JSON.stringify` text of `value`, or `None` when it has no JSON form.
pub(crate) fn json_text(value: &Value, indent: usize) -> Result<Option<String>> {
    let Some(json) = value.to_json()? else {
        return Ok(None);
    };
    if indent == 0 {
        return Ok(Some(json.to_string()));
    }
    let pad = " ".repeat(indent.min(10));
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    json.serialize(&mut serializer)
        .map_err(|err| type_error(err.to_string()))?;
    Ok(Some(String::from_utf8_lossy(&out).into_owned()))
}

fn json_stringify(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let indent = match &*arg(args, 2).0 {
        ValueKind::Number(n) if *n > 0.0 => *n as usize,
        _ => 0,
    };
    Ok(json_text(&arg(args, 0), indent)?
        .map(Value::string)
        .unwrap_or_else(Value::undefined))
}

fn json_parse(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let text = arg(args, 0).to_string();
    let json: JsonValue = serde_json::from_str(&text).map_err(|err| {
        ReplError::from(Diagnostic::new(
            DiagnosticKind::Parser,
            format!("JSON.parse: {err}"),
        ))
    })?;
    Ok(Value::from_json(&json))
}

fn array_is_array(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(matches!(
        &*arg(args, 0).0,
        ValueKind::Array(_)
    )))
}

fn array_of(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::array(args.to_vec()))
}

fn array_from(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let source = arg(args, 0);
    let items = match &*source.0 {
        ValueKind::Array(items) => items.borrow().clone(),
        ValueKind::String(text) => text.chars().map(|c| Value::string(c.to_string())).collect(),
        _ => Vec::new(),
    };
    Ok(Value::array(items))
}

fn object_entries_of(value: &Value) -> Vec<(String, Value)> {
    match &*value.0 {
        ValueKind::Object(entries) => entries
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        ValueKind::Module(module) => module
            .exports
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        ValueKind::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(idx, value)| (idx.to_string(), value.clone()))
            .collect(),
        ValueKind::String(text) => text
            .chars()
            .enumerate()
            .map(|(idx, ch)| (idx.to_string(), Value::string(ch.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn object_keys(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::array(
        property_keys(&arg(args, 0))
            .into_iter()
            .map(Value::string)
            .collect(),
    ))
}

fn object_values(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::array(
        object_entries_of(&arg(args, 0))
            .into_iter()
            .map(|(_, value)| value)
            .collect(),
    ))
}

fn object_entries(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::array(
        object_entries_of(&arg(args, 0))
            .into_iter()
            .map(|(key, value)| Value::array(vec![Value::string(key), value]))
            .collect(),
    ))
}

fn object_assign(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let target = arg(args, 0);
    let ValueKind::Object(entries) = &*target.0 else {
        return Err(type_error("Object.assign target must be an object"));
    };
    for source in args.iter().skip(1) {
        for (key, value) in object_entries_of(source) {
            entries.borrow_mut().insert(key, value);
        }
    }
    Ok(target.clone())
}

fn object_has_own(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let key = property_key(&arg(args, 0));
    Ok(Value::bool(match &*this.0 {
        ValueKind::Object(entries) => entries.borrow().contains_key(&key),
        _ => false,
    }))
}

fn to_string_method(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::string(this.to_string()))
}

fn new_error(name: &str, args: &[Value]) -> Result<Value> {
    let message = arg(args, 0);
    let message = if message.is_undefined() {
        String::new()
    } else {
        message.to_string()
    };
    Ok(Value::error(name, message))
}

fn error_ctor(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    new_error("Error", args)
}

fn type_error_ctor(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    new_error("TypeError", args)
}

fn range_error_ctor(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    new_error("RangeError", args)
}

fn reference_error_ctor(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    new_error("ReferenceError", args)
}

fn syntax_error_ctor(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    new_error("SyntaxError", args)
}

fn to_string_fn(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::string(if args.is_empty() {
        String::new()
    } else {
        args[0].to_string()
    }))
}

fn to_number_fn(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::number(if args.is_empty() {
        0.0
    } else {
        args[0].to_number()
    }))
}

fn to_boolean_fn(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(arg(args, 0).is_truthy()))
}

fn parse_int(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let text = arg(args, 0).to_string();
    let mut text = text.trim();
    let negative = text.starts_with('-');
    text = text.trim_start_matches(['-', '+']);
    let mut radix = match arg(args, 1).to_number() {
        n if n.is_nan() || n == 0.0 => 10,
        n => n as u32,
    };
    if (radix == 10 || radix == 16) && (text.starts_with("0x") || text.starts_with("0X")) {
        radix = 16;
        text = &text[2..];
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::number(f64::NAN));
    }
    let digits: String = text.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return Ok(Value::number(f64::NAN));
    }
    let magnitude = digits.chars().fold(0.0, |acc, c| {
        acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0))
    });
    Ok(Value::number(if negative { -magnitude } else { magnitude }))
}

fn parse_float(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let text = arg(args, 0).to_string();
    let text = text.trim_start();
    let unsigned = text.trim_start_matches(['-', '+']);
    if unsigned.starts_with("Infinity") {
        let sign = if text.starts_with('-') { -1.0 } else { 1.0 };
        return Ok(Value::number(sign * f64::INFINITY));
    }
    // Longest prefix that still parses as a float.
    let candidates = text
        .char_indices()
        .map(|(idx, ch)| idx + ch.len_utf8())
        .collect::<Vec<_>>();
    let parsed = candidates
        .iter()
        .rev()
        .find_map(|end| {
            let prefix = &text[..*end];
            let numeric = prefix
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
            if !numeric || prefix.ends_with(['e', 'E', '+', '-']) {
                None
            } else {
                prefix.parse::<f64>().ok()
            }
        })
        .unwrap_or(f64::NAN);
    Ok(Value::number(parsed))
}

fn is_nan(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(arg(args, 0).to_number().is_nan()))
}

fn is_finite(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(arg(args, 0).to_number().is_finite()))
}

fn number_is_integer(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::bool(
        arg(args, 0)
            .as_number()
            .is_some_and(|n| n.is_finite() && n.fract() == 0.0),
    ))
}

fn number_to_fixed(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let n = this_number(this)?;
    let digits = arg(args, 0).to_number();
    let digits = if digits.is_nan() { 0.0 } else { digits };
    if !(0.0..=100.0).contains(&digits) {
        return Err(ReplError::from(Diagnostic::new(
            DiagnosticKind::Range,
            "toFixed() digits argument must be between 0 and 100",
        )));
    }
    if !n.is_finite() {
        return Ok(Value::string(number_to_string(n)));
    }
    Ok(Value::string(format!("{:.*}", digits as usize, n)))
}

fn number_to_string_method(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let n = this_number(this)?;
    let radix = arg(args, 0);
    let radix = if radix.is_undefined() {
        10
    } else {
        radix.to_number() as u32
    };
    if !(2..=36).contains(&radix) {
        return Err(ReplError::from(Diagnostic::new(
            DiagnosticKind::Range,
            "toString() radix must be between 2 and 36",
        )));
    }
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
        return Ok(Value::string(number_to_string(n)));
    }
    let mut magnitude = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('0'));
        magnitude /= u64::from(radix);
        if magnitude == 0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::string(digits.into_iter().rev().collect::<String>()))
}

fn promise_state(this: &Value) -> Result<PromiseState> {
    match &*this.0 {
        ValueKind::Promise(state) => Ok(state.borrow().clone()),
        _ => Err(type_error("receiver is not a promise")),
    }
}

fn settle(promise: &Value, state: PromiseState) {
    if let ValueKind::Promise(cell) = &*promise.0 {
        if matches!(*cell.borrow(), PromiseState::Pending) {
            *cell.borrow_mut() = state;
        }
    }
}

/// Runs the handler that applies to `state`, producing the chained promise.
fn chain(
    interpreter: &mut Interpreter,
    state: PromiseState,
    on_fulfilled: &Value,
    on_rejected: &Value,
) -> Value {
    let run = |interpreter: &mut Interpreter, handler: &Value, input: Value| {
        promise_from(
            interpreter
                .call_function(handler, vec![input], SourceSpan::default())
                .and_then(|result| await_value(&result)),
        )
    };
    match state {
        PromiseState::Fulfilled(value) if on_fulfilled.is_callable() => {
            run(interpreter, on_fulfilled, value)
        }
        PromiseState::Rejected(reason) if on_rejected.is_callable() => {
            run(interpreter, on_rejected, reason)
        }
        other => Value::promise(other),
    }
}

fn promise_then(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let state = promise_state(this)?;
    Ok(chain(interpreter, state, &arg(args, 0), &arg(args, 1)))
}

fn promise_catch(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let state = promise_state(this)?;
    Ok(chain(interpreter, state, &Value::undefined(), &arg(args, 0)))
}

fn promise_finally(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let state = promise_state(this)?;
    let handler = arg(args, 0);
    if handler.is_callable() {
        if let Err(err) = interpreter.call_function(&handler, Vec::new(), SourceSpan::default()) {
            return Ok(Value::rejected(err.into_value()));
        }
    }
    Ok(Value::promise(state))
}

fn promise_new(interpreter: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let executor = arg(args, 0);
    if !executor.is_callable() {
        return Err(type_error(format!(
            "Promise resolver {executor} is not a function"
        )));
    }
    let promise = Value::promise(PromiseState::Pending);
    let resolve = bound("resolve", 1, promise_resolve_fn, &promise);
    let reject = bound("reject", 1, promise_reject_fn, &promise);
    if let Err(err) =
        interpreter.call_function(&executor, vec![resolve, reject], SourceSpan::default())
    {
        settle(&promise, PromiseState::Rejected(err.into_value()));
    }
    Ok(promise)
}

fn promise_resolve_fn(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let state = match await_value(&arg(args, 0)) {
        Ok(value) => PromiseState::Fulfilled(value),
        Err(err) => PromiseState::Rejected(err.into_value()),
    };
    settle(this, state);
    Ok(Value::undefined())
}

fn promise_reject_fn(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    settle(this, PromiseState::Rejected(arg(args, 0)));
    Ok(Value::undefined())
}

fn promise_resolve_static(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(promise_from(Ok(arg(args, 0))))
}

fn promise_reject_static(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    Ok(Value::rejected(arg(args, 0)))
}

fn promise_all(_: &mut Interpreter, _: &Value, args: &[Value]) -> Result<Value> {
    let input = arg(args, 0);
    let ValueKind::Array(items) = &*input.0 else {
        return Err(type_error("Promise.all expects an array"));
    };
    let items = items.borrow().clone();
    let mut values = Vec::with_capacity(items.len());
    for item in &items {
        match await_value(item) {
            Ok(value) => values.push(value),
            Err(err) => return Ok(Value::rejected(err.into_value())),
        }
    }
    Ok(Value::fulfilled(Value::array(values)))
}

fn array_push(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let items = this_array(this)?;
    items.borrow_mut().extend(args.iter().cloned());
    Ok(Value::number(items.borrow().len() as f64))
}

fn array_pop(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(this_array(this)?
        .borrow_mut()
        .pop()
        .unwrap_or_else(Value::undefined))
}

fn array_shift(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    let items = this_array(this)?;
    let mut items = items.borrow_mut();
    if items.is_empty() {
        return Ok(Value::undefined());
    }
    Ok(items.remove(0))
}

fn array_unshift(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let items = this_array(this)?;
    let mut items = items.borrow_mut();
    for (offset, value) in args.iter().enumerate() {
        items.insert(offset, value.clone());
    }
    Ok(Value::number(items.len() as f64))
}

fn array_slice(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let items = this_array(this)?.borrow();
    let len = items.len();
    let start = relative_index(&arg(args, 0), len, 0);
    let end = relative_index(&arg(args, 1), len, len);
    Ok(Value::array(if start < end {
        items[start..end].to_vec()
    } else {
        Vec::new()
    }))
}

fn array_splice(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let items = this_array(this)?;
    let mut items = items.borrow_mut();
    let len = items.len();
    let start = relative_index(&arg(args, 0), len, 0);
    let delete = if args.len() < 2 {
        len - start
    } else {
        (arg(args, 1).to_number().max(0.0) as usize).min(len - start)
    };
    let inserted = args.iter().skip(2).cloned();
    let removed: Vec<Value> = items.splice(start..start + delete, inserted).collect();
    Ok(Value::array(removed))
}

fn array_concat(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let mut result = this_array(this)?.borrow().clone();
    for value in args {
        match &*value.0 {
            ValueKind::Array(items) => result.extend(items.borrow().iter().cloned()),
            _ => result.push(value.clone()),
        }
    }
    Ok(Value::array(result))
}

fn array_join(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let separator = arg(args, 0);
    let separator = if separator.is_undefined() {
        ",".to_string()
    } else {
        separator.to_string()
    };
    let text = this_array(this)?
        .borrow()
        .iter()
        .map(|value| {
            if value.is_nullish() {
                String::new()
            } else {
                value.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(&separator);
    Ok(Value::string(text))
}

fn array_index_of(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let needle = arg(args, 0);
    let position = this_array(this)?
        .borrow()
        .iter()
        .position(|value| value.strict_equals(&needle));
    Ok(Value::number(position.map_or(-1.0, |idx| idx as f64)))
}

fn array_includes(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let needle = arg(args, 0);
    let nan = needle.as_number().is_some_and(f64::is_nan);
    let found = this_array(this)?.borrow().iter().any(|value| {
        value.strict_equals(&needle) || (nan && value.as_number().is_some_and(f64::is_nan))
    });
    Ok(Value::bool(found))
}

fn array_reverse(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    this_array(this)?.borrow_mut().reverse();
    Ok(this.clone())
}

fn array_at(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let items = this_array(this)?.borrow();
    let idx = arg(args, 0).to_number();
    let idx = if idx.is_nan() { 0.0 } else { idx.trunc() };
    let idx = if idx < 0.0 { items.len() as f64 + idx } else { idx };
    if idx < 0.0 {
        return Ok(Value::undefined());
    }
    Ok(items
        .get(idx as usize)
        .cloned()
        .unwrap_or_else(Value::undefined))
}

fn array_flat(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    let mut result = Vec::new();
    for value in this_array(this)?.borrow().iter() {
        match &*value.0 {
            ValueKind::Array(inner) => result.extend(inner.borrow().iter().cloned()),
            _ => result.push(value.clone()),
        }
    }
    Ok(Value::array(result))
}

/// Calls `callback(item, index, array)` for each item of a snapshot of `this`.
fn each_item(
    interpreter: &mut Interpreter,
    this: &Value,
    callback: &Value,
    mut visit: impl FnMut(usize, &Value, Value) -> Option<Value>,
) -> Result<Option<Value>> {
    let items = this_array(this)?.borrow().clone();
    for (idx, item) in items.into_iter().enumerate() {
        let result = interpreter.call_function(
            callback,
            vec![item.clone(), Value::number(idx as f64), this.clone()],
            SourceSpan::default(),
        )?;
        if let Some(done) = visit(idx, &item, result) {
            return Ok(Some(done));
        }
    }
    Ok(None)
}

fn array_map(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "map")?;
    let mut mapped = Vec::new();
    each_item(interpreter, this, &callback, |_, _, result| {
        mapped.push(result);
        None
    })?;
    Ok(Value::array(mapped))
}

fn array_filter(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "filter")?;
    let mut kept = Vec::new();
    each_item(interpreter, this, &callback, |_, item, result| {
        if result.is_truthy() {
            kept.push(item.clone());
        }
        None
    })?;
    Ok(Value::array(kept))
}

fn array_for_each(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "forEach")?;
    each_item(interpreter, this, &callback, |_, _, _| None)?;
    Ok(Value::undefined())
}

fn array_find(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "find")?;
    let found = each_item(interpreter, this, &callback, |_, item, result| {
        result.is_truthy().then(|| item.clone())
    })?;
    Ok(found.unwrap_or_else(Value::undefined))
}

fn array_find_index(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "findIndex")?;
    let found = each_item(interpreter, this, &callback, |idx, _, result| {
        result.is_truthy().then(|| Value::number(idx as f64))
    })?;
    Ok(found.unwrap_or_else(|| Value::number(-1.0)))
}

fn array_some(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "some")?;
    let found = each_item(interpreter, this, &callback, |_, _, result| {
        result.is_truthy().then(|| Value::bool(true))
    })?;
    Ok(Value::bool(found.is_some()))
}

fn array_every(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "every")?;
    let failed = each_item(interpreter, this, &callback, |_, _, result| {
        (!result.is_truthy()).then(|| Value::bool(false))
    })?;
    Ok(Value::bool(failed.is_none()))
}

fn array_reduce(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let callback = callback_arg(args, "reduce")?;
    let items = this_array(this)?.borrow().clone();
    let mut items = items.into_iter().enumerate();
    let mut accumulator = if args.len() >= 2 {
        args[1].clone()
    } else {
        match items.next() {
            Some((_, first)) => first,
            None => return Err(type_error("Reduce of empty array with no initial value")),
        }
    };
    for (idx, item) in items {
        accumulator = interpreter.call_function(
            &callback,
            vec![accumulator, item, Value::number(idx as f64), this.clone()],
            SourceSpan::default(),
        )?;
    }
    Ok(accumulator)
}

fn array_sort(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let comparator = arg(args, 0);
    let items = this_array(this)?.borrow().clone();
    // Insertion sort: stable, and tolerant of inconsistent comparators.
    let mut sorted: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        let mut position = sorted.len();
        while position > 0 {
            let ordering = if item.is_undefined() {
                Ordering::Greater
            } else if sorted[position - 1].is_undefined() {
                Ordering::Less
            } else if comparator.is_callable() {
                let result = interpreter.call_function(
                    &comparator,
                    vec![sorted[position - 1].clone(), item.clone()],
                    SourceSpan::default(),
                )?;
                result
                    .to_number()
                    .partial_cmp(&0.0)
                    .unwrap_or(Ordering::Equal)
            } else {
                sorted[position - 1].to_string().cmp(&item.to_string())
            };
            if ordering == Ordering::Greater {
                position -= 1;
            } else {
                break;
            }
        }
        sorted.insert(position, item);
    }
    *this_array(this)?.borrow_mut() = sorted;
    Ok(this.clone())
}

fn string_to_upper(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::string(this_string(this)?.to_uppercase()))
}

fn string_to_lower(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::string(this_string(this)?.to_lowercase()))
}

fn string_trim(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::string(this_string(this)?.trim()))
}

fn string_trim_start(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::string(this_string(this)?.trim_start()))
}

fn string_trim_end(_: &mut Interpreter, this: &Value, _args: &[Value]) -> Result<Value> {
    Ok(Value::string(this_string(this)?.trim_end()))
}

fn string_split(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    let separator = arg(args, 0);
    let parts: Vec<Value> = if separator.is_undefined() {
        vec![Value::string(text)]
    } else {
        let separator = separator.to_string();
        if separator.is_empty() {
            text.chars().map(|c| Value::string(c.to_string())).collect()
        } else {
            text.split(separator.as_str()).map(Value::string).collect()
        }
    };
    Ok(Value::array(parts))
}

fn string_includes(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let needle = arg(args, 0).to_string();
    Ok(Value::bool(this_string(this)?.contains(needle.as_str())))
}

fn string_starts_with(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let needle = arg(args, 0).to_string();
    Ok(Value::bool(this_string(this)?.starts_with(needle.as_str())))
}

fn string_ends_with(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let needle = arg(args, 0).to_string();
    Ok(Value::bool(this_string(this)?.ends_with(needle.as_str())))
}

fn string_index_of(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    let needle = arg(args, 0).to_string();
    let position = text
        .find(needle.as_str())
        .map(|byte| text[..byte].chars().count() as f64);
    Ok(Value::number(position.unwrap_or(-1.0)))
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

fn string_slice(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    let len = text.chars().count();
    let start = relative_index(&arg(args, 0), len, 0);
    let end = relative_index(&arg(args, 1), len, len);
    Ok(Value::string(char_slice(text, start, end)))
}

fn string_substring(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    let len = text.chars().count();
    let clamp = |value: Value, default: usize| {
        if value.is_undefined() {
            return default;
        }
        let n = value.to_number();
        if n.is_nan() || n < 0.0 {
            0
        } else {
            (n as usize).min(len)
        }
    };
    let a = clamp(arg(args, 0), 0);
    let b = clamp(arg(args, 1), len);
    Ok(Value::string(char_slice(text, a.min(b), a.max(b))))
}

fn replacement_text(
    interpreter: &mut Interpreter,
    replacement: &Value,
    matched: &str,
) -> Result<String> {
    if replacement.is_callable() {
        let result = interpreter.call_function(
            replacement,
            vec![Value::string(matched)],
            SourceSpan::default(),
        )?;
        Ok(result.to_string())
    } else {
        Ok(replacement.to_string())
    }
}

fn string_replace(interpreter: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    let pattern = arg(args, 0).to_string();
    let Some(position) = text.find(pattern.as_str()) else {
        return Ok(Value::string(text));
    };
    let replacement = replacement_text(interpreter, &arg(args, 1), &pattern)?;
    Ok(Value::string(format!(
        "{}{replacement}{}",
        &text[..position],
        &text[position + pattern.len()..]
    )))
}

fn string_replace_all(
    interpreter: &mut Interpreter,
    this: &Value,
    args: &[Value],
) -> Result<Value> {
    let text = this_string(this)?;
    let pattern = arg(args, 0).to_string();
    if pattern.is_empty() {
        return Ok(Value::string(text));
    }
    let replacement = replacement_text(interpreter, &arg(args, 1), &pattern)?;
    Ok(Value::string(text.replace(pattern.as_str(), &replacement)))
}

fn string_repeat(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let count = arg(args, 0).to_number();
    if count < 0.0 || count.is_infinite() {
        return Err(ReplError::from(Diagnostic::new(
            DiagnosticKind::Range,
            format!("Invalid count value: {}", number_to_string(count)),
        )));
    }
    let count = if count.is_nan() { 0 } else { count as usize };
    Ok(Value::string(this_string(this)?.repeat(count)))
}

fn padding(text: &str, args: &[Value]) -> String {
    let target = arg(args, 0).to_number();
    let fill = arg(args, 1);
    let fill = if fill.is_undefined() {
        " ".to_string()
    } else {
        fill.to_string()
    };
    let len = text.chars().count();
    if target.is_nan() || target as usize <= len || fill.is_empty() {
        return String::new();
    }
    fill.chars().cycle().take(target as usize - len).collect()
}

fn string_pad_start(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    Ok(Value::string(format!("{}{text}", padding(text, args))))
}

fn string_pad_end(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    Ok(Value::string(format!("{text}{}", padding(text, args))))
}

fn string_char_at(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let idx = arg(args, 0).to_number();
    let idx = if idx.is_nan() { 0.0 } else { idx };
    let ch = if idx < 0.0 {
        None
    } else {
        this_string(this)?.chars().nth(idx as usize)
    };
    Ok(Value::string(ch.map(String::from).unwrap_or_default()))
}

fn string_char_code_at(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let idx = arg(args, 0).to_number();
    let idx = if idx.is_nan() { 0.0 } else { idx };
    let code = if idx < 0.0 {
        None
    } else {
        this_string(this)?.encode_utf16().nth(idx as usize)
    };
    Ok(Value::number(code.map_or(f64::NAN, f64::from)))
}

fn string_at(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let text = this_string(this)?;
    let len = text.chars().count() as f64;
    let idx = arg(args, 0).to_number();
    let idx = if idx.is_nan() { 0.0 } else { idx.trunc() };
    let idx = if idx < 0.0 { len + idx } else { idx };
    if idx < 0.0 || idx >= len {
        return Ok(Value::undefined());
    }
    Ok(text
        .chars()
        .nth(idx as usize)
        .map(|c| Value::string(c.to_string()))
        .unwrap_or_else(Value::undefined))
}

fn string_concat(_: &mut Interpreter, this: &Value, args: &[Value]) -> Result<Value> {
    let mut text = this_string(this)?.to_string();
    for value in args {
        text.push_str(&value.to_string());
    }
    Ok(Value::string(text))
}
