use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::{
    ast::FunctionDef,
    diagnostics::{Diagnostic, DiagnosticKind, ReplError, Result},
    environment::EnvironmentRef,
    runtime::Interpreter,
};

#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn undefined() -> Self {
        Self::new(ValueKind::Undefined)
    }

    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueKind::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Self::new(ValueKind::Array(RefCell::new(values)))
    }

    pub fn object(entries: IndexMap<String, Value>) -> Self {
        Self::new(ValueKind::Object(RefCell::new(entries)))
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::new(ValueKind::Error(ErrorValue {
            name: name.to_string(),
            message: message.into(),
        }))
    }

    pub fn module(name: impl Into<String>, exports: IndexMap<String, Value>) -> Self {
        Self::new(ValueKind::Module(ModuleValue {
            name: name.into(),
            exports,
        }))
    }

    pub fn promise(state: PromiseState) -> Self {
        Self::new(ValueKind::Promise(RefCell::new(state)))
    }

    pub fn fulfilled(value: Value) -> Self {
        Self::promise(PromiseState::Fulfilled(value))
    }

    pub fn rejected(reason: Value) -> Self {
        Self::promise(PromiseState::Rejected(reason))
    }

    pub fn native(name: &'static str, arity: usize, callback: NativeCallback) -> Self {
        Self::new(ValueKind::NativeFunction(NativeFunction {
            name,
            arity,
            callback,
            this: None,
            constructor: false,
        }))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(&*self.0, ValueKind::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(&*self.0, ValueKind::Undefined | ValueKind::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            &*self.0,
            ValueKind::Function(_) | ValueKind::NativeFunction(_)
        )
    }

    pub fn ptr_eq(&self, other: &Value) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::Undefined | ValueKind::Null => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Number(n) => *n != 0.0 && !n.is_nan(),
            ValueKind::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Undefined => "undefined",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Number(_) => "number",
            ValueKind::String(_) => "string",
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => "function",
            ValueKind::Null
            | ValueKind::Array(_)
            | ValueKind::Object(_)
            | ValueKind::Promise(_)
            | ValueKind::Module(_)
            | ValueKind::Error(_) => "object",
        }
    }

    /// Message of an Error-family value; `None` for anything else.
    pub fn error_message(&self) -> Option<String> {
        match &*self.0 {
            ValueKind::Error(err) => Some(err.message.clone()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_number(&self) -> f64 {
        match &*self.0 {
            ValueKind::Undefined => f64::NAN,
            ValueKind::Null => 0.0,
            ValueKind::Bool(b) => f64::from(u8::from(*b)),
            ValueKind::Number(n) => *n,
            ValueKind::String(s) => string_to_number(s),
            ValueKind::Array(_) => string_to_number(&self.to_string()),
            _ => f64::NAN,
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Undefined, ValueKind::Undefined) | (ValueKind::Null, ValueKind::Null) => {
                true
            }
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        use ValueKind::*;
        match (&*self.0, &*other.0) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), String(_)) | (String(_), Number(_)) | (Bool(_), _) | (_, Bool(_)) => {
                self.to_number() == other.to_number()
            }
            (Number(_) | String(_), _) if other.is_object_like() => {
                self.loose_equals(&Value::string(other.to_string()))
            }
            (_, Number(_) | String(_)) if self.is_object_like() => {
                Value::string(self.to_string()).loose_equals(other)
            }
            _ => self.strict_equals(other),
        }
    }

    fn is_object_like(&self) -> bool {
        !matches!(
            &*self.0,
            ValueKind::Undefined
                | ValueKind::Null
                | ValueKind::Bool(_)
                | ValueKind::Number(_)
                | ValueKind::String(_)
        )
    }

    /// Converts to JSON the way `JSON.stringify` does; `None` where
    /// `JSON.stringify` would produce `undefined`.
    pub fn to_json(&self) -> Result<Option<JsonValue>> {
        let mut seen = Vec::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut Vec<*const ValueKind>) -> Result<Option<JsonValue>> {
        let json = match &*self.0 {
            ValueKind::Undefined | ValueKind::Function(_) | ValueKind::NativeFunction(_) => {
                return Ok(None);
            }
            ValueKind::Null => JsonValue::Null,
            ValueKind::Bool(b) => JsonValue::Bool(*b),
            ValueKind::Number(n) => number_to_json(*n),
            ValueKind::String(s) => JsonValue::String(s.clone()),
            ValueKind::Array(values) => {
                self.enter(seen)?;
                let mut items = Vec::new();
                for value in values.borrow().iter() {
                    items.push(value.to_json_inner(seen)?.unwrap_or(JsonValue::Null));
                }
                seen.pop();
                JsonValue::Array(items)
            }
            ValueKind::Object(entries) => {
                self.enter(seen)?;
                let map = json_entries(entries.borrow().iter(), seen)?;
                seen.pop();
                JsonValue::Object(map)
            }
            ValueKind::Module(module) => {
                self.enter(seen)?;
                let map = json_entries(module.exports.iter(), seen)?;
                seen.pop();
                JsonValue::Object(map)
            }
            ValueKind::Promise(_) | ValueKind::Error(_) => JsonValue::Object(Default::default()),
        };
        Ok(Some(json))
    }

    fn enter(&self, seen: &mut Vec<*const ValueKind>) -> Result<()> {
        let ptr = Rc::as_ptr(&self.0);
        if seen.contains(&ptr) {
            return Err(ReplError::from(Diagnostic::new(
                DiagnosticKind::Type,
                "Converting circular structure to JSON",
            )));
        }
        seen.push(ptr);
        Ok(())
    }

    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::null(),
            JsonValue::Bool(b) => Value::bool(*b),
            JsonValue::Number(n) => Value::number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::string(s.clone()),
            JsonValue::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    fn write_string(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<*const ValueKind>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Undefined => write!(f, "undefined"),
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Number(n) => write!(f, "{}", number_to_string(*n)),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::Array(values) => {
                let ptr = Rc::as_ptr(&self.0);
                if seen.contains(&ptr) {
                    return Ok(());
                }
                seen.push(ptr);
                for (idx, value) in values.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    if !value.is_nullish() {
                        value.write_string(f, seen)?;
                    }
                }
                seen.pop();
                Ok(())
            }
            ValueKind::Object(_) => write!(f, "[object Object]"),
            ValueKind::Module(_) => write!(f, "[object Module]"),
            ValueKind::Promise(_) => write!(f, "[object Promise]"),
            ValueKind::Function(fun) => write!(f, "{}", fun.def.text),
            ValueKind::NativeFunction(fun) => {
                write!(f, "function {}() {{ [native code] }}", fun.name)
            }
            ValueKind::Error(err) if err.message.is_empty() => write!(f, "{}", err.name),
            ValueKind::Error(err) => write!(f, "{}: {}", err.name, err.message),
        }
    }
}

fn json_entries<'v>(
    entries: impl Iterator<Item = (&'v String, &'v Value)>,
    seen: &mut Vec<*const ValueKind>,
) -> Result<serde_json::Map<String, JsonValue>> {
    let mut map = serde_json::Map::new();
    for (key, value) in entries {
        if let Some(json) = value.to_json_inner(seen)? {
            map.insert(key.clone(), json);
        }
    }
    Ok(map)
}

fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        JsonValue::Null
    } else if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
            f64::NAN
        }
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

/// Formats a number the way script code sees it (`String(n)`).
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let sign = if n < 0.0 { "-" } else { "" };
    // Shortest round-trip digits plus a decimal exponent.
    let sci = format!("{:e}", n.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let exp_sign = if point - 1 < 0 { "-" } else { "+" };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{exp_sign}{}", (point - 1).abs())
        } else {
            format!("{first}.{rest}e{exp_sign}{}", (point - 1).abs())
        }
    };
    format!("{sign}{body}")
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{s:?}"),
            ValueKind::Array(values) => f.debug_list().entries(values.borrow().iter()).finish(),
            ValueKind::Object(map) => f.debug_map().entries(map.borrow().iter()).finish(),
            ValueKind::Module(module) => f
                .debug_struct("Module")
                .field("name", &module.name)
                .field("exports", &module.exports)
                .finish(),
            ValueKind::Promise(state) => write!(f, "Promise({:?})", state.borrow()),
            ValueKind::Function(fun) => write!(
                f,
                "<fn {}>",
                fun.def.name.as_deref().unwrap_or("anonymous")
            ),
            ValueKind::NativeFunction(fun) => write!(f, "<native fn {}>", fun.name),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_string(f, &mut Vec::new())
    }
}

pub enum ValueKind {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(RefCell<Vec<Value>>),
    Object(RefCell<IndexMap<String, Value>>),
    Module(ModuleValue),
    Function(UserFunction),
    NativeFunction(NativeFunction),
    Promise(RefCell<PromiseState>),
    Error(ErrorValue),
}

/// Frozen export table of a loaded module.
pub struct ModuleValue {
    pub name: String,
    pub exports: IndexMap<String, Value>,
}

pub struct UserFunction {
    pub def: FunctionDef,
    pub env: EnvironmentRef,
}

pub struct ErrorValue {
    pub name: String,
    pub message: String,
}

/// Promises settle eagerly; `Pending` only survives when an executor never
/// calls `resolve` or `reject`.
#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

pub type NativeCallback = fn(&mut Interpreter, &Value, &[Value]) -> Result<Value>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub callback: NativeCallback,
    /// Receiver a built-in method was read from.
    pub this: Option<Value>,
    pub constructor: bool,
}

impl NativeFunction {
    pub fn call(&self, interpreter: &mut Interpreter, args: &[Value]) -> Result<Value> {
        let this = self.this.clone().unwrap_or_else(Value::undefined);
        (self.callback)(interpreter, &this, args)
    }

    pub fn bind(&self, this: Value) -> Value {
        Value::new(ValueKind::NativeFunction(NativeFunction {
            this: Some(this),
            ..self.clone()
        }))
    }
}
