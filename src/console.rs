//! Console interception: every `console.*` call made by pad code is fanned out
//! to registered listeners and always forwarded to the `tracing` delegate.

use std::{cell::RefCell, fmt, rc::Rc};

use serde::Serialize;

use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Log,
    Info,
    Warn,
    Error,
    Debug,
    Dir,
    Table,
    Trace,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Log => "log",
            MessageType::Info => "info",
            MessageType::Warn => "warn",
            MessageType::Error => "error",
            MessageType::Debug => "debug",
            MessageType::Dir => "dir",
            MessageType::Table => "table",
            MessageType::Trace => "trace",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait ConsoleListener {
    fn on_message(&self, kind: MessageType, data: &[Value]);
}

#[derive(Default)]
pub struct ConsoleIntercept {
    listeners: RefCell<Vec<Rc<dyn ConsoleListener>>>,
}

impl ConsoleIntercept {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Rc<dyn ConsoleListener>) {
        self.listeners.borrow_mut().push(listener);
    }

    /// Drops every listener; the delegate keeps receiving messages.
    pub fn dispose(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn emit(&self, kind: MessageType, data: &[Value]) {
        forward_to_delegate(kind, data);
        self.notify(kind, data);
    }

    /// Fans a message out to the listeners only.
    fn notify(&self, kind: MessageType, data: &[Value]) {
        // Listeners may register further listeners while handling a message.
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener.on_message(kind, data);
        }
    }
}

/// An intercept registered on another one relays to its own listeners; the
/// delegate has already seen the message.
impl ConsoleListener for ConsoleIntercept {
    fn on_message(&self, kind: MessageType, data: &[Value]) {
        self.notify(kind, data);
    }
}

fn forward_to_delegate(kind: MessageType, data: &[Value]) {
    let text = join(data);
    match kind {
        MessageType::Error => tracing::error!(target: "replpad::console", kind = %kind, "{text}"),
        MessageType::Warn => tracing::warn!(target: "replpad::console", kind = %kind, "{text}"),
        MessageType::Debug => tracing::debug!(target: "replpad::console", kind = %kind, "{text}"),
        MessageType::Trace => tracing::trace!(target: "replpad::console", kind = %kind, "{text}"),
        _ => tracing::info!(target: "replpad::console", kind = %kind, "{text}"),
    }
}

/// Renders a console argument for display.
pub fn stringify(value: &Value) -> String {
    match &*value.0 {
        ValueKind::Null => "(null)".into(),
        ValueKind::Undefined => "(undef.)".into(),
        ValueKind::String(s) => s.clone(),
        ValueKind::Array(items) => entries_block(
            items
                .borrow()
                .iter()
                .enumerate()
                .map(|(idx, item)| (idx.to_string(), item.to_string())),
        ),
        ValueKind::Object(entries) => entries_block(
            entries
                .borrow()
                .iter()
                .map(|(key, item)| (key.clone(), item.to_string())),
        ),
        ValueKind::Module(module) => entries_block(
            module
                .exports
                .iter()
                .map(|(key, item)| (key.clone(), item.to_string())),
        ),
        ValueKind::Error(_) | ValueKind::Promise(_) => "{ }".into(),
        _ => value.to_string(),
    }
}

fn entries_block(entries: impl Iterator<Item = (String, String)>) -> String {
    let mut text = String::from("{ ");
    for (key, value) in entries {
        text.push_str(&format!("{key}: {value}; "));
    }
    text.push('}');
    text
}

fn join(data: &[Value]) -> String {
    data.iter().map(stringify).collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleMessage {
    pub kind: MessageType,
    pub text: String,
}

/// Listener that records every message it sees.
#[derive(Default)]
pub struct Transcript {
    messages: RefCell<Vec<ConsoleMessage>>,
}

impl Transcript {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<ConsoleMessage> {
        self.messages.borrow().clone()
    }

    pub fn take(&self) -> Vec<ConsoleMessage> {
        std::mem::take(&mut *self.messages.borrow_mut())
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }
}

impl ConsoleListener for Transcript {
    fn on_message(&self, kind: MessageType, data: &[Value]) {
        self.messages.borrow_mut().push(ConsoleMessage {
            kind,
            text: join(data),
        });
    }
}
