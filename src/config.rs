use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{ReplError, Result};

/// Evaluation options for one pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplOptions {
    /// Fold `console.*` statements into later evaluations instead of
    /// re-running them on every pass.
    #[serde(alias = "reeval_console")]
    pub reeval_console: bool,
    /// Keep blocks whose value is `undefined`.
    #[serde(alias = "reeval_undef")]
    pub reeval_undef: bool,
    /// Set by the session when any block of the pass needs async completion.
    #[serde(alias = "wrap_async")]
    pub wrap_async: bool,
}

impl Default for ReplOptions {
    fn default() -> Self {
        Self {
            reeval_console: false,
            reeval_undef: true,
            wrap_async: false,
        }
    }
}

impl ReplOptions {
    /// Applies `key=value` pairs from a query string such as
    /// `?reevalConsole=true&reevalUndef=0`.
    pub fn apply_query(&mut self, query: &str) {
        let query = query.trim_start_matches('?');
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, "true"));
            let Some(flag) = parse_flag(raw) else {
                tracing::debug!(key, value = raw, "ignoring non-boolean option value");
                continue;
            };
            match key {
                "reevalConsole" | "reeval_console" => self.reeval_console = flag,
                "reevalUndef" | "reeval_undef" => self.reeval_undef = flag,
                _ => tracing::debug!(key, "ignoring unknown option"),
            }
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory module specifiers are resolved against.
    pub module_root: Option<PathBuf>,
    pub base_uri: String,
    /// Width of the source column in rendered tables.
    pub column_width: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            module_root: None,
            base_uri: "pad.html".to_string(),
            column_width: 40,
        }
    }
}

/// Contents of a `replpad.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    pub options: ReplOptions,
    pub session: SessionConfig,
}

pub const DEFAULT_CONFIG_FILE: &str = "replpad.toml";

impl PadConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| ReplError::Config(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` when given, else `replpad.toml` in the working directory
    /// if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    tracing::debug!(path = %fallback.display(), "loading configuration");
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
