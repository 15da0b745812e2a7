//! Shareable pad links: the dedented source, base64 encoded in the URI fragment.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    diagnostics::{Diagnostic, DiagnosticKind, ReplError, Result},
    text::count_chars_from_start,
};

/// Removes the indentation common to every non-blank line.
pub fn dedent(source: &str) -> String {
    let spacing = source
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| count_chars_from_start(line, &[' ']))
        .min()
        .unwrap_or(0);
    source
        .split('\n')
        .map(|line| line.get(spacing..).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn encode(source: &str, base_uri: &str) -> String {
    let separator = if base_uri.ends_with('#') { "" } else { "#" };
    format!("{base_uri}{separator}{}", STANDARD.encode(dedent(source)))
}

/// Source text carried by a link or by a bare fragment.
pub fn decode(link: &str) -> Result<String> {
    let fragment = link.rsplit_once('#').map_or(link, |(_, fragment)| fragment);
    let bytes = STANDARD
        .decode(fragment.trim())
        .map_err(|err| invalid_link(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| invalid_link(err.to_string()))
}

fn invalid_link(reason: String) -> ReplError {
    ReplError::from(Diagnostic::new(
        DiagnosticKind::Runtime,
        format!("invalid pad link: {reason}"),
    ))
}
