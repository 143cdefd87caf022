//! Placeholder scanning and substitution for YAML templates.
//!
//! A placeholder is `<name>` where `name` is one or more ASCII letters,
//! digits, `_` or `-`, starting with a letter or digit. Tokens that look
//! like placeholders but break that rule (`<db.password>`, `<_x>`) are
//! rejected rather than copied through.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("unresolved placeholders: {}", format_names(.0))]
    Unresolved(Vec<String>),
    #[error("placeholders without a configured source: {}", format_names(.0))]
    UnknownPlaceholders(Vec<String>),
    #[error(
        "external address of service {service} is still pending (needed by <{placeholder}>); wait and re-run"
    )]
    PendingAddress { placeholder: String, service: String },
    #[error("malformed placeholders: {}", format_names(.0))]
    Malformed(Vec<String>),
    #[error("materialized document is not valid YAML: {0}")]
    InvalidYaml(String),
}

fn format_names(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("<{name}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

#[must_use]
pub fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric() && chars.all(is_name_char)
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

// Wider than a name so near-misses like `<a.b>` are caught.
fn is_token_char(byte: u8) -> bool {
    is_name_char(char::from(byte)) || byte == b'.'
}

/// Every `<...>` run of token characters, valid name or not.
fn tokens(template: &str) -> Vec<Span<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut idx = 0;
    while let Some(offset) = template[idx..].find('<') {
        let start = idx + offset;
        let name_start = start + 1;
        let mut end = name_start;
        while end < bytes.len() && is_token_char(bytes[end]) {
            end += 1;
        }
        if end > name_start && end < bytes.len() && bytes[end] == b'>' {
            tokens.push(Span {
                start,
                end: end + 1,
                name: &template[name_start..end],
            });
            idx = end + 1;
            continue;
        }
        idx = name_start;
    }
    tokens
}

fn spans(template: &str) -> Vec<Span<'_>> {
    tokens(template)
        .into_iter()
        .filter(|span| is_placeholder_name(span.name))
        .collect()
}

/// Returns placeholder-like tokens whose names are not valid, sorted.
#[must_use]
pub fn malformed_placeholders(template: &str) -> BTreeSet<String> {
    tokens(template)
        .into_iter()
        .filter(|span| !is_placeholder_name(span.name))
        .map(|span| span.name.to_string())
        .collect()
}

/// Returns the distinct placeholder names used by `template`, sorted.
#[must_use]
pub fn placeholders(template: &str) -> BTreeSet<String> {
    spans(template)
        .into_iter()
        .map(|span| span.name.to_string())
        .collect()
}

/// Replaces every placeholder in `template` with its value from `values`.
///
/// Substitution is a single pass: text coming from `values` is never
/// scanned for further placeholders.
///
/// # Errors
/// Returns [`MaterializeError::Malformed`] if the template has tokens with
/// invalid names, or [`MaterializeError::Unresolved`] naming every
/// placeholder absent from `values`; no partial document is produced.
pub fn materialize(
    template: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, MaterializeError> {
    let malformed = malformed_placeholders(template);
    if !malformed.is_empty() {
        return Err(MaterializeError::Malformed(malformed.into_iter().collect()));
    }
    let spans = spans(template);
    let missing: BTreeSet<String> = spans
        .iter()
        .filter(|span| !values.contains_key(span.name))
        .map(|span| span.name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MaterializeError::Unresolved(missing.into_iter().collect()));
    }

    let mut output = String::with_capacity(template.len());
    let mut cursor = 0;
    for span in spans {
        output.push_str(&template[cursor..span.start]);
        if let Some(value) = values.get(span.name) {
            output.push_str(value);
        }
        cursor = span.end;
    }
    output.push_str(&template[cursor..]);
    Ok(output)
}

/// Checks that a materialized document still parses as YAML.
///
/// # Errors
/// Returns [`MaterializeError::InvalidYaml`] with the parser message.
pub fn validate_yaml(document: &str) -> Result<(), MaterializeError> {
    serde_yaml::from_str::<serde_yaml::Value>(document)
        .map(|_| ())
        .map_err(|err| MaterializeError::InvalidYaml(err.to_string()))
}
