//! JSON decoding and typed field extraction.
//!
//! Upstream documents are parsed into an untyped [`Value`] tree and then
//! read through the `extract_*` helpers. Every lookup reports a missing key
//! or a type mismatch as an [`ExtractError`] instead of panicking.

use serde_json::Value;

use crate::error::{ExtractError, JsonKind, ParseError};

/// Parse a raw response body into a JSON tree.
pub fn parse(bytes: &[u8]) -> Result<Value, ParseError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Render a key path for error messages. The empty path is the document root.
pub fn display_path<S: AsRef<str>>(path: &[S]) -> String {
    if path.is_empty() {
        return "$".to_string();
    }
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

/// Walk `path` through nested objects and return the value at the end.
pub fn lookup<'a, S: AsRef<str>>(tree: &'a Value, path: &[S]) -> Result<&'a Value, ExtractError> {
    let mut current = tree;

    for (depth, key) in path.iter().enumerate() {
        let object = current.as_object().ok_or_else(|| ExtractError::WrongType {
            path: display_path(&path[..depth]),
            expected: JsonKind::Object,
            found: JsonKind::of(current),
        })?;

        current = object
            .get(key.as_ref())
            .ok_or_else(|| ExtractError::Missing {
                path: display_path(&path[..=depth]),
            })?;
    }

    Ok(current)
}

/// Extract a JSON number as `f64`.
pub fn extract_number<S: AsRef<str>>(tree: &Value, path: &[S]) -> Result<f64, ExtractError> {
    let value = lookup(tree, path)?;
    value.as_f64().ok_or_else(|| ExtractError::WrongType {
        path: display_path(path),
        expected: JsonKind::Number,
        found: JsonKind::of(value),
    })
}

/// Extract a JSON string.
pub fn extract_string<'a, S: AsRef<str>>(
    tree: &'a Value,
    path: &[S],
) -> Result<&'a str, ExtractError> {
    let value = lookup(tree, path)?;
    value.as_str().ok_or_else(|| ExtractError::WrongType {
        path: display_path(path),
        expected: JsonKind::String,
        found: JsonKind::of(value),
    })
}

/// Extract a JSON array.
pub fn extract_array<'a, S: AsRef<str>>(
    tree: &'a Value,
    path: &[S],
) -> Result<&'a [Value], ExtractError> {
    let value = lookup(tree, path)?;
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ExtractError::WrongType {
            path: display_path(path),
            expected: JsonKind::Array,
            found: JsonKind::of(value),
        })
}

/// Extract the number of elements of a JSON array.
pub fn extract_array_length<S: AsRef<str>>(tree: &Value, path: &[S]) -> Result<usize, ExtractError> {
    extract_array(tree, path).map(<[Value]>::len)
}

/// Extract a counter that may be encoded either as a JSON number or as a
/// decimal string.
///
/// Strings that do not parse as an integer read as `0`, matching how the
/// Mastodon activity endpoint is consumed in practice.
pub fn extract_lenient_count<S: AsRef<str>>(tree: &Value, path: &[S]) -> Result<f64, ExtractError> {
    let value = lookup(tree, path)?;
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| ExtractError::WrongType {
            path: display_path(path),
            expected: JsonKind::Number,
            found: JsonKind::Number,
        }),
        Value::String(s) => Ok(s.parse::<i64>().map(|n| n as f64).unwrap_or(0.0)),
        other => Err(ExtractError::WrongType {
            path: display_path(path),
            expected: JsonKind::String,
            found: JsonKind::of(other),
        }),
    }
}
