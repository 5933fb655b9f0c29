//! SQL injection detection module
//!
//! Detects common SQL injection patterns in query parameters, body fields, the URL
//! path and the `cookie` header.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::RequestSurface;

/// SQL injection attack patterns
static SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Union-based injection
        Regex::new(r"(?i)\bunion\b(\s+(all|distinct))?\s+\(?\s*select\b").expect("valid regex"),
        // Tautology / auth bypass
        Regex::new(r#"(?i)['"]\s*(or|and)\s+['"]?\w+['"]?\s*=\s*['"]?\w*"#).expect("valid regex"),
        Regex::new(r"(?i)\b(or|and)\b\s+\d+\s*=\s*\d+").expect("valid regex"),
        Regex::new(r#"(?i)['"]\s*(or|and)\s*['"]['"]?\s*=\s*['"]"#).expect("valid regex"),
        // Comment truncation: only when the comment closes out the value
        Regex::new(r#"['"]\s*\)*\s*(--|#)[\s-]*$"#).expect("valid regex"),
        Regex::new(r#"['"]\s*\)*\s*/\*"#).expect("valid regex"),
        // Stacked statements
        Regex::new(r"(?i);\s*(drop|delete|update|insert|truncate|alter|exec|shutdown)\b")
            .expect("valid regex"),
        // Time-based blind injection
        Regex::new(r"(?i)\b(sleep|benchmark|pg_sleep)\s*\(").expect("valid regex"),
        Regex::new(r"(?i)\bwaitfor\s+delay\b").expect("valid regex"),
        // Schema probing
        Regex::new(r"(?i)\binformation_schema\b").expect("valid regex"),
        Regex::new(r"(?i)\b(sqlite_master|pg_catalog|sysobjects|mysql\.user)\b")
            .expect("valid regex"),
        // SQL execution
        Regex::new(r"(?i)\b(xp_cmdshell|sp_executesql)\b").expect("valid regex"),
    ]
});

/// Nesting limit for body traversal; deeper levels are ignored
const MAX_BODY_DEPTH: usize = 16;

/// Check a single string for SQL injection patterns
fn check_string(input: &str) -> bool {
    if input.len() < 3 {
        return false;
    }

    // URL decode first, payloads often arrive double-encoded
    let decoded = urlencoding::decode(input).unwrap_or(std::borrow::Cow::Borrowed(input));

    SQL_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&decoded))
}

/// Walk a JSON value, checking every key and scalar leaf
fn check_value(value: &Value, depth: usize) -> bool {
    if depth > MAX_BODY_DEPTH {
        return false;
    }

    match value {
        Value::String(s) => check_string(s),
        Value::Number(n) => check_string(&n.to_string()),
        Value::Array(items) => items.iter().any(|item| check_value(item, depth + 1)),
        Value::Object(fields) => fields
            .iter()
            .any(|(key, item)| check_string(key) || check_value(item, depth + 1)),
        Value::Null | Value::Bool(_) => false,
    }
}

/// Does any scanned surface of the request carry an injection payload?
pub fn detect_sql_injection(surface: &RequestSurface) -> bool {
    if surface.query.iter().any(|(_, value)| check_string(value)) {
        return true;
    }

    if let Some(body) = &surface.body
        && check_value(body, 0)
    {
        return true;
    }

    if check_string(&surface.path) {
        return true;
    }

    surface.header("cookie").is_some_and(check_string)
}
