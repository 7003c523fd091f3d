use crate::utils::text::truncate_utf8_prefix;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

const DEFAULT_REDACTION: &str = "[REDACTED]";
const INLINE_REDACTION: &str = "***REDACTED***";

static SENSITIVE_KEYS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password",
        "passwd",
        "secret",
        "token",
        "auth_token",
        "authorization",
        "mysql_pwd",
        "envs",
    ]
    .into_iter()
    .collect()
});

// user/"password"@host:port/db, the sqlplus connect string.
static SQLPLUS_CREDENTIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^([^/\s]+)/"[^"]*"@"#).expect("sqlplus redaction regex"));

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('-', "_")
}

pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS.contains(normalize_key(key).as_str())
}

fn truncate_string(value: &str, max_length: usize) -> String {
    if max_length == 0 {
        return "".to_string();
    }
    if value.len() <= max_length {
        return value.to_string();
    }
    format!("{}...", truncate_utf8_prefix(value, max_length))
}

/// Replaces every occurrence of the given secret values, then truncates.
pub fn redact_text(value: &str, max_string: usize, extra_secrets: &[&str]) -> String {
    let mut out = value.to_string();
    for raw in extra_secrets {
        let needle = raw.trim();
        if needle.len() < 4 {
            continue;
        }
        out = out.replace(needle, INLINE_REDACTION);
    }
    truncate_string(&out, max_string)
}

/// Masks credentials embedded in process arguments before they are logged.
pub fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            SQLPLUS_CREDENTIALS
                .replace(arg, format!("$1/\"{}\"@", DEFAULT_REDACTION).as_str())
                .to_string()
        })
        .collect()
}

pub fn redact_object(value: &Value, max_string: usize) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(text) => Value::String(truncate_string(text, max_string)),
        Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_object(item, max_string))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map.iter() {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(DEFAULT_REDACTION.to_string()));
                    continue;
                }
                out.insert(key.clone(), redact_object(entry, max_string));
            }
            Value::Object(out)
        }
    }
}
