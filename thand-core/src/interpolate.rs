//! Provider configuration interpolation
//!
//! Configuration values may embed `${ <expr> }` expressions, where the
//! expression is a jq-style dot path evaluated against the merged
//! env + input document. `.` is the root. A value that is exactly one
//! expression keeps the resolved JSON type; mixed text renders matches
//! into the surrounding string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::{ConfigError, ThandResult};

static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{\s*([^}]*?)\s*\}").expect("expression regex"));

/// Build the interpolation root: process environment variables overlaid
/// with the caller's input map (input wins on key collisions). The
/// environment is additionally nested under `env` so `.env.HOME` and
/// `.HOME` both resolve.
pub fn merged_environment(input: &HashMap<String, Value>) -> Value {
    let mut root = serde_json::Map::new();
    let mut env = serde_json::Map::new();
    for (key, value) in std::env::vars() {
        root.insert(key.clone(), Value::String(value.clone()));
        env.insert(key, Value::String(value));
    }
    root.insert("env".to_string(), Value::Object(env));
    for (key, value) in input {
        root.insert(key.clone(), value.clone());
    }
    Value::Object(root)
}

/// Resolve one dot-path expression against the root document.
pub fn resolve_expression(expression: &str, root: &Value) -> ThandResult<Value> {
    let path = expression.trim();
    if path.is_empty() {
        return Err(ConfigError::Interpolation {
            expression: expression.to_string(),
            reason: "empty expression".to_string(),
        }
        .into());
    }
    if path == "." {
        return Ok(root.clone());
    }

    let mut current = root;
    for segment in path.trim_start_matches('.').split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Object(map) => map.get(segment),
            // Numeric segments index into arrays: .groups.0
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(|| ConfigError::Interpolation {
            expression: expression.to_string(),
            reason: format!("path segment `{segment}` not found"),
        })?;
    }
    Ok(current.clone())
}

/// Render a resolved value into surrounding text.
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Interpolate every string in a JSON value, recursing through arrays
/// and objects.
pub fn interpolate_value(value: &Value, root: &Value) -> ThandResult<Value> {
    match value {
        Value::String(text) => interpolate_string(text, root),
        Value::Array(items) => items
            .iter()
            .map(|item| interpolate_value(item, root))
            .collect::<ThandResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate_value(item, root)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn interpolate_string(text: &str, root: &Value) -> ThandResult<Value> {
    // A string that is exactly one expression keeps the resolved type.
    if let Some(captures) = EXPRESSION.captures(text) {
        if captures.get(0).map(|m| m.as_str()) == Some(text.trim()) {
            return resolve_expression(&captures[1], root);
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for captures in EXPRESSION.captures_iter(text) {
        let whole = captures.get(0).expect("match");
        out.push_str(&text[cursor..whole.start()]);
        out.push_str(&render(&resolve_expression(&captures[1], root)?));
        cursor = whole.end();
    }
    out.push_str(&text[cursor..]);
    Ok(Value::String(out))
}

/// Resolve a provider configuration against env + input.
pub fn interpolate_config(
    config: &HashMap<String, Value>,
    input: &HashMap<String, Value>,
) -> ThandResult<HashMap<String, Value>> {
    let root = merged_environment(input);
    let mut out = HashMap::with_capacity(config.len());
    for (key, value) in config {
        out.insert(key.clone(), interpolate_value(value, &root)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Value {
        json!({
            "region": "eu-west-1",
            "okta": { "domain": "acme.okta.com", "port": 443 },
            "admins": ["alice", "bob"],
        })
    }

    #[test]
    fn test_resolve_dot_paths() {
        assert_eq!(
            resolve_expression(".okta.domain", &root()).expect("resolve"),
            json!("acme.okta.com")
        );
        assert_eq!(
            resolve_expression(".admins.1", &root()).expect("resolve"),
            json!("bob")
        );
        assert_eq!(resolve_expression(".", &root()).expect("resolve"), root());
        assert!(resolve_expression(".okta.missing", &root()).is_err());
    }

    #[test]
    fn test_exact_expression_preserves_type() {
        let resolved = interpolate_value(&json!("${ .okta.port }"), &root()).expect("resolve");
        assert_eq!(resolved, json!(443));
    }

    #[test]
    fn test_mixed_text_renders_inline() {
        let resolved =
            interpolate_value(&json!("https://${ .okta.domain }:${ .okta.port }/"), &root())
                .expect("resolve");
        assert_eq!(resolved, json!("https://acme.okta.com:443/"));
    }

    #[test]
    fn test_recurses_into_containers() {
        let resolved = interpolate_value(
            &json!({"url": "${ .okta.domain }", "tags": ["${ .region }"]}),
            &root(),
        )
        .expect("resolve");
        assert_eq!(resolved, json!({"url": "acme.okta.com", "tags": ["eu-west-1"]}));
    }

    #[test]
    fn test_env_overlay() {
        // Safe to set: test-scoped key unlikely to collide.
        std::env::set_var("THAND_INTERPOLATE_TEST", "from-env");
        let input = HashMap::new();
        let merged = merged_environment(&input);
        assert_eq!(
            resolve_expression(".THAND_INTERPOLATE_TEST", &merged).expect("resolve"),
            json!("from-env")
        );
        assert_eq!(
            resolve_expression(".env.THAND_INTERPOLATE_TEST", &merged).expect("resolve"),
            json!("from-env")
        );
    }

    #[test]
    fn test_input_wins_over_env() {
        std::env::set_var("THAND_COLLIDE", "env-value");
        let mut input = HashMap::new();
        input.insert("THAND_COLLIDE".to_string(), json!("input-value"));
        let merged = merged_environment(&input);
        assert_eq!(
            resolve_expression(".THAND_COLLIDE", &merged).expect("resolve"),
            json!("input-value")
        );
    }
}
