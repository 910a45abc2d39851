// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed accessors for validated argument objects.
//!
//! Executors run these after [`Schema::parse`](crate::Schema::parse) has
//! accepted the payload; the accessors still type-check so that a handler
//! reading a field its schema forgot to declare fails loudly rather than
//! silently defaulting.

use c64b_error::BridgeError;
use serde_json::Value;

/// Read a required string field.
pub fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, BridgeError> {
    match arguments.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(
            BridgeError::validation("expected string", format!("$.{key}"))
                .with_details(other.clone()),
        ),
        None => Err(BridgeError::validation(
            "missing required field",
            format!("$.{key}"),
        )),
    }
}

/// Read an optional string field.
pub fn opt_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

/// Read an optional string field with a default.
pub fn str_or<'a>(arguments: &'a Value, key: &str, default: &'a str) -> &'a str {
    opt_str(arguments, key).unwrap_or(default)
}

/// Read an optional unsigned integer field.
pub fn opt_u64(arguments: &Value, key: &str) -> Result<Option<u64>, BridgeError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            BridgeError::validation("expected unsigned integer", format!("$.{key}"))
                .with_details(value.clone())
        }),
    }
}

/// Read an optional unsigned integer field with a default.
pub fn u64_or(arguments: &Value, key: &str, default: u64) -> Result<u64, BridgeError> {
    Ok(opt_u64(arguments, key)?.unwrap_or(default))
}

/// Read an optional boolean field with a default.
pub fn bool_or(arguments: &Value, key: &str, default: bool) -> Result<bool, BridgeError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(
            BridgeError::validation("expected boolean", format!("$.{key}"))
                .with_details(other.clone()),
        ),
    }
}

/// Read an optional raw value field.
pub fn opt_value<'a>(arguments: &'a Value, key: &str) -> Option<&'a Value> {
    match arguments.get(key) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

/// Read an optional list of strings.
pub fn opt_str_list(arguments: &Value, key: &str) -> Result<Option<Vec<String>>, BridgeError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        return Err(BridgeError::validation(
                            "expected string",
                            format!("$.{key}[{i}]"),
                        )
                        .with_details(item.clone()));
                    }
                }
            }
            Ok(Some(out))
        }
        Some(other) => Err(
            BridgeError::validation("expected array", format!("$.{key}"))
                .with_details(other.clone()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_str_reads_and_reports() {
        let args = json!({"name": "poll", "count": 3});
        assert_eq!(required_str(&args, "name").unwrap(), "poll");
        let err = required_str(&args, "missing").unwrap_err();
        assert_eq!(err.to_string(), "missing required field (at $.missing)");
        let err = required_str(&args, "count").unwrap_err();
        assert_eq!(err.to_string(), "expected string (at $.count)");
    }

    #[test]
    fn defaults_apply_when_absent() {
        let args = json!({});
        assert_eq!(str_or(&args, "address", "$0400"), "$0400");
        assert_eq!(u64_or(&args, "intervalMs", 1000).unwrap(), 1000);
        assert!(bool_or(&args, "pauseDuringRead", true).unwrap());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let args = json!({"intervalMs": 5, "pauseDuringRead": false});
        assert_eq!(u64_or(&args, "intervalMs", 1000).unwrap(), 5);
        assert!(!bool_or(&args, "pauseDuringRead", true).unwrap());
    }

    #[test]
    fn type_mismatches_carry_field_paths() {
        let args = json!({"intervalMs": "soon", "flag": 1});
        let err = u64_or(&args, "intervalMs", 1000).unwrap_err();
        assert!(err.to_string().contains("$.intervalMs"));
        let err = bool_or(&args, "flag", false).unwrap_err();
        assert!(err.to_string().contains("$.flag"));
    }

    #[test]
    fn null_counts_as_absent() {
        let args = json!({"maxIterations": null});
        assert_eq!(opt_u64(&args, "maxIterations").unwrap(), None);
        assert!(opt_value(&args, "maxIterations").is_none());
    }

    #[test]
    fn str_list_validates_elements() {
        let args = json!({"extensions": ["prg", "crt"]});
        assert_eq!(
            opt_str_list(&args, "extensions").unwrap().unwrap(),
            vec!["prg", "crt"]
        );
        let bad = json!({"extensions": ["prg", 7]});
        let err = opt_str_list(&bad, "extensions").unwrap_err();
        assert!(err.to_string().contains("$.extensions[1]"));
    }
}
