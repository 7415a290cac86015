//! Typed readers over a tool's JSON arguments
//!
//! Absent keys and explicit `null` are treated the same way. Range checks
//! mirror the limits each backend enforces server-side so that a bad value
//! fails fast with `InvalidArgument` instead of a remote 400.

use crate::error::BackendError;
use serde_json::{Map, Value};

/// Arguments of one tool call
pub type Arguments = Map<String, Value>;

fn field<'a>(args: &'a Arguments, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

pub fn opt_str<'a>(args: &'a Arguments, key: &str) -> Result<Option<&'a str>, BackendError> {
    match field(args, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim())),
        Some(_) => Err(BackendError::invalid_argument(format!(
            "'{key}' must be a string"
        ))),
    }
}

pub fn req_str<'a>(args: &'a Arguments, key: &str) -> Result<&'a str, BackendError> {
    match opt_str(args, key)? {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(BackendError::invalid_argument(format!(
            "'{key}' is required"
        ))),
    }
}

pub fn opt_bool(args: &Arguments, key: &str) -> Result<Option<bool>, BackendError> {
    match field(args, key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(BackendError::invalid_argument(format!(
            "'{key}' must be a boolean"
        ))),
    }
}

pub fn opt_int(args: &Arguments, key: &str) -> Result<Option<i64>, BackendError> {
    match field(args, key) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            BackendError::invalid_argument(format!("'{key}' must be an integer"))
        }),
    }
}

pub fn req_int(args: &Arguments, key: &str) -> Result<i64, BackendError> {
    opt_int(args, key)?
        .ok_or_else(|| BackendError::invalid_argument(format!("'{key}' is required")))
}

/// Integer in `min..=max`, falling back to `default` when absent
pub fn bounded_int(
    args: &Arguments,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, BackendError> {
    let value = opt_int(args, key)?.unwrap_or(default);
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(BackendError::invalid_argument(format!(
            "'{key}' must be between {min} and {max}, got {value}"
        )))
    }
}

pub fn opt_object<'a>(
    args: &'a Arguments,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, BackendError> {
    match field(args, key) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(BackendError::invalid_argument(format!(
            "'{key}' must be an object"
        ))),
    }
}

/// String no longer than `max` characters
pub fn check_len(key: &str, value: &str, max: usize) -> Result<(), BackendError> {
    if value.chars().count() > max {
        return Err(BackendError::invalid_argument(format!(
            "'{key}' must be at most {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendErrorKind;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            _ => Arguments::new(),
        }
    }

    #[test]
    fn test_null_is_absent() {
        let a = args(json!({"project": null, "limit": null}));
        assert_eq!(opt_str(&a, "project").unwrap(), None);
        assert_eq!(bounded_int(&a, "limit", 50, 1, 100).unwrap(), 50);
    }

    #[test]
    fn test_required_string_rejects_blank() {
        let a = args(json!({"name": "   "}));
        let err = req_str(&a, "name").unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidArgument);
        assert!(err.message.contains("'name'"));
    }

    #[test]
    fn test_bounded_int_enforces_range() {
        let a = args(json!({"limit": 500}));
        let err = bounded_int(&a, "limit", 50, 1, 100).unwrap_err();
        assert!(err.message.contains("between 1 and 100"));
    }

    #[test]
    fn test_wrong_types_are_reported() {
        let a = args(json!({"completed": "yes", "data": [1, 2]}));
        assert!(opt_bool(&a, "completed").is_err());
        assert!(opt_object(&a, "data").is_err());
    }
}
