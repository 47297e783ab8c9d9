use serde_json::{Map, Value};

use crate::error::LookupError;

/// Picks the one result of a code or value lookup.
///
/// A list yields its first element; anything else is taken as the result
/// itself.
pub fn reconcile_single(value: Value) -> Result<Value, LookupError> {
    match value {
        Value::Array(items) => items.into_iter().next().ok_or(LookupError::EmptyResult),
        other => Ok(other),
    }
}

/// Collects the results of an image identification.
///
/// Accepted shapes: a list of records, a single record with a `code`, or an
/// object wrapping the list in `colors`.
pub fn reconcile_multi(value: Value) -> Result<Vec<Value>, LookupError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(object) if has_code(&object) => Ok(vec![Value::Object(object)]),
        Value::Object(mut object) => match object.remove("colors") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(LookupError::UnexpectedShape),
        },
        _ => Err(LookupError::UnexpectedShape),
    }
}

fn has_code(object: &Map<String, Value>) -> bool {
    match object.get("code") {
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().map_or(true, |value| value != 0.0),
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}
