//! Conversion between script values and JSON text.

use super::{Interpreter, ObjectKind, ObjectRef, Slot, Value};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonError {
    #[error("Converting circular structure to JSON")]
    Circular,
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// `JSON.stringify(value)`; `None` where the result is `undefined`.
pub fn stringify(value: &Value) -> Result<Option<String>, JsonError> {
    let Some(json) = to_json(value)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::to_string(&json)?))
}

/// `JSON.stringify(value, null, indent)`.
pub fn stringify_pretty(value: &Value, indent: &str) -> Result<Option<String>, JsonError> {
    let Some(json) = to_json(value)? else {
        return Ok(None);
    };
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    json.serialize(&mut serializer)?;
    Ok(Some(String::from_utf8_lossy(&out).into_owned()))
}

pub fn to_json(value: &Value) -> Result<Option<serde_json::Value>, JsonError> {
    let mut stack = Vec::new();
    encode(value, &mut stack)
}

fn encode(value: &Value, stack: &mut Vec<usize>) -> Result<Option<serde_json::Value>, JsonError> {
    Ok(Some(match value {
        Value::Undefined => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Object(object) => {
            if object.is_function() {
                return Ok(None);
            }
            if stack.contains(&object.addr()) {
                return Err(JsonError::Circular);
            }
            stack.push(object.addr());
            let encoded = encode_object(object, stack);
            stack.pop();
            encoded?
        }
    }))
}

fn encode_object(object: &ObjectRef, stack: &mut Vec<usize>) -> Result<serde_json::Value, JsonError> {
    if let Some(elements) = object.array_elements() {
        let mut items = Vec::with_capacity(elements.len());
        for element in &elements {
            items.push(encode(element, stack)?.unwrap_or(serde_json::Value::Null));
        }
        return Ok(serde_json::Value::Array(items));
    }

    let entries: Vec<(String, Value)> = object
        .borrow()
        .properties
        .iter()
        .filter_map(|(key, slot)| match slot {
            Slot::Data(value) => Some((key.clone(), value.clone())),
            Slot::Trap(_) => None,
        })
        .collect();
    let mut map = serde_json::Map::new();
    for (key, value) in entries {
        if let Some(encoded) = encode(&value, stack)? {
            map.insert(key, encoded);
        }
    }
    Ok(serde_json::Value::Object(map))
}

fn number(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Builds script values from parsed JSON.
pub fn from_json(interp: &Interpreter, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => Value::Object(
            interp.new_array(items.iter().map(|item| from_json(interp, item)).collect()),
        ),
        serde_json::Value::Object(map) => {
            let object = interp.new_object();
            for (key, value) in map {
                object.set_own(key, from_json(interp, value));
            }
            Value::Object(object)
        }
    }
}

/// True for values `JSON.stringify` would encode as an object or array.
pub fn is_structured(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| !matches!(object.borrow().kind, ObjectKind::Function(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_have_no_fraction() {
        assert_eq!(stringify(&Value::Number(5.0)).unwrap().as_deref(), Some("5"));
        assert_eq!(stringify(&Value::Number(0.5)).unwrap().as_deref(), Some("0.5"));
        assert_eq!(stringify(&Value::Number(f64::NAN)).unwrap().as_deref(), Some("null"));
    }

    #[test]
    fn test_undefined_and_functions_are_skipped() {
        let interp = Interpreter::new();
        let object = interp.new_object();
        object.set_own("a", Value::Number(1.0));
        object.set_own("b", Value::Undefined);
        let array = interp.new_array(vec![Value::Undefined, Value::Bool(true)]);
        object.set_own("c", Value::Object(array));
        assert_eq!(
            stringify(&Value::Object(object)).unwrap().as_deref(),
            Some(r#"{"a":1,"c":[null,true]}"#)
        );
        assert_eq!(stringify(&Value::Undefined).unwrap(), None);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let interp = Interpreter::new();
        let object = interp.new_object();
        object.set_own("me", Value::Object(object.clone()));
        assert!(matches!(stringify(&Value::Object(object)), Err(JsonError::Circular)));
    }

    #[test]
    fn test_parse_keeps_key_order() {
        let interp = Interpreter::new();
        let json: serde_json::Value = serde_json::from_str(r#"{"z":1,"a":[2,3]}"#).unwrap();
        let value = from_json(&interp, &json);
        assert_eq!(value.as_object().unwrap().own_keys(), vec!["z", "a"]);
    }
}
