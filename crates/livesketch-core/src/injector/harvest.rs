//! Turning shadow-run bindings into comparable text.

use crate::interpreter::json::{self, JsonError};
use crate::interpreter::{function_to_string, to_display, Effect, Fault, Interpreter, ObjectRef, Value};
use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error("`__id` failed")]
    Id,
}

/// How a harvested binding compares against the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Serialized {
    Text(String),
    /// Not serializable; only its members were extracted.
    Opaque,
}

/// Everything a previous inject remembered about the script.
#[derive(Debug, Clone, Default)]
pub struct HarvestSnapshot {
    pub bindings: IndexMap<String, Serialized>,
    /// `Name['m']` / `Name.prototype['m']` to function source.
    pub members: IndexMap<String, String>,
    /// Global names of the script that produced this snapshot.
    pub globals: IndexSet<String>,
    /// Serialized instance list, `None` when it could not be serialized.
    pub instances: Option<String>,
}

impl HarvestSnapshot {
    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Executable text for `value`; the result need not be valid JSON.
///
/// Functions become their source, objects with an `__id` method the result
/// of that method, and arrays a comma-separated list of their elements.
pub fn serialize(interp: &mut Interpreter, value: &Value) -> Result<String, SerializeError> {
    if let Value::Object(object) = value {
        if let Some(source) = function_to_string(object) {
            return Ok(source);
        }
        let id = interp.get(value, "__id").map_err(|_| SerializeError::Id)?;
        if id.truthy() {
            let text = interp.call(&id, value.clone(), &[]).map_err(|_| SerializeError::Id)?;
            return Ok(to_display(&text));
        }
        if let Some(elements) = object.array_elements() {
            return serialize_list(interp, &elements);
        }
    }
    if value.is_undefined() {
        return Ok("undefined".to_string());
    }
    Ok(json::stringify(value)?.unwrap_or_else(|| "undefined".to_string()))
}

pub fn serialize_list(interp: &mut Interpreter, values: &[Value]) -> Result<String, SerializeError> {
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        parts.push(serialize(interp, value)?);
    }
    Ok(parts.join(", "))
}

/// Copies the members of `value` (or of `value[proto]`) onto the live
/// binding `name`, recording function members as source.
///
/// The live binding is replaced by an empty value of the same shape when it
/// is missing or falsy. Keys containing `__` are private and skipped.
pub fn object_extract(
    interp: &mut Interpreter,
    env: &ObjectRef,
    members: &mut IndexMap<String, String>,
    name: &str,
    value: &Value,
    proto: Option<&str>,
) -> Result<(), Fault> {
    if !env.get_own(name).is_some_and(|live| live.truthy()) {
        let placeholder = placeholder_like(interp, value);
        env.set_own(name, Value::Object(placeholder));
    }

    let source = match proto {
        Some(proto) => interp.get(value, proto)?,
        None => value.clone(),
    };
    let Some(source_object) = source.as_object() else {
        return Ok(());
    };

    let prefix = match proto {
        Some(proto) => format!("{name}.{proto}"),
        None => name.to_string(),
    };
    for key in source_object.own_keys() {
        if key.contains("__") || is_hidden(source_object, proto, &key) {
            continue;
        }
        let Some(member) = source_object.get_own(&key) else {
            continue;
        };
        if let Some(src) = member.as_object().and_then(function_to_string) {
            members.insert(format!("{prefix}['{key}']"), src);
        } else {
            let mut output = Value::Object(env.clone());
            output = interp.get(&output, name)?;
            if let Some(proto) = proto {
                output = interp.get(&output, proto)?;
            }
            if output.as_object().is_some() {
                interp.set(&output, &key, member)?;
            }
        }
    }
    Ok(())
}

/// Keys a `for...in` over the value would not visit.
fn is_hidden(object: &ObjectRef, proto: Option<&str>, key: &str) -> bool {
    (object.is_function() && key == "prototype") || (proto.is_some() && key == "constructor")
}

fn placeholder_like(interp: &Interpreter, value: &Value) -> ObjectRef {
    match value.as_object() {
        Some(object) if object.is_array() => interp.new_array(Vec::new()),
        Some(object) if object.is_function() => {
            let function = interp.new_native("", Effect::Pure, |_, _, _| Ok(Value::Undefined));
            let prototype = interp.new_object();
            prototype.set_own("constructor", Value::Object(function.clone()));
            function.set_own("prototype", Value::Object(prototype));
            function
        }
        _ => interp.new_object(),
    }
}

/// Base binding of a member key: `Foo` for `Foo.prototype['m']`.
pub fn member_base(key: &str) -> &str {
    let end = key.find(['.', '[']).unwrap_or(key.len());
    &key[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_by_kind() {
        let mut interp = Interpreter::new();
        let array = interp.new_array(vec![Value::Number(1.0), Value::string("a")]);
        assert_eq!(serialize(&mut interp, &Value::Object(array)).unwrap(), r#"1, "a""#);
        assert_eq!(serialize(&mut interp, &Value::Undefined).unwrap(), "undefined");

        let object = interp.new_object();
        object.set_own("x", Value::Number(2.0));
        assert_eq!(serialize(&mut interp, &Value::Object(object)).unwrap(), r#"{"x":2}"#);

        let native = interp.new_native("fill", Effect::Mutating, |_, _, _| Ok(Value::Undefined));
        assert_eq!(
            serialize(&mut interp, &Value::Object(native)).unwrap(),
            "function fill() { [native code] }"
        );
    }

    #[test]
    fn test_serialize_prefers_id() {
        let mut interp = Interpreter::new();
        let image = interp.new_object();
        let id = interp.new_native("__id", Effect::Pure, |_, _, _| Ok(Value::string("getImage('cute/Blank')")));
        image.set_own("__id", Value::Object(id));
        assert_eq!(serialize(&mut interp, &Value::Object(image)).unwrap(), "getImage('cute/Blank')");
    }

    #[test]
    fn test_cycles_fail_to_serialize() {
        let mut interp = Interpreter::new();
        let object = interp.new_object();
        object.set_own("me", Value::Object(object.clone()));
        assert!(serialize(&mut interp, &Value::Object(object)).is_err());
    }

    #[test]
    fn test_object_extract_copies_data_and_records_functions() {
        let mut interp = Interpreter::new();
        let env = interp.new_object();
        let value = interp.new_object();
        value.set_own("size", Value::Number(3.0));
        value.set_own("__id", Value::Number(1.0));
        let method = interp.new_native("go", Effect::Pure, |_, _, _| Ok(Value::Undefined));
        value.set_own("go", Value::Object(method));

        let mut members = IndexMap::new();
        object_extract(&mut interp, &env, &mut members, "thing", &Value::Object(value), None).unwrap();

        let live = env.get_own("thing").unwrap();
        let live = live.as_object().unwrap();
        assert_eq!(live.get_own("size").and_then(|s| s.as_number()), Some(3.0));
        assert!(!live.has_own("__id"));
        assert_eq!(members.keys().collect::<Vec<_>>(), ["thing['go']"]);
    }

    #[test]
    fn test_member_base() {
        assert_eq!(member_base("Foo.prototype['m']"), "Foo");
        assert_eq!(member_base("bar['x']"), "bar");
    }
}
