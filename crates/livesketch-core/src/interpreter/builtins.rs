//! Standard library exposed to sketches.

use super::json::{self, JsonError};
use super::{
    function_to_string, thrown_message, to_display, to_number, Effect, Fault, Interpreter,
    JsObject, ObjectKind, ObjectRef, Value,
};
use crate::codegen::format_number;
use std::cmp::Ordering;
use std::rc::Rc;

type NativeResult = Result<Value, Fault>;

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    to_number(&arg(args, index))
}

fn define<F>(interp: &Interpreter, target: &ObjectRef, name: &'static str, func: F)
where
    F: Fn(&mut Interpreter, &Value, &[Value]) -> NativeResult + 'static,
{
    let native = interp.new_native(name, Effect::Pure, func);
    target.set_own(name, Value::Object(native));
}

fn link_constructor(constructor: &ObjectRef, prototype: &ObjectRef) {
    constructor.set_own("prototype", Value::Object(prototype.clone()));
    prototype.set_own("constructor", Value::Object(constructor.clone()));
}

pub(super) fn install_prototypes(interp: &mut Interpreter) {
    object_prototype(interp);
    function_prototype(interp);
    array_prototype(interp);
    string_prototype(interp);
    number_prototype(interp);
    error_prototype(interp);
}

fn object_prototype(interp: &Interpreter) {
    let proto = interp.realm.object_prototype.clone();
    define(interp, &proto, "hasOwnProperty", |_, this, args| {
        let key = to_display(&arg(args, 0));
        Ok(Value::Bool(match this {
            Value::Object(object) => object.has_own(&key),
            Value::String(s) => {
                key == "length" || super::array_index(&key).is_some_and(|i| i < s.chars().count())
            }
            _ => false,
        }))
    });
    define(interp, &proto, "toString", |_, this, _| {
        Ok(Value::string(match this {
            Value::Object(object) if matches!(object.borrow().kind, ObjectKind::Error) => {
                to_display(this)
            }
            Value::Object(object) if !object.is_array() && !object.is_function() => {
                "[object Object]".to_string()
            }
            other => to_display(other),
        }))
    });
}

fn function_prototype(interp: &Interpreter) {
    let proto = interp.realm.function_prototype.clone();
    define(interp, &proto, "call", |interp, this, args| {
        let rest = args.get(1..).unwrap_or(&[]);
        interp.call(this, arg(args, 0), rest)
    });
    define(interp, &proto, "apply", |interp, this, args| {
        let list = match arg(args, 1) {
            Value::Object(object) => object.array_elements().unwrap_or_default(),
            _ => Vec::new(),
        };
        interp.call(this, arg(args, 0), &list)
    });
    define(interp, &proto, "toString", |interp, this, _| match this.as_object().and_then(function_to_string) {
        Some(source) => Ok(Value::from(source)),
        None => Err(interp.type_error("Function.prototype.toString requires a function")),
    });
}

fn this_array(interp: &Interpreter, this: &Value) -> Result<ObjectRef, Fault> {
    match this {
        Value::Object(object) if object.is_array() => Ok(object.clone()),
        _ => Err(interp.type_error("Array method called on a non-array")),
    }
}

fn with_elements<R>(array: &ObjectRef, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
    let mut object = array.borrow_mut();
    match &mut object.kind {
        ObjectKind::Array(elements) => f(elements),
        _ => f(&mut Vec::new()),
    }
}

fn length_of(array: &ObjectRef) -> usize {
    with_elements(array, |elements| elements.len())
}

fn element_at(array: &ObjectRef, index: usize) -> Value {
    with_elements(array, |elements| elements.get(index).cloned().unwrap_or_default())
}

/// Resolves a possibly negative relative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = to_number(value);
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

/// Calls `callback(element, index, array)` for each index present when it is reached.
fn for_each_element<F>(interp: &mut Interpreter, this: &Value, args: &[Value], mut visit: F) -> Result<(), Fault>
where
    F: FnMut(Value, Value) -> bool,
{
    let array = this_array(interp, this)?;
    let callback = arg(args, 0);
    if !callback.is_function() {
        return Err(interp.type_error(format!("{} is not a function", to_display(&callback))));
    }
    let this_arg = arg(args, 1);
    let len = length_of(&array);
    for index in 0..len {
        if index >= length_of(&array) {
            break;
        }
        let element = element_at(&array, index);
        let result = interp.call(
            &callback,
            this_arg.clone(),
            &[element.clone(), Value::Number(index as f64), Value::Object(array.clone())],
        )?;
        if !visit(element, result) {
            break;
        }
    }
    Ok(())
}

fn array_prototype(interp: &Interpreter) {
    let proto = interp.realm.array_prototype.clone();

    define(interp, &proto, "push", |interp, this, args| {
        let array = this_array(interp, this)?;
        let len = with_elements(&array, |elements| {
            elements.extend_from_slice(args);
            elements.len()
        });
        Ok(Value::Number(len as f64))
    });
    define(interp, &proto, "pop", |interp, this, _| {
        let array = this_array(interp, this)?;
        Ok(with_elements(&array, |elements| elements.pop()).unwrap_or_default())
    });
    define(interp, &proto, "shift", |interp, this, _| {
        let array = this_array(interp, this)?;
        Ok(with_elements(&array, |elements| {
            if elements.is_empty() {
                Value::Undefined
            } else {
                elements.remove(0)
            }
        }))
    });
    define(interp, &proto, "unshift", |interp, this, args| {
        let array = this_array(interp, this)?;
        let len = with_elements(&array, |elements| {
            elements.splice(0..0, args.iter().cloned());
            elements.len()
        });
        Ok(Value::Number(len as f64))
    });
    define(interp, &proto, "splice", |interp, this, args| {
        let array = this_array(interp, this)?;
        let len = length_of(&array);
        let start = relative_index(&arg(args, 0), len, 0);
        let delete_count = if args.len() < 2 {
            len - start
        } else {
            (number_arg(args, 1).max(0.0) as usize).min(len - start)
        };
        let inserted = args.get(2..).unwrap_or(&[]).to_vec();
        let removed: Vec<Value> = with_elements(&array, |elements| {
            elements.splice(start..start + delete_count, inserted).collect()
        });
        Ok(Value::Object(interp.new_array(removed)))
    });
    define(interp, &proto, "slice", |interp, this, args| {
        let array = this_array(interp, this)?;
        let elements = array.array_elements().unwrap_or_default();
        let len = elements.len();
        let start = relative_index(&arg(args, 0), len, 0);
        let end = relative_index(&arg(args, 1), len, len);
        let slice = if start < end { elements[start..end].to_vec() } else { Vec::new() };
        Ok(Value::Object(interp.new_array(slice)))
    });
    define(interp, &proto, "indexOf", |interp, this, args| {
        let array = this_array(interp, this)?;
        let needle = arg(args, 0);
        let elements = array.array_elements().unwrap_or_default();
        let from = relative_index(&arg(args, 1), elements.len(), 0);
        let found = elements
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, e)| e.strict_equals(&needle))
            .map(|(i, _)| i as f64);
        Ok(Value::Number(found.unwrap_or(-1.0)))
    });
    define(interp, &proto, "includes", |interp, this, args| {
        let array = this_array(interp, this)?;
        let needle = arg(args, 0);
        let elements = array.array_elements().unwrap_or_default();
        Ok(Value::Bool(elements.iter().any(|e| e.same_value(&needle))))
    });
    define(interp, &proto, "join", |interp, this, args| {
        let array = this_array(interp, this)?;
        let separator = match arg(args, 0) {
            Value::Undefined => ",".to_string(),
            other => to_display(&other),
        };
        let elements = array.array_elements().unwrap_or_default();
        let parts: Vec<String> = elements
            .iter()
            .map(|e| if e.is_nullish() { String::new() } else { to_display(e) })
            .collect();
        Ok(Value::from(parts.join(&separator)))
    });
    define(interp, &proto, "toString", |interp, this, _| {
        let array = this_array(interp, this)?;
        Ok(Value::from(to_display(&Value::Object(array))))
    });
    define(interp, &proto, "concat", |interp, this, args| {
        let array = this_array(interp, this)?;
        let mut result = array.array_elements().unwrap_or_default();
        for value in args {
            match value.as_object().and_then(ObjectRef::array_elements) {
                Some(elements) => result.extend(elements),
                None => result.push(value.clone()),
            }
        }
        Ok(Value::Object(interp.new_array(result)))
    });
    define(interp, &proto, "reverse", |interp, this, _| {
        let array = this_array(interp, this)?;
        with_elements(&array, |elements| elements.reverse());
        Ok(this.clone())
    });
    define(interp, &proto, "forEach", |interp, this, args| {
        for_each_element(interp, this, args, |_, _| true)?;
        Ok(Value::Undefined)
    });
    define(interp, &proto, "map", |interp, this, args| {
        let mut mapped = Vec::new();
        for_each_element(interp, this, args, |_, result| {
            mapped.push(result);
            true
        })?;
        Ok(Value::Object(interp.new_array(mapped)))
    });
    define(interp, &proto, "filter", |interp, this, args| {
        let mut kept = Vec::new();
        for_each_element(interp, this, args, |element, result| {
            if result.truthy() {
                kept.push(element);
            }
            true
        })?;
        Ok(Value::Object(interp.new_array(kept)))
    });
    define(interp, &proto, "some", |interp, this, args| {
        let mut any = false;
        for_each_element(interp, this, args, |_, result| {
            any = result.truthy();
            !any
        })?;
        Ok(Value::Bool(any))
    });
    define(interp, &proto, "every", |interp, this, args| {
        let mut all = true;
        for_each_element(interp, this, args, |_, result| {
            all = result.truthy();
            all
        })?;
        Ok(Value::Bool(all))
    });
    define(interp, &proto, "reduce", |interp, this, args| {
        let array = this_array(interp, this)?;
        let callback = arg(args, 0);
        let elements = array.array_elements().unwrap_or_default();
        let mut indices = 0..elements.len();
        let mut accumulator = if args.len() >= 2 {
            arg(args, 1)
        } else {
            match indices.next() {
                Some(first) => elements[first].clone(),
                None => return Err(interp.type_error("Reduce of empty array with no initial value")),
            }
        };
        for index in indices {
            accumulator = interp.call(
                &callback,
                Value::Undefined,
                &[
                    accumulator,
                    elements[index].clone(),
                    Value::Number(index as f64),
                    Value::Object(array.clone()),
                ],
            )?;
        }
        Ok(accumulator)
    });
    define(interp, &proto, "sort", |interp, this, args| {
        let array = this_array(interp, this)?;
        let comparator = arg(args, 0);
        let comparator = comparator.is_function().then_some(comparator);
        let elements = array.array_elements().unwrap_or_default();
        let sorted = merge_sort(interp, elements, comparator.as_ref())?;
        with_elements(&array, |elements| *elements = sorted);
        Ok(this.clone())
    });
}

fn merge_sort(interp: &mut Interpreter, mut values: Vec<Value>, comparator: Option<&Value>) -> Result<Vec<Value>, Fault> {
    if values.len() <= 1 {
        return Ok(values);
    }
    let right = values.split_off(values.len() / 2);
    let left = merge_sort(interp, values, comparator)?;
    let right = merge_sort(interp, right, comparator)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if sort_compare(interp, b, a, comparator)? < 0.0 {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn sort_compare(interp: &mut Interpreter, a: &Value, b: &Value, comparator: Option<&Value>) -> Result<f64, Fault> {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => return Ok(0.0),
        (true, false) => return Ok(1.0),
        (false, true) => return Ok(-1.0),
        (false, false) => {}
    }
    if let Some(comparator) = comparator {
        let result = to_number(&interp.call(comparator, Value::Undefined, &[a.clone(), b.clone()])?);
        return Ok(if result.is_nan() { 0.0 } else { result });
    }
    Ok(match to_display(a).cmp(&to_display(b)) {
        Ordering::Less => -1.0,
        Ordering::Equal => 0.0,
        Ordering::Greater => 1.0,
    })
}

fn this_string(this: &Value) -> Rc<str> {
    match this {
        Value::String(s) => s.clone(),
        other => Rc::from(to_display(other)),
    }
}

fn char_index_of(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn string_prototype(interp: &Interpreter) {
    let proto = interp.realm.string_prototype.clone();

    define(interp, &proto, "charAt", |_, this, args| {
        let s = this_string(this);
        let index = number_arg(args, 0);
        let index = if index.is_nan() { 0.0 } else { index };
        Ok(Value::from(
            (index >= 0.0)
                .then(|| s.chars().nth(index as usize))
                .flatten()
                .map(String::from)
                .unwrap_or_default(),
        ))
    });
    define(interp, &proto, "charCodeAt", |_, this, args| {
        let s = this_string(this);
        let index = number_arg(args, 0);
        let index = if index.is_nan() { 0.0 } else { index };
        Ok(Value::Number(
            (index >= 0.0)
                .then(|| s.chars().nth(index as usize))
                .flatten()
                .map(|c| f64::from(u32::from(c)))
                .unwrap_or(f64::NAN),
        ))
    });
    define(interp, &proto, "indexOf", |_, this, args| {
        let chars: Vec<char> = this_string(this).chars().collect();
        let needle: Vec<char> = to_display(&arg(args, 0)).chars().collect();
        let from = relative_index(&arg(args, 1), chars.len(), 0);
        Ok(Value::Number(
            char_index_of(&chars, &needle, from).map_or(-1.0, |i| i as f64),
        ))
    });
    define(interp, &proto, "slice", |_, this, args| {
        let chars: Vec<char> = this_string(this).chars().collect();
        let start = relative_index(&arg(args, 0), chars.len(), 0);
        let end = relative_index(&arg(args, 1), chars.len(), chars.len());
        Ok(Value::from(if start < end {
            chars[start..end].iter().collect::<String>()
        } else {
            String::new()
        }))
    });
    define(interp, &proto, "substring", |_, this, args| {
        let chars: Vec<char> = this_string(this).chars().collect();
        let clamp = |value: Value, default: usize| {
            if value.is_undefined() {
                return default;
            }
            let n = to_number(&value);
            if n.is_nan() || n < 0.0 {
                0
            } else {
                (n as usize).min(chars.len())
            }
        };
        let a = clamp(arg(args, 0), 0);
        let b = clamp(arg(args, 1), chars.len());
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Ok(Value::from(chars[start..end].iter().collect::<String>()))
    });
    define(interp, &proto, "substr", |_, this, args| {
        let chars: Vec<char> = this_string(this).chars().collect();
        let start = relative_index(&arg(args, 0), chars.len(), 0);
        let len = match arg(args, 1) {
            Value::Undefined => chars.len() - start,
            other => (to_number(&other).max(0.0) as usize).min(chars.len() - start),
        };
        Ok(Value::from(chars[start..start + len].iter().collect::<String>()))
    });
    define(interp, &proto, "toUpperCase", |_, this, _| {
        Ok(Value::from(this_string(this).to_uppercase()))
    });
    define(interp, &proto, "toLowerCase", |_, this, _| {
        Ok(Value::from(this_string(this).to_lowercase()))
    });
    define(interp, &proto, "trim", |_, this, _| Ok(Value::string(this_string(this).trim())));
    define(interp, &proto, "toString", |_, this, _| Ok(Value::String(this_string(this))));
    define(interp, &proto, "split", |interp, this, args| {
        let s = this_string(this);
        let parts: Vec<Value> = match arg(args, 0) {
            Value::Undefined => vec![Value::String(s)],
            separator => {
                let separator = to_display(&separator);
                if separator.is_empty() {
                    s.chars().map(|c| Value::from(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::from).collect()
                }
            }
        };
        let parts = match arg(args, 1) {
            Value::Undefined => parts,
            limit => parts.into_iter().take(to_number(&limit).max(0.0) as usize).collect(),
        };
        Ok(Value::Object(interp.new_array(parts)))
    });
    define(interp, &proto, "replace", |interp, this, args| {
        let s = this_string(this);
        let pattern = to_display(&arg(args, 0));
        let Some(at) = s.find(pattern.as_str()) else {
            return Ok(Value::String(s));
        };
        let replacement = match arg(args, 1) {
            callback if callback.is_function() => {
                let offset = s[..at].chars().count() as f64;
                let result = interp.call(
                    &callback,
                    Value::Undefined,
                    &[Value::string(&pattern), Value::Number(offset), Value::String(s.clone())],
                )?;
                to_display(&result)
            }
            other => to_display(&other),
        };
        let mut out = String::with_capacity(s.len());
        out.push_str(&s[..at]);
        out.push_str(&replacement);
        out.push_str(&s[at + pattern.len()..]);
        Ok(Value::from(out))
    });
}

fn number_prototype(interp: &Interpreter) {
    let proto = interp.realm.number_prototype.clone();
    define(interp, &proto, "toFixed", |_, this, args| {
        let n = to_number(this);
        let digits = number_arg(args, 0);
        let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 100.0) as usize };
        Ok(Value::from(if n.is_finite() {
            format!("{n:.digits$}")
        } else {
            format_number(n)
        }))
    });
    define(interp, &proto, "toString", |_, this, args| {
        let n = to_number(this);
        let radix = match arg(args, 0) {
            Value::Undefined => 10,
            other => to_number(&other) as u32,
        };
        Ok(Value::from(to_radix_string(n, radix)))
    });
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if radix == 10 || !(2..=36).contains(&radix) || !n.is_finite() || n.fract() != 0.0 {
        return format_number(n);
    }
    let negative = n < 0.0;
    let mut value = n.abs() as u64;
    let mut digits = Vec::new();
    loop {
        digits.push(std::char::from_digit((value % u64::from(radix)) as u32, radix).unwrap_or('0'));
        value /= u64::from(radix);
        if value == 0 {
            break;
        }
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn error_prototype(interp: &Interpreter) {
    let proto = interp.realm.error_prototype.clone();
    proto.set_own("name", Value::string("Error"));
    proto.set_own("message", Value::string(""));
    define(interp, &proto, "toString", |_, this, _| Ok(Value::from(thrown_message(this))));
}

/// Globals copied onto every environment.
pub(super) fn standard_globals(interp: &mut Interpreter) -> Vec<(&'static str, Value)> {
    vec![
        ("Object", Value::Object(object_constructor(interp))),
        ("Array", Value::Object(array_constructor(interp))),
        ("String", Value::Object(string_constructor(interp))),
        ("Number", Value::Object(number_constructor(interp))),
        ("Error", Value::Object(error_constructor(interp))),
        ("Math", Value::Object(math_object(interp))),
        ("JSON", Value::Object(json_object(interp))),
        (
            "isNaN",
            Value::Object(interp.new_native("isNaN", Effect::Pure, |_, _, args| {
                Ok(Value::Bool(number_arg(args, 0).is_nan()))
            })),
        ),
        (
            "parseInt",
            Value::Object(interp.new_native("parseInt", Effect::Pure, |_, _, args| {
                let radix = match arg(args, 1) {
                    Value::Undefined => None,
                    other => Some(to_number(&other) as u32).filter(|r| *r != 0),
                };
                Ok(Value::Number(parse_int(&to_display(&arg(args, 0)), radix)))
            })),
        ),
        (
            "parseFloat",
            Value::Object(interp.new_native("parseFloat", Effect::Pure, |_, _, args| {
                Ok(Value::Number(parse_float(&to_display(&arg(args, 0)))))
            })),
        ),
    ]
}

fn object_constructor(interp: &Interpreter) -> ObjectRef {
    let ctor = interp.new_native("Object", Effect::Pure, |interp, _, args| {
        Ok(match arg(args, 0) {
            Value::Object(object) => Value::Object(object),
            _ => Value::Object(interp.new_object()),
        })
    });
    link_constructor(&ctor, &interp.realm.object_prototype);
    define(interp, &ctor, "keys", |interp, _, args| {
        let keys = match arg(args, 0) {
            Value::Object(object) => object.own_keys(),
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        Ok(Value::Object(interp.new_array(keys.into_iter().map(Value::from).collect())))
    });
    define(interp, &ctor, "create", |interp, _, args| {
        let prototype = match arg(args, 0) {
            Value::Object(proto) => Some(proto),
            Value::Null => None,
            _ => return Err(interp.type_error("Object prototype may only be an Object or null")),
        };
        Ok(Value::Object(ObjectRef::new(JsObject::new(ObjectKind::Ordinary, prototype))))
    });
    ctor
}

fn array_constructor(interp: &Interpreter) -> ObjectRef {
    let ctor = interp.new_native("Array", Effect::Pure, |interp, _, args| {
        let elements = match args {
            [Value::Number(n)] => {
                if n.fract() != 0.0 || *n < 0.0 {
                    return Err(interp.throw_error("RangeError", "Invalid array length"));
                }
                vec![Value::Undefined; *n as usize]
            }
            _ => args.to_vec(),
        };
        Ok(Value::Object(interp.new_array(elements)))
    });
    link_constructor(&ctor, &interp.realm.array_prototype);
    define(interp, &ctor, "isArray", |_, _, args| {
        Ok(Value::Bool(arg(args, 0).as_object().is_some_and(ObjectRef::is_array)))
    });
    ctor
}

fn string_constructor(interp: &Interpreter) -> ObjectRef {
    let ctor = interp.new_native("String", Effect::Pure, |_, _, args| {
        Ok(match args.first() {
            Some(value) => Value::from(to_display(value)),
            None => Value::string(""),
        })
    });
    link_constructor(&ctor, &interp.realm.string_prototype);
    define(interp, &ctor, "fromCharCode", |_, _, args| {
        let text: String = args
            .iter()
            .filter_map(|code| char::from_u32(to_number(code) as u32))
            .collect();
        Ok(Value::from(text))
    });
    ctor
}

fn number_constructor(interp: &Interpreter) -> ObjectRef {
    let ctor = interp.new_native("Number", Effect::Pure, |_, _, args| {
        Ok(Value::Number(args.first().map_or(0.0, to_number)))
    });
    link_constructor(&ctor, &interp.realm.number_prototype);
    ctor.set_own("MAX_VALUE", Value::Number(f64::MAX));
    ctor.set_own("MIN_VALUE", Value::Number(f64::from_bits(1)));
    ctor
}

fn error_constructor(interp: &Interpreter) -> ObjectRef {
    let ctor = interp.new_native("Error", Effect::Pure, |interp, _, args| {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            other => to_display(&other),
        };
        Ok(Value::Object(interp.new_error("Error", &message)))
    });
    link_constructor(&ctor, &interp.realm.error_prototype);
    ctor
}

fn math_object(interp: &Interpreter) -> ObjectRef {
    let math = interp.new_object();
    math.set_own("PI", Value::Number(std::f64::consts::PI));
    math.set_own("E", Value::Number(std::f64::consts::E));

    let unary: [(&'static str, fn(f64) -> f64); 14] = [
        ("abs", f64::abs),
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("round", |x| (x + 0.5).floor()),
        ("sqrt", f64::sqrt),
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("acos", f64::acos),
        ("atan", f64::atan),
        ("exp", f64::exp),
        ("log", f64::ln),
        ("trunc", f64::trunc),
    ];
    for (name, op) in unary {
        define(interp, &math, name, move |_, _, args| Ok(Value::Number(op(number_arg(args, 0)))));
    }
    define(interp, &math, "sign", |_, _, args| {
        let x = number_arg(args, 0);
        Ok(Value::Number(if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            x
        }))
    });
    define(interp, &math, "pow", |_, _, args| {
        Ok(Value::Number(number_arg(args, 0).powf(number_arg(args, 1))))
    });
    define(interp, &math, "atan2", |_, _, args| {
        Ok(Value::Number(number_arg(args, 0).atan2(number_arg(args, 1))))
    });
    define(interp, &math, "min", |_, _, args| {
        Ok(Value::Number(args.iter().map(to_number).fold(f64::INFINITY, |acc, x| {
            if acc.is_nan() || x.is_nan() {
                f64::NAN
            } else {
                acc.min(x)
            }
        })))
    });
    define(interp, &math, "max", |_, _, args| {
        Ok(Value::Number(args.iter().map(to_number).fold(f64::NEG_INFINITY, |acc, x| {
            if acc.is_nan() || x.is_nan() {
                f64::NAN
            } else {
                acc.max(x)
            }
        })))
    });
    define(interp, &math, "random", |interp, _, _| Ok(Value::Number(interp.next_random())));
    math
}

fn json_object(interp: &Interpreter) -> ObjectRef {
    let object = interp.new_object();
    define(interp, &object, "stringify", |interp, _, args| {
        let value = arg(args, 0);
        let indent = match arg(args, 2) {
            Value::Number(n) if n >= 1.0 => Some(" ".repeat(n.min(10.0) as usize)),
            Value::String(s) if !s.is_empty() => Some(s.chars().take(10).collect()),
            _ => None,
        };
        let encoded = match &indent {
            Some(indent) => json::stringify_pretty(&value, indent),
            None => json::stringify(&value),
        };
        match encoded {
            Ok(Some(text)) => Ok(Value::from(text)),
            Ok(None) => Ok(Value::Undefined),
            Err(JsonError::Circular) => Err(interp.type_error(JsonError::Circular.to_string())),
            Err(err) => Err(interp.throw_error("Error", err.to_string())),
        }
    });
    define(interp, &object, "parse", |interp, _, args| {
        let text = to_display(&arg(args, 0));
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(parsed) => Ok(json::from_json(interp, &parsed)),
            Err(err) => Err(interp.throw_error("SyntaxError", err.to_string())),
        }
    });
    object
}

fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let trimmed = text.trim_start();
    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let hex_allowed = matches!(radix, None | Some(16));
    let mut radix = radix.unwrap_or(10);
    if hex_allowed && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = rest.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .iter()
        .fold(0.0, |acc, &d| acc * f64::from(radix) + f64::from(d));
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let unsigned = trimmed.trim_start_matches(['-', '+']);
    if unsigned.starts_with("Infinity") {
        return if trimmed.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
    }
    if end == digits_start || trimmed[digits_start..end] == *"." {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    trimmed[..end].parse().unwrap_or(f64::NAN)
}
