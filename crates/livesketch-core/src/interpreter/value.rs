//! Runtime values and the shared object heap.

use super::{Fault, Interpreter, ScopeRef};
use crate::ast;
use crate::codegen::format_number;
use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        self.as_object().is_some_and(ObjectRef::is_function)
    }

    /// A non-array, non-function object.
    pub fn is_plain_object(&self) -> bool {
        self.as_object().is_some_and(|obj| {
            matches!(obj.borrow().kind, ObjectKind::Ordinary | ObjectKind::Error)
        })
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) if obj.is_function() => "function",
            Value::Object(_) => "object",
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Identity for caching decisions: like `===` but NaN equals NaN.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => obj.fmt(f),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// No host side effects; safe to call during a shadow run.
    Pure,
    /// Changes drawing or host state.
    Mutating,
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, Fault>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub effect: Effect,
    pub func: NativeFn,
}

#[derive(Clone)]
pub struct Closure {
    pub function: Rc<ast::Function>,
    pub scope: ScopeRef,
    /// Lexical `this`, captured by arrow functions only.
    pub this: Option<Value>,
}

#[derive(Clone)]
pub enum Callable {
    Closure(Closure),
    Native(NativeFunction),
}

pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Callable),
    Error,
}

#[derive(Clone)]
pub enum Slot {
    Data(Value),
    /// Reading the property throws this message.
    Trap(Rc<str>),
}

pub struct JsObject {
    pub kind: ObjectKind,
    pub properties: IndexMap<String, Slot>,
    pub prototype: Option<ObjectRef>,
}

impl JsObject {
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            prototype,
        }
    }

    pub fn own_data(&self, key: &str) -> Option<Value> {
        match self.properties.get(key) {
            Some(Slot::Data(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), Slot::Data(value));
    }
}

/// Shared handle to a heap object. Equality is identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<JsObject>>);

impl ObjectRef {
    pub fn new(object: JsObject) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    pub fn borrow(&self) -> Ref<'_, JsObject> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, JsObject> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn is_function(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Function(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.borrow().kind, ObjectKind::Array(_))
    }

    pub fn callable(&self) -> Option<Callable> {
        match &self.borrow().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    /// The effect tag of a native function, `None` for anything else.
    pub fn native_effect(&self) -> Option<Effect> {
        match &self.borrow().kind {
            ObjectKind::Function(Callable::Native(native)) => Some(native.effect),
            _ => None,
        }
    }

    pub fn array_elements(&self) -> Option<Vec<Value>> {
        match &self.borrow().kind {
            ObjectKind::Array(elements) => Some(elements.clone()),
            _ => None,
        }
    }

    pub fn has_own(&self, key: &str) -> bool {
        let object = self.borrow();
        if let ObjectKind::Array(elements) = &object.kind {
            if key == "length" {
                return true;
            }
            if let Some(index) = array_index(key) {
                return index < elements.len();
            }
        }
        object.properties.contains_key(key)
    }

    /// Own enumerable keys: array indices first, then properties in
    /// insertion order.
    pub fn own_keys(&self) -> Vec<String> {
        let object = self.borrow();
        let mut keys = Vec::new();
        if let ObjectKind::Array(elements) = &object.kind {
            keys.extend((0..elements.len()).map(|i| i.to_string()));
        }
        keys.extend(object.properties.keys().cloned());
        keys
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.borrow().prototype.clone()
    }

    /// Whether `key` is visible anywhere on the prototype chain.
    pub fn has_property(&self, key: &str) -> bool {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            if object.has_own(key) {
                return true;
            }
            current = object.prototype();
        }
        false
    }

    pub fn set_own(&self, key: &str, value: Value) {
        let mut object = self.borrow_mut();
        if let ObjectKind::Array(elements) = &mut object.kind {
            if let Some(index) = array_index(key) {
                if index >= elements.len() {
                    elements.resize(index + 1, Value::Undefined);
                }
                elements[index] = value;
                return;
            }
            if key == "length" {
                if let Value::Number(n) = value {
                    if n >= 0.0 && n.fract() == 0.0 {
                        elements.resize(n as usize, Value::Undefined);
                    }
                }
                return;
            }
        }
        object.insert(key, value);
    }

    pub fn delete_own(&self, key: &str) -> bool {
        let mut object = self.borrow_mut();
        if let ObjectKind::Array(elements) = &mut object.kind {
            if let Some(index) = array_index(key) {
                if let Some(slot) = elements.get_mut(index) {
                    *slot = Value::Undefined;
                }
                return true;
            }
            if key == "length" {
                return false;
            }
        }
        object.properties.shift_remove(key);
        true
    }

    /// Own data property, without consulting the prototype chain.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        let object = self.borrow();
        if let ObjectKind::Array(elements) = &object.kind {
            if key == "length" {
                return Some(Value::Number(elements.len() as f64));
            }
            if let Some(index) = array_index(key) {
                return elements.get(index).cloned();
            }
        }
        object.own_data(key)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(object) = self.0.try_borrow() else {
            return f.write_str("[object <borrowed>]");
        };
        match &object.kind {
            ObjectKind::Ordinary => write!(f, "[object Object@{:#x}]", self.addr()),
            ObjectKind::Array(elements) => write!(f, "[array; {}]", elements.len()),
            ObjectKind::Function(Callable::Native(native)) => {
                write!(f, "[native {}]", native.name)
            }
            ObjectKind::Function(Callable::Closure(_)) => {
                write!(f, "[function@{:#x}]", self.addr())
            }
            ObjectKind::Error => f.write_str("[object Error]"),
        }
    }
}

/// Canonical array index, `"3"` but not `"03"` or `"-1"`.
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(values: Vec<Value>) -> ObjectRef {
        ObjectRef::new(JsObject::new(ObjectKind::Array(values), None))
    }

    #[test]
    fn test_array_index_parsing() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("012"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn test_array_writes_grow_and_truncate() {
        let arr = array(vec![Value::Number(1.0)]);
        arr.set_own("3", Value::Bool(true));
        assert_eq!(arr.get_own("length").and_then(|v| v.as_number()), Some(4.0));
        assert!(arr.get_own("1").is_some_and(|v| v.is_undefined()));

        arr.set_own("length", Value::Number(1.0));
        assert_eq!(arr.own_keys(), vec!["0".to_string()]);
    }

    #[test]
    fn test_strict_equality_is_identity_for_objects() {
        let a = ObjectRef::new(JsObject::new(ObjectKind::Ordinary, None));
        let b = ObjectRef::new(JsObject::new(ObjectKind::Ordinary, None));
        assert!(Value::Object(a.clone()).strict_equals(&Value::Object(a.clone())));
        assert!(!Value::Object(a).strict_equals(&Value::Object(b)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::string("").truthy());
        assert!(Value::string("0").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::Null.truthy());
    }
}
