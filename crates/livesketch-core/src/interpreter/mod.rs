//! Tree-walking evaluator for transformed sketch code.
//!
//! One [`Interpreter`] lives for the whole session so that objects created by
//! earlier runs keep sharing the same intrinsic prototypes. The object a
//! program runs against is its global object: a bare name that no scope
//! declares is looked up there and nowhere else.

mod builtins;
mod eval;
pub mod json;
mod value;

pub use value::{
    array_index, Callable, Closure, Effect, JsObject, NativeFn, NativeFunction, ObjectKind,
    ObjectRef, Slot, Value,
};

use crate::ast::{Function, FunctionBody, FunctionKind, Program, Statement};
use crate::codegen::{format_number, function_source};
use crate::errors::InfiniteLoopError;
use crate::transforms::scope::hoisted_names;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Deepest nesting of script calls before a `RangeError`.
pub const MAX_CALL_DEPTH: usize = 256;

/// Abrupt termination of evaluation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// A script-level exception; `try`/`catch` can observe it.
    Throw(Value),
    /// The loop guard fired. Scripts cannot catch this.
    Abort(InfiniteLoopError),
}

/// How a statement list finished.
#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Scope {
    vars: FxHashMap<String, Value>,
    parent: Option<ScopeRef>,
    this: Value,
    global: ObjectRef,
}

pub type ScopeRef = Rc<RefCell<Scope>>;

impl Scope {
    fn root(global: ObjectRef, this: Value) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: FxHashMap::default(),
            parent: None,
            this,
            global,
        }))
    }

    fn child(parent: &ScopeRef, this: Value) -> ScopeRef {
        let global = parent.borrow().global.clone();
        Rc::new(RefCell::new(Scope {
            vars: FxHashMap::default(),
            parent: Some(parent.clone()),
            this,
            global,
        }))
    }

    fn define(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }
}

/// A `new` of a script-defined constructor.
#[derive(Debug, Clone)]
pub struct Instance {
    pub constructor: ObjectRef,
    pub object: ObjectRef,
}

/// Intrinsic prototypes shared by every run.
pub(crate) struct Realm {
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub error_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
}

impl Realm {
    fn new() -> Self {
        let object_prototype = ObjectRef::new(JsObject::new(ObjectKind::Ordinary, None));
        let derived = || {
            ObjectRef::new(JsObject::new(
                ObjectKind::Ordinary,
                Some(object_prototype.clone()),
            ))
        };
        Self {
            function_prototype: derived(),
            array_prototype: derived(),
            error_prototype: derived(),
            string_prototype: derived(),
            number_prototype: derived(),
            boolean_prototype: derived(),
            object_prototype,
        }
    }

    fn is_intrinsic(&self, object: &ObjectRef) -> bool {
        [
            &self.object_prototype,
            &self.function_prototype,
            &self.array_prototype,
            &self.error_prototype,
            &self.string_prototype,
            &self.number_prototype,
            &self.boolean_prototype,
        ]
        .iter()
        .any(|proto| proto.ptr_eq(object))
    }
}

pub struct Interpreter {
    realm: Realm,
    globals: Vec<(&'static str, Value)>,
    instances: Vec<Instance>,
    call_depth: usize,
    rng_state: u64,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let seed = getrandom::u64().unwrap_or(0x2545_f491_4f6c_dd1d);
        let mut interp = Self {
            realm: Realm::new(),
            globals: Vec::new(),
            instances: Vec::new(),
            call_depth: 0,
            rng_state: seed | 1,
        };
        builtins::install_prototypes(&mut interp);
        interp.globals = builtins::standard_globals(&mut interp);
        interp
    }

    /// Copies the standard library (`Math`, `JSON`, `Object`, ...) onto `target`.
    pub fn install_globals(&self, target: &ObjectRef) {
        for (name, value) in &self.globals {
            target.set_own(name, value.clone());
        }
    }

    pub fn standard_global_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.globals.iter().map(|(name, _)| *name)
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    pub fn new_object(&self) -> ObjectRef {
        ObjectRef::new(JsObject::new(
            ObjectKind::Ordinary,
            Some(self.realm.object_prototype.clone()),
        ))
    }

    pub fn new_array(&self, elements: Vec<Value>) -> ObjectRef {
        ObjectRef::new(JsObject::new(
            ObjectKind::Array(elements),
            Some(self.realm.array_prototype.clone()),
        ))
    }

    pub fn new_native<F>(&self, name: &str, effect: Effect, func: F) -> ObjectRef
    where
        F: Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, Fault> + 'static,
    {
        ObjectRef::new(JsObject::new(
            ObjectKind::Function(Callable::Native(NativeFunction {
                name: Rc::from(name),
                effect,
                func: Rc::new(func),
            })),
            Some(self.realm.function_prototype.clone()),
        ))
    }

    pub(crate) fn new_closure(
        &self,
        function: Rc<Function>,
        scope: &ScopeRef,
        this: Option<Value>,
    ) -> ObjectRef {
        ObjectRef::new(JsObject::new(
            ObjectKind::Function(Callable::Closure(Closure {
                function,
                scope: scope.clone(),
                this,
            })),
            Some(self.realm.function_prototype.clone()),
        ))
    }

    pub fn new_error(&self, name: &str, message: &str) -> ObjectRef {
        let error = ObjectRef::new(JsObject::new(
            ObjectKind::Error,
            Some(self.realm.error_prototype.clone()),
        ));
        {
            let mut object = error.borrow_mut();
            object.insert("name", Value::string(name));
            object.insert("message", Value::string(message));
        }
        error
    }

    pub fn throw_error(&self, name: &str, message: impl AsRef<str>) -> Fault {
        Fault::Throw(Value::Object(self.new_error(name, message.as_ref())))
    }

    pub fn type_error(&self, message: impl AsRef<str>) -> Fault {
        self.throw_error("TypeError", message)
    }

    /// Script-visible `Math.random`.
    pub(crate) fn next_random(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        (x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11) as f64 / (1u64 << 53) as f64
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    pub fn take_instances(&mut self) -> Vec<Instance> {
        std::mem::take(&mut self.instances)
    }

    pub fn clear_instances(&mut self) {
        self.instances.clear();
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    pub fn get(&mut self, target: &Value, key: &str) -> Result<Value, Fault> {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                to_display(target)
            ))),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or_default());
                }
                let proto = self.realm.string_prototype.clone();
                self.get_property(&proto, key)
            }
            Value::Number(_) => {
                let proto = self.realm.number_prototype.clone();
                self.get_property(&proto, key)
            }
            Value::Bool(_) => {
                let proto = self.realm.boolean_prototype.clone();
                self.get_property(&proto, key)
            }
            Value::Object(object) => self.get_property(object, key),
        }
    }

    pub fn get_property(&mut self, object: &ObjectRef, key: &str) -> Result<Value, Fault> {
        if key == "prototype" && !object.has_own(key) {
            if let Some(Callable::Closure(_)) = object.callable() {
                let proto = self.new_object();
                proto.set_own("constructor", Value::Object(object.clone()));
                object.set_own("prototype", Value::Object(proto.clone()));
                return Ok(Value::Object(proto));
            }
        }

        let mut current = object.clone();
        loop {
            if let Some(value) = current.get_own(key) {
                return Ok(value);
            }
            let (trap, next) = {
                let borrowed = current.borrow();
                match borrowed.properties.get(key) {
                    Some(Slot::Trap(message)) => (Some(message.clone()), None),
                    _ => (None, borrowed.prototype.clone()),
                }
            };
            if let Some(message) = trap {
                let thrown = self.new_object();
                thrown.set_own("message", Value::String(message));
                return Err(Fault::Throw(Value::Object(thrown)));
            }
            match next {
                Some(proto) => current = proto,
                None => break,
            }
        }

        Ok(function_intrinsic(object, key).unwrap_or_default())
    }

    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> Result<(), Fault> {
        match target {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                to_display(target)
            ))),
            Value::Object(object) => {
                object.set_own(key, value);
                Ok(())
            }
            // Writes to primitives are dropped.
            _ => Ok(()),
        }
    }

    /// Keys a `for-in` loop visits: own keys plus script-defined inherited ones.
    pub(crate) fn enumerable_keys(&self, target: &Value) -> Vec<String> {
        match target {
            Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            Value::Object(object) => {
                let mut keys = object.own_keys();
                let mut current = object.prototype();
                while let Some(proto) = current {
                    if self.realm.is_intrinsic(&proto) {
                        break;
                    }
                    for key in proto.own_keys() {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                    current = proto.prototype();
                }
                keys
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn instance_of(&mut self, value: &Value, constructor: &Value) -> Result<bool, Fault> {
        let Some(ctor) = constructor.as_object().filter(|c| c.is_function()) else {
            return Err(self.type_error("Right-hand side of 'instanceof' is not callable"));
        };
        let Value::Object(object) = value else {
            return Ok(false);
        };
        let prototype = self.get_property(ctor, "prototype")?;
        let Some(prototype) = prototype.as_object() else {
            return Ok(false);
        };
        let mut current = object.prototype();
        while let Some(proto) = current {
            if proto.ptr_eq(prototype) {
                return Ok(true);
            }
            current = proto.prototype();
        }
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, Fault> {
        let Some(function) = callee.as_object().filter(|f| f.is_function()) else {
            return Err(self.type_error(format!("{} is not a function", to_display(callee))));
        };
        self.call_function(function, this, args)
    }

    pub fn call_function(
        &mut self,
        function: &ObjectRef,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Fault> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(self.throw_error("RangeError", "Maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        let result = match function.callable() {
            Some(Callable::Native(native)) => (native.func)(self, &this, args),
            Some(Callable::Closure(closure)) => self.call_closure(function, closure, this, args),
            None => Err(self.type_error("value is not a function")),
        };
        self.call_depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        callee: &ObjectRef,
        closure: Closure,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Fault> {
        let Closure {
            function,
            scope: parent,
            this: lexical_this,
        } = closure;
        let this = lexical_this.unwrap_or(this);
        let scope = Scope::child(&parent, this);

        {
            let mut frame = scope.borrow_mut();
            if function.kind == FunctionKind::Expression {
                if let Some(id) = &function.id {
                    frame.define(id.name.clone(), Value::Object(callee.clone()));
                }
            }
            if function.kind != FunctionKind::Arrow {
                frame.define("arguments", Value::Object(self.new_array(args.to_vec())));
            }
        }

        match &function.body {
            FunctionBody::Block(block) => self.hoist(&block.body, &scope),
            FunctionBody::Expression(_) => {}
        }
        {
            let mut frame = scope.borrow_mut();
            for (index, param) in function.params.iter().enumerate() {
                frame.define(param.name.clone(), args.get(index).cloned().unwrap_or_default());
            }
        }

        match &function.body {
            FunctionBody::Block(block) => match self.exec_statements(&block.body, &scope)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
            FunctionBody::Expression(expr) => self.eval(expr, &scope),
        }
    }

    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> Result<Value, Fault> {
        let Some(function) = callee.as_object().filter(|f| f.is_function()) else {
            return Err(self.type_error(format!("{} is not a constructor", to_display(callee))));
        };
        match function.callable() {
            Some(Callable::Closure(closure)) => {
                if closure.function.kind == FunctionKind::Arrow {
                    return Err(self.type_error("arrow functions cannot be constructors"));
                }
                let prototype = match self.get_property(function, "prototype")? {
                    Value::Object(proto) => proto,
                    _ => self.realm.object_prototype.clone(),
                };
                let instance = ObjectRef::new(JsObject::new(ObjectKind::Ordinary, Some(prototype)));
                self.instances.push(Instance {
                    constructor: function.clone(),
                    object: instance.clone(),
                });
                trace!(instances = self.instances.len(), "constructed instance");
                let result = self.call_function(function, Value::Object(instance.clone()), args)?;
                Ok(match result {
                    Value::Object(object) => Value::Object(object),
                    _ => Value::Object(instance),
                })
            }
            _ => {
                let result = self.call_function(function, Value::Undefined, args)?;
                Ok(match result {
                    Value::Object(object) => Value::Object(object),
                    _ => Value::Object(self.new_object()),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Programs
    // ------------------------------------------------------------------

    /// Runs `program` as one function activation against `global`.
    pub fn run_program(
        &mut self,
        program: &Program,
        global: &ObjectRef,
        bindings: &[(&str, Value)],
        this: Value,
    ) -> Result<(), Fault> {
        let scope = Scope::root(global.clone(), this);
        {
            let mut frame = scope.borrow_mut();
            for (name, value) in bindings {
                frame.define(*name, value.clone());
            }
        }
        self.hoist(&program.body, &scope);
        self.call_depth = 0;
        self.exec_statements(&program.body, &scope).map(|_| ())
    }

    /// Declares `var` names and binds function declarations up front.
    fn hoist(&mut self, body: &[Statement], scope: &ScopeRef) {
        let names = hoisted_names(body);
        let mut frame = scope.borrow_mut();
        for name in names {
            frame.vars.entry(name).or_insert(Value::Undefined);
        }
        drop(frame);

        for stmt in body {
            if let Statement::Function(function) = stmt {
                if let Some(id) = &function.id {
                    let closure = self.new_closure(function.clone(), scope, None);
                    scope.borrow_mut().define(id.name.clone(), Value::Object(closure));
                }
            }
        }
    }
}

/// `name` and `length` of functions that do not define them.
fn function_intrinsic(object: &ObjectRef, key: &str) -> Option<Value> {
    let callable = object.callable()?;
    match (key, callable) {
        ("name", Callable::Native(native)) => Some(Value::String(native.name)),
        ("name", Callable::Closure(closure)) => Some(Value::string(
            closure
                .function
                .id
                .as_ref()
                .map(|id| id.name.as_str())
                .unwrap_or(""),
        )),
        ("length", Callable::Closure(closure)) => {
            Some(Value::Number(closure.function.params.len() as f64))
        }
        ("length", Callable::Native(_)) => Some(Value::Number(0.0)),
        _ => None,
    }
}

/// Source text of a function value.
pub fn function_to_string(object: &ObjectRef) -> Option<String> {
    match object.callable()? {
        Callable::Native(native) => Some(format!("function {}() {{ [native code] }}", native.name)),
        Callable::Closure(closure) => Some(function_source(&closure.function)),
    }
}

/// JavaScript `ToString`, without calling script-defined `toString`.
pub fn to_display(value: &Value) -> String {
    let mut seen = Vec::new();
    display_inner(value, &mut seen)
}

fn display_inner(value: &Value, seen: &mut Vec<usize>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.to_string(),
        Value::Object(object) => {
            if let Some(source) = function_to_string(object) {
                return source;
            }
            if let Some(elements) = object.array_elements() {
                if seen.contains(&object.addr()) {
                    return String::new();
                }
                seen.push(object.addr());
                let joined = elements
                    .iter()
                    .map(|e| {
                        if e.is_nullish() {
                            String::new()
                        } else {
                            display_inner(e, seen)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                seen.pop();
                return joined;
            }
            let borrowed = object.borrow();
            if let ObjectKind::Error = borrowed.kind {
                let name = borrowed.own_data("name").map(|v| to_display(&v));
                let message = borrowed.own_data("message").map(|v| to_display(&v));
                return match (name, message) {
                    (Some(name), Some(message)) if !message.is_empty() => {
                        format!("{name}: {message}")
                    }
                    (Some(name), _) => name,
                    (None, Some(message)) => message,
                    (None, None) => "Error".to_string(),
                };
            }
            "[object Object]".to_string()
        }
    }
}

/// JavaScript `ToNumber`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::String(s) => string_to_number(s),
        Value::Object(_) => string_to_number(&to_display(value)),
    }
}

pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
            f64::NAN
        }
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

pub fn to_int32(value: &Value) -> i32 {
    let n = to_number(value);
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(4_294_967_296.0) as u64) as u32 as i32
}

pub fn to_uint32(value: &Value) -> u32 {
    to_int32(value) as u32
}

/// Message carried by a thrown value.
pub fn thrown_message(value: &Value) -> String {
    if let Value::Object(object) = value {
        if let Some(message) = object.get_own("message") {
            let message = to_display(&message);
            let is_error = matches!(object.borrow().kind, ObjectKind::Error);
            if is_error {
                let name = object
                    .get_own("name")
                    .map(|n| to_display(&n))
                    .unwrap_or_default();
                if !name.is_empty() && name != "Error" {
                    return format!("{name}: {message}");
                }
            }
            return message;
        }
    }
    to_display(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(code: &str) -> (Interpreter, ObjectRef) {
        let mut interp = Interpreter::new();
        let global = interp.new_object();
        interp.install_globals(&global);
        let program = parse(code).unwrap();
        interp
            .run_program(&program, &global, &[], Value::Undefined)
            .unwrap();
        (interp, global)
    }

    fn global_number(global: &ObjectRef, name: &str) -> f64 {
        global.get_own(name).and_then(|v| v.as_number()).unwrap()
    }

    #[test]
    fn test_closures_capture_their_scope() {
        let (_, global) = run(
            "function counter() { var n = 0; return function () { n += 1; return n; }; }
             var next = counter(); next(); total = next();",
        );
        assert_eq!(global_number(&global, "total"), 2.0);
    }

    #[test]
    fn test_unresolved_assignment_lands_on_global_object() {
        let (_, global) = run("x = 1 + 2;");
        assert_eq!(global_number(&global, "x"), 3.0);
    }

    #[test]
    fn test_reference_error_for_unknown_name() {
        let mut interp = Interpreter::new();
        let global = interp.new_object();
        let program = parse("missing + 1;").unwrap();
        let err = interp
            .run_program(&program, &global, &[], Value::Undefined)
            .unwrap_err();
        let Fault::Throw(value) = err else {
            panic!("expected a script exception");
        };
        assert_eq!(thrown_message(&value), "ReferenceError: missing is not defined");
    }

    #[test]
    fn test_new_records_instances_and_links_prototype() {
        let (mut interp, global) = run(
            "function P(x) { this.x = x; }
             P.prototype.twice = function () { return this.x * 2; };
             var p = new P(4); r = p.twice(); isP = p instanceof P;",
        );
        assert_eq!(global_number(&global, "r"), 8.0);
        assert!(global.get_own("isP").is_some_and(|v| v.truthy()));
        assert_eq!(interp.take_instances().len(), 1);
    }

    #[test]
    fn test_try_catch_observes_thrown_values() {
        let (_, global) = run("try { throw 'boom'; } catch (e) { caught = e; } finally { done = true; }");
        assert_eq!(global.get_own("caught").map(|v| to_display(&v)), Some("boom".into()));
        assert!(global.get_own("done").is_some_and(|v| v.truthy()));
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert_eq!(string_to_number("1e3"), 1000.0);
        assert!(string_to_number("abc").is_nan());
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(&Value::Number(4_294_967_297.0)), 1);
        assert_eq!(to_int32(&Value::Number(-1.0)), -1);
        assert_eq!(to_int32(&Value::Number(f64::NAN)), 0);
    }
}
