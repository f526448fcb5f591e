use super::{
    to_display, to_int32, to_number, to_uint32, Completion, Fault, Interpreter, Scope, ScopeRef,
    Value,
};
use crate::ast::*;
use crate::codegen::{format_number, generate_expression};
use crate::transforms::HANDLE;
use std::cmp::Ordering;

/// An assignable location.
enum Reference {
    Binding(String),
    Property(Value, String),
}

impl Interpreter {
    pub(crate) fn exec_statements(
        &mut self,
        statements: &[Statement],
        scope: &ScopeRef,
    ) -> Result<Completion, Fault> {
        for stmt in statements {
            match self.exec_statement(stmt, scope)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_statement(&mut self, stmt: &Statement, scope: &ScopeRef) -> Result<Completion, Fault> {
        match stmt {
            Statement::Expression(expr) => {
                self.eval(expr, scope)?;
                Ok(Completion::Normal)
            }
            Statement::Variable(decl) => {
                self.exec_declaration(decl, scope)?;
                Ok(Completion::Normal)
            }
            // Function declarations are bound when their body's scope opens.
            Statement::Function(_) | Statement::Empty => Ok(Completion::Normal),
            Statement::Block(block) => self.exec_statements(&block.body, scope),
            Statement::If(stmt) => {
                if self.eval(&stmt.test, scope)?.truthy() {
                    self.exec_statement(&stmt.consequent, scope)
                } else if let Some(alternate) = &stmt.alternate {
                    self.exec_statement(alternate, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Statement::For(stmt) => self.exec_for(stmt, scope),
            Statement::ForIn(stmt) => self.exec_for_in(stmt, scope),
            Statement::While(stmt) => {
                while self.eval(&stmt.test, scope)?.truthy() {
                    if let Some(done) = self.loop_body(&stmt.body, scope)? {
                        return Ok(done);
                    }
                }
                Ok(Completion::Normal)
            }
            Statement::DoWhile(stmt) => {
                loop {
                    if let Some(done) = self.loop_body(&stmt.body, scope)? {
                        return Ok(done);
                    }
                    if !self.eval(&stmt.test, scope)?.truthy() {
                        return Ok(Completion::Normal);
                    }
                }
            }
            Statement::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Statement::Break => Ok(Completion::Break),
            Statement::Continue => Ok(Completion::Continue),
            Statement::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                Err(Fault::Throw(value))
            }
            Statement::Try(stmt) => self.exec_try(stmt, scope),
            Statement::Switch(stmt) => self.exec_switch(stmt, scope),
        }
    }

    /// Runs one iteration; `Some` when the loop must stop.
    fn loop_body(&mut self, body: &Statement, scope: &ScopeRef) -> Result<Option<Completion>, Fault> {
        match self.exec_statement(body, scope)? {
            Completion::Break => Ok(Some(Completion::Normal)),
            Completion::Return(value) => Ok(Some(Completion::Return(value))),
            Completion::Normal | Completion::Continue => Ok(None),
        }
    }

    fn exec_declaration(&mut self, decl: &VariableDeclaration, scope: &ScopeRef) -> Result<(), Fault> {
        for declarator in &decl.declarations {
            if let Some(init) = &declarator.init {
                let value = self.eval(init, scope)?;
                self.declare_binding(&declarator.id.name, value, scope);
            }
        }
        Ok(())
    }

    fn exec_for(&mut self, stmt: &ForStatement, scope: &ScopeRef) -> Result<Completion, Fault> {
        match &stmt.init {
            Some(ForInit::Declaration(decl)) => self.exec_declaration(decl, scope)?,
            Some(ForInit::Expression(expr)) => {
                self.eval(expr, scope)?;
            }
            None => {}
        }
        loop {
            if let Some(test) = &stmt.test {
                if !self.eval(test, scope)?.truthy() {
                    break;
                }
            }
            if let Some(done) = self.loop_body(&stmt.body, scope)? {
                return Ok(done);
            }
            if let Some(update) = &stmt.update {
                self.eval(update, scope)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_in(&mut self, stmt: &ForInStatement, scope: &ScopeRef) -> Result<Completion, Fault> {
        let subject = self.eval(&stmt.right, scope)?;
        let items: Vec<Value> = if stmt.of {
            match &subject {
                Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
                Value::Object(object) if object.is_array() => {
                    object.array_elements().unwrap_or_default()
                }
                other => {
                    return Err(self.type_error(format!("{} is not iterable", to_display(other))))
                }
            }
        } else {
            self.enumerable_keys(&subject)
                .into_iter()
                .map(Value::from)
                .collect()
        };

        for item in items {
            match &stmt.left {
                ForInLeft::Declaration(decl) => {
                    if let Some(declarator) = decl.declarations.first() {
                        self.declare_binding(&declarator.id.name, item, scope);
                    }
                }
                ForInLeft::Target(target) => {
                    let reference = self.reference(target, scope)?;
                    self.put_reference(&reference, item, scope)?;
                }
            }
            if let Some(done) = self.loop_body(&stmt.body, scope)? {
                return Ok(done);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(&mut self, stmt: &TryStatement, scope: &ScopeRef) -> Result<Completion, Fault> {
        let result = self.exec_statements(&stmt.block.body, scope);
        let result = match (result, &stmt.handler) {
            (Err(Fault::Throw(value)), Some(handler)) => {
                let this = scope.borrow().this.clone();
                let catch_scope = Scope::child(scope, this);
                if let Some(param) = &handler.param {
                    catch_scope.borrow_mut().define(param.name.clone(), value);
                }
                self.exec_statements(&handler.body.body, &catch_scope)
            }
            (other, _) => other,
        };
        if matches!(result, Err(Fault::Abort(_))) {
            return result;
        }
        if let Some(finalizer) = &stmt.finalizer {
            match self.exec_statements(&finalizer.body, scope)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    fn exec_switch(&mut self, stmt: &SwitchStatement, scope: &ScopeRef) -> Result<Completion, Fault> {
        let discriminant = self.eval(&stmt.discriminant, scope)?;
        let mut start = None;
        for (index, case) in stmt.cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval(test, scope)?.strict_equals(&discriminant) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| stmt.cases.iter().position(|case| case.test.is_none()));
        let Some(start) = start else {
            return Ok(Completion::Normal);
        };
        for case in &stmt.cases[start..] {
            match self.exec_statements(&case.consequent, scope)? {
                Completion::Normal => {}
                Completion::Break => return Ok(Completion::Normal),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    fn lookup(&mut self, name: &str, scope: &ScopeRef) -> Result<Value, Fault> {
        match self.try_lookup(name, scope)? {
            Some(value) => Ok(value),
            None => Err(self.throw_error("ReferenceError", format!("{name} is not defined"))),
        }
    }

    fn try_lookup(&mut self, name: &str, scope: &ScopeRef) -> Result<Option<Value>, Fault> {
        if let Some(owner) = binding_scope(scope, name) {
            return Ok(owner.borrow().vars.get(name).cloned());
        }
        match name {
            "undefined" => return Ok(Some(Value::Undefined)),
            "NaN" => return Ok(Some(Value::Number(f64::NAN))),
            "Infinity" => return Ok(Some(Value::Number(f64::INFINITY))),
            _ => {}
        }
        let global = scope.borrow().global.clone();
        if global.has_property(name) {
            return self.get_property(&global, name).map(Some);
        }
        Ok(None)
    }

    /// Writes an existing binding, falling back to the global object.
    fn assign_binding(&mut self, name: &str, value: Value, scope: &ScopeRef) {
        match binding_scope(scope, name) {
            Some(owner) => {
                owner.borrow_mut().define(name, value);
            }
            None => {
                let global = scope.borrow().global.clone();
                global.set_own(name, value);
            }
        }
    }

    /// Writes a declared name; hoisting already created it in the function scope.
    fn declare_binding(&mut self, name: &str, value: Value, scope: &ScopeRef) {
        match binding_scope(scope, name) {
            Some(owner) => owner.borrow_mut().define(name, value),
            None => scope.borrow_mut().define(name, value),
        }
    }

    fn reference(&mut self, expr: &Expression, scope: &ScopeRef) -> Result<Reference, Fault> {
        match expr {
            Expression::Identifier(id) => Ok(Reference::Binding(id.name.clone())),
            Expression::Member(object, property) => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                Ok(Reference::Property(object, key))
            }
            _ => Err(self.throw_error("SyntaxError", "Invalid assignment target")),
        }
    }

    fn get_reference(&mut self, reference: &Reference, scope: &ScopeRef) -> Result<Value, Fault> {
        match reference {
            Reference::Binding(name) => self.lookup(name, scope),
            Reference::Property(object, key) => self.get(object, key),
        }
    }

    fn put_reference(&mut self, reference: &Reference, value: Value, scope: &ScopeRef) -> Result<(), Fault> {
        match reference {
            Reference::Binding(name) => {
                self.assign_binding(name, value, scope);
                Ok(())
            }
            Reference::Property(object, key) => self.set(object, key, value),
        }
    }

    fn member_key(&mut self, property: &MemberProperty, scope: &ScopeRef) -> Result<String, Fault> {
        match property {
            MemberProperty::Static(id) => Ok(id.name.clone()),
            MemberProperty::Computed(expr) => Ok(to_display(&self.eval(expr, scope)?)),
        }
    }

    fn property_key(&mut self, key: &PropertyKey, scope: &ScopeRef) -> Result<String, Fault> {
        Ok(match key {
            PropertyKey::Identifier(id) => id.name.clone(),
            PropertyKey::String(s) => s.clone(),
            PropertyKey::Number(n) => format_number(*n),
            PropertyKey::Computed(expr) => to_display(&self.eval(expr, scope)?),
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn eval(&mut self, expr: &Expression, scope: &ScopeRef) -> Result<Value, Fault> {
        match expr {
            Expression::Identifier(id) => self.lookup(&id.name, scope),
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::string(s),
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expression::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(match element {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    });
                }
                Ok(Value::Object(self.new_array(values)))
            }
            Expression::Object(properties) => {
                let object = self.new_object();
                for property in properties {
                    let key = self.property_key(&property.key, scope)?;
                    let value = self.eval(&property.value, scope)?;
                    object.set_own(&key, value);
                }
                Ok(Value::Object(object))
            }
            Expression::Function(function) => {
                let this = (function.kind == FunctionKind::Arrow).then(|| scope.borrow().this.clone());
                Ok(Value::Object(self.new_closure(function.clone(), scope, this)))
            }
            Expression::This => Ok(scope.borrow().this.clone()),
            Expression::Unary(operator, argument) => self.eval_unary(*operator, argument, scope),
            Expression::Update {
                operator,
                prefix,
                argument,
            } => {
                let reference = self.reference(argument, scope)?;
                let old = to_number(&self.get_reference(&reference, scope)?);
                let new = match operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.put_reference(&reference, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expression::Binary(operator, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*operator, &left, &right)
            }
            Expression::Logical(operator, left, right) => {
                let left = self.eval(left, scope)?;
                let short_circuit = match operator {
                    LogicalOperator::And => !left.truthy(),
                    LogicalOperator::Or => left.truthy(),
                    LogicalOperator::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expression::Assignment(operator, target, value) => {
                let reference = self.reference(target, scope)?;
                let value = match operator.binary() {
                    None => self.eval(value, scope)?,
                    Some(binary) => {
                        let current = self.get_reference(&reference, scope)?;
                        let rhs = self.eval(value, scope)?;
                        self.binary(binary, &current, &rhs)?
                    }
                };
                self.put_reference(&reference, value.clone(), scope)?;
                Ok(value)
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expression::Call(callee, arguments) => self.eval_call(callee, arguments, scope),
            Expression::New(callee, arguments) => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_arguments(arguments, scope)?;
                if !constructor.is_function() {
                    return Err(self.type_error(format!("{} is not a constructor", callee_name(callee))));
                }
                self.construct(&constructor, &args)
            }
            Expression::Member(object, property) => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                self.get(&object, &key)
            }
            Expression::Sequence(expressions) => {
                let mut last = Value::Undefined;
                for expr in expressions {
                    last = self.eval(expr, scope)?;
                }
                Ok(last)
            }
        }
    }

    fn eval_arguments(&mut self, arguments: &[Expression], scope: &ScopeRef) -> Result<Vec<Value>, Fault> {
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.eval(argument, scope)?);
        }
        Ok(values)
    }

    fn eval_call(
        &mut self,
        callee: &Expression,
        arguments: &[Expression],
        scope: &ScopeRef,
    ) -> Result<Value, Fault> {
        let (function, this) = match callee {
            Expression::Member(object, property) => {
                let object = self.eval(object, scope)?;
                let key = self.member_key(property, scope)?;
                (self.get(&object, &key)?, object)
            }
            _ => (self.eval(callee, scope)?, Value::Undefined),
        };
        let args = self.eval_arguments(arguments, scope)?;
        if !function.is_function() {
            return Err(self.type_error(format!("{} is not a function", callee_name(callee))));
        }
        self.call(&function, this, &args)
    }

    fn eval_unary(
        &mut self,
        operator: UnaryOperator,
        argument: &Expression,
        scope: &ScopeRef,
    ) -> Result<Value, Fault> {
        match operator {
            UnaryOperator::Typeof => {
                let value = match argument {
                    Expression::Identifier(id) => self.try_lookup(&id.name, scope)?.unwrap_or_default(),
                    _ => self.eval(argument, scope)?,
                };
                Ok(Value::string(value.type_of()))
            }
            UnaryOperator::Delete => match argument {
                Expression::Member(object, property) => {
                    let object = self.eval(object, scope)?;
                    let key = self.member_key(property, scope)?;
                    match &object {
                        Value::Object(target) => Ok(Value::Bool(target.delete_own(&key))),
                        Value::Undefined | Value::Null => Err(self.type_error(format!(
                            "Cannot convert {} to object",
                            to_display(&object)
                        ))),
                        _ => Ok(Value::Bool(true)),
                    }
                }
                Expression::Identifier(id) => {
                    if binding_scope(scope, &id.name).is_some() {
                        return Ok(Value::Bool(false));
                    }
                    let global = scope.borrow().global.clone();
                    Ok(Value::Bool(global.delete_own(&id.name)))
                }
                _ => {
                    self.eval(argument, scope)?;
                    Ok(Value::Bool(true))
                }
            },
            UnaryOperator::Void => {
                self.eval(argument, scope)?;
                Ok(Value::Undefined)
            }
            UnaryOperator::Not => Ok(Value::Bool(!self.eval(argument, scope)?.truthy())),
            UnaryOperator::Minus => Ok(Value::Number(-to_number(&self.eval(argument, scope)?))),
            UnaryOperator::Plus => Ok(Value::Number(to_number(&self.eval(argument, scope)?))),
            UnaryOperator::BitNot => Ok(Value::Number(f64::from(!to_int32(&self.eval(argument, scope)?)))),
        }
    }

    pub(crate) fn binary(&mut self, operator: BinaryOperator, left: &Value, right: &Value) -> Result<Value, Fault> {
        use BinaryOperator::*;
        let value = match operator {
            Add => add_values(left, right),
            Subtract => Value::Number(to_number(left) - to_number(right)),
            Multiply => Value::Number(to_number(left) * to_number(right)),
            Divide => Value::Number(to_number(left) / to_number(right)),
            Remainder => Value::Number(to_number(left) % to_number(right)),
            Exponent => Value::Number(to_number(left).powf(to_number(right))),
            Equal => Value::Bool(loose_equals(left, right)),
            NotEqual => Value::Bool(!loose_equals(left, right)),
            StrictEqual => Value::Bool(left.strict_equals(right)),
            StrictNotEqual => Value::Bool(!left.strict_equals(right)),
            LessThan => Value::Bool(compare(left, right) == Some(Ordering::Less)),
            LessThanOrEqual => Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            GreaterThan => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
            GreaterThanOrEqual => Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BitAnd => Value::Number(f64::from(to_int32(left) & to_int32(right))),
            BitOr => Value::Number(f64::from(to_int32(left) | to_int32(right))),
            BitXor => Value::Number(f64::from(to_int32(left) ^ to_int32(right))),
            ShiftLeft => Value::Number(f64::from(to_int32(left).wrapping_shl(to_uint32(right) & 31))),
            ShiftRight => Value::Number(f64::from(to_int32(left) >> (to_uint32(right) & 31))),
            UnsignedShiftRight => Value::Number(f64::from(to_uint32(left) >> (to_uint32(right) & 31))),
            In => match right {
                Value::Object(object) => Value::Bool(object.has_property(&to_display(left))),
                _ => {
                    return Err(self.type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        to_display(left),
                        to_display(right)
                    )))
                }
            },
            Instanceof => Value::Bool(self.instance_of(left, right)?),
        };
        Ok(value)
    }
}

fn binding_scope(scope: &ScopeRef, name: &str) -> Option<ScopeRef> {
    let mut current = scope.clone();
    loop {
        let parent = {
            let frame = current.borrow();
            if frame.vars.contains_key(name) {
                drop(frame);
                return Some(current);
            }
            frame.parent.clone()
        };
        current = parent?;
    }
}

/// Callee text for error messages, without the handle prefix.
fn callee_name(callee: &Expression) -> String {
    generate_expression(callee).replace(&format!("{HANDLE}."), "")
}

fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::string(to_display(value)),
        other => other.clone(),
    }
}

fn add_values(left: &Value, right: &Value) -> Value {
    let left = to_primitive(left);
    let right = to_primitive(right);
    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
        let mut joined = to_display(&left);
        joined.push_str(&to_display(&right));
        Value::from(joined)
    } else {
        Value::Number(to_number(&left) + to_number(&right))
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let left = to_primitive(left);
    let right = to_primitive(right);
    match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => to_number(&left).partial_cmp(&to_number(&right)),
    }
}

pub(crate) fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Number(x), Value::String(_)) => *x == to_number(b),
        (Value::String(_), Value::Number(y)) => to_number(a) == *y,
        (Value::Bool(_), _) => loose_equals(&Value::Number(to_number(a)), b),
        (_, Value::Bool(_)) => loose_equals(a, &Value::Number(to_number(b))),
        (Value::Object(_), Value::Object(_)) => a.strict_equals(b),
        (Value::Object(_), _) => loose_equals(&Value::string(to_display(a)), b),
        (_, Value::Object(_)) => loose_equals(a, &Value::string(to_display(b))),
        _ => a.strict_equals(b),
    }
}
