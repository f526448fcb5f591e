//! Depth-first traversal with composable enter/leave visitors.
//!
//! Every visitor sees every node in one shared walk. `enter` runs in
//! pre-order and `leave` in post-order, both with the ancestor path. A
//! `leave` hook may hand back a [`Replacement`]; the walker owns the slot
//! and assigns or splices it there.

use crate::ast::*;
use crate::errors::SketchError;
use std::rc::Rc;
use tracing::warn;

/// Structural role of an identifier that is not a reference.
///
/// References are visited as [`NodeMut::Expression`] so they can be
/// replaced by arbitrary expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierRole {
    /// Parameter, catch parameter or declarator id.
    Binding,
    FunctionName,
    /// Key of a non-computed object literal property.
    PropertyKey,
    /// Name in a non-computed member access, `object.name`.
    MemberName,
}

pub enum NodeMut<'a> {
    Program(&'a mut Program),
    Statement(&'a mut Statement),
    Expression(&'a mut Expression),
    Function(&'a mut Function),
    Declarator(&'a mut VariableDeclarator),
    Identifier(&'a mut Identifier, IdentifierRole),
    Property(&'a mut Property),
    SwitchCase(&'a mut SwitchCase),
    CatchClause(&'a mut CatchClause),
    ForInit(&'a mut ForInit),
    ForInLeft(&'a mut ForInLeft),
    /// A hole in an array literal.
    Hole,
}

/// One step of the root-to-node chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestor {
    Program,
    /// Statement kind name, e.g. `ForStatement`.
    Statement(&'static str),
    Expression,
    Function(FunctionKind),
    Declarator,
    Property,
    SwitchCase,
    CatchClause,
    ForInit,
    ForInLeft,
}

impl Ancestor {
    pub fn is_function(&self) -> bool {
        matches!(self, Ancestor::Function(_))
    }
}

/// No function-like ancestor: the node is at global scope.
pub fn at_global_scope(path: &[Ancestor]) -> bool {
    !path.iter().any(Ancestor::is_function)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Keep,
    Statement(Statement),
    /// Spliced into the parent statement list; an empty list removes the node.
    Statements(Vec<Statement>),
    Expression(Expression),
}

pub trait Visitor {
    fn enter(&mut self, _node: NodeMut<'_>, _path: &[Ancestor]) -> Result<(), SketchError> {
        Ok(())
    }

    fn leave(&mut self, _node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
        Ok(Replacement::Keep)
    }
}

/// Walks `program` with `visitors`, in the order given.
pub fn walk(program: &mut Program, visitors: &mut [&mut dyn Visitor]) -> Result<(), SketchError> {
    let mut walker = Walker {
        visitors,
        path: Vec::new(),
    };
    walker.walk_program(program)
}

struct Walker<'a, 'v> {
    visitors: &'a mut [&'v mut dyn Visitor],
    path: Vec<Ancestor>,
}

macro_rules! enter_all {
    ($walker:expr, $node:expr) => {
        for visitor in $walker.visitors.iter_mut() {
            visitor.enter($node, &$walker.path)?;
        }
    };
}

/// Runs every `leave` hook for a node that accepts no replacement.
macro_rules! leave_all {
    ($walker:expr, $node:expr, $what:expr) => {
        for visitor in $walker.visitors.iter_mut() {
            let replacement = visitor.leave($node, &$walker.path)?;
            if replacement != Replacement::Keep {
                mismatched($what, &$walker.path, &replacement);
            }
        }
    };
}

fn mismatched(slot: &str, path: &[Ancestor], replacement: &Replacement) {
    warn!(slot, ?path, ?replacement, "replacement does not fit its slot; keeping the original node");
}

impl Walker<'_, '_> {
    fn with_ancestor<T>(
        &mut self,
        ancestor: Ancestor,
        f: impl FnOnce(&mut Self) -> Result<T, SketchError>,
    ) -> Result<T, SketchError> {
        self.path.push(ancestor);
        let result = f(self);
        self.path.pop();
        result
    }

    fn walk_program(&mut self, program: &mut Program) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Program(&mut *program));
        self.with_ancestor(Ancestor::Program, |w| w.walk_statements(&mut program.body))?;
        leave_all!(self, NodeMut::Program(&mut *program), "program");
        Ok(())
    }

    fn walk_statements(&mut self, statements: &mut Vec<Statement>) -> Result<(), SketchError> {
        let mut index = 0;
        while index < statements.len() {
            match self.walk_statement(&mut statements[index])? {
                None => index += 1,
                Some(inserted) => {
                    // Spliced siblings are not traversed.
                    let consumed = inserted.len();
                    statements.splice(index..=index, inserted);
                    index += consumed;
                }
            }
        }
        Ok(())
    }

    /// A statement in a single-statement slot; a spliced list becomes a block.
    fn walk_nested_statement(&mut self, slot: &mut Statement) -> Result<(), SketchError> {
        if let Some(statements) = self.walk_statement(slot)? {
            *slot = Statement::Block(Block::new(statements));
        }
        Ok(())
    }

    fn walk_statement(&mut self, stmt: &mut Statement) -> Result<Option<Vec<Statement>>, SketchError> {
        enter_all!(self, NodeMut::Statement(&mut *stmt));
        let ancestor = Ancestor::Statement(stmt.kind_name());
        self.with_ancestor(ancestor, |w| w.walk_statement_children(stmt))?;

        for visitor in self.visitors.iter_mut() {
            match visitor.leave(NodeMut::Statement(&mut *stmt), &self.path)? {
                Replacement::Keep => {}
                Replacement::Statement(new) => *stmt = new,
                Replacement::Statements(list) => return Ok(Some(list)),
                other => mismatched("statement", &self.path, &other),
            }
        }
        Ok(None)
    }

    fn walk_statement_children(&mut self, stmt: &mut Statement) -> Result<(), SketchError> {
        match stmt {
            Statement::Expression(expr) | Statement::Throw(expr) => self.walk_expression(expr),
            Statement::Return(argument) => match argument {
                Some(expr) => self.walk_expression(expr),
                None => Ok(()),
            },
            Statement::Variable(decl) => self.walk_declarators(decl),
            Statement::Function(function) => self.walk_function(Rc::make_mut(function)),
            Statement::Block(block) => self.walk_statements(&mut block.body),
            Statement::If(if_stmt) => {
                self.walk_expression(&mut if_stmt.test)?;
                self.walk_nested_statement(&mut if_stmt.consequent)?;
                if let Some(alternate) = &mut if_stmt.alternate {
                    self.walk_nested_statement(alternate)?;
                }
                Ok(())
            }
            Statement::For(for_stmt) => {
                self.walk_for_init(&mut for_stmt.init)?;
                if let Some(test) = &mut for_stmt.test {
                    self.walk_expression(test)?;
                }
                if let Some(update) = &mut for_stmt.update {
                    self.walk_expression(update)?;
                }
                self.walk_nested_statement(&mut for_stmt.body)
            }
            Statement::ForIn(for_in) => {
                self.walk_for_in_left(&mut for_in.left)?;
                self.walk_expression(&mut for_in.right)?;
                self.walk_nested_statement(&mut for_in.body)
            }
            Statement::While(while_stmt) => {
                self.walk_expression(&mut while_stmt.test)?;
                self.walk_nested_statement(&mut while_stmt.body)
            }
            Statement::DoWhile(do_while) => {
                self.walk_nested_statement(&mut do_while.body)?;
                self.walk_expression(&mut do_while.test)
            }
            Statement::Try(try_stmt) => {
                self.walk_statements(&mut try_stmt.block.body)?;
                if let Some(handler) = &mut try_stmt.handler {
                    self.walk_catch_clause(handler)?;
                }
                if let Some(finalizer) = &mut try_stmt.finalizer {
                    self.walk_statements(&mut finalizer.body)?;
                }
                Ok(())
            }
            Statement::Switch(switch) => {
                self.walk_expression(&mut switch.discriminant)?;
                for case in &mut switch.cases {
                    self.walk_switch_case(case)?;
                }
                Ok(())
            }
            Statement::Break | Statement::Continue | Statement::Empty => Ok(()),
        }
    }

    fn walk_declarators(&mut self, decl: &mut VariableDeclaration) -> Result<(), SketchError> {
        for declarator in &mut decl.declarations {
            self.walk_declarator(declarator)?;
        }
        Ok(())
    }

    fn walk_declarator(&mut self, declarator: &mut VariableDeclarator) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Declarator(&mut *declarator));
        self.with_ancestor(Ancestor::Declarator, |w| {
            w.walk_identifier(&mut declarator.id, IdentifierRole::Binding)?;
            match &mut declarator.init {
                Some(init) => w.walk_expression(init),
                None => Ok(()),
            }
        })?;
        leave_all!(self, NodeMut::Declarator(&mut *declarator), "declarator");
        Ok(())
    }

    fn walk_for_init(&mut self, slot: &mut Option<ForInit>) -> Result<(), SketchError> {
        let Some(init) = slot else {
            return Ok(());
        };
        enter_all!(self, NodeMut::ForInit(&mut *init));
        self.with_ancestor(Ancestor::ForInit, |w| match init {
            ForInit::Declaration(decl) => w.walk_declarators(decl),
            ForInit::Expression(expr) => w.walk_expression(expr),
        })?;

        for visitor in self.visitors.iter_mut() {
            let Some(init) = slot.as_mut() else {
                break;
            };
            match visitor.leave(NodeMut::ForInit(&mut *init), &self.path)? {
                Replacement::Keep => {}
                Replacement::Expression(expr) => *init = ForInit::Expression(expr),
                Replacement::Statements(list) if list.is_empty() => *slot = None,
                other => mismatched("for-init", &self.path, &other),
            }
        }
        Ok(())
    }

    fn walk_for_in_left(&mut self, left: &mut ForInLeft) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::ForInLeft(&mut *left));
        self.with_ancestor(Ancestor::ForInLeft, |w| match left {
            ForInLeft::Declaration(decl) => w.walk_declarators(decl),
            ForInLeft::Target(expr) => w.walk_expression(expr),
        })?;

        for visitor in self.visitors.iter_mut() {
            match visitor.leave(NodeMut::ForInLeft(&mut *left), &self.path)? {
                Replacement::Keep => {}
                Replacement::Expression(expr) => *left = ForInLeft::Target(expr),
                other => mismatched("for-in left side", &self.path, &other),
            }
        }
        Ok(())
    }

    fn walk_function(&mut self, function: &mut Function) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Function(&mut *function));
        self.with_ancestor(Ancestor::Function(function.kind), |w| {
            if let Some(id) = &mut function.id {
                w.walk_identifier(id, IdentifierRole::FunctionName)?;
            }
            for param in &mut function.params {
                w.walk_identifier(param, IdentifierRole::Binding)?;
            }
            match &mut function.body {
                FunctionBody::Block(block) => w.walk_statements(&mut block.body),
                FunctionBody::Expression(expr) => w.walk_expression(expr),
            }
        })?;
        leave_all!(self, NodeMut::Function(&mut *function), "function");
        Ok(())
    }

    fn walk_catch_clause(&mut self, clause: &mut CatchClause) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::CatchClause(&mut *clause));
        self.with_ancestor(Ancestor::CatchClause, |w| {
            if let Some(param) = &mut clause.param {
                w.walk_identifier(param, IdentifierRole::Binding)?;
            }
            w.walk_statements(&mut clause.body.body)
        })?;
        leave_all!(self, NodeMut::CatchClause(&mut *clause), "catch clause");
        Ok(())
    }

    fn walk_switch_case(&mut self, case: &mut SwitchCase) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::SwitchCase(&mut *case));
        self.with_ancestor(Ancestor::SwitchCase, |w| {
            if let Some(test) = &mut case.test {
                w.walk_expression(test)?;
            }
            w.walk_statements(&mut case.consequent)
        })?;
        leave_all!(self, NodeMut::SwitchCase(&mut *case), "switch case");
        Ok(())
    }

    fn walk_identifier(&mut self, id: &mut Identifier, role: IdentifierRole) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Identifier(&mut *id, role));
        leave_all!(self, NodeMut::Identifier(&mut *id, role), "identifier");
        Ok(())
    }

    fn walk_hole(&mut self) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Hole);
        leave_all!(self, NodeMut::Hole, "array hole");
        Ok(())
    }

    fn walk_property(&mut self, property: &mut Property) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Property(&mut *property));
        self.with_ancestor(Ancestor::Property, |w| {
            match &mut property.key {
                PropertyKey::Identifier(id) => w.walk_identifier(id, IdentifierRole::PropertyKey)?,
                PropertyKey::Computed(key) => w.walk_expression(key)?,
                PropertyKey::String(_) | PropertyKey::Number(_) => {}
            }
            w.walk_expression(&mut property.value)
        })?;
        leave_all!(self, NodeMut::Property(&mut *property), "property");
        Ok(())
    }

    fn walk_expression(&mut self, expr: &mut Expression) -> Result<(), SketchError> {
        enter_all!(self, NodeMut::Expression(&mut *expr));
        self.with_ancestor(Ancestor::Expression, |w| w.walk_expression_children(expr))?;

        for visitor in self.visitors.iter_mut() {
            match visitor.leave(NodeMut::Expression(&mut *expr), &self.path)? {
                Replacement::Keep => {}
                Replacement::Expression(new) => *expr = new,
                other => mismatched("expression", &self.path, &other),
            }
        }
        Ok(())
    }

    fn walk_expression_children(&mut self, expr: &mut Expression) -> Result<(), SketchError> {
        match expr {
            Expression::Identifier(_) | Expression::Literal(_) | Expression::This => Ok(()),
            Expression::Array(elements) => {
                for element in elements {
                    match element {
                        Some(element) => self.walk_expression(element)?,
                        None => self.walk_hole()?,
                    }
                }
                Ok(())
            }
            Expression::Object(properties) => {
                for property in properties {
                    self.walk_property(property)?;
                }
                Ok(())
            }
            Expression::Function(function) => self.walk_function(Rc::make_mut(function)),
            Expression::Unary(_, argument) | Expression::Update { argument, .. } => {
                self.walk_expression(argument)
            }
            Expression::Binary(_, left, right)
            | Expression::Logical(_, left, right)
            | Expression::Assignment(_, left, right) => {
                self.walk_expression(left)?;
                self.walk_expression(right)
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.walk_expression(test)?;
                self.walk_expression(consequent)?;
                self.walk_expression(alternate)
            }
            Expression::Call(callee, arguments) | Expression::New(callee, arguments) => {
                self.walk_expression(callee)?;
                for argument in arguments {
                    self.walk_expression(argument)?;
                }
                Ok(())
            }
            Expression::Member(object, property) => {
                self.walk_expression(object)?;
                match property {
                    MemberProperty::Static(name) => {
                        self.walk_identifier(name, IdentifierRole::MemberName)
                    }
                    MemberProperty::Computed(index) => self.walk_expression(index),
                }
            }
            Expression::Sequence(expressions) => {
                for expr in expressions {
                    self.walk_expression(expr)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;
    use crate::parser::parse;

    /// Records a trace of enter/leave events by node family.
    #[derive(Default)]
    struct Tracer {
        events: Vec<String>,
    }

    fn label(node: &NodeMut<'_>) -> String {
        match node {
            NodeMut::Program(_) => "program".into(),
            NodeMut::Statement(stmt) => stmt.kind_name().into(),
            NodeMut::Expression(Expression::Identifier(id)) => format!("ref:{}", id.name),
            NodeMut::Expression(_) => "expr".into(),
            NodeMut::Function(_) => "function".into(),
            NodeMut::Declarator(_) => "declarator".into(),
            NodeMut::Identifier(id, role) => format!("{role:?}:{}", id.name),
            NodeMut::Property(_) => "property".into(),
            NodeMut::SwitchCase(_) => "case".into(),
            NodeMut::CatchClause(_) => "catch".into(),
            NodeMut::ForInit(_) => "for-init".into(),
            NodeMut::ForInLeft(_) => "for-in-left".into(),
            NodeMut::Hole => "hole".into(),
        }
    }

    impl Visitor for Tracer {
        fn enter(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<(), SketchError> {
            self.events.push(format!("+{}", label(&node)));
            Ok(())
        }

        fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
            self.events.push(format!("-{}", label(&node)));
            Ok(Replacement::Keep)
        }
    }

    /// Replaces every `a()` statement with `b(); c();`.
    struct Splitter {
        seen_calls: Vec<String>,
    }

    impl Visitor for Splitter {
        fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
            let NodeMut::Statement(Statement::Expression(Expression::Call(callee, _))) = node else {
                return Ok(Replacement::Keep);
            };
            let Some(name) = callee.as_identifier().map(|id| id.name.clone()) else {
                return Ok(Replacement::Keep);
            };
            self.seen_calls.push(name.clone());
            if name != "a" {
                return Ok(Replacement::Keep);
            }
            let call = |n: &str| Statement::Expression(Expression::call(Expression::identifier(n), vec![]));
            Ok(Replacement::Statements(vec![call("b"), call("c")]))
        }
    }

    #[test]
    fn test_pre_and_post_order() {
        let mut program = parse("var x = y;").unwrap();
        let mut tracer = Tracer::default();
        walk(&mut program, &mut [&mut tracer]).unwrap();
        assert_eq!(
            tracer.events,
            [
                "+program",
                "+VariableDeclaration",
                "+declarator",
                "+Binding:x",
                "-Binding:x",
                "+ref:y",
                "-ref:y",
                "-declarator",
                "-VariableDeclaration",
                "-program"
            ]
        );
    }

    #[test]
    fn test_splice_skips_inserted_siblings() {
        let mut program = parse("a(); d();").unwrap();
        let mut splitter = Splitter { seen_calls: vec![] };
        walk(&mut program, &mut [&mut splitter]).unwrap();
        assert_eq!(generate(&program), "b();\nc();\nd();\n");
        assert_eq!(splitter.seen_calls, ["a", "d"]);
    }

    #[test]
    fn test_splice_into_single_statement_slot_wraps_block() {
        let mut program = parse("if (x) a();").unwrap();
        let mut splitter = Splitter { seen_calls: vec![] };
        walk(&mut program, &mut [&mut splitter]).unwrap();
        assert_eq!(generate(&program), "if (x) {\n    b();\n    c();\n}\n");
    }

    #[test]
    fn test_later_visitors_do_not_see_spliced_node() {
        let mut program = parse("a();").unwrap();
        let mut splitter = Splitter { seen_calls: vec![] };
        let mut tracer = Tracer::default();
        walk(&mut program, &mut [&mut splitter, &mut tracer]).unwrap();
        assert!(!tracer.events.contains(&"-ExpressionStatement".to_string()));
        assert!(tracer.events.contains(&"+ExpressionStatement".to_string()));
    }

    #[test]
    fn test_holes_are_visited() {
        let mut program = parse("x = [1, , 3];").unwrap();
        let mut tracer = Tracer::default();
        walk(&mut program, &mut [&mut tracer]).unwrap();
        assert!(tracer.events.contains(&"+hole".to_string()));
    }

    #[test]
    fn test_visitor_error_stops_walk() {
        struct Failing;
        impl Visitor for Failing {
            fn enter(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<(), SketchError> {
                match node {
                    NodeMut::Expression(Expression::Identifier(id)) if id.name == "boom" => {
                        Err(SketchError::runtime("boom"))
                    }
                    _ => Ok(()),
                }
            }
        }

        let mut program = parse("ok(); boom(); later();").unwrap();
        let mut failing = Failing;
        let mut tracer = Tracer::default();
        let err = walk(&mut program, &mut [&mut failing, &mut tracer]).unwrap_err();
        assert_eq!(err, SketchError::runtime("boom"));
        assert!(!tracer.events.iter().any(|e| e.contains("later")));
    }

    #[test]
    fn test_path_reports_function_ancestors() {
        struct ScopeProbe {
            global: Vec<(String, bool)>,
        }
        impl Visitor for ScopeProbe {
            fn enter(&mut self, node: NodeMut<'_>, path: &[Ancestor]) -> Result<(), SketchError> {
                if let NodeMut::Declarator(d) = node {
                    self.global.push((d.id.name.clone(), at_global_scope(path)));
                }
                Ok(())
            }
        }

        let mut program = parse("var a = function () { var b; };").unwrap();
        let mut probe = ScopeProbe { global: vec![] };
        walk(&mut program, &mut [&mut probe]).unwrap();
        assert_eq!(
            probe.global,
            [("a".to_string(), true), ("b".to_string(), false)]
        );
    }

    #[test]
    fn test_mismatched_replacement_is_kept() {
        struct Confused;
        impl Visitor for Confused {
            fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
                Ok(match node {
                    NodeMut::Expression(_) => Replacement::Statements(vec![Statement::Empty]),
                    _ => Replacement::Keep,
                })
            }
        }

        let mut program = parse("f(x);").unwrap();
        walk(&mut program, &mut [&mut Confused]).unwrap();
        assert_eq!(generate(&program), "f(x);\n");
    }
}
