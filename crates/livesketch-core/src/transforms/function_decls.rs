use crate::ast::*;
use crate::errors::SketchError;
use crate::walker::{Ancestor, NodeMut, Replacement, Visitor};
use std::rc::Rc;

/// Rewrites `function f(a) {...}` into `var f = function (a) {...};` so the
/// global rewriter treats it like any other binding.
///
/// Declarations directly in a function body are left alone: they are hoisted
/// with their value when the function is called, and may be used before the
/// line that declares them.
pub struct FunctionDeclarations;

impl Visitor for FunctionDeclarations {
    fn leave(&mut self, node: NodeMut<'_>, path: &[Ancestor]) -> Result<Replacement, SketchError> {
        let NodeMut::Statement(Statement::Function(function)) = node else {
            return Ok(Replacement::Keep);
        };
        if matches!(path.last(), Some(Ancestor::Function(_))) {
            return Ok(Replacement::Keep);
        }
        let function = Rc::make_mut(function);
        let Some(name) = function.id.take() else {
            return Ok(Replacement::Keep);
        };

        let expression = Function {
            kind: FunctionKind::Expression,
            id: None,
            params: std::mem::take(&mut function.params),
            body: std::mem::replace(&mut function.body, FunctionBody::Block(Block::default())),
            loc: function.loc,
        };
        Ok(Replacement::Statement(Statement::Variable(
            VariableDeclaration {
                kind: DeclarationKind::Var,
                declarations: vec![VariableDeclarator {
                    id: name,
                    init: Some(Expression::Function(Rc::new(expression))),
                }],
                loc: function.loc,
            },
        )))
    }
}
