//! Global rewriter: routes every global reference through the handle.

use super::scope::{function_frame_names, hoisted_names, Resolution, ScopeStack};
use super::{handle_member, Capabilities, EXEMPT_NAMES, HANDLE, RISK_NAMES};
use crate::ast::*;
use crate::errors::SketchError;
use crate::walker::{at_global_scope, Ancestor, NodeMut, Replacement, Visitor};

pub struct GlobalRewriter<'c> {
    scopes: ScopeStack,
    capabilities: &'c Capabilities,
}

impl<'c> GlobalRewriter<'c> {
    pub fn new(capabilities: &'c Capabilities) -> Self {
        Self {
            scopes: ScopeStack::new(),
            capabilities,
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.depth()
    }

    fn should_rewrite(&self, name: &str) -> bool {
        if name == HANDLE || EXEMPT_NAMES.contains(&name) {
            return false;
        }
        match self.scopes.resolve(name) {
            Resolution::Global => true,
            Resolution::Unresolved => self.capabilities.contains(name),
            Resolution::Local(_) => false,
        }
    }

    fn rewrite_declaration(&self, decl: &mut VariableDeclaration, path: &[Ancestor]) -> Replacement {
        if at_global_scope(path) {
            let mut assignments: Vec<Statement> = global_assignments(decl)
                .into_iter()
                .map(Statement::Expression)
                .collect();
            return if decl.declarations.len() == 1 && assignments.len() == 1 {
                Replacement::Statement(assignments.remove(0))
            } else {
                Replacement::Statements(assignments)
            };
        }

        let mixes_risk_name = decl.declarations.len() > 1
            && decl
                .declarations
                .iter()
                .any(|d| RISK_NAMES.contains(&d.id.name.as_str()));
        if !mixes_risk_name {
            return Replacement::Keep;
        }
        let split = std::mem::take(&mut decl.declarations)
            .into_iter()
            .map(|declarator| {
                Statement::Variable(VariableDeclaration {
                    kind: decl.kind,
                    declarations: vec![declarator],
                    loc: decl.loc,
                })
            })
            .collect();
        Replacement::Statements(split)
    }
}

/// `__env__.name = init` for every initialized declarator, in order.
fn global_assignments(decl: &mut VariableDeclaration) -> Vec<Expression> {
    decl.declarations
        .iter_mut()
        .filter_map(|declarator| {
            let init = declarator.init.take()?;
            Some(Expression::assign(handle_member(&declarator.id), init))
        })
        .collect()
}

impl Visitor for GlobalRewriter<'_> {
    fn enter(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<(), SketchError> {
        match node {
            NodeMut::Program(program) => {
                for name in hoisted_names(&program.body) {
                    self.scopes.declare(name);
                }
            }
            NodeMut::Function(function) => self.scopes.push(function_frame_names(function)),
            NodeMut::CatchClause(clause) => {
                if let Some(param) = &clause.param {
                    self.scopes.push_catch(param.name.clone());
                }
            }
            NodeMut::Declarator(declarator) => self.scopes.declare(declarator.id.name.clone()),
            _ => {}
        }
        Ok(())
    }

    fn leave(&mut self, node: NodeMut<'_>, path: &[Ancestor]) -> Result<Replacement, SketchError> {
        let replacement = match node {
            NodeMut::Function(_) => {
                self.scopes.pop();
                Replacement::Keep
            }
            NodeMut::CatchClause(clause) => {
                if clause.param.is_some() {
                    self.scopes.pop_catch();
                }
                Replacement::Keep
            }
            NodeMut::Expression(Expression::Identifier(id)) if self.should_rewrite(&id.name) => {
                Replacement::Expression(handle_member(id))
            }
            NodeMut::Statement(Statement::Variable(decl)) => self.rewrite_declaration(decl, path),
            NodeMut::ForInit(ForInit::Declaration(decl)) if at_global_scope(path) => {
                let mut assignments = global_assignments(decl);
                match assignments.len() {
                    0 => Replacement::Statements(Vec::new()),
                    1 => Replacement::Expression(assignments.remove(0)),
                    _ => Replacement::Expression(Expression::Sequence(assignments)),
                }
            }
            NodeMut::ForInLeft(ForInLeft::Declaration(decl)) if at_global_scope(path) => {
                match decl.declarations.first() {
                    Some(declarator) => Replacement::Expression(handle_member(&declarator.id)),
                    None => Replacement::Keep,
                }
            }
            _ => Replacement::Keep,
        };
        Ok(replacement)
    }
}
