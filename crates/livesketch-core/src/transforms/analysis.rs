//! Read-only facts about a script that the injector bases its decisions on.

use super::scope::{function_frame_names, hoisted_names, Resolution, ScopeStack};
use super::EXEMPT_NAMES;
use crate::ast::*;
use crate::errors::{SketchError, SketchResult};
use crate::walker::{walk, Ancestor, NodeMut, Replacement, Visitor};
use indexmap::IndexSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptFacts {
    /// Names declared at top level plus every free reference, in first-seen order.
    pub globals: IndexSet<String>,
    /// The script calls `createGraphics(...)` somewhere.
    pub creates_graphics: bool,
}

/// Analyzes an untransformed program.
pub fn analyze(program: &mut Program) -> SketchResult<ScriptFacts> {
    let mut collector = FactCollector::default();
    walk(program, &mut [&mut collector])?;
    Ok(collector.facts)
}

#[derive(Default)]
struct FactCollector {
    scopes: ScopeStack,
    facts: ScriptFacts,
}

impl Visitor for FactCollector {
    fn enter(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<(), SketchError> {
        match node {
            NodeMut::Program(program) => {
                for name in hoisted_names(&program.body) {
                    self.scopes.declare(name.clone());
                    self.facts.globals.insert(name);
                }
            }
            NodeMut::Function(function) => self.scopes.push(function_frame_names(function)),
            NodeMut::CatchClause(clause) => {
                if let Some(param) = &clause.param {
                    self.scopes.push_catch(param.name.clone());
                }
            }
            NodeMut::Expression(Expression::Identifier(id)) => {
                let free = !matches!(self.scopes.resolve(&id.name), Resolution::Local(_));
                if free && !EXEMPT_NAMES.contains(&id.name.as_str()) {
                    self.facts.globals.insert(id.name.clone());
                }
            }
            NodeMut::Expression(Expression::Call(callee, _)) => {
                if callee.as_identifier().is_some_and(|id| id.name == "createGraphics") {
                    self.facts.creates_graphics = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
        match node {
            NodeMut::Function(_) => self.scopes.pop(),
            NodeMut::CatchClause(clause) if clause.param.is_some() => self.scopes.pop_catch(),
            _ => {}
        }
        Ok(Replacement::Keep)
    }
}
