//! Injects budget checkpoints into every loop and function body.

use super::{GuardOptions, LOOP_COUNT, LOOP_PROTECT, LOOP_SET_TIMEOUT};
use crate::ast::*;
use crate::errors::SketchError;
use crate::guard::RiskSite;
use crate::walker::{Ancestor, NodeMut, Replacement, Visitor};

pub struct LoopGuardInjector {
    options: GuardOptions,
}

impl LoopGuardInjector {
    pub fn new(options: GuardOptions) -> Self {
        Self { options }
    }

    /// `KAInfiniteLoopCount++; if (KAInfiniteLoopCount > N) { ... }`
    fn prelude(&self, node_type: &str, loc: Loc) -> Result<[Statement; 2], SketchError> {
        let counter = || Expression::identifier(LOOP_COUNT);

        let protect_args = if self.options.location_reporting {
            let site = RiskSite::new(node_type, loc);
            let json = serde_json::to_string(&site)
                .map_err(|err| SketchError::runtime(format!("cannot encode risk site: {err}")))?;
            vec![Expression::string(json)]
        } else {
            Vec::new()
        };

        let increment = Statement::Expression(Expression::Update {
            operator: UpdateOperator::Increment,
            prefix: false,
            argument: Box::new(counter()),
        });
        let check = Statement::If(IfStatement {
            test: Expression::binary(
                BinaryOperator::GreaterThan,
                counter(),
                Expression::number(f64::from(self.options.check_interval)),
            ),
            consequent: Box::new(Statement::Block(Block::new(vec![
                Statement::Expression(Expression::call(
                    Expression::identifier(LOOP_PROTECT),
                    protect_args,
                )),
                Statement::Expression(Expression::assign(counter(), Expression::number(0.0))),
            ]))),
            alternate: None,
        });
        Ok([increment, check])
    }

    fn guard_body(&self, body: &mut Statement, node_type: &str, loc: Loc) -> Result<(), SketchError> {
        if !matches!(body, Statement::Block(_)) {
            let single = std::mem::replace(body, Statement::Empty);
            *body = Statement::Block(Block::new(vec![single]));
        }
        if let Statement::Block(block) = body {
            let prelude = self.prelude(node_type, loc)?;
            block.body.splice(0..0, prelude);
        }
        Ok(())
    }
}

fn set_timeout(ms: u64) -> Statement {
    Statement::Expression(Expression::call(
        Expression::identifier(LOOP_SET_TIMEOUT),
        vec![Expression::number(ms as f64)],
    ))
}

impl Visitor for LoopGuardInjector {
    fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
        match node {
            NodeMut::Statement(stmt) => {
                let node_type = stmt.kind_name();
                match stmt {
                    Statement::While(WhileStatement { body, loc, .. })
                    | Statement::DoWhile(DoWhileStatement { body, loc, .. })
                    | Statement::For(ForStatement { body, loc, .. }) => {
                        let loc = *loc;
                        self.guard_body(body, node_type, loc)?;
                    }
                    _ => {}
                }
            }
            NodeMut::Function(function) => {
                let prelude = self.prelude(function.kind.node_type(), function.loc)?;
                function.ensure_block_body().body.splice(0..0, prelude);
            }
            NodeMut::Program(program) => {
                program.body.insert(0, set_timeout(self.options.startup_budget_ms));
                program.body.push(set_timeout(self.options.steady_budget_ms));
            }
            _ => {}
        }
        Ok(Replacement::Keep)
    }
}
