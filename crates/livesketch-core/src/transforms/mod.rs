//! Source-to-source passes that make a script safe to run in the sandbox.
//!
//! A transform is two walks over the tree. Pass 1 runs the banned-name
//! guard, the loop-guard injector and the function-declaration rewrite in a
//! single traversal. Pass 2 runs the global rewriter, which sees the guard
//! statements from pass 1 and routes them through the handle as well.
//!
//! Patch mode re-processes fragments that were already rewritten once, so
//! it first collapses every `__env__.name` back to `name`, bans only the
//! handle, and injects no guards.

pub mod analysis;
mod banned;
mod function_decls;
mod loop_guard;
mod rewriter;
pub mod scope;

pub use analysis::{analyze, ScriptFacts};
pub use banned::BannedIdentifiers;
pub use function_decls::FunctionDeclarations;
pub use loop_guard::LoopGuardInjector;
pub use rewriter::GlobalRewriter;

use crate::ast::{Expression, Identifier, MemberProperty, Program};
use crate::codegen::generate;
use crate::errors::{SketchError, SketchResult};
use crate::parser::parse;
use crate::walker::{walk, Ancestor, NodeMut, Replacement, Visitor};
use bitflags::bitflags;
use rustc_hash::FxHashSet;
use tracing::debug;

/// The single capability handle.
pub const HANDLE: &str = "__env__";
pub const LOOP_COUNT: &str = "KAInfiniteLoopCount";
pub const LOOP_PROTECT: &str = "KAInfiniteLoopProtect";
pub const LOOP_SET_TIMEOUT: &str = "KAInfiniteLoopSetTimeout";

/// Bare globals that are never routed through the handle.
pub const EXEMPT_NAMES: &[&str] = &["undefined", "Infinity", "NaN", "arguments"];

/// Names meaningful to the drawing target; a binding with one of these
/// names makes the script a draw loop.
pub const RISK_NAMES: &[&str] = &[
    "draw",
    "mouseClicked",
    "mouseDragged",
    "mouseMoved",
    "mousePressed",
    "mouseReleased",
    "mouseScrolled",
    "mouseOver",
    "mouseOut",
    "touchStart",
    "touchEnd",
    "touchMove",
    "touchCancel",
    "keyPressed",
    "keyReleased",
    "keyTyped",
];

bitflags! {
    /// Which passes a transform runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PassSet: u8 {
        const BANNED = 1 << 0;
        const LOOP_GUARD = 1 << 1;
        const FUNCTION_DECLS = 1 << 2;
        const GLOBALS = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// User-authored source.
    Fresh,
    /// Already-transformed, re-serialized fragments.
    Patch,
}

impl PassSet {
    pub fn for_mode(mode: TransformMode, loop_guard: bool) -> Self {
        match mode {
            TransformMode::Fresh if loop_guard => PassSet::all(),
            TransformMode::Fresh => PassSet::all() - PassSet::LOOP_GUARD,
            TransformMode::Patch => PassSet::BANNED | PassSet::FUNCTION_DECLS | PassSet::GLOBALS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOptions {
    pub check_interval: u32,
    pub location_reporting: bool,
    pub startup_budget_ms: u64,
    pub steady_budget_ms: u64,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            check_interval: 1000,
            location_reporting: true,
            startup_budget_ms: 2000,
            steady_budget_ms: 500,
        }
    }
}

/// Property names visible on the environment's prototype chain.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    names: FxHashSet<String>,
}

impl Capabilities {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name) || [LOOP_COUNT, LOOP_PROTECT, LOOP_SET_TIMEOUT].contains(&name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub mode: TransformMode,
    pub passes: PassSet,
    pub guard: GuardOptions,
}

impl TransformOptions {
    pub fn fresh(guard: GuardOptions) -> Self {
        Self {
            mode: TransformMode::Fresh,
            passes: PassSet::for_mode(TransformMode::Fresh, true),
            guard,
        }
    }

    pub fn patch() -> Self {
        Self {
            mode: TransformMode::Patch,
            passes: PassSet::for_mode(TransformMode::Patch, false),
            guard: GuardOptions::default(),
        }
    }

    pub fn without_loop_guard(mut self) -> Self {
        self.passes.remove(PassSet::LOOP_GUARD);
        self
    }
}

/// `__env__.name`, carrying the location of the original identifier.
pub fn handle_member(id: &Identifier) -> Expression {
    Expression::Member(
        Box::new(Expression::Identifier(Identifier::at(HANDLE, id.loc))),
        MemberProperty::Static(Identifier::at(id.name.clone(), id.loc)),
    )
}

/// Collapses `__env__.name` back into a bare `name`.
struct HandleCollapse;

impl Visitor for HandleCollapse {
    fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
        if let NodeMut::Expression(expr) = node {
            if let Some(name) = expr.as_handle_member(HANDLE) {
                return Ok(Replacement::Expression(Expression::Identifier(name.clone())));
            }
        }
        Ok(Replacement::Keep)
    }
}

/// Runs the configured passes over `program` in place.
pub fn transform_program(
    program: &mut Program,
    options: &TransformOptions,
    capabilities: &Capabilities,
) -> SketchResult<()> {
    if options.mode == TransformMode::Patch {
        walk(program, &mut [&mut HandleCollapse])?;
    }

    let mut banned = match options.mode {
        TransformMode::Fresh => BannedIdentifiers::fresh(),
        TransformMode::Patch => BannedIdentifiers::patch(),
    };
    let mut loop_guard = LoopGuardInjector::new(options.guard);
    let mut function_decls = FunctionDeclarations;

    let mut first_pass: Vec<&mut dyn Visitor> = Vec::new();
    if options.passes.contains(PassSet::BANNED) {
        first_pass.push(&mut banned);
    }
    if options.passes.contains(PassSet::LOOP_GUARD) {
        first_pass.push(&mut loop_guard);
    }
    if options.passes.contains(PassSet::FUNCTION_DECLS) {
        first_pass.push(&mut function_decls);
    }
    if !first_pass.is_empty() {
        walk(program, &mut first_pass)?;
    }

    if options.passes.contains(PassSet::GLOBALS) {
        let mut rewriter = GlobalRewriter::new(capabilities);
        walk(program, &mut [&mut rewriter])?;
        debug_assert_eq!(rewriter.depth(), 1, "scope stack must unwind to the global frame");
    }

    debug!(mode = ?options.mode, passes = ?options.passes, "transformed program");
    Ok(())
}

/// Parses, transforms and prints `code`.
pub fn transform_code(
    code: &str,
    options: &TransformOptions,
    capabilities: &Capabilities,
) -> SketchResult<String> {
    let mut program = parse(code)?;
    transform_program(&mut program, options, capabilities)?;
    Ok(generate(&program))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_without_guard(code: &str) -> String {
        let options = TransformOptions::fresh(GuardOptions::default()).without_loop_guard();
        transform_code(code, &options, &Capabilities::new(["fill", "draw"])).unwrap()
    }

    #[test]
    fn test_pass_sets_per_mode() {
        assert!(PassSet::for_mode(TransformMode::Fresh, true).contains(PassSet::LOOP_GUARD));
        assert!(!PassSet::for_mode(TransformMode::Fresh, false).contains(PassSet::LOOP_GUARD));
        assert!(!PassSet::for_mode(TransformMode::Patch, true).contains(PassSet::LOOP_GUARD));
    }

    #[test]
    fn test_capability_reference_is_rewritten() {
        assert_eq!(fresh_without_guard("fill(255);"), "__env__.fill(255);\n");
    }

    #[test]
    fn test_unknown_unresolved_name_stays_bare() {
        assert_eq!(fresh_without_guard("mystery(1);"), "mystery(1);\n");
    }

    #[test]
    fn test_patch_mode_collapses_handle_members() {
        let caps = Capabilities::new(["fill"]);
        let out = transform_code("__env__.fill(1);", &TransformOptions::patch(), &caps).unwrap();
        assert_eq!(out, "__env__.fill(1);\n");
    }

    #[test]
    fn test_handle_member_keeps_location() {
        let id = Identifier::at("x", crate::ast::Loc::new(3, 4));
        let Expression::Member(object, _) = handle_member(&id) else {
            panic!("expected a member expression");
        };
        assert_eq!(object.as_identifier().map(|h| h.loc), Some(crate::ast::Loc::new(3, 4)));
    }
}
