//! Runs transformed sketch code against an environment object.
//!
//! The executor owns the session's [`Interpreter`] and the runtime half of
//! the loop guard. Every failure, whether from transformation or execution,
//! comes back as a value; nothing is retried.

use crate::ast::Program;
use crate::errors::{SketchError, SketchResult};
use crate::guard::{Clock, LoopCallback, LoopGuard};
use crate::interpreter::{thrown_message, Effect, Fault, Interpreter, ObjectRef, Slot, Value};
use crate::parser::parse;
use crate::target::capability_names;
use crate::transforms::{
    transform_program, Capabilities, GuardOptions, TransformOptions, HANDLE, LOOP_COUNT,
    LOOP_PROTECT, LOOP_SET_TIMEOUT,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

/// Message raised by any read of `this.externals` at top level.
pub const EXTERNALS_MESSAGE: &str = "This program uses capabilities that are turned off for \
    security reasons: external images, external sounds and pop-ups are not available.";

/// Prefix of environment slots holding hoisted call arguments.
pub const HOISTED_PREFIX: &str = "__obj__";

/// One argument of a replayed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayArg {
    /// Source text of a serializable value.
    Inline(String),
    /// Name of an environment slot holding the original value.
    Hoisted(String),
}

impl ReplayArg {
    fn render(&self) -> String {
        match self {
            ReplayArg::Inline(text) => text.clone(),
            ReplayArg::Hoisted(slot) => format!("{HANDLE}.{slot}"),
        }
    }
}

/// A mutating capability call recorded during a shadow run, ready to be
/// replayed against the live environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutatingCall {
    pub name: String,
    pub args: Vec<ReplayArg>,
}

impl MutatingCall {
    pub fn new(name: impl Into<String>, args: Vec<ReplayArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// `__env__.name(args);` with hoisted temporaries read off the handle.
    pub fn render(&self) -> String {
        let args: Vec<String> = self.args.iter().map(ReplayArg::render).collect();
        format!("{HANDLE}.{}({});", self.name, args.join(", "))
    }
}

pub struct Executor {
    interp: Interpreter,
    guard: Rc<RefCell<LoopGuard>>,
    protect: ObjectRef,
    set_timeout: ObjectRef,
    enable_loop_guard: bool,
    guard_options: GuardOptions,
}

impl Executor {
    pub fn new(clock: Rc<dyn Clock>, guard_options: GuardOptions, enable_loop_guard: bool) -> Self {
        let interp = Interpreter::new();
        let guard = Rc::new(RefCell::new(LoopGuard::new(clock, guard_options.location_reporting)));

        let protect_guard = guard.clone();
        let protect = interp.new_native(LOOP_PROTECT, Effect::Pure, move |_, _, args| {
            let location = args.first().and_then(Value::as_str);
            protect_guard
                .borrow_mut()
                .protect(location)
                .map(|()| Value::Undefined)
                .map_err(Fault::Abort)
        });

        let timeout_guard = guard.clone();
        let set_timeout = interp.new_native(LOOP_SET_TIMEOUT, Effect::Pure, move |_, _, args| {
            let ms = args.first().and_then(Value::as_number).unwrap_or(0.0);
            timeout_guard.borrow_mut().set_timeout(ms.max(0.0) as u64);
            Ok(Value::Undefined)
        });

        Self {
            interp,
            guard,
            protect,
            set_timeout,
            enable_loop_guard,
            guard_options,
        }
    }

    pub fn interp(&self) -> &Interpreter {
        &self.interp
    }

    pub fn interp_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }

    pub fn guard(&self) -> &Rc<RefCell<LoopGuard>> {
        &self.guard
    }

    pub fn set_loop_callback(&self, callback: LoopCallback) {
        self.guard.borrow_mut().set_callback(callback);
    }

    pub fn guard_options(&self) -> GuardOptions {
        self.guard_options
    }

    pub fn set_guard_options(&mut self, options: GuardOptions) {
        self.guard_options = options;
        self.guard.borrow_mut().set_report_location(options.location_reporting);
    }

    pub fn loop_guard_enabled(&self) -> bool {
        self.enable_loop_guard
    }

    pub fn set_loop_guard_enabled(&mut self, enabled: bool) {
        self.enable_loop_guard = enabled;
    }

    /// Options for a fresh transform under the current guard settings.
    pub fn fresh_options(&self) -> TransformOptions {
        let options = TransformOptions::fresh(self.guard_options);
        if self.enable_loop_guard {
            options
        } else {
            options.without_loop_guard()
        }
    }

    /// Parses and fresh-transforms `code` against `env` without running it.
    pub fn check(&self, code: &str, env: &ObjectRef) -> SketchResult<()> {
        self.prepare(code, env, None).map(|_| ())
    }

    /// Transforms and runs `code` against `env`.
    ///
    /// `mutating_calls` selects patch mode; the calls are replayed ahead of
    /// the patch body. Returns the first error, if any.
    pub fn exec(
        &mut self,
        code: &str,
        env: &ObjectRef,
        mutating_calls: Option<&[MutatingCall]>,
    ) -> Option<SketchError> {
        let no_calls = mutating_calls.map_or(true, <[MutatingCall]>::is_empty);
        if code.trim().is_empty() && no_calls {
            return None;
        }

        self.install_guard(env);
        let program = match self.prepare(code, env, mutating_calls) {
            Ok(program) => program,
            Err(err) => {
                debug!(kind = err.kind(), %err, "transform failed");
                return Some(err);
            }
        };

        let this = self.interp.new_object();
        this.borrow_mut()
            .properties
            .insert("externals".to_string(), Slot::Trap(Rc::from(EXTERNALS_MESSAGE)));

        let result = self
            .interp
            .run_program(&program, env, &[(HANDLE, Value::Object(env.clone()))], Value::Object(this));
        match result {
            Ok(()) => None,
            Err(fault) => {
                let err = fault_to_error(fault);
                debug!(kind = err.kind(), %err, "run failed");
                Some(err)
            }
        }
    }

    /// Calls `env[name]()` with `env` as the receiver; a missing entry point
    /// is not an error.
    pub fn call_entry(&mut self, env: &ObjectRef, name: &str) -> Option<SketchError> {
        let callee = match self.interp.get_property(env, name) {
            Ok(callee) => callee,
            Err(fault) => return Some(fault_to_error(fault)),
        };
        if !callee.is_function() {
            return None;
        }
        self.interp
            .call(&callee, Value::Object(env.clone()), &[])
            .err()
            .map(fault_to_error)
    }

    fn install_guard(&self, env: &ObjectRef) {
        env.set_own(LOOP_PROTECT, Value::Object(self.protect.clone()));
        env.set_own(LOOP_SET_TIMEOUT, Value::Object(self.set_timeout.clone()));
        env.set_own(LOOP_COUNT, Value::Number(0.0));
    }

    fn prepare(
        &self,
        code: &str,
        env: &ObjectRef,
        mutating_calls: Option<&[MutatingCall]>,
    ) -> SketchResult<Program> {
        let capabilities = Capabilities::new(capability_names(env));
        let mut program = parse(code)?;
        let options = match mutating_calls {
            None => self.fresh_options(),
            Some(_) => TransformOptions::patch(),
        };
        transform_program(&mut program, &options, &capabilities)?;

        if let Some(calls) = mutating_calls.filter(|calls| !calls.is_empty()) {
            let replay: String = calls.iter().map(MutatingCall::render).collect::<Vec<_>>().join("\n");
            trace!(calls = calls.len(), "replaying mutating calls");
            let replay = parse(&replay)?;
            program.body.splice(0..0, replay.body);
        }
        Ok(program)
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("guard", &self.guard)
            .field("enable_loop_guard", &self.enable_loop_guard)
            .field("guard_options", &self.guard_options)
            .finish_non_exhaustive()
    }
}

pub fn fault_to_error(fault: Fault) -> SketchError {
    match fault {
        Fault::Throw(value) => SketchError::runtime(thrown_message(&value)),
        Fault::Abort(err) => SketchError::InfiniteLoop(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InfiniteLoopError;
    use crate::guard::SystemClock;

    fn executor() -> (Executor, ObjectRef) {
        let executor = Executor::new(Rc::new(SystemClock::new()), GuardOptions::default(), true);
        let env = executor.interp().new_object();
        executor.interp().install_globals(&env);
        (executor, env)
    }

    #[test]
    fn test_empty_code_is_a_no_op() {
        let (mut executor, env) = executor();
        assert!(executor.exec("  \n", &env, None).is_none());
        assert!(!env.has_own(LOOP_COUNT));
    }

    #[test]
    fn test_top_level_names_land_on_env() {
        let (mut executor, env) = executor();
        assert!(executor.exec("var x = 1 + 2; function f() { return x; }", &env, None).is_none());
        assert_eq!(env.get_own("x").and_then(|x| x.as_number()), Some(3.0));
        assert!(env.get_own("f").is_some_and(|f| f.is_function()));
    }

    #[test]
    fn test_externals_is_restricted() {
        let (mut executor, env) = executor();
        let err = executor.exec("var e = this.externals;", &env, None).unwrap();
        assert_eq!(err, SketchError::runtime(EXTERNALS_MESSAGE));
    }

    #[test]
    fn test_thrown_errors_become_runtime_errors() {
        let (mut executor, env) = executor();
        let err = executor.exec("throw new Error('nope');", &env, None).unwrap();
        assert_eq!(err.to_string(), "nope");
        let err = executor.exec("undefinedThing();", &env, None).unwrap();
        assert_eq!(err.kind(), "runtime");
    }

    #[test]
    fn test_banned_handle_is_rejected_before_running() {
        let (mut executor, env) = executor();
        let err = executor.exec("var a = 1; var __env__ = 2;", &env, None).unwrap();
        assert!(matches!(err, SketchError::BannedIdentifier { .. }));
        assert!(!env.has_own("a"));
    }

    #[test]
    fn test_guard_abort_is_not_catchable() {
        let (mut executor, env) = executor();
        executor.set_guard_options(GuardOptions {
            check_interval: 1,
            startup_budget_ms: 0,
            ..GuardOptions::default()
        });
        let err = executor
            .exec("try { while (true) {} } catch (e) { var caught = true; }", &env, None)
            .unwrap();
        assert!(matches!(
            err,
            SketchError::InfiniteLoop(InfiniteLoopError::Located { .. })
        ));
        assert!(env.get_own("caught").map_or(true, |c| c.is_undefined()));
    }

    #[test]
    fn test_mutating_calls_are_replayed_before_the_patch() {
        let (mut executor, env) = executor();
        executor.exec("var log = []; function rec(v) { log.push(v); }", &env, None);
        env.set_own("__obj__rec__1_0", Value::Object(executor.interp().new_object()));
        let calls = [
            MutatingCall::new("rec", vec![ReplayArg::Inline("1".to_string())]),
            MutatingCall::new("rec", vec![ReplayArg::Hoisted("__obj__rec__1_0".to_string())]),
        ];
        assert!(executor.exec("", &env, Some(&calls)).is_none());
        let log = env.get_own("log").and_then(|l| l.as_object().and_then(ObjectRef::array_elements));
        assert_eq!(log.map(|l| l.len()), Some(2));
    }

    #[test]
    fn test_render_resolves_hoisted_temporaries() {
        let call = MutatingCall::new(
            "image",
            vec![ReplayArg::Hoisted("__obj__image__0_0".into()), ReplayArg::Inline("10".into())],
        );
        assert_eq!(call.render(), "__env__.image(__env__.__obj__image__0_0, 10);");
    }

    #[test]
    fn test_render_leaves_string_arguments_alone() {
        let call = MutatingCall::new("text", vec![ReplayArg::Inline("\"__obj__x\"".into())]);
        assert_eq!(call.render(), "__env__.text(\"__obj__x\");");
    }

    #[test]
    fn test_check_transforms_without_running() {
        let (executor, env) = executor();
        assert!(executor.check("var a = 1;", &env).is_ok());
        assert!(!env.has_own("a"));
        assert!(matches!(
            executor.check("var __env__ = 2;", &env),
            Err(SketchError::BannedIdentifier { .. })
        ));
    }
}
