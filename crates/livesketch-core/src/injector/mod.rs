//! Live re-injection of edited sketches.
//!
//! A script without a draw loop simply reruns from scratch. Once a draw loop
//! exists, each edit is first run in a throwaway capture context (the
//! "shadow run") where mutating capabilities are replaced by recorders. The
//! resulting bindings are serialized and diffed against the previous
//! harvest, and only what changed is patched into the live environment,
//! preceded by replays of the recorded calls. Anything the diff cannot
//! express safely (changed constructors with live instances, a different
//! instance list, off-screen graphics) forces a full rerun instead.

pub mod harvest;
pub mod patch;

pub use harvest::{serialize, HarvestSnapshot, Serialized};
pub use patch::Patch;

use crate::errors::SketchResult;
use crate::executor::{fault_to_error, Executor};
use crate::interpreter::{Callable, Effect, Interpreter, ObjectRef, Value};
use crate::parser::parse;
use crate::target::{Target, IDEMPOTENT_CALLS, LIVE_RESET};
use crate::transforms::{analyze, RISK_NAMES};
use harvest::{member_base, object_extract, serialize_list};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};

const GUARD_PREFIX: &str = "KAInfiniteLoop";

type Recorded = Rc<RefCell<Vec<(String, Vec<Value>)>>>;

/// What a shadow run left behind.
struct ShadowRun {
    capture: ObjectRef,
    seeded: IndexMap<String, Value>,
    recorded: Vec<(String, Vec<Value>)>,
    constructors: FxHashSet<String>,
    instances: Option<String>,
}

#[derive(Debug)]
pub struct Injector {
    snapshot: Option<HarvestSnapshot>,
    seed: u32,
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}

impl Injector {
    pub fn new() -> Self {
        Self {
            snapshot: None,
            seed: fresh_seed(),
        }
    }

    pub fn snapshot(&self) -> Option<&HarvestSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Forgets the previous harvest so the next inject is a full run.
    pub fn restart(&mut self, target: &Target) {
        self.snapshot = None;
        self.seed = fresh_seed();
        target.set_frame_count(0.0);
        target.clear_logs();
    }

    /// Brings the live environment in line with `code`.
    ///
    /// On error the previous snapshot is kept, so the next successful
    /// inject still diffs against the last good state.
    pub fn inject(&mut self, code: &str, executor: &mut Executor, target: &Target) -> SketchResult<()> {
        let mut program = parse(code)?;
        let facts = analyze(&mut program)?;
        let globals = facts.globals;
        let env = target.env();
        // Rejected code must not reach the target.
        executor.check(code, env)?;

        let has_or_had = RISK_NAMES.iter().any(|name| {
            globals.contains(*name) || self.snapshot.as_ref().is_some_and(|s| s.has_binding(name))
        });

        let mut harvest = HarvestSnapshot {
            globals: globals.clone(),
            ..HarvestSnapshot::default()
        };
        let mut patch = Patch::new();
        let mut calls = Vec::new();
        let mut rerun = None;

        if has_or_had {
            let shadow = self.shadow_run(code, &globals, executor, target)?;
            let interp = executor.interp_mut();

            if let Some(previous) = &self.snapshot {
                if previous.instances.is_none() || previous.instances != shadow.instances {
                    rerun = Some("instances changed");
                }
            }
            if facts.creates_graphics {
                rerun = Some("script creates graphics");
            }

            calls = patch::replay_calls(interp, env, shadow.recorded);

            for name in shadow.capture.own_keys() {
                if name.starts_with(GUARD_PREFIX) {
                    continue;
                }
                let Some(value) = shadow.capture.get_own(&name) else {
                    continue;
                };
                let untouched = shadow.seeded.get(&name).is_some_and(|seeded| seeded.same_value(&value));
                if untouched && target.is_pristine_name(&name) {
                    continue;
                }

                let text = match serialize(interp, &value) {
                    Ok(text) => text,
                    Err(err) => {
                        trace!(%name, %err, "binding is opaque; extracting members");
                        object_extract(interp, env, &mut harvest.members, &name, &value, None)
                            .map_err(fault_to_error)?;
                        harvest.bindings.insert(name, Serialized::Opaque);
                        continue;
                    }
                };

                let changed = self.snapshot.as_ref().is_some_and(|previous| {
                    previous.bindings.get(&name) != Some(&Serialized::Text(text.clone()))
                });
                if changed {
                    if value.is_function() {
                        if shadow.constructors.contains(&name) {
                            rerun = Some("constructor with live instances changed");
                        }
                        patch.redefine_function(&name, &text);
                    } else {
                        merge_or_assign(env, &name, value.clone());
                    }
                }
                if value.is_function() {
                    object_extract(interp, env, &mut harvest.members, &name, &value, None)
                        .and_then(|()| {
                            object_extract(interp, env, &mut harvest.members, &name, &value, Some("prototype"))
                        })
                        .map_err(fault_to_error)?;
                }
                harvest.bindings.insert(name, Serialized::Text(text));
            }

            self.diff_members(&harvest, &mut patch);
            self.diff_vanished(&shadow.capture, target, &mut patch);
            harvest.instances = shadow.instances;
        }

        target.reset_matrix();
        target.random_seed(self.seed);
        if let Some(previous) = &self.snapshot {
            for (style, _) in LIVE_RESET {
                if previous.globals.contains(*style) && !globals.contains(*style) {
                    trace!(style, "style call removed; resetting");
                    target.reset_style(style);
                }
            }
        }

        let full_reason = if !has_or_had {
            Some("no draw loop")
        } else if !target.draw_loop_defined() {
            Some("no draw loop method defined")
        } else if self.snapshot.is_none() {
            Some("no previous run")
        } else {
            rerun
        };

        let calls_draw = globals.contains("draw");
        let result = if let Some(reason) = full_reason {
            debug!(reason, "running the whole script");
            target.clear();
            target.clear_logs();
            let mut code = code.to_string();
            if calls_draw {
                code.push_str("\ndraw();");
            }
            let result = executor.exec(&code, env, None);
            if result.is_none() {
                tag_closures(env, globals.iter());
            }
            result
        } else if !patch.is_empty() || !calls.is_empty() {
            debug!(calls = calls.len(), "patching the live environment");
            trace!(patch = patch.as_str());
            let code = patch.into_code(calls_draw);
            executor.exec(&code, env, Some(&calls))
        } else {
            debug!("nothing changed");
            None
        };

        target.ensure_draw();
        if let Some(err) = result {
            return Err(err);
        }
        if has_or_had {
            self.snapshot = Some(harvest);
        }
        Ok(())
    }

    /// Runs `code` against a capture context seeded from the live
    /// environment, with mutating capabilities replaced by recorders.
    fn shadow_run(
        &self,
        code: &str,
        globals: &IndexSet<String>,
        executor: &mut Executor,
        target: &Target,
    ) -> SketchResult<ShadowRun> {
        let recorded: Recorded = Rc::default();
        let interp = executor.interp_mut();
        let capture = interp.new_object();
        let mut seeded = IndexMap::new();

        for name in globals {
            let live = interp.get_property(target.env(), name).map_err(fault_to_error)?;
            let mutating = live
                .as_object()
                .is_some_and(|f| f.native_effect() == Some(Effect::Mutating));
            let value = if mutating && !IDEMPOTENT_CALLS.contains(&name.as_str()) {
                Value::Object(recorder(interp, name, &recorded))
            } else {
                live
            };
            capture.set_own(name, value.clone());
            seeded.insert(name.clone(), value);
        }

        interp.clear_instances();
        if let Some(err) = executor.exec(code, &capture, None) {
            debug!(kind = err.kind(), "shadow run failed");
            return Err(err);
        }

        let interp = executor.interp_mut();
        tag_closures(&capture, capture.own_keys().iter());

        let instances = interp.take_instances();
        let constructors = instances
            .iter()
            .filter_map(|instance| instance.constructor.get_own("__name"))
            .filter_map(|name| name.as_str().map(str::to_string))
            .collect();
        let objects: Vec<Value> = instances.into_iter().map(|i| Value::Object(i.object)).collect();
        let instances = serialize_list(interp, &objects).ok();

        let recorded = recorded.take();
        trace!(bindings = capture.own_keys().len(), calls = recorded.len(), "shadow run finished");
        Ok(ShadowRun {
            capture,
            seeded,
            recorded,
            constructors,
            instances,
        })
    }

    /// New or changed members, plus every member of a redefined function.
    fn diff_members(&self, harvest: &HarvestSnapshot, patch: &mut Patch) {
        let previous = self.snapshot.as_ref().map(|s| &s.members);
        for (key, source) in &harvest.members {
            let stale = previous.map_or(true, |members| members.get(key) != Some(source));
            if stale || patch.was_redefined(member_base(key)) {
                patch.assign_member(key, source);
            }
        }
        if let Some(previous) = previous {
            for key in previous.keys().filter(|key| !harvest.members.contains_key(*key)) {
                patch.delete(key);
            }
        }
    }

    /// Deletes bindings the new script no longer has. Pristine capabilities
    /// stay, except for draw-loop entry points.
    fn diff_vanished(&self, capture: &ObjectRef, target: &Target, patch: &mut Patch) {
        let Some(previous) = &self.snapshot else {
            return;
        };
        for name in previous.bindings.keys() {
            if name.starts_with(GUARD_PREFIX) || capture.has_own(name) {
                continue;
            }
            if target.is_pristine_name(name) && !RISK_NAMES.contains(&name.as_str()) {
                continue;
            }
            patch.delete(name);
            if name == "draw" {
                debug!("draw removed; clearing the surface");
                target.clear();
                target.restore_placeholder();
            }
        }
    }
}

fn fresh_seed() -> u32 {
    getrandom::u32().unwrap_or(0x9e37_79b9)
}

/// Stand-in for a mutating capability during a shadow run.
fn recorder(interp: &Interpreter, name: &str, recorded: &Recorded) -> ObjectRef {
    let recorded = recorded.clone();
    let call_name = name.to_string();
    interp.new_native(name, Effect::Mutating, move |_, _, args| {
        recorded.borrow_mut().push((call_name.clone(), args.to_vec()));
        Ok(Value::Number(0.0))
    })
}

/// Tags script functions with the binding they were found under.
fn tag_closures<'a>(object: &ObjectRef, names: impl Iterator<Item = &'a String>) {
    for name in names {
        let Some(Value::Object(function)) = object.get_own(name) else {
            continue;
        };
        if matches!(function.callable(), Some(Callable::Closure(_))) {
            function.set_own("__name", Value::string(name));
        }
    }
}

/// Copies a changed object into the live one member by member so closures
/// holding the live object see the update; anything else is replaced.
fn merge_or_assign(env: &ObjectRef, name: &str, value: Value) {
    let live = env.get_own(name);
    match (value.as_object(), live.as_ref().and_then(Value::as_object)) {
        (Some(new), Some(live)) if !new.is_array() && !live.is_array() => {
            for key in new.own_keys() {
                if let Some(member) = new.get_own(&key) {
                    live.set_own(&key, member);
                }
            }
        }
        _ => env.set_own(name, value),
    }
}
