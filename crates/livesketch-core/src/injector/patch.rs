//! Building the patch text and the call replays for the live environment.

use super::harvest::serialize;
use crate::executor::{MutatingCall, ReplayArg, HOISTED_PREFIX};
use crate::interpreter::{Interpreter, ObjectRef, Value};
use rustc_hash::FxHashSet;
use std::fmt::Write;

/// Source to run against the live environment in patch mode.
#[derive(Debug, Default)]
pub struct Patch {
    text: String,
    reinit: FxHashSet<String>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redefines a changed function and tags it with its binding name.
    pub fn redefine_function(&mut self, name: &str, source: &str) {
        let _ = writeln!(self.text, "var {name} = {source};");
        let _ = writeln!(self.text, "{name}.__name = '{name}';");
        self.reinit.insert(name.to_string());
    }

    pub fn was_redefined(&self, name: &str) -> bool {
        self.reinit.contains(name)
    }

    /// `Name['m'] = <source>;`
    pub fn assign_member(&mut self, key: &str, source: &str) {
        let _ = writeln!(self.text, "{key} = {source};");
    }

    pub fn delete(&mut self, target: &str) {
        let _ = writeln!(self.text, "delete {target};");
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The final patch text, optionally forcing a `draw()` call.
    pub fn into_code(mut self, call_draw: bool) -> String {
        if call_draw {
            self.text.push_str("\ndraw();");
        }
        self.text
    }
}

/// Turns recorded `(name, args)` pairs into replayable calls.
///
/// Objects (arrays and functions included) are parked on `env` as
/// `__obj__name__call_index` and the call refers to them by name, so the
/// replay receives the very value the shadow run passed. Anything that
/// fails to serialize is parked the same way.
pub fn replay_calls(
    interp: &mut Interpreter,
    env: &ObjectRef,
    recorded: Vec<(String, Vec<Value>)>,
) -> Vec<MutatingCall> {
    recorded
        .into_iter()
        .enumerate()
        .map(|(call, (name, args))| {
            let args = args
                .into_iter()
                .enumerate()
                .map(|(index, arg)| {
                    let inline = match &arg {
                        Value::Object(_) => None,
                        _ => serialize(interp, &arg).ok(),
                    };
                    match inline {
                        Some(text) => ReplayArg::Inline(text),
                        None => {
                            let slot = format!("{HOISTED_PREFIX}{name}__{call}_{index}");
                            env.set_own(&slot, arg);
                            ReplayArg::Hoisted(slot)
                        }
                    }
                })
                .collect();
            MutatingCall::new(name, args)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_text() {
        let mut patch = Patch::new();
        patch.redefine_function("draw", "function () {}");
        patch.assign_member("Foo.prototype['go']", "function () {}");
        patch.delete("gone");
        assert!(patch.was_redefined("draw"));
        assert!(!patch.was_redefined("Foo"));
        assert_eq!(
            patch.into_code(true),
            "var draw = function () {};\ndraw.__name = 'draw';\n\
             Foo.prototype['go'] = function () {};\ndelete gone;\n\ndraw();"
        );
    }

    #[test]
    fn test_replay_hoists_objects_and_inlines_the_rest() {
        let mut interp = Interpreter::new();
        let env = interp.new_object();
        let object = interp.new_object();
        let array = interp.new_array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let calls = replay_calls(
            &mut interp,
            &env,
            vec![(
                "image".to_string(),
                vec![Value::Object(object.clone()), Value::Number(5.0), Value::Object(array), Value::string("t")],
            )],
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            [
                ReplayArg::Hoisted("__obj__image__0_0".to_string()),
                ReplayArg::Inline("5".to_string()),
                ReplayArg::Hoisted("__obj__image__0_2".to_string()),
                ReplayArg::Inline("\"t\"".to_string()),
            ]
        );
        assert!(env
            .get_own("__obj__image__0_0")
            .and_then(|v| v.as_object().map(|o| o.ptr_eq(&object)))
            .unwrap_or(false));
    }

    #[test]
    fn test_repeated_calls_get_their_own_slots() {
        let mut interp = Interpreter::new();
        let env = interp.new_object();
        let first = interp.new_object();
        let second = interp.new_object();
        let calls = replay_calls(
            &mut interp,
            &env,
            vec![
                ("text".to_string(), vec![Value::Object(first.clone())]),
                ("text".to_string(), vec![Value::Object(second.clone())]),
            ],
        );
        assert_eq!(calls[0].args, [ReplayArg::Hoisted("__obj__text__0_0".to_string())]);
        assert_eq!(calls[1].args, [ReplayArg::Hoisted("__obj__text__1_0".to_string())]);
        let parked = |slot: &str, object: &ObjectRef| {
            env.get_own(slot)
                .and_then(|v| v.as_object().map(|o| o.ptr_eq(object)))
                .unwrap_or(false)
        };
        assert!(parked("__obj__text__0_0", &first));
        assert!(parked("__obj__text__1_0", &second));
    }
}
