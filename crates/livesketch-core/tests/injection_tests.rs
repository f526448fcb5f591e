//! Re-injection behaviour across consecutive `run_code` calls: when a live
//! sketch is patched in place and when it is rerun from scratch.

use indoc::indoc;
use livesketch_core::injector::Serialized;
use livesketch_core::interpreter::Value;
use livesketch_core::target::reset_args;
use livesketch_core::{LiveSketch, SketchError};
use livesketch_test_helpers::{run, sketch_with_clock, FakeClock};

fn sketch() -> LiveSketch {
    sketch_with_clock(FakeClock::new()).unwrap()
}

fn number(sketch: &LiveSketch, name: &str) -> Option<f64> {
    sketch.env().get_own(name).and_then(|value| value.as_number())
}

fn call_args(sketch: &LiveSketch, name: &str) -> Vec<Vec<String>> {
    sketch
        .surface()
        .calls_named(name)
        .map(|call| call.args.clone())
        .collect()
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

const BOUNCER: &str = indoc! {"
    var x = 10;
    var draw = function () {
        background(200);
        rect(x, 0, 5, 5);
    };
"};

// ============================================================================
// Programs Without A Draw Loop
// ============================================================================

#[test]
fn test_plain_script_runs_in_full_every_time() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "fill(255, 0, 0);\nrect(10, 20, 30, 40);").is_empty());
    assert!(run(&mut sketch, "fill(255, 0, 0);\nrect(10, 20, 30, 40);").is_empty());

    assert_eq!(call_args(&sketch, "rect"), vec![args(&["10", "20", "30", "40"])]);
    assert_eq!(sketch.surface().style("fill"), Some(&args(&["255", "0", "0"])[..]));
    assert!(sketch.snapshot().is_none());
}

#[test]
fn test_top_level_bindings_land_on_the_environment() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "var total = 2 + 3;\nfunction twice(n) { return n * 2; }\nvar big = twice(total);").is_empty());
    assert_eq!(number(&sketch, "total"), Some(5.0));
    assert_eq!(number(&sketch, "big"), Some(10.0));
}

// ============================================================================
// Draw Loop Patching
// ============================================================================

#[test]
fn test_first_run_calls_draw_once_and_keeps_a_snapshot() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, BOUNCER).is_empty());

    assert_eq!(call_args(&sketch, "rect"), vec![args(&["10", "0", "5", "5"])]);
    assert_eq!(sketch.surface().style("background"), Some(&args(&["200"])[..]));

    let snapshot = sketch.snapshot().expect("draw loop keeps a snapshot");
    assert_eq!(snapshot.bindings.get("x"), Some(&Serialized::Text("10".to_string())));
    assert!(snapshot.has_binding("draw"));
    assert!(!snapshot.has_binding("rect"));
}

#[test]
fn test_editing_draw_patches_without_rerunning_top_level() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, BOUNCER).is_empty());
    sketch.env().set_own("x", Value::Number(42.0));

    let edited = BOUNCER.replace("rect(x, 0, 5, 5)", "rect(x, 0, 6, 6)");
    assert!(run(&mut sketch, &edited).is_empty());

    // The log was not cleared and `x` kept its live value: only the new
    // `draw` was installed and invoked.
    assert_eq!(
        call_args(&sketch, "rect"),
        vec![args(&["10", "0", "5", "5"]), args(&["42", "0", "6", "6"])]
    );
    assert_eq!(number(&sketch, "x"), Some(42.0));
}

#[test]
fn test_editing_a_value_updates_it_in_place() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, BOUNCER).is_empty());
    assert!(run(&mut sketch, &BOUNCER.replace("var x = 10;", "var x = 20;")).is_empty());

    assert_eq!(number(&sketch, "x"), Some(20.0));
    assert_eq!(call_args(&sketch, "rect").len(), 1);

    let mut errors = Vec::new();
    sketch.frame(|err| errors.push(err));
    assert!(errors.is_empty());
    assert_eq!(number(&sketch, "frameCount"), Some(1.0));
    assert_eq!(call_args(&sketch, "rect").last(), Some(&args(&["20", "0", "5", "5"])));
}

#[test]
fn test_edited_object_is_merged_into_the_live_one() {
    let code = indoc! {"
        var ball = { x: 1, y: 2 };
        var keep = ball;
        var draw = function () {
            ellipse(ball.x, ball.y, 10, 10);
        };
    "};
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());
    assert!(run(&mut sketch, &code.replace("{ x: 1, y: 2 }", "{ x: 5, y: 2 }")).is_empty());

    let keep = sketch.env().get_own("keep").unwrap();
    let keep = keep.as_object().unwrap();
    assert_eq!(keep.get_own("x").and_then(|x| x.as_number()), Some(5.0));
}

#[test]
fn test_removed_style_call_is_reset_to_its_default() {
    let code = indoc! {"
        var draw = function () {
            rect(1, 1, 1, 1);
        };
        fill(255, 0, 0);
    "};
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());
    assert_eq!(sketch.surface().style("fill"), Some(&args(&["255", "0", "0"])[..]));

    assert!(run(&mut sketch, &code.replace("fill(255, 0, 0);\n", "")).is_empty());
    let defaults = reset_args("fill").unwrap();
    assert_eq!(sketch.surface().style("fill"), Some(&defaults[..]));
}

#[test]
fn test_deleting_draw_restores_the_placeholder() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "var draw = function () { rect(1, 1, 1, 1); };\nfill(255, 0, 0);").is_empty());
    assert!(run(&mut sketch, "fill(0, 0, 255);").is_empty());

    assert_eq!(sketch.surface().style("fill"), Some(&args(&["0", "0", "255"])[..]));
    assert!(call_args(&sketch, "rect").is_empty());
    assert!(!sketch.snapshot().unwrap().has_binding("draw"));

    let mut errors = Vec::new();
    sketch.frame(|err| errors.push(err));
    assert!(errors.is_empty());
    assert!(call_args(&sketch, "rect").is_empty());
    assert_eq!(number(&sketch, "frameCount"), Some(0.0));
}

#[test]
fn test_changed_constructor_forces_a_full_rerun() {
    let code = indoc! {"
        var Ball = function (x) {
            this.x = x;
        };
        var b = new Ball(5);
        var draw = function () {
            rect(b.x, 0, 1, 1);
        };
    "};
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());
    assert!(run(&mut sketch, &code.replace("this.x = x;", "this.x = x * 2;")).is_empty());

    let b = sketch.env().get_own("b").unwrap();
    assert_eq!(b.as_object().unwrap().get_own("x").and_then(|x| x.as_number()), Some(10.0));
    // A full run clears the log before drawing again.
    assert_eq!(call_args(&sketch, "rect"), vec![args(&["10", "0", "1", "1"])]);
}

#[test]
fn test_event_handler_alone_makes_a_draw_loop() {
    let code = "var clicks = 0;\nvar mouseClicked = function () { clicks++; };";
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());
    assert!(sketch.snapshot().is_some());

    let mut errors = Vec::new();
    sketch.dispatch("mouseClicked", |err| errors.push(err));
    sketch.dispatch("mouseClicked", |err| errors.push(err));
    sketch.dispatch("notAHandler", |err| errors.push(err));
    assert!(errors.is_empty());
    assert_eq!(number(&sketch, "clicks"), Some(2.0));
}

// ============================================================================
// Call Replays
// ============================================================================

const LABELS: &str = indoc! {"
    var x = 1;
    var draw = function () {};
    text(function () { return 'A'; }, 0, 0);
    text(function () { return 'B'; }, 0, 0);
"};

#[test]
fn test_each_replayed_call_keeps_its_own_object_argument() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, LABELS).is_empty());
    assert!(run(&mut sketch, &LABELS.replace("var x = 1;", "var x = 2;")).is_empty());

    let texts = call_args(&sketch, "text");
    assert_eq!(texts.len(), 4);
    assert!(texts[2][0].contains("\"A\""), "{texts:?}");
    assert!(texts[3][0].contains("\"B\""), "{texts:?}");
    assert_ne!(texts[2], texts[3]);
}

#[test]
fn test_array_argument_is_replayed_as_one_argument() {
    let code = "var x = 1;\nvar draw = function () {};\ntext([7, 8], 5, 5);";
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());
    assert!(run(&mut sketch, &code.replace("var x = 1;", "var x = 2;")).is_empty());

    assert_eq!(
        call_args(&sketch, "text"),
        vec![args(&["7,8", "5", "5"]), args(&["7,8", "5", "5"])]
    );
}

#[test]
fn test_string_argument_is_replayed_verbatim() {
    let code = "var x = 1;\nvar draw = function () {};\ntext(\"__obj__x\", 0, 0);";
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());
    assert!(run(&mut sketch, &code.replace("var x = 1;", "var x = 2;")).is_empty());

    assert_eq!(
        call_args(&sketch, "text"),
        vec![args(&["__obj__x", "0", "0"]), args(&["__obj__x", "0", "0"])]
    );
}

#[test]
fn test_nested_function_declaration_is_callable_before_its_line() {
    let code = indoc! {"
        function draw() {
            helper();
            function helper() {
                rect(1, 2, 3, 4);
            }
        }
    "};
    let mut sketch = sketch();
    let errors = run(&mut sketch, code);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(call_args(&sketch, "rect"), vec![args(&["1", "2", "3", "4"])]);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_banned_identifier_leaves_the_surface_alone() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "fill(1, 2, 3);\nrect(1, 2, 3, 4);").is_empty());

    let errors = run(&mut sketch, "rect(5, 5, 5, 5);\nvar __env__ = 1;");
    assert!(matches!(errors.as_slice(), [SketchError::BannedIdentifier { .. }]));
    assert_eq!(sketch.surface().style("fill"), Some(&args(&["1", "2", "3"])[..]));
    assert_eq!(call_args(&sketch, "rect"), vec![args(&["1", "2", "3", "4"])]);
}

#[test]
fn test_rejected_code_is_not_replayed_by_restart() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "var x = 1;").is_empty());
    assert_eq!(run(&mut sketch, "var x = 2;\nvar __env__ = 1;").len(), 1);
    assert_eq!(sketch.code(), "var x = 1;");

    let mut errors = Vec::new();
    futures::executor::block_on(sketch.restart(|err| errors.push(err)));
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(number(&sketch, "x"), Some(1.0));
}

#[test]
fn test_banned_identifier_leaves_the_environment_alone() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, BOUNCER).is_empty());
    let draw = sketch.env().get_own("draw").unwrap();

    let errors = run(&mut sketch, "var x = 99;\nvar __env__ = {};");
    assert!(matches!(
        errors.as_slice(),
        [SketchError::BannedIdentifier { name, .. }] if name == "__env__"
    ));
    assert_eq!(number(&sketch, "x"), Some(10.0));
    assert!(sketch.env().get_own("draw").unwrap().as_object().unwrap().ptr_eq(draw.as_object().unwrap()));
}

#[test]
fn test_failed_shadow_run_keeps_the_previous_snapshot() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, BOUNCER).is_empty());

    let errors = run(&mut sketch, "var x = 11;\nvar draw = function () {};\nnoSuchFunction();");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), "runtime");

    let snapshot = sketch.snapshot().unwrap();
    assert_eq!(snapshot.bindings.get("x"), Some(&Serialized::Text("10".to_string())));
    assert_eq!(number(&sketch, "x"), Some(10.0));
}

#[test]
fn test_parse_error_is_reported() {
    let mut sketch = sketch();
    let errors = run(&mut sketch, "var = ;");
    assert!(matches!(errors.as_slice(), [SketchError::Parse(_)]));
}
