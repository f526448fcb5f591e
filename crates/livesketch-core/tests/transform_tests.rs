//! Source-level behaviour of the fresh and patch transforms: which names are
//! routed through the handle, which stay local, which are refused, and where
//! loop checkpoints land.

use indoc::indoc;
use livesketch_core::transforms::GuardOptions;
use livesketch_core::SketchError;
use livesketch_test_helpers::{transform_fresh, transform_guarded, transform_patch};
use proptest::prelude::*;

// ============================================================================
// Global Rewriting
// ============================================================================

#[test]
fn test_capability_call_goes_through_handle() {
    assert_eq!(transform_fresh("fill(255);").unwrap(), "__env__.fill(255);\n");
}

#[test]
fn test_top_level_var_becomes_handle_assignment() {
    assert_eq!(transform_fresh("var x = 5;").unwrap(), "__env__.x = 5;\n");
}

#[test]
fn test_uninitialized_global_var_is_dropped() {
    assert_eq!(transform_fresh("var x;").unwrap(), "");
}

#[test]
fn test_function_declaration_is_hoisted_onto_handle() {
    let out = transform_fresh(indoc! {"
        var x = 1;
        function f() {
            return x;
        }
    "})
    .unwrap();
    insta::assert_snapshot!(out, @r###"
    __env__.x = 1;
    __env__.f = function () {
        return __env__.x;
    };
    "###);
}

#[test]
fn test_locals_shadow_globals_and_capabilities() {
    let out = transform_fresh(indoc! {"
        var fill = 3;
        var g = function (rect) {
            var stroke = 1;
            rect(stroke, fill);
        };
    "})
    .unwrap();
    assert!(out.contains("__env__.fill = 3;"));
    assert!(out.contains("__env__.g = function (rect) {"));
    assert!(out.contains("var stroke = 1;"));
    assert!(out.contains("rect(stroke, __env__.fill);"));
    assert!(!out.contains("__env__.rect"));
    assert!(!out.contains("__env__.stroke"));
}

#[test]
fn test_catch_parameter_is_local() {
    let out = transform_fresh("try { fill(1); } catch (text) { text.length; }").unwrap();
    assert!(out.contains("__env__.fill(1);"));
    assert!(out.contains("text.length;"));
    assert!(!out.contains("__env__.text"));
}

#[test]
fn test_unknown_free_names_stay_bare() {
    assert_eq!(transform_fresh("mystery(1);").unwrap(), "mystery(1);\n");
    assert_eq!(transform_fresh("undefined;").unwrap(), "undefined;\n");
}

#[test]
fn test_for_loop_global_counter() {
    let out = transform_fresh("for (var i = 0; i < 3; i++) { rect(i, i, 1, 1); }").unwrap();
    assert!(out.starts_with("for (__env__.i = 0; __env__.i < 3; __env__.i++) {"));
    assert!(out.contains("__env__.rect(__env__.i, __env__.i, 1, 1);"));
}

#[test]
fn test_property_names_are_not_rewritten() {
    let out = transform_fresh("var o = { fill: 1 }; o.fill = 2;").unwrap();
    assert!(out.contains("__env__.o = { fill: 1 };"));
    assert!(out.contains("__env__.o.fill = 2;"));
}

#[test]
fn test_multi_declarator_global_var_becomes_one_assignment_each() {
    assert_eq!(
        transform_fresh("var x = 5, y = 10;").unwrap(),
        "__env__.x = 5;\n__env__.y = 10;\n"
    );
    assert_eq!(transform_fresh("var x, y = 2;").unwrap(), "__env__.y = 2;\n");
}

#[test]
fn test_for_init_with_several_globals_becomes_a_sequence() {
    let out = transform_fresh("for (var i = 0, j = 4; i < j; i++) { rect(i, j, 1, 1); }").unwrap();
    assert!(out.starts_with("for (__env__.i = 0, __env__.j = 4; __env__.i < __env__.j; __env__.i++) {"));
}

#[test]
fn test_for_in_global_target_goes_through_handle() {
    let out = transform_fresh("var o = { a: 1 };\nfor (var k in o) { text(k, 0, 0); }").unwrap();
    assert!(out.contains("for (__env__.k in __env__.o) {"));
    assert!(out.contains("__env__.text(__env__.k, 0, 0);"));
}

#[test]
fn test_for_in_local_target_stays_declared() {
    let out = transform_fresh("var f = function (o) { for (var k in o) { text(k, 0, 0); } };").unwrap();
    assert!(out.contains("for (var k in o) {"));
    assert!(!out.contains("__env__.k"));
}

#[test]
fn test_local_declaration_with_risk_name_is_split() {
    let out = transform_fresh(indoc! {"
        var setup = function () {
            var a = 1, mouseClicked = function () { return a; };
        };
    "})
    .unwrap();
    assert!(out.contains("    var a = 1;\n"));
    assert!(out.contains("    var mouseClicked = function () {"));
    assert!(!out.contains(", mouseClicked"));
    assert!(!out.contains("__env__.mouseClicked"));
}

#[test]
fn test_local_declaration_without_risk_name_is_kept_together() {
    let out = transform_fresh("var setup = function () { var a = 1, b = 2; return a + b; };").unwrap();
    assert!(out.contains("var a = 1, b = 2;"));
}

#[test]
fn test_function_declaration_in_a_function_body_stays_hoistable() {
    let out = transform_fresh(indoc! {"
        function draw() {
            helper();
            function helper() {
                fill(1);
            }
        }
    "})
    .unwrap();
    assert!(out.starts_with("__env__.draw = function () {"));
    assert!(out.contains("    helper();\n"));
    assert!(out.contains("    function helper() {\n"));
    assert!(out.contains("__env__.fill(1);"));
    assert!(!out.contains("var helper"));
    assert!(!out.contains("__env__.helper"));
}

// ============================================================================
// Banned Identifiers
// ============================================================================

#[test]
fn test_handle_name_is_banned() {
    let err = transform_fresh("var __env__ = 1;").unwrap_err();
    assert_eq!(
        err,
        SketchError::BannedIdentifier {
            name: "__env__".to_string(),
            line: 0
        }
    );
}

#[test]
fn test_guard_names_are_banned_in_fresh_code() {
    let err = transform_fresh("fill(1);\nKAInfiniteLoopCount = 0;").unwrap_err();
    assert_eq!(
        err,
        SketchError::BannedIdentifier {
            name: "KAInfiniteLoopCount".to_string(),
            line: 1
        }
    );
    assert!(matches!(
        transform_fresh("var f = function (KAInfiniteLoopProtect) {};"),
        Err(SketchError::BannedIdentifier { .. })
    ));
}

#[test]
fn test_patch_mode_accepts_guard_names() {
    let out = transform_patch("KAInfiniteLoopCount = 0;").unwrap();
    assert_eq!(out, "__env__.KAInfiniteLoopCount = 0;\n");
}

#[test]
fn test_patch_mode_is_idempotent_on_rewritten_code() {
    let once = transform_fresh("fill(255); text(\"hi\", width, height);").unwrap();
    let twice = transform_patch(&once).unwrap();
    assert_eq!(once, twice);
}

// ============================================================================
// Loop Guard Injection
// ============================================================================

fn quiet_guard(check_interval: u32) -> GuardOptions {
    GuardOptions {
        check_interval,
        location_reporting: false,
        ..GuardOptions::default()
    }
}

#[test]
fn test_program_is_bracketed_by_budget_switches() {
    let out = transform_guarded("fill(1);", quiet_guard(10)).unwrap();
    assert!(out.starts_with("__env__.KAInfiniteLoopSetTimeout(2000);\n"));
    assert!(out.ends_with("__env__.KAInfiniteLoopSetTimeout(500);\n"));
}

#[test]
fn test_while_body_gets_a_checkpoint() {
    let out = transform_guarded("var x = 3; while (x > 0) { x--; }", quiet_guard(10)).unwrap();
    assert!(out.contains(indoc! {"
        while (__env__.x > 0) {
            __env__.KAInfiniteLoopCount++;
            if (__env__.KAInfiniteLoopCount > 10) {
                __env__.KAInfiniteLoopProtect();
                __env__.KAInfiniteLoopCount = 0;
            }
            __env__.x--;
        }
    "}));
}

#[test]
fn test_single_statement_loop_body_is_wrapped() {
    let out = transform_guarded("for (;;) fill(1);", quiet_guard(5)).unwrap();
    assert!(out.contains("for (;;) {\n"));
    assert!(out.contains("    __env__.fill(1);\n"));
}

#[test]
fn test_functions_are_guarded_too() {
    let out = transform_guarded("var f = function () { return 1; };", quiet_guard(7)).unwrap();
    assert!(out.contains("if (__env__.KAInfiniteLoopCount > 7) {"));
    assert_eq!(out.matches("KAInfiniteLoopProtect").count(), 1);
}

#[test]
fn test_location_reporting_embeds_the_risk_site() {
    let options = GuardOptions {
        check_interval: 1,
        location_reporting: true,
        ..GuardOptions::default()
    };
    let out = transform_guarded("fill(1);\ndo { fill(2); } while (false);", options).unwrap();
    assert!(out.contains("DoWhileStatement"));
    assert!(out.contains("\\\"line\\\":2"));
}

#[test]
fn test_guarded_output_passes_the_patch_transform() {
    let guarded = transform_guarded("while (true) {}", quiet_guard(10)).unwrap();
    assert!(transform_patch(&guarded).is_ok());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_top_level_var_always_targets_handle(name in "v_[a-z0-9]{0,8}", value in 0u32..100_000) {
        let out = transform_fresh(&format!("var {name} = {value};")).unwrap();
        prop_assert_eq!(out, format!("__env__.{name} = {value};\n"));
    }

    #[test]
    fn prop_nested_functions_resolve_each_level(depth in 1usize..12) {
        let mut code = String::from("fill(0);");
        for level in 0..depth {
            code = format!("var f{level} = function (a{level}) {{ {code} return a{level}; }};");
        }
        let out = transform_fresh(&code).unwrap();
        prop_assert_eq!(out.matches("__env__.fill(0);").count(), 1);
        let outer_prefix = format!("__env__.f{} = function", depth - 1);
        prop_assert!(out.starts_with(&outer_prefix));
        let inner_param = format!("__env__.a{}", depth - 1);
        prop_assert!(!out.contains(&inner_param));
    }

    #[test]
    fn prop_function_parameters_are_never_rewritten(name in "p_[a-z]{1,6}") {
        let out = transform_fresh(&format!("var f = function ({name}) {{ return {name}; }};")).unwrap();
        let expected = format!("return {name};");
        prop_assert!(out.contains(&expected));
        let handle = format!("__env__.{name}");
        prop_assert!(!out.contains(&handle));
    }
}
