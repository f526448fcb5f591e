//! Host-facing behaviour of a sketch session: resources, restarts, resizing,
//! the loop budget and configuration files.

use futures::executor::block_on;
use indoc::indoc;
use livesketch_core::{InfiniteLoopError, LiveSketch, SketchConfig, SketchError};
use livesketch_test_helpers::{
    run, sketch_with, sketch_with_clock, FakeClock, MemoryLoader, SteppingClock,
};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

fn sketch() -> LiveSketch {
    sketch_with_clock(FakeClock::new()).unwrap()
}

fn number(sketch: &LiveSketch, name: &str) -> Option<f64> {
    sketch.env().get_own(name).and_then(|value| value.as_number())
}

// ============================================================================
// Resources
// ============================================================================

#[test]
fn test_catalog_images_are_loaded_before_the_run() {
    let loader = MemoryLoader::new();
    let mut sketch = sketch_with(FakeClock::new(), SketchConfig::default(), loader.clone()).unwrap();

    let errors = run(&mut sketch, "var img = getImage(\"cute/Blank\");\nvar w = img.width;");
    assert!(errors.is_empty(), "{errors:?}");
    assert!(loader.requested().contains(&"cute/Blank.png".to_string()));
    assert_eq!(number(&sketch, "w"), Some(64.0));
}

#[test]
fn test_failed_load_surfaces_only_when_the_image_is_used() {
    let loader = MemoryLoader::new();
    loader.fail("cute/Blank.png");
    let mut sketch = sketch_with(FakeClock::new(), SketchConfig::default(), loader).unwrap();

    assert!(run(&mut sketch, "var name = \"cute/Blank\";").is_empty());
    let errors = run(&mut sketch, "var img = getImage(\"cute/Blank\");");
    assert_eq!(errors, vec![SketchError::runtime("Image cute/Blank was not found.")]);
}

#[test]
fn test_loaded_resources_are_not_requested_again() {
    let loader = MemoryLoader::new();
    let mut sketch = sketch_with(FakeClock::new(), SketchConfig::default(), loader.clone()).unwrap();
    let code = "var img = getImage(\"cute/Blank\");";
    assert!(run(&mut sketch, code).is_empty());
    assert!(run(&mut sketch, code).is_empty());
    assert_eq!(loader.requested(), vec!["cute/Blank.png".to_string()]);
}

#[test]
fn test_play_sound_records_the_source() {
    let mut sketch = sketch();
    let errors = run(&mut sketch, "playSound(getSound(\"retro/coin\"));");
    assert!(errors.is_empty(), "{errors:?}");
    let played: Vec<_> = sketch.surface().calls_named("playSound").map(|c| c.args.clone()).collect();
    assert_eq!(played, vec![vec!["retro/coin.mp3".to_string()]]);

    let errors = run(&mut sketch, "playSound({});");
    assert_eq!(errors, vec![SketchError::runtime("No sound file provided.")]);
}

// ============================================================================
// Sandbox Surface
// ============================================================================

#[test]
fn test_reading_externals_is_an_error() {
    let mut sketch = sketch();
    let errors = run(&mut sketch, "var e = this.externals;");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("turned off for security reasons"));
}

#[test]
fn test_transform_code_uses_the_live_capabilities() {
    let sketch = sketch();
    let out = sketch.transform_code("ellipse(mouseX, mouseY, 5, 5);").unwrap();
    assert!(out.contains("__env__.ellipse(__env__.mouseX, __env__.mouseY, 5, 5);"));
    assert!(out.contains("KAInfiniteLoopSetTimeout"));
}

#[test]
fn test_program_restart_reruns_from_pristine() {
    let code = indoc! {"
        var draw = function () {
            if (frameCount === 2) {
                Program.restart();
            }
        };
    "};
    let mut sketch = sketch();
    assert!(run(&mut sketch, code).is_empty());

    let mut errors = Vec::new();
    sketch.frame(|err| errors.push(err));
    assert_eq!(number(&sketch, "frameCount"), Some(1.0));
    sketch.frame(|err| errors.push(err));
    assert!(errors.is_empty());
    assert_eq!(number(&sketch, "frameCount"), Some(0.0));
}

#[test]
fn test_restart_drops_names_added_by_the_script() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "var extra = 1;").is_empty());
    sketch.env().set_own("stale", livesketch_core::interpreter::Value::Bool(true));

    let mut errors = Vec::new();
    block_on(sketch.restart(|err| errors.push(err)));
    assert!(errors.is_empty());
    assert!(!sketch.env().has_own("stale"));
    assert_eq!(number(&sketch, "extra"), Some(1.0));
}

#[test]
fn test_set_size_resizes_and_restarts() {
    let mut sketch = sketch();
    assert!(run(&mut sketch, "var area = width * height;").is_empty());

    let mut errors = Vec::new();
    block_on(sketch.set_size(200, 100, |err| errors.push(err)));
    assert!(errors.is_empty());
    assert_eq!(sketch.surface().width(), 200);
    assert_eq!(number(&sketch, "height"), Some(100.0));
    assert_eq!(number(&sketch, "area"), Some(20_000.0));
}

// ============================================================================
// Loop Budget
// ============================================================================

fn tight_config() -> SketchConfig {
    SketchConfig {
        loop_check_interval: 1,
        ..SketchConfig::default()
    }
}

#[test]
fn test_runaway_loop_is_reported_with_its_location() {
    let mut sketch = sketch_with(SteppingClock::new(1000), tight_config(), MemoryLoader::new()).unwrap();
    let errors = run(&mut sketch, "var i = 0;\nwhile (true) { i++; }");
    match errors.as_slice() {
        [SketchError::InfiniteLoop(InfiniteLoopError::Located { node_kind, row })] => {
            assert_eq!(node_kind, "WhileStatement");
            assert_eq!(*row, 1);
        }
        other => panic!("expected a located loop error, got {other:?}"),
    }

    // The session stays usable.
    assert!(run(&mut sketch, "rect(1, 2, 3, 4);").is_empty());
}

#[test]
fn test_top_level_gets_the_startup_budget_and_frames_the_steady_one() {
    let config = SketchConfig {
        loop_check_interval: 1,
        startup_budget_ms: 10_000,
        steady_budget_ms: 500,
        ..SketchConfig::default()
    };
    let mut sketch = sketch_with(SteppingClock::new(100), config, MemoryLoader::new()).unwrap();
    let code = indoc! {"
        var spin = function (n) {
            for (var i = 0; i < n; i++) {}
        };
        spin(20);
        var draw = function () {
            spin(20);
        };
    "};
    let errors = run(&mut sketch, code);
    assert!(errors.is_empty(), "{errors:?}");

    let mut errors = Vec::new();
    sketch.frame(|err| errors.push(err));
    assert!(matches!(errors.as_slice(), [SketchError::InfiniteLoop(_)]), "{errors:?}");
}

#[test]
fn test_runaway_loop_notifies_the_callback() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let mut sketch = LiveSketch::builder()
        .config(SketchConfig {
            location_reporting: false,
            ..tight_config()
        })
        .clock(SteppingClock::new(1000))
        .loader(MemoryLoader::new())
        .on_infinite_loop(Box::new(move |err: &InfiniteLoopError| sink.borrow_mut().push(err.clone())))
        .build()
        .unwrap();

    let errors = run(&mut sketch, "for (;;) {}");
    assert_eq!(errors, vec![SketchError::InfiniteLoop(InfiniteLoopError::Unlocated)]);
    assert_eq!(*seen.borrow(), vec![InfiniteLoopError::Unlocated]);
}

#[test]
fn test_try_catch_cannot_swallow_the_guard() {
    let mut sketch = sketch_with(SteppingClock::new(1000), tight_config(), MemoryLoader::new()).unwrap();
    let errors = run(&mut sketch, "var caught = false;\ntry { while (true) {} } catch (e) { caught = true; }");
    assert!(matches!(errors.as_slice(), [SketchError::InfiniteLoop(_)]));
    assert_eq!(sketch.env().get_own("caught").map(|c| c.truthy()), Some(false));
}

#[test]
fn test_disabled_guard_injects_nothing() {
    let mut sketch = sketch();
    sketch.set_loop_guard_enabled(false);
    assert!(!sketch.config().enable_loop_guard);
    let out = sketch.transform_code("while (false) {}").unwrap();
    assert!(!out.contains("KAInfiniteLoop"));
}

#[test]
fn test_guard_options_follow_the_config() {
    let mut sketch = sketch();
    let mut options = sketch.guard_options();
    options.check_interval = 3;
    sketch.set_guard_options(options);
    assert_eq!(sketch.config().loop_check_interval, 3);
    let out = sketch.transform_code("while (false) {}").unwrap();
    assert!(out.contains("KAInfiniteLoopCount > 3"));
}

// ============================================================================
// Configuration Files
// ============================================================================

#[test]
fn test_config_from_yaml_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "width: 640\nheight: 480\nsteady_budget_ms: 250").unwrap();

    let config = SketchConfig::from_path(file.path()).unwrap();
    assert_eq!((config.width, config.height), (640, 480));
    assert_eq!(config.steady_budget_ms, 250);
    assert!(config.enable_loop_guard);

    let sketch = LiveSketch::new(config).unwrap();
    assert_eq!(sketch.surface().width(), 640);
}

#[test]
fn test_config_from_json_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"enable_loop_guard": false, "loop_check_interval": 50}}"#).unwrap();

    let config = SketchConfig::from_path(file.path()).unwrap();
    assert!(!config.enable_loop_guard);
    assert_eq!(config.loop_check_interval, 50);
}

#[test]
fn test_invalid_config_names_the_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "width: [not, a, number]").unwrap();

    let err = SketchConfig::from_path(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("invalid YAML"));
}
