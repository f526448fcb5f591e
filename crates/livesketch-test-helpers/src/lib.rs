//! Test fixtures for LiveSketch
//!
//! Deterministic clocks, in-memory resource loading and one-line
//! transform/sketch constructors for integration tests.

use futures::future::{self, LocalBoxFuture};
use livesketch_core::guard::Clock;
use livesketch_core::resources::LoadResult;
use livesketch_core::transforms::{transform_code, Capabilities, GuardOptions, TransformOptions};
use livesketch_core::{Asset, LiveSketch, ResourceLoadError, ResourceLoader, SketchConfig, SketchError};
use rustc_hash::FxHashSet;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;

/// Capabilities used by the transform helpers
pub const TEST_CAPABILITIES: &[&str] = &[
    "fill", "stroke", "rect", "ellipse", "background", "draw", "random", "width", "height",
    "frameCount", "println", "text",
];

/// Virtual millisecond clock
///
/// Time only moves when the test calls [`FakeClock::advance`].
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Cell<u64>,
    hidden: Cell<bool>,
}

impl FakeClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Simulates the host being backgrounded (`false`) or visible (`true`).
    pub fn set_accounting(&self, accounting: bool) {
        self.hidden.set(!accounting);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> u64 {
        self.now.get()
    }

    fn is_accounting(&self) -> bool {
        !self.hidden.get()
    }
}

/// Clock that moves forward by a fixed step on every read
///
/// Makes loop-guard overruns deterministic without sleeping.
#[derive(Debug)]
pub struct SteppingClock {
    now: Cell<u64>,
    step: u64,
}

impl SteppingClock {
    pub fn new(step: u64) -> Rc<Self> {
        Rc::new(Self {
            now: Cell::new(0),
            step,
        })
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> u64 {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

/// Resource loader that succeeds for everything except the names it was
/// told to fail, and remembers what was requested
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    failing: Rc<RefCell<FxHashSet<String>>>,
    requested: Rc<RefCell<Vec<String>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, filename: &str) {
        self.failing.borrow_mut().insert(filename.to_string());
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl ResourceLoader for MemoryLoader {
    fn load<'a>(&'a self, filename: &'a str) -> LocalBoxFuture<'a, LoadResult> {
        self.requested.borrow_mut().push(filename.to_string());
        let result = if self.failing.borrow().contains(filename) {
            Err(ResourceLoadError {
                filename: filename.to_string(),
                reason: "configured to fail".to_string(),
            })
        } else {
            Ok(Asset {
                width: 64,
                height: 64,
            })
        };
        Box::pin(future::ready(result))
    }
}

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per process
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A sketch on the given clock with default config and an in-memory loader
pub fn sketch_with_clock(clock: Rc<dyn Clock>) -> anyhow::Result<LiveSketch> {
    sketch_with(clock, SketchConfig::default(), MemoryLoader::new())
}

pub fn sketch_with(
    clock: Rc<dyn Clock>,
    config: SketchConfig,
    loader: MemoryLoader,
) -> anyhow::Result<LiveSketch> {
    init_tracing();
    let sketch = LiveSketch::builder()
        .config(config)
        .clock(clock)
        .loader(loader)
        .build()?;
    Ok(sketch)
}

/// Runs `code` to completion and collects every reported error
pub fn run(sketch: &mut LiveSketch, code: &str) -> Vec<SketchError> {
    let mut errors = Vec::new();
    futures::executor::block_on(sketch.run_code(code, |err| errors.push(err)));
    errors
}

/// Fresh transform without loop guards against [`TEST_CAPABILITIES`]
pub fn transform_fresh(code: &str) -> Result<String, SketchError> {
    let options = TransformOptions::fresh(GuardOptions::default()).without_loop_guard();
    transform_code(code, &options, &Capabilities::new(TEST_CAPABILITIES.iter().copied()))
}

/// Fresh transform with loop guards
pub fn transform_guarded(code: &str, options: GuardOptions) -> Result<String, SketchError> {
    transform_code(
        code,
        &TransformOptions::fresh(options),
        &Capabilities::new(TEST_CAPABILITIES.iter().copied()),
    )
}

/// Patch-mode transform against [`TEST_CAPABILITIES`]
pub fn transform_patch(code: &str) -> Result<String, SketchError> {
    transform_code(
        code,
        &TransformOptions::patch(),
        &Capabilities::new(TEST_CAPABILITIES.iter().copied()),
    )
}
