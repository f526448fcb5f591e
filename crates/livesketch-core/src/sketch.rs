//! The host-facing session object.

use crate::config::SketchConfig;
use crate::errors::{SketchError, SketchResult};
use crate::executor::{fault_to_error, Executor};
use crate::guard::{Clock, LoopCallback, SystemClock};
use crate::injector::{HarvestSnapshot, Injector};
use crate::interpreter::ObjectRef;
use crate::resources::{self, find_resources_in, CatalogLoader, ResourceCache, ResourceLoader};
use crate::target::{self, capability_names, Surface, Target};
use crate::transforms::{self, Capabilities, GuardOptions, RISK_NAMES};
use std::cell::{Ref, RefCell};
use std::rc::Rc;
use tracing::debug;

pub struct LiveSketchBuilder {
    config: SketchConfig,
    clock: Option<Rc<dyn Clock>>,
    loader: Option<Box<dyn ResourceLoader>>,
    on_infinite_loop: Option<LoopCallback>,
}

impl LiveSketchBuilder {
    pub fn config(mut self, config: SketchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn loader(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Called with every loop-guard overrun, before the run is aborted.
    pub fn on_infinite_loop(mut self, callback: LoopCallback) -> Self {
        self.on_infinite_loop = Some(callback);
        self
    }

    pub fn build(self) -> SketchResult<LiveSketch> {
        let clock = self.clock.unwrap_or_else(|| Rc::new(SystemClock::new()));
        let mut executor = Executor::new(clock, self.config.guard_options(), self.config.enable_loop_guard);
        if let Some(callback) = self.on_infinite_loop {
            executor.set_loop_callback(callback);
        }

        let mut target = Target::new(executor.interp(), self.config.width, self.config.height);
        let cache = Rc::new(RefCell::new(ResourceCache::new()));
        resources::install(executor.interp(), target.env(), cache.clone(), target.surface_ref());
        target::prepare(executor.interp_mut(), &target).map_err(fault_to_error)?;
        target.snapshot_pristine();

        Ok(LiveSketch {
            config: self.config,
            executor,
            injector: Injector::new(),
            target,
            cache,
            loader: self.loader.unwrap_or_else(|| Box::new(CatalogLoader)),
            code: String::new(),
        })
    }
}

/// A running sketch: the drawing target, its environment and the code that
/// was last injected into it.
///
/// Everything is single-threaded. Only [`run_code`](Self::run_code),
/// [`restart`](Self::restart) and [`set_size`](Self::set_size) suspend, while
/// resources load.
pub struct LiveSketch {
    config: SketchConfig,
    executor: Executor,
    injector: Injector,
    target: Target,
    cache: Rc<RefCell<ResourceCache>>,
    loader: Box<dyn ResourceLoader>,
    code: String,
}

impl LiveSketch {
    pub fn builder() -> LiveSketchBuilder {
        LiveSketchBuilder {
            config: SketchConfig::default(),
            clock: None,
            loader: None,
            on_infinite_loop: None,
        }
    }

    pub fn new(config: SketchConfig) -> SketchResult<Self> {
        Self::builder().config(config).build()
    }

    /// Stores `code` and brings the running sketch in line with it,
    /// patching the live environment when a draw loop allows it.
    ///
    /// Code that fails to parse or transform is reported and not stored, so
    /// a later restart replays the last accepted code.
    pub async fn run_code(&mut self, code: &str, mut on_error: impl FnMut(SketchError)) {
        if let Err(err) = self.executor.check(code, self.target.env()) {
            debug!(kind = err.kind(), %err, "code rejected");
            on_error(err);
            return;
        }
        self.code = code.to_string();
        self.load_and_inject(&mut on_error).await;
    }

    /// Resets the environment, then loads and injects the stored code from
    /// scratch.
    pub async fn restart(&mut self, mut on_error: impl FnMut(SketchError)) {
        self.target.reset_to_pristine();
        self.injector.restart(&self.target);
        self.load_and_inject(&mut on_error).await;
    }

    pub async fn set_size(&mut self, width: u32, height: u32, on_error: impl FnMut(SketchError)) {
        if (width, height) == (self.config.width, self.config.height) {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.target.resize(width, height);
        self.restart(on_error).await;
    }

    /// One tick of the draw loop under the steady budget.
    pub fn frame(&mut self, mut on_error: impl FnMut(SketchError)) {
        if !self.user_defined("draw") {
            return;
        }
        self.target.set_frame_count(self.target.frame_count() + 1.0);
        self.run_entry("draw", &mut on_error);
        self.honour_restart_request(&mut on_error);
    }

    /// Invokes an event handler such as `mouseClicked`, if the script
    /// defines it.
    pub fn dispatch(&mut self, handler: &str, mut on_error: impl FnMut(SketchError)) {
        if handler == "draw" || !RISK_NAMES.contains(&handler) || !self.user_defined(handler) {
            return;
        }
        self.run_entry(handler, &mut on_error);
        self.honour_restart_request(&mut on_error);
    }

    /// Host idle tick; ends the guard's current synchronous branch.
    pub fn idle(&self) {
        self.executor.guard().borrow_mut().idle();
    }

    /// The code a fresh run of `code` would execute.
    pub fn transform_code(&self, code: &str) -> SketchResult<String> {
        let capabilities = Capabilities::new(capability_names(self.target.env()));
        transforms::transform_code(code, &self.executor.fresh_options(), &capabilities)
    }

    pub fn env(&self) -> &ObjectRef {
        self.target.env()
    }

    pub fn surface(&self) -> Ref<'_, Surface> {
        self.target.surface()
    }

    pub fn snapshot(&self) -> Option<&HarvestSnapshot> {
        self.injector.snapshot()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    pub fn guard_options(&self) -> GuardOptions {
        self.executor.guard_options()
    }

    pub fn set_guard_options(&mut self, options: GuardOptions) {
        self.config.loop_check_interval = options.check_interval;
        self.config.location_reporting = options.location_reporting;
        self.config.startup_budget_ms = options.startup_budget_ms;
        self.config.steady_budget_ms = options.steady_budget_ms;
        self.executor.set_guard_options(options);
    }

    pub fn loop_guard_enabled(&self) -> bool {
        self.executor.loop_guard_enabled()
    }

    pub fn set_loop_guard_enabled(&mut self, enabled: bool) {
        self.config.enable_loop_guard = enabled;
        self.executor.set_loop_guard_enabled(enabled);
    }

    async fn load_and_inject(&mut self, on_error: &mut dyn FnMut(SketchError)) {
        match find_resources_in(&self.code) {
            Ok(found) => ResourceCache::cache_resources(&self.cache, self.loader.as_ref(), &found).await,
            Err(err) => {
                on_error(err);
                return;
            }
        }
        self.inject(on_error);
        self.honour_restart_request(on_error);
    }

    fn inject(&mut self, on_error: &mut dyn FnMut(SketchError)) {
        if let Err(err) = self.injector.inject(&self.code, &mut self.executor, &self.target) {
            debug!(kind = err.kind(), %err, "inject failed");
            on_error(err);
        }
    }

    fn run_entry(&mut self, name: &str, on_error: &mut dyn FnMut(SketchError)) {
        self.executor
            .guard()
            .borrow_mut()
            .set_timeout(self.config.steady_budget_ms);
        if let Some(err) = self.executor.call_entry(self.target.env(), name) {
            debug!(entry = name, kind = err.kind(), %err, "entry point failed");
            on_error(err);
        }
    }

    /// Reruns once if the script called `Program.restart()`. A request made
    /// during that rerun is dropped.
    fn honour_restart_request(&mut self, on_error: &mut dyn FnMut(SketchError)) {
        if !self.target.take_restart_request() {
            return;
        }
        debug!("Program.restart() requested");
        self.target.reset_to_pristine();
        self.injector.restart(&self.target);
        self.inject(on_error);
        self.target.take_restart_request();
    }

    fn user_defined(&self, name: &str) -> bool {
        self.target
            .env()
            .get_own(name)
            .is_some_and(|value| value.is_function() && !self.target.is_placeholder(&value))
    }
}

impl std::fmt::Debug for LiveSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSketch")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("injector", &self.injector)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}
