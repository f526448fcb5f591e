//! Processing-style drawing target.
//!
//! The environment object carries every capability a sketch can reach:
//! drawing primitives, style setters, transforms, math helpers and the
//! entry-point slots. Natives that change host state are tagged
//! [`Effect::Mutating`] and append to the shared [`Surface`]; everything else
//! is [`Effect::Pure`].

use crate::codegen::format_number;
use crate::interpreter::{to_display, to_int32, to_number, Effect, Fault, Interpreter, ObjectRef, Value};
use crate::transforms::RISK_NAMES;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use tracing::trace;

/// One argument of a live-reset default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResetArg {
    Number(f64),
    Text(&'static str),
}

impl ResetArg {
    fn to_value(self) -> Value {
        match self {
            ResetArg::Number(n) => Value::Number(n),
            ResetArg::Text(s) => Value::string(s),
        }
    }
}

use ResetArg::{Number as N, Text as T};

/// Style calls restored when a script stops making them.
pub const LIVE_RESET: &[(&str, &[ResetArg])] = &[
    ("background", &[N(255.0), N(255.0), N(255.0)]),
    ("colorMode", &[N(1.0)]),
    ("ellipseMode", &[N(3.0)]),
    ("fill", &[N(255.0), N(255.0), N(255.0)]),
    ("frameRate", &[N(60.0)]),
    ("imageMode", &[N(0.0)]),
    ("rectMode", &[N(0.0)]),
    ("stroke", &[N(0.0), N(0.0), N(0.0)]),
    ("strokeCap", &[T("round")]),
    ("strokeWeight", &[N(1.0)]),
    ("textAlign", &[N(37.0), N(0.0)]),
    ("textAscent", &[N(9.0)]),
    ("textDescent", &[N(12.0)]),
    ("textFont", &[T("Arial"), N(12.0)]),
    ("textLeading", &[N(14.0)]),
    ("textSize", &[N(12.0)]),
];

/// Calls that are safe to repeat during a shadow run even though they are
/// not pure.
pub const IDEMPOTENT_CALLS: &[&str] = &["createFont"];

const SHAPES: &[&str] = &[
    "rect", "ellipse", "line", "point", "triangle", "quad", "arc", "bezier", "curve", "text",
    "image", "beginShape", "vertex", "endShape", "noFill", "noStroke", "smooth", "noSmooth",
    "println", "print", "debug", "loop", "noLoop",
];

const CONSTANTS: &[(&str, f64)] = &[
    ("PI", std::f64::consts::PI),
    ("TWO_PI", std::f64::consts::TAU),
    ("HALF_PI", std::f64::consts::FRAC_PI_2),
    ("QUARTER_PI", std::f64::consts::FRAC_PI_4),
    ("CORNER", 0.0),
    ("CORNERS", 1.0),
    ("RADIUS", 2.0),
    ("CENTER", 3.0),
    ("RGB", 1.0),
    ("HSB", 3.0),
    ("LEFT", 37.0),
    ("UP", 38.0),
    ("RIGHT", 39.0),
    ("DOWN", 40.0),
    ("BASELINE", 0.0),
    ("TOP", 101.0),
    ("BOTTOM", 102.0),
    ("CLOSE", 2.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub name: String,
    pub args: Vec<String>,
}

impl DrawCall {
    fn new(name: &str, args: &[Value]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(to_display).collect(),
        }
    }
}

/// Inspectable record of everything the sketch did to the host.
#[derive(Debug, Default)]
pub struct Surface {
    width: u32,
    height: u32,
    calls: Vec<DrawCall>,
    styles: IndexMap<String, Vec<String>>,
    matrix: Vec<DrawCall>,
    matrix_stack: Vec<usize>,
    frame_rate: f64,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        let mut surface = Self {
            width,
            height,
            frame_rate: 60.0,
            ..Self::default()
        };
        surface.reset_styles();
        surface
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Every mutating call since the logs were last cleared.
    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn calls_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DrawCall> + 'a {
        self.calls.iter().filter(move |call| call.name == name)
    }

    /// Current arguments of a live-reset style.
    pub fn style(&self, name: &str) -> Option<&[String]> {
        self.styles.get(name).map(Vec::as_slice)
    }

    /// Transforms applied since the last `resetMatrix`.
    pub fn matrix(&self) -> &[DrawCall] {
        &self.matrix
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Records a host call made outside the drawing natives.
    pub(crate) fn record_call(&mut self, name: &str, args: &[Value]) {
        self.record(DrawCall::new(name, args));
    }

    fn record(&mut self, call: DrawCall) {
        trace!(name = %call.name, args = ?call.args, "surface call");
        self.calls.push(call);
    }

    fn set_style(&mut self, name: &str, args: Vec<String>) {
        if name == "frameRate" {
            if let Some(rate) = args.first().and_then(|r| r.parse().ok()) {
                self.frame_rate = rate;
            }
        }
        self.styles.insert(name.to_string(), args);
    }

    fn reset_style(&mut self, name: &str) -> bool {
        let Some((_, defaults)) = LIVE_RESET.iter().find(|(style, _)| *style == name) else {
            return false;
        };
        let args = defaults.iter().map(|arg| to_display(&arg.to_value())).collect();
        self.set_style(name, args);
        true
    }

    fn reset_styles(&mut self) {
        for (name, _) in LIVE_RESET {
            self.reset_style(name);
        }
    }
}

/// Shared handle the natives write through.
pub type SurfaceRef = Rc<RefCell<Surface>>;

/// The live drawing target and its environment object.
pub struct Target {
    env: ObjectRef,
    surface: SurfaceRef,
    rng: Rc<Cell<u64>>,
    placeholder: ObjectRef,
    restart_requested: Rc<Cell<bool>>,
    pristine: Vec<(String, Value)>,
}

impl Target {
    pub fn new(interp: &Interpreter, width: u32, height: u32) -> Self {
        let env = interp.new_object();
        interp.install_globals(&env);

        let surface = Rc::new(RefCell::new(Surface::new(width, height)));
        let rng = Rc::new(Cell::new(seed_state(0)));
        let restart_requested = Rc::new(Cell::new(false));
        let placeholder = interp.new_native("draw", Effect::Pure, |_, _, _| Ok(Value::Undefined));

        let target = Self {
            env,
            surface,
            rng,
            placeholder,
            restart_requested,
            pristine: Vec::new(),
        };
        target.install_properties(width, height);
        target.install_drawing(interp);
        target.install_math(interp);
        target.install_program(interp);
        target
    }

    pub fn env(&self) -> &ObjectRef {
        &self.env
    }

    pub fn surface(&self) -> Ref<'_, Surface> {
        self.surface.borrow()
    }

    pub fn surface_ref(&self) -> SurfaceRef {
        self.surface.clone()
    }

    /// The inert `draw` installed before any script defines one.
    pub fn placeholder(&self) -> &ObjectRef {
        &self.placeholder
    }

    pub fn is_placeholder(&self, value: &Value) -> bool {
        value.as_object().is_some_and(|object| object.ptr_eq(&self.placeholder))
    }

    /// Some entry point is defined and is not the placeholder.
    pub fn draw_loop_defined(&self) -> bool {
        RISK_NAMES.iter().any(|name| match self.env.get_own(name) {
            None | Some(Value::Undefined) => false,
            Some(value) => !self.is_placeholder(&value),
        })
    }

    /// Restores the placeholder when `draw` is missing.
    pub fn ensure_draw(&self) {
        if self.env.get_own("draw").map_or(true, |draw| !draw.truthy()) {
            self.env.set_own("draw", Value::Object(self.placeholder.clone()));
        }
    }

    pub fn restore_placeholder(&self) {
        self.env.set_own("draw", Value::Object(self.placeholder.clone()));
    }

    // ------------------------------------------------------------------
    // Drawing state
    // ------------------------------------------------------------------

    /// Restores every live-reset style to its default.
    pub fn clear(&self) {
        self.surface.borrow_mut().reset_styles();
    }

    pub fn reset_style(&self, name: &str) -> bool {
        self.surface.borrow_mut().reset_style(name)
    }

    pub fn reset_matrix(&self) {
        let mut surface = self.surface.borrow_mut();
        surface.matrix.clear();
        surface.matrix_stack.clear();
    }

    pub fn clear_logs(&self) {
        self.surface.borrow_mut().calls.clear();
    }

    pub fn random_seed(&self, seed: u32) {
        self.rng.set(seed_state(u64::from(seed)));
    }

    pub fn frame_count(&self) -> f64 {
        self.env.get_own("frameCount").map_or(0.0, |n| to_number(&n))
    }

    pub fn set_frame_count(&self, count: f64) {
        self.env.set_own("frameCount", Value::Number(count));
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        {
            let mut surface = self.surface.borrow_mut();
            surface.width = width;
            surface.height = height;
        }
        for (name, size) in [("width", width), ("height", height)] {
            let value = Value::Number(f64::from(size));
            self.env.set_own(name, value.clone());
            if let Some(entry) = self.pristine.iter_mut().find(|(key, _)| key == name) {
                entry.1 = value;
            }
        }
    }

    /// `Program.restart()` was called since the last check.
    pub fn take_restart_request(&self) -> bool {
        self.restart_requested.replace(false)
    }

    // ------------------------------------------------------------------
    // Pristine snapshot
    // ------------------------------------------------------------------

    /// Remembers the current environment as the state restarts return to.
    pub fn snapshot_pristine(&mut self) {
        self.pristine = self
            .env
            .own_keys()
            .into_iter()
            .filter_map(|key| self.env.get_own(&key).map(|value| (key, value)))
            .collect();
    }

    /// Restores original values and deletes every name added since.
    pub fn reset_to_pristine(&self) {
        for (key, value) in &self.pristine {
            self.env.set_own(key, value.clone());
        }
        let keep: FxHashSet<&str> = self.pristine.iter().map(|(key, _)| key.as_str()).collect();
        for key in self.env.own_keys() {
            if !keep.contains(key.as_str()) {
                self.env.delete_own(&key);
            }
        }
    }

    pub fn is_pristine_name(&self, name: &str) -> bool {
        self.pristine.iter().any(|(key, _)| key == name)
    }

    /// The value `name` had in the pristine snapshot.
    pub fn pristine_value(&self, name: &str) -> Option<&Value> {
        self.pristine
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    // ------------------------------------------------------------------
    // Installation
    // ------------------------------------------------------------------

    fn install_properties(&self, width: u32, height: u32) {
        let env = &self.env;
        env.set_own("width", Value::Number(f64::from(width)));
        env.set_own("height", Value::Number(f64::from(height)));
        env.set_own("frameCount", Value::Number(0.0));
        env.set_own("mouseX", Value::Number(0.0));
        env.set_own("mouseY", Value::Number(0.0));
        env.set_own("pmouseX", Value::Number(0.0));
        env.set_own("pmouseY", Value::Number(0.0));
        env.set_own("mouseIsPressed", Value::Bool(false));
        env.set_own("keyIsPressed", Value::Bool(false));
        env.set_own("keyCode", Value::Number(0.0));
        env.set_own("angleMode", Value::string("radians"));
        for (name, value) in CONSTANTS {
            env.set_own(name, Value::Number(*value));
        }
        env.set_own("ROUND", Value::string("round"));
        env.set_own("SQUARE", Value::string("butt"));
        env.set_own("PROJECT", Value::string("square"));
        env.set_own("draw", Value::Object(self.placeholder.clone()));
    }

    fn define(&self, interp: &Interpreter, name: &'static str, effect: Effect, func: impl Fn(&mut Interpreter, &Value, &[Value]) -> Result<Value, Fault> + 'static) {
        let native = interp.new_native(name, effect, func);
        self.env.set_own(name, Value::Object(native));
    }

    fn install_drawing(&self, interp: &Interpreter) {
        for (name, _) in LIVE_RESET {
            let surface = self.surface.clone();
            self.define(interp, *name, Effect::Mutating, move |_, _, args| {
                let call = DrawCall::new(name, args);
                let mut surface = surface.borrow_mut();
                surface.set_style(name, call.args.clone());
                surface.record(call);
                Ok(Value::Undefined)
            });
        }

        for name in SHAPES {
            let surface = self.surface.clone();
            self.define(interp, *name, Effect::Mutating, move |_, _, args| {
                surface.borrow_mut().record(DrawCall::new(name, args));
                Ok(Value::Undefined)
            });
        }

        for name in ["translate", "rotate", "scale"] {
            let surface = self.surface.clone();
            self.define(interp, name, Effect::Mutating, move |_, _, args| {
                let call = DrawCall::new(name, args);
                let mut surface = surface.borrow_mut();
                surface.matrix.push(call.clone());
                surface.record(call);
                Ok(Value::Undefined)
            });
        }

        let surface = self.surface.clone();
        self.define(interp, "pushMatrix", Effect::Mutating, move |_, _, _| {
            let mut surface = surface.borrow_mut();
            let depth = surface.matrix.len();
            surface.matrix_stack.push(depth);
            surface.record(DrawCall::new("pushMatrix", &[]));
            Ok(Value::Undefined)
        });

        let surface = self.surface.clone();
        self.define(interp, "popMatrix", Effect::Mutating, move |_, _, _| {
            let mut surface = surface.borrow_mut();
            if let Some(depth) = surface.matrix_stack.pop() {
                surface.matrix.truncate(depth);
            }
            surface.record(DrawCall::new("popMatrix", &[]));
            Ok(Value::Undefined)
        });

        let surface = self.surface.clone();
        self.define(interp, "resetMatrix", Effect::Mutating, move |_, _, _| {
            let mut surface = surface.borrow_mut();
            surface.matrix.clear();
            surface.matrix_stack.clear();
            Ok(Value::Undefined)
        });

        let surface = self.surface.clone();
        self.define(interp, "size", Effect::Mutating, move |interp, this, args| {
            let width = to_number(&args.first().cloned().unwrap_or_default());
            let height = to_number(&args.get(1).cloned().unwrap_or_default());
            {
                let mut surface = surface.borrow_mut();
                if width.is_finite() && height.is_finite() {
                    surface.width = width.max(0.0) as u32;
                    surface.height = height.max(0.0) as u32;
                }
                surface.record(DrawCall::new("size", args));
            }
            interp.set(this, "width", Value::Number(width))?;
            interp.set(this, "height", Value::Number(height))?;
            Ok(Value::Undefined)
        });

        let rng = self.rng.clone();
        let surface = self.surface.clone();
        self.define(interp, "randomSeed", Effect::Mutating, move |_, _, args| {
            let seed = args.first().map_or(0, |seed| to_number(seed) as u64);
            rng.set(seed_state(seed));
            surface.borrow_mut().record(DrawCall::new("randomSeed", args));
            Ok(Value::Undefined)
        });

        self.define(interp, "createGraphics", Effect::Pure, |interp, this, args| {
            let graphics = interp.new_object();
            if let Value::Object(env) = this {
                graphics.borrow_mut().prototype = Some(env.clone());
            }
            graphics.set_own("width", args.first().cloned().unwrap_or_default());
            graphics.set_own("height", args.get(1).cloned().unwrap_or_default());
            Ok(Value::Object(graphics))
        });

        self.define(interp, "createFont", Effect::Pure, |interp, _, args| {
            let font = interp.new_object();
            font.set_own("name", args.first().cloned().unwrap_or_default());
            font.set_own("size", args.get(1).cloned().unwrap_or(Value::Number(12.0)));
            Ok(Value::Object(font))
        });
    }

    fn install_math(&self, interp: &Interpreter) {
        let rng = self.rng.clone();
        self.define(interp, "random", Effect::Pure, move |_, _, args| {
            let unit = next_unit(&rng);
            let (low, high) = match args {
                [] => (0.0, 1.0),
                [high] => (0.0, to_number(high)),
                [low, high, ..] => (to_number(low), to_number(high)),
            };
            Ok(Value::Number(low + unit * (high - low)))
        });

        let angular: [(&'static str, fn(f64) -> f64); 3] =
            [("sin", f64::sin), ("cos", f64::cos), ("tan", f64::tan)];
        for (name, op) in angular {
            self.define(interp, name, Effect::Pure, move |_, this, args| {
                let angle = number(args, 0);
                let radians = if uses_degrees(this) { angle.to_radians() } else { angle };
                Ok(Value::Number(op(radians)))
            });
        }

        let inverse: [(&'static str, fn(f64) -> f64); 3] =
            [("asin", f64::asin), ("acos", f64::acos), ("atan", f64::atan)];
        for (name, op) in inverse {
            self.define(interp, name, Effect::Pure, move |_, this, args| {
                let radians = op(number(args, 0));
                Ok(Value::Number(if uses_degrees(this) { radians.to_degrees() } else { radians }))
            });
        }

        self.define(interp, "atan2", Effect::Pure, |_, this, args| {
            let radians = number(args, 0).atan2(number(args, 1));
            Ok(Value::Number(if uses_degrees(this) { radians.to_degrees() } else { radians }))
        });

        let unary: [(&'static str, fn(f64) -> f64); 8] = [
            ("abs", f64::abs),
            ("floor", f64::floor),
            ("ceil", f64::ceil),
            ("round", |x| (x + 0.5).floor()),
            ("sqrt", f64::sqrt),
            ("sq", |x| x * x),
            ("degrees", f64::to_degrees),
            ("radians", f64::to_radians),
        ];
        for (name, op) in unary {
            self.define(interp, name, Effect::Pure, move |_, _, args| {
                Ok(Value::Number(op(number(args, 0))))
            });
        }

        self.define(interp, "pow", Effect::Pure, |_, _, args| {
            Ok(Value::Number(number(args, 0).powf(number(args, 1))))
        });
        self.define(interp, "min", Effect::Pure, |_, _, args| {
            Ok(Value::Number(spread(args).into_iter().fold(f64::INFINITY, f64::min)))
        });
        self.define(interp, "max", Effect::Pure, |_, _, args| {
            Ok(Value::Number(spread(args).into_iter().fold(f64::NEG_INFINITY, f64::max)))
        });
        self.define(interp, "dist", Effect::Pure, |_, _, args| {
            let dx = number(args, 2) - number(args, 0);
            let dy = number(args, 3) - number(args, 1);
            Ok(Value::Number(dx.hypot(dy)))
        });
        self.define(interp, "mag", Effect::Pure, |_, _, args| {
            Ok(Value::Number(number(args, 0).hypot(number(args, 1))))
        });
        self.define(interp, "constrain", Effect::Pure, |_, _, args| {
            let (value, low, high) = (number(args, 0), number(args, 1), number(args, 2));
            Ok(Value::Number(value.max(low).min(high)))
        });
        self.define(interp, "lerp", Effect::Pure, |_, _, args| {
            let (start, stop, amount) = (number(args, 0), number(args, 1), number(args, 2));
            Ok(Value::Number(start + (stop - start) * amount))
        });
        self.define(interp, "map", Effect::Pure, |_, _, args| {
            let value = number(args, 0);
            let (low1, high1, low2, high2) =
                (number(args, 1), number(args, 2), number(args, 3), number(args, 4));
            Ok(Value::Number(low2 + (high2 - low2) * ((value - low1) / (high1 - low1))))
        });

        self.define(interp, "color", Effect::Pure, |_, _, args| {
            let channel = |i: usize| number(args, i).clamp(0.0, 255.0) as u32;
            let (r, g, b, a) = match args.len() {
                0 => (0, 0, 0, 255),
                1 => (channel(0), channel(0), channel(0), 255),
                2 => (channel(0), channel(0), channel(0), channel(1)),
                3 => (channel(0), channel(1), channel(2), 255),
                _ => (channel(0), channel(1), channel(2), channel(3)),
            };
            let packed = (a << 24) | (r << 16) | (g << 8) | b;
            Ok(Value::Number(f64::from(packed as i32)))
        });
        for (name, shift) in [("alpha", 24), ("red", 16), ("green", 8), ("blue", 0)] {
            self.define(interp, name, Effect::Pure, move |_, _, args| {
                let packed = to_int32(&args.first().cloned().unwrap_or_default()) as u32;
                Ok(Value::Number(f64::from((packed >> shift) & 0xff)))
            });
        }
    }

    fn install_program(&self, interp: &Interpreter) {
        let program = interp.new_object();
        let settings = interp.new_native("settings", Effect::Pure, |interp, _, _| {
            Ok(Value::Object(interp.new_object()))
        });
        let requested = self.restart_requested.clone();
        let restart = interp.new_native("restart", Effect::Pure, move |_, _, _| {
            requested.set(true);
            Ok(Value::Undefined)
        });
        let assert_equal = interp.new_native("assertEqual", Effect::Pure, |_, _, _| Ok(Value::Undefined));
        program.set_own("settings", Value::Object(settings));
        program.set_own("restart", Value::Object(restart));
        program.set_own("assertEqual", Value::Object(assert_equal));
        self.env.set_own("Program", Value::Object(program));
    }
}

/// `size`, white background and 30 fps, with angles in degrees.
pub fn prepare(interp: &mut Interpreter, target: &Target) -> Result<(), Fault> {
    let env = Value::Object(target.env.clone());
    let (width, height) = {
        let surface = target.surface();
        (surface.width, surface.height)
    };
    let call = |interp: &mut Interpreter, name: &str, args: &[Value]| -> Result<Value, Fault> {
        let function = interp.get(&env, name)?;
        interp.call(&function, env.clone(), args)
    };
    call(interp, "size", &[Value::Number(f64::from(width)), Value::Number(f64::from(height))])?;
    call(interp, "background", &[Value::Number(255.0), Value::Number(255.0), Value::Number(255.0)])?;
    call(interp, "frameRate", &[Value::Number(30.0)])?;
    target.env.set_own("angleMode", Value::string("degrees"));
    target.clear_logs();
    Ok(())
}

/// Property names visible on `env`'s prototype chain.
pub fn capability_names(env: &ObjectRef) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = FxHashSet::default();
    let mut current = Some(env.clone());
    while let Some(object) = current {
        for key in object.own_keys() {
            if seen.insert(key.clone()) {
                names.push(key);
            }
        }
        current = object.prototype();
    }
    names
}

fn number(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, to_number)
}

/// Arguments, or the elements of a single array argument.
fn spread(args: &[Value]) -> Vec<f64> {
    if let [Value::Object(array)] = args {
        if let Some(elements) = array.array_elements() {
            return elements.iter().map(to_number).collect();
        }
    }
    args.iter().map(to_number).collect()
}

fn uses_degrees(this: &Value) -> bool {
    this.as_object()
        .and_then(|env| env.get_own("angleMode"))
        .is_some_and(|mode| mode.as_str() == Some("degrees"))
}

/// splitmix64, so that seed 0 still yields a usable state.
fn seed_state(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    (z ^ (z >> 31)) | 1
}

fn next_unit(state: &Cell<u64>) -> f64 {
    let mut x = state.get();
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    state.set(x);
    (x >> 11) as f64 / (1u64 << 53) as f64
}

/// Formats a live-reset default the way the surface stores arguments.
pub fn reset_args(name: &str) -> Option<Vec<String>> {
    LIVE_RESET
        .iter()
        .find(|(style, _)| *style == name)
        .map(|(_, args)| {
            args.iter()
                .map(|arg| match arg {
                    ResetArg::Number(n) => format_number(*n),
                    ResetArg::Text(s) => (*s).to_string(),
                })
                .collect()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Callable;

    fn target() -> (Interpreter, Target) {
        let mut interp = Interpreter::new();
        let mut target = Target::new(&interp, 400, 400);
        prepare(&mut interp, &target).unwrap();
        target.snapshot_pristine();
        (interp, target)
    }

    fn call(interp: &mut Interpreter, target: &Target, name: &str, args: &[Value]) -> Value {
        let env = Value::Object(target.env().clone());
        let function = interp.get(&env, name).unwrap();
        interp.call(&function, env, args).unwrap()
    }

    #[test]
    fn test_capabilities_are_tagged_with_effects() {
        let (_, target) = target();
        let effect = |name: &str| target.env().get_own(name).and_then(|v| v.as_object().and_then(ObjectRef::native_effect));
        assert_eq!(effect("fill"), Some(Effect::Mutating));
        assert_eq!(effect("rect"), Some(Effect::Mutating));
        assert_eq!(effect("random"), Some(Effect::Pure));
        assert_eq!(effect("createFont"), Some(Effect::Pure));
        assert!(matches!(
            target.env().get_own("Math").and_then(|m| m.as_object().map(|o| o.is_function())),
            Some(false)
        ));
    }

    #[test]
    fn test_style_calls_update_surface_and_clear_restores_defaults() {
        let (mut interp, target) = target();
        call(&mut interp, &target, "fill", &[Value::Number(10.0), Value::Number(20.0), Value::Number(30.0)]);
        assert_eq!(target.surface().style("fill").unwrap(), ["10", "20", "30"]);
        assert_eq!(target.surface().calls_named("fill").count(), 1);

        target.clear();
        assert_eq!(target.surface().style("fill").map(<[String]>::to_vec), reset_args("fill"));
        assert_eq!(target.surface().style("strokeCap").unwrap(), ["round"]);
    }

    #[test]
    fn test_prepare_sets_size_background_and_frame_rate() {
        let (_, target) = target();
        assert_eq!(target.surface().frame_rate(), 30.0);
        assert_eq!(target.surface().style("background").unwrap(), ["255", "255", "255"]);
        assert!(target.surface().calls().is_empty());
        assert_eq!(target.env().get_own("angleMode").and_then(|m| m.as_str().map(String::from)).as_deref(), Some("degrees"));
    }

    #[test]
    fn test_random_is_reproducible_per_seed() {
        let (mut interp, target) = target();
        target.random_seed(42);
        let first = call(&mut interp, &target, "random", &[Value::Number(10.0)]);
        target.random_seed(42);
        let second = call(&mut interp, &target, "random", &[Value::Number(10.0)]);
        assert!(first.same_value(&second));
        let n = first.as_number().unwrap();
        assert!((0.0..10.0).contains(&n));
    }

    #[test]
    fn test_trig_honours_degree_mode() {
        let (mut interp, target) = target();
        let sin = call(&mut interp, &target, "sin", &[Value::Number(90.0)]);
        assert!((sin.as_number().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_color_packs_channels() {
        let (mut interp, target) = target();
        let color = call(&mut interp, &target, "color", &[Value::Number(255.0), Value::Number(128.0), Value::Number(0.0)]);
        let red = call(&mut interp, &target, "red", &[color.clone()]);
        let green = call(&mut interp, &target, "green", &[color]);
        assert_eq!(red.as_number(), Some(255.0));
        assert_eq!(green.as_number(), Some(128.0));
    }

    #[test]
    fn test_matrix_stack_and_reset() {
        let (mut interp, target) = target();
        call(&mut interp, &target, "translate", &[Value::Number(5.0), Value::Number(5.0)]);
        call(&mut interp, &target, "pushMatrix", &[]);
        call(&mut interp, &target, "rotate", &[Value::Number(45.0)]);
        assert_eq!(target.surface().matrix().len(), 2);
        call(&mut interp, &target, "popMatrix", &[]);
        assert_eq!(target.surface().matrix().len(), 1);
        target.reset_matrix();
        assert!(target.surface().matrix().is_empty());
    }

    #[test]
    fn test_pristine_reset_restores_and_deletes() {
        let (_, target) = target();
        target.env().set_own("fill", Value::Number(1.0));
        target.env().set_own("userThing", Value::Number(2.0));
        target.reset_to_pristine();
        assert!(target.env().get_own("fill").is_some_and(|f| f.is_function()));
        assert!(!target.env().has_own("userThing"));
    }

    #[test]
    fn test_placeholder_draw_and_program_restart() {
        let (mut interp, target) = target();
        assert!(!target.draw_loop_defined());
        let draw = target.env().get_own("draw").unwrap();
        assert!(target.is_placeholder(&draw));
        assert!(matches!(
            draw.as_object().and_then(ObjectRef::callable),
            Some(Callable::Native(_))
        ));

        let program = target.env().get_own("Program").unwrap();
        let restart = interp.get(&program, "restart").unwrap();
        interp.call(&restart, program, &[]).unwrap();
        assert!(target.take_restart_request());
        assert!(!target.take_restart_request());
    }

    #[test]
    fn test_capability_names_include_prototype_chain() {
        let (_, target) = target();
        let names = capability_names(target.env());
        assert!(names.iter().any(|n| n == "fill"));
        assert!(names.iter().any(|n| n == "Math"));
        assert!(names.iter().any(|n| n == "hasOwnProperty"));
    }
}
