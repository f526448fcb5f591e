//! Live-coding runtime for sandboxed drawing sketches.
//!
//! Scripts are parsed, rewritten so that every global reference goes
//! through a single environment handle, guarded against runaway loops, and
//! run by a tree-walking interpreter. Edits to a running sketch are applied
//! as patches wherever that preserves the live state.

// Front end
pub mod ast;
pub mod codegen;
pub mod parser;
pub mod walker;

// Rewriting
pub mod transforms;

// Runtime
pub mod errors;
pub mod executor;
pub mod guard;
pub mod injector;
pub mod interpreter;
pub mod resources;
pub mod target;

// Host surface
pub mod config;
pub mod sketch;

pub use config::SketchConfig;
pub use errors::{
    InfiniteLoopError, ParseError, ResourceLoadError, RuntimeError, SketchError, SketchResult,
};
pub use executor::{Executor, MutatingCall, ReplayArg};
pub use guard::{Clock, LoopGuard, SystemClock};
pub use injector::{HarvestSnapshot, Injector};
pub use resources::{Asset, CatalogLoader, ResourceCache, ResourceLoader};
pub use sketch::{LiveSketch, LiveSketchBuilder};
pub use transforms::{transform_code, Capabilities, GuardOptions, TransformMode, TransformOptions};
