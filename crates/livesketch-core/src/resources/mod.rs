//! Discovery, loading and lookup of catalog images and sounds.
//!
//! Loading is best-effort: every load settles, failures are logged, and a
//! missing asset only surfaces later as a runtime error from `getImage` or
//! `getSound`.

pub mod catalog;

pub use catalog::{Catalog, CATALOG};

use crate::ast::{Expression, Literal, Program};
use crate::errors::{ResourceLoadError, SketchError, SketchResult};
use crate::interpreter::{to_display, Effect, Fault, Interpreter, ObjectRef, Value};
use crate::parser::parse;
use crate::target::SurfaceRef;
use crate::walker::{walk, Ancestor, NodeMut, Replacement, Visitor};
use futures::future::{self, LocalBoxFuture};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// A loaded image or sound.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub width: u32,
    pub height: u32,
}

pub type LoadResult = Result<Asset, ResourceLoadError>;

/// Fetches one asset by its `group/name.ext` filename.
pub trait ResourceLoader {
    fn load<'a>(&'a self, filename: &'a str) -> LocalBoxFuture<'a, LoadResult>;
}

/// Resolves every catalog name immediately and fails everything else.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogLoader;

impl ResourceLoader for CatalogLoader {
    fn load<'a>(&'a self, filename: &'a str) -> LocalBoxFuture<'a, LoadResult> {
        let result = match split_filename(filename) {
            Some(("png", group, name)) if CATALOG.has_image(group, name) => Ok(Asset {
                width: 100,
                height: 100,
            }),
            Some(("mp3", group, name)) if CATALOG.has_sound(group, name) => Ok(Asset {
                width: 0,
                height: 0,
            }),
            _ => Err(ResourceLoadError {
                filename: filename.to_string(),
                reason: "not in the catalog".to_string(),
            }),
        };
        Box::pin(future::ready(result))
    }
}

/// `group/name.ext` as `(ext, group, name)`.
fn split_filename(filename: &str) -> Option<(&str, &str, &str)> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let (group, name) = stem.split_once('/')?;
    Some((ext, group, name))
}

/// Catalog assets named inside string literals, in first-seen order.
pub fn find_resources(program: &mut Program) -> SketchResult<IndexSet<String>> {
    let mut finder = ResourceFinder::default();
    walk(program, &mut [&mut finder])?;
    Ok(finder.found)
}

pub fn find_resources_in(code: &str) -> SketchResult<IndexSet<String>> {
    let mut program = parse(code)?;
    find_resources(&mut program)
}

#[derive(Default)]
struct ResourceFinder {
    found: IndexSet<String>,
}

impl Visitor for ResourceFinder {
    fn leave(&mut self, node: NodeMut<'_>, _path: &[Ancestor]) -> Result<Replacement, SketchError> {
        if let NodeMut::Expression(Expression::Literal(Literal::String(text))) = node {
            for group in &CATALOG.images {
                for image in group.assets.iter().filter(|image| text.contains(*image)) {
                    self.found.insert(format!("{}/{image}.png", group.name));
                }
            }
            for group in &CATALOG.sounds {
                for sound in group.assets.iter().filter(|sound| text.contains(*sound)) {
                    self.found.insert(format!("{}/{sound}.mp3", group.name));
                }
            }
        }
        Ok(Replacement::Keep)
    }
}

/// Loaded assets keyed by filename.
#[derive(Debug, Default)]
pub struct ResourceCache {
    assets: FxHashMap<String, Asset>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<&Asset> {
        self.assets.get(filename)
    }

    pub fn insert(&mut self, filename: impl Into<String>, asset: Asset) {
        self.assets.insert(filename.into(), asset);
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Loads every resource concurrently and waits for all of them to settle.
    ///
    /// Failed loads are logged and dropped; sounds outside the catalog are not
    /// requested at all.
    pub async fn cache_resources(
        cache: &RefCell<Self>,
        loader: &dyn ResourceLoader,
        resources: &IndexSet<String>,
    ) {
        let wanted: Vec<&str> = resources
            .iter()
            .map(String::as_str)
            .filter(|filename| cache.borrow().get(filename).is_none())
            .filter(|filename| match split_filename(filename) {
                Some(("mp3", group, name)) => CATALOG.has_sound(group, name),
                _ => true,
            })
            .collect();
        if wanted.is_empty() {
            return;
        }

        let results = future::join_all(wanted.iter().map(|filename| loader.load(*filename))).await;

        let mut cache = cache.borrow_mut();
        for (filename, result) in wanted.into_iter().zip(results) {
            match result {
                Ok(asset) => cache.insert(filename, asset),
                Err(err) => warn!(%err, "resource failed to load; continuing"),
            }
        }
        debug!(cached = cache.len(), "resources settled");
    }
}

/// Installs `getImage`, `getSound` and `playSound` on `env`.
pub fn install(interp: &Interpreter, env: &ObjectRef, cache: Rc<RefCell<ResourceCache>>, surface: SurfaceRef) {
    let images = cache.clone();
    let get_image = interp.new_native("getImage", Effect::Pure, move |interp, _, args| {
        let name = args.first().map(to_display).unwrap_or_default();
        let Some(asset) = images.borrow().get(&format!("{name}.png")).cloned() else {
            return Err(Fault::Throw(Value::from(format!("Image {name} was not found."))));
        };
        let image = interp.new_object();
        image.set_own("width", Value::Number(f64::from(asset.width)));
        image.set_own("height", Value::Number(f64::from(asset.height)));
        set_id(interp, &image, format!("getImage('{name}')"));
        Ok(Value::Object(image))
    });
    env.set_own("getImage", Value::Object(get_image));

    let sounds = cache;
    let get_sound = interp.new_native("getSound", Effect::Pure, move |interp, _, args| {
        let name = args.first().map(to_display).unwrap_or_default();
        if sounds.borrow().get(&format!("{name}.mp3")).is_none() {
            return Err(Fault::Throw(Value::from(format!("Sound {name} was not found."))));
        }
        let sound = interp.new_object();
        let audio = interp.new_object();
        audio.set_own("src", Value::from(format!("{name}.mp3")));
        sound.set_own("audio", Value::Object(audio));
        set_id(interp, &sound, format!("getSound('{name}')"));
        Ok(Value::Object(sound))
    });
    env.set_own("getSound", Value::Object(get_sound));

    let play_sound = interp.new_native("playSound", Effect::Mutating, move |interp, _, args| {
        let audio = match args.first() {
            Some(sound @ Value::Object(_)) => interp.get(sound, "audio")?,
            _ => Value::Undefined,
        };
        let Some(audio) = audio.as_object().filter(|audio| audio.has_own("src")) else {
            return Err(Fault::Throw(Value::string("No sound file provided.")));
        };
        let src = audio.get_own("src").unwrap_or_default();
        surface.borrow_mut().record_call("playSound", &[src]);
        Ok(Value::Undefined)
    });
    env.set_own("playSound", Value::Object(play_sound));
}

fn set_id(interp: &Interpreter, object: &ObjectRef, id: String) {
    let id = Value::from(id);
    let native = interp.new_native("__id", Effect::Pure, move |_, _, _| Ok(id.clone()));
    object.set_own("__id", Value::Object(native));
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_finds_catalog_names_in_string_literals() {
        let found = find_resources_in(
            "var img = getImage('cute/Blank'); var s = getSound(\"retro/coin\"); var n = 'hello';",
        )
        .unwrap();
        assert!(found.contains("cute/Blank.png"));
        assert!(found.contains("retro/coin.mp3"));
        assert!(!found.iter().any(|f| f.contains("hello")));
    }

    #[test]
    fn test_failed_loads_settle_without_caching() {
        let cache = RefCell::new(ResourceCache::new());
        let mut wanted = IndexSet::new();
        wanted.insert("cute/Blank.png".to_string());
        wanted.insert("cute/NotAThing.png".to_string());
        block_on(ResourceCache::cache_resources(&cache, &CatalogLoader, &wanted));
        assert!(cache.borrow().get("cute/Blank.png").is_some());
        assert!(cache.borrow().get("cute/NotAThing.png").is_none());
    }

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("cute/Blank.png"), Some(("png", "cute", "Blank")));
        assert_eq!(split_filename("Blank"), None);
    }
}
