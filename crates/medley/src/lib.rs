//! Medley - content models, windowed views and lazy materialization for
//! media browsers.
//!
//! The engine moves [`Content`](content::Content) items from backends to
//! on-screen objects:
//!
//! - [`model`]: the [`ContentModel`](model::ContentModel) interface and the
//!   in-memory [`GenericModel`](model::GenericModel) backends fill
//! - [`view_model`]: filtered, grouped, ordered windows over a model
//! - [`aggregate_model`]: the union of several models with provenance
//! - [`manager`]: the category registry building a priority-ordered tree
//! - [`proxy`]: bounded, time-sliced creation of UI objects for a model
//!
//! Every model announces its changes through a
//! [`Controller`](controller::Controller) as [`ChangeEvent`]s.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use medley::prelude::*;
//!
//! let context = MainContext::new();
//! let manager = ModelManager::new();
//! manager.add_category(CategoryInfo::new("music", 10)).unwrap();
//!
//! let albums = GenericModel::with_category("music");
//! for title in ["Kind of Blue", "Blue Train", "Giant Steps"] {
//!     albums.add_content(Content::new().with(MetadataKey::Title, title));
//! }
//! manager.add_model(albums.clone()).unwrap();
//!
//! let proxy: Arc<Proxy<String>> = Proxy::new(context.clone());
//! proxy.set_model(Some(manager.get_root_model()));
//! proxy.set_factory(|content: &Content| content.title().unwrap_or_default());
//!
//! let tiles = Arc::new(Mutex::new(Vec::new()));
//! let tiles_clone = tiles.clone();
//! proxy.object_created().connect(move |(_, tile)| tiles_clone.lock().push(tile.clone()));
//!
//! proxy.start().unwrap();
//! context.run_until_idle(100);
//! assert_eq!(tiles.lock().len(), 3);
//! ```

pub mod aggregate_model;
pub mod config;
pub mod content;
pub mod controller;
mod error;
pub mod manager;
pub mod model;
pub mod prelude;
pub mod proxy;
pub mod view_model;

pub use controller::ChangeEvent;
pub use error::{Error, Result};
pub use medley_core;
