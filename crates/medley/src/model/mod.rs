//! Content models.
//!
//! This module defines the interface every content source implements and
//! the in-memory model most backends use.
//!
//! # Core Types
//!
//! - `ContentModel`: The trait that models implement
//! - `ModelId`: Identity of a model across the registry
//! - `GenericModel`: List-backed model with optional sorting
//! - `SortFunction`: Named comparator, with built-ins in [`sort`]
//!
//! # Example
//!
//! ```
//! use medley::content::{Content, MetadataKey};
//! use medley::controller::ChangeEvent;
//! use medley::model::{ContentModel, GenericModel};
//!
//! let model = GenericModel::with_category("videos");
//!
//! model.controller().connect(|event| match event {
//!     ChangeEvent::Add(indices) => println!("added at {indices:?}"),
//!     ChangeEvent::Remove(indices) => println!("removing {indices:?}"),
//!     _ => {}
//! });
//!
//! model.add_content(Content::new().with(MetadataKey::Title, "Metropolis"));
//! assert_eq!(model.len(), 1);
//! ```

mod generic_model;
pub mod sort;
mod traits;

pub use generic_model::{GenericModel, GenericModelBuilder};
pub use sort::{SortFn, SortFunction};
pub use traits::{ContentModel, ModelId, SharedModel};
