//! The content model interface.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use medley_core::ConnectionId;

use super::sort::SortFunction;
use crate::content::Content;
use crate::controller::{ChangeEvent, Controller};

/// A process-unique model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value of this id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// A shared, type-erased model.
pub type SharedModel = Arc<dyn ContentModel>;

/// An ordered, observable collection of [`Content`].
///
/// Implementations announce every mutation on their [`Controller`] with the
/// timing documented in [`crate::controller`]. `index_of` must find every
/// item that `get_content` can return.
///
/// Read-only implementations log a warning and ignore the mutating calls.
pub trait ContentModel: Send + Sync {
    /// The model's identity.
    fn id(&self) -> ModelId;

    /// The item at `index`, if in range.
    fn get_content(&self, index: usize) -> Option<Content>;

    /// Position of `content`, if present.
    fn index_of(&self, content: &Content) -> Option<usize>;

    /// Number of items.
    fn len(&self) -> usize;

    /// Returns `true` if the model has no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every item in order.
    fn contents(&self) -> Vec<Content> {
        (0..self.len()).filter_map(|index| self.get_content(index)).collect()
    }

    /// Add an item. Adding an item already present does nothing.
    fn add_content(&self, content: Content);

    /// Remove an item. Removing an absent item does nothing.
    fn remove_content(&self, content: &Content);

    /// Remove every item.
    fn clear(&self);

    /// The category this model belongs to, if any.
    fn category(&self) -> Option<String>;

    /// Ordering weight among models of the same category. Higher first.
    fn priority(&self) -> i32 {
        0
    }

    /// Display title.
    fn title(&self) -> Option<String> {
        None
    }

    /// The active sort function.
    fn sort_func(&self) -> Option<SortFunction>;

    /// Change the sort function.
    fn set_sort_func(&self, func: Option<SortFunction>);

    /// The model's change stream.
    fn controller(&self) -> &Controller;

    /// Subscribe to this model's change events.
    fn subscribe(&self, observer: Box<dyn Fn(&ChangeEvent) + Send + Sync>) -> ConnectionId {
        self.controller().connect(move |event| observer(event))
    }

    /// Remove a subscription made with [`subscribe`](Self::subscribe).
    fn unsubscribe(&self, id: ConnectionId) -> bool {
        self.controller().disconnect(id)
    }
}
