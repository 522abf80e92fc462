//! In-memory content model.
//!
//! `GenericModel` is the model most backends fill: a plain ordered list of
//! [`Content`] with an optional sort function. It watches the metadata of
//! every item it holds and reports changes as [`ChangeEvent::Update`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use medley_core::ConnectionId;
use medley_core::logging::targets;
use parking_lot::{Mutex, RwLock};

use super::sort::SortFunction;
use super::traits::{ContentModel, ModelId};
use crate::content::{Content, ContentId};
use crate::controller::{ChangeEvent, Controller};

/// A list-backed content model.
///
/// # Example
///
/// ```
/// use medley::content::{Content, MetadataKey};
/// use medley::model::{ContentModel, GenericModel, sort};
///
/// let model = GenericModel::builder()
///     .category("music")
///     .title("Albums")
///     .sort_func(sort::alphabetical())
///     .build();
///
/// model.add_content(Content::new().with(MetadataKey::Title, "Blue Train"));
/// model.add_content(Content::new().with(MetadataKey::Title, "A Love Supreme"));
///
/// let first = model.get_content(0).unwrap();
/// assert_eq!(first.title().as_deref(), Some("A Love Supreme"));
/// ```
pub struct GenericModel {
    id: ModelId,
    items: RwLock<Vec<Content>>,
    watches: Mutex<HashMap<ContentId, ConnectionId>>,
    category: RwLock<Option<String>>,
    title: RwLock<Option<String>>,
    placeholder_text: RwLock<Option<String>>,
    priority: AtomicI32,
    sort: RwLock<Option<SortFunction>>,
    controller: Controller,
    weak_self: Weak<GenericModel>,
}

impl GenericModel {
    /// Create an empty model without a category.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Create an empty model in `category`.
    pub fn with_category(category: impl Into<String>) -> Arc<Self> {
        Self::builder().category(category).build()
    }

    /// Start building a model.
    pub fn builder() -> GenericModelBuilder {
        GenericModelBuilder::default()
    }

    /// Add several items, emitting one `Add` per item.
    pub fn add_contents<I>(&self, contents: I)
    where
        I: IntoIterator<Item = Content>,
    {
        for content in contents {
            self.add_content(content);
        }
    }

    /// Swap every item for `contents`, emitting a single `Replace`.
    ///
    /// Duplicates in `contents` are dropped. With a sort function the new
    /// items are sorted.
    pub fn replace_contents<I>(&self, contents: I)
    where
        I: IntoIterator<Item = Content>,
    {
        let mut new: Vec<Content> = Vec::new();
        for content in contents {
            if !new.contains(&content) {
                new.push(content);
            }
        }
        if let Some(sort) = self.sort.read().as_ref() {
            new.sort_by(|a, b| sort.compare(a, b));
        }

        let old = std::mem::replace(&mut *self.items.write(), new.clone());
        for content in old.iter().filter(|content| !new.contains(content)) {
            self.unwatch(content);
        }
        for content in new.iter().filter(|content| !old.contains(content)) {
            self.watch(content);
        }

        tracing::trace!(target: targets::MODEL, model = %self.id, items = new.len(), "model contents replaced");
        self.controller.emit(ChangeEvent::Replace);
    }

    /// Change the model's priority.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::SeqCst);
    }

    /// Change the model's category.
    ///
    /// Takes effect in the model manager the next time the model is
    /// registered.
    pub fn set_category(&self, category: Option<String>) {
        *self.category.write() = category;
    }

    /// Change the display title.
    pub fn set_title(&self, title: Option<String>) {
        *self.title.write() = title;
    }

    /// Text a view shows while the model is empty.
    pub fn placeholder_text(&self) -> Option<String> {
        self.placeholder_text.read().clone()
    }

    fn index_of_id(&self, id: ContentId) -> Option<usize> {
        self.items.read().iter().position(|item| item.id() == id)
    }

    fn insertion_point(&self, items: &[Content], content: &Content) -> usize {
        match self.sort.read().as_ref() {
            // After every equal item, so insertion order breaks ties.
            Some(sort) => items.partition_point(|item| sort.compare(item, content).is_le()),
            None => items.len(),
        }
    }

    fn watch(&self, content: &Content) {
        let weak = self.weak_self.clone();
        let id = content.id();
        let connection = content.metadata_changed().connect(move |_key| {
            let Some(model) = weak.upgrade() else {
                return;
            };
            if let Some(index) = model.index_of_id(id) {
                model.controller.emit(ChangeEvent::Update(vec![index]));
            }
        });
        self.watches.lock().insert(id, connection);
    }

    fn unwatch(&self, content: &Content) {
        if let Some(connection) = self.watches.lock().remove(&content.id()) {
            content.metadata_changed().disconnect(connection);
        }
    }
}

impl ContentModel for GenericModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn get_content(&self, index: usize) -> Option<Content> {
        self.items.read().get(index).cloned()
    }

    fn index_of(&self, content: &Content) -> Option<usize> {
        self.index_of_id(content.id())
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }

    fn contents(&self) -> Vec<Content> {
        self.items.read().clone()
    }

    fn add_content(&self, content: Content) {
        let index = {
            let mut items = self.items.write();
            if items.iter().any(|item| *item == content) {
                tracing::trace!(target: targets::MODEL, model = %self.id, content = %content.id(), "content already present");
                return;
            }
            let index = self.insertion_point(&items, &content);
            items.insert(index, content.clone());
            index
        };

        self.watch(&content);
        self.controller.emit(ChangeEvent::Add(vec![index]));
    }

    fn remove_content(&self, content: &Content) {
        let Some(index) = self.index_of(content) else {
            return;
        };

        self.controller.emit(ChangeEvent::Remove(vec![index]));

        // A subscriber may have moved things while handling the event.
        let removed = {
            let mut items = self.items.write();
            match items.iter().position(|item| item == content) {
                Some(index) => {
                    items.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.unwatch(content);
        }
    }

    fn clear(&self) {
        let old = std::mem::take(&mut *self.items.write());
        for content in &old {
            self.unwatch(content);
        }
        tracing::trace!(target: targets::MODEL, model = %self.id, removed = old.len(), "model cleared");
        self.controller.emit(ChangeEvent::Clear);
    }

    fn category(&self) -> Option<String> {
        self.category.read().clone()
    }

    fn priority(&self) -> i32 {
        self.priority.load(Ordering::SeqCst)
    }

    fn title(&self) -> Option<String> {
        self.title.read().clone()
    }

    fn sort_func(&self) -> Option<SortFunction> {
        self.sort.read().clone()
    }

    fn set_sort_func(&self, func: Option<SortFunction>) {
        let Some(func) = func else {
            *self.sort.write() = None;
            return;
        };

        self.items.write().sort_by(|a, b| func.compare(a, b));
        *self.sort.write() = Some(func);
        self.controller.emit(ChangeEvent::Replace);
    }

    fn controller(&self) -> &Controller {
        &self.controller
    }
}

impl Drop for GenericModel {
    fn drop(&mut self) {
        let items = std::mem::take(self.items.get_mut());
        for content in &items {
            self.unwatch(content);
        }
    }
}

/// Builder for [`GenericModel`].
#[derive(Default)]
pub struct GenericModelBuilder {
    category: Option<String>,
    title: Option<String>,
    placeholder_text: Option<String>,
    priority: i32,
    sort: Option<SortFunction>,
}

impl GenericModelBuilder {
    /// Set the category.
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the display title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the empty-state text.
    pub fn placeholder_text(mut self, text: impl Into<String>) -> Self {
        self.placeholder_text = Some(text.into());
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the sort function.
    pub fn sort_func(mut self, sort: SortFunction) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Build the model.
    pub fn build(self) -> Arc<GenericModel> {
        Arc::new_cyclic(|weak_self| GenericModel {
            id: ModelId::next(),
            items: RwLock::new(Vec::new()),
            watches: Mutex::new(HashMap::new()),
            category: RwLock::new(self.category),
            title: RwLock::new(self.title),
            placeholder_text: RwLock::new(self.placeholder_text),
            priority: AtomicI32::new(self.priority),
            sort: RwLock::new(self.sort),
            controller: Controller::new(),
            weak_self: weak_self.clone(),
        })
    }
}

static_assertions::assert_impl_all!(GenericModel: Send, Sync);
