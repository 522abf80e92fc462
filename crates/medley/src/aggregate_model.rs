//! The union of several child models.
//!
//! An [`AggregateModel`] holds an ordered list of child models and exposes
//! the content of all of them as a single model. It remembers which child
//! contributed each item, so consumers can map an item back to its model
//! with [`AggregateModel::get_model_for_content`].
//!
//! Child events are translated through the child itself: indices are
//! resolved with the child's `get_content` and the resulting content is
//! added to or removed from the union. A child's `Clear` or `Replace` drops
//! everything it contributed and re-adds its current content in one step.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};

use medley_core::logging::targets;
use medley_core::{ConnectionId, Signal};
use parking_lot::{Mutex, RwLock};

use crate::content::{Content, ContentId};
use crate::controller::{ChangeEvent, Controller};
use crate::model::{ContentModel, ModelId, SharedModel, SortFunction};

/// Orders the children of an aggregate.
pub type ModelCompareFn = Arc<dyn Fn(&dyn ContentModel, &dyn ContentModel) -> CmpOrdering + Send + Sync>;

/// Higher priority first.
pub fn by_priority() -> ModelCompareFn {
    Arc::new(|a: &dyn ContentModel, b: &dyn ContentModel| b.priority().cmp(&a.priority()))
}

struct Child {
    model: SharedModel,
    subscription: ConnectionId,
}

#[derive(Default)]
struct AggregateState {
    children: Vec<Child>,
    items: Vec<Content>,
    /// Which child contributed each item.
    owners: HashMap<ContentId, ModelId>,
}

impl AggregateState {
    fn child(&self, id: ModelId) -> Option<&SharedModel> {
        self.children
            .iter()
            .find(|child| child.model.id() == id)
            .map(|child| &child.model)
    }

    fn rank(&self, id: ModelId) -> Option<usize> {
        self.children.iter().position(|child| child.model.id() == id)
    }

    fn rank_of(&self, content: &Content) -> Option<usize> {
        self.owners.get(&content.id()).and_then(|owner| self.rank(*owner))
    }
}

/// A model that is the ordered union of its children.
///
/// # Example
///
/// ```
/// use medley::aggregate_model::AggregateModel;
/// use medley::content::{Content, MetadataKey};
/// use medley::model::{ContentModel, GenericModel};
///
/// let films = GenericModel::with_category("videos");
/// let shows = GenericModel::with_category("videos");
/// let film = Content::new().with(MetadataKey::Title, "Metropolis");
/// films.add_content(film.clone());
///
/// let videos = AggregateModel::new();
/// videos.add_model(films.clone());
/// videos.add_model(shows.clone());
///
/// assert_eq!(videos.len(), 1);
/// let owner = videos.get_model_for_content(&film).unwrap();
/// assert_eq!(owner.id(), films.id());
/// ```
pub struct AggregateModel {
    id: ModelId,
    state: Mutex<AggregateState>,
    compare: RwLock<ModelCompareFn>,
    category: RwLock<Option<String>>,
    title: RwLock<Option<String>>,
    priority: AtomicI32,
    sort: RwLock<Option<SortFunction>>,
    controller: Controller,
    model_added: Signal<SharedModel>,
    model_removed: Signal<SharedModel>,
    weak_self: Weak<AggregateModel>,
}

impl AggregateModel {
    /// Create an empty aggregate ordering its children by priority.
    pub fn new() -> Arc<Self> {
        Self::with_compare_func(by_priority())
    }

    /// Create an empty aggregate with a custom child order.
    pub fn with_compare_func(compare: ModelCompareFn) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: ModelId::next(),
            state: Mutex::new(AggregateState::default()),
            compare: RwLock::new(compare),
            category: RwLock::new(None),
            title: RwLock::new(None),
            priority: AtomicI32::new(0),
            sort: RwLock::new(None),
            controller: Controller::new(),
            model_added: Signal::new(),
            model_removed: Signal::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Signal emitted after a child was added.
    pub fn model_added(&self) -> &Signal<SharedModel> {
        &self.model_added
    }

    /// Signal emitted after a child was removed.
    pub fn model_removed(&self) -> &Signal<SharedModel> {
        &self.model_removed
    }

    /// Change the child order.
    ///
    /// Existing children are re-sorted. Without a sort function the content
    /// follows its children, and a `Replace` is emitted if it moved.
    pub fn set_compare_func(&self, compare: ModelCompareFn) {
        let unsorted = self.sort.read().is_none();
        let moved = {
            let mut state = self.state.lock();
            state
                .children
                .sort_by(|a, b| compare(a.model.as_ref(), b.model.as_ref()));

            let before = state.items.clone();
            if unsorted {
                let mut items = std::mem::take(&mut state.items);
                items.sort_by_key(|item| state.rank_of(item).unwrap_or(usize::MAX));
                state.items = items;
            }
            state.items != before
        };
        *self.compare.write() = compare;

        if moved {
            self.controller.emit(ChangeEvent::Replace);
        }
    }

    /// Set the category reported by the aggregate.
    pub fn set_category(&self, category: Option<String>) {
        *self.category.write() = category;
    }

    /// Set the priority reported by the aggregate.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::SeqCst);
    }

    /// Set the title reported by the aggregate.
    pub fn set_title(&self, title: Option<String>) {
        *self.title.write() = title;
    }

    /// The children, in order.
    pub fn models(&self) -> Vec<SharedModel> {
        self.state
            .lock()
            .children
            .iter()
            .map(|child| child.model.clone())
            .collect()
    }

    /// Returns `true` if `model` is a child.
    pub fn contains_model(&self, model: &dyn ContentModel) -> bool {
        self.state.lock().child(model.id()).is_some()
    }

    /// The child that contributed `content`.
    pub fn get_model_for_content(&self, content: &Content) -> Option<SharedModel> {
        let state = self.state.lock();
        let owner = *state.owners.get(&content.id())?;
        state.child(owner).cloned()
    }

    /// Add a child and all of its content. Adding a child twice does nothing.
    pub fn add_model(&self, model: SharedModel) {
        if model.id() == self.id {
            tracing::warn!(target: targets::AGGREGATE, model = %self.id, "an aggregate cannot contain itself");
            return;
        }

        {
            let mut state = self.state.lock();
            if state.child(model.id()).is_some() {
                tracing::trace!(target: targets::AGGREGATE, model = %model.id(), "model already aggregated");
                return;
            }

            let weak = self.weak_self.clone();
            let weak_child = Arc::downgrade(&model);
            let subscription = model.controller().connect(move |event| {
                let (Some(aggregate), Some(child)) = (weak.upgrade(), weak_child.upgrade()) else {
                    return;
                };
                aggregate.handle_child_event(&child, event);
            });

            let compare = self.compare.read().clone();
            let position = state
                .children
                .partition_point(|child| compare(child.model.as_ref(), model.as_ref()).is_le());
            state.children.insert(
                position,
                Child {
                    model: model.clone(),
                    subscription,
                },
            );
        }

        tracing::debug!(target: targets::AGGREGATE, aggregate = %self.id, model = %model.id(), items = model.len(), "model added");
        for content in model.contents() {
            self.add_item(content, Some(model.id()));
        }
        self.model_added.emit(model);
    }

    /// Remove a child and everything it contributed.
    ///
    /// Returns `false` if `model` is not a child.
    pub fn remove_model(&self, model: &dyn ContentModel) -> bool {
        let id = model.id();
        if self.state.lock().child(id).is_none() {
            tracing::warn!(target: targets::AGGREGATE, aggregate = %self.id, model = %id, "trying to remove a model that is not aggregated");
            return false;
        }

        for content in self.owned_by(id) {
            self.remove_item(&content);
        }

        let removed = {
            let mut state = self.state.lock();
            let Some(position) = state.children.iter().position(|child| child.model.id() == id) else {
                return false;
            };
            state.children.remove(position)
        };
        removed.model.controller().disconnect(removed.subscription);

        tracing::debug!(target: targets::AGGREGATE, aggregate = %self.id, model = %id, "model removed");
        self.model_removed.emit(removed.model);
        true
    }

    /// Remove every child.
    pub fn clear_models(&self) {
        for model in self.models() {
            self.remove_model(model.as_ref());
        }
    }

    fn owned_by(&self, id: ModelId) -> Vec<Content> {
        let state = self.state.lock();
        state
            .items
            .iter()
            .filter(|content| state.owners.get(&content.id()) == Some(&id))
            .cloned()
            .collect()
    }

    /// Where `content` goes: by the sort function if set, otherwise after
    /// the content of every child ordered at or before its owner.
    fn insertion_point(&self, state: &AggregateState, content: &Content, owner: Option<ModelId>) -> usize {
        if let Some(sort) = self.sort.read().as_ref() {
            return state
                .items
                .partition_point(|item| sort.compare(item, content).is_le());
        }

        let Some(rank) = owner.and_then(|owner| state.rank(owner)) else {
            return state.items.len();
        };
        state
            .items
            .iter()
            .rposition(|item| state.rank_of(item).is_some_and(|other| other <= rank))
            .map_or(0, |position| position + 1)
    }

    fn add_item(&self, content: Content, owner: Option<ModelId>) {
        let index = {
            let mut state = self.state.lock();
            if state.items.contains(&content) {
                tracing::trace!(target: targets::AGGREGATE, content = %content.id(), "content already aggregated");
                return;
            }
            let index = self.insertion_point(&state, &content, owner);
            if let Some(owner) = owner {
                state.owners.insert(content.id(), owner);
            }
            state.items.insert(index, content);
            index
        };
        self.controller.emit(ChangeEvent::Add(vec![index]));
    }

    fn remove_item(&self, content: &Content) {
        let Some(index) = self.index_of(content) else {
            return;
        };

        self.controller.emit(ChangeEvent::Remove(vec![index]));

        let mut state = self.state.lock();
        if let Some(index) = state.items.iter().position(|item| item == content) {
            state.items.remove(index);
        }
        state.owners.remove(&content.id());
    }

    /// Drop what `child` contributed and take its current content instead.
    fn resync_child(&self, child: &SharedModel) {
        let id = child.id();
        let current = child.contents();

        let emptied = {
            let mut state = self.state.lock();
            let before = state.items.len();
            let owners = std::mem::take(&mut state.owners);
            state
                .items
                .retain(|content| owners.get(&content.id()) != Some(&id));
            state.owners = owners.into_iter().filter(|(_, owner)| *owner != id).collect();
            let dropped = before - state.items.len();

            let mut added = 0;
            for content in current {
                if state.items.contains(&content) {
                    continue;
                }
                let index = self.insertion_point(&state, &content, Some(id));
                state.owners.insert(content.id(), id);
                state.items.insert(index, content);
                added += 1;
            }

            if dropped == 0 && added == 0 {
                return;
            }
            state.items.is_empty()
        };

        tracing::trace!(target: targets::AGGREGATE, aggregate = %self.id, model = %id, "child resynchronised");
        self.controller.emit(if emptied {
            ChangeEvent::Clear
        } else {
            ChangeEvent::Replace
        });
    }

    fn handle_child_event(&self, child: &SharedModel, event: &ChangeEvent) {
        if self.state.lock().child(child.id()).is_none() {
            return;
        }
        tracing::trace!(target: targets::AGGREGATE, model = %child.id(), event = event.name(), "child changed");

        match event {
            ChangeEvent::Add(_) => {
                for index in event.sorted_indices() {
                    match child.get_content(index) {
                        Some(content) => self.add_item(content, Some(child.id())),
                        None => {
                            tracing::warn!(target: targets::AGGREGATE, model = %child.id(), index, "added index out of range")
                        }
                    }
                }
            }
            ChangeEvent::Remove(_) => {
                // Resolve everything before the child mutates.
                let removed: Vec<Content> = event
                    .sorted_indices()
                    .into_iter()
                    .filter_map(|index| {
                        let content = child.get_content(index);
                        if content.is_none() {
                            tracing::warn!(target: targets::AGGREGATE, model = %child.id(), index, "removed index out of range");
                        }
                        content
                    })
                    .collect();

                for content in removed {
                    let owned = self.state.lock().owners.get(&content.id()) == Some(&child.id());
                    if owned {
                        self.remove_item(&content);
                    }
                }
            }
            ChangeEvent::Update(_) => {
                let indices: Vec<usize> = event
                    .sorted_indices()
                    .into_iter()
                    .filter_map(|index| child.get_content(index))
                    .filter_map(|content| self.index_of(&content))
                    .collect();
                if !indices.is_empty() {
                    self.controller.emit(ChangeEvent::Update(indices));
                }
            }
            ChangeEvent::Clear | ChangeEvent::Replace => self.resync_child(child),
        }
    }
}

impl ContentModel for AggregateModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn get_content(&self, index: usize) -> Option<Content> {
        self.state.lock().items.get(index).cloned()
    }

    fn index_of(&self, content: &Content) -> Option<usize> {
        self.state.lock().items.iter().position(|item| item == content)
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    fn contents(&self) -> Vec<Content> {
        self.state.lock().items.clone()
    }

    fn add_content(&self, content: Content) {
        self.add_item(content, None);
    }

    fn remove_content(&self, content: &Content) {
        self.remove_item(content);
    }

    fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.items.clear();
            state.owners.clear();
        }
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

        self.state.lock().items.sort_by(|a, b| func.compare(a, b));
        *self.sort.write() = Some(func);
        self.controller.emit(ChangeEvent::Replace);
    }

    fn controller(&self) -> &Controller {
        &self.controller
    }
}

impl Drop for AggregateModel {
    fn drop(&mut self) {
        for child in self.state.get_mut().children.drain(..) {
            child.model.controller().disconnect(child.subscription);
        }
    }
}

static_assertions::assert_impl_all!(AggregateModel: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MetadataKey;
    use crate::model::GenericModel;

    fn item(title: &str) -> Content {
        Content::new().with(MetadataKey::Title, title)
    }

    fn titles(model: &dyn ContentModel) -> Vec<String> {
        model.contents().iter().filter_map(Content::title).collect()
    }

    fn record(model: &dyn ContentModel) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        model
            .controller()
            .connect(move |event| events_clone.lock().push(event.clone()));
        events
    }

    #[test]
    fn test_add_model_is_idempotent() {
        let child = GenericModel::new();
        child.add_contents([item("a"), item("b")]);
        let aggregate = AggregateModel::new();
        let events = record(aggregate.as_ref());

        aggregate.add_model(child.clone());
        aggregate.add_model(child.clone());

        assert_eq!(titles(aggregate.as_ref()), ["a", "b"]);
        assert_eq!(aggregate.models().len(), 1);
        assert_eq!(
            *events.lock(),
            vec![ChangeEvent::Add(vec![0]), ChangeEvent::Add(vec![1])]
        );
        assert_eq!(child.controller().subscriber_count(), 1);
    }

    #[test]
    fn test_children_ordered_by_priority_then_insertion() {
        let low = GenericModel::builder().priority(1).build();
        let high = GenericModel::builder().priority(9).build();
        let tie = GenericModel::builder().priority(1).build();
        let aggregate = AggregateModel::new();

        aggregate.add_model(low.clone());
        aggregate.add_model(high.clone());
        aggregate.add_model(tie.clone());

        let order: Vec<ModelId> = aggregate.models().iter().map(|m| m.id()).collect();
        assert_eq!(order, [high.id(), low.id(), tie.id()]);
    }

    #[test]
    fn test_child_events_are_translated() {
        let first = GenericModel::new();
        let second = GenericModel::new();
        first.add_content(item("f1"));
        second.add_content(item("s1"));
        let aggregate = AggregateModel::new();
        aggregate.add_model(first.clone());
        aggregate.add_model(second.clone());

        let events = record(aggregate.as_ref());
        let added = item("f2");
        first.add_content(added.clone());
        assert_eq!(titles(aggregate.as_ref()), ["f1", "f2", "s1"]);
        assert_eq!(aggregate.get_model_for_content(&added).map(|m| m.id()), Some(first.id()));
        assert_eq!(*events.lock(), vec![ChangeEvent::Add(vec![1])]);

        events.lock().clear();
        first.remove_content(&added);
        assert_eq!(titles(aggregate.as_ref()), ["f1", "s1"]);
        assert_eq!(*events.lock(), vec![ChangeEvent::Remove(vec![1])]);
        assert!(aggregate.get_model_for_content(&added).is_none());
    }

    #[test]
    fn test_remove_model() {
        let first = GenericModel::new();
        let second = GenericModel::new();
        let kept = item("kept");
        let gone = item("gone");
        first.add_content(gone.clone());
        second.add_content(kept.clone());
        let aggregate = AggregateModel::new();
        aggregate.add_model(first.clone());
        aggregate.add_model(second.clone());

        let removed = Arc::new(Mutex::new(Vec::new()));
        let removed_clone = removed.clone();
        aggregate
            .model_removed()
            .connect(move |model| removed_clone.lock().push(model.id()));

        assert!(aggregate.remove_model(first.as_ref()));
        assert!(!aggregate.remove_model(first.as_ref()));

        assert_eq!(titles(aggregate.as_ref()), ["kept"]);
        assert!(aggregate.get_model_for_content(&gone).is_none());
        assert!(aggregate.get_model_for_content(&kept).is_some());
        assert_eq!(*removed.lock(), vec![first.id()]);
        assert_eq!(first.controller().subscriber_count(), 0);

        first.add_content(item("ignored"));
        assert_eq!(aggregate.len(), 1);
    }

    #[test]
    fn test_child_clear_and_replace() {
        let child = GenericModel::new();
        let other = GenericModel::new();
        let contents = vec![item("b"), item("a")];
        child.add_contents(contents.clone());
        other.add_content(item("z"));
        let aggregate = AggregateModel::new();
        aggregate.add_model(child.clone());
        aggregate.add_model(other.clone());
        let events = record(aggregate.as_ref());

        child.clear();
        assert_eq!(titles(aggregate.as_ref()), ["z"]);
        assert!(aggregate.get_model_for_content(&contents[0]).is_none());

        other.clear();
        child.add_contents(contents.clone());
        child.set_sort_func(Some(crate::model::sort::alphabetical()));
        assert_eq!(aggregate.len(), 2);
        assert_eq!(
            aggregate.get_model_for_content(&contents[1]).map(|m| m.id()),
            Some(child.id())
        );

        let events = events.lock();
        assert_eq!(events[0], ChangeEvent::Replace);
        assert_eq!(events[1], ChangeEvent::Clear);
        assert_eq!(events.last(), Some(&ChangeEvent::Replace));
    }

    #[test]
    fn test_direct_mutation_and_clear_models() {
        let child = GenericModel::new();
        let owned = item("owned");
        child.add_content(owned.clone());
        let aggregate = AggregateModel::new();
        aggregate.add_model(child.clone());

        let loose = item("loose");
        aggregate.add_content(loose.clone());
        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.get_model_for_content(&loose).is_none());

        aggregate.remove_content(&owned);
        assert!(aggregate.get_model_for_content(&owned).is_none());

        aggregate.clear_models();
        assert!(aggregate.models().is_empty());
        assert_eq!(titles(aggregate.as_ref()), ["loose"]);
    }

    #[test]
    fn test_update_forwarded() {
        let child = GenericModel::new();
        let content = item("a");
        child.add_contents([item("first"), content.clone()]);
        let aggregate = AggregateModel::new();
        aggregate.add_model(child.clone());
        let events = record(aggregate.as_ref());

        content.set_metadata(MetadataKey::Title, "renamed");

        assert_eq!(*events.lock(), vec![ChangeEvent::Update(vec![1])]);
    }

    #[test]
    fn test_content_follows_child_order() {
        let low = GenericModel::builder().priority(1).build();
        let high = GenericModel::builder().priority(5).build();
        low.add_content(item("low"));
        high.add_content(item("high"));
        let aggregate = AggregateModel::new();

        aggregate.add_model(low.clone());
        aggregate.add_model(high.clone());
        assert_eq!(titles(aggregate.as_ref()), ["high", "low"]);

        let events = record(aggregate.as_ref());
        aggregate.set_compare_func(Arc::new(|a: &dyn ContentModel, b: &dyn ContentModel| {
            a.priority().cmp(&b.priority())
        }));
        assert_eq!(titles(aggregate.as_ref()), ["low", "high"]);
        assert_eq!(*events.lock(), vec![ChangeEvent::Replace]);

        aggregate.set_sort_func(Some(crate::model::sort::alphabetical()));
        assert_eq!(titles(aggregate.as_ref()), ["high", "low"]);
    }

    #[test]
    fn test_drop_disconnects() {
        let child = GenericModel::new();
        let aggregate = AggregateModel::new();
        aggregate.add_model(child.clone());
        assert_eq!(child.controller().subscriber_count(), 1);

        drop(aggregate);
        assert_eq!(child.controller().subscriber_count(), 0);
    }
}
