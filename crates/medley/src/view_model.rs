//! Windowed, filtered, grouped and ordered projections of a model.
//!
//! A [`ViewModel`] mirrors a source [`ContentModel`] and exposes, as a model
//! of its own, the window `[offset, offset + limit)` of the source after
//! three transforms:
//!
//! 1. **filter**: keep content matching every [`Filter`];
//! 2. **group**: collapse content sharing a value of the group key into one
//!    representative (case-insensitive);
//! 3. **order**: stable sort by a metadata key.
//!
//! With a start content set, the window begins at that content instead of
//! at `offset` and, when looping, wraps around to the beginning once.
//!
//! Every change to the source or to the settings recomputes the window and
//! reconciles it against the previous one. Small deltas that keep the
//! relative order of surviving items are reported as one `Remove` followed by
//! one `Add`; anything else replaces the window and reports `Replace`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use medley_core::ConnectionId;
use medley_core::logging::{span_names, targets};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::content::{Content, ContentId, GroupFilter, MetadataKey};
use crate::controller::{ChangeEvent, Controller};
use crate::error::{Error, Result};
use crate::model::{ContentModel, ModelId, SharedModel, SortFunction};

/// How a [`Filter`] compares the metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Keep content whose value equals the filter value.
    #[default]
    Equals,
    /// Keep content whose value differs from the filter value, or is missing.
    NotEquals,
}

/// A single metadata predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub key: MetadataKey,
    pub value: String,
    #[serde(default)]
    pub op: FilterOp,
}

impl Filter {
    /// Keep content where `key == value`.
    pub fn equals(key: MetadataKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            op: FilterOp::Equals,
        }
    }

    /// Keep content where `key != value`.
    pub fn not_equals(key: MetadataKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            op: FilterOp::NotEquals,
        }
    }

    /// Returns `true` if `content` passes this filter.
    pub fn matches(&self, content: &Content) -> bool {
        let equal = content.get_metadata(&self.key).as_deref() == Some(self.value.as_str());
        match self.op {
            FilterOp::Equals => equal,
            FilterOp::NotEquals => !equal,
        }
    }
}

/// View model window settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewModelConfig {
    /// First visible position of the transformed sequence.
    pub offset: usize,
    /// Maximum number of visible items; `0` means unbounded.
    pub limit: usize,
    /// Wrap around to the beginning when starting at a content.
    pub loop_around: bool,
}

struct ViewState {
    started: bool,
    subscription: Option<ConnectionId>,
    /// The source's contents, kept in step with its events.
    mirror: Vec<Content>,
    window: Vec<Content>,
    filters: Vec<Filter>,
    group_by: Option<MetadataKey>,
    primary_group_by: Option<MetadataKey>,
    secondary_group_by: Option<MetadataKey>,
    /// Group representatives by lowercased group value, for the groups
    /// present in the last pass.
    groups: HashMap<String, Content>,
    order_by: Option<MetadataKey>,
    descending: bool,
    offset: usize,
    limit: usize,
    anchor: Option<Content>,
    looping: bool,
    title: Option<String>,
    generation: u64,
    /// Set while `refresh` is emitting; nested refreshes are deferred.
    refreshing: bool,
    refresh_pending: bool,
}

impl ViewState {
    fn drill_down_key(&self) -> Option<MetadataKey> {
        match (&self.group_by, &self.primary_group_by) {
            (Some(group_by), Some(primary)) if group_by == primary => {
                self.secondary_group_by.clone()
            }
            _ => None,
        }
    }

    fn transformed(&mut self) -> Vec<Content> {
        let mut items: Vec<Content> = self
            .mirror
            .iter()
            .filter(|content| self.filters.iter().all(|filter| filter.matches(content)))
            .cloned()
            .collect();

        if let Some(key) = self.group_by.clone() {
            items = self.group(items, &key);
        }

        if let Some(key) = &self.order_by {
            items.sort_by(|a, b| {
                let ordering = match (a.get_metadata(key), b.get_metadata(key)) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(a), Some(b)) => a.cmp(&b),
                };
                if self.descending { ordering.reverse() } else { ordering }
            });
        }

        items
    }

    fn group(&mut self, items: Vec<Content>, key: &MetadataKey) -> Vec<Content> {
        let mut seen = HashSet::new();
        let mut grouped = Vec::new();

        for content in items {
            // Content without a value for the key stays ungrouped.
            let Some(value) = content.get_metadata(key) else {
                grouped.push(content);
                continue;
            };
            let folded = value.to_lowercase();
            if !seen.insert(folded.clone()) {
                continue;
            }

            let representative = match self.groups.get(&folded) {
                Some(existing) => existing.clone(),
                None => {
                    let representative = self.representative(key, &value);
                    self.groups.insert(folded, representative.clone());
                    representative
                }
            };
            sync_shared_metadata(&representative, &content);
            grouped.push(representative);
        }

        self.groups.retain(|folded, _| seen.contains(folded));
        grouped
    }

    fn representative(&self, key: &MetadataKey, value: &str) -> Content {
        let inherited = self
            .filters
            .iter()
            .filter(|filter| filter.op == FilterOp::Equals)
            .map(|filter| (filter.key.clone(), filter.value.clone()))
            .collect();
        let filter = GroupFilter::new(key.clone(), value)
            .with_inherited(inherited)
            .with_drill_down_key(self.drill_down_key());

        Content::group(filter, value)
    }

    /// The visible window of the transformed sequence.
    fn compute_window(&mut self) -> Result<Vec<Content>> {
        let transformed = self.transformed();

        let visible: Vec<Content> = match &self.anchor {
            Some(anchor) => {
                let start = transformed
                    .iter()
                    .position(|content| content == anchor)
                    .ok_or(Error::ContentNotFound(anchor.id()))?;
                let mut rotated = transformed[start..].to_vec();
                if self.looping {
                    rotated.extend_from_slice(&transformed[..start]);
                }
                rotated
            }
            None => transformed
                .get(self.offset..)
                .map(<[Content]>::to_vec)
                .unwrap_or_default(),
        };

        Ok(if self.limit > 0 {
            visible.into_iter().take(self.limit).collect()
        } else {
            visible
        })
    }
}

/// Metadata a group representative mirrors from its first member.
const SHARED_KEYS: [MetadataKey; 3] = [MetadataKey::Still, MetadataKey::Album, MetadataKey::Artist];

fn sync_shared_metadata(representative: &Content, first: &Content) {
    for key in SHARED_KEYS {
        match first.get_metadata(&key) {
            Some(value) => {
                representative.set_metadata(key, value);
            }
            None => {
                representative.remove_metadata(&key);
            }
        }
    }
}

enum Reconcile {
    Unchanged,
    Incremental { removed: Vec<usize>, added: Vec<usize> },
    Replace,
}

fn reconcile(old: &[Content], new: &[Content], limit: usize) -> Reconcile {
    if old == new {
        return Reconcile::Unchanged;
    }

    let old_ids: HashSet<ContentId> = old.iter().map(Content::id).collect();
    let new_ids: HashSet<ContentId> = new.iter().map(Content::id).collect();

    let kept_before = old.iter().filter(|content| new_ids.contains(&content.id()));
    let kept_after = new.iter().filter(|content| old_ids.contains(&content.id()));
    if !kept_before.eq(kept_after) {
        return Reconcile::Replace;
    }

    let removed: Vec<usize> = (0..old.len())
        .filter(|&index| !new_ids.contains(&old[index].id()))
        .collect();
    let added: Vec<usize> = (0..new.len())
        .filter(|&index| !old_ids.contains(&new[index].id()))
        .collect();

    let delta = removed.len() + added.len();
    let small = if limit > 0 {
        delta < limit
    } else {
        delta <= old.len().max(new.len())
    };

    if small {
        Reconcile::Incremental { removed, added }
    } else {
        Reconcile::Replace
    }
}

/// A read-only model presenting a window over a transformed source.
///
/// Subscribers may change the view's settings, or its source, while handling
/// one of its events. The nested change is applied once the events of the
/// current update have all been emitted, so every event is relative to the
/// window left by the previous one.
///
/// # Example
///
/// ```
/// use medley::content::{Content, MetadataKey};
/// use medley::model::{ContentModel, GenericModel};
/// use medley::view_model::{Filter, ViewModel};
///
/// let source = GenericModel::new();
/// for (title, year) in [("a", "1999"), ("b", "2004"), ("c", "1999"), ("d", "1999")] {
///     source.add_content(
///         Content::new()
///             .with(MetadataKey::Title, title)
///             .with(MetadataKey::Year, year),
///     );
/// }
///
/// let view = ViewModel::new(source.clone());
/// view.set_filter_by(vec![Filter::equals(MetadataKey::Year, "1999")]);
/// view.set_limit(2);
/// view.start_at_offset(1).unwrap();
///
/// let titles: Vec<_> = view.contents().iter().filter_map(Content::title).collect();
/// assert_eq!(titles, ["c", "d"]);
/// ```
pub struct ViewModel {
    id: ModelId,
    source: SharedModel,
    state: Mutex<ViewState>,
    controller: Controller,
    weak_self: Weak<ViewModel>,
}

impl ViewModel {
    /// Create a stopped view over `source` showing everything.
    pub fn new(source: SharedModel) -> Arc<Self> {
        Self::with_config(source, &ViewModelConfig::default())
    }

    /// Create a stopped view from a configuration.
    pub fn with_config(source: SharedModel, config: &ViewModelConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            id: ModelId::next(),
            source,
            state: Mutex::new(ViewState {
                started: false,
                subscription: None,
                mirror: Vec::new(),
                window: Vec::new(),
                filters: Vec::new(),
                group_by: None,
                primary_group_by: None,
                secondary_group_by: None,
                groups: HashMap::new(),
                order_by: None,
                descending: false,
                offset: config.offset,
                limit: config.limit,
                anchor: None,
                looping: config.loop_around,
                title: None,
                generation: 0,
                refreshing: false,
                refresh_pending: false,
            }),
            controller: Controller::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// The model this view projects.
    pub fn source(&self) -> &SharedModel {
        &self.source
    }

    /// Returns `true` between `start*` and `stop`.
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// The active filters.
    pub fn filters(&self) -> Vec<Filter> {
        self.state.lock().filters.clone()
    }

    /// Replace the filters. Content must match all of them.
    pub fn set_filter_by(&self, filters: Vec<Filter>) {
        self.update(|state| {
            if state.filters == filters {
                return false;
            }
            state.filters = filters;
            state.groups.clear();
            true
        });
    }

    /// Remove every filter.
    pub fn clear_filter(&self) {
        self.set_filter_by(Vec::new());
    }

    /// The group key.
    pub fn group_by(&self) -> Option<MetadataKey> {
        self.state.lock().group_by.clone()
    }

    /// Change the group key. `None` disables grouping.
    pub fn set_group_by(&self, key: Option<MetadataKey>) {
        self.update(|state| {
            if state.group_by == key {
                return false;
            }
            state.group_by = key;
            state.groups.clear();
            true
        });
    }

    /// Tell the view its category's group-by keys.
    ///
    /// When the view groups by `primary`, its group representatives drill
    /// down by `secondary`.
    pub fn set_category_group_keys(
        &self,
        primary: Option<MetadataKey>,
        secondary: Option<MetadataKey>,
    ) {
        self.update(|state| {
            if state.primary_group_by == primary && state.secondary_group_by == secondary {
                return false;
            }
            state.primary_group_by = primary;
            state.secondary_group_by = secondary;
            state.groups.clear();
            true
        });
    }

    /// Change the ordering. `None` keeps the source order.
    pub fn set_order_by(&self, key: Option<MetadataKey>, descending: bool) {
        self.update(|state| {
            if state.order_by == key && state.descending == descending {
                return false;
            }
            state.order_by = key;
            state.descending = descending;
            true
        });
    }

    /// The window offset.
    pub fn offset(&self) -> usize {
        self.state.lock().offset
    }

    /// Change the window offset. Clears any start content.
    pub fn set_offset(&self, offset: usize) {
        self.update(|state| {
            if state.offset == offset && state.anchor.is_none() {
                return false;
            }
            state.offset = offset;
            state.anchor = None;
            true
        });
    }

    /// The window size; `0` means unbounded.
    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    /// Change the window size.
    pub fn set_limit(&self, limit: usize) {
        self.update(|state| {
            if state.limit == limit {
                return false;
            }
            state.limit = limit;
            true
        });
    }

    /// The content the window starts at, if any.
    pub fn start_content(&self) -> Option<Content> {
        self.state.lock().anchor.clone()
    }

    /// Start the window at `content` instead of at the offset.
    pub fn set_start_content(&self, content: Option<Content>) {
        self.update(|state| {
            if state.anchor == content {
                return false;
            }
            state.anchor = content;
            true
        });
    }

    /// Whether the window wraps around when starting at a content.
    pub fn looping(&self) -> bool {
        self.state.lock().looping
    }

    /// Change whether the window wraps around.
    pub fn set_loop(&self, looping: bool) {
        self.update(|state| {
            if state.looping == looping {
                return false;
            }
            state.looping = looping;
            true
        });
    }

    /// Override the title reported by the view.
    pub fn set_title(&self, title: Option<String>) {
        self.state.lock().title = title;
    }

    /// Start with the current settings.
    pub fn start(&self) -> Result<()> {
        self.start_locked()
    }

    /// Start with the window at `offset`.
    pub fn start_at_offset(&self, offset: usize) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.started {
                state.offset = offset;
                state.anchor = None;
            }
        }
        self.start_locked()
    }

    /// Start with the window at `content`.
    ///
    /// Fails with [`Error::ContentNotFound`] and stays stopped if `content`
    /// is not part of the transformed source.
    pub fn start_at_content(&self, content: &Content, looping: bool) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !state.started {
                state.anchor = Some(content.clone());
                state.looping = looping;
            }
        }
        self.start_locked()
    }

    fn start_locked(&self) -> Result<()> {
        let shown = {
            let mut state = self.state.lock();
            if state.started {
                tracing::warn!(target: targets::VIEW_MODEL, model = %self.id, "trying to start an already started view model");
                return Err(Error::AlreadyStarted);
            }

            state.mirror = self.source.contents();
            let window = match state.compute_window() {
                Ok(window) => window,
                Err(err) => {
                    tracing::error!(target: targets::VIEW_MODEL, model = %self.id, %err, "start content not found");
                    state.mirror.clear();
                    state.anchor = None;
                    return Err(err);
                }
            };

            let weak = self.weak_self.clone();
            state.subscription = Some(self.source.controller().connect(move |event| {
                if let Some(view) = weak.upgrade() {
                    view.handle_source_event(event);
                }
            }));
            state.started = true;
            state.window = window;
            state.generation += 1;
            state.window.len()
        };

        tracing::debug!(target: targets::VIEW_MODEL, model = %self.id, source = %self.source.id(), shown, "view model started");
        if shown > 0 {
            self.controller.emit(ChangeEvent::Add((0..shown).collect()));
        }
        Ok(())
    }

    /// Stop following the source and empty the window. Idempotent.
    pub fn stop(&self) {
        let had_items = {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            state.started = false;
            if let Some(subscription) = state.subscription.take() {
                self.source.controller().disconnect(subscription);
            }
            state.mirror.clear();
            state.groups.clear();
            state.generation += 1;
            let had_items = !state.window.is_empty();
            state.window.clear();
            had_items
        };

        tracing::debug!(target: targets::VIEW_MODEL, model = %self.id, "view model stopped");
        if had_items {
            self.controller.emit(ChangeEvent::Clear);
        }
    }

    /// Build a stopped view showing the members of `group`.
    ///
    /// Returns `None` if `group` is not a group representative.
    pub fn drill_down(&self, group: &Content) -> Option<Arc<ViewModel>> {
        let filter = group.group_filter()?;

        let mut filters: Vec<Filter> = filter
            .inherited
            .iter()
            .map(|(key, value)| Filter::equals(key.clone(), value.clone()))
            .collect();
        filters.push(Filter::equals(filter.key.clone(), filter.value.clone()));

        let view = ViewModel::new(self.source.clone());
        {
            let state = self.state.lock();
            let mut child = view.state.lock();
            child.filters = filters;
            child.group_by = filter.drill_down_key.clone();
            child.order_by = state.order_by.clone();
            child.descending = state.descending;
        }
        Some(view)
    }

    /// Apply a settings change and refresh if it changed anything.
    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut ViewState) -> bool,
    {
        let refresh = {
            let mut state = self.state.lock();
            change(&mut state) && state.started
        };
        if refresh {
            self.refresh();
        }
    }

    fn refresh(&self) {
        let _span = tracing::trace_span!(target: targets::VIEW_MODEL, "refresh", operation = span_names::VIEW_MODEL_REFRESH).entered();

        loop {
            let (old, new, generation, limit) = {
                let mut state = self.state.lock();
                if state.refreshing {
                    state.refresh_pending = true;
                    return;
                }
                if !state.started {
                    return;
                }
                let new = match state.compute_window() {
                    Ok(window) => window,
                    Err(err) => {
                        tracing::warn!(target: targets::VIEW_MODEL, model = %self.id, %err, "start content left the view");
                        Vec::new()
                    }
                };
                state.refreshing = true;
                state.refresh_pending = false;
                (state.window.clone(), new, state.generation, state.limit)
            };

            self.apply_window(old, new, generation, limit);

            let mut state = self.state.lock();
            state.refreshing = false;
            if !state.refresh_pending {
                return;
            }
            tracing::trace!(target: targets::VIEW_MODEL, model = %self.id, "applying change made during refresh");
        }
    }

    /// Move from `old` to `new`, emitting the events that describe it.
    fn apply_window(&self, old: Vec<Content>, new: Vec<Content>, generation: u64, limit: usize) {
        match reconcile(&old, &new, limit) {
            Reconcile::Unchanged => {}
            Reconcile::Incremental { removed, added } => {
                tracing::trace!(target: targets::VIEW_MODEL, removed = removed.len(), added = added.len(), "incremental window update");
                if !removed.is_empty() {
                    self.controller.emit(ChangeEvent::Remove(removed));
                }

                {
                    let mut state = self.state.lock();
                    if state.generation != generation {
                        // Cleared, replaced or stopped while handling the
                        // removal; that change already reported itself.
                        state.refresh_pending = state.started;
                        return;
                    }
                    state.window = new;
                    state.generation += 1;
                }

                if !added.is_empty() {
                    self.controller.emit(ChangeEvent::Add(added));
                }
            }
            Reconcile::Replace => {
                tracing::trace!(target: targets::VIEW_MODEL, old = old.len(), new = new.len(), "window replaced");
                {
                    let mut state = self.state.lock();
                    state.window = new;
                    state.generation += 1;
                }
                self.controller.emit(ChangeEvent::Replace);
            }
        }
    }

    fn handle_source_event(&self, event: &ChangeEvent) {
        let mut updated = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            tracing::trace!(target: targets::VIEW_MODEL, event = event.name(), "source changed");

            match event {
                ChangeEvent::Add(_) => {
                    for index in event.sorted_indices() {
                        let Some(content) = self.source.get_content(index) else {
                            tracing::warn!(target: targets::VIEW_MODEL, index, "added index out of range");
                            continue;
                        };
                        if state.mirror.contains(&content) {
                            continue;
                        }
                        let at = index.min(state.mirror.len());
                        state.mirror.insert(at, content);
                    }
                }
                ChangeEvent::Remove(_) => {
                    let gone: HashSet<ContentId> = event
                        .sorted_indices()
                        .into_iter()
                        .filter_map(|index| match self.source.get_content(index) {
                            Some(content) => Some(content.id()),
                            None => {
                                tracing::warn!(target: targets::VIEW_MODEL, index, "removed index out of range");
                                None
                            }
                        })
                        .collect();
                    state.mirror.retain(|content| !gone.contains(&content.id()));
                }
                ChangeEvent::Update(_) => {
                    updated = event
                        .sorted_indices()
                        .into_iter()
                        .filter_map(|index| self.source.get_content(index))
                        .collect();
                }
                ChangeEvent::Clear => {
                    state.mirror.clear();
                    state.groups.clear();
                    state.window.clear();
                    state.generation += 1;
                    drop(state);
                    self.controller.emit(ChangeEvent::Clear);
                    return;
                }
                ChangeEvent::Replace => {
                    state.mirror = self.source.contents();
                    let window = state.compute_window().unwrap_or_else(|err| {
                        tracing::warn!(target: targets::VIEW_MODEL, model = %self.id, %err, "start content left the view");
                        Vec::new()
                    });
                    state.window = window;
                    state.generation += 1;
                    drop(state);
                    self.controller.emit(ChangeEvent::Replace);
                    return;
                }
            }
        }

        self.refresh();

        if !updated.is_empty() {
            let indices: Vec<usize> = updated
                .iter()
                .filter_map(|content| self.index_of(content))
                .collect();
            if !indices.is_empty() {
                self.controller.emit(ChangeEvent::Update(indices));
            }
        }
    }

    fn read_only(&self, operation: &str) {
        tracing::warn!(target: targets::VIEW_MODEL, model = %self.id, operation, "view models are read-only");
    }
}

impl ContentModel for ViewModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn get_content(&self, index: usize) -> Option<Content> {
        self.state.lock().window.get(index).cloned()
    }

    fn index_of(&self, content: &Content) -> Option<usize> {
        self.state.lock().window.iter().position(|item| item == content)
    }

    fn len(&self) -> usize {
        self.state.lock().window.len()
    }

    fn contents(&self) -> Vec<Content> {
        self.state.lock().window.clone()
    }

    fn add_content(&self, _content: Content) {
        self.read_only("add_content");
    }

    fn remove_content(&self, _content: &Content) {
        self.read_only("remove_content");
    }

    fn clear(&self) {
        self.read_only("clear");
    }

    fn category(&self) -> Option<String> {
        self.source.category()
    }

    fn priority(&self) -> i32 {
        self.source.priority()
    }

    fn title(&self) -> Option<String> {
        self.state.lock().title.clone().or_else(|| self.source.title())
    }

    fn sort_func(&self) -> Option<SortFunction> {
        None
    }

    fn set_sort_func(&self, _func: Option<SortFunction>) {
        self.read_only("set_sort_func");
    }

    fn controller(&self) -> &Controller {
        &self.controller
    }
}

impl Drop for ViewModel {
    fn drop(&mut self) {
        if let Some(subscription) = self.state.get_mut().subscription.take() {
            self.source.controller().disconnect(subscription);
        }
    }
}

static_assertions::assert_impl_all!(ViewModel: Send, Sync);
