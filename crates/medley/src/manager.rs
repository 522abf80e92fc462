//! The registry of categories and models.
//!
//! A [`ModelManager`] keeps a set of named categories and the models
//! registered under them. Each category owns an [`AggregateModel`] holding
//! the union of its models; every category whose priority is not `-1` is
//! also a child of the root aggregate, ordered by category priority.
//!
//! The manager is an explicitly constructed value rather than a process
//! global. [`ModelManager::shutdown`] tears the registry down, and dropping
//! the manager does the same.

use std::cmp::Reverse;
use std::sync::Arc;

use medley_core::Signal;
use medley_core::logging::targets;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::aggregate_model::AggregateModel;
use crate::config::EngineConfig;
use crate::content::MetadataKey;
use crate::error::{Error, Result};
use crate::model::{ContentModel, ModelId, SharedModel, SortFunction};
use crate::view_model::{ViewModel, ViewModelConfig};

/// Priority of a category that is registered but not shown at the root.
pub const HIDDEN_PRIORITY: i32 = -1;

/// A category registration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryInfo {
    /// Unique name models refer to.
    pub name: String,
    pub display_name: String,
    pub icon_name: Option<String>,
    /// Higher first. [`HIDDEN_PRIORITY`] keeps the category out of the root.
    pub priority: i32,
    /// Text shown while the category has no content.
    pub placeholder_text: Option<String>,
    pub show_length: bool,
    /// Sort function for the category aggregate and its models.
    #[serde(skip)]
    pub sort_func: Option<SortFunction>,
    pub primary_group_by: Option<MetadataKey>,
    pub secondary_group_by: Option<MetadataKey>,
}

impl CategoryInfo {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            priority,
            ..Self::default()
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_sort_func(mut self, sort: SortFunction) -> Self {
        self.sort_func = Some(sort);
        self
    }

    pub fn with_group_by(mut self, primary: MetadataKey, secondary: Option<MetadataKey>) -> Self {
        self.primary_group_by = Some(primary);
        self.secondary_group_by = secondary;
        self
    }

    /// Returns `true` if the category is not shown at the root.
    pub fn is_hidden(&self) -> bool {
        self.priority == HIDDEN_PRIORITY
    }
}

/// What the manager records about a registered model.
#[derive(Clone)]
pub struct ModelInfo {
    pub model: SharedModel,
    pub category: String,
    pub priority: i32,
    /// Sort functions offered for this model.
    pub sort_funcs: Vec<SortFunction>,
    /// Index into `sort_funcs` applied on registration.
    pub default_sort_index: usize,
}

impl ModelInfo {
    /// Describe `model` using its own category and priority.
    pub fn from_model(model: SharedModel) -> Result<Self> {
        let category = model
            .category()
            .ok_or_else(|| Error::ModelWithoutCategory(model.id()))?;
        Ok(Self {
            priority: model.priority(),
            category,
            model,
            sort_funcs: Vec::new(),
            default_sort_index: 0,
        })
    }

    pub fn with_sort_funcs(mut self, sort_funcs: Vec<SortFunction>, default_index: usize) -> Self {
        self.sort_funcs = sort_funcs;
        self.default_sort_index = default_index;
        self
    }

    fn default_sort(&self) -> Option<&SortFunction> {
        self.sort_funcs.get(self.default_sort_index)
    }
}

impl std::fmt::Debug for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInfo")
            .field("model", &self.model.id())
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("sort_funcs", &self.sort_funcs)
            .field("default_sort_index", &self.default_sort_index)
            .finish()
    }
}

struct Category {
    info: CategoryInfo,
    aggregate: Arc<AggregateModel>,
}

#[derive(Default)]
struct Registry {
    /// In registration order.
    categories: Vec<Category>,
    /// Sorted by category priority, then model priority, both descending.
    models: Vec<ModelInfo>,
}

impl Registry {
    fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.info.name == name)
    }

    fn rank(&self, info: &ModelInfo) -> Reverse<(bool, i32, i32)> {
        let category = self.category(&info.category).map(|category| category.info.priority);
        Reverse((category.is_some(), category.unwrap_or(i32::MIN), info.priority))
    }

    fn resort_models(&mut self) {
        let mut models = std::mem::take(&mut self.models);
        models.sort_by_key(|info| self.rank(info));
        self.models = models;
    }
}

/// Registry of categories and models.
///
/// # Example
///
/// ```
/// use medley::content::{Content, MetadataKey};
/// use medley::manager::{CategoryInfo, ModelManager};
/// use medley::model::{ContentModel, GenericModel};
///
/// let manager = ModelManager::new();
/// manager.add_category(CategoryInfo::new("music", 10)).unwrap();
/// manager.add_category(CategoryInfo::new("videos", 20)).unwrap();
///
/// let albums = GenericModel::with_category("music");
/// albums.add_content(Content::new().with(MetadataKey::Title, "Giant Steps"));
/// manager.add_model(albums.clone()).unwrap();
///
/// let root = manager.get_root_model();
/// assert_eq!(root.models().len(), 2);
/// assert_eq!(root.len(), 1);
/// ```
pub struct ModelManager {
    registry: Mutex<Registry>,
    root: Arc<AggregateModel>,
    view_model_config: ViewModelConfig,
    model_added: Signal<SharedModel>,
    model_removed: Signal<(SharedModel, String)>,
    categories_changed: Signal<()>,
}

impl ModelManager {
    /// Create an empty manager.
    pub fn new() -> Arc<Self> {
        Self::with_view_model_config(ViewModelConfig::default())
    }

    /// Create a manager and register the configured categories.
    pub fn from_config(config: &EngineConfig) -> Result<Arc<Self>> {
        let manager = Self::with_view_model_config(config.view_model.clone());
        manager.load_categories(config.categories.iter().cloned())?;
        Ok(manager)
    }

    fn with_view_model_config(view_model_config: ViewModelConfig) -> Arc<Self> {
        let root = AggregateModel::new();
        root.set_title(Some("root".into()));
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            root,
            view_model_config,
            model_added: Signal::new(),
            model_removed: Signal::new(),
            categories_changed: Signal::new(),
        })
    }

    /// Signal emitted after a model was registered.
    pub fn model_added(&self) -> &Signal<SharedModel> {
        &self.model_added
    }

    /// Signal emitted after a model was unregistered, with its category.
    pub fn model_removed(&self) -> &Signal<(SharedModel, String)> {
        &self.model_removed
    }

    /// Signal emitted after a category was added or removed.
    pub fn categories_changed(&self) -> &Signal<()> {
        &self.categories_changed
    }

    /// Register a category.
    ///
    /// Models already registered under the name join the category's
    /// aggregate. Fails with [`Error::DuplicateCategory`] if the name is
    /// taken.
    pub fn add_category(&self, info: CategoryInfo) -> Result<()> {
        let aggregate = AggregateModel::new();
        aggregate.set_category(Some(info.name.clone()));
        aggregate.set_priority(info.priority);
        aggregate.set_title(Some(info.display_name.clone()));
        if let Some(sort) = &info.sort_func {
            aggregate.set_sort_func(Some(sort.clone()));
        }

        let members = {
            let mut registry = self.registry.lock();
            if registry.category(&info.name).is_some() {
                tracing::warn!(target: targets::MANAGER, category = %info.name, "category already exists");
                return Err(Error::DuplicateCategory(info.name));
            }

            let members: Vec<SharedModel> = registry
                .models
                .iter()
                .filter(|model| model.category == info.name)
                .map(|model| model.model.clone())
                .collect();
            registry.categories.push(Category {
                info: info.clone(),
                aggregate: aggregate.clone(),
            });
            registry.resort_models();
            members
        };

        for model in members {
            aggregate.add_model(model);
        }
        if !info.is_hidden() {
            self.root.add_model(aggregate);
        }

        tracing::debug!(target: targets::MANAGER, category = %info.name, priority = info.priority, "category added");
        self.categories_changed.emit(());
        Ok(())
    }

    /// Unregister a category and detach its aggregate from the root.
    ///
    /// The category's models stay registered.
    pub fn remove_category(&self, name: &str) -> Result<()> {
        let removed = {
            let mut registry = self.registry.lock();
            let Some(position) = registry
                .categories
                .iter()
                .position(|category| category.info.name == name)
            else {
                tracing::warn!(target: targets::MANAGER, category = name, "category doesn't exist");
                return Err(Error::UnknownCategory(name.to_string()));
            };
            let removed = registry.categories.remove(position);
            registry.resort_models();
            removed
        };

        if self.root.contains_model(removed.aggregate.as_ref()) {
            self.root.remove_model(removed.aggregate.as_ref());
        }
        removed.aggregate.clear_models();

        tracing::debug!(target: targets::MANAGER, category = name, "category removed");
        self.categories_changed.emit(());
        Ok(())
    }

    /// Register a model under its own category.
    pub fn add_model(&self, model: SharedModel) -> Result<()> {
        let info = ModelInfo::from_model(model).inspect_err(|err| {
            tracing::warn!(target: targets::MANAGER, %err, "cannot register model");
        })?;
        self.add_model_info(info)
    }

    /// Register a model with an explicit record.
    ///
    /// A model without a sort function gets the record's default sort
    /// function, or else its category's.
    pub fn add_model_info(&self, info: ModelInfo) -> Result<()> {
        if info.category.is_empty() {
            tracing::warn!(target: targets::MANAGER, model = %info.model.id(), "cannot register a model without a category");
            return Err(Error::ModelWithoutCategory(info.model.id()));
        }

        let (sort, aggregate) = {
            let mut registry = self.registry.lock();
            if registry.models.iter().any(|existing| existing.model.id() == info.model.id()) {
                tracing::warn!(target: targets::MANAGER, model = %info.model.id(), "model already registered");
                return Ok(());
            }

            let category = registry.category(&info.category);
            let sort = info
                .default_sort()
                .cloned()
                .or_else(|| category.and_then(|category| category.info.sort_func.clone()));
            let aggregate = category.map(|category| category.aggregate.clone());

            let rank = registry.rank(&info);
            let position = registry
                .models
                .partition_point(|existing| registry.rank(existing) <= rank);
            registry.models.insert(position, info.clone());
            (sort, aggregate)
        };

        if info.model.sort_func().is_none() && sort.is_some() {
            info.model.set_sort_func(sort);
        }
        if let Some(aggregate) = aggregate {
            aggregate.add_model(info.model.clone());
        }

        tracing::debug!(target: targets::MANAGER, model = %info.model.id(), category = %info.category, "model added");
        self.model_added.emit(info.model);
        Ok(())
    }

    /// Unregister a model.
    pub fn remove_model(&self, model: &dyn ContentModel) -> Result<()> {
        let (info, aggregate) = {
            let mut registry = self.registry.lock();
            let Some(position) = registry
                .models
                .iter()
                .position(|info| info.model.id() == model.id())
            else {
                tracing::warn!(target: targets::MANAGER, model = %model.id(), "model is unrecognised");
                return Err(Error::UnknownModel(model.id()));
            };
            let info = registry.models.remove(position);
            let aggregate = registry
                .category(&info.category)
                .map(|category| category.aggregate.clone());
            (info, aggregate)
        };

        if let Some(aggregate) = aggregate {
            aggregate.remove_model(info.model.as_ref());
        }

        tracing::debug!(target: targets::MANAGER, model = %info.model.id(), category = %info.category, "model removed");
        self.model_removed.emit((info.model, info.category));
        Ok(())
    }

    /// Register several categories. Every category is tried; the first
    /// failure is returned.
    pub fn load_categories<I>(&self, categories: I) -> Result<()>
    where
        I: IntoIterator<Item = CategoryInfo>,
    {
        let mut first_error = None;
        for info in categories {
            if let Err(err) = self.add_category(info) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Every registered model, by category priority then model priority.
    pub fn get_models(&self) -> Vec<SharedModel> {
        self.registry
            .lock()
            .models
            .iter()
            .map(|info| info.model.clone())
            .collect()
    }

    /// The models of one category, by model priority.
    pub fn get_models_for_category(&self, name: &str) -> Vec<SharedModel> {
        let registry = self.registry.lock();
        let mut models: Vec<&ModelInfo> = registry
            .models
            .iter()
            .filter(|info| info.category == name)
            .collect();
        models.sort_by_key(|info| Reverse(info.priority));
        models.into_iter().map(|info| info.model.clone()).collect()
    }

    /// The record of a registered model.
    pub fn get_model_info(&self, model: &dyn ContentModel) -> Option<ModelInfo> {
        self.registry
            .lock()
            .models
            .iter()
            .find(|info| info.model.id() == model.id())
            .cloned()
    }

    /// Every category, highest priority first.
    pub fn get_categories(&self) -> Vec<CategoryInfo> {
        let registry = self.registry.lock();
        let mut categories: Vec<CategoryInfo> = registry
            .categories
            .iter()
            .map(|category| category.info.clone())
            .collect();
        categories.sort_by_key(|info| Reverse(info.priority));
        categories
    }

    pub fn get_category_info(&self, name: &str) -> Option<CategoryInfo> {
        self.registry
            .lock()
            .category(name)
            .map(|category| category.info.clone())
    }

    /// The aggregate of one category.
    pub fn get_aggregate_model(&self, name: &str) -> Option<Arc<AggregateModel>> {
        self.registry
            .lock()
            .category(name)
            .map(|category| category.aggregate.clone())
    }

    /// The aggregate of every visible category.
    pub fn get_root_model(&self) -> Arc<AggregateModel> {
        self.root.clone()
    }

    /// Create a stopped view over `source`, set up for the source's category.
    pub fn create_view_model(&self, source: SharedModel) -> Arc<ViewModel> {
        let view = ViewModel::with_config(source.clone(), &self.view_model_config);
        if let Some(info) = source
            .category()
            .and_then(|category| self.get_category_info(&category))
        {
            view.set_category_group_keys(info.primary_group_by, info.secondary_group_by);
        }
        view
    }

    /// Unregister every model and category.
    pub fn shutdown(&self) {
        let models = self.get_models();
        for model in &models {
            let _ = self.remove_model(model.as_ref());
        }

        let names: Vec<String> = self
            .registry
            .lock()
            .categories
            .iter()
            .map(|category| category.info.name.clone())
            .collect();
        for name in &names {
            let _ = self.remove_category(name);
        }

        self.root.clear_models();
        tracing::debug!(target: targets::MANAGER, models = models.len(), categories = names.len(), "model manager shut down");
    }

    /// Returns `true` if `model` is registered.
    pub fn contains_model(&self, id: ModelId) -> bool {
        self.registry.lock().models.iter().any(|info| info.model.id() == id)
    }
}

impl Drop for ModelManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

static_assertions::assert_impl_all!(ModelManager: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::model::{GenericModel, sort};

    fn titled(title: &str) -> Content {
        Content::new().with(MetadataKey::Title, title)
    }

    #[test]
    fn test_duplicate_and_unknown_category() {
        let manager = ModelManager::new();
        manager.add_category(CategoryInfo::new("music", 1)).unwrap();

        assert!(matches!(
            manager.add_category(CategoryInfo::new("music", 5)),
            Err(Error::DuplicateCategory(name)) if name == "music"
        ));
        assert_eq!(manager.get_category_info("music").map(|info| info.priority), Some(1));
        assert!(matches!(
            manager.remove_category("videos"),
            Err(Error::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_root_order_and_hidden_category() {
        let manager = ModelManager::new();
        for (name, priority) in [("a", 10), ("b", 5), ("hidden", HIDDEN_PRIORITY), ("c", 20)] {
            manager.add_category(CategoryInfo::new(name, priority)).unwrap();
        }

        let order: Vec<i32> = manager
            .get_root_model()
            .models()
            .iter()
            .map(|model| model.priority())
            .collect();
        assert_eq!(order, [20, 10, 5]);

        let hidden = manager.get_aggregate_model("hidden").unwrap();
        assert!(!manager.get_root_model().contains_model(hidden.as_ref()));

        let names: Vec<String> = manager.get_categories().into_iter().map(|info| info.name).collect();
        assert_eq!(names, ["c", "a", "b", "hidden"]);
    }

    #[test]
    fn test_add_model_requires_category() {
        let manager = ModelManager::new();
        let model = GenericModel::new();

        assert!(matches!(
            manager.add_model(model.clone()),
            Err(Error::ModelWithoutCategory(id)) if id == model.id()
        ));
        assert!(manager.get_models().is_empty());
    }

    #[test]
    fn test_models_sorted_by_category_then_priority() {
        let manager = ModelManager::new();
        manager.add_category(CategoryInfo::new("music", 1)).unwrap();
        manager.add_category(CategoryInfo::new("videos", 2)).unwrap();

        let songs = GenericModel::builder().category("music").priority(9).build();
        let films = GenericModel::builder().category("videos").priority(1).build();
        let shows = GenericModel::builder().category("videos").priority(3).build();
        let stray = GenericModel::builder().category("unregistered").priority(100).build();
        for model in [&songs, &films, &shows, &stray] {
            manager.add_model((*model).clone()).unwrap();
        }

        let order: Vec<ModelId> = manager.get_models().iter().map(|m| m.id()).collect();
        assert_eq!(order, [shows.id(), films.id(), songs.id(), stray.id()]);

        let videos: Vec<ModelId> = manager
            .get_models_for_category("videos")
            .iter()
            .map(|m| m.id())
            .collect();
        assert_eq!(videos, [shows.id(), films.id()]);
    }

    #[test]
    fn test_models_join_category_aggregates() {
        let manager = ModelManager::new();
        let early = GenericModel::with_category("music");
        early.add_content(titled("early"));
        manager.add_model(early.clone()).unwrap();

        manager.add_category(CategoryInfo::new("music", 1)).unwrap();
        let late = GenericModel::with_category("music");
        late.add_content(titled("late"));
        manager.add_model(late.clone()).unwrap();

        let music = manager.get_aggregate_model("music").unwrap();
        assert_eq!(music.models().len(), 2);
        assert_eq!(manager.get_root_model().len(), 2);

        manager.remove_model(early.as_ref()).unwrap();
        assert_eq!(music.len(), 1);
        assert!(matches!(
            manager.remove_model(early.as_ref()),
            Err(Error::UnknownModel(_))
        ));
    }

    #[test]
    fn test_sort_func_inherited_from_category() {
        let manager = ModelManager::new();
        manager
            .add_category(CategoryInfo::new("music", 1).with_sort_func(sort::alphabetical()))
            .unwrap();

        let plain = GenericModel::with_category("music");
        let sorted = GenericModel::builder()
            .category("music")
            .sort_func(sort::most_recent())
            .build();
        manager.add_model(plain.clone()).unwrap();
        manager.add_model(sorted.clone()).unwrap();

        assert_eq!(plain.sort_func().map(|s| s.name), Some("alphabetical".to_string()));
        assert_eq!(sorted.sort_func().map(|s| s.name), Some("most-recent".to_string()));
    }

    #[test]
    fn test_model_info_default_sort() {
        let manager = ModelManager::new();
        let model = GenericModel::with_category("music");
        let info = ModelInfo::from_model(model.clone())
            .unwrap()
            .with_sort_funcs(vec![sort::alphabetical(), sort::most_played()], 1);

        manager.add_model_info(info).unwrap();

        assert_eq!(model.sort_func().map(|s| s.name), Some("most-played".to_string()));
        let recorded = manager.get_model_info(model.as_ref()).unwrap();
        assert_eq!(recorded.sort_funcs.len(), 2);
    }

    #[test]
    fn test_signals() {
        let manager = ModelManager::new();
        let removed = Arc::new(Mutex::new(Vec::new()));
        let changes = Arc::new(Mutex::new(0));
        let removed_clone = removed.clone();
        let changes_clone = changes.clone();
        manager
            .model_removed()
            .connect(move |(model, category)| removed_clone.lock().push((model.id(), category.clone())));
        manager.categories_changed().connect(move |_| *changes_clone.lock() += 1);

        manager.add_category(CategoryInfo::new("music", 1)).unwrap();
        let model = GenericModel::with_category("music");
        manager.add_model(model.clone()).unwrap();
        manager.remove_model(model.as_ref()).unwrap();
        manager.remove_category("music").unwrap();

        assert_eq!(*removed.lock(), vec![(model.id(), "music".to_string())]);
        assert_eq!(*changes.lock(), 2);
        assert!(manager.get_root_model().models().is_empty());
    }

    #[test]
    fn test_create_view_model_uses_category_group_keys() {
        let manager = ModelManager::new();
        manager
            .add_category(
                CategoryInfo::new("music", 1).with_group_by(MetadataKey::Album, Some(MetadataKey::Title)),
            )
            .unwrap();
        let model = GenericModel::with_category("music");
        model.add_content(titled("t").with(MetadataKey::Album, "Blue"));

        let view = manager.create_view_model(model.clone());
        view.set_group_by(Some(MetadataKey::Album));
        view.start().unwrap();

        let group = view.get_content(0).unwrap();
        assert_eq!(
            group.group_filter().and_then(|filter| filter.drill_down_key.clone()),
            Some(MetadataKey::Title)
        );
    }

    #[test]
    fn test_shutdown() {
        let manager = ModelManager::new();
        manager.add_category(CategoryInfo::new("music", 1)).unwrap();
        let model = GenericModel::with_category("music");
        model.add_content(titled("a"));
        manager.add_model(model.clone()).unwrap();

        manager.shutdown();

        assert!(manager.get_models().is_empty());
        assert!(manager.get_categories().is_empty());
        assert!(manager.get_root_model().is_empty());
        assert_eq!(model.controller().subscriber_count(), 0);
    }
}
