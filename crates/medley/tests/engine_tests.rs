//! End-to-end tests: backends registered with a manager, browsed through
//! aggregates and view models, materialized by proxies.

use std::io::Write;
use std::sync::Arc;

use medley::prelude::*;
use medley::view_model::ViewModelConfig;
use parking_lot::Mutex;

const CONFIG: &str = r#"
[proxy]
limit = 4
time_slice_ms = 5

[view_model]
limit = 2

[[categories]]
name = "music"
display_name = "Music"
priority = 10
primary_group_by = "album"
secondary_group_by = "title"

[[categories]]
name = "videos"
display_name = "Videos"
priority = 20

[[categories]]
name = "search"
priority = -1
"#;

type Tiles = Arc<Mutex<Vec<Arc<Materialized<String>>>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn track(album: &str, title: &str) -> Content {
    Content::new()
        .with(MetadataKey::Title, title)
        .with(MetadataKey::Album, album)
}

fn load_config() -> EngineConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    EngineConfig::load(file.path()).unwrap()
}

fn attach(proxy: &Proxy<String>) -> Tiles {
    proxy.set_factory(|content: &Content| content.title().unwrap_or_default());
    let tiles: Tiles = Arc::new(Mutex::new(Vec::new()));
    let created = tiles.clone();
    proxy
        .object_created()
        .connect(move |(_, tile)| created.lock().push(tile.clone()));
    let removed = tiles.clone();
    proxy
        .object_removed()
        .connect(move |(_, tile)| removed.lock().retain(|kept| !Arc::ptr_eq(kept, tile)));
    tiles
}

fn tile_titles(tiles: &Tiles) -> Vec<String> {
    let mut titles: Vec<String> = tiles.lock().iter().map(|tile| tile.object().clone()).collect();
    titles.sort();
    titles
}

#[test]
fn test_backends_to_proxy() {
    init_tracing();
    let config = load_config();
    let context = MainContext::new();
    let manager = ModelManager::from_config(&config).unwrap();

    let albums = GenericModel::with_category("music");
    albums.add_contents([track("Blue", "So What"), track("Blue", "Freddie Freeloader")]);
    let films = GenericModel::with_category("videos");
    films.add_content(Content::new().with(MetadataKey::Title, "Metropolis"));
    manager.add_model(albums.clone()).unwrap();
    manager.add_model(films.clone()).unwrap();

    let root = manager.get_root_model();
    let categories: Vec<Option<String>> = root.models().iter().map(|model| model.category()).collect();
    assert_eq!(categories, [Some("videos".to_string()), Some("music".to_string())]);
    assert_eq!(root.len(), 3);

    let proxy: Arc<Proxy<String>> = Proxy::with_config(context.clone(), &config.proxy);
    proxy.set_model(Some(root.clone()));
    let tiles = attach(&proxy);
    proxy.start().unwrap();
    context.run_until_idle(100);
    assert_eq!(tile_titles(&tiles), ["Freddie Freeloader", "Metropolis", "So What"]);

    // A backend change travels through both aggregates.
    let added = track("Kind of Blue", "All Blues");
    albums.add_content(added.clone());
    context.run_until_idle(100);
    assert_eq!(tiles.lock().len(), 4);
    let music = manager.get_aggregate_model("music").unwrap();
    assert_eq!(music.get_model_for_content(&added).map(|m| m.id()), Some(albums.id()));

    // At the limit, further content waits in the backlog.
    films.add_content(Content::new().with(MetadataKey::Title, "Nosferatu"));
    context.run_until_idle(100);
    assert_eq!(tiles.lock().len(), 4);
    assert_eq!(proxy.backlog().len(), 1);

    // Unregistering a model removes its objects and promotes the backlog.
    manager.remove_model(albums.as_ref()).unwrap();
    context.run_until_idle(100);
    assert_eq!(tile_titles(&tiles), ["Metropolis", "Nosferatu"]);
    assert!(proxy.backlog().is_empty());
}

#[test]
fn test_hidden_category_collects_models() {
    init_tracing();
    let manager = ModelManager::from_config(&load_config()).unwrap();
    let results = GenericModel::with_category("search");
    results.add_content(Content::new().with(MetadataKey::Title, "hit"));
    manager.add_model(results.clone()).unwrap();

    let search = manager.get_aggregate_model("search").unwrap();
    assert_eq!(search.len(), 1);
    assert!(manager.get_root_model().is_empty());
    assert_eq!(
        manager.get_categories().iter().map(|info| info.name.as_str()).collect::<Vec<_>>(),
        ["videos", "music", "search"]
    );
}

#[test]
fn test_grouped_view_with_drill_down() {
    init_tracing();
    let config = load_config();
    let context = MainContext::new();
    let manager = ModelManager::from_config(&config).unwrap();

    let library = GenericModel::with_category("music");
    library.add_contents([
        track("Blue", "So What"),
        track("Giant Steps", "Naima"),
        track("Blue", "Blue in Green"),
        track("Ascension", "Ascension"),
    ]);
    manager.add_model(library.clone()).unwrap();

    let view = manager.create_view_model(manager.get_aggregate_model("music").unwrap());
    view.set_group_by(Some(MetadataKey::Album));
    view.start().unwrap();
    assert_eq!(view.limit(), 2);
    let groups: Vec<String> = view.contents().iter().filter_map(Content::title).collect();
    assert_eq!(groups, ["Blue", "Giant Steps"]);

    let proxy: Arc<Proxy<String>> = Proxy::new(context.clone());
    proxy.set_model(Some(view.clone()));
    let tiles = attach(&proxy);
    proxy.start().unwrap();
    context.run_until_idle(100);
    assert_eq!(tile_titles(&tiles), ["Blue", "Giant Steps"]);

    // Scrolling the window moves the objects with it.
    view.set_offset(1);
    context.run_until_idle(100);
    assert_eq!(tile_titles(&tiles), ["Ascension", "Giant Steps"]);

    // Drilling into a group lists its members, grouped by the secondary key.
    assert!(view.drill_down(&library.get_content(0).unwrap()).is_none());
    let giant_steps = view.get_content(0).unwrap();
    let inner = view.drill_down(&giant_steps).unwrap();
    inner.start().unwrap();
    let members: Vec<String> = inner.contents().iter().filter_map(Content::title).collect();
    assert_eq!(members, ["Naima"]);
    assert!(inner.get_content(0).unwrap().is_group());
}

#[test]
fn test_looping_view_over_backend() {
    init_tracing();
    let source = GenericModel::new();
    let contents: Vec<Content> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|title| Content::new().with(MetadataKey::Title, title))
        .collect();
    source.add_contents(contents.clone());

    let view = ViewModel::with_config(
        source.clone(),
        &ViewModelConfig {
            offset: 0,
            limit: 3,
            loop_around: true,
        },
    );
    view.start_at_content(&contents[3], true).unwrap();
    let titles: Vec<String> = view.contents().iter().filter_map(Content::title).collect();
    assert_eq!(titles, ["d", "e", "a"]);

    source.remove_content(&contents[4]);
    let titles: Vec<String> = view.contents().iter().filter_map(Content::title).collect();
    assert_eq!(titles, ["d", "a", "b"]);

    source.remove_content(&contents[3]);
    assert!(view.is_empty());
    assert!(view.is_started());
}

#[test]
fn test_clear_then_replace_through_aggregates() {
    init_tracing();
    let context = MainContext::new();
    let manager = ModelManager::new();
    manager.add_category(CategoryInfo::new("music", 1)).unwrap();
    let albums = GenericModel::with_category("music");
    let contents: Vec<Content> = ["x", "y"]
        .into_iter()
        .map(|title| Content::new().with(MetadataKey::Title, title))
        .collect();
    albums.add_contents(contents.clone());
    manager.add_model(albums.clone()).unwrap();

    let proxy: Arc<Proxy<String>> = Proxy::new(context.clone());
    proxy.set_model(Some(manager.get_root_model()));
    let tiles = attach(&proxy);
    proxy.start().unwrap();
    context.run_until_idle(100);
    let before = tiles.lock().clone();

    albums.clear();
    albums.replace_contents(contents.clone());
    context.run_until_idle(100);

    let after = tiles.lock().clone();
    assert_eq!(after.len(), 2);
    for tile in &before {
        assert!(after.iter().any(|kept| Arc::ptr_eq(kept, tile)));
    }
}

#[test]
fn test_manager_shutdown_releases_everything() {
    init_tracing();
    let context = MainContext::new();
    let manager = ModelManager::from_config(&load_config()).unwrap();
    let films = GenericModel::with_category("videos");
    films.add_content(Content::new().with(MetadataKey::Title, "Metropolis"));
    manager.add_model(films.clone()).unwrap();

    let proxy: Arc<Proxy<String>> = Proxy::new(context.clone());
    proxy.set_model(Some(manager.get_root_model()));
    let tiles = attach(&proxy);
    proxy.start().unwrap();
    context.run_until_idle(100);
    assert_eq!(tiles.lock().len(), 1);

    let removed = Arc::new(Mutex::new(Vec::new()));
    let removed_clone = removed.clone();
    manager
        .model_removed()
        .connect(move |(_, category)| removed_clone.lock().push(category.clone()));

    manager.shutdown();
    context.run_until_idle(100);

    assert_eq!(*removed.lock(), ["videos"]);
    assert!(tiles.lock().is_empty());
    assert_eq!(films.controller().subscriber_count(), 0);
}
