//! Content items and their metadata.
//!
//! A [`Content`] is a cheap, cloneable handle to one logical media item. Its
//! identity is a process-unique [`ContentId`] assigned at construction and
//! never reused, so two handles compare equal exactly when they refer to the
//! same item. Metadata is a map of [`MetadataKey`] to string values which can
//! change over the item's lifetime; each change is announced on
//! [`Content::metadata_changed`].
//!
//! # Example
//!
//! ```
//! use medley::content::{Content, MetadataKey};
//!
//! let track = Content::new()
//!     .with(MetadataKey::Title, "So What")
//!     .with(MetadataKey::Album, "Kind of Blue");
//!
//! assert_eq!(track.title().as_deref(), Some("So What"));
//! assert_eq!(track.clone(), track);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use medley_core::Signal;
use medley_core::logging::targets;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Mime type given to group representatives built by [`Content::group`].
pub const GROUP_MIME_TYPE: &str = "x-medley/group";

/// Mime type backends use for browsable containers (directories, shares).
pub const FOLDER_MIME_TYPE: &str = "x-medley/folder";

/// A process-unique, never reused content identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(u64);

impl ContentId {
    /// Get the raw u64 value of this id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

static NEXT_CONTENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_content_id() -> ContentId {
    ContentId(NEXT_CONTENT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Well-known metadata keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    Title,
    SubTitle,
    SeriesName,
    Album,
    Artist,
    Year,
    Date,
    Duration,
    MimeType,
    Id,
    Url,
    Still,
    Synopsis,
    PlayCount,
    LastPlayedDate,
    CreationDate,
    Season,
    Episode,
    /// Any key not covered above.
    Custom(String),
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Title => "title",
            Self::SubTitle => "sub_title",
            Self::SeriesName => "series_name",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Year => "year",
            Self::Date => "date",
            Self::Duration => "duration",
            Self::MimeType => "mime_type",
            Self::Id => "id",
            Self::Url => "url",
            Self::Still => "still",
            Self::Synopsis => "synopsis",
            Self::PlayCount => "play_count",
            Self::LastPlayedDate => "last_played_date",
            Self::CreationDate => "creation_date",
            Self::Season => "season",
            Self::Episode => "episode",
            Self::Custom(name) => name,
        };
        f.write_str(name)
    }
}

/// What a group representative stands for.
///
/// A consumer drilling into a group shows the items matching every
/// `inherited` pair and `key == value`, grouped by `drill_down_key` if set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFilter {
    /// Key the group was built on.
    pub key: MetadataKey,
    /// Value shared by every member of the group.
    pub value: String,
    /// Equality filters that were active when the group was built.
    pub inherited: Vec<(MetadataKey, String)>,
    /// Key to group the members by when drilling in.
    pub drill_down_key: Option<MetadataKey>,
}

impl GroupFilter {
    /// A group filter on `key == value` with nothing inherited.
    pub fn new(key: MetadataKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
            inherited: Vec::new(),
            drill_down_key: None,
        }
    }

    /// Set the inherited equality filters.
    pub fn with_inherited(mut self, inherited: Vec<(MetadataKey, String)>) -> Self {
        self.inherited = inherited;
        self
    }

    /// Set the drill-down grouping key.
    pub fn with_drill_down_key(mut self, key: Option<MetadataKey>) -> Self {
        self.drill_down_key = key;
        self
    }
}

struct ContentInner {
    id: ContentId,
    metadata: RwLock<HashMap<MetadataKey, String>>,
    group_filter: Option<GroupFilter>,
    metadata_changed: Signal<MetadataKey>,
}

/// A shared handle to a content item.
#[derive(Clone)]
pub struct Content {
    inner: Arc<ContentInner>,
}

impl Content {
    /// Create a content item with no metadata.
    pub fn new() -> Self {
        Self::build(None)
    }

    fn build(group_filter: Option<GroupFilter>) -> Self {
        Self {
            inner: Arc::new(ContentInner {
                id: next_content_id(),
                metadata: RwLock::new(HashMap::new()),
                group_filter,
                metadata_changed: Signal::new(),
            }),
        }
    }

    /// Create a group representative.
    ///
    /// The representative carries `title` and the group mime type, and
    /// remembers what it stands for.
    pub fn group(filter: GroupFilter, title: impl Into<String>) -> Self {
        let content = Self::build(Some(filter));
        {
            let mut metadata = content.inner.metadata.write();
            metadata.insert(MetadataKey::Title, title.into());
            metadata.insert(MetadataKey::MimeType, GROUP_MIME_TYPE.to_string());
        }
        content
    }

    /// Builder-style metadata setter. Does not emit.
    pub fn with(self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.inner.metadata.write().insert(key, value.into());
        self
    }

    /// The content's identity.
    pub fn id(&self) -> ContentId {
        self.inner.id
    }

    /// Get a metadata value.
    pub fn get_metadata(&self, key: &MetadataKey) -> Option<String> {
        self.inner.metadata.read().get(key).cloned()
    }

    /// Returns `true` if the key has a value.
    pub fn has(&self, key: &MetadataKey) -> bool {
        self.inner.metadata.read().contains_key(key)
    }

    /// Set a metadata value.
    ///
    /// Emits [`metadata_changed`](Self::metadata_changed) and returns `true`
    /// only if the stored value changed.
    pub fn set_metadata(&self, key: MetadataKey, value: impl Into<String>) -> bool {
        let value = value.into();
        {
            let mut metadata = self.inner.metadata.write();
            if metadata.get(&key) == Some(&value) {
                return false;
            }
            metadata.insert(key.clone(), value);
        }

        tracing::trace!(target: targets::CONTENT, id = %self.id(), %key, "metadata changed");
        self.inner.metadata_changed.emit(key);
        true
    }

    /// Remove a metadata value, emitting if one was present.
    pub fn remove_metadata(&self, key: &MetadataKey) -> bool {
        if self.inner.metadata.write().remove(key).is_none() {
            return false;
        }
        self.inner.metadata_changed.emit(key.clone());
        true
    }

    /// A snapshot of every metadata entry.
    pub fn metadata(&self) -> HashMap<MetadataKey, String> {
        self.inner.metadata.read().clone()
    }

    /// The title, if set.
    pub fn title(&self) -> Option<String> {
        self.get_metadata(&MetadataKey::Title)
    }

    /// The mime type, if set.
    pub fn mime_type(&self) -> Option<String> {
        self.get_metadata(&MetadataKey::MimeType)
    }

    /// Returns `true` for group representatives.
    pub fn is_group(&self) -> bool {
        self.inner.group_filter.is_some()
    }

    /// Returns `true` for group representatives and folder-like items.
    pub fn is_container(&self) -> bool {
        self.is_group() || self.mime_type().as_deref() == Some(FOLDER_MIME_TYPE)
    }

    /// For group representatives, what the group stands for.
    pub fn group_filter(&self) -> Option<&GroupFilter> {
        self.inner.group_filter.as_ref()
    }

    /// Signal emitted with the key whenever a metadata value changes.
    pub fn metadata_changed(&self) -> &Signal<MetadataKey> {
        &self.inner.metadata_changed
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Content {}

impl Hash for Content {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("id", &self.inner.id)
            .field("title", &self.title())
            .finish()
    }
}

static_assertions::assert_impl_all!(Content: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_identity_is_per_instance() {
        let a = Content::new().with(MetadataKey::Title, "Same");
        let b = Content::new().with(MetadataKey::Title, "Same");

        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_set_emits_only_on_change() {
        let content = Content::new();
        let keys = Arc::new(Mutex::new(Vec::new()));

        let keys_clone = keys.clone();
        content.metadata_changed().connect(move |key| {
            keys_clone.lock().push(key.clone());
        });

        assert!(content.set_metadata(MetadataKey::Year, "1959"));
        assert!(!content.set_metadata(MetadataKey::Year, "1959"));
        assert!(content.set_metadata(MetadataKey::Year, "1960"));
        assert!(content.remove_metadata(&MetadataKey::Year));
        assert!(!content.remove_metadata(&MetadataKey::Year));

        assert_eq!(
            *keys.lock(),
            vec![MetadataKey::Year, MetadataKey::Year, MetadataKey::Year]
        );
    }

    #[test]
    fn test_group_representative() {
        let filter = GroupFilter::new(MetadataKey::Album, "Kind of Blue")
            .with_drill_down_key(Some(MetadataKey::Title));
        let group = Content::group(filter.clone(), "Kind of Blue");

        assert!(group.is_group());
        assert!(group.is_container());
        assert_eq!(group.mime_type().as_deref(), Some(GROUP_MIME_TYPE));
        assert_eq!(group.group_filter(), Some(&filter));
        assert!(group.group_filter().is_some_and(|f| f.inherited.is_empty()));
        assert!(!Content::new().is_group());
    }

    #[test]
    fn test_metadata_key_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            key: MetadataKey,
        }

        let parsed: Wrapper = toml::from_str("key = \"series_name\"").unwrap();
        assert_eq!(parsed.key, MetadataKey::SeriesName);
        assert_eq!(MetadataKey::PlayCount.to_string(), "play_count");
        assert_eq!(MetadataKey::Custom("rating".into()).to_string(), "rating");
    }
}
