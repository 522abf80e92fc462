//! Sort functions for content models.
//!
//! Every built-in comparator lists containers (groups and folders) before
//! plain items, then compares by its own key. Missing values sort first.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::content::{Content, MetadataKey};

/// A comparator over content items.
pub type SortFn = Arc<dyn Fn(&Content, &Content) -> Ordering + Send + Sync>;

/// A named comparator a model can be sorted by.
#[derive(Clone)]
pub struct SortFunction {
    /// Stable identifier, e.g. `"alphabetical"`.
    pub name: String,
    /// Human readable label.
    pub display_name: String,
    /// The comparator itself.
    pub func: SortFn,
}

impl SortFunction {
    /// Create a sort function from a closure.
    pub fn new<F>(name: impl Into<String>, display_name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Content, &Content) -> Ordering + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            func: Arc::new(func),
        }
    }

    /// Compare two items.
    pub fn compare(&self, a: &Content, b: &Content) -> Ordering {
        (self.func)(a, b)
    }

    /// The same comparator with its order reversed.
    pub fn reversed(&self) -> Self {
        let func = Arc::clone(&self.func);
        Self {
            name: format!("{}-reversed", self.name),
            display_name: self.display_name.clone(),
            func: Arc::new(move |a, b| func(a, b).reverse()),
        }
    }
}

impl fmt::Debug for SortFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortFunction")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

fn containers_first(a: &Content, b: &Content) -> Ordering {
    b.is_container().cmp(&a.is_container())
}

fn compare_optional(a: Option<String>, b: Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// Sort by the raw string value of `key`.
pub fn by_key(key: MetadataKey, descending: bool) -> SortFunction {
    let name = format!("by-{key}");
    let display_name = key.to_string();
    SortFunction::new(name, display_name, move |a, b| {
        let ordering = compare_optional(a.get_metadata(&key), b.get_metadata(&key));
        if descending { ordering.reverse() } else { ordering }
    })
}

/// Containers first, then case-insensitive title.
pub fn alphabetical() -> SortFunction {
    SortFunction::new("alphabetical", "Alphabetical", |a, b| {
        containers_first(a, b).then_with(|| {
            compare_optional(
                a.title().map(|t| t.to_lowercase()),
                b.title().map(|t| t.to_lowercase()),
            )
        })
    })
}

/// Containers first, then newest date first.
pub fn most_recent() -> SortFunction {
    SortFunction::new("most-recent", "Most recent", |a, b| {
        containers_first(a, b).then_with(|| {
            compare_optional(
                a.get_metadata(&MetadataKey::Date),
                b.get_metadata(&MetadataKey::Date),
            )
            .reverse()
        })
    })
}

/// Containers first, then highest play count first, then newest.
pub fn most_played() -> SortFunction {
    fn play_count(content: &Content) -> u64 {
        content
            .get_metadata(&MetadataKey::PlayCount)
            .and_then(|count| count.trim().parse().ok())
            .unwrap_or(0)
    }

    let recent = most_recent();
    SortFunction::new("most-played", "Most played", move |a, b| {
        containers_first(a, b)
            .then_with(|| play_count(b).cmp(&play_count(a)))
            .then_with(|| recent.compare(a, b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FOLDER_MIME_TYPE;

    fn titled(title: &str) -> Content {
        Content::new().with(MetadataKey::Title, title)
    }

    fn sorted(mut items: Vec<Content>, sort: &SortFunction) -> Vec<Option<String>> {
        items.sort_by(|a, b| sort.compare(a, b));
        items.iter().map(Content::title).collect()
    }

    #[test]
    fn test_alphabetical_ignores_case_and_puts_folders_first() {
        let folder = titled("zz folder").with(MetadataKey::MimeType, FOLDER_MIME_TYPE);
        let items = vec![titled("beta"), titled("Alpha"), folder, titled("gamma")];

        assert_eq!(
            sorted(items, &alphabetical()),
            vec![
                Some("zz folder".into()),
                Some("Alpha".into()),
                Some("beta".into()),
                Some("gamma".into())
            ]
        );
    }

    #[test]
    fn test_most_recent() {
        let old = titled("old").with(MetadataKey::Date, "2001-01-01");
        let new = titled("new").with(MetadataKey::Date, "2020-06-30");
        let undated = titled("undated");

        assert_eq!(
            sorted(vec![old, undated, new], &most_recent()),
            vec![Some("new".into()), Some("old".into()), Some("undated".into())]
        );
    }

    #[test]
    fn test_most_played_is_numeric() {
        let nine = titled("nine").with(MetadataKey::PlayCount, "9");
        let ten = titled("ten").with(MetadataKey::PlayCount, "10");
        let never = titled("never");

        assert_eq!(
            sorted(vec![never, nine, ten], &most_played()),
            vec![Some("ten".into()), Some("nine".into()), Some("never".into())]
        );
    }

    #[test]
    fn test_by_key_descending_and_reversed() {
        let a = titled("a").with(MetadataKey::Year, "1990");
        let b = titled("b").with(MetadataKey::Year, "2000");

        let desc = by_key(MetadataKey::Year, true);
        assert_eq!(desc.compare(&a, &b), Ordering::Greater);
        assert_eq!(desc.reversed().compare(&a, &b), Ordering::Less);
        assert_eq!(desc.name, "by-year");
    }
}
