//! Change notification for content models.
//!
//! Every model owns one [`Controller`]. Mutations are announced as
//! [`ChangeEvent`]s whose indices refer to positions in the emitting model:
//!
//! | Event | Emitted | Indices resolve against |
//! |-------|---------|-------------------------|
//! | `Add` | after the mutation | the new contents |
//! | `Remove` | before the mutation | the contents about to be removed |
//! | `Update` | after the change | the current contents |
//! | `Clear` | after the mutation | (none) |
//! | `Replace` | after the mutation | (none) |
//!
//! Emitting `Remove` first lets a subscriber resolve each index through the
//! source's `get_content` while handling the event.

use medley_core::{ConnectionId, Signal};

/// A change to a model's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Items were inserted at these positions.
    Add(Vec<usize>),
    /// Items at these positions are about to be removed.
    Remove(Vec<usize>),
    /// Items at these positions changed metadata.
    Update(Vec<usize>),
    /// Every item was removed.
    Clear,
    /// The contents were rebuilt wholesale.
    Replace,
}

impl ChangeEvent {
    /// The indices carried by the event, sorted ascending and deduplicated.
    ///
    /// `Clear` and `Replace` carry no indices.
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut indices = match self {
            Self::Add(indices) | Self::Remove(indices) | Self::Update(indices) => indices.clone(),
            Self::Clear | Self::Replace => Vec::new(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Short name used in log output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Remove(_) => "remove",
            Self::Update(_) => "update",
            Self::Clear => "clear",
            Self::Replace => "replace",
        }
    }
}

/// The ordered change stream of one model.
#[derive(Default)]
pub struct Controller {
    changed: Signal<ChangeEvent>,
}

impl Controller {
    /// Create a controller with no subscribers.
    pub fn new() -> Self {
        Self {
            changed: Signal::new(),
        }
    }

    /// Subscribe to change events.
    pub fn connect<F>(&self, observer: F) -> ConnectionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.changed.connect(observer)
    }

    /// Remove a subscriber. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.changed.disconnect(id)
    }

    /// Deliver an event to every subscriber in subscription order.
    pub fn emit(&self, event: ChangeEvent) {
        self.changed.emit(event);
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.changed.connection_count()
    }
}

static_assertions::assert_impl_all!(Controller: Send, Sync);
