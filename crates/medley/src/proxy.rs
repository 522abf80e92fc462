//! Lazy, bounded materialization of UI objects.
//!
//! A [`Proxy`] watches one [`ContentModel`] and keeps at most one
//! materialized object per visible content, built by an [`ObjectFactory`].
//! With a limit set, content beyond the limit waits in a FIFO backlog and is
//! promoted as visible content is removed.
//!
//! Object creation is time-sliced: the proxy creates objects inline while the
//! current slice has budget left, then queues the rest and drains the queue
//! from an idle source on the shared [`MainContext`], one slice per turn.
//!
//! The proxy never owns what it creates. Objects are handed out through
//! [`Proxy::object_created`] as `Arc<Materialized<O>>` and the proxy only
//! keeps a weak reference. Once every strong reference is gone the proxy
//! forgets the mapping (on its next access) and the slot becomes free.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use medley::content::{Content, MetadataKey};
//! use medley::model::{ContentModel, GenericModel};
//! use medley::proxy::Proxy;
//! use medley_core::MainContext;
//!
//! let context = MainContext::new();
//! let model = GenericModel::new();
//! for title in ["one", "two", "three"] {
//!     model.add_content(Content::new().with(MetadataKey::Title, title));
//! }
//!
//! let proxy: Arc<Proxy<String>> = Proxy::new(context.clone());
//! proxy.set_model(Some(model.clone()));
//! proxy.set_factory(|content: &Content| content.title().unwrap_or_default());
//! proxy.set_limit(2);
//!
//! // The container keeps the objects alive.
//! let shown = Arc::new(Mutex::new(Vec::new()));
//! let shown_clone = shown.clone();
//! proxy.object_created().connect(move |(_, object)| shown_clone.lock().push(object.clone()));
//!
//! proxy.start().unwrap();
//! context.run_until_idle(100);
//!
//! assert_eq!(shown.lock().len(), 2);
//! assert_eq!(proxy.backlog().len(), 1);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use medley_core::logging::{span_names, targets};
use medley_core::{
    ConnectionId, IdleControl, IdleSourceId, MainContext, PerfSpan, Signal, TimeSlice,
    DEFAULT_SLICE_BUDGET,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::content::{Content, ContentId};
use crate::controller::ChangeEvent;
use crate::error::{Error, Result};
use crate::model::{ContentModel, SharedModel};

/// Builds a UI object for a content item.
///
/// Factories must not call back into the proxy or mutate its model.
pub trait ObjectFactory<O>: Send + Sync {
    /// Create the object for `content`.
    fn create(&self, content: &Content) -> O;
}

impl<O, F> ObjectFactory<O> for F
where
    F: Fn(&Content) -> O + Send + Sync,
{
    fn create(&self, content: &Content) -> O {
        self(content)
    }
}

/// Proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Maximum number of visible items; `0` means unbounded.
    pub limit: usize,
    /// Budget of one materialization slice, in milliseconds.
    pub time_slice_ms: u64,
}

impl ProxyConfig {
    /// The slice budget as a duration.
    pub fn time_slice_budget(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            time_slice_ms: DEFAULT_SLICE_BUDGET.as_millis() as u64,
        }
    }
}

/// An object created by a [`Proxy`], together with its content.
///
/// Dereferences to the object. Dropping the last strong reference tells the
/// proxy the object is gone.
pub struct Materialized<O> {
    content: Content,
    serial: u64,
    object: O,
    reaper: Sender<(ContentId, u64)>,
}

impl<O> Materialized<O> {
    /// The content this object represents.
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// The wrapped object.
    pub fn object(&self) -> &O {
        &self.object
    }
}

impl<O> Deref for Materialized<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.object
    }
}

impl<O> Drop for Materialized<O> {
    fn drop(&mut self) {
        // The proxy may already be gone; nothing to tell then.
        let _ = self.reaper.send((self.content.id(), self.serial));
    }
}

impl<O: fmt::Debug> fmt::Debug for Materialized<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Materialized")
            .field("content", &self.content.id())
            .field("serial", &self.serial)
            .field("object", &self.object)
            .finish()
    }
}

/// Payload of [`Proxy::object_created`] and [`Proxy::object_removed`].
pub type ObjectEvent<O> = (Content, Arc<Materialized<O>>);

struct Slot<O> {
    object: Weak<Materialized<O>>,
    serial: u64,
}

enum Notice<O> {
    Created(Content, Arc<Materialized<O>>),
    Removed(Content, Arc<Materialized<O>>),
}

struct ProxyState<O> {
    model: Option<SharedModel>,
    factory: Option<Arc<dyn ObjectFactory<O>>>,
    limit: usize,
    started: bool,
    anchor: Option<Content>,
    looping: bool,
    subscription: Option<ConnectionId>,
    /// Content occupying a slot, in admission order.
    admitted: Vec<Content>,
    objects: HashMap<ContentId, Slot<O>>,
    pending: VecDeque<Content>,
    backlog: VecDeque<Content>,
    /// Objects detached by a clear, reclaimable by a following replace.
    retired: HashMap<ContentId, Arc<Materialized<O>>>,
    retired_order: Vec<ContentId>,
    idle: Option<IdleSourceId>,
    slice: TimeSlice,
    next_serial: u64,
}

impl<O> ProxyState<O> {
    fn tracks(&self, content: &Content) -> bool {
        self.admitted.contains(content) || self.backlog.contains(content)
    }

    fn is_full(&self) -> bool {
        self.limit > 0 && self.admitted.len() >= self.limit
    }
}

/// Materializes objects for the contents of a model.
///
/// See the [module documentation](self) for an overview.
pub struct Proxy<O: Send + Sync + 'static> {
    state: Mutex<ProxyState<O>>,
    context: Arc<MainContext>,
    reaper_tx: Sender<(ContentId, u64)>,
    reaper_rx: Receiver<(ContentId, u64)>,
    object_created: Signal<ObjectEvent<O>>,
    object_removed: Signal<ObjectEvent<O>>,
    weak_self: Weak<Proxy<O>>,
}

impl<O: Send + Sync + 'static> Proxy<O> {
    /// Create a proxy with default settings.
    pub fn new(context: Arc<MainContext>) -> Arc<Self> {
        Self::with_config(context, &ProxyConfig::default())
    }

    /// Create a proxy from a configuration.
    pub fn with_config(context: Arc<MainContext>, config: &ProxyConfig) -> Arc<Self> {
        let (reaper_tx, reaper_rx) = crossbeam_channel::unbounded();
        Arc::new_cyclic(|weak_self| Self {
            state: Mutex::new(ProxyState {
                model: None,
                factory: None,
                limit: config.limit,
                started: false,
                anchor: None,
                looping: false,
                subscription: None,
                admitted: Vec::new(),
                objects: HashMap::new(),
                pending: VecDeque::new(),
                backlog: VecDeque::new(),
                retired: HashMap::new(),
                retired_order: Vec::new(),
                idle: None,
                slice: TimeSlice::new(config.time_slice_budget()),
                next_serial: 0,
            }),
            context,
            reaper_tx,
            reaper_rx,
            object_created: Signal::new(),
            object_removed: Signal::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Signal emitted after an object was created for a content.
    pub fn object_created(&self) -> &Signal<ObjectEvent<O>> {
        &self.object_created
    }

    /// Signal emitted when the proxy stops tracking a live object.
    pub fn object_removed(&self) -> &Signal<ObjectEvent<O>> {
        &self.object_removed
    }

    /// The source model.
    pub fn model(&self) -> Option<SharedModel> {
        self.state.lock().model.clone()
    }

    /// Change the source model, restarting if started.
    pub fn set_model(&self, model: Option<SharedModel>) {
        let was_started = self.is_started();
        if was_started {
            self.stop();
        }
        self.state.lock().model = model;
        if was_started {
            let _ = self.start();
        }
    }

    /// Change the object factory. Affects objects created from now on.
    pub fn set_factory<F>(&self, factory: F)
    where
        F: ObjectFactory<O> + 'static,
    {
        self.state.lock().factory = Some(Arc::new(factory));
    }

    /// The visible-item limit; `0` means unbounded.
    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    /// Change the visible-item limit.
    ///
    /// While started, a larger limit promotes content from the backlog and
    /// a smaller one moves the most recently admitted content back to the
    /// front of the backlog.
    pub fn set_limit(&self, limit: usize) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock();
            self.reap(&mut state);
            state.limit = limit;

            if state.started {
                while !state.is_full() {
                    let Some(next) = state.backlog.pop_front() else {
                        break;
                    };
                    self.admit(&mut state, next, &mut notices);
                }

                while limit > 0 && state.admitted.len() > limit {
                    let Some(content) = state.admitted.pop() else {
                        break;
                    };
                    state.pending.retain(|queued| *queued != content);
                    Self::release(&mut state, &content, &mut notices);
                    state.backlog.push_front(content);
                }
            }
        }
        self.dispatch(notices);
    }

    /// Returns `true` between `start*` and `stop`.
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Number of live materialized objects.
    pub fn len(&self) -> usize {
        let mut state = self.state.lock();
        self.reap(&mut state);
        state.objects.values().filter(|slot| slot.object.strong_count() > 0).count()
    }

    /// Returns `true` if no object is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of admitted items still waiting for their object.
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Content held back by the limit, in promotion order.
    pub fn backlog(&self) -> Vec<Content> {
        self.state.lock().backlog.iter().cloned().collect()
    }

    /// Content occupying a slot, in admission order.
    ///
    /// Includes content whose object is still pending.
    pub fn visible_contents(&self) -> Vec<Content> {
        let mut state = self.state.lock();
        self.reap(&mut state);
        state.admitted.clone()
    }

    /// The live object for `content`, if any.
    pub fn object_for(&self, content: &Content) -> Option<Arc<Materialized<O>>> {
        let mut state = self.state.lock();
        self.reap(&mut state);
        state.objects.get(&content.id()).and_then(|slot| slot.object.upgrade())
    }

    /// Start from the first item of the model.
    pub fn start(&self) -> Result<()> {
        self.start_at(None, false)
    }

    /// Start from `anchor`, optionally wrapping around to the items before
    /// it.
    ///
    /// Fails without subscribing if already started, if no model or
    /// factory is set, or if `anchor` is not in the model.
    pub fn start_at(&self, anchor: Option<&Content>, looping: bool) -> Result<()> {
        let mut notices = Vec::new();
        let result = {
            let mut state = self.state.lock();
            self.start_locked(&mut state, anchor, looping, &mut notices)
        };
        self.dispatch(notices);
        result
    }

    fn start_locked(
        &self,
        state: &mut ProxyState<O>,
        anchor: Option<&Content>,
        looping: bool,
        notices: &mut Vec<Notice<O>>,
    ) -> Result<()> {
        self.reap(state);

        if state.started {
            tracing::warn!(target: targets::PROXY, "trying to start an already started proxy");
            return Err(Error::AlreadyStarted);
        }
        let Some(model) = state.model.clone() else {
            tracing::warn!(target: targets::PROXY, "cannot start a proxy without a model");
            return Err(Error::NoModel);
        };
        if state.factory.is_none() {
            tracing::warn!(target: targets::PROXY, "cannot start a proxy without an object factory");
            return Err(Error::NoFactory);
        }

        let order = match start_order(model.as_ref(), anchor, looping) {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(target: targets::PROXY, model = %model.id(), %err, "start anchor not found");
                return Err(err);
            }
        };

        self.flush_retired(state, notices);
        for content in std::mem::take(&mut state.admitted) {
            Self::release(state, &content, notices);
        }
        state.objects.clear();

        state.anchor = anchor.cloned();
        state.looping = looping;
        state.started = true;

        for content in order {
            self.admit(state, content, notices);
        }

        let weak = self.weak_self.clone();
        state.subscription = Some(model.controller().connect(move |event| {
            if let Some(proxy) = weak.upgrade() {
                proxy.handle_event(event);
            }
        }));

        tracing::debug!(
            target: targets::PROXY,
            model = %model.id(),
            limit = state.limit,
            admitted = state.admitted.len(),
            backlog = state.backlog.len(),
            "proxy started"
        );
        Ok(())
    }

    /// Unsubscribe from the model and discard queued work.
    ///
    /// Objects already created stay alive. Safe to call at any time.
    pub fn stop(&self) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock();
            self.stop_locked(&mut state, &mut notices);
        }
        self.dispatch(notices);
    }

    fn stop_locked(&self, state: &mut ProxyState<O>, notices: &mut Vec<Notice<O>>) {
        self.reap(state);
        self.flush_retired(state, notices);

        if !state.started {
            return;
        }

        if let (Some(model), Some(subscription)) = (state.model.as_ref(), state.subscription.take()) {
            model.controller().disconnect(subscription);
        }
        if let Some(idle) = state.idle.take() {
            let _ = self.context.remove_idle(idle);
        }

        let pending: HashSet<ContentId> = state.pending.drain(..).map(|content| content.id()).collect();
        state.admitted.retain(|content| !pending.contains(&content.id()));
        state.backlog.clear();
        state.started = false;

        tracing::debug!(target: targets::PROXY, discarded = pending.len(), "proxy stopped");
    }

    fn handle_event(&self, event: &ChangeEvent) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            let Some(model) = state.model.clone() else {
                return;
            };
            self.reap(&mut state);

            tracing::trace!(target: targets::PROXY, event = event.name(), "source changed");

            match event {
                ChangeEvent::Add(_) => {
                    self.flush_retired(&mut state, &mut notices);
                    for index in event.sorted_indices() {
                        let Some(content) = model.get_content(index) else {
                            tracing::warn!(target: targets::PROXY, index, "added index out of range");
                            continue;
                        };
                        if !state.tracks(&content) {
                            self.admit(&mut state, content, &mut notices);
                        }
                    }
                }
                ChangeEvent::Remove(_) => {
                    self.flush_retired(&mut state, &mut notices);
                    let mut freed = 0;
                    for index in event.sorted_indices() {
                        let Some(content) = model.get_content(index) else {
                            tracing::warn!(target: targets::PROXY, index, "removed index out of range");
                            continue;
                        };
                        if Self::forget(&mut state, &content, &mut notices) {
                            freed += 1;
                        }
                    }
                    for _ in 0..freed {
                        let Some(next) = state.backlog.pop_front() else {
                            break;
                        };
                        self.admit(&mut state, next, &mut notices);
                    }
                }
                ChangeEvent::Update(_) => {
                    self.flush_retired(&mut state, &mut notices);
                }
                ChangeEvent::Clear => {
                    self.flush_retired(&mut state, &mut notices);
                    Self::retire_all(&mut state);
                    if !state.retired.is_empty() {
                        self.ensure_idle(&mut state);
                    }
                }
                ChangeEvent::Replace => {
                    Self::retire_all(&mut state);
                    let order = replace_order(model.as_ref(), state.anchor.as_ref(), state.looping);
                    for content in order {
                        self.admit(&mut state, content, &mut notices);
                    }
                    self.flush_retired(&mut state, &mut notices);
                }
            }
        }
        self.dispatch(notices);
    }

    /// Give `content` a slot, or queue it in the backlog if none is free.
    fn admit(&self, state: &mut ProxyState<O>, content: Content, notices: &mut Vec<Notice<O>>) {
        if state.is_full() {
            state.backlog.push_back(content);
            return;
        }

        state.admitted.push(content.clone());

        if let Some(object) = state.retired.remove(&content.id()) {
            state.objects.insert(
                content.id(),
                Slot {
                    object: Arc::downgrade(&object),
                    serial: object.serial,
                },
            );
            return;
        }

        self.ensure_idle(state);
        if state.pending.is_empty() && state.slice.has_time() {
            self.materialize(state, content, notices);
            state.slice.record();
        } else {
            state.pending.push_back(content);
        }
    }

    fn materialize(&self, state: &mut ProxyState<O>, content: Content, notices: &mut Vec<Notice<O>>) {
        let Some(factory) = state.factory.clone() else {
            tracing::warn!(target: targets::PROXY, content = %content.id(), "no factory, skipping object creation");
            return;
        };

        state.next_serial += 1;
        let serial = state.next_serial;
        let object = Arc::new(Materialized {
            object: factory.create(&content),
            content: content.clone(),
            serial,
            reaper: self.reaper_tx.clone(),
        });

        state.objects.insert(
            content.id(),
            Slot {
                object: Arc::downgrade(&object),
                serial,
            },
        );
        notices.push(Notice::Created(content, object));
    }

    /// Drop `content` from every queue. Returns `true` if it held a slot.
    fn forget(state: &mut ProxyState<O>, content: &Content, notices: &mut Vec<Notice<O>>) -> bool {
        let Some(position) = state.admitted.iter().position(|admitted| admitted == content) else {
            state.backlog.retain(|queued| queued != content);
            return false;
        };

        state.admitted.remove(position);
        state.pending.retain(|queued| queued != content);
        Self::release(state, content, notices);
        true
    }

    fn release(state: &mut ProxyState<O>, content: &Content, notices: &mut Vec<Notice<O>>) {
        if let Some(slot) = state.objects.remove(&content.id()) {
            if let Some(object) = slot.object.upgrade() {
                notices.push(Notice::Removed(content.clone(), object));
            }
        }
    }

    fn retire_all(state: &mut ProxyState<O>) {
        for content in std::mem::take(&mut state.admitted) {
            let Some(slot) = state.objects.remove(&content.id()) else {
                continue;
            };
            if let Some(object) = slot.object.upgrade() {
                state.retired_order.push(content.id());
                state.retired.insert(content.id(), object);
            }
        }
        state.objects.clear();
        state.pending.clear();
        state.backlog.clear();
    }

    fn flush_retired(&self, state: &mut ProxyState<O>, notices: &mut Vec<Notice<O>>) {
        for id in std::mem::take(&mut state.retired_order) {
            if let Some(object) = state.retired.remove(&id) {
                notices.push(Notice::Removed(object.content.clone(), object));
            }
        }
        state.retired.clear();
    }

    /// Forget objects whose last strong reference was dropped.
    fn reap(&self, state: &mut ProxyState<O>) {
        while let Ok((id, serial)) = self.reaper_rx.try_recv() {
            let current = state.objects.get(&id).map(|slot| slot.serial);
            if current != Some(serial) {
                continue;
            }
            state.objects.remove(&id);
            state.admitted.retain(|content| content.id() != id);
            tracing::trace!(target: targets::PROXY, content = %id, "materialized object dropped");
        }
    }

    fn ensure_idle(&self, state: &mut ProxyState<O>) {
        if state.idle.is_some() {
            return;
        }

        state.slice.restart();
        let weak = self.weak_self.clone();
        let scheduled = self.context.add_idle(move || match weak.upgrade() {
            Some(proxy) => proxy.run_slice(),
            None => IdleControl::Break,
        });

        match scheduled {
            Ok(id) => state.idle = Some(id),
            Err(err) => {
                tracing::warn!(target: targets::PROXY, %err, "cannot schedule object creation")
            }
        }
    }

    /// One scheduler turn of queued work.
    fn run_slice(&self) -> IdleControl {
        let mut notices = Vec::new();
        let control = {
            let mut state = self.state.lock();
            let _perf = PerfSpan::new(span_names::PROXY_SLICE);

            self.reap(&mut state);
            self.flush_retired(&mut state, &mut notices);

            state.slice.restart();
            while state.slice.has_time() {
                let Some(content) = state.pending.pop_front() else {
                    break;
                };
                self.materialize(&mut state, content, &mut notices);
                state.slice.record();
            }

            tracing::trace!(
                target: targets::PROXY,
                created = state.slice.units(),
                remaining = state.pending.len(),
                "materialization slice done"
            );

            if state.pending.is_empty() {
                state.idle = None;
                IdleControl::Break
            } else {
                IdleControl::Continue
            }
        };
        self.dispatch(notices);
        control
    }

    fn dispatch(&self, notices: Vec<Notice<O>>) {
        for notice in notices {
            match notice {
                Notice::Created(content, object) => self.object_created.emit((content, object)),
                Notice::Removed(content, object) => self.object_removed.emit((content, object)),
            }
        }
    }
}

impl<O: Send + Sync + 'static> Drop for Proxy<O> {
    fn drop(&mut self) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock();
            self.stop_locked(&mut state, &mut notices);
        }
        self.dispatch(notices);
    }
}

/// Contents in start order, beginning at `anchor`.
fn start_order(model: &dyn ContentModel, anchor: Option<&Content>, looping: bool) -> Result<Vec<Content>> {
    let contents = model.contents();
    let Some(anchor) = anchor else {
        return Ok(contents);
    };

    let start = contents
        .iter()
        .position(|content| content == anchor)
        .ok_or(Error::ContentNotFound(anchor.id()))?;

    let mut order = contents[start..].to_vec();
    if looping {
        order.extend_from_slice(&contents[..start]);
    }
    Ok(order)
}

/// Like [`start_order`], falling back to the first item if the anchor left
/// the model.
fn replace_order(model: &dyn ContentModel, anchor: Option<&Content>, looping: bool) -> Vec<Content> {
    match start_order(model, anchor, looping) {
        Ok(order) => order,
        Err(_) => {
            tracing::debug!(target: targets::PROXY, "anchor gone after replace, starting from the first item");
            model.contents()
        }
    }
}

static_assertions::assert_impl_all!(Proxy<String>: Send, Sync);
