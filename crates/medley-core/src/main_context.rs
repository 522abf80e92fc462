//! Cooperative idle scheduler.
//!
//! A [`MainContext`] owns a queue of idle sources. Each call to
//! [`MainContext::run_turn`] dispatches every source that was queued when the
//! turn began, once, in the order they were added. A source that returns
//! [`IdleControl::Continue`] goes to the back of the queue and runs again on
//! the next turn; one that returns [`IdleControl::Break`] is removed.
//!
//! The host application decides when turns happen (typically once per
//! iteration of its own event loop). Nothing here spawns threads.
//!
//! # Example
//!
//! ```
//! use medley_core::{IdleControl, MainContext};
//!
//! let context = MainContext::new();
//! let mut remaining = 3;
//! context
//!     .add_idle(move || {
//!         remaining -= 1;
//!         if remaining == 0 { IdleControl::Break } else { IdleControl::Continue }
//!     })
//!     .unwrap();
//!
//! assert_eq!(context.run_until_idle(10), 3);
//! assert!(!context.has_pending());
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{CoreError, Result};
use crate::logging::{span_names, targets};

new_key_type! {
    /// Identifier of a registered idle source.
    pub struct IdleSourceId;
}

/// What an idle source wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleControl {
    /// Run again on the next turn.
    Continue,
    /// Remove the source.
    Break,
}

type IdleFn = Box<dyn FnMut() -> IdleControl + Send>;

/// Shared cooperative scheduler for idle work.
pub struct MainContext {
    sources: Mutex<SlotMap<IdleSourceId, Arc<Mutex<IdleFn>>>>,
    queue: Mutex<VecDeque<IdleSourceId>>,
    shut_down: Mutex<bool>,
}

impl MainContext {
    /// Create a new, empty context.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sources: Mutex::new(SlotMap::with_key()),
            queue: Mutex::new(VecDeque::new()),
            shut_down: Mutex::new(false),
        })
    }

    /// Register an idle source. It first runs on the next turn.
    ///
    /// Fails with [`CoreError::ContextShutDown`] after
    /// [`shutdown`](Self::shutdown).
    pub fn add_idle<F>(&self, source: F) -> Result<IdleSourceId>
    where
        F: FnMut() -> IdleControl + Send + 'static,
    {
        if *self.shut_down.lock() {
            tracing::warn!(target: targets::MAIN_CONTEXT, "idle source added after shutdown, dropping it");
            return Err(CoreError::ContextShutDown);
        }

        let boxed: IdleFn = Box::new(source);
        let id = self.sources.lock().insert(Arc::new(Mutex::new(boxed)));
        self.queue.lock().push_back(id);
        tracing::trace!(target: targets::MAIN_CONTEXT, ?id, "idle source added");
        Ok(id)
    }

    /// Remove a pending idle source.
    ///
    /// Removing a source from inside its own callback is allowed; the
    /// callback finishes its current run and is not dispatched again.
    pub fn remove_idle(&self, id: IdleSourceId) -> Result<()> {
        if self.sources.lock().remove(id).is_none() {
            return Err(CoreError::UnknownIdleSource);
        }
        self.queue.lock().retain(|queued| *queued != id);
        tracing::trace!(target: targets::MAIN_CONTEXT, ?id, "idle source removed");
        Ok(())
    }

    /// Returns `true` if the source is still registered.
    pub fn contains(&self, id: IdleSourceId) -> bool {
        self.sources.lock().contains_key(id)
    }

    /// Number of registered idle sources.
    pub fn pending_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Returns `true` if any idle source is registered.
    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Dispatch one turn.
    ///
    /// Returns the number of sources that ran.
    pub fn run_turn(&self) -> usize {
        let _span = tracing::trace_span!(target: targets::MAIN_CONTEXT, "turn", name = span_names::MAIN_CONTEXT).entered();

        let batch: Vec<IdleSourceId> = self.queue.lock().drain(..).collect();
        let mut dispatched = 0;

        for id in batch {
            let Some(source) = self.sources.lock().get(id).cloned() else {
                continue;
            };

            // A source re-entering the context from its own callback cannot
            // dispatch itself a second time.
            let control = match source.try_lock() {
                Some(mut callback) => {
                    dispatched += 1;
                    callback()
                }
                None => IdleControl::Continue,
            };

            match control {
                IdleControl::Continue => {
                    if self.sources.lock().contains_key(id) {
                        self.queue.lock().push_back(id);
                    }
                }
                IdleControl::Break => {
                    self.sources.lock().remove(id);
                }
            }
        }

        tracing::trace!(target: targets::MAIN_CONTEXT, dispatched, "turn complete");
        dispatched
    }

    /// Run turns until no sources remain or `max_turns` turns have run.
    ///
    /// Returns the number of turns that dispatched at least one source.
    pub fn run_until_idle(&self, max_turns: usize) -> usize {
        let mut turns = 0;
        while turns < max_turns && self.has_pending() {
            if self.run_turn() == 0 {
                break;
            }
            turns += 1;
        }
        turns
    }

    /// Drop every source and refuse new ones.
    pub fn shutdown(&self) {
        *self.shut_down.lock() = true;
        let sources: Vec<_> = self.sources.lock().drain().map(|(_, source)| source).collect();
        self.queue.lock().clear();
        tracing::debug!(target: targets::MAIN_CONTEXT, dropped = sources.len(), "main context shut down");
        // Dropped outside the locks; a source's captures may call back in.
        drop(sources);
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shut_down.lock()
    }
}

static_assertions::assert_impl_all!(MainContext: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_runs_once_per_turn() {
        let context = MainContext::new();
        let runs = Arc::new(Mutex::new(0));

        let runs_clone = runs.clone();
        context
            .add_idle(move || {
                *runs_clone.lock() += 1;
                IdleControl::Continue
            })
            .unwrap();

        assert_eq!(context.run_turn(), 1);
        assert_eq!(context.run_turn(), 1);
        assert_eq!(*runs.lock(), 2);
        assert_eq!(context.pending_count(), 1);
    }

    #[test]
    fn test_break_removes_source() {
        let context = MainContext::new();
        context.add_idle(|| IdleControl::Break).unwrap();

        assert_eq!(context.run_turn(), 1);
        assert!(!context.has_pending());
        assert_eq!(context.run_turn(), 0);
    }

    #[test]
    fn test_sources_dispatch_in_fifo_order() {
        let context = MainContext::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            context
                .add_idle(move || {
                    order.lock().push(n);
                    IdleControl::Continue
                })
                .unwrap();
        }

        context.run_turn();
        context.run_turn();
        assert_eq!(*order.lock(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_source_added_during_turn_runs_next_turn() {
        let context = MainContext::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&context);
        let order_clone = order.clone();
        context
            .add_idle(move || {
                order_clone.lock().push("outer");
                if let Some(context) = weak.upgrade() {
                    let order = order_clone.clone();
                    let _ = context.add_idle(move || {
                        order.lock().push("inner");
                        IdleControl::Break
                    });
                }
                IdleControl::Break
            })
            .unwrap();

        assert_eq!(context.run_turn(), 1);
        assert_eq!(*order.lock(), vec!["outer"]);
        assert_eq!(context.run_turn(), 1);
        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_remove_idle() {
        let context = MainContext::new();
        let id = context.add_idle(|| IdleControl::Continue).unwrap();

        assert!(context.contains(id));
        assert!(context.remove_idle(id).is_ok());
        assert!(!context.contains(id));
        assert!(matches!(context.remove_idle(id), Err(CoreError::UnknownIdleSource)));
        assert_eq!(context.run_turn(), 0);
    }

    #[test]
    fn test_source_removing_itself() {
        let context = MainContext::new();
        let own_id: Arc<Mutex<Option<IdleSourceId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&context);
        let own_id_clone = own_id.clone();
        let id = context
            .add_idle(move || {
                if let (Some(context), Some(id)) = (weak.upgrade(), *own_id_clone.lock()) {
                    let _ = context.remove_idle(id);
                }
                IdleControl::Continue
            })
            .unwrap();
        *own_id.lock() = Some(id);

        context.run_turn();
        assert!(!context.has_pending());
    }

    #[test]
    fn test_run_until_idle_respects_max_turns() {
        let context = MainContext::new();
        context.add_idle(|| IdleControl::Continue).unwrap();

        assert_eq!(context.run_until_idle(4), 4);
        assert!(context.has_pending());
    }

    #[test]
    fn test_shutdown_refuses_new_sources() {
        let context = MainContext::new();
        context.add_idle(|| IdleControl::Continue).unwrap();
        context.shutdown();

        assert!(context.is_shut_down());
        assert!(!context.has_pending());

        assert_eq!(
            context.add_idle(|| IdleControl::Continue),
            Err(CoreError::ContextShutDown)
        );
        assert_eq!(context.run_turn(), 0);
    }
}
