//! Core systems for Medley.
//!
//! This crate provides the event-loop plumbing the Medley content engine is
//! built on:
//!
//! - **Signal/Slot System**: Type-safe, re-entrant change notification
//! - **Main Context**: Cooperative idle scheduling driven by the host loop
//! - **Time Slices**: Wall-clock budgets for work split across turns
//! - **Logging**: Tracing targets and helpers shared by every Medley crate
//!
//! # Signal/Slot Example
//!
//! ```
//! use medley_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Idle Work Example
//!
//! ```
//! use std::time::Duration;
//! use medley_core::{IdleControl, MainContext, TimeSlice};
//!
//! let context = MainContext::new();
//! let mut work: Vec<u32> = (0..100).collect();
//!
//! context
//!     .add_idle(move || {
//!         let mut slice = TimeSlice::new(Duration::from_millis(5));
//!         while slice.has_time() {
//!             if work.pop().is_none() {
//!                 return IdleControl::Break;
//!             }
//!             slice.record();
//!         }
//!         IdleControl::Continue
//!     })
//!     .unwrap();
//!
//! context.run_until_idle(1_000);
//! assert!(!context.has_pending());
//! ```

mod error;
pub mod logging;
pub mod main_context;
pub mod signal;
pub mod slice;

pub use error::{CoreError, Result};
pub use logging::PerfSpan;
pub use main_context::{IdleControl, IdleSourceId, MainContext};
pub use signal::{ConnectionId, Signal};
pub use slice::{DEFAULT_SLICE_BUDGET, TimeSlice};
