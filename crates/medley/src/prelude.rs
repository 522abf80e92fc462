//! Prelude module for Medley.
//!
//! This module re-exports the most commonly used types for convenient importing:
//!
//! ```
//! use medley::prelude::*;
//! ```

// ============================================================================
// Event Loop
// ============================================================================

pub use medley_core::{ConnectionId, IdleControl, MainContext, Signal};

// ============================================================================
// Content and Change Events
// ============================================================================

pub use crate::content::{Content, ContentId, MetadataKey};
pub use crate::controller::{ChangeEvent, Controller};

// ============================================================================
// Models
// ============================================================================

pub use crate::aggregate_model::AggregateModel;
pub use crate::manager::{CategoryInfo, ModelInfo, ModelManager};
pub use crate::model::{ContentModel, GenericModel, SharedModel, SortFunction};
pub use crate::view_model::{Filter, ViewModel};

// ============================================================================
// Materialization
// ============================================================================

pub use crate::proxy::{Materialized, Proxy};

// ============================================================================
// Configuration and Errors
// ============================================================================

pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
