//! Logging and tracing facilities for Medley.
//!
//! This module provides:
//! - Integration with the `tracing` crate for structured logging
//! - Target names for filtering per subsystem
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! Medley uses the `tracing` crate for instrumentation. To see logs, install
//! a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("medley::proxy=debug,medley_core=info")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```

/// Span names used throughout Medley for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Idle dispatch turn span.
    pub const MAIN_CONTEXT: &str = "medley::main_context";
    /// Proxy materialization slice span.
    pub const PROXY_SLICE: &str = "medley::proxy::slice";
    /// View model window recomputation span.
    pub const VIEW_MODEL_REFRESH: &str = "medley::view_model::refresh";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "medley_core";
    /// Idle source dispatch target.
    pub const MAIN_CONTEXT: &str = "medley_core::main_context";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "medley_core::signal";
    /// Content handles and metadata.
    pub const CONTENT: &str = "medley::content";
    /// Container models.
    pub const MODEL: &str = "medley::model";
    /// Lazy object proxy.
    pub const PROXY: &str = "medley::proxy";
    /// Filter/group/order/window views.
    pub const VIEW_MODEL: &str = "medley::view_model";
    /// Aggregate models.
    pub const AGGREGATE: &str = "medley::aggregate";
    /// Model and category registry.
    pub const MANAGER: &str = "medley::manager";
    /// Configuration loading.
    pub const CONFIG: &str = "medley::config";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: "medley::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}
