//! Error types for Medley core.

use std::fmt;

/// The error type for scheduler operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The idle source id is invalid or the source already finished.
    UnknownIdleSource,
    /// The main context has been shut down.
    ContextShutDown,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIdleSource => write!(f, "Invalid or finished idle source"),
            Self::ContextShutDown => write!(f, "The main context has been shut down"),
        }
    }
}

impl std::error::Error for CoreError {}

/// A specialized Result type for Medley core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
