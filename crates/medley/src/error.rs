//! Error types for the content engine.

use std::path::PathBuf;

use crate::content::ContentId;
use crate::model::ModelId;

/// Result type alias for content engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by models, proxies and the model manager.
///
/// Most of these are usage errors: the operation that returned them was a
/// no-op and the component's state is unchanged. They are logged where they
/// occur, so callers are free to ignore them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The component was already started.
    #[error("already started")]
    AlreadyStarted,

    /// No source model was set before starting.
    #[error("no model set")]
    NoModel,

    /// No object factory was set before starting.
    #[error("no object factory set")]
    NoFactory,

    /// The requested content is not part of the model.
    #[error("content {0} not found in model")]
    ContentNotFound(ContentId),

    /// No category with this name is registered.
    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    /// A category with this name is already registered.
    #[error("category '{0}' is already registered")]
    DuplicateCategory(String),

    /// The model has no category and cannot be registered.
    #[error("model {0} has no category")]
    ModelWithoutCategory(ModelId),

    /// The model is not registered.
    #[error("unknown model {0}")]
    UnknownModel(ModelId),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(Error::AlreadyStarted.to_string(), "already started");
        assert_eq!(
            Error::UnknownCategory("music".into()).to_string(),
            "unknown category 'music'"
        );
        assert_eq!(
            Error::config("bad limit").to_string(),
            "invalid configuration: bad limit"
        );
    }

    #[test]
    fn test_io_source() {
        use std::error::Error as _;

        let err = Error::io(
            "/nonexistent/medley.toml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("medley.toml"));
    }
}
