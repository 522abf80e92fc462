//! Engine configuration.
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! document is a valid configuration:
//!
//! ```
//! use medley::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     [proxy]
//!     limit = 24
//!
//!     [view_model]
//!     limit = 12
//!     loop_around = true
//!
//!     [[categories]]
//!     name = "music"
//!     display_name = "Music"
//!     priority = 10
//!     primary_group_by = "album"
//! "#).unwrap();
//!
//! assert_eq!(config.proxy.limit, 24);
//! assert_eq!(config.proxy.time_slice_ms, 5);
//! assert_eq!(config.categories[0].display_name, "Music");
//! ```

use std::collections::HashSet;
use std::path::Path;

use medley_core::logging::targets;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manager::CategoryInfo;
use crate::proxy::ProxyConfig;
use crate::view_model::ViewModelConfig;

/// Settings for the whole engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub proxy: ProxyConfig,
    pub view_model: ViewModelConfig,
    pub categories: Vec<CategoryInfo>,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(target: targets::CONFIG, path = %path.display(), categories = config.categories.len(), "configuration loaded");
        Ok(config)
    }

    /// Serialize to a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|err| Error::config(err.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for category in &self.categories {
            if category.name.is_empty() {
                return Err(Error::config("category without a name"));
            }
            if !names.insert(category.name.as_str()) {
                return Err(Error::config(format!(
                    "category '{}' is listed twice",
                    category.name
                )));
            }
        }
        Ok(())
    }
}
