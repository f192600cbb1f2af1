//! Render configuration.
//!
//! A `RenderConfig` is owned by each [`ComponentTree`](crate::tree::ComponentTree)
//! and copied into the mount state it drives. It can be built in code or parsed
//! from TOML:
//!
//! ```
//! use tessera::config::RenderConfig;
//!
//! let config = RenderConfig::from_toml_str("incremental_mount = false\ncontent_pool_size = 8").unwrap();
//! assert!(!config.incremental_mount);
//! assert_eq!(config.content_pool_size, 8);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for one component tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Only mount outputs intersecting the visible rect.
    pub incremental_mount: bool,
    /// Capacity of each per-content-type recycling pool.
    pub content_pool_size: usize,
    /// Keep the layout result tree alive after outputs are collected.
    pub retain_layout_results: bool,
    /// Allow an in-flight resolve to be interrupted and resumed elsewhere.
    pub interruptible_resolve: bool,
    /// Dispatch visibility events after each mount pass.
    pub process_visibility: bool,
    /// Record a debug snapshot for every committed layout.
    pub time_travel: bool,
    /// How many snapshots to keep when time travel is on.
    pub time_travel_history: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            incremental_mount: true,
            content_pool_size: 3,
            retain_layout_results: false,
            interruptible_resolve: true,
            process_visibility: true,
            time_travel: false,
            time_travel_history: 16,
        }
    }
}

impl RenderConfig {
    /// Parse a configuration from TOML text and validate it.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RenderConfig =
            toml::from_str(content).map_err(|source| ConfigError::ParseError { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - Pools can hold at least one item
    /// - Time travel keeps at least one snapshot when enabled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.content_pool_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "content_pool_size must be at least 1".to_string(),
            });
        }
        if self.time_travel && self.time_travel_history == 0 {
            return Err(ConfigError::ValidationError {
                message: "time_travel_history must be at least 1 when time_travel is on"
                    .to_string(),
            });
        }
        Ok(())
    }
}
