//! Hot reload of the scaling configuration
//!
//! The effective configuration is the default overlaid with the contents of
//! an optional [`ConfigSource`]. The source is only read when it reports a
//! change, and a failed read or parse never replaces a configuration that
//! was previously loaded.

mod file;


pub use file::FileConfigSource;

use crate::error::ConfigError;
use crate::models::ScalingConfig;
use async_trait::async_trait;
use tracing::debug;

/// An external, mutable source of configuration overrides
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Human-readable identity for logs
    fn describe(&self) -> String;

    /// Whether the source differs from what was last loaded
    async fn has_changed(&self) -> Result<bool, ConfigError>;

    /// Read the raw contents of the source
    async fn read(&mut self) -> Result<Vec<u8>, ConfigError>;

    /// Record that the bytes from the last `read` were parsed and adopted
    fn mark_loaded(&mut self) {}
}

/// Result of a [`ConfigReloader::refresh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reload {
    /// The effective configuration is the same object as before
    Unchanged,
    /// A new effective configuration was adopted
    Loaded,
}

/// Tracks the effective scaling configuration
pub struct ConfigReloader {
    default: ScalingConfig,
    source: Option<Box<dyn ConfigSource>>,
    current: Option<ScalingConfig>,
}

impl ConfigReloader {
    /// A reloader that always uses `default`
    pub fn new(default: ScalingConfig) -> Self {
        Self {
            default,
            source: None,
            current: None,
        }
    }

    /// A reloader that overlays `source` onto `default`
    pub fn with_source(default: ScalingConfig, source: Box<dyn ConfigSource>) -> Self {
        Self {
            default,
            source: Some(source),
            current: None,
        }
    }

    /// The configuration currently in effect, if any has been loaded yet
    pub fn current(&self) -> Option<&ScalingConfig> {
        self.current.as_ref()
    }

    pub fn default_config(&self) -> &ScalingConfig {
        &self.default
    }

    pub fn source_name(&self) -> Option<String> {
        self.source.as_ref().map(|s| s.describe())
    }

    /// Adopt a new effective configuration if the source changed.
    ///
    /// The first call with a source always reads it. On error the current
    /// configuration, if any, stays in effect.
    pub async fn refresh(&mut self) -> Result<Reload, ConfigError> {
        let Some(source) = self.source.as_mut() else {
            if self.current.is_some() {
                return Ok(Reload::Unchanged);
            }
            self.current = Some(self.default.clone());
            return Ok(Reload::Loaded);
        };

        if self.current.is_some() && !source.has_changed().await? {
            return Ok(Reload::Unchanged);
        }

        let bytes = source.read().await?;
        let effective = if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!(source = %source.describe(), "Config source is empty, using default config");
            self.default.clone()
        } else {
            let overrides = ScalingConfig::from_json(&bytes)?;
            self.default.overlaid_with(&overrides)
        };

        source.mark_loaded();
        self.current = Some(effective);
        Ok(Reload::Loaded)
    }
}
