//! # Stream Configuration
//!
//! Loaded once at start-up, from TOML or defaults.
//!
//! ```toml
//! worker_count = 8
//! batch_size = 32
//! default_initial_capacity = 1024
//! default_capacity_step = 1024
//! zero_fill_missing = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Tuning knobs of the streaming engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Worker threads. `None` uses one per available core.
    pub worker_count: Option<usize>,
    /// Pages (or records) handed to one job of a parallel loop.
    pub batch_size: usize,
    /// Slots allocated for a group that does not specify its own.
    pub default_initial_capacity: usize,
    /// Minimum growth for a group that does not specify its own.
    pub default_capacity_step: usize,
    /// Write zeros for attributes a page lacks instead of failing the cycle.
    pub zero_fill_missing: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            batch_size: 16,
            default_initial_capacity: 1024,
            default_capacity_step: 1024,
            zero_fill_missing: false,
        }
    }
}

impl StreamConfig {
    /// Parses and validates a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] on syntax errors, unknown keys
    /// or zero sizes.
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RenderError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] if the file cannot be read or
    /// is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> RenderResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| RenderError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> RenderResult<String> {
        toml::to_string(self).map_err(|e| RenderError::InvalidConfig(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> RenderResult<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("default_initial_capacity", self.default_initial_capacity),
            ("default_capacity_step", self.default_capacity_step),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(RenderError::InvalidConfig(format!("{name} must be greater than zero")));
        }
        if self.worker_count == Some(0) {
            return Err(RenderError::InvalidConfig("worker_count must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(StreamConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_partial_document() {
        let config = StreamConfig::from_toml_str("batch_size = 4\nzero_fill_missing = true").unwrap();
        assert_eq!(config.batch_size, 4);
        assert!(config.zero_fill_missing);
        assert_eq!(config.default_capacity_step, 1024);
    }

    #[test]
    fn test_rejects_zero_and_unknown() {
        assert!(matches!(
            StreamConfig::from_toml_str("batch_size = 0"),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamConfig::from_toml_str("worker_count = 0"),
            Err(RenderError::InvalidConfig(_))
        ));
        assert!(StreamConfig::from_toml_str("bogus = 1").is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = StreamConfig {
            worker_count: Some(3),
            ..StreamConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(StreamConfig::from_toml_str(&text).unwrap(), config);
    }
}
