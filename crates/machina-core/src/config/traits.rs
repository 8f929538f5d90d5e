//! Core configuration traits for the Machina configuration system

use crate::errors::MachinaError;
use std::path::Path;

/// Core trait for layered configuration types.
///
/// Layers apply in order: defaults, then an optional file, then
/// `MACHINA_*` environment variables, then explicit `key=value` overrides.
pub trait LayeredConfig: Clone + Default + Send + Sync + 'static {
    /// Dotted keys accepted by [`LayeredConfig::set_from_string`].
    const KEYS: &'static [&'static str];

    /// Prefix of environment variables that override file values.
    const ENV_PREFIX: &'static str = "MACHINA_";

    /// Load configuration from a TOML or JSON file, chosen by extension.
    fn load_from_file(path: &Path) -> Result<Self, MachinaError>
    where
        Self: serde::de::DeserializeOwned,
    {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MachinaError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| MachinaError::config(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| MachinaError::config(format!("Invalid JSON: {e}"))),
            _ => Err(MachinaError::config(format!(
                "Unsupported config file format: {}",
                path.display()
            ))),
        }
    }

    /// Apply overrides from `(name, value)` pairs, reading only variables
    /// named `ENV_PREFIX` + the upper-cased key with `.` replaced by `_`.
    fn merge_with_vars<I>(&mut self, vars: I) -> Result<(), MachinaError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(rest) = name.strip_prefix(Self::ENV_PREFIX) else {
                continue;
            };
            if let Some(key) = Self::KEYS
                .iter()
                .find(|key| key.to_uppercase().replace('.', "_") == rest)
            {
                self.set_from_string(key, &value)?;
            }
        }
        Ok(())
    }

    /// Merge with the process environment.
    fn merge_with_env(&mut self) -> Result<(), MachinaError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), MachinaError>;

    /// Set a configuration value from a string (for CLI parsing)
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), MachinaError>;

    /// Apply a `key=value` override.
    fn apply_override(&mut self, assignment: &str) -> Result<(), MachinaError> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            MachinaError::config(format!("Expected key=value, got {assignment:?}"))
        })?;
        self.set_from_string(key.trim(), value.trim())
    }
}
