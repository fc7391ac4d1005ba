//! Views Configuration
//!
//! Loaded from JSON. Every key is optional; missing keys take the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ViewError;

pub const DEFAULT_FLAGS: [&str; 3] = ["/*compile*/", "#compile", "#php-compile"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewsConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub evaluate: EvaluateConfig,
    #[serde(default)]
    pub whitespace: WhitespaceConfig,
}

fn default_directory() -> PathBuf { PathBuf::from("views") }
fn default_namespace() -> String { "default".to_string() }
fn default_extension() -> String { "tpl".to_string() }
fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_compiled_extension")]
    pub extension: String,
}

fn default_cache_directory() -> PathBuf { PathBuf::from("cache/views") }
fn default_compiled_extension() -> String { "compiled".to_string() }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_directory(),
            extension: default_compiled_extension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConfig {
    /// Marker strings; a code block containing any of them runs at compile time.
    #[serde(default = "default_flags")]
    pub flags: Vec<String>,
}

fn default_flags() -> Vec<String> {
    DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect()
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self { flags: default_flags() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitespaceConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            namespace: default_namespace(),
            extension: default_extension(),
            cache: CacheConfig::default(),
            evaluate: EvaluateConfig::default(),
            whitespace: WhitespaceConfig::default(),
        }
    }
}

impl ViewsConfig {
    pub fn from_file(path: &Path) -> Result<Self, ViewError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ViewError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ViewError> {
        let config: ViewsConfig = serde_json::from_str(content)?;
        if config.extension.is_empty() || config.cache.extension.is_empty() {
            return Err(ViewError::Config("extensions must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn cache_directory(&self) -> &Path {
        &self.cache.directory
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_cache_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.cache.directory = directory.into();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.evaluate.flags = flags;
        self
    }

    pub fn with_whitespace(mut self, enabled: bool) -> Self {
        self.whitespace.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_takes_defaults() {
        let config = ViewsConfig::from_json("{}").unwrap();
        assert_eq!(config.cache_directory(), Path::new("cache/views"));
        assert_eq!(config.evaluate.flags, vec!["/*compile*/", "#compile", "#php-compile"]);
        assert!(config.cache.enabled);
        assert!(!config.whitespace.enabled);
    }

    #[test]
    fn test_camel_case_keys() {
        let config = ViewsConfig::from_json(
            r#"{"cache": {"directory": "/tmp/vc", "enabled": false}, "evaluate": {"flags": ["@now"]}}"#,
        )
        .unwrap();
        assert_eq!(config.cache_directory(), Path::new("/tmp/vc"));
        assert!(!config.cache.enabled);
        assert_eq!(config.evaluate.flags, vec!["@now"]);
    }

    #[test]
    fn test_empty_extension_rejected() {
        assert!(ViewsConfig::from_json(r#"{"extension": ""}"#).is_err());
    }
}
