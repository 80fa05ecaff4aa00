//! Stream configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Default characters requested per pull, matching a readable high-water mark.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Default limit on nested synchronous continuation calls.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1000;

/// Configuration for a render stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Characters requested per pull by the async stream surface.
    pub chunk_size: usize,
    /// Inline continuation depth after which production yields.
    pub max_stack_depth: usize,
    /// Stream name used in logs and metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            label: None,
        }
    }
}

impl StreamConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pull chunk size.
    pub fn with_chunk_size(mut self, chars: usize) -> Self {
        self.chunk_size = chars;
        self
    }

    /// Set the maximum inline continuation depth.
    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Set the stream label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label for logs, falling back to a generic name.
    pub fn label_or_default(&self) -> &str {
        self.label.as_deref().unwrap_or("render")
    }

    /// Check the configuration for unusable values.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.chunk_size == 0 {
            return Err(RenderError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_stack_depth == 0 {
            return Err(RenderError::Config(
                "max_stack_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, RenderError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(content: &str) -> Result<Self, RenderError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file. `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let parsed = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        parsed.with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
