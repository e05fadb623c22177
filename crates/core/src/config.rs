//! Renderer configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so a
//! partial file (or none at all) is valid:
//!
//! ```toml
//! shaders_dir = "shaders"
//! validation = true
//! render_extent = [1920, 1080]
//!
//! [window]
//! width = 1280
//! height = 720
//! title = "Effects"
//!
//! [timeouts]
//! frame_fence_ns = 1000000000
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Initial window settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            title: "Vulkan Renderer".to_string(),
        }
    }
}

/// Bounded waits, in nanoseconds. Expiry of any of them is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait on a frame slot's fence before reusing it.
    pub frame_fence_ns: u64,
    /// Wait for the presentation engine to hand out an image.
    pub acquire_ns: u64,
    /// Wait for an immediate submission to retire.
    pub immediate_ns: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            frame_fence_ns: 1_000_000_000,
            acquire_ns: 1_000_000_000,
            immediate_ns: 9_999_999_999,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    /// Directory scanned recursively for compiled `.spv` compute effects.
    pub shaders_dir: PathBuf,
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
    /// Default `tracing` filter, overridden by `RUST_LOG`.
    pub log_filter: String,
    /// Fixed render-target size; the monitor resolution is used when unset.
    pub render_extent: Option<[u32; 2]>,
    pub timeouts: TimeoutConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            shaders_dir: PathBuf::from("shaders"),
            validation: cfg!(debug_assertions),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            render_extent: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
    /// if it is not valid TOML or holds out-of-range values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if let Some([w, h]) = self.render_extent
            && (w == 0 || h == 0)
        {
            return Err(Error::Config(format!(
                "render_extent must be non-zero, got {}x{}",
                w, h
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.shaders_dir, PathBuf::from("shaders"));
        assert_eq!(config.timeouts.frame_fence_ns, 1_000_000_000);
        assert_eq!(config.timeouts.immediate_ns, 9_999_999_999);
        assert!(config.render_extent.is_none());
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_partial_window_section() {
        let config = RendererConfig::from_toml_str("[window]\nwidth = 1280\n").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.window.title, "Vulkan Renderer");
    }

    #[test]
    fn test_render_extent_and_timeouts() {
        let text = r#"
            render_extent = [2560, 1440]
            validation = false

            [timeouts]
            acquire_ns = 5
        "#;
        let config = RendererConfig::from_toml_str(text).unwrap();
        assert_eq!(config.render_extent, Some([2560, 1440]));
        assert!(!config.validation);
        assert_eq!(config.timeouts.acquire_ns, 5);
        assert_eq!(config.timeouts.frame_fence_ns, 1_000_000_000);
    }

    #[test]
    fn test_zero_window_rejected() {
        let result = RendererConfig::from_toml_str("[window]\nwidth = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = RendererConfig::from_toml_str("window = [");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
