//! Core utilities for the Vulkan renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer and frame statistics
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{RendererConfig, TimeoutConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::{FrameStats, Timer};
