//! Frame lifecycle and drawing.
//!
//! This crate orchestrates the rendering process:
//! - Deferred, ordered destruction of GPU objects
//! - Frame slots and their synchronization
//! - The per-frame state machine, written against [`GpuBackend`]
//! - Compute effects and the debug UI overlay
//! - The Vulkan backend, [`Renderer`]

pub mod backend;
pub mod deletion_queue;
pub mod effects;
pub mod engine;
pub mod frame;
pub mod overlay;
pub mod renderer;

pub use backend::{AcquireOutcome, FrameImage, GpuBackend, PresentOutcome};
pub use deletion_queue::DeletionQueue;
pub use effects::{ComputeEffect, ComputePushConstants, EffectLibrary};
pub use engine::{FrameEngine, FrameInput, FrameOutcome};
pub use overlay::{OverlayFrame, OverlayUi, effect_selector};
pub use renderer::Renderer;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
