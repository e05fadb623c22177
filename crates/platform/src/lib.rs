//! Platform layer for the renderer.
//!
//! - Window creation and fullscreen handling via winit
//! - Vulkan surface creation via ash-window
//! - Translation of window events into render-loop signals

mod events;
mod window;

pub use events::{SignalTracker, WindowSignal};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
