//! The GPU operations the frame loop is built from.
//!
//! [`FrameEngine`](crate::engine::FrameEngine) drives a frame purely through
//! this trait, so its ordering can be checked against a scripted backend
//! without a device. [`Renderer`](crate::renderer::Renderer) is the Vulkan
//! implementation.

use ash::vk;
use renderer_rhi::RhiResult;

use crate::effects::ComputePushConstants;

/// Result of asking the presentation engine for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `image_index` is ready once the slot's swapchain semaphore signals.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// An image the frame loop moves between layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameImage {
    /// The off-screen image effects draw into.
    RenderTarget,
    /// A swapchain image by index.
    Swapchain(u32),
}

/// Device-side capabilities used by one frame.
///
/// `slot` is always a frame-slot index below
/// [`MAX_FRAMES_IN_FLIGHT`](crate::MAX_FRAMES_IN_FLIGHT). Recording calls
/// (`transition_image` through `draw_overlay`) are only valid between
/// `begin_commands` and `end_commands` for the same slot.
pub trait GpuBackend {
    /// Blocks until the slot's previous submission has retired.
    ///
    /// A missed deadline is returned as `VulkanError(TIMEOUT)`.
    fn wait_for_fence(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<()>;

    /// Re-arms the slot's fence. Only valid after a successful wait.
    fn reset_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Requests the next swapchain image, signalling the slot's swapchain
    /// semaphore when it is ready.
    fn acquire_image(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<AcquireOutcome>;

    /// Resets and begins the slot's command buffer for one-time submission.
    fn begin_commands(&mut self, slot: usize) -> RhiResult<()>;

    fn transition_image(
        &mut self,
        slot: usize,
        image: FrameImage,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    );

    /// Binds effect `effect_index`, pushes `constants` and dispatches `groups`.
    fn dispatch_effect(
        &mut self,
        slot: usize,
        effect_index: usize,
        constants: &ComputePushConstants,
        groups: [u32; 3],
    );

    /// Scaled copy of the render target onto swapchain image `image_index`.
    fn copy_to_swapchain(&mut self, slot: usize, image_index: u32);

    /// Draws the debug UI onto swapchain image `image_index`, which is in
    /// `COLOR_ATTACHMENT_OPTIMAL`.
    fn draw_overlay(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    fn end_commands(&mut self, slot: usize) -> RhiResult<()>;

    /// Submits the slot's commands: waits on its swapchain semaphore,
    /// signals its render semaphore and fence.
    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    /// Presents `image_index` once the slot's render semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Releases the swapchain and its image views. The device must be idle.
    fn destroy_swapchain(&mut self);

    /// Builds a swapchain for a `width` x `height` window and returns the
    /// extent actually chosen.
    fn create_swapchain(&mut self, width: u32, height: u32) -> RhiResult<vk::Extent2D>;

    fn render_extent(&self) -> vk::Extent2D;

    fn swapchain_extent(&self) -> vk::Extent2D;

    /// Called once a slot's fence has been waited on, before its deletion
    /// queue is flushed. Backends release per-slot transient state here.
    fn slot_reclaimed(&mut self, _slot: usize) {}
}
