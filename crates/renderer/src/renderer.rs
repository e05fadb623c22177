//! Vulkan implementation of [`GpuBackend`].
//!
//! This module provides the [`Renderer`] struct that owns every Vulkan
//! object the frame loop touches and knows how to turn each frame step into
//! commands.
//!
//! # Resource Destruction Order
//!
//! Vulkan resources must be destroyed in the correct order:
//! 1. Wait for all GPU work to complete
//! 2. Release the UI overlay
//! 3. Flush the global deletion queue (effects, descriptors, render target)
//! 4. Destroy frame slots
//! 5. Destroy the immediate command channel
//! 6. Destroy swapchain
//! 7. Destroy surface
//! 8. Destroy device (allocator first)
//! 9. Destroy instance
//!
//! ManuallyDrop is used to ensure correct destruction order.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use renderer_core::RendererConfig;
use renderer_platform::{Surface, Window};
use renderer_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, PoolSizeRatio, storage_image_binding,
    write_storage_image,
};
use renderer_rhi::device::Device;
use renderer_rhi::image::AllocatedImage;
use renderer_rhi::immediate::ImmediateSubmit;
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::pipeline::{Pipeline, PipelineLayout, compute_push_constant_range};
use renderer_rhi::shader::Shader;
use renderer_rhi::swapchain::Swapchain;
use renderer_rhi::{RhiError, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::backend::{AcquireOutcome, FrameImage, GpuBackend, PresentOutcome};
use crate::deletion_queue::DeletionQueue;
use crate::effects::{ComputeEffect, ComputePushConstants, EffectLibrary, discover_effect_shaders};
use crate::frame::FrameSlot;
use crate::overlay::{OverlayFrame, OverlayPainter};

/// Descriptor sets the pool can hand out.
const DESCRIPTOR_POOL_SETS: u32 = 10;

/// Colour the render target holds before the first dispatch.
const RENDER_TARGET_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Size of the off-screen render target.
///
/// A configured override wins, then the monitor resolution, then the window.
pub fn choose_render_extent(
    configured: Option<[u32; 2]>,
    desktop: Option<(u32, u32)>,
    window: (u32, u32),
) -> vk::Extent2D {
    let (width, height) = configured
        .map(|[w, h]| (w, h))
        .or(desktop)
        .unwrap_or(window);
    vk::Extent2D {
        width: width.max(1),
        height: height.max(1),
    }
}

/// Handles of one effect's pipeline. The objects themselves are owned by the
/// global deletion queue.
#[derive(Debug, Clone, Copy)]
struct EffectPipeline {
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

/// Handles of the render target, owned by the global deletion queue.
#[derive(Debug, Clone, Copy)]
struct RenderTarget {
    image: vk::Image,
    extent: vk::Extent2D,
}

/// Owns all Vulkan state used to draw frames.
pub struct Renderer {
    overlay: ManuallyDrop<OverlayPainter>,
    /// Effects, descriptors and the render target, released in reverse
    /// creation order at shutdown.
    deletion_queue: DeletionQueue,
    effect_pipelines: Vec<EffectPipeline>,
    descriptor_set: vk::DescriptorSet,
    render_target: RenderTarget,

    frames: ManuallyDrop<Vec<FrameSlot>>,
    immediate: ManuallyDrop<ImmediateSubmit>,
    /// `None` only between `destroy_swapchain` and `create_swapchain`.
    swapchain: Option<Swapchain>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,
}

impl Renderer {
    /// Brings up Vulkan for `window` and loads the effects found under
    /// `config.shaders_dir`.
    ///
    /// Effects that fail to load are logged and left out of the returned
    /// library.
    ///
    /// # Errors
    ///
    /// Returns an error if any device-level object cannot be created.
    pub fn new(window: &Window, config: &RendererConfig) -> RhiResult<(Self, EffectLibrary)> {
        let (width, height) = window.inner_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(&config.window.title, config.validation, &surface_extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let frames = FrameSlot::create_pool(&device)?;
        let mut immediate = ImmediateSubmit::new(device.clone())?;

        let mut deletion_queue = DeletionQueue::new();

        let render_extent =
            choose_render_extent(config.render_extent, window.desktop_extent(), (width, height));
        let render_target = Self::create_render_target(
            &device,
            &mut immediate,
            render_extent,
            config.timeouts.immediate_ns,
        )?;
        let render_target_view = render_target.image_view();
        let render_target_handles = RenderTarget {
            image: render_target.image(),
            extent: render_target.extent(),
        };
        deletion_queue.push(move || drop(render_target));

        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            DESCRIPTOR_POOL_SETS,
            &[PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)],
        )?;
        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[storage_image_binding(0, vk::ShaderStageFlags::COMPUTE)],
        )?;
        let descriptor_set = descriptor_pool.allocate(&set_layout)?;
        write_storage_image(&device, descriptor_set, 0, render_target_view);

        let set_layout_handle = set_layout.handle();
        deletion_queue.push(move || drop(descriptor_pool));
        deletion_queue.push(move || drop(set_layout));

        let (effects, effect_pipelines) = Self::load_effects(
            &device,
            &config.shaders_dir,
            set_layout_handle,
            &mut deletion_queue,
        );

        let overlay = OverlayPainter::new(&device, swapchain.format())?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, render target {}x{}, {} effect(s)",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT,
            render_extent.width,
            render_extent.height,
            effects.len()
        );

        let renderer = Self {
            overlay: ManuallyDrop::new(overlay),
            deletion_queue,
            effect_pipelines,
            descriptor_set,
            render_target: render_target_handles,
            frames: ManuallyDrop::new(frames),
            immediate: ManuallyDrop::new(immediate),
            swapchain: Some(swapchain),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
        };

        Ok((renderer, effects))
    }

    /// Creates the render target and clears it once, leaving it in `GENERAL`.
    fn create_render_target(
        device: &Arc<Device>,
        immediate: &mut ImmediateSubmit,
        extent: vk::Extent2D,
        timeout_ns: u64,
    ) -> RhiResult<AllocatedImage> {
        let target = AllocatedImage::render_target(device.clone(), extent)?;
        let image = target.image();

        immediate.submit(timeout_ns, |cmd| {
            cmd.transition_image(
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.clear_color_image(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                RENDER_TARGET_CLEAR,
            );
            cmd.transition_image(
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::GENERAL,
            );
        })?;

        Ok(target)
    }

    /// Builds one compute pipeline per shader under `shaders_dir`.
    ///
    /// Pipelines and layouts are handed to `deletion_queue`; the returned
    /// handles are indexed like the returned library.
    fn load_effects(
        device: &Arc<Device>,
        shaders_dir: &Path,
        set_layout: vk::DescriptorSetLayout,
        deletion_queue: &mut DeletionQueue,
    ) -> (EffectLibrary, Vec<EffectPipeline>) {
        let mut library = EffectLibrary::new();
        let mut pipelines = Vec::new();

        let shaders = match discover_effect_shaders(shaders_dir) {
            Ok(shaders) => shaders,
            Err(e) => {
                error!(
                    "Cannot scan shader directory {}: {}",
                    shaders_dir.display(),
                    e
                );
                return (library, pipelines);
            }
        };

        for (name, path) in shaders {
            match Self::build_effect(device, &path, set_layout) {
                Ok((layout, pipeline)) => {
                    pipelines.push(EffectPipeline {
                        layout: layout.handle(),
                        pipeline: pipeline.handle(),
                    });
                    deletion_queue.push(move || drop(layout));
                    deletion_queue.push(move || drop(pipeline));
                    info!("Loaded effect '{}' from {}", name, path.display());
                    library.push(ComputeEffect::new(name));
                }
                Err(e) => {
                    error!("Skipping effect '{}' ({}): {}", name, path.display(), e);
                }
            }
        }

        if library.is_empty() {
            warn!(
                "No compute effects loaded from {}; frames will show the cleared target",
                shaders_dir.display()
            );
        }

        (library, pipelines)
    }

    fn build_effect(
        device: &Arc<Device>,
        path: &Path,
        set_layout: vk::DescriptorSetLayout,
    ) -> RhiResult<(PipelineLayout, Pipeline)> {
        let shader = Shader::from_spirv_file(device.clone(), path)?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[set_layout],
            &[compute_push_constant_range(ComputePushConstants::SIZE)],
        )?;
        let pipeline = Pipeline::create_compute(device.clone(), &shader, &layout)?;
        Ok((layout, pipeline))
    }

    /// Hands the next UI frame to the overlay, uploading any new textures.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OverlayError`] if a texture upload fails.
    pub fn set_overlay_frame(&mut self, frame: OverlayFrame) -> RhiResult<()> {
        self.overlay.set_frame(
            self.device.graphics_queue(),
            self.immediate.command_pool(),
            frame,
        )
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Format of the swapchain images, if a swapchain exists.
    pub fn swapchain_format(&self) -> Option<vk::Format> {
        self.swapchain.as_ref().map(Swapchain::format)
    }

    fn swapchain(&self) -> RhiResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("no swapchain".to_string()))
    }

    fn frame_image(&self, image: FrameImage) -> Option<vk::Image> {
        match image {
            FrameImage::RenderTarget => Some(self.render_target.image),
            FrameImage::Swapchain(index) => self
                .swapchain
                .as_ref()
                .map(|swapchain| swapchain.image(index as usize)),
        }
    }
}

impl GpuBackend for Renderer {
    fn wait_for_fence(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<()> {
        self.frames[slot].render_fence().wait(timeout_ns)
    }

    fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frames[slot].render_fence().reset()
    }

    fn acquire_image(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<AcquireOutcome> {
        let semaphore = self.frames[slot].swapchain_semaphore().handle();
        match self.swapchain()?.acquire_next_image(semaphore, timeout_ns) {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => {
                error!("Swapchain image acquisition failed: {}", e);
                Err(e.into())
            }
        }
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<()> {
        let cmd = self.frames[slot].command_buffer();
        cmd.reset()?;
        cmd.begin()
    }

    fn transition_image(
        &mut self,
        slot: usize,
        image: FrameImage,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        match self.frame_image(image) {
            Some(handle) => self.frames[slot]
                .command_buffer()
                .transition_image(handle, old_layout, new_layout),
            None => warn!("No image for {:?}; transition skipped", image),
        }
    }

    fn dispatch_effect(
        &mut self,
        slot: usize,
        effect_index: usize,
        constants: &ComputePushConstants,
        groups: [u32; 3],
    ) {
        let Some(effect) = self.effect_pipelines.get(effect_index) else {
            warn!("No pipeline for effect {}; dispatch skipped", effect_index);
            return;
        };
        let cmd = self.frames[slot].command_buffer();
        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, effect.pipeline);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            effect.layout,
            0,
            &[self.descriptor_set],
        );
        cmd.push_constants(effect.layout, vk::ShaderStageFlags::COMPUTE, constants);
        cmd.dispatch(groups[0], groups[1], groups[2]);
    }

    fn copy_to_swapchain(&mut self, slot: usize, image_index: u32) {
        let Some(swapchain) = self.swapchain.as_ref() else {
            warn!("No swapchain; copy skipped");
            return;
        };
        self.frames[slot].command_buffer().blit_image(
            self.render_target.image,
            self.render_target.extent,
            swapchain.image(image_index as usize),
            swapchain.extent(),
        );
    }

    fn draw_overlay(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("no swapchain".to_string()))?;
        let extent = swapchain.extent();

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(swapchain.image_view(image_index as usize))
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);

        let cmd = self.frames[slot].command_buffer();
        cmd.begin_rendering(&rendering_info);
        let result = self.overlay.cmd_draw(slot, cmd.handle(), extent);
        cmd.end_rendering();
        result
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.frames[slot].command_buffer().end()
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        let frame = &self.frames[slot];

        let command_infos = [frame.command_buffer().submit_info()];
        let wait_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.swapchain_semaphore().handle())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .value(1)];
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(frame.render_semaphore().handle())
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)
            .value(1)];

        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .command_buffer_infos(&command_infos)
            .signal_semaphore_infos(&signal_infos);

        // SAFETY: the command buffer was just ended, the swapchain semaphore
        // has a pending signal from acquire, and the fence was reset after
        // its last wait.
        unsafe {
            self.device
                .submit_graphics(&[submit], frame.render_fence().handle())
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let wait_semaphore = self.frames[slot].render_semaphore().handle();
        let queue = self.device.present_queue();
        match self.swapchain()?.present(queue, image_index, wait_semaphore) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => {
                error!("Presentation failed: {}", e);
                Err(e.into())
            }
        }
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn destroy_swapchain(&mut self) {
        if self.swapchain.take().is_some() {
            debug!("Swapchain destroyed");
        }
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> RhiResult<vk::Extent2D> {
        self.swapchain = None;
        let swapchain = Swapchain::new(
            &self.instance,
            Arc::clone(&*self.device),
            self.surface.handle(),
            width,
            height,
        )?;
        let extent = swapchain.extent();
        self.swapchain = Some(swapchain);
        Ok(extent)
    }

    fn render_extent(&self) -> vk::Extent2D {
        self.render_target.extent
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map(Swapchain::extent)
            .unwrap_or_default()
    }

    fn slot_reclaimed(&mut self, slot: usize) {
        if let Err(e) = self.overlay.release_slot(slot) {
            warn!("Failed to free UI textures for slot {}: {}", slot, e);
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        info!("Destroying renderer...");

        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle: {:?}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.overlay);
        }

        self.deletion_queue.flush();

        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.immediate);
        }

        self.swapchain = None;

        unsafe {
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_extent_prefers_override() {
        let extent = choose_render_extent(Some([1280, 720]), Some((2560, 1440)), (800, 800));
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_render_extent_uses_desktop() {
        let extent = choose_render_extent(None, Some((2560, 1440)), (800, 800));
        assert_eq!((extent.width, extent.height), (2560, 1440));
    }

    #[test]
    fn test_render_extent_falls_back_to_window() {
        let extent = choose_render_extent(None, None, (800, 600));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_render_extent_never_zero() {
        let extent = choose_render_extent(None, None, (0, 0));
        assert_eq!((extent.width, extent.height), (1, 1));
    }
}
