//! Device-local images and layout-transition helpers.
//!
//! [`AllocatedImage`] is a GPU-only 2D color image with one view, backed by
//! gpu-allocator. The render target that compute effects write into is one of
//! these, in [`RENDER_TARGET_FORMAT`] with [`RENDER_TARGET_USAGE`].
//!
//! [`transition_masks`] picks the pipeline stages and access masks for each
//! layout change the frame performs, so barriers only cover the work that
//! actually touches the image.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// High-precision format the compute effects write.
pub const RENDER_TARGET_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Storage for compute, transfer source for the blit, transfer destination
/// for clears and color attachment for any future raster pass.
pub const RENDER_TARGET_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

/// Whole-image color subresource range (all mips, all layers).
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .base_array_layer(0)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
}

/// Stage and access scopes for one image layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// Barrier scopes for `old` -> `new`.
///
/// Unrecognised pairs fall back to a full `ALL_COMMANDS` barrier with
/// memory read/write on both sides, which is correct but slow.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> TransitionMasks {
    use vk::AccessFlags2 as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags2 as S;

    let (src_stage, src_access, dst_stage, dst_access) = match (old, new) {
        // Render target, start of frame: contents are discarded.
        (L::UNDEFINED, L::GENERAL) => (
            S::TOP_OF_PIPE,
            A::NONE,
            S::COMPUTE_SHADER | S::CLEAR,
            A::SHADER_STORAGE_WRITE | A::TRANSFER_WRITE,
        ),
        // Render target, compute done, blit next.
        (L::GENERAL, L::TRANSFER_SRC_OPTIMAL) => (
            S::COMPUTE_SHADER,
            A::SHADER_STORAGE_WRITE,
            S::BLIT,
            A::TRANSFER_READ,
        ),
        // Freshly acquired swapchain image about to be blitted into. The
        // acquire semaphore is waited at COLOR_ATTACHMENT_OUTPUT, so chain
        // from there.
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::NONE,
            S::BLIT | S::CLEAR,
            A::TRANSFER_WRITE,
        ),
        // Swapchain image after the blit, UI drawn on top.
        (L::TRANSFER_DST_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL) => (
            S::BLIT,
            A::TRANSFER_WRITE,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::BOTTOM_OF_PIPE,
            A::NONE,
        ),
        // Startup clear through the immediate channel.
        (L::TRANSFER_DST_OPTIMAL, L::GENERAL) => (
            S::CLEAR,
            A::TRANSFER_WRITE,
            S::COMPUTE_SHADER,
            A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE,
        ),
        _ => {
            warn!(
                "No tailored barrier for {:?} -> {:?}, using ALL_COMMANDS",
                old, new
            );
            (
                S::ALL_COMMANDS,
                A::MEMORY_WRITE,
                S::ALL_COMMANDS,
                A::MEMORY_READ | A::MEMORY_WRITE,
            )
        }
    };

    TransitionMasks {
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    }
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

/// Blit region covering the whole of both images.
pub fn blit_region(src_extent: vk::Extent2D, dst_extent: vk::Extent2D) -> vk::ImageBlit2<'static> {
    let layer = vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1);

    vk::ImageBlit2::default()
        .src_subresource(layer)
        .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
        .dst_subresource(layer)
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)])
}

/// GPU-only 2D color image with a single view.
///
/// Destroys view, then image, then frees the allocation.
pub struct AllocatedImage {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl AllocatedImage {
    /// Creates a single-mip 2D image.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero-sized extent, or the
    /// Vulkan / allocator error if creation, allocation or binding fails.
    pub fn new(
        device: Arc<Device>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' must have a non-zero extent, got {}x{}",
                name, extent.width, extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.lock_allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        // From here on Drop cleans up whatever was created.
        let mut allocated = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: Some(allocation),
            format,
            extent,
        };

        if let Some(allocation) = &allocated.allocation {
            unsafe {
                allocated.device.handle().bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        allocated.image_view = unsafe {
            allocated
                .device
                .handle()
                .create_image_view(&view_info, None)?
        };

        info!(
            "Created image '{}': {}x{} ({:?})",
            name, extent.width, extent.height, format
        );

        Ok(allocated)
    }

    /// Creates the compute render target.
    ///
    /// # Errors
    ///
    /// See [`AllocatedImage::new`].
    pub fn render_target(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        Self::new(
            device,
            "render_target",
            extent,
            RENDER_TARGET_FORMAT,
            RENDER_TARGET_USAGE,
        )
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device
                    .handle()
                    .destroy_image_view(self.image_view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking image allocation: {}", e),
            }
        }

        debug!(
            "Destroyed image: {}x{} ({:?})",
            self.extent.width, self.extent.height, self.format
        );
    }
}
