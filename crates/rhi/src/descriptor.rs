//! Descriptor layouts, pools and writes.
//!
//! The pool is sized by ratios: each [`PoolSizeRatio`] reserves
//! `ratio * max_sets` descriptors of its type. The renderer needs only one
//! storage-image set, so the pool is small and never freed piecemeal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::descriptor::{
//!     storage_image_binding, write_storage_image, DescriptorPool, DescriptorSetLayout,
//!     PoolSizeRatio,
//! };
//!
//! # fn example(device: Arc<Device>, view: vk::ImageView) -> Result<(), renderer_rhi::RhiError> {
//! let pool = DescriptorPool::new(
//!     device.clone(),
//!     10,
//!     &[PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)],
//! )?;
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[storage_image_binding(0, vk::ShaderStageFlags::COMPUTE)],
//! )?;
//! let set = pool.allocate(&layout)?;
//! write_storage_image(&device, set, 0, view);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from `bindings`.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Created descriptor set layout with {} binding(s)", bindings.len());

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// How many descriptors of one type to reserve per set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// Expands ratios into concrete pool sizes for `max_sets` sets.
///
/// Counts are truncated and never drop below one.
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|r| {
            vk::DescriptorPoolSize::default()
                .ty(r.ty)
                .descriptor_count(((r.ratio * max_sets as f32) as u32).max(1))
        })
        .collect()
}

/// Descriptor pool sized from [`PoolSizeRatio`]s.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool for up to `max_sets` sets.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>, max_sets: u32, ratios: &[PoolSizeRatio]) -> RhiResult<Self> {
        let sizes = pool_sizes(max_sets, ratios);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={:?}",
            max_sets,
            sizes
                .iter()
                .map(|s| (s.ty, s.descriptor_count))
                .collect::<Vec<_>>()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set with `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted or allocation fails.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("driver returned no descriptor set".to_string()))
    }

    /// Returns every set allocated from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails. No set may still be in use by the GPU.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Single storage-image binding.
#[inline]
pub fn storage_image_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Image info for a storage image accessed in `GENERAL` layout.
#[inline]
pub fn storage_image_info(image_view: vk::ImageView) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(vk::ImageLayout::GENERAL)
}

/// Points `binding` of `set` at `image_view` as a storage image.
pub fn write_storage_image(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
) {
    let image_infos = [storage_image_info(image_view)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(&image_infos);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sizes_scale_with_max_sets() {
        let sizes = pool_sizes(
            10,
            &[
                PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
                PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 0.5),
            ],
        );
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(sizes[0].descriptor_count, 10);
        assert_eq!(sizes[1].descriptor_count, 5);
    }

    #[test]
    fn test_pool_sizes_never_zero() {
        let sizes = pool_sizes(1, &[PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 0.1)]);
        assert_eq!(sizes[0].descriptor_count, 1);
    }

    #[test]
    fn test_storage_image_binding() {
        let binding = storage_image_binding(0, vk::ShaderStageFlags::COMPUTE);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::COMPUTE);
    }

    #[test]
    fn test_storage_image_info_uses_general_layout() {
        let info = storage_image_info(vk::ImageView::null());
        assert_eq!(info.image_layout, vk::ImageLayout::GENERAL);
        assert_eq!(info.sampler, vk::Sampler::null());
    }
}
