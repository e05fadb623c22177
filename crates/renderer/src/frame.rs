//! Per-frame GPU resources.
//!
//! The renderer keeps [`MAX_FRAMES_IN_FLIGHT`] slots and rotates through them
//! by frame counter, so the CPU can record one frame while the GPU is still
//! executing the previous one.

use std::sync::Arc;

use renderer_rhi::RhiResult;
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::device::Device;
use renderer_rhi::sync::{Fence, Semaphore};
use tracing::debug;

use crate::MAX_FRAMES_IN_FLIGHT;

/// Slot used by the frame with counter `frame_number`.
#[inline]
pub fn slot_index(frame_number: u64) -> usize {
    (frame_number % MAX_FRAMES_IN_FLIGHT as u64) as usize
}

/// Command recording and synchronization state owned by one frame in flight.
///
/// - `swapchain_semaphore` is signaled when the acquired image is ready.
/// - `render_semaphore` is signaled when the frame's commands finish, and
///   presentation waits on it.
/// - `render_fence` is signaled when the frame's submission retires. It is
///   created signaled so the first wait on a fresh slot returns immediately.
pub struct FrameSlot {
    // Buffer before pool: the handle is freed with the pool.
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    swapchain_semaphore: Semaphore,
    render_semaphore: Semaphore,
    render_fence: Fence,
}

impl FrameSlot {
    /// Creates a slot on the graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if any pool, buffer or sync object cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let swapchain_semaphore = Semaphore::new(device.clone())?;
        let render_semaphore = Semaphore::new(device.clone())?;
        let render_fence = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            command_pool,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
        })
    }

    /// Creates the whole pool of [`MAX_FRAMES_IN_FLIGHT`] slots.
    pub fn create_pool(device: &Arc<Device>) -> RhiResult<Vec<Self>> {
        let slots = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} frame slot(s)", slots.len());
        Ok(slots)
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn swapchain_semaphore(&self) -> &Semaphore {
        &self.swapchain_semaphore
    }

    #[inline]
    pub fn render_semaphore(&self) -> &Semaphore {
        &self.render_semaphore
    }

    #[inline]
    pub fn render_fence(&self) -> &Fence {
        &self.render_fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_alternate() {
        let slots: Vec<usize> = (0..6).map(slot_index).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_slot_index_large_counter() {
        assert_eq!(slot_index(u64::MAX), 1);
        assert_eq!(slot_index(u64::MAX - 1), 0);
    }

    #[test]
    fn test_slot_index_in_range() {
        for frame in 0..100 {
            assert!(slot_index(frame) < MAX_FRAMES_IN_FLIGHT);
        }
    }
}
