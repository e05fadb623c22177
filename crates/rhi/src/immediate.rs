//! Blocking one-shot command submission.
//!
//! [`ImmediateSubmit`] records a closure into a dedicated command buffer,
//! submits it to the graphics queue and waits for it to retire. It is used
//! outside the frame loop: clearing the render target at startup and
//! uploading UI textures.
//!
//! The channel has a single command buffer and fence, so at most one
//! submission is in flight and callers are serialized by `&mut self`.

use std::sync::Arc;

use ash::vk;
use tracing::{error, trace};

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::RhiResult;
use crate::sync::Fence;

/// The steps of a blocking one-shot submission.
///
/// [`submit_and_wait`] drives them in a fixed order; [`ImmediateSubmit`] is
/// the Vulkan implementation.
pub trait OneShotChannel {
    /// What the recording closure writes into.
    type Commands;

    fn reset_fence(&mut self) -> RhiResult<()>;
    fn reset_commands(&mut self) -> RhiResult<()>;
    fn begin(&mut self) -> RhiResult<()>;
    fn commands(&self) -> &Self::Commands;
    fn end(&mut self) -> RhiResult<()>;
    fn queue_submit(&mut self) -> RhiResult<()>;
    fn wait(&mut self, timeout_ns: u64) -> RhiResult<()>;
}

/// Resets, records, submits and waits once. The first failing step ends
/// the submission; a wait that times out is returned, never retried.
pub fn submit_and_wait<C, F>(channel: &mut C, timeout_ns: u64, record: F) -> RhiResult<()>
where
    C: OneShotChannel,
    F: FnOnce(&C::Commands),
{
    channel.reset_fence()?;
    channel.reset_commands()?;

    channel.begin()?;
    record(channel.commands());
    channel.end()?;

    channel.queue_submit()?;

    if let Err(e) = channel.wait(timeout_ns) {
        error!("Immediate submission did not complete: {}", e);
        return Err(e);
    }
    trace!("Immediate submission retired");
    Ok(())
}

/// Dedicated pool, command buffer and fence for synchronous submissions.
pub struct ImmediateSubmit {
    device: Arc<Device>,
    // Buffer before pool: the handle is freed with the pool.
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    fence: Fence,
}

impl ImmediateSubmit {
    /// Creates the channel on the graphics queue family.
    ///
    /// The fence starts signaled so the first submission does not wait on
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns an error if pool, command buffer or fence creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let fence = Fence::new(device.clone(), true)?;

        Ok(Self {
            device,
            command_buffer,
            command_pool,
            fence,
        })
    }

    /// Runs `record` into a fresh one-time command buffer, submits it, and
    /// blocks until the GPU has finished or `timeout_ns` elapses.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(vk::Result::TIMEOUT)` if the work does not retire
    /// in time; this is not retried. Other recording and submission failures
    /// are passed through.
    pub fn submit<F>(&mut self, timeout_ns: u64, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        submit_and_wait(self, timeout_ns, record)
    }

    /// Pool the channel records from, for APIs that manage their own uploads.
    #[inline]
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool.handle()
    }
}

impl OneShotChannel for ImmediateSubmit {
    type Commands = CommandBuffer;

    fn reset_fence(&mut self) -> RhiResult<()> {
        self.fence.reset()
    }

    fn reset_commands(&mut self) -> RhiResult<()> {
        self.command_buffer.reset()
    }

    fn begin(&mut self) -> RhiResult<()> {
        self.command_buffer.begin()
    }

    fn commands(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    fn end(&mut self) -> RhiResult<()> {
        self.command_buffer.end()
    }

    fn queue_submit(&mut self) -> RhiResult<()> {
        let command_infos = [self.command_buffer.submit_info()];
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&command_infos);
        unsafe { self.device.submit_graphics(&[submit], self.fence.handle()) }
    }

    fn wait(&mut self, timeout_ns: u64) -> RhiResult<()> {
        self.fence.wait(timeout_ns)
    }
}
