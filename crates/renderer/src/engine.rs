//! The per-frame state machine.
//!
//! [`FrameEngine::draw_frame`] runs one frame through a [`GpuBackend`]:
//!
//! 1. rebuild the swapchain if a resize is pending
//! 2. pick the slot for the current frame counter and wait on its fence
//! 3. flush the slot's deletion queue
//! 4. acquire a swapchain image (an out-of-date swapchain ends the frame here)
//! 5. re-arm the slot's fence
//! 6. record: effect dispatch into the render target, blit to the swapchain
//!    image, UI overlay, transition for presentation
//! 7. submit and present
//! 8. advance the frame counter
//!
//! Any error returned from the backend is unrecoverable; the caller logs it
//! and exits.

use ash::vk;
use glam::Vec4;
use renderer_core::TimeoutConfig;
use renderer_rhi::RhiResult;
use tracing::{debug, info, trace, warn};

use crate::backend::{AcquireOutcome, FrameImage, GpuBackend, PresentOutcome};
use crate::deletion_queue::DeletionQueue;
use crate::effects::EffectLibrary;
use crate::frame::slot_index;
use crate::MAX_FRAMES_IN_FLIGHT;

/// Local workgroup size of every effect shader, in both X and Y.
pub const WORKGROUP_SIZE: u32 = 16;

/// Workgroup counts that cover `extent` with at most 15 pixels of overhang
/// per axis.
#[inline]
pub fn dispatch_grid(extent: vk::Extent2D) -> [u32; 3] {
    [
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
        1,
    ]
}

/// Host-side inputs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Current drawable size of the window.
    pub window_extent: (u32, u32),
    /// Seconds since the renderer started.
    pub elapsed_secs: f32,
}

/// What happened to a frame that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation.
    Presented { slot: usize, image_index: u32 },
    /// A resize is pending but the window has no drawable area.
    SkippedNoSurface,
    /// The swapchain went out of date on acquire; it is rebuilt next frame.
    SkippedOutOfDate,
}

/// Frame loop state: the backend, the per-slot deletion queues, the frame
/// counter and the pending-resize flag.
pub struct FrameEngine<B: GpuBackend> {
    deletion_queues: [DeletionQueue; MAX_FRAMES_IN_FLIGHT],
    backend: B,
    effects: EffectLibrary,
    timeouts: TimeoutConfig,
    frame_number: u64,
    resize_requested: bool,
}

impl<B: GpuBackend> FrameEngine<B> {
    pub fn new(backend: B, effects: EffectLibrary, timeouts: TimeoutConfig) -> Self {
        info!(
            "Frame engine ready: {} frame(s) in flight, {} effect(s)",
            MAX_FRAMES_IN_FLIGHT,
            effects.len()
        );
        Self {
            deletion_queues: std::array::from_fn(|_| DeletionQueue::new()),
            backend,
            effects,
            timeouts,
            frame_number: 0,
            resize_requested: false,
        }
    }

    /// Marks the swapchain stale. It is rebuilt at the start of the next frame.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Number of frames that reached presentation.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        slot_index(self.frame_number)
    }

    /// Deletion queue of the frame submitted last. Actions pushed here run
    /// once that frame's fence has been waited on, when its slot comes round
    /// again.
    pub fn last_frame_deletion_queue(&mut self) -> &mut DeletionQueue {
        &mut self.deletion_queues[slot_index(self.frame_number.wrapping_sub(1))]
    }

    pub fn effects(&self) -> &EffectLibrary {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectLibrary {
        &mut self.effects
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Returns the first backend error. Out-of-date and suboptimal swapchain
    /// statuses are not errors: they set the resize flag instead.
    pub fn draw_frame(&mut self, input: FrameInput) -> RhiResult<FrameOutcome> {
        if self.resize_requested {
            let (width, height) = input.window_extent;
            if width == 0 || height == 0 {
                trace!("Resize pending but window has no area; skipping frame");
                return Ok(FrameOutcome::SkippedNoSurface);
            }
            self.recreate_swapchain(width, height)?;
        }

        let slot = slot_index(self.frame_number);

        self.backend
            .wait_for_fence(slot, self.timeouts.frame_fence_ns)?;
        self.backend.slot_reclaimed(slot);
        self.deletion_queues[slot].flush();

        let image_index = match self.backend.acquire_image(slot, self.timeouts.acquire_ns)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    debug!("Acquired image from a suboptimal swapchain");
                    self.resize_requested = true;
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire; frame {} skipped", self.frame_number);
                self.resize_requested = true;
                return Ok(FrameOutcome::SkippedOutOfDate);
            }
        };

        self.backend.reset_fence(slot)?;

        self.record(slot, image_index, input.elapsed_secs)?;

        self.backend.submit(slot)?;

        match self.backend.present(slot, image_index)? {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                debug!("Swapchain stale after present; resize requested");
                self.resize_requested = true;
            }
        }

        self.frame_number += 1;
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn record(&mut self, slot: usize, image_index: u32, elapsed_secs: f32) -> RhiResult<()> {
        let swapchain_extent = self.backend.swapchain_extent();
        let render_extent = self.backend.render_extent();
        let swapchain_image = FrameImage::Swapchain(image_index);

        self.backend.begin_commands(slot)?;

        self.backend.transition_image(
            slot,
            FrameImage::RenderTarget,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );

        let effect_index = self.effects.current_index();
        if let Some(effect) = self.effects.current_mut() {
            let aspect = if swapchain_extent.height == 0 {
                1.0
            } else {
                swapchain_extent.width as f32 / swapchain_extent.height as f32
            };
            let data1 = effect.data.data1;
            effect.data.data1 = Vec4::new(elapsed_secs, aspect, data1.z, data1.w);

            self.backend.dispatch_effect(
                slot,
                effect_index,
                &effect.data,
                dispatch_grid(render_extent),
            );
        }

        self.backend.transition_image(
            slot,
            FrameImage::RenderTarget,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        self.backend.transition_image(
            slot,
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        self.backend.copy_to_swapchain(slot, image_index);

        self.backend.transition_image(
            slot,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        self.backend.draw_overlay(slot, image_index)?;

        self.backend.transition_image(
            slot,
            swapchain_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        self.backend.end_commands(slot)
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.backend.wait_idle()?;
        self.backend.destroy_swapchain();
        let extent = self.backend.create_swapchain(width, height)?;
        self.resize_requested = false;
        info!(
            "Swapchain recreated: requested {}x{}, got {}x{}",
            width, height, extent.width, extent.height
        );
        Ok(())
    }

    /// Waits for the GPU and runs every slot's pending release actions.
    ///
    /// Called automatically on drop; calling it earlier is harmless.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            warn!("Device wait failed during shutdown: {}", e);
        }
        for queue in &mut self.deletion_queues {
            queue.flush();
        }
    }
}

impl<B: GpuBackend> Drop for FrameEngine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::ComputeEffect;
    use renderer_rhi::RhiError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        WaitFence(usize),
        Reclaimed(usize),
        ResetFence(usize),
        Acquire(usize),
        Begin(usize),
        Transition(FrameImage, vk::ImageLayout, vk::ImageLayout),
        Dispatch(usize, [u32; 3], Vec4),
        Copy(u32),
        Overlay(u32),
        End(usize),
        Submit(usize),
        Present(usize, u32),
        WaitIdle,
        DestroySwapchain,
        CreateSwapchain(u32, u32),
    }

    /// Scripted backend recording every call.
    struct MockBackend {
        log: Rc<RefCell<Vec<Op>>>,
        acquire_script: VecDeque<AcquireOutcome>,
        present_script: VecDeque<PresentOutcome>,
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        /// Polls a slow fence needs before it signals.
        fence_delay: usize,
        fence_timeout: bool,
        image_count: u32,
        next_image: u32,
        swapchain_generation: u32,
        render_extent: vk::Extent2D,
        swapchain_extent: vk::Extent2D,
    }

    impl MockBackend {
        fn new(log: Rc<RefCell<Vec<Op>>>) -> Self {
            Self {
                log,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                fence_delay: 0,
                fence_timeout: false,
                image_count: 2,
                next_image: 0,
                swapchain_generation: 0,
                render_extent: vk::Extent2D {
                    width: 800,
                    height: 800,
                },
                swapchain_extent: vk::Extent2D {
                    width: 800,
                    height: 800,
                },
            }
        }

        fn push(&self, op: Op) {
            self.log.borrow_mut().push(op);
        }
    }

    impl GpuBackend for MockBackend {
        fn wait_for_fence(&mut self, slot: usize, _timeout_ns: u64) -> RhiResult<()> {
            self.push(Op::WaitFence(slot));
            if self.fence_timeout {
                return Err(RhiError::VulkanError(vk::Result::TIMEOUT));
            }
            // Spin until the simulated GPU retires the previous submission.
            while !self.fence_signaled[slot] {
                if self.fence_delay == 0 {
                    self.fence_signaled[slot] = true;
                } else {
                    self.fence_delay -= 1;
                }
            }
            Ok(())
        }

        fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
            assert!(self.fence_signaled[slot], "reset of an unsignaled fence");
            self.fence_signaled[slot] = false;
            self.push(Op::ResetFence(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize, _timeout_ns: u64) -> RhiResult<AcquireOutcome> {
            self.push(Op::Acquire(slot));
            if let Some(outcome) = self.acquire_script.pop_front() {
                return Ok(outcome);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn begin_commands(&mut self, slot: usize) -> RhiResult<()> {
            assert!(
                !self.fence_signaled[slot],
                "recording into slot {} whose fence was not re-armed",
                slot
            );
            self.push(Op::Begin(slot));
            Ok(())
        }

        fn transition_image(
            &mut self,
            _slot: usize,
            image: FrameImage,
            old_layout: vk::ImageLayout,
            new_layout: vk::ImageLayout,
        ) {
            self.push(Op::Transition(image, old_layout, new_layout));
        }

        fn dispatch_effect(
            &mut self,
            _slot: usize,
            effect_index: usize,
            constants: &crate::effects::ComputePushConstants,
            groups: [u32; 3],
        ) {
            self.push(Op::Dispatch(effect_index, groups, constants.data1));
        }

        fn copy_to_swapchain(&mut self, _slot: usize, image_index: u32) {
            self.push(Op::Copy(image_index));
        }

        fn draw_overlay(&mut self, _slot: usize, image_index: u32) -> RhiResult<()> {
            self.push(Op::Overlay(image_index));
            Ok(())
        }

        fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
            self.push(Op::End(slot));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RhiResult<()> {
            self.push(Op::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
            self.push(Op::Present(slot, image_index));
            // The GPU finishes the frame some time after presentation.
            self.fence_signaled[slot] = false;
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(PresentOutcome::Presented))
        }

        fn wait_idle(&mut self) -> RhiResult<()> {
            self.push(Op::WaitIdle);
            Ok(())
        }

        fn destroy_swapchain(&mut self) {
            self.push(Op::DestroySwapchain);
        }

        fn create_swapchain(&mut self, width: u32, height: u32) -> RhiResult<vk::Extent2D> {
            self.push(Op::CreateSwapchain(width, height));
            self.swapchain_generation += 1;
            self.next_image = 0;
            self.swapchain_extent = vk::Extent2D { width, height };
            Ok(self.swapchain_extent)
        }

        fn render_extent(&self) -> vk::Extent2D {
            self.render_extent
        }

        fn swapchain_extent(&self) -> vk::Extent2D {
            self.swapchain_extent
        }

        fn slot_reclaimed(&mut self, slot: usize) {
            self.push(Op::Reclaimed(slot));
        }
    }

    fn engine_with_one_effect() -> (FrameEngine<MockBackend>, Rc<RefCell<Vec<Op>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut effects = EffectLibrary::new();
        effects.push(ComputeEffect::new("gradient"));
        let engine = FrameEngine::new(
            MockBackend::new(log.clone()),
            effects,
            TimeoutConfig::default(),
        );
        (engine, log)
    }

    fn input(width: u32, height: u32) -> FrameInput {
        FrameInput {
            window_extent: (width, height),
            elapsed_secs: 1.5,
        }
    }

    fn position(log: &[Op], op: &Op) -> usize {
        log.iter()
            .position(|o| o == op)
            .unwrap_or_else(|| panic!("{:?} not in log", op))
    }

    #[test]
    fn test_dispatch_grid_covers_target() {
        let grid = dispatch_grid(vk::Extent2D {
            width: 800,
            height: 800,
        });
        assert_eq!(grid, [50, 50, 1]);

        let grid = dispatch_grid(vk::Extent2D {
            width: 801,
            height: 799,
        });
        assert_eq!(grid, [51, 50, 1]);
    }

    #[test]
    fn test_dispatch_grid_overhang_below_workgroup() {
        for width in [1u32, 15, 16, 17, 1919, 1920] {
            let [x, _, _] = dispatch_grid(vk::Extent2D { width, height: 1 });
            assert!(x * WORKGROUP_SIZE >= width);
            assert!(x * WORKGROUP_SIZE - width < WORKGROUP_SIZE);
        }
    }

    #[test]
    fn test_frame_records_in_order() {
        let (mut engine, log) = engine_with_one_effect();

        let outcome = engine.draw_frame(input(800, 800)).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                image_index: 0
            }
        );

        let swap = FrameImage::Swapchain(0);
        let expected = vec![
            Op::WaitFence(0),
            Op::Reclaimed(0),
            Op::Acquire(0),
            Op::ResetFence(0),
            Op::Begin(0),
            Op::Transition(
                FrameImage::RenderTarget,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
            ),
            Op::Dispatch(0, [50, 50, 1], Vec4::new(1.5, 1.0, 0.0, 0.0)),
            Op::Transition(
                FrameImage::RenderTarget,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ),
            Op::Transition(
                swap,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
            Op::Copy(0),
            Op::Transition(
                swap,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Op::Overlay(0),
            Op::Transition(
                swap,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            ),
            Op::End(0),
            Op::Submit(0),
            Op::Present(0, 0),
        ];
        assert_eq!(*log.borrow(), expected);
        assert_eq!(engine.frame_number(), 1);
    }

    #[test]
    fn test_end_to_end_three_frames() {
        let (mut engine, log) = engine_with_one_effect();

        for _ in 0..3 {
            engine.draw_frame(input(800, 800)).unwrap();
        }

        assert_eq!(engine.frame_number(), 3);

        let log = log.borrow();
        let begins: Vec<usize> = log
            .iter()
            .filter_map(|op| match op {
                Op::Begin(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(begins, vec![0, 1, 0]);

        let presents: Vec<(usize, u32)> = log
            .iter()
            .filter_map(|op| match op {
                Op::Present(slot, image) => Some((*slot, *image)),
                _ => None,
            })
            .collect();
        assert_eq!(presents, vec![(0, 0), (1, 1), (0, 0)]);
        assert!(!log.contains(&Op::DestroySwapchain));
    }

    #[test]
    fn test_slot_reuse_waits_for_slow_fence() {
        let (mut engine, log) = engine_with_one_effect();
        engine.draw_frame(input(800, 800)).unwrap();
        engine.draw_frame(input(800, 800)).unwrap();

        // Slot 0 is still busy on the GPU for a while.
        engine.backend_mut().fence_delay = 1000;
        log.borrow_mut().clear();

        engine.draw_frame(input(800, 800)).unwrap();

        let log = log.borrow();
        let wait = position(&log, &Op::WaitFence(0));
        let reset = position(&log, &Op::ResetFence(0));
        let begin = position(&log, &Op::Begin(0));
        assert!(wait < reset && reset < begin);
        assert_eq!(engine.backend().fence_delay, 0);
    }

    #[test]
    fn test_slot_queue_flushed_after_fence_wait() {
        let (mut engine, log) = engine_with_one_effect();
        engine.draw_frame(input(800, 800)).unwrap();

        // The probe stands in for a release action of frame 0.
        let probe_log = log.clone();
        engine
            .last_frame_deletion_queue()
            .push(move || probe_log.borrow_mut().push(Op::DestroySwapchain));

        engine.draw_frame(input(800, 800)).unwrap();
        assert!(!log.borrow().contains(&Op::DestroySwapchain));

        log.borrow_mut().clear();
        engine.draw_frame(input(800, 800)).unwrap();

        let log = log.borrow();
        let wait = position(&log, &Op::WaitFence(0));
        let released = position(&log, &Op::DestroySwapchain);
        let acquire = position(&log, &Op::Acquire(0));
        assert!(wait < released && released < acquire);
    }

    #[test]
    fn test_out_of_date_acquire_recreates_next_frame() {
        let (mut engine, log) = engine_with_one_effect();
        engine
            .backend_mut()
            .acquire_script
            .push_back(AcquireOutcome::OutOfDate);

        let outcome = engine.draw_frame(input(800, 800)).unwrap();
        assert_eq!(outcome, FrameOutcome::SkippedOutOfDate);
        assert!(engine.resize_requested());
        assert_eq!(engine.frame_number(), 0);
        {
            let log = log.borrow();
            assert!(!log.iter().any(|op| matches!(op, Op::Present(..))));
            assert!(!log.iter().any(|op| matches!(op, Op::Begin(..))));
            assert!(!log.contains(&Op::ResetFence(0)));
        }

        log.borrow_mut().clear();
        engine.draw_frame(input(1024, 600)).unwrap();

        let log = log.borrow();
        assert_eq!(
            &log[..3],
            &[
                Op::WaitIdle,
                Op::DestroySwapchain,
                Op::CreateSwapchain(1024, 600)
            ]
        );
        let created = position(&log, &Op::CreateSwapchain(1024, 600));
        let present = log
            .iter()
            .position(|op| matches!(op, Op::Present(..)))
            .unwrap();
        assert!(created < present);
        assert!(!engine.resize_requested());
        assert_eq!(engine.backend().swapchain_generation, 1);
        assert_eq!(engine.frame_number(), 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_presents() {
        let (mut engine, log) = engine_with_one_effect();
        engine
            .backend_mut()
            .acquire_script
            .push_back(AcquireOutcome::Acquired {
                image_index: 1,
                suboptimal: true,
            });

        let outcome = engine.draw_frame(input(800, 800)).unwrap();

        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                image_index: 1
            }
        );
        assert!(engine.resize_requested());
        assert!(log.borrow().contains(&Op::Present(0, 1)));
        assert_eq!(engine.frame_number(), 1);
    }

    #[test]
    fn test_stale_present_flags_resize_and_advances() {
        let (mut engine, log) = engine_with_one_effect();
        engine
            .backend_mut()
            .present_script
            .push_back(PresentOutcome::OutOfDate);

        engine.draw_frame(input(800, 800)).unwrap();
        assert!(engine.resize_requested());
        assert_eq!(engine.frame_number(), 1);

        engine.draw_frame(input(640, 480)).unwrap();
        assert!(log.borrow().contains(&Op::CreateSwapchain(640, 480)));
    }

    #[test]
    fn test_explicit_resize_request() {
        let (mut engine, log) = engine_with_one_effect();
        engine.request_resize();

        engine.draw_frame(input(300, 200)).unwrap();

        let log = log.borrow();
        assert_eq!(log[2], Op::CreateSwapchain(300, 200));
        // Aspect ratio follows the new swapchain.
        let data1 = log
            .iter()
            .find_map(|op| match op {
                Op::Dispatch(_, _, data1) => Some(*data1),
                _ => None,
            })
            .unwrap();
        assert_eq!(data1.y, 1.5);
    }

    #[test]
    fn test_resize_with_zero_window_waits() {
        let (mut engine, log) = engine_with_one_effect();
        engine.request_resize();

        let outcome = engine.draw_frame(input(0, 0)).unwrap();

        assert_eq!(outcome, FrameOutcome::SkippedNoSurface);
        assert!(log.borrow().is_empty());
        assert!(engine.resize_requested());
        assert_eq!(engine.frame_number(), 0);
    }

    #[test]
    fn test_fence_timeout_is_fatal() {
        let (mut engine, log) = engine_with_one_effect();
        engine.backend_mut().fence_timeout = true;

        let err = engine.draw_frame(input(800, 800)).unwrap_err();

        assert!(matches!(err, RhiError::VulkanError(vk::Result::TIMEOUT)));
        assert_eq!(engine.frame_number(), 0);
        assert_eq!(*log.borrow(), vec![Op::WaitFence(0)]);
    }

    #[test]
    fn test_no_effects_skips_dispatch() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut engine = FrameEngine::new(
            MockBackend::new(log.clone()),
            EffectLibrary::new(),
            TimeoutConfig::default(),
        );

        engine.draw_frame(input(800, 800)).unwrap();

        let log = log.borrow();
        assert!(!log.iter().any(|op| matches!(op, Op::Dispatch(..))));
        assert!(log.contains(&Op::Present(0, 0)));
    }

    #[test]
    fn test_push_constants_keep_user_fields() {
        let (mut engine, log) = engine_with_one_effect();
        {
            let effect = engine.effects_mut().current_mut().unwrap();
            effect.data.data1.z = 7.0;
            effect.data.data2 = Vec4::ONE;
        }

        engine.draw_frame(input(800, 800)).unwrap();

        assert!(log
            .borrow()
            .contains(&Op::Dispatch(0, [50, 50, 1], Vec4::new(1.5, 1.0, 7.0, 0.0))));
        assert_eq!(
            engine.effects().current().unwrap().data.data2,
            Vec4::ONE
        );
    }

    #[test]
    fn test_shutdown_flushes_slot_queues() {
        let (mut engine, log) = engine_with_one_effect();
        let flushed = Rc::new(RefCell::new(false));
        let f = flushed.clone();
        engine.last_frame_deletion_queue().push(move || *f.borrow_mut() = true);

        drop(engine);

        assert!(*flushed.borrow());
        assert_eq!(*log.borrow(), vec![Op::WaitIdle]);
    }
}
