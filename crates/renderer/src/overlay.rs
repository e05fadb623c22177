//! Debug UI overlay.
//!
//! [`OverlayUi`] owns the egui context and its winit input state and turns a
//! UI closure into an [`OverlayFrame`]. [`OverlayPainter`] uploads that
//! frame's textures and draws its primitives into a swapchain image with
//! dynamic rendering.
//!
//! Textures egui asks to free are held per frame slot and released only once
//! that slot's fence has been waited on, since earlier frames may still
//! sample them. Uploads that overwrite an existing texture wait for the
//! device to go idle first. [`TextureLedger`] keeps that bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;

use ash::vk;
use egui::{ClippedPrimitive, TextureId, TexturesDelta, ViewportId};
use egui_ash_renderer::{DynamicRendering, Options, Renderer as EguiRenderer};
use glam::Vec4;
use renderer_core::FrameStats;
use renderer_platform::{Window, WindowEvent};
use renderer_rhi::device::Device;
use renderer_rhi::{RhiError, RhiResult};
use tracing::{debug, trace};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::effects::EffectLibrary;

/// Tessellated output of one UI pass.
#[derive(Default)]
pub struct OverlayFrame {
    pub primitives: Vec<ClippedPrimitive>,
    pub textures_delta: TexturesDelta,
    pub pixels_per_point: f32,
}

/// egui context plus the winit glue feeding it input.
pub struct OverlayUi {
    context: egui::Context,
    state: egui_winit::State,
}

impl OverlayUi {
    pub fn new(window: &Window) -> Self {
        let context = egui::Context::default();
        let state = egui_winit::State::new(
            context.clone(),
            ViewportId::ROOT,
            window.inner(),
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        Self { context, state }
    }

    /// Feeds a window event to egui. Returns `true` if the UI consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window.inner(), event).consumed
    }

    pub fn context(&self) -> &egui::Context {
        &self.context
    }

    /// Runs `build` for one frame and tessellates the result.
    pub fn run(&mut self, window: &Window, build: impl FnMut(&egui::Context)) -> OverlayFrame {
        let raw_input = self.state.take_egui_input(window.inner());
        let output = self.context.run(raw_input, build);
        self.state
            .handle_platform_output(window.inner(), output.platform_output);

        let primitives = self
            .context
            .tessellate(output.shapes, output.pixels_per_point);

        OverlayFrame {
            primitives,
            textures_delta: output.textures_delta,
            pixels_per_point: output.pixels_per_point,
        }
    }
}

/// Tracks which UI textures exist and when each freed one may be released.
///
/// Frees from frames that were never drawn carry over to the next drawn
/// frame, so a skipped frame cannot leak them.
#[derive(Debug, Default)]
pub struct TextureLedger {
    live: HashSet<TextureId>,
    undrawn_frees: Vec<TextureId>,
    parked: [Vec<TextureId>; MAX_FRAMES_IN_FLIGHT],
}

impl TextureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the free list out of `delta` and records its uploads.
    ///
    /// Returns `true` if an upload writes to a texture that already exists,
    /// which in-flight frames may still be sampling.
    pub fn stage(&mut self, delta: &mut TexturesDelta) -> bool {
        let mut overwrites = false;
        for (id, _) in &delta.set {
            if !self.live.insert(*id) {
                overwrites = true;
            }
        }
        self.undrawn_frees.append(&mut delta.free);
        overwrites
    }

    /// Hands every pending free to the frame just recorded on `slot`.
    pub fn park(&mut self, slot: usize) {
        let ids = std::mem::take(&mut self.undrawn_frees);
        self.parked[slot].extend(ids);
    }

    /// Frees parked on `slot`, forgotten by the ledger.
    pub fn release(&mut self, slot: usize) -> Vec<TextureId> {
        let ids = std::mem::take(&mut self.parked[slot]);
        for id in &ids {
            self.live.remove(id);
        }
        ids
    }

    pub fn is_live(&self, id: TextureId) -> bool {
        self.live.contains(&id)
    }
}

/// Draws [`OverlayFrame`]s with egui-ash-renderer.
pub struct OverlayPainter {
    renderer: EguiRenderer,
    device: Arc<Device>,
    frame: OverlayFrame,
    ledger: TextureLedger,
}

impl OverlayPainter {
    /// Creates a painter targeting `color_format` attachments.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OverlayError`] if the UI pipeline cannot be built.
    pub fn new(device: &Arc<Device>, color_format: vk::Format) -> RhiResult<Self> {
        let renderer = EguiRenderer::with_gpu_allocator(
            device.allocator().clone(),
            device.handle().clone(),
            DynamicRendering {
                color_attachment_format: color_format,
                depth_attachment_format: None,
            },
            Options {
                in_flight_frames: MAX_FRAMES_IN_FLIGHT,
                ..Default::default()
            },
        )
        .map_err(|e| RhiError::OverlayError(e.to_string()))?;

        debug!("UI overlay painter created for {:?}", color_format);

        Ok(Self {
            renderer,
            device: Arc::clone(device),
            frame: OverlayFrame::default(),
            ledger: TextureLedger::new(),
        })
    }

    /// Uploads new or changed textures and keeps `frame` for the next draw.
    ///
    /// Replacing a frame that was never drawn keeps its frees pending.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OverlayError`] if a texture upload fails, or the
    /// device error if waiting for idle fails.
    pub fn set_frame(
        &mut self,
        queue: vk::Queue,
        command_pool: vk::CommandPool,
        mut frame: OverlayFrame,
    ) -> RhiResult<()> {
        if self.ledger.stage(&mut frame.textures_delta) {
            debug!("UI texture update overwrites a live texture; waiting for idle");
            self.device.wait_idle()?;
        }
        if !frame.textures_delta.set.is_empty() {
            trace!("Uploading {} UI texture(s)", frame.textures_delta.set.len());
            self.renderer
                .set_textures(queue, command_pool, &frame.textures_delta.set)
                .map_err(|e| RhiError::OverlayError(e.to_string()))?;
        }
        self.frame = frame;
        Ok(())
    }

    /// Records the pending frame into `command_buffer`, which must be inside
    /// a dynamic rendering pass of `extent`.
    ///
    /// Textures the frame frees are parked on `slot`.
    pub fn cmd_draw(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) -> RhiResult<()> {
        let frame = std::mem::take(&mut self.frame);
        if !frame.primitives.is_empty() {
            self.renderer
                .cmd_draw(
                    command_buffer,
                    extent,
                    frame.pixels_per_point,
                    &frame.primitives,
                )
                .map_err(|e| RhiError::OverlayError(e.to_string()))?;
        }
        self.ledger.park(slot);
        Ok(())
    }

    /// Frees textures parked on `slot`. Only call after the slot's fence wait.
    pub fn release_slot(&mut self, slot: usize) -> RhiResult<()> {
        let ids = self.ledger.release(slot);
        if ids.is_empty() {
            return Ok(());
        }
        trace!("Freeing {} UI texture(s) from slot {}", ids.len(), slot);
        self.renderer
            .free_textures(&ids)
            .map_err(|e| RhiError::OverlayError(e.to_string()))
    }
}

/// Range of the effect slider: every loaded effect, or just `0` when none are.
pub fn effect_slider_range(effect_count: usize) -> std::ops::RangeInclusive<usize> {
    0..=effect_count.saturating_sub(1)
}

fn color_edit(ui: &mut egui::Ui, label: &str, value: &mut Vec4) {
    ui.horizontal(|ui| {
        let mut rgba = value.to_array();
        if ui.color_edit_button_rgba_unmultiplied(&mut rgba).changed() {
            *value = Vec4::from_array(rgba);
        }
        ui.label(label);
    });
}

/// The "Shaders selector" window: frame timing, the current effect, an
/// effect index slider and colour editors for the effect's parameters.
pub fn effect_selector(ctx: &egui::Context, effects: &mut EffectLibrary, stats: &FrameStats) {
    egui::Window::new("Shaders selector").show(ctx, |ui| {
        ui.label(format!(
            "Application average {:.3} ms/frame ({:.1} FPS)",
            stats.average_ms(),
            stats.fps()
        ));

        let mut index = effects.current_index();
        let Some(effect) = effects.current_mut() else {
            ui.label("No compute effects loaded");
            return;
        };
        ui.label(effect.name.as_str());

        color_edit(ui, "data 2", &mut effect.data.data2);
        color_edit(ui, "data 3", &mut effect.data.data3);
        color_edit(ui, "data 4", &mut effect.data.data4);

        let range = effect_slider_range(effects.len());
        if ui
            .add(egui::Slider::new(&mut index, range).text("Effect Index"))
            .changed()
        {
            effects.select(index);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::ComputeEffect;
    use egui::epaint::ImageDelta;
    use egui::{Color32, ColorImage, TextureOptions};

    fn full_upload(id: TextureId) -> (TextureId, ImageDelta) {
        (
            id,
            ImageDelta::full(ColorImage::new([2, 2], Color32::WHITE), TextureOptions::LINEAR),
        )
    }

    fn partial_upload(id: TextureId) -> (TextureId, ImageDelta) {
        (
            id,
            ImageDelta::partial(
                [1, 1],
                ColorImage::new([1, 1], Color32::BLACK),
                TextureOptions::LINEAR,
            ),
        )
    }

    #[test]
    fn test_new_textures_upload_without_waiting() {
        let mut ledger = TextureLedger::new();
        let mut delta = TexturesDelta {
            set: vec![full_upload(TextureId::Managed(0)), full_upload(TextureId::User(1))],
            free: Vec::new(),
        };

        assert!(!ledger.stage(&mut delta));
        assert!(ledger.is_live(TextureId::Managed(0)));
        assert!(ledger.is_live(TextureId::User(1)));
    }

    #[test]
    fn test_overwriting_live_texture_needs_idle() {
        let mut ledger = TextureLedger::new();
        let mut first = TexturesDelta {
            set: vec![full_upload(TextureId::Managed(0))],
            free: Vec::new(),
        };
        ledger.stage(&mut first);

        let mut rebuild = TexturesDelta {
            set: vec![full_upload(TextureId::Managed(0))],
            free: Vec::new(),
        };
        assert!(ledger.stage(&mut rebuild));

        let mut patch = TexturesDelta {
            set: vec![partial_upload(TextureId::Managed(0))],
            free: Vec::new(),
        };
        assert!(ledger.stage(&mut patch));
    }

    #[test]
    fn test_frees_of_undrawn_frames_carry_over() {
        let mut ledger = TextureLedger::new();
        let mut setup = TexturesDelta {
            set: vec![full_upload(TextureId::User(3)), full_upload(TextureId::User(4))],
            free: Vec::new(),
        };
        ledger.stage(&mut setup);

        // Two frames staged back to back; the first never reached a draw.
        let mut skipped = TexturesDelta {
            set: Vec::new(),
            free: vec![TextureId::User(3)],
        };
        ledger.stage(&mut skipped);
        assert!(skipped.free.is_empty());
        let mut drawn = TexturesDelta {
            set: Vec::new(),
            free: vec![TextureId::User(4)],
        };
        ledger.stage(&mut drawn);
        ledger.park(1);

        assert!(ledger.release(0).is_empty());
        assert_eq!(
            ledger.release(1),
            vec![TextureId::User(3), TextureId::User(4)]
        );
        assert!(!ledger.is_live(TextureId::User(3)));
        assert!(!ledger.is_live(TextureId::User(4)));
        assert!(ledger.release(1).is_empty());
    }

    #[test]
    fn test_frees_stay_parked_until_their_slot_is_released() {
        let mut ledger = TextureLedger::new();
        let mut delta = TexturesDelta {
            set: vec![full_upload(TextureId::User(7))],
            free: Vec::new(),
        };
        ledger.stage(&mut delta);
        let mut freeing = TexturesDelta {
            set: Vec::new(),
            free: vec![TextureId::User(7)],
        };
        ledger.stage(&mut freeing);
        ledger.park(0);

        assert!(ledger.release(1).is_empty());
        assert!(ledger.is_live(TextureId::User(7)));
        assert_eq!(ledger.release(0), vec![TextureId::User(7)]);
    }

    #[test]
    fn test_slider_range() {
        assert_eq!(effect_slider_range(3), 0..=2);
        assert_eq!(effect_slider_range(1), 0..=0);
        assert_eq!(effect_slider_range(0), 0..=0);
    }

    #[test]
    fn test_effect_selector_headless() {
        let ctx = egui::Context::default();
        let mut effects = EffectLibrary::new();
        effects.push(ComputeEffect::new("gradient"));
        effects.push(ComputeEffect::new("sky"));
        let stats = FrameStats::new();

        let output = ctx.run(egui::RawInput::default(), |ctx| {
            effect_selector(ctx, &mut effects, &stats)
        });

        assert!(!output.shapes.is_empty());
        assert_eq!(effects.current_index(), 0);
    }

    #[test]
    fn test_effect_selector_without_effects() {
        let ctx = egui::Context::default();
        let mut effects = EffectLibrary::new();
        let stats = FrameStats::new();

        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            effect_selector(ctx, &mut effects, &stats)
        });

        assert!(effects.is_empty());
    }
}
