//! Translation of winit window events into the signals the render loop acts on.
//!
//! winit has no dedicated minimize event, so minimization is inferred from a
//! zero-sized resize or from the window becoming occluded. The two are
//! tracked separately; drawing resumes only once the window has a non-zero
//! size and is visible again.

use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// What the render loop should do in response to a window event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// The user asked to close the window.
    Quit,
    /// Stop drawing until restored.
    Minimized,
    /// Drawing may resume.
    Restored,
    /// The drawable size changed; the swapchain must be rebuilt.
    Resized { width: u32, height: u32 },
    /// Switch between windowed and borderless fullscreen.
    ToggleFullscreen,
}

/// Keeps the minimized state between events.
#[derive(Debug, Default)]
pub struct SignalTracker {
    zero_size: bool,
    occluded: bool,
}

impl SignalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether rendering is currently paused.
    pub fn is_minimized(&self) -> bool {
        self.zero_size || self.occluded
    }

    /// Signals produced by one winit event, in the order they should be handled.
    pub fn translate(&mut self, event: &WindowEvent) -> Vec<WindowSignal> {
        match event {
            WindowEvent::CloseRequested => vec![WindowSignal::Quit],
            WindowEvent::Resized(size) => self.on_resize(size.width, size.height),
            WindowEvent::Occluded(occluded) => self.on_occluded(*occluded),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => self.on_key(*code, *state == ElementState::Pressed, *repeat),
            _ => Vec::new(),
        }
    }

    pub fn on_resize(&mut self, width: u32, height: u32) -> Vec<WindowSignal> {
        let zero_size = width == 0 || height == 0;
        let mut signals = self.update(|tracker| tracker.zero_size = zero_size);
        if !zero_size {
            signals.push(WindowSignal::Resized { width, height });
        }
        signals
    }

    pub fn on_occluded(&mut self, occluded: bool) -> Vec<WindowSignal> {
        self.update(|tracker| tracker.occluded = occluded)
    }

    pub fn on_key(&mut self, key: KeyCode, pressed: bool, repeat: bool) -> Vec<WindowSignal> {
        match key {
            KeyCode::F11 if pressed && !repeat => vec![WindowSignal::ToggleFullscreen],
            _ => Vec::new(),
        }
    }

    /// Applies `change` and reports a transition of the combined state.
    fn update(&mut self, change: impl FnOnce(&mut Self)) -> Vec<WindowSignal> {
        let was_minimized = self.is_minimized();
        change(self);
        let minimized = self.is_minimized();
        if was_minimized == minimized {
            return Vec::new();
        }
        tracing::debug!("Window {}", if minimized { "minimized" } else { "restored" });
        vec![if minimized {
            WindowSignal::Minimized
        } else {
            WindowSignal::Restored
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_resize_minimizes_once() {
        let mut tracker = SignalTracker::new();
        assert_eq!(tracker.on_resize(0, 0), vec![WindowSignal::Minimized]);
        assert!(tracker.is_minimized());
        assert!(tracker.on_resize(0, 600).is_empty());
    }

    #[test]
    fn test_resize_after_minimize_restores_then_resizes() {
        let mut tracker = SignalTracker::new();
        tracker.on_resize(0, 0);
        assert_eq!(
            tracker.on_resize(1024, 768),
            vec![
                WindowSignal::Restored,
                WindowSignal::Resized {
                    width: 1024,
                    height: 768
                }
            ]
        );
        assert!(!tracker.is_minimized());
    }

    #[test]
    fn test_plain_resize() {
        let mut tracker = SignalTracker::new();
        assert_eq!(
            tracker.on_resize(640, 480),
            vec![WindowSignal::Resized {
                width: 640,
                height: 480
            }]
        );
    }

    #[test]
    fn test_occlusion_pauses_and_resumes() {
        let mut tracker = SignalTracker::new();
        assert_eq!(tracker.on_occluded(true), vec![WindowSignal::Minimized]);
        assert!(tracker.on_occluded(true).is_empty());
        assert_eq!(tracker.on_occluded(false), vec![WindowSignal::Restored]);
    }

    #[test]
    fn test_resize_while_occluded_stays_paused() {
        let mut tracker = SignalTracker::new();
        tracker.on_occluded(true);

        assert_eq!(
            tracker.on_resize(1024, 768),
            vec![WindowSignal::Resized {
                width: 1024,
                height: 768
            }]
        );
        assert!(tracker.is_minimized());

        assert_eq!(tracker.on_occluded(false), vec![WindowSignal::Restored]);
        assert!(!tracker.is_minimized());
    }

    #[test]
    fn test_unoccluded_zero_size_window_stays_paused() {
        let mut tracker = SignalTracker::new();
        assert_eq!(tracker.on_resize(0, 0), vec![WindowSignal::Minimized]);
        assert!(tracker.on_occluded(true).is_empty());
        assert!(tracker.on_occluded(false).is_empty());
        assert!(tracker.is_minimized());

        assert_eq!(
            tracker.on_resize(800, 600),
            vec![
                WindowSignal::Restored,
                WindowSignal::Resized {
                    width: 800,
                    height: 600
                }
            ]
        );
    }

    #[test]
    fn test_f11_press_toggles_fullscreen() {
        let mut tracker = SignalTracker::new();
        assert_eq!(
            tracker.on_key(KeyCode::F11, true, false),
            vec![WindowSignal::ToggleFullscreen]
        );
        assert!(tracker.on_key(KeyCode::F11, false, false).is_empty());
        assert!(tracker.on_key(KeyCode::F11, true, true).is_empty());
        assert!(tracker.on_key(KeyCode::KeyA, true, false).is_empty());
    }

    #[test]
    fn test_close_requested_quits() {
        let mut tracker = SignalTracker::new();
        assert_eq!(
            tracker.translate(&WindowEvent::CloseRequested),
            vec![WindowSignal::Quit]
        );
        assert_eq!(
            tracker.translate(&WindowEvent::Occluded(true)),
            vec![WindowSignal::Minimized]
        );
    }
}
