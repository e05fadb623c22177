//! Vulkan Renderer - Main Entry Point
//!
//! Opens a window, draws the selected compute effect every frame with a
//! debug UI on top, and rebuilds the swapchain when the window changes.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use renderer_core::{FrameStats, RendererConfig, Timer};
use renderer_platform::{SignalTracker, Window, WindowSignal};
use renderer_renderer::{FrameEngine, FrameInput, OverlayUi, Renderer, effect_selector};

/// How long to sleep between checks while the window is minimized.
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(version, about = "Real-time compute-effect renderer")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory scanned for compiled `.spv` compute effects
    #[arg(long)]
    shaders_dir: Option<PathBuf>,

    /// Initial window width
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height
    #[arg(long)]
    height: Option<u32>,

    /// Enable the Vulkan validation layer
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Disable the Vulkan validation layer
    #[arg(long)]
    no_validation: bool,
}

impl Args {
    fn apply(&self, config: &mut RendererConfig) {
        if let Some(dir) = &self.shaders_dir {
            config.shaders_dir = dir.clone();
        }
        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if self.validation {
            config.validation = true;
        }
        if self.no_validation {
            config.validation = false;
        }
    }
}

/// Everything that exists while a window is open. Fields drop in order, so
/// the GPU state goes before the window it presents to.
struct Running {
    engine: FrameEngine<Renderer>,
    overlay: OverlayUi,
    window: Window,
}

struct App {
    config: RendererConfig,
    running: Option<Running>,
    signals: SignalTracker,
    timer: Timer,
    frame_timer: Timer,
    stats: FrameStats,
    startup_error: Option<anyhow::Error>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            running: None,
            signals: SignalTracker::new(),
            timer: Timer::new(),
            frame_timer: Timer::new(),
            stats: FrameStats::new(),
            startup_error: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let (renderer, effects) =
            Renderer::new(&window, &self.config).context("initializing Vulkan")?;
        let overlay = OverlayUi::new(&window);
        let engine = FrameEngine::new(renderer, effects, self.config.timeouts);
        Ok(Running {
            engine,
            overlay,
            window,
        })
    }

    fn handle_signal(&mut self, event_loop: &ActiveEventLoop, signal: WindowSignal) {
        match signal {
            WindowSignal::Quit => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowSignal::Minimized => info!("Window minimized, rendering paused"),
            WindowSignal::Restored => {
                info!("Window restored, rendering resumed");
                self.frame_timer.tick();
            }
            WindowSignal::Resized { width, height } => {
                debug!("Window resized to {}x{}", width, height);
                if let Some(running) = &mut self.running {
                    running.engine.request_resize();
                }
            }
            WindowSignal::ToggleFullscreen => {
                if let Some(running) = &self.running {
                    running.window.toggle_fullscreen();
                }
            }
        }
    }

    fn draw(&mut self) -> Result<()> {
        let Some(Running {
            engine,
            overlay,
            window,
        }) = &mut self.running
        else {
            return Ok(());
        };

        let stats = &self.stats;
        let ui_frame = overlay.run(window, |ctx| {
            effect_selector(ctx, engine.effects_mut(), stats)
        });
        engine.backend_mut().set_overlay_frame(ui_frame)?;

        engine.draw_frame(FrameInput {
            window_extent: window.inner_size(),
            elapsed_secs: self.timer.elapsed_secs(),
        })?;

        self.stats.record(self.frame_timer.tick());
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                info!("Initialization complete, entering main loop");
                self.running = Some(running);
            }
            Err(e) => {
                error!("Startup failed: {:#}", e);
                self.startup_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(running) = &mut self.running {
            running.overlay.on_window_event(&running.window, &event);
        }

        for signal in self.signals.translate(&event) {
            self.handle_signal(event_loop, signal);
        }

        if matches!(event, WindowEvent::RedrawRequested)
            && !self.signals.is_minimized()
            && let Err(e) = self.draw()
        {
            // GPU state after a failed frame is undefined; do not tear down.
            error!("Fatal render error: {:#}", e);
            std::process::exit(1);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.signals.is_minimized() {
            event_loop.set_control_flow(ControlFlow::WaitUntil(
                Instant::now() + MINIMIZED_POLL_INTERVAL,
            ));
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RendererConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);

    renderer_core::init_logging(&config.log_filter);
    info!("Starting Vulkan Renderer");
    debug!("Configuration: {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.startup_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
