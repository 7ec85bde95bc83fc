// =============================================================================
// RENDER CONTEXT - windowed clear-and-present loop
// =============================================================================
//
// Brings up the configured graphics backend on a winit window and presents a
// cleared frame every redraw.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, config hot reload)                      │
// │    └── RenderBackend (Vulkan | OpenGL)                          │
// │          └── VulkanContext: device, swapchain, queue            │
// │          └── OpenGlContext: glutin context + surface            │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (Vulkan):
// 1. Rebuild the swapchain if flagged
// 2. Wait for the previous frame's fence
// 3. Acquire a swapchain image
// 4. Record + submit the clear pass
// 5. Present
//
// =============================================================================

use anyhow::Result;
use render_context::backend::RenderBackend;
use render_context::config::{Config, ConfigWatcher};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

const CONFIG_PATH: &str = "config.toml";

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    render_context::logging::init(&config.debug)?;
    log::info!("Starting render context");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Backend: {:?}, present mode: {}",
        config.graphics.backend,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Init failures end the loop; surface them as the process result
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,
    watcher: Option<ConfigWatcher>,

    // ─────────────────────────────────────────────────────────────────────────
    // BACKEND
    // ─────────────────────────────────────────────────────────────────────────
    // Declared before the window so it is dropped first
    backend: Option<RenderBackend>,
    fatal: Option<anyhow::Error>,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_frame_time: Instant,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let watcher = match ConfigWatcher::new(CONFIG_PATH) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Config hot reload disabled: {:#}", e);
                None
            }
        };
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();

        Self {
            config,
            watcher,
            backend: None,
            fatal: None,
            window: None,
            is_fullscreen,
            frame_count: 0,
            last_frame_time: now,
            last_fps_update: now,
        }
    }

    /// Fatal errors stop the event loop; `main` returns them
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }

    // =========================================================================
    // CONFIG HOT RELOAD
    // =========================================================================

    fn apply_config_update(&mut self) {
        let Some(config) = self.watcher.as_ref().and_then(ConfigWatcher::take_update) else {
            return;
        };
        if config == self.config {
            return;
        }

        if config.graphics.backend != self.config.graphics.backend {
            log::warn!(
                "Backend change to {:?} takes effect after a restart",
                config.graphics.backend
            );
        }
        if self.config.graphics.requires_swapchain_rebuild(&config.graphics) {
            log::info!("Swapchain settings changed, rebuilding");
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.apply_settings(&config.context_settings());
        }

        self.config = config;
    }

    fn render(&mut self) -> Result<()> {
        let (Some(backend), Some(window)) = (self.backend.as_mut(), self.window.as_ref()) else {
            return Ok(());
        };
        backend.render_frame(&**window)
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
            // winit follows up with a Resized event
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let api = self
                    .backend
                    .as_ref()
                    .map(|backend| format!("{:?}", backend.api()))
                    .unwrap_or_default();
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    api
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    fn shutdown(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.shutdown();
        }
        self.backend = None;
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        let settings = self.config.context_settings();
        match RenderBackend::create(self.config.graphics.backend, &*window, &settings) {
            Ok(backend) => self.backend = Some(backend),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize graphics backend"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown();
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(backend) = self.backend.as_mut() {
                    backend.handle_resize(size.width, size.height);
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => {
                self.apply_config_update();
                match self.render() {
                    Ok(()) => self.update_fps(),
                    Err(e) => {
                        self.fail(event_loop, e.context("Render error"));
                        self.shutdown();
                    }
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown();
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        self.shutdown();
        log::info!("Cleanup complete");
    }
}
