// OpenGL context
//
// glutin creates the context + window surface and makes them current on
// the calling thread; glow loads the GL entry points. The driver owns
// double buffering, so a frame is just clear + draw + swap_buffers.

use anyhow::{Context, Result};
use glam::Vec4;
use glow::HasContext;
use glutin::config::{ConfigTemplateBuilder, GlConfig};
use glutin::context::{ContextAttributesBuilder, NotCurrentGlContext, PossiblyCurrentContext, PossiblyCurrentGlContext};
use glutin::display::{Display, DisplayApiPreference, GlDisplay};
use glutin::surface::{GlSurface, Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::RawWindowHandle;
use std::num::NonZeroU32;

use super::{ContextSettings, GraphicsContext};
use crate::window::NativeWindow;

pub struct OpenGlContext {
    // Drop order: function table, surface, context, display
    gl: Option<glow::Context>,
    surface: Option<Surface<WindowSurface>>,
    context: Option<PossiblyCurrentContext>,
    display: Display,
    clear_color: Vec4,
    size: (u32, u32),
}

impl GraphicsContext for OpenGlContext {
    fn init(window: &dyn NativeWindow, settings: &ContextSettings) -> Result<Self> {
        log::info!("Initializing OpenGL context...");

        let (raw_display, raw_window) = window.gl_handles()?;
        let (width, height) = window.framebuffer_size();

        // SAFETY: the handles come from a live window that outlives the context
        let display = unsafe { Display::new(raw_display, api_preference(raw_window)) }
            .context("Failed to open GL display")?;

        let template = ConfigTemplateBuilder::new()
            .compatible_with_native_window(raw_window)
            .build();
        let config = unsafe { display.find_configs(template) }
            .context("Failed to query GL configs")?
            .reduce(|best, config| {
                if config.num_samples() > best.num_samples() {
                    config
                } else {
                    best
                }
            })
            .context("No GL config is compatible with the window")?;

        let context_attributes = ContextAttributesBuilder::new().build(Some(raw_window));
        let not_current = unsafe { display.create_context(&config, &context_attributes) }
            .context("Failed to create GL context")?;

        let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window,
            non_zero(width),
            non_zero(height),
        );
        let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
            .context("Failed to create GL window surface")?;

        let context = not_current
            .make_current(&surface)
            .context("Failed to make GL context current")?;

        if let Err(e) = surface.set_swap_interval(&context, swap_interval(settings.vsync)) {
            log::warn!("Failed to set swap interval: {}", e);
        }

        let gl = unsafe { glow::Context::from_loader_function_cstr(|symbol| display.get_proc_address(symbol)) };
        unsafe {
            log::info!("GL version: {}", gl.get_parameter_string(glow::VERSION));
            log::info!("GL renderer: {}", gl.get_parameter_string(glow::RENDERER));
            gl.clear_color(
                settings.clear_color.x,
                settings.clear_color.y,
                settings.clear_color.z,
                settings.clear_color.w,
            );
        }

        log::info!("OpenGL context initialized");
        Ok(Self {
            gl: Some(gl),
            surface: Some(surface),
            context: Some(context),
            display,
            clear_color: settings.clear_color,
            size: (width, height),
        })
    }

    fn shutdown(&mut self) {
        if self.context.is_none() {
            log::warn!("OpenGL context already shut down");
            return;
        }
        log::info!("Shutting down OpenGL context...");

        self.gl = None;
        self.surface = None;
        if let Some(context) = self.context.take() {
            if let Err(e) = context.make_not_current() {
                log::warn!("Failed to release GL context: {}", e);
            }
        }

        log::info!("OpenGL context shut down");
    }
}

impl OpenGlContext {
    /// Loaded GL functions; `None` after shutdown
    pub fn gl(&self) -> Option<&glow::Context> {
        self.gl.as_ref()
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
        if let Some(gl) = &self.gl {
            unsafe { gl.clear_color(color.x, color.y, color.z, color.w) };
        }
    }

    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    pub fn set_vsync(&self, vsync: bool) {
        if let (Some(surface), Some(context)) = (&self.surface, &self.context) {
            if let Err(e) = surface.set_swap_interval(context, swap_interval(vsync)) {
                log::warn!("Failed to set swap interval: {}", e);
            }
        }
    }

    /// Clear the default framebuffer to the clear colour
    pub fn clear(&self) {
        if let Some(gl) = &self.gl {
            let (width, height) = self.size;
            unsafe {
                gl.viewport(0, 0, width as i32, height as i32);
                gl.clear(glow::COLOR_BUFFER_BIT);
            }
        }
    }

    /// Present the back buffer; once per frame
    pub fn swap_buffers(&self) -> Result<()> {
        let (Some(surface), Some(context)) = (&self.surface, &self.context) else {
            anyhow::bail!(super::ContextError::NotInitialized);
        };
        surface
            .swap_buffers(context)
            .context("Failed to swap GL buffers")
    }

    /// Resize the window surface. Zero-area sizes (minimized) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return;
        };
        if let (Some(surface), Some(context)) = (&self.surface, &self.context) {
            surface.resize(context, w, h);
            self.size = (width, height);
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_shut_down(&self) -> bool {
        self.context.is_none()
    }
}

impl Drop for OpenGlContext {
    fn drop(&mut self) {
        if self.context.is_some() {
            self.shutdown();
        }
    }
}

fn api_preference(raw_window: RawWindowHandle) -> DisplayApiPreference {
    #[cfg(target_os = "windows")]
    {
        DisplayApiPreference::Wgl(Some(raw_window))
    }
    #[cfg(target_os = "macos")]
    {
        let _ = raw_window;
        DisplayApiPreference::Cgl
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let _ = raw_window;
        DisplayApiPreference::Egl
    }
}

fn swap_interval(vsync: bool) -> SwapInterval {
    if vsync {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    }
}

/// Surfaces cannot be zero-sized; a minimized window gets a 1x1 surface
/// until the first real resize
fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}
