//! Window boundary consumed by the graphics contexts.
//!
//! Contexts never cache window dimensions: every swapchain (re)build asks
//! [`SurfaceWindow::framebuffer_size`] again.

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};

/// Anything a swapchain can be sized against
pub trait SurfaceWindow {
    /// Current drawable size in physical pixels. `(0, 0)` while minimized.
    fn framebuffer_size(&self) -> (u32, u32);
}

/// A real native window the backends can bind a surface/context to
pub trait NativeWindow: SurfaceWindow {
    /// Handles in the form `ash-window` consumes
    fn vulkan_handles(&self) -> (rwh_05::RawDisplayHandle, rwh_05::RawWindowHandle);

    /// Handles in the form `glutin` consumes
    fn gl_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)>;
}

impl SurfaceWindow for winit::window::Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

impl NativeWindow for winit::window::Window {
    fn vulkan_handles(&self) -> (rwh_05::RawDisplayHandle, rwh_05::RawWindowHandle) {
        (
            rwh_05::HasRawDisplayHandle::raw_display_handle(self),
            rwh_05::HasRawWindowHandle::raw_window_handle(self),
        )
    }

    fn gl_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window = self
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();
        Ok((display, window))
    }
}
