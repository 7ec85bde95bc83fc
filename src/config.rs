// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.
// `ConfigWatcher` reloads the file when it changes on disk.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Backend, ContextSettings};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Render Context".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub backend: Backend,
    pub present_mode: String,
    pub min_image_count: u32,
    pub clear_color: [f32; 4],
    pub descriptor_pool_size: u32,
    pub vsync: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Vulkan,
            present_mode: "mailbox".to_string(),
            min_image_count: 2,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            descriptor_pool_size: 1000,
            vsync: true,
        }
    }
}

impl GraphicsConfig {
    /// Whether switching from `self` to `other` needs a new swapchain.
    /// Clear colour changes apply without one.
    pub fn requires_swapchain_rebuild(&self, other: &GraphicsConfig) -> bool {
        self.present_mode.to_lowercase() != other.present_mode.to_lowercase()
            || self.min_image_count != other.min_image_count
    }

    pub fn clear_color(&self) -> Vec4 {
        Vec4::from_array(self.clear_color)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_to_file: false,
            log_file: "render_context.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Settings handed to the graphics backend at init
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            app_name: self.window.title.clone(),
            enable_validation: self.debug.validation_layers,
            present_mode: self.graphics.present_mode(),
            min_image_count: self.graphics.min_image_count,
            descriptor_pool_size: self.graphics.descriptor_pool_size,
            clear_color: self.graphics.clear_color(),
            vsync: self.graphics.vsync,
        }
    }
}

// =============================================================================
// HOT RELOAD
// =============================================================================

/// Watches the config file and keeps the latest successfully parsed version
/// until the frame loop picks it up.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    pending: Arc<Mutex<Option<Config>>>,
    path: PathBuf,
}

impl ConfigWatcher {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Editors replace files instead of writing in place, so watch the
        // directory and filter by name
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .context("Config path has no file name")?
            .to_os_string();

        let pending = Arc::new(Mutex::new(None));
        let handler_pending = Arc::clone(&pending);
        let handler_path = path.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("Config watch error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            if !event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                return;
            }

            match read_update(&handler_path) {
                Ok(Some(config)) => {
                    log::info!("Config reloaded from {:?}", handler_path);
                    *handler_pending.lock() = Some(config);
                }
                Ok(None) => log::debug!("Config file is empty, waiting for the write to finish"),
                // Keep running on the previous config until the file parses again
                Err(e) => log::warn!("Ignoring invalid config change: {:#}", e),
            }
        })
        .context("Failed to create config watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;
        log::info!("Watching {:?} for changes", path);

        Ok(Self {
            _watcher: watcher,
            pending,
            path,
        })
    }

    /// Latest config parsed since the last call, if any
    pub fn take_update(&self) -> Option<Config> {
        self.pending.lock().take()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse the changed file. Saves that truncate before writing produce an
/// event while the file is still empty (or gone); those give `None`.
fn read_update(path: &Path) -> Result<Option<Config>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read config file: {:?}", path)),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Config::parse(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
        .map(Some)
}
