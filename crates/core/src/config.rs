//! Renderer configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration:
//!
//! ```toml
//! max_frames_in_flight = 2
//! required_instance_extensions = ["VK_KHR_get_surface_capabilities2"]
//! present_mode = "fifo"
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [window]
//! width = 1280
//! height = 720
//! title = "frameloop"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Which present mode the surface should try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    /// Low-latency mailbox when available, FIFO otherwise.
    #[default]
    Mailbox,
    /// Always FIFO (vsync).
    Fifo,
}

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "frameloop".to_string(),
        }
    }
}

/// Configuration consumed once at renderer initialization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots the CPU may record ahead of the GPU.
    pub max_frames_in_flight: usize,
    /// Instance extensions enabled in addition to the platform surface ones.
    pub required_instance_extensions: Vec<String>,
    /// Enable the Khronos validation layer when it is installed.
    pub enable_validation: bool,
    pub present_mode: PresentModePreference,
    /// Background colour the color attachment is cleared to.
    pub clear_color: [f32; 4],
    pub window: WindowConfig,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            required_instance_extensions: Vec::new(),
            enable_validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            window: WindowConfig::default(),
            log_filter: crate::logging::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RendererConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Toml`] on malformed input and [`Error::Config`] when a
    /// value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration at `path`.
    ///
    /// A missing file is not an error: the defaults are returned instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(
            "Loaded config from {} ({} frames in flight, {:?})",
            path.display(),
            config.max_frames_in_flight,
            config.present_mode
        );
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 {
            return Err(Error::Config(
                "max_frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero (got {}x{})",
                self.window.width, self.window.height
            )));
        }
        if let Some(bad) = self
            .required_instance_extensions
            .iter()
            .find(|name| name.trim().is_empty() || name.contains('\0'))
        {
            return Err(Error::Config(format!(
                "invalid instance extension name {bad:?}"
            )));
        }
        Ok(())
    }
}
