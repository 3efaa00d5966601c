//! Core utilities shared by every frameloop crate.
//!
//! This crate provides foundational types and utilities:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{PresentModePreference, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use timer::Timer;
