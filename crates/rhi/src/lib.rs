//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides safe wrappers over Vulkan using the `ash` crate.
//! It covers:
//! - Instance and device creation
//! - The presentation surface (swapchain) lifecycle
//! - Per-slot command buffers
//! - Render passes, framebuffers and render targets
//! - Frames-in-flight synchronization objects
//! - Queue submission and presentation

mod error;

pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod queue;
pub mod render_pass;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
