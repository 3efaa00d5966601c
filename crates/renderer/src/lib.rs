//! Frame orchestration.
//!
//! This crate sequences one frame at a time:
//! - [`FrameOrchestrator`] runs wait, acquire, reset, record, submit, present
//! - [`FrameBackend`] is the seam it drives, so the ordering is testable
//! - [`VulkanFrameContext`] implements the backend on a real device
//! - [`FrameStats`] counts presented and skipped frames

mod backend;
mod error;
mod orchestrator;
mod stats;
mod vulkan;

pub use backend::FrameBackend;
pub use error::FrameError;
pub use orchestrator::{FrameInfo, FrameOrchestrator, FrameOutcome, FrameState};
pub use stats::FrameStats;
pub use vulkan::{DEFAULT_DEPTH_FORMAT, VulkanFrameContext};

// Re-exported for record callbacks
pub use frameloop_rhi::command::CommandBuffer;
pub use frameloop_rhi::swapchain::{AcquireResult, SurfaceStatus};
pub use frameloop_rhi::{RhiError, RhiResult, vk};
