//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

use crate::command::CommandBufferState;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A queue family required by the device was not selected
    #[error("Missing {0} queue family")]
    MissingQueueFamily(&'static str),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Extension name could not be passed to Vulkan
    #[error("Invalid extension name: {0}")]
    InvalidExtensionName(String),

    /// Render pass attachment list is unusable
    #[error("Invalid attachments: {0}")]
    InvalidAttachments(String),

    /// Command buffer used out of its lifecycle order
    #[error("Command buffer is {actual:?}, expected {expected}")]
    CommandBufferState {
        expected: &'static str,
        actual: CommandBufferState,
    },

    /// A render target built against an older surface was bound
    #[error("Render target generation {target} does not match surface generation {surface}")]
    StaleRenderTarget { target: u64, surface: u64 },
}

impl RhiError {
    /// Returns true for the device-lost error class.
    ///
    /// These are never recoverable by recreating the surface.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
                | RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
