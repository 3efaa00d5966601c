//! The device-facing seam the orchestrator drives.
//!
//! [`FrameBackend`] exposes each step of a frame as one call so the
//! orchestrator's ordering can be exercised without a GPU. The Vulkan
//! implementation is [`VulkanFrameContext`](crate::VulkanFrameContext).

use frameloop_rhi::RhiResult;
use frameloop_rhi::swapchain::{AcquireResult, SurfaceStatus};
use frameloop_rhi::vk;

/// Per-slot GPU resources and the presentation surface, step by step.
///
/// `slot` is always in `0..frames_in_flight()`. `image_index` is always one
/// returned by the latest successful [`acquire_image`](Self::acquire_image).
pub trait FrameBackend {
    /// What the record callback receives to issue draw commands.
    type Commands;

    fn frames_in_flight(&self) -> usize;

    /// Blocks on the slot's in-flight fence, then retires its command buffer.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Acquires the next image, signalling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireResult>;

    /// Unsignals the slot's in-flight fence.
    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Resets and begins the slot's command buffer.
    fn begin_commands(&mut self, slot: usize) -> RhiResult<()>;

    /// Begins the render pass on the framebuffer of `image_index`.
    fn begin_pass(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// The slot's command recorder, valid between `begin_pass` and `end_pass`.
    fn commands(&self, slot: usize) -> &Self::Commands;

    fn end_pass(&mut self, slot: usize) -> RhiResult<()>;

    fn end_commands(&mut self, slot: usize) -> RhiResult<()>;

    /// Submits the slot's commands: waits image-available, signals
    /// render-finished and the in-flight fence.
    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    /// Presents `image_index`, waiting on the slot's render-finished semaphore.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus>;

    fn surface_generation(&self) -> u64;

    fn target_generation(&self) -> u64;

    /// Extent of the framebuffers recorded into.
    fn target_extent(&self) -> vk::Extent2D;

    /// Rebuilds the surface behind a device-idle barrier.
    ///
    /// Returns `Ok(false)` without creating or destroying anything when the
    /// surface currently has zero area.
    fn recreate_surface(&mut self, extent: vk::Extent2D) -> RhiResult<bool>;

    /// Rebuilds one framebuffer per surface image from the current generation.
    fn rebuild_render_targets(&mut self) -> RhiResult<()>;

    fn image_count(&self) -> u32;

    fn wait_idle(&self) -> RhiResult<()>;
}
