//! Graphics and present queue submission.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::RhiResult;
use crate::swapchain::{PresentationSurface, SurfaceStatus};

/// Stage at which a frame's submission waits for its swapchain image.
///
/// Work before color output may run before the image is available.
pub const IMAGE_WAIT_STAGE: vk::PipelineStageFlags =
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

/// Owner of the device's graphics and present queue handles.
pub struct SubmissionQueue {
    device: Arc<Device>,
    graphics: vk::Queue,
    present: vk::Queue,
}

impl SubmissionQueue {
    pub fn new(device: Arc<Device>) -> Self {
        let graphics = device.graphics_queue();
        let present = device.present_queue();
        Self {
            device,
            graphics,
            present,
        }
    }

    /// Submits one executable command buffer.
    ///
    /// Waits on `wait` at [`IMAGE_WAIT_STAGE`], signals `signal` and `fence`
    /// when the GPU finishes. The buffer becomes pending.
    ///
    /// # Errors
    ///
    /// [`RhiError::CommandBufferState`](crate::RhiError::CommandBufferState)
    /// if the buffer is not executable, or the Vulkan submit error. The fence
    /// is not signalled when this fails.
    pub fn submit(
        &self,
        cmd: &CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> RhiResult<()> {
        // Rejects non-executable buffers before the queue sees them
        cmd.state().submit()?;

        let wait_semaphores = [wait];
        let wait_stages = [IMAGE_WAIT_STAGE];
        let command_buffers = [cmd.handle()];
        let signal_semaphores = [signal];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .handle()
                .queue_submit(self.graphics, &[submit_info], fence)?;
        }

        cmd.mark_submitted()
    }

    /// Presents `image_index` once `wait` signals.
    ///
    /// # Errors
    ///
    /// Any present failure other than out-of-date or suboptimal.
    pub fn present(
        &self,
        surface: &PresentationSurface,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<SurfaceStatus> {
        let status = surface.present(self.present, image_index, wait)?;
        if status.needs_recreate() {
            debug!("Present of image {} reported {:?}", image_index, status);
        }
        Ok(status)
    }

    #[inline]
    pub fn graphics(&self) -> vk::Queue {
        self.graphics
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present
    }
}
