//! Command pool and per-slot command buffers.
//!
//! - [`CommandPool`] manages a VkCommandPool whose buffers can be reset
//!   individually
//! - [`CommandBuffer`] wraps a primary VkCommandBuffer and tracks its
//!   lifecycle ([`CommandBufferState`])
//! - [`CommandResources`] owns one command buffer per frame slot
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::command::CommandResources;
//!
//! # fn example(device: Arc<Device>) -> Result<(), frameloop_rhi::RhiError> {
//! let graphics_family = device.queue_families().graphics()?;
//! let commands = CommandResources::new(device.clone(), graphics_family, 2)?;
//!
//! let cmd = commands.buffer(0);
//! cmd.begin()?;
//! // ... record rendering commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Host-side view of a command buffer's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Freshly allocated or reset.
    Initial,
    /// Between `begin` and `end`.
    Recording,
    /// Recorded and not submitted, or submitted and retired by its fence.
    Executable,
    /// Submitted; the GPU may still be reading it.
    Pending,
}

impl CommandBufferState {
    /// `begin` implicitly resets, so it is legal from `Initial` and `Executable`.
    pub fn begin(self) -> RhiResult<Self> {
        match self {
            CommandBufferState::Initial | CommandBufferState::Executable => {
                Ok(CommandBufferState::Recording)
            }
            actual => Err(RhiError::CommandBufferState {
                expected: "Initial or Executable",
                actual,
            }),
        }
    }

    pub fn end(self) -> RhiResult<Self> {
        match self {
            CommandBufferState::Recording => Ok(CommandBufferState::Executable),
            actual => Err(RhiError::CommandBufferState {
                expected: "Recording",
                actual,
            }),
        }
    }

    pub fn submit(self) -> RhiResult<Self> {
        match self {
            CommandBufferState::Executable => Ok(CommandBufferState::Pending),
            actual => Err(RhiError::CommandBufferState {
                expected: "Executable",
                actual,
            }),
        }
    }

    /// Called once the fence covering the submission has signalled.
    ///
    /// Buffers that were never submitted are left as they are.
    pub fn retire(self) -> Self {
        match self {
            CommandBufferState::Pending => CommandBufferState::Executable,
            other => other,
        }
    }
}

/// Vulkan command pool wrapper.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. Recording happens on the frame loop
/// thread only.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a command pool for the specified queue family.
    ///
    /// The pool is created with `RESET_COMMAND_BUFFER` so each buffer can be
    /// reset on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!("Command pool created for queue family {}", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocates `count` primary command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };

        debug!("Allocated {} command buffers", count);
        Ok(buffers)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!("Command pool destroyed for queue family {}", self.queue_family_index);
    }
}

/// Primary command buffer with lifecycle tracking.
///
/// The handle is freed together with the owning [`CommandPool`].
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
    state: Cell<CommandBufferState>,
}

impl CommandBuffer {
    fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            buffer,
            state: Cell::new(CommandBufferState::Initial),
        }
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state.get()
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Resets the buffer and begins one-time-submit recording.
    ///
    /// # Errors
    ///
    /// [`RhiError::CommandBufferState`] if the buffer is still recording or
    /// pending, otherwise the Vulkan error from reset or begin.
    pub fn begin(&self) -> RhiResult<()> {
        let next = self.state.get().begin()?;

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        self.state.set(next);
        Ok(())
    }

    /// Ends recording; the buffer becomes executable.
    ///
    /// # Errors
    ///
    /// [`RhiError::CommandBufferState`] if not recording, otherwise the
    /// Vulkan error from end.
    pub fn end(&self) -> RhiResult<()> {
        let next = self.state.get().end()?;

        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        self.state.set(next);
        Ok(())
    }

    /// Marks the buffer as handed to the queue.
    pub fn mark_submitted(&self) -> RhiResult<()> {
        let next = self.state.get().submit()?;
        self.state.set(next);
        Ok(())
    }

    /// Marks the buffer as no longer in use by the GPU.
    pub fn retire(&self) {
        self.state.set(self.state.get().retire());
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    pub fn begin_render_pass(&self, begin_info: &vk::RenderPassBeginInfo) {
        debug_assert_eq!(self.state.get(), CommandBufferState::Recording);
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    pub fn end_render_pass(&self) {
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    // =========================================================================
    // Pipeline Binding
    // =========================================================================

    /// Binds a graphics pipeline.
    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }
}

/// One command buffer per frame slot, allocated once.
pub struct CommandResources {
    // Freed with the pool, so declared before it
    buffers: Vec<CommandBuffer>,
    pool: CommandPool,
}

impl CommandResources {
    /// Allocates `count` primary buffers from a resettable pool on the
    /// graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or allocation fails.
    pub fn new(device: Arc<Device>, graphics_family: u32, count: usize) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), graphics_family)?;
        let buffers = pool
            .allocate_command_buffers(count as u32)?
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(device.clone(), buffer))
            .collect();

        Ok(Self { buffers, pool })
    }

    /// Returns the command buffer of `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[inline]
    pub fn buffer(&self, slot: usize) -> &CommandBuffer {
        &self.buffers[slot]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    #[inline]
    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }
}
