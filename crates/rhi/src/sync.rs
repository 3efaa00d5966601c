//! Synchronization primitives and the per-slot frame sync set.
//!
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`FrameSyncSet`] - one image-available semaphore, one render-finished
//!   semaphore and one in-flight fence per frame slot
//!
//! # Usage Pattern
//!
//! ```text
//! 1. Wait for fence(slot) (CPU waits for GPU to finish the slot's last frame)
//! 2. Acquire swapchain image (signals ImageAvailable[slot])
//! 3. Reset fence(slot), only after the acquire succeeded
//! 4. Submit: wait ImageAvailable[slot], signal RenderFinished[slot] and fence(slot)
//! 5. Present (waits on RenderFinished[slot])
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Created unsignalled and destroyed exactly once on drop.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// # Thread Safety
///
/// The fence is immutable after creation. Wait and reset can be called from
/// any thread, but ordering them is the caller's responsibility.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state so the
    ///   first wait on it returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds. Use `u64::MAX` for infinite wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait times out (`vk::Result::TIMEOUT`) or fails.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any pending queue submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// The per-slot semaphores in a [`FrameSyncSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreKind {
    /// Signalled by acquire, waited on by submit.
    ImageAvailable,
    /// Signalled by submit, waited on by present.
    RenderFinished,
}

/// Synchronization objects for every frame slot.
///
/// Built once for the configured number of frames in flight and never
/// reallocated; surface rebuilds leave it untouched. All fences start
/// signalled.
pub struct FrameSyncSet {
    image_available: Vec<Semaphore>,
    render_finished: Vec<Semaphore>,
    in_flight: Vec<Fence>,
}

impl FrameSyncSet {
    /// Creates `frames_in_flight` sets of semaphores and fences.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `frames_in_flight` is zero, or
    /// the Vulkan error if any object creation fails. Objects created before
    /// the failure are destroyed.
    pub fn new(device: Arc<Device>, frames_in_flight: usize) -> RhiResult<Self> {
        if frames_in_flight == 0 {
            return Err(RhiError::InvalidHandle(
                "frames in flight must be at least 1".to_string(),
            ));
        }

        let mut image_available = Vec::with_capacity(frames_in_flight);
        let mut render_finished = Vec::with_capacity(frames_in_flight);
        let mut in_flight = Vec::with_capacity(frames_in_flight);

        for _ in 0..frames_in_flight {
            image_available.push(Semaphore::new(device.clone())?);
            render_finished.push(Semaphore::new(device.clone())?);
            in_flight.push(Fence::new(device.clone(), true)?);
        }

        info!("Frame sync set created for {} frames in flight", frames_in_flight);

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Number of frame slots.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns the semaphore of `kind` for `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[inline]
    pub fn semaphore(&self, kind: SemaphoreKind, slot: usize) -> vk::Semaphore {
        match kind {
            SemaphoreKind::ImageAvailable => self.image_available[slot].handle(),
            SemaphoreKind::RenderFinished => self.render_finished[slot].handle(),
        }
    }

    /// Returns the in-flight fence for `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[inline]
    pub fn fence(&self, slot: usize) -> vk::Fence {
        self.in_flight[slot].handle()
    }

    /// Blocks until the GPU finished everything `slot` last submitted.
    pub fn wait(&self, slot: usize) -> RhiResult<()> {
        self.in_flight[slot].wait(u64::MAX)
    }

    /// Unsignals the fence of `slot` ahead of the submission that signals it.
    pub fn reset(&self, slot: usize) -> RhiResult<()> {
        self.in_flight[slot].reset()
    }
}
