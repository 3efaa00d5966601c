//! The per-frame state machine.
//!
//! Each [`FrameOrchestrator::draw_frame`] call runs one cycle:
//!
//! ```text
//! Idle -> WaitingOnFence -> Acquiring -> Recording -> Submitting -> Presenting -> Idle
//!                               |                                      |
//!                               +------------> Recreating <------------+
//! ```
//!
//! The frame slot advances only after a present that needs no rebuild. A
//! rebuild requested by acquire, present or a window resize goes through
//! `Recreating` and leaves the slot where it was. Any other failure moves the
//! orchestrator to `Stopped` for good.

use frameloop_core::Timer;
use frameloop_rhi::RhiResult;
use frameloop_rhi::swapchain::{AcquireResult, SurfaceStatus};
use frameloop_rhi::vk;
use tracing::{debug, error, info};

use crate::backend::FrameBackend;
use crate::error::FrameError;
use crate::stats::FrameStats;

/// Where the orchestrator is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    WaitingOnFence,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
    /// A fatal error occurred; no further frames are drawn.
    Stopped,
}

/// What the record callback is told about the frame it records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame slot owning the command buffer and sync objects.
    pub slot: usize,
    /// Swapchain image being rendered; independent of `slot`.
    pub image_index: u32,
    pub extent: vk::Extent2D,
    /// Number of frames recorded before this one.
    pub frame_number: u64,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was presented and the slot advanced.
    Presented { slot: usize, image_index: u32 },
    /// The frame reached the screen, then the surface was rebuilt (or the
    /// rebuild deferred for lack of area); the slot did not advance.
    PresentedThenRecreated { slot: usize, image_index: u32 },
    /// The surface and render targets were rebuilt; the slot did not advance.
    Recreated,
    /// The window has no drawable area; nothing touched the GPU.
    Deferred,
}

/// Drives a [`FrameBackend`] through wait, acquire, reset, record, submit
/// and present once per call.
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    frames_in_flight: usize,
    slot: usize,
    state: FrameState,
    /// Set by the window layer, honored at the next checkpoint
    resize_requested: bool,
    /// A rebuild is owed but could not run yet
    recreate_pending: bool,
    frame_number: u64,
    stats: FrameStats,
}

impl FrameOutcome {
    /// Whether the cycle put an image on screen.
    pub fn is_presented(&self) -> bool {
        matches!(
            self,
            Self::Presented { .. } | Self::PresentedThenRecreated { .. }
        )
    }
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Wraps `backend`, starting at slot 0.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::NoFrameSlots`] if the backend reports zero
    /// frames in flight.
    pub fn new(backend: B) -> Result<Self, FrameError> {
        let frames_in_flight = backend.frames_in_flight();
        if frames_in_flight == 0 {
            return Err(FrameError::NoFrameSlots);
        }

        info!(
            "Frame orchestrator ready: {} frames in flight, {} surface images",
            frames_in_flight,
            backend.image_count()
        );

        Ok(Self {
            backend,
            frames_in_flight,
            slot: 0,
            state: FrameState::Idle,
            resize_requested: false,
            recreate_pending: false,
            frame_number: 0,
            stats: FrameStats::new(),
        })
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next cycle will use.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.state == FrameState::Stopped
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Flags the surface for a rebuild at the next checkpoint.
    ///
    /// Repeated calls before that checkpoint coalesce.
    pub fn notify_resized(&mut self) {
        self.resize_requested = true;
    }

    /// Waits until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.backend.wait_idle()
    }

    /// Runs one frame cycle.
    ///
    /// `extent` is the window's current framebuffer size. `record` is called
    /// inside the render pass of the acquired image with the slot's command
    /// recorder.
    ///
    /// # Errors
    ///
    /// Returns the failing stage on any error other than an out-of-date or
    /// suboptimal surface; the orchestrator is stopped afterwards and every
    /// later call returns [`FrameError::Stopped`].
    pub fn draw_frame<F>(
        &mut self,
        extent: vk::Extent2D,
        record: F,
    ) -> Result<FrameOutcome, FrameError>
    where
        F: FnOnce(&B::Commands, &FrameInfo) -> RhiResult<()>,
    {
        if self.state == FrameState::Stopped {
            return Err(FrameError::Stopped);
        }

        let timer = Timer::new();
        let result = self.run_cycle(extent, record);
        let cpu_time = timer.elapsed();

        match result {
            Ok(outcome) => {
                self.state = FrameState::Idle;
                if outcome.is_presented() {
                    self.stats.record_presented(cpu_time);
                } else {
                    self.stats.record_skipped(cpu_time);
                }
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    "Frame loop stopped in {} stage at slot {} ({:?}): {}",
                    e.stage(),
                    self.slot,
                    self.state,
                    e
                );
                self.state = FrameState::Stopped;
                Err(e)
            }
        }
    }

    fn run_cycle<F>(&mut self, extent: vk::Extent2D, record: F) -> Result<FrameOutcome, FrameError>
    where
        F: FnOnce(&B::Commands, &FrameInfo) -> RhiResult<()>,
    {
        let slot = self.slot;

        if is_zero_area(extent) {
            return Ok(self.defer());
        }

        if (self.resize_requested || self.recreate_pending)
            && self.recreate(extent)? == FrameOutcome::Deferred
        {
            return Ok(FrameOutcome::Deferred);
        }

        self.state = FrameState::WaitingOnFence;
        self.backend
            .wait_for_slot(slot)
            .map_err(FrameError::FenceWait)?;

        self.state = FrameState::Acquiring;
        let (image_index, acquire_status) = match self
            .backend
            .acquire_image(slot)
            .map_err(FrameError::Acquire)?
        {
            AcquireResult::Ready { index, status } => (index, status),
            AcquireResult::OutOfDate => {
                // Nothing was submitted, so the fence stays signalled
                debug!("Acquire reported out-of-date at slot {}", slot);
                return self.recreate(extent);
            }
        };

        if self.backend.target_generation() != self.backend.surface_generation() {
            self.rebuild_targets()?;
        }

        self.backend
            .reset_slot_fence(slot)
            .map_err(FrameError::Reset)?;

        self.state = FrameState::Recording;
        let info = FrameInfo {
            slot,
            image_index,
            extent: self.backend.target_extent(),
            frame_number: self.frame_number,
        };
        self.record_slot(&info, record).map_err(FrameError::Record)?;
        self.frame_number += 1;

        self.state = FrameState::Submitting;
        self.backend.submit(slot).map_err(FrameError::Submit)?;

        self.state = FrameState::Presenting;
        let present_status = self
            .backend
            .present(slot, image_index)
            .map_err(FrameError::Present)?;

        let resized = std::mem::take(&mut self.resize_requested);
        if present_status.needs_recreate() || acquire_status.needs_recreate() || resized {
            debug!(
                "Rebuilding after present (acquire {:?}, present {:?}, resized {})",
                acquire_status, present_status, resized
            );
            let rebuilt = self.recreate(extent)?;
            // Out-of-date presents were discarded; suboptimal ones still showed
            return Ok(match present_status {
                SurfaceStatus::OutOfDate => rebuilt,
                _ => FrameOutcome::PresentedThenRecreated { slot, image_index },
            });
        }

        self.slot = (slot + 1) % self.frames_in_flight;
        Ok(FrameOutcome::Presented { slot, image_index })
    }

    fn record_slot<F>(&mut self, info: &FrameInfo, record: F) -> RhiResult<()>
    where
        F: FnOnce(&B::Commands, &FrameInfo) -> RhiResult<()>,
    {
        self.backend.begin_commands(info.slot)?;
        self.backend.begin_pass(info.slot, info.image_index)?;
        record(self.backend.commands(info.slot), info)?;
        self.backend.end_pass(info.slot)?;
        self.backend.end_commands(info.slot)
    }

    /// Rebuilds the surface and render targets for `extent`, or defers when
    /// the surface reports no drawable area.
    fn recreate(&mut self, extent: vk::Extent2D) -> Result<FrameOutcome, FrameError> {
        self.state = FrameState::Recreating;
        self.resize_requested = false;

        if !self
            .backend
            .recreate_surface(extent)
            .map_err(FrameError::Recreate)?
        {
            return Ok(self.defer());
        }

        self.backend
            .rebuild_render_targets()
            .map_err(FrameError::Recreate)?;

        self.recreate_pending = false;
        self.stats.record_recreate();
        info!(
            "Surface rebuilt: generation {}, {} images, {}x{}",
            self.backend.surface_generation(),
            self.backend.image_count(),
            extent.width,
            extent.height
        );

        Ok(FrameOutcome::Recreated)
    }

    /// Rebuilds render targets left behind by the surface.
    fn rebuild_targets(&mut self) -> Result<(), FrameError> {
        debug!(
            "Render targets at generation {} behind surface generation {}",
            self.backend.target_generation(),
            self.backend.surface_generation()
        );
        self.backend.wait_idle().map_err(FrameError::Recreate)?;
        self.backend
            .rebuild_render_targets()
            .map_err(FrameError::Recreate)
    }

    fn defer(&mut self) -> FrameOutcome {
        if !self.recreate_pending {
            debug!("Surface has zero area, deferring rebuild");
        }
        self.recreate_pending = true;
        FrameOutcome::Deferred
    }
}

fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
