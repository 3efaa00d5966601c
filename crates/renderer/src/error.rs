//! Frame loop errors, tagged with the stage that failed.

use frameloop_rhi::RhiError;
use thiserror::Error;

/// A fatal frame loop error.
///
/// Any of these stops the orchestrator; later frames return
/// [`FrameError::Stopped`].
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Waiting on the in-flight fence failed: {0}")]
    FenceWait(#[source] RhiError),

    #[error("Acquiring a surface image failed: {0}")]
    Acquire(#[source] RhiError),

    #[error("Resetting the in-flight fence failed: {0}")]
    Reset(#[source] RhiError),

    #[error("Recording commands failed: {0}")]
    Record(#[source] RhiError),

    #[error("Queue submission failed: {0}")]
    Submit(#[source] RhiError),

    #[error("Presentation failed: {0}")]
    Present(#[source] RhiError),

    #[error("Rebuilding the surface failed: {0}")]
    Recreate(#[source] RhiError),

    #[error("Backend reports zero frames in flight")]
    NoFrameSlots,

    /// A previous fatal error already stopped the frame loop
    #[error("Frame loop is stopped")]
    Stopped,
}

impl FrameError {
    /// Name of the failing stage, for diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            FrameError::FenceWait(_) => "fence wait",
            FrameError::Acquire(_) => "acquire",
            FrameError::Reset(_) => "fence reset",
            FrameError::Record(_) => "record",
            FrameError::Submit(_) => "submit",
            FrameError::Present(_) => "present",
            FrameError::Recreate(_) => "recreate",
            FrameError::NoFrameSlots => "setup",
            FrameError::Stopped => "stopped",
        }
    }

    /// The underlying device error, if any.
    pub fn rhi_error(&self) -> Option<&RhiError> {
        match self {
            FrameError::FenceWait(e)
            | FrameError::Acquire(e)
            | FrameError::Reset(e)
            | FrameError::Record(e)
            | FrameError::Submit(e)
            | FrameError::Present(e)
            | FrameError::Recreate(e) => Some(e),
            FrameError::NoFrameSlots | FrameError::Stopped => None,
        }
    }

    pub fn is_device_lost(&self) -> bool {
        self.rhi_error().is_some_and(RhiError::is_device_lost)
    }
}
