//! Windowing for the frame loop.
//!
//! - Window creation via winit from a [`WindowConfig`](frameloop_core::WindowConfig)
//! - Live framebuffer size and a coalesced resize flag
//! - Vulkan surface creation and the instance extensions it needs

mod window;

pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
