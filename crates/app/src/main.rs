//! frameloop: clears a window every frame through the frame orchestrator.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use frameloop_core::RendererConfig;
use frameloop_platform::Window;
use frameloop_renderer::{FrameOrchestrator, VulkanFrameContext};

#[derive(Parser, Debug)]
#[command(name = "frameloop", about = "Vulkan frame loop")]
struct Args {
    /// Renderer configuration file (defaults apply when it does not exist)
    #[arg(long, default_value = "frameloop.toml")]
    config: PathBuf,
}

struct App {
    config: RendererConfig,
    // Dropped before the window its surface belongs to
    frames: Option<FrameOrchestrator<VulkanFrameContext>>,
    window: Option<Window>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            frames: None,
            window: None,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(frames) = self.frames.take() {
            if let Err(e) = frames.wait_idle() {
                error!("Wait idle failed during shutdown: {}", e);
            }
            let stats = frames.stats();
            info!(
                "Shutting down after {} presented, {} skipped frames, {} recreates",
                stats.presented(),
                stats.skipped(),
                stats.recreates()
            );
        }
        event_loop.exit();
    }
}

fn start_frames(
    window: &Window,
    config: &RendererConfig,
) -> Result<FrameOrchestrator<VulkanFrameContext>> {
    let context = VulkanFrameContext::new(window, config)?;
    Ok(FrameOrchestrator::new(context)?)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match start_frames(&window, &self.config) {
            Ok(frames) => {
                info!("Initialization complete, entering main loop");
                self.frames = Some(frames);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create frame context: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                    if window.take_resized()
                        && let Some(ref mut frames) = self.frames
                    {
                        frames.notify_resized();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                let (Some(window), Some(frames)) = (&self.window, &mut self.frames) else {
                    return;
                };

                match frames.draw_frame(window.framebuffer_size(), |_, _| Ok(())) {
                    Ok(outcome) if outcome.is_presented() => {}
                    Ok(outcome) => debug!("Frame skipped: {:?}", outcome),
                    Err(e) => {
                        error!("Rendering stopped ({} failed): {}", e.stage(), e);
                        self.shutdown(event_loop);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = RendererConfig::load(&args.config)?;

    frameloop_core::init_logging_with(&config.log_filter);
    info!("Starting frameloop (config: {})", args.config.display());

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
