//! The Vulkan render context the orchestrator drives in production.

use std::sync::Arc;

use frameloop_core::{PresentModePreference, RendererConfig};
use frameloop_platform::{Surface, Window};
use frameloop_rhi::command::{CommandBuffer, CommandResources};
use frameloop_rhi::device::Device;
use frameloop_rhi::framebuffer::RenderTargets;
use frameloop_rhi::instance::Instance;
use frameloop_rhi::physical_device::select_physical_device;
use frameloop_rhi::queue::SubmissionQueue;
use frameloop_rhi::render_pass::{AttachmentSpec, RenderPass};
use frameloop_rhi::swapchain::{AcquireResult, PresentationSurface, SurfaceStatus};
use frameloop_rhi::sync::{FrameSyncSet, SemaphoreKind};
use frameloop_rhi::vk;
use frameloop_rhi::{RhiError, RhiResult};
use tracing::{error, info};

use crate::backend::FrameBackend;

pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Acquire timeout; effectively unbounded.
const ACQUIRE_TIMEOUT: u64 = u64::MAX;

/// Every GPU object one window needs to draw frames.
///
/// Fields drop in declaration order: render targets and per-slot objects
/// first, then the swapchain, the window surface, the device and finally the
/// instance.
pub struct VulkanFrameContext {
    targets: RenderTargets,
    render_pass: RenderPass,
    commands: CommandResources,
    sync: FrameSyncSet,
    queue: SubmissionQueue,
    presentation: PresentationSurface,
    surface: Surface,
    device: Arc<Device>,
    instance: Instance,
    pipeline: Option<vk::Pipeline>,
    clear_color: [f32; 4],
}

impl VulkanFrameContext {
    /// Bootstraps Vulkan for `window` and builds all frame resources.
    ///
    /// The render pass has a surface color attachment and a depth
    /// attachment.
    ///
    /// # Errors
    ///
    /// Any failure here is a fatal initialization error.
    pub fn new(window: &Window, config: &RendererConfig) -> RhiResult<Self> {
        let extent = window.framebuffer_size();
        info!(
            "Initializing Vulkan frame context ({}x{}, {} frames in flight)",
            extent.width, extent.height, config.max_frames_in_flight
        );

        let platform_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(
            config.enable_validation,
            &platform_extensions,
            &config.required_instance_extensions,
        )?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let prefer_mailbox = config.present_mode == PresentModePreference::Mailbox;
        let presentation = PresentationSurface::new(
            &instance,
            device.clone(),
            surface.handle(),
            extent,
            prefer_mailbox,
        )?;

        let sync = FrameSyncSet::new(device.clone(), config.max_frames_in_flight)?;
        let commands = CommandResources::new(
            device.clone(),
            device.queue_families().graphics()?,
            config.max_frames_in_flight,
        )?;
        let queue = SubmissionQueue::new(device.clone());

        let render_pass = RenderPass::new(
            device.clone(),
            &[
                AttachmentSpec::surface_color(presentation.format()),
                AttachmentSpec::depth(DEFAULT_DEPTH_FORMAT),
            ],
        )?;
        let targets = RenderTargets::build(device.clone(), &render_pass, &presentation)?;

        info!(
            "Frame context ready on {}: {} images, {:?}",
            physical_device_info.device_name(),
            presentation.image_count(),
            presentation.present_mode()
        );

        Ok(Self {
            targets,
            render_pass,
            commands,
            sync,
            queue,
            presentation,
            surface,
            device,
            instance,
            pipeline: None,
            clear_color: config.clear_color,
        })
    }

    /// Pass that pipelines bound through [`set_pipeline`](Self::set_pipeline)
    /// must be compatible with.
    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Pipeline bound at the start of every pass; `None` clears only.
    pub fn set_pipeline(&mut self, pipeline: Option<vk::Pipeline>) {
        self.pipeline = pipeline;
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn presentation(&self) -> &PresentationSurface {
        &self.presentation
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }
}

impl FrameBackend for VulkanFrameContext {
    type Commands = CommandBuffer;

    fn frames_in_flight(&self) -> usize {
        self.sync.frames_in_flight()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.sync.wait(slot)?;
        self.commands.buffer(slot).retire();
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireResult> {
        let semaphore = self.sync.semaphore(SemaphoreKind::ImageAvailable, slot);
        self.presentation.acquire_next(semaphore, ACQUIRE_TIMEOUT)
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.sync.reset(slot)
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.commands.buffer(slot).begin()
    }

    fn begin_pass(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.targets.begin(
            self.commands.buffer(slot),
            &self.render_pass,
            image_index,
            self.presentation.generation(),
            self.pipeline,
            self.clear_color,
        )
    }

    fn commands(&self, slot: usize) -> &CommandBuffer {
        self.commands.buffer(slot)
    }

    fn end_pass(&mut self, slot: usize) -> RhiResult<()> {
        self.targets.end(self.commands.buffer(slot));
        Ok(())
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.commands.buffer(slot).end()
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        self.queue.submit(
            self.commands.buffer(slot),
            self.sync.semaphore(SemaphoreKind::ImageAvailable, slot),
            self.sync.semaphore(SemaphoreKind::RenderFinished, slot),
            self.sync.fence(slot),
        )
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus> {
        self.queue.present(
            &self.presentation,
            image_index,
            self.sync.semaphore(SemaphoreKind::RenderFinished, slot),
        )
    }

    fn surface_generation(&self) -> u64 {
        self.presentation.generation()
    }

    fn target_generation(&self) -> u64 {
        self.targets.generation()
    }

    fn target_extent(&self) -> vk::Extent2D {
        self.targets.extent()
    }

    fn recreate_surface(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
        self.presentation.recreate(extent)
    }

    fn rebuild_render_targets(&mut self) -> RhiResult<()> {
        self.targets.rebuild(&self.render_pass, &self.presentation)
    }

    fn image_count(&self) -> u32 {
        self.presentation.image_count()
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for VulkanFrameContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Device wait idle failed during shutdown: {}", e);
        }
        info!("Destroying Vulkan frame context");
    }
}
