//! Framebuffers and the per-image render target set.
//!
//! A [`Framebuffer`] binds one view per attachment of a [`RenderPass`]:
//! surface-backed attachments get a fresh view of the swapchain image, and
//! every other attachment gets its own GPU-only image sized to the extent.
//! [`RenderTargets`] holds one framebuffer per swapchain image and records
//! the surface generation it was built from.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::{AttachmentSpec, RenderPass, clear_values};
use crate::swapchain::PresentationSurface;

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Image, memory and view for an attachment the framebuffer owns.
struct OwnedAttachment {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl OwnedAttachment {
    fn new(device: Arc<Device>, spec: &AttachmentSpec, extent: vk::Extent2D) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(spec.format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(spec.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(spec.image_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // Filled in step by step so Drop releases whatever was created
        let mut attachment = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: None,
        };

        let requirements = unsafe {
            attachment
                .device
                .handle()
                .get_image_memory_requirements(image)
        };

        let allocation = attachment.device.allocator()?.allocate(&AllocationCreateDesc {
            name: "render_target_attachment",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false, // Optimal tiling is not linear
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            attachment.device.handle().bind_image_memory(
                image,
                allocation.memory(),
                allocation.offset(),
            )?;
        }
        attachment.allocation = Some(allocation);

        attachment.image_view = create_view(&attachment.device, image, spec)?;

        debug!(
            "Created {:?} attachment: {}x{} ({:?})",
            spec.role, extent.width, extent.height, spec.format
        );

        Ok(attachment)
    }
}

impl Drop for OwnedAttachment {
    fn drop(&mut self) {
        // View, then image, then memory
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device
                    .handle()
                    .destroy_image_view(self.image_view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free attachment allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking attachment allocation: {}", e),
            }
        }
    }
}

fn create_view(
    device: &Device,
    image: vk::Image,
    spec: &AttachmentSpec,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(spec.format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(spec.aspect())
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    Ok(unsafe { device.handle().create_image_view(&view_info, None)? })
}

/// A framebuffer plus every view and owned image it references.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    /// View of the swapchain image (the image itself is not owned)
    surface_view: vk::ImageView,
    owned: Vec<OwnedAttachment>,
}

impl Framebuffer {
    /// Builds a framebuffer compatible with `render_pass`.
    ///
    /// `surface_image` backs the pass's surface attachment and is required
    /// exactly when the pass has one.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidAttachments`] for a zero extent or a missing or
    /// unexpected surface image; otherwise allocation or Vulkan errors.
    pub fn build(
        device: Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        surface_image: Option<vk::Image>,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidAttachments(
                "framebuffer extent must be non-zero".to_string(),
            ));
        }
        if render_pass.surface_attachment().is_some() != surface_image.is_some() {
            return Err(RhiError::InvalidAttachments(
                "surface image must be supplied exactly when the pass has a surface attachment"
                    .to_string(),
            ));
        }

        let mut fb = Self {
            device,
            framebuffer: vk::Framebuffer::null(),
            surface_view: vk::ImageView::null(),
            owned: Vec::new(),
        };

        let mut views = Vec::with_capacity(render_pass.attachments().len());
        for spec in render_pass.attachments() {
            match surface_image {
                Some(image) if spec.surface_backed => {
                    fb.surface_view = create_view(&fb.device, image, spec)?;
                    views.push(fb.surface_view);
                }
                _ => {
                    let attachment = OwnedAttachment::new(fb.device.clone(), spec, extent)?;
                    views.push(attachment.image_view);
                    fb.owned.push(attachment);
                }
            }
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        fb.framebuffer = unsafe { fb.device.handle().create_framebuffer(&create_info, None)? };

        Ok(fb)
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            if self.framebuffer != vk::Framebuffer::null() {
                self.device
                    .handle()
                    .destroy_framebuffer(self.framebuffer, None);
            }
            if self.surface_view != vk::ImageView::null() {
                self.device
                    .handle()
                    .destroy_image_view(self.surface_view, None);
            }
        }
        // Owned attachments drop after the framebuffer that references them
    }
}

/// One framebuffer per swapchain image, tagged with the surface generation.
pub struct RenderTargets {
    device: Arc<Device>,
    framebuffers: Vec<Framebuffer>,
    extent: vk::Extent2D,
    generation: u64,
}

impl RenderTargets {
    /// Builds a framebuffer for every image of `surface`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidAttachments`] if the pass has no surface attachment
    /// or its format differs from the surface format.
    pub fn build(
        device: Arc<Device>,
        render_pass: &RenderPass,
        surface: &PresentationSurface,
    ) -> RhiResult<Self> {
        let mut targets = Self {
            device,
            framebuffers: Vec::new(),
            extent: surface.extent(),
            generation: surface.generation(),
        };
        targets.rebuild(render_pass, surface)?;
        Ok(targets)
    }

    /// Destroys every framebuffer and builds new ones for `surface`.
    ///
    /// The caller must ensure the GPU no longer uses the old framebuffers.
    pub fn rebuild(
        &mut self,
        render_pass: &RenderPass,
        surface: &PresentationSurface,
    ) -> RhiResult<()> {
        check_surface_format(render_pass.surface_attachment(), surface.format())?;

        self.framebuffers.clear();

        let extent = surface.extent();
        for &image in surface.images() {
            self.framebuffers.push(Framebuffer::build(
                self.device.clone(),
                render_pass,
                extent,
                Some(image),
            )?);
        }

        self.extent = extent;
        self.generation = surface.generation();

        info!(
            "Render targets built: {} framebuffers at {}x{} (generation {})",
            self.framebuffers.len(),
            extent.width,
            extent.height,
            self.generation
        );

        Ok(())
    }

    /// Surface generation the framebuffers were built from.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Begins `render_pass` on the framebuffer of `image_index`.
    ///
    /// Clears every attachment, sets viewport and scissor to the full extent
    /// and binds `pipeline` when one is given.
    ///
    /// # Errors
    ///
    /// [`RhiError::StaleRenderTarget`] if the targets were built for another
    /// surface generation, [`RhiError::InvalidHandle`] for an image index
    /// with no framebuffer.
    pub fn begin(
        &self,
        cmd: &CommandBuffer,
        render_pass: &RenderPass,
        image_index: u32,
        surface_generation: u64,
        pipeline: Option<vk::Pipeline>,
        clear_color: [f32; 4],
    ) -> RhiResult<()> {
        check_generation(self.generation, surface_generation)?;

        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "no framebuffer for image index {} ({} built)",
                    image_index,
                    self.framebuffers.len()
                ))
            })?;

        let clear_values = clear_values(render_pass.attachments(), clear_color);
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(full_scissor(self.extent))
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);
        cmd.set_viewport(&full_viewport(self.extent));
        cmd.set_scissor(&full_scissor(self.extent));
        if let Some(pipeline) = pipeline {
            cmd.bind_pipeline(pipeline);
        }

        Ok(())
    }

    /// Ends the pass started by [`begin`](Self::begin).
    pub fn end(&self, cmd: &CommandBuffer) {
        cmd.end_render_pass();
    }
}

/// Fails when a target built for `target` is used with surface `surface`.
pub fn check_generation(target: u64, surface: u64) -> RhiResult<()> {
    if target == surface {
        Ok(())
    } else {
        Err(RhiError::StaleRenderTarget { target, surface })
    }
}

/// Fails unless the pass has a surface attachment in `surface_format`.
fn check_surface_format(
    surface_attachment: Option<&AttachmentSpec>,
    surface_format: vk::Format,
) -> RhiResult<()> {
    let spec = surface_attachment.ok_or_else(|| {
        RhiError::InvalidAttachments("render pass has no surface attachment".to_string())
    })?;
    if spec.format != surface_format {
        return Err(RhiError::InvalidAttachments(format!(
            "render pass expects {:?} but the surface uses {:?}",
            spec.format, surface_format
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }

    #[test]
    fn test_full_scissor() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_check_generation() {
        assert!(check_generation(3, 3).is_ok());
        assert!(matches!(
            check_generation(2, 3),
            Err(RhiError::StaleRenderTarget {
                target: 2,
                surface: 3
            })
        ));
    }

    #[test]
    fn test_check_surface_format() {
        let color = AttachmentSpec::surface_color(vk::Format::B8G8R8A8_SRGB);
        assert!(check_surface_format(Some(&color), vk::Format::B8G8R8A8_SRGB).is_ok());
        assert!(matches!(
            check_surface_format(Some(&color), vk::Format::R8G8B8A8_UNORM),
            Err(RhiError::InvalidAttachments(_))
        ));
    }

    #[test]
    fn test_check_surface_format_requires_surface_attachment() {
        assert!(matches!(
            check_surface_format(None, vk::Format::B8G8R8A8_SRGB),
            Err(RhiError::InvalidAttachments(_))
        ));
    }

    #[test]
    fn test_render_targets_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Framebuffer>();
        assert_send::<RenderTargets>();
    }
}
