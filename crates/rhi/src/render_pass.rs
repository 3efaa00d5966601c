//! Render pass construction from attachment specs.
//!
//! A [`RenderPass`] has one graphics subpass that writes every attachment.
//! Surface-backed color attachments end in `PRESENT_SRC_KHR`; everything else
//! ends in a layout it can be sampled or reused from. A single external
//! dependency keeps the pass from writing before earlier work on the same
//! images is done.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth is cleared to the far plane.
pub const DEPTH_CLEAR: vk::ClearDepthStencilValue = vk::ClearDepthStencilValue {
    depth: 1.0,
    stencil: 0,
};

/// What an attachment is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentRole {
    Color,
    Depth,
}

/// Description of one render pass attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub role: AttachmentRole,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    /// Backed by a presentation surface image instead of an owned image.
    pub surface_backed: bool,
}

impl AttachmentSpec {
    /// Single-sampled color attachment backed by the presentation surface.
    pub fn surface_color(format: vk::Format) -> Self {
        Self {
            role: AttachmentRole::Color,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            surface_backed: true,
        }
    }

    /// Single-sampled color attachment with its own image.
    pub fn color(format: vk::Format) -> Self {
        Self {
            role: AttachmentRole::Color,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            surface_backed: false,
        }
    }

    /// Single-sampled depth attachment with its own image.
    pub fn depth(format: vk::Format) -> Self {
        Self {
            role: AttachmentRole::Depth,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            surface_backed: false,
        }
    }

    /// Layout the attachment is left in when the pass ends.
    pub fn final_layout(&self) -> vk::ImageLayout {
        match (self.role, self.surface_backed) {
            (AttachmentRole::Color, true) => vk::ImageLayout::PRESENT_SRC_KHR,
            (AttachmentRole::Color, false) => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            (AttachmentRole::Depth, _) => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// Layout used while the subpass writes the attachment.
    pub fn subpass_layout(&self) -> vk::ImageLayout {
        match self.role {
            AttachmentRole::Color => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            AttachmentRole::Depth => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// Usage flags for an owned image backing this attachment.
    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        match self.role {
            AttachmentRole::Color => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            }
            AttachmentRole::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        }
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        match self.role {
            AttachmentRole::Color => vk::ImageAspectFlags::COLOR,
            AttachmentRole::Depth => vk::ImageAspectFlags::DEPTH,
        }
    }
}

/// Attachment description for `spec`.
///
/// Every attachment is cleared on load. Color is stored; depth is not
/// needed after the pass.
pub fn attachment_description(spec: &AttachmentSpec) -> vk::AttachmentDescription {
    let store_op = match spec.role {
        AttachmentRole::Color => vk::AttachmentStoreOp::STORE,
        AttachmentRole::Depth => vk::AttachmentStoreOp::DONT_CARE,
    };

    vk::AttachmentDescription::default()
        .format(spec.format)
        .samples(spec.samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(store_op)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(spec.final_layout())
}

/// The one dependency from outside the pass into subpass 0.
pub fn external_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
}

/// Checks that `specs` can form a single-subpass pass.
///
/// Requires at least one color attachment, at most one depth attachment and
/// at most one surface-backed attachment, which must be single-sampled color.
pub fn validate_attachments(specs: &[AttachmentSpec]) -> RhiResult<()> {
    let colors = specs
        .iter()
        .filter(|s| s.role == AttachmentRole::Color)
        .count();
    let depths = specs.len() - colors;
    let surface_backed: Vec<_> = specs.iter().filter(|s| s.surface_backed).collect();

    if colors == 0 {
        return Err(RhiError::InvalidAttachments(
            "at least one color attachment is required".to_string(),
        ));
    }
    if depths > 1 {
        return Err(RhiError::InvalidAttachments(format!(
            "at most one depth attachment is allowed, got {}",
            depths
        )));
    }
    if surface_backed.len() > 1 {
        return Err(RhiError::InvalidAttachments(format!(
            "at most one surface-backed attachment is allowed, got {}",
            surface_backed.len()
        )));
    }
    if let Some(spec) = surface_backed.first()
        && (spec.role != AttachmentRole::Color || spec.samples != vk::SampleCountFlags::TYPE_1)
    {
        return Err(RhiError::InvalidAttachments(
            "surface-backed attachments must be single-sampled color".to_string(),
        ));
    }

    Ok(())
}

/// Clear values in attachment order.
pub fn clear_values(specs: &[AttachmentSpec], color: [f32; 4]) -> Vec<vk::ClearValue> {
    specs
        .iter()
        .map(|spec| match spec.role {
            AttachmentRole::Color => vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            AttachmentRole::Depth => vk::ClearValue {
                depth_stencil: DEPTH_CLEAR,
            },
        })
        .collect()
}

/// Vulkan render pass wrapper that remembers its attachment specs.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    attachments: Vec<AttachmentSpec>,
}

impl RenderPass {
    /// Creates a single-subpass render pass.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidAttachments`] if `specs` fails
    /// [`validate_attachments`], otherwise the Vulkan creation error.
    pub fn new(device: Arc<Device>, specs: &[AttachmentSpec]) -> RhiResult<Self> {
        validate_attachments(specs)?;

        let descriptions: Vec<_> = specs.iter().map(attachment_description).collect();

        let color_refs: Vec<_> = specs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.role == AttachmentRole::Color)
            .map(|(i, s)| {
                vk::AttachmentReference::default()
                    .attachment(i as u32)
                    .layout(s.subpass_layout())
            })
            .collect();

        let depth_ref = specs
            .iter()
            .position(|s| s.role == AttachmentRole::Depth)
            .map(|i| {
                vk::AttachmentReference::default()
                    .attachment(i as u32)
                    .layout(specs[i].subpass_layout())
            });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let subpasses = [subpass];
        let dependencies = [external_dependency()];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&descriptions)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created: {} color, {} depth attachment(s)",
            color_refs.len(),
            usize::from(depth_ref.is_some())
        );

        Ok(Self {
            device,
            render_pass,
            attachments: specs.to_vec(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn attachments(&self) -> &[AttachmentSpec] {
        &self.attachments
    }

    /// The surface-backed attachment, if the pass has one.
    pub fn surface_attachment(&self) -> Option<&AttachmentSpec> {
        self.attachments.iter().find(|s| s.surface_backed)
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}
