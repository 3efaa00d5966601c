//! Presentation surface (swapchain) lifecycle.
//!
//! [`PresentationSurface`] owns the VkSwapchainKHR, its images and their
//! views. It selects format, present mode, extent and image count from the
//! surface capabilities, acquires images, and is rebuilt in place when the
//! window stops matching it. Every rebuild bumps a generation counter that
//! dependent resources compare against.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use frameloop_rhi::device::Device;
//! use frameloop_rhi::instance::Instance;
//! use frameloop_rhi::swapchain::{AcquireResult, PresentationSurface};
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #            image_available: vk::Semaphore) -> Result<(), frameloop_rhi::RhiError> {
//! let mut presentation = PresentationSurface::new(
//!     instance,
//!     device,
//!     surface,
//!     vk::Extent2D { width: 1280, height: 720 },
//!     true,
//! )?;
//!
//! match presentation.acquire_next(image_available, u64::MAX)? {
//!     AcquireResult::Ready { index, .. } => {
//!         // ... render into presentation.image(index as usize) ...
//!     }
//!     AcquireResult::OutOfDate => {
//!         presentation.recreate(vk::Extent2D { width: 1280, height: 720 })?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Outcome of a surface operation that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The surface matches the window.
    Ok,
    /// The surface no longer matches the window and must be rebuilt.
    OutOfDate,
    /// The surface still works but no longer matches exactly.
    Suboptimal,
}

impl SurfaceStatus {
    /// True for `OutOfDate` and `Suboptimal`.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, SurfaceStatus::Ok)
    }
}

/// Result of [`PresentationSurface::acquire_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image was acquired; its semaphore will be signalled.
    ///
    /// `status` is `Ok` or `Suboptimal`.
    Ready { index: u32, status: SurfaceStatus },
    /// No image was acquired and nothing will be signalled.
    OutOfDate,
}

impl AcquireResult {
    /// The status reported alongside this result.
    pub fn status(&self) -> SurfaceStatus {
        match self {
            AcquireResult::Ready { status, .. } => *status,
            AcquireResult::OutOfDate => SurfaceStatus::OutOfDate,
        }
    }
}

/// Maps the raw acquire result onto [`AcquireResult`].
///
/// Any error other than out-of-date (including timeouts) is returned as
/// [`RhiError::VulkanError`].
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireResult> {
    match result {
        Ok((index, false)) => Ok(AcquireResult::Ready {
            index,
            status: SurfaceStatus::Ok,
        }),
        Ok((index, true)) => Ok(AcquireResult::Ready {
            index,
            status: SurfaceStatus::Suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
        Err(e) => Err(RhiError::VulkanError(e)),
    }
}

/// Maps the raw present result onto [`SurfaceStatus`].
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Ok),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(e) => Err(RhiError::VulkanError(e)),
    }
}

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unbounded".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything chosen before a swapchain is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SwapchainPlan {
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    image_count: u32,
    pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    fn from_support(
        support: &SwapchainSupportDetails,
        requested: vk::Extent2D,
        prefer_mailbox: bool,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate surface support (no formats or present modes)".to_string(),
            ));
        }

        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes, prefer_mailbox),
            extent: choose_extent(&support.capabilities, requested),
            image_count: determine_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    fn has_area(&self) -> bool {
        self.extent.width > 0 && self.extent.height > 0
    }
}

/// The presentable images of one window and their views.
///
/// # Thread Safety
///
/// Mutated only by the thread driving the frame loop.
pub struct PresentationSurface {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Surface extension loader, kept for recreation queries
    surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Window surface this swapchain presents to (not owned)
    surface: vk::SurfaceKHR,
    /// Swapchain handle
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    /// Image views for the swapchain images
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    /// Try MAILBOX before FIFO
    prefer_mailbox: bool,
    /// Bumped on every successful rebuild
    generation: u64,
}

impl PresentationSurface {
    /// Creates the swapchain for `surface`.
    ///
    /// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR and, when `prefer_mailbox`
    /// is set, the MAILBOX present mode. FIFO is the fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail
    /// - The surface reports no formats or present modes
    /// - The surface currently has zero area
    /// - Swapchain or image view creation fails
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        requested: vk::Extent2D,
        prefer_mailbox: bool,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        let plan = SwapchainPlan::from_support(&support, requested, prefer_mailbox)?;
        if !plan.has_area() {
            return Err(RhiError::SwapchainError(
                "Cannot create a swapchain for a zero-area surface".to_string(),
            ));
        }

        let mut this = Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: plan.surface_format.format,
            color_space: plan.surface_format.color_space,
            extent: plan.extent,
            present_mode: plan.present_mode,
            prefer_mailbox,
            generation: 0,
        };
        this.build(&plan, vk::SwapchainKHR::null())?;

        Ok(this)
    }

    /// Rebuilds the swapchain for a new window size.
    ///
    /// Returns `Ok(false)` without touching any GPU object when the surface
    /// currently reports zero area; the caller retries later. Otherwise
    /// waits for the device to go idle, destroys the old views and swapchain,
    /// creates new ones and bumps [`generation`](Self::generation).
    ///
    /// # Errors
    ///
    /// Returns an error if the idle wait, the queries or creation fail.
    pub fn recreate(&mut self, requested: vk::Extent2D) -> RhiResult<bool> {
        let Some(plan) = plan_recreate(requested, self.prefer_mailbox, || {
            SwapchainSupportDetails::query(
                self.device.physical_device(),
                self.surface,
                &self.surface_loader,
            )
        })?
        else {
            return Ok(false);
        };

        self.device.wait_idle()?;

        info!(
            "Recreating swapchain: {}x{} -> {}x{}",
            self.extent.width, self.extent.height, plan.extent.width, plan.extent.height
        );

        self.destroy_image_views();
        let old_swapchain = std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null());
        self.images.clear();

        let built = self.build(&plan, old_swapchain);

        // Retired once the replacement exists (or creation failed)
        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }
        built?;

        self.format = plan.surface_format.format;
        self.color_space = plan.surface_format.color_space;
        self.extent = plan.extent;
        self.present_mode = plan.present_mode;
        self.generation += 1;

        info!(
            "Swapchain generation {} ready ({} images)",
            self.generation,
            self.images.len()
        );

        Ok(true)
    }

    /// Creates swapchain, images and views from `plan` into `self`.
    fn build(&mut self, plan: &SwapchainPlan, old_swapchain: vk::SwapchainKHR) -> RhiResult<()> {
        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.surface_format.color_space,
            plan.present_mode,
            plan.image_count
        );

        let queue_families = self.device.queue_families();
        let graphics_family = queue_families.graphics()?;
        let present_family = queue_families.present()?;
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        self.swapchain = swapchain;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        self.image_views =
            create_image_views(&self.device, &self.images, plan.surface_format.format)?;

        debug!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Acquires the next presentable image.
    ///
    /// `semaphore` is signalled when the image is ready to be written. On
    /// [`AcquireResult::OutOfDate`] nothing is signalled.
    ///
    /// # Errors
    ///
    /// Any failure other than out-of-date, including a timeout.
    pub fn acquire_next(&self, semaphore: vk::Semaphore, timeout: u64) -> RhiResult<AcquireResult> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
        };
        classify_acquire(result)
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// # Errors
    ///
    /// Any failure other than out-of-date or suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<SurfaceStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        classify_present(result)
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of times the swapchain was rebuilt.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }

            info!(
                "Swapchain destroyed (generation {}, was {}x{}, {} images)",
                self.generation,
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Chooses the surface format.
///
/// Prefers B8G8R8A8_SRGB with SRGB_NONLINEAR, then B8G8R8A8_UNORM, then the
/// first format reported.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return format;
    }

    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return format;
    }

    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// Chooses the present mode: MAILBOX when preferred and offered, else FIFO.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    // FIFO is always supported
    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent.
///
/// Uses the surface's current extent unless it is the undefined sentinel
/// (`u32::MAX`), in which case the window size is clamped to the limits.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, requested.width, requested.height
    );

    extent
}

/// One more than the minimum, capped by the maximum when it is bounded.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // max_image_count == 0 means unbounded
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Creates one color view per swapchain image.
///
/// Views created before a failure are destroyed again.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range());

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(image_views)
}

/// Plans a rebuild for `requested`, or `None` while either the window or
/// the surface has zero area.
///
/// `query` is only consulted once the window has area.
fn plan_recreate<Q>(
    requested: vk::Extent2D,
    prefer_mailbox: bool,
    query: Q,
) -> RhiResult<Option<SwapchainPlan>>
where
    Q: FnOnce() -> RhiResult<SwapchainSupportDetails>,
{
    if requested.width == 0 || requested.height == 0 {
        debug!("Recreate skipped: requested extent has zero area");
        return Ok(None);
    }

    let support = query()?;
    let plan = SwapchainPlan::from_support(&support, requested, prefer_mailbox)?;
    if !plan.has_area() {
        debug!("Recreate skipped: surface reports zero-area extent");
        return Ok(None);
    }

    Ok(Some(plan))
}

/// Single mip, single layer color range.
pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);

        let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&no_mailbox, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };

        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_when_undefined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };

        assert_eq!(choose_extent(&capabilities, extent(3000, 3000)), extent(2000, 2000));
        assert_eq!(choose_extent(&capabilities, extent(50, 50)), extent(100, 100));
        assert_eq!(choose_extent(&capabilities, extent(800, 600)), extent(800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let bounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&bounded), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 4);
    }

    #[test]
    fn test_plan_rejects_inadequate_support() {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SwapchainPlan::from_support(&support, extent(640, 480), true),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_plan_detects_zero_area() {
        // Minimized windows report a 0x0 current extent on some platforms
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                current_extent: extent(0, 0),
                min_image_count: 2,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let plan = SwapchainPlan::from_support(&support, extent(640, 480), true).unwrap();
        assert!(!plan.has_area());
    }

    fn support_with_current(current: vk::Extent2D) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                current_extent: current,
                min_image_count: 2,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn test_recreate_with_zero_window_skips_surface_query() {
        for requested in [extent(0, 0), extent(0, 480), extent(640, 0)] {
            let plan = plan_recreate(requested, true, || {
                panic!("surface queried for a zero-area window")
            })
            .unwrap();
            assert!(plan.is_none());
        }
    }

    #[test]
    fn test_recreate_with_zero_area_surface_is_deferred() {
        let plan = plan_recreate(extent(640, 480), true, || {
            Ok(support_with_current(extent(0, 0)))
        })
        .unwrap();
        assert!(plan.is_none());
    }

    #[test]
    fn test_recreate_plans_current_surface_extent() {
        let plan = plan_recreate(extent(640, 480), false, || {
            Ok(support_with_current(extent(1024, 768)))
        })
        .unwrap()
        .unwrap();
        assert_eq!(plan.extent, extent(1024, 768));
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_recreate_propagates_query_errors() {
        let result = plan_recreate(extent(640, 480), true, || {
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireResult::Ready {
                index: 2,
                status: SurfaceStatus::Ok
            }
        );
        assert_eq!(
            classify_acquire(Ok((1, true))).unwrap(),
            AcquireResult::Ready {
                index: 1,
                status: SurfaceStatus::Suboptimal
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireResult::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(matches!(
            classify_acquire(Err(vk::Result::TIMEOUT)),
            Err(RhiError::VulkanError(vk::Result::TIMEOUT))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), SurfaceStatus::Ok);
        assert_eq!(classify_present(Ok(true)).unwrap(), SurfaceStatus::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::SUBOPTIMAL_KHR)).unwrap(),
            SurfaceStatus::Suboptimal
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SurfaceStatus::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_status_needs_recreate() {
        assert!(!SurfaceStatus::Ok.needs_recreate());
        assert!(SurfaceStatus::OutOfDate.needs_recreate());
        assert!(SurfaceStatus::Suboptimal.needs_recreate());
        assert_eq!(AcquireResult::OutOfDate.status(), SurfaceStatus::OutOfDate);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
