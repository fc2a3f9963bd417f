//! Swapchain manager
//!
//! Owns the presentable image chain together with its image views and
//! framebuffers, and moves through
//! `Uninitialized -> Created -> Invalidated -> Recreating -> Created`.
//!
//! Recreation waits until the window has a non-zero framebuffer (a minimized
//! window blocks on its event loop), waits for the device to go idle, tears
//! down framebuffers, views and the swapchain, then runs creation again and
//! bumps the generation.
//!
//! Out-of-date and suboptimal results from acquire and present are reported as
//! [`AcquireStatus`] / [`PresentStatus`] values rather than errors.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::initialization::device::SurfaceSupport;
use crate::render::vulkan::initialization::window::SurfaceProvider;
use crate::render::vulkan::rendering::render_pass::RenderPass;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Lifecycle of the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainPhase {
    /// Nothing created yet
    Uninitialized,
    /// Images, views and framebuffers are live
    Created,
    /// Out of date or resized; must be recreated before the next acquire
    Invalidated,
    /// Old chain torn down, new chain being built
    Recreating,
}

/// Result of acquiring the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image was acquired; a suboptimal chain can still be rendered to
    Acquired {
        /// Index into the swapchain images
        image_index: u32,
        /// The chain no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The chain can no longer be used
    OutOfDate,
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the chain still matches the surface
    Presented,
    /// Presented but the chain should be recreated
    Suboptimal,
    /// Not presented; the chain must be recreated
    OutOfDate,
}

impl PresentStatus {
    /// Whether the swapchain must be rebuilt after this present
    pub const fn needs_recreation(self) -> bool {
        matches!(self, Self::Suboptimal | Self::OutOfDate)
    }
}

/// Prefer `B8G8R8A8_SRGB` with non-linear sRGB, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// Prefer `MAILBOX`, else `FIFO` which every implementation supports
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the framebuffer size clamped to the
/// surface limits when the current extent is the `u32::MAX` sentinel
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width.max(capabilities.min_image_extent.width),
        ),
        height: framebuffer.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height.max(capabilities.min_image_extent.height),
        ),
    }
}

/// One more than the minimum, capped by the maximum when it is non-zero
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Block on window events until the framebuffer has a non-zero size
pub fn wait_for_drawable_size<W: SurfaceProvider + ?Sized>(window: &mut W) -> (u32, u32) {
    let mut size = window.framebuffer_size();
    while size.0 == 0 || size.1 == 0 {
        window.wait_events();
        size = window.framebuffer_size();
    }
    size
}

/// Phase and generation of a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainLifecycle {
    phase: SwapchainPhase,
    generation: u64,
}

impl SwapchainLifecycle {
    /// Nothing created, generation 0
    pub const fn new() -> Self {
        Self {
            phase: SwapchainPhase::Uninitialized,
            generation: 0,
        }
    }

    /// Current phase
    pub const fn phase(&self) -> SwapchainPhase {
        self.phase
    }

    /// Number of successful creations so far
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// `Created -> Invalidated`; other phases are left alone
    pub fn invalidate(&mut self) {
        if self.phase == SwapchainPhase::Created {
            self.phase = SwapchainPhase::Invalidated;
        }
    }

    fn begin_recreate(&mut self) {
        self.phase = SwapchainPhase::Recreating;
    }

    fn created(&mut self) {
        self.generation += 1;
        self.phase = SwapchainPhase::Created;
    }

    fn destroyed(&mut self) {
        self.phase = SwapchainPhase::Uninitialized;
    }
}

impl Default for SwapchainLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Device work behind [`recreate_in_order`]
pub trait RecreateSteps {
    /// Lifecycle of the chain being rebuilt
    fn lifecycle(&mut self) -> &mut SwapchainLifecycle;

    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self) -> VulkanResult<()>;

    /// Destroy framebuffers, views and the swapchain
    fn teardown(&mut self);

    /// Build the new chain at `framebuffer_size`; `true` if the surface
    /// format changed
    fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> VulkanResult<bool>;
}

/// Wait for a drawable size, drain the device, tear down, rebuild
///
/// The lifecycle goes `Invalidated -> Recreating` before teardown and reaches
/// `Created` with a new generation only once the rebuild succeeds. A failed
/// rebuild leaves it in `Recreating`.
pub fn recreate_in_order<W, S>(window: &mut W, steps: &mut S) -> VulkanResult<bool>
where
    W: SurfaceProvider + ?Sized,
    S: RecreateSteps + ?Sized,
{
    steps.lifecycle().invalidate();
    let framebuffer_size = wait_for_drawable_size(window);

    steps.wait_idle()?;
    steps.lifecycle().begin_recreate();
    steps.teardown();

    let format_changed = steps.rebuild(framebuffer_size)?;
    steps.lifecycle().created();
    Ok(format_changed)
}

/// Live swapchain resources
pub struct SwapchainState {
    /// Swapchain handle
    pub handle: vk::SwapchainKHR,
    /// Presentable images, owned by the swapchain
    pub images: Vec<vk::Image>,
    /// One view per image
    pub image_views: Vec<vk::ImageView>,
    /// One framebuffer per view
    pub framebuffers: Vec<vk::Framebuffer>,
    /// Chosen surface format
    pub format: vk::SurfaceFormatKHR,
    /// Chosen present mode
    pub present_mode: vk::PresentModeKHR,
    /// Chosen extent
    pub extent: vk::Extent2D,
}

impl SwapchainState {
    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// One view and one framebuffer per image
    pub fn is_complete(&self) -> bool {
        self.image_views.len() == self.images.len() && self.framebuffers.len() == self.images.len()
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct SwapchainManager {
    device: Device,
    loader: SwapchainLoader,
    lifecycle: SwapchainLifecycle,
    state: Option<SwapchainState>,
}

impl SwapchainManager {
    /// Create a manager with nothing built yet
    pub fn new(context: &DeviceContext) -> VulkanResult<Self> {
        let loader = context.swapchain_loader().cloned().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "device was created without the swapchain extension".to_string(),
        })?;

        Ok(Self {
            device: context.raw_device(),
            loader,
            lifecycle: SwapchainLifecycle::new(),
            state: None,
        })
    }

    /// Current lifecycle phase
    pub const fn phase(&self) -> SwapchainPhase {
        self.lifecycle.phase()
    }

    /// Incremented on every successful creation
    pub const fn generation(&self) -> u64 {
        self.lifecycle.generation()
    }

    /// Live resources, `None` unless created
    pub const fn state(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    fn live(&self) -> VulkanResult<&SwapchainState> {
        self.state.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("swapchain is {:?}", self.lifecycle.phase()),
        })
    }

    /// Build the chain, its views and one framebuffer per view
    pub fn create(
        &mut self,
        context: &DeviceContext,
        support: &SurfaceSupport,
        framebuffer_size: (u32, u32),
        render_pass: &RenderPass,
    ) -> VulkanResult<()> {
        self.build_chain(context, support, framebuffer_size, render_pass)?;
        self.lifecycle.created();
        Ok(())
    }

    fn build_chain(
        &mut self,
        context: &DeviceContext,
        support: &SurfaceSupport,
        framebuffer_size: (u32, u32),
        render_pass: &RenderPass,
    ) -> VulkanResult<()> {
        if self.state.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: "swapchain already created".to_string(),
            });
        }

        let surface = context.surface().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no surface".to_string(),
        })?;

        let format = choose_surface_format(&support.formats).ok_or(VulkanError::NoSuitableDevice)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);

        let families = [context.graphics_family(), context.present_family()];
        let (sharing_mode, family_indices): (_, &[u32]) = if families[0] == families[1] {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &families)
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let handle = unsafe {
            self.loader.create_swapchain(&create_info, None)
                .map_err(VulkanError::creation("swapchain"))?
        };

        // Partially built state is torn down by destroy() on failure
        let mut state = SwapchainState {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format,
            present_mode,
            extent,
        };

        let built = self.populate(&mut state, render_pass);
        self.state = Some(state);
        if let Err(e) = built {
            self.release();
            return Err(e);
        }

        debug_assert!(self.state.as_ref().is_some_and(SwapchainState::is_complete));
        log::debug!(
            "Swapchain generation {}: {} images, {}x{}, {:?}, {:?}",
            self.lifecycle.generation() + 1,
            image_count,
            extent.width,
            extent.height,
            format.format,
            present_mode
        );
        Ok(())
    }

    fn populate(&self, state: &mut SwapchainState, render_pass: &RenderPass) -> VulkanResult<()> {
        state.images = unsafe {
            self.loader.get_swapchain_images(state.handle)
                .map_err(VulkanError::Api)?
        };

        for &image in &state.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(state.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                self.device.create_image_view(&create_info, None)
                    .map_err(VulkanError::creation("swapchain image view"))?
            };
            state.image_views.push(view);
        }

        for &view in &state.image_views {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(state.extent.width)
                .height(state.extent.height)
                .layers(1);

            let framebuffer = unsafe {
                self.device.create_framebuffer(&create_info, None)
                    .map_err(VulkanError::creation("framebuffer"))?
            };
            state.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    /// Mark the chain as needing recreation
    pub fn invalidate(&mut self) {
        self.lifecycle.invalidate();
    }

    /// Wait for a drawable size, drain the device and rebuild the chain
    ///
    /// When the surface format changed, `render_pass` is rebuilt for the new
    /// format before the framebuffers are created and `true` is returned so
    /// pipelines built against the old pass can be rebuilt too.
    pub fn recreate<W: SurfaceProvider + ?Sized>(
        &mut self,
        context: &DeviceContext,
        window: &mut W,
        render_pass: &mut RenderPass,
    ) -> VulkanResult<bool> {
        recreate_in_order(window, &mut ManagerRecreation {
            manager: self,
            context,
            render_pass,
        })
    }

    /// Acquire the next image, signaling `image_available` when it is ready
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> VulkanResult<AcquireStatus> {
        let state = self.live()?;
        let result = unsafe {
            self.loader.acquire_next_image(state.handle, u64::MAX, image_available, vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireStatus::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Present `image_index` on `queue` after `wait` is signaled
    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, image_index: u32) -> VulkanResult<PresentStatus> {
        let state = self.live()?;
        let wait_semaphores = [wait];
        let swapchains = [state.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Destroy framebuffers, views and the swapchain
    ///
    /// The caller must ensure the device no longer uses them.
    pub fn destroy(&mut self) {
        self.release();
        self.lifecycle.destroyed();
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            unsafe {
                for framebuffer in state.framebuffers {
                    self.device.destroy_framebuffer(framebuffer, None);
                }
                for view in state.image_views {
                    self.device.destroy_image_view(view, None);
                }
                self.loader.destroy_swapchain(state.handle, None);
            }
        }
    }
}

/// [`RecreateSteps`] over a live manager
struct ManagerRecreation<'m, 'c> {
    manager: &'m mut SwapchainManager,
    context: &'c DeviceContext,
    render_pass: &'m mut RenderPass,
}

impl RecreateSteps for ManagerRecreation<'_, '_> {
    fn lifecycle(&mut self) -> &mut SwapchainLifecycle {
        &mut self.manager.lifecycle
    }

    fn wait_idle(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    fn teardown(&mut self) {
        self.manager.release();
    }

    fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> VulkanResult<bool> {
        let support = self.context.surface_support()?;
        let format = choose_surface_format(&support.formats).ok_or(VulkanError::NoSuitableDevice)?;

        let format_changed = format.format != self.render_pass.format();
        if format_changed {
            log::info!("Surface format changed to {:?}, rebuilding render pass", format.format);
            *self.render_pass = RenderPass::new(self.context.raw_device(), format.format)?;
        }

        self.manager.build_chain(self.context, &support, framebuffer_size, &*self.render_pass)?;
        Ok(format_changed)
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 64, height: 32 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_srgb_bgra() {
        let formats = [
            vk::SurfaceFormatKHR { format: vk::Format::R8G8B8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
            vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_SRGB, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[1]));
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let formats = [
            vk::SurfaceFormatKHR { format: vk::Format::R8G8B8A8_UNORM, color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR },
            vk::SurfaceFormatKHR { format: vk::Format::B8G8R8A8_SRGB, color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT },
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_choice() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_current_extent_used_when_fixed() {
        let mut caps = capabilities(2, 3);
        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(choose_extent(&caps, (1234, 999)), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_extent_clamped_to_surface_limits() {
        let caps = capabilities(2, 3);
        assert_eq!(choose_extent(&caps, (4000, 10)), vk::Extent2D { width: 1920, height: 32 });
        assert_eq!(choose_extent(&caps, (1, 2000)), vk::Extent2D { width: 64, height: 1080 });
        assert_eq!(choose_extent(&caps, (640, 480)), vk::Extent2D { width: 640, height: 480 });
    }

    #[test]
    fn test_image_count_bounds() {
        assert_eq!(choose_image_count(&capabilities(2, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(1, 8)), 2);
    }

    #[test]
    fn test_present_status_recreation() {
        assert!(!PresentStatus::Presented.needs_recreation());
        assert!(PresentStatus::Suboptimal.needs_recreation());
        assert!(PresentStatus::OutOfDate.needs_recreation());
    }

    #[test]
    fn test_state_completeness() {
        let mut state = SwapchainState {
            handle: vk::SwapchainKHR::null(),
            images: vec![vk::Image::null(); 3],
            image_views: vec![vk::ImageView::null(); 3],
            framebuffers: vec![vk::Framebuffer::null(); 2],
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D { width: 1, height: 1 },
        };
        assert!(!state.is_complete());

        state.framebuffers.push(vk::Framebuffer::null());
        assert!(state.is_complete());
        assert_eq!(state.image_count(), 3);
    }

    struct MinimizedWindow {
        sizes: VecDeque<(u32, u32)>,
        waits: usize,
    }

    impl SurfaceProvider for MinimizedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            self.sizes.front().copied().unwrap_or((0, 0))
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if self.sizes.len() > 1 {
                self.sizes.pop_front();
            }
        }

        fn take_resize_notification(&mut self) -> bool {
            false
        }
    }

    #[test]
    fn test_waits_until_framebuffer_is_non_zero() {
        let mut window = MinimizedWindow {
            sizes: VecDeque::from([(0, 0), (0, 0), (800, 0), (800, 600)]),
            waits: 0,
        };

        assert_eq!(wait_for_drawable_size(&mut window), (800, 600));
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn test_no_wait_when_already_drawable() {
        let mut window = MinimizedWindow {
            sizes: VecDeque::from([(1024, 768)]),
            waits: 0,
        };

        assert_eq!(wait_for_drawable_size(&mut window), (1024, 768));
        assert_eq!(window.waits, 0);
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Step {
        WaitEvents,
        WaitIdle(SwapchainPhase),
        Teardown(SwapchainPhase),
        Rebuild((u32, u32), SwapchainPhase),
    }

    type StepLog = Rc<RefCell<Vec<Step>>>;

    /// Window that stays minimized for a number of event waits
    struct LoggedWindow {
        log: StepLog,
        minimized_for: usize,
    }

    impl SurfaceProvider for LoggedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            if self.minimized_for > 0 { (0, 0) } else { (1280, 720) }
        }

        fn wait_events(&mut self) {
            self.log.borrow_mut().push(Step::WaitEvents);
            self.minimized_for = self.minimized_for.saturating_sub(1);
        }

        fn take_resize_notification(&mut self) -> bool {
            false
        }
    }

    struct LoggedSteps {
        log: StepLog,
        lifecycle: SwapchainLifecycle,
        format_changed: bool,
        fail_rebuild: bool,
    }

    impl LoggedSteps {
        fn created(log: &StepLog) -> Self {
            let mut lifecycle = SwapchainLifecycle::new();
            lifecycle.created();
            Self {
                log: Rc::clone(log),
                lifecycle,
                format_changed: false,
                fail_rebuild: false,
            }
        }
    }

    impl RecreateSteps for LoggedSteps {
        fn lifecycle(&mut self) -> &mut SwapchainLifecycle {
            &mut self.lifecycle
        }

        fn wait_idle(&mut self) -> VulkanResult<()> {
            self.log.borrow_mut().push(Step::WaitIdle(self.lifecycle.phase()));
            Ok(())
        }

        fn teardown(&mut self) {
            self.log.borrow_mut().push(Step::Teardown(self.lifecycle.phase()));
        }

        fn rebuild(&mut self, framebuffer_size: (u32, u32)) -> VulkanResult<bool> {
            self.log.borrow_mut().push(Step::Rebuild(framebuffer_size, self.lifecycle.phase()));
            if self.fail_rebuild {
                return Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR));
            }
            Ok(self.format_changed)
        }
    }

    #[test]
    fn test_lifecycle_invalidates_only_created_chain() {
        let mut lifecycle = SwapchainLifecycle::new();
        lifecycle.invalidate();
        assert_eq!(lifecycle.phase(), SwapchainPhase::Uninitialized);

        lifecycle.created();
        lifecycle.invalidate();
        assert_eq!(lifecycle.phase(), SwapchainPhase::Invalidated);
        assert_eq!(lifecycle.generation(), 1);

        lifecycle.destroyed();
        assert_eq!(lifecycle.phase(), SwapchainPhase::Uninitialized);
        assert_eq!(lifecycle.generation(), 1);
    }

    #[test]
    fn test_recreation_waits_then_drains_then_rebuilds() {
        let log = StepLog::default();
        let mut window = LoggedWindow { log: Rc::clone(&log), minimized_for: 2 };
        let mut steps = LoggedSteps::created(&log);

        assert!(!recreate_in_order(&mut window, &mut steps).unwrap());

        assert_eq!(
            *log.borrow(),
            vec![
                Step::WaitEvents,
                Step::WaitEvents,
                Step::WaitIdle(SwapchainPhase::Invalidated),
                Step::Teardown(SwapchainPhase::Recreating),
                Step::Rebuild((1280, 720), SwapchainPhase::Recreating),
            ]
        );
        assert_eq!(steps.lifecycle.phase(), SwapchainPhase::Created);
        assert_eq!(steps.lifecycle.generation(), 2);
    }

    #[test]
    fn test_recreation_reports_format_change() {
        let log = StepLog::default();
        let mut window = LoggedWindow { log: Rc::clone(&log), minimized_for: 0 };
        let mut steps = LoggedSteps::created(&log);
        steps.format_changed = true;

        assert!(recreate_in_order(&mut window, &mut steps).unwrap());
        assert!(!log.borrow().contains(&Step::WaitEvents));
        assert_eq!(steps.lifecycle.generation(), 2);
    }

    #[test]
    fn test_failed_rebuild_keeps_generation() {
        let log = StepLog::default();
        let mut window = LoggedWindow { log: Rc::clone(&log), minimized_for: 0 };
        let mut steps = LoggedSteps::created(&log);
        steps.fail_rebuild = true;

        assert!(recreate_in_order(&mut window, &mut steps).is_err());
        assert_eq!(steps.lifecycle.phase(), SwapchainPhase::Recreating);
        assert_eq!(steps.lifecycle.generation(), 1);
    }
}
