//! Device context
//!
//! [`DeviceContext`] is the single owner of every device-level handle: the
//! instance, the surface, the logical device with its queues, and the command
//! pool shared by the frame slots and the one-time command protocol. Other
//! components borrow the context or keep `ash::Device` clones, which are
//! dispatch tables and never destroy anything the context owns.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::cell::Cell;

use crate::core::config::RendererConfig;
use crate::render::vulkan::initialization::device::{
    LogicalDevice, PhysicalDeviceInfo, PresentationSurface, SurfaceSupport,
};
use crate::render::vulkan::initialization::instance::VulkanInstance;
use crate::render::vulkan::initialization::window::Window;
use crate::render::vulkan::resources::memory::MemoryManager;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Owner of the instance, surface, device, queues and command pool
pub struct DeviceContext {
    command_pool: vk::CommandPool,
    live_allocations: Cell<usize>,
    // Drop order below: device, then surface, then instance
    device: LogicalDevice,
    surface: Option<PresentationSurface>,
    physical_device: PhysicalDeviceInfo,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Create a context that presents to `window`
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let window_extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(config, &window_extensions)?;

        let surface = PresentationSurface {
            loader: Surface::new(&instance.entry, &instance.instance),
            handle: window.create_surface(instance.instance.handle())?,
        };

        Self::assemble(instance, Some(surface), &config.device_extensions)
    }

    /// Create a context without a surface
    ///
    /// The graphics queue doubles as the presentation queue and no swapchain
    /// support is required. Used by offline upload tools and device-backed
    /// tests.
    pub fn headless(config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(config, &[])?;
        let extensions: Vec<String> = config
            .device_extensions
            .iter()
            .filter(|ext| ext.as_bytes() != SwapchainLoader::name().to_bytes())
            .cloned()
            .collect();

        Self::assemble(instance, None, &extensions)
    }

    fn assemble(
        instance: VulkanInstance,
        surface: Option<PresentationSurface>,
        device_extensions: &[String],
    ) -> VulkanResult<Self> {
        let physical_device = PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            surface.as_ref(),
            device_extensions,
        )?;

        let device = LogicalDevice::new(
            &instance.instance,
            &physical_device,
            device_extensions,
            &instance.enabled_layers,
        )?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical_device.graphics_family);

        let command_pool = unsafe {
            device.device.create_command_pool(&pool_info, None)
                .map_err(VulkanError::creation("command pool"))?
        };

        Ok(Self {
            command_pool,
            live_allocations: Cell::new(0),
            device,
            surface,
            physical_device,
            instance,
        })
    }

    /// Get a reference to the Vulkan entry
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Cached memory types and heaps of the selected device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Clone of the device dispatch table for RAII wrappers
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.physical_device.graphics_family
    }

    /// Get the presentation queue family index
    pub fn present_family(&self) -> u32 {
        self.physical_device.present_family
    }

    /// The shared command pool
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Surface handle and loader, `None` for headless contexts
    pub fn surface(&self) -> Option<&PresentationSurface> {
        self.surface.as_ref()
    }

    /// Swapchain loader, `None` unless the swapchain extension is enabled
    pub fn swapchain_loader(&self) -> Option<&SwapchainLoader> {
        self.device.swapchain_loader.as_ref()
    }

    /// Query surface capabilities, formats and present modes
    pub fn surface_support(&self) -> VulkanResult<SurfaceSupport> {
        let surface = self.surface.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no surface".to_string(),
        })?;
        SurfaceSupport::query(&surface.loader, self.physical_device.device, surface.handle)
    }

    /// Memory manager view over this context
    pub const fn memory(&self) -> MemoryManager<'_> {
        MemoryManager::new(self)
    }

    /// Allocate primary command buffers from the shared pool
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device.device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::creation("command buffer"))
        }
    }

    /// Return command buffers to the shared pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.device.device.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device.device.device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }

    /// Number of buffer and image allocations not yet destroyed
    pub fn allocation_count(&self) -> usize {
        self.live_allocations.get()
    }

    pub(crate) fn track_allocation(&self) {
        self.live_allocations.set(self.live_allocations.get() + 1);
    }

    pub(crate) fn track_release(&self) {
        self.live_allocations.set(self.live_allocations.get().saturating_sub(1));
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        let leaked = self.live_allocations.get();
        if leaked > 0 {
            log::warn!("Destroying device context with {} live allocations", leaked);
        }

        unsafe {
            let _ = self.device.device.device_wait_idle();
            // Frees every command buffer still allocated from it
            self.device.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
