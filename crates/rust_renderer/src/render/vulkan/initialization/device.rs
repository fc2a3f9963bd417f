//! Physical device selection and logical device creation
//!
//! A physical device is suitable when all three hold:
//! - its queue families provide graphics and presentation to the surface
//! - it exposes every required device extension
//! - the surface reports at least one format and one present mode
//!
//! Devices are tried in enumeration order and the first suitable one wins.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};

use crate::render::vulkan::initialization::instance::{missing_names, to_cstring};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Graphics and presentation queue families
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics capability
    pub graphics: Option<u32>,
    /// First family that can present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan the families once in order
    ///
    /// `present_support` answers whether the family at an index can present;
    /// it is only consulted until a presentation family has been found.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut present_support: impl FnMut(u32) -> VulkanResult<bool>,
    ) -> VulkanResult<Self> {
        let mut indices = Self::default();

        for (index, family) in (0u32..).zip(families) {
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }

            if indices.present.is_none() && present_support(index)? {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    /// Both families resolved
    pub const fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Resolved `(graphics, present)` pair
    pub const fn resolved(&self) -> Option<(u32, u32)> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Some((graphics, present)),
            _ => None,
        }
    }
}

/// Surface capabilities, formats and present modes for one physical device
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count and extent limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats in driver order
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes in driver order
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the surface properties of `device`
    pub fn query(loader: &Surface, device: vk::PhysicalDevice, surface: vk::SurfaceKHR) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(device, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Surface handle with the loader that destroys it
pub struct PresentationSurface {
    /// Surface extension loader
    pub loader: Surface,
    /// Surface handle
    pub handle: vk::SurfaceKHR,
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types, cached for memory-type selection
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first suitable physical device
    ///
    /// Without a surface only a graphics family is required and it doubles as
    /// the presentation family.
    pub fn select_suitable_device(
        instance: &Instance,
        surface: Option<&PresentationSurface>,
        required_extensions: &[String],
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance.enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            if let Some(info) = Self::evaluate_device(instance, device, surface, required_extensions)? {
                log::info!("Selected GPU: {}", info.name());
                return Ok(info);
            }
        }

        Err(VulkanError::NoSuitableDevice)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<&PresentationSurface>,
        required_extensions: &[String],
    ) -> VulkanResult<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy().into_owned();
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let indices = match surface {
            Some(surface) => QueueFamilyIndices::find(&queue_families, |index| unsafe {
                surface
                    .loader
                    .get_physical_device_surface_support(device, index, surface.handle)
                    .map_err(VulkanError::Api)
            })?,
            None => QueueFamilyIndices::find(&queue_families, |_| Ok(true)).map(|found| QueueFamilyIndices {
                present: found.graphics,
                ..found
            })?,
        };

        let Some((graphics_family, present_family)) = indices.resolved() else {
            log::debug!("Skipping {}: incomplete queue families {:?}", name, indices);
            return Ok(None);
        };

        let available = unsafe {
            instance.enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        }
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_string_lossy().into_owned())
        .collect::<Vec<_>>();

        let missing = missing_names(&available, required_extensions);
        if !missing.is_empty() {
            log::debug!("Skipping {}: missing extensions {:?}", name, missing);
            return Ok(None);
        }

        if let Some(surface) = surface {
            let support = SurfaceSupport::query(&surface.loader, device, surface.handle)?;
            if !support.is_adequate() {
                log::debug!("Skipping {}: no surface formats or present modes", name);
                return Ok(None);
            }
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Some(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        }))
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader, absent for headless devices
    pub swapchain_loader: Option<SwapchainLoader>,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per distinct family
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        extensions: &[String],
        layers: &[CString],
    ) -> VulkanResult<Self> {
        let unique_families: BTreeSet<u32> = [
            physical_device_info.graphics_family,
            physical_device_info.present_family,
        ]
        .into_iter()
        .collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names = extensions
            .iter()
            .map(|ext| to_cstring(ext))
            .collect::<VulkanResult<Vec<_>>>()?;
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();
        // Device layers are ignored by current loaders but required by old ones
        let layer_ptrs: Vec<*const c_char> = layers.iter().map(|layer| layer.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&device_features);

        let device = unsafe {
            instance.create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.present_family, 0) };

        let swapchain_loader = extension_names
            .iter()
            .any(|name| name.as_c_str() == SwapchainLoader::name())
            .then(|| SwapchainLoader::new(instance, &device));

        log::debug!(
            "Created logical device (graphics family {}, present family {})",
            physical_device_info.graphics_family,
            physical_device_info.present_family
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_family_for_graphics_and_present() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.resolved(), Some((0, 0)));
    }

    #[test]
    fn test_first_match_wins_for_each_role() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |index| Ok(index >= 2)).unwrap();
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn test_scan_stops_once_complete() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
        let mut queried = Vec::new();
        let indices = QueueFamilyIndices::find(&families, |index| {
            queried.push(index);
            Ok(true)
        })
        .unwrap();

        assert!(indices.is_complete());
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn test_missing_present_family_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();
        assert_eq!(indices.graphics, Some(0));
        assert!(indices.resolved().is_none());
    }

    #[test]
    fn test_present_query_error_propagates() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
    }

    #[test]
    fn test_surface_support_adequacy() {
        let mut support = SurfaceSupport::default();
        assert!(!support.is_adequate());

        support.formats.push(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        });
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
    }
}
