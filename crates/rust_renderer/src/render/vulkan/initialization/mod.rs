//! Vulkan initialization: window, instance, device selection and the device
//! context that owns them

pub mod context;
pub mod device;
pub mod instance;
pub mod window;

pub use context::DeviceContext;
pub use device::{LogicalDevice, PhysicalDeviceInfo, PresentationSurface, QueueFamilyIndices, SurfaceSupport};
pub use instance::VulkanInstance;
pub use window::{SurfaceProvider, Window, WindowError, WindowResult};
