//! Vulkan backend
//!
//! Leaf-first: `initialization` builds the [`DeviceContext`], `resources`
//! allocates and uploads through the [`MemoryManager`], `state` owns the
//! swapchain and frame slots, and `rendering` holds the pass, pipeline and
//! command recording used each frame.

pub mod error;
pub mod initialization;
pub mod rendering;
pub mod resources;
pub mod state;

pub use error::{ErrorKind, VulkanError, VulkanResult};
pub use initialization::{DeviceContext, SurfaceProvider, Window, WindowError};
pub use resources::{MemoryManager, ResourceUploader};
pub use state::{AcquireStatus, FrameStatus, PresentStatus};
