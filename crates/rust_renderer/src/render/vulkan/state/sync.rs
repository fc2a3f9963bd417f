//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Semaphores order GPU work (image acquired before color output, rendering
//! finished before present). Fences let the CPU observe that a frame slot's
//! submission has completed before its command buffer is reused.

use ash::{vk, Device};

use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device.create_semaphore(&create_info, None)
                .map_err(VulkanError::creation("semaphore"))?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device.create_fence(&create_info, None)
                .map_err(VulkanError::creation("fence"))?
        };

        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device.wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device.reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Whether the fence is currently signaled
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe {
            self.device.get_fence_status(self.fence)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects and command buffer for one frame in flight
///
/// The fence starts signaled so the first wait on a fresh slot returns
/// immediately. The command buffer belongs to the context's pool and is freed
/// with it.
pub struct FrameSlot {
    /// Signaled when the acquired swapchain image is ready
    pub image_available: Semaphore,
    /// Signaled when this slot's rendering has finished
    pub render_finished: Semaphore,
    /// Signaled when this slot's submission completes
    pub in_flight: Fence,
    /// Re-recorded every time the slot is used
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Create `count` slots with command buffers from the shared pool
    pub fn create_all(context: &DeviceContext, count: usize) -> VulkanResult<Vec<Self>> {
        let command_buffers = context.allocate_command_buffers(count as u32)?;

        let slots = command_buffers
            .iter()
            .map(|&command_buffer| {
                Ok(Self {
                    image_available: Semaphore::new(context.raw_device())?,
                    render_finished: Semaphore::new(context.raw_device())?,
                    in_flight: Fence::new(context.raw_device(), true)?,
                    command_buffer,
                })
            })
            .collect::<VulkanResult<Vec<_>>>();

        match &slots {
            Ok(_) => log::debug!("Created {} frame slots", count),
            Err(e) => {
                log::error!("Failed to create frame slots: {}", e);
                context.free_command_buffers(&command_buffers);
            }
        }
        slots
    }
}
