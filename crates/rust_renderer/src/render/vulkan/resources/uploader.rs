//! Staged host-to-device uploads
//!
//! Every upload stages the payload in a host-visible, host-coherent buffer,
//! creates the device-local destination, copies, and destroys the staging
//! buffer whether or not the copy succeeded. Images are moved to
//! `TRANSFER_DST_OPTIMAL` before the copy and to `SHADER_READ_ONLY_OPTIMAL`
//! after it.

use ash::vk;

use crate::render::vulkan::resources::memory::{image_byte_size, BufferAllocation, ImageAllocation, MemoryManager};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Memory properties of staging buffers
pub const STAGING_PROPERTIES: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// One in-progress staged transfer; lives only inside an upload call
struct TransferRequest<'m, 'a> {
    memory: &'m MemoryManager<'a>,
    staging: Option<BufferAllocation>,
    size: vk::DeviceSize,
}

impl<'m, 'a> TransferRequest<'m, 'a> {
    fn stage(memory: &'m MemoryManager<'a>, bytes: &[u8]) -> VulkanResult<Self> {
        if bytes.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot upload an empty payload".to_string(),
            });
        }

        let size = bytes.len() as vk::DeviceSize;
        let staging = memory.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, STAGING_PROPERTIES)?;
        let request = Self {
            memory,
            staging: Some(staging),
            size,
        };

        memory.write_buffer(request.staging()?, bytes)?;
        Ok(request)
    }

    fn staging(&self) -> VulkanResult<&BufferAllocation> {
        self.staging.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "staging buffer already released".to_string(),
        })
    }
}

impl Drop for TransferRequest<'_, '_> {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take() {
            self.memory.destroy_buffer(staging);
        }
    }
}

/// Builder of device-local buffers and images from host bytes
#[derive(Clone, Copy)]
pub struct ResourceUploader<'a> {
    memory: MemoryManager<'a>,
}

impl<'a> ResourceUploader<'a> {
    /// Create an uploader over `memory`
    pub const fn new(memory: MemoryManager<'a>) -> Self {
        Self { memory }
    }

    /// The memory manager uploads go through
    pub const fn memory(&self) -> MemoryManager<'a> {
        self.memory
    }

    /// Upload `bytes` into a new device-local buffer
    ///
    /// `TRANSFER_DST` is added to `usage`.
    pub fn upload_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<BufferAllocation> {
        let request = TransferRequest::stage(&self.memory, bytes)?;

        let destination = self.memory.create_buffer(
            request.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        if let Err(e) = self.memory.copy_buffer(&destination, request.staging()?, request.size) {
            self.memory.destroy_buffer(destination);
            return Err(e);
        }

        log::debug!("Uploaded {} bytes to device-local buffer {:?}", request.size, destination.buffer);
        Ok(destination)
    }

    /// Upload tightly packed texels into a new sampled image
    ///
    /// `pixels` must hold exactly `width * height` texels of `format`. The
    /// returned image is in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image(
        &self,
        pixels: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> VulkanResult<ImageAllocation> {
        let expected = image_byte_size(extent.width, extent.height, format)?;
        if pixels.len() as vk::DeviceSize != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{}x{} {:?} image needs {} bytes, got {}",
                    extent.width,
                    extent.height,
                    format,
                    expected,
                    pixels.len()
                ),
            });
        }

        let request = TransferRequest::stage(&self.memory, pixels)?;

        let destination = self.memory.create_image(
            extent,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let copied = self
            .memory
            .transition_image_layout(
                destination.image,
                format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .and_then(|()| {
                self.memory
                    .copy_buffer_to_image(&destination, request.staging()?, extent.width, extent.height)
            })
            .and_then(|()| {
                self.memory.transition_image_layout(
                    destination.image,
                    format,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            });

        if let Err(e) = copied {
            self.memory.destroy_image(destination);
            return Err(e);
        }

        log::debug!(
            "Uploaded {}x{} {:?} image {:?}",
            extent.width,
            extent.height,
            format,
            destination.image
        );
        Ok(destination)
    }
}
