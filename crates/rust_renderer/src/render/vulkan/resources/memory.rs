//! Memory manager
//!
//! Buffers and images are created together with their device memory and
//! bound at offset 0. The resulting [`BufferAllocation`] / [`ImageAllocation`]
//! are plain records owned by whichever resource asked for them; releasing
//! one goes through [`MemoryManager::destroy_buffer`] or
//! [`MemoryManager::destroy_image`], which consume it.
//!
//! Copies and layout transitions run through the one-time command protocol in
//! [`super::one_time`] and are fully synchronous.

use ash::vk;

use crate::render::vulkan::resources::one_time::OneTimeCommands;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Buffer handle with its bound memory
#[derive(Debug)]
#[must_use = "allocations must be released with MemoryManager::destroy_buffer"]
pub struct BufferAllocation {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Bound device memory
    pub memory: vk::DeviceMemory,
    /// Requested size in bytes
    pub size: vk::DeviceSize,
    /// Usage the buffer was created with
    pub usage: vk::BufferUsageFlags,
    /// Property flags of the chosen memory type request
    pub properties: vk::MemoryPropertyFlags,
}

/// Image handle with its bound memory
#[derive(Debug)]
#[must_use = "allocations must be released with MemoryManager::destroy_image"]
pub struct ImageAllocation {
    /// Image handle
    pub image: vk::Image,
    /// Bound device memory
    pub memory: vk::DeviceMemory,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Size of the bound memory in bytes
    pub size: vk::DeviceSize,
    /// Usage the image was created with
    pub usage: vk::ImageUsageFlags,
    /// Property flags of the chosen memory type request
    pub properties: vk::MemoryPropertyFlags,
}

/// Access masks and pipeline stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Access to make available
    pub src_access: vk::AccessFlags,
    /// Access to make visible
    pub dst_access: vk::AccessFlags,
    /// Stage that must finish first
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the supported layout transitions
///
/// Only `UNDEFINED -> TRANSFER_DST_OPTIMAL` and
/// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL` are supported.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        _ => Err(VulkanError::UnsupportedTransition { old, new }),
    }
}

/// Lowest memory type index allowed by `type_filter` whose flags contain
/// `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize].property_flags.contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType { type_filter, properties })
}

fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Bytes per texel of the uncompressed single-plane formats images are
/// uploaded in
pub fn texel_size(format: vk::Format) -> Option<vk::DeviceSize> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB | vk::Format::R8_UINT => 1,
        vk::Format::R8G8_UNORM
        | vk::Format::R8G8_SRGB
        | vk::Format::R16_UNORM
        | vk::Format::R16_SFLOAT
        | vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::R32_SFLOAT
        | vk::Format::D32_SFLOAT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => return None,
    };
    Some(size)
}

/// Size of a tightly packed `width` x `height` image in `format`
pub fn image_byte_size(width: u32, height: u32, format: vk::Format) -> VulkanResult<vk::DeviceSize> {
    let texel = texel_size(format).ok_or_else(|| VulkanError::InvalidOperation {
        reason: format!("no staged copy support for {:?}", format),
    })?;
    Ok(vk::DeviceSize::from(width) * vk::DeviceSize::from(height) * texel)
}

/// Buffer and image allocation over a borrowed [`DeviceContext`]
#[derive(Clone, Copy)]
pub struct MemoryManager<'a> {
    context: &'a DeviceContext,
}

impl<'a> MemoryManager<'a> {
    /// Create a manager view over `context`
    pub const fn new(context: &'a DeviceContext) -> Self {
        Self { context }
    }

    /// The context this manager allocates from
    pub const fn context(&self) -> &'a DeviceContext {
        self.context
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let memory_type_index = find_memory_type(
            self.context.memory_properties(),
            requirements.memory_type_bits,
            properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe {
            self.context.device().allocate_memory(&alloc_info, None)
                .map_err(VulkanError::creation("device memory"))
        }
    }

    /// Create a buffer with freshly allocated memory bound at offset 0
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<BufferAllocation> {
        let device = self.context.device();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)
                .map_err(VulkanError::creation("buffer"))?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match self.allocate(requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(result) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(result));
        }

        self.context.track_allocation();
        log::trace!("Created {} byte buffer {:?} ({:?})", size, buffer, usage);

        Ok(BufferAllocation {
            buffer,
            memory,
            size,
            usage,
            properties,
        })
    }

    /// Create a single-mip 2D image with memory bound at offset 0
    pub fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<ImageAllocation> {
        let device = self.context.device();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device.create_image(&image_info, None)
                .map_err(VulkanError::creation("image"))?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory = match self.allocate(requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(result) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(result));
        }

        self.context.track_allocation();
        log::trace!("Created {}x{} {:?} image {:?}", extent.width, extent.height, format, image);

        Ok(ImageAllocation {
            image,
            memory,
            extent,
            format,
            size: requirements.size,
            usage,
            properties,
        })
    }

    /// Destroy a buffer and free its memory
    pub fn destroy_buffer(&self, allocation: BufferAllocation) {
        unsafe {
            self.context.device().destroy_buffer(allocation.buffer, None);
            self.context.device().free_memory(allocation.memory, None);
        }
        self.context.track_release();
    }

    /// Destroy an image and free its memory
    pub fn destroy_image(&self, allocation: ImageAllocation) {
        unsafe {
            self.context.device().destroy_image(allocation.image, None);
            self.context.device().free_memory(allocation.memory, None);
        }
        self.context.track_release();
    }

    /// Copy `bytes` into a host-visible allocation at offset 0
    pub fn write_buffer(&self, allocation: &BufferAllocation, bytes: &[u8]) -> VulkanResult<()> {
        let len = bytes.len() as vk::DeviceSize;
        if len > allocation.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes into {} byte buffer", len, allocation.size),
            });
        }
        if !allocation.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer memory is not host visible".to_string(),
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self.context.device()
                .map_memory(allocation.memory, 0, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.context.device().unmap_memory(allocation.memory);
        }

        Ok(())
    }

    /// Read the first `len` bytes of a host-visible allocation
    pub fn read_buffer(&self, allocation: &BufferAllocation, len: usize) -> VulkanResult<Vec<u8>> {
        if len as vk::DeviceSize > allocation.size
            || !allocation.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            return Err(VulkanError::InvalidOperation {
                reason: format!("cannot read {} bytes back from buffer {:?}", len, allocation.buffer),
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut bytes = vec![0u8; len];
        unsafe {
            let ptr = self.context.device()
                .map_memory(allocation.memory, 0, len as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), len);
            self.context.device().unmap_memory(allocation.memory);
        }

        Ok(bytes)
    }

    /// Copy `size` bytes from `src` to `dst` and wait for completion
    pub fn copy_buffer(
        &self,
        dst: &BufferAllocation,
        src: &BufferAllocation,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        if size > src.size || size > dst.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("copy of {} bytes exceeds buffer bounds ({} -> {})", size, src.size, dst.size),
            });
        }

        OneTimeCommands::run(self.context, |device, command_buffer| {
            let region = vk::BufferCopy::builder().src_offset(0).dst_offset(0).size(size);
            unsafe {
                device.cmd_copy_buffer(command_buffer, src.buffer, dst.buffer, &[region.build()]);
            }
            Ok(())
        })
    }

    /// Copy tightly packed texels from `src` into `dst`, which must be in
    /// `TRANSFER_DST_OPTIMAL`
    pub fn copy_buffer_to_image(
        &self,
        dst: &ImageAllocation,
        src: &BufferAllocation,
        width: u32,
        height: u32,
    ) -> VulkanResult<()> {
        if width > dst.extent.width || height > dst.extent.height {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "copy of {}x{} texels exceeds image extent {}x{}",
                    width, height, dst.extent.width, dst.extent.height
                ),
            });
        }
        let required = image_byte_size(width, height, dst.format)?;
        if required > src.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("copy of {}x{} texels needs {} bytes, buffer holds {}", width, height, required, src.size),
            });
        }

        OneTimeCommands::run(self.context, |device, command_buffer| {
            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: aspect_mask(dst.format),
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 });

            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    src.buffer,
                    dst.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region.build()],
                );
            }
            Ok(())
        })
    }

    /// Move `image` between layouts with a single pipeline barrier
    ///
    /// Unsupported pairs fail before any command buffer is allocated.
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = transition_masks(old_layout, new_layout)?;

        OneTimeCommands::run(self.context, |device, command_buffer| {
            let barrier = vk::ImageMemoryBarrier::builder()
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_mask(format),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .src_access_mask(masks.src_access)
                .dst_access_mask(masks.dst_access);

            unsafe {
                device.cmd_pipeline_barrier(
                    command_buffer,
                    masks.src_stage,
                    masks.dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier.build()],
                );
            }
            Ok(())
        })
    }
}
