//! Sampled 2D textures
//!
//! Pixels are decoded to RGBA8, uploaded with the staged image protocol and
//! exposed as an sRGB image view plus a linear, repeating sampler.

use ash::vk;
use std::path::Path;

use crate::foundation::files;
use crate::render::vulkan::resources::memory::{ImageAllocation, MemoryManager};
use crate::render::vulkan::resources::uploader::ResourceUploader;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Texel format of every texture created here
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Image, view and sampler for one texture
pub struct Texture {
    image: ImageAllocation,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    /// Load and decode an image file, then upload it
    pub fn from_file(uploader: &ResourceUploader<'_>, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let bytes = files::read(path.as_ref())?;
        let rgba = image::load_from_memory(&bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("Decoded texture {} ({}x{})", path.as_ref().display(), width, height);
        Self::from_rgba8(uploader, rgba.as_raw(), width, height)
    }

    /// Upload tightly packed RGBA8 pixels
    pub fn from_rgba8(uploader: &ResourceUploader<'_>, pixels: &[u8], width: u32, height: u32) -> VulkanResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{}x{} texture needs {} bytes, got {}", width, height, expected, pixels.len()),
            });
        }

        let memory = uploader.memory();
        let image = uploader.upload_image(pixels, vk::Extent2D { width, height }, TEXTURE_FORMAT)?;

        let view = match create_view(&memory, image.image) {
            Ok(view) => view,
            Err(e) => {
                memory.destroy_image(image);
                return Err(e);
            }
        };

        let sampler = match create_sampler(&memory) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { memory.context().device().destroy_image_view(view, None) };
                memory.destroy_image(image);
                return Err(e);
            }
        };

        Ok(Self { image, view, sampler })
    }

    /// Get the image view for descriptor set binding
    pub const fn image_view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the sampler for descriptor set binding
    pub const fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Texture size in texels
    pub const fn extent(&self) -> vk::Extent2D {
        self.image.extent
    }

    /// Descriptor info for a combined image sampler binding
    pub const fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Release the sampler, view, image and memory
    pub fn destroy(self, memory: &MemoryManager<'_>) {
        unsafe {
            let device = memory.context().device();
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
        }
        memory.destroy_image(self.image);
    }
}

fn create_view(memory: &MemoryManager<'_>, image: vk::Image) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        memory.context().device().create_image_view(&create_info, None)
            .map_err(VulkanError::creation("texture image view"))
    }
}

fn create_sampler(memory: &MemoryManager<'_>) -> VulkanResult<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe {
        memory.context().device().create_sampler(&create_info, None)
            .map_err(VulkanError::creation("texture sampler"))
    }
}
