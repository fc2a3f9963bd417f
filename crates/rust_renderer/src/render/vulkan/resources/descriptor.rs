//! Descriptor set layouts, pools and writes
//!
//! The standard layout binds a uniform buffer at binding 0 for the vertex
//! stage and a combined image sampler at binding 1 for the fragment stage.
//! Pools are sized from a layout's bindings times the number of sets, which
//! is one set per frame slot.

use ash::{vk, Device};

use crate::render::vulkan::resources::buffer::UniformBuffer;
use crate::render::vulkan::resources::texture::Texture;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Kind of resource bound at a descriptor binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// `UNIFORM_BUFFER`
    UniformBuffer,
    /// `COMBINED_IMAGE_SAMPLER`
    CombinedImageSampler,
}

impl DescriptorKind {
    const fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    /// Binding number in the shader
    pub binding: u32,
    /// Resource kind
    pub kind: DescriptorKind,
    /// Shader stages that read it
    pub stages: vk::ShaderStageFlags,
}

/// Descriptor set layout builder for creating reusable layouts
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub const fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    /// Uniform buffer at 0 (vertex), combined image sampler at 1 (fragment)
    pub fn uniform_and_sampler() -> Self {
        Self::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(DescriptorBinding {
            binding,
            kind: DescriptorKind::UniformBuffer,
            stages,
        });
        self
    }

    /// Add a combined image sampler binding
    #[must_use]
    pub fn add_combined_image_sampler(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(DescriptorBinding {
            binding,
            kind: DescriptorKind::CombinedImageSampler,
            stages,
        });
        self
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(&self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(binding.kind.descriptor_type())
                    .descriptor_count(1)
                    .stage_flags(binding.stages)
                    .build()
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::creation("descriptor set layout"))?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings.clone(),
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool sizes for `max_sets` sets of a layout with `bindings`
pub fn pool_sizes(bindings: &[DescriptorBinding], max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let ty = binding.kind.descriptor_type();
        match sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.descriptor_count += max_sets,
            None => sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: max_sets,
            }),
        }
    }
    sizes
}

/// Descriptor pool with automatic cleanup
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool holding `max_sets` sets of `layout`
    pub fn new(device: Device, layout: &DescriptorSetLayout, max_sets: u32) -> VulkanResult<Self> {
        let sizes = pool_sizes(layout.bindings(), max_sets);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&sizes)
            .max_sets(max_sets);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::creation("descriptor pool"))?;

        log::debug!("Created descriptor pool for {} sets ({:?})", max_sets, sizes);
        Ok(Self { device, pool })
    }

    /// Allocate `count` sets of `layout`
    pub fn allocate(&self, layout: &DescriptorSetLayout, count: usize) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe {
            self.device.allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::creation("descriptor sets"))
        }
    }

    /// Point a set at a uniform buffer (binding 0) and a texture (binding 1)
    pub fn write_uniform_and_texture<T: bytemuck::Pod>(
        &self,
        set: vk::DescriptorSet,
        uniform: &UniformBuffer<T>,
        texture: &Texture,
    ) {
        let buffer_info = [uniform.descriptor_info()];
        let image_info = [texture.descriptor_info()];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info)
                .build(),
        ];

        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }
    }

    /// Get the pool handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            // Frees every set allocated from it
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_layout_bindings() {
        let builder = DescriptorSetLayoutBuilder::uniform_and_sampler();
        assert_eq!(
            builder.bindings(),
            [
                DescriptorBinding {
                    binding: 0,
                    kind: DescriptorKind::UniformBuffer,
                    stages: vk::ShaderStageFlags::VERTEX,
                },
                DescriptorBinding {
                    binding: 1,
                    kind: DescriptorKind::CombinedImageSampler,
                    stages: vk::ShaderStageFlags::FRAGMENT,
                },
            ]
        );
    }

    #[test]
    fn test_pool_sizes_scale_with_sets() {
        let sizes = pool_sizes(DescriptorSetLayoutBuilder::uniform_and_sampler().bindings(), 3);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }

    #[test]
    fn test_pool_sizes_merge_repeated_kinds() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .add_uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT);
        let sizes = pool_sizes(builder.bindings(), 2);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].descriptor_count, 4);
    }

    #[test]
    fn test_empty_layout_needs_no_pool_sizes() {
        assert!(pool_sizes(&[], 2).is_empty());
    }
}
