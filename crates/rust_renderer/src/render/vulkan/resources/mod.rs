//! GPU resources: memory allocation, staged uploads, buffers, textures and
//! descriptors

pub mod buffer;
pub mod descriptor;
pub mod memory;
pub mod one_time;
pub mod texture;
pub mod uploader;

pub use buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
pub use descriptor::{DescriptorBinding, DescriptorKind, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use memory::{
    BufferAllocation, ImageAllocation, MemoryManager, TransitionMasks, find_memory_type, image_byte_size, texel_size,
    transition_masks,
};
pub use one_time::OneTimeCommands;
pub use texture::Texture;
pub use uploader::ResourceUploader;
