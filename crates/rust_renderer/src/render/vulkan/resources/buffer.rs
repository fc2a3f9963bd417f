//! Vertex, index and uniform buffers
//!
//! Vertex and index data are uploaded once into device-local memory. Uniform
//! buffers stay host-visible and are rewritten every frame; keep one per frame
//! slot so the CPU never writes a buffer the GPU is still reading.
//!
//! None of these release themselves. Call `destroy` with the memory manager
//! that created them before the device context goes away.

use ash::vk;
use bytemuck::Pod;
use std::marker::PhantomData;

use crate::render::vulkan::resources::memory::{BufferAllocation, MemoryManager};
use crate::render::vulkan::resources::uploader::{ResourceUploader, STAGING_PROPERTIES};
use crate::render::vulkan::VulkanResult;

/// Device-local vertex buffer
pub struct VertexBuffer<T> {
    allocation: BufferAllocation,
    vertex_count: u32,
    _vertex: PhantomData<T>,
}

impl<T: Pod> VertexBuffer<T> {
    /// Upload `vertices` through a staging buffer
    pub fn new(uploader: &ResourceUploader<'_>, vertices: &[T]) -> VulkanResult<Self> {
        let allocation = uploader.upload_buffer(bytemuck::cast_slice(vertices), vk::BufferUsageFlags::VERTEX_BUFFER)?;

        Ok(Self {
            allocation,
            vertex_count: vertices.len() as u32,
            _vertex: PhantomData,
        })
    }
}

impl<T> VertexBuffer<T> {
    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.allocation.buffer
    }

    /// Number of vertices
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Release the buffer and its memory
    pub fn destroy(self, memory: &MemoryManager<'_>) {
        memory.destroy_buffer(self.allocation);
    }
}

/// Device-local `u32` index buffer
pub struct IndexBuffer {
    allocation: BufferAllocation,
    index_count: u32,
}

impl IndexBuffer {
    /// Upload `indices` through a staging buffer
    pub fn new(uploader: &ResourceUploader<'_>, indices: &[u32]) -> VulkanResult<Self> {
        let allocation = uploader.upload_buffer(bytemuck::cast_slice(indices), vk::BufferUsageFlags::INDEX_BUFFER)?;

        Ok(Self {
            allocation,
            index_count: indices.len() as u32,
        })
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.allocation.buffer
    }

    /// Get index count
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Index type for `cmd_bind_index_buffer`
    pub const fn index_type(&self) -> vk::IndexType {
        vk::IndexType::UINT32
    }

    /// Release the buffer and its memory
    pub fn destroy(self, memory: &MemoryManager<'_>) {
        memory.destroy_buffer(self.allocation);
    }
}

/// Host-visible uniform buffer holding one `T`
pub struct UniformBuffer<T> {
    allocation: BufferAllocation,
    _data: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create an uninitialized uniform buffer
    pub fn new(memory: &MemoryManager<'_>) -> VulkanResult<Self> {
        let allocation = memory.create_buffer(
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            STAGING_PROPERTIES,
        )?;

        Ok(Self {
            allocation,
            _data: PhantomData,
        })
    }

    /// One buffer per frame slot
    pub fn per_frame(memory: &MemoryManager<'_>, frames_in_flight: usize) -> VulkanResult<Vec<Self>> {
        let mut buffers = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match Self::new(memory) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    buffers.into_iter().for_each(|buffer: Self| buffer.destroy(memory));
                    return Err(e);
                }
            }
        }
        Ok(buffers)
    }

    /// Update uniform data
    pub fn update(&self, memory: &MemoryManager<'_>, data: &T) -> VulkanResult<()> {
        memory.write_buffer(&self.allocation, bytemuck::bytes_of(data))
    }

    /// Descriptor info covering the whole buffer
    pub const fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.allocation.buffer,
            offset: 0,
            range: std::mem::size_of::<T>() as vk::DeviceSize,
        }
    }
}

impl<T> UniformBuffer<T> {
    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.allocation.buffer
    }

    /// Release the buffer and its memory
    pub fn destroy(self, memory: &MemoryManager<'_>) {
        memory.destroy_buffer(self.allocation);
    }
}
