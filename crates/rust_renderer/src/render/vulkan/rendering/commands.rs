//! Per-frame command recording
//!
//! [`CommandRecorder`] wraps a frame slot's primary command buffer between
//! begin and end. [`ActiveRenderPass`] ends the render pass when dropped, so
//! draw commands cannot be recorded outside of one.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Viewport covering the whole extent with depth range 0..1
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole extent
pub const fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Records into a command buffer that has been reset
pub struct CommandRecorder<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    /// Begin recording
    pub fn begin(device: &'a Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self { device, command_buffer })
    }

    /// Begin a render pass clearing the color attachment to `clear_color`
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> ActiveRenderPass<'_, 'a> {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        ActiveRenderPass { recorder: self }
    }

    /// End command recording
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        Ok(self.command_buffer)
    }
}

/// Render pass in progress; ended on drop
pub struct ActiveRenderPass<'r, 'a> {
    recorder: &'r mut CommandRecorder<'a>,
}

impl ActiveRenderPass<'_, '_> {
    fn device(&self) -> &Device {
        self.recorder.device
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer
    }

    /// Set viewport and scissor to cover `extent`
    pub fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        unsafe {
            self.device().cmd_set_viewport(self.command_buffer(), 0, &[full_viewport(extent)]);
            self.device().cmd_set_scissor(self.command_buffer(), 0, &[full_scissor(extent)]);
        }
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device().cmd_bind_pipeline(self.command_buffer(), vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind a vertex buffer at binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device().cmd_bind_vertex_buffers(self.command_buffer(), 0, &[buffer], &[0]);
        }
    }

    /// Bind a `u32` index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device().cmd_bind_index_buffer(self.command_buffer(), buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Bind a descriptor set at set 0
    pub fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    /// Draw non-indexed
    pub fn draw(&mut self, vertex_count: u32) {
        unsafe {
            self.device().cmd_draw(self.command_buffer(), vertex_count, 1, 0, 0);
        }
    }

    /// Draw indexed
    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device().cmd_draw_indexed(self.command_buffer(), index_count, 1, 0, 0, 0);
        }
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}
