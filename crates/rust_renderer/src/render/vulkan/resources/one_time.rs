//! One-time command protocol
//!
//! Allocate one primary command buffer from the shared pool, begin it with
//! `ONE_TIME_SUBMIT`, record, end, submit to the graphics queue, wait for the
//! queue to go idle, free the buffer. [`OneTimeCommands`] frees its command
//! buffer on drop, so every exit path releases it.

use ash::{vk, Device};

use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Scoped transient command buffer
pub struct OneTimeCommands<'a> {
    context: &'a DeviceContext,
    command_buffer: vk::CommandBuffer,
}

impl<'a> OneTimeCommands<'a> {
    /// Allocate and begin a transient command buffer
    pub fn begin(context: &'a DeviceContext) -> VulkanResult<Self> {
        let command_buffer = context
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "command buffer allocation returned nothing".to_string(),
            })?;

        let commands = Self { context, command_buffer };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            context.device().begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(commands)
    }

    /// Record, submit and wait in one call
    pub fn run<F>(context: &'a DeviceContext, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer) -> VulkanResult<()>,
    {
        let commands = Self::begin(context)?;
        record(context.device(), commands.command_buffer)?;
        commands.submit_and_wait()
    }

    /// Command buffer being recorded
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End recording, submit to the graphics queue and block until idle
    pub fn submit_and_wait(self) -> VulkanResult<()> {
        let device = self.context.device();
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;

            device
                .queue_submit(self.context.graphics_queue(), &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;

            device.queue_wait_idle(self.context.graphics_queue())
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for OneTimeCommands<'_> {
    fn drop(&mut self) {
        self.context.free_command_buffers(&[self.command_buffer]);
    }
}
