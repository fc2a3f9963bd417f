//! Renderer
//!
//! Composes the device context, swapchain, frame slots and pipeline into the
//! per-frame loop. Collaborators hand in their buffers and descriptor sets as
//! [`DrawCommand`]s and update per-slot data in the `prepare` callback, which
//! runs after the slot's fence has been observed.

use ash::vk;

use crate::core::config::RendererConfig;
use crate::render::vulkan::initialization::window::SurfaceProvider;
use crate::render::vulkan::rendering::commands::CommandRecorder;
use crate::render::vulkan::rendering::pipeline::{GraphicsPipeline, PipelineDescription};
use crate::render::vulkan::rendering::render_pass::RenderPass;
use crate::render::vulkan::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::render::vulkan::resources::descriptor::{DescriptorPool, DescriptorSetLayout};
use crate::render::vulkan::state::frame::{FrameBackend, FrameStatus, FrameSynchronizer};
use crate::render::vulkan::state::swapchain::{self, AcquireStatus, PresentStatus, SwapchainManager, SwapchainState};
use crate::render::vulkan::state::sync::FrameSlot;
use crate::render::vulkan::{DeviceContext, MemoryManager, ResourceUploader, VulkanError, VulkanResult, Window};

/// One draw call recorded every frame
#[derive(Debug, Clone)]
pub struct DrawCommand {
    /// Vertex buffer bound at binding 0
    pub vertex_buffer: vk::Buffer,
    /// Vertices drawn when there is no index buffer
    pub vertex_count: u32,
    /// Index buffer and index count
    pub index_buffer: Option<(vk::Buffer, u32)>,
    /// One descriptor set per frame slot; empty binds nothing
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

impl DrawCommand {
    /// Draw every vertex of `vertices`
    pub fn new<T>(vertices: &VertexBuffer<T>) -> Self {
        Self {
            vertex_buffer: vertices.handle(),
            vertex_count: vertices.vertex_count(),
            index_buffer: None,
            descriptor_sets: Vec::new(),
        }
    }

    /// Draw through `indices` instead
    #[must_use]
    pub fn with_indices(mut self, indices: &IndexBuffer) -> Self {
        self.index_buffer = Some((indices.handle(), indices.index_count()));
        self
    }

    /// Bind `sets[slot]` when recording slot `slot`
    #[must_use]
    pub fn with_descriptor_sets(mut self, sets: Vec<vk::DescriptorSet>) -> Self {
        self.descriptor_sets = sets;
        self
    }

    fn descriptor_set(&self, slot: usize) -> Option<vk::DescriptorSet> {
        if self.descriptor_sets.is_empty() {
            None
        } else {
            Some(self.descriptor_sets[slot % self.descriptor_sets.len()])
        }
    }
}

/// Passed to the `prepare` callback before a slot is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frame slot being recorded; index per-slot resources with it
    pub frame_index: usize,
    /// Swapchain image being rendered to
    pub image_index: u32,
    /// Current swapchain extent
    pub extent: vk::Extent2D,
    /// Swapchain generation, bumped on every recreation
    pub generation: u64,
}

/// Double/triple-buffered renderer
pub struct Renderer {
    // Fields drop top to bottom; the context must go last
    synchronizer: FrameSynchronizer,
    slots: Vec<FrameSlot>,
    pipeline: GraphicsPipeline,
    descriptor_set_layout: DescriptorSetLayout,
    swapchain: SwapchainManager,
    render_pass: RenderPass,
    pipeline_description: PipelineDescription,
    clear_color: [f32; 4],
    context: DeviceContext,
}

impl Renderer {
    /// Bring up the device, swapchain, pipeline and frame slots for `window`
    pub fn initialize(
        window: &mut Window,
        config: &RendererConfig,
        pipeline_description: PipelineDescription,
    ) -> VulkanResult<Self> {
        config.validate()?;
        log::info!("Initializing renderer for {}", config.application_name);

        let context = DeviceContext::new(window, config)?;
        let support = context.surface_support()?;
        let format = swapchain::choose_surface_format(&support.formats).ok_or(VulkanError::NoSuitableDevice)?;

        let render_pass = RenderPass::new(context.raw_device(), format.format)?;

        let mut swapchain = SwapchainManager::new(&context)?;
        let framebuffer_size = swapchain::wait_for_drawable_size(window);
        swapchain.create(&context, &support, framebuffer_size, &render_pass)?;

        let descriptor_set_layout = pipeline_description.descriptors.build(context.device())?;
        let pipeline = GraphicsPipeline::new(
            context.raw_device(),
            &render_pass,
            &pipeline_description,
            &descriptor_set_layout,
        )?;

        let frames_in_flight = config.frames_in_flight;
        let slots = FrameSlot::create_all(&context, frames_in_flight)?;
        let synchronizer = FrameSynchronizer::new(frames_in_flight)?;

        log::info!(
            "Renderer ready on {} with {} frames in flight",
            context.physical_device().name(),
            frames_in_flight
        );

        Ok(Self {
            synchronizer,
            slots,
            pipeline,
            descriptor_set_layout,
            swapchain,
            render_pass,
            pipeline_description,
            clear_color: config.clear_color,
            context,
        })
    }

    /// Run one frame: wait, acquire, record `draws`, submit, present
    ///
    /// `prepare` runs once the slot is free and before recording; update the
    /// slot's uniform buffers there through the memory manager it is given.
    /// If it fails, the frame is dropped and the error returned; the slot
    /// stays usable. Out-of-date and suboptimal swapchains are handled
    /// internally and reported as [`FrameStatus::Recreated`].
    pub fn draw_frame<W, F>(&mut self, window: &mut W, draws: &[DrawCommand], prepare: F) -> VulkanResult<FrameStatus>
    where
        W: SurfaceProvider + ?Sized,
        F: FnMut(&MemoryManager<'_>, &FrameInfo) -> VulkanResult<()>,
    {
        let mut backend = VulkanFrameBackend {
            context: &self.context,
            swapchain: &mut self.swapchain,
            render_pass: &mut self.render_pass,
            pipeline: &mut self.pipeline,
            descriptor_set_layout: &self.descriptor_set_layout,
            pipeline_description: &self.pipeline_description,
            slots: &self.slots,
            clear_color: self.clear_color,
            window,
            draws,
            prepare,
        };

        self.synchronizer.draw_frame(&mut backend)
    }

    /// Device context
    pub const fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Memory manager over this renderer's device
    pub const fn memory(&self) -> MemoryManager<'_> {
        self.context.memory()
    }

    /// Staged uploader over this renderer's device
    pub const fn uploader(&self) -> ResourceUploader<'_> {
        ResourceUploader::new(self.context.memory())
    }

    /// Layout of descriptor set 0
    pub const fn descriptor_set_layout(&self) -> &DescriptorSetLayout {
        &self.descriptor_set_layout
    }

    /// Pool sized for one set per frame slot
    pub fn create_descriptor_pool(&self) -> VulkanResult<DescriptorPool> {
        DescriptorPool::new(
            self.context.raw_device(),
            &self.descriptor_set_layout,
            self.frames_in_flight() as u32,
        )
    }

    /// Number of frame slots
    pub const fn frames_in_flight(&self) -> usize {
        self.synchronizer.frames_in_flight()
    }

    /// Current swapchain extent, `None` while it is being rebuilt
    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.state().map(|state| state.extent)
    }

    /// Swapchain generation
    pub const fn generation(&self) -> u64 {
        self.swapchain.generation()
    }

    /// Drain the device and release everything in dependency order
    ///
    /// Buffers, textures and descriptor pools created through this renderer
    /// must be destroyed first.
    pub fn cleanup(self) -> VulkanResult<()> {
        self.context.wait_idle()?;
        log::info!("Renderer shutting down");
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during renderer drop: {}", e);
        }
        self.context.free_command_buffers(
            &self.slots.iter().map(|slot| slot.command_buffer).collect::<Vec<_>>(),
        );
    }
}

/// Vulkan side of the frame protocol, borrowing the renderer for one frame
struct VulkanFrameBackend<'a, W: ?Sized, F> {
    context: &'a DeviceContext,
    swapchain: &'a mut SwapchainManager,
    render_pass: &'a mut RenderPass,
    pipeline: &'a mut GraphicsPipeline,
    descriptor_set_layout: &'a DescriptorSetLayout,
    pipeline_description: &'a PipelineDescription,
    slots: &'a [FrameSlot],
    clear_color: [f32; 4],
    window: &'a mut W,
    draws: &'a [DrawCommand],
    prepare: F,
}

impl<W, F> FrameBackend for VulkanFrameBackend<'_, W, F>
where
    W: SurfaceProvider + ?Sized,
    F: FnMut(&MemoryManager<'_>, &FrameInfo) -> VulkanResult<()>,
{
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.slots[slot].in_flight.wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireStatus> {
        self.swapchain.acquire_next_image(self.slots[slot].image_available.handle())
    }

    fn prepare(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let state = self.swapchain.state().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "preparing a frame without a swapchain".to_string(),
        })?;
        framebuffer_for(state, image_index)?;

        (self.prepare)(&self.context.memory(), &FrameInfo {
            frame_index: slot,
            image_index,
            extent: state.extent,
            generation: self.swapchain.generation(),
        })
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.slots[slot];
        frame.in_flight.reset()?;
        unsafe {
            self.context
                .device()
                .reset_command_buffer(frame.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let state = self.swapchain.state().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "recording without a swapchain".to_string(),
        })?;
        let framebuffer = framebuffer_for(state, image_index)?;

        let mut recorder = CommandRecorder::begin(self.context.device(), self.slots[slot].command_buffer)?;
        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer,
                state.extent,
                self.clear_color,
            );
            pass.bind_pipeline(self.pipeline.handle());
            pass.set_viewport_and_scissor(state.extent);

            for draw in self.draws {
                pass.bind_vertex_buffer(draw.vertex_buffer);
                if let Some(set) = draw.descriptor_set(slot) {
                    pass.bind_descriptor_set(self.pipeline.layout(), set);
                }
                match draw.index_buffer {
                    Some((buffer, count)) => {
                        pass.bind_index_buffer(buffer);
                        pass.draw_indexed(count);
                    }
                    None => pass.draw(draw.vertex_count),
                }
            }
        }
        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.slots[slot];
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info.build()], frame.in_flight.handle())
                .map_err(VulkanError::Api)
        }
    }

    fn abandon_image(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = &self.slots[slot];
        frame.in_flight.reset()?;

        // Empty batch: consumes the acquire signal and signals the fence
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);

        unsafe {
            self.context
                .device()
                .queue_submit(self.context.graphics_queue(), &[submit_info.build()], frame.in_flight.handle())
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentStatus> {
        self.swapchain.present(
            self.context.present_queue(),
            self.slots[slot].render_finished.handle(),
            image_index,
        )
    }

    fn take_resize_request(&mut self) -> bool {
        self.window.take_resize_notification()
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let format_changed = self.swapchain.recreate(self.context, &mut *self.window, &mut *self.render_pass)?;
        if format_changed {
            *self.pipeline = GraphicsPipeline::new(
                self.context.raw_device(),
                &*self.render_pass,
                self.pipeline_description,
                self.descriptor_set_layout,
            )?;
        }
        Ok(())
    }
}

fn framebuffer_for(state: &SwapchainState, image_index: u32) -> VulkanResult<vk::Framebuffer> {
    state.framebuffers.get(image_index as usize).copied().ok_or_else(|| VulkanError::InvalidOperation {
        reason: format!("image index {} out of range", image_index),
    })
}
