//! Shader modules and the graphics pipeline
//!
//! A [`PipelineDescription`] carries everything fixed at pipeline-build time:
//! SPIR-V for both stages, vertex input layout, topology, culling, blend
//! constants and the descriptor bindings. Viewport and scissor are dynamic so
//! a swapchain resize does not require a rebuild; only a change of surface
//! format (and so of render pass) does.

use ash::{vk, Device};
use std::ffi::CStr;
use std::io::Cursor;

use crate::core::config::ShaderConfig;
use crate::foundation::files;
use crate::render::vulkan::rendering::render_pass::RenderPass;
use crate::render::vulkan::resources::descriptor::{DescriptorSetLayout, DescriptorSetLayoutBuilder};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Describes how a vertex type is laid out in a vertex buffer
pub trait VertexLayout {
    /// Binding 0 description (stride and input rate)
    fn binding_description() -> vk::VertexInputBindingDescription;

    /// One description per shader input location
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    ///
    /// The bytes are copied into a `u32` buffer, so the input needs no
    /// particular alignment.
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid SPIR-V: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe {
            device.create_shader_module(&create_info, None)
                .map_err(VulkanError::creation("shader module"))?
        };

        Ok(Self { device, module })
    }

    /// Get shader module handle
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Create shader stage create info
    pub fn create_stage_info(&self, stage: vk::ShaderStageFlags, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Fixed-function state and shaders for one graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    /// Vertex stage SPIR-V
    pub vertex_spirv: Vec<u8>,
    /// Fragment stage SPIR-V
    pub fragment_spirv: Vec<u8>,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Face culling
    pub cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    pub front_face: vk::FrontFace,
    /// Blend constants (blending itself is off)
    pub blend_constants: [f32; 4],
    /// Vertex buffer bindings
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex attributes
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Descriptor bindings of set 0
    pub descriptors: DescriptorSetLayoutBuilder,
}

impl PipelineDescription {
    /// Description with default fixed-function state and no vertex input
    pub fn from_spirv(vertex_spirv: Vec<u8>, fragment_spirv: Vec<u8>) -> Self {
        Self {
            vertex_spirv,
            fragment_spirv,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            blend_constants: [0.0; 4],
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            descriptors: DescriptorSetLayoutBuilder::uniform_and_sampler(),
        }
    }

    /// Read both shader stages from the configured paths
    pub fn from_shader_config(shaders: &ShaderConfig) -> VulkanResult<Self> {
        let vertex = files::read(&shaders.vertex_shader_path)?;
        let fragment = files::read(&shaders.fragment_shader_path)?;
        Ok(Self::from_spirv(vertex, fragment))
    }

    /// Use `V`'s layout as the single vertex binding
    #[must_use]
    pub fn with_vertex_layout<V: VertexLayout>(mut self) -> Self {
        self.vertex_bindings = vec![V::binding_description()];
        self.vertex_attributes = V::attribute_descriptions();
        self
    }

    /// Set primitive topology
    #[must_use]
    pub fn with_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set culling and front face winding
    #[must_use]
    pub fn with_culling(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// Set blend constants
    #[must_use]
    pub fn with_blend_constants(mut self, blend_constants: [f32; 4]) -> Self {
        self.blend_constants = blend_constants;
        self
    }

    /// Replace the descriptor bindings
    #[must_use]
    pub fn with_descriptors(mut self, descriptors: DescriptorSetLayoutBuilder) -> Self {
        self.descriptors = descriptors;
        self
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build a pipeline for subpass 0 of `render_pass`
    pub fn new(
        device: Device,
        render_pass: &RenderPass,
        description: &PipelineDescription,
        descriptor_set_layout: &DescriptorSetLayout,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_bytes(device.clone(), &description.vertex_spirv)?;
        let fragment_shader = ShaderModule::from_bytes(device.clone(), &description.fragment_spirv)?;

        let entry = CStr::from_bytes_with_nul(b"main\0")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let shader_stages = [
            vertex_shader.create_stage_info(vk::ShaderStageFlags::VERTEX, entry),
            fragment_shader.create_stage_info(vk::ShaderStageFlags::FRAGMENT, entry),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&description.vertex_bindings)
            .vertex_attribute_descriptions(&description.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(description.topology)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(description.cull_mode)
            .front_face(description.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments)
            .blend_constants(description.blend_constants);

        let set_layouts = [descriptor_set_layout.handle()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::creation("pipeline layout"))?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };

        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::ResourceCreation {
                    resource: "graphics pipeline",
                    result: err,
                });
            }
        };

        log::debug!(
            "Created graphics pipeline ({:?}, cull {:?}, {} vertex attributes)",
            description.topology,
            description.cull_mode,
            description.vertex_attributes.len()
        );

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
