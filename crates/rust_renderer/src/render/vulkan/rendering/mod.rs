//! Render pass, graphics pipeline and command recording

pub mod commands;
pub mod pipeline;
pub mod render_pass;

pub use commands::{ActiveRenderPass, CommandRecorder};
pub use pipeline::{GraphicsPipeline, PipelineDescription, ShaderModule, VertexLayout};
pub use render_pass::RenderPass;
