//! Rendering: the Vulkan backend and the renderer that drives it

pub mod renderer;
pub mod vulkan;

pub use renderer::{DrawCommand, FrameInfo, Renderer};
pub use vulkan::FrameStatus;
