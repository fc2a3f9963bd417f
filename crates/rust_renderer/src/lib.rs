//! # Rust Renderer
//!
//! A double/triple-buffered Vulkan frame loop with explicit ownership of every
//! device-level handle.
//!
//! ## Features
//!
//! - **Device Context**: instance, surface, physical/logical device, queues and
//!   the shared command pool in one ownership arena
//! - **Memory Manager**: buffer/image allocation with deterministic memory-type
//!   selection, one-time command copies and layout transitions
//! - **Resource Uploader**: staged host-to-device uploads for vertex, index,
//!   uniform and texture data
//! - **Swapchain Manager**: creation, invalidation and minimized-window-safe
//!   recreation of the presentable image chain
//! - **Frame Synchronizer**: per-slot fences/semaphores driving the
//!   acquire/submit/present cycle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     rust_renderer::foundation::logging::init(&config.logging);
//!
//!     let mut window = Window::new(&config.window)?;
//!     let pipeline = PipelineDescription::from_shader_config(&config.shaders)?;
//!     let mut renderer = Renderer::initialize(&mut window, &config, pipeline)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw_frame(&mut window, &[], |_memory, _frame| Ok(()))?;
//!     }
//!
//!     renderer.cleanup()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::config::{LoggingConfig, RendererConfig, ShaderConfig, ValidationConfig, WindowConfig},
        render::{
            DrawCommand, FrameInfo, FrameStatus, Renderer,
            vulkan::{
                DeviceContext, MemoryManager, ResourceUploader, SurfaceProvider, Window,
                VulkanError, VulkanResult,
                resources::{DescriptorPool, IndexBuffer, Texture, UniformBuffer, VertexBuffer},
                rendering::{PipelineDescription, VertexLayout},
            },
        },
    };
}
