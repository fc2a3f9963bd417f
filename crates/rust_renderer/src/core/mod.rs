//! Core renderer types
//!
//! Configuration shared by the device context, the swapchain and the
//! application driving the frame loop.

pub mod config;

pub use config::{LoggingConfig, RendererConfig, ShaderConfig, ValidationConfig, WindowConfig};
