//! Vulkan error types
//!
//! Every failure the rendering core can surface is a [`VulkanError`] variant.
//! [`VulkanError::kind`] groups the variants into the categories callers act
//! on: fatal initialization, resource creation, unsupported layout
//! transitions and runtime API failures.
//!
//! Out-of-date and suboptimal swapchains are not errors. They are reported
//! through [`crate::render::vulkan::state::AcquireStatus`] and
//! [`crate::render::vulkan::state::PresentStatus`] and handled inside the
//! frame synchronizer.

use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;
use crate::foundation::files::FileError;
use crate::render::vulkan::initialization::window::WindowError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The Vulkan loader library could not be found or opened
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device satisfied queue, extension and surface requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Validation was requested but some layers are not installed
    #[error("Validation layers requested, but are not available: {missing:?}")]
    ValidationLayersUnavailable {
        /// Layers that the loader does not know about
        missing: Vec<String>,
    },

    /// No memory type matched the filter and property flags
    #[error("No suitable memory type for filter {type_filter:#034b} with properties {properties:?}")]
    NoSuitableMemoryType {
        /// Allowed memory types from the resource's requirements
        type_filter: u32,
        /// Requested property flags
        properties: vk::MemoryPropertyFlags,
    },

    /// A resource creation call failed
    #[error("Failed to create {resource}: {result:?}")]
    ResourceCreation {
        /// What was being created
        resource: &'static str,
        /// Vulkan result code
        result: vk::Result,
    },

    /// Layout transition outside the supported table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition {
        /// Layout the image is in
        old: vk::ImageLayout,
        /// Layout that was requested
        new: vk::ImageLayout,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Window system failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// File loading failure
    #[error(transparent)]
    File(#[from] FileError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Texture decoding failure
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Coarse error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Startup cannot continue; never retried
    FatalInit,
    /// A buffer, image or other object could not be created
    ResourceCreation,
    /// Programming error in a layout transition request
    UnsupportedTransition,
    /// An API call failed while running
    Runtime,
}

impl VulkanError {
    /// Classify the error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Loading(_)
            | Self::InitializationFailed(_)
            | Self::NoSuitableDevice
            | Self::ValidationLayersUnavailable { .. }
            | Self::Window(_)
            | Self::Config(_) => ErrorKind::FatalInit,
            Self::NoSuitableMemoryType { .. }
            | Self::ResourceCreation { .. }
            | Self::File(_)
            | Self::Image(_) => ErrorKind::ResourceCreation,
            Self::UnsupportedTransition { .. } => ErrorKind::UnsupportedTransition,
            Self::Api(_) | Self::InvalidOperation { .. } => ErrorKind::Runtime,
        }
    }

    /// Wrap a failed create call
    pub fn creation(resource: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::ResourceCreation { resource, result }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(VulkanError::NoSuitableDevice.kind(), ErrorKind::FatalInit);
        assert_eq!(
            VulkanError::ValidationLayersUnavailable { missing: vec!["VK_LAYER_KHRONOS_validation".into()] }.kind(),
            ErrorKind::FatalInit
        );
        assert_eq!(
            VulkanError::NoSuitableMemoryType { type_filter: 0b101, properties: vk::MemoryPropertyFlags::DEVICE_LOCAL }
                .kind(),
            ErrorKind::ResourceCreation
        );
        assert_eq!(
            VulkanError::UnsupportedTransition {
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::PRESENT_SRC_KHR,
            }
            .kind(),
            ErrorKind::UnsupportedTransition
        );
        assert_eq!(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST).kind(), ErrorKind::Runtime);
    }

    #[test]
    fn test_creation_helper_names_resource() {
        let err = VulkanError::creation("sampler")(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.kind(), ErrorKind::ResourceCreation);
        assert!(err.to_string().contains("sampler"));
    }
}
