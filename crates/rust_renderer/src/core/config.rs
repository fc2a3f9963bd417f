//! # Renderer Configuration
//!
//! All static tables the renderer reads once at startup: application metadata,
//! window size, frames in flight, validation layers, required device
//! extensions, shader locations and logging filters.
//!
//! Every section is `#[serde(default)]`, so a configuration file only needs to
//! name the values it overrides.

use serde::{Serialize, Deserialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// Name of the Khronos validation layer
pub const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Name of the swapchain device extension
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// # Shader Configuration
///
/// Defines shader loading parameters and paths for the rendering system.
/// Supports path resolution for development environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the common shader locations in order so binaries can be run from
    /// the workspace root or from their own crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 4] = ["shaders/", "resources/shaders/", "../shaders/", "./"];

        let resolve = |name: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{dir}{name}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("shaders/{name}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("vert.spv", "frag.spv")
    }
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial client width in screen coordinates
    pub width: u32,
    /// Initial client height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Rust Renderer".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Validation layer selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// `None` enables validation in debug builds only
    pub enabled: Option<bool>,
    /// Instance layers to enable when validation is on
    pub layers: Vec<String>,
}

impl ValidationConfig {
    /// Resolve the effective validation flag for this build
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(cfg!(debug_assertions))
    }

    /// Layers to request, empty when validation is off
    pub fn active_layers(&self) -> &[String] {
        if self.is_enabled() {
            &self.layers
        } else {
            &[]
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            layers: vec![KHRONOS_VALIDATION_LAYER.to_string()],
        }
    }
}

/// Logger setup, see [`crate::foundation::logging::init`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter string; falls back to `RUST_LOG`, then `info`
    pub filter: Option<String>,
    /// Prefix records with a millisecond timestamp
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            timestamps: true,
        }
    }
}

/// # Renderer Configuration
///
/// Top-level configuration passed to [`crate::render::Renderer::initialize`]
/// and [`crate::render::vulkan::DeviceContext`] construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Window parameters
    pub window: WindowConfig,
    /// Number of frame slots (frames that may be in flight at once)
    pub frames_in_flight: usize,
    /// Validation layers
    pub validation: ValidationConfig,
    /// Device extensions a physical device must expose
    pub device_extensions: Vec<String>,
    /// Clear color for the single color attachment
    pub clear_color: [f32; 4],
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            window: WindowConfig::default(),
            frames_in_flight: 2,
            validation: ValidationConfig::default(),
            device_extensions: vec![SWAPCHAIN_EXTENSION.to_string()],
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Set application version
    #[must_use]
    pub const fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set the window parameters
    #[must_use]
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Set custom shader configuration
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set the number of frame slots
    #[must_use]
    pub const fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation.enabled = Some(enabled);
        self
    }

    /// Set the clear color
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Vulkan-encoded application version
    pub const fn encoded_version(&self) -> u32 {
        let (major, minor, patch) = self.application_version;
        ash::vk::make_api_version(0, major, minor, patch)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application name cannot be empty".to_string()));
        }

        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("frames in flight must be at least 1".to_string()));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if let Some(name) = self
            .device_extensions
            .iter()
            .chain(self.validation.layers.iter())
            .find(|name| name.is_empty() || name.contains('\0'))
        {
            return Err(ConfigError::Invalid(format!("invalid extension or layer name {name:?}")));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Rust Renderer Application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.device_extensions, vec![SWAPCHAIN_EXTENSION.to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let config = RendererConfig::default().with_frames_in_flight(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RendererConfig::default().with_window(WindowConfig {
            width: 0,
            ..WindowConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_extension_name_rejected() {
        let mut config = RendererConfig::default();
        config.device_extensions.push(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_override() {
        let on = RendererConfig::default().with_validation(true);
        assert!(on.validation.is_enabled());
        assert_eq!(on.validation.active_layers(), [KHRONOS_VALIDATION_LAYER.to_string()]);

        let off = RendererConfig::default().with_validation(false);
        assert!(off.validation.active_layers().is_empty());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "demo"
            frames_in_flight = 3

            [window]
            width = 1280
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "demo");
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.validation.layers, vec![KHRONOS_VALIDATION_LAYER.to_string()]);
    }

    #[test]
    fn test_ron_save_and_load() {
        let path = std::env::temp_dir().join(format!("rust_renderer_config_{}.ron", std::process::id()));
        let config = RendererConfig::new("ron demo").with_frames_in_flight(3).with_clear_color([0.1, 0.2, 0.3, 1.0]);

        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }
}
