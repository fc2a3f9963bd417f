//! Vulkan instance creation
//!
//! Loads the Vulkan library, checks the requested validation layers, creates
//! the instance and routes validation messages into `log`.

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, CStr, CString};

use crate::core::config::RendererConfig;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Layers enabled on the instance, mirrored onto the device
    pub enabled_layers: Vec<CString>,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance
    ///
    /// `window_extensions` are the surface extensions the window system needs;
    /// pass an empty slice for a headless instance.
    pub fn new(config: &RendererConfig, window_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::Loading(e.to_string()))?;

        let validation = config.validation.is_enabled();
        let layer_names = config.validation.active_layers();

        if validation {
            let available = entry
                .enumerate_instance_layer_properties()
                .map_err(VulkanError::Api)?
                .iter()
                .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_string_lossy().into_owned())
                .collect::<Vec<_>>();

            let missing = missing_names(&available, layer_names);
            if !missing.is_empty() {
                return Err(VulkanError::ValidationLayersUnavailable { missing });
            }
        }

        let app_name = to_cstring(&config.application_name)?;
        let engine_name = to_cstring("RustRenderer")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(config.encoded_version())
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extension_names = window_extensions
            .iter()
            .map(|ext| to_cstring(ext))
            .collect::<VulkanResult<Vec<_>>>()?;
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        let enabled_layers = layer_names
            .iter()
            .map(|layer| to_cstring(layer))
            .collect::<VulkanResult<Vec<_>>>()?;
        let layer_ptrs: Vec<*const c_char> = enabled_layers.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe {
            entry.create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for \"{}\" (validation {})",
            config.application_name,
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            enabled_layers,
            debug,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Names in `required` that do not appear in `available`, in request order
pub fn missing_names(available: &[String], required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .cloned()
        .collect()
}

pub(crate) fn to_cstring(name: &str) -> VulkanResult<CString> {
    CString::new(name).map_err(|_| VulkanError::InvalidOperation {
        reason: format!("name {name:?} contains an interior NUL byte"),
    })
}
