//! Foundation module - Core utilities
//!
//! This module provides the utilities the rendering core leans on:
//! - Logging initialization and re-exported macros
//! - Whole-file loading for shader byte-code and texture data

pub mod files;
pub mod logging;
