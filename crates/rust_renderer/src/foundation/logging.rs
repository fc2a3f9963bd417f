//! Logging utilities and structured logging support

use std::sync::Once;

pub use log::{debug, info, warn, error, trace};

use crate::core::config::LoggingConfig;

static INIT: Once = Once::new();

/// Initialize the logging system
///
/// The filter comes from the configuration, then `RUST_LOG`, then defaults to
/// `info`. Calling this more than once has no effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        let filter = config.filter.clone().or_else(|| std::env::var("RUST_LOG").ok());
        match filter {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => {
                builder.filter_level(log::LevelFilter::Info);
            }
        }

        if config.timestamps {
            builder.format_timestamp_millis();
        } else {
            builder.format_timestamp(None);
        }

        if builder.try_init().is_ok() {
            log::debug!("Logging initialized");
        }
    });
}
