/*!
 * Logging setup for Breadboard.
 *
 * Everything logs through `tracing`. The subscriber is installed once by the
 * binary; libraries only create spans and events.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_settings(&LoggingSettings::default())
}

/// Initialize the logging system from [`LoggingSettings`]
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_with_settings(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| Error::config(format!("Invalid log filter `{}`: {}", settings.level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if settings.json_format {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a span for one device
pub fn device_span(name: &str, kind: &str) -> Span {
    tracing::info_span!("device", name = %name, kind = %kind)
}

/// Create a span for a component of the process (server, runtime, loader)
pub fn component_span(name: &str) -> Span {
    tracing::info_span!("component", name = %name)
}
