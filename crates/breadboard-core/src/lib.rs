/*!
 * Breadboard Core
 *
 * Shared building blocks for the Breadboard crates: the dynamic [`Value`]
 * type, error types, layered process settings and logging setup.
 *
 * [`Value`]: types::Value
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use serde_json;
    pub use tokio;
    pub use tracing;
}

/// Breadboard core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install logging from settings and announce the version
pub fn init(settings: &config::Settings) -> Result<(), error::Error> {
    logging::init_with_settings(&settings.logging)?;
    tracing::info!("{} {} initialized", settings.general.app_name, VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
