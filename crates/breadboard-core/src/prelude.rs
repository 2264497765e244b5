/*!
 * Prelude module for Breadboard Core.
 *
 * Re-exports the types most crates in the workspace need.
 */

pub use crate::error::{ConfigError, Error, Result};

pub use crate::types::{Parameters, Value};

pub use crate::config::{RuntimeSettings, Settings, SettingsBuilder};

pub use crate::utils::{seconds_to_duration, spawn_and_log, with_timeout};

pub use tracing::{debug, error, info, trace, warn};
