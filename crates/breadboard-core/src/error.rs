/*!
 * Error types shared across the Breadboard crates.
 *
 * [`Error`] covers process-level failures (settings, logging, timeouts).
 * [`ConfigError`] is the startup error for a device document: any variant
 * aborts the registry build and nothing is left running.
 */
use thiserror::Error;

/// Error type for Breadboard core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// An operation exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Breadboard core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new runtime error
    pub fn runtime<S: AsRef<str>>(msg: S) -> Self {
        Error::Runtime(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }
}

/// A device document that cannot be turned into a running registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The `device` tag names no known device type
    #[error("device {name}: unknown device type `{tag}`")]
    UnknownDeviceType {
        /// Device name
        name: String,
        /// The unresolved type tag
        tag: String,
    },

    /// A required instantiation parameter is absent
    #[error("device {device}: missing parameter `{parameter}`")]
    MissingParameter {
        /// Device name
        device: String,
        /// Parameter name
        parameter: String,
    },

    /// An instantiation parameter has the wrong shape or range
    #[error("device {device}: invalid parameter `{parameter}`: {reason}")]
    InvalidParameter {
        /// Device name
        device: String,
        /// Parameter name
        parameter: String,
        /// What is wrong with it
        reason: String,
    },

    /// Two devices claim the same physical resource
    #[error("{resource} is claimed by more than one device: {}", devices.join(", "))]
    ResourceConflict {
        /// The contested resource, e.g. `GPIO 17`
        resource: String,
        /// Every device claiming it, first claimant first
        devices: Vec<String>,
    },

    /// A chain or event references a device that does not exist
    #[error("{context}: unknown device `{device}`")]
    DanglingReference {
        /// Where the reference appears, e.g. `chain party`
        context: String,
        /// The missing device name
        device: String,
    },

    /// A chain or event references an action the device does not declare
    #[error("{context}: device `{device}` has no action `{action}`")]
    UnknownActionReference {
        /// Where the reference appears
        context: String,
        /// Device name
        device: String,
        /// The undeclared action
        action: String,
    },

    /// An event targets a device that carries no state
    #[error("event on device `{device}`: device has no observable state")]
    NotStateful {
        /// Device name
        device: String,
    },

    /// An event trigger names a state the device can never enter
    #[error("event on device `{device}`: `{state}` is not one of its states")]
    InvalidTriggerState {
        /// Device name
        device: String,
        /// The trigger value, rendered
        state: String,
    },

    /// The hardware refused a resource during construction
    #[error("device {device}: hardware error: {detail}")]
    Hardware {
        /// Device name
        device: String,
        /// Driver-level detail
        detail: String,
    },

    /// The document does not have the expected shape
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::MissingParameter`]
    pub fn missing(device: &str, parameter: &str) -> Self {
        ConfigError::MissingParameter {
            device: device.to_string(),
            parameter: parameter.to_string(),
        }
    }

    /// Shorthand for [`ConfigError::InvalidParameter`]
    pub fn invalid<S: Into<String>>(device: &str, parameter: &str, reason: S) -> Self {
        ConfigError::InvalidParameter {
            device: device.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConfigError::Malformed`]
    pub fn malformed<S: AsRef<str>>(msg: S) -> Self {
        ConfigError::Malformed(msg.as_ref().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_conflict_lists_every_claimant() {
        let err = ConfigError::ResourceConflict {
            resource: "GPIO 17".to_string(),
            devices: vec!["exhaust_fan".to_string(), "lights".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "GPIO 17 is claimed by more than one device: exhaust_fan, lights"
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(Error::timeout("http shutdown").to_string(), "Timeout: http shutdown");
        assert_eq!(
            ConfigError::missing("lights", "pin").to_string(),
            "device lights: missing parameter `pin`"
        );
    }
}
