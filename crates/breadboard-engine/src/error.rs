/*!
 * Error types for the Breadboard engine crate.
 *
 * Caller errors (unknown names, bad parameters) and hardware faults are kept
 * apart so the request router can map them to status classes.
 */
use std::time::Duration;

use thiserror::Error;

use breadboard_core::error::ConfigError;
use breadboard_core::types::Value;
use breadboard_devices::ActionError;

/// How a failure is reported to a remote caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The named device, action or chain does not exist
    NotFound,
    /// The request was malformed
    BadRequest,
    /// The hardware or a remote endpoint failed
    Internal,
}

impl StatusClass {
    /// The HTTP status code of this class
    pub fn code(self) -> u16 {
        match self {
            StatusClass::NotFound => 404,
            StatusClass::BadRequest => 400,
            StatusClass::Internal => 500,
        }
    }
}

fn action_status(err: &ActionError) -> StatusClass {
    match err {
        ActionError::UnknownAction(_) => StatusClass::NotFound,
        ActionError::InvalidParameter { .. } => StatusClass::BadRequest,
        ActionError::HardwareFault(_) => StatusClass::Internal,
    }
}

/// Failure to dispatch one action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// No device has this name
    #[error("unknown device `{0}`")]
    UnknownDevice(String),

    /// The device rejected or failed the action
    #[error("{device}.{action}: {source}")]
    Action {
        /// Device name
        device: String,
        /// Action name
        action: String,
        /// What the device reported
        #[source]
        source: ActionError,
    },
}

impl DispatchError {
    /// Status class for remote callers
    pub fn status_class(&self) -> StatusClass {
        match self {
            DispatchError::UnknownDevice(_) => StatusClass::NotFound,
            DispatchError::Action { source, .. } => action_status(source),
        }
    }

    /// The device-level error, if the device was reached
    pub fn action_error(&self) -> Option<&ActionError> {
        match self {
            DispatchError::Action { source, .. } => Some(source),
            DispatchError::UnknownDevice(_) => None,
        }
    }
}

/// Failure to run a chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// No chain has this name
    #[error("unknown chain `{0}`")]
    UnknownChain(String),

    /// A step failed; later steps did not run
    #[error("chain `{chain}` failed at step {step}: {source}")]
    Step {
        /// Chain name
        chain: String,
        /// Zero-based index of the failing step
        step: usize,
        /// The step's dispatch error
        #[source]
        source: DispatchError,
    },
}

impl ChainError {
    /// Status class for remote callers
    pub fn status_class(&self) -> StatusClass {
        match self {
            ChainError::UnknownChain(_) => StatusClass::NotFound,
            ChainError::Step { source, .. } => source.status_class(),
        }
    }
}

/// Failure of an outbound webhook call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WebhookError {
    /// No response within the configured timeout
    #[error("webhook {url} timed out after {after:?}")]
    Timeout {
        /// Target URL
        url: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The request could not be sent
    #[error("webhook {url} failed: {detail}")]
    Transport {
        /// Target URL
        url: String,
        /// Transport detail
        detail: String,
    },

    /// The endpoint answered with a non-success status
    #[error("webhook {url} answered {status}")]
    Status {
        /// Target URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}

impl WebhookError {
    /// Webhook failures are hardware-fault class
    pub fn status_class(&self) -> StatusClass {
        StatusClass::Internal
    }
}

/// Failure of one event action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventActionError {
    /// A device action failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A webhook failed
    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

/// Failure of one fired rule
#[derive(Error, Debug, Clone, PartialEq)]
#[error("rule {rule} ({device} -> {state}) failed at action {step}: {source}")]
pub struct RuleError {
    /// Index of the rule in declaration order
    pub rule: usize,
    /// Device the rule watches
    pub device: String,
    /// Trigger state
    pub state: Value,
    /// Zero-based index of the failing action
    pub step: usize,
    /// The action's error
    #[source]
    pub source: EventActionError,
}

/// Error type for Breadboard engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dispatch error
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Chain error
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Webhook error
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] breadboard_core::error::Error),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for Breadboard engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new runtime error
    pub fn runtime<S: AsRef<str>>(msg: S) -> Self {
        Error::Runtime(msg.as_ref().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(DispatchError::UnknownDevice("x".into()).status_class().code(), 404);

        let invalid = DispatchError::Action {
            device: "lights".into(),
            action: "set".into(),
            source: ActionError::invalid("red", "300 is outside 0-255"),
        };
        assert_eq!(invalid.status_class(), StatusClass::BadRequest);

        let fault = ChainError::Step {
            chain: "night".into(),
            step: 1,
            source: DispatchError::Action {
                device: "fan".into(),
                action: "on".into(),
                source: ActionError::hardware("stalled"),
            },
        };
        assert_eq!(fault.status_class(), StatusClass::Internal);
        assert_eq!(
            fault.to_string(),
            "chain `night` failed at step 1: fan.on: hardware fault: stalled"
        );
        assert_eq!(ChainError::UnknownChain("x".into()).status_class(), StatusClass::NotFound);
    }
}
