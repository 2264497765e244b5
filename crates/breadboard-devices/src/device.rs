/*!
 * Device trait and core device abstractions.
 *
 * Every peripheral kind implements [`Device`]: a name, a kind tag, a closed
 * table of actions and one `invoke` entry point. Kinds that carry an
 * observable state also implement [`StatefulDevice`] and keep that state in
 * a [`StateCell`], which records each transition until the engine drains it.
 */
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use breadboard_core::types::{Parameters, Value};

use crate::hal::HalError;

/// Error type for device operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// The device declares no action with this name
    #[error("unknown action `{0}`")]
    UnknownAction(String),

    /// A parameter is missing, unexpected or malformed
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The hardware (or a remote endpoint standing in for it) failed
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, ActionError>;

impl ActionError {
    /// Create a new invalid parameter error
    pub fn invalid<S: Into<String>>(name: &str, reason: S) -> Self {
        ActionError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new hardware fault
    pub fn hardware<S: AsRef<str>>(detail: S) -> Self {
        ActionError::HardwareFault(detail.as_ref().to_string())
    }
}

impl From<HalError> for ActionError {
    fn from(err: HalError) -> Self {
        ActionError::HardwareFault(err.to_string())
    }
}

/// The shape of one action parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Whole number (query strings are parsed)
    Integer,
    /// Number
    Float,
    /// Boolean
    Boolean,
    /// Free text
    String,
}

/// One declared parameter of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterDescriptor {
    /// Parameter name
    pub name: &'static str,
    /// Expected shape
    pub kind: ParameterKind,
    /// Whether the action fails without it
    pub required: bool,
}

impl ParameterDescriptor {
    /// A required parameter
    pub const fn required(name: &'static str, kind: ParameterKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// An optional parameter
    pub const fn optional(name: &'static str, kind: ParameterKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// One entry of a device's action table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionDescriptor {
    /// Action name, as used in request paths and configuration
    pub name: &'static str,
    /// One-line description for the generated documentation
    pub description: &'static str,
    /// Declared parameters
    pub parameters: &'static [ParameterDescriptor],
}

impl ActionDescriptor {
    /// An action taking no parameters
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            parameters: &[],
        }
    }

    /// Declare the parameters of this action
    pub const fn with_parameters(self, parameters: &'static [ParameterDescriptor]) -> Self {
        Self {
            name: self.name,
            description: self.description,
            parameters,
        }
    }

    /// Check `params` against the declaration: no undeclared names, every
    /// required name present. Values are left untouched.
    pub fn check(&self, params: &Parameters) -> Result<()> {
        let mut names: Vec<&String> = params.keys().collect();
        names.sort();
        if let Some(unexpected) = names
            .into_iter()
            .find(|name| !self.parameters.iter().any(|p| p.name == name.as_str()))
        {
            return Err(ActionError::invalid(unexpected, "unexpected parameter"));
        }

        match self
            .parameters
            .iter()
            .find(|p| p.required && !params.contains_key(p.name))
        {
            Some(missing) => Err(ActionError::invalid(missing.name, "required parameter is missing")),
            None => Ok(()),
        }
    }
}

/// The action every stateful kind exposes
pub const STATE_ACTION: ActionDescriptor =
    ActionDescriptor::new("state", "Get the current state of the device");

/// The core device trait
///
/// A device is owned by exactly one registry and is only ever reached
/// through it, so `invoke` takes `&mut self` and no locking is involved.
#[async_trait]
pub trait Device: Send + Debug {
    /// The unique name from the configuration document
    fn name(&self) -> &str;

    /// The type tag this device was built from
    fn kind(&self) -> &str;

    /// The closed table of actions this device accepts
    fn actions(&self) -> &[ActionDescriptor];

    /// Look up one action by name
    fn action(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions().iter().find(|a| a.name == name)
    }

    /// Run one action
    ///
    /// Unknown actions yield [`ActionError::UnknownAction`]; implementations
    /// never panic on bad input.
    async fn invoke(&mut self, action: &str, params: &Parameters) -> Result<Value>;

    /// How often the device wants [`poll`](Device::poll) called
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// Sample the hardware; stateful kinds record any transition
    async fn poll(&mut self) -> Result<()> {
        Ok(())
    }

    /// This device as a stateful device, if it is one
    fn as_stateful(&self) -> Option<&dyn StatefulDevice> {
        None
    }

    /// Mutable access to the stateful side, if any
    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulDevice> {
        None
    }
}

/// A device with an observable state that can trigger events
pub trait StatefulDevice: Device {
    /// The cell holding state, observers and unprocessed transitions
    fn state_cell(&self) -> &StateCell;

    /// Mutable access to the cell
    fn state_cell_mut(&mut self) -> &mut StateCell;

    /// The current state
    fn current_state(&self) -> &Value {
        self.state_cell().current()
    }

    /// Every state the device can enter, when the set is closed
    fn possible_states(&self) -> Option<Vec<Value>> {
        None
    }
}

/// Identifies one subscriber of a [`StateCell`]; the engine uses rule indices
pub type ObserverId = usize;

/// One observed transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    /// The device that changed
    pub device: String,
    /// State before
    pub from: Value,
    /// State after
    pub to: Value,
    /// When the change was observed
    pub at: DateTime<Utc>,
}

/// State storage shared by every stateful kind
#[derive(Debug, Clone)]
pub struct StateCell {
    device: String,
    current: Value,
    observers: Vec<ObserverId>,
    pending: Vec<StateChange>,
}

impl StateCell {
    /// Create a cell holding `initial`; the initial value is not a transition
    pub fn new<S: Into<String>>(device: S, initial: Value) -> Self {
        Self {
            device: device.into(),
            current: initial,
            observers: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Name of the owning device
    pub fn device(&self) -> &str {
        &self.device
    }

    /// The current state
    pub fn current(&self) -> &Value {
        &self.current
    }

    /// Move to `to`; records a [`StateChange`] and returns true when the value differs
    pub fn set(&mut self, to: Value) -> bool {
        if to == self.current {
            return false;
        }
        let from = std::mem::replace(&mut self.current, to.clone());
        tracing::debug!(device = %self.device, %from, %to, "State changed");
        self.pending.push(StateChange {
            device: self.device.clone(),
            from,
            to,
            at: Utc::now(),
        });
        true
    }

    /// Add an observer; observers are notified in subscription order
    pub fn subscribe(&mut self, observer: ObserverId) {
        if !self.observers.contains(&observer) {
            self.observers.push(observer);
        }
    }

    /// Current observers, in subscription order
    pub fn observers(&self) -> &[ObserverId] {
        &self.observers
    }

    /// Whether transitions are waiting to be processed
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drain recorded transitions, oldest first
    pub fn take_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.pending)
    }

    /// The `{"state": ...}` object returned by the `state` action
    pub fn to_response(&self) -> Value {
        Value::object([("state", self.current.clone())])
    }
}

/// The `off`/`on` state pair used by buttons
pub fn on_off_states() -> Vec<Value> {
    vec![Value::from("off"), Value::from("on")]
}
