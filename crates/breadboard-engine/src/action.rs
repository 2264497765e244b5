/*!
 * Action dispatch.
 *
 * Every way of running a device action (API request, chain step, event rule)
 * goes through [`dispatch`]: look the device up, check the parameters against
 * the action's declaration, then invoke. The device's result is returned
 * unchanged.
 */
use tracing::{debug, trace};

use breadboard_core::types::{Parameters, Value};
use breadboard_devices::{ActionError, DeviceTable};

use crate::error::DispatchError;

/// One device action with its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    /// Target device name
    pub device: String,
    /// Action name
    pub action: String,
    /// Arguments passed to the action
    pub parameters: Parameters,
}

impl ActionSpec {
    /// Create a new action spec
    pub fn new<D: Into<String>, A: Into<String>>(device: D, action: A, parameters: Parameters) -> Self {
        Self {
            device: device.into(),
            action: action.into(),
            parameters,
        }
    }
}

/// Run `action` on the device called `device`
pub async fn dispatch(
    devices: &mut DeviceTable,
    device: &str,
    action: &str,
    params: &Parameters,
) -> Result<Value, DispatchError> {
    let wrap = |source: ActionError| DispatchError::Action {
        device: device.to_string(),
        action: action.to_string(),
        source,
    };

    let target = devices
        .get_mut(device)
        .ok_or_else(|| DispatchError::UnknownDevice(device.to_string()))?;
    let descriptor = *target
        .action(action)
        .ok_or_else(|| wrap(ActionError::UnknownAction(action.to_string())))?;
    descriptor.check(params).map_err(wrap)?;

    trace!(device, action, params = params.len(), "Dispatching");
    match target.invoke(action, params).await {
        Ok(value) => {
            debug!(device, action, "Action completed");
            Ok(value)
        }
        Err(e) => {
            debug!(device, action, error = %e, "Action failed");
            Err(wrap(e))
        }
    }
}

/// Run an [`ActionSpec`]
pub async fn dispatch_spec(devices: &mut DeviceTable, spec: &ActionSpec) -> Result<Value, DispatchError> {
    dispatch(devices, &spec.device, &spec.action, &spec.parameters).await
}
