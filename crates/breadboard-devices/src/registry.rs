/*!
 * The live device table.
 *
 * [`DeviceTable::build`] turns every definition into a device or fails as a
 * whole. Devices built before a failure are dropped with the partial table,
 * which releases every hardware line they claimed.
 */
use std::collections::HashMap;

use tracing::{debug, error, info};

use breadboard_core::error::ConfigError;
use breadboard_core::logging::device_span;
use breadboard_core::types::Value;

use crate::device::{ActionDescriptor, Device, ParameterKind, StatefulDevice};
use crate::factory::{BuildContext, DeviceDefinition, FactoryTable};
use crate::hal::Board;

/// Devices by name, in definition order
#[derive(Debug, Default)]
pub struct DeviceTable {
    devices: Vec<Box<dyn Device>>,
    index: HashMap<String, usize>,
}

impl DeviceTable {
    /// Build every device in `definitions` against `board`
    pub fn build(
        definitions: &[DeviceDefinition],
        factory: &FactoryTable,
        board: &dyn Board,
    ) -> Result<Self, ConfigError> {
        let mut ctx = BuildContext::new(board);
        let mut table = DeviceTable::default();

        for def in definitions {
            if table.index.contains_key(def.name()) {
                return Err(ConfigError::malformed(format!(
                    "device `{}` is defined twice",
                    def.name()
                )));
            }
            let _span = device_span(def.name(), def.tag()).entered();
            match factory.construct(def, &mut ctx) {
                Ok(device) => {
                    debug!(device = %def.name(), kind = %def.tag(), "Built device");
                    table.index.insert(def.name().to_string(), table.devices.len());
                    table.devices.push(device);
                }
                Err(e) => {
                    error!(device = %def.name(), error = %e, "Device build failed, releasing {} devices", table.len());
                    return Err(e);
                }
            }
        }

        info!(
            devices = table.len(),
            resources = ctx.claimed(),
            "Built device table"
        );
        Ok(table)
    }

    /// A device by name
    pub fn get(&self, name: &str) -> Option<&dyn Device> {
        self.index.get(name).map(|&i| self.devices[i].as_ref())
    }

    /// Mutable access to a device by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Device + 'static)> {
        let idx = *self.index.get(name)?;
        self.devices.get_mut(idx).map(|d| d.as_mut())
    }

    /// Whether a device with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// A device by name, if it is stateful
    pub fn stateful(&self, name: &str) -> Option<&dyn StatefulDevice> {
        self.get(name)?.as_stateful()
    }

    /// Mutable access to a stateful device by name
    pub fn stateful_mut(&mut self, name: &str) -> Option<&mut dyn StatefulDevice> {
        self.get_mut(name)?.as_stateful_mut()
    }

    /// Device names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name())
    }

    /// Devices in definition order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Device> {
        self.devices.iter().map(|d| d.as_ref())
    }

    /// Mutable devices in definition order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Device + 'static)> {
        self.devices.iter_mut().map(|d| d.as_mut())
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Every device with its kind, actions and (for stateful kinds) states
    pub fn describe(&self) -> Value {
        Value::Array(self.iter().map(describe_device).collect())
    }
}

fn describe_action(action: &ActionDescriptor) -> Value {
    let parameters = action
        .parameters
        .iter()
        .map(|p| {
            let kind = match p.kind {
                ParameterKind::Integer => "integer",
                ParameterKind::Float => "float",
                ParameterKind::Boolean => "boolean",
                ParameterKind::String => "string",
            };
            Value::object([
                ("name", Value::from(p.name)),
                ("type", Value::from(kind)),
                ("required", Value::from(p.required)),
            ])
        })
        .collect::<Vec<_>>();
    Value::object([
        ("name", Value::from(action.name)),
        ("description", Value::from(action.description)),
        ("parameters", Value::Array(parameters)),
    ])
}

fn describe_device(device: &dyn Device) -> Value {
    let mut entry = vec![
        ("name", Value::from(device.name())),
        ("kind", Value::from(device.kind())),
        (
            "actions",
            Value::Array(device.actions().iter().map(describe_action).collect()),
        ),
    ];
    if let Some(states) = device.as_stateful().and_then(|s| s.possible_states()) {
        entry.push(("states", Value::Array(states)));
    }
    Value::object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedBoard;

    fn def(name: &str, tag: &str, params: &[(&str, Value)]) -> DeviceDefinition {
        DeviceDefinition::new(
            name,
            tag,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    fn workshop() -> Vec<DeviceDefinition> {
        vec![
            def("exhaust_fan", "Fan", &[("pin", Value::Integer(17))]),
            def("porch", "VirtualToggleButton", &[("pin", Value::Integer(3))]),
            def("lights", "RGBNeoPixel", &[("pin", Value::Integer(27)), ("count", Value::Integer(4))]),
        ]
    }

    #[test]
    fn test_build_keeps_definition_order() {
        let board = SimulatedBoard::new();
        let table = DeviceTable::build(&workshop(), &FactoryTable::standard(), &board).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["exhaust_fan", "porch", "lights"]);
        assert_eq!(table.get("lights").map(|d| d.kind()), Some("RGBNeoPixel"));
        assert!(table.stateful("porch").is_some());
        assert!(table.stateful("exhaust_fan").is_none());
        assert!(table.get("garage").is_none());
        assert_eq!(board.claimed_pins(), vec![3, 17, 27]);
    }

    #[test]
    fn test_failed_build_releases_every_line() {
        let board = SimulatedBoard::new();
        let mut definitions = workshop();
        definitions.push(def("toaster", "Toaster", &[]));

        let err = DeviceTable::build(&definitions, &FactoryTable::standard(), &board).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownDeviceType {
                name: "toaster".to_string(),
                tag: "Toaster".to_string()
            }
        );
        assert!(board.claimed_pins().is_empty());
    }

    #[test]
    fn test_conflicting_lines_name_both_devices() {
        let board = SimulatedBoard::new();
        let definitions = vec![
            def("exhaust_fan", "Fan", &[("pin", Value::Integer(17))]),
            def("intake_fan", "Fan", &[("pin", Value::Integer(17))]),
        ];

        let err = DeviceTable::build(&definitions, &FactoryTable::standard(), &board).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ResourceConflict {
                resource: "GPIO 17".to_string(),
                devices: vec!["exhaust_fan".to_string(), "intake_fan".to_string()],
            }
        );
        assert!(board.claimed_pins().is_empty());
    }

    #[test]
    fn test_describe_lists_actions_and_states() {
        let board = SimulatedBoard::new();
        let table = DeviceTable::build(&workshop()[1..2], &FactoryTable::standard(), &board).unwrap();

        let doc = table.describe();
        let porch = &doc.as_array().unwrap()[0];
        let porch = porch.as_object().unwrap();
        assert_eq!(porch["kind"], Value::from("VirtualToggleButton"));
        assert_eq!(porch["states"], Value::Array(vec![Value::from("off"), Value::from("on")]));
        let actions: Vec<&str> = porch["actions"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a.as_object()?.get("name")?.as_str())
            .collect();
        assert_eq!(actions, vec!["on", "off", "state"]);
    }
}
