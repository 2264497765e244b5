/*!
 * The registry: every device, chain and event rule of one document.
 *
 * [`Registry::build`] builds the device table, then validates every chain
 * step and event rule against it. Any failure aborts the build and the
 * partially built table is dropped, releasing its hardware lines.
 */
use std::collections::HashMap;

use tracing::info;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};
use breadboard_devices::{Board, Device, DeviceTable, FactoryTable};

use crate::action::{self, ActionSpec};
use crate::chain;
use crate::document::{ChainDefinition, Document, EventAction, NetworkSettings, RuleDefinition};
use crate::error::{ChainError, DispatchError};
use crate::events::EventRule;

/// Owner of every device, chain and event rule
#[derive(Debug)]
pub struct Registry {
    pub(crate) devices: DeviceTable,
    pub(crate) chains: Vec<ChainDefinition>,
    chain_index: HashMap<String, usize>,
    pub(crate) rules: Vec<EventRule>,
    network: NetworkSettings,
}

impl Registry {
    /// Build devices on `board` and bind the document's chains and rules to them
    pub fn build(document: &Document, factory: &FactoryTable, board: &dyn Board) -> Result<Self, ConfigError> {
        let mut devices = DeviceTable::build(&document.devices, factory, board)?;

        for chain in &document.chains {
            for (i, step) in chain.steps.iter().enumerate() {
                check_spec(&devices, step, &format!("chain `{}` step {}", chain.name, i))?;
            }
        }

        let mut rules = Vec::with_capacity(document.events.len());
        for (idx, def) in document.events.iter().enumerate() {
            check_rule(&devices, idx, def)?;
            if let Some(target) = devices.stateful_mut(&def.device) {
                target.state_cell_mut().subscribe(idx);
            }
            rules.push(EventRule::from(def));
        }

        let chain_index = document
            .chains
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        info!(
            devices = devices.len(),
            chains = document.chains.len(),
            rules = rules.len(),
            "Registry ready"
        );

        Ok(Self {
            devices,
            chains: document.chains.clone(),
            chain_index,
            rules,
            network: document.network.clone(),
        })
    }

    /// A device by name
    pub fn device(&self, name: &str) -> Option<&dyn Device> {
        self.devices.get(name)
    }

    /// A chain by name
    pub fn chain(&self, name: &str) -> Option<&ChainDefinition> {
        self.chain_index.get(name).map(|&i| &self.chains[i])
    }

    /// The device table
    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    /// Chains in document order
    pub fn chains(&self) -> &[ChainDefinition] {
        &self.chains
    }

    /// Event rules in declaration order
    pub fn rules(&self) -> &[EventRule] {
        &self.rules
    }

    /// The document's network section
    pub fn network(&self) -> &NetworkSettings {
        &self.network
    }

    /// Run one device action
    pub async fn dispatch(&mut self, device: &str, action: &str, params: &Parameters) -> Result<Value, DispatchError> {
        action::dispatch(&mut self.devices, device, action, params).await
    }

    /// Run one chain
    pub async fn run_chain(&mut self, name: &str) -> Result<(), ChainError> {
        chain::run(self, name).await
    }

    /// Devices with their actions, and chains with their steps
    pub fn describe(&self) -> Value {
        let chains = self
            .chains
            .iter()
            .map(|c| {
                let steps = c
                    .steps
                    .iter()
                    .map(|s| {
                        Value::object([
                            ("device", Value::from(s.device.as_str())),
                            ("action", Value::from(s.action.as_str())),
                            ("parameters", Value::from(s.parameters.clone())),
                        ])
                    })
                    .collect::<Vec<_>>();
                Value::object([("name", Value::from(c.name.as_str())), ("steps", Value::Array(steps))])
            })
            .collect::<Vec<_>>();

        Value::object([
            ("devices", self.devices.describe()),
            ("chains", Value::Array(chains)),
            ("events", Value::from(self.rules.len())),
        ])
    }
}

fn check_spec(devices: &DeviceTable, spec: &ActionSpec, context: &str) -> Result<(), ConfigError> {
    let device = devices.get(&spec.device).ok_or_else(|| ConfigError::DanglingReference {
        context: context.to_string(),
        device: spec.device.clone(),
    })?;
    if device.action(&spec.action).is_none() {
        return Err(ConfigError::UnknownActionReference {
            context: context.to_string(),
            device: spec.device.clone(),
            action: spec.action.clone(),
        });
    }
    Ok(())
}

fn check_rule(devices: &DeviceTable, idx: usize, def: &RuleDefinition) -> Result<(), ConfigError> {
    let context = format!("event {}", idx);
    let target = devices.get(&def.device).ok_or_else(|| ConfigError::DanglingReference {
        context: context.clone(),
        device: def.device.clone(),
    })?;
    let stateful = target.as_stateful().ok_or_else(|| ConfigError::NotStateful {
        device: def.device.clone(),
    })?;
    if let Some(states) = stateful.possible_states() {
        if !states.contains(&def.state) {
            return Err(ConfigError::InvalidTriggerState {
                device: def.device.clone(),
                state: def.state.to_string(),
            });
        }
    }

    for (i, action) in def.actions.iter().enumerate() {
        if let EventAction::Device(spec) = action {
            check_spec(devices, spec, &format!("{} action {}", context, i))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadboard_devices::SimulatedBoard;
    use serde_json::json;

    fn build(doc: serde_json::Value, board: &SimulatedBoard) -> Result<Registry, ConfigError> {
        let document = Document::from_json(&doc)?;
        Registry::build(&document, &FactoryTable::standard(), board)
    }

    #[test]
    fn test_rules_subscribe_in_declaration_order() {
        let board = SimulatedBoard::new();
        let registry = build(
            json!({
                "fan": {"device": "Fan", "pin": 17},
                "porch": {"device": "VirtualToggleButton", "pin": 3},
                "hall": {"device": "VirtualToggleButton", "pin": 4},
                "events": [
                    {"device": "porch", "state": "on", "action": {"device": "fan", "action": "on"}},
                    {"device": "hall", "state": "on", "action": {"device": "fan", "action": "on"}},
                    {"device": "porch", "state": "off", "action": {"device": "fan", "action": "off"}},
                ]
            }),
            &board,
        )
        .unwrap();

        let porch = registry.devices().stateful("porch").unwrap();
        assert_eq!(porch.state_cell().observers(), &[0, 2]);
        let hall = registry.devices().stateful("hall").unwrap();
        assert_eq!(hall.state_cell().observers(), &[1]);
        assert_eq!(registry.rules().len(), 3);
        assert_eq!(registry.network().port, 80);
    }

    #[test]
    fn test_dangling_chain_step_fails_build() {
        let board = SimulatedBoard::new();
        let err = build(
            json!({
                "fan": {"device": "Fan", "pin": 17},
                "chains": {"night": [
                    {"device": "fan", "action": "off"},
                    {"device": "lights", "action": "off"},
                ]}
            }),
            &board,
        )
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::DanglingReference {
                context: "chain `night` step 1".into(),
                device: "lights".into(),
            }
        );
        assert!(board.claimed_pins().is_empty());
    }

    #[test]
    fn test_undeclared_action_fails_build() {
        let board = SimulatedBoard::new();
        let err = build(
            json!({
                "fan": {"device": "Fan", "pin": 17},
                "chains": {"night": [{"device": "fan", "action": "spin"}]}
            }),
            &board,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::UnknownActionReference { action, .. } if action == "spin"));
    }

    #[test]
    fn test_event_targets_are_validated() {
        let board = SimulatedBoard::new();
        let err = build(
            json!({
                "fan": {"device": "Fan", "pin": 17},
                "events": [{"device": "fan", "state": "on", "action": {"webhook": "http://hub.local"}}]
            }),
            &board,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::NotStateful { device: "fan".into() });

        let err = build(
            json!({
                "porch": {"device": "VirtualToggleButton", "pin": 3},
                "events": [{"device": "porch", "state": "maybe", "action": {"webhook": "http://hub.local"}}]
            }),
            &board,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidTriggerState {
                device: "porch".into(),
                state: "maybe".into(),
            }
        );
        assert!(board.claimed_pins().is_empty());
    }

    #[test]
    fn test_describe_lists_devices_and_chains() {
        let board = SimulatedBoard::new();
        let registry = build(
            json!({
                "fan": {"device": "Fan", "pin": 17},
                "chains": {"quiet": [{"device": "fan", "action": "set", "value": 10}]}
            }),
            &board,
        )
        .unwrap();

        let doc = registry.describe();
        let doc = doc.as_object().unwrap();
        assert_eq!(doc["devices"].as_array().unwrap().len(), 1);
        let chain = doc["chains"].as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(chain["name"], Value::from("quiet"));
        assert_eq!(chain["steps"].as_array().unwrap().len(), 1);
        assert!(registry.chain("quiet").is_some());
        assert!(registry.chain("loud").is_none());
    }
}
