/*!
 * Multi-position selector switch.
 *
 * `state_pin_mapping` maps each named position to the input line that is
 * high in that position, and exactly one position to `"off"`: the state
 * when no line is high.
 */
use std::time::Duration;

use async_trait::async_trait;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};
use breadboard_core::utils::seconds_to_duration;

use crate::device::{ActionDescriptor, ActionError, Device, Result, StateCell, StatefulDevice, STATE_ACTION};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{InputPin, PinId, Pull};

/// Type tag
pub const TAG: &str = "Switch";

/// Mapping value marking the position with no active line
pub const OFF_MARKER: &str = "off";

const ACTIONS: &[ActionDescriptor] = &[STATE_ACTION];

#[derive(Debug)]
struct Position {
    state: String,
    input: Box<dyn InputPin>,
}

/// A selector switch
#[derive(Debug)]
pub struct Switch {
    cell: StateCell,
    // Ordered by line number.
    positions: Vec<Position>,
    off_state: String,
    poll_sleep: Duration,
}

impl Switch {
    /// Build from `state_pin_mapping` and `poll_sleep` (0.1 s)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&["state_pin_mapping", "poll_sleep"])?;
        let mapping = match def.required("state_pin_mapping")? {
            Value::Object(entries) => entries,
            other => {
                return Err(def.invalid(
                    "state_pin_mapping",
                    format!("expected an object, got {}", other.type_name()),
                ))
            }
        };
        let poll_sleep = seconds_to_duration(def.seconds_or("poll_sleep", 0.1)?)
            .ok_or_else(|| def.invalid("poll_sleep", "not a valid duration"))?;

        let mut off_states = Vec::new();
        let mut lines: Vec<(PinId, &String)> = Vec::new();
        for (state, target) in mapping {
            match target {
                Value::String(marker) if marker == OFF_MARKER => off_states.push(state.clone()),
                other => {
                    let pin = other
                        .coerce_integer()
                        .and_then(|p| PinId::try_from(p).ok())
                        .ok_or_else(|| {
                            def.invalid(
                                "state_pin_mapping",
                                format!("`{}` for state `{}` is neither a GPIO number nor \"off\"", other, state),
                            )
                        })?;
                    lines.push((pin, state));
                }
            }
        }
        off_states.sort();
        let off_state = match off_states.as_slice() {
            [one] => one.clone(),
            [] => return Err(def.invalid("state_pin_mapping", "no state is mapped to \"off\"")),
            many => {
                return Err(def.invalid(
                    "state_pin_mapping",
                    format!("states {} are all mapped to \"off\"", many.join(", ")),
                ))
            }
        };
        lines.sort();

        let mut positions = Vec::with_capacity(lines.len());
        let mut initial: Option<&str> = None;
        for (pin, state) in lines {
            let input = ctx.input(def, pin, Pull::Down)?;
            if input.is_high().map_err(|e| def.hardware(e))? {
                if let Some(first) = initial {
                    return Err(def.invalid(
                        "state_pin_mapping",
                        format!("multiple states are active: {}, {}", first, state),
                    ));
                }
                initial = Some(state);
            }
            positions.push(Position {
                state: state.clone(),
                input,
            });
        }

        let initial = initial.unwrap_or(&off_state).to_string();
        Ok(Box::new(Switch {
            cell: StateCell::new(def.name(), Value::from(initial)),
            positions,
            off_state,
            poll_sleep,
        }))
    }
}

#[async_trait]
impl Device for Switch {
    fn name(&self) -> &str {
        self.cell.device()
    }

    fn kind(&self) -> &str {
        TAG
    }

    fn actions(&self) -> &[ActionDescriptor] {
        ACTIONS
    }

    async fn invoke(&mut self, action: &str, _params: &Parameters) -> Result<Value> {
        match action {
            "state" => Ok(self.cell.to_response()),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(self.poll_sleep)
    }

    /// The first active line whose position differs from the current state
    /// wins. With no line active the switch is off.
    async fn poll(&mut self) -> Result<()> {
        let mut any_active = false;
        let mut next = None;
        for position in &self.positions {
            if position.input.is_high()? {
                any_active = true;
                if self.cell.current().as_str() != Some(position.state.as_str()) {
                    next = Some(position.state.clone());
                    break;
                }
            }
        }
        match next {
            Some(state) => {
                self.cell.set(Value::from(state));
            }
            None if !any_active => {
                self.cell.set(Value::from(self.off_state.as_str()));
            }
            None => {}
        }
        Ok(())
    }

    fn as_stateful(&self) -> Option<&dyn StatefulDevice> {
        Some(self)
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulDevice> {
        Some(self)
    }
}

impl StatefulDevice for Switch {
    fn state_cell(&self) -> &StateCell {
        &self.cell
    }

    fn state_cell_mut(&mut self) -> &mut StateCell {
        &mut self.cell
    }

    fn possible_states(&self) -> Option<Vec<Value>> {
        let mut states: Vec<Value> = self
            .positions
            .iter()
            .map(|p| Value::from(p.state.as_str()))
            .collect();
        states.push(Value::from(self.off_state.as_str()));
        Some(states)
    }
}
