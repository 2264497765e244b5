/*!
 * Buttons: physical toggle and momentary buttons, and a virtual toggle
 * driven through actions.
 *
 * All three are stateful with the states `off` and `on`.
 */
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};
use breadboard_core::utils::seconds_to_duration;

use crate::device::{
    on_off_states, ActionDescriptor, ActionError, Device, Result, StateCell, StatefulDevice,
    STATE_ACTION,
};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{InputPin, OutputPin, Pull};

/// Type tag of [`ToggleButton`]
pub const TOGGLE_TAG: &str = "ToggleButton";

/// Type tag of [`MomentaryButton`]
pub const MOMENTARY_TAG: &str = "MomentaryButton";

/// Type tag of [`VirtualToggleButton`]
pub const VIRTUAL_TAG: &str = "VirtualToggleButton";

const OFF: &str = "off";
const ON: &str = "on";

const PHYSICAL_ACTIONS: &[ActionDescriptor] = &[STATE_ACTION];

const VIRTUAL_ACTIONS: &[ActionDescriptor] = &[
    ActionDescriptor::new("on", "Turn on the virtual button"),
    ActionDescriptor::new("off", "Turn off the virtual button"),
    STATE_ACTION,
];

fn state_for(high: bool) -> Value {
    Value::from(if high { ON } else { OFF })
}

fn poll_sleep(def: &DeviceDefinition) -> std::result::Result<Duration, ConfigError> {
    let secs = def.seconds_or("poll_sleep", 0.1)?;
    seconds_to_duration(secs).ok_or_else(|| def.invalid("poll_sleep", "not a valid duration"))
}

/// A latching button: the state follows the input line
#[derive(Debug)]
pub struct ToggleButton {
    input: Box<dyn InputPin>,
    cell: StateCell,
    poll_sleep: Duration,
}

impl ToggleButton {
    /// Build from `pin` and `poll_sleep` (0.1 s); the line is pulled down
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&["pin", "poll_sleep"])?;
        let pin = def.pin("pin")?;
        let poll_sleep = poll_sleep(def)?;
        let input = ctx.input(def, pin, Pull::Down)?;
        let initial = input.is_high().map_err(|e| def.hardware(e))?;
        Ok(Box::new(ToggleButton {
            input,
            cell: StateCell::new(def.name(), state_for(initial)),
            poll_sleep,
        }))
    }
}

#[async_trait]
impl Device for ToggleButton {
    fn name(&self) -> &str {
        self.cell.device()
    }

    fn kind(&self) -> &str {
        TOGGLE_TAG
    }

    fn actions(&self) -> &[ActionDescriptor] {
        PHYSICAL_ACTIONS
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

    async fn poll(&mut self) -> Result<()> {
        let high = self.input.is_high()?;
        self.cell.set(state_for(high));
        Ok(())
    }

    fn as_stateful(&self) -> Option<&dyn StatefulDevice> {
        Some(self)
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulDevice> {
        Some(self)
    }
}

impl StatefulDevice for ToggleButton {
    fn state_cell(&self) -> &StateCell {
        &self.cell
    }

    fn state_cell_mut(&mut self) -> &mut StateCell {
        &mut self.cell
    }

    fn possible_states(&self) -> Option<Vec<Value>> {
        Some(on_off_states())
    }
}

/// How a momentary button maps presses to state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonMode {
    /// Each press flips the state
    Toggle,
    /// The state is `on` while held
    Momentary,
}

impl ButtonMode {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "toggle" => Some(ButtonMode::Toggle),
            "momentary" => Some(ButtonMode::Momentary),
            _ => None,
        }
    }
}

/// A spring-return button
#[derive(Debug)]
pub struct MomentaryButton {
    input: Box<dyn InputPin>,
    cell: StateCell,
    mode: ButtonMode,
    poll_sleep: Duration,
    debounce: Duration,
    last_press: Option<Instant>,
}

impl MomentaryButton {
    /// Build from `pin`, `mode` (`toggle` or `momentary`), `poll_sleep`
    /// (0.1 s) and `button_debounce` (0.5 s)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&["pin", "mode", "poll_sleep", "button_debounce"])?;
        let pin = def.pin("pin")?;
        let mode = match def.required("mode")? {
            Value::String(name) => ButtonMode::parse(name)
                .ok_or_else(|| def.invalid("mode", format!("`{}` is not one of: toggle, momentary", name)))?,
            other => return Err(def.invalid("mode", format!("expected a string, got {}", other.type_name()))),
        };
        let poll_sleep = poll_sleep(def)?;
        let debounce = seconds_to_duration(def.seconds_or("button_debounce", 0.5)?)
            .ok_or_else(|| def.invalid("button_debounce", "not a valid duration"))?;

        let input = ctx.input(def, pin, Pull::Down)?;
        let initial = input.is_high().map_err(|e| def.hardware(e))?;
        Ok(Box::new(MomentaryButton {
            input,
            cell: StateCell::new(def.name(), state_for(initial)),
            mode,
            poll_sleep,
            debounce,
            last_press: None,
        }))
    }

    fn flip(&mut self) {
        let next = if self.cell.current().as_str() == Some(ON) { OFF } else { ON };
        self.cell.set(Value::from(next));
    }
}

#[async_trait]
impl Device for MomentaryButton {
    fn name(&self) -> &str {
        self.cell.device()
    }

    fn kind(&self) -> &str {
        MOMENTARY_TAG
    }

    fn actions(&self) -> &[ActionDescriptor] {
        PHYSICAL_ACTIONS
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

    async fn poll(&mut self) -> Result<()> {
        let high = self.input.is_high()?;
        match self.mode {
            ButtonMode::Momentary => {
                self.cell.set(state_for(high));
            }
            ButtonMode::Toggle if high => {
                let now = Instant::now();
                let settled = self
                    .last_press
                    .map_or(true, |last| now.duration_since(last) >= self.debounce);
                if settled {
                    self.last_press = Some(now);
                    self.flip();
                } else {
                    debug!(button = %self.cell.device(), "Press ignored while bouncing");
                }
            }
            ButtonMode::Toggle => {}
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

impl StatefulDevice for MomentaryButton {
    fn state_cell(&self) -> &StateCell {
        &self.cell
    }

    fn state_cell_mut(&mut self) -> &mut StateCell {
        &mut self.cell
    }

    fn possible_states(&self) -> Option<Vec<Value>> {
        Some(on_off_states())
    }
}

/// A button with no physical input; `on` and `off` drive an output line
#[derive(Debug)]
pub struct VirtualToggleButton {
    output: Box<dyn OutputPin>,
    cell: StateCell,
}

impl VirtualToggleButton {
    /// Build from `pin` and `default_value` (`off` or `on`, default `off`)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&["pin", "default_value"])?;
        let pin = def.pin("pin")?;
        let initial = match def.optional_string("default_value")?.as_deref() {
            None | Some(OFF) => OFF,
            Some(ON) => ON,
            Some(other) => {
                return Err(def.invalid(
                    "default_value",
                    format!("`{}` is not one of: off, on", other),
                ))
            }
        };
        let output = ctx.output(def, pin, initial == ON)?;
        Ok(Box::new(VirtualToggleButton {
            output,
            cell: StateCell::new(def.name(), Value::from(initial)),
        }))
    }

    fn switch(&mut self, on: bool) -> Result<Value> {
        self.output.set(on)?;
        self.cell.set(state_for(on));
        Ok(self.cell.to_response())
    }
}

#[async_trait]
impl Device for VirtualToggleButton {
    fn name(&self) -> &str {
        self.cell.device()
    }

    fn kind(&self) -> &str {
        VIRTUAL_TAG
    }

    fn actions(&self) -> &[ActionDescriptor] {
        VIRTUAL_ACTIONS
    }

    async fn invoke(&mut self, action: &str, _params: &Parameters) -> Result<Value> {
        match action {
            "on" => self.switch(true),
            "off" => self.switch(false),
            "state" => Ok(self.cell.to_response()),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    fn as_stateful(&self) -> Option<&dyn StatefulDevice> {
        Some(self)
    }

    fn as_stateful_mut(&mut self) -> Option<&mut dyn StatefulDevice> {
        Some(self)
    }
}

impl StatefulDevice for VirtualToggleButton {
    fn state_cell(&self) -> &StateCell {
        &self.cell
    }

    fn state_cell_mut(&mut self) -> &mut StateCell {
        &mut self.cell
    }

    fn possible_states(&self) -> Option<Vec<Value>> {
        Some(on_off_states())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedBoard;

    fn def(tag: &str, params: &[(&str, Value)]) -> DeviceDefinition {
        DeviceDefinition::new(
            "button",
            tag,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    #[tokio::test]
    async fn test_toggle_button_follows_input() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let mut button = ToggleButton::build(&def(TOGGLE_TAG, &[("pin", Value::Integer(5))]), &mut ctx).unwrap();

        let stateful = button.as_stateful_mut().unwrap();
        assert_eq!(stateful.current_state(), &Value::from("off"));
        assert_eq!(stateful.poll_interval(), Some(Duration::from_millis(100)));

        board.set_input(5, true);
        stateful.poll().await.unwrap();
        stateful.poll().await.unwrap();
        board.set_input(5, false);
        stateful.poll().await.unwrap();

        let changes = stateful.state_cell_mut().take_changes();
        let seen: Vec<&Value> = changes.iter().map(|c| &c.to).collect();
        assert_eq!(seen, vec![&Value::from("on"), &Value::from("off")]);

        assert_eq!(
            button.invoke("state", &Parameters::new()).await,
            Ok(Value::object([("state", Value::from("off"))]))
        );
    }

    #[tokio::test]
    async fn test_momentary_button_in_toggle_mode_debounces() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let mut button = MomentaryButton::build(
            &def(
                MOMENTARY_TAG,
                &[
                    ("pin", Value::Integer(6)),
                    ("mode", Value::from("toggle")),
                    ("button_debounce", Value::Integer(60)),
                ],
            ),
            &mut ctx,
        )
        .unwrap();
        let stateful = button.as_stateful_mut().unwrap();

        board.set_input(6, true);
        stateful.poll().await.unwrap();
        assert_eq!(stateful.current_state(), &Value::from("on"));

        // Still held, inside the debounce window.
        stateful.poll().await.unwrap();
        board.set_input(6, false);
        stateful.poll().await.unwrap();
        assert_eq!(stateful.current_state(), &Value::from("on"));
        assert_eq!(stateful.state_cell_mut().take_changes().len(), 1);
    }

    #[tokio::test]
    async fn test_momentary_button_without_debounce_flips_per_press() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let mut button = MomentaryButton::build(
            &def(
                MOMENTARY_TAG,
                &[
                    ("pin", Value::Integer(6)),
                    ("mode", Value::from("toggle")),
                    ("button_debounce", Value::Integer(0)),
                ],
            ),
            &mut ctx,
        )
        .unwrap();
        let stateful = button.as_stateful_mut().unwrap();

        board.set_input(6, true);
        stateful.poll().await.unwrap();
        stateful.poll().await.unwrap();
        assert_eq!(stateful.current_state(), &Value::from("off"));
        assert_eq!(stateful.state_cell_mut().take_changes().len(), 2);
    }

    #[tokio::test]
    async fn test_momentary_mode_follows_input() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let mut button = MomentaryButton::build(
            &def(MOMENTARY_TAG, &[("pin", Value::Integer(6)), ("mode", Value::from("momentary"))]),
            &mut ctx,
        )
        .unwrap();
        let stateful = button.as_stateful_mut().unwrap();

        board.set_input(6, true);
        stateful.poll().await.unwrap();
        assert_eq!(stateful.current_state(), &Value::from("on"));
        board.set_input(6, false);
        stateful.poll().await.unwrap();
        assert_eq!(stateful.current_state(), &Value::from("off"));
    }

    #[test]
    fn test_momentary_button_requires_known_mode() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);

        let err = MomentaryButton::build(&def(MOMENTARY_TAG, &[("pin", Value::Integer(6))]), &mut ctx).unwrap_err();
        assert_eq!(err, ConfigError::missing("button", "mode"));

        let err = MomentaryButton::build(
            &def(MOMENTARY_TAG, &[("pin", Value::Integer(6)), ("mode", Value::from("latched"))]),
            &mut ctx,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { parameter, .. } if parameter == "mode"));
        assert!(!board.is_claimed(6));
    }

    #[test_log::test(tokio::test)]
    async fn test_virtual_button_drives_output_and_records_transitions() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let mut button = VirtualToggleButton::build(
            &def(VIRTUAL_TAG, &[("pin", Value::Integer(3)), ("default_value", Value::from("on"))]),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(board.level(3), Some(true));

        let off = button.invoke("off", &Parameters::new()).await.unwrap();
        assert_eq!(off, Value::object([("state", Value::from("off"))]));
        tokio_test::assert_ok!(button.invoke("off", &Parameters::new()).await);
        assert_eq!(board.pin_history(3), vec![true, false, false]);

        let changes = button.as_stateful_mut().unwrap().state_cell_mut().take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, Value::from("on"));
    }

    #[test]
    fn test_virtual_button_rejects_bad_default() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let err = VirtualToggleButton::build(
            &def(VIRTUAL_TAG, &[("pin", Value::Integer(3)), ("default_value", Value::from("maybe"))]),
            &mut ctx,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::invalid("button", "default_value", "`maybe` is not one of: off, on")
        );
    }
}
