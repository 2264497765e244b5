/*!
 * 4-pin PWM fan.
 *
 * The fan's control input is active low: a 0% speed is written as the
 * maximum duty cycle.
 */
use async_trait::async_trait;
use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};

use crate::device::{ActionDescriptor, ActionError, Device, ParameterDescriptor, ParameterKind, Result};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{HalResult, PwmOutput};
use crate::params;

/// Type tag
pub const TAG: &str = "Fan";

const ACTIONS: &[ActionDescriptor] = &[
    ActionDescriptor::new("on", "Turn the fan on to the last set speed"),
    ActionDescriptor::new("off", "Turn off the fan"),
    ActionDescriptor::new("set", "Set the speed of the fan (0-100 percent)")
        .with_parameters(&[ParameterDescriptor::required("value", ParameterKind::Integer)]),
];

/// A PWM-controlled fan
#[derive(Debug)]
pub struct Fan {
    name: String,
    pwm: Box<dyn PwmOutput>,
    speed: u8,
    max_duty_cycle: u16,
}

impl Fan {
    /// Build from `pin`, `freq` (25000), `idle` (25) and `max_duty_cycle` (65530)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&["pin", "freq", "idle", "max_duty_cycle"])?;
        let pin = def.pin("pin")?;
        let freq = def.integer_or("freq", 25_000, 1, 1_000_000)? as u32;
        let idle = def.integer_or("idle", 25, 0, 100)? as u8;
        let max_duty_cycle = def.integer_or("max_duty_cycle", 65_530, 0, i64::from(u16::MAX))? as u16;

        let mut pwm = ctx.pwm(def, pin)?;
        pwm.set_frequency(freq).map_err(|e| def.hardware(e))?;

        let mut fan = Fan {
            name: def.name().to_string(),
            pwm,
            speed: idle,
            max_duty_cycle,
        };
        fan.apply(idle).map_err(|e| def.hardware(e))?;
        Ok(Box::new(fan))
    }

    /// Duty cycle written for a speed percentage
    pub fn duty_for(speed: u8, max_duty_cycle: u16) -> u16 {
        let inverted = f64::from(100 - speed.min(100)) / 100.0;
        (inverted * f64::from(max_duty_cycle)).round() as u16
    }

    fn apply(&mut self, speed: u8) -> HalResult<()> {
        debug!(fan = %self.name, speed, "Set fan speed");
        self.pwm.set_duty_u16(Self::duty_for(speed, self.max_duty_cycle))
    }
}

#[async_trait]
impl Device for Fan {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        TAG
    }

    fn actions(&self) -> &[ActionDescriptor] {
        ACTIONS
    }

    async fn invoke(&mut self, action: &str, params: &Parameters) -> Result<Value> {
        match action {
            "on" => self.apply(self.speed)?,
            "off" => self.apply(0)?,
            "set" => {
                let speed = params::required_percent(params, "value")?;
                self.speed = speed;
                self.apply(speed)?;
            }
            other => return Err(ActionError::UnknownAction(other.to_string())),
        }
        Ok(Value::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedBoard;

    fn fan(board: &SimulatedBoard, params: &[(&str, Value)]) -> Box<dyn Device> {
        let mut ctx = BuildContext::new(board);
        let def = DeviceDefinition::new(
            "exhaust_fan",
            TAG,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        );
        Fan::build(&def, &mut ctx).unwrap()
    }

    #[test]
    fn test_duty_is_inverted() {
        assert_eq!(Fan::duty_for(0, 65530), 65530);
        assert_eq!(Fan::duty_for(100, 65530), 0);
        assert_eq!(Fan::duty_for(25, 65530), 49148);
        assert_eq!(Fan::duty_for(40, 1000), 600);
    }

    #[tokio::test]
    async fn test_starts_at_idle_speed() {
        let board = SimulatedBoard::new();
        let _fan = fan(&board, &[("pin", Value::Integer(17))]);

        let pwm = board.pwm_state(17).unwrap();
        assert_eq!(pwm.frequency, 25_000);
        assert_eq!(pwm.duty, Fan::duty_for(25, 65530));
    }

    #[tokio::test]
    async fn test_set_off_on_restores_speed() {
        let board = SimulatedBoard::new();
        let mut fan = fan(&board, &[("pin", Value::Integer(17)), ("max_duty_cycle", Value::Integer(1000))]);

        let params: Parameters = [("value".to_string(), Value::from("40"))].into_iter().collect();
        assert_eq!(fan.invoke("set", &params).await, Ok(Value::empty()));
        assert_eq!(board.pwm_state(17).unwrap().duty, 600);

        fan.invoke("off", &Parameters::new()).await.unwrap();
        assert_eq!(board.pwm_state(17).unwrap().duty, 1000);

        fan.invoke("on", &Parameters::new()).await.unwrap();
        assert_eq!(board.pwm_state(17).unwrap().duty, 600);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let board = SimulatedBoard::new();
        let mut fan = fan(&board, &[("pin", Value::Integer(17))]);

        let params: Parameters = [("value".to_string(), Value::Integer(150))].into_iter().collect();
        assert!(matches!(
            fan.invoke("set", &params).await,
            Err(ActionError::InvalidParameter { name, .. }) if name == "value"
        ));
        assert_eq!(
            fan.invoke("spin", &Parameters::new()).await,
            Err(ActionError::UnknownAction("spin".to_string()))
        );
    }
}
