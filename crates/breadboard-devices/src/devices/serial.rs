/*!
 * UART writer.
 */
use async_trait::async_trait;
use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};

use crate::device::{ActionDescriptor, ActionError, Device, ParameterDescriptor, ParameterKind, Result};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{Parity, SerialPort, UartConfig};
use crate::params;

/// Type tag
pub const TAG: &str = "Serial";

const ACTIONS: &[ActionDescriptor] = &[ActionDescriptor::new(
    "write",
    "Write a line to the connected serial device",
)
.with_parameters(&[ParameterDescriptor::required("message", ParameterKind::String)])];

/// A serial line to another controller or peripheral
#[derive(Debug)]
pub struct Serial {
    name: String,
    port: Box<dyn SerialPort>,
}

impl Serial {
    /// Build from `uart_id`, `baudrate` (9600), `tx_pin`, `rx_pin`, `bits`
    /// (8), `parity_bit` (none, 0 even, 1 odd), `stop_bits` (1) and
    /// `timeout` (5000 ms)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&[
            "uart_id",
            "baudrate",
            "tx_pin",
            "rx_pin",
            "bits",
            "parity_bit",
            "stop_bits",
            "timeout",
        ])?;
        let id = match def.required("uart_id")?.coerce_integer().and_then(|v| u8::try_from(v).ok()) {
            Some(id) => id,
            None => return Err(def.invalid("uart_id", "expected a UART index")),
        };
        let parity = match def.get("parity_bit").map(|v| v.coerce_integer()) {
            None => Parity::None,
            Some(Some(0)) => Parity::Even,
            Some(Some(1)) => Parity::Odd,
            Some(_) => return Err(def.invalid("parity_bit", "expected null, 0 (even) or 1 (odd)")),
        };
        let config = UartConfig {
            id,
            baudrate: def.integer_or("baudrate", 9600, 1, 4_000_000)? as u32,
            tx: def.optional_pin("tx_pin")?,
            rx: def.optional_pin("rx_pin")?,
            bits: def.integer_or("bits", 8, 7, 9)? as u8,
            parity,
            stop_bits: def.integer_or("stop_bits", 1, 1, 2)? as u8,
            timeout_ms: def.integer_or("timeout", 5000, 0, i64::from(u32::MAX))? as u32,
        };

        let port = ctx.uart(def, &config)?;
        debug!(serial = def.name(), uart = config.id, baudrate = config.baudrate, "Opened UART");
        Ok(Box::new(Serial {
            name: def.name().to_string(),
            port,
        }))
    }
}

#[async_trait]
impl Device for Serial {
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
            "write" => {
                let message = params::required_text(params, "message")?;
                let line = format!("{}\n", message);
                let written = self.port.write(line.as_bytes())?;
                debug!(serial = %self.name, bytes = written, "Wrote line");
                Ok(Value::object([("bytes_written", Value::from(written))]))
            }
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedBoard;

    fn def(params: &[(&str, Value)]) -> DeviceDefinition {
        DeviceDefinition::new(
            "console",
            TAG,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    #[tokio::test]
    async fn test_write_appends_newline() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let mut serial = Serial::build(
            &def(&[("uart_id", Value::Integer(1)), ("tx_pin", Value::Integer(4)), ("rx_pin", Value::Integer(5))]),
            &mut ctx,
        )
        .unwrap();

        let params: Parameters = [("message".to_string(), Value::from("hello"))].into_iter().collect();
        let result = serial.invoke("write", &params).await.unwrap();
        assert_eq!(result, Value::object([("bytes_written", Value::Integer(6))]));
        assert_eq!(board.serial_output(1), b"hello\n".to_vec());
        assert_eq!(board.claimed_pins(), vec![4, 5]);
    }

    #[test]
    fn test_defaults_and_parity() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let built = Serial::build(&def(&[("uart_id", Value::Integer(0)), ("parity_bit", Value::Integer(1))]), &mut ctx);
        assert!(built.is_ok());

        let err = Serial::build(&def(&[("uart_id", Value::Integer(2)), ("parity_bit", Value::Integer(3))]), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { parameter, .. } if parameter == "parity_bit"));
    }

    #[test]
    fn test_uart_is_exclusive() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let _first = Serial::build(&def(&[("uart_id", Value::Integer(0))]), &mut ctx).unwrap();
        let err = Serial::build(
            &DeviceDefinition::new("other", TAG, [("uart_id".to_string(), Value::Integer(0))].into_iter().collect()),
            &mut ctx,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ResourceConflict {
                resource: "UART 0".to_string(),
                devices: vec!["console".to_string(), "other".to_string()],
            }
        );
    }
}
