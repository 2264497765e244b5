/*!
 * DHT11 / DHT22 / AM2302 temperature and humidity sensors.
 *
 * A measurement is a 40-bit frame: humidity (16 bits, tenths of a
 * percent), temperature (sign bit plus 15 bits, tenths of a degree) and a
 * checksum byte. The sensor needs to rest between measurements, so reads
 * inside the rest time return the cached values. Unless `loop` is false the
 * sensor is also polled once per rest time, keeping the cache warm.
 */
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};
use breadboard_core::utils::seconds_to_duration;

use crate::device::{ActionDescriptor, ActionError, Device, Result};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{HumiditySensor, SensorModel};

/// Type tag of the DHT11
pub const DHT11_TAG: &str = "DHT11";

/// Type tag of the DHT22
pub const DHT22_TAG: &str = "DHT22";

/// Type tag of the AM2302 (a packaged DHT22)
pub const AM2302_TAG: &str = "AM2302";

const ACTIONS: &[ActionDescriptor] = &[ActionDescriptor::new(
    "data",
    "Read temperature and humidity; a new measurement is only taken once the sensor has rested",
)];

/// Temperature unit reported by `data`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Degrees Celsius
    Celsius,
    /// Degrees Fahrenheit
    Fahrenheit,
}

/// One decoded measurement, in Celsius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity, percent
    pub humidity: f64,
}

impl Reading {
    /// Decode and verify a raw frame
    pub fn decode(frame: [u8; 5]) -> std::result::Result<Self, String> {
        let checksum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if checksum != frame[4] {
            return Err(format!(
                "checksum validation failed (expected {:#04x}, got {:#04x})",
                checksum, frame[4]
            ));
        }
        let humidity = u16::from_be_bytes([frame[0], frame[1]]);
        let raw_temp = u16::from_be_bytes([frame[2], frame[3]]);
        let magnitude = f64::from(raw_temp & 0x7FFF) / 10.0;
        let temperature = if raw_temp & 0x8000 != 0 { -magnitude } else { magnitude };
        Ok(Reading {
            temperature,
            humidity: f64::from(humidity) / 10.0,
        })
    }

    fn temperature_in(&self, unit: Unit) -> f64 {
        match unit {
            Unit::Celsius => self.temperature,
            Unit::Fahrenheit => ((self.temperature * 9.0 / 5.0 + 32.0) * 10.0).round() / 10.0,
        }
    }
}

/// A DHT-family sensor
#[derive(Debug)]
pub struct Dht {
    name: String,
    tag: String,
    sensor: Box<dyn HumiditySensor>,
    unit: Unit,
    rest_time: Duration,
    sampling: bool,
    last: Option<(Instant, Reading)>,
}

impl Dht {
    /// Build from `pin`, `unit` (`celsius` or `fahrenheit`), `rest_time`
    /// (1 s for the DHT11, 2 s for the DHT22 and AM2302) and `loop` (true)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        Ok(Box::new(Self::new(def, ctx)?))
    }

    /// Unboxed form of [`build`](Dht::build)
    pub fn new(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Self, ConfigError> {
        def.reject_unknown(&["pin", "unit", "rest_time", "loop"])?;
        let (model, default_rest) = match def.tag() {
            DHT11_TAG => (SensorModel::Dht11, 1.0),
            _ => (SensorModel::Dht22, 2.0),
        };
        let pin = def.pin("pin")?;
        let unit = match def.optional_string("unit")?.as_deref() {
            None | Some("celsius") => Unit::Celsius,
            Some("fahrenheit") => Unit::Fahrenheit,
            Some(other) => {
                return Err(def.invalid(
                    "unit",
                    format!("`{}` is not one of: celsius, fahrenheit", other),
                ))
            }
        };
        let rest_time = seconds_to_duration(def.seconds_or("rest_time", default_rest)?)
            .ok_or_else(|| def.invalid("rest_time", "not a valid duration"))?;
        let sampling = def.bool_or("loop", true)?;

        let sensor = ctx.humidity_sensor(def, pin, model)?;
        Ok(Dht {
            name: def.name().to_string(),
            tag: def.tag().to_string(),
            sensor,
            unit,
            rest_time,
            sampling,
            last: None,
        })
    }

    /// Minimum time between measurements
    pub fn rest_time(&self) -> Duration {
        self.rest_time
    }

    /// The `data` action's result
    pub fn data(&mut self) -> Result<Value> {
        let reading = self.measure()?;
        Ok(Value::object([
            ("temperature", Value::from(reading.temperature_in(self.unit))),
            ("humidity", Value::from(reading.humidity)),
        ]))
    }

    /// The latest reading in Celsius, measuring if the sensor has rested
    pub fn measure(&mut self) -> Result<Reading> {
        let now = Instant::now();
        if let Some((at, reading)) = self.last {
            if now.duration_since(at) < self.rest_time {
                return Ok(reading);
            }
        }
        debug!(sensor = %self.name, "Taking measurement");
        let frame = self.sensor.read_frame()?;
        let reading = Reading::decode(frame).map_err(ActionError::hardware)?;
        self.last = Some((now, reading));
        Ok(reading)
    }
}

#[async_trait]
impl Device for Dht {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.tag
    }

    fn actions(&self) -> &[ActionDescriptor] {
        ACTIONS
    }

    async fn invoke(&mut self, action: &str, _params: &Parameters) -> Result<Value> {
        match action {
            "data" => self.data(),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    fn poll_interval(&self) -> Option<Duration> {
        self.sampling.then_some(self.rest_time)
    }

    async fn poll(&mut self) -> Result<()> {
        self.measure().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{HalError, SimulatedBoard};

    fn sensor(board: &SimulatedBoard, tag: &str, params: &[(&str, Value)]) -> Box<dyn Device> {
        let mut ctx = BuildContext::new(board);
        let def = DeviceDefinition::new(
            "climate",
            tag,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        );
        Dht::build(&def, &mut ctx).unwrap()
    }

    #[test]
    fn test_decode() {
        // 43.7 % and 22.6 C
        let reading = Reading::decode([0x01, 0xB5, 0x00, 0xE2, 0x98]).unwrap();
        assert_eq!(reading.humidity, 43.7);
        assert_eq!(reading.temperature, 22.6);

        // Sign bit set: -10.1 C
        let reading = Reading::decode([0x02, 0x8C, 0x80, 0x65, 0x73]).unwrap();
        assert_eq!(reading.temperature, -10.1);

        assert!(Reading::decode([0x01, 0xB5, 0x00, 0xE2, 0x99]).is_err());
    }

    #[test]
    fn test_fahrenheit_is_rounded() {
        let reading = Reading {
            temperature: 22.6,
            humidity: 0.0,
        };
        assert_eq!(reading.temperature_in(Unit::Fahrenheit), 72.7);
    }

    #[tokio::test]
    async fn test_readings_are_cached_while_resting() {
        let board = SimulatedBoard::new();
        board.push_sensor_frame(9, Ok([0x01, 0xB5, 0x00, 0xE2, 0x98]));
        let mut dht = sensor(&board, DHT22_TAG, &[("pin", Value::Integer(9))]);

        let first = dht.invoke("data", &Parameters::new()).await.unwrap();
        let second = dht.invoke("data", &Parameters::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            Value::object([("temperature", Value::Float(22.6)), ("humidity", Value::Float(43.7))])
        );
        assert_eq!(board.sensor_reads(9), 1);
        assert_eq!(dht.kind(), DHT22_TAG);
    }

    #[test_log::test(tokio::test)]
    async fn test_failures_are_hardware_faults() {
        let board = SimulatedBoard::new();
        board.push_sensor_frame(9, Ok([0x01, 0xB5, 0x00, 0xE2, 0x00]));
        board.push_sensor_frame(9, Err(HalError::Io("timeout".to_string())));
        let mut dht = sensor(
            &board,
            DHT11_TAG,
            &[("pin", Value::Integer(9)), ("rest_time", Value::Integer(0)), ("unit", Value::from("fahrenheit"))],
        );

        let err = dht.invoke("data", &Parameters::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::HardwareFault(detail) if detail.starts_with("checksum")));
        let err = tokio_test::assert_err!(dht.invoke("data", &Parameters::new()).await);
        assert!(matches!(err, ActionError::HardwareFault(_)));
        assert_eq!(board.sensor_reads(9), 2);
    }

    #[tokio::test]
    async fn test_loop_samples_on_poll() {
        let board = SimulatedBoard::new();
        board.push_sensor_frame(9, Ok([0x01, 0xB5, 0x00, 0xE2, 0x98]));
        let mut dht = sensor(&board, DHT11_TAG, &[("pin", Value::Integer(9))]);
        assert_eq!(dht.poll_interval(), Some(Duration::from_secs(1)));

        dht.poll().await.unwrap();
        assert_eq!(board.sensor_reads(9), 1);
        // Served from the sample taken by the poll
        let reading = dht.invoke("data", &Parameters::new()).await.unwrap();
        assert_eq!(
            reading,
            Value::object([("temperature", Value::Float(22.6)), ("humidity", Value::Float(43.7))])
        );
        assert_eq!(board.sensor_reads(9), 1);

        let quiet = sensor(&board, DHT22_TAG, &[("pin", Value::Integer(10)), ("loop", Value::Bool(false))]);
        assert_eq!(quiet.poll_interval(), None);
    }
}
