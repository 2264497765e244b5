/*!
 * CCS811 air quality sensor (eCO2 and TVOC) on an I2C bus.
 *
 * The sensor boots into its bootloader; after a software reset the build
 * starts the measurement application when the status register reports a
 * valid image, then selects the configured drive mode. An optional DHT
 * sensor supplies temperature and humidity, which are written to the
 * environment register once per rest time so the algorithm can compensate.
 */
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};

use crate::device::{ActionDescriptor, ActionError, Device, ParameterDescriptor, ParameterKind, Result};
use crate::devices::dht::{self, Dht};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::I2cBus;
use crate::params;

/// Type tag
pub const TAG: &str = "CCS811";

/// Addresses the sensor answers on, depending on its ADDR line
pub const ADDRESSES: [u8; 2] = [0x5A, 0x5B];

const STATUS_REG: u8 = 0x00;
const MEAS_MODE_REG: u8 = 0x01;
const ALG_RESULT_REG: u8 = 0x02;
const ENV_DATA_REG: u8 = 0x04;
const ERROR_ID_REG: u8 = 0xE0;
const APP_START_REG: u8 = 0xF4;
const SW_RESET_REG: u8 = 0xFF;

const RESET_SEQUENCE: [u8; 4] = [0x11, 0xE5, 0x72, 0x8A];

/// Time the sensor needs after a reset or application start
const SETTLE_TIME: Duration = Duration::from_millis(100);

const DATA_ACTION: ActionDescriptor = ActionDescriptor::new(
    "data",
    "Read eCO2 (ppm) and TVOC (ppb), optionally with the status and error flags",
)
.with_parameters(&[
    ParameterDescriptor::optional("status", ParameterKind::Boolean),
    ParameterDescriptor::optional("error", ParameterKind::Boolean),
]);

const ACTIONS: &[ActionDescriptor] = &[DATA_ACTION];

const DEBUG_ACTIONS: &[ActionDescriptor] = &[
    DATA_ACTION,
    ActionDescriptor::new(
        "mode",
        "Set the drive mode (0-3), or read the measurement mode when no mode is given",
    )
    .with_parameters(&[ParameterDescriptor::optional("mode", ParameterKind::Integer)]),
    ActionDescriptor::new("status", "Read the status register"),
    ActionDescriptor::new("error", "Read the error register"),
];

fn status_flags(byte: u8) -> [(&'static str, Value); 4] {
    [
        ("fw_mode", Value::Bool(byte >> 7 & 1 == 1)),
        ("app_valid", Value::Bool(byte >> 4 & 1 == 1)),
        ("data_ready", Value::Bool(byte >> 3 & 1 == 1)),
        ("error", Value::Bool(byte & 1 == 1)),
    ]
}

fn error_flags(byte: u8) -> [(&'static str, Value); 6] {
    [
        ("WRITE_REG_INVALID", Value::Bool(byte & 1 == 1)),
        ("READ_REG_INVALID", Value::Bool(byte >> 1 & 1 == 1)),
        ("MEASMODE_INVALID", Value::Bool(byte >> 2 & 1 == 1)),
        ("MAX_RESISTANCE", Value::Bool(byte >> 3 & 1 == 1)),
        ("HEATER_FAULT", Value::Bool(byte >> 4 & 1 == 1)),
        ("HEATER_SUPPLY", Value::Bool(byte >> 5 & 1 == 1)),
    ]
}

fn mode_byte(mode: u8) -> u8 {
    (mode << 4) & 0x70
}

/// Environment register encoding: humidity and temperature + 25 C, both
/// in 1/512 units
fn environment_bytes(reading: &dht::Reading) -> [u8; 4] {
    let humidity = (reading.humidity * 512.0).round().clamp(0.0, f64::from(u16::MAX)) as u32;
    let temperature = ((reading.temperature + 25.0) * 512.0)
        .round()
        .clamp(0.0, f64::from(u16::MAX)) as u32;
    (humidity << 16 | temperature).to_be_bytes()
}

/// A CCS811 sensor
#[derive(Debug)]
pub struct Ccs811 {
    name: String,
    bus: Box<dyn I2cBus>,
    address: u8,
    compensation: Option<Dht>,
    debug_actions: bool,
}

impl Ccs811 {
    /// Build from `sda`, `scl`, `mode` (1), `compensation_device` (an
    /// object naming a DHT11, DHT22 or AM2302 under `device`, plus that
    /// sensor's parameters) and `show_debug_endpoints` (false)
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&["sda", "scl", "mode", "compensation_device", "show_debug_endpoints"])?;
        let sda = def.pin("sda")?;
        let scl = def.pin("scl")?;
        let mode = def.integer_or("mode", 1, 0, 3)? as u8;
        let debug_actions = def.bool_or("show_debug_endpoints", false)?;

        let mut bus = ctx.i2c(def, sda, scl)?;
        let found = bus.scan().map_err(|e| def.hardware(e))?;
        let address = found
            .into_iter()
            .find(|addr| ADDRESSES.contains(addr))
            .ok_or_else(|| ConfigError::Hardware {
                device: def.name().to_string(),
                detail: format!("no CCS811 answered on GPIO {}/{}", sda, scl),
            })?;
        debug!(device = %def.name(), address = %format!("{:#04x}", address), "Found sensor");

        bus.write_register(address, SW_RESET_REG, &RESET_SEQUENCE)
            .map_err(|e| def.hardware(e))?;
        bus.settle(SETTLE_TIME);
        let mut status = [0u8; 1];
        bus.read_register(address, STATUS_REG, &mut status)
            .map_err(|e| def.hardware(e))?;
        let app_valid = status[0] >> 4 & 1 == 1;
        let error = status[0] & 1 == 1;
        if app_valid && !error {
            bus.write_register(address, APP_START_REG, &[])
                .map_err(|e| def.hardware(e))?;
            bus.settle(SETTLE_TIME);
            bus.write_register(address, MEAS_MODE_REG, &[mode_byte(mode)])
                .map_err(|e| def.hardware(e))?;
            debug!(device = %def.name(), mode, "Sensor ready");
        } else {
            warn!(device = %def.name(), status = status[0], "Sensor application not started");
        }

        let compensation = match def.get("compensation_device") {
            None | Some(Value::Null) => None,
            Some(Value::Object(entries)) => Some(Self::compensation(def, entries, ctx)?),
            Some(other) => {
                return Err(def.invalid(
                    "compensation_device",
                    format!("expected an object, got {}", other.type_name()),
                ))
            }
        };

        Ok(Box::new(Ccs811 {
            name: def.name().to_string(),
            bus,
            address,
            compensation,
            debug_actions,
        }))
    }

    fn compensation(
        def: &DeviceDefinition,
        entries: &HashMap<String, Value>,
        ctx: &mut BuildContext<'_>,
    ) -> std::result::Result<Dht, ConfigError> {
        let mut params = entries.clone();
        let tag = match params.remove("device") {
            Some(Value::String(tag)) if matches!(tag.as_str(), dht::DHT11_TAG | dht::DHT22_TAG | dht::AM2302_TAG) => tag,
            Some(other) => {
                return Err(def.invalid(
                    "compensation_device",
                    format!("`{}` is not one of: DHT11, DHT22, AM2302", other),
                ))
            }
            None => return Err(def.invalid("compensation_device", "expected a `device` key")),
        };
        // Sampled by this sensor's own poll
        params.insert("loop".to_string(), Value::Bool(false));
        let sensor = DeviceDefinition::new(format!("{}_temp", def.name()), tag, params);
        Dht::new(&sensor, ctx)
    }

    fn read_byte(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.bus.read_register(self.address, reg, &mut buf)?;
        Ok(buf[0])
    }

    fn data(&mut self, params: &Parameters) -> Result<Value> {
        let with_status = params::flag(params, "status")?;
        let with_error = params::flag(params, "error")?;
        let mut alg = [0u8; 8];
        self.bus.read_register(self.address, ALG_RESULT_REG, &mut alg)?;

        let mut result: HashMap<String, Value> = HashMap::new();
        result.insert("eCO2".to_string(), Value::from(i64::from(u16::from_be_bytes([alg[0], alg[1]]))));
        result.insert("TVOC".to_string(), Value::from(i64::from(u16::from_be_bytes([alg[2], alg[3]]))));
        if let Some(sensor) = self.compensation.as_mut() {
            if let Value::Object(climate) = sensor.data()? {
                result.extend(climate);
            }
        }
        if with_status {
            result.extend(status_flags(alg[4]).map(|(k, v)| (k.to_string(), v)));
        }
        if with_error {
            result.extend(error_flags(alg[5]).map(|(k, v)| (k.to_string(), v)));
        }
        Ok(Value::Object(result))
    }

    fn mode(&mut self, params: &Parameters) -> Result<Value> {
        match params::integer_in(params, "mode", 0..=4)? {
            Some(4) => Err(ActionError::invalid("mode", "mode 4 is not supported")),
            Some(mode) => {
                self.bus
                    .write_register(self.address, MEAS_MODE_REG, &[mode_byte(mode as u8)])?;
                Ok(Value::Integer(mode))
            }
            None => {
                let byte = self.read_byte(MEAS_MODE_REG)?;
                Ok(Value::object([
                    ("drive_mode", Value::from(byte >> 4)),
                    ("interrupt_data_ready", Value::Bool(byte >> 3 & 1 == 1)),
                ]))
            }
        }
    }
}

#[async_trait]
impl Device for Ccs811 {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        TAG
    }

    fn actions(&self) -> &[ActionDescriptor] {
        if self.debug_actions {
            DEBUG_ACTIONS
        } else {
            ACTIONS
        }
    }

    async fn invoke(&mut self, action: &str, params: &Parameters) -> Result<Value> {
        match action {
            "data" => self.data(params),
            "mode" if self.debug_actions => self.mode(params),
            "status" if self.debug_actions => {
                let byte = self.read_byte(STATUS_REG)?;
                Ok(Value::object(status_flags(byte)))
            }
            "error" if self.debug_actions => {
                let byte = self.read_byte(ERROR_ID_REG)?;
                Ok(Value::object(error_flags(byte)))
            }
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    fn poll_interval(&self) -> Option<Duration> {
        self.compensation.as_ref().map(Dht::rest_time)
    }

    async fn poll(&mut self) -> Result<()> {
        let Some(sensor) = self.compensation.as_mut() else {
            return Ok(());
        };
        let reading = sensor.measure()?;
        self.bus
            .write_register(self.address, ENV_DATA_REG, &environment_bytes(&reading))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedBoard;

    const SDA: u8 = 20;
    const SCL: u8 = 21;

    fn definition(params: &[(&str, Value)]) -> DeviceDefinition {
        let mut entries: Parameters = params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        entries.insert("sda".to_string(), Value::Integer(SDA.into()));
        entries.insert("scl".to_string(), Value::Integer(SCL.into()));
        DeviceDefinition::new("air", TAG, entries)
    }

    fn sensor(board: &SimulatedBoard, params: &[(&str, Value)]) -> Box<dyn Device> {
        let mut ctx = BuildContext::new(board);
        Ccs811::build(&definition(params), &mut ctx).unwrap()
    }

    fn ready_board() -> SimulatedBoard {
        let board = SimulatedBoard::new();
        board.attach_i2c_device(0x5B);
        board.set_i2c_register(0x5B, STATUS_REG, &[0x10]);
        board
    }

    fn names(device: &dyn Device) -> Vec<&str> {
        device.actions().iter().map(|a| a.name).collect()
    }

    #[test]
    fn test_build_resets_and_starts_the_application() {
        let board = ready_board();
        let air = sensor(&board, &[("mode", Value::Integer(2))]);
        assert_eq!(
            board.i2c_writes(0x5B),
            vec![
                (SW_RESET_REG, RESET_SEQUENCE.to_vec()),
                (APP_START_REG, vec![]),
                (MEAS_MODE_REG, vec![0x20]),
            ]
        );
        assert_eq!(names(air.as_ref()), vec!["data"]);
        assert_eq!(air.kind(), TAG);
        assert_eq!(air.poll_interval(), None);
        assert_eq!(board.claimed_pins(), vec![SDA, SCL]);
    }

    #[test]
    fn test_invalid_application_is_left_in_boot_mode() {
        let board = SimulatedBoard::new();
        board.attach_i2c_device(0x5A);
        board.set_i2c_register(0x5A, STATUS_REG, &[0x11]);
        sensor(&board, &[]);
        assert_eq!(board.i2c_writes(0x5A), vec![(SW_RESET_REG, RESET_SEQUENCE.to_vec())]);
    }

    #[test]
    fn test_absent_sensor_fails_the_build() {
        let board = SimulatedBoard::new();
        board.attach_i2c_device(0x3C);
        let mut ctx = BuildContext::new(&board);
        let err = Ccs811::build(&definition(&[]), &mut ctx).unwrap_err();
        assert!(matches!(err, ConfigError::Hardware { ref device, .. } if device == "air"));
        assert!(board.claimed_pins().is_empty());

        let mut ctx = BuildContext::new(&board);
        let err = Ccs811::build(&definition(&[("mode", Value::Integer(4))]), &mut ctx).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { ref parameter, .. } if parameter == "mode"));
    }

    #[tokio::test]
    async fn test_data_decodes_the_algorithm_results() {
        let board = ready_board();
        board.set_i2c_register(0x5B, ALG_RESULT_REG, &[0x01, 0x90, 0x00, 0x2A, 0x98, 0x05, 0x00, 0x00]);
        let mut air = sensor(&board, &[]);

        let plain = air.invoke("data", &Parameters::new()).await.unwrap();
        assert_eq!(
            plain,
            Value::object([("eCO2", Value::Integer(400)), ("TVOC", Value::Integer(42))])
        );

        let params: Parameters = [
            ("status".to_string(), Value::Bool(true)),
            ("error".to_string(), Value::from("true")),
        ]
        .into_iter()
        .collect();
        let Value::Object(full) = air.invoke("data", &params).await.unwrap() else {
            panic!("data is an object");
        };
        assert_eq!(full.len(), 12);
        assert_eq!(full["fw_mode"], Value::Bool(true));
        assert_eq!(full["data_ready"], Value::Bool(true));
        assert_eq!(full["error"], Value::Bool(false));
        assert_eq!(full["WRITE_REG_INVALID"], Value::Bool(true));
        assert_eq!(full["READ_REG_INVALID"], Value::Bool(false));
        assert_eq!(full["MEASMODE_INVALID"], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_register_actions_need_debug_endpoints() {
        let board = ready_board();
        let mut air = sensor(&board, &[("show_debug_endpoints", Value::Bool(true))]);
        assert_eq!(names(air.as_ref()), vec!["data", "mode", "status", "error"]);

        let set: Parameters = [("mode".to_string(), Value::from("3"))].into_iter().collect();
        assert_eq!(air.invoke("mode", &set).await.unwrap(), Value::Integer(3));
        assert_eq!(board.i2c_writes(0x5B).last(), Some(&(MEAS_MODE_REG, vec![0x30])));

        board.set_i2c_register(0x5B, MEAS_MODE_REG, &[0x28]);
        assert_eq!(
            air.invoke("mode", &Parameters::new()).await.unwrap(),
            Value::object([("drive_mode", Value::Integer(2)), ("interrupt_data_ready", Value::Bool(true))])
        );

        let unsupported: Parameters = [("mode".to_string(), Value::Integer(4))].into_iter().collect();
        assert_eq!(
            air.invoke("mode", &unsupported).await,
            Err(ActionError::invalid("mode", "mode 4 is not supported"))
        );

        board.set_i2c_register(0x5B, STATUS_REG, &[0x98]);
        assert_eq!(
            air.invoke("status", &Parameters::new()).await.unwrap(),
            Value::object(status_flags(0x98))
        );
        board.set_i2c_register(0x5B, ERROR_ID_REG, &[0x30]);
        let Value::Object(errors) = air.invoke("error", &Parameters::new()).await.unwrap() else {
            panic!("error is an object");
        };
        assert_eq!(errors["HEATER_FAULT"], Value::Bool(true));
        assert_eq!(errors["HEATER_SUPPLY"], Value::Bool(true));
        assert_eq!(errors["MAX_RESISTANCE"], Value::Bool(false));

        let mut plain = sensor(&ready_board(), &[]);
        assert_eq!(
            plain.invoke("status", &Parameters::new()).await,
            Err(ActionError::UnknownAction("status".to_string()))
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_compensation_writes_the_environment() {
        let board = ready_board();
        board.push_sensor_frame(9, Ok([0x01, 0xB5, 0x00, 0xE2, 0x98]));
        let compensation = Value::object([("device", Value::from("DHT22")), ("pin", Value::Integer(9))]);
        let mut air = sensor(&board, &[("compensation_device", compensation)]);
        assert_eq!(air.poll_interval(), Some(Duration::from_secs(2)));
        assert_eq!(board.claimed_pins(), vec![9, SDA, SCL]);

        air.poll().await.unwrap();
        // 43.7 % -> 22374, 22.6 C -> 24371
        assert_eq!(
            board.i2c_writes(0x5B).last(),
            Some(&(ENV_DATA_REG, vec![0x57, 0x66, 0x5F, 0x33]))
        );

        let Value::Object(data) = air.invoke("data", &Parameters::new()).await.unwrap() else {
            panic!("data is an object");
        };
        assert_eq!(data["temperature"], Value::Float(22.6));
        assert_eq!(data["humidity"], Value::Float(43.7));
        assert_eq!(board.sensor_reads(9), 1);
    }

    #[test]
    fn test_compensation_device_must_be_a_dht() {
        let board = ready_board();
        let mut ctx = BuildContext::new(&board);
        let compensation = Value::object([("device", Value::from("BME280")), ("pin", Value::Integer(9))]);
        let err = Ccs811::build(&definition(&[("compensation_device", compensation)]), &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter { ref parameter, .. } if parameter == "compensation_device"
        ));
    }
}
