/*!
 * Device construction.
 *
 * A [`FactoryTable`] maps type tags (`"Fan"`, `"NeoPixel"`, ...) to
 * constructors. Constructors read their parameters from a
 * [`DeviceDefinition`] and claim hardware through a [`BuildContext`], which
 * refuses to hand one line to two devices.
 */
use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};

use crate::device::Device;
use crate::devices::{button, ccs811, dht, fan, lcd, neopixel, serial, switch};
use crate::hal::{
    Board, HalError, HumiditySensor, I2cBus, InputPin, OutputPin, PinId, PixelStrip, Pull, PwmOutput,
    SensorModel, SerialPort, UartConfig,
};

/// One device entry from the configuration document
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDefinition {
    name: String,
    tag: String,
    params: Parameters,
}

impl DeviceDefinition {
    /// Create a definition; `params` excludes the `device` tag itself
    pub fn new<N: Into<String>, T: Into<String>>(name: N, tag: T, params: Parameters) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            params,
        }
    }

    /// The device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The raw instantiation parameters
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// A parameter, treating an explicit `null` as absent
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    /// Fail on any parameter the kind does not accept
    pub fn reject_unknown(&self, accepted: &[&str]) -> Result<(), ConfigError> {
        let mut keys: Vec<&String> = self.params.keys().collect();
        keys.sort();
        match keys.into_iter().find(|k| !accepted.contains(&k.as_str())) {
            Some(unknown) => Err(self.invalid(unknown, "unknown parameter")),
            None => Ok(()),
        }
    }

    /// A required parameter
    pub fn required(&self, key: &str) -> Result<&Value, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::missing(&self.name, key))
    }

    /// A required GPIO number
    pub fn pin(&self, key: &str) -> Result<PinId, ConfigError> {
        let value = self.required(key)?;
        self.to_pin(key, value)
    }

    /// An optional GPIO number
    pub fn optional_pin(&self, key: &str) -> Result<Option<PinId>, ConfigError> {
        self.get(key).map(|v| self.to_pin(key, v)).transpose()
    }

    /// A required list of GPIO numbers
    pub fn pin_list(&self, key: &str) -> Result<Vec<PinId>, ConfigError> {
        match self.required(key)? {
            Value::Array(items) => items.iter().map(|v| self.to_pin(key, v)).collect(),
            other => Err(self.invalid(key, format!("expected a list of pins, got {}", other.type_name()))),
        }
    }

    /// An integer limited to `min..=max`, or `default` when absent
    pub fn integer_or(&self, key: &str, default: i64, min: i64, max: i64) -> Result<i64, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value.coerce_integer() {
            Some(v) if (min..=max).contains(&v) => Ok(v),
            Some(v) => Err(self.invalid(key, format!("{} is outside {}-{}", v, min, max))),
            None => Err(self.invalid(key, format!("expected an integer, got `{}`", value))),
        }
    }

    /// A non-negative number, or `default` when absent
    pub fn seconds_or(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        match value.coerce_float() {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(self.invalid(key, format!("expected a non-negative number, got `{}`", value))),
        }
    }

    /// A boolean, or `default` when absent
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .coerce_bool()
                .ok_or_else(|| self.invalid(key, format!("expected a boolean, got `{}`", value))),
        }
    }

    /// An optional string
    pub fn optional_string(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(key, format!("expected a string, got {}", other.type_name()))),
        }
    }

    /// Shorthand for an invalid-parameter error on this device
    pub fn invalid<S: Into<String>>(&self, key: &str, reason: S) -> ConfigError {
        ConfigError::invalid(&self.name, key, reason)
    }

    /// Wrap a hardware error raised while configuring this device
    pub fn hardware(&self, err: HalError) -> ConfigError {
        ConfigError::Hardware {
            device: self.name.clone(),
            detail: err.to_string(),
        }
    }

    fn to_pin(&self, key: &str, value: &Value) -> Result<PinId, ConfigError> {
        value
            .coerce_integer()
            .and_then(|v| PinId::try_from(v).ok())
            .ok_or_else(|| self.invalid(key, format!("`{}` is not a GPIO number", value)))
    }
}

/// Hardware claims made while building one registry
pub struct BuildContext<'a> {
    board: &'a dyn Board,
    claims: HashMap<String, String>,
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("board", &self.board)
            .field("claims", &self.claims)
            .finish()
    }
}

impl<'a> BuildContext<'a> {
    /// Start a build against `board`
    pub fn new(board: &'a dyn Board) -> Self {
        Self {
            board,
            claims: HashMap::new(),
        }
    }

    /// Record that `device` uses `resource`; a second claimant is a conflict
    pub fn claim(&mut self, device: &str, resource: String) -> Result<(), ConfigError> {
        if let Some(first) = self.claims.get(&resource) {
            return Err(ConfigError::ResourceConflict {
                resource,
                devices: vec![first.clone(), device.to_string()],
            });
        }
        debug!(device = %device, resource = %resource, "Claimed");
        self.claims.insert(resource, device.to_string());
        Ok(())
    }

    fn claim_pin(&mut self, device: &str, pin: PinId) -> Result<(), ConfigError> {
        self.claim(device, format!("GPIO {}", pin))
    }

    /// Number of resources claimed so far
    pub fn claimed(&self) -> usize {
        self.claims.len()
    }

    /// Claim an output line
    pub fn output(&mut self, def: &DeviceDefinition, pin: PinId, initial: bool) -> Result<Box<dyn OutputPin>, ConfigError> {
        self.claim_pin(def.name(), pin)?;
        self.board.output(pin, initial).map_err(|e| def.hardware(e))
    }

    /// Claim an input line
    pub fn input(&mut self, def: &DeviceDefinition, pin: PinId, pull: Pull) -> Result<Box<dyn InputPin>, ConfigError> {
        self.claim_pin(def.name(), pin)?;
        self.board.input(pin, pull).map_err(|e| def.hardware(e))
    }

    /// Claim a PWM line
    pub fn pwm(&mut self, def: &DeviceDefinition, pin: PinId) -> Result<Box<dyn PwmOutput>, ConfigError> {
        self.claim_pin(def.name(), pin)?;
        self.board.pwm(pin).map_err(|e| def.hardware(e))
    }

    /// Claim a pixel strip line
    pub fn pixel_strip(&mut self, def: &DeviceDefinition, pin: PinId, count: usize) -> Result<Box<dyn PixelStrip>, ConfigError> {
        self.claim_pin(def.name(), pin)?;
        self.board.pixel_strip(pin, count).map_err(|e| def.hardware(e))
    }

    /// Claim a UART and its routed lines
    pub fn uart(&mut self, def: &DeviceDefinition, config: &UartConfig) -> Result<Box<dyn SerialPort>, ConfigError> {
        self.claim(def.name(), format!("UART {}", config.id))?;
        for pin in config.tx.iter().chain(config.rx.iter()) {
            self.claim_pin(def.name(), *pin)?;
        }
        self.board.uart(config).map_err(|e| def.hardware(e))
    }

    /// Claim both lines of an I2C bus
    pub fn i2c(&mut self, def: &DeviceDefinition, sda: PinId, scl: PinId) -> Result<Box<dyn I2cBus>, ConfigError> {
        self.claim_pin(def.name(), sda)?;
        self.claim_pin(def.name(), scl)?;
        self.board.i2c(sda, scl).map_err(|e| def.hardware(e))
    }

    /// Claim a sensor data line
    pub fn humidity_sensor(&mut self, def: &DeviceDefinition, pin: PinId, model: SensorModel) -> Result<Box<dyn HumiditySensor>, ConfigError> {
        self.claim_pin(def.name(), pin)?;
        self.board.humidity_sensor(pin, model).map_err(|e| def.hardware(e))
    }
}

/// A constructor for one device kind
pub type Constructor = Box<
    dyn Fn(&DeviceDefinition, &mut BuildContext<'_>) -> Result<Box<dyn Device>, ConfigError>
        + Send
        + Sync,
>;

/// Type tag to constructor table
#[derive(Default)]
pub struct FactoryTable {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for FactoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTable").field("tags", &self.tags()).finish()
    }
}

impl FactoryTable {
    /// An empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// The table of every built-in kind
    pub fn standard() -> Self {
        Self::new()
            .with(fan::TAG, fan::Fan::build)
            .with(neopixel::NEOPIXEL_TAG, neopixel::NeoPixel::build_mono)
            .with(neopixel::RGB_NEOPIXEL_TAG, neopixel::NeoPixel::build_rgb)
            .with(button::TOGGLE_TAG, button::ToggleButton::build)
            .with(button::MOMENTARY_TAG, button::MomentaryButton::build)
            .with(button::VIRTUAL_TAG, button::VirtualToggleButton::build)
            .with(switch::TAG, switch::Switch::build)
            .with(serial::TAG, serial::Serial::build)
            .with(dht::DHT11_TAG, dht::Dht::build)
            .with(dht::DHT22_TAG, dht::Dht::build)
            .with(dht::AM2302_TAG, dht::Dht::build)
            .with(ccs811::TAG, ccs811::Ccs811::build)
            .with(lcd::TAG, lcd::Hd44780Lcd::build)
    }

    /// Add or replace a constructor
    pub fn register<F>(&mut self, tag: &str, constructor: F) -> &mut Self
    where
        F: Fn(&DeviceDefinition, &mut BuildContext<'_>) -> Result<Box<dyn Device>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(tag.to_string(), Box::new(constructor));
        self
    }

    /// Builder form of [`register`](FactoryTable::register)
    pub fn with<F>(mut self, tag: &str, constructor: F) -> Self
    where
        F: Fn(&DeviceDefinition, &mut BuildContext<'_>) -> Result<Box<dyn Device>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.register(tag, constructor);
        self
    }

    /// Known tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Whether `tag` names a known kind
    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build one device
    pub fn construct(&self, def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> Result<Box<dyn Device>, ConfigError> {
        let constructor = self
            .constructors
            .get(def.tag())
            .ok_or_else(|| ConfigError::UnknownDeviceType {
                name: def.name().to_string(),
                tag: def.tag().to_string(),
            })?;
        constructor(def, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SimulatedBoard;

    fn definition(tag: &str, params: &[(&str, Value)]) -> DeviceDefinition {
        DeviceDefinition::new(
            "dev",
            tag,
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    #[test]
    fn test_definition_accessors() {
        let def = definition(
            "Fan",
            &[
                ("pin", Value::Integer(17)),
                ("freq", Value::from("30000")),
                ("pins", Value::Array(vec![Value::Integer(1), Value::Integer(2)])),
                ("skip", Value::Null),
            ],
        );
        assert_eq!(def.pin("pin"), Ok(17));
        assert_eq!(def.optional_pin("skip"), Ok(None));
        assert_eq!(def.pin_list("pins"), Ok(vec![1, 2]));
        assert_eq!(def.integer_or("freq", 25000, 1, 1_000_000), Ok(30000));
        assert_eq!(def.integer_or("idle", 25, 0, 100), Ok(25));
        assert_eq!(def.pin("absent"), Err(ConfigError::missing("dev", "absent")));
        assert!(matches!(
            def.integer_or("freq", 0, 0, 10),
            Err(ConfigError::InvalidParameter { parameter, .. }) if parameter == "freq"
        ));
    }

    #[test]
    fn test_reject_unknown_names_the_first_stray_key() {
        let def = definition("Fan", &[("pin", Value::Integer(1)), ("zeta", Value::Null), ("alpha", Value::Null)]);
        assert_eq!(
            def.reject_unknown(&["pin"]),
            Err(ConfigError::invalid("dev", "alpha", "unknown parameter"))
        );
    }

    #[test]
    fn test_second_claim_is_a_conflict() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let fan = DeviceDefinition::new("exhaust_fan", "Fan", Parameters::new());
        let lights = DeviceDefinition::new("lights", "NeoPixel", Parameters::new());

        let _pwm = ctx.pwm(&fan, 17).unwrap();
        let err = ctx.pixel_strip(&lights, 17, 12).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ResourceConflict {
                resource: "GPIO 17".to_string(),
                devices: vec!["exhaust_fan".to_string(), "lights".to_string()],
            }
        );
        assert_eq!(ctx.claimed(), 1);
    }

    #[test]
    fn test_i2c_claims_both_lines() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let air = DeviceDefinition::new("air", "CCS811", Parameters::new());
        let button = DeviceDefinition::new("doorbell", "ToggleButton", Parameters::new());

        let _bus = ctx.i2c(&air, 0, 1).unwrap();
        assert_eq!(ctx.claimed(), 2);
        let err = ctx.input(&button, 1, Pull::Down).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ResourceConflict {
                resource: "GPIO 1".to_string(),
                devices: vec!["air".to_string(), "doorbell".to_string()],
            }
        );
    }

    #[test]
    fn test_unknown_tag() {
        let board = SimulatedBoard::new();
        let mut ctx = BuildContext::new(&board);
        let table = FactoryTable::standard();
        let def = definition("Toaster", &[]);

        let err = table.construct(&def, &mut ctx).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownDeviceType {
                name: "dev".to_string(),
                tag: "Toaster".to_string()
            }
        );
    }

    #[test]
    fn test_standard_tags() {
        let table = FactoryTable::standard();
        assert_eq!(
            table.tags(),
            vec![
                "AM2302",
                "CCS811",
                "DHT11",
                "DHT22",
                "Fan",
                "HD44780U_LCD",
                "MomentaryButton",
                "NeoPixel",
                "RGBNeoPixel",
                "Serial",
                "Switch",
                "ToggleButton",
                "VirtualToggleButton",
            ]
        );
    }
}
