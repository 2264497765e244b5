/*!
 * HD44780U character LCD on a 4-bit bus.
 *
 * Every byte is sent as two nibbles, high nibble first, each latched on the
 * falling edge of the enable line. `data_pins` lists DB4 to DB7 in order.
 */
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};

use crate::device::{ActionDescriptor, ActionError, Device, ParameterDescriptor, ParameterKind, Result};
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{HalResult, OutputPin};
use crate::params;

/// Type tag
pub const TAG: &str = "HD44780U_LCD";

const CLEAR_DISPLAY: u8 = 0x01;
const ENTRY_MODE_INCREMENT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const CURSOR_ON: u8 = 0x02;
const CURSOR_BLINK: u8 = 0x01;
const FUNCTION_SET_4_BIT: u8 = 0x20;
const TWO_LINES: u8 = 0x08;
const SET_DDRAM_ADDRESS: u8 = 0x80;

const CLEAR_DELAY: Duration = Duration::from_micros(1600);
const POWER_UP_DELAY: Duration = Duration::from_millis(40);

const ACTIONS: &[ActionDescriptor] = &[
    ActionDescriptor::new("write", "Write a string to the display")
        .with_parameters(&[ParameterDescriptor::required("string", ParameterKind::String)]),
    ActionDescriptor::new("clear", "Clear the display"),
];

/// An HD44780U-driven display
#[derive(Debug)]
pub struct Hd44780Lcd {
    name: String,
    rs: Box<dyn OutputPin>,
    enable: Box<dyn OutputPin>,
    data: Vec<Box<dyn OutputPin>>,
    columns: u8,
    rows: u8,
    show_cursor: bool,
    blink_cursor: bool,
    x: u8,
    y: u8,
}

impl Hd44780Lcd {
    /// Build from `register_shift_pin`, `enable_pin`, `data_pins` (four
    /// lines), `columns` (16), `rows` (2), `show_cursor` (true),
    /// `blink_cursor` (false) and `default_string`, then initialise the
    /// controller
    pub fn build(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&[
            "register_shift_pin",
            "enable_pin",
            "data_pins",
            "columns",
            "rows",
            "show_cursor",
            "blink_cursor",
            "default_string",
        ])?;
        let rs_pin = def.pin("register_shift_pin")?;
        let enable_pin = def.pin("enable_pin")?;
        let data_pins = def.pin_list("data_pins")?;
        if data_pins.len() != 4 {
            return Err(def.invalid("data_pins", "only 4-bit mode is supported, give exactly four pins"));
        }
        let columns = def.integer_or("columns", 16, 1, 40)? as u8;
        let rows = def.integer_or("rows", 2, 1, 2)? as u8;
        let show_cursor = def.bool_or("show_cursor", true)?;
        let blink_cursor = def.bool_or("blink_cursor", false)?;
        let default_string = def.optional_string("default_string")?;

        let rs = ctx.output(def, rs_pin, false)?;
        let enable = ctx.output(def, enable_pin, false)?;
        let data = data_pins
            .into_iter()
            .map(|pin| ctx.output(def, pin, false))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut lcd = Hd44780Lcd {
            name: def.name().to_string(),
            rs,
            enable,
            data,
            columns,
            rows,
            show_cursor,
            blink_cursor,
            x: 0,
            y: 0,
        };
        lcd.reset().map_err(|e| def.hardware(e))?;
        if let Some(text) = default_string {
            lcd.write_str(&text)
                .map_err(|e| def.invalid("default_string", e.to_string()))?;
        }
        Ok(Box::new(lcd))
    }

    fn pulse_enable(&mut self) -> HalResult<()> {
        self.enable.set(false)?;
        thread::sleep(Duration::from_micros(1));
        self.enable.set(true)?;
        thread::sleep(Duration::from_micros(1));
        self.enable.set(false)?;
        thread::sleep(Duration::from_micros(50));
        Ok(())
    }

    fn write_nibble(&mut self, nibble: u8, register_select: bool) -> HalResult<()> {
        for (bit, line) in self.data.iter_mut().enumerate() {
            line.set(nibble >> bit & 1 == 1)?;
        }
        self.rs.set(register_select)?;
        self.pulse_enable()
    }

    fn send(&mut self, byte: u8, register_select: bool) -> HalResult<()> {
        self.write_nibble(byte >> 4, register_select)?;
        self.write_nibble(byte & 0x0F, register_select)
    }

    fn command(&mut self, byte: u8) -> HalResult<()> {
        self.send(byte, false)
    }

    /// Initialisation by instruction: three 8-bit resets, then the switch to
    /// 4-bit mode and the display configuration
    fn reset(&mut self) -> HalResult<()> {
        thread::sleep(POWER_UP_DELAY);
        for micros in [4100, 100, 100] {
            self.write_nibble(0x3, false)?;
            thread::sleep(Duration::from_micros(micros));
        }
        self.write_nibble(0x2, false)?;

        let lines = if self.rows > 1 { TWO_LINES } else { 0 };
        self.command(FUNCTION_SET_4_BIT | lines)?;

        let mut display = DISPLAY_ON;
        if self.show_cursor {
            display |= CURSOR_ON;
        }
        if self.blink_cursor {
            display |= CURSOR_BLINK;
        }
        self.command(display)?;
        self.clear()?;
        self.command(ENTRY_MODE_INCREMENT)
    }

    fn clear(&mut self) -> HalResult<()> {
        self.command(CLEAR_DISPLAY)?;
        thread::sleep(CLEAR_DELAY);
        self.x = 0;
        self.y = 0;
        Ok(())
    }

    fn move_to(&mut self, x: u8, y: u8) -> HalResult<()> {
        self.command(SET_DDRAM_ADDRESS | (x + 64 * y))?;
        self.x = x;
        self.y = y;
        debug!(lcd = %self.name, x, y, "Moved cursor");
        Ok(())
    }

    fn write_char(&mut self, c: char) -> Result<()> {
        let code = u8::try_from(u32::from(c))
            .map_err(|_| ActionError::invalid("string", format!("`{}` cannot be shown on the display", c)))?;
        self.send(code, true)?;

        // The controller advances the cursor itself; only wrapping needs a command.
        let x = self.x + 1;
        if x >= self.columns {
            let y = if self.y + 1 >= self.rows { 0 } else { self.y + 1 };
            self.move_to(0, y)?;
        } else {
            self.x = x;
        }
        Ok(())
    }

    fn write_str(&mut self, text: &str) -> Result<()> {
        text.chars().try_for_each(|c| self.write_char(c))
    }
}

#[async_trait]
impl Device for Hd44780Lcd {
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
                let text = params::required_text(params, "string")?;
                self.write_str(&text)?;
            }
            "clear" => self.clear()?,
            other => return Err(ActionError::UnknownAction(other.to_string())),
        }
        Ok(Value::empty())
    }
}
