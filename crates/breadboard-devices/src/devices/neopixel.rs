/*!
 * NeoPixel strips, single colour (`NeoPixel`) and RGB (`RGBNeoPixel`).
 *
 * The strip remembers the colour last written to each pixel so `on` can
 * restore it after `off`. Blacklisted pixels (dead LEDs) are never lit.
 */
use async_trait::async_trait;
use tracing::debug;

use breadboard_core::error::ConfigError;
use breadboard_core::types::{Parameters, Value};

use crate::device::{ActionDescriptor, ActionError, Device, ParameterDescriptor, ParameterKind, Result};
use crate::devices::colors;
use crate::factory::{BuildContext, DeviceDefinition};
use crate::hal::{HalResult, PixelStrip, Rgb};
use crate::params;

/// Type tag of the single colour strip
pub const NEOPIXEL_TAG: &str = "NeoPixel";

/// Type tag of the RGB strip
pub const RGB_NEOPIXEL_TAG: &str = "RGBNeoPixel";

const ON: ActionDescriptor = ActionDescriptor::new("on", "Turn on the NeoPixel, restoring its state");
const OFF: ActionDescriptor = ActionDescriptor::new("off", "Turn off the NeoPixel");

const MONO_ACTIONS: &[ActionDescriptor] = &[
    ActionDescriptor::new("set", "Set the brightness of the NeoPixel (0-100)")
        .with_parameters(&[ParameterDescriptor::required("brightness", ParameterKind::Integer)]),
    ON,
    OFF,
];

const RGB_ACTIONS: &[ActionDescriptor] = &[
    ActionDescriptor::new(
        "set",
        "Set the colour of the NeoPixel from `red`, `green` and `blue` (0-255) or a `color` name, scaled by `brightness` (0-100)",
    )
    .with_parameters(&[
        ParameterDescriptor::optional("red", ParameterKind::Integer),
        ParameterDescriptor::optional("green", ParameterKind::Integer),
        ParameterDescriptor::optional("blue", ParameterKind::Integer),
        ParameterDescriptor::optional("brightness", ParameterKind::Integer),
        ParameterDescriptor::optional("color", ParameterKind::String),
    ]),
    ON,
    OFF,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Mono,
    Rgb,
}

/// A strip of addressable pixels
#[derive(Debug)]
pub struct NeoPixel {
    name: String,
    variant: Variant,
    strip: Box<dyn PixelStrip>,
    blacklist: Vec<usize>,
    default_brightness: Option<u8>,
    // Colour each pixel shows when on.
    colors: Vec<Rgb>,
    // What is currently latched on the strip.
    frame: Vec<Rgb>,
}

const COMMON_PARAMETERS: [&str; 4] = ["pin", "count", "blacklist", "default_brightness"];

impl NeoPixel {
    /// Build a single colour strip and turn it on at `default_brightness`
    pub fn build_mono(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        def.reject_unknown(&COMMON_PARAMETERS)?;
        let mut strip = Self::build_common(def, ctx, Variant::Mono)?;
        let level = gray(strip.default_brightness.unwrap_or(0));
        strip.colors.fill(level);
        strip.light().map_err(|e| def.hardware(e))?;
        Ok(Box::new(strip))
    }

    /// Build an RGB strip from `default_color` (name or `[r, g, b]`),
    /// scaled by `default_brightness` (0 when unset), lit unless
    /// `default_on` is false
    pub fn build_rgb(def: &DeviceDefinition, ctx: &mut BuildContext<'_>) -> std::result::Result<Box<dyn Device>, ConfigError> {
        let mut accepted = COMMON_PARAMETERS.to_vec();
        accepted.extend(["default_color", "default_on"]);
        def.reject_unknown(&accepted)?;

        let default_color = match def.get("default_color") {
            None => Rgb::OFF,
            Some(Value::String(name)) => colors::lookup(name)
                .ok_or_else(|| def.invalid("default_color", format!("unknown color `{}`", name)))?,
            Some(Value::Array(channels)) => rgb_from_list(channels)
                .ok_or_else(|| def.invalid("default_color", "expected three channel values 0-255"))?,
            Some(other) => {
                return Err(def.invalid(
                    "default_color",
                    format!("expected a color name or [r, g, b], got {}", other.type_name()),
                ))
            }
        };
        let default_on = def.bool_or("default_on", true)?;

        let mut strip = Self::build_common(def, ctx, Variant::Rgb)?;
        let scaled = default_color.scaled(strip.default_brightness.unwrap_or(0));
        strip.colors.fill(scaled);
        if default_on {
            strip.light().map_err(|e| def.hardware(e))?;
        }
        Ok(Box::new(strip))
    }

    fn build_common(def: &DeviceDefinition, ctx: &mut BuildContext<'_>, variant: Variant) -> std::result::Result<Self, ConfigError> {
        let pin = def.pin("pin")?;
        let count = def.integer_or("count", 1, 1, 1024)? as usize;
        let blacklist = match def.get("blacklist") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.coerce_integer().and_then(|i| usize::try_from(i).ok()))
                .collect::<Option<Vec<usize>>>()
                .ok_or_else(|| def.invalid("blacklist", "expected a list of pixel indexes"))?,
            Some(other) => {
                return Err(def.invalid(
                    "blacklist",
                    format!("expected a list of pixel indexes, got {}", other.type_name()),
                ))
            }
        };
        let default_brightness = match def.get("default_brightness") {
            None => None,
            Some(_) => Some(def.integer_or("default_brightness", 0, 0, 100)? as u8),
        };

        let strip = ctx.pixel_strip(def, pin, count)?;
        Ok(NeoPixel {
            name: def.name().to_string(),
            variant,
            strip,
            blacklist,
            default_brightness,
            colors: vec![Rgb::OFF; count],
            frame: vec![Rgb::OFF; count],
        })
    }

    /// Number of pixels on the strip
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Whether the strip is empty
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    fn usable(&self, idx: usize) -> bool {
        !self.blacklist.contains(&idx)
    }

    /// Paint every usable pixel and remember the colour
    fn paint(&mut self, color: Rgb) -> HalResult<()> {
        for idx in 0..self.len() {
            if self.usable(idx) {
                self.colors[idx] = color;
                self.frame[idx] = color;
            }
        }
        debug!(strip = %self.name, ?color, "Painting strip");
        self.strip.write(&self.frame)
    }

    /// Show the remembered colours
    fn light(&mut self) -> HalResult<()> {
        for idx in 0..self.len() {
            if self.usable(idx) {
                self.frame[idx] = self.colors[idx];
            }
        }
        self.strip.write(&self.frame)
    }

    fn dark(&mut self) -> HalResult<()> {
        self.frame.fill(Rgb::OFF);
        self.strip.write(&self.frame)
    }

    async fn set_mono(&mut self, params: &Parameters) -> Result<Value> {
        let brightness = params::required_percent(params, "brightness")?;
        self.paint(gray(brightness))?;
        Ok(Value::object([("brightness", Value::from(brightness))]))
    }

    async fn set_rgb(&mut self, params: &Parameters) -> Result<Value> {
        let brightness = match params::integer_in(params, "brightness", 0..=100)? {
            Some(b) => b as u8,
            None => self.default_brightness.filter(|b| *b > 0).unwrap_or(100),
        };
        let red = params::integer_in(params, "red", 0..=255)?;
        let green = params::integer_in(params, "green", 0..=255)?;
        let blue = params::integer_in(params, "blue", 0..=255)?;

        let color = match (red, green, blue) {
            (Some(r), Some(g), Some(b)) => Rgb(r as u8, g as u8, b as u8),
            (None, None, None) => match params::text(params, "color")? {
                Some(name) => colors::lookup(&name)
                    .ok_or_else(|| ActionError::invalid("color", format!("unknown color `{}`", name)))?,
                None => {
                    return Err(ActionError::invalid(
                        "color",
                        "either `color` or values for `red`, `green` and `blue` must be given",
                    ))
                }
            },
            _ => {
                let missing = [("red", red), ("green", green), ("blue", blue)]
                    .into_iter()
                    .find(|(_, v)| v.is_none())
                    .map_or("red", |(name, _)| name);
                return Err(ActionError::invalid(
                    missing,
                    "`red`, `green` and `blue` must all be given if any are given",
                ));
            }
        };

        self.paint(color.scaled(brightness))?;
        let Rgb(r, g, b) = self.colors.first().copied().unwrap_or_default();
        Ok(Value::object([
            ("red", Value::from(r)),
            ("green", Value::from(g)),
            ("blue", Value::from(b)),
        ]))
    }
}

/// White at `brightness` percent
fn gray(brightness: u8) -> Rgb {
    let level = (255.0 * f64::from(brightness) / 100.0).round() as u8;
    Rgb(level, level, level)
}

fn rgb_from_list(channels: &[Value]) -> Option<Rgb> {
    let channel = |v: &Value| v.coerce_integer().and_then(|c| u8::try_from(c).ok());
    match channels {
        [r, g, b] => Some(Rgb(channel(r)?, channel(g)?, channel(b)?)),
        _ => None,
    }
}

#[async_trait]
impl Device for NeoPixel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        match self.variant {
            Variant::Mono => NEOPIXEL_TAG,
            Variant::Rgb => RGB_NEOPIXEL_TAG,
        }
    }

    fn actions(&self) -> &[ActionDescriptor] {
        match self.variant {
            Variant::Mono => MONO_ACTIONS,
            Variant::Rgb => RGB_ACTIONS,
        }
    }

    async fn invoke(&mut self, action: &str, params: &Parameters) -> Result<Value> {
        match (action, self.variant) {
            ("set", Variant::Mono) => self.set_mono(params).await,
            ("set", Variant::Rgb) => self.set_rgb(params).await,
            ("on", _) => {
                self.light()?;
                Ok(Value::empty())
            }
            ("off", _) => {
                self.dark()?;
                Ok(Value::empty())
            }
            (other, _) => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}
