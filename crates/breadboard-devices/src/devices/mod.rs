/*!
 * Built-in device kinds.
 */

pub mod button;
pub mod ccs811;
pub mod colors;
pub mod dht;
pub mod fan;
pub mod lcd;
pub mod neopixel;
pub mod serial;
pub mod switch;

pub use button::{MomentaryButton, ToggleButton, VirtualToggleButton};
pub use ccs811::Ccs811;
pub use dht::Dht;
pub use fan::Fan;
pub use lcd::Hd44780Lcd;
pub use neopixel::NeoPixel;
pub use serial::Serial;
pub use switch::Switch;
