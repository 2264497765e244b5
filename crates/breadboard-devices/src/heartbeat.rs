/*!
 * Status LED heartbeat.
 *
 * The LED soldered to the board blinks one second on, one second off while
 * the control loop runs. It is not a configured device: it has no name, no
 * actions and no entry in the registry.
 */
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::hal::{Board, HalResult, OutputPin};

/// Time the LED spends in each state
pub const BLINK_PERIOD: Duration = Duration::from_secs(1);

/// Toggles the status LED once per [`BLINK_PERIOD`]
#[derive(Debug)]
pub struct Heartbeat {
    led: Box<dyn OutputPin>,
    lit: bool,
    last_toggle: Option<Instant>,
}

impl Heartbeat {
    /// Claim the board's status LED
    pub fn claim(board: &dyn Board) -> HalResult<Self> {
        let led = board.status_led()?;
        debug!(pin = led.pin(), "Claimed status LED");
        Ok(Self {
            led,
            lit: false,
            last_toggle: None,
        })
    }

    /// Toggle the LED if a period has passed since the last toggle
    pub fn tick(&mut self, now: Instant) -> HalResult<()> {
        if let Some(last) = self.last_toggle {
            if now.duration_since(last) < BLINK_PERIOD {
                return Ok(());
            }
        }
        self.led.set(!self.lit)?;
        self.lit = !self.lit;
        self.last_toggle = Some(now);
        Ok(())
    }

    /// Whether the LED is on
    pub fn is_lit(&self) -> bool {
        self.lit
    }
}
