/*!
 * Hardware ports.
 *
 * Device kinds never touch registers directly. They ask a [`Board`] for
 * exclusive handles (an output line, a PWM channel, a UART, an I2C bus)
 * and drive those. A handle releases its line when dropped, so tearing down a
 * partially built registry frees every pin it claimed.
 *
 * [`SimulatedBoard`] is an in-memory board used on hosts and in tests. It
 * records every write and lets the caller drive inputs.
 */
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A GPIO line number
pub type PinId = u8;

/// Errors reported by a board or one of its handles
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    /// The line is held by another handle
    #[error("GPIO {0} is already in use")]
    PinInUse(PinId),

    /// The line does not exist on this board
    #[error("GPIO {0} does not exist on this board")]
    NoSuchPin(PinId),

    /// The UART peripheral is held by another handle
    #[error("UART {0} is already in use")]
    UartInUse(u8),

    /// The board cannot provide this kind of peripheral
    #[error("{0} is not supported by this board")]
    Unsupported(String),

    /// The peripheral did not respond as expected
    #[error("{0}")]
    Io(String),
}

/// Result type for hardware operations
pub type HalResult<T> = std::result::Result<T, HalError>;

/// Input bias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// No bias
    None,
    /// Pulled towards ground
    Down,
    /// Pulled towards the supply
    Up,
}

/// An RGB triple as written to a pixel strip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// All channels off
    pub const OFF: Rgb = Rgb(0, 0, 0);

    /// Scale every channel by `percent` (0-100), rounding half away from zero
    pub fn scaled(self, percent: u8) -> Rgb {
        let scale = |c: u8| (f64::from(c) * f64::from(percent) / 100.0).round() as u8;
        Rgb(scale(self.0), scale(self.1), scale(self.2))
    }
}

/// UART parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Settings for opening a UART
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartConfig {
    /// UART peripheral index
    pub id: u8,
    /// Line speed
    pub baudrate: u32,
    /// Transmit line, if routed explicitly
    pub tx: Option<PinId>,
    /// Receive line, if routed explicitly
    pub rx: Option<PinId>,
    /// Data bits per character
    pub bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: u8,
    /// Wait for the first character, in milliseconds
    pub timeout_ms: u32,
}

/// The DHT sensor family member on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorModel {
    /// DHT11
    Dht11,
    /// DHT22 / AM2302
    Dht22,
}

/// A push-pull digital output
pub trait OutputPin: Send + Debug {
    /// The line this handle drives
    fn pin(&self) -> PinId;

    /// Drive the line high or low
    fn set(&mut self, high: bool) -> HalResult<()>;
}

/// A digital input
pub trait InputPin: Send + Debug {
    /// The line this handle samples
    fn pin(&self) -> PinId;

    /// Sample the line
    fn is_high(&self) -> HalResult<bool>;
}

/// A PWM channel with a 16-bit duty cycle
pub trait PwmOutput: Send + Debug {
    /// Set the carrier frequency in hertz
    fn set_frequency(&mut self, hz: u32) -> HalResult<()>;

    /// Set the duty cycle, 0 (always low) to 65535 (always high)
    fn set_duty_u16(&mut self, duty: u16) -> HalResult<()>;
}

/// A chain of addressable RGB pixels
pub trait PixelStrip: Send + Debug {
    /// Number of pixels on the strip
    fn len(&self) -> usize;

    /// Whether the strip has no pixels
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latch a full frame; `pixels` has exactly [`len`](PixelStrip::len) entries
    fn write(&mut self, pixels: &[Rgb]) -> HalResult<()>;
}

/// A transmit-capable serial port
pub trait SerialPort: Send + Debug {
    /// Write bytes, returning how many were accepted
    fn write(&mut self, bytes: &[u8]) -> HalResult<usize>;
}

/// A single-wire temperature/humidity sensor
pub trait HumiditySensor: Send + Debug {
    /// Run one measurement and return the raw 5-byte frame
    /// (humidity hi/lo, temperature hi/lo, checksum)
    fn read_frame(&mut self) -> HalResult<[u8; 5]>;
}

/// A two-wire bus opened on an SDA/SCL pair
pub trait I2cBus: Send + Debug {
    /// Addresses that acknowledge, ascending
    fn scan(&mut self) -> HalResult<Vec<u8>>;

    /// Fill `buf` starting at register `reg` of the device at `addr`
    fn read_register(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> HalResult<()>;

    /// Write `data` to register `reg` of the device at `addr`; an empty
    /// write addresses the register alone
    fn write_register(&mut self, addr: u8, reg: u8, data: &[u8]) -> HalResult<()>;

    /// Give a device time to act on the last write
    fn settle(&mut self, _time: Duration) {}
}

/// A source of hardware handles
pub trait Board: Send + Sync + Debug {
    /// Claim a line as an output, driven to `initial`
    fn output(&self, pin: PinId, initial: bool) -> HalResult<Box<dyn OutputPin>>;

    /// Claim a line as an input
    fn input(&self, pin: PinId, pull: Pull) -> HalResult<Box<dyn InputPin>>;

    /// Claim a line as a PWM output
    fn pwm(&self, pin: PinId) -> HalResult<Box<dyn PwmOutput>>;

    /// Claim a line driving a pixel strip of `count` pixels
    fn pixel_strip(&self, pin: PinId, count: usize) -> HalResult<Box<dyn PixelStrip>>;

    /// Open a UART, claiming its routed lines
    fn uart(&self, config: &UartConfig) -> HalResult<Box<dyn SerialPort>>;

    /// Claim a line wired to a DHT-family sensor
    fn humidity_sensor(&self, pin: PinId, model: SensorModel) -> HalResult<Box<dyn HumiditySensor>>;

    /// Open an I2C bus, claiming both lines
    fn i2c(&self, sda: PinId, scl: PinId) -> HalResult<Box<dyn I2cBus>>;

    /// Claim the status LED soldered to the board
    fn status_led(&self) -> HalResult<Box<dyn OutputPin>> {
        Err(HalError::Unsupported("status LED".to_string()))
    }
}

/// Number of GPIO lines on the default simulated board (GP0-GP29)
pub const SIMULATED_PIN_COUNT: u8 = 30;

/// The simulated board's status LED line (GP25, as on a Pico)
pub const STATUS_LED_PIN: PinId = 25;

/// Last settings written to a simulated PWM channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PwmState {
    /// Carrier frequency in hertz
    pub frequency: u32,
    /// Duty cycle
    pub duty: u16,
}

/// One level change on a simulated output, in write order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEvent {
    /// The line written
    pub pin: PinId,
    /// The level written
    pub high: bool,
}

#[derive(Debug, Default)]
struct SimState {
    pin_count: u8,
    claimed: BTreeSet<PinId>,
    uarts: BTreeSet<u8>,
    levels: HashMap<PinId, bool>,
    events: Vec<PinEvent>,
    pwm: HashMap<PinId, PwmState>,
    pixels: HashMap<PinId, Vec<Rgb>>,
    pixel_writes: HashMap<PinId, usize>,
    serial: HashMap<u8, Vec<u8>>,
    frames: HashMap<PinId, VecDeque<HalResult<[u8; 5]>>>,
    frame_reads: HashMap<PinId, usize>,
    i2c: BTreeMap<u8, SimI2cDevice>,
}

#[derive(Debug, Default)]
struct SimI2cDevice {
    registers: HashMap<u8, Vec<u8>>,
    writes: Vec<(u8, Vec<u8>)>,
}

impl SimState {
    fn claim(&mut self, pin: PinId) -> HalResult<()> {
        if pin >= self.pin_count {
            return Err(HalError::NoSuchPin(pin));
        }
        if !self.claimed.insert(pin) {
            return Err(HalError::PinInUse(pin));
        }
        Ok(())
    }
}

/// An in-memory board. Clones share the same simulated hardware.
#[derive(Clone)]
pub struct SimulatedBoard {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimulatedBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SimulatedBoard")
            .field("pin_count", &state.pin_count)
            .field("claimed", &state.claimed)
            .finish()
    }
}

impl SimulatedBoard {
    /// A board with [`SIMULATED_PIN_COUNT`] lines, all inputs reading low
    pub fn new() -> Self {
        Self::with_pin_count(SIMULATED_PIN_COUNT)
    }

    /// A board with `pin_count` lines
    pub fn with_pin_count(pin_count: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                pin_count,
                ..SimState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the board from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lines currently held by a handle, ascending
    pub fn claimed_pins(&self) -> Vec<PinId> {
        self.lock().claimed.iter().copied().collect()
    }

    /// Whether a line is held by a handle
    pub fn is_claimed(&self, pin: PinId) -> bool {
        self.lock().claimed.contains(&pin)
    }

    /// Drive an input line (or overwrite an output level)
    pub fn set_input(&self, pin: PinId, high: bool) {
        self.lock().levels.insert(pin, high);
    }

    /// Current level of a line, if it was ever driven
    pub fn level(&self, pin: PinId) -> Option<bool> {
        self.lock().levels.get(&pin).copied()
    }

    /// Every output write so far, in order
    pub fn events(&self) -> Vec<PinEvent> {
        self.lock().events.clone()
    }

    /// Levels written to one output line, in order
    pub fn pin_history(&self, pin: PinId) -> Vec<bool> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.pin == pin)
            .map(|e| e.high)
            .collect()
    }

    /// Last PWM settings on a line
    pub fn pwm_state(&self, pin: PinId) -> Option<PwmState> {
        self.lock().pwm.get(&pin).copied()
    }

    /// Last frame latched on a pixel strip
    pub fn pixels(&self, pin: PinId) -> Option<Vec<Rgb>> {
        self.lock().pixels.get(&pin).cloned()
    }

    /// Number of frames latched on a pixel strip
    pub fn pixel_writes(&self, pin: PinId) -> usize {
        self.lock().pixel_writes.get(&pin).copied().unwrap_or(0)
    }

    /// Bytes written to a UART so far
    pub fn serial_output(&self, uart: u8) -> Vec<u8> {
        self.lock().serial.get(&uart).cloned().unwrap_or_default()
    }

    /// Queue the result of the next measurement on a sensor line
    pub fn push_sensor_frame(&self, pin: PinId, frame: HalResult<[u8; 5]>) {
        self.lock().frames.entry(pin).or_default().push_back(frame);
    }

    /// Number of measurements taken on a sensor line
    pub fn sensor_reads(&self, pin: PinId) -> usize {
        self.lock().frame_reads.get(&pin).copied().unwrap_or(0)
    }

    /// Put a device on the simulated I2C bus at `addr`
    pub fn attach_i2c_device(&self, addr: u8) {
        self.lock().i2c.entry(addr).or_default();
    }

    /// Set the bytes a register of an attached I2C device reads back
    pub fn set_i2c_register(&self, addr: u8, reg: u8, bytes: &[u8]) {
        self.lock()
            .i2c
            .entry(addr)
            .or_default()
            .registers
            .insert(reg, bytes.to_vec());
    }

    /// Every `(register, bytes)` write to an I2C device, in order
    pub fn i2c_writes(&self, addr: u8) -> Vec<(u8, Vec<u8>)> {
        self.lock()
            .i2c
            .get(&addr)
            .map(|d| d.writes.clone())
            .unwrap_or_default()
    }

    fn release(&self, pin: PinId) {
        self.lock().claimed.remove(&pin);
    }
}

impl Board for SimulatedBoard {
    fn output(&self, pin: PinId, initial: bool) -> HalResult<Box<dyn OutputPin>> {
        let mut state = self.lock();
        state.claim(pin)?;
        state.levels.insert(pin, initial);
        state.events.push(PinEvent { pin, high: initial });
        Ok(Box::new(SimOutput {
            board: self.clone(),
            pin,
        }))
    }

    fn input(&self, pin: PinId, pull: Pull) -> HalResult<Box<dyn InputPin>> {
        let mut state = self.lock();
        state.claim(pin)?;
        state.levels.entry(pin).or_insert(pull == Pull::Up);
        Ok(Box::new(SimInput {
            board: self.clone(),
            pin,
        }))
    }

    fn pwm(&self, pin: PinId) -> HalResult<Box<dyn PwmOutput>> {
        let mut state = self.lock();
        state.claim(pin)?;
        state.pwm.insert(pin, PwmState::default());
        Ok(Box::new(SimPwm {
            board: self.clone(),
            pin,
        }))
    }

    fn pixel_strip(&self, pin: PinId, count: usize) -> HalResult<Box<dyn PixelStrip>> {
        let mut state = self.lock();
        state.claim(pin)?;
        state.pixels.insert(pin, vec![Rgb::OFF; count]);
        Ok(Box::new(SimStrip {
            board: self.clone(),
            pin,
            count,
        }))
    }

    fn uart(&self, config: &UartConfig) -> HalResult<Box<dyn SerialPort>> {
        let mut state = self.lock();
        if state.uarts.contains(&config.id) {
            return Err(HalError::UartInUse(config.id));
        }
        let lines: Vec<PinId> = config.tx.iter().chain(config.rx.iter()).copied().collect();
        for (i, pin) in lines.iter().enumerate() {
            if let Err(e) = state.claim(*pin) {
                for claimed in &lines[..i] {
                    state.claimed.remove(claimed);
                }
                return Err(e);
            }
        }
        state.uarts.insert(config.id);
        Ok(Box::new(SimSerial {
            board: self.clone(),
            id: config.id,
            lines,
        }))
    }

    fn humidity_sensor(&self, pin: PinId, _model: SensorModel) -> HalResult<Box<dyn HumiditySensor>> {
        self.lock().claim(pin)?;
        Ok(Box::new(SimSensor {
            board: self.clone(),
            pin,
        }))
    }

    fn i2c(&self, sda: PinId, scl: PinId) -> HalResult<Box<dyn I2cBus>> {
        let mut state = self.lock();
        state.claim(sda)?;
        if let Err(e) = state.claim(scl) {
            state.claimed.remove(&sda);
            return Err(e);
        }
        Ok(Box::new(SimI2c {
            board: self.clone(),
            sda,
            scl,
        }))
    }

    fn status_led(&self) -> HalResult<Box<dyn OutputPin>> {
        self.output(STATUS_LED_PIN, false)
    }
}

#[derive(Debug)]
struct SimOutput {
    board: SimulatedBoard,
    pin: PinId,
}

impl OutputPin for SimOutput {
    fn pin(&self) -> PinId {
        self.pin
    }

    fn set(&mut self, high: bool) -> HalResult<()> {
        let mut state = self.board.lock();
        state.levels.insert(self.pin, high);
        state.events.push(PinEvent {
            pin: self.pin,
            high,
        });
        Ok(())
    }
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        self.board.release(self.pin);
    }
}

#[derive(Debug)]
struct SimInput {
    board: SimulatedBoard,
    pin: PinId,
}

impl InputPin for SimInput {
    fn pin(&self) -> PinId {
        self.pin
    }

    fn is_high(&self) -> HalResult<bool> {
        Ok(self.board.level(self.pin).unwrap_or(false))
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        self.board.release(self.pin);
    }
}

#[derive(Debug)]
struct SimPwm {
    board: SimulatedBoard,
    pin: PinId,
}

impl PwmOutput for SimPwm {
    fn set_frequency(&mut self, hz: u32) -> HalResult<()> {
        self.board.lock().pwm.entry(self.pin).or_default().frequency = hz;
        Ok(())
    }

    fn set_duty_u16(&mut self, duty: u16) -> HalResult<()> {
        self.board.lock().pwm.entry(self.pin).or_default().duty = duty;
        Ok(())
    }
}

impl Drop for SimPwm {
    fn drop(&mut self) {
        self.board.release(self.pin);
    }
}

#[derive(Debug)]
struct SimStrip {
    board: SimulatedBoard,
    pin: PinId,
    count: usize,
}

impl PixelStrip for SimStrip {
    fn len(&self) -> usize {
        self.count
    }

    fn write(&mut self, pixels: &[Rgb]) -> HalResult<()> {
        if pixels.len() != self.count {
            return Err(HalError::Io(format!(
                "frame has {} pixels, strip has {}",
                pixels.len(),
                self.count
            )));
        }
        let mut state = self.board.lock();
        state.pixels.insert(self.pin, pixels.to_vec());
        *state.pixel_writes.entry(self.pin).or_default() += 1;
        Ok(())
    }
}

impl Drop for SimStrip {
    fn drop(&mut self) {
        self.board.release(self.pin);
    }
}

#[derive(Debug)]
struct SimSerial {
    board: SimulatedBoard,
    id: u8,
    lines: Vec<PinId>,
}

impl SerialPort for SimSerial {
    fn write(&mut self, bytes: &[u8]) -> HalResult<usize> {
        self.board
            .lock()
            .serial
            .entry(self.id)
            .or_default()
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }
}

impl Drop for SimSerial {
    fn drop(&mut self) {
        let mut state = self.board.lock();
        state.uarts.remove(&self.id);
        for pin in &self.lines {
            state.claimed.remove(pin);
        }
    }
}

#[derive(Debug)]
struct SimSensor {
    board: SimulatedBoard,
    pin: PinId,
}

impl HumiditySensor for SimSensor {
    fn read_frame(&mut self) -> HalResult<[u8; 5]> {
        let mut state = self.board.lock();
        *state.frame_reads.entry(self.pin).or_default() += 1;
        state
            .frames
            .get_mut(&self.pin)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(HalError::Io(format!("no response on GPIO {}", self.pin))))
    }
}

impl Drop for SimSensor {
    fn drop(&mut self) {
        self.board.release(self.pin);
    }
}

#[derive(Debug)]
struct SimI2c {
    board: SimulatedBoard,
    sda: PinId,
    scl: PinId,
}

impl I2cBus for SimI2c {
    fn scan(&mut self) -> HalResult<Vec<u8>> {
        Ok(self.board.lock().i2c.keys().copied().collect())
    }

    fn read_register(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> HalResult<()> {
        let state = self.board.lock();
        let device = state
            .i2c
            .get(&addr)
            .ok_or_else(|| HalError::Io(format!("no acknowledge from {:#04x}", addr)))?;
        buf.fill(0);
        if let Some(bytes) = device.registers.get(&reg) {
            let n = bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&bytes[..n]);
        }
        Ok(())
    }

    fn write_register(&mut self, addr: u8, reg: u8, data: &[u8]) -> HalResult<()> {
        let mut state = self.board.lock();
        let device = state
            .i2c
            .get_mut(&addr)
            .ok_or_else(|| HalError::Io(format!("no acknowledge from {:#04x}", addr)))?;
        device.writes.push((reg, data.to_vec()));
        if !data.is_empty() {
            device.registers.insert(reg, data.to_vec());
        }
        Ok(())
    }
}

impl Drop for SimI2c {
    fn drop(&mut self) {
        let mut state = self.board.lock();
        state.claimed.remove(&self.sda);
        state.claimed.remove(&self.scl);
    }
}
