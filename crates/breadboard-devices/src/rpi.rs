/*!
 * Raspberry Pi GPIO backend.
 *
 * Digital lines, software PWM, the UARTs and I2C bus 1 go through
 * `rppal`.
 * Pixel strips and DHT sensors need sub-microsecond timing that this
 * backend does not provide; asking for them fails the build with
 * [`HalError::Unsupported`].
 */
use std::fmt::{self, Debug};
use std::thread;
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin as RpInputPin, OutputPin as RpOutputPin};
use rppal::i2c::I2c;
use rppal::uart::{Parity as RpParity, Uart};
use tracing::debug;

use crate::hal::{
    Board, HalError, HalResult, HumiditySensor, I2cBus, InputPin, OutputPin, Parity, PinId, PixelStrip,
    Pull, PwmOutput, SensorModel, SerialPort, UartConfig,
};

/// GPIO lines of the Raspberry Pi header
#[derive(Clone)]
pub struct RaspberryPiBoard {
    gpio: Gpio,
}

impl Debug for RaspberryPiBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaspberryPiBoard").finish()
    }
}

impl RaspberryPiBoard {
    /// Open the GPIO peripheral
    pub fn new() -> HalResult<Self> {
        let gpio = Gpio::new().map_err(|e| HalError::Io(e.to_string()))?;
        Ok(Self { gpio })
    }

    fn line(&self, pin: PinId) -> HalResult<rppal::gpio::Pin> {
        self.gpio
            .get(pin)
            .map_err(|e| HalError::Io(format!("GPIO {}: {}", pin, e)))
    }
}

impl Board for RaspberryPiBoard {
    fn output(&self, pin: PinId, initial: bool) -> HalResult<Box<dyn OutputPin>> {
        let line = self.line(pin)?;
        let out = if initial {
            line.into_output_high()
        } else {
            line.into_output_low()
        };
        Ok(Box::new(PiOutput { pin, out }))
    }

    fn input(&self, pin: PinId, pull: Pull) -> HalResult<Box<dyn InputPin>> {
        let line = self.line(pin)?;
        let input = match pull {
            Pull::None => line.into_input(),
            Pull::Down => line.into_input_pulldown(),
            Pull::Up => line.into_input_pullup(),
        };
        Ok(Box::new(PiInput { pin, input }))
    }

    fn pwm(&self, pin: PinId) -> HalResult<Box<dyn PwmOutput>> {
        let out = self.line(pin)?.into_output_low();
        Ok(Box::new(PiPwm {
            out,
            frequency: 0,
            duty: 0,
        }))
    }

    fn pixel_strip(&self, _pin: PinId, _count: usize) -> HalResult<Box<dyn PixelStrip>> {
        Err(HalError::Unsupported("pixel strip output".to_string()))
    }

    fn uart(&self, config: &UartConfig) -> HalResult<Box<dyn SerialPort>> {
        let parity = match config.parity {
            Parity::None => RpParity::None,
            Parity::Even => RpParity::Even,
            Parity::Odd => RpParity::Odd,
        };
        let opened = if config.id == 0 {
            Uart::new(config.baudrate, parity, config.bits, config.stop_bits)
        } else {
            Uart::with_path(
                format!("/dev/ttyAMA{}", config.id),
                config.baudrate,
                parity,
                config.bits,
                config.stop_bits,
            )
        };
        let uart = opened.map_err(|e| HalError::Io(e.to_string()))?;
        debug!(uart = config.id, baudrate = config.baudrate, "Opened UART");
        Ok(Box::new(PiSerial { uart }))
    }

    fn humidity_sensor(&self, _pin: PinId, _model: SensorModel) -> HalResult<Box<dyn HumiditySensor>> {
        Err(HalError::Unsupported("single-wire humidity sensing".to_string()))
    }

    fn i2c(&self, sda: PinId, scl: PinId) -> HalResult<Box<dyn I2cBus>> {
        if (sda, scl) != (I2C1_SDA, I2C1_SCL) {
            return Err(HalError::Unsupported(format!(
                "I2C on GPIO {}/{} (bus 1 is GPIO {}/{})",
                sda, scl, I2C1_SDA, I2C1_SCL
            )));
        }
        let bus = I2c::new().map_err(|e| HalError::Io(e.to_string()))?;
        debug!(sda, scl, "Opened I2C bus 1");
        Ok(Box::new(PiI2c { bus }))
    }
}

const I2C1_SDA: PinId = 2;
const I2C1_SCL: PinId = 3;

struct PiOutput {
    pin: PinId,
    out: RpOutputPin,
}

impl Debug for PiOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiOutput").field("pin", &self.pin).finish()
    }
}

impl OutputPin for PiOutput {
    fn pin(&self) -> PinId {
        self.pin
    }

    fn set(&mut self, high: bool) -> HalResult<()> {
        if high {
            self.out.set_high();
        } else {
            self.out.set_low();
        }
        Ok(())
    }
}

struct PiInput {
    pin: PinId,
    input: RpInputPin,
}

impl Debug for PiInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiInput").field("pin", &self.pin).finish()
    }
}

impl InputPin for PiInput {
    fn pin(&self) -> PinId {
        self.pin
    }

    fn is_high(&self) -> HalResult<bool> {
        Ok(self.input.is_high())
    }
}

struct PiPwm {
    out: RpOutputPin,
    frequency: u32,
    duty: u16,
}

impl Debug for PiPwm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiPwm")
            .field("frequency", &self.frequency)
            .field("duty", &self.duty)
            .finish()
    }
}

impl PiPwm {
    fn apply(&mut self) -> HalResult<()> {
        if self.frequency == 0 {
            return Ok(());
        }
        self.out
            .set_pwm_frequency(f64::from(self.frequency), f64::from(self.duty) / f64::from(u16::MAX))
            .map_err(|e| HalError::Io(e.to_string()))
    }
}

impl PwmOutput for PiPwm {
    fn set_frequency(&mut self, hz: u32) -> HalResult<()> {
        self.frequency = hz;
        self.apply()
    }

    fn set_duty_u16(&mut self, duty: u16) -> HalResult<()> {
        self.duty = duty;
        self.apply()
    }
}

struct PiSerial {
    uart: Uart,
}

impl Debug for PiSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiSerial").finish()
    }
}

impl SerialPort for PiSerial {
    fn write(&mut self, bytes: &[u8]) -> HalResult<usize> {
        self.uart.write(bytes).map_err(|e| HalError::Io(e.to_string()))
    }
}

struct PiI2c {
    bus: I2c,
}

impl Debug for PiI2c {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PiI2c").finish()
    }
}

impl PiI2c {
    fn address(&mut self, addr: u8) -> HalResult<()> {
        self.bus
            .set_slave_address(u16::from(addr))
            .map_err(|e| HalError::Io(e.to_string()))
    }
}

impl I2cBus for PiI2c {
    fn scan(&mut self) -> HalResult<Vec<u8>> {
        let mut found = Vec::new();
        let mut byte = [0u8; 1];
        // 0x00-0x07 and 0x78-0x7F are reserved addresses
        for addr in 0x08..0x78u8 {
            self.address(addr)?;
            if self.bus.read(&mut byte).is_ok() {
                found.push(addr);
            }
        }
        Ok(found)
    }

    fn read_register(&mut self, addr: u8, reg: u8, buf: &mut [u8]) -> HalResult<()> {
        self.address(addr)?;
        self.bus
            .write_read(&[reg], buf)
            .map_err(|e| HalError::Io(format!("{:#04x}: {}", addr, e)))
    }

    fn write_register(&mut self, addr: u8, reg: u8, data: &[u8]) -> HalResult<()> {
        self.address(addr)?;
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(data);
        self.bus
            .write(&frame)
            .map(|_| ())
            .map_err(|e| HalError::Io(format!("{:#04x}: {}", addr, e)))
    }

    fn settle(&mut self, time: Duration) {
        thread::sleep(time);
    }
}
