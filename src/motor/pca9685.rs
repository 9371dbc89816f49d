// PCA9685 register layout and bus access
//
// Each motor uses four consecutive PWM channels (PWM, IN1, IN2, unused).
// Every channel is four registers: ON_L, ON_H, OFF_L, OFF_H.
// Bit 4 of ON_H forces the channel fully on, bit 4 of OFF_H fully off,
// so writing 0xFF to either byte is enough to latch a digital level.
//
// The outputs sink current (OEbar tied low, INVRT=1, OUTDRV=0 in MODE2),
// which flips every level: a "fully off" register drives the pin high.

use std::io::Write;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use serde::Serialize;
use tracing::debug;

/// MODE1: auto-increment on, oscillator on (SLEEP cleared)
pub const MODE1: u8 = 0x21;
/// MODE2: INVRT=1, OUTDRV=0 (open-drain, sinking)
pub const MODE2: u8 = 0x10;

/// Register addresses
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    Mode1 = 0x00,
    Mode2 = 0x01,
    Led0OnL = 0x06,
}

/// Registers per channel (ON_L, ON_H, OFF_L, OFF_H)
pub const REGISTERS_PER_CHANNEL: u8 = 4;
/// Channels per motor (PWM, IN1, IN2, spare)
pub const CHANNELS_PER_MOTOR: u8 = 4;
/// Bytes written per motor command: PWM, IN1 and IN2 channels
pub const BANK_LEN: usize = 12;

/// Largest duty value the 12-bit counter can hold
pub const DUTY_FULL: u16 = 4095;

const LEVEL_BYTE: u8 = 0xFF;

/// Logical level of one H-bridge input, as seen by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeInput {
    Low,
    High,
}

impl BridgeInput {
    /// Channel registers for this level.
    ///
    /// Because the output is inverted, a bridge-side high is the chip's
    /// full-on bit and a bridge-side low is the chip's full-off bit.
    pub fn registers(self) -> [u8; 4] {
        match self {
            BridgeInput::High => [0, LEVEL_BYTE, 0, 0],
            BridgeInput::Low => [0, 0, 0, LEVEL_BYTE],
        }
    }
}

/// First register of a motor's bank
///
/// Callers validate `motor` first; this is plain arithmetic.
pub fn base_register(motor: u8) -> u8 {
    let channel = motor * CHANNELS_PER_MOTOR;
    Register::Led0OnL as u8 + channel * REGISTERS_PER_CHANNEL
}

/// Encode a full 12-byte motor bank
///
/// `duty` is the raw OFF count written to the PWM channel (already
/// polarity-corrected by the caller).
pub fn encode_bank(duty: u16, in1: BridgeInput, in2: BridgeInput) -> [u8; BANK_LEN] {
    let [lo, hi] = (duty & DUTY_FULL).to_le_bytes();

    let mut bank = [0u8; BANK_LEN];
    bank[0..4].copy_from_slice(&[0, 0, lo, hi]);
    bank[4..8].copy_from_slice(&in1.registers());
    bank[8..12].copy_from_slice(&in2.registers());
    bank
}

/// Error types for register bus access
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to open I2C bus {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("I2C write to 0x{address:02X} at register 0x{register:02X} failed: {kind:?}")]
    Transfer {
        address: u8,
        register: u8,
        kind: ErrorKind,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode bus write: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;

/// The one capability the driver needs from the transport:
/// write `bytes` to consecutive registers starting at `register`.
pub trait RegisterBus {
    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<()>;
}

/// Register bus over any embedded-hal I2C implementation
///
/// The register address goes out as the first byte of a single write,
/// relying on MODE1 auto-increment for the rest.
pub struct I2cBus<I> {
    i2c: I,
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }
}

impl<I: I2c> RegisterBus for I2cBus<I> {
    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(register);
        frame.extend_from_slice(bytes);

        debug!(
            "I2C write to 0x{:02X}: reg=0x{:02X}, data={:02X?}",
            address, register, bytes
        );
        self.i2c
            .write(address, &frame)
            .map_err(|e| BusError::Transfer {
                address,
                register,
                kind: e.kind(),
            })
    }
}

/// Open the Linux I2C character device at `path`
#[cfg(target_os = "linux")]
pub fn open_i2c(path: &str) -> Result<I2cBus<linux_embedded_hal::I2cdev>> {
    let i2c = linux_embedded_hal::I2cdev::new(path).map_err(|e| BusError::Open {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(I2cBus::new(i2c))
}

#[cfg(not(target_os = "linux"))]
pub fn open_i2c(path: &str) -> Result<I2cBus<NoI2c>> {
    Err(BusError::Open {
        path: path.to_string(),
        reason: "I2C character devices are only available on Linux".to_string(),
    })
}

/// Placeholder bus type on hosts without I2C support; never constructed
#[cfg(not(target_os = "linux"))]
pub enum NoI2c {}

#[cfg(not(target_os = "linux"))]
impl embedded_hal::i2c::ErrorType for NoI2c {
    type Error = ErrorKind;
}

#[cfg(not(target_os = "linux"))]
impl I2c for NoI2c {
    fn transaction(
        &mut self,
        _address: u8,
        _operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        match *self {}
    }
}

/// One register block write, as emitted by [`JsonBus`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusWrite {
    pub address: u8,
    pub register: u8,
    pub bytes: Vec<u8>,
}

/// Dry-run bus: every block write becomes one JSON line on `out`
pub struct JsonBus<W> {
    out: W,
}

impl JsonBus<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonBus<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RegisterBus for JsonBus<W> {
    fn write_block(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<()> {
        let write = BusWrite {
            address,
            register,
            bytes: bytes.to_vec(),
        };
        serde_json::to_writer(&mut self.out, &write)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn test_base_register() {
        assert_eq!(base_register(0), 0x06);
        assert_eq!(base_register(1), 0x16);
        assert_eq!(base_register(2), 0x26);
        assert_eq!(base_register(3), 0x36);
    }

    #[test]
    fn test_banks_do_not_overlap() {
        for motor in 0..3u8 {
            let end = base_register(motor) as usize + BANK_LEN;
            assert!(end <= base_register(motor + 1) as usize);
        }
        // Last bank stays inside the LED channel registers (0x06..0x46)
        assert!(base_register(3) as usize + BANK_LEN <= 0x46);
    }

    #[test]
    fn test_bridge_levels() {
        assert_eq!(BridgeInput::High.registers(), [0, 0xFF, 0, 0]);
        assert_eq!(BridgeInput::Low.registers(), [0, 0, 0, 0xFF]);
    }

    #[test]
    fn test_encode_bank_duty_little_endian() {
        let bank = encode_bank(3095, BridgeInput::Low, BridgeInput::High);
        // 3095 = 0x0C17
        assert_eq!(&bank[0..4], &[0, 0, 0x17, 0x0C]);
        assert_eq!(&bank[4..8], &[0, 0, 0, 0xFF]);
        assert_eq!(&bank[8..12], &[0, 0xFF, 0, 0]);
    }

    #[test]
    fn test_i2c_bus_prefixes_register() {
        let expectations = [I2cTransaction::write(0x40, vec![0x16, 1, 2, 3])];
        let mut mock = I2cMock::new(&expectations);

        let mut bus = I2cBus::new(mock.clone());
        bus.write_block(0x40, 0x16, &[1, 2, 3]).unwrap();

        mock.done();
    }

    #[test]
    fn test_i2c_bus_maps_error_kind() {
        let expectations =
            [I2cTransaction::write(0x40, vec![0x00, MODE1]).with_error(ErrorKind::Other)];
        let mut mock = I2cMock::new(&expectations);

        let mut bus = I2cBus::new(mock.clone());
        let err = bus
            .write_block(0x40, Register::Mode1 as u8, &[MODE1])
            .unwrap_err();
        assert!(matches!(
            err,
            BusError::Transfer {
                address: 0x40,
                register: 0x00,
                kind: ErrorKind::Other
            }
        ));

        mock.done();
    }

    #[test]
    fn test_json_bus_one_line_per_write() {
        let mut bus = JsonBus::new(Vec::new());
        bus.write_block(0x40, 0x06, &[0, 0, 0x17, 0x0C]).unwrap();
        bus.write_block(0x40, 0x01, &[MODE2]).unwrap();

        let text = String::from_utf8(bus.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                r#"{"address":64,"register":6,"bytes":[0,0,23,12]}"#,
                r#"{"address":64,"register":1,"bytes":[16]}"#,
            ]
        );
    }
}
