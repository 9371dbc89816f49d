// Motor driver for four brushed DC motors behind a PCA9685
//
// Turns a requested velocity into a motor state and writes the state's
// register bank in one block write.

use tracing::{debug, error, info};

use super::pca9685::{
    self, BANK_LEN, BridgeInput, BusError, DUTY_FULL, MODE1, MODE2, Register, RegisterBus,
    base_register, encode_bank,
};

/// Number of motors on the chip
pub const MOTOR_COUNT: u8 = 4;

/// Largest accepted speed magnitude (exclusive bound is 4095)
pub const MAX_SPEED: i64 = DUTY_FULL as i64 - 1;

/// Error types for motor commands
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Motor index {motor} out of range (must be 0..=3)")]
    MotorOutOfRange { motor: i64 },

    #[error("Velocity {velocity} out of range (|v| must be below 4095)")]
    VelocityOutOfRange { velocity: i64 },

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl MotorError {
    /// Rejected argument, as opposed to a transport failure
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            MotorError::MotorOutOfRange { .. } | MotorError::VelocityOutOfRange { .. }
        )
    }
}

/// What a motor is doing after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    /// Both bridge inputs low, leads high-impedance
    Floating,
    /// Both bridge inputs high, leads shorted
    Braking,
    Forward(u16),
    Reverse(u16),
}

impl MotorState {
    /// Select the state for a velocity; `None` releases the motor
    pub fn from_velocity(velocity: Option<i64>) -> Result<Self, MotorError> {
        let Some(v) = velocity else {
            return Ok(MotorState::Floating);
        };
        if v.unsigned_abs() > MAX_SPEED as u64 {
            return Err(MotorError::VelocityOutOfRange { velocity: v });
        }

        // abs() <= 4094 fits in u16
        let speed = v.unsigned_abs() as u16;
        Ok(match v {
            0 => MotorState::Braking,
            v if v > 0 => MotorState::Forward(speed),
            _ => MotorState::Reverse(speed),
        })
    }

    /// Raw PWM duty count; inverted because the outputs sink current
    pub fn duty(&self) -> u16 {
        match *self {
            MotorState::Floating | MotorState::Braking => 0,
            MotorState::Forward(speed) | MotorState::Reverse(speed) => DUTY_FULL - speed,
        }
    }

    /// Register bank for this state
    pub fn registers(&self) -> [u8; BANK_LEN] {
        use BridgeInput::{High, Low};

        let (in1, in2) = match self {
            MotorState::Floating => (Low, Low),
            MotorState::Braking => (High, High),
            MotorState::Forward(_) => (Low, High),
            MotorState::Reverse(_) => (High, Low),
        };
        encode_bank(self.duty(), in1, in2)
    }
}

/// High-level driver for the four H-bridge motors
pub struct MotorDriver<B> {
    bus: B,
    address: u8,
}

impl<B: RegisterBus> MotorDriver<B> {
    /// Take ownership of the bus and configure the chip's mode registers
    ///
    /// This is the only way to get a driver, so the chip is configured
    /// exactly once and before any motor command.
    pub fn initialize(mut bus: B, address: u8) -> Result<Self, BusError> {
        info!("Initializing PWM chip at 0x{:02X}", address);
        bus.write_block(address, Register::Mode1 as u8, &[MODE1])?;
        bus.write_block(address, Register::Mode2 as u8, &[MODE2])?;
        Ok(Self { bus, address })
    }

    /// Command one motor
    ///
    /// Arguments are validated before anything touches the bus, so a
    /// rejected command leaves the motor as it was.
    pub fn command(&mut self, motor: i64, velocity: Option<i64>) -> Result<MotorState, MotorError> {
        if !(0..MOTOR_COUNT as i64).contains(&motor) {
            return Err(MotorError::MotorOutOfRange { motor });
        }
        let state = MotorState::from_velocity(velocity)?;

        let motor = motor as u8;
        debug!("Motor {} -> {:?}", motor, state);
        self.bus
            .write_block(self.address, base_register(motor), &state.registers())?;
        Ok(state)
    }

    /// Float every motor, in index order
    ///
    /// Best effort: all four writes are attempted even if some fail, and
    /// the first failure is returned.
    pub fn release_all(&mut self) -> pca9685::Result<()> {
        let mut first_err = None;
        for motor in 0..MOTOR_COUNT as i64 {
            match self.command(motor, None) {
                Ok(_) => {}
                Err(MotorError::Bus(e)) => {
                    error!("Failed to release motor {}: {}", motor, e);
                    first_err.get_or_insert(e);
                }
                // Index and velocity are always valid here
                Err(e) => error!("Failed to release motor {}: {}", motor, e),
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Get the bus back, e.g. to inspect a test double
    pub fn into_bus(self) -> B {
        self.bus
    }
}
