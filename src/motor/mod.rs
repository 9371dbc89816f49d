// Motor control for the four-motor H-bridge board
//
// Provides:
// - PCA9685 register layout and bus access
// - Motor state encoding and the high-level driver
// - Skid-steer mixing for drive clients

mod driver;
pub mod mixing;
pub mod pca9685;

pub use driver::{MAX_SPEED, MOTOR_COUNT, MotorDriver, MotorError, MotorState};
pub use mixing::{MotorVelocities, skid_steer};
pub use pca9685::{BusError, I2cBus, JsonBus, RegisterBus, base_register, open_i2c};
