// Bus location, network port, teleop timing
use std::time::Duration;

// I2C character device the PWM chip hangs off
pub const I2C_BUS_PATH: &str = "/dev/i2c-1";

// 7-bit address of the PWM chip (all address pins low)
pub const DEVICE_ADDRESS: u8 = 0x40;

// UDP port the drive clients send command lines to
pub const UDP_PORT: u16 = 3322;

// Default bind address when reading commands from UDP
pub const UDP_BIND: &str = "0.0.0.0:3322";

// Pause before receiving again after a UDP socket error
pub const UDP_RETRY_DELAY: Duration = Duration::from_millis(100);

// How often the teleop client sends a command line
pub const TELEOP_PERIOD: Duration = Duration::from_millis(100);
