// Text command protocol: one command per line, whitespace-separated fields
//
//   ""          release all motors
//   "i"         release motor i
//   "i v"       set motor i to velocity v
//   "a b c d"   set motors 0..=3 to a, b, c, d

use std::fmt;
use std::str::FromStr;

use crate::motor::{MOTOR_COUNT, MotorVelocities};

/// Parsed command line
///
/// Motor indices and velocities are kept as parsed; range checks belong
/// to the motor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReleaseAll,
    Release { motor: i64 },
    /// `velocity` is `None` when the velocity field was not a number,
    /// which releases the motor
    Set { motor: i64, velocity: Option<i64> },
    SetAll(MotorVelocities),
}

/// Why a line is not a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 0, 1, 2 or 4 fields, got {tokens}")]
    Shape { tokens: usize },

    #[error("motor index {token:?} is not an integer")]
    MotorIndex { token: String },

    #[error("velocity {token:?} for motor {position} is not an integer")]
    Velocity { position: usize, token: String },
}

impl Command {
    /// Per-motor commands this line expands to, in index order
    pub fn targets(&self) -> Vec<(i64, Option<i64>)> {
        match *self {
            Command::ReleaseAll => (0..MOTOR_COUNT as i64).map(|m| (m, None)).collect(),
            Command::Release { motor } => vec![(motor, None)],
            Command::Set { motor, velocity } => vec![(motor, velocity)],
            Command::SetAll(velocities) => velocities
                .iter()
                .enumerate()
                .map(|(m, &v)| (m as i64, Some(v)))
                .collect(),
        }
    }
}

/// Parse a whole number of any size
///
/// Numbers beyond `i64` saturate, so they still reach the driver's range
/// checks instead of being mistaken for text.
fn parse_int(token: &str) -> Option<i64> {
    if let Ok(n) = token.parse() {
        return Some(n);
    }
    let (negative, digits) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i64::MIN } else { i64::MAX })
}

fn parse_motor(token: &str) -> Result<i64, ParseError> {
    parse_int(token).ok_or_else(|| ParseError::MotorIndex {
        token: token.to_string(),
    })
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        match fields.as_slice() {
            [] => Ok(Command::ReleaseAll),
            [motor] => Ok(Command::Release {
                motor: parse_motor(motor)?,
            }),
            // A velocity that is not a number releases the motor
            [motor, velocity] => Ok(Command::Set {
                motor: parse_motor(motor)?,
                velocity: parse_int(velocity),
            }),
            [_, _, _, _] => {
                let mut velocities = [0i64; 4];
                for (position, (slot, token)) in velocities.iter_mut().zip(&fields).enumerate() {
                    *slot = parse_int(token).ok_or_else(|| ParseError::Velocity {
                        position,
                        token: token.to_string(),
                    })?;
                }
                Ok(Command::SetAll(velocities))
            }
            _ => Err(ParseError::Shape {
                tokens: fields.len(),
            }),
        }
    }
}

/// Formats the command as a protocol line (without the newline)
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ReleaseAll => Ok(()),
            Command::Release { motor } | Command::Set { motor, velocity: None } => {
                write!(f, "{}", motor)
            }
            Command::Set {
                motor,
                velocity: Some(v),
            } => write!(f, "{} {}", motor, v),
            Command::SetAll([a, b, c, d]) => write!(f, "{} {} {} {}", a, b, c, d),
        }
    }
}
