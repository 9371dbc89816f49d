// Skid-steer mixing for the four-wheel base
// Converts a (forward, turn) request into one velocity per motor.
//
// Motor order, top view, forward is up:
//
//    1 0
//    3 2

use super::driver::MAX_SPEED;

/// Turn limit in degrees; at full turn the inner wheels run backwards at full speed
pub const TURN_LIMIT_DEG: f64 = 90.0;

/// Velocities for motors 0..=3
pub type MotorVelocities = [i64; 4];

/// Mix forward speed and turn angle into four motor velocities
///
/// # Arguments
/// * `forward` - Forward speed in duty units (positive = forward), clamped to ±4094
/// * `turn_deg` - Turn in degrees (positive = right), clamped to ±90
///
/// The outer wheels keep the forward speed; the inner wheels slow down
/// linearly with the turn angle, stopping at 45° and reversing beyond.
pub fn skid_steer(forward: f64, turn_deg: f64) -> MotorVelocities {
    let forward = forward.clamp(-(MAX_SPEED as f64), MAX_SPEED as f64);
    let turn = turn_deg.clamp(-TURN_LIMIT_DEG, TURN_LIMIT_DEG);

    let outer = forward.abs();
    let inner = outer * (1.0 - 2.0 * turn.abs() / TURN_LIMIT_DEG);

    // Truncate toward zero like an integer cast of the float speed
    let (outer, inner) = (outer as i64, inner as i64);
    let mut velocities = if turn > 0.0 {
        [inner, outer, inner, outer]
    } else {
        [outer, inner, outer, inner]
    };

    if forward < 0.0 {
        for v in &mut velocities {
            *v = -*v;
        }
    }
    velocities
}
