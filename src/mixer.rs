use crate::config::MixerConfig;
use crate::control::AxisEfforts;
use nalgebra::{Matrix4, Vector4};

/// Thrust magnitudes for the four rotors, each within `[0, max_thrust]`.
///
/// Order is front-left, front-right, rear-left, rear-right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorCommand(Vector4<f64>);

impl MotorCommand {
    pub fn zero() -> Self {
        Self(Vector4::zeros())
    }

    pub fn front_left(&self) -> f64 {
        self.0[0]
    }

    pub fn front_right(&self) -> f64 {
        self.0[1]
    }

    pub fn rear_left(&self) -> f64 {
        self.0[2]
    }

    pub fn rear_right(&self) -> f64 {
        self.0[3]
    }

    pub fn magnitudes(&self) -> [f64; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    /// Sum of the four magnitudes, before any spin-direction signs.
    pub fn total_thrust(&self) -> f64 {
        self.0.sum()
    }

    /// Velocities as sent to the actuators.
    ///
    /// Front-right and rear-left spin the opposite way to front-left and
    /// rear-right so the rotor drag torques cancel; their commands are negated.
    pub fn actuation(&self) -> [f64; 4] {
        [self.0[0], -self.0[1], -self.0[2], self.0[3]]
    }
}

/// Control allocation for an X-frame quadcopter.
///
/// # Motor Configuration (X-frame)
///   FL (CW)    FR (CCW)
///       \        /
///        \      /
///         \    /
///          \  /
///           \/
///           /\
///          /  \
///         /    \
///        /      \
///   RL (CCW)    RR (CW)
///
/// # Mixing Matrix
///
/// Columns are `[vertical, roll, pitch, yaw]`:
///
/// FL = baseline + vertical - roll + pitch - yaw
/// FR = baseline + vertical + roll + pitch + yaw
/// RL = baseline + vertical - roll - pitch + yaw
/// RR = baseline + vertical + roll - pitch - yaw
///
/// Every column except `vertical` sums to zero, so roll, pitch and yaw effort
/// redistribute thrust without changing the total.
pub struct MotorMixer {
    baseline_thrust: f64,
    max_thrust: f64,
    matrix: Matrix4<f64>,
}

impl MotorMixer {
    pub fn new(config: MixerConfig) -> Self {
        #[rustfmt::skip]
        let matrix = Matrix4::new(
            1.0, -1.0,  1.0, -1.0,
            1.0,  1.0,  1.0,  1.0,
            1.0, -1.0, -1.0,  1.0,
            1.0,  1.0, -1.0, -1.0,
        );

        Self {
            baseline_thrust: config.baseline_thrust,
            max_thrust: config.max_thrust,
            matrix,
        }
    }

    /// Mixes the axis efforts and clamps each motor to `[0, max_thrust]`.
    pub fn mix(&self, efforts: &AxisEfforts) -> MotorCommand {
        let raw = self.matrix * efforts.to_vector() + Vector4::repeat(self.baseline_thrust);
        MotorCommand(raw.map(|m| m.clamp(0.0, self.max_thrust)))
    }
}
