use crate::config::{AltitudeGains, AttitudeGains};
use crate::filter::FilterState;
use crate::input::{ControlCommand, SetpointState};
use nalgebra::Vector4;

/// Integral accumulators for the three attitude axes.
///
/// Each term is kept within `±integral_limit` by [`AttitudeController`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PidState {
    pub roll_integral: f64,
    pub pitch_integral: f64,
    pub yaw_integral: f64,
}

/// Control effort per axis, in motor-command units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxisEfforts {
    pub vertical: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl AxisEfforts {
    /// Effort vector ordered `[vertical, roll, pitch, yaw]` for mixing.
    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.vertical, self.roll, self.pitch, self.yaw)
    }
}

/// Attitude stabilizer for roll, pitch and yaw.
///
/// Roll and pitch are levelled toward zero: the filtered angle itself is the
/// error, and pilot commands enter only as feed-forward on the output. Yaw has
/// no absolute level, so it either follows the pilot's yaw command with rate
/// damping or holds the current heading rate.
///
/// # Control Law
///
/// Roll and pitch:
///
/// u = kp * angle + kd * rate + ki * ∫angle + smoothed_cmd, clamped to ±roll_pitch_bound
///
/// Yaw, while the pilot commands yaw:
///
/// u = smoothed_yaw_cmd + kd_yaw * yaw_rate
///
/// Yaw otherwise:
///
/// u = -kp_yaw * yaw_rate - ki_yaw * ∫yaw_rate
///
/// Both yaw forms are clamped to ±yaw_bound.
///
/// # Anti-windup
///
/// An integral accumulates only while its axis is active (angle or rate above
/// threshold, or the pilot commanding that axis) and is clamped to
/// ±integral_limit. An idle integral leaks by `integral_decay` every tick.
pub struct AttitudeController {
    gains: AttitudeGains,
}

impl AttitudeController {
    pub fn new(gains: AttitudeGains) -> Self {
        Self { gains }
    }

    pub fn gains(&self) -> &AttitudeGains {
        &self.gains
    }

    /// Runs one tick of the attitude law and advances the integrals.
    ///
    /// # Arguments
    ///
    /// * `pid` - Integral state, updated in place
    /// * `filtered` - Filtered angles (radians) and rates (rad/s)
    /// * `command` - Raw pilot targets of this tick, used for the activity tests
    /// * `setpoint` - Smoothed pilot commands, used as feed-forward
    /// * `dt` - Tick duration in seconds
    ///
    /// # Returns
    ///
    /// Roll, pitch and yaw efforts; `vertical` is left at zero.
    pub fn update(
        &self,
        pid: &mut PidState,
        filtered: &FilterState,
        command: &ControlCommand,
        setpoint: &SetpointState,
        dt: f64,
    ) -> AxisEfforts {
        let g = &self.gains;
        let roll_error = filtered.roll;
        let pitch_error = filtered.pitch;
        let yaw_rate = filtered.gyro.z;

        let roll_active =
            roll_error.abs() > g.angle_threshold || command.target_roll.abs() > g.command_threshold;
        let pitch_active = pitch_error.abs() > g.angle_threshold
            || command.target_pitch.abs() > g.command_threshold;
        let yaw_active = command.user_yaw_input || yaw_rate.abs() > g.yaw_rate_threshold;

        pid.roll_integral = self.integrate(pid.roll_integral, roll_active, roll_error, dt);
        pid.pitch_integral = self.integrate(pid.pitch_integral, pitch_active, pitch_error, dt);
        pid.yaw_integral = self.integrate(pid.yaw_integral, yaw_active, yaw_rate, dt);

        let roll = g.kp_roll * roll_error
            + g.kd_roll * filtered.gyro.x
            + g.ki_roll_pitch * pid.roll_integral
            + setpoint.smooth_roll;
        let pitch = g.kp_pitch * pitch_error
            + g.kd_pitch * filtered.gyro.y
            + g.ki_roll_pitch * pid.pitch_integral
            + setpoint.smooth_pitch;
        let yaw = if command.user_yaw_input {
            setpoint.smooth_yaw + g.kd_yaw * yaw_rate
        } else {
            -g.kp_yaw * yaw_rate - g.ki_yaw * pid.yaw_integral
        };

        AxisEfforts {
            vertical: 0.0,
            roll: roll.clamp(-g.roll_pitch_bound, g.roll_pitch_bound),
            pitch: pitch.clamp(-g.roll_pitch_bound, g.roll_pitch_bound),
            yaw: yaw.clamp(-g.yaw_bound, g.yaw_bound),
        }
    }

    fn integrate(&self, integral: f64, active: bool, sample: f64, dt: f64) -> f64 {
        let limit = self.gains.integral_limit;
        if active {
            (integral + sample * dt).clamp(-limit, limit)
        } else {
            integral * self.gains.integral_decay
        }
    }
}

/// Cubic altitude-hold law.
///
/// The error `target - altitude + vertical_offset` is clamped to
/// `±error_bound` and cubed, giving a soft response near hover and a firm one
/// far from the setpoint.
pub struct AltitudeController {
    gains: AltitudeGains,
}

impl AltitudeController {
    pub fn new(gains: AltitudeGains) -> Self {
        Self { gains }
    }

    /// Vertical thrust bias added to every motor.
    ///
    /// # Control Law
    ///
    /// bias = kp_v * clamp(target - altitude + offset, -bound, bound)³
    pub fn vertical_bias(&self, target_altitude: f64, altitude: f64) -> f64 {
        let g = &self.gains;
        let error = (target_altitude - altitude + g.vertical_offset).clamp(-g.error_bound, g.error_bound);
        g.kp_vertical * error.powi(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    const DT: f64 = 0.032;

    fn level() -> (FilterState, ControlCommand, SetpointState) {
        (
            FilterState::default(),
            ControlCommand::default(),
            SetpointState::new(1.0),
        )
    }

    #[test]
    fn test_level_and_uncommanded_gives_zero_effort() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let (filtered, command, setpoint) = level();
        let mut pid = PidState::default();

        let efforts = controller.update(&mut pid, &filtered, &command, &setpoint, DT);

        assert_eq!(efforts, AxisEfforts::default());
        assert_eq!(pid, PidState::default());
    }

    #[test]
    fn test_pure_roll_disturbance() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let (mut filtered, command, setpoint) = level();
        filtered.roll = 0.1;
        let mut pid = PidState::default();

        let efforts = controller.update(&mut pid, &filtered, &command, &setpoint, DT);

        // |0.1| is above the angle threshold, so the integral picks up one step.
        assert!((pid.roll_integral - 0.1 * DT).abs() < 1e-12);
        let expected = 6.0 * 0.1 + 0.3 * 0.1 * DT;
        assert!((efforts.roll - expected).abs() < 1e-12);
        assert_eq!(efforts.pitch, 0.0);
        assert_eq!(efforts.yaw, 0.0);

        let no_step = controller.update(&mut PidState::default(), &filtered, &command, &setpoint, 0.0);
        assert!((no_step.roll - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_outputs_are_clamped() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let filtered = FilterState {
            roll: 10.0,
            pitch: -10.0,
            yaw: 0.0,
            gyro: Vector3::new(5.0, -5.0, 50.0),
        };
        let (_, command, setpoint) = level();
        let efforts = controller.update(&mut PidState::default(), &filtered, &command, &setpoint, DT);
        assert_eq!(efforts.roll, 12.0);
        assert_eq!(efforts.pitch, -12.0);
        assert_eq!(efforts.yaw, -6.0);
    }

    #[test]
    fn test_integrals_stay_bounded() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let (_, command, setpoint) = level();
        let mut pid = PidState::default();
        let errors = [3.0, -7.5, 0.2, 40.0, -0.04, 1e3, -1e3, 0.0];

        for (i, err) in errors.iter().cycle().take(2000).enumerate() {
            let filtered = FilterState {
                roll: *err,
                pitch: -*err,
                yaw: 0.0,
                gyro: Vector3::new(0.0, 0.0, *err),
            };
            let dt = 0.001 * (i % 97) as f64;
            controller.update(&mut pid, &filtered, &command, &setpoint, dt);
            assert!(pid.roll_integral.abs() <= 0.5);
            assert!(pid.pitch_integral.abs() <= 0.5);
            assert!(pid.yaw_integral.abs() <= 0.5);
        }
    }

    #[test]
    fn test_idle_integral_leaks() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let (filtered, command, setpoint) = level();
        let mut pid = PidState {
            roll_integral: 0.4,
            pitch_integral: -0.2,
            yaw_integral: 0.1,
        };
        controller.update(&mut pid, &filtered, &command, &setpoint, DT);
        assert!((pid.roll_integral - 0.4 * 0.98).abs() < 1e-12);
        assert!((pid.pitch_integral + 0.2 * 0.98).abs() < 1e-12);
        assert!((pid.yaw_integral - 0.1 * 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_pilot_command_keeps_integral_active() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let (mut filtered, _, setpoint) = level();
        filtered.pitch = 0.02;
        let command = ControlCommand {
            target_pitch: -0.3,
            ..ControlCommand::default()
        };
        let mut pid = PidState::default();
        controller.update(&mut pid, &filtered, &command, &setpoint, DT);
        assert!((pid.pitch_integral - 0.02 * DT).abs() < 1e-12);
    }

    #[test]
    fn test_yaw_modes() {
        let controller = AttitudeController::new(AttitudeGains::default());
        let (mut filtered, _, mut setpoint) = level();
        filtered.gyro.z = 0.05;
        setpoint.smooth_yaw = 0.2;

        let commanded = ControlCommand {
            target_yaw: 0.25,
            user_yaw_input: true,
            ..ControlCommand::default()
        };
        let efforts =
            controller.update(&mut PidState::default(), &filtered, &commanded, &setpoint, DT);
        assert!((efforts.yaw - (0.2 + 2.0 * 0.05)).abs() < 1e-12);

        // Below the rate threshold and without pilot yaw the integral only leaks.
        let mut pid = PidState {
            yaw_integral: 0.1,
            ..PidState::default()
        };
        let efforts =
            controller.update(&mut pid, &filtered, &ControlCommand::default(), &setpoint, DT);
        let expected = -2.0 * 0.05 - 0.2 * (0.1 * 0.98);
        assert!((efforts.yaw - expected).abs() < 1e-12);
    }

    #[test]
    fn test_altitude_cubic_law() {
        let controller = AltitudeController::new(AltitudeGains::default());

        // 2.0 - 1.0 + 0.6 = 1.6, clamped to 1.0.
        let far = controller.vertical_bias(2.0, 1.0);
        assert!((far - 2.5).abs() < 1e-12);

        // 2.0 - 1.9 + 0.6 = 0.7, inside the bound.
        let near = controller.vertical_bias(2.0, 1.9);
        assert!((near - 2.5 * 0.7_f64.powi(3)).abs() < 1e-12);
        assert!(near.abs() < far.abs());
        assert!(near < 2.5 * 0.7, "response must be cubic, not linear");

        let below = controller.vertical_bias(1.0, 5.0);
        assert!((below + 2.5).abs() < 1e-12);

        assert!(controller.vertical_bias(1.0, 1.6).abs() < 1e-12);
    }
}
