use crate::error::{ensure_finite, FlightError};
use nalgebra::Vector3;

/// One tick worth of raw readings from the host.
///
/// # Fields
///
/// * `roll`, `pitch`, `yaw` - Euler angles from the inertial unit (radians)
/// * `gyro` - Body angular rates about x, y, z (rad/s)
/// * `altitude` - Height above ground (meters)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorFrame {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub gyro: Vector3<f64>,
    pub altitude: f64,
}

impl SensorFrame {
    /// Fails on the first NaN or infinite reading.
    pub fn validate(&self) -> Result<(), FlightError> {
        ensure_finite(self.roll, "roll")?;
        ensure_finite(self.pitch, "pitch")?;
        ensure_finite(self.yaw, "yaw")?;
        ensure_finite(self.gyro.x, "gyro_x")?;
        ensure_finite(self.gyro.y, "gyro_y")?;
        ensure_finite(self.gyro.z, "gyro_z")?;
        ensure_finite(self.altitude, "altitude")?;
        Ok(())
    }
}

/// Low-pass filtered orientation and angular rates carried across ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterState {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub gyro: Vector3<f64>,
}

/// Single-pole exponential moving average applied per channel:
/// `filtered = retention * filtered_prev + (1 - retention) * raw`.
#[derive(Clone, Copy, Debug)]
pub struct SignalFilter {
    retention: f64,
}

impl SignalFilter {
    pub fn new(retention: f64) -> Self {
        Self { retention }
    }

    pub fn update(&self, prev: &FilterState, frame: &SensorFrame) -> FilterState {
        let keep = self.retention;
        let take = 1.0 - keep;

        FilterState {
            roll: keep * prev.roll + take * frame.roll,
            pitch: keep * prev.pitch + take * frame.pitch,
            yaw: keep * prev.yaw + take * frame.yaw,
            gyro: prev.gyro * keep + frame.gyro * take,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f64) -> SensorFrame {
        SensorFrame {
            roll: value,
            pitch: value,
            yaw: value,
            gyro: Vector3::new(value, value, value),
            altitude: 1.0,
        }
    }

    #[test]
    fn test_single_step_matches_ema() {
        let filter = SignalFilter::new(0.9);
        let prev = FilterState {
            roll: 0.5,
            pitch: -0.2,
            yaw: 1.0,
            gyro: Vector3::new(0.1, 0.0, -0.1),
        };
        let next = filter.update(&prev, &frame(1.0));

        assert!((next.roll - (0.9 * 0.5 + 0.1)).abs() < 1e-12);
        assert!((next.pitch - (0.9 * -0.2 + 0.1)).abs() < 1e-12);
        assert!((next.yaw - 1.0).abs() < 1e-12);
        assert!((next.gyro.z - (0.9 * -0.1 + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_converges_to_constant_input() {
        for retention in [0.1, 0.5, 0.9, 0.99] {
            let filter = SignalFilter::new(retention);
            let mut state = FilterState {
                roll: -3.0,
                ..FilterState::default()
            };
            let target = frame(0.7);
            let mut last_gap = f64::INFINITY;
            for _ in 0..5000 {
                state = filter.update(&state, &target);
                let gap = (state.roll - 0.7).abs();
                assert!(gap <= last_gap + 1e-15);
                last_gap = gap;
            }
            assert!(last_gap < 1e-6, "retention {retention} left gap {last_gap}");
            assert!((state.gyro.y - 0.7).abs() < 1e-6);
        }
    }

    #[test]
    fn test_output_stays_within_input_range() {
        let filter = SignalFilter::new(0.9);
        let mut state = FilterState::default();
        for i in 0..200 {
            let raw = if i % 2 == 0 { 1.0 } else { -1.0 };
            state = filter.update(&state, &frame(raw));
            assert!(state.roll.abs() <= 1.0);
        }
    }

    #[test]
    fn test_frame_validation() {
        assert!(frame(0.0).validate().is_ok());
        let mut bad = frame(0.0);
        bad.gyro.y = f64::NAN;
        assert!(matches!(
            bad.validate(),
            Err(FlightError::NonFiniteSignal { signal: "gyro_y" })
        ));
    }
}
