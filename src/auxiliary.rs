use crate::config::AuxiliaryConfig;
use crate::filter::FilterState;

/// Camera gimbal and status LED outputs for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuxiliaryCommand {
    pub gimbal_roll: f64,
    pub gimbal_pitch: f64,
    pub left_led: bool,
    pub right_led: bool,
}

/// Counter-rotates the camera against body rates and blinks the front LEDs
/// alternately, one phase per simulated second.
pub struct AuxiliaryOutputs {
    gimbal_gain: f64,
}

impl AuxiliaryOutputs {
    pub fn new(config: AuxiliaryConfig) -> Self {
        Self {
            gimbal_gain: config.gimbal_gain,
        }
    }

    pub fn compute(&self, filtered: &FilterState, sim_time: f64) -> AuxiliaryCommand {
        let odd_second = (sim_time.max(0.0).floor() as u64) % 2 == 1;
        AuxiliaryCommand {
            gimbal_roll: -self.gimbal_gain * filtered.gyro.x,
            gimbal_pitch: -self.gimbal_gain * filtered.gyro.y,
            left_led: odd_second,
            right_led: !odd_second,
        }
    }
}
