use crate::config::ShapingConfig;
use crate::event;
use serde::Serialize;
use strum::EnumCount;
use strum_macros::{Display, EnumCount as EnumCountMacro, EnumIter, EnumString};

/// Discrete pilot actions recognized at the input boundary.
///
/// Parsing accepts the action name as well as the keyboard key bound to it
/// (arrows as `up`/`down`/`left`/`right`, `w`/`s` for altitude, `a`/`d` for yaw, `end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumCountMacro)]
#[strum(ascii_case_insensitive)]
pub enum KeyCode {
    #[strum(to_string = "forward", serialize = "up")]
    Forward,
    #[strum(to_string = "backward", serialize = "down")]
    Backward,
    #[strum(to_string = "strafe-left", serialize = "left")]
    StrafeLeft,
    #[strum(to_string = "strafe-right", serialize = "right")]
    StrafeRight,
    #[strum(to_string = "yaw-left", serialize = "a")]
    YawLeft,
    #[strum(to_string = "yaw-right", serialize = "d")]
    YawRight,
    #[strum(to_string = "altitude-up", serialize = "w")]
    AltitudeUp,
    #[strum(to_string = "altitude-down", serialize = "s")]
    AltitudeDown,
    #[strum(to_string = "terminate", serialize = "end")]
    Terminate,
}

/// Number of actions tracked in [`ActivityFlags`]; `Terminate` has no flag.
pub const ACTIVITY_COUNT: usize = KeyCode::COUNT - 1;

impl KeyCode {
    pub fn activity_index(self) -> Option<usize> {
        match self {
            KeyCode::Terminate => None,
            other => Some(other as usize),
        }
    }
}

/// One flag per action seen during a tick, in [`KeyCode`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityFlags([u8; ACTIVITY_COUNT]);

impl ActivityFlags {
    pub fn mark(&mut self, key: KeyCode) {
        if let Some(idx) = key.activity_index() {
            self.0[idx] = 1;
        }
    }

    pub fn is_set(&self, key: KeyCode) -> bool {
        key.activity_index().is_some_and(|idx| self.0[idx] == 1)
    }

    pub fn as_array(&self) -> [u8; ACTIVITY_COUNT] {
        self.0
    }
}

/// Raw pilot intent for a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlCommand {
    pub target_roll: f64,
    pub target_pitch: f64,
    pub target_yaw: f64,
    pub user_yaw_input: bool,
    /// Net change applied to the altitude setpoint this tick.
    pub altitude_delta: f64,
    pub activity: ActivityFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeOutcome {
    Continue(ControlCommand),
    Terminate,
}

/// Pilot-driven setpoints that persist across ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointState {
    pub target_altitude: f64,
    pub smooth_roll: f64,
    pub smooth_pitch: f64,
    pub smooth_yaw: f64,
}

impl SetpointState {
    pub fn new(target_altitude: f64) -> Self {
        Self {
            target_altitude,
            smooth_roll: 0.0,
            smooth_pitch: 0.0,
            smooth_yaw: 0.0,
        }
    }
}

/// Turns key events into attitude targets and altitude setpoint steps, then
/// smooths and rate-limits the attitude targets.
pub struct InputShaper {
    config: ShapingConfig,
}

impl InputShaper {
    pub fn new(config: ShapingConfig) -> Self {
        Self { config }
    }

    /// Drains `events` and smooths the resulting targets into `setpoint`.
    ///
    /// Events are consumed lazily: a `Terminate` stops the drain, so anything
    /// queued behind it is never pulled from the source this tick.
    pub fn shape<I>(&self, setpoint: &mut SetpointState, events: I) -> ShapeOutcome
    where
        I: IntoIterator<Item = KeyCode>,
    {
        let outcome = self.drain(setpoint, events);
        if let ShapeOutcome::Continue(command) = &outcome {
            self.smooth(setpoint, command);
        }
        outcome
    }

    /// Maps events to raw targets. Later events on the same axis overwrite
    /// earlier ones; altitude steps are applied immediately.
    pub fn drain<I>(&self, setpoint: &mut SetpointState, events: I) -> ShapeOutcome
    where
        I: IntoIterator<Item = KeyCode>,
    {
        let cfg = &self.config;
        let mut command = ControlCommand::default();

        for key in events {
            match key {
                KeyCode::Forward => command.target_pitch = -cfg.forward_power,
                KeyCode::Backward => command.target_pitch = cfg.forward_power,
                KeyCode::StrafeLeft => command.target_roll = -cfg.strafe_power,
                KeyCode::StrafeRight => command.target_roll = cfg.strafe_power,
                KeyCode::YawLeft => {
                    command.target_yaw = cfg.yaw_power;
                    command.user_yaw_input = true;
                }
                KeyCode::YawRight => {
                    command.target_yaw = -cfg.yaw_power;
                    command.user_yaw_input = true;
                }
                KeyCode::AltitudeUp | KeyCode::AltitudeDown => {
                    let previous = setpoint.target_altitude;
                    let step = if key == KeyCode::AltitudeUp {
                        cfg.altitude_step
                    } else {
                        -cfg.altitude_step
                    };
                    setpoint.target_altitude = (previous + step).max(cfg.altitude_floor);
                    command.altitude_delta += setpoint.target_altitude - previous;
                    event!("Target altitude: {:.2} m", setpoint.target_altitude);
                }
                KeyCode::Terminate => return ShapeOutcome::Terminate,
            }
            command.activity.mark(key);
        }

        ShapeOutcome::Continue(command)
    }

    /// Exponential smoothing toward the raw targets, clamped per axis.
    pub fn smooth(&self, setpoint: &mut SetpointState, command: &ControlCommand) {
        let cfg = &self.config;
        let blend = |prev: f64, target: f64| cfg.smoothing * prev + (1.0 - cfg.smoothing) * target;

        setpoint.smooth_roll = blend(setpoint.smooth_roll, command.target_roll)
            .clamp(-cfg.max_roll_rate, cfg.max_roll_rate);
        setpoint.smooth_pitch = blend(setpoint.smooth_pitch, command.target_pitch)
            .clamp(-cfg.max_pitch_rate, cfg.max_pitch_rate);
        setpoint.smooth_yaw = blend(setpoint.smooth_yaw, command.target_yaw)
            .clamp(-cfg.max_yaw_rate, cfg.max_yaw_rate);
    }
}
