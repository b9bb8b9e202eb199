//! Tuning constants and runtime settings for the stabilization loop.
//!
//! Every section deserializes with `#[serde(default)]`, so a JSON file only
//! needs to list the values it changes:
//!
//! ```json
//! { "attitude": { "kp_roll": 5.5 }, "telemetry": { "interval": 5 } }
//! ```

use crate::error::FlightError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const CONFIG_PATH_VAR: &str = "DRONE_CONFIG";
const TELEMETRY_ADDR_VAR: &str = "DRONE_TELEMETRY_ADDR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub filter: FilterConfig,
    pub shaping: ShapingConfig,
    pub attitude: AttitudeGains,
    pub altitude: AltitudeGains,
    pub mixer: MixerConfig,
    pub auxiliary: AuxiliaryConfig,
    pub run: RunConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Weight kept from the previous filtered value, in (0, 1).
    pub retention: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { retention: 0.9 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    pub smoothing: f64,
    pub forward_power: f64,
    pub strafe_power: f64,
    pub yaw_power: f64,
    pub max_roll_rate: f64,
    pub max_pitch_rate: f64,
    pub max_yaw_rate: f64,
    /// Meters added or removed per altitude key event.
    pub altitude_step: f64,
    pub altitude_floor: f64,
    pub initial_altitude: f64,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.85,
            forward_power: 0.3,
            strafe_power: 0.3,
            yaw_power: 0.25,
            max_roll_rate: 0.3,
            max_pitch_rate: 0.3,
            max_yaw_rate: 0.4,
            altitude_step: 0.05,
            altitude_floor: 0.1,
            initial_altitude: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AttitudeGains {
    pub kp_roll: f64,
    pub kp_pitch: f64,
    pub kp_yaw: f64,
    pub kd_roll: f64,
    pub kd_pitch: f64,
    pub kd_yaw: f64,
    /// Integral gain shared by roll and pitch.
    pub ki_roll_pitch: f64,
    pub ki_yaw: f64,
    pub integral_limit: f64,
    /// Per-tick leak applied to an idle integral.
    pub integral_decay: f64,
    pub angle_threshold: f64,
    pub command_threshold: f64,
    pub yaw_rate_threshold: f64,
    pub roll_pitch_bound: f64,
    pub yaw_bound: f64,
}

impl Default for AttitudeGains {
    fn default() -> Self {
        Self {
            kp_roll: 6.0,
            kp_pitch: 6.0,
            kp_yaw: 2.0,
            kd_roll: 3.0,
            kd_pitch: 3.0,
            kd_yaw: 2.0,
            ki_roll_pitch: 0.3,
            ki_yaw: 0.2,
            integral_limit: 0.5,
            integral_decay: 0.98,
            angle_threshold: 0.05,
            command_threshold: 0.01,
            yaw_rate_threshold: 0.1,
            roll_pitch_bound: 12.0,
            yaw_bound: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AltitudeGains {
    pub kp_vertical: f64,
    pub vertical_offset: f64,
    pub error_bound: f64,
}

impl Default for AltitudeGains {
    fn default() -> Self {
        Self {
            kp_vertical: 2.5,
            vertical_offset: 0.6,
            error_bound: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub baseline_thrust: f64,
    pub max_thrust: f64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            baseline_thrust: 68.5,
            max_thrust: 600.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AuxiliaryConfig {
    pub gimbal_gain: f64,
}

impl Default for AuxiliaryConfig {
    fn default() -> Self {
        Self { gimbal_gain: 0.03 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Simulated seconds to wait for the sensors before the first control tick.
    pub warmup: f64,
    pub status_interval: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup: 1.0,
            status_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub address: String,
    /// A record is emitted every `interval` control ticks.
    pub interval: u64,
    pub queue_capacity: usize,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8766".to_string(),
            interval: 10,
            queue_capacity: 64,
            connect_timeout_ms: 200,
            write_timeout_ms: 200,
        }
    }
}

impl TelemetryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl FlightConfig {
    /// Reads a JSON configuration file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlightError> {
        let raw = std::fs::read_to_string(path)?;
        let config: FlightConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by the file named in `DRONE_CONFIG` and by
    /// `DRONE_TELEMETRY_ADDR`.
    pub fn from_env() -> Result<Self, FlightError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var(TELEMETRY_ADDR_VAR) {
            config.telemetry.address = addr;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FlightError> {
        let unit_open = |v: f64| v > 0.0 && v < 1.0;
        if !unit_open(self.filter.retention) {
            return Err(FlightError::Config("filter.retention must lie in (0, 1)".into()));
        }
        if !unit_open(self.shaping.smoothing) {
            return Err(FlightError::Config("shaping.smoothing must lie in (0, 1)".into()));
        }
        if !(self.attitude.integral_decay >= 0.0 && self.attitude.integral_decay <= 1.0) {
            return Err(FlightError::Config("attitude.integral_decay must lie in [0, 1]".into()));
        }
        let positive = [
            ("shaping.max_roll_rate", self.shaping.max_roll_rate),
            ("shaping.max_pitch_rate", self.shaping.max_pitch_rate),
            ("shaping.max_yaw_rate", self.shaping.max_yaw_rate),
            ("shaping.altitude_floor", self.shaping.altitude_floor),
            ("attitude.integral_limit", self.attitude.integral_limit),
            ("attitude.roll_pitch_bound", self.attitude.roll_pitch_bound),
            ("attitude.yaw_bound", self.attitude.yaw_bound),
            ("altitude.error_bound", self.altitude.error_bound),
            ("mixer.max_thrust", self.mixer.max_thrust),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(FlightError::Config(format!("{name} must be positive")));
        }
        if self.shaping.initial_altitude < self.shaping.altitude_floor {
            return Err(FlightError::Config(
                "shaping.initial_altitude is below shaping.altitude_floor".into(),
            ));
        }
        if self.telemetry.interval == 0 || self.run.status_interval == 0 {
            return Err(FlightError::Config("tick intervals must be non-zero".into()));
        }
        if self.telemetry.queue_capacity == 0 {
            return Err(FlightError::Config("telemetry.queue_capacity must be non-zero".into()));
        }
        Ok(())
    }
}
