//! Per-tick orchestration of the stabilization pipeline.
//!
//! The host calls [`ControlLoop::step`] once per fixed tick. Each call drains
//! pilot input, filters the sensor frame, runs the attitude and altitude laws,
//! mixes the motors and hands derived metrics to the correction service and
//! the telemetry queue. All persistent controller state lives in one
//! [`ControllerState`] owned by the loop.

use crate::auxiliary::AuxiliaryOutputs;
use crate::config::FlightConfig;
use crate::control::{AltitudeController, AttitudeController, AxisEfforts, PidState};
use crate::correction::{CorrectionRequest, CorrectionService, OrientationError};
use crate::error::{ensure_finite, FlightError};
use crate::filter::{FilterState, SensorFrame, SignalFilter};
use crate::input::{ControlCommand, InputShaper, KeyCode, SetpointState, ShapeOutcome};
use crate::mixer::{MotorCommand, MotorMixer};
use crate::telemetry::{TelemetryLink, TelemetryRecord};
use crate::{error, info};
use strum_macros::Display;


/// Latest readings from the host's inertial unit, gyro and altimeter.
pub trait SensorSource {
    fn read_frame(&mut self) -> Result<SensorFrame, FlightError>;
}

/// Motor and auxiliary actuators of the host.
pub trait ActuatorSink {
    /// Receives signed rotor velocities in front-left, front-right, rear-left,
    /// rear-right order. Front-right and rear-left arrive negated; every
    /// magnitude lies within `[0, max_thrust]`.
    fn apply(&mut self, velocities: [f64; 4]) -> Result<(), FlightError>;

    fn set_gimbal(&mut self, _roll: f64, _pitch: f64) {}

    fn set_leds(&mut self, _left: bool, _right: bool) {}
}

/// Non-blocking keyboard poll; `None` means no key is pending.
pub trait PilotInput {
    fn poll_key(&mut self) -> Option<KeyCode>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LoopState {
    Running,
    Terminating,
    Stopped,
}

/// Everything the controller remembers from one tick to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub filter: FilterState,
    pub pid: PidState,
    pub setpoint: SetpointState,
}

impl ControllerState {
    pub fn new(target_altitude: f64) -> Self {
        Self {
            filter: FilterState::default(),
            pid: PidState::default(),
            setpoint: SetpointState::new(target_altitude),
        }
    }
}

/// Values derived during one successful control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    pub efforts: AxisEfforts,
    pub motors: MotorCommand,
    pub total_thrust: f64,
    pub stability_index: f64,
}

/// The filter, control laws and mixer, free of any I/O.
pub struct Stabilizer {
    filter: SignalFilter,
    attitude: AttitudeController,
    altitude: AltitudeController,
    mixer: MotorMixer,
}

impl Stabilizer {
    pub fn new(config: &FlightConfig) -> Self {
        Self {
            filter: SignalFilter::new(config.filter.retention),
            attitude: AttitudeController::new(config.attitude),
            altitude: AltitudeController::new(config.altitude),
            mixer: MotorMixer::new(config.mixer),
        }
    }

    /// Consumes the previous state and returns its successor with the motor
    /// command for this tick. On error the caller still holds its own copy
    /// of the previous state.
    pub fn advance(
        &self,
        mut state: ControllerState,
        frame: &SensorFrame,
        command: &ControlCommand,
        dt: f64,
    ) -> Result<(ControllerState, TickOutput), FlightError> {
        frame.validate()?;
        ensure_finite(dt, "dt")?;

        state.filter = self.filter.update(&state.filter, frame);
        let mut efforts =
            self.attitude
                .update(&mut state.pid, &state.filter, command, &state.setpoint, dt);
        efforts.vertical = self
            .altitude
            .vertical_bias(state.setpoint.target_altitude, frame.altitude);

        let motors = self.mixer.mix(&efforts);
        for magnitude in motors.magnitudes() {
            ensure_finite(magnitude, "motor command")?;
        }

        let tilt = state.filter.roll.abs() + state.filter.pitch.abs();
        let output = TickOutput {
            efforts,
            motors,
            total_thrust: motors.total_thrust(),
            stability_index: (1.0 - 0.5 * tilt).clamp(0.0, 1.0),
        };
        Ok((state, output))
    }
}

pub struct ControlLoop<S, A, P> {
    config: FlightConfig,
    shaper: InputShaper,
    stabilizer: Stabilizer,
    auxiliary: AuxiliaryOutputs,
    correction: CorrectionService,
    telemetry: Option<TelemetryLink>,
    sensors: S,
    actuators: A,
    pilot: P,
    state: ControllerState,
    loop_state: LoopState,
    tick: u64,
    last_command: Option<MotorCommand>,
}

impl<S, A, P> ControlLoop<S, A, P>
where
    S: SensorSource,
    A: ActuatorSink,
    P: PilotInput,
{
    /// Builds a loop without correction service or telemetry.
    pub fn new(config: FlightConfig, sensors: S, actuators: A, pilot: P) -> Result<Self, FlightError> {
        config.validate()?;
        Ok(Self {
            shaper: InputShaper::new(config.shaping),
            stabilizer: Stabilizer::new(&config),
            auxiliary: AuxiliaryOutputs::new(config.auxiliary),
            correction: CorrectionService::Unavailable,
            telemetry: None,
            sensors,
            actuators,
            pilot,
            state: ControllerState::new(config.shaping.initial_altitude),
            loop_state: LoopState::Running,
            tick: 0,
            last_command: None,
            config,
        })
    }

    pub fn with_correction(mut self, correction: CorrectionService) -> Self {
        self.correction = correction;
        self
    }

    pub fn with_telemetry(mut self, link: TelemetryLink) -> Self {
        self.telemetry = Some(link);
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    /// Completed control ticks so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn last_command(&self) -> Option<MotorCommand> {
        self.last_command
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn pilot_mut(&mut self) -> &mut P {
        &mut self.pilot
    }

    /// Runs one control tick of length `dt` ending at `sim_time`.
    ///
    /// Returns the state after the tick. Sensing and actuation failures stop
    /// the loop with a zero-thrust command and are passed back to the host;
    /// every other failure skips the tick and keeps the previous motor command.
    pub fn step(&mut self, sim_time: f64, dt: f64) -> Result<LoopState, FlightError> {
        if self.loop_state != LoopState::Running {
            return Ok(self.loop_state);
        }
        if sim_time < self.config.run.warmup {
            return Ok(LoopState::Running);
        }

        let frame = match self.sensors.read_frame() {
            Ok(frame) => frame,
            Err(e) => return Err(self.abort(e)),
        };

        let pilot = &mut self.pilot;
        let events = std::iter::from_fn(|| pilot.poll_key());
        let command = match self.shaper.shape(&mut self.state.setpoint, events) {
            ShapeOutcome::Continue(command) => command,
            ShapeOutcome::Terminate => {
                info!("Termination requested at t={sim_time:.2}s");
                self.loop_state = LoopState::Terminating;
                self.stop_motors()?;
                return Ok(self.loop_state);
            }
        };

        let (next, output) = match self.stabilizer.advance(self.state, &frame, &command, dt) {
            Ok(result) => result,
            Err(e) => {
                error!("Skipping control tick at t={sim_time:.2}s: {e}");
                return Ok(LoopState::Running);
            }
        };
        self.state = next;

        if let Err(e) = self.actuators.apply(output.motors.actuation()) {
            return Err(self.abort(e));
        }
        self.last_command = Some(output.motors);

        let aux = self.auxiliary.compute(&self.state.filter, sim_time);
        self.actuators.set_gimbal(aux.gimbal_roll, aux.gimbal_pitch);
        self.actuators.set_leds(aux.left_led, aux.right_led);

        let request =
            CorrectionRequest::new(self.state.filter.gyro, &output.motors, output.stability_index);
        let estimate = self.correction.estimate(&request);

        if self.tick % self.config.telemetry.interval == 0 {
            if let Some(link) = &self.telemetry {
                link.publish(self.record(sim_time, &frame, &command, &output, &estimate));
            }
        }
        if self.tick % self.config.run.status_interval == 0 {
            self.log_status(sim_time, &frame, &estimate);
        }

        self.tick += 1;
        Ok(LoopState::Running)
    }

    /// Issues the single zero-thrust command and moves to `Stopped`.
    fn stop_motors(&mut self) -> Result<(), FlightError> {
        let result = self.actuators.apply(MotorCommand::zero().actuation());
        self.last_command = Some(MotorCommand::zero());
        self.loop_state = LoopState::Stopped;
        info!("Motors stopped after {} control ticks", self.tick);
        result
    }

    /// Stops the loop after a host fault and returns the fault.
    fn abort(&mut self, fault: FlightError) -> FlightError {
        error!("Host fault, stopping: {fault}");
        self.loop_state = LoopState::Terminating;
        if let Err(e) = self.stop_motors() {
            error!("Zero-thrust command failed: {e}");
        }
        fault
    }

    fn record(
        &self,
        sim_time: f64,
        frame: &SensorFrame,
        command: &ControlCommand,
        output: &TickOutput,
        estimate: &OrientationError,
    ) -> TelemetryRecord {
        let filtered = &self.state.filter;
        TelemetryRecord {
            simulation_time: sim_time,
            altitude: frame.altitude,
            filtered_roll: filtered.roll,
            filtered_pitch: filtered.pitch,
            filtered_yaw: filtered.yaw,
            stability_index: output.stability_index,
            ml_roll_error: estimate.roll,
            ml_pitch_error: estimate.pitch,
            ml_yaw_error: estimate.yaw,
            gyro_x: filtered.gyro.x,
            gyro_y: filtered.gyro.y,
            gyro_z: filtered.gyro.z,
            target_altitude: self.state.setpoint.target_altitude,
            motor_velocities: output.motors.magnitudes(),
            total_thrust: output.total_thrust,
            user_inputs: command.activity,
        }
    }

    fn log_status(&self, sim_time: f64, frame: &SensorFrame, estimate: &OrientationError) {
        let ml = if self.correction.is_available() {
            format!(" | ML: roll={:.3}, pitch={:.3}", estimate.roll, estimate.pitch)
        } else {
            String::new()
        };
        info!(
            "t={sim_time:.1}s | alt {:.2} m | roll {:.1}° | pitch {:.1}°{ml}",
            frame.altitude,
            self.state.filter.roll.to_degrees(),
            self.state.filter.pitch.to_degrees(),
        );
    }
}
