use std::collections::VecDeque;
use std::str::FromStr;

use nalgebra::Vector3;
use uav_stabilizer::{
    ActuatorSink, ControlLoop, CorrectionService, FlightConfig, FlightError, KeyCode, LoopState,
    PilotInput, SensorFrame, SensorSource, TelemetryLink,
};

/// Replays a decaying roll/pitch wobble while climbing toward hover height.
struct ReplayedSensors {
    now: f64,
}

impl SensorSource for ReplayedSensors {
    fn read_frame(&mut self) -> Result<SensorFrame, FlightError> {
        let t = self.now;
        let envelope = (-t / 2.0).exp();
        Ok(SensorFrame {
            roll: 0.15 * envelope * (3.0 * t).cos(),
            pitch: -0.08 * envelope * (2.0 * t).sin(),
            yaw: 0.02 * t,
            gyro: Vector3::new(
                -0.45 * envelope * (3.0 * t).sin(),
                -0.16 * envelope * (2.0 * t).cos(),
                0.02,
            ),
            altitude: 1.6 * (1.0 - (-t).exp()),
        })
    }
}

/// Releases keys from a timed script once their time has come.
struct ScriptedPilot {
    now: f64,
    script: VecDeque<(f64, KeyCode)>,
}

impl PilotInput for ScriptedPilot {
    fn poll_key(&mut self) -> Option<KeyCode> {
        match self.script.front() {
            Some((at, _)) if *at <= self.now => self.script.pop_front().map(|(_, key)| key),
            _ => None,
        }
    }
}

struct PrintingMotors {
    commands: u64,
}

impl ActuatorSink for PrintingMotors {
    fn apply(&mut self, velocities: [f64; 4]) -> Result<(), FlightError> {
        if self.commands % 50 == 0 || velocities.iter().all(|v| *v == 0.0) {
            println!(
                "motors: FL {:7.2} FR {:7.2} RL {:7.2} RR {:7.2}",
                velocities[0], velocities[1], velocities[2], velocities[3]
            );
        }
        self.commands += 1;
        Ok(())
    }
}

fn parse_script(lines: &[(f64, &str)]) -> VecDeque<(f64, KeyCode)> {
    lines
        .iter()
        .filter_map(|(at, key)| KeyCode::from_str(key).ok().map(|k| (*at, k)))
        .collect()
}

fn main() -> Result<(), FlightError> {
    let config = FlightConfig::from_env()?;
    let script = parse_script(&[
        (2.0, "w"),
        (2.1, "w"),
        (3.0, "up"),
        (3.0, "left"),
        (4.5, "a"),
        (6.0, "s"),
        (8.0, "end"),
    ]);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| FlightError::TelemetrySink(e.to_string()))?;
    let link = TelemetryLink::spawn(runtime.handle(), &config.telemetry);
    let correction = match std::env::var("DRONE_CORRECTION_MODEL") {
        Ok(path) => CorrectionService::from_model_file(path),
        Err(_) => CorrectionService::Unavailable,
    };

    let mut control = ControlLoop::new(
        config,
        ReplayedSensors { now: 0.0 },
        PrintingMotors { commands: 0 },
        ScriptedPilot { now: 0.0, script },
    )?
    .with_correction(correction)
    .with_telemetry(link);

    let dt = 0.032; // 32 ms host tick
    let mut sim_time = 0.0;
    while sim_time < 20.0 {
        sim_time += dt;
        control.sensors_mut().now = sim_time;
        control.pilot_mut().now = sim_time;
        if control.step(sim_time, dt)? == LoopState::Stopped {
            break;
        }
    }

    println!(
        "stopped at t={sim_time:.2}s after {} control ticks, state {}",
        control.tick_count(),
        control.loop_state()
    );
    Ok(())
}
