//! Quad-rotor stabilization loop.
//!
//! Filters noisy attitude, rate and altitude readings, runs PID attitude
//! control with anti-windup and a cubic altitude law, and mixes the result
//! into four clamped X-frame motor commands once per host tick.

mod logger;

pub mod auxiliary;
pub mod config;
pub mod control;
pub mod correction;
pub mod error;
pub mod filter;
pub mod flight_loop;
pub mod input;
pub mod mixer;
pub mod telemetry;

pub use config::FlightConfig;
pub use correction::CorrectionService;
pub use error::FlightError;
pub use filter::SensorFrame;
pub use flight_loop::{ActuatorSink, ControlLoop, LoopState, PilotInput, SensorSource};
pub use input::KeyCode;
pub use mixer::MotorCommand;
pub use telemetry::TelemetryLink;
