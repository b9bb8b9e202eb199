use std::fmt;

/// Failures surfaced by the stabilization loop and its collaborators.
///
/// Only `Sensing` and `Actuation` end the loop. The correction service and
/// the telemetry sink recover locally, and `NonFiniteSignal` skips a single
/// tick.
#[derive(Debug)]
pub enum FlightError {
    /// The host could not deliver a sensor frame.
    Sensing(String),
    /// The host rejected a motor command.
    Actuation(String),
    CorrectionService(String),
    TelemetrySink(String),
    /// A sensor reading or computed control value was NaN or infinite.
    NonFiniteSignal { signal: &'static str },
    Config(String),
}

impl FlightError {
    /// Whether the loop has to stop because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlightError::Sensing(_) | FlightError::Actuation(_))
    }
}

impl fmt::Display for FlightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightError::Sensing(msg) => write!(f, "sensing failure: {msg}"),
            FlightError::Actuation(msg) => write!(f, "actuation failure: {msg}"),
            FlightError::CorrectionService(msg) => write!(f, "correction service failure: {msg}"),
            FlightError::TelemetrySink(msg) => write!(f, "telemetry sink failure: {msg}"),
            FlightError::NonFiniteSignal { signal } => write!(f, "non-finite value in {signal}"),
            FlightError::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for FlightError {}

impl From<std::io::Error> for FlightError {
    fn from(value: std::io::Error) -> Self {
        FlightError::Config(value.to_string())
    }
}

impl From<serde_json::Error> for FlightError {
    fn from(value: serde_json::Error) -> Self {
        FlightError::Config(value.to_string())
    }
}

/// Rejects NaN and infinities before they reach the motors.
pub(crate) fn ensure_finite(value: f64, signal: &'static str) -> Result<f64, FlightError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FlightError::NonFiniteSignal { signal })
    }
}
