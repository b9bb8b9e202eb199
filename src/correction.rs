//! Advisory orientation-error estimates from an external predictor.
//!
//! The estimates are reported in telemetry and never fed back into control.
//! Whether a predictor exists is decided once, when the loop is built.

use crate::error::FlightError;
use crate::mixer::MotorCommand;
use crate::{info, warn};
use nalgebra::{SMatrix, SVector, Vector3};
use serde::Deserialize;
use std::path::Path;

pub const FEATURE_COUNT: usize = 9;

/// Predictor input, in the feature order the model was fitted with.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CorrectionRequest {
    pub gyro: Vector3<f64>,
    /// Motor magnitudes before the spin-direction sign flip.
    pub motors: [f64; 4],
    pub total_thrust: f64,
    pub stability_index: f64,
}

impl CorrectionRequest {
    pub fn new(gyro: Vector3<f64>, motors: &MotorCommand, stability_index: f64) -> Self {
        Self {
            gyro,
            motors: motors.magnitudes(),
            total_thrust: motors.total_thrust(),
            stability_index,
        }
    }

    pub fn features(&self) -> SVector<f64, FEATURE_COUNT> {
        SVector::<f64, FEATURE_COUNT>::from_column_slice(&[
            self.gyro.x,
            self.gyro.y,
            self.gyro.z,
            self.motors[0],
            self.motors[1],
            self.motors[2],
            self.motors[3],
            self.total_thrust,
            self.stability_index,
        ])
    }
}

/// Estimated roll, pitch and yaw errors (radians).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrientationError {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

pub trait OrientationPredictor: Send {
    fn predict(&self, request: &CorrectionRequest) -> Result<OrientationError, FlightError>;
}

pub enum CorrectionService {
    Available(Box<dyn OrientationPredictor>),
    Unavailable,
}

impl CorrectionService {
    /// Loads a [`LinearCorrectionModel`], falling back to `Unavailable` when
    /// the file is missing or malformed.
    pub fn from_model_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match LinearCorrectionModel::load(path) {
            Ok(model) => {
                info!("Correction model loaded from {}", path.display());
                CorrectionService::Available(Box::new(model))
            }
            Err(e) => {
                warn!("Correction model unavailable ({}): {e}", path.display());
                CorrectionService::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CorrectionService::Available(_))
    }

    /// Never fails: any predictor error or non-finite estimate becomes zero.
    pub fn estimate(&self, request: &CorrectionRequest) -> OrientationError {
        let CorrectionService::Available(predictor) = self else {
            return OrientationError::default();
        };
        match predictor.predict(request) {
            Ok(est) if est.roll.is_finite() && est.pitch.is_finite() && est.yaw.is_finite() => est,
            Ok(_) => {
                warn!("Correction predictor returned a non-finite estimate");
                OrientationError::default()
            }
            Err(e) => {
                warn!("{e}");
                OrientationError::default()
            }
        }
    }
}

/// On-disk form of a standardized linear regression.
#[derive(Debug, Deserialize)]
struct LinearModelFile {
    feature_mean: [f64; FEATURE_COUNT],
    feature_scale: [f64; FEATURE_COUNT],
    coefficients: [[f64; FEATURE_COUNT]; 3],
    intercept: [f64; 3],
}

/// `y = W · ((x - mean) / scale) + b`, one output row per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearCorrectionModel {
    mean: SVector<f64, FEATURE_COUNT>,
    scale: SVector<f64, FEATURE_COUNT>,
    weights: SMatrix<f64, 3, FEATURE_COUNT>,
    intercept: Vector3<f64>,
}

impl LinearCorrectionModel {
    /// Zero scales are treated as 1 so constant features pass through centred.
    pub fn new(
        mean: SVector<f64, FEATURE_COUNT>,
        scale: SVector<f64, FEATURE_COUNT>,
        weights: SMatrix<f64, 3, FEATURE_COUNT>,
        intercept: Vector3<f64>,
    ) -> Self {
        Self {
            mean,
            scale: scale.map(|s| if s == 0.0 { 1.0 } else { s }),
            weights,
            intercept,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlightError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FlightError::CorrectionService(e.to_string()))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, FlightError> {
        let file: LinearModelFile =
            serde_json::from_str(raw).map_err(|e| FlightError::CorrectionService(e.to_string()))?;
        let weights = SMatrix::<f64, 3, FEATURE_COUNT>::from_fn(|r, c| file.coefficients[r][c]);
        Ok(Self::new(
            SVector::from(file.feature_mean),
            SVector::from(file.feature_scale),
            weights,
            Vector3::from(file.intercept),
        ))
    }
}

impl OrientationPredictor for LinearCorrectionModel {
    fn predict(&self, request: &CorrectionRequest) -> Result<OrientationError, FlightError> {
        let scaled = (request.features() - self.mean).component_div(&self.scale);
        let y = self.weights * scaled + self.intercept;
        Ok(OrientationError {
            roll: y.x,
            pitch: y.y,
            yaw: y.z,
        })
    }
}
