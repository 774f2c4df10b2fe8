use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::geometry::Point;

/// Custom error types for body measurement extraction
#[derive(Error, Debug)]
pub enum BodyMeasureError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("No edge found from ({:.1}, {:.1}) at {angle:.3} rad", .origin.x, .origin.y)]
    EdgeNotFound { origin: Point, angle: f64 },

    #[error("Calibration pattern not found: {0}")]
    CalibrationPatternNotFound(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Landmark not available: {0}")]
    MissingLandmark(String),

    #[error("Measurement {key} = {value:.1} is outside the plausible range (max {ceiling:.1})")]
    MeasurementOutOfRange { key: String, value: f64, ceiling: f64 },

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, BodyMeasureError>;

/// Why a measurement key ended up without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EdgeNotFound,
    CalibrationPatternNotFound,
    DegenerateGeometry,
    MissingLandmark,
    MissingDependency,
    NonPositiveValue,
    ViewNotSupplied,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::EdgeNotFound => "edge not found",
            FailureKind::CalibrationPatternNotFound => "calibration pattern not found",
            FailureKind::DegenerateGeometry => "degenerate geometry",
            FailureKind::MissingLandmark => "missing landmark",
            FailureKind::MissingDependency => "missing dependency",
            FailureKind::NonPositiveValue => "non-positive value",
            FailureKind::ViewNotSupplied => "view not supplied",
        };
        f.write_str(label)
    }
}

/// Serialisable record of a per-measurement failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl MeasurementFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for MeasurementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl From<&BodyMeasureError> for MeasurementFailure {
    fn from(error: &BodyMeasureError) -> Self {
        let kind = match error {
            BodyMeasureError::EdgeNotFound { .. } => FailureKind::EdgeNotFound,
            BodyMeasureError::CalibrationPatternNotFound(_) => {
                FailureKind::CalibrationPatternNotFound
            }
            BodyMeasureError::MissingLandmark(_) => FailureKind::MissingLandmark,
            _ => FailureKind::DegenerateGeometry,
        };
        MeasurementFailure::new(kind, error.to_string())
    }
}

impl From<BodyMeasureError> for MeasurementFailure {
    fn from(error: BodyMeasureError) -> Self {
        MeasurementFailure::from(&error)
    }
}
