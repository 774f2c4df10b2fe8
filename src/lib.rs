// src/lib.rs - Library interface for body measurement extraction

pub mod calibration;
pub mod config;
pub mod corners;
pub mod errors;
pub mod extent;
pub mod extremity;
pub mod geometry;
pub mod image_io;
pub mod image_utils;
pub mod landmarks;
pub mod mask;
pub mod measurement;
pub mod output;
pub mod perimeter;
pub mod pipeline;
pub mod ray_march;
pub mod refine;
pub mod repair;
pub mod schema;
pub mod session;

// Re-export commonly used types and functions
pub use errors::{BodyMeasureError, FailureKind, MeasurementFailure, Result};
pub use config::Config;
pub use geometry::Point;
pub use mask::{MaskFormat, SilhouetteMask};
pub use session::{Session, ViewInput};
pub use pipeline::{extract, load_views, ExtractionResult, ViewCalibration, ViewPhotograph};

// Re-export the geometric primitives
pub use ray_march::{cast, cast_required, EdgeHit, MarchSettings};
pub use extent::{
    horizontal_width,
    point_of_max_extent,
    width_along_axis,
    width_perpendicular,
    ExtentSettings,
    ExtentSpan,
};
pub use extremity::{find_extremity, Extremity, ExtremitySettings};

// Re-export calibration
pub use calibration::{
    calibrate,
    rescale,
    CalibrationFrame,
    CalibrationSource,
    PatternLayout,
    PatternSpec,
    SearchRegions,
    Standoff,
};

// Re-export the measurement model
pub use landmarks::{Keypoint, LandmarkSet, Side};
pub use measurement::{Flag, Measurement, MeasurementEntry, MeasurementKind, MeasurementSet, ViewKind};
pub use perimeter::{circle_perimeter, stadium_perimeter, CrossSection};
pub use repair::{repair, repair_outcome, RepairOutcome};
pub use schema::{MeasureOp, MeasurementRule, MeasurementSchema, PerimeterRule};
