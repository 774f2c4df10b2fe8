// src/config.rs - Engine configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::calibration::CalibrationSettings;
use crate::errors::{BodyMeasureError, Result};
use crate::extent::ExtentSettings;
use crate::extremity::ExtremitySettings;
use crate::measurement::MeasurementKind;
use crate::ray_march::MarchSettings;
use crate::refine::{AnatomicalProportions, RefineSettings};
use crate::repair::DEFAULT_EPSILON;

/// Configuration for the measurement extraction engine
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: String,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    /// Write overlay images of landmarks and measured spans per view.
    #[serde(default)]
    pub debug_images: bool,

    /// Keypoints below this confidence are treated as undetected.
    #[serde(default = "default_min_keypoint_confidence")]
    pub min_keypoint_confidence: f64,

    /// Luma at or above which an edge-mask pixel is boundary.
    #[serde(default = "default_mask_threshold")]
    pub mask_threshold: u8,

    /// Luma above which an opaque silhouette pixel is foreground.
    #[serde(default = "default_silhouette_threshold")]
    pub silhouette_threshold: u8,

    /// Relative offset keeping repaired widths strictly inside `2 < P/W < π`.
    #[serde(default = "default_repair_epsilon")]
    pub repair_epsilon: f64,

    /// Unit of every emitted value.
    #[serde(default = "default_length_unit")]
    pub length_unit: String,

    /// Factor from `length_unit` to metres, written to the model file header.
    #[serde(default = "default_measurement_conversion_factor")]
    pub measurement_conversion_factor: f64,

    #[serde(default)]
    pub march: MarchSettings,

    #[serde(default)]
    pub extent: ExtentSettings,

    #[serde(default)]
    pub extremity: ExtremitySettings,

    #[serde(default)]
    pub refine: RefineSettings,

    #[serde(default)]
    pub proportions: AnatomicalProportions,

    #[serde(default)]
    pub calibration: CalibrationSettings,

    #[serde(default)]
    pub plausibility: PlausibilitySettings,
}

/// Anatomical ceilings above which a value is flagged (still emitted).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PlausibilitySettings {
    pub max_length: f64,
    pub max_width: f64,
    pub max_depth: f64,
    pub max_perimeter: f64,
    /// Per-key ceilings overriding the per-kind ones.
    pub overrides: BTreeMap<String, f64>,
}

impl Default for PlausibilitySettings {
    fn default() -> Self {
        Self {
            max_length: 120.0,
            max_width: 70.0,
            max_depth: 50.0,
            max_perimeter: 160.0,
            overrides: BTreeMap::new(),
        }
    }
}

impl PlausibilitySettings {
    pub fn ceiling(&self, key: &str, kind: MeasurementKind) -> f64 {
        if let Some(ceiling) = self.overrides.get(key) {
            return *ceiling;
        }
        match kind {
            MeasurementKind::Length => self.max_length,
            MeasurementKind::Width => self.max_width,
            MeasurementKind::Depth => self.max_depth,
            MeasurementKind::Perimeter => self.max_perimeter,
        }
    }
}

fn default_output_base_dir() -> String {
    "./output".to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_min_keypoint_confidence() -> f64 {
    0.1
}

fn default_mask_threshold() -> u8 {
    128
}

fn default_silhouette_threshold() -> u8 {
    5
}

fn default_repair_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_length_unit() -> String {
    "cm".to_string()
}

fn default_measurement_conversion_factor() -> f64 {
    0.01 // cm -> m
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_base_dir: default_output_base_dir(),
            use_parallel: true,
            debug_images: false,
            min_keypoint_confidence: default_min_keypoint_confidence(),
            mask_threshold: default_mask_threshold(),
            silhouette_threshold: default_silhouette_threshold(),
            repair_epsilon: DEFAULT_EPSILON,
            length_unit: default_length_unit(),
            measurement_conversion_factor: default_measurement_conversion_factor(),
            march: MarchSettings::default(),
            extent: ExtentSettings::default(),
            extremity: ExtremitySettings::default(),
            refine: RefineSettings::default(),
            proportions: AnatomicalProportions::default(),
            calibration: CalibrationSettings::default(),
            plausibility: PlausibilitySettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BodyMeasureError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|source| BodyMeasureError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })?;

        Ok(config)
    }

    /// Validate configuration values (does not touch the filesystem)
    pub fn validate(&self) -> Result<()> {
        if self.march.step <= 0.0 || !self.march.step.is_finite() {
            return Err(BodyMeasureError::Config("march.step must be > 0.0".to_string()));
        }

        if self.march.max_steps == Some(0) {
            return Err(BodyMeasureError::Config("march.max_steps must be > 0".to_string()));
        }

        if self.extent.samples < 2 {
            return Err(BodyMeasureError::Config("extent.samples must be >= 2".to_string()));
        }

        if self.extent.guard_ratio <= 1.0 {
            return Err(BodyMeasureError::Config(
                "extent.guard_ratio must be > 1.0".to_string(),
            ));
        }

        if self.extremity.angle_step <= 0.0 || self.extremity.max_sweep < self.extremity.angle_step {
            return Err(BodyMeasureError::Config(
                "extremity.angle_step must be > 0.0 and <= extremity.max_sweep".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.refine.acromion_medial_fraction) {
            return Err(BodyMeasureError::Config(
                "refine.acromion_medial_fraction must be in [0.0, 1.0)".to_string(),
            ));
        }

        if self.refine.head_margin < 0.0 {
            return Err(BodyMeasureError::Config(
                "refine.head_margin must be >= 0.0".to_string(),
            ));
        }

        for (name, value) in self.proportions.fractions() {
            if !(0.0..=1.0).contains(&value) {
                return Err(BodyMeasureError::Config(format!(
                    "proportions.{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.min_keypoint_confidence) {
            return Err(BodyMeasureError::Config(
                "min_keypoint_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.repair_epsilon <= 0.0 || self.repair_epsilon >= 0.1 {
            return Err(BodyMeasureError::Config(
                "repair_epsilon must be > 0.0 and < 0.1".to_string(),
            ));
        }

        if self.measurement_conversion_factor <= 0.0 {
            return Err(BodyMeasureError::Config(
                "measurement_conversion_factor must be > 0.0".to_string(),
            ));
        }

        let corners = &self.calibration.corners;
        if corners.blur_sigma <= 0.0 || corners.nms_radius == 0 || corners.refine_half_window == 0 {
            return Err(BodyMeasureError::Config(
                "calibration.corners: blur_sigma, nms_radius and refine_half_window must be > 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&corners.relative_threshold) {
            return Err(BodyMeasureError::Config(
                "calibration.corners.relative_threshold must be in [0.0, 1.0)".to_string(),
            ));
        }

        Ok(())
    }

    /// Create the output directory
    pub fn prepare_output_dir(&self) -> Result<PathBuf> {
        let base_dir = PathBuf::from(&self.output_base_dir);
        fs::create_dir_all(&base_dir).map_err(|e| {
            BodyMeasureError::Io(io::Error::new(
                ErrorKind::Other,
                format!("Failed to create output directory '{}': {}", base_dir.display(), e),
            ))
        })?;
        Ok(base_dir)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            BodyMeasureError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            use_parallel = false

            [extent]
            samples = 50

            [proportions]
            umbilicus_fraction = 0.35

            [plausibility.overrides]
            Ls8L = 40.0
            "#,
        )
        .unwrap();

        assert!(!config.use_parallel);
        assert_eq!(config.extent.samples, 50);
        assert_eq!(config.extent.guard_ratio, 1.5);
        assert_eq!(config.proportions.umbilicus_fraction, 0.35);
        assert_eq!(config.proportions.rib_fraction, 0.5);
        assert_eq!(config.march.step, 0.01);
        assert_eq!(config.silhouette_threshold, 5);
        assert_eq!(config.plausibility.ceiling("Ls8L", MeasurementKind::Length), 40.0);
        assert_eq!(config.plausibility.ceiling("Ls7L", MeasurementKind::Length), 120.0);
        config.validate().unwrap();
    }

    #[test]
    fn default_config_round_trips() {
        let original = Config::default();
        let text = toml::to_string_pretty(&original).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.extent.samples, original.extent.samples);
        assert_eq!(parsed.calibration.corners.nms_radius, original.calibration.corners.nms_radius);
        assert_eq!(parsed.repair_epsilon, original.repair_epsilon);
        parsed.validate().unwrap();
    }

    #[test]
    fn shipped_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.plausibility.ceiling("Ls1p", MeasurementKind::Perimeter), 180.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        config.extent.guard_ratio = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.proportions.neck_fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
