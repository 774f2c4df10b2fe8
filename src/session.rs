// src/session.rs - Capture session: subject, mass and the photographs of each view

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::calibration::CalibrationSource;
use crate::errors::{BodyMeasureError, Result};
use crate::mask::MaskFormat;
use crate::measurement::ViewKind;

/// Inputs of one view: mask, keypoints and how to calibrate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewInput {
    pub kind: ViewKind,
    pub mask: PathBuf,
    #[serde(default)]
    pub mask_format: MaskFormat,
    pub keypoints: PathBuf,
    pub calibration: CalibrationSource,
}

/// A session file lists every photograph of one subject.
///
/// ```toml
/// subject = "jane"
/// mass = 61.5
///
/// [[views]]
/// kind = "front"
/// mask = "front_edges.png"
/// keypoints = "front.json"
/// [views.calibration]
/// source = "pattern"
/// image = "front_board.jpg"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub subject: String,
    #[serde(default)]
    pub mass: Option<f64>,
    #[serde(default)]
    pub views: Vec<ViewInput>,
}

impl Session {
    /// Load a session file; relative paths are resolved against its directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BodyMeasureError::InvalidPath(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let mut session: Session = toml::from_str(&content).map_err(|source| {
            BodyMeasureError::ConfigLoad {
                source,
                path: path.to_path_buf(),
            }
        })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        session.resolve_paths(base_dir);
        session.validate()?;
        Ok(session)
    }

    /// Make every relative input path relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        for view in &mut self.views {
            resolve(&mut view.mask);
            resolve(&mut view.keypoints);
            if let CalibrationSource::Pattern { image, .. } = &mut view.calibration {
                resolve(image);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(BodyMeasureError::Config("session subject must not be empty".to_string()));
        }

        if let Some(mass) = self.mass {
            if !(mass > 0.0 && mass.is_finite()) {
                return Err(BodyMeasureError::Config(format!(
                    "session mass must be positive, got {}",
                    mass
                )));
            }
        }

        for (i, view) in self.views.iter().enumerate() {
            if self.views[..i].iter().any(|v| v.kind == view.kind) {
                return Err(BodyMeasureError::Config(format!(
                    "view '{}' is listed more than once",
                    view.kind
                )));
            }

            match &view.calibration {
                CalibrationSource::Pattern { pattern, .. } => pattern.validate()?,
                CalibrationSource::Fixed { horizontal_scale, vertical_scale } => {
                    if !(*horizontal_scale > 0.0 && *vertical_scale > 0.0) {
                        return Err(BodyMeasureError::Config(format!(
                            "{} view: fixed scales must be positive",
                            view.kind
                        )));
                    }
                }
                CalibrationSource::ReferenceSegment { length, .. } => {
                    if !(*length > 0.0) {
                        return Err(BodyMeasureError::Config(format!(
                            "{} view: reference segment length must be positive",
                            view.kind
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn view(&self, kind: ViewKind) -> Option<&ViewInput> {
        self.views.iter().find(|v| v.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = r#"
        subject = "jane"
        mass = 61.5

        [[views]]
        kind = "front"
        mask = "front.png"
        keypoints = "front.json"
        [views.calibration]
        source = "pattern"
        image = "boards/front.jpg"
        [views.calibration.standoff]
        camera_to_subject = 300.0
        wall_to_subject = 350.0

        [[views]]
        kind = "side"
        mask = "/data/side.png"
        mask_format = "silhouette"
        keypoints = "side.json"
        [views.calibration]
        source = "fixed"
        horizontal_scale = 0.25
        vertical_scale = 0.25

        [[views]]
        kind = "tuck"
        mask = "tuck.png"
        keypoints = "tuck.json"
        [views.calibration]
        source = "reference_segment"
        from = "left_elbow"
        to = "left_wrist"
        length = 23.0
    "#;

    #[test]
    fn parses_every_calibration_source() {
        let mut session: Session = toml::from_str(SESSION).unwrap();
        session.resolve_paths(Path::new("/captures/jane"));
        session.validate().unwrap();

        assert_eq!(session.mass, Some(61.5));
        let front = session.view(ViewKind::Front).unwrap();
        assert_eq!(front.mask, PathBuf::from("/captures/jane/front.png"));
        assert_eq!(front.mask_format, MaskFormat::Edges);
        match &front.calibration {
            CalibrationSource::Pattern { image, pattern, standoff } => {
                assert_eq!(image, &PathBuf::from("/captures/jane/boards/front.jpg"));
                assert_eq!(pattern.inner_corners, 5);
                assert_eq!(standoff.map(|s| s.wall_to_subject), Some(350.0));
            }
            other => panic!("unexpected calibration {:?}", other),
        }

        let side = session.view(ViewKind::Side).unwrap();
        assert_eq!(side.mask, PathBuf::from("/data/side.png"));
        assert_eq!(side.mask_format, MaskFormat::Silhouette);
        assert!(matches!(side.calibration, CalibrationSource::Fixed { .. }));

        let tuck = session.view(ViewKind::Tuck).unwrap();
        assert!(matches!(
            &tuck.calibration,
            CalibrationSource::ReferenceSegment { length, .. } if *length == 23.0
        ));
        assert!(session.view(ViewKind::Pike).is_none());
    }

    #[test]
    fn example_session_is_valid() {
        let session: Session = toml::from_str(include_str!("../session.example.toml")).unwrap();
        session.validate().unwrap();
        assert_eq!(session.views.len(), 4);
        assert!(ViewKind::ALL.iter().all(|kind| session.view(*kind).is_some()));
    }

    #[test]
    fn duplicate_views_are_rejected() {
        let session = Session {
            subject: "x".to_string(),
            mass: None,
            views: vec![
                ViewInput {
                    kind: ViewKind::Front,
                    mask: PathBuf::from("a.png"),
                    mask_format: MaskFormat::Edges,
                    keypoints: PathBuf::from("a.json"),
                    calibration: CalibrationSource::Fixed {
                        horizontal_scale: 1.0,
                        vertical_scale: 1.0,
                    },
                };
                2
            ],
        };
        assert!(session.validate().is_err());
    }
}
