// src/landmarks.rs - Named landmarks of one photograph and the pose keypoint mapping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::errors::{BodyMeasureError, FailureKind, MeasurementFailure, Result};
use crate::geometry::Point;

/// How a derived landmark was obtained. The two have different failure modes:
/// mask searches can fail, interpolations never fail but may be anatomically off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationMethod {
    MaskSearch,
    Interpolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkOrigin {
    Detected,
    Derived(DerivationMethod),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub position: Point,
    pub origin: LandmarkOrigin,
}

/// Body side, as seen by the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn name(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Side-qualified landmark name, e.g. `left_shoulder`.
    pub fn landmark(&self, part: &str) -> String {
        format!("{}_{}", self.name(), part)
    }
}

/// Landmark names used outside the side-qualified ones.
pub mod names {
    pub const NOSE: &str = "nose";
    pub const TOP_OF_HEAD: &str = "top_of_head";
    pub const UMBILICUS: &str = "umbilicus";
    pub const NECK: &str = "neck";
    pub const HEAD_CENTER: &str = "head_center";
}

/// COCO-WholeBody indices of the keypoints used directly.
const BODY_PART_INDEX: &[(&str, usize)] = &[
    ("nose", 0),
    ("left_ear", 3),
    ("right_ear", 4),
    ("left_shoulder", 5),
    ("right_shoulder", 6),
    ("left_elbow", 7),
    ("right_elbow", 8),
    ("left_wrist", 9),
    ("right_wrist", 10),
    ("left_hip", 11),
    ("right_hip", 12),
    ("left_knee", 13),
    ("right_knee", 14),
    ("left_ankle", 15),
    ("right_ankle", 16),
    ("left_toe_nail", 17),
    ("left_heel", 19),
    ("right_toe_nail", 20),
    ("right_heel", 22),
    ("left_base_of_thumb", 93),
    ("right_base_of_thumb", 114),
];

/// Hand keypoints averaged into one landmark (finger bases and finger tips).
const HAND_GROUPS: &[(&str, [usize; 4])] = &[
    ("left_knuckles", [96, 100, 104, 108]),
    ("right_knuckles", [117, 121, 125, 129]),
    ("left_nails", [98, 102, 106, 110]),
    ("right_nails", [119, 123, 127, 131]),
];

/// One pose keypoint as delivered by the pose-estimation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub confidence: Option<f64>,
}

impl Keypoint {
    fn is_usable(&self, min_confidence: f64) -> bool {
        let confident = self.confidence.map_or(true, |c| c >= min_confidence);
        let unset = self.x == 0.0 && self.y == 0.0;
        confident && !unset && self.x.is_finite() && self.y.is_finite()
    }
}

/// Parse a keypoint array: `[[x, y], ...]` or `[[x, y, confidence], ...]`.
pub fn parse_keypoints(json: &str) -> Result<Vec<Keypoint>> {
    let raw: Vec<Vec<f64>> = serde_json::from_str(json)?;
    raw.into_iter()
        .enumerate()
        .map(|(i, values)| match values.as_slice() {
            [x, y] => Ok(Keypoint { x: *x, y: *y, confidence: None }),
            [x, y, c, ..] => Ok(Keypoint { x: *x, y: *y, confidence: Some(*c) }),
            _ => Err(BodyMeasureError::Config(format!(
                "keypoint {} has {} values, expected 2 or 3",
                i,
                values.len()
            ))),
        })
        .collect()
}

/// Load a keypoint JSON file.
pub fn load_keypoints<P: AsRef<Path>>(path: P) -> Result<Vec<Keypoint>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BodyMeasureError::InvalidPath(path.to_path_buf()));
    }
    parse_keypoints(&fs::read_to_string(path)?)
}

/// Landmarks of one photograph, plus the reasons derived landmarks are absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LandmarkSet {
    landmarks: BTreeMap<String, Landmark>,
    failures: BTreeMap<String, MeasurementFailure>,
}

impl LandmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the detected landmark set from a pose keypoint array.
    pub fn from_keypoints(keypoints: &[Keypoint], min_confidence: f64) -> Self {
        let mut set = Self::new();
        let usable = |index: usize| -> Option<&Keypoint> {
            keypoints.get(index).filter(|k| k.is_usable(min_confidence))
        };

        for &(name, index) in BODY_PART_INDEX {
            if let Some(k) = usable(index) {
                set.insert(name, Point::new(k.x, k.y), LandmarkOrigin::Detected);
            }
        }

        for (name, indices) in HAND_GROUPS {
            let points: Vec<Point> = indices
                .iter()
                .filter_map(|&i| usable(i))
                .map(|k| Point::new(k.x, k.y))
                .collect();
            if let Some(mean) = Point::mean(&points) {
                set.insert(name, mean, LandmarkOrigin::Derived(DerivationMethod::Interpolation));
            }
        }

        set
    }

    pub fn insert(&mut self, name: &str, position: Point, origin: LandmarkOrigin) {
        self.failures.remove(name);
        self.landmarks.insert(
            name.to_string(),
            Landmark {
                name: name.to_string(),
                position,
                origin,
            },
        );
    }

    pub fn insert_detected(&mut self, name: &str, position: Point) {
        self.insert(name, position, LandmarkOrigin::Detected);
    }

    /// Record why a derived landmark could not be produced.
    pub fn record_failure(&mut self, name: &str, failure: MeasurementFailure) {
        self.failures.insert(name.to_string(), failure);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.landmarks.contains_key(name)
    }

    pub fn landmark(&self, name: &str) -> Option<&Landmark> {
        self.landmarks.get(name)
    }

    /// Position of a landmark, or the recorded reason it is unavailable.
    pub fn get(&self, name: &str) -> std::result::Result<Point, MeasurementFailure> {
        if let Some(landmark) = self.landmarks.get(name) {
            return Ok(landmark.position);
        }
        match self.failures.get(name) {
            Some(failure) => Err(MeasurementFailure::new(
                failure.kind,
                format!("{} unavailable ({})", name, failure.detail),
            )),
            None => Err(MeasurementFailure::new(
                FailureKind::MissingLandmark,
                format!("{} not detected", name),
            )),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.values()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_keypoint_layouts() {
        let keypoints = parse_keypoints("[[1.0, 2.0], [3.0, 4.0, 0.9]]").unwrap();
        assert_eq!(keypoints[0].confidence, None);
        assert_eq!(keypoints[1].confidence, Some(0.9));
        assert!(parse_keypoints("[[1.0]]").is_err());
    }

    #[test]
    fn short_arrays_and_low_confidence_leave_landmarks_absent() {
        let mut keypoints = vec![Keypoint { x: 10.0, y: 10.0, confidence: Some(0.9) }; 12];
        keypoints[5].confidence = Some(0.05);
        let set = LandmarkSet::from_keypoints(&keypoints, 0.1);

        assert!(set.contains("nose"));
        assert!(set.contains("left_hip"));
        assert!(!set.contains("left_shoulder"));
        assert!(!set.contains("right_hip"));
        assert_eq!(set.get("right_hip").unwrap_err().kind, FailureKind::MissingLandmark);
    }

    #[test]
    fn recorded_failures_explain_missing_landmarks() {
        let mut set = LandmarkSet::new();
        set.record_failure(
            "left_acromion",
            MeasurementFailure::new(FailureKind::EdgeNotFound, "empty crop"),
        );
        let failure = set.get("left_acromion").unwrap_err();
        assert_eq!(failure.kind, FailureKind::EdgeNotFound);
        assert!(failure.detail.contains("empty crop"));
    }
}
