// src/schema.rs - Declarative table: which measurement comes from which landmarks, view and operation

use std::collections::HashSet;

use crate::errors::{BodyMeasureError, Result};
use crate::landmarks::{names, Side};
use crate::measurement::{MeasurementKind, ViewKind};
use crate::perimeter::CrossSection;

/// Geometric operation producing one raw measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureOp {
    /// Straight-line distance between two landmarks.
    Length { from: String, to: String },
    /// Vertical component of the distance between two landmarks.
    VerticalLength { from: String, to: String },
    /// Body extent along the `at -> toward` axis, through `at`.
    WidthAlongAxis { at: String, toward: String },
    /// Body extent perpendicular to `at -> toward`, measured `along` of the way to `toward`.
    WidthPerpendicular { at: String, toward: String, along: f64 },
    /// Horizontal body extent through a landmark.
    HorizontalWidth { at: String },
    /// Distance from `anchor` to the farthest boundary point found by sweeping
    /// from the direction of `toward` (or `heading` when it is absent).
    ExtremityLength {
        anchor: String,
        toward: Option<String>,
        heading: f64,
    },
}

impl MeasureOp {
    /// Landmarks the operation reads.
    pub fn landmarks(&self) -> Vec<&str> {
        match self {
            MeasureOp::Length { from, to } | MeasureOp::VerticalLength { from, to } => {
                vec![from.as_str(), to.as_str()]
            }
            MeasureOp::WidthAlongAxis { at, toward }
            | MeasureOp::WidthPerpendicular { at, toward, .. } => vec![at.as_str(), toward.as_str()],
            MeasureOp::HorizontalWidth { at } => vec![at.as_str()],
            MeasureOp::ExtremityLength { anchor, toward, .. } => {
                let mut names = vec![anchor.as_str()];
                names.extend(toward.as_deref());
                names
            }
        }
    }
}

/// One schema key measured in one view.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRule {
    pub key: String,
    pub view: ViewKind,
    pub kind: MeasurementKind,
    pub op: MeasureOp,
    /// Written to the model file; intermediate values only feed perimeters.
    pub exported: bool,
}

/// Perimeter combining values measured in possibly different views.
#[derive(Debug, Clone, PartialEq)]
pub struct PerimeterRule {
    pub key: String,
    pub width: String,
    pub depth: Option<String>,
    pub model: CrossSection,
}

#[derive(Debug, Clone, Default)]
pub struct MeasurementSchema {
    pub rules: Vec<MeasurementRule>,
    pub perimeters: Vec<PerimeterRule>,
}

fn s(name: &str) -> String {
    name.to_string()
}

impl MeasurementSchema {
    pub fn new(rules: Vec<MeasurementRule>, perimeters: Vec<PerimeterRule>) -> Result<Self> {
        let schema = Self { rules, perimeters };
        schema.validate()?;
        Ok(schema)
    }

    fn rule(&mut self, key: &str, view: ViewKind, kind: MeasurementKind, op: MeasureOp, exported: bool) {
        self.rules.push(MeasurementRule {
            key: s(key),
            view,
            kind,
            op,
            exported,
        });
    }

    fn length(&mut self, key: &str, from: &str, to: &str) {
        let op = MeasureOp::Length { from: s(from), to: s(to) };
        self.rule(key, ViewKind::Front, MeasurementKind::Length, op, true);
    }

    fn vertical(&mut self, key: &str, from: &str, to: &str) {
        let op = MeasureOp::VerticalLength { from: s(from), to: s(to) };
        self.rule(key, ViewKind::Front, MeasurementKind::Length, op, true);
    }

    fn across(&mut self, key: &str, view: ViewKind, kind: MeasurementKind, at: &str, exported: bool) {
        let op = MeasureOp::HorizontalWidth { at: s(at) };
        self.rule(key, view, kind, op, exported);
    }

    #[allow(clippy::too_many_arguments)]
    fn perpendicular(
        &mut self,
        key: &str,
        view: ViewKind,
        kind: MeasurementKind,
        at: &str,
        toward: &str,
        along: f64,
        exported: bool,
    ) {
        let op = MeasureOp::WidthPerpendicular {
            at: s(at),
            toward: s(toward),
            along,
        };
        self.rule(key, view, kind, op, exported);
    }

    fn perimeter(&mut self, key: &str, width: &str, depth: Option<&str>) {
        self.perimeters.push(PerimeterRule {
            key: s(key),
            width: s(width),
            depth: depth.map(s),
            model: if depth.is_some() {
                CrossSection::Stadium
            } else {
                CrossSection::Circle
            },
        });
    }

    /// Measurement keys of the Yeadon inertia model.
    ///
    /// Lengths are measured from the origin of each segment: torso from the hip
    /// joint (head levels from the acromion), arm from the shoulder, hand from
    /// the wrist, leg from the hip, foot from the ankle. Left limbs use the
    /// `La`/`Lj` prefixes, right limbs `Lb`/`Lk`.
    pub fn yeadon() -> Result<Self> {
        use MeasurementKind::{Depth, Width};
        use ViewKind::{Front, Side as Profile};

        let mut schema = Self::default();

        // Torso and head
        schema.vertical("Ls1L", "left_hip", names::UMBILICUS);
        schema.vertical("Ls2L", "left_hip", "left_lowest_front_rib");
        schema.vertical("Ls3L", "left_hip", "left_nipple");
        schema.vertical("Ls4L", "left_hip", "left_shoulder");
        schema.vertical("Ls5L", "left_hip", "left_acromion");
        schema.vertical("Ls6L", "left_acromion", names::NOSE);
        schema.vertical("Ls7L", "left_acromion", "left_ear");
        schema.vertical("Ls8L", "left_acromion", names::TOP_OF_HEAD);

        let hip_axis = MeasureOp::WidthAlongAxis {
            at: s("left_hip"),
            toward: s("right_hip"),
        };
        schema.rule("Ls0w", Front, Width, hip_axis, true);
        schema.across("Ls1w", Front, Width, names::UMBILICUS, true);
        schema.across("Ls2w", Front, Width, "left_lowest_front_rib", true);
        schema.across("Ls3w", Front, Width, "left_nipple", true);
        let shoulders = MeasureOp::Length {
            from: s("left_acromion"),
            to: s("right_acromion"),
        };
        schema.rule("Ls4w", Front, Width, shoulders, true);
        schema.across("Ls5w", Front, Width, names::NECK, false);
        schema.across("Ls6w", Front, Width, names::NOSE, false);
        schema.across("Ls7w", Front, Width, names::HEAD_CENTER, false);

        schema.across("Ls0d", Profile, Depth, "left_hip", false);
        schema.across("Ls1d", Profile, Depth, names::UMBILICUS, false);
        schema.across("Ls2d", Profile, Depth, "left_lowest_front_rib", false);
        schema.across("Ls3d", Profile, Depth, "left_nipple", false);
        schema.across("Ls4d", Profile, Depth, "left_shoulder", true);

        for level in 0..4 {
            let (p, w, d) = (format!("Ls{}p", level), format!("Ls{}w", level), format!("Ls{}d", level));
            schema.perimeter(&p, &w, Some(d.as_str()));
        }
        for level in 5..8 {
            schema.perimeter(&format!("Ls{}p", level), &format!("Ls{}w", level), None);
        }

        for (side, arm, leg) in [(Side::Left, "La", "Lj"), (Side::Right, "Lb", "Lk")] {
            schema.add_arm(side, arm);
            schema.add_leg(side, leg);
        }

        schema.validate()?;
        Ok(schema)
    }

    fn add_arm(&mut self, side: Side, prefix: &str) {
        use MeasurementKind::{Depth, Width};
        use ViewKind::{Front, Tuck};

        let n = |part: &str| side.landmark(part);
        let k = |suffix: &str| format!("{}{}", prefix, suffix);

        self.length(&k("1L"), &n("shoulder"), &n("mid_arm"));
        self.length(&k("2L"), &n("shoulder"), &n("elbow"));
        self.length(&k("3L"), &n("shoulder"), &n("max_forearm"));
        self.length(&k("4L"), &n("shoulder"), &n("wrist"));
        self.length(&k("5L"), &n("wrist"), &n("base_of_thumb"));
        self.length(&k("6L"), &n("wrist"), &n("knuckles"));
        self.length(&k("7L"), &n("wrist"), &n("nails"));

        // Arm levels: circular cross-sections
        self.perpendicular(&k("0w"), Front, Width, &n("shoulder"), &n("elbow"), 0.15, false);
        self.perpendicular(&k("1w"), Front, Width, &n("mid_arm"), &n("elbow"), 0.0, false);
        self.perpendicular(&k("2w"), Front, Width, &n("elbow"), &n("wrist"), 0.0, false);
        self.perpendicular(&k("3w"), Front, Width, &n("max_forearm"), &n("wrist"), 0.0, false);
        for level in 0..4 {
            self.perimeter(&k(&format!("{}p", level)), &k(&format!("{}w", level)), None);
        }

        // Wrist and hand levels: width from the front, thickness from the tuck view
        let hand_levels = [
            ("4", n("wrist"), n("elbow")),
            ("5", n("base_of_thumb"), n("knuckles")),
            ("6", n("knuckles"), n("nails")),
            ("7", n("nails"), n("knuckles")),
        ];
        for (level, at, toward) in &hand_levels {
            self.perpendicular(&k(&format!("{}w", level)), Front, Width, at, toward, 0.0, true);
            self.perpendicular(&k(&format!("{}d", level)), Tuck, Depth, at, toward, 0.0, false);
            self.perimeter(
                &k(&format!("{}p", level)),
                &k(&format!("{}w", level)),
                Some(k(&format!("{}d", level)).as_str()),
            );
        }
    }

    fn add_leg(&mut self, side: Side, prefix: &str) {
        use MeasurementKind::{Depth, Length, Width};
        use ViewKind::{Front, Pike, Side as Profile};

        let n = |part: &str| side.landmark(part);
        let k = |suffix: &str| format!("{}{}", prefix, suffix);

        self.length(&k("1L"), &n("hip"), &n("crotch"));
        self.length(&k("2L"), &n("hip"), &n("mid_thigh"));
        self.length(&k("3L"), &n("hip"), &n("knee"));
        self.length(&k("4L"), &n("hip"), &n("max_calf"));
        self.length(&k("5L"), &n("hip"), &n("ankle"));

        // Widths from the front, depths from the seated pike profile
        let levels = [
            ("1", n("crotch"), n("knee"), n("hip"), n("knee"), 0.15),
            ("2", n("mid_thigh"), n("knee"), n("hip"), n("knee"), 0.5),
            ("3", n("knee"), n("ankle"), n("knee"), n("ankle"), 0.0),
            ("4", n("max_calf"), n("ankle"), n("max_calf"), n("ankle"), 0.0),
            ("5", n("ankle"), n("knee"), n("ankle"), n("knee"), 0.0),
        ];
        for (level, at, toward, pike_at, pike_toward, pike_along) in &levels {
            self.perpendicular(&k(&format!("{}w", level)), Front, Width, at, toward, 0.0, false);
            self.perpendicular(
                &k(&format!("{}d", level)),
                Pike,
                Depth,
                pike_at,
                pike_toward,
                *pike_along,
                false,
            );
            self.perimeter(
                &k(&format!("{}p", level)),
                &k(&format!("{}w", level)),
                Some(k(&format!("{}d", level)).as_str()),
            );
        }
        // Hip level shares the crotch-level cross-section
        self.perimeter(&k("0p"), &k("1w"), Some(k("1d").as_str()));

        // Foot: lengths and thicknesses from the standing profile, widths from the front
        let heel = MeasureOp::WidthAlongAxis {
            at: n("ankle"),
            toward: n("heel"),
        };
        self.rule(&k("6d"), Profile, Depth, heel, true);
        self.perimeter(&k("6p"), &k("6d"), None);

        let along_foot = |to: &str| MeasureOp::Length { from: n("ankle"), to: n(to) };
        self.rule(&k("7L"), Profile, Length, along_foot("arch"), true);
        self.rule(&k("8L"), Profile, Length, along_foot("ball"), true);
        let toe = MeasureOp::ExtremityLength {
            anchor: n("ankle"),
            toward: Some(n("toe_nail")),
            heading: 0.0,
        };
        self.rule(&k("9L"), Profile, Length, toe, true);

        self.across(&k("7w"), Front, Width, &n("arch"), false);
        self.across(&k("8w"), Front, Width, &n("ball"), true);
        self.across(&k("9w"), Front, Width, &n("toe_nail"), true);
        self.perpendicular(&k("7d"), Profile, Depth, &n("arch"), &n("toe_nail"), 0.0, false);
        self.perpendicular(&k("8d"), Profile, Depth, &n("ball"), &n("toe_nail"), 0.0, false);
        self.perimeter(&k("7p"), &k("7w"), Some(k("7d").as_str()));
        self.perimeter(&k("8p"), &k("8w"), Some(k("8d").as_str()));
    }

    /// Reject duplicate keys and perimeters whose inputs no rule produces.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        let all_keys = self
            .rules
            .iter()
            .map(|r| r.key.as_str())
            .chain(self.perimeters.iter().map(|p| p.key.as_str()));
        for key in all_keys {
            if !keys.insert(key) {
                return Err(BodyMeasureError::SchemaConflict(format!("duplicate key {}", key)));
            }
        }

        let produced: HashSet<&str> = self.rules.iter().map(|r| r.key.as_str()).collect();
        for perimeter in &self.perimeters {
            let inputs = std::iter::once(perimeter.width.as_str()).chain(perimeter.depth.as_deref());
            for input in inputs {
                if !produced.contains(input) {
                    return Err(BodyMeasureError::SchemaConflict(format!(
                        "perimeter {} needs {}, which no rule measures",
                        perimeter.key, input
                    )));
                }
            }
            if perimeter.model == CrossSection::Stadium && perimeter.depth.is_none() {
                return Err(BodyMeasureError::SchemaConflict(format!(
                    "stadium perimeter {} has no depth",
                    perimeter.key
                )));
            }
        }

        for rule in &self.rules {
            if let MeasureOp::WidthPerpendicular { along, .. } = rule.op {
                if !(0.0..=1.0).contains(&along) {
                    return Err(BodyMeasureError::SchemaConflict(format!(
                        "{}: along fraction {} outside [0, 1]",
                        rule.key, along
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn rules_for(&self, view: ViewKind) -> impl Iterator<Item = &MeasurementRule> {
        self.rules.iter().filter(move |r| r.view == view)
    }

    /// Views at least one rule reads from.
    pub fn views(&self) -> Vec<ViewKind> {
        ViewKind::ALL
            .into_iter()
            .filter(|v| self.rules.iter().any(|r| r.view == *v))
            .collect()
    }

    /// Whether a key is written to the model file.
    pub fn is_exported(&self, key: &str) -> bool {
        self.perimeters.iter().any(|p| p.key == key)
            || self.rules.iter().any(|r| r.key == key && r.exported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yeadon_table_is_consistent() {
        let schema = MeasurementSchema::yeadon().unwrap();
        assert_eq!(schema.views(), ViewKind::ALL.to_vec());

        for key in ["Ls4L", "Ls4d", "Ls0p", "La4w", "Lb7L", "Lj9L", "Lk6d", "Lj0p", "Ls7p"] {
            assert!(schema.is_exported(key), "{} should be exported", key);
        }
        for key in ["Ls0d", "La5d", "Lj2d", "Ls5w"] {
            assert!(!schema.is_exported(key), "{} should be intermediate", key);
        }
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let rule = MeasurementRule {
            key: s("Ls1L"),
            view: ViewKind::Front,
            kind: MeasurementKind::Length,
            op: MeasureOp::VerticalLength {
                from: s("left_hip"),
                to: s(names::UMBILICUS),
            },
            exported: true,
        };
        let result = MeasurementSchema::new(vec![rule.clone(), rule], Vec::new());
        assert!(matches!(result, Err(BodyMeasureError::SchemaConflict(_))));
    }

    #[test]
    fn perimeter_inputs_must_be_measured() {
        let perimeter = PerimeterRule {
            key: s("Ls0p"),
            width: s("Ls0w"),
            depth: Some(s("Ls0d")),
            model: CrossSection::Stadium,
        };
        let result = MeasurementSchema::new(Vec::new(), vec![perimeter]);
        assert!(matches!(result, Err(BodyMeasureError::SchemaConflict(_))));
    }
}
