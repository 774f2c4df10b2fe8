// tests/pipeline.rs - End-to-end extraction on a synthetic capsule body

mod common;

use assert_approx_eq::assert_approx_eq;
use body_measure_lib::output::{format_model_file, ModelHeader};
use body_measure_lib::{
    extract, Config, CrossSection, FailureKind, MeasureOp, MeasurementEntry, MeasurementKind,
    MeasurementRule, MeasurementSchema, PatternSpec, PerimeterRule, Point, SilhouetteMask,
    ViewCalibration, ViewKind, ViewPhotograph,
};

use common::{blank_image, capsule_mask, keypoints};

const LEFT_SHOULDER: usize = 5;
const LEFT_HIP: usize = 11;
const RIGHT_ANKLE: usize = 16;

fn rule(key: &str, view: ViewKind, kind: MeasurementKind, op: MeasureOp, exported: bool) -> MeasurementRule {
    MeasurementRule {
        key: key.to_string(),
        view,
        kind,
        op,
        exported,
    }
}

fn torso_schema() -> MeasurementSchema {
    let rules = vec![
        rule(
            "Ls4L",
            ViewKind::Front,
            MeasurementKind::Length,
            MeasureOp::VerticalLength {
                from: "left_hip".to_string(),
                to: "left_shoulder".to_string(),
            },
            true,
        ),
        rule(
            "Ls0w",
            ViewKind::Front,
            MeasurementKind::Width,
            MeasureOp::WidthPerpendicular {
                at: "left_hip".to_string(),
                toward: "left_shoulder".to_string(),
                along: 0.0,
            },
            true,
        ),
        rule(
            "Ls1w",
            ViewKind::Front,
            MeasurementKind::Width,
            MeasureOp::HorizontalWidth {
                at: "umbilicus".to_string(),
            },
            true,
        ),
        rule(
            "Ls0d",
            ViewKind::Side,
            MeasurementKind::Depth,
            MeasureOp::HorizontalWidth {
                at: "left_hip".to_string(),
            },
            false,
        ),
    ];
    let perimeters = vec![PerimeterRule {
        key: "Ls0p".to_string(),
        width: "Ls0w".to_string(),
        depth: Some("Ls0d".to_string()),
        model: CrossSection::Stadium,
    }];
    MeasurementSchema::new(rules, perimeters).unwrap()
}

/// Upright capsule of radius 20 px spanning y = 80..320, hip at y = 300 and
/// shoulder at y = 100.
fn front_view(calibration: ViewCalibration) -> ViewPhotograph {
    ViewPhotograph {
        kind: ViewKind::Front,
        mask: capsule_mask(201, 401, Point::new(100.0, 80.0), Point::new(100.0, 320.0), 20.0),
        keypoints: keypoints(&[(LEFT_SHOULDER, 100.0, 100.0), (LEFT_HIP, 100.0, 300.0)]),
        calibration,
    }
}

fn failure_kind(entry: Option<&MeasurementEntry>) -> Option<FailureKind> {
    match entry {
        Some(MeasurementEntry::Missing { failure, .. }) => Some(failure.kind),
        _ => None,
    }
}

#[test]
fn capsule_torso_is_measured_in_centimetres() {
    let schema = torso_schema();
    let photos = [front_view(ViewCalibration::Fixed {
        horizontal_scale: 0.5,
        vertical_scale: 0.5,
    })];

    for use_parallel in [true, false] {
        let config = Config {
            use_parallel,
            ..Config::default()
        };
        let result = extract(&photos, &schema, &config).unwrap();
        let set = &result.measurements;

        assert_approx_eq!(set.value("Ls4L").unwrap(), 100.0, 1e-9);
        // 40 px across at 0.5 cm per pixel
        assert_approx_eq!(set.value("Ls0w").unwrap(), 20.0, 1.0);

        assert_eq!(failure_kind(set.get("Ls1w")), Some(FailureKind::MissingLandmark));
        assert_eq!(failure_kind(set.get("Ls0d")), Some(FailureKind::ViewNotSupplied));
        assert_eq!(failure_kind(set.get("Ls0p")), Some(FailureKind::MissingDependency));
        assert_eq!(set.len(), 5);

        assert_eq!(result.views.len(), 1);
        assert!(result.views[0].frame.is_some());
        assert_eq!(result.views[0].spans.len(), 2);
    }
}

#[test]
fn failed_calibration_marks_every_key_of_the_view_missing() {
    let schema = torso_schema();
    let photos = [front_view(ViewCalibration::Pattern {
        image: blank_image(200, 200),
        pattern: PatternSpec::default(),
        standoff: None,
    })];

    let result = extract(&photos, &schema, &Config::default()).unwrap();
    let set = &result.measurements;

    for key in ["Ls4L", "Ls0w", "Ls1w"] {
        assert_eq!(
            failure_kind(set.get(key)),
            Some(FailureKind::CalibrationPatternNotFound),
            "{}",
            key
        );
    }
    assert_eq!(failure_kind(set.get("Ls0p")), Some(FailureKind::MissingDependency));
    assert!(result.views[0].calibration_failure.is_some());
    assert_eq!(set.present().count(), 0);
}

#[test]
fn failed_view_leaves_other_views_present() {
    let schema = torso_schema();
    let side = ViewPhotograph {
        kind: ViewKind::Side,
        ..front_view(ViewCalibration::Fixed {
            horizontal_scale: 0.5,
            vertical_scale: 0.5,
        })
    };
    let photos = [
        front_view(ViewCalibration::Pattern {
            image: blank_image(200, 200),
            pattern: PatternSpec::default(),
            standoff: None,
        }),
        side,
    ];

    let result = extract(&photos, &schema, &Config::default()).unwrap();
    let set = &result.measurements;

    for key in ["Ls4L", "Ls0w", "Ls1w"] {
        assert_eq!(
            failure_kind(set.get(key)),
            Some(FailureKind::CalibrationPatternNotFound),
            "{}",
            key
        );
    }
    assert_approx_eq!(set.value("Ls0d").unwrap(), 20.0, 1.0);
    assert_eq!(failure_kind(set.get("Ls0p")), Some(FailureKind::MissingDependency));
    assert_eq!(set.present().count(), 1);
}

/// Block foot outline (x 20..80, y 40..80) with a toe reaching x = 110.
fn foot_mask() -> SilhouetteMask {
    SilhouetteMask::from_fn(130, 120, |x, y| {
        let heel_and_sole = (x == 20 && (40..=80).contains(&y))
            || ((y == 40 || y == 80) && (20..=80).contains(&x))
            || (x == 80 && ((40..=56).contains(&y) || (64..=80).contains(&y)));
        let toe = (x == 110 && (56..=64).contains(&y))
            || ((y == 56 || y == 64) && (80..=110).contains(&x));
        heel_and_sole || toe
    })
}

#[test]
fn toe_length_without_toe_keypoint_uses_the_configured_heading() {
    let schema = MeasurementSchema::new(
        vec![rule(
            "Lj9L",
            ViewKind::Side,
            MeasurementKind::Length,
            MeasureOp::ExtremityLength {
                anchor: "right_ankle".to_string(),
                toward: Some("right_toe_nail".to_string()),
                heading: 0.0,
            },
            true,
        )],
        vec![],
    )
    .unwrap();
    let photos = [ViewPhotograph {
        kind: ViewKind::Side,
        mask: foot_mask(),
        keypoints: keypoints(&[(RIGHT_ANKLE, 30.0, 60.0)]),
        calibration: ViewCalibration::Fixed {
            horizontal_scale: 1.0,
            vertical_scale: 1.0,
        },
    }];

    let result = extract(&photos, &schema, &Config::default()).unwrap();

    // Anchor to the toe tip at x = 110
    assert_approx_eq!(result.measurements.value("Lj9L").unwrap(), 79.5, 1.0);
}

#[test]
fn reference_segment_calibrates_from_landmarks() {
    let schema = torso_schema();
    let photos = [front_view(ViewCalibration::ReferenceSegment {
        from: "left_shoulder".to_string(),
        to: "left_hip".to_string(),
        length: 100.0,
    })];

    let result = extract(&photos, &schema, &Config::default()).unwrap();

    assert_approx_eq!(result.measurements.value("Ls4L").unwrap(), 100.0, 1e-9);
    assert_approx_eq!(result.measurements.value("Ls0w").unwrap(), 20.0, 1.0);
}

#[test]
fn two_photographs_of_one_view_are_rejected() {
    let view = front_view(ViewCalibration::Fixed {
        horizontal_scale: 0.5,
        vertical_scale: 0.5,
    });
    let photos = [view.clone(), view];
    assert!(extract(&photos, &torso_schema(), &Config::default()).is_err());
}

#[test]
fn no_photographs_leaves_every_yeadon_key_missing() {
    let schema = MeasurementSchema::yeadon().unwrap();
    let result = extract(&[], &schema, &Config::default()).unwrap();
    let set = &result.measurements;

    assert_eq!(set.len(), schema.rules.len() + schema.perimeters.len());
    assert_eq!(set.present().count(), 0);
    for rule in &schema.rules {
        assert_eq!(failure_kind(set.get(&rule.key)), Some(FailureKind::ViewNotSupplied));
    }
    for perimeter in &schema.perimeters {
        assert_eq!(failure_kind(set.get(&perimeter.key)), Some(FailureKind::MissingDependency));
    }

    let header = ModelHeader {
        measurement_conversion_factor: 0.01,
        total_mass: None,
    };
    let text = format_model_file(set, &schema, &header);
    assert!(text.starts_with("measurementconversionfactor : 0.01\n"));
    assert!(text.lines().skip(1).all(|line| line.starts_with("# ")));
    assert!(text.contains("# Ls1L : missing (view not supplied: no front photograph)"));
}
