// tests/calibration.rs - Scale recovery from synthetic chessboards

mod common;

use assert_approx_eq::assert_approx_eq;
use body_measure_lib::calibration::{AxisSpacing, CalibrationSettings};
use body_measure_lib::{calibrate, BodyMeasureError, PatternLayout, PatternSpec, SearchRegions};

use common::{blank_image, draw_board};

#[test]
fn anisotropic_board_gives_per_axis_scales() {
    let mut image = blank_image(180, 220);
    draw_board(&mut image, (40, 40), (12, 16), 5);

    let spec = PatternSpec {
        regions: SearchRegions::Whole,
        ..PatternSpec::default()
    };
    let calibration = calibrate(&image, &spec, &CalibrationSettings::default()).unwrap();

    assert_eq!(calibration.patterns.len(), 1);
    assert_eq!(calibration.patterns[0].corners.len(), 25);
    assert_approx_eq!(calibration.pixel_spacing.horizontal, 12.0, 0.15);
    assert_approx_eq!(calibration.pixel_spacing.vertical, 16.0, 0.15);
    assert_approx_eq!(calibration.frame.horizontal_scale, 2.5 / 12.0, 0.003);
    assert_approx_eq!(calibration.frame.vertical_scale, 2.5 / 16.0, 0.003);
}

#[test]
fn board_in_each_quadrant_is_averaged() {
    let mut image = blank_image(320, 320);
    for origin in [(44, 44), (204, 44), (44, 204), (204, 204)] {
        draw_board(&mut image, origin, (12, 12), 5);
    }

    let calibration = calibrate(&image, &PatternSpec::default(), &CalibrationSettings::default()).unwrap();

    assert_eq!(calibration.patterns.len(), 4);
    assert_approx_eq!(calibration.frame.horizontal_scale, 2.5 / 12.0, 0.003);
    assert_approx_eq!(calibration.frame.vertical_scale, 2.5 / 12.0, 0.003);
}

#[test]
fn grid_layout_uses_distances_between_boards() {
    let mut image = blank_image(320, 320);
    // Boards 160 px apart horizontally, 180 px apart vertically.
    for origin in [(44, 44), (204, 44), (44, 224), (204, 224)] {
        draw_board(&mut image, origin, (12, 12), 5);
    }

    let spec = PatternSpec {
        layout: PatternLayout::Grid,
        regions: SearchRegions::Quadrants,
        pattern_spacing: Some(AxisSpacing {
            horizontal: 40.0,
            vertical: 40.0,
        }),
        ..PatternSpec::default()
    };
    let calibration = calibrate(&image, &spec, &CalibrationSettings::default()).unwrap();

    assert_approx_eq!(calibration.pixel_spacing.horizontal, 160.0, 0.3);
    assert_approx_eq!(calibration.pixel_spacing.vertical, 180.0, 0.3);
    assert_approx_eq!(calibration.frame.horizontal_scale, 0.25, 0.001);
    assert_approx_eq!(calibration.frame.vertical_scale, 40.0 / 180.0, 0.001);
}

#[test]
fn grid_layout_with_one_pair_is_isotropic() {
    let mut image = blank_image(320, 320);
    for origin in [(44, 44), (204, 44)] {
        draw_board(&mut image, origin, (12, 12), 5);
    }

    let spec = PatternSpec {
        layout: PatternLayout::Grid,
        pattern_spacing: Some(AxisSpacing::uniform(40.0)),
        ..PatternSpec::default()
    };
    let calibration = calibrate(&image, &spec, &CalibrationSettings::default()).unwrap();

    assert_eq!(calibration.patterns.len(), 2);
    assert_approx_eq!(calibration.frame.horizontal_scale, 0.25, 0.001);
    assert_approx_eq!(calibration.frame.vertical_scale, 0.25, 0.001);
}

#[test]
fn missing_pattern_is_reported() {
    let image = blank_image(200, 200);
    let result = calibrate(&image, &PatternSpec::default(), &CalibrationSettings::default());
    assert!(matches!(result, Err(BodyMeasureError::CalibrationPatternNotFound(_))));
}
