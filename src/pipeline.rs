// src/pipeline.rs - Per-view extraction, then merge, perimeters, repair and plausibility checks

use image::GrayImage;
use rayon::prelude::*;
use std::path::Path;

use crate::calibration::{
    calibrate, reference_segment_frame, rescale, CalibrationFrame, CalibrationSettings,
    CalibrationSource, PatternSpec, Standoff,
};
use crate::config::{Config, PlausibilitySettings};
use crate::errors::{BodyMeasureError, FailureKind, MeasurementFailure, Result};
use crate::extent::{horizontal_width, width_along_axis, width_perpendicular, ExtentSpan};
use crate::extremity::find_extremity;
use crate::geometry::Point;
use crate::image_io::{load_calibration_image, load_mask, save_debug_image};
use crate::image_utils::create_debug_image;
use crate::landmarks::{load_keypoints, Keypoint, LandmarkSet};
use crate::mask::{MaskFormat, SilhouetteMask};
use crate::measurement::{Flag, MeasurementKind, MeasurementSet, ViewKind};
use crate::perimeter::CrossSection;
use crate::refine::{refine_landmarks, RefineContext};
use crate::repair::repair_outcome;
use crate::schema::{MeasureOp, MeasurementRule, MeasurementSchema, PerimeterRule};
use crate::session::{Session, ViewInput};

/// Calibration input of a loaded photograph.
#[derive(Debug, Clone)]
pub enum ViewCalibration {
    Pattern {
        image: GrayImage,
        pattern: PatternSpec,
        standoff: Option<Standoff>,
    },
    Fixed {
        horizontal_scale: f64,
        vertical_scale: f64,
    },
    ReferenceSegment {
        from: String,
        to: String,
        length: f64,
    },
}

/// Everything needed to measure one view, already in memory.
#[derive(Debug, Clone)]
pub struct ViewPhotograph {
    pub kind: ViewKind,
    pub mask: SilhouetteMask,
    pub keypoints: Vec<Keypoint>,
    pub calibration: ViewCalibration,
}

impl ViewPhotograph {
    /// Read the mask, keypoints and (for patterns) the calibration image of a view.
    pub fn load(input: &ViewInput, config: &Config) -> Result<Self> {
        let threshold = match input.mask_format {
            MaskFormat::Edges => config.mask_threshold,
            MaskFormat::Silhouette => config.silhouette_threshold,
        };
        let mask = load_mask(&input.mask, input.mask_format, threshold)?;
        let keypoints = load_keypoints(&input.keypoints)?;

        let calibration = match &input.calibration {
            CalibrationSource::Pattern { image, pattern, standoff } => ViewCalibration::Pattern {
                image: load_calibration_image(image)?,
                pattern: pattern.clone(),
                standoff: *standoff,
            },
            CalibrationSource::Fixed { horizontal_scale, vertical_scale } => ViewCalibration::Fixed {
                horizontal_scale: *horizontal_scale,
                vertical_scale: *vertical_scale,
            },
            CalibrationSource::ReferenceSegment { from, to, length } => {
                ViewCalibration::ReferenceSegment {
                    from: from.clone(),
                    to: to.clone(),
                    length: *length,
                }
            }
        };

        Ok(Self {
            kind: input.kind,
            mask,
            keypoints,
            calibration,
        })
    }
}

/// Landmarks, frame and spans of one processed view.
#[derive(Debug, Clone)]
pub struct ViewResult {
    pub kind: ViewKind,
    pub landmarks: LandmarkSet,
    pub frame: Option<CalibrationFrame>,
    /// Why the view could not be calibrated, if it could not.
    pub calibration_failure: Option<MeasurementFailure>,
    /// Segments behind each present raw measurement (for overlays).
    pub spans: Vec<(Point, Point)>,
}

/// Outcome of a whole extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub measurements: MeasurementSet,
    pub views: Vec<ViewResult>,
    pub repaired: usize,
    pub out_of_range: usize,
}

/// A raw value in world units and the pixel segment it was measured on.
struct Measured {
    value: f64,
    span: (Point, Point),
}

type Measure<T> = std::result::Result<T, MeasurementFailure>;

/// Load every view listed in a session.
pub fn load_views(session: &Session, config: &Config) -> Result<Vec<ViewPhotograph>> {
    session
        .views
        .iter()
        .map(|input| {
            log::info!("Loading {} view from {}", input.kind, input.mask.display());
            ViewPhotograph::load(input, config)
        })
        .collect()
}

fn resolve_frame(
    calibration: &ViewCalibration,
    landmarks: &LandmarkSet,
    settings: &CalibrationSettings,
) -> Measure<CalibrationFrame> {
    match calibration {
        ViewCalibration::Pattern { image, pattern, standoff } => {
            let fit = calibrate(image, pattern, settings)?;
            match standoff {
                Some(standoff) => Ok(rescale(fit.pixel_spacing, standoff, pattern.physical_spacing())?),
                None => Ok(fit.frame),
            }
        }
        ViewCalibration::Fixed { horizontal_scale, vertical_scale } => {
            Ok(CalibrationFrame::new(*horizontal_scale, *vertical_scale)?)
        }
        ViewCalibration::ReferenceSegment { from, to, length } => {
            let a = landmarks.get(from)?;
            let b = landmarks.get(to)?;
            Ok(reference_segment_frame(a, b, *length)?)
        }
    }
}

fn span_measure(span: ExtentSpan, frame: &CalibrationFrame) -> Measured {
    Measured {
        value: frame.to_world(span.vector()),
        span: (span.first, span.second),
    }
}

fn measure(
    op: &MeasureOp,
    landmarks: &LandmarkSet,
    mask: &SilhouetteMask,
    frame: &CalibrationFrame,
    config: &Config,
) -> Measure<Measured> {
    let march = &config.march;
    match op {
        MeasureOp::Length { from, to } => {
            let (a, b) = (landmarks.get(from)?, landmarks.get(to)?);
            Ok(Measured {
                value: frame.to_world(b - a),
                span: (a, b),
            })
        }
        MeasureOp::VerticalLength { from, to } => {
            let (a, b) = (landmarks.get(from)?, landmarks.get(to)?);
            Ok(Measured {
                value: (b.y - a.y).abs() * frame.vertical_scale,
                span: (a, Point::new(a.x, b.y)),
            })
        }
        MeasureOp::WidthAlongAxis { at, toward } => {
            let (a, b) = (landmarks.get(at)?, landmarks.get(toward)?);
            Ok(span_measure(width_along_axis(a, b, mask, march)?, frame))
        }
        MeasureOp::WidthPerpendicular { at, toward, along } => {
            let (a, b) = (landmarks.get(at)?, landmarks.get(toward)?);
            let origin = a.lerp(&b, *along);
            Ok(span_measure(width_perpendicular(origin, origin + (b - a), mask, march)?, frame))
        }
        MeasureOp::HorizontalWidth { at } => {
            let origin = landmarks.get(at)?;
            Ok(span_measure(horizontal_width(origin, mask, march)?, frame))
        }
        MeasureOp::ExtremityLength { anchor, toward, heading } => {
            let origin = landmarks.get(anchor)?;
            let heading = match toward.as_deref().map(|name| landmarks.get(name)) {
                Some(Ok(target)) => origin.angle_to(&target),
                Some(Err(failure)) => {
                    log::debug!("Extremity heading falls back to {:.3} rad: {}", heading, failure);
                    *heading
                }
                None => *heading,
            };
            let tip = find_extremity(origin, heading, mask, march, &config.extremity)?;
            Ok(Measured {
                value: frame.to_world(tip.point - origin),
                span: (origin, tip.point),
            })
        }
    }
}

fn record_rule(
    set: &mut MeasurementSet,
    rule: &MeasurementRule,
    result: Measure<f64>,
) {
    match result {
        Ok(value) => {
            log::debug!("{} ({}) = {:.3}", rule.key, rule.view, value);
            set.insert_value(&rule.key, value, rule.kind, rule.view);
        }
        Err(failure) => {
            log::debug!("{} ({}) missing: {}", rule.key, rule.view, failure);
            set.insert_missing(&rule.key, rule.kind, rule.view, failure);
        }
    }
}

/// Calibrate one photograph, refine its landmarks and evaluate every rule of its view.
pub fn process_view(
    photo: &ViewPhotograph,
    schema: &MeasurementSchema,
    config: &Config,
) -> (ViewResult, MeasurementSet) {
    log::info!("Processing {} view", photo.kind);

    let detected = LandmarkSet::from_keypoints(&photo.keypoints, config.min_keypoint_confidence);
    let ctx = RefineContext {
        mask: &photo.mask,
        march: &config.march,
        extent: &config.extent,
        settings: &config.refine,
        proportions: &config.proportions,
    };
    let landmarks = refine_landmarks(&detected, &ctx);
    log::debug!(
        "{} view: {} detected, {} after refinement",
        photo.kind,
        detected.len(),
        landmarks.len()
    );

    let mut set = MeasurementSet::new();
    let mut spans = Vec::new();

    let frame = match resolve_frame(&photo.calibration, &landmarks, &config.calibration) {
        Ok(frame) => frame,
        Err(failure) => {
            log::warn!("{} view could not be calibrated: {}", photo.kind, failure);
            for rule in schema.rules_for(photo.kind) {
                set.insert_missing(&rule.key, rule.kind, rule.view, failure.clone());
            }
            let result = ViewResult {
                kind: photo.kind,
                landmarks,
                frame: None,
                calibration_failure: Some(failure),
                spans,
            };
            return (result, set);
        }
    };

    for rule in schema.rules_for(photo.kind) {
        let result = measure(&rule.op, &landmarks, &photo.mask, &frame, config).map(|m| {
            spans.push(m.span);
            m.value
        });
        record_rule(&mut set, rule, result);
    }

    log::info!(
        "{} view: {} of {} measurements present",
        photo.kind,
        set.present().count(),
        set.len()
    );

    let result = ViewResult {
        kind: photo.kind,
        landmarks,
        frame: Some(frame),
        calibration_failure: None,
        spans,
    };
    (result, set)
}

fn perimeter_value(set: &MeasurementSet, rule: &PerimeterRule) -> Measure<f64> {
    let width = set.require(&rule.width)?;
    let depth = rule.depth.as_deref().map(|key| set.require(key)).transpose()?;
    rule.model.perimeter(width, depth).ok_or_else(|| {
        MeasurementFailure::new(
            FailureKind::MissingDependency,
            format!("{} needs a depth", rule.key),
        )
    })
}

/// Combine widths and depths (possibly from different views) into perimeters.
pub fn compute_perimeters(set: &mut MeasurementSet, schema: &MeasurementSchema) {
    for rule in &schema.perimeters {
        let view = set.get(&rule.width).map(|e| e.view()).unwrap_or(ViewKind::Front);
        match perimeter_value(set, rule) {
            Ok(value) => set.insert_value(&rule.key, value, MeasurementKind::Perimeter, view),
            Err(failure) => {
                set.insert_missing(&rule.key, MeasurementKind::Perimeter, view, failure)
            }
        }
    }
}

/// Pull each width back inside `2 < P/W < π` for every perimeter computed from it.
/// Returns the number of repairs.
pub fn repair_widths(set: &mut MeasurementSet, schema: &MeasurementSchema, epsilon: f64) -> usize {
    let mut repaired = 0;
    for rule in &schema.perimeters {
        let (Some(perimeter), Some(width)) = (set.value(&rule.key), set.value(&rule.width)) else {
            continue;
        };

        let outcome = repair_outcome(perimeter, width, epsilon);
        if outcome.is_repair() {
            // A circle sits on the π bound up to rounding
            if rule.model == CrossSection::Circle {
                log::debug!("{} nudged inside the bound of {}: {:?}", rule.width, rule.key, outcome);
            } else {
                log::warn!(
                    "{} = {:.3} inconsistent with {} = {:.3}: {:?}",
                    rule.width,
                    width,
                    rule.key,
                    perimeter,
                    outcome
                );
            }
            set.update_value(&rule.width, outcome.width(width));
            set.add_flag(&rule.width, Flag::Repaired { from: width });
            repaired += 1;
        }
    }
    repaired
}

/// Flag values above their anatomical ceiling. Flagged values are still emitted.
pub fn check_plausibility(set: &mut MeasurementSet, settings: &PlausibilitySettings) -> usize {
    let implausible: Vec<(String, f64, f64)> = set
        .present()
        .filter_map(|m| {
            let ceiling = settings.ceiling(&m.key, m.kind);
            (m.value > ceiling).then(|| (m.key.clone(), m.value, ceiling))
        })
        .collect();

    for (key, value, ceiling) in &implausible {
        let warning = BodyMeasureError::MeasurementOutOfRange {
            key: key.clone(),
            value: *value,
            ceiling: *ceiling,
        };
        log::warn!("{}", warning);
        set.add_flag(key, Flag::OutOfRange { ceiling: *ceiling });
    }
    implausible.len()
}

/// Run the whole extraction over the supplied photographs.
///
/// Views the schema reads but no photograph supplies leave their keys missing
/// with `ViewNotSupplied`. Per-view failures never abort the run; only a
/// malformed input set (two photographs of one view) does.
pub fn extract(
    photos: &[ViewPhotograph],
    schema: &MeasurementSchema,
    config: &Config,
) -> Result<ExtractionResult> {
    for (i, photo) in photos.iter().enumerate() {
        if photos[..i].iter().any(|p| p.kind == photo.kind) {
            return Err(BodyMeasureError::Config(format!(
                "two photographs supplied for the {} view",
                photo.kind
            )));
        }
    }

    let outcomes: Vec<(ViewResult, MeasurementSet)> = if config.use_parallel {
        photos
            .par_iter()
            .map(|photo| process_view(photo, schema, config))
            .collect()
    } else {
        photos
            .iter()
            .map(|photo| process_view(photo, schema, config))
            .collect()
    };

    let mut measurements = MeasurementSet::new();
    let mut views = Vec::with_capacity(outcomes.len());
    for (view, set) in outcomes {
        measurements.merge(set)?;
        views.push(view);
    }

    for kind in schema.views() {
        if photos.iter().any(|p| p.kind == kind) {
            continue;
        }
        log::info!("No {} photograph supplied", kind);
        let mut unsupplied = MeasurementSet::new();
        for rule in schema.rules_for(kind) {
            let failure = MeasurementFailure::new(
                FailureKind::ViewNotSupplied,
                format!("no {} photograph", kind),
            );
            unsupplied.insert_missing(&rule.key, rule.kind, rule.view, failure);
        }
        measurements.merge(unsupplied)?;
    }

    compute_perimeters(&mut measurements, schema);
    let repaired = repair_widths(&mut measurements, schema, config.repair_epsilon);
    let out_of_range = check_plausibility(&mut measurements, &config.plausibility);

    log::info!(
        "Extracted {} of {} measurements ({} repaired, {} out of range)",
        measurements.present().count(),
        measurements.len(),
        repaired,
        out_of_range
    );

    Ok(ExtractionResult {
        measurements,
        views,
        repaired,
        out_of_range,
    })
}

/// Write one overlay per view: boundary, landmarks and measured spans.
pub fn write_debug_images(
    photos: &[ViewPhotograph],
    result: &ExtractionResult,
    output_dir: &Path,
    subject: &str,
) -> Result<()> {
    for view in &result.views {
        let Some(photo) = photos.iter().find(|p| p.kind == view.kind) else {
            continue;
        };
        let overlay = create_debug_image(&photo.mask, &view.landmarks, &view.spans);
        let path = output_dir
            .join("debug")
            .join(format!("{}_{}.png", subject, view.kind));
        save_debug_image(&overlay, &path)?;
        log::debug!("Saved overlay {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn schema_with_perimeters() -> MeasurementSchema {
        let rules = vec![
            MeasurementRule {
                key: "w".to_string(),
                view: ViewKind::Front,
                kind: MeasurementKind::Width,
                op: MeasureOp::HorizontalWidth { at: "a".to_string() },
                exported: true,
            },
            MeasurementRule {
                key: "d".to_string(),
                view: ViewKind::Side,
                kind: MeasurementKind::Depth,
                op: MeasureOp::HorizontalWidth { at: "a".to_string() },
                exported: false,
            },
        ];
        let perimeters = vec![
            PerimeterRule {
                key: "p".to_string(),
                width: "w".to_string(),
                depth: Some("d".to_string()),
                model: CrossSection::Stadium,
            },
            PerimeterRule {
                key: "c".to_string(),
                width: "w".to_string(),
                depth: None,
                model: CrossSection::Circle,
            },
        ];
        MeasurementSchema::new(rules, perimeters).unwrap()
    }

    #[test]
    fn perimeters_combine_views_and_propagate_missing_inputs() {
        let schema = schema_with_perimeters();
        let mut set = MeasurementSet::new();
        set.insert_value("w", 10.0, MeasurementKind::Width, ViewKind::Front);
        set.insert_missing(
            "d",
            MeasurementKind::Depth,
            ViewKind::Side,
            MeasurementFailure::new(FailureKind::ViewNotSupplied, "no side photograph"),
        );

        compute_perimeters(&mut set, &schema);

        assert_approx_eq!(set.value("c").unwrap(), std::f64::consts::PI * 10.0, 1e-9);
        let missing = set.get("p").unwrap();
        assert!(!missing.is_present());
        match missing {
            crate::measurement::MeasurementEntry::Missing { failure, view, .. } => {
                assert_eq!(failure.kind, FailureKind::MissingDependency);
                assert_eq!(*view, ViewKind::Front);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn deep_stadium_widens_its_width() {
        let schema = schema_with_perimeters();
        let mut set = MeasurementSet::new();
        set.insert_value("w", 10.0, MeasurementKind::Width, ViewKind::Front);
        set.insert_value("d", 14.0, MeasurementKind::Depth, ViewKind::Side);
        compute_perimeters(&mut set, &schema);

        assert_eq!(repair_widths(&mut set, &schema, 1e-6), 1);
        let width = set.value("w").unwrap();
        let ratio = set.value("p").unwrap() / width;
        assert!(ratio > 2.0 && ratio < std::f64::consts::PI);
        assert_eq!(set.flags("w"), &[Flag::Repaired { from: 10.0 }]);

        // A second pass finds nothing to do.
        assert_eq!(repair_widths(&mut set, &schema, 1e-6), 0);
    }

    #[test]
    fn circle_pairs_end_within_the_bounds() {
        let schema = schema_with_perimeters();
        for width in [0.3, 7.0, 10.0, 28.04, 33.3, 101.7] {
            let mut set = MeasurementSet::new();
            set.insert_value("w", width, MeasurementKind::Width, ViewKind::Front);
            compute_perimeters(&mut set, &schema);

            repair_widths(&mut set, &schema, 1e-6);
            let repaired = set.value("w").unwrap();
            let ratio = set.value("c").unwrap() / repaired;
            assert!(ratio > 2.0 && ratio <= std::f64::consts::PI, "W={} -> {}", width, repaired);
            assert_approx_eq!(repaired, width, width * 1e-5);
            assert_eq!(repair_widths(&mut set, &schema, 1e-6), 0);
        }
    }

    #[test]
    fn implausible_values_are_flagged_not_dropped() {
        let mut set = MeasurementSet::new();
        set.insert_value("Ls1w", 95.0, MeasurementKind::Width, ViewKind::Front);
        set.insert_value("Ls2w", 30.0, MeasurementKind::Width, ViewKind::Front);

        let flagged = check_plausibility(&mut set, &PlausibilitySettings::default());

        assert_eq!(flagged, 1);
        assert_eq!(set.value("Ls1w"), Some(95.0));
        assert_eq!(set.flags("Ls1w"), &[Flag::OutOfRange { ceiling: 70.0 }]);
        assert!(set.flags("Ls2w").is_empty());
    }
}
