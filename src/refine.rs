// src/refine.rs - Landmarks derived from local edge evidence or by proportional interpolation

use serde::{Deserialize, Serialize};

use crate::errors::{BodyMeasureError, MeasurementFailure, Result};
use crate::extent::{point_of_max_extent, ExtentSettings};
use crate::geometry::Point;
use crate::landmarks::{names, DerivationMethod, LandmarkOrigin, LandmarkSet, Side};
use crate::mask::{RowScan, SilhouetteMask};
use crate::ray_march::MarchSettings;

/// Interpolation weights for landmarks that have no detector of their own.
/// Each fraction is the `t` of a linear interpolation between two landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnatomicalProportions {
    /// Lowest front rib: shoulder -> hip
    pub rib_fraction: f64,
    /// Nipple: lowest front rib -> shoulder
    pub nipple_fraction: f64,
    /// Umbilicus: lowest front rib -> hip (torso midline)
    pub umbilicus_fraction: f64,
    /// Mid-arm: shoulder -> elbow
    pub mid_arm_fraction: f64,
    /// Mid-thigh: crotch -> knee
    pub mid_thigh_fraction: f64,
    /// Arch: toe nail -> heel
    pub arch_fraction: f64,
    /// Ball: toe nail -> arch
    pub ball_fraction: f64,
    /// Neck: shoulder centre -> nose
    pub neck_fraction: f64,
}

impl Default for AnatomicalProportions {
    fn default() -> Self {
        Self {
            rib_fraction: 0.5,
            nipple_fraction: 0.5,
            umbilicus_fraction: 0.4,
            mid_arm_fraction: 0.5,
            mid_thigh_fraction: 0.5,
            arch_fraction: 0.5,
            ball_fraction: 0.5,
            neck_fraction: 0.3,
        }
    }
}

impl AnatomicalProportions {
    pub fn fractions(&self) -> [(&'static str, f64); 8] {
        [
            ("rib_fraction", self.rib_fraction),
            ("nipple_fraction", self.nipple_fraction),
            ("umbilicus_fraction", self.umbilicus_fraction),
            ("mid_arm_fraction", self.mid_arm_fraction),
            ("mid_thigh_fraction", self.mid_thigh_fraction),
            ("arch_fraction", self.arch_fraction),
            ("ball_fraction", self.ball_fraction),
            ("neck_fraction", self.neck_fraction),
        ]
    }
}

/// Crop parameters for the mask-search refinements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineSettings {
    /// Fraction of the ear-shoulder crop width, on the head side, ignored when
    /// looking for the acromion (keeps the neck outline out of the search).
    pub acromion_medial_fraction: f64,
    /// Widening of the top-of-head band beyond the ears, as a fraction of the ear distance.
    pub head_margin: f64,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            acromion_medial_fraction: 0.6,
            head_margin: 0.5,
        }
    }
}

/// Everything the refiner needs besides the landmarks themselves.
pub struct RefineContext<'a> {
    pub mask: &'a SilhouetteMask,
    pub march: &'a MarchSettings,
    pub extent: &'a ExtentSettings,
    pub settings: &'a RefineSettings,
    pub proportions: &'a AnatomicalProportions,
}

fn require(set: &LandmarkSet, name: &str) -> Result<Point> {
    set.get(name)
        .map_err(|failure| BodyMeasureError::MissingLandmark(failure.detail))
}

fn side_point(set: &LandmarkSet, side: Side, part: &str) -> Result<Point> {
    require(set, &side.landmark(part))
}

/// Acromion: top of the shoulder outline between ear and shoulder joint.
///
/// The half of the crop nearest the ear and the medial columns are cleared, so
/// the first boundary pixel in a top-down scan lies on the shoulder contour.
pub fn acromion(
    set: &LandmarkSet,
    side: Side,
    mask: &SilhouetteMask,
    settings: &RefineSettings,
) -> Result<Point> {
    let ear = side_point(set, side, "ear")?;
    let shoulder = side_point(set, side, "shoulder")?;

    let mut crop = mask.crop(ear, shoulder)?;
    let (width, height) = (crop.width(), crop.height());
    let medial = ((width as f64) * settings.acromion_medial_fraction.clamp(0.0, 1.0)) as u32;

    if ear.y <= shoulder.y {
        crop.clear_rows(0, height / 2);
    } else {
        crop.clear_rows(height - height / 2, height);
    }

    let scan = if ear.x >= shoulder.x {
        crop.clear_columns(width - medial, width);
        RowScan::LeftToRight
    } else {
        crop.clear_columns(0, medial);
        RowScan::RightToLeft
    };

    crop.first_boundary(scan)
        .ok_or(BodyMeasureError::EdgeNotFound {
            origin: ear,
            angle: ear.angle_to(&shoulder),
        })
}

/// Top of the head: first boundary pixel above the nose, in a band around the ears.
pub fn top_of_head(
    set: &LandmarkSet,
    mask: &SilhouetteMask,
    settings: &RefineSettings,
) -> Result<Point> {
    let nose = require(set, names::NOSE)?;
    let left_ear = side_point(set, Side::Left, "ear")?;
    let right_ear = side_point(set, Side::Right, "ear")?;

    let margin = left_ear.distance(&right_ear) * settings.head_margin;
    let x0 = left_ear.x.min(right_ear.x) - margin;
    let x1 = left_ear.x.max(right_ear.x) + margin;

    let crop = mask.crop(Point::new(x0, 0.0), Point::new(x1, nose.y))?;
    crop.first_boundary(RowScan::LeftToRight)
        .ok_or(BodyMeasureError::EdgeNotFound {
            origin: nose,
            angle: -std::f64::consts::FRAC_PI_2,
        })
}

/// Crotch row: first boundary pixel below the hips, between right hip and left knee.
/// Returns the (left, right) crotch landmarks placed at each hip's x on that row.
pub fn crotch(set: &LandmarkSet, mask: &SilhouetteMask) -> Result<(Point, Point)> {
    let left_hip = side_point(set, Side::Left, "hip")?;
    let right_hip = side_point(set, Side::Right, "hip")?;
    let left_knee = side_point(set, Side::Left, "knee")?;

    let crop = mask.crop(right_hip, left_knee)?;
    let apex = crop
        .first_boundary(RowScan::LeftToRight)
        .ok_or(BodyMeasureError::EdgeNotFound {
            origin: right_hip,
            angle: right_hip.angle_to(&left_knee),
        })?;

    Ok((
        Point::new(left_hip.x, apex.y),
        Point::new(right_hip.x, apex.y),
    ))
}

/// Widest point of the forearm (elbow -> wrist).
pub fn max_forearm(set: &LandmarkSet, side: Side, ctx: &RefineContext) -> Result<Point> {
    let elbow = side_point(set, side, "elbow")?;
    let wrist = side_point(set, side, "wrist")?;
    Ok(point_of_max_extent(elbow, wrist, ctx.mask, ctx.march, ctx.extent)?.point)
}

/// Widest point of the calf (knee -> ankle).
pub fn max_calf(set: &LandmarkSet, side: Side, ctx: &RefineContext) -> Result<Point> {
    let knee = side_point(set, side, "knee")?;
    let ankle = side_point(set, side, "ankle")?;
    Ok(point_of_max_extent(knee, ankle, ctx.mask, ctx.march, ctx.extent)?.point)
}

fn record(set: &mut LandmarkSet, name: &str, method: DerivationMethod, result: Result<Point>) {
    match result {
        Ok(point) => set.insert(name, point, LandmarkOrigin::Derived(method)),
        Err(e) => {
            log::debug!("Landmark {} not derived: {}", name, e);
            set.record_failure(name, MeasurementFailure::from(&e));
        }
    }
}

fn interpolate(set: &LandmarkSet, from: &str, to: &str, t: f64) -> Result<Point> {
    Ok(require(set, from)?.lerp(&require(set, to)?, t))
}

fn midpoint_of(set: &LandmarkSet, a: &str, b: &str) -> Result<Point> {
    interpolate(set, a, b, 0.5)
}

/// Run every refinement on the detected landmarks of one photograph.
///
/// Mask searches run first because some interpolations (mid-thigh) depend on them.
/// A refinement that fails leaves its landmark absent and records why.
pub fn refine_landmarks(detected: &LandmarkSet, ctx: &RefineContext) -> LandmarkSet {
    let mut set = detected.clone();
    let p = ctx.proportions;
    let search = DerivationMethod::MaskSearch;
    let interp = DerivationMethod::Interpolation;

    for side in Side::BOTH {
        let result = acromion(&set, side, ctx.mask, ctx.settings);
        record(&mut set, &side.landmark("acromion"), search, result);
    }

    let result = top_of_head(&set, ctx.mask, ctx.settings);
    record(&mut set, names::TOP_OF_HEAD, search, result);

    match crotch(&set, ctx.mask) {
        Ok((left, right)) => {
            record(&mut set, &Side::Left.landmark("crotch"), search, Ok(left));
            record(&mut set, &Side::Right.landmark("crotch"), search, Ok(right));
        }
        Err(e) => {
            let failure = MeasurementFailure::from(&e);
            for side in Side::BOTH {
                set.record_failure(&side.landmark("crotch"), failure.clone());
            }
        }
    }

    for side in Side::BOTH {
        let result = max_forearm(&set, side, ctx);
        record(&mut set, &side.landmark("max_forearm"), search, result);
        let result = max_calf(&set, side, ctx);
        record(&mut set, &side.landmark("max_calf"), search, result);
    }

    for side in Side::BOTH {
        let n = |part: &str| side.landmark(part);

        let result = interpolate(&set, &n("shoulder"), &n("hip"), p.rib_fraction);
        record(&mut set, &n("lowest_front_rib"), interp, result);

        let result = interpolate(&set, &n("lowest_front_rib"), &n("shoulder"), p.nipple_fraction);
        record(&mut set, &n("nipple"), interp, result);

        let result = interpolate(&set, &n("shoulder"), &n("elbow"), p.mid_arm_fraction);
        record(&mut set, &n("mid_arm"), interp, result);

        let result = interpolate(&set, &n("crotch"), &n("knee"), p.mid_thigh_fraction);
        record(&mut set, &n("mid_thigh"), interp, result);

        let result = interpolate(&set, &n("toe_nail"), &n("heel"), p.arch_fraction);
        record(&mut set, &n("arch"), interp, result);

        let result = interpolate(&set, &n("toe_nail"), &n("arch"), p.ball_fraction);
        record(&mut set, &n("ball"), interp, result);
    }

    // Midline landmarks
    let rib_center = midpoint_of(&set, "left_lowest_front_rib", "right_lowest_front_rib");
    let hip_center = midpoint_of(&set, "left_hip", "right_hip");
    let result = rib_center
        .and_then(|rib| hip_center.map(|hip| rib.lerp(&hip, p.umbilicus_fraction)));
    record(&mut set, names::UMBILICUS, interp, result);

    let shoulder_center = midpoint_of(&set, "left_shoulder", "right_shoulder");
    let result = shoulder_center
        .and_then(|center| Ok(center.lerp(&require(&set, names::NOSE)?, p.neck_fraction)));
    record(&mut set, names::NECK, interp, result);

    let result = midpoint_of(&set, "left_ear", "right_ear");
    record(&mut set, names::HEAD_CENTER, interp, result);

    set
}
