// src/calibration.rs - Pixel to real-world scale recovered from a photographed chessboard

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::corners::{detect_corners, CornerSettings};
use crate::errors::{BodyMeasureError, Result};
use crate::geometry::Point;

/// Real-world length per pixel, per image axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFrame {
    pub horizontal_scale: f64,
    pub vertical_scale: f64,
}

impl CalibrationFrame {
    pub fn new(horizontal_scale: f64, vertical_scale: f64) -> Result<Self> {
        let valid = |s: f64| s.is_finite() && s > 0.0;
        if !valid(horizontal_scale) || !valid(vertical_scale) {
            return Err(BodyMeasureError::DegenerateGeometry(format!(
                "invalid calibration scale ({}, {})",
                horizontal_scale, vertical_scale
            )));
        }
        Ok(Self {
            horizontal_scale,
            vertical_scale,
        })
    }

    pub fn isotropic(scale: f64) -> Result<Self> {
        Self::new(scale, scale)
    }

    /// Real-world length of a pixel vector.
    pub fn to_world(&self, vector: Point) -> f64 {
        (vector.x * self.horizontal_scale).hypot(vector.y * self.vertical_scale)
    }
}

/// Per-axis spacing, in pixels or in real-world units depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSpacing {
    pub horizontal: f64,
    pub vertical: f64,
}

impl AxisSpacing {
    pub fn uniform(value: f64) -> Self {
        Self {
            horizontal: value,
            vertical: value,
        }
    }
}

/// How the physical spacing of the pattern is measured in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternLayout {
    /// One board per region: spacing is the corner pitch of each board.
    #[default]
    Single,
    /// One board per image quadrant: spacing is the distance between board centres.
    Grid,
}

/// Where boards are searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchRegions {
    Whole,
    #[default]
    Quadrants,
}

/// Physical description of the calibration pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSpec {
    /// Inner corners per board side (`N` of an `N x N` corner grid).
    pub inner_corners: usize,
    /// Edge length of one chessboard square (real-world units).
    pub square_size: f64,
    pub layout: PatternLayout,
    pub regions: SearchRegions,
    /// Distance between adjacent board centres (grid layout only).
    pub pattern_spacing: Option<AxisSpacing>,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            inner_corners: 5,
            square_size: 2.5,
            layout: PatternLayout::Single,
            regions: SearchRegions::Quadrants,
            pattern_spacing: None,
        }
    }
}

impl PatternSpec {
    pub fn validate(&self) -> Result<()> {
        if self.inner_corners < 2 {
            return Err(BodyMeasureError::Config(
                "calibration pattern needs at least 2 inner corners per side".to_string(),
            ));
        }
        if !(self.square_size > 0.0) {
            return Err(BodyMeasureError::Config(
                "calibration square_size must be positive".to_string(),
            ));
        }
        if self.layout == PatternLayout::Grid {
            if self.regions != SearchRegions::Quadrants {
                return Err(BodyMeasureError::Config(
                    "grid calibration layout requires quadrant regions".to_string(),
                ));
            }
            match self.pattern_spacing {
                Some(s) if s.horizontal > 0.0 && s.vertical > 0.0 => {}
                _ => {
                    return Err(BodyMeasureError::Config(
                        "grid calibration layout requires a positive pattern_spacing".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Physical spacing matched by the measured pixel spacing.
    pub fn physical_spacing(&self) -> AxisSpacing {
        match (self.layout, self.pattern_spacing) {
            (PatternLayout::Grid, Some(spacing)) => spacing,
            _ => AxisSpacing::uniform(self.square_size),
        }
    }
}

/// Camera geometry used to move the scale from the wall plane to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Standoff {
    pub camera_to_subject: f64,
    pub wall_to_subject: f64,
}

/// Tuning of the pattern search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub corners: CornerSettings,
    /// Maximum `(max - min) / median` of nearest-neighbour corner distances.
    pub max_spacing_spread: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            corners: CornerSettings::default(),
            max_spacing_spread: 0.35,
        }
    }
}

/// Where a photograph's calibration comes from. Each is an explicit choice;
/// none of them is used as a fallback for another.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CalibrationSource {
    /// Chessboard detected in an image.
    Pattern {
        image: PathBuf,
        #[serde(default)]
        pattern: PatternSpec,
        #[serde(default)]
        standoff: Option<Standoff>,
    },
    /// Scale known in advance.
    Fixed {
        horizontal_scale: f64,
        vertical_scale: f64,
    },
    /// Known real length between two landmarks of the same photograph.
    ReferenceSegment { from: String, to: String, length: f64 },
}

/// Image quadrant a board was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Whole,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Region {
    /// Pixel rectangle `(x, y, width, height)` of this region.
    fn rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (hw, hh) = (width / 2, height / 2);
        match self {
            Region::Whole => (0, 0, width, height),
            Region::TopLeft => (0, 0, hw, hh),
            Region::TopRight => (hw, 0, width - hw, hh),
            Region::BottomLeft => (0, hh, hw, height - hh),
            Region::BottomRight => (hw, hh, width - hw, height - hh),
        }
    }
}

/// One board fitted in one region.
#[derive(Debug, Clone, Serialize)]
pub struct PatternFit {
    pub region: Region,
    pub corners: Vec<Point>,
    /// Outer quadrilateral: top-left, top-right, bottom-right, bottom-left.
    pub quad: [Point; 4],
    pub center: Point,
    /// Corner pitch along each axis (pixels).
    pub pitch: AxisSpacing,
}

/// Result of a successful pattern calibration.
#[derive(Debug, Clone, Serialize)]
pub struct PatternCalibration {
    pub frame: CalibrationFrame,
    /// Pixel measurement the frame was derived from.
    pub pixel_spacing: AxisSpacing,
    pub patterns: Vec<PatternFit>,
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (monotone chain), counter-clockwise in a y-up frame, collinear points dropped.
fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull = half_hull(sorted.iter());
    hull.extend(half_hull(sorted.iter().rev()));
    hull
}

fn half_hull<'a>(points: impl Iterator<Item = &'a Point>) -> Vec<Point> {
    let mut half: Vec<Point> = Vec::new();
    for &p in points {
        while half.len() >= 2 && cross(half[half.len() - 2], half[half.len() - 1], p) <= 0.0 {
            half.pop();
        }
        half.push(p);
    }
    half.pop();
    half
}

/// Drop the vertex spanning the smallest triangle with its neighbours until four remain.
fn reduce_to_quad(polygon: &[Point]) -> Option<[Point; 4]> {
    let mut current = polygon.to_vec();
    if current.len() < 4 {
        return None;
    }

    while current.len() > 4 {
        let n = current.len();
        let (min_idx, _) = (0..n)
            .map(|i| {
                let area = cross(current[(i + n - 1) % n], current[i], current[(i + 1) % n]).abs() * 0.5;
                (i, area)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        current.remove(min_idx);
    }

    let by = |key: fn(&Point) -> f64| -> Point {
        *current
            .iter()
            .min_by(|a, b| key(*a).total_cmp(&key(*b)))
            .unwrap_or(&current[0])
    };
    let top_left = by(|p| p.x + p.y);
    let bottom_right = by(|p| -(p.x + p.y));
    let top_right = by(|p| p.y - p.x);
    let bottom_left = by(|p| p.x - p.y);

    Some([top_left, top_right, bottom_right, bottom_left])
}

/// Reject corner sets whose nearest-neighbour spacing is far from uniform.
fn check_regularity(corners: &[Point], max_spread: f64) -> Result<()> {
    let mut nearest: Vec<f64> = corners
        .iter()
        .enumerate()
        .map(|(i, p)| {
            corners
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, q)| p.distance(q))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();
    nearest.sort_by(|a, b| a.total_cmp(b));

    let median = nearest[nearest.len() / 2];
    let spread = (nearest[nearest.len() - 1] - nearest[0]) / median;
    if !median.is_finite() || median <= 0.0 || spread > max_spread {
        return Err(BodyMeasureError::CalibrationPatternNotFound(format!(
            "irregular corner grid (spacing spread {:.2})",
            spread
        )));
    }
    Ok(())
}

/// Detect and fit one `N x N` corner board inside `region` of `image`.
pub fn fit_pattern(
    image: &GrayImage,
    region: Region,
    inner_corners: usize,
    settings: &CalibrationSettings,
) -> Result<PatternFit> {
    let (x0, y0, w, h) = region.rect(image.width(), image.height());
    let crop = imageops::crop_imm(image, x0, y0, w, h).to_image();

    let expected = inner_corners * inner_corners;
    let detected = detect_corners(&crop, expected, &settings.corners);
    if detected.len() < expected {
        return Err(BodyMeasureError::CalibrationPatternNotFound(format!(
            "{} of {} corners in {:?}",
            detected.len(),
            expected,
            region
        )));
    }

    let offset = Point::new(x0 as f64, y0 as f64);
    let corners: Vec<Point> = detected.iter().map(|c| c.position + offset).collect();
    check_regularity(&corners, settings.max_spacing_spread)?;

    let hull = convex_hull(&corners);
    let quad = reduce_to_quad(&hull).ok_or_else(|| {
        BodyMeasureError::CalibrationPatternNotFound(format!("degenerate corner hull in {:?}", region))
    })?;
    let [tl, tr, br, bl] = quad;

    let steps = (inner_corners - 1) as f64;
    let pitch = AxisSpacing {
        horizontal: (tl.distance(&tr) + bl.distance(&br)) / 2.0 / steps,
        vertical: (tl.distance(&bl) + tr.distance(&br)) / 2.0 / steps,
    };
    if !(pitch.horizontal > 0.0 && pitch.vertical > 0.0) {
        return Err(BodyMeasureError::CalibrationPatternNotFound(format!(
            "collapsed corner quadrilateral in {:?}",
            region
        )));
    }
    let center = Point::mean(&quad).unwrap_or(tl);

    log::debug!(
        "Pattern in {:?}: centre ({:.1}, {:.1}), pitch {:.2} x {:.2} px",
        region, center.x, center.y, pitch.horizontal, pitch.vertical
    );

    Ok(PatternFit {
        region,
        corners,
        quad,
        center,
        pitch,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Pixel distance between board centres, averaged over adjacent quadrant pairs.
fn grid_spacing(patterns: &[PatternFit]) -> Result<AxisSpacing> {
    let center = |region: Region| patterns.iter().find(|p| p.region == region).map(|p| p.center);
    let pair_distances = |pairs: [(Region, Region); 2]| -> Vec<f64> {
        pairs
            .iter()
            .filter_map(|(a, b)| Some(center(*a)?.distance(&center(*b)?)))
            .collect()
    };

    let horizontal = pair_distances([
        (Region::TopLeft, Region::TopRight),
        (Region::BottomLeft, Region::BottomRight),
    ]);
    let vertical = pair_distances([
        (Region::TopLeft, Region::BottomLeft),
        (Region::TopRight, Region::BottomRight),
    ]);

    match (mean(&horizontal), mean(&vertical)) {
        (Some(h), Some(v)) => Ok(AxisSpacing {
            horizontal: h,
            vertical: v,
        }),
        // One axis pair is enough when the other is missing
        (Some(h), None) => Ok(AxisSpacing::uniform(h)),
        (None, Some(v)) => Ok(AxisSpacing::uniform(v)),
        (None, None) => Err(BodyMeasureError::CalibrationPatternNotFound(format!(
            "no adjacent pair of boards among {} found",
            patterns.len()
        ))),
    }
}

/// Detect the pattern and derive the photograph's calibration frame.
pub fn calibrate(
    image: &GrayImage,
    spec: &PatternSpec,
    settings: &CalibrationSettings,
) -> Result<PatternCalibration> {
    spec.validate()?;

    let regions: &[Region] = match spec.regions {
        SearchRegions::Whole => &[Region::Whole],
        SearchRegions::Quadrants => &[
            Region::TopLeft,
            Region::TopRight,
            Region::BottomLeft,
            Region::BottomRight,
        ],
    };

    let mut patterns = Vec::new();
    for &region in regions {
        match fit_pattern(image, region, spec.inner_corners, settings) {
            Ok(fit) => patterns.push(fit),
            Err(e) => log::debug!("No pattern in {:?}: {}", region, e),
        }
    }

    if patterns.is_empty() {
        return Err(BodyMeasureError::CalibrationPatternNotFound(format!(
            "no {0}x{0} corner board in {1} region(s)",
            spec.inner_corners,
            regions.len()
        )));
    }

    let pixel_spacing = match spec.layout {
        PatternLayout::Single => {
            let h: Vec<f64> = patterns.iter().map(|p| p.pitch.horizontal).collect();
            let v: Vec<f64> = patterns.iter().map(|p| p.pitch.vertical).collect();
            AxisSpacing {
                horizontal: mean(&h).unwrap_or_default(),
                vertical: mean(&v).unwrap_or_default(),
            }
        }
        PatternLayout::Grid => grid_spacing(&patterns)?,
    };

    let physical = spec.physical_spacing();
    let frame = CalibrationFrame::new(
        physical.horizontal / pixel_spacing.horizontal,
        physical.vertical / pixel_spacing.vertical,
    )?;

    log::info!(
        "Calibrated from {} board(s): {:.4} x {:.4} per pixel",
        patterns.len(),
        frame.horizontal_scale,
        frame.vertical_scale
    );

    Ok(PatternCalibration {
        frame,
        pixel_spacing,
        patterns,
    })
}

/// Scale valid at the subject's standoff, by similar triangles:
/// `(wall_to_subject * physical_spacing / camera_to_subject) / pixel_spacing` per axis.
pub fn rescale(
    pixel_spacing: AxisSpacing,
    standoff: &Standoff,
    physical_spacing: AxisSpacing,
) -> Result<CalibrationFrame> {
    if !(standoff.camera_to_subject > 0.0 && standoff.wall_to_subject > 0.0) {
        return Err(BodyMeasureError::Config(format!(
            "standoff distances must be positive, got {:?}",
            standoff
        )));
    }
    let factor = standoff.wall_to_subject / standoff.camera_to_subject;
    CalibrationFrame::new(
        factor * physical_spacing.horizontal / pixel_spacing.horizontal,
        factor * physical_spacing.vertical / pixel_spacing.vertical,
    )
}

/// Isotropic scale from a segment of known real length (e.g. elbow to wrist).
pub fn reference_segment_frame(a: Point, b: Point, length: f64) -> Result<CalibrationFrame> {
    let pixels = a.distance(&b);
    if pixels <= f64::EPSILON {
        return Err(BodyMeasureError::DegenerateGeometry(
            "reference segment has zero length".to_string(),
        ));
    }
    CalibrationFrame::isotropic(length / pixels)
}
