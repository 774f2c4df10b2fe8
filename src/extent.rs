// src/extent.rs - Body extents measured by casting paired rays from a segment axis

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::errors::{BodyMeasureError, Result};
use crate::geometry::Point;
use crate::mask::SilhouetteMask;
use crate::ray_march::{cast, cast_required, MarchSettings};

/// Configuration for the maximal-extent search along a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentSettings {
    /// Number of evenly spaced samples on the segment (ends included).
    pub samples: usize,
    /// Stop once a sample's extent exceeds this multiple of the first sample's extent.
    pub guard_ratio: f64,
}

impl Default for ExtentSettings {
    fn default() -> Self {
        Self {
            samples: 100,
            guard_ratio: 1.5,
        }
    }
}

/// Two boundary hits spanning the body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtentSpan {
    pub first: Point,
    pub second: Point,
}

impl ExtentSpan {
    /// Hit-to-hit length in pixels.
    pub fn pixels(&self) -> f64 {
        self.first.distance(&self.second)
    }

    /// Hit-to-hit vector, for anisotropic scale conversion.
    pub fn vector(&self) -> Point {
        self.second - self.first
    }
}

/// Sample point with the largest guarded perpendicular extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxExtent {
    pub point: Point,
    pub span: ExtentSpan,
    pub sample_index: usize,
}

fn axis_angle(a: Point, b: Point) -> Result<f64> {
    if a.distance(&b) <= f64::EPSILON {
        return Err(BodyMeasureError::DegenerateGeometry(format!(
            "zero-length axis at ({:.1}, {:.1})",
            a.x, a.y
        )));
    }
    Ok(a.angle_to(&b))
}

/// Span between the hits of two rays cast from `origin` at `angle` and `angle + PI`.
pub fn two_sided_span(
    origin: Point,
    angle: f64,
    mask: &SilhouetteMask,
    march: &MarchSettings,
) -> Result<ExtentSpan> {
    let first = cast_required(origin, angle, mask, march)?;
    let second = cast_required(origin, angle + PI, mask, march)?;
    Ok(ExtentSpan {
        first: first.point,
        second: second.point,
    })
}

/// Width of the body along the `a -> b` axis, measured through `a`.
pub fn width_along_axis(
    a: Point,
    b: Point,
    mask: &SilhouetteMask,
    march: &MarchSettings,
) -> Result<ExtentSpan> {
    let angle = axis_angle(a, b)?;
    two_sided_span(a, angle, mask, march)
}

/// Width of the body perpendicular to the `a -> b` axis, measured through `a`.
pub fn width_perpendicular(
    a: Point,
    b: Point,
    mask: &SilhouetteMask,
    march: &MarchSettings,
) -> Result<ExtentSpan> {
    let angle = axis_angle(a, b)?;
    two_sided_span(a, angle + FRAC_PI_2, mask, march)
}

/// Horizontal width through `at` (implicit horizontal axis).
pub fn horizontal_width(
    at: Point,
    mask: &SilhouetteMask,
    march: &MarchSettings,
) -> Result<ExtentSpan> {
    two_sided_span(at, 0.0, mask, march)
}

/// Locate the point on `a-b` with the largest perpendicular extent.
///
/// The search stops at the first sample whose extent exceeds `guard_ratio` times
/// the first sample's extent; such jumps come from landmark noise (the rays
/// escaping past a joint) rather than from a real bulge.
pub fn point_of_max_extent(
    a: Point,
    b: Point,
    mask: &SilhouetteMask,
    march: &MarchSettings,
    settings: &ExtentSettings,
) -> Result<MaxExtent> {
    let angle = axis_angle(a, b)? + FRAC_PI_2;
    let samples = settings.samples.max(2);

    let first_span = two_sided_span(a, angle, mask, march)?;
    let first_extent = first_span.pixels();
    let mut best = MaxExtent {
        point: a,
        span: first_span,
        sample_index: 0,
    };
    let mut best_extent = first_extent;

    for i in 1..samples {
        let t = i as f64 / (samples - 1) as f64;
        let point = a.lerp(&b, t);

        let (Some(first), Some(second)) = (
            cast(point, angle, mask, march),
            cast(point, angle + PI, mask, march),
        ) else {
            continue;
        };
        let span = ExtentSpan {
            first: first.point,
            second: second.point,
        };
        let extent = span.pixels();

        if extent >= best_extent {
            if extent > first_extent * settings.guard_ratio {
                break;
            }
            best_extent = extent;
            best = MaxExtent {
                point,
                span,
                sample_index: i,
            };
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Outline of a vertical band `x in [left, right]`, `y in [top, bottom]`.
    fn band_mask(left: u32, right: u32) -> SilhouetteMask {
        SilhouetteMask::from_fn(120, 120, |x, y| {
            (x == left || x == right) && (5..115).contains(&y) || (y == 5 || y == 114) && (left..=right).contains(&x)
        })
    }

    #[test]
    fn perpendicular_width_of_a_band() {
        let mask = band_mask(40, 80);
        let span = width_perpendicular(
            Point::new(60.0, 30.0),
            Point::new(60.0, 90.0),
            &mask,
            &MarchSettings::default(),
        )
        .unwrap();
        assert_approx_eq!(span.pixels(), 39.0, 1.0);
    }

    #[test]
    fn width_along_axis_follows_the_axis() {
        let mask = band_mask(40, 80);
        let span = width_along_axis(
            Point::new(60.0, 60.0),
            Point::new(60.0, 100.0),
            &mask,
            &MarchSettings::default(),
        )
        .unwrap();
        assert_approx_eq!(span.pixels(), 108.0, 1.0);
    }

    #[test]
    fn zero_length_axis_is_degenerate() {
        let mask = band_mask(40, 80);
        let p = Point::new(60.0, 60.0);
        let result = width_perpendicular(p, p, &mask, &MarchSettings::default());
        assert!(matches!(result, Err(BodyMeasureError::DegenerateGeometry(_))));
    }

    #[test]
    fn max_extent_finds_the_bulge() {
        // Limb outline 20 px wide with a bulge to 28 px around y = 70
        let mask = SilhouetteMask::from_fn(120, 140, |x, y| {
            let half = if (60..80).contains(&y) { 14 } else { 10 };
            (x == 60 - half || x == 60 + half) && (10..130).contains(&y)
        });
        let settings = ExtentSettings::default();
        let max = point_of_max_extent(
            Point::new(60.0, 20.0),
            Point::new(60.0, 120.0),
            &mask,
            &MarchSettings::default(),
            &settings,
        )
        .unwrap();
        assert!((60.0..80.0).contains(&max.point.y), "found {:?}", max.point);
        assert_approx_eq!(max.span.pixels(), 27.0, 1.0);
    }

    #[test]
    fn max_extent_guard_stops_at_a_spurious_jump() {
        // Width jumps from 20 to 60 px below y = 70: beyond the 1.5x guard
        let mask = SilhouetteMask::from_fn(120, 140, |x, y| {
            let half = if y >= 70 { 30 } else { 10 };
            (x == 60 - half || x == 60 + half) && (10..130).contains(&y)
        });
        let max = point_of_max_extent(
            Point::new(60.0, 20.0),
            Point::new(60.0, 120.0),
            &mask,
            &MarchSettings::default(),
            &ExtentSettings::default(),
        )
        .unwrap();
        assert!(max.point.y < 70.0);
        assert_approx_eq!(max.span.pixels(), 19.0, 1.0);
    }
}
