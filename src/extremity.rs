// src/extremity.rs - Extremal boundary point found by sweeping the ray angle from an anchor

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::errors::Result;
use crate::geometry::Point;
use crate::mask::SilhouetteMask;
use crate::ray_march::{cast, cast_required, EdgeHit, MarchSettings};

/// Configuration for the angle sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremitySettings {
    /// Angle increment per sweep step (radians).
    pub angle_step: f64,
    /// Maximum rotation away from the initial heading, in each direction (radians).
    pub max_sweep: f64,
}

impl Default for ExtremitySettings {
    fn default() -> Self {
        Self {
            angle_step: 0.01,
            max_sweep: FRAC_PI_2,
        }
    }
}

/// Locally extremal boundary point as seen from the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extremity {
    pub point: Point,
    pub distance: f64,
    pub angle: f64,
}

/// Rotate from the initial hit in one direction while the hit distance does not decrease.
fn sweep(
    anchor: Point,
    heading: f64,
    direction: f64,
    initial: EdgeHit,
    mask: &SilhouetteMask,
    march: &MarchSettings,
    settings: &ExtremitySettings,
) -> (EdgeHit, f64) {
    let max_iterations = (settings.max_sweep / settings.angle_step).ceil() as usize;
    let mut best = (initial, heading);

    for i in 1..=max_iterations {
        let angle = heading + direction * i as f64 * settings.angle_step;
        match cast(anchor, angle, mask, march) {
            Some(hit) if hit.distance >= best.0.distance => best = (hit, angle),
            _ => break,
        }
    }

    best
}

/// Find the extremal point (e.g. a toe tip) reachable from `anchor`, starting at `heading`.
pub fn find_extremity(
    anchor: Point,
    heading: f64,
    mask: &SilhouetteMask,
    march: &MarchSettings,
    settings: &ExtremitySettings,
) -> Result<Extremity> {
    let initial = cast_required(anchor, heading, mask, march)?;

    let (ccw, ccw_angle) = sweep(anchor, heading, 1.0, initial, mask, march, settings);
    let (cw, cw_angle) = sweep(anchor, heading, -1.0, initial, mask, march, settings);

    let (hit, angle) = if ccw.distance >= cw.distance {
        (ccw, ccw_angle)
    } else {
        (cw, cw_angle)
    };

    log::debug!(
        "Extremity from ({:.1}, {:.1}): ({:.1}, {:.1}) at {:.1} px, {:.3} rad",
        anchor.x, anchor.y, hit.point.x, hit.point.y, hit.distance, angle
    );

    Ok(Extremity {
        point: hit.point,
        distance: hit.distance,
        angle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BodyMeasureError;
    use assert_approx_eq::assert_approx_eq;

    /// Outline of a block foot (x 20..80, y 40..80) with a toe (x 80..110, y 56..64).
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
    fn sweep_reaches_the_toe_tip() {
        let mask = foot_mask();
        let anchor = Point::new(30.0, 60.0);
        let tip = find_extremity(anchor, 0.02, &mask, &MarchSettings::default(), &ExtremitySettings::default())
            .unwrap();

        assert_approx_eq!(tip.point.x, 109.5, 1.0);
        assert_approx_eq!(tip.point.y, 60.0, 4.0);
        assert!(tip.distance > 79.0 && tip.distance < 80.5, "distance {}", tip.distance);
    }

    #[test]
    fn initial_miss_is_an_error() {
        let mask = SilhouetteMask::new(50, 50);
        let result = find_extremity(
            Point::new(25.0, 25.0),
            0.0,
            &mask,
            &MarchSettings::default(),
            &ExtremitySettings::default(),
        );
        assert!(matches!(result, Err(BodyMeasureError::EdgeNotFound { .. })));
    }
}
