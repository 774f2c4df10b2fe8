// src/ray_march.rs - Marching a probe along a ray until it lands on the silhouette boundary

use serde::{Deserialize, Serialize};

use crate::errors::{BodyMeasureError, Result};
use crate::geometry::Point;
use crate::mask::SilhouetteMask;

/// Configuration for ray marching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarchSettings {
    /// Probe advance per iteration (pixels).
    pub step: f64,
    /// Hard cap on iterations per ray. `None` derives it from the mask diagonal.
    pub max_steps: Option<usize>,
}

impl Default for MarchSettings {
    fn default() -> Self {
        Self {
            step: 0.01,
            max_steps: None,
        }
    }
}

impl MarchSettings {
    /// Iteration cap for a given mask; enough to cross the whole image once.
    pub fn max_steps_for(&self, mask: &SilhouetteMask) -> usize {
        match self.max_steps {
            Some(cap) => cap,
            None => (mask.diagonal() / self.step).ceil() as usize + 1,
        }
    }
}

/// First boundary pixel reached by a ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeHit {
    /// Probe position at the hit (sub-pixel).
    pub point: Point,
    /// Boundary pixel containing the probe.
    pub pixel: (u32, u32),
    /// Distance travelled from the origin.
    pub distance: f64,
}

/// Cast a ray from `origin` along `angle` (radians, `atan2(dy, dx)` convention).
///
/// Returns `None` when the probe leaves the mask or the iteration cap is reached
/// before a boundary pixel is found.
pub fn cast(
    origin: Point,
    angle: f64,
    mask: &SilhouetteMask,
    settings: &MarchSettings,
) -> Option<EdgeHit> {
    if !origin.is_finite() || !angle.is_finite() || settings.step <= 0.0 {
        return None;
    }

    let (dir_x, dir_y) = (angle.cos(), angle.sin());
    let max_steps = settings.max_steps_for(mask);
    let mut last_pixel = None;

    for i in 0..=max_steps {
        let distance = i as f64 * settings.step;
        let probe = Point::new(origin.x + dir_x * distance, origin.y + dir_y * distance);
        let pixel = mask.pixel_at(probe)?;

        // Consecutive probes usually stay inside one pixel
        if last_pixel == Some(pixel) {
            continue;
        }
        last_pixel = Some(pixel);

        if mask.is_boundary(pixel.0 as i64, pixel.1 as i64) {
            return Some(EdgeHit {
                point: probe,
                pixel,
                distance,
            });
        }
    }

    None
}

/// Like [`cast`], but a miss is an `EdgeNotFound` error.
pub fn cast_required(
    origin: Point,
    angle: f64,
    mask: &SilhouetteMask,
    settings: &MarchSettings,
) -> Result<EdgeHit> {
    cast(origin, angle, mask, settings).ok_or(BodyMeasureError::EdgeNotFound { origin, angle })
}
