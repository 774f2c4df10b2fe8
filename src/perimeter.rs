// src/perimeter.rs - Circumference estimates from one or two orthogonal extents

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Cross-section model used to turn extents into a perimeter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossSection {
    /// Width and depth: rounded cross-section through both extents.
    Stadium,
    /// Width only: circular cross-section.
    Circle,
}

/// Perimeter of a cross-section with width `w` and depth `d`:
/// `2π·sqrt(((w/2)² + (d/2)²) / 2)`. Equals `π·w` when `w == d`.
pub fn stadium_perimeter(width: f64, depth: f64) -> f64 {
    let a = width / 2.0;
    let b = depth / 2.0;
    2.0 * PI * ((a * a + b * b) / 2.0).sqrt()
}

/// Perimeter of a circle of diameter `d`.
pub fn circle_perimeter(diameter: f64) -> f64 {
    PI * diameter
}

impl CrossSection {
    /// Perimeter for this model. `depth` is ignored by the circle and
    /// required by the stadium; a missing depth yields `None`.
    pub fn perimeter(&self, width: f64, depth: Option<f64>) -> Option<f64> {
        match self {
            CrossSection::Stadium => depth.map(|d| stadium_perimeter(width, d)),
            CrossSection::Circle => Some(circle_perimeter(width)),
        }
    }
}
