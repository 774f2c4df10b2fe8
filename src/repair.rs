// src/repair.rs - Keeps (perimeter, width) pairs geometrically consistent

use std::f64::consts::PI;

/// A convex cross-section with width `W` has a perimeter strictly between `2W` and `πW`.
pub const MIN_RATIO: f64 = 2.0;
pub const MAX_RATIO: f64 = PI;

/// Default relative offset that moves a repaired width strictly inside the bounds.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// What the repairer did to a width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RepairOutcome {
    Unchanged,
    /// `P/W` was at or below 2: the width was too large.
    Narrowed { from: f64, to: f64 },
    /// `P/W` was at or above π: the width was too small.
    Widened { from: f64, to: f64 },
}

impl RepairOutcome {
    pub fn width(&self, original: f64) -> f64 {
        match self {
            RepairOutcome::Unchanged => original,
            RepairOutcome::Narrowed { to, .. } | RepairOutcome::Widened { to, .. } => *to,
        }
    }

    pub fn is_repair(&self) -> bool {
        !matches!(self, RepairOutcome::Unchanged)
    }
}

/// Classify and, if needed, adjust `width` so that `2 < perimeter / width < π`.
///
/// The adjusted width is pulled onto the violated bound and then nudged by the
/// relative offset `epsilon`, so a second call reports `Unchanged`.
/// Non-positive or non-finite inputs are returned unchanged.
pub fn repair_outcome(perimeter: f64, width: f64, epsilon: f64) -> RepairOutcome {
    if !(perimeter.is_finite() && width.is_finite()) || perimeter <= 0.0 || width <= 0.0 {
        return RepairOutcome::Unchanged;
    }

    let ratio = perimeter / width;
    if ratio <= MIN_RATIO {
        RepairOutcome::Narrowed {
            from: width,
            to: perimeter / MIN_RATIO * (1.0 - epsilon),
        }
    } else if ratio >= MAX_RATIO {
        RepairOutcome::Widened {
            from: width,
            to: perimeter / MAX_RATIO * (1.0 + epsilon),
        }
    } else {
        RepairOutcome::Unchanged
    }
}

/// Repaired width for a (perimeter, width) pair.
pub fn repair(perimeter: f64, width: f64, epsilon: f64) -> f64 {
    repair_outcome(perimeter, width, epsilon).width(width)
}
