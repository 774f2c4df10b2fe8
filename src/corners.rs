// src/corners.rs - Chessboard inner-corner detection with sub-pixel refinement

use image::GrayImage;
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Configuration for saddle-point corner detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerSettings {
    /// Gaussian pre-smoothing (pixels).
    pub blur_sigma: f32,
    /// Non-maximum suppression radius (pixels).
    pub nms_radius: u32,
    /// Candidates below this fraction of the strongest response are dropped.
    /// Outer corners of a board (one dark quadrant) respond at about a quarter
    /// of an inner X-corner, so this sits well above 0.25.
    pub relative_threshold: f64,
    /// Half-size of the sub-pixel refinement window (pixels).
    pub refine_half_window: u32,
    /// Maximum refinement iterations per corner.
    pub refine_iterations: usize,
}

impl Default for CornerSettings {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            nms_radius: 3,
            relative_threshold: 0.5,
            refine_half_window: 4,
            refine_iterations: 20,
        }
    }
}

/// Refined corner and the saddle response that selected it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub position: Point,
    pub response: f64,
}

/// Row-major `f64` image used for derivatives.
struct Field {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Field {
    fn from_gray(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        Self {
            width: w as usize,
            height: h as usize,
            data: image.as_raw().iter().map(|&v| v as f64).collect(),
        }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    /// Central-difference gradient; zero on the one-pixel border.
    fn gradient(&self, x: usize, y: usize) -> (f64, f64) {
        if x == 0 || y == 0 || x + 1 >= self.width || y + 1 >= self.height {
            return (0.0, 0.0);
        }
        (
            (self.at(x + 1, y) - self.at(x - 1, y)) * 0.5,
            (self.at(x, y + 1) - self.at(x, y - 1)) * 0.5,
        )
    }
}

/// Saddle response `-(Ixx·Iyy - Ixy²)` of a smoothed image.
/// Positive at X-junctions, near zero on straight edges, negative on blobs.
fn saddle_response(field: &Field) -> Vec<f64> {
    let (w, h) = (field.width, field.height);
    let mut response = vec![0.0; w * h];
    if w < 3 || h < 3 {
        return response;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let c = field.at(x, y);
            let ixx = field.at(x + 1, y) - 2.0 * c + field.at(x - 1, y);
            let iyy = field.at(x, y + 1) - 2.0 * c + field.at(x, y - 1);
            let ixy = (field.at(x + 1, y + 1) - field.at(x + 1, y - 1) - field.at(x - 1, y + 1)
                + field.at(x - 1, y - 1))
                * 0.25;
            response[y * w + x] = ixy * ixy - ixx * iyy;
        }
    }
    response
}

/// Iteratively move `start` to the point where the surrounding gradients are
/// orthogonal to the vectors pointing at it: solve `Σ g·gᵀ · q = Σ g·gᵀ · p`.
fn refine_corner(field: &Field, start: Point, half_window: u32, iterations: usize) -> Point {
    let half = half_window as i64;
    let mut q = start;

    for _ in 0..iterations {
        let (cx, cy) = (q.x.round() as i64, q.y.round() as i64);
        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();

        for y in (cy - half)..=(cy + half) {
            for x in (cx - half)..=(cx + half) {
                if x < 1 || y < 1 || x as usize + 1 >= field.width || y as usize + 1 >= field.height {
                    continue;
                }
                let (gx, gy) = field.gradient(x as usize, y as usize);
                let g = Vector2::new(gx, gy);
                let ggt = g * g.transpose();
                a += ggt;
                b += ggt * Vector2::new(x as f64, y as f64);
            }
        }

        let Some(inverse) = a.try_inverse() else {
            break;
        };
        let solved = inverse * b;
        let next = Point::new(solved.x, solved.y);
        if !next.is_finite() || next.distance(&start) > half_window as f64 {
            break;
        }

        let shift = next.distance(&q);
        q = next;
        if shift < 1e-3 {
            break;
        }
    }

    q
}

/// Detect up to `count` chessboard inner corners, strongest first, refined to sub-pixel.
pub fn detect_corners(gray: &GrayImage, count: usize, settings: &CornerSettings) -> Vec<Corner> {
    let (w, h) = gray.dimensions();
    let r = settings.nms_radius as usize;
    if count == 0 || (w as usize) < 2 * r + 3 || (h as usize) < 2 * r + 3 {
        return Vec::new();
    }

    let blurred = imageproc::filter::gaussian_blur_f32(gray, settings.blur_sigma);
    let field = Field::from_gray(&blurred);
    let response = saddle_response(&field);
    let (w, h) = (field.width, field.height);

    let max_response = response.iter().cloned().fold(0.0f64, f64::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = settings.relative_threshold * max_response;

    let mut candidates = Vec::new();
    for y in r..h - r {
        for x in r..w - r {
            let idx = y * w + x;
            let val = response[idx];
            if val < threshold {
                continue;
            }
            let mut is_max = true;
            'window: for ny in y - r..=y + r {
                for nx in x - r..=x + r {
                    let nidx = ny * w + nx;
                    if nidx != idx && (response[nidx] > val || (response[nidx] == val && nidx < idx)) {
                        is_max = false;
                        break 'window;
                    }
                }
            }
            if is_max {
                candidates.push(Corner {
                    position: Point::new(x as f64, y as f64),
                    response: val,
                });
            }
        }
    }

    candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
    candidates.truncate(count);

    for corner in &mut candidates {
        corner.position = refine_corner(
            &field,
            corner.position,
            settings.refine_half_window,
            settings.refine_iterations,
        );
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use image::Luma;

    /// Four-square checker with its X-junction between pixels 19 and 20.
    fn x_junction() -> GrayImage {
        GrayImage::from_fn(40, 40, |x, y| {
            if (x < 20) == (y < 20) {
                Luma([20])
            } else {
                Luma([230])
            }
        })
    }

    #[test]
    fn finds_a_single_x_junction() {
        let corners = detect_corners(&x_junction(), 4, &CornerSettings::default());
        assert_eq!(corners.len(), 1);
        assert_approx_eq!(corners[0].position.x, 19.5, 0.1);
        assert_approx_eq!(corners[0].position.y, 19.5, 0.1);
    }

    #[test]
    fn flat_image_has_no_corners() {
        let flat = GrayImage::from_pixel(30, 30, Luma([128]));
        assert!(detect_corners(&flat, 4, &CornerSettings::default()).is_empty());
    }
}
