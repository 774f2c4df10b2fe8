// tests/common/mod.rs - Synthetic masks and calibration boards

#![allow(dead_code)]

use body_measure_lib::{Keypoint, Point, SilhouetteMask};
use image::{GrayImage, Luma};

/// Distance from `p` to the segment `a-b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 == 0.0 {
        return p.distance(&a);
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len2).clamp(0.0, 1.0);
    p.distance(&a.lerp(&b, t))
}

/// Filled capsule (segment `a-b` swept by `radius`) reduced to its boundary:
/// inside pixels with at least one 4-neighbour outside.
pub fn capsule_mask(width: u32, height: u32, a: Point, b: Point, radius: f64) -> SilhouetteMask {
    let inside = |x: i64, y: i64| distance_to_segment(Point::new(x as f64, y as f64), a, b) <= radius;
    SilhouetteMask::from_fn(width, height, |x, y| {
        let (x, y) = (x as i64, y as i64);
        inside(x, y)
            && [(1, 0), (-1, 0), (0, 1), (0, -1)]
                .iter()
                .any(|(dx, dy)| !inside(x + dx, y + dy))
    })
}

/// Boundary of a filled circle.
pub fn circle_mask(size: u32, center: Point, radius: f64) -> SilhouetteMask {
    capsule_mask(size, size, center, center, radius)
}

/// Paint an `(n+1) x (n+1)` chessboard with its top-left square at `origin`.
pub fn draw_board(image: &mut GrayImage, origin: (u32, u32), square: (u32, u32), n: u32) {
    for j in 0..=n {
        for i in 0..=n {
            let value = if (i + j) % 2 == 0 { 15 } else { 235 };
            for y in 0..square.1 {
                for x in 0..square.0 {
                    let px = origin.0 + i * square.0 + x;
                    let py = origin.1 + j * square.1 + y;
                    if px < image.width() && py < image.height() {
                        image.put_pixel(px, py, Luma([value]));
                    }
                }
            }
        }
    }
}

pub fn blank_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([235]))
}

/// Keypoint array with the given COCO-WholeBody indices set; all others are unset.
pub fn keypoints(points: &[(usize, f64, f64)]) -> Vec<Keypoint> {
    let len = points.iter().map(|(i, _, _)| i + 1).max().unwrap_or(0);
    let mut keypoints = vec![
        Keypoint {
            x: 0.0,
            y: 0.0,
            confidence: Some(0.0),
        };
        len
    ];
    for &(i, x, y) in points {
        keypoints[i] = Keypoint {
            x,
            y,
            confidence: Some(0.9),
        };
    }
    keypoints
}
