use image::{Rgb, RgbImage, Rgba};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::geometry::Point;
use crate::landmarks::{LandmarkOrigin, LandmarkSet};
use crate::mask::SilhouetteMask;

/// Alpha value above which a pixel is considered non-transparent
pub const ALPHA_THRESHOLD: u8 = 128;

const DETECTED_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
const DERIVED_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const SPAN_COLOR: Rgb<u8> = Rgb([255, 215, 0]);

/// Check if a pixel is non-transparent (alpha >= threshold)
#[inline]
pub fn is_non_transparent(pixel: &Rgba<u8>) -> bool {
    pixel[3] >= ALPHA_THRESHOLD
}

/// Foreground test for silhouette images: opaque and brighter than `threshold`.
/// Keep `threshold` near black: only the removed background falls below it.
#[inline]
pub fn is_foreground(pixel: &Rgba<u8>, threshold: u8) -> bool {
    let luma = (pixel[0] as u32 * 299 + pixel[1] as u32 * 587 + pixel[2] as u32 * 114) / 1000;
    is_non_transparent(pixel) && luma > threshold as u32
}

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Create a debug image: mask boundary in gray, detected landmarks as crosses,
/// derived landmarks as circles and measured spans as lines.
pub fn create_debug_image(
    mask: &SilhouetteMask,
    landmarks: &LandmarkSet,
    spans: &[(Point, Point)],
) -> RgbImage {
    let gray = mask.to_gray_image();
    let mut canvas = RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0] / 2;
        Rgb([v, v, v])
    });

    for (start, end) in spans {
        draw_line_segment_mut(
            &mut canvas,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            SPAN_COLOR,
        );
    }

    for landmark in landmarks.iter() {
        let (x, y) = (landmark.position.x.round() as i32, landmark.position.y.round() as i32);
        match landmark.origin {
            LandmarkOrigin::Detected => draw_cross_mut(&mut canvas, DETECTED_COLOR, x, y),
            LandmarkOrigin::Derived(_) => draw_hollow_circle_mut(&mut canvas, (x, y), 3, DERIVED_COLOR),
        }
    }

    canvas
}
