// src/mask.rs - Boundary mask of a subject's silhouette for one photograph

use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::errors::{BodyMeasureError, Result};
use crate::geometry::Point;
use crate::image_utils::{in_bounds, is_foreground};

/// How a mask image encodes the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskFormat {
    /// Edge / contour image: bright pixels are the boundary.
    #[default]
    Edges,
    /// Filled silhouette: the boundary is extracted from the foreground.
    Silhouette,
}

/// Binary boundary mask. A pixel `(i, j)` covers `[i-0.5, i+0.5) x [j-0.5, j+0.5)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SilhouetteMask {
    width: u32,
    height: u32,
    boundary: Vec<bool>,
}

/// Horizontal direction used when scanning a crop row by row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowScan {
    LeftToRight,
    RightToLeft,
}

impl SilhouetteMask {
    /// Mask with no boundary pixels.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            boundary: vec![false; (width as usize) * (height as usize)],
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let mut mask = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                if f(x, y) {
                    mask.set(x, y, true);
                }
            }
        }
        mask
    }

    /// Build from an edge image: every pixel with luma >= `threshold` is boundary.
    pub fn from_edge_image(image: &GrayImage, threshold: u8) -> Self {
        let (width, height) = image.dimensions();
        Self::from_fn(width, height, |x, y| image.get_pixel(x, y)[0] >= threshold)
    }

    /// Build from a filled silhouette. A foreground pixel is boundary when one of
    /// its 4-neighbours is background or lies outside the image.
    pub fn from_silhouette(image: &RgbaImage, threshold: u8) -> Self {
        let (width, height) = image.dimensions();
        let foreground = |x: i32, y: i32| -> bool {
            in_bounds(x, y, width, height)
                && is_foreground(image.get_pixel(x as u32, y as u32), threshold)
        };

        Self::from_fn(width, height, |x, y| {
            let (xi, yi) = (x as i32, y as i32);
            foreground(xi, yi)
                && [(1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .any(|(dx, dy)| !foreground(xi + dx, yi + dy))
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Length of the image diagonal in pixels.
    pub fn diagonal(&self) -> f64 {
        (self.width as f64).hypot(self.height as f64)
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.boundary[idx] = value;
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Boundary test for signed coordinates; out-of-bounds is never boundary.
    #[inline]
    pub fn is_boundary(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.boundary[self.index(x as u32, y as u32)]
    }

    /// Pixel containing a continuous position, or `None` outside the mask.
    #[inline]
    pub fn pixel_at(&self, p: Point) -> Option<(u32, u32)> {
        let x = p.x.round();
        let y = p.y.round();
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if x < 0.0 || y < 0.0 || x >= self.width as f64 || y >= self.height as f64 {
            return None;
        }
        Some((x as u32, y as u32))
    }

    pub fn boundary_count(&self) -> usize {
        self.boundary.iter().filter(|&&b| b).count()
    }

    /// Copy of the axis-aligned box spanned by two points, clipped to the mask.
    pub fn crop(&self, a: Point, b: Point) -> Result<MaskCrop> {
        let clamp_x = |v: f64| v.max(0.0).min(self.width as f64) as u32;
        let clamp_y = |v: f64| v.max(0.0).min(self.height as f64) as u32;

        let x0 = clamp_x(a.x.min(b.x).floor());
        let x1 = clamp_x(a.x.max(b.x).floor());
        let y0 = clamp_y(a.y.min(b.y).floor());
        let y1 = clamp_y(a.y.max(b.y).floor());

        if x1 <= x0 || y1 <= y0 {
            return Err(BodyMeasureError::DegenerateGeometry(format!(
                "empty crop between ({:.1}, {:.1}) and ({:.1}, {:.1})",
                a.x, a.y, b.x, b.y
            )));
        }

        let (width, height) = (x1 - x0, y1 - y0);
        let mut boundary = Vec::with_capacity((width * height) as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                boundary.push(self.boundary[self.index(x, y)]);
            }
        }

        Ok(MaskCrop {
            offset_x: x0,
            offset_y: y0,
            width,
            height,
            boundary,
        })
    }

    /// Render as a grayscale image (boundary white on black).
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.boundary[self.index(x, y)] {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

/// Owned sub-region of a mask that can be partially cleared before searching.
#[derive(Debug, Clone)]
pub struct MaskCrop {
    offset_x: u32,
    offset_y: u32,
    width: u32,
    height: u32,
    boundary: Vec<bool>,
}

impl MaskCrop {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Clear crop rows `start..end` (crop-local, clipped).
    pub fn clear_rows(&mut self, start: u32, end: u32) {
        let end = end.min(self.height);
        for y in start.min(end)..end {
            for x in 0..self.width {
                self.boundary[(y * self.width + x) as usize] = false;
            }
        }
    }

    /// Clear crop columns `start..end` (crop-local, clipped).
    pub fn clear_columns(&mut self, start: u32, end: u32) {
        let end = end.min(self.width);
        for y in 0..self.height {
            for x in start.min(end)..end {
                self.boundary[(y * self.width + x) as usize] = false;
            }
        }
    }

    /// First boundary pixel scanning rows top-down, mapped back to full-mask coordinates.
    pub fn first_boundary(&self, scan: RowScan) -> Option<Point> {
        for y in 0..self.height {
            let hit = match scan {
                RowScan::LeftToRight => {
                    (0..self.width).find(|&x| self.boundary[(y * self.width + x) as usize])
                }
                RowScan::RightToLeft => (0..self.width)
                    .rev()
                    .find(|&x| self.boundary[(y * self.width + x) as usize]),
            };
            if let Some(x) = hit {
                return Some(Point::new(
                    (x + self.offset_x) as f64,
                    (y + self.offset_y) as f64,
                ));
            }
        }
        None
    }
}
