use std::fs;
use std::path::Path;
use image::{GrayImage, ImageFormat, RgbImage};

use crate::errors::{BodyMeasureError, Result};
use crate::mask::{MaskFormat, SilhouetteMask};

/// Load a mask image and extract its boundary
pub fn load_mask<P: AsRef<Path>>(path: P, format: MaskFormat, threshold: u8) -> Result<SilhouetteMask> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BodyMeasureError::InvalidPath(path.to_path_buf()));
    }

    let img = image::open(path)?;

    let mask = match format {
        MaskFormat::Edges => SilhouetteMask::from_edge_image(&img.to_luma8(), threshold),
        MaskFormat::Silhouette => SilhouetteMask::from_silhouette(&img.to_rgba8(), threshold),
    };

    if mask.boundary_count() == 0 {
        log::warn!("Mask {} has no boundary pixels", path.display());
    }

    Ok(mask)
}

/// Load a calibration photograph as 8-bit luma
pub fn load_calibration_image<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(BodyMeasureError::InvalidPath(path.to_path_buf()));
    }

    Ok(image::open(path)?.to_luma8())
}

/// Save an overlay image as PNG, creating the parent directory
pub fn save_debug_image<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    image.save_with_format(path, ImageFormat::Png)?;

    Ok(())
}
