//! Brings a secret image to the exact shape of its cover.
//!
//! Resampling is bilinear (`FilterType::Triangle`) and nothing else, so two
//! runs over the same input always produce the same pixels. Channel layout is
//! converted after resizing: gray to RGB replicates luma, RGB to gray uses the
//! `image` crate's luma weights.

use crate::error::{Result, StegoError};
use crate::raster::{to_dynamic, ColorMode};
use crate::types::{RasterImage, Shape};
use image::imageops::FilterType;

/// Interpolation used for every resize.
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Returns `true` when `image` would have to be resampled to match `target`.
#[inline]
pub fn needs_reconcile(image: &RasterImage, target: Shape) -> bool {
    image.shape() != target
}

/// Resamples `secret` to `target`. A secret that already has the target
/// shape is returned unchanged.
pub fn reconcile(secret: &RasterImage, target: Shape) -> Result<RasterImage> {
    if target.is_empty()
        || !matches!(target.channels, 1 | 3)
        || u32::try_from(target.width).is_err()
        || u32::try_from(target.height).is_err()
    {
        return Err(StegoError::InvalidDimensions(target));
    }

    if !needs_reconcile(secret, target) {
        return Ok(secret.clone());
    }

    let mut dynamic = to_dynamic(secret)?;
    if secret.width() != target.width || secret.height() != target.height {
        dynamic = dynamic.resize_exact(target.width as u32, target.height as u32, RESAMPLE_FILTER);
    }

    let mode = if target.channels == 1 {
        ColorMode::Gray
    } else {
        ColorMode::Color
    };

    crate::raster::from_dynamic(dynamic, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_shape_is_identity() {
        let img = RasterImage::from_raw(Shape::new(2, 2, 1), vec![1, 2, 3, 4]).unwrap();
        let out = reconcile(&img, img.shape()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_resize_hits_exact_target() {
        let img = RasterImage::filled(Shape::new(3, 5, 3), 90).unwrap();
        let target = Shape::new(8, 6, 3);

        let out = reconcile(&img, target).unwrap();

        assert_eq!(out.shape(), target);
        assert!(out.as_raw().iter().all(|&v| v == 90));
    }

    #[test]
    fn test_channel_conversion() {
        let gray = RasterImage::filled(Shape::new(4, 4, 1), 200).unwrap();
        let out = reconcile(&gray, Shape::new(4, 4, 3)).unwrap();
        assert_eq!(out.shape(), Shape::new(4, 4, 3));
        assert!(out.as_raw().iter().all(|&v| v == 200));

        let back = reconcile(&out, Shape::new(2, 2, 1)).unwrap();
        assert_eq!(back.shape(), Shape::new(2, 2, 1));
        assert!(back.as_raw().iter().all(|&v| v == 200));
    }

    #[test]
    fn test_deterministic() {
        let data = (0..48u8).map(|v| v.wrapping_mul(37)).collect();
        let img = RasterImage::from_raw(Shape::new(4, 4, 3), data).unwrap();
        let target = Shape::new(7, 3, 3);

        assert_eq!(reconcile(&img, target).unwrap(), reconcile(&img, target).unwrap());
    }

    #[test]
    fn test_rejects_degenerate_target() {
        let img = RasterImage::filled(Shape::new(2, 2, 1), 0).unwrap();
        for target in [Shape::new(0, 2, 1), Shape::new(2, 0, 1), Shape::new(2, 2, 2)] {
            assert!(matches!(
                reconcile(&img, target),
                Err(StegoError::InvalidDimensions(_))
            ));
        }
    }
}
