//! Peak signal-to-noise ratio between two images.

use crate::error::Result;
use crate::types::{ensure_same_shape, RasterImage};

pub const MAX_PIXEL: f64 = 255.0;

/// Mean squared error over every sample.
pub fn mse(reference: &RasterImage, candidate: &RasterImage) -> Result<f64> {
    ensure_same_shape(reference.shape(), candidate.shape())?;

    let sum: f64 = reference
        .as_raw()
        .iter()
        .zip(candidate.as_raw())
        .map(|(&a, &b)| {
            let d = f64::from(a) - f64::from(b);
            d * d
        })
        .sum();

    Ok(sum / reference.as_raw().len() as f64)
}

/// PSNR in decibels; `f64::INFINITY` when the images are bit-identical.
pub fn psnr(reference: &RasterImage, candidate: &RasterImage) -> Result<f64> {
    let mse = mse(reference, candidate)?;
    if mse == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(20.0 * (MAX_PIXEL / mse.sqrt()).log10())
}
