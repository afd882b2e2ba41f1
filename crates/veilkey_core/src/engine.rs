//! Key generation and secret recovery.

use crate::error::Result;
use crate::types::{ensure_same_shape, RasterImage, RecoveredImage, StegoKey};

/// Computes `secret - cover` per sample.
///
/// The cover is only read. Shapes must already agree; see
/// [`crate::reconcile::reconcile`] for bringing a secret to the cover's shape.
pub fn generate(cover: &RasterImage, secret: &RasterImage) -> Result<StegoKey> {
    ensure_same_shape(cover.shape(), secret.shape())?;

    let data = cover
        .as_raw()
        .iter()
        .zip(secret.as_raw())
        .map(|(&c, &s)| i16::from(s) - i16::from(c))
        .collect();

    Ok(StegoKey::from_difference(cover.shape(), data))
}

/// Adds `key` back onto `cover`, clamping each sample to `[0, 255]`.
///
/// With the cover the key was generated against, every sum is already in
/// range and the secret comes back bit-exact. A tampered key or a different
/// cover saturates instead of wrapping.
pub fn recover(cover: &RasterImage, key: &StegoKey) -> Result<RecoveredImage> {
    ensure_same_shape(cover.shape(), key.shape())?;

    let data = cover
        .as_raw()
        .iter()
        .zip(key.values())
        .map(|(&c, &k)| (i16::from(c) + k).clamp(0, 255) as u8)
        .collect();

    RasterImage::from_raw(cover.shape(), data)
}
