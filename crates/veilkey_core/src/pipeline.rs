//! File-to-file sender and receiver flows.

use crate::engine::{generate, recover};
use crate::error::{Result, StegoError};
use crate::keystore;
use crate::quality::psnr;
use crate::raster::{self, ColorMode};
use crate::reconcile::{needs_reconcile, reconcile};
use crate::types::{RecoveredImage, Shape};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What to do when the secret's shape differs from the cover's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilePolicy {
    /// Resample the secret to the cover's shape.
    #[default]
    Resample,
    /// Fail with a shape mismatch.
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderOptions {
    pub color_mode: ColorMode,
    pub policy: ReconcilePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SenderReport {
    /// Shape of the cover, and therefore of the key.
    pub shape: Shape,
    /// Shape of the secret as decoded, before any resampling.
    pub secret_shape: Shape,
    /// Whether the secret had to be resampled. When set, recovery yields the
    /// resampled secret rather than the original pixels.
    pub resampled: bool,
}

/// Loads cover and secret, generates the key and writes it to `key_path`.
pub fn process_sender(
    cover_path: impl AsRef<Path>,
    secret_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    options: &SenderOptions,
) -> Result<SenderReport> {
    ensure_not_cover(cover_path.as_ref(), key_path.as_ref())?;

    let cover = raster::load(cover_path, options.color_mode)?;
    let mut secret = raster::load(secret_path, options.color_mode)?;
    let secret_shape = secret.shape();

    let resampled = needs_reconcile(&secret, cover.shape());
    if resampled {
        match options.policy {
            ReconcilePolicy::Resample => secret = reconcile(&secret, cover.shape())?,
            ReconcilePolicy::Reject => {
                return Err(StegoError::ShapeMismatch {
                    expected: cover.shape(),
                    actual: secret_shape,
                });
            }
        }
    }

    let key = generate(&cover, &secret)?;
    keystore::save(&key, key_path)?;

    Ok(SenderReport {
        shape: cover.shape(),
        secret_shape,
        resampled,
    })
}

/// Loads cover and key, recovers the secret and writes it to `output_path`
/// in the format named by its extension.
pub fn process_receiver(
    cover_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    color_mode: ColorMode,
) -> Result<RecoveredImage> {
    let output_path = output_path.as_ref();
    raster::format_from_path(output_path)?;
    ensure_not_cover(cover_path.as_ref(), output_path)?;

    let cover = raster::load(cover_path, color_mode)?;
    let key = keystore::load(key_path)?;
    let recovered = recover(&cover, &key)?;

    raster::save(&recovered, output_path)?;
    Ok(recovered)
}

/// PSNR between two image files of equal shape.
pub fn verify(
    reference_path: impl AsRef<Path>,
    candidate_path: impl AsRef<Path>,
    color_mode: ColorMode,
) -> Result<f64> {
    let reference = raster::load(reference_path, color_mode)?;
    let candidate = raster::load(candidate_path, color_mode)?;
    psnr(&reference, &candidate)
}

/// Fails when writing `output` would replace the file at `cover`, including
/// through a symlink or a differently spelled path.
fn ensure_not_cover(cover: &Path, output: &Path) -> Result<()> {
    // A cover that cannot be resolved fails to load later with a better error.
    let Ok(cover) = fs::canonicalize(cover) else {
        return Ok(());
    };

    if resolve_output(output).is_some_and(|target| target == cover) {
        return Err(StegoError::OutputIsCover(output.display().to_string()));
    }
    Ok(())
}

fn resolve_output(output: &Path) -> Option<PathBuf> {
    if let Ok(existing) = fs::canonicalize(output) {
        return Some(existing);
    }
    let name = output.file_name()?;
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}
