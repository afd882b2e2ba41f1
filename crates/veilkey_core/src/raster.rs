//! Raster loading and encoding on top of the `image` crate.
//!
//! Decoding sniffs the format from the file content; the extension is only
//! consulted when choosing an output format for [`save`].

use crate::error::{Result, StegoError};
use crate::io::write_atomic;
use crate::types::{RasterImage, Shape};
pub use image::ImageFormat;
use image::{DynamicImage, GrayImage, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Formats the codec reads and writes.
pub const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Channel layout requested when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Grayscale sources stay single-channel, everything else becomes RGB.
    #[default]
    Auto,
    /// Always decode to a single luma channel.
    Gray,
    /// Always decode to three RGB channels. Alpha is dropped.
    Color,
}

/// Reads and decodes the image at `path`.
pub fn load(path: impl AsRef<Path>, mode: ColorMode) -> Result<RasterImage> {
    let path = path.as_ref();
    let origin = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| StegoError::image_load(&origin, e))?;
    decode_named(&bytes, mode, &origin)
}

/// Decodes an in-memory image file.
pub fn decode(bytes: &[u8], mode: ColorMode) -> Result<RasterImage> {
    decode_named(bytes, mode, "<memory>")
}

fn decode_named(bytes: &[u8], mode: ColorMode, origin: &str) -> Result<RasterImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| StegoError::image_load(origin, e))?;

    if reader.format().is_none() {
        return Err(StegoError::image_load(origin, "unrecognized image content"));
    }

    let dynamic = reader
        .decode()
        .map_err(|e| StegoError::image_load(origin, e))?;

    from_dynamic(dynamic, mode).map_err(|_| StegoError::image_load(origin, "decoded image is empty"))
}

/// Encodes `image` into the given container format.
pub fn encode(image: &RasterImage, format: ImageFormat) -> Result<Vec<u8>> {
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(StegoError::UnsupportedFormat(format!("{format:?}")));
    }

    let dynamic = to_dynamic(image)?;
    let mut out = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut out, format)
        .map_err(|e| StegoError::ImageEncode(e.to_string()))?;

    Ok(out.into_inner())
}

/// Encodes `image` in the format implied by the extension of `path` and
/// writes it atomically.
pub fn save(image: &RasterImage, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = format_from_path(path)?;
    let bytes = encode(image, format)?;
    write_atomic(path, &bytes)
}

/// Maps an output path's extension to a supported format.
pub fn format_from_path(path: impl AsRef<Path>) -> Result<ImageFormat> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)
        .map_err(|_| StegoError::UnsupportedFormat(path.display().to_string()))?;

    if SUPPORTED_FORMATS.contains(&format) {
        Ok(format)
    } else {
        Err(StegoError::UnsupportedFormat(path.display().to_string()))
    }
}

pub(crate) fn from_dynamic(dynamic: DynamicImage, mode: ColorMode) -> Result<RasterImage> {
    let gray = match mode {
        ColorMode::Gray => true,
        ColorMode::Color => false,
        ColorMode::Auto => !dynamic.color().has_color(),
    };

    let (width, height) = (dynamic.width() as usize, dynamic.height() as usize);
    if gray {
        let shape = Shape::new(height, width, 1);
        RasterImage::from_raw(shape, dynamic.into_luma8().into_raw())
    } else {
        let shape = Shape::new(height, width, 3);
        RasterImage::from_raw(shape, dynamic.into_rgb8().into_raw())
    }
}

pub(crate) fn to_dynamic(image: &RasterImage) -> Result<DynamicImage> {
    let shape = image.shape();
    let (Ok(width), Ok(height)) = (u32::try_from(shape.width), u32::try_from(shape.height)) else {
        return Err(StegoError::InvalidDimensions(shape));
    };
    let data = image.as_raw().to_vec();

    let dynamic = match shape.channels {
        1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        _ => None,
    };

    dynamic.ok_or(StegoError::InvalidDimensions(shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gradient(shape: Shape) -> RasterImage {
        let data = (0..shape.len()).map(|i| (i * 7 % 256) as u8).collect();
        RasterImage::from_raw(shape, data).unwrap()
    }

    #[test]
    fn test_png_is_lossless() {
        let img = gradient(Shape::new(5, 7, 3));
        let bytes = encode(&img, ImageFormat::Png).unwrap();
        let decoded = decode(&bytes, ColorMode::Auto).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_auto_keeps_gray_single_channel() {
        let img = gradient(Shape::new(4, 4, 1));
        let bytes = encode(&img, ImageFormat::Png).unwrap();
        let decoded = decode(&bytes, ColorMode::Auto).unwrap();
        assert_eq!(decoded.channels(), 1);
    }

    #[test]
    fn test_color_mode_expands_gray() {
        let img = gradient(Shape::new(2, 2, 1));
        let bytes = encode(&img, ImageFormat::Png).unwrap();
        let decoded = decode(&bytes, ColorMode::Color).unwrap();
        assert_eq!(decoded.shape(), Shape::new(2, 2, 3));
        assert_eq!(decoded.get(1, 1, 0), img.get(1, 1, 0));
        assert_eq!(decoded.get(1, 1, 2), img.get(1, 1, 0));
    }

    #[test]
    fn test_format_sniffed_from_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("actually_png.jpg");
        let img = gradient(Shape::new(3, 3, 3));
        std::fs::write(&path, encode(&img, ImageFormat::Png).unwrap()).unwrap();

        assert_eq!(load(&path, ColorMode::Auto).unwrap(), img);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load("/nonexistent/veilkey/cover.png", ColorMode::Auto);
        assert!(matches!(result, Err(StegoError::ImageLoad { .. })));
    }

    #[test]
    fn test_decode_garbage() {
        let result = decode(b"definitely not an image", ColorMode::Auto);
        assert!(matches!(result, Err(StegoError::ImageLoad { .. })));
    }

    #[test]
    fn test_save_uses_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bmp");
        let img = gradient(Shape::new(3, 4, 3));

        save(&img, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"BM");
        assert_eq!(load(&path, ColorMode::Auto).unwrap(), img);
    }

    #[test]
    fn test_unsupported_output_extension() {
        let result = format_from_path("recovered.gif");
        assert!(matches!(result, Err(StegoError::UnsupportedFormat(_))));
        assert!(format_from_path("recovered").is_err());
    }
}
