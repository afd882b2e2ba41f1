use crate::error::{Result, StegoError};
use serde::{Deserialize, Serialize};

/// Largest magnitude a key element can take: the full span of an 8-bit sample.
pub const MAX_KEY_MAGNITUDE: i16 = 255;

const KEY_RANGE: std::ops::RangeInclusive<i16> = -MAX_KEY_MAGNITUDE..=MAX_KEY_MAGNITUDE;

/// Height, width and channel count of a pixel matrix, in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Number of samples in a matrix of this shape.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Like [`Shape::len`], but `None` when the count does not fit in `usize`.
    #[must_use]
    pub const fn checked_len(&self) -> Option<usize> {
        match self.height.checked_mul(self.width) {
            Some(n) => n.checked_mul(self.channels),
            None => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0 || self.channels == 0
    }

    #[inline]
    #[must_use]
    pub const fn index(&self, row: usize, col: usize, channel: usize) -> usize {
        (row * self.width + col) * self.channels + channel
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

pub(crate) fn ensure_same_shape(expected: Shape, actual: Shape) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(StegoError::ShapeMismatch { expected, actual })
    }
}

/// An immutable H x W x C matrix of 8-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    shape: Shape,
    data: Vec<u8>,
}

/// Output of recovery; always shaped like the cover it was recovered from.
pub type RecoveredImage = RasterImage;

impl RasterImage {
    /// Wraps row-major sample data. Fails when the shape is empty, has a
    /// channel count other than 1 or 3, or disagrees with the data length.
    pub fn from_raw(shape: Shape, data: Vec<u8>) -> Result<Self> {
        let len = Self::sample_count(shape)?;
        if data.len() != len {
            return Err(StegoError::InvalidDimensions(shape));
        }
        Ok(Self { shape, data })
    }

    /// Builds an image where every sample has the same value.
    pub fn filled(shape: Shape, value: u8) -> Result<Self> {
        let len = Self::sample_count(shape)?;
        Self::from_raw(shape, vec![value; len])
    }

    fn sample_count(shape: Shape) -> Result<usize> {
        match shape.checked_len() {
            Some(len) if len > 0 && matches!(shape.channels, 1 | 3) => Ok(len),
            _ => Err(StegoError::InvalidDimensions(shape)),
        }
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.shape.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.shape.width
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.shape.channels
    }

    #[inline]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> Option<u8> {
        if row >= self.shape.height || col >= self.shape.width || channel >= self.shape.channels {
            return None;
        }
        self.data.get(self.shape.index(row, col, channel)).copied()
    }
}

/// Signed per-sample difference between a secret and the cover it was
/// generated against. Every element lies in `[-255, 255]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StegoKey {
    shape: Shape,
    data: Vec<i16>,
}

impl StegoKey {
    /// Wraps row-major key data, validating shape and element range.
    pub fn from_raw(shape: Shape, data: Vec<i16>) -> Result<Self> {
        let len = match shape.checked_len() {
            Some(len) if len > 0 && matches!(shape.channels, 1 | 3) => len,
            _ => return Err(StegoError::KeyFormat(format!("unusable key shape {shape}"))),
        };
        if data.len() != len {
            return Err(StegoError::KeyFormat(format!(
                "key shape {shape} needs {len} elements, got {}",
                data.len()
            )));
        }
        if let Some((index, value)) = data
            .iter()
            .enumerate()
            .find(|(_, v)| !KEY_RANGE.contains(*v))
        {
            return Err(StegoError::KeyFormat(format!(
                "element {index} is {value}, outside [-255, 255]"
            )));
        }
        Ok(Self { shape, data })
    }

    /// Caller guarantees the data came from subtracting two 8-bit images.
    pub(crate) fn from_difference(shape: Shape, data: Vec<i16>) -> Self {
        debug_assert_eq!(data.len(), shape.len());
        debug_assert!(data.iter().all(|v| KEY_RANGE.contains(v)));
        Self { shape, data }
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn values(&self) -> &[i16] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> Option<i16> {
        if row >= self.shape.height || col >= self.shape.width || channel >= self.shape.channels {
            return None;
        }
        self.data.get(self.shape.index(row, col, channel)).copied()
    }

    /// Smallest and largest element.
    pub fn value_range(&self) -> (i16, i16) {
        self.data
            .iter()
            .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Fraction of elements that are zero, i.e. where secret and cover agree.
    pub fn zero_fraction(&self) -> f64 {
        let zeros = self.data.iter().filter(|&&v| v == 0).count();
        zeros as f64 / self.data.len() as f64
    }
}
