//! Stego key persistence in the NumPy `.npy` tensor format.
//!
//! Keys are written as little-endian `i16` in row-major order with a
//! version 1.0 header. Reading accepts any signed integer of at least 16 bits
//! in either byte order, as written by NumPy, and rejects anything that does
//! not describe a complete 2-D or 3-D key with elements in `[-255, 255]`.

mod header;

pub use header::{IntWidth, KeyDtype, KeyHeader};

use crate::error::{Result, StegoError};
use crate::io::write_atomic;
use crate::types::StegoKey;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// File extension for stored keys.
pub const KEY_EXTENSION: &str = "npy";

/// Serializes `key` into `.npy` bytes.
pub fn to_bytes(key: &StegoKey) -> Vec<u8> {
    let mut out = header::format(key.shape());
    out.reserve(key.values().len() * 2);
    for value in key.values() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Parses a complete `.npy` file image.
pub fn from_bytes(bytes: &[u8]) -> Result<StegoKey> {
    let header = header::parse(bytes)?;
    let data = &bytes[header.data_offset..];

    let expected = header.data_len();
    if data.len() < expected {
        return Err(StegoError::KeyFormat(format!(
            "truncated data: expected {expected} bytes, found {}",
            data.len()
        )));
    }
    if data.len() > expected {
        return Err(StegoError::KeyFormat(format!(
            "{} unexpected bytes after key data",
            data.len() - expected
        )));
    }

    let values = decode_values(data, header.dtype)?;
    StegoKey::from_raw(header.shape, values)
}

fn decode_values(data: &[u8], dtype: KeyDtype) -> Result<Vec<i16>> {
    let width = dtype.width.bytes();
    data.chunks_exact(width)
        .enumerate()
        .map(|(index, chunk)| {
            let wide = read_int(chunk, dtype);
            i16::try_from(wide).map_err(|_| {
                StegoError::KeyFormat(format!(
                    "element {index} is {wide}, outside [-255, 255]"
                ))
            })
        })
        .collect()
}

fn read_int(chunk: &[u8], dtype: KeyDtype) -> i64 {
    let mut buf = [0u8; 8];
    buf[..chunk.len()].copy_from_slice(chunk);
    match (dtype.width, dtype.little_endian) {
        (IntWidth::I16, true) => i64::from(i16::from_le_bytes([buf[0], buf[1]])),
        (IntWidth::I16, false) => i64::from(i16::from_be_bytes([buf[0], buf[1]])),
        (IntWidth::I32, true) => i64::from(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        (IntWidth::I32, false) => i64::from(i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
        (IntWidth::I64, true) => i64::from_le_bytes(buf),
        (IntWidth::I64, false) => i64::from_be_bytes(buf),
    }
}

/// Writes `key` to `path`. The file appears complete or not at all.
pub fn save(key: &StegoKey, path: impl AsRef<Path>) -> Result<()> {
    write_atomic(path, &to_bytes(key))
}

/// Reads a key written by [`save`] or by `numpy.save`.
pub fn load(path: impl AsRef<Path>) -> Result<StegoKey> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| StegoError::KeyFormat(format!("cannot read {}: {e}", path.display())))?;
    from_bytes(&bytes)
}

/// Reads only the header of the key at `path`.
pub fn inspect(path: impl AsRef<Path>) -> Result<KeyHeader> {
    let path = path.as_ref();
    let open_error =
        |e: std::io::Error| StegoError::KeyFormat(format!("cannot read {}: {e}", path.display()));

    let mut file = File::open(path).map_err(open_error)?;
    let mut preamble = [0u8; 12];
    let n = read_up_to(&mut file, &mut preamble).map_err(open_error)?;
    if n < 10 {
        return Err(StegoError::KeyFormat("missing .npy magic".into()));
    }

    let header_len = match preamble[6] {
        1 => 10 + u16::from_le_bytes([preamble[8], preamble[9]]) as usize,
        _ => 12 + u32::from_le_bytes([preamble[8], preamble[9], preamble[10], preamble[11]]) as usize,
    };

    let mut bytes = preamble[..n].to_vec();
    if header_len > n {
        let mut rest = Vec::new();
        file.take((header_len - n) as u64)
            .read_to_end(&mut rest)
            .map_err(open_error)?;
        bytes.extend_from_slice(&rest);
    }

    header::parse(&bytes)
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape;
    use tempfile::TempDir;

    fn sample_key() -> StegoKey {
        StegoKey::from_raw(Shape::new(2, 2, 1), vec![2, -2, 3, 0]).unwrap()
    }

    #[test]
    fn test_bytes_layout() {
        let bytes = to_bytes(&sample_key());
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        let data_offset = bytes.len() - 8;
        assert_eq!(data_offset % 64, 0);
        assert_eq!(&bytes[data_offset..], &[2, 0, 0xFE, 0xFF, 3, 0, 0, 0]);
    }

    #[test]
    fn test_save_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stego_key.npy");
        let key = sample_key();

        save(&key, &path).unwrap();

        assert_eq!(load(&path).unwrap(), key);
    }

    #[test]
    fn test_load_missing_is_format_error() {
        let result = load("/nonexistent/veilkey/key.npy");
        assert!(matches!(result, Err(StegoError::KeyFormat(_))));
    }

    #[test]
    fn test_truncated_data() {
        let mut bytes = to_bytes(&sample_key());
        bytes.pop();
        assert!(matches!(from_bytes(&bytes), Err(StegoError::KeyFormat(_))));
    }

    #[test]
    fn test_trailing_data() {
        let mut bytes = to_bytes(&sample_key());
        bytes.extend_from_slice(&[0, 0]);
        assert!(from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_reads_wide_big_endian() {
        let dict = "{'descr': '>i8', 'fortran_order': False, 'shape': (1, 3), }\n";
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        for v in [-255i64, 7, 255] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }

        let key = from_bytes(&bytes).unwrap();
        assert_eq!(key.shape(), Shape::new(1, 3, 1));
        assert_eq!(key.values(), &[-255, 7, 255]);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let dict = "{'descr': '<i4', 'fortran_order': False, 'shape': (1, 2), }\n";
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        for v in [0i32, 70_000] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(from_bytes(&bytes), Err(StegoError::KeyFormat(_))));

        let mut narrow = to_bytes(&sample_key());
        let len = narrow.len();
        narrow[len - 2..].copy_from_slice(&300i16.to_le_bytes());
        assert!(matches!(from_bytes(&narrow), Err(StegoError::KeyFormat(_))));
    }

    #[test]
    fn test_inspect_reads_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k.npy");
        let shape = Shape::new(3, 5, 3);
        let key = StegoKey::from_raw(shape, vec![-1; shape.len()]).unwrap();
        save(&key, &path).unwrap();

        let header = inspect(&path).unwrap();
        assert_eq!(header.shape, shape);
        assert_eq!(header.dtype, KeyDtype::NATIVE);
        assert_eq!(header.data_len(), shape.len() * 2);
    }
}
