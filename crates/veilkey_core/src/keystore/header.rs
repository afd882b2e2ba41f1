//! NumPy `.npy` header parsing and formatting.
//!
//! The header is the `repr` of a Python dict with three keys:
//! `{'descr': '<i2', 'fortran_order': False, 'shape': (2, 2), }`.

use crate::error::{Result, StegoError};
use crate::types::Shape;
use std::collections::HashMap;

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Data start offset is padded to a multiple of this.
pub const HEADER_ALIGN: usize = 64;

/// Integer width of the stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    I16,
    I32,
    I64,
}

impl IntWidth {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }
}

/// Element type of a key tensor: a signed integer of at least 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDtype {
    pub width: IntWidth,
    pub little_endian: bool,
}

impl KeyDtype {
    pub const NATIVE: Self = Self {
        width: IntWidth::I16,
        little_endian: true,
    };

    fn parse(descr: &str) -> Result<Self> {
        let bytes = descr.as_bytes();
        if bytes.len() != 3 {
            return Err(dtype_error(descr));
        }

        let little_endian = match bytes[0] {
            b'<' => true,
            b'>' => false,
            // Single-byte types are the only ones numpy marks as '|'.
            _ => return Err(dtype_error(descr)),
        };

        if bytes[1] != b'i' {
            return Err(dtype_error(descr));
        }

        let width = match bytes[2] {
            b'2' => IntWidth::I16,
            b'4' => IntWidth::I32,
            b'8' => IntWidth::I64,
            _ => return Err(dtype_error(descr)),
        };

        Ok(Self {
            width,
            little_endian,
        })
    }

    pub fn descr(&self) -> String {
        let order = if self.little_endian { '<' } else { '>' };
        format!("{order}i{}", self.width.bytes())
    }
}

impl std::fmt::Display for KeyDtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.descr())
    }
}

fn dtype_error(descr: &str) -> StegoError {
    StegoError::KeyFormat(format!(
        "element type '{descr}' is not a signed integer of at least 16 bits"
    ))
}

/// Parsed `.npy` preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHeader {
    pub shape: Shape,
    pub dtype: KeyDtype,
    /// Byte offset of the first element from the start of the file.
    pub data_offset: usize,
}

impl KeyHeader {
    /// Size in bytes of the element data that must follow the header.
    pub fn data_len(&self) -> usize {
        self.shape.len() * self.dtype.width.bytes()
    }
}

/// Length of the fixed part (magic, version, header length) for a version.
fn preamble_len(major: u8) -> Result<usize> {
    match major {
        1 => Ok(10),
        2 | 3 => Ok(12),
        other => Err(StegoError::KeyFormat(format!(
            "unsupported format version {other}"
        ))),
    }
}

/// Parses the header at the start of `bytes`. Only the header needs to be
/// present; the element data is not inspected.
pub fn parse(bytes: &[u8]) -> Result<KeyHeader> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(StegoError::KeyFormat("missing .npy magic".into()));
    }

    let major = bytes[6];
    let preamble = preamble_len(major)?;
    if bytes.len() < preamble {
        return Err(StegoError::KeyFormat("truncated header".into()));
    }

    let header_len = if major == 1 {
        u16::from_le_bytes([bytes[8], bytes[9]]) as usize
    } else {
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize
    };

    let data_offset = preamble
        .checked_add(header_len)
        .ok_or_else(|| StegoError::KeyFormat("header length overflows".into()))?;
    let text = bytes
        .get(preamble..data_offset)
        .ok_or_else(|| StegoError::KeyFormat("truncated header".into()))?;
    let text = std::str::from_utf8(text)
        .map_err(|_| StegoError::KeyFormat("header is not text".into()))?;

    let dict = DictParser::new(text).parse()?;

    let descr = match dict.get("descr") {
        Some(Literal::Str(s)) => s.as_str(),
        _ => return Err(StegoError::KeyFormat("header has no 'descr'".into())),
    };
    let dtype = KeyDtype::parse(descr)?;

    match dict.get("fortran_order") {
        Some(Literal::Bool(false)) => {}
        Some(Literal::Bool(true)) => {
            return Err(StegoError::KeyFormat(
                "column-major (fortran_order) keys are not supported".into(),
            ));
        }
        _ => return Err(StegoError::KeyFormat("header has no 'fortran_order'".into())),
    }

    let dims = match dict.get("shape") {
        Some(Literal::Tuple(dims)) => dims,
        _ => return Err(StegoError::KeyFormat("header has no 'shape'".into())),
    };
    let shape = match dims.as_slice() {
        &[h, w] => Shape::new(h, w, 1),
        &[h, w, c] => Shape::new(h, w, c),
        _ => {
            return Err(StegoError::KeyFormat(format!(
                "expected a 2-D or 3-D key, got {} dimensions",
                dims.len()
            )));
        }
    };
    if shape.height == 0 || shape.width == 0 || !matches!(shape.channels, 1 | 3) {
        return Err(StegoError::KeyFormat(format!("unusable key shape {dims:?}")));
    }
    if shape
        .height
        .checked_mul(shape.width)
        .and_then(|n| n.checked_mul(shape.channels))
        .and_then(|n| n.checked_mul(dtype.width.bytes()))
        .is_none()
    {
        return Err(StegoError::KeyFormat(format!("key shape {dims:?} is too large")));
    }

    Ok(KeyHeader {
        shape,
        dtype,
        data_offset,
    })
}

/// Builds a version 1.0 preamble and header for an `i16` key of `shape`.
pub fn format(shape: Shape) -> Vec<u8> {
    let dims = if shape.channels == 1 {
        format!("({}, {})", shape.height, shape.width)
    } else {
        format!("({}, {}, {})", shape.height, shape.width, shape.channels)
    };
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {dims}, }}",
        KeyDtype::NATIVE.descr()
    );

    let unpadded = 10 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat_n(' ', padding));
    dict.push('\n');

    let mut out = Vec::with_capacity(10 + dict.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Bool(bool),
    Tuple(Vec<usize>),
}

struct DictParser<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> DictParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.as_bytes(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<HashMap<String, Literal>> {
        let mut entries = HashMap::new();
        self.expect(b'{')?;

        loop {
            self.skip_ws();
            if self.eat(b'}') {
                break;
            }

            let key = self.string()?;
            self.expect(b':')?;
            let value = self.literal()?;
            entries.insert(key, value);

            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            self.expect(b'}')?;
            break;
        }

        self.skip_ws();
        if self.pos != self.text.len() {
            return Err(self.error("trailing characters after header dict"));
        }
        Ok(entries)
    }

    fn literal(&mut self) -> Result<Literal> {
        self.skip_ws();
        match self.peek() {
            Some(b'\'') | Some(b'"') => self.string().map(Literal::Str),
            Some(b'(') => self.tuple().map(Literal::Tuple),
            Some(b'T') => self.keyword("True").map(|_| Literal::Bool(true)),
            Some(b'F') => self.keyword("False").map(|_| Literal::Bool(false)),
            _ => Err(self.error("unexpected value")),
        }
    }

    fn string(&mut self) -> Result<String> {
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected string")),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let s = String::from_utf8_lossy(&self.text[start..self.pos]).into_owned();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated string"))
    }

    fn tuple(&mut self) -> Result<Vec<usize>> {
        self.expect(b'(')?;
        let mut dims = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(b')') {
                return Ok(dims);
            }
            dims.push(self.integer()?);
            self.skip_ws();
            if self.eat(b',') {
                continue;
            }
            self.expect(b')')?;
            return Ok(dims);
        }
    }

    fn integer(&mut self) -> Result<usize> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected dimension size"));
        }
        let digits = std::str::from_utf8(&self.text[start..self.pos])
            .map_err(|_| self.error("expected dimension size"))?;
        let value = digits
            .parse()
            .map_err(|_| self.error("dimension size out of range"))?;
        // Python 2 longs carry an 'L' suffix.
        self.eat(b'L');
        Ok(value)
    }

    fn keyword(&mut self, word: &str) -> Result<()> {
        let end = self.pos + word.len();
        if self.text.get(self.pos..end) == Some(word.as_bytes()) {
            self.pos = end;
            Ok(())
        } else {
            Err(self.error("unexpected value"))
        }
    }

    fn expect(&mut self, c: u8) -> Result<()> {
        self.skip_ws();
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c as char)))
        }
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> StegoError {
        StegoError::KeyFormat(format!("malformed header at byte {}: {what}", self.pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_aligned() {
        for shape in [Shape::new(2, 2, 1), Shape::new(480, 640, 3), Shape::new(1, 1, 3)] {
            let header = format(shape);
            assert_eq!(header.len() % HEADER_ALIGN, 0);
            assert_eq!(*header.last().unwrap(), b'\n');
        }
    }

    #[test]
    fn test_format_then_parse() {
        let header = format(Shape::new(480, 640, 3));
        let parsed = parse(&header).unwrap();
        assert_eq!(parsed.shape, Shape::new(480, 640, 3));
        assert_eq!(parsed.dtype, KeyDtype::NATIVE);
        assert_eq!(parsed.data_offset, header.len());
    }

    #[test]
    fn test_grayscale_written_two_dimensional() {
        let header = format(Shape::new(3, 4, 1));
        let text = String::from_utf8_lossy(&header);
        assert!(text.contains("'shape': (3, 4), }"));
    }

    #[test]
    fn test_parse_numpy_variants() {
        let dict = "{'shape': (5L, 6L, 3L), 'fortran_order': False, 'descr': '>i4'}  \n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(dict.len() as u32).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());

        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.shape, Shape::new(5, 6, 3));
        assert_eq!(parsed.dtype.width, IntWidth::I32);
        assert!(!parsed.dtype.little_endian);
        assert_eq!(parsed.data_offset, 12 + dict.len());
    }

    fn v1(dict: &str) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes
    }

    #[test]
    fn test_rejects_narrow_or_unsigned_types() {
        for descr in ["|i1", "<u2", "<f8", "<f4", "|u1", "<i3", "<c8"] {
            let dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': (2, 2), }}");
            assert!(
                matches!(parse(&v1(&dict)), Err(StegoError::KeyFormat(_))),
                "{descr} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_bad_shapes() {
        for dims in ["()", "(4,)", "(2, 2, 2)", "(0, 3)", "(2, 2, 3, 1)", "(2, 2, 4)"] {
            let dict = format!("{{'descr': '<i2', 'fortran_order': False, 'shape': {dims}, }}");
            assert!(parse(&v1(&dict)).is_err(), "{dims} accepted");
        }
    }

    #[test]
    fn test_rejects_fortran_order() {
        let dict = "{'descr': '<i2', 'fortran_order': True, 'shape': (2, 2), }";
        assert!(parse(&v1(dict)).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse(b"").is_err());
        assert!(parse(b"\x93NUMPX\x01\x00\x00\x00").is_err());
        assert!(parse(&v1("{'descr': '<i2'")).is_err());
        assert!(parse(&v1("not a dict")).is_err());

        let mut short = v1("{'descr': '<i2', 'fortran_order': False, 'shape': (2, 2), }");
        short.truncate(20);
        assert!(parse(&short).is_err());
    }
}
