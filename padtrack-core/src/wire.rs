//! The binary wire-format mini-language and its decoder.
//!
//! Each telemetry source describes its datagram layout with a compact format
//! string in the style of a portable binary-struct language: an optional
//! leading byte-order marker (`<` little-endian, `>` or `!` big-endian),
//! followed by type codes with optional decimal repeat prefixes. `"<2sHHB"`
//! reads a 2-byte string, two little-endian `u16`s, and one `u8`.
//!
//! Supported codes:
//!
//! | code | type              | width |
//! |------|-------------------|-------|
//! | `x`  | pad byte          | 1     |
//! | `?`  | bool              | 1     |
//! | `b`/`B` | i8 / u8        | 1     |
//! | `h`/`H` | i16 / u16      | 2     |
//! | `i`/`I`/`l`/`L` | i32 / u32 | 4  |
//! | `q`/`Q` | i64 / u64      | 8     |
//! | `f`  | f32               | 4     |
//! | `d`  | f64               | 8     |
//! | `s`  | fixed-length string | 1 per byte |
//!
//! Pad bytes count toward the record size but never produce a value. A
//! repeat-prefixed `s` consumes that many bytes and yields a single string
//! with trailing NULs stripped; every other code yields one value per repeat.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Errors produced while parsing a format string or decoding a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The description contains an unknown type code, a malformed repeat
    /// count, or a stray byte-order marker.
    #[error("unsupported or malformed format near '{0}'")]
    InvalidFormat(String),
    /// The buffer is shorter than the record the format describes.
    #[error("buffer underrun: format needs {needed} bytes, datagram has {got}")]
    BufferUnderrun { needed: usize, got: usize },
}

/// Declared byte order for multi-byte integers and floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// One supported field type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    Pad,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
}

impl TypeCode {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'x' => TypeCode::Pad,
            '?' => TypeCode::Bool,
            'b' => TypeCode::I8,
            'B' => TypeCode::U8,
            'h' => TypeCode::I16,
            'H' => TypeCode::U16,
            'i' | 'l' => TypeCode::I32,
            'I' | 'L' => TypeCode::U32,
            'q' => TypeCode::I64,
            'Q' => TypeCode::U64,
            'f' => TypeCode::F32,
            'd' => TypeCode::F64,
            's' => TypeCode::Str,
            _ => return None,
        })
    }

    /// Byte width of a single repeat of this code.
    pub fn width(self) -> usize {
        match self {
            TypeCode::Pad | TypeCode::Bool | TypeCode::I8 | TypeCode::U8 | TypeCode::Str => 1,
            TypeCode::I16 | TypeCode::U16 => 2,
            TypeCode::I32 | TypeCode::U32 | TypeCode::F32 => 4,
            TypeCode::I64 | TypeCode::U64 | TypeCode::F64 => 8,
        }
    }
}

/// A `(repeat_count, type_code)` pair from a parsed format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatToken {
    pub count: usize,
    pub code: TypeCode,
}

/// One decoded scalar.
///
/// A closed tagged variant per supported type code family, so decoded values
/// keep their types from decode through UI mapping to publish. Serializes
/// untagged: the external transport sees plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// An immutable, parsed binary record layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    byte_order: ByteOrder,
    tokens: Vec<FormatToken>,
    size: usize,
}

impl FormatSpec {
    /// Parses a format description string.
    ///
    /// Whitespace is ignored. The byte order defaults to little-endian when
    /// no marker is present, matching the telemetry senders in the field.
    pub fn parse(description: &str) -> Result<Self, WireError> {
        let cleaned: Vec<char> = description.chars().filter(|c| !c.is_whitespace()).collect();
        let mut i = 0;

        let byte_order = match cleaned.first() {
            Some('<') => {
                i += 1;
                ByteOrder::Little
            }
            Some('>') | Some('!') => {
                i += 1;
                ByteOrder::Big
            }
            _ => ByteOrder::Little,
        };

        let rest_from = |at: usize| -> String { cleaned[at..].iter().collect() };

        let mut tokens = Vec::new();
        let mut size: usize = 0;
        while i < cleaned.len() {
            let start = i;

            let mut count: usize = 0;
            let mut has_digits = false;
            while i < cleaned.len() {
                let Some(d) = cleaned[i].to_digit(10) else {
                    break;
                };
                has_digits = true;
                count = count
                    .checked_mul(10)
                    .and_then(|c| c.checked_add(d as usize))
                    .ok_or_else(|| WireError::InvalidFormat(rest_from(start)))?;
                i += 1;
            }
            if has_digits && count == 0 {
                return Err(WireError::InvalidFormat(rest_from(start)));
            }
            let count = if has_digits { count } else { 1 };

            let code = cleaned
                .get(i)
                .copied()
                .and_then(TypeCode::from_char)
                .ok_or_else(|| WireError::InvalidFormat(rest_from(start)))?;
            i += 1;

            // A repeat count that parses can still describe a record too wide
            // to address; reject it here so decode never has to.
            size = count
                .checked_mul(code.width())
                .and_then(|w| size.checked_add(w))
                .ok_or_else(|| WireError::InvalidFormat(rest_from(start)))?;

            tokens.push(FormatToken { count, code });
        }

        Ok(Self {
            byte_order,
            tokens,
            size,
        })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn tokens(&self) -> &[FormatToken] {
        &self.tokens
    }

    /// Total byte width of one record described by this spec.
    ///
    /// Computed with checked arithmetic at parse time, so it can be used as
    /// a trusted bound here.
    pub fn size_of(&self) -> usize {
        self.size
    }

    /// Number of values a decode produces: one per repeat of every non-pad
    /// code, except `s`, which yields one value regardless of repeat count.
    pub fn value_count(&self) -> usize {
        self.tokens
            .iter()
            .map(|t| match t.code {
                TypeCode::Pad => 0,
                TypeCode::Str => 1,
                _ => t.count,
            })
            .sum()
    }

    /// Decodes one record from the front of `buffer`.
    ///
    /// Fields are read strictly left-to-right at increasing offsets. The
    /// buffer may be longer than the record; trailing bytes are ignored.
    pub fn decode(&self, buffer: &[u8]) -> Result<Vec<FieldValue>, WireError> {
        let needed = self.size_of();
        if buffer.len() < needed {
            return Err(WireError::BufferUnderrun {
                needed,
                got: buffer.len(),
            });
        }
        if buffer.len() > needed {
            trace!(
                consumed = needed,
                datagram = buffer.len(),
                "datagram longer than record, ignoring trailing bytes"
            );
        }

        let mut out = Vec::with_capacity(self.value_count());
        let mut offset = 0;
        for token in &self.tokens {
            match token.code {
                TypeCode::Pad => {
                    offset += token.count;
                }
                TypeCode::Str => {
                    let raw = &buffer[offset..offset + token.count];
                    let text = String::from_utf8_lossy(raw)
                        .trim_end_matches('\0')
                        .to_string();
                    out.push(FieldValue::Text(text));
                    offset += token.count;
                }
                TypeCode::Bool => {
                    for _ in 0..token.count {
                        out.push(FieldValue::Bool(buffer[offset] != 0));
                        offset += 1;
                    }
                }
                code => {
                    for _ in 0..token.count {
                        out.push(self.read_scalar(code, buffer, offset));
                        offset += code.width();
                    }
                }
            }
        }
        Ok(out)
    }

    fn read_scalar(&self, code: TypeCode, buffer: &[u8], offset: usize) -> FieldValue {
        let le = self.byte_order == ByteOrder::Little;

        macro_rules! read {
            ($ty:ty) => {{
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                bytes.copy_from_slice(&buffer[offset..offset + std::mem::size_of::<$ty>()]);
                if le {
                    <$ty>::from_le_bytes(bytes)
                } else {
                    <$ty>::from_be_bytes(bytes)
                }
            }};
        }

        match code {
            TypeCode::I8 => FieldValue::Int(read!(i8) as i64),
            TypeCode::U8 => FieldValue::UInt(read!(u8) as u64),
            TypeCode::I16 => FieldValue::Int(read!(i16) as i64),
            TypeCode::U16 => FieldValue::UInt(read!(u16) as u64),
            TypeCode::I32 => FieldValue::Int(read!(i32) as i64),
            TypeCode::U32 => FieldValue::UInt(read!(u32) as u64),
            TypeCode::I64 => FieldValue::Int(read!(i64)),
            TypeCode::U64 => FieldValue::UInt(read!(u64)),
            TypeCode::F32 => FieldValue::Float(read!(f32) as f64),
            TypeCode::F64 => FieldValue::Float(read!(f64)),
            // Handled by the caller before dispatching here.
            TypeCode::Pad | TypeCode::Bool | TypeCode::Str => unreachable!(),
        }
    }
}
