//! Protobuf wire-format primitives.
//!
//! Minimal, dependency-free decoders for the four primitive wire
//! encodings. Each reader takes a byte slice and returns the decoded
//! value together with the number of bytes it consumed, so callers can
//! advance their own cursor without a second pass over the buffer.

use std::fmt;

/// A protobuf wire type, as carried in the low 3 bits of a field tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Decode from the low 3 bits of a tag. `None` for the one value
    /// (6, 7) that protobuf never assigns.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            3 => Some(Self::StartGroup),
            4 => Some(Self::EndGroup),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Varint => "varint",
            Self::Fixed64 => "fixed64",
            Self::LengthDelimited => "length-delimited",
            Self::StartGroup => "start-group",
            Self::EndGroup => "end-group",
            Self::Fixed32 => "fixed32",
        };
        f.write_str(s)
    }
}

/// A wire-format parse failure. Distinct from [`crate::LoadError`] and
/// `pbf-vm`'s runtime error — this is the primitive-level failure both
/// higher layers wrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    #[error("varint is malformed or exceeds 64 bits")]
    MalformedVarint,
}

const MAX_VARINT_BYTES: usize = 10;

/// Decode a base-128 varint. Returns `(value, bytes_consumed)`.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    for (i, &b) in buf.iter().take(MAX_VARINT_BYTES).enumerate() {
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() < MAX_VARINT_BYTES {
        Err(WireError::UnexpectedEof)
    } else {
        Err(WireError::MalformedVarint)
    }
}

/// Decode a little-endian `u32`. Returns `(value, bytes_consumed)`.
pub fn read_fixed32(buf: &[u8]) -> Result<(u32, usize), WireError> {
    let bytes: [u8; 4] = buf
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(WireError::UnexpectedEof)?;
    Ok((u32::from_le_bytes(bytes), 4))
}

/// Decode a little-endian `u64`. Returns `(value, bytes_consumed)`.
pub fn read_fixed64(buf: &[u8]) -> Result<(u64, usize), WireError> {
    let bytes: [u8; 8] = buf
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or(WireError::UnexpectedEof)?;
    Ok((u64::from_le_bytes(bytes), 8))
}

/// Decode a length-delimited payload: a varint length prefix followed by
/// that many bytes. Returns `(payload, prefix_bytes)` — note this is the
/// prefix length, not the total consumed; callers add `payload.len()`.
pub fn read_length_delimited(buf: &[u8]) -> Result<(&[u8], usize), WireError> {
    let (len, prefix) = read_varint(buf)?;
    let len = usize::try_from(len).map_err(|_| WireError::MalformedVarint)?;
    let payload = buf.get(prefix..prefix + len).ok_or(WireError::UnexpectedEof)?;
    Ok((payload, prefix))
}

/// Decode a field tag: a varint whose value packs `(field_number << 3) |
/// wire_type`. Returns `((field_number, wire_type), bytes_consumed)`.
pub fn decode_tag(buf: &[u8]) -> Result<((u32, u8), usize), WireError> {
    let (v, n) = read_varint(buf)?;
    let field_number = u32::try_from(v >> 3).map_err(|_| WireError::MalformedVarint)?;
    let wire_type = (v & 0x7) as u8;
    Ok(((field_number, wire_type), n))
}

/// ZigZag-decode a u64 into its signed i64 representation.
pub fn decode_zigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
