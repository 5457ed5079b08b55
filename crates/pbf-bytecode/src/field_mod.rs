//! Field modifiers, distinguishing how a field's raw bytes become a
//! fielddata slot.
//!
//! A field without a modifier stores its wire value (zigzag-undecoded,
//! float-unreinterpreted) as-is. The three leaf modifiers reinterpret a
//! scalar in place; the two intermediary modifiers mean the spec has a
//! `sub` tree and the field itself never reaches a fielddata slot.

use std::fmt;

/// How a field's spec node is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldMod {
    /// Zigzag-decode the varint into a signed value.
    ZigZag,
    /// Reinterpret the scalar's bits as an IEEE-754 float (32- or 64-bit,
    /// depending on the wire type it was read from).
    Float,
    /// A packed repeated scalar: `sub` holds specs keyed by occurrence
    /// index, decoded positionally out of one length-delimited payload.
    Packed,
    /// A nested (sub-)message: `sub` holds specs keyed by the inner
    /// message's own field numbers.
    Message,
    /// A repeated field whose elements are *not* packed (each occurrence
    /// is its own tag-length-value on the wire): `sub` holds specs keyed
    /// by occurrence index, same as `Packed`, but demultiplexed by
    /// repetition count rather than by position within one payload.
    Repeated,
}

impl FieldMod {
    /// Decode from the modifier byte stored in the bytecode's field
    /// section. `0` is not a `FieldMod` value — it means "no modifier",
    /// represented in [`crate::field_spec::FieldSpec`] by the absence of
    /// one rather than by a variant here.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::ZigZag),
            2 => Some(Self::Float),
            3 => Some(Self::Packed),
            4 => Some(Self::Message),
            5 => Some(Self::Repeated),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::ZigZag => 1,
            Self::Float => 2,
            Self::Packed => 3,
            Self::Message => 4,
            Self::Repeated => 5,
        }
    }

    /// A leaf modifier reinterprets a scalar value in place and still
    /// lands in a fielddata slot. An intermediary modifier means the
    /// field has a `sub` tree instead.
    pub fn is_leaf(self) -> bool {
        matches!(self, Self::ZigZag | Self::Float)
    }

    pub fn is_intermediary(self) -> bool {
        !self.is_leaf()
    }
}

impl fmt::Display for FieldMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ZigZag => "zigzag",
            Self::Float => "float",
            Self::Packed => "packed",
            Self::Message => "message",
            Self::Repeated => "repeated",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_all_variants() {
        for m in [
            FieldMod::ZigZag,
            FieldMod::Float,
            FieldMod::Packed,
            FieldMod::Message,
            FieldMod::Repeated,
        ] {
            assert_eq!(FieldMod::from_byte(m.to_byte()), Some(m));
        }
    }

    #[test]
    fn zero_is_not_a_mod() {
        assert_eq!(FieldMod::from_byte(0), None);
    }

    #[test]
    fn unknown_byte_is_none() {
        assert_eq!(FieldMod::from_byte(6), None);
        assert_eq!(FieldMod::from_byte(255), None);
    }

    #[test]
    fn leaf_vs_intermediary() {
        assert!(FieldMod::ZigZag.is_leaf());
        assert!(FieldMod::Float.is_leaf());
        assert!(FieldMod::Packed.is_intermediary());
        assert!(FieldMod::Message.is_intermediary());
        assert!(FieldMod::Repeated.is_intermediary());
    }
}
