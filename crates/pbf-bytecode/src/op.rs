//! Opcode taxonomy for the instruction-and-constant section.
//!
//! An opcode is a single byte. Its numeric range determines how many
//! operand bytes follow it: `[0,64)` none, `[64,128)` one byte, `[128,192)`
//! a little-endian `u16`, `[192,256)` a little-endian `u64`. Within
//! `[0,64)` the low 3 bits double as a [`Cmp`] selector for the
//! `Compare*` families; the low bit doubles as an [`Option`] flag or a
//! [`Reg`] selector for the paired opcodes (`Return{False,True}`,
//! `LoadR{0,1}Field*`, ...).

use std::fmt;

/// One of the VM's two general-purpose registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg {
    R0 = 0,
    R1 = 1,
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::R0 => f.write_str("R0"),
            Self::R1 => f.write_str("R1"),
        }
    }
}

/// Comparison selector, packed into the low 3 bits of `Compare*` opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Lt,
    Ge,
    Eq,
    Ne,
    Le,
    Gt,
}

impl Cmp {
    /// Decode from the low 3 bits of an opcode. `None` for the two
    /// values (6, 7) that are never assigned to a comparator.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x7 {
            0 => Some(Self::Lt),
            1 => Some(Self::Ge),
            2 => Some(Self::Eq),
            3 => Some(Self::Ne),
            4 => Some(Self::Le),
            5 => Some(Self::Gt),
            _ => None,
        }
    }

    /// Apply this comparator to an [`std::cmp::Ordering`] produced by
    /// comparing the left (R1) and right (R0) operands.
    pub fn apply(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Self::Lt => ord == Less,
            Self::Ge => ord != Less,
            Self::Eq => ord == Equal,
            Self::Ne => ord != Equal,
            Self::Le => ord != Greater,
            Self::Gt => ord == Greater,
        }
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Gt => ">",
        };
        f.write_str(s)
    }
}

/// How many operand bytes follow an opcode, determined by its numeric
/// range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgClass {
    /// `[0, 64)` — no operand bytes.
    Nullary,
    /// `[64, 128)` — one operand byte.
    Byte,
    /// `[128, 192)` — a little-endian `u16` operand.
    Word,
    /// `[192, 256)` — a little-endian `u64` operand.
    Long,
}

impl ArgClass {
    /// Number of operand bytes following the opcode byte.
    pub fn operand_len(self) -> usize {
        match self {
            Self::Nullary => 0,
            Self::Byte => 1,
            Self::Word => 2,
            Self::Long => 8,
        }
    }
}

/// An opcode byte. Plain newtype over `u8`, mirroring the bytecode's own
/// representation — the VM never needs a fuller enum because every
/// operation it performs keys off numeric ranges and bit patterns, not
/// variant matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(pub u8);

#[allow(non_upper_case_globals)]
impl Opcode {
    // [0, 8): unsigned comparisons / const-scalar loads, sharing the Cmp/Option bit split.
    pub const CompareUnsignedLT: Opcode = Opcode(0);
    pub const CompareUnsignedGE: Opcode = Opcode(1);
    pub const CompareUnsignedEQ: Opcode = Opcode(2);
    pub const CompareUnsignedNE: Opcode = Opcode(3);
    pub const CompareUnsignedLE: Opcode = Opcode(4);
    pub const CompareUnsignedGT: Opcode = Opcode(5);
    pub const LoadConstScalar0: Opcode = Opcode(6);
    pub const LoadConstScalar1: Opcode = Opcode(7);

    // [8, 16): signed comparisons / returns.
    pub const CompareSignedLT: Opcode = Opcode(8);
    pub const CompareSignedGE: Opcode = Opcode(9);
    pub const CompareSignedEQ: Opcode = Opcode(10);
    pub const CompareSignedNE: Opcode = Opcode(11);
    pub const CompareSignedLE: Opcode = Opcode(12);
    pub const CompareSignedGT: Opcode = Opcode(13);
    pub const ReturnFalse: Opcode = Opcode(14);
    pub const ReturnTrue: Opcode = Opcode(15);

    // [16, 24): bytes comparisons, plus two reserved slots.
    pub const CompareBytesLT: Opcode = Opcode(16);
    pub const CompareBytesGE: Opcode = Opcode(17);
    pub const CompareBytesEQ: Opcode = Opcode(18);
    pub const CompareBytesNE: Opcode = Opcode(19);
    pub const CompareBytesLE: Opcode = Opcode(20);
    pub const CompareBytesGT: Opcode = Opcode(21);
    // 22, 23 reserved.

    // [24, 33): float comparisons, inf/nan checks.
    pub const CompareFloatLT: Opcode = Opcode(24);
    pub const CompareFloatGE: Opcode = Opcode(25);
    pub const CompareFloatEQ: Opcode = Opcode(26);
    pub const CompareFloatNE: Opcode = Opcode(27);
    pub const CompareFloatLE: Opcode = Opcode(28);
    pub const CompareFloatGT: Opcode = Opcode(29);
    pub const CompareFloatInfPos: Opcode = Opcode(30);
    pub const CompareFloatInfNeg: Opcode = Opcode(31);
    pub const CompareFloatNaN: Opcode = Opcode(32);

    // [36, 40): vector containment scans.
    pub const ContainsVarint: Opcode = Opcode(36);
    pub const ContainsZigZag: Opcode = Opcode(37);
    pub const ContainsFixed64: Opcode = Opcode(38);
    pub const ContainsFixed32: Opcode = Opcode(39);

    // [64, 71): field loads, one byte (field index) operand.
    pub const LoadR0FieldScalar: Opcode = Opcode(64);
    pub const LoadR1FieldScalar: Opcode = Opcode(65);
    pub const LoadR0FieldBytes: Opcode = Opcode(66);
    pub const LoadR1FieldBytes: Opcode = Opcode(67);
    pub const LoadR0FieldVector: Opcode = Opcode(68);
    pub const LoadR1FieldVector: Opcode = Opcode(69);
    pub const CheckField: Opcode = Opcode(70);

    // [128, 131): branches, two byte (instruction offset) operand.
    pub const SkipFalse: Opcode = Opcode(128);
    pub const SkipTrue: Opcode = Opcode(129);
    pub const Skip: Opcode = Opcode(130);

    // [192, 195): constant loads, eight byte operand.
    pub const LoadConstScalar: Opcode = Opcode(192);
    // 193 reserved.
    pub const LoadConstBytes: Opcode = Opcode(194);

    /// Classify by numeric range, determining operand length.
    pub fn class(self) -> ArgClass {
        match self.0 {
            0..=63 => ArgClass::Nullary,
            64..=127 => ArgClass::Byte,
            128..=191 => ArgClass::Word,
            _ => ArgClass::Long,
        }
    }

    /// Low 3 bits as a [`Cmp`], for the `Compare*` families. Opcodes that
    /// aren't comparisons happen to decode to `None` here (6, 7, 14, 15,
    /// ... share bit patterns with invalid `Cmp` values), which is exactly
    /// how the original bytecode disambiguates a `Compare*` opcode from
    /// its paired non-comparison opcode in the same numeric neighborhood.
    pub fn cmp(self) -> Option<Cmp> {
        Cmp::from_bits(self.0)
    }

    /// Low bit as a boolean polarity, for opcodes that come in
    /// False/True or 0/1 pairs (`Return*`, `LoadConstScalar{0,1}`,
    /// `Skip{False,True}`, `CompareFloatInf{Pos,Neg}`).
    pub fn option(self) -> bool {
        self.0 & 1 != 0
    }

    /// Low bit as a register selector, for the `LoadR{0,1}Field*` pairs.
    pub fn reg(self) -> Reg {
        if self.0 & 1 == 0 {
            Reg::R0
        } else {
            Reg::R1
        }
    }
}

/// Read an opcode's operand out of the bytes immediately following it,
/// zero-extended to `u64` regardless of width. `None` if `buf` is
/// shorter than `class.operand_len()`.
pub fn read_operand(buf: &[u8], class: ArgClass) -> Option<u64> {
    match class {
        ArgClass::Nullary => Some(0),
        ArgClass::Byte => buf.first().map(|&b| u64::from(b)),
        ArgClass::Word => buf
            .get(..2)
            .map(|s| u64::from(u16::from_le_bytes(s.try_into().unwrap()))),
        ArgClass::Long => buf
            .get(..8)
            .map(|s| u64::from_le_bytes(s.try_into().unwrap())),
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_boundaries() {
        assert_eq!(Opcode(0).class(), ArgClass::Nullary);
        assert_eq!(Opcode(63).class(), ArgClass::Nullary);
        assert_eq!(Opcode(64).class(), ArgClass::Byte);
        assert_eq!(Opcode(127).class(), ArgClass::Byte);
        assert_eq!(Opcode(128).class(), ArgClass::Word);
        assert_eq!(Opcode(191).class(), ArgClass::Word);
        assert_eq!(Opcode(192).class(), ArgClass::Long);
        assert_eq!(Opcode(255).class(), ArgClass::Long);
    }

    #[test]
    fn operand_lengths() {
        assert_eq!(ArgClass::Nullary.operand_len(), 0);
        assert_eq!(ArgClass::Byte.operand_len(), 1);
        assert_eq!(ArgClass::Word.operand_len(), 2);
        assert_eq!(ArgClass::Long.operand_len(), 8);
    }

    #[test]
    fn option_pairs() {
        assert!(!Opcode::LoadConstScalar0.option());
        assert!(Opcode::LoadConstScalar1.option());
        assert!(!Opcode::ReturnFalse.option());
        assert!(Opcode::ReturnTrue.option());
        assert!(!Opcode::CompareFloatInfPos.option());
        assert!(Opcode::CompareFloatInfNeg.option());
        assert!(!Opcode::SkipFalse.option());
        assert!(Opcode::SkipTrue.option());
    }

    #[test]
    fn reg_pairs() {
        assert_eq!(Opcode::LoadR0FieldScalar.reg(), Reg::R0);
        assert_eq!(Opcode::LoadR1FieldScalar.reg(), Reg::R1);
        assert_eq!(Opcode::LoadR0FieldBytes.reg(), Reg::R0);
        assert_eq!(Opcode::LoadR1FieldBytes.reg(), Reg::R1);
        assert_eq!(Opcode::LoadR0FieldVector.reg(), Reg::R0);
        assert_eq!(Opcode::LoadR1FieldVector.reg(), Reg::R1);
    }

    #[test]
    fn cmp_decoding() {
        assert_eq!(Opcode::CompareUnsignedLT.cmp(), Some(Cmp::Lt));
        assert_eq!(Opcode::CompareUnsignedGT.cmp(), Some(Cmp::Gt));
        assert_eq!(Opcode::CompareSignedEQ.cmp(), Some(Cmp::Eq));
        assert_eq!(Opcode::CompareBytesNE.cmp(), Some(Cmp::Ne));
        assert_eq!(Opcode::CompareFloatLE.cmp(), Some(Cmp::Le));
    }

    #[test]
    fn read_operand_widths() {
        assert_eq!(read_operand(&[], ArgClass::Nullary), Some(0));
        assert_eq!(read_operand(&[5, 9, 9], ArgClass::Byte), Some(5));
        assert_eq!(read_operand(&[0x34, 0x12], ArgClass::Word), Some(0x1234));
        assert_eq!(
            read_operand(&[1, 0, 0, 0, 0, 0, 0, 0], ArgClass::Long),
            Some(1)
        );
        assert_eq!(read_operand(&[1], ArgClass::Word), None);
    }

    #[test]
    fn cmp_apply() {
        use std::cmp::Ordering::*;
        assert!(Cmp::Lt.apply(Less));
        assert!(!Cmp::Lt.apply(Equal));
        assert!(Cmp::Ge.apply(Equal));
        assert!(Cmp::Ge.apply(Greater));
        assert!(!Cmp::Ge.apply(Less));
        assert!(Cmp::Eq.apply(Equal));
        assert!(Cmp::Ne.apply(Less));
        assert!(Cmp::Le.apply(Less));
        assert!(Cmp::Le.apply(Equal));
        assert!(!Cmp::Le.apply(Greater));
        assert!(Cmp::Gt.apply(Greater));
    }
}
