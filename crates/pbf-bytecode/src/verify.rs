//! Load-time verifier: symbolically executes every reachable instruction
//! path once, proving the interpreter can skip every safety check it
//! would otherwise need at runtime.
//!
//! The abstract state is a pair of register types plus a per-field
//! access-mode table. `off` on `Skip`/`SkipFalse`/`SkipTrue` is always a
//! forward distance from the instruction following the jump, so the
//! instruction pointer strictly increases along any taken edge; the
//! (offset, register-state) visited set exists mainly to collapse
//! branches that reconverge on the same state rather than to bound a
//! cycle, since the format can't express one.

use std::collections::HashSet;

use crate::error::{InvalidBytecode, LoadError};
use crate::op::{read_operand, ArgClass, Opcode};

/// The abstract type a register or field slot carries, proven at load
/// time so the interpreter's registers can stay untagged `u64`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Undefined,
    Scalar,
    Bytes,
    Vector,
}

impl AccessMode {
    fn require(self, want: AccessMode, offset: usize) -> Result<(), LoadError> {
        if self == want {
            Ok(())
        } else {
            Err(InvalidBytecode::RegisterTypeMismatch(offset).into())
        }
    }
}

struct Verifier<'b> {
    insns: &'b [u8],
    bytecode_len: usize,
    fieldcount: u16,
    field_modes: Vec<AccessMode>,
    visited: HashSet<(usize, AccessMode, AccessMode)>,
}

impl<'b> Verifier<'b> {
    fn check_field_index(&self, idx: u8) -> Result<(), LoadError> {
        if u16::from(idx) < self.fieldcount {
            Ok(())
        } else {
            Err(InvalidBytecode::FieldIndexOutOfBounds(idx, self.fieldcount).into())
        }
    }

    fn observe_field_mode(&mut self, idx: u8, mode: AccessMode) -> Result<(), LoadError> {
        self.check_field_index(idx)?;
        let slot = &mut self.field_modes[idx as usize];
        match *slot {
            AccessMode::Undefined => {
                *slot = mode;
                Ok(())
            }
            existing if existing == mode => Ok(()),
            _ => Err(InvalidBytecode::InconsistentFieldAccess(idx).into()),
        }
    }

    fn check_const_bytes(&self, arg: u64, offset: usize) -> Result<(), LoadError> {
        let (off, len) = crate::bytes_ref::unpack(arg);
        let end = u64::from(off) + u64::from(len);
        if end <= self.bytecode_len as u64 {
            Ok(())
        } else {
            Err(InvalidBytecode::InvalidBytesReference(off, len, self.bytecode_len).into())
        }
    }

    fn simulate(&mut self, offset: usize, r0: AccessMode, r1: AccessMode) -> Result<(), LoadError> {
        if !self.visited.insert((offset, r0, r1)) {
            return Ok(());
        }

        let &opcode_byte = self
            .insns
            .get(offset)
            .ok_or(InvalidBytecode::TruncatedInstruction(offset))?;
        let opcode = Opcode(opcode_byte);
        let class = opcode.class();
        let operand_start = offset + 1;
        let operand = self
            .insns
            .get(operand_start..)
            .and_then(|s| read_operand(s, class))
            .ok_or(InvalidBytecode::TruncatedInstruction(offset))?;
        let next = operand_start + class.operand_len();

        match opcode {
            Opcode::ReturnFalse | Opcode::ReturnTrue => Ok(()),

            Opcode::CompareUnsignedLT
            | Opcode::CompareUnsignedGE
            | Opcode::CompareUnsignedEQ
            | Opcode::CompareUnsignedNE
            | Opcode::CompareUnsignedLE
            | Opcode::CompareUnsignedGT
            | Opcode::CompareSignedLT
            | Opcode::CompareSignedGE
            | Opcode::CompareSignedEQ
            | Opcode::CompareSignedNE
            | Opcode::CompareSignedLE
            | Opcode::CompareSignedGT
            | Opcode::CompareFloatLT
            | Opcode::CompareFloatGE
            | Opcode::CompareFloatEQ
            | Opcode::CompareFloatNE
            | Opcode::CompareFloatLE
            | Opcode::CompareFloatGT => {
                r0.require(AccessMode::Scalar, offset)?;
                r1.require(AccessMode::Scalar, offset)?;
                self.simulate(next, r0, r1)
            }

            Opcode::CompareBytesLT
            | Opcode::CompareBytesGE
            | Opcode::CompareBytesEQ
            | Opcode::CompareBytesNE
            | Opcode::CompareBytesLE
            | Opcode::CompareBytesGT => {
                r0.require(AccessMode::Bytes, offset)?;
                r1.require(AccessMode::Bytes, offset)?;
                self.simulate(next, r0, r1)
            }

            Opcode::CompareFloatInfPos | Opcode::CompareFloatInfNeg | Opcode::CompareFloatNaN => {
                r0.require(AccessMode::Scalar, offset)?;
                self.simulate(next, r0, r1)
            }

            Opcode::ContainsVarint
            | Opcode::ContainsZigZag
            | Opcode::ContainsFixed64
            | Opcode::ContainsFixed32 => {
                r0.require(AccessMode::Scalar, offset)?;
                r1.require(AccessMode::Vector, offset)?;
                self.simulate(next, r0, r1)
            }

            Opcode::LoadConstScalar0 | Opcode::LoadConstScalar1 | Opcode::LoadConstScalar => {
                self.simulate(next, AccessMode::Scalar, r1)
            }

            Opcode::LoadConstBytes => {
                self.check_const_bytes(operand, offset)?;
                self.simulate(next, AccessMode::Bytes, r1)
            }

            Opcode::LoadR0FieldScalar | Opcode::LoadR1FieldScalar => {
                let idx = operand as u8;
                self.observe_field_mode(idx, AccessMode::Scalar)?;
                let (nr0, nr1) = set_reg(opcode.reg(), r0, r1, AccessMode::Scalar);
                self.simulate(next, nr0, nr1)
            }

            Opcode::LoadR0FieldBytes | Opcode::LoadR1FieldBytes => {
                let idx = operand as u8;
                self.observe_field_mode(idx, AccessMode::Bytes)?;
                let (nr0, nr1) = set_reg(opcode.reg(), r0, r1, AccessMode::Bytes);
                self.simulate(next, nr0, nr1)
            }

            Opcode::LoadR0FieldVector | Opcode::LoadR1FieldVector => {
                let idx = operand as u8;
                self.observe_field_mode(idx, AccessMode::Vector)?;
                let (nr0, nr1) = set_reg(opcode.reg(), r0, r1, AccessMode::Vector);
                self.simulate(next, nr0, nr1)
            }

            Opcode::CheckField => {
                self.check_field_index(operand as u8)?;
                self.simulate(next, r0, r1)
            }

            Opcode::Skip => self.simulate(next + operand as usize, r0, r1),

            Opcode::SkipFalse | Opcode::SkipTrue => {
                self.simulate(next + operand as usize, r0, r1)?;
                self.simulate(next, r0, r1)
            }

            _ => Err(InvalidBytecode::UnknownOpcode(opcode_byte, offset).into()),
        }
    }
}

fn set_reg(
    reg: crate::op::Reg,
    r0: AccessMode,
    r1: AccessMode,
    value: AccessMode,
) -> (AccessMode, AccessMode) {
    match reg {
        crate::op::Reg::R0 => (value, r1),
        crate::op::Reg::R1 => (r0, value),
    }
}

/// Verify every reachable instruction in `bytecode[insn_offset..]`.
/// `bytecode` is the whole buffer, since `LoadConstBytes` references are
/// absolute offsets into it rather than into the instruction section.
pub fn verify(bytecode: &[u8], insn_offset: usize, fieldcount: u16) -> Result<(), LoadError> {
    let mut verifier = Verifier {
        insns: &bytecode[insn_offset..],
        bytecode_len: bytecode.len(),
        fieldcount,
        field_modes: vec![AccessMode::Undefined; 256],
        visited: HashSet::new(),
    };
    verifier.simulate(0, AccessMode::Undefined, AccessMode::Undefined)
}
