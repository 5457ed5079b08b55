//! The loaded, immutable program: bytecode buffer, parsed field-spec
//! tree, and instruction offset. A [`Program`] is built once and shared
//! freely across concurrent callers; `pbf-vm`'s `Machine` borrows it to
//! run individual filter calls.

use std::collections::BTreeMap;

use crate::error::LoadError;
use crate::field_spec::{parse_field_section, FieldSpecNode};
use crate::header;
use crate::verify::verify;

/// The maximum bytecode length this implementation accepts, mirroring
/// the wire-format's use of signed 32-bit offsets for bytes references.
pub const MAX_BYTECODE_LEN: usize = i32::MAX as usize;

#[derive(Debug, PartialEq, Eq)]
pub struct Program {
    bytecode: Vec<u8>,
    root: BTreeMap<i32, FieldSpecNode>,
    fieldcount: u16,
    insn_offset: usize,
}

impl Program {
    /// Validate and parse a bytecode buffer. Runs the header check, the
    /// field-section parse, and the full verifier before returning — a
    /// `Program` that exists is one the interpreter can trust completely.
    pub fn load(bytecode: &[u8]) -> Result<Self, LoadError> {
        if bytecode.len() > MAX_BYTECODE_LEN {
            return Err(LoadError::TooLong);
        }
        let fields_offset = header::validate(bytecode)?;
        let (section, consumed) = parse_field_section(&bytecode[fields_offset..])?;
        let insn_offset = fields_offset + consumed;
        verify(bytecode, insn_offset, section.fieldcount)?;
        Ok(Program {
            bytecode: bytecode.to_vec(),
            root: section.root,
            fieldcount: section.fieldcount,
            insn_offset,
        })
    }

    pub fn fieldcount(&self) -> u16 {
        self.fieldcount
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    pub fn root(&self) -> &BTreeMap<i32, FieldSpecNode> {
        &self.root
    }

    /// The instruction section: everything from `insn_offset` to the end
    /// of the bytecode buffer.
    pub fn instructions(&self) -> &[u8] {
        &self.bytecode[self.insn_offset..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Opcode;

    fn trivial_bytecode() -> Vec<u8> {
        let mut buf = header::MAGIC.to_vec();
        buf.push(0); // zero fields
        buf.push(Opcode::ReturnTrue.0);
        buf
    }

    #[test]
    fn loads_trivial_program() {
        let program = Program::load(&trivial_bytecode()).unwrap();
        assert_eq!(program.fieldcount(), 0);
        assert_eq!(program.instructions(), &[Opcode::ReturnTrue.0]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = trivial_bytecode();
        buf[0] = b'X';
        assert_eq!(Program::load(&buf), Err(LoadError::UnknownFormat));
    }

    #[test]
    fn rejects_failing_verification() {
        let mut buf = header::MAGIC.to_vec();
        buf.push(0);
        buf.push(0xff); // unknown opcode, reachable from offset 0
        assert!(Program::load(&buf).is_err());
    }
}
