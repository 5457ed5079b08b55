//! Stack-less, two-register instruction interpreter.
//!
//! Walks the program's instruction section from offset 0 until a
//! `Return`, reading each opcode's operand by its numeric-range argument
//! class (see [`pbf_bytecode::op`]). Every safety property the loader's
//! verifier establishes — defined opcodes, in-range field indices,
//! register types matching their use, in-bounds jump targets — is
//! assumed here and never re-checked. A verified program cannot make
//! this function panic or loop forever: `Skip`/`SkipFalse`/`SkipTrue`
//! only ever advance the instruction pointer forward.

use pbf_bytecode::bytes_ref;
use pbf_bytecode::op::{read_operand, Opcode};
use pbf_bytecode::wire;

#[cfg(feature = "trace")]
use crate::trace::Tracer;

#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    bytecode: &[u8],
    insns: &[u8],
    message: &[u8],
    status: &mut bool,
    reg: &mut [u64; 2],
    fielddata: &[u64],
    fieldmask: &[u64; 4],
    #[cfg(feature = "trace")] tracer: &dyn Tracer,
) -> bool {
    let mut pc = 0usize;
    loop {
        let opcode = Opcode(insns[pc]);
        let class = opcode.class();
        let operand_start = pc + 1;
        let operand = read_operand(&insns[operand_start..], class).expect("verified bytecode");
        let next = operand_start + class.operand_len();

        #[cfg(feature = "trace")]
        tracer.trace(&format!("pc={pc} op={opcode} status={status} reg={reg:?}"));

        match opcode {
            Opcode::ReturnFalse => return false,
            Opcode::ReturnTrue => return true,

            Opcode::CompareUnsignedLT
            | Opcode::CompareUnsignedGE
            | Opcode::CompareUnsignedEQ
            | Opcode::CompareUnsignedNE
            | Opcode::CompareUnsignedLE
            | Opcode::CompareUnsignedGT => {
                let cmp = opcode.cmp().expect("verified comparator");
                *status = cmp.apply(reg[1].cmp(&reg[0]));
                pc = next;
            }

            Opcode::CompareSignedLT
            | Opcode::CompareSignedGE
            | Opcode::CompareSignedEQ
            | Opcode::CompareSignedNE
            | Opcode::CompareSignedLE
            | Opcode::CompareSignedGT => {
                let cmp = opcode.cmp().expect("verified comparator");
                *status = cmp.apply((reg[1] as i64).cmp(&(reg[0] as i64)));
                pc = next;
            }

            Opcode::CompareBytesLT
            | Opcode::CompareBytesGE
            | Opcode::CompareBytesEQ
            | Opcode::CompareBytesNE
            | Opcode::CompareBytesLE
            | Opcode::CompareBytesGT => {
                let cmp = opcode.cmp().expect("verified comparator");
                let lhs = bytes_ref::resolve(reg[1], bytecode, message);
                let rhs = bytes_ref::resolve(reg[0], bytecode, message);
                *status = cmp.apply(lhs.cmp(rhs));
                pc = next;
            }

            Opcode::CompareFloatLT
            | Opcode::CompareFloatGE
            | Opcode::CompareFloatEQ
            | Opcode::CompareFloatNE
            | Opcode::CompareFloatLE
            | Opcode::CompareFloatGT => {
                let cmp = opcode.cmp().expect("verified comparator");
                let lhs = f64::from_bits(reg[1]);
                let rhs = f64::from_bits(reg[0]);
                *status = lhs.partial_cmp(&rhs).is_some_and(|ord| cmp.apply(ord));
                pc = next;
            }

            Opcode::CompareFloatInfPos => {
                let v = f64::from_bits(reg[0]);
                *status = v.is_infinite() && v.is_sign_positive();
                pc = next;
            }

            Opcode::CompareFloatInfNeg => {
                let v = f64::from_bits(reg[0]);
                *status = v.is_infinite() && v.is_sign_negative();
                pc = next;
            }

            Opcode::CompareFloatNaN => {
                *status = f64::from_bits(reg[0]).is_nan();
                pc = next;
            }

            Opcode::ContainsVarint => {
                let haystack = bytes_ref::resolve(reg[1], bytecode, message);
                *status = scan_varints(haystack).any(|v| v == reg[0]);
                pc = next;
            }

            Opcode::ContainsZigZag => {
                let haystack = bytes_ref::resolve(reg[1], bytecode, message);
                let needle = reg[0] as i64;
                *status = scan_varints(haystack).any(|v| wire::decode_zigzag(v) == needle);
                pc = next;
            }

            Opcode::ContainsFixed32 => {
                let haystack = bytes_ref::resolve(reg[1], bytecode, message);
                let needle = reg[0] as u32;
                *status = haystack
                    .chunks_exact(4)
                    .any(|c| u32::from_le_bytes(c.try_into().unwrap()) == needle);
                pc = next;
            }

            Opcode::ContainsFixed64 => {
                let haystack = bytes_ref::resolve(reg[1], bytecode, message);
                let needle = reg[0];
                *status = haystack
                    .chunks_exact(8)
                    .any(|c| u64::from_le_bytes(c.try_into().unwrap()) == needle);
                pc = next;
            }

            Opcode::LoadConstScalar0 => {
                reg[0] = 0;
                pc = next;
            }

            Opcode::LoadConstScalar1 => {
                reg[0] = 1;
                pc = next;
            }

            Opcode::LoadConstScalar => {
                reg[0] = operand;
                pc = next;
            }

            Opcode::LoadConstBytes => {
                reg[0] = operand | bytes_ref::BYTECODE_RESIDENT_FLAG;
                pc = next;
            }

            Opcode::LoadR0FieldScalar | Opcode::LoadR0FieldBytes | Opcode::LoadR0FieldVector => {
                reg[0] = fielddata[operand as usize];
                pc = next;
            }

            Opcode::LoadR1FieldScalar | Opcode::LoadR1FieldBytes | Opcode::LoadR1FieldVector => {
                reg[1] = fielddata[operand as usize];
                pc = next;
            }

            Opcode::CheckField => {
                let idx = operand as u8;
                *status = fieldmask[(idx >> 6) as usize] & (1u64 << (idx & 63)) != 0;
                pc = next;
            }

            Opcode::Skip => pc = next + operand as usize,

            Opcode::SkipFalse => pc = if !*status { next + operand as usize } else { next },

            Opcode::SkipTrue => pc = if *status { next + operand as usize } else { next },

            _ => unreachable!("verified program contains only defined opcodes"),
        }
    }
}

/// Iterate the varints packed into `buf`, stopping silently (rather than
/// erroring) at the first malformed or truncated element — `Contains*`
/// ignores a trailing partial element by spec.
fn scan_varints(buf: &[u8]) -> impl Iterator<Item = u64> + '_ {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        let (v, n) = wire::read_varint(&buf[pos..]).ok()?;
        pos += n;
        Some(v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_bytecode::header::MAGIC;
    use pbf_bytecode::Program;

    fn program(fields: &[u8], insns: &[u8]) -> Program {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(fields);
        buf.extend_from_slice(insns);
        Program::load(&buf).unwrap()
    }

    fn run(prog: &Program, fielddata: &[u64], fieldmask: &[u64; 4]) -> bool {
        let mut status = false;
        let mut reg = [0u64, 0u64];
        evaluate(
            prog.bytecode(),
            prog.instructions(),
            b"",
            &mut status,
            &mut reg,
            fielddata,
            fieldmask,
            #[cfg(feature = "trace")]
            &crate::trace::NoopTracer,
        )
    }

    #[test]
    fn return_true_yields_true() {
        let prog = program(&[0], &[Opcode::ReturnTrue.0]);
        assert!(run(&prog, &[], &[0; 4]));
    }

    #[test]
    fn return_false_yields_false() {
        let prog = program(&[0], &[Opcode::ReturnFalse.0]);
        assert!(!run(&prog, &[], &[0; 4]));
    }

    #[test]
    fn unsigned_compare_uses_field_against_constant() {
        // reg[1] <- field[0] (value 9), reg[0] <- 9 via LoadConstScalar1 is wrong width;
        // use LoadConstScalar (8-byte immediate) instead.
        let mut insns = vec![Opcode::LoadR1FieldScalar.0, 0, Opcode::LoadConstScalar.0];
        insns.extend_from_slice(&9u64.to_le_bytes());
        insns.push(Opcode::CompareUnsignedEQ.0);
        insns.push(Opcode::SkipFalse.0);
        insns.extend_from_slice(&1u16.to_le_bytes());
        insns.push(Opcode::ReturnFalse.0);
        insns.push(Opcode::ReturnTrue.0);
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        assert!(run(&prog, &[9], &[1, 0, 0, 0]));
        assert!(!run(&prog, &[8], &[1, 0, 0, 0]));
    }

    #[test]
    fn signed_compare_treats_registers_as_i64() {
        let mut insns = vec![Opcode::LoadR1FieldScalar.0, 0, Opcode::LoadConstScalar.0];
        insns.extend_from_slice(&(-5i64 as u64).to_le_bytes());
        insns.push(Opcode::CompareSignedLT.0);
        insns.push(Opcode::SkipFalse.0);
        insns.extend_from_slice(&1u16.to_le_bytes());
        insns.push(Opcode::ReturnFalse.0);
        insns.push(Opcode::ReturnTrue.0);
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        // field holds -10 as u64 bits: -10 < -5 is true
        assert!(run(&prog, &[(-10i64) as u64], &[1, 0, 0, 0]));
        assert!(!run(&prog, &[(-1i64) as u64], &[1, 0, 0, 0]));
    }

    #[test]
    fn float_compare_is_false_on_nan() {
        let mut insns = vec![Opcode::LoadR1FieldScalar.0, 0, Opcode::LoadConstScalar.0];
        insns.extend_from_slice(&0f64.to_bits().to_le_bytes());
        insns.push(Opcode::CompareFloatEQ.0);
        insns.push(Opcode::SkipFalse.0);
        insns.extend_from_slice(&1u16.to_le_bytes());
        insns.push(Opcode::ReturnFalse.0);
        insns.push(Opcode::ReturnTrue.0);
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        assert!(!run(&prog, &[f64::NAN.to_bits()], &[1, 0, 0, 0]));
    }

    #[test]
    fn float_nan_check_is_true_on_nan() {
        let insns = [
            Opcode::LoadR0FieldScalar.0,
            0,
            Opcode::CompareFloatNaN.0,
            Opcode::SkipFalse.0,
            1,
            0,
            Opcode::ReturnFalse.0,
            Opcode::ReturnTrue.0,
        ];
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        assert!(run(&prog, &[f64::NAN.to_bits()], &[1, 0, 0, 0]));
        assert!(!run(&prog, &[1.0f64.to_bits()], &[1, 0, 0, 0]));
    }

    #[test]
    fn float_inf_pos_checks_sign() {
        let insns = [
            Opcode::LoadR0FieldScalar.0,
            0,
            Opcode::CompareFloatInfPos.0,
            Opcode::SkipFalse.0,
            1,
            0,
            Opcode::ReturnFalse.0,
            Opcode::ReturnTrue.0,
        ];
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        assert!(run(&prog, &[f64::INFINITY.to_bits()], &[1, 0, 0, 0]));
        assert!(!run(&prog, &[f64::NEG_INFINITY.to_bits()], &[1, 0, 0, 0]));
    }

    #[test]
    fn contains_varint_scans_vector_against_constant() {
        // reg[0] <- 300 (constant), reg[1] <- field[0] (a vector byte ref)
        let mut insns = vec![Opcode::LoadConstScalar.0];
        insns.extend_from_slice(&300u64.to_le_bytes());
        insns.push(Opcode::LoadR1FieldVector.0);
        insns.push(0);
        insns.push(Opcode::ContainsVarint.0);
        insns.push(Opcode::SkipFalse.0);
        insns.extend_from_slice(&1u16.to_le_bytes());
        insns.push(Opcode::ReturnFalse.0);
        insns.push(Opcode::ReturnTrue.0);
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);

        // message-resident vector bytes: varints 1, 300, 5
        let message: &[u8] = &[0x01, 0xac, 0x02, 0x05];
        let packed = bytes_ref::pack(0, message.len() as u32);

        let mut status = false;
        let mut reg = [0u64, 0u64];
        let verdict = evaluate(
            prog.bytecode(),
            prog.instructions(),
            message,
            &mut status,
            &mut reg,
            &[packed],
            &[1, 0, 0, 0],
            #[cfg(feature = "trace")]
            &crate::trace::NoopTracer,
        );
        assert!(verdict);
    }

    #[test]
    fn contains_varint_false_on_empty_vector() {
        let mut insns = vec![Opcode::LoadConstScalar.0];
        insns.extend_from_slice(&1u64.to_le_bytes());
        insns.push(Opcode::LoadR1FieldVector.0);
        insns.push(0);
        insns.push(Opcode::ContainsVarint.0);
        insns.push(Opcode::SkipFalse.0);
        insns.extend_from_slice(&1u16.to_le_bytes());
        insns.push(Opcode::ReturnFalse.0);
        insns.push(Opcode::ReturnTrue.0);
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        let packed = bytes_ref::pack(0, 0);

        let mut status = false;
        let mut reg = [0u64, 0u64];
        let verdict = evaluate(
            prog.bytecode(),
            prog.instructions(),
            b"",
            &mut status,
            &mut reg,
            &[packed],
            &[1, 0, 0, 0],
            #[cfg(feature = "trace")]
            &crate::trace::NoopTracer,
        );
        assert!(!verdict);
    }

    #[test]
    fn check_field_reflects_existence_mask() {
        let insns = [
            Opcode::CheckField.0,
            0,
            Opcode::SkipFalse.0,
            1,
            0,
            Opcode::ReturnFalse.0,
            Opcode::ReturnTrue.0,
        ];
        let prog = program(&[1, 1, 0, 0, 0, 0], &insns);
        assert!(run(&prog, &[0], &[1, 0, 0, 0]));
        assert!(!run(&prog, &[0], &[0, 0, 0, 0]));
    }

    #[test]
    fn skip_steps_over_inline_constant_blob() {
        // Raw data bytes embedded inline (as a LoadConstBytes target would
        // be) aren't valid instructions; Skip must land exactly on the
        // next real opcode rather than falling through into them.
        let insns = [Opcode::Skip.0, 3, 0, 0xaa, 0xbb, 0xcc, Opcode::ReturnTrue.0];
        let prog = program(&[0], &insns);
        assert!(run(&prog, &[], &[0; 4]));
    }

    #[test]
    fn bytes_compare_resolves_both_buffers() {
        // reg[0] <- bytecode-resident "abc" via LoadConstBytes, reg[1] <-
        // field[0], a message-resident bytes reference. The "abc" blob
        // trails the final Return, unreachable as code but addressable as
        // data by its absolute offset into the bytecode buffer.
        let mut insns = vec![Opcode::LoadConstBytes.0];
        insns.extend_from_slice(&0u64.to_le_bytes()); // patched below
        insns.push(Opcode::LoadR1FieldBytes.0);
        insns.push(0);
        insns.push(Opcode::CompareBytesEQ.0);
        insns.push(Opcode::SkipFalse.0);
        insns.extend_from_slice(&1u16.to_le_bytes());
        insns.push(Opcode::ReturnFalse.0);
        insns.push(Opcode::ReturnTrue.0);
        let blob_start_in_insns = insns.len();
        insns.extend_from_slice(b"abc");

        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&[1u8, 1, 0, 0, 0, 0]); // one field, untyped leaf
        let insn_offset = buf.len();
        let blob_offset = insn_offset + blob_start_in_insns;
        let arg = bytes_ref::pack(blob_offset as u32, 3);
        // LoadConstBytes's operand is the 8 bytes right after its opcode.
        insns[1..9].copy_from_slice(&arg.to_le_bytes());
        buf.extend_from_slice(&insns);

        let prog = Program::load(&buf).unwrap();
        let message: &[u8] = b"abc";
        let packed = bytes_ref::pack(0, 3);

        let mut status = false;
        let mut reg = [0u64, 0u64];
        let verdict = evaluate(
            prog.bytecode(),
            prog.instructions(),
            message,
            &mut status,
            &mut reg,
            &[packed],
            &[1, 0, 0, 0],
            #[cfg(feature = "trace")]
            &crate::trace::NoopTracer,
        );
        assert!(verdict);
    }
}
