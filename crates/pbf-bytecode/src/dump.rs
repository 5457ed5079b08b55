//! Human-readable bytecode dump, used by `pbf-dump`-style tooling and by
//! the `trace` feature in `pbf-vm` when printing the program a machine
//! is bound to.

use std::fmt::Write as _;

use crate::field_spec::{FieldSpecNode, Structural};
use crate::op::{read_operand, ArgClass, Opcode};
use crate::program::Program;

/// ANSI palette used when dumping to a terminal. Mirrors the on/off
/// toggle rather than detecting a terminal itself — callers decide.
pub struct Colors {
    dim: &'static str,
    yellow: &'static str,
    cyan: &'static str,
    reset: &'static str,
}

impl Colors {
    const ON: Colors = Colors { dim: "\x1b[2m", yellow: "\x1b[33m", cyan: "\x1b[36m", reset: "\x1b[0m" };
    const OFF: Colors = Colors { dim: "", yellow: "", cyan: "", reset: "" };

    pub fn new(enabled: bool) -> Self {
        if enabled {
            Self::ON
        } else {
            Self::OFF
        }
    }
}

/// Render a program's field-spec tree and instruction stream as text.
pub fn dump(program: &Program, colors: &Colors) -> String {
    let mut out = String::new();
    writeln!(out, "{}fields{} (fieldcount = {}):", colors.yellow, colors.reset, program.fieldcount()).unwrap();
    for (num, node) in program.root() {
        dump_node(&mut out, colors, *num, node, 1);
    }
    writeln!(out).unwrap();
    writeln!(out, "{}instructions{}:", colors.yellow, colors.reset).unwrap();
    dump_instructions(&mut out, colors, program.instructions());
    out
}

fn dump_node(out: &mut String, colors: &Colors, key: i32, node: &FieldSpecNode, indent: usize) {
    let pad = "  ".repeat(indent);
    let mut desc = String::new();
    if let Some((idx, modifier)) = node.leaf {
        match modifier {
            Some(m) => write!(desc, "indexed[{idx}] {m}").unwrap(),
            None => write!(desc, "indexed[{idx}]").unwrap(),
        }
    }
    if let Some(structural) = &node.structural {
        if !desc.is_empty() {
            desc.push_str(" + ");
        }
        match structural {
            Structural::Packed { subtype, .. } => write!(desc, "packed({subtype})").unwrap(),
            Structural::Message { .. } => desc.push_str("message"),
            Structural::Repeated { .. } => desc.push_str("repeated"),
        }
    }
    writeln!(out, "{pad}{}{key}{}: {desc}", colors.cyan, colors.reset).unwrap();
    if let Some(sub) = node.sub() {
        for (k, child) in sub {
            dump_node(out, colors, *k, child, indent + 1);
        }
    }
}

fn dump_instructions(out: &mut String, colors: &Colors, insns: &[u8]) {
    let mut offset = 0usize;
    while offset < insns.len() {
        let opcode = Opcode(insns[offset]);
        let class = opcode.class();
        let operand = read_operand(&insns[offset + 1..], class);
        let width = class.operand_len();
        match operand {
            Some(v) if width > 0 => {
                writeln!(out, "{}{offset:>6}{}  {opcode}  {v}", colors.dim, colors.reset).unwrap();
            }
            _ => {
                writeln!(out, "{}{offset:>6}{}  {opcode}", colors.dim, colors.reset).unwrap();
            }
        }
        offset += 1 + width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    #[test]
    fn dumps_trivial_program_without_panicking() {
        let mut buf = crate::header::MAGIC.to_vec();
        buf.push(1);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.push(0); // field 1, untyped leaf
        buf.push(Opcode::ReturnTrue.0);
        let program = Program::load(&buf).unwrap();
        let text = dump(&program, &Colors::new(false));
        assert!(text.contains("fieldcount = 1"));
        assert!(text.contains("ReturnTrue") == false); // Display prints hex, not name
        assert!(text.contains("0x0f")); // ReturnTrue == 15
    }

    #[test]
    fn colors_off_emit_no_escapes() {
        let colors = Colors::new(false);
        assert_eq!(colors.dim, "");
        assert_eq!(colors.reset, "");
    }

    #[test]
    fn dump_renders_nested_field_and_instruction_offsets() {
        // field 1 -> Message -> field 2, untyped leaf; field 3, zigzag leaf.
        let mut buf = crate::header::MAGIC.to_vec();
        buf.push(2);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.push(4); // Message
        buf.extend_from_slice(&2i32.to_le_bytes());
        buf.push(0); // leaf
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf.push(1); // ZigZag leaf
        buf.push(Opcode::LoadR0FieldScalar.0);
        buf.push(0);
        buf.push(Opcode::ReturnTrue.0);
        let program = Program::load(&buf).unwrap();
        let text = dump(&program, &Colors::new(false));
        assert!(text.contains("1: message"));
        assert!(text.contains("2: indexed[0]"));
        assert!(text.contains("3: indexed[1] zigzag"));
        assert!(text.contains("0x40  0")); // LoadR0FieldScalar at offset 0, idx 0
        assert!(text.contains("0x0f")); // ReturnTrue at offset 2
    }
}
