//! Field-spec tree: the nested structure parsed out of a bytecode's
//! field section that directs the selective decoder.
//!
//! A node describes how to treat one protobuf field number at a given
//! nesting level. It has two independent dimensions, matched by
//! [`FieldSpecNode`]'s two fields rather than folded into one enum:
//! whether the node *materialises a value* (`leaf`, a field-table slot)
//! and whether it *also describes descent* into a packed vector, a
//! nested message, or successive repeated occurrences (`structural`). A
//! node can be neither (never produced by the parser), either, or both —
//! the "capture the raw bytes of a submessage as a vector, but also
//! decode it structurally" case from the format needs both at once.

use std::collections::BTreeMap;

use crate::error::{InvalidBytecode, LoadError};
use crate::field_mod::FieldMod;
use crate::wire::WireType;

/// The three ways a node can describe further decoding beneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Structural {
    /// A packed repeated scalar. `sub` is keyed by the literal NUM the
    /// compiler wrote for the element spec, which it picks to equal the
    /// element's 0-based position within the packed payload — the
    /// decoder looks children up the same way, by position.
    Packed {
        subtype: WireType,
        sub: BTreeMap<i32, FieldSpecNode>,
    },
    /// A nested message. `sub` is keyed by the child's own field number.
    Message { sub: BTreeMap<i32, FieldSpecNode> },
    /// A non-packed repeated field. `sub` is keyed by the literal NUM
    /// the compiler wrote for the element spec, which it picks to equal
    /// the 0-based occurrence index the decoder will assign at runtime.
    /// A compiler may skip occurrences (define only NUM=2, say), in
    /// which case the earlier occurrences simply never resolve.
    Repeated { sub: BTreeMap<i32, FieldSpecNode> },
}

impl Structural {
    fn sub(&self) -> &BTreeMap<i32, FieldSpecNode> {
        match self {
            Self::Packed { sub, .. } | Self::Message { sub } | Self::Repeated { sub } => sub,
        }
    }

    fn sub_mut(&mut self) -> &mut BTreeMap<i32, FieldSpecNode> {
        match self {
            Self::Packed { sub, .. } | Self::Message { sub } | Self::Repeated { sub } => sub,
        }
    }

    fn mod_tag(&self) -> FieldMod {
        match self {
            Self::Packed { .. } => FieldMod::Packed,
            Self::Message { .. } => FieldMod::Message,
            Self::Repeated { .. } => FieldMod::Repeated,
        }
    }

    fn subtype(&self) -> Option<WireType> {
        match self {
            Self::Packed { subtype, .. } => Some(*subtype),
            _ => None,
        }
    }
}

/// One node of the field-spec tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSpecNode {
    /// `Some((index, modifier))` if this node materialises a value into
    /// `fielddata[index]`. `modifier` is `None` for a plain scalar or for
    /// a raw-bytes vector capture; `Some(ZigZag)` / `Some(Float)`
    /// reinterpret a varint/fixed32 scalar.
    pub leaf: Option<(u8, Option<FieldMod>)>,
    pub structural: Option<Structural>,
}

impl FieldSpecNode {
    pub fn index(&self) -> Option<u8> {
        self.leaf.map(|(i, _)| i)
    }

    pub fn sub(&self) -> Option<&BTreeMap<i32, FieldSpecNode>> {
        self.structural.as_ref().map(Structural::sub)
    }
}

/// A field-spec definition read from the bytecode: `NUM MOD [SUBTYPE]
/// [child]`, parsed recursively. `num` is a protobuf field number at the
/// root or under a `Message` node. Under `Packed`/`Repeated` it isn't a
/// field number at all — the compiler repurposes it as the literal
/// structural-map key (element position, or occurrence index), and that
/// literal value is used as-is, never replaced by an auto-incremented
/// position.
struct ParsedSpec {
    num: i32,
    mod_byte: u8,
    subtype: Option<WireType>,
    child: Option<Box<ParsedSpec>>,
}

fn parse_one_spec(buf: &[u8], pos: &mut usize) -> Result<ParsedSpec, LoadError> {
    fn take<'b>(buf: &'b [u8], pos: &mut usize, n: usize) -> Result<&'b [u8], LoadError> {
        let s = buf
            .get(*pos..*pos + n)
            .ok_or(InvalidBytecode::TruncatedFieldSection)?;
        *pos += n;
        Ok(s)
    }

    let num = i32::from_le_bytes(take(buf, pos, 4)?.try_into().unwrap());
    let mod_byte = take(buf, pos, 1)?[0];

    if mod_byte == 0 {
        return Ok(ParsedSpec { num, mod_byte, subtype: None, child: None });
    }
    let field_mod =
        FieldMod::from_byte(mod_byte).ok_or(InvalidBytecode::UnknownFieldMod(mod_byte))?;
    if field_mod.is_leaf() {
        return Ok(ParsedSpec { num, mod_byte, subtype: None, child: None });
    }

    let subtype = if field_mod == FieldMod::Packed {
        let b = take(buf, pos, 1)?[0];
        Some(
            WireType::from_u8(b)
                .filter(is_valid_subtype)
                .ok_or(InvalidBytecode::InvalidPackedSubtype(b))?,
        )
    } else {
        None
    };
    let child = parse_one_spec(buf, pos)?;
    Ok(ParsedSpec { num, mod_byte, subtype, child: Some(Box::new(child)) })
}

fn is_valid_subtype(wt: &WireType) -> bool {
    matches!(
        wt,
        WireType::Varint | WireType::Fixed64 | WireType::LengthDelimited | WireType::Fixed32
    )
}

struct Parser {
    next_index: u16,
}

impl Parser {
    fn fresh_index(&mut self) -> Result<u8, LoadError> {
        if self.next_index >= 256 {
            return Err(InvalidBytecode::TooManyFields.into());
        }
        let i = self.next_index as u8;
        self.next_index += 1;
        Ok(i)
    }

    /// Build a brand-new node from a parsed spec. Used for the children
    /// of `Packed`/`Repeated` nodes, which are always freshly keyed and
    /// never merged with a sibling.
    fn build_node(&mut self, parsed: ParsedSpec) -> Result<FieldSpecNode, LoadError> {
        if parsed.mod_byte == 0 {
            let idx = self.fresh_index()?;
            return Ok(FieldSpecNode { leaf: Some((idx, None)), structural: None });
        }
        let field_mod = FieldMod::from_byte(parsed.mod_byte)
            .ok_or(InvalidBytecode::UnknownFieldMod(parsed.mod_byte))?;
        if field_mod.is_leaf() {
            let idx = self.fresh_index()?;
            return Ok(FieldSpecNode { leaf: Some((idx, Some(field_mod))), structural: None });
        }

        let child = *parsed.child.expect("intermediary spec always carries a child");
        let structural = match field_mod {
            FieldMod::Message => {
                let mut sub = BTreeMap::new();
                self.insert_spec(&mut sub, child)?;
                Structural::Message { sub }
            }
            FieldMod::Packed => {
                let key = child.num;
                let mut sub = BTreeMap::new();
                sub.insert(key, self.build_node(child)?);
                Structural::Packed {
                    subtype: parsed.subtype.expect("packed spec carries a subtype"),
                    sub,
                }
            }
            FieldMod::Repeated => {
                let key = child.num;
                let mut sub = BTreeMap::new();
                sub.insert(key, self.build_node(child)?);
                Structural::Repeated { sub }
            }
            FieldMod::ZigZag | FieldMod::Float => unreachable!("leaf mods handled above"),
        };
        Ok(FieldSpecNode { leaf: None, structural: Some(structural) })
    }

    /// Insert or merge a parsed spec into `map` at key `parsed.num`.
    /// This key is a real protobuf field number (used at the root and
    /// under `Message` nodes), so repeated definitions of the same
    /// number coalesce rather than append.
    fn insert_spec(
        &mut self,
        map: &mut BTreeMap<i32, FieldSpecNode>,
        parsed: ParsedSpec,
    ) -> Result<(), LoadError> {
        let num = parsed.num;
        if !map.contains_key(&num) {
            let node = self.build_node(parsed)?;
            map.insert(num, node);
            return Ok(());
        }

        if parsed.mod_byte == 0 && parsed.child.is_none() {
            // An untyped leaf redefinition over an existing purely
            // structural node adds a raw-bytes vector capture.
            let existing = map.get_mut(&num).unwrap();
            return match (&existing.structural, existing.leaf) {
                (Some(_), None) => {
                    let idx = self.fresh_index()?;
                    existing.leaf = Some((idx, None));
                    Ok(())
                }
                _ => Err(InvalidBytecode::ConflictingFieldDefinition(num).into()),
            };
        }

        let field_mod = FieldMod::from_byte(parsed.mod_byte)
            .ok_or(InvalidBytecode::UnknownFieldMod(parsed.mod_byte))?;
        if field_mod.is_leaf() {
            // A second scalar-reinterpreting leaf definition for the
            // same number is never legal, regardless of what's there.
            return Err(InvalidBytecode::ConflictingFieldDefinition(num).into());
        }

        let child = *parsed.child.expect("intermediary spec always carries a child");
        let existing = map.get_mut(&num).unwrap();
        let existing_structural = existing
            .structural
            .as_mut()
            .ok_or(InvalidBytecode::ConflictingFieldDefinition(num))?;
        if existing_structural.mod_tag() != field_mod || existing_structural.subtype() != parsed.subtype {
            return Err(InvalidBytecode::ConflictingFieldDefinition(num).into());
        }
        match field_mod {
            FieldMod::Message => self.insert_spec(existing_structural.sub_mut(), child)?,
            _ => {
                let key = child.num;
                let node = self.build_node(child)?;
                existing_structural.sub_mut().insert(key, node);
            }
        }
        Ok(())
    }
}

/// Parse result: the root field-spec map and the number of distinct
/// indexed (fielddata-slot-bearing) nodes.
pub struct FieldSection {
    pub root: BTreeMap<i32, FieldSpecNode>,
    pub fieldcount: u16,
}

/// Parse the field section of a bytecode buffer, starting at `buf[0]` =
/// the 1-byte entry count. Returns the parsed section and the number of
/// bytes consumed.
pub fn parse_field_section(buf: &[u8]) -> Result<(FieldSection, usize), LoadError> {
    let count = *buf.first().ok_or(InvalidBytecode::TruncatedFieldSection)? as usize;
    let mut pos = 1usize;
    let mut parser = Parser { next_index: 0 };
    let mut root = BTreeMap::new();
    for _ in 0..count {
        let parsed = parse_one_spec(buf, &mut pos)?;
        parser.insert_spec(&mut root, parsed)?;
    }
    Ok((FieldSection { root, fieldcount: parser.next_index }, pos))
}
