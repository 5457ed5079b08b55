//! Selective protobuf decoder.
//!
//! Walks a message's wire-format bytes once, dispatching on wire type
//! and consulting the program's field-spec tree to decide whether (and
//! how) to record each field. Every tag's payload is consumed
//! unconditionally, whether or not the tree references it, so offset
//! arithmetic stays correct regardless of what the program cares about.

use std::collections::{BTreeMap, HashMap};

use pbf_bytecode::bytes_ref;
use pbf_bytecode::field_mod::FieldMod;
use pbf_bytecode::field_spec::{FieldSpecNode, Structural};
use pbf_bytecode::wire::{self, WireType};

use crate::error::RuntimeError;
use crate::pool::IndexMapPool;

const MAX_MESSAGE_LEN: usize = i32::MAX as usize;

pub fn decode(
    root: &BTreeMap<i32, FieldSpecNode>,
    message: &[u8],
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
    pool: &mut IndexMapPool,
) -> Result<(), RuntimeError> {
    if message.len() > MAX_MESSAGE_LEN {
        return Err(RuntimeError::TooLong);
    }
    decode_message(root, 0, message, fielddata, fieldmask, pool)
}

fn set_field(idx: u8, value: u64, fielddata: &mut [u64], fieldmask: &mut [u64; 4]) {
    fielddata[idx as usize] = value;
    fieldmask[(idx >> 6) as usize] |= 1u64 << (idx & 63);
}

/// Look up the spec that governs this occurrence of `num`, demultiplexing
/// through a `Repeated` node by incrementing its per-field occurrence
/// counter. Returns `None` for unreferenced fields and for occurrences
/// beyond the ones the program indexed.
fn resolve_spec<'t>(
    map: &'t BTreeMap<i32, FieldSpecNode>,
    num: i32,
    rep: &mut HashMap<i32, i32>,
) -> Option<&'t FieldSpecNode> {
    let node = map.get(&num)?;
    match &node.structural {
        Some(Structural::Repeated { sub }) => {
            let counter = rep.entry(num).or_insert(0);
            let occurrence = *counter;
            *counter += 1;
            sub.get(&occurrence)
        }
        _ => Some(node),
    }
}

fn decode_message(
    map: &BTreeMap<i32, FieldSpecNode>,
    base: u32,
    buf: &[u8],
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
    pool: &mut IndexMapPool,
) -> Result<(), RuntimeError> {
    let mut rep = pool.rent();
    let result = decode_message_inner(map, base, buf, fielddata, fieldmask, &mut rep, pool);
    pool.give_back(rep);
    result
}

fn decode_message_inner(
    map: &BTreeMap<i32, FieldSpecNode>,
    base: u32,
    buf: &[u8],
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
    rep: &mut HashMap<i32, i32>,
    pool: &mut IndexMapPool,
) -> Result<(), RuntimeError> {
    let mut pos = 0usize;
    while pos < buf.len() {
        let ((num, wt), tag_len) = wire::decode_tag(&buf[pos..])?;
        pos += tag_len;

        match WireType::from_u8(wt) {
            Some(WireType::Varint) => {
                let (v, n) = wire::read_varint(&buf[pos..])?;
                pos += n;
                if let Some(spec) = resolve_spec(map, num as i32, rep) {
                    decode_field_scalar(spec, v, fielddata, fieldmask)?;
                }
            }
            Some(WireType::Fixed32) => {
                let (v, n) = wire::read_fixed32(&buf[pos..])?;
                pos += n;
                if let Some(spec) = resolve_spec(map, num as i32, rep) {
                    decode_field_scalar32(spec, v, fielddata, fieldmask)?;
                }
            }
            Some(WireType::Fixed64) => {
                let (v, n) = wire::read_fixed64(&buf[pos..])?;
                pos += n;
                if let Some(spec) = resolve_spec(map, num as i32, rep) {
                    decode_field_scalar64(spec, v, fielddata, fieldmask)?;
                }
            }
            Some(WireType::LengthDelimited) => {
                let (payload, prefix) = wire::read_length_delimited(&buf[pos..])?;
                let abs_offset = base + (pos + prefix) as u32;
                pos += prefix + payload.len();
                if let Some(spec) = resolve_spec(map, num as i32, rep) {
                    decode_field_bytes(spec, abs_offset, payload, fielddata, fieldmask, pool)?;
                }
            }
            Some(WireType::StartGroup) | Some(WireType::EndGroup) => {
                return Err(RuntimeError::DeprecatedEncoding);
            }
            None => return Err(RuntimeError::FieldTypeMismatch),
        }
    }
    Ok(())
}

fn decode_field_scalar(
    spec: &FieldSpecNode,
    raw: u64,
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
) -> Result<(), RuntimeError> {
    let (idx, modifier) = spec.leaf.ok_or(RuntimeError::FieldTypeMismatch)?;
    let value = match modifier {
        None => raw,
        Some(FieldMod::ZigZag) => wire::decode_zigzag(raw) as u64,
        Some(_) => return Err(RuntimeError::FieldTypeMismatch),
    };
    set_field(idx, value, fielddata, fieldmask);
    Ok(())
}

fn decode_field_scalar32(
    spec: &FieldSpecNode,
    raw: u32,
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
) -> Result<(), RuntimeError> {
    let (idx, modifier) = spec.leaf.ok_or(RuntimeError::FieldTypeMismatch)?;
    let value = match modifier {
        None => u64::from(raw),
        Some(FieldMod::Float) => f64::from(f32::from_bits(raw)).to_bits(),
        Some(_) => return Err(RuntimeError::FieldTypeMismatch),
    };
    set_field(idx, value, fielddata, fieldmask);
    Ok(())
}

fn decode_field_scalar64(
    spec: &FieldSpecNode,
    raw: u64,
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
) -> Result<(), RuntimeError> {
    let (idx, modifier) = spec.leaf.ok_or(RuntimeError::FieldTypeMismatch)?;
    if modifier.is_some() {
        return Err(RuntimeError::FieldTypeMismatch);
    }
    set_field(idx, raw, fielddata, fieldmask);
    Ok(())
}

fn decode_field_bytes(
    spec: &FieldSpecNode,
    abs_offset: u32,
    payload: &[u8],
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
    pool: &mut IndexMapPool,
) -> Result<(), RuntimeError> {
    if let Some((idx, modifier)) = spec.leaf {
        if modifier.is_some() {
            return Err(RuntimeError::FieldTypeMismatch);
        }
        let packed = bytes_ref::pack(abs_offset, payload.len() as u32);
        set_field(idx, packed, fielddata, fieldmask);
    }
    match &spec.structural {
        Some(Structural::Message { sub }) => {
            decode_message(sub, abs_offset, payload, fielddata, fieldmask, pool)?;
        }
        Some(Structural::Packed { subtype, sub }) => {
            decode_packed(*subtype, sub, payload, fielddata, fieldmask)?;
        }
        Some(Structural::Repeated { .. }) => return Err(RuntimeError::FieldTypeMismatch),
        None => {}
    }
    Ok(())
}

/// Decode a packed repeated scalar payload positionally: each element's
/// spec is looked up by its 0-based position within the payload, not by
/// protobuf field number.
fn decode_packed(
    subtype: WireType,
    sub: &BTreeMap<i32, FieldSpecNode>,
    buf: &[u8],
    fielddata: &mut [u64],
    fieldmask: &mut [u64; 4],
) -> Result<(), RuntimeError> {
    let mut pos = 0usize;
    let mut i: i32 = 0;
    while pos < buf.len() {
        match subtype {
            WireType::Varint => {
                let (v, n) = wire::read_varint(&buf[pos..])?;
                pos += n;
                if let Some(spec) = sub.get(&i) {
                    decode_field_scalar(spec, v, fielddata, fieldmask)?;
                }
            }
            WireType::Fixed32 => {
                let (v, n) = wire::read_fixed32(&buf[pos..])?;
                pos += n;
                if let Some(spec) = sub.get(&i) {
                    decode_field_scalar32(spec, v, fielddata, fieldmask)?;
                }
            }
            WireType::Fixed64 => {
                let (v, n) = wire::read_fixed64(&buf[pos..])?;
                pos += n;
                if let Some(spec) = sub.get(&i) {
                    decode_field_scalar64(spec, v, fielddata, fieldmask)?;
                }
            }
            _ => return Err(RuntimeError::FieldTypeMismatch),
        }
        i += 1;
    }
    Ok(())
}
