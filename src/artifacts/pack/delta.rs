//! Delta application and chain resolution
//!
//! A delta payload, once decompressed, is:
//!
//! 1. the base object size (7-bit LSB-first varint),
//! 2. the reconstructed object size (same encoding),
//! 3. a sequence of instructions:
//!    - **copy** (high bit set): the low 7 bits select which offset
//!      and size bytes follow, little-endian by selector bit; a size
//!      of zero means `0x10000`,
//!    - **insert** (high bit clear, low bits non-zero): that many
//!      literal bytes follow,
//!    - byte `0x00` is reserved and fails.
//!
//! Chains are unrolled iteratively: deltas are stacked from the
//! target down to a non-delta base, then applied in reverse.

use crate::areas::database::Database;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::pack_file::{DeltaBase, PackFile};
use crate::error::Error;
use bytes::Bytes;

/// Bound on delta chain length, to stop cycles
pub const MAX_DELTA_DEPTH: usize = 50;

/// Parse a 7-bit LSB-first varint
fn read_varint(delta: &[u8], pos: &mut usize) -> anyhow::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| Error::Corrupt("delta size varint truncated".into()))?;
        *pos += 1;

        if shift > 63 {
            return Err(Error::Corrupt("delta size varint overflows".into()).into());
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(value)
}

/// Read the copy-instruction operands selected by `selector`
fn read_copy_operands(
    selector: u8,
    delta: &[u8],
    pos: &mut usize,
) -> anyhow::Result<(usize, usize)> {
    let mut next_byte = |label: &str| -> anyhow::Result<usize> {
        let byte = *delta
            .get(*pos)
            .ok_or_else(|| Error::Corrupt(format!("delta copy {label} truncated")))?;
        *pos += 1;
        Ok(byte as usize)
    };

    let mut offset = 0usize;
    for bit in 0..4 {
        if selector & (1 << bit) != 0 {
            offset |= next_byte("offset")? << (8 * bit);
        }
    }

    let mut size = 0usize;
    for bit in 0..3 {
        if selector & (1 << (bit + 4)) != 0 {
            size |= next_byte("size")? << (8 * bit);
        }
    }
    if size == 0 {
        size = 0x10000;
    }

    Ok((offset, size))
}

/// Apply one delta program to its base, verifying both declared sizes
pub fn apply(base: &[u8], delta: &[u8]) -> anyhow::Result<Bytes> {
    let mut pos = 0;

    let base_size = read_varint(delta, &mut pos)?;
    if base_size != base.len() as u64 {
        return Err(Error::Corrupt(format!(
            "delta declares base of {base_size} bytes, found {}",
            base.len()
        ))
        .into());
    }

    let result_size = read_varint(delta, &mut pos)?;
    let mut result = Vec::with_capacity(result_size as usize);

    while pos < delta.len() {
        let instruction = delta[pos];
        pos += 1;

        if instruction & 0x80 != 0 {
            let (offset, size) = read_copy_operands(instruction & 0x7F, delta, &mut pos)?;
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= base.len())
                .ok_or_else(|| {
                    Error::Corrupt(format!(
                        "delta copy {offset}+{size} outside base of {} bytes",
                        base.len()
                    ))
                })?;
            result.extend_from_slice(&base[offset..end]);
        } else if instruction != 0 {
            let size = instruction as usize;
            let literal = delta
                .get(pos..pos + size)
                .ok_or_else(|| Error::Corrupt("delta insert truncated".into()))?;
            result.extend_from_slice(literal);
            pos += size;
        } else {
            return Err(Error::Corrupt("delta instruction byte 0x00 is reserved".into()).into());
        }
    }

    if result.len() as u64 != result_size {
        return Err(Error::Corrupt(format!(
            "delta produced {} bytes, declared {result_size}",
            result.len()
        ))
        .into());
    }

    Ok(Bytes::from(result))
}

/// Resolve the delta chain rooted at `offset` down to real bytes
///
/// Walks target → base with an explicit stack: `ofs_delta` bases live
/// in the same pack, `ref_delta` bases go through the object store
/// (which may land in another pack or the loose tier). The final type
/// is the non-delta base's type.
pub(crate) fn resolve_chain(
    database: &Database,
    pack: &mut PackFile,
    offset: u64,
) -> anyhow::Result<(ObjectType, Bytes)> {
    let mut deltas: Vec<Bytes> = Vec::new();
    let mut current_offset = offset;

    let (base_type, mut materialized) = loop {
        if deltas.len() > MAX_DELTA_DEPTH {
            return Err(Error::DepthExceeded(format!(
                "delta chain longer than {MAX_DELTA_DEPTH} in {}",
                pack.path().display()
            ))
            .into());
        }

        let object = pack.read_object_at(current_offset)?;
        match object.header.base {
            Some(DeltaBase::Offset(base_offset)) => {
                deltas.push(object.payload);
                current_offset = base_offset;
            }
            Some(DeltaBase::Reference(base_oid)) => {
                deltas.push(object.payload);
                let reader = database.open(&base_oid)?;
                let object_type = reader.object_type();
                break (object_type, reader.read_to_bytes()?);
            }
            None => {
                let object_type = object.header.kind.as_object_type().ok_or_else(|| {
                    Error::Corrupt(format!(
                        "delta entry at {current_offset} carries no base reference"
                    ))
                })?;
                break (object_type, object.payload);
            }
        }
    };

    // unwind: each delta layer reconstructs the next materialization
    for delta in deltas.iter().rev() {
        materialized = apply(&materialized, delta)?;
    }

    Ok((base_type, materialized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Encode a value the way delta headers do
    fn encode_varint(mut value: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value > 0 {
                byte |= 0x80;
            }
            bytes.push(byte);
            if value == 0 {
                return bytes;
            }
        }
    }

    fn delta_program(base_size: u64, result_size: u64, instructions: &[u8]) -> Vec<u8> {
        let mut program = encode_varint(base_size);
        program.extend(encode_varint(result_size));
        program.extend_from_slice(instructions);
        program
    }

    #[test]
    fn insert_emits_literal_bytes() {
        let program = delta_program(0, 5, &[5, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(apply(b"", &program).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn copy_emits_a_base_slice() {
        // selector 0x01 | 0x10: one offset byte, one size byte
        let program = delta_program(11, 5, &[0x80 | 0x01 | 0x10, 6, 5]);
        assert_eq!(apply(b"hello world", &program).unwrap().as_ref(), b"world");
    }

    #[test]
    fn copy_with_no_size_bytes_means_64k() {
        let base = vec![0x5A_u8; 0x10000];
        // selector with no size bits set: size defaults to 0x10000
        let program = delta_program(base.len() as u64, 0x10000, &[0x80]);
        assert_eq!(apply(&base, &program).unwrap().len(), 0x10000);
    }

    #[test]
    fn reserved_zero_instruction_fails() {
        let program = delta_program(3, 1, &[0x00]);
        let err = apply(b"abc", &program).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Corrupt(_))
        ));
    }

    #[test]
    fn out_of_range_copy_fails() {
        let program = delta_program(3, 10, &[0x80 | 0x01 | 0x10, 1, 10]);
        let err = apply(b"abc", &program).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Corrupt(_))
        ));
    }

    #[test]
    fn base_size_mismatch_fails() {
        let program = delta_program(99, 1, &[1, b'x']);
        let err = apply(b"abc", &program).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Corrupt(_))
        ));
    }

    #[test]
    fn declared_result_size_is_enforced() {
        let program = delta_program(3, 7, &[2, b'h', b'i']);
        let err = apply(b"abc", &program).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Corrupt(_))
        ));
    }

    proptest! {
        #[test]
        fn varints_round_trip(value in 0u64..=u64::MAX / 2) {
            let encoded = encode_varint(value);
            let mut pos = 0;
            prop_assert_eq!(read_varint(&encoded, &mut pos).unwrap(), value);
            prop_assert_eq!(pos, encoded.len());
        }

        #[test]
        fn copy_then_insert_concatenates(
            base in proptest::collection::vec(any::<u8>(), 1..64),
            literal in proptest::collection::vec(any::<u8>(), 1..32),
        ) {
            let copy_len = base.len().min(0xFF);
            let mut instructions = vec![0x80 | 0x01 | 0x10, 0, copy_len as u8];
            instructions.push(literal.len() as u8);
            instructions.extend_from_slice(&literal);

            let expected: Vec<u8> = base[..copy_len]
                .iter()
                .chain(literal.iter())
                .copied()
                .collect();
            let program = delta_program(
                base.len() as u64,
                expected.len() as u64,
                &instructions,
            );
            let result = apply(&base, &program).unwrap();
            prop_assert_eq!(result.as_ref(), &expected[..]);
        }
    }
}
