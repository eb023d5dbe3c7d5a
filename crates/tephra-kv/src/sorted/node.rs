//! Persistent node and entry block formats for the sorted engine.
//!
//! Block layout for leaf nodes (fixed size):
//! ```text
//! +----------------------------+ 0
//! | tag (1) + reserved (7)     |
//! +----------------------------+ 8
//! | sequence number (8)        |
//! +----------------------------+ 16
//! | occupancy bitmap (8)       |
//! +----------------------------+ 24
//! | entry offsets (8 * 63)     |  occupied slots first, sorted by key
//! +----------------------------+ 528
//! ```
//!
//! Block layout for inner nodes (variable size):
//! ```text
//! +----------------------------+ 0
//! | tag (1) + reserved (1)     |
//! | key count (2) + len (4)    |
//! +----------------------------+ 8
//! | child offsets (8 * (n+1))  |
//! +----------------------------+
//! | separators: (len:2 + key)* |
//! +----------------------------+ len
//! ```
//!
//! Entry blocks hold one immutable key-value pair: key length (4), value
//! length (4), key bytes, value bytes. Updates replace the entry; nothing is
//! mutated in place. All integers are native-endian, matching the pool
//! header.

use bytes::Bytes;
use tephra_common::{Result, TephraError};

/// B+-tree branching factor.
pub const DEGREE: usize = 64;

/// Maximum entries per leaf.
pub const LEAF_CAP: usize = DEGREE - 1;

/// Maximum separator keys per inner node.
pub const INNER_CAP: usize = DEGREE - 1;

/// Minimum entries in a non-root leaf.
pub const LEAF_MIN: usize = LEAF_CAP.div_ceil(2);

/// Minimum children in a non-root inner node.
pub const INNER_MIN_CHILDREN: usize = DEGREE / 2;

/// Maximum key length in bytes.
pub const KEY_MAX: usize = 256;

/// Maximum inline value length in bytes.
pub const VALUE_MAX: usize = 64 * 1024;

pub(crate) const TAG_LEAF: u8 = 1;
pub(crate) const TAG_INNER: u8 = 2;

/// Size of every leaf block on disk.
pub(crate) const LEAF_BLOCK_SIZE: usize = 24 + LEAF_CAP * 8;

/// Size of the entry block header (key length + value length).
pub(crate) const ENTRY_HEADER: usize = 8;

/// One occupied leaf slot: the entry's key and the entry block offset.
#[derive(Debug, Clone)]
pub(crate) struct LeafSlot {
    pub key: Bytes,
    pub entry: u64,
}

/// Decoded leaf node with keys materialized.
#[derive(Debug, Clone)]
pub(crate) struct LeafNode {
    /// Version counter; every rewrite of this leaf increments it.
    pub seq: u64,
    /// Entries sorted by the active comparator.
    pub slots: Vec<LeafSlot>,
}

/// Decoded inner node.
///
/// All keys in `children[i]` are `< keys[i]`; all keys in `children[i + 1]`
/// are `>= keys[i]`.
#[derive(Debug, Clone)]
pub(crate) struct InnerNode {
    pub keys: Vec<Bytes>,
    pub children: Vec<u64>,
}

/// A decoded tree node.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Inner(InnerNode),
}

/// Leaf block with entry offsets only; keys are read separately.
#[derive(Debug)]
pub(crate) struct RawLeaf {
    pub seq: u64,
    pub entries: Vec<u64>,
}

/// A decoded block before key materialization.
#[derive(Debug)]
pub(crate) enum RawBlock {
    Leaf(RawLeaf),
    Inner(InnerNode),
}

/// Encoded size of an inner node.
pub(crate) fn inner_encoded_len(node: &InnerNode) -> usize {
    8 + (node.keys.len() + 1) * 8 + node.keys.iter().map(|k| 2 + k.len()).sum::<usize>()
}

impl Node {
    /// Encoded size of this node's block.
    pub(crate) fn encoded_len(&self) -> usize {
        match self {
            Node::Leaf(_) => LEAF_BLOCK_SIZE,
            Node::Inner(inner) => inner_encoded_len(inner),
        }
    }

    /// Serializes the node.
    pub(crate) fn encode(&self) -> Vec<u8> {
        match self {
            Node::Leaf(leaf) => {
                debug_assert!(leaf.slots.len() <= LEAF_CAP);
                let mut buf = vec![0u8; LEAF_BLOCK_SIZE];
                buf[0] = TAG_LEAF;
                buf[8..16].copy_from_slice(&leaf.seq.to_ne_bytes());
                let bitmap: u64 = (1u64 << leaf.slots.len()) - 1;
                buf[16..24].copy_from_slice(&bitmap.to_ne_bytes());
                for (i, slot) in leaf.slots.iter().enumerate() {
                    let at = 24 + i * 8;
                    buf[at..at + 8].copy_from_slice(&slot.entry.to_ne_bytes());
                }
                buf
            }
            Node::Inner(inner) => {
                debug_assert!(inner.keys.len() <= INNER_CAP);
                debug_assert_eq!(inner.children.len(), inner.keys.len() + 1);
                let len = inner_encoded_len(inner);
                let mut buf = vec![0u8; len];
                buf[0] = TAG_INNER;
                buf[2..4].copy_from_slice(&(inner.keys.len() as u16).to_ne_bytes());
                buf[4..8].copy_from_slice(&(len as u32).to_ne_bytes());
                let mut at = 8;
                for child in &inner.children {
                    buf[at..at + 8].copy_from_slice(&child.to_ne_bytes());
                    at += 8;
                }
                for key in &inner.keys {
                    buf[at..at + 2].copy_from_slice(&(key.len() as u16).to_ne_bytes());
                    at += 2;
                    buf[at..at + key.len()].copy_from_slice(key);
                    at += key.len();
                }
                buf
            }
        }
    }
}

/// Decodes a block. `bytes` must cover the whole block.
pub(crate) fn decode_block(bytes: &[u8]) -> Result<RawBlock> {
    if bytes.is_empty() {
        return Err(TephraError::PoolCorrupted("empty node block".to_string()));
    }
    match bytes[0] {
        TAG_LEAF => {
            if bytes.len() < LEAF_BLOCK_SIZE {
                return Err(TephraError::PoolCorrupted(
                    "leaf block truncated".to_string(),
                ));
            }
            let seq = u64::from_ne_bytes(bytes[8..16].try_into().unwrap());
            let bitmap = u64::from_ne_bytes(bytes[16..24].try_into().unwrap());
            let count = bitmap.count_ones() as usize;
            if count > LEAF_CAP || bitmap != (1u64 << count) - 1 {
                return Err(TephraError::PoolCorrupted(format!(
                    "leaf occupancy bitmap invalid: {bitmap:#x}"
                )));
            }
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let at = 24 + i * 8;
                let entry = u64::from_ne_bytes(bytes[at..at + 8].try_into().unwrap());
                if entry == 0 {
                    return Err(TephraError::PoolCorrupted(
                        "occupied leaf slot holds null entry offset".to_string(),
                    ));
                }
                entries.push(entry);
            }
            Ok(RawBlock::Leaf(RawLeaf { seq, entries }))
        }
        TAG_INNER => {
            if bytes.len() < 8 {
                return Err(TephraError::PoolCorrupted(
                    "inner block truncated".to_string(),
                ));
            }
            let nkeys = u16::from_ne_bytes(bytes[2..4].try_into().unwrap()) as usize;
            let len = u32::from_ne_bytes(bytes[4..8].try_into().unwrap()) as usize;
            if nkeys > INNER_CAP || len > bytes.len() {
                return Err(TephraError::PoolCorrupted(format!(
                    "inner block header invalid: {nkeys} keys, {len} bytes"
                )));
            }
            let mut at = 8;
            let mut children = Vec::with_capacity(nkeys + 1);
            for _ in 0..nkeys + 1 {
                if at + 8 > len {
                    return Err(TephraError::PoolCorrupted(
                        "inner block children truncated".to_string(),
                    ));
                }
                let child = u64::from_ne_bytes(bytes[at..at + 8].try_into().unwrap());
                if child == 0 {
                    return Err(TephraError::PoolCorrupted(
                        "inner node holds null child offset".to_string(),
                    ));
                }
                children.push(child);
                at += 8;
            }
            let mut keys = Vec::with_capacity(nkeys);
            for _ in 0..nkeys {
                if at + 2 > len {
                    return Err(TephraError::PoolCorrupted(
                        "inner block separators truncated".to_string(),
                    ));
                }
                let klen = u16::from_ne_bytes(bytes[at..at + 2].try_into().unwrap()) as usize;
                at += 2;
                if at + klen > len {
                    return Err(TephraError::PoolCorrupted(
                        "inner block separator overruns block".to_string(),
                    ));
                }
                keys.push(Bytes::copy_from_slice(&bytes[at..at + klen]));
                at += klen;
            }
            Ok(RawBlock::Inner(InnerNode { keys, children }))
        }
        other => Err(TephraError::PoolCorrupted(format!(
            "unknown node tag {other}"
        ))),
    }
}

/// Serializes an entry block.
pub(crate) fn encode_entry(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENTRY_HEADER + key.len() + value.len());
    buf.extend_from_slice(&(key.len() as u32).to_ne_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_ne_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}

/// Decodes an entry block header into (key length, value length).
pub(crate) fn entry_lengths(header: &[u8]) -> Result<(usize, usize)> {
    if header.len() < ENTRY_HEADER {
        return Err(TephraError::PoolCorrupted(
            "entry block truncated".to_string(),
        ));
    }
    let klen = u32::from_ne_bytes(header[0..4].try_into().unwrap()) as usize;
    let vlen = u32::from_ne_bytes(header[4..8].try_into().unwrap()) as usize;
    if klen > KEY_MAX || vlen > VALUE_MAX {
        return Err(TephraError::PoolCorrupted(format!(
            "entry lengths out of range: key {klen}, value {vlen}"
        )));
    }
    Ok((klen, vlen))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_constants() {
        assert_eq!(LEAF_CAP, 63);
        assert_eq!(INNER_CAP, 63);
        assert_eq!(LEAF_MIN, 32);
        assert_eq!(INNER_MIN_CHILDREN, 32);
        assert_eq!(LEAF_BLOCK_SIZE, 528);
    }

    #[test]
    fn test_leaf_roundtrip() {
        let leaf = LeafNode {
            seq: 9,
            slots: vec![
                LeafSlot {
                    key: Bytes::from_static(b"alpha"),
                    entry: 2048,
                },
                LeafSlot {
                    key: Bytes::from_static(b"beta"),
                    entry: 4096,
                },
            ],
        };
        let bytes = Node::Leaf(leaf).encode();
        assert_eq!(bytes.len(), LEAF_BLOCK_SIZE);

        match decode_block(&bytes).unwrap() {
            RawBlock::Leaf(raw) => {
                assert_eq!(raw.seq, 9);
                assert_eq!(raw.entries, vec![2048, 4096]);
            }
            RawBlock::Inner(_) => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_empty_leaf_roundtrip() {
        let bytes = Node::Leaf(LeafNode {
            seq: 1,
            slots: Vec::new(),
        })
        .encode();
        match decode_block(&bytes).unwrap() {
            RawBlock::Leaf(raw) => assert!(raw.entries.is_empty()),
            RawBlock::Inner(_) => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_inner_roundtrip() {
        let inner = InnerNode {
            keys: vec![Bytes::from_static(b"m"), Bytes::from_static(b"t")],
            children: vec![1024, 2048, 3072],
        };
        let bytes = Node::Inner(inner.clone()).encode();
        assert_eq!(bytes.len(), inner_encoded_len(&inner));

        match decode_block(&bytes).unwrap() {
            RawBlock::Inner(decoded) => {
                assert_eq!(decoded.keys, inner.keys);
                assert_eq!(decoded.children, inner.children);
            }
            RawBlock::Leaf(_) => panic!("expected inner"),
        }
    }

    #[test]
    fn test_inner_with_empty_separator() {
        // Separators are bounds, not stored keys; empty is legal.
        let inner = InnerNode {
            keys: vec![Bytes::new()],
            children: vec![1024, 2048],
        };
        let bytes = Node::Inner(inner.clone()).encode();
        match decode_block(&bytes).unwrap() {
            RawBlock::Inner(decoded) => assert_eq!(decoded.keys, inner.keys),
            RawBlock::Leaf(_) => panic!("expected inner"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut bytes = vec![0u8; LEAF_BLOCK_SIZE];
        bytes[0] = 77;
        assert!(decode_block(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_sparse_bitmap() {
        let mut bytes = Node::Leaf(LeafNode {
            seq: 1,
            slots: Vec::new(),
        })
        .encode();
        // Bit 1 set without bit 0: occupancy must be dense.
        bytes[16..24].copy_from_slice(&2u64.to_ne_bytes());
        assert!(decode_block(&bytes).is_err());
    }

    #[test]
    fn test_entry_roundtrip() {
        let bytes = encode_entry(b"key\x00bin", b"value");
        assert_eq!(bytes.len(), ENTRY_HEADER + 7 + 5);
        let (klen, vlen) = entry_lengths(&bytes).unwrap();
        assert_eq!(klen, 7);
        assert_eq!(vlen, 5);
        assert_eq!(&bytes[8..15], b"key\x00bin");
        assert_eq!(&bytes[15..20], b"value");
    }

    #[test]
    fn test_entry_empty_key_and_value() {
        let bytes = encode_entry(b"", b"");
        assert_eq!(bytes.len(), ENTRY_HEADER);
        assert_eq!(entry_lengths(&bytes).unwrap(), (0, 0));
    }

    #[test]
    fn test_entry_lengths_rejects_oversize() {
        let mut header = [0u8; ENTRY_HEADER];
        header[0..4].copy_from_slice(&((KEY_MAX + 1) as u32).to_ne_bytes());
        assert!(entry_lengths(&header).is_err());
    }
}
