//! On-disk pool layout.
//!
//! ```text
//! +---------------------------+ 0
//! | Static header (512 bytes) |  written once at create
//! +---------------------------+ 512
//! | Root slot A (64 bytes)    |  generation, root, count, crc32
//! +---------------------------+ 576
//! | Root slot B (64 bytes)    |
//! +---------------------------+ 1024 (DATA_START)
//! | Data area                 |  variable-size blocks
//! +---------------------------+ pool size
//! ```
//!
//! Static header fields, in order: magic (8), version (4), degree (4),
//! key_max (8), value_max (8), comparator-name length (1), comparator-name
//! bytes padded to 255. Multi-byte integers are native-endian; pools are not
//! portable between endiannesses.

use tephra_common::{Result, TephraError};

/// Magic value identifying a Tephra pool file ("TEPHRAKV").
pub const POOL_MAGIC: u64 = u64::from_ne_bytes(*b"TEPHRAKV");

/// On-disk format version.
pub const POOL_VERSION: u32 = 1;

/// Size of the static header region in bytes.
pub const STATIC_HEADER_SIZE: usize = 512;

/// Bytes reserved for the comparator name (preceded by one length byte).
pub const COMPARATOR_NAME_BYTES: usize = 255;

/// Size of one root slot record, padded.
pub const ROOT_SLOT_SIZE: usize = 64;

/// File offsets of the two alternating root slots.
pub const ROOT_SLOT_OFFSETS: [u64; 2] = [512, 576];

/// First byte of the data area.
pub const DATA_START: u64 = 1024;

/// Smallest pool size accepted at create.
pub const MIN_POOL_SIZE: u64 = 1 << 20;

/// Engine parameters persisted in the static header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMeta {
    /// B+-tree branching factor the pool was created with.
    pub degree: u32,
    /// Maximum key length in bytes.
    pub key_max: u64,
    /// Maximum inline value length in bytes.
    pub value_max: u64,
    /// Name of the comparator the pool was created with.
    pub comparator_name: String,
}

impl PoolMeta {
    /// Serializes the static header.
    pub fn to_bytes(&self) -> [u8; STATIC_HEADER_SIZE] {
        debug_assert!(self.comparator_name.len() <= COMPARATOR_NAME_BYTES);
        let mut buf = [0u8; STATIC_HEADER_SIZE];
        buf[0..8].copy_from_slice(&POOL_MAGIC.to_ne_bytes());
        buf[8..12].copy_from_slice(&POOL_VERSION.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.degree.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.key_max.to_ne_bytes());
        buf[24..32].copy_from_slice(&self.value_max.to_ne_bytes());
        let name = self.comparator_name.as_bytes();
        buf[32] = name.len() as u8;
        buf[33..33 + name.len()].copy_from_slice(name);
        buf
    }

    /// Deserializes and validates the static header.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < STATIC_HEADER_SIZE {
            return Err(TephraError::PoolCorrupted(
                "static header truncated".to_string(),
            ));
        }
        let magic = u64::from_ne_bytes(buf[0..8].try_into().unwrap());
        if magic != POOL_MAGIC {
            return Err(TephraError::Failed(
                "not a tephra pool file (bad magic)".to_string(),
            ));
        }
        let version = u32::from_ne_bytes(buf[8..12].try_into().unwrap());
        if version != POOL_VERSION {
            return Err(TephraError::Failed(format!(
                "unsupported pool version {version} (expected {POOL_VERSION})"
            )));
        }
        let degree = u32::from_ne_bytes(buf[12..16].try_into().unwrap());
        let key_max = u64::from_ne_bytes(buf[16..24].try_into().unwrap());
        let value_max = u64::from_ne_bytes(buf[24..32].try_into().unwrap());
        let name_len = buf[32] as usize;
        let name = std::str::from_utf8(&buf[33..33 + name_len])
            .map_err(|_| {
                TephraError::PoolCorrupted("comparator name is not valid UTF-8".to_string())
            })?
            .to_string();
        Ok(Self {
            degree,
            key_max,
            value_max,
            comparator_name: name,
        })
    }
}

/// One generation of the published root: tree root offset plus element count.
///
/// Count lives here rather than in the static header so that root and count
/// always move together in a single slot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootSlot {
    /// Commit generation, strictly increasing across the two slots.
    pub generation: u64,
    /// Offset of the tree root block, or 0 for an empty tree.
    pub root: u64,
    /// Number of live entries reachable from the root.
    pub count: u64,
}

impl RootSlot {
    const BODY: usize = 24;

    /// Serializes the slot with a trailing CRC32 over the body.
    pub fn to_bytes(&self) -> [u8; ROOT_SLOT_SIZE] {
        let mut buf = [0u8; ROOT_SLOT_SIZE];
        buf[0..8].copy_from_slice(&self.generation.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.root.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.count.to_ne_bytes());
        let crc = crc32fast::hash(&buf[..Self::BODY]);
        buf[24..28].copy_from_slice(&crc.to_ne_bytes());
        buf
    }

    /// Deserializes a slot, returning `None` when the checksum does not match
    /// (never-written or torn slot).
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < ROOT_SLOT_SIZE {
            return None;
        }
        let stored = u32::from_ne_bytes(buf[24..28].try_into().unwrap());
        if crc32fast::hash(&buf[..Self::BODY]) != stored {
            return None;
        }
        Some(Self {
            generation: u64::from_ne_bytes(buf[0..8].try_into().unwrap()),
            root: u64::from_ne_bytes(buf[8..16].try_into().unwrap()),
            count: u64::from_ne_bytes(buf[16..24].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_header_roundtrip() {
        let meta = PoolMeta {
            degree: 64,
            key_max: 256,
            value_max: 65536,
            comparator_name: "__pmemkv_binary_comparator".to_string(),
        };
        let bytes = meta.to_bytes();
        let decoded = PoolMeta::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_static_header_rejects_bad_magic() {
        let meta = PoolMeta {
            degree: 64,
            key_max: 256,
            value_max: 65536,
            comparator_name: "x".to_string(),
        };
        let mut bytes = meta.to_bytes();
        bytes[0] ^= 0xFF;
        assert!(PoolMeta::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_static_header_rejects_bad_version() {
        let meta = PoolMeta {
            degree: 64,
            key_max: 256,
            value_max: 65536,
            comparator_name: "x".to_string(),
        };
        let mut bytes = meta.to_bytes();
        bytes[8..12].copy_from_slice(&99u32.to_ne_bytes());
        assert!(PoolMeta::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_root_slot_roundtrip() {
        let slot = RootSlot {
            generation: 7,
            root: 4096,
            count: 123,
        };
        let bytes = slot.to_bytes();
        assert_eq!(RootSlot::from_bytes(&bytes), Some(slot));
    }

    #[test]
    fn test_root_slot_rejects_torn_write() {
        let slot = RootSlot {
            generation: 7,
            root: 4096,
            count: 123,
        };
        let mut bytes = slot.to_bytes();
        bytes[10] ^= 0x01;
        assert_eq!(RootSlot::from_bytes(&bytes), None);
    }

    #[test]
    fn test_root_slot_rejects_zeroes() {
        // A never-written slot region must not decode as valid.
        assert_eq!(RootSlot::from_bytes(&[0u8; ROOT_SLOT_SIZE]), None);
    }

    #[test]
    fn test_layout_constants() {
        assert!(STATIC_HEADER_SIZE >= 33 + COMPARATOR_NAME_BYTES);
        assert_eq!(ROOT_SLOT_OFFSETS[0], STATIC_HEADER_SIZE as u64);
        assert_eq!(
            ROOT_SLOT_OFFSETS[1],
            STATIC_HEADER_SIZE as u64 + ROOT_SLOT_SIZE as u64
        );
        assert!(DATA_START >= ROOT_SLOT_OFFSETS[1] + ROOT_SLOT_SIZE as u64);
    }
}
