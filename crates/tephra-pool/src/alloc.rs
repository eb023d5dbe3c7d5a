//! Free-space accounting for the pool data area.
//!
//! Blocks are carved from the data area by a bump cursor; freed blocks go
//! onto a first-fit free list and are reused by later allocations. The
//! allocator is volatile: on open it is rebuilt from the set of extents
//! reachable from the published root.

use tephra_common::{Result, TephraError};

/// Allocation granularity; every block occupies a multiple of this.
pub const ALLOC_ALIGN: u64 = 8;

/// A contiguous region of the data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Pool-relative byte offset.
    pub offset: u64,
    /// Length in bytes (unaligned; the block occupies the aligned length).
    pub len: u64,
}

impl Extent {
    /// Creates a new extent.
    pub fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }
}

fn align_up(len: u64) -> u64 {
    (len + ALLOC_ALIGN - 1) & !(ALLOC_ALIGN - 1)
}

/// First-fit extent allocator over `[start, limit)`.
#[derive(Debug)]
pub struct FreeListAllocator {
    /// End of the highest allocation ever made; fresh space is carved here.
    cursor: u64,
    /// One past the last usable byte.
    limit: u64,
    /// Reusable extents, aligned lengths.
    free: Vec<Extent>,
}

impl FreeListAllocator {
    /// Creates an allocator over an empty data area.
    pub fn new(start: u64, limit: u64) -> Self {
        Self {
            cursor: start,
            limit,
            free: Vec::new(),
        }
    }

    /// Rebuilds the allocator from the extents reachable in the committed
    /// image. Gaps between live extents become the free list; the cursor
    /// lands after the highest live block, reclaiming any trailing garbage.
    pub fn rebuild_from_live(start: u64, limit: u64, live: &mut Vec<Extent>) -> Result<Self> {
        live.sort_by_key(|e| e.offset);
        let mut alloc = Self::new(start, limit);
        for extent in live.iter() {
            if extent.offset < alloc.cursor {
                return Err(TephraError::PoolCorrupted(format!(
                    "overlapping live extents at offset {}",
                    extent.offset
                )));
            }
            if extent.offset > alloc.cursor {
                alloc.free.push(Extent::new(
                    alloc.cursor,
                    extent.offset - alloc.cursor,
                ));
            }
            alloc.cursor = extent.offset + align_up(extent.len);
        }
        if alloc.cursor > limit {
            return Err(TephraError::PoolCorrupted(
                "live extent past end of pool".to_string(),
            ));
        }
        Ok(alloc)
    }

    /// Reserves space for `len` bytes, reusing a freed extent when one fits.
    pub fn allocate(&mut self, len: u64) -> Result<u64> {
        let want = align_up(len);

        for i in 0..self.free.len() {
            let extent = self.free[i];
            if extent.len >= want {
                if extent.len == want {
                    self.free.swap_remove(i);
                } else {
                    self.free[i] = Extent::new(extent.offset + want, extent.len - want);
                }
                return Ok(extent.offset);
            }
        }

        if self.cursor + want > self.limit {
            return Err(TephraError::OutOfMemory {
                requested: want,
                available: self.limit.saturating_sub(self.cursor),
            });
        }
        let offset = self.cursor;
        self.cursor += want;
        Ok(offset)
    }

    /// Returns an extent to the free list.
    pub fn release(&mut self, extent: Extent) {
        self.free.push(Extent::new(extent.offset, align_up(extent.len)));
    }

    /// Bytes never yet allocated (excludes the free list).
    pub fn untouched(&self) -> u64 {
        self.limit.saturating_sub(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_allocation_is_aligned() {
        let mut alloc = FreeListAllocator::new(1024, 4096);
        let a = alloc.allocate(10).unwrap();
        let b = alloc.allocate(8).unwrap();
        assert_eq!(a, 1024);
        assert_eq!(b, 1024 + 16);
        assert_eq!(alloc.untouched(), 4096 - 1024 - 24);
    }

    #[test]
    fn test_release_then_reuse_exact_fit() {
        let mut alloc = FreeListAllocator::new(0, 1024);
        let a = alloc.allocate(64).unwrap();
        let _b = alloc.allocate(64).unwrap();
        alloc.release(Extent::new(a, 64));
        let c = alloc.allocate(64).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn test_release_then_reuse_with_split() {
        let mut alloc = FreeListAllocator::new(0, 1024);
        let a = alloc.allocate(128).unwrap();
        alloc.release(Extent::new(a, 128));
        let c = alloc.allocate(40).unwrap();
        assert_eq!(c, a);
        let d = alloc.allocate(80).unwrap();
        // Remainder of the split extent serves the second request.
        assert_eq!(d, a + 40);
    }

    #[test]
    fn test_out_of_memory() {
        let mut alloc = FreeListAllocator::new(0, 64);
        alloc.allocate(48).unwrap();
        let err = alloc.allocate(32).unwrap_err();
        match err {
            TephraError::OutOfMemory {
                requested,
                available,
            } => {
                assert_eq!(requested, 32);
                assert_eq!(available, 16);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rebuild_from_live_finds_gaps() {
        let mut live = vec![
            Extent::new(1088, 64),
            Extent::new(1024, 30), // occupies 32 aligned
            Extent::new(1216, 8),
        ];
        let mut alloc = FreeListAllocator::rebuild_from_live(1024, 4096, &mut live).unwrap();

        // Gap between 1056 and 1088, and between 1152 and 1216.
        let a = alloc.allocate(32).unwrap();
        assert_eq!(a, 1056);
        let b = alloc.allocate(64).unwrap();
        assert_eq!(b, 1152);
        // Fresh space resumes after the highest live block.
        let c = alloc.allocate(8).unwrap();
        assert_eq!(c, 1224);
    }

    #[test]
    fn test_rebuild_rejects_overlap() {
        let mut live = vec![Extent::new(1024, 64), Extent::new(1056, 8)];
        assert!(FreeListAllocator::rebuild_from_live(1024, 4096, &mut live).is_err());
    }
}
