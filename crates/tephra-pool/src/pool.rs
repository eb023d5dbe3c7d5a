//! Pool open/create and block reads.

use crate::alloc::{Extent, FreeListAllocator};
use crate::layout::{
    PoolMeta, RootSlot, COMPARATOR_NAME_BYTES, DATA_START, MIN_POOL_SIZE, ROOT_SLOT_OFFSETS,
    ROOT_SLOT_SIZE, STATIC_HEADER_SIZE,
};
use crate::tx::Tx;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tephra_common::{Result, TephraError};
use tracing::{debug, warn};

/// Options for creating a pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Filesystem path backing the pool.
    pub path: PathBuf,
    /// Pool size in bytes; fixed at create.
    pub size: u64,
    /// Engine parameters written into the static header.
    pub meta: PoolMeta,
}

/// The published root of the pool: tree root offset plus element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Root {
    /// Offset of the root block, or 0 when the tree is empty.
    pub offset: u64,
    /// Live entry count.
    pub count: u64,
}

impl Root {
    /// Root of an empty pool.
    pub const NONE: Root = Root {
        offset: 0,
        count: 0,
    };
}

pub(crate) struct PoolState {
    pub(crate) generation: u64,
    pub(crate) active_slot: usize,
    pub(crate) root: Root,
    pub(crate) alloc: FreeListAllocator,
}

/// A file-backed persistent region with transactional allocation.
///
/// The pool owns the file handle for its lifetime; a single open handle per
/// pool is assumed (co-opening the same file is undefined).
pub struct Pool {
    path: PathBuf,
    size: u64,
    meta: PoolMeta,
    pub(crate) file: Mutex<File>,
    pub(crate) state: Mutex<PoolState>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

impl Pool {
    /// Creates a new pool file, truncating any existing file at `path`.
    pub fn create(opts: PoolOptions) -> Result<Pool> {
        if opts.size < MIN_POOL_SIZE {
            return Err(TephraError::InvalidArgument(format!(
                "pool size {} below minimum {}",
                opts.size, MIN_POOL_SIZE
            )));
        }
        if opts.meta.comparator_name.len() > COMPARATOR_NAME_BYTES {
            return Err(TephraError::InvalidArgument(format!(
                "comparator name exceeds {COMPARATOR_NAME_BYTES} bytes"
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&opts.path)?;
        file.set_len(opts.size)?;

        write_at(&mut file, 0, &opts.meta.to_bytes())?;
        let first = RootSlot {
            generation: 1,
            root: 0,
            count: 0,
        };
        write_at(&mut file, ROOT_SLOT_OFFSETS[0], &first.to_bytes())?;
        file.sync_all()?;

        debug!(path = %opts.path.display(), size = opts.size, "pool.create");

        Ok(Pool {
            path: opts.path,
            size: opts.size,
            meta: opts.meta,
            file: Mutex::new(file),
            state: Mutex::new(PoolState {
                generation: 1,
                active_slot: 0,
                root: Root::NONE,
                alloc: FreeListAllocator::new(DATA_START, opts.size),
            }),
        })
    }

    /// Opens an existing pool file, recovering the newest valid root slot.
    ///
    /// The caller is expected to validate the returned [`PoolMeta`] (degree,
    /// bounds, comparator name) against its own parameters before use, and to
    /// seed the allocator with the live extents via
    /// [`reset_allocator`](Pool::reset_allocator).
    pub fn open(path: &Path) -> Result<Pool> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size < DATA_START {
            return Err(TephraError::PoolCorrupted(format!(
                "pool file shorter than data area start ({size} bytes)"
            )));
        }

        let header = read_at(&mut file, 0, STATIC_HEADER_SIZE)?;
        let meta = PoolMeta::from_bytes(&header)?;

        let mut best: Option<(usize, RootSlot)> = None;
        for (idx, slot_offset) in ROOT_SLOT_OFFSETS.iter().enumerate() {
            let raw = read_at(&mut file, *slot_offset, ROOT_SLOT_SIZE)?;
            match RootSlot::from_bytes(&raw) {
                Some(slot) => {
                    if best.map_or(true, |(_, b)| slot.generation > b.generation) {
                        best = Some((idx, slot));
                    }
                }
                None => {
                    warn!(slot = idx, "pool.root_slot.invalid");
                }
            }
        }
        let (active_slot, slot) = best.ok_or_else(|| {
            TephraError::PoolCorrupted("no valid root slot".to_string())
        })?;

        debug!(
            path = %path.display(),
            generation = slot.generation,
            root = slot.root,
            count = slot.count,
            "pool.open"
        );

        Ok(Pool {
            path: path.to_path_buf(),
            size,
            meta,
            file: Mutex::new(file),
            state: Mutex::new(PoolState {
                generation: slot.generation,
                active_slot,
                root: Root {
                    offset: slot.root,
                    count: slot.count,
                },
                alloc: FreeListAllocator::new(DATA_START, size),
            }),
        })
    }

    /// Returns the engine parameters from the static header.
    pub fn meta(&self) -> &PoolMeta {
        &self.meta
    }

    /// Returns the pool file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the pool size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the currently published root.
    pub fn root(&self) -> Root {
        self.state.lock().root
    }

    /// Replaces the allocator with one rebuilt from the live extents of the
    /// committed image. Called once after open, before any transaction.
    pub fn reset_allocator(&self, mut live: Vec<Extent>) -> Result<()> {
        let alloc = FreeListAllocator::rebuild_from_live(DATA_START, self.size, &mut live)?;
        self.state.lock().alloc = alloc;
        Ok(())
    }

    /// Reads `len` bytes from the data area at `offset`.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset < DATA_START || offset + len as u64 > self.size {
            return Err(TephraError::PoolCorrupted(format!(
                "block read out of bounds: offset {offset}, len {len}"
            )));
        }
        let mut file = self.file.lock();
        read_at(&mut file, offset, len)
    }

    /// Like [`read`](Pool::read) but clamps the length to the end of the pool,
    /// for callers that over-read a self-describing block.
    pub fn read_clamped(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let clamped = (self.size.saturating_sub(offset)).min(len as u64) as usize;
        self.read(offset, clamped)
    }

    /// Starts a transaction. Dropping the returned [`Tx`] without committing
    /// aborts it: nothing durable changes and its allocations are returned.
    pub fn begin(&self) -> Tx<'_> {
        Tx::new(self)
    }
}

pub(crate) fn write_at(file: &mut File, offset: u64, data: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    Ok(())
}

pub(crate) fn read_at(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}
