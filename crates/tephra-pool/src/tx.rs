//! Pool transactions.
//!
//! A transaction stages block writes in memory. Commit writes the staged
//! blocks into the data area, flushes, then publishes the new root by writing
//! the inactive root slot with the next generation and flushing again. Until
//! that second flush completes, the previous generation remains the durable
//! state, so a crash at any point aborts the transaction.

use crate::alloc::Extent;
use crate::layout::{RootSlot, ROOT_SLOT_OFFSETS};
use crate::pool::{write_at, Pool, Root};
use tephra_common::{Result, TephraError};

/// An open transaction against a [`Pool`].
///
/// Dropping without [`commit`](Tx::commit) aborts: staged writes are
/// discarded and allocations returned to the allocator. Deferred frees take
/// effect only on successful commit, once the generation that referenced
/// those blocks is superseded.
pub struct Tx<'p> {
    pool: &'p Pool,
    writes: Vec<(u64, Vec<u8>)>,
    allocated: Vec<Extent>,
    freed: Vec<Extent>,
    committed: bool,
}

impl<'p> Tx<'p> {
    pub(crate) fn new(pool: &'p Pool) -> Self {
        Self {
            pool,
            writes: Vec::new(),
            allocated: Vec::new(),
            freed: Vec::new(),
            committed: false,
        }
    }

    /// Allocates a block and stages `data` to be written there at commit.
    /// Returns the block's pool-relative offset.
    pub fn alloc(&mut self, data: Vec<u8>) -> Result<u64> {
        let len = data.len() as u64;
        let offset = self.pool.state.lock().alloc.allocate(len)?;
        self.allocated.push(Extent::new(offset, len));
        self.writes.push((offset, data));
        Ok(offset)
    }

    /// Marks a committed block as free once this transaction commits.
    pub fn free(&mut self, offset: u64, len: u64) {
        self.freed.push(Extent::new(offset, len));
    }

    /// Writes staged blocks and publishes `root` as the new durable state.
    pub fn commit(mut self, root: Root) -> Result<()> {
        let scope_err =
            |e: std::io::Error| TephraError::TransactionScope(format!("commit failed: {e}"));

        let mut file = self.pool.file.lock();
        for (offset, data) in &self.writes {
            write_at(&mut file, *offset, data).map_err(|e| match e {
                TephraError::Io(io) => scope_err(io),
                other => other,
            })?;
        }
        file.sync_data().map_err(scope_err)?;

        let mut state = self.pool.state.lock();
        let slot_idx = 1 - state.active_slot;
        let slot = RootSlot {
            generation: state.generation + 1,
            root: root.offset,
            count: root.count,
        };
        write_at(&mut file, ROOT_SLOT_OFFSETS[slot_idx], &slot.to_bytes()).map_err(
            |e| match e {
                TephraError::Io(io) => scope_err(io),
                other => other,
            },
        )?;
        file.sync_data().map_err(scope_err)?;

        state.generation = slot.generation;
        state.active_slot = slot_idx;
        state.root = root;
        for extent in self.freed.drain(..) {
            state.alloc.release(extent);
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.pool.state.lock();
            for extent in self.allocated.drain(..) {
                state.alloc.release(extent);
            }
        }
    }
}
