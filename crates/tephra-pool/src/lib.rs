//! Persistent pool for Tephra engines.
//!
//! A pool is a fixed-size file holding a static header, two alternating root
//! slots, and a data area of variable-size blocks addressed by pool-relative
//! byte offsets. Durability follows an append-and-swap discipline: a
//! transaction stages new block versions, commit writes them into free space
//! and flushes, then publishes the new root by writing the inactive root slot
//! with a higher generation. A crash at any point leaves the previous
//! generation intact; open always resumes from the newest valid slot.

pub mod alloc;
pub mod layout;
pub mod pool;
pub mod tx;

pub use alloc::Extent;
pub use layout::{PoolMeta, COMPARATOR_NAME_BYTES, DATA_START, MIN_POOL_SIZE};
pub use pool::{Pool, PoolOptions, Root};
pub use tx::Tx;
