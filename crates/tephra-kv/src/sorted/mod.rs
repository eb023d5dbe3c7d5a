//! The sorted engine: a persistent B+-tree keyed by byte strings.
//!
//! Configuration options:
//! - `path` (string, required): filesystem path backing the pool.
//! - `size` (uint64, required on create): pool size in bytes; ignored when
//!   the pool file already exists.
//! - `force_create` (int64, default 0): recreate the pool even if it exists.
//! - the reserved comparator binding supplied via
//!   [`Config::put_comparator`](tephra_common::Config::put_comparator).
//!
//! Unknown options are ignored.

mod cache;
mod node;
mod tree;

pub use node::{DEGREE, INNER_CAP, KEY_MAX, LEAF_CAP, VALUE_MAX};

use crate::engine::{Engine, KvVisitor, RangeKey, ValueSink};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tephra_common::{
    BinaryComparator, Comparator, Config, Result, TephraError, COMPARATOR_NAME_MAX,
};
use tephra_pool::{Pool, PoolMeta, PoolOptions};
use tracing::debug;
use tree::Tree;

/// Dispatch name of the sorted engine.
pub const ENGINE_NAME: &str = "sorted";

/// Persistent ordered key-value engine.
///
/// Writers serialize behind the lock; readers run concurrently against the
/// committed image. Range callbacks execute with the read lock held, so the
/// structure is stable for the duration of a scan.
pub struct SortedEngine {
    tree: RwLock<Tree>,
}

fn missing_option(name: &str) -> TephraError {
    TephraError::ConfigType(format!(
        "sorted engine config does not contain item with key: \"{name}\""
    ))
}

impl SortedEngine {
    /// Opens or creates the pool described by `config` and binds the
    /// comparator. The bag is consumed.
    pub fn open(mut config: Config) -> Result<Self> {
        let comparator: Arc<dyn Comparator> = match config.take_comparator() {
            Some(cmp) => Arc::from(cmp),
            None => Arc::new(BinaryComparator),
        };
        if comparator.name().len() > COMPARATOR_NAME_MAX {
            return Err(TephraError::InvalidArgument(format!(
                "comparator name exceeds {COMPARATOR_NAME_MAX} bytes"
            )));
        }

        let path = PathBuf::from(
            config
                .get_string("path")?
                .ok_or_else(|| missing_option("path"))?,
        );
        let force_create = config.get_int64("force_create")?.unwrap_or(0) != 0;
        let creating = force_create || !path.exists();

        let pool = if creating {
            let size = config
                .get_uint64("size")?
                .ok_or_else(|| missing_option("size"))?;
            Pool::create(PoolOptions {
                path,
                size,
                meta: PoolMeta {
                    degree: DEGREE as u32,
                    key_max: KEY_MAX as u64,
                    value_max: VALUE_MAX as u64,
                    comparator_name: comparator.name().to_string(),
                },
            })?
        } else {
            let pool = Pool::open(&path)?;
            let meta = pool.meta();
            if meta.degree != DEGREE as u32
                || meta.key_max != KEY_MAX as u64
                || meta.value_max != VALUE_MAX as u64
            {
                return Err(TephraError::Failed(format!(
                    "pool was created with incompatible parameters \
                     (degree {}, key_max {}, value_max {})",
                    meta.degree, meta.key_max, meta.value_max
                )));
            }
            if meta.comparator_name != comparator.name() {
                return Err(TephraError::ComparatorMismatch {
                    expected: meta.comparator_name.clone(),
                });
            }
            pool
        };

        let tree = Tree::new(Arc::new(pool), comparator);
        if !creating {
            let live = tree.collect_live_extents()?;
            tree.pool().reset_allocator(live)?;
        }
        debug!(
            created = creating,
            count = tree.count(),
            "engine.sorted.open"
        );

        Ok(Self {
            tree: RwLock::new(tree),
        })
    }
}

/// Resolves `between` endpoints into exclusive scan bounds. `None` means the
/// range is provably empty.
fn resolve_between<'a>(
    tree: &Tree,
    lower: RangeKey<'a>,
    upper: RangeKey<'a>,
) -> Option<(Option<&'a [u8]>, Option<&'a [u8]>)> {
    let lo = match lower {
        RangeKey::Min => None,
        RangeKey::Max => return None,
        RangeKey::Key(key) => Some(key),
    };
    let hi = match upper {
        RangeKey::Max => None,
        RangeKey::Min => return None,
        RangeKey::Key(key) => Some(key),
    };
    if let (Some(a), Some(b)) = (lo, hi) {
        if tree.compare(a, b) != Ordering::Less {
            return None;
        }
    }
    Some((lo, hi))
}

impl SortedEngine {
    fn count_range(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> Result<usize> {
        let tree = self.tree.read();
        let mut count = 0usize;
        tree.scan(lower, upper, &mut |_, _| {
            count += 1;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(count)
    }

    fn get_range(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        visit: KvVisitor<'_>,
    ) -> Result<()> {
        let tree = self.tree.read();
        tree.scan(lower, upper, &mut |key, entry| {
            let value = tree.entry_value(entry)?;
            Ok(visit(key.as_ref(), &value))
        })
    }
}

impl Engine for SortedEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn count_all(&self) -> Result<usize> {
        Ok(self.tree.read().count())
    }

    fn count_above(&self, key: &[u8]) -> Result<usize> {
        self.count_range(Some(key), None)
    }

    fn count_below(&self, key: &[u8]) -> Result<usize> {
        self.count_range(None, Some(key))
    }

    fn count_between(&self, lower: RangeKey<'_>, upper: RangeKey<'_>) -> Result<usize> {
        let tree = self.tree.read();
        match resolve_between(&tree, lower, upper) {
            Some((lo, hi)) => {
                let mut count = 0usize;
                tree.scan(lo, hi, &mut |_, _| {
                    count += 1;
                    Ok(ControlFlow::Continue(()))
                })?;
                Ok(count)
            }
            None => Ok(0),
        }
    }

    fn get_all(&self, visit: KvVisitor<'_>) -> Result<()> {
        self.get_range(None, None, visit)
    }

    fn get_above(&self, key: &[u8], visit: KvVisitor<'_>) -> Result<()> {
        self.get_range(Some(key), None, visit)
    }

    fn get_below(&self, key: &[u8], visit: KvVisitor<'_>) -> Result<()> {
        self.get_range(None, Some(key), visit)
    }

    fn get_between(
        &self,
        lower: RangeKey<'_>,
        upper: RangeKey<'_>,
        visit: KvVisitor<'_>,
    ) -> Result<()> {
        let tree = self.tree.read();
        match resolve_between(&tree, lower, upper) {
            Some((lo, hi)) => tree.scan(lo, hi, &mut |key, entry| {
                let value = tree.entry_value(entry)?;
                Ok(visit(key.as_ref(), &value))
            }),
            None => Ok(()),
        }
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        self.tree.read().exists(key)
    }

    fn get(&self, key: &[u8], sink: ValueSink<'_>) -> Result<()> {
        self.tree.read().get(key, sink)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.write().put(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.tree.write().remove(key)
    }
}
