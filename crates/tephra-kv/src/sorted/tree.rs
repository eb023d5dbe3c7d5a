//! Copy-on-write B+-tree over the persistent pool.
//!
//! Every mutation runs in one pool transaction: new versions of the touched
//! leaf, its ancestors, and any rebalanced siblings are staged into free
//! space, and the commit publishes the new root. Offsets of committed blocks
//! never change, so readers traverse a stable image and the node cache keys
//! by offset.

use super::cache::NodeCache;
use super::node::{
    decode_block, encode_entry, entry_lengths, inner_encoded_len, InnerNode, LeafNode, LeafSlot,
    Node, RawBlock, ENTRY_HEADER, INNER_CAP, INNER_MIN_CHILDREN, KEY_MAX, LEAF_BLOCK_SIZE,
    LEAF_CAP, LEAF_MIN, VALUE_MAX,
};
use bytes::Bytes;
use std::cmp::Ordering;
use std::ops::ControlFlow;
use std::sync::Arc;
use tephra_common::{Comparator, Result, TephraError};
use tephra_pool::{Extent, Pool, Root, Tx};

/// In-flight mutation: the open transaction plus the cache bookkeeping that
/// must only take effect once the commit succeeds.
struct MutCtx<'p> {
    tx: Tx<'p>,
    staged: Vec<(u64, Node)>,
    evict: Vec<u64>,
}

/// Result of inserting into a subtree.
enum Planned {
    /// The subtree was rewritten in place (a new version at a new offset).
    One(Node),
    /// The subtree split; `sep` is the low key of the right half.
    Split { left: Node, sep: Bytes, right: Node },
}

pub(crate) struct Tree {
    pool: Arc<Pool>,
    comparator: Arc<dyn Comparator>,
    cache: NodeCache,
}

impl Tree {
    pub(crate) fn new(pool: Arc<Pool>, comparator: Arc<dyn Comparator>) -> Self {
        Self {
            pool,
            comparator,
            cache: NodeCache::new(),
        }
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    pub(crate) fn count(&self) -> usize {
        self.pool.root().count as usize
    }

    /// Compares two keys under the bound comparator.
    pub(crate) fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.comparator.compare(a, b)
    }

    // =========================================================================
    // Block loading
    // =========================================================================

    /// Loads and decodes the node at `offset`, materializing leaf keys.
    fn load(&self, offset: u64) -> Result<Arc<Node>> {
        if let Some(node) = self.cache.get(offset) {
            return Ok(node);
        }

        let prefix = self.pool.read(offset, 8)?;
        let node = match prefix[0] {
            super::node::TAG_LEAF => {
                let raw = self.pool.read(offset, LEAF_BLOCK_SIZE)?;
                match decode_block(&raw)? {
                    RawBlock::Leaf(leaf) => {
                        let mut slots = Vec::with_capacity(leaf.entries.len());
                        for entry in leaf.entries {
                            slots.push(LeafSlot {
                                key: self.read_entry_key(entry)?,
                                entry,
                            });
                        }
                        Node::Leaf(LeafNode {
                            seq: leaf.seq,
                            slots,
                        })
                    }
                    RawBlock::Inner(_) => unreachable!("leaf tag decoded as inner"),
                }
            }
            super::node::TAG_INNER => {
                let len = u32::from_ne_bytes(prefix[4..8].try_into().unwrap()) as usize;
                if len < 8 {
                    return Err(TephraError::PoolCorrupted(format!(
                        "inner block at {offset} has length {len}"
                    )));
                }
                let raw = self.pool.read(offset, len)?;
                match decode_block(&raw)? {
                    RawBlock::Inner(inner) => Node::Inner(inner),
                    RawBlock::Leaf(_) => unreachable!("inner tag decoded as leaf"),
                }
            }
            other => {
                return Err(TephraError::PoolCorrupted(format!(
                    "unknown node tag {other} at offset {offset}"
                )));
            }
        };

        let node = Arc::new(node);
        self.cache.insert(offset, node.clone());
        Ok(node)
    }

    /// Reads the key of the entry block at `offset`.
    fn read_entry_key(&self, offset: u64) -> Result<Bytes> {
        // The key always sits within the first ENTRY_HEADER + KEY_MAX bytes,
        // so one clamped read covers it even for short blocks near the pool
        // end.
        let chunk = self.pool.read_clamped(offset, ENTRY_HEADER + KEY_MAX)?;
        let (klen, _vlen) = entry_lengths(&chunk)?;
        if chunk.len() < ENTRY_HEADER + klen {
            return Err(TephraError::PoolCorrupted(format!(
                "entry block at {offset} overruns pool"
            )));
        }
        Ok(Bytes::copy_from_slice(
            &chunk[ENTRY_HEADER..ENTRY_HEADER + klen],
        ))
    }

    /// Reads the value of the entry block at `offset`.
    fn read_entry_value(&self, offset: u64) -> Result<Vec<u8>> {
        let header = self.pool.read(offset, ENTRY_HEADER)?;
        let (klen, vlen) = entry_lengths(&header)?;
        if vlen == 0 {
            return Ok(Vec::new());
        }
        self.pool.read(offset + (ENTRY_HEADER + klen) as u64, vlen)
    }

    /// Total on-disk length of the entry block at `offset`.
    fn entry_total_len(&self, offset: u64) -> Result<u64> {
        let header = self.pool.read(offset, ENTRY_HEADER)?;
        let (klen, vlen) = entry_lengths(&header)?;
        Ok((ENTRY_HEADER + klen + vlen) as u64)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Index of the child to descend into for `key`.
    fn child_index(&self, inner: &InnerNode, key: &[u8]) -> usize {
        inner
            .keys
            .partition_point(|sep| self.comparator.compare(sep, key) != Ordering::Greater)
    }

    /// Binary search within a leaf. `Ok` holds the slot index of a match,
    /// `Err` the insertion point.
    fn leaf_search(&self, leaf: &LeafNode, key: &[u8]) -> std::result::Result<usize, usize> {
        leaf.slots
            .binary_search_by(|slot| self.comparator.compare(&slot.key, key))
    }

    /// Descends to the entry block for `key`, if present.
    fn find_entry(&self, key: &[u8]) -> Result<Option<u64>> {
        let root = self.pool.root();
        if root.offset == 0 {
            return Ok(None);
        }
        let mut offset = root.offset;
        loop {
            let node = self.load(offset)?;
            match &*node {
                Node::Inner(inner) => {
                    offset = inner.children[self.child_index(inner, key)];
                }
                Node::Leaf(leaf) => {
                    return Ok(match self.leaf_search(leaf, key) {
                        Ok(idx) => Some(leaf.slots[idx].entry),
                        Err(_) => None,
                    });
                }
            }
        }
    }

    pub(crate) fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.find_entry(key)?.is_some())
    }

    pub(crate) fn get(&self, key: &[u8], sink: &mut dyn FnMut(&[u8])) -> Result<()> {
        match self.find_entry(key)? {
            Some(entry) => {
                let value = self.read_entry_value(entry)?;
                sink(&value);
                Ok(())
            }
            None => Err(TephraError::NotFound),
        }
    }

    // =========================================================================
    // Mutation plumbing
    // =========================================================================

    fn begin(&self) -> MutCtx<'_> {
        MutCtx {
            tx: self.pool.begin(),
            staged: Vec::new(),
            evict: Vec::new(),
        }
    }

    /// Encodes and stages a node version, returning its new offset.
    fn stage(&self, ctx: &mut MutCtx<'_>, node: Node) -> Result<u64> {
        let offset = ctx.tx.alloc(node.encode())?;
        ctx.staged.push((offset, node));
        Ok(offset)
    }

    /// Schedules a committed block for release once this mutation commits.
    fn retire(&self, ctx: &mut MutCtx<'_>, offset: u64, len: u64) {
        ctx.tx.free(offset, len);
        ctx.evict.push(offset);
    }

    fn retire_entry(&self, ctx: &mut MutCtx<'_>, offset: u64) -> Result<()> {
        let len = self.entry_total_len(offset)?;
        self.retire(ctx, offset, len);
        Ok(())
    }

    /// Commits the transaction and applies the cache bookkeeping.
    fn finish(&self, ctx: MutCtx<'_>, root: Root) -> Result<()> {
        let MutCtx { tx, staged, evict } = ctx;
        tx.commit(root)?;
        for (offset, node) in staged {
            self.cache.insert(offset, Arc::new(node));
        }
        for offset in evict {
            self.cache.remove(offset);
        }
        Ok(())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    pub(crate) fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > KEY_MAX {
            return Err(TephraError::InvalidArgument(format!(
                "key length {} exceeds maximum {KEY_MAX}",
                key.len()
            )));
        }
        if value.len() > VALUE_MAX {
            return Err(TephraError::InvalidArgument(format!(
                "value length {} exceeds maximum {VALUE_MAX}",
                value.len()
            )));
        }

        let root = self.pool.root();
        let mut ctx = self.begin();
        let entry_off = ctx.tx.alloc(encode_entry(key, value))?;

        let (new_root, new_count) = if root.offset == 0 {
            let leaf = LeafNode {
                seq: 1,
                slots: vec![LeafSlot {
                    key: Bytes::copy_from_slice(key),
                    entry: entry_off,
                }],
            };
            (self.stage(&mut ctx, Node::Leaf(leaf))?, 1)
        } else {
            let (planned, replaced) = self.insert_rec(&mut ctx, root.offset, key, entry_off)?;
            let offset = match planned {
                Planned::One(node) => self.stage(&mut ctx, node)?,
                Planned::Split { left, sep, right } => {
                    let left_off = self.stage(&mut ctx, left)?;
                    let right_off = self.stage(&mut ctx, right)?;
                    self.stage(
                        &mut ctx,
                        Node::Inner(InnerNode {
                            keys: vec![sep],
                            children: vec![left_off, right_off],
                        }),
                    )?
                }
            };
            let count = if replaced { root.count } else { root.count + 1 };
            (offset, count)
        };

        self.finish(
            ctx,
            Root {
                offset: new_root,
                count: new_count,
            },
        )
    }

    fn insert_rec(
        &self,
        ctx: &mut MutCtx<'_>,
        offset: u64,
        key: &[u8],
        entry_off: u64,
    ) -> Result<(Planned, bool)> {
        let node = self.load(offset)?;
        match &*node {
            Node::Leaf(leaf) => {
                self.retire(ctx, offset, LEAF_BLOCK_SIZE as u64);
                let mut slots = leaf.slots.clone();
                match self.leaf_search(leaf, key) {
                    Ok(idx) => {
                        // Replacement: the old entry is freed and the slot
                        // repointed; the element count stays unchanged.
                        self.retire_entry(ctx, slots[idx].entry)?;
                        slots[idx].entry = entry_off;
                        Ok((
                            Planned::One(Node::Leaf(LeafNode {
                                seq: leaf.seq + 1,
                                slots,
                            })),
                            true,
                        ))
                    }
                    Err(idx) => {
                        slots.insert(
                            idx,
                            LeafSlot {
                                key: Bytes::copy_from_slice(key),
                                entry: entry_off,
                            },
                        );
                        if slots.len() <= LEAF_CAP {
                            Ok((
                                Planned::One(Node::Leaf(LeafNode {
                                    seq: leaf.seq + 1,
                                    slots,
                                })),
                                false,
                            ))
                        } else {
                            let right_slots = slots.split_off(slots.len() / 2);
                            let sep = right_slots[0].key.clone();
                            Ok((
                                Planned::Split {
                                    left: Node::Leaf(LeafNode {
                                        seq: leaf.seq + 1,
                                        slots,
                                    }),
                                    sep,
                                    right: Node::Leaf(LeafNode {
                                        seq: 1,
                                        slots: right_slots,
                                    }),
                                },
                                false,
                            ))
                        }
                    }
                }
            }
            Node::Inner(inner) => {
                let ci = self.child_index(inner, key);
                let (child, replaced) = self.insert_rec(ctx, inner.children[ci], key, entry_off)?;

                self.retire(ctx, offset, inner_encoded_len(inner) as u64);
                let mut keys = inner.keys.clone();
                let mut children = inner.children.clone();
                match child {
                    Planned::One(node) => {
                        children[ci] = self.stage(ctx, node)?;
                    }
                    Planned::Split { left, sep, right } => {
                        children[ci] = self.stage(ctx, left)?;
                        children.insert(ci + 1, self.stage(ctx, right)?);
                        keys.insert(ci, sep);
                    }
                }

                if keys.len() <= INNER_CAP {
                    Ok((Planned::One(Node::Inner(InnerNode { keys, children })), replaced))
                } else {
                    let mid = keys.len() / 2;
                    let sep = keys[mid].clone();
                    let right_keys = keys.split_off(mid + 1);
                    keys.pop();
                    let right_children = children.split_off(mid + 1);
                    Ok((
                        Planned::Split {
                            left: Node::Inner(InnerNode { keys, children }),
                            sep,
                            right: Node::Inner(InnerNode {
                                keys: right_keys,
                                children: right_children,
                            }),
                        },
                        replaced,
                    ))
                }
            }
        }
    }

    // =========================================================================
    // Remove
    // =========================================================================

    pub(crate) fn remove(&self, key: &[u8]) -> Result<()> {
        let root = self.pool.root();
        if root.offset == 0 || self.find_entry(key)?.is_none() {
            // No transaction is opened for an absent key.
            return Err(TephraError::NotFound);
        }

        let mut ctx = self.begin();
        let (new_root, _) = self.remove_rec(&mut ctx, root.offset, key)?;
        let offset = match new_root {
            Node::Leaf(leaf) if leaf.slots.is_empty() => 0,
            // An inner root left with a single child collapses one level.
            Node::Inner(inner) if inner.keys.is_empty() => inner.children[0],
            node => self.stage(&mut ctx, node)?,
        };

        self.finish(
            ctx,
            Root {
                offset,
                count: root.count - 1,
            },
        )
    }

    fn remove_rec(
        &self,
        ctx: &mut MutCtx<'_>,
        offset: u64,
        key: &[u8],
    ) -> Result<(Node, bool)> {
        let node = self.load(offset)?;
        match &*node {
            Node::Leaf(leaf) => {
                let idx = match self.leaf_search(leaf, key) {
                    Ok(idx) => idx,
                    Err(_) => return Err(TephraError::NotFound),
                };
                self.retire(ctx, offset, LEAF_BLOCK_SIZE as u64);
                let mut slots = leaf.slots.clone();
                self.retire_entry(ctx, slots[idx].entry)?;
                slots.remove(idx);
                let underfull = slots.len() < LEAF_MIN;
                Ok((
                    Node::Leaf(LeafNode {
                        seq: leaf.seq + 1,
                        slots,
                    }),
                    underfull,
                ))
            }
            Node::Inner(inner) => {
                let ci = self.child_index(inner, key);
                let (child, child_underfull) =
                    self.remove_rec(ctx, inner.children[ci], key)?;

                self.retire(ctx, offset, inner_encoded_len(inner) as u64);
                let mut keys = inner.keys.clone();
                let mut children = inner.children.clone();
                if child_underfull {
                    self.rebalance_child(ctx, &mut keys, &mut children, ci, child)?;
                } else {
                    children[ci] = self.stage(ctx, child)?;
                }
                let underfull = children.len() < INNER_MIN_CHILDREN;
                Ok((Node::Inner(InnerNode { keys, children }), underfull))
            }
        }
    }

    /// Fixes an underfull child at index `ci`: borrow one entry from a
    /// sibling that is above minimum, otherwise merge with the left sibling
    /// (or the right one when there is no left). `keys`/`children` are the
    /// parent's separators and child offsets, updated in place.
    fn rebalance_child(
        &self,
        ctx: &mut MutCtx<'_>,
        keys: &mut Vec<Bytes>,
        children: &mut Vec<u64>,
        ci: usize,
        child: Node,
    ) -> Result<()> {
        let kind_mismatch =
            || TephraError::PoolCorrupted("sibling node kind mismatch".to_string());

        let left = if ci > 0 {
            Some((children[ci - 1], self.load(children[ci - 1])?))
        } else {
            None
        };
        let right = if ci + 1 < children.len() {
            Some((children[ci + 1], self.load(children[ci + 1])?))
        } else {
            None
        };

        match child {
            Node::Leaf(mut me) => {
                if let Some((left_off, left_arc)) = &left {
                    let Node::Leaf(l) = &**left_arc else {
                        return Err(kind_mismatch());
                    };
                    if l.slots.len() > LEAF_MIN {
                        self.retire(ctx, *left_off, LEAF_BLOCK_SIZE as u64);
                        let mut left_slots = l.slots.clone();
                        let moved = left_slots.pop().ok_or_else(kind_mismatch)?;
                        me.slots.insert(0, moved);
                        keys[ci - 1] = me.slots[0].key.clone();
                        children[ci - 1] = self.stage(
                            ctx,
                            Node::Leaf(LeafNode {
                                seq: l.seq + 1,
                                slots: left_slots,
                            }),
                        )?;
                        children[ci] = self.stage(ctx, Node::Leaf(me))?;
                        return Ok(());
                    }
                }
                if let Some((right_off, right_arc)) = &right {
                    let Node::Leaf(r) = &**right_arc else {
                        return Err(kind_mismatch());
                    };
                    if r.slots.len() > LEAF_MIN {
                        self.retire(ctx, *right_off, LEAF_BLOCK_SIZE as u64);
                        let mut right_slots = r.slots.clone();
                        let moved = right_slots.remove(0);
                        me.slots.push(moved);
                        keys[ci] = right_slots[0].key.clone();
                        children[ci + 1] = self.stage(
                            ctx,
                            Node::Leaf(LeafNode {
                                seq: r.seq + 1,
                                slots: right_slots,
                            }),
                        )?;
                        children[ci] = self.stage(ctx, Node::Leaf(me))?;
                        return Ok(());
                    }
                }
                if let Some((left_off, left_arc)) = &left {
                    let Node::Leaf(l) = &**left_arc else {
                        return Err(kind_mismatch());
                    };
                    self.retire(ctx, *left_off, LEAF_BLOCK_SIZE as u64);
                    let mut slots = l.slots.clone();
                    slots.append(&mut me.slots);
                    let merged = LeafNode {
                        seq: l.seq.max(me.seq) + 1,
                        slots,
                    };
                    children[ci - 1] = self.stage(ctx, Node::Leaf(merged))?;
                    children.remove(ci);
                    keys.remove(ci - 1);
                } else if let Some((right_off, right_arc)) = &right {
                    let Node::Leaf(r) = &**right_arc else {
                        return Err(kind_mismatch());
                    };
                    self.retire(ctx, *right_off, LEAF_BLOCK_SIZE as u64);
                    let mut slots = me.slots;
                    slots.extend(r.slots.iter().cloned());
                    let merged = LeafNode {
                        seq: me.seq.max(r.seq) + 1,
                        slots,
                    };
                    children[ci] = self.stage(ctx, Node::Leaf(merged))?;
                    children.remove(ci + 1);
                    keys.remove(ci);
                } else {
                    return Err(TephraError::PoolCorrupted(
                        "underfull node has no siblings".to_string(),
                    ));
                }
                Ok(())
            }
            Node::Inner(mut me) => {
                if let Some((left_off, left_arc)) = &left {
                    let Node::Inner(l) = &**left_arc else {
                        return Err(kind_mismatch());
                    };
                    if l.children.len() > INNER_MIN_CHILDREN {
                        // Rotate the left sibling's last child through the
                        // parent separator.
                        self.retire(ctx, *left_off, inner_encoded_len(l) as u64);
                        let mut left_keys = l.keys.clone();
                        let mut left_children = l.children.clone();
                        me.keys.insert(0, keys[ci - 1].clone());
                        me.children
                            .insert(0, left_children.pop().ok_or_else(kind_mismatch)?);
                        keys[ci - 1] = left_keys.pop().ok_or_else(kind_mismatch)?;
                        children[ci - 1] = self.stage(
                            ctx,
                            Node::Inner(InnerNode {
                                keys: left_keys,
                                children: left_children,
                            }),
                        )?;
                        children[ci] = self.stage(ctx, Node::Inner(me))?;
                        return Ok(());
                    }
                }
                if let Some((right_off, right_arc)) = &right {
                    let Node::Inner(r) = &**right_arc else {
                        return Err(kind_mismatch());
                    };
                    if r.children.len() > INNER_MIN_CHILDREN {
                        self.retire(ctx, *right_off, inner_encoded_len(r) as u64);
                        let mut right_keys = r.keys.clone();
                        let mut right_children = r.children.clone();
                        me.keys.push(keys[ci].clone());
                        me.children.push(right_children.remove(0));
                        keys[ci] = right_keys.remove(0);
                        children[ci + 1] = self.stage(
                            ctx,
                            Node::Inner(InnerNode {
                                keys: right_keys,
                                children: right_children,
                            }),
                        )?;
                        children[ci] = self.stage(ctx, Node::Inner(me))?;
                        return Ok(());
                    }
                }
                if let Some((left_off, left_arc)) = &left {
                    let Node::Inner(l) = &**left_arc else {
                        return Err(kind_mismatch());
                    };
                    self.retire(ctx, *left_off, inner_encoded_len(l) as u64);
                    let mut merged_keys = l.keys.clone();
                    merged_keys.push(keys[ci - 1].clone());
                    merged_keys.append(&mut me.keys);
                    let mut merged_children = l.children.clone();
                    merged_children.append(&mut me.children);
                    children[ci - 1] = self.stage(
                        ctx,
                        Node::Inner(InnerNode {
                            keys: merged_keys,
                            children: merged_children,
                        }),
                    )?;
                    children.remove(ci);
                    keys.remove(ci - 1);
                } else if let Some((right_off, right_arc)) = &right {
                    let Node::Inner(r) = &**right_arc else {
                        return Err(kind_mismatch());
                    };
                    self.retire(ctx, *right_off, inner_encoded_len(r) as u64);
                    me.keys.push(keys[ci].clone());
                    me.keys.extend(r.keys.iter().cloned());
                    me.children.extend(r.children.iter().copied());
                    children[ci] = self.stage(ctx, Node::Inner(me))?;
                    children.remove(ci + 1);
                    keys.remove(ci);
                } else {
                    return Err(TephraError::PoolCorrupted(
                        "underfull node has no siblings".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // Ordered iteration
    // =========================================================================

    /// Visits live entries in comparator order, restricted to keys strictly
    /// greater than `lower` and strictly less than `upper` when given. The
    /// visitor receives the key and the entry block offset; returning
    /// `Break` surfaces `STOPPED_BY_CB`.
    pub(crate) fn scan(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        visit: &mut dyn FnMut(&Bytes, u64) -> Result<ControlFlow<()>>,
    ) -> Result<()> {
        let root = self.pool.root();
        if root.offset == 0 {
            return Ok(());
        }

        // Descend to the first qualifying leaf, remembering the path.
        let mut stack: Vec<(Arc<Node>, usize)> = Vec::new();
        let mut current = self.load(root.offset)?;
        loop {
            let next = match &*current {
                Node::Inner(inner) => {
                    let ci = match lower {
                        Some(key) => self.child_index(inner, key),
                        None => 0,
                    };
                    let child = inner.children[ci];
                    stack.push((current.clone(), ci));
                    Some(child)
                }
                Node::Leaf(_) => None,
            };
            match next {
                Some(offset) => current = self.load(offset)?,
                None => break,
            }
        }

        let mut idx = match (&*current, lower) {
            (Node::Leaf(leaf), Some(key)) => leaf
                .slots
                .partition_point(|slot| self.comparator.compare(&slot.key, key) != Ordering::Greater),
            _ => 0,
        };

        loop {
            {
                let Node::Leaf(leaf) = &*current else {
                    return Err(TephraError::PoolCorrupted(
                        "descent ended on an inner node".to_string(),
                    ));
                };
                while idx < leaf.slots.len() {
                    let slot = &leaf.slots[idx];
                    if let Some(key) = upper {
                        if self.comparator.compare(&slot.key, key) != Ordering::Less {
                            return Ok(());
                        }
                    }
                    match visit(&slot.key, slot.entry)? {
                        ControlFlow::Continue(()) => idx += 1,
                        ControlFlow::Break(()) => return Err(TephraError::StoppedByCallback),
                    }
                }
            }

            // Leaf exhausted: climb until an unvisited right sibling exists,
            // then descend to its leftmost leaf.
            let mut descended = false;
            while let Some((parent, ci)) = stack.pop() {
                let Node::Inner(inner) = &*parent else {
                    return Err(TephraError::PoolCorrupted(
                        "leaf on the descent stack".to_string(),
                    ));
                };
                if ci + 1 < inner.children.len() {
                    let mut offset = inner.children[ci + 1];
                    stack.push((parent.clone(), ci + 1));
                    loop {
                        let node = self.load(offset)?;
                        let next = match &*node {
                            Node::Inner(inner) => {
                                let child = inner.children[0];
                                stack.push((node.clone(), 0));
                                Some(child)
                            }
                            Node::Leaf(_) => None,
                        };
                        match next {
                            Some(child) => offset = child,
                            None => {
                                current = node;
                                break;
                            }
                        }
                    }
                    idx = 0;
                    descended = true;
                    break;
                }
            }
            if !descended {
                return Ok(());
            }
        }
    }

    /// Reads the value for a visited entry; used by the get-range surface.
    pub(crate) fn entry_value(&self, entry: u64) -> Result<Vec<u8>> {
        self.read_entry_value(entry)
    }

    // =========================================================================
    // Recovery sweep
    // =========================================================================

    /// Walks the committed image and returns every live extent (nodes and
    /// entry blocks). Also verifies the published element count.
    pub(crate) fn collect_live_extents(&self) -> Result<Vec<Extent>> {
        let root = self.pool.root();
        let mut live = Vec::new();
        if root.offset == 0 {
            if root.count != 0 {
                return Err(TephraError::PoolCorrupted(format!(
                    "empty tree with element count {}",
                    root.count
                )));
            }
            return Ok(live);
        }

        let mut entries: u64 = 0;
        let mut pending = vec![root.offset];
        while let Some(offset) = pending.pop() {
            let node = self.load(offset)?;
            match &*node {
                Node::Leaf(leaf) => {
                    live.push(Extent::new(offset, LEAF_BLOCK_SIZE as u64));
                    entries += leaf.slots.len() as u64;
                    for slot in &leaf.slots {
                        let len = self.entry_total_len(slot.entry)?;
                        live.push(Extent::new(slot.entry, len));
                    }
                }
                Node::Inner(inner) => {
                    live.push(Extent::new(offset, inner_encoded_len(inner) as u64));
                    pending.extend(inner.children.iter().copied());
                }
            }
        }

        if entries != root.count {
            return Err(TephraError::PoolCorrupted(format!(
                "element count {} does not match {} reachable entries",
                root.count, entries
            )));
        }
        Ok(live)
    }
}
