//! Volatile cache of decoded nodes.
//!
//! Block offsets are immutable versions: a committed block never changes in
//! place, so a cached decode stays valid until the block is freed. Mutations
//! evict the offsets they retire after commit.

use super::node::Node;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Upper bound on cached nodes.
const NODE_CACHE_CAPACITY: usize = 16 * 1024;

pub(crate) struct NodeCache {
    map: Mutex<LruCache<u64, Arc<Node>>>,
}

impl NodeCache {
    pub(crate) fn new() -> Self {
        let capacity = NonZeroUsize::new(NODE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            map: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub(crate) fn get(&self, offset: u64) -> Option<Arc<Node>> {
        self.map.lock().get(&offset).cloned()
    }

    pub(crate) fn insert(&self, offset: u64, node: Arc<Node>) {
        self.map.lock().put(offset, node);
    }

    pub(crate) fn remove(&self, offset: u64) {
        self.map.lock().pop(&offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorted::node::LeafNode;

    fn leaf(seq: u64) -> Arc<Node> {
        Arc::new(Node::Leaf(LeafNode {
            seq,
            slots: Vec::new(),
        }))
    }

    #[test]
    fn test_insert_get_remove() {
        let cache = NodeCache::new();
        assert!(cache.get(1024).is_none());

        cache.insert(1024, leaf(1));
        let node = cache.get(1024).unwrap();
        assert!(matches!(&*node, Node::Leaf(l) if l.seq == 1));

        cache.remove(1024);
        assert!(cache.get(1024).is_none());
    }
}
