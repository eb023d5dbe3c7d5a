//! The uniform operation surface every engine implements.

use std::ops::ControlFlow;
use tephra_common::{Result, TephraError};

/// One endpoint of a range query.
///
/// The sentinels stand outside the stored-key domain: `Min` sorts below every
/// key and `Max` above every key, under any comparator.
#[derive(Debug, Clone, Copy)]
pub enum RangeKey<'a> {
    /// Below all keys.
    Min,
    /// Above all keys.
    Max,
    /// An ordinary key endpoint.
    Key(&'a [u8]),
}

/// Callback receiving one key-value pair per live entry.
///
/// The borrowed slices are valid only for the duration of the call. Returning
/// `ControlFlow::Break` stops the iteration; the operation then reports
/// `STOPPED_BY_CB`.
pub type KvVisitor<'c> = &'c mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>;

/// Callback receiving the value of a point lookup, valid only for the call.
pub type ValueSink<'c> = &'c mut dyn FnMut(&[u8]);

fn not_supported(op: &str) -> TephraError {
    TephraError::NotSupported(op.to_string())
}

/// A key-value engine.
///
/// Ordered operations default to `NOT_SUPPORTED` so that engines which cannot
/// sort keys implement only the point surface.
pub trait Engine: Send + Sync {
    /// The engine's dispatch name.
    fn name(&self) -> &'static str;

    /// Number of live entries.
    fn count_all(&self) -> Result<usize>;

    /// Number of entries with keys strictly greater than `key`.
    fn count_above(&self, _key: &[u8]) -> Result<usize> {
        Err(not_supported("count_above"))
    }

    /// Number of entries with keys strictly less than `key`.
    fn count_below(&self, _key: &[u8]) -> Result<usize> {
        Err(not_supported("count_below"))
    }

    /// Number of entries strictly between the two endpoints.
    fn count_between(&self, _lower: RangeKey<'_>, _upper: RangeKey<'_>) -> Result<usize> {
        Err(not_supported("count_between"))
    }

    /// Visits every live entry.
    fn get_all(&self, visit: KvVisitor<'_>) -> Result<()>;

    /// Visits entries with keys strictly greater than `key`, in order.
    fn get_above(&self, _key: &[u8], _visit: KvVisitor<'_>) -> Result<()> {
        Err(not_supported("get_above"))
    }

    /// Visits entries with keys strictly less than `key`, in order.
    fn get_below(&self, _key: &[u8], _visit: KvVisitor<'_>) -> Result<()> {
        Err(not_supported("get_below"))
    }

    /// Visits entries strictly between the two endpoints, in order.
    fn get_between(
        &self,
        _lower: RangeKey<'_>,
        _upper: RangeKey<'_>,
        _visit: KvVisitor<'_>,
    ) -> Result<()> {
        Err(not_supported("get_between"))
    }

    /// Returns whether `key` has a live entry.
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Delivers the value of `key` to `sink`, or `NOT_FOUND`.
    fn get(&self, key: &[u8], sink: ValueSink<'_>) -> Result<()>;

    /// Inserts or replaces the entry for `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes the entry for `key`, or `NOT_FOUND`.
    fn remove(&self, key: &[u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tephra_common::Status;

    // Minimal engine that only implements the required surface, standing in
    // for the unordered family.
    struct PointOnly;

    impl Engine for PointOnly {
        fn name(&self) -> &'static str {
            "point-only"
        }
        fn count_all(&self) -> Result<usize> {
            Ok(0)
        }
        fn get_all(&self, _visit: KvVisitor<'_>) -> Result<()> {
            Ok(())
        }
        fn exists(&self, _key: &[u8]) -> Result<bool> {
            Ok(false)
        }
        fn get(&self, _key: &[u8], _sink: ValueSink<'_>) -> Result<()> {
            Err(TephraError::NotFound)
        }
        fn put(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
            Ok(())
        }
        fn remove(&self, _key: &[u8]) -> Result<()> {
            Err(TephraError::NotFound)
        }
    }

    #[test]
    fn test_ordered_operations_default_to_not_supported() {
        let engine = PointOnly;
        assert_eq!(
            engine.count_above(b"k").unwrap_err().status(),
            Status::NotSupported
        );
        assert_eq!(
            engine.count_below(b"k").unwrap_err().status(),
            Status::NotSupported
        );
        assert_eq!(
            engine
                .count_between(RangeKey::Min, RangeKey::Max)
                .unwrap_err()
                .status(),
            Status::NotSupported
        );
        let mut sink = |_: &[u8], _: &[u8]| ControlFlow::<()>::Continue(());
        assert_eq!(
            engine.get_above(b"k", &mut sink).unwrap_err().status(),
            Status::NotSupported
        );
        assert_eq!(
            engine
                .get_between(RangeKey::Min, RangeKey::Max, &mut sink)
                .unwrap_err()
                .status(),
            Status::NotSupported
        );
    }
}
