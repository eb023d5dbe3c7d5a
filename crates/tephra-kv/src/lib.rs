//! Tephra: a persistent, ordered key-value store.
//!
//! Callers open a named engine against a file-backed pool, perform point and
//! range operations, and later reopen the pool recovering exactly the
//! previously committed contents. The public surface is uniform across
//! engines; the ordered operations are served by the [`sorted`] B+-tree
//! engine.
//!
//! Every public operation resets the thread-local diagnostic and populates it
//! on failure; [`errormsg`] returns the message of the most recent failure on
//! the calling thread. Errors map onto the stable [`Status`] ordinals via
//! [`TephraError::status`].

pub mod engine;
pub mod sorted;

pub use engine::{Engine, KvVisitor, RangeKey, ValueSink};
pub use tephra_common::{
    errormsg, BinaryComparator, Comparator, Config, Result, Status, TephraError,
    BINARY_COMPARATOR_NAME,
};

use std::ops::ControlFlow;
use tephra_common::{clear_errormsg, set_errormsg};

/// Wraps a public entry point: resets the diagnostic, records failures.
fn api<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    clear_errormsg();
    match f() {
        Ok(value) => Ok(value),
        Err(err) => {
            set_errormsg(err.to_string());
            Err(err)
        }
    }
}

/// Opens the engine named `engine` with `config`, consuming the bag.
///
/// The engine set is fixed at compile time; an unknown name fails with
/// `FAILED` and a diagnostic.
pub fn open(engine: &str, config: Config) -> Result<Db> {
    api(move || match engine {
        sorted::ENGINE_NAME => Ok(Db {
            engine: Box::new(sorted::SortedEngine::open(config)?),
        }),
        other => Err(TephraError::Failed(format!(
            "unknown engine name: \"{other}\""
        ))),
    })
}

/// An opened key-value store.
///
/// The concrete engine is erased behind the handle. Dropping the handle
/// closes the store, releasing transient state without touching durable
/// contents.
pub struct Db {
    engine: Box<dyn Engine>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").field("engine", &self.engine_name()).finish()
    }
}

impl Db {
    /// The dispatch name of the underlying engine.
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Number of live entries.
    pub fn count_all(&self) -> Result<usize> {
        api(|| self.engine.count_all())
    }

    /// Number of entries with keys strictly greater than `key`.
    pub fn count_above(&self, key: &[u8]) -> Result<usize> {
        api(|| self.engine.count_above(key))
    }

    /// Number of entries with keys strictly less than `key`.
    pub fn count_below(&self, key: &[u8]) -> Result<usize> {
        api(|| self.engine.count_below(key))
    }

    /// Number of entries strictly between the endpoints (both exclusive).
    pub fn count_between(&self, lower: RangeKey<'_>, upper: RangeKey<'_>) -> Result<usize> {
        api(|| self.engine.count_between(lower, upper))
    }

    /// Visits every entry in comparator order.
    pub fn get_all(
        &self,
        mut visit: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        api(|| self.engine.get_all(&mut visit))
    }

    /// Visits entries with keys strictly greater than `key`, in order.
    pub fn get_above(
        &self,
        key: &[u8],
        mut visit: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        api(|| self.engine.get_above(key, &mut visit))
    }

    /// Visits entries with keys strictly less than `key`, in order.
    pub fn get_below(
        &self,
        key: &[u8],
        mut visit: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        api(|| self.engine.get_below(key, &mut visit))
    }

    /// Visits entries strictly between the endpoints, in order. An inverted
    /// range is empty, not an error.
    pub fn get_between(
        &self,
        lower: RangeKey<'_>,
        upper: RangeKey<'_>,
        mut visit: impl FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<()> {
        api(|| self.engine.get_between(lower, upper, &mut visit))
    }

    /// Returns whether `key` has a live entry.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        api(|| self.engine.exists(key))
    }

    /// Delivers the value of `key` to `sink`; the borrowed slice is valid
    /// only for the duration of the call.
    pub fn get(&self, key: &[u8], mut sink: impl FnMut(&[u8])) -> Result<()> {
        api(|| self.engine.get(key, &mut sink))
    }

    /// Returns an owned copy of the value of `key`.
    pub fn get_copy(&self, key: &[u8]) -> Result<Vec<u8>> {
        api(|| {
            let mut out = Vec::new();
            self.engine.get(key, &mut |value| out.extend_from_slice(value))?;
            Ok(out)
        })
    }

    /// Inserts or replaces the entry for `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        api(|| self.engine.put(key, value))
    }

    /// Removes the entry for `key`.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        api(|| self.engine.remove(key))
    }
}
