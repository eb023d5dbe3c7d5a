//! Integration tests for engine dispatch, configuration validation, the
//! comparator binding, and the diagnostic channel.

use std::cmp::Ordering;
use std::ops::ControlFlow;
use tempfile::TempDir;
use tephra_kv::{errormsg, open, Comparator, Config, Db, RangeKey, Status};

const POOL_SIZE: u64 = 8 << 20;

fn pool_config(dir: &TempDir) -> Config {
    let mut config = Config::new();
    config
        .put_string("path", dir.path().join("pool").to_str().unwrap())
        .put_uint64("size", POOL_SIZE);
    config
}

fn open_sorted(dir: &TempDir) -> Db {
    open("sorted", pool_config(dir)).unwrap()
}

// Orders keys backwards; the name differs from the persisted default.
struct ReverseComparator;

impl Comparator for ReverseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }

    fn name(&self) -> &str {
        "reverse_cmp"
    }
}

fn collect_keys(db: &Db) -> Vec<String> {
    let mut out = Vec::new();
    db.get_all(|k, _| {
        out.push(String::from_utf8_lossy(k).into_owned());
        ControlFlow::Continue(())
    })
    .unwrap();
    out
}

// =============================================================================
// Dispatch and configuration
// =============================================================================

#[test]
fn unknown_engine_name_fails_with_diagnostic() {
    let dir = TempDir::new().unwrap();
    let err = open("btree9000", pool_config(&dir)).unwrap_err();
    assert_eq!(err.status(), Status::Failed);
    assert!(errormsg().contains("unknown engine name"));
    assert!(errormsg().contains("btree9000"));
}

#[test]
fn missing_path_is_config_type_error() {
    let mut config = Config::new();
    config.put_uint64("size", POOL_SIZE);
    let err = open("sorted", config).unwrap_err();
    assert_eq!(err.status(), Status::ConfigTypeError);
    assert!(errormsg().contains("path"));
}

#[test]
fn missing_size_on_create_is_config_type_error() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new();
    config.put_string("path", dir.path().join("pool").to_str().unwrap());
    let err = open("sorted", config).unwrap_err();
    assert_eq!(err.status(), Status::ConfigTypeError);
    assert!(errormsg().contains("size"));
}

#[test]
fn mistyped_path_is_config_type_error() {
    let mut config = Config::new();
    config.put_int64("path", 7).put_uint64("size", POOL_SIZE);
    let err = open("sorted", config).unwrap_err();
    assert_eq!(err.status(), Status::ConfigTypeError);
}

#[test]
fn size_is_ignored_when_pool_exists() {
    let dir = TempDir::new().unwrap();
    let db = open_sorted(&dir);
    db.put(b"k", b"v").unwrap();
    drop(db);

    // Reopen without a size, and with an unknown option the engine ignores.
    let mut config = Config::new();
    config
        .put_string("path", dir.path().join("pool").to_str().unwrap())
        .put_int64("custom_knob", 3);
    let db = open("sorted", config).unwrap();
    assert_eq!(db.count_all().unwrap(), 1);
    assert_eq!(db.get_copy(b"k").unwrap(), b"v");
}

#[test]
fn force_create_discards_existing_contents() {
    let dir = TempDir::new().unwrap();
    let db = open_sorted(&dir);
    db.put(b"k", b"v").unwrap();
    drop(db);

    let mut config = pool_config(&dir);
    config.put_int64("force_create", 1);
    let db = open("sorted", config).unwrap();
    assert_eq!(db.count_all().unwrap(), 0);
    assert!(!db.exists(b"k").unwrap());
}

#[test]
fn open_from_json_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pool");
    let json = format!(
        r#"{{"path": "{}", "size": {}}}"#,
        path.to_str().unwrap(),
        POOL_SIZE
    );
    let db = open("sorted", Config::from_json(&json).unwrap()).unwrap();
    assert_eq!(db.engine_name(), "sorted");
    db.put(b"json", b"config").unwrap();
    assert_eq!(db.get_copy(b"json").unwrap(), b"config");
}

// =============================================================================
// Comparator binding
// =============================================================================

#[test]
fn reopen_with_wrong_comparator_is_refused() {
    let dir = TempDir::new().unwrap();

    // Insert under the default comparator.
    let db = open_sorted(&dir);
    for k in ["A", "B", "C", "D"] {
        db.put(k.as_bytes(), k.as_bytes()).unwrap();
    }
    drop(db);

    // A differently named comparator must be refused, naming the expected one.
    let mut config = pool_config(&dir);
    config.put_comparator(Box::new(ReverseComparator));
    let err = open("sorted", config).unwrap_err();
    assert_eq!(err.status(), Status::ComparatorMismatch);
    assert!(errormsg().contains("__pmemkv_binary_comparator"));

    // The refused open left the pool untouched.
    let db = open_sorted(&dir);
    assert_eq!(db.count_all().unwrap(), 4);
    assert_eq!(db.count_above(b"B").unwrap(), 2);
    assert_eq!(db.count_below(b"B").unwrap(), 1);
}

#[test]
fn custom_comparator_orders_and_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let mut config = pool_config(&dir);
    config.put_comparator(Box::new(ReverseComparator));
    let db = open("sorted", config).unwrap();
    for k in ["a", "b", "c"] {
        db.put(k.as_bytes(), k.as_bytes()).unwrap();
    }
    assert_eq!(collect_keys(&db), vec!["c", "b", "a"]);

    // Under the reversed order, "a" is the only key above "b".
    let mut above = Vec::new();
    db.get_above(b"b", |k, _| {
        above.push(String::from_utf8_lossy(k).into_owned());
        ControlFlow::Continue(())
    })
    .unwrap();
    assert_eq!(above, vec!["a"]);
    drop(db);

    // Same name: accepted, same ordering.
    let mut config = pool_config(&dir);
    config.put_comparator(Box::new(ReverseComparator));
    let db = open("sorted", config).unwrap();
    assert_eq!(collect_keys(&db), vec!["c", "b", "a"]);
    drop(db);

    // Default comparator: refused, diagnostic names the persisted one.
    let err = open("sorted", pool_config(&dir)).unwrap_err();
    assert_eq!(err.status(), Status::ComparatorMismatch);
    assert!(errormsg().contains("reverse_cmp"));
}

// =============================================================================
// Diagnostic channel
// =============================================================================

#[test]
fn errormsg_is_reset_by_the_next_successful_call() {
    let dir = TempDir::new().unwrap();
    let db = open_sorted(&dir);

    assert_eq!(db.remove(b"absent").unwrap_err().status(), Status::NotFound);
    assert!(!errormsg().is_empty());

    db.put(b"k", b"v").unwrap();
    assert_eq!(errormsg(), "");
}
