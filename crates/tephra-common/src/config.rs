//! Typed configuration bag consumed by engines at open time.
//!
//! A `Config` maps option names to values drawn from a small closed set of
//! types. Each name holds exactly one value of exactly one type; re-inserting
//! a name replaces the prior binding and drops its value immediately. On
//! destruction, remaining `object` bindings are dropped in reverse insertion
//! order.

use crate::comparator::Comparator;
use crate::error::{Result, TephraError};
use std::any::Any;

/// Reserved option name under which [`Config::put_comparator`] stores the
/// comparator object.
pub const COMPARATOR_KEY: &str = "__comparator";

/// A single typed configuration value.
pub enum ConfigValue {
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    Data(Vec<u8>),
    Object(Box<dyn Any + Send>),
}

impl std::fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Int64(v) => write!(f, "Int64({v})"),
            ConfigValue::Uint64(v) => write!(f, "Uint64({v})"),
            ConfigValue::Double(v) => write!(f, "Double({v})"),
            ConfigValue::String(v) => write!(f, "String({v:?})"),
            ConfigValue::Data(v) => write!(f, "Data({} bytes)", v.len()),
            ConfigValue::Object(_) => write!(f, "Object(..)"),
        }
    }
}

impl ConfigValue {
    fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Int64(_) => "int64",
            ConfigValue::Uint64(_) => "uint64",
            ConfigValue::Double(_) => "double",
            ConfigValue::String(_) => "string",
            ConfigValue::Data(_) => "data",
            ConfigValue::Object(_) => "object",
        }
    }
}

// Wrapper giving the comparator a concrete type so it can round-trip through
// the `object` binding.
struct ComparatorCell(Box<dyn Comparator>);

/// Typed mapping from option names to configuration values.
///
/// Engines read the options they recognise and ignore the rest; unknown keys
/// stay in the bag untouched.
#[derive(Debug, Default)]
pub struct Config {
    // Insertion order is preserved so destruction can run in reverse.
    entries: Vec<(String, ConfigValue)>,
}

impl Config {
    /// Creates an empty configuration bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates a bag from a JSON object.
    ///
    /// Strings map to `string`, booleans and integral numbers to `int64`
    /// (integers above `i64::MAX` to `uint64`), other numbers to `double`.
    /// Any other value type fails the parse.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| TephraError::ConfigParse(e.to_string()))?;
        let obj = doc.as_object().ok_or_else(|| {
            TephraError::ConfigParse("top-level JSON value is not an object".to_string())
        })?;

        let mut config = Config::new();
        for (name, value) in obj {
            match value {
                serde_json::Value::String(s) => {
                    config.put_string(name, s);
                }
                serde_json::Value::Bool(b) => {
                    config.put_int64(name, *b as i64);
                }
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        config.put_int64(name, i);
                    } else if let Some(u) = n.as_u64() {
                        config.put_uint64(name, u);
                    } else if let Some(d) = n.as_f64() {
                        config.put_double(name, d);
                    } else {
                        return Err(TephraError::ConfigParse(format!(
                            "unrepresentable number for key \"{name}\""
                        )));
                    }
                }
                other => {
                    return Err(TephraError::ConfigParse(format!(
                        "unsupported JSON value type for key \"{name}\": {other}"
                    )));
                }
            }
        }
        Ok(config)
    }

    /// Number of bindings currently in the bag.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bag holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn put(&mut self, name: &str, value: ConfigValue) -> &mut Self {
        // Replacement drops the prior value (and runs its disposer) now;
        // the new binding counts as a fresh insertion.
        if let Some(pos) = self.entries.iter().position(|(n, _)| n == name) {
            self.entries.remove(pos);
        }
        self.entries.push((name.to_string(), value));
        self
    }

    fn find(&self, name: &str) -> Option<&ConfigValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn type_error(name: &str, expected: &str, actual: &ConfigValue) -> TephraError {
        TephraError::ConfigType(format!(
            "config item \"{name}\" has type {}, expected {expected}",
            actual.kind()
        ))
    }

    /// Binds a signed 64-bit value.
    pub fn put_int64(&mut self, name: &str, value: i64) -> &mut Self {
        self.put(name, ConfigValue::Int64(value))
    }

    /// Binds an unsigned 64-bit value.
    pub fn put_uint64(&mut self, name: &str, value: u64) -> &mut Self {
        self.put(name, ConfigValue::Uint64(value))
    }

    /// Binds a double value.
    pub fn put_double(&mut self, name: &str, value: f64) -> &mut Self {
        self.put(name, ConfigValue::Double(value))
    }

    /// Binds a string value.
    pub fn put_string(&mut self, name: &str, value: &str) -> &mut Self {
        self.put(name, ConfigValue::String(value.to_string()))
    }

    /// Binds an opaque byte buffer.
    pub fn put_data(&mut self, name: &str, value: &[u8]) -> &mut Self {
        self.put(name, ConfigValue::Data(value.to_vec()))
    }

    /// Binds an externally-owned object. The object is dropped when the
    /// binding is replaced or when the bag is destroyed.
    pub fn put_object<T: Any + Send>(&mut self, name: &str, value: T) -> &mut Self {
        self.put(name, ConfigValue::Object(Box::new(value)))
    }

    /// Stores the comparator as an owned object under the reserved name
    /// [`COMPARATOR_KEY`].
    pub fn put_comparator(&mut self, comparator: Box<dyn Comparator>) -> &mut Self {
        self.put_object(COMPARATOR_KEY, ComparatorCell(comparator))
    }

    /// Reads a signed 64-bit value. An in-range `uint64` binding converts.
    pub fn get_int64(&self, name: &str) -> Result<Option<i64>> {
        match self.find(name) {
            None => Ok(None),
            Some(ConfigValue::Int64(v)) => Ok(Some(*v)),
            Some(ConfigValue::Uint64(v)) if *v <= i64::MAX as u64 => Ok(Some(*v as i64)),
            Some(other) => Err(Self::type_error(name, "int64", other)),
        }
    }

    /// Reads an unsigned 64-bit value. A non-negative `int64` binding converts.
    pub fn get_uint64(&self, name: &str) -> Result<Option<u64>> {
        match self.find(name) {
            None => Ok(None),
            Some(ConfigValue::Uint64(v)) => Ok(Some(*v)),
            Some(ConfigValue::Int64(v)) if *v >= 0 => Ok(Some(*v as u64)),
            Some(other) => Err(Self::type_error(name, "uint64", other)),
        }
    }

    /// Reads a double value.
    pub fn get_double(&self, name: &str) -> Result<Option<f64>> {
        match self.find(name) {
            None => Ok(None),
            Some(ConfigValue::Double(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::type_error(name, "double", other)),
        }
    }

    /// Reads a string value.
    pub fn get_string(&self, name: &str) -> Result<Option<&str>> {
        match self.find(name) {
            None => Ok(None),
            Some(ConfigValue::String(v)) => Ok(Some(v)),
            Some(other) => Err(Self::type_error(name, "string", other)),
        }
    }

    /// Reads a byte buffer value.
    pub fn get_data(&self, name: &str) -> Result<Option<&[u8]>> {
        match self.find(name) {
            None => Ok(None),
            Some(ConfigValue::Data(v)) => Ok(Some(v)),
            Some(other) => Err(Self::type_error(name, "data", other)),
        }
    }

    /// Borrows an object binding downcast to its concrete type.
    pub fn get_object<T: Any>(&self, name: &str) -> Result<Option<&T>> {
        match self.find(name) {
            None => Ok(None),
            Some(ConfigValue::Object(obj)) => match obj.downcast_ref::<T>() {
                Some(v) => Ok(Some(v)),
                None => Err(TephraError::ConfigType(format!(
                    "config item \"{name}\" holds an object of a different concrete type"
                ))),
            },
            Some(other) => Err(Self::type_error(name, "object", other)),
        }
    }

    /// Removes and returns the comparator stored via
    /// [`put_comparator`](Config::put_comparator), if any.
    pub fn take_comparator(&mut self) -> Option<Box<dyn Comparator>> {
        let pos = self
            .entries
            .iter()
            .position(|(n, _)| n == COMPARATOR_KEY)?;
        let (_, value) = self.entries.remove(pos);
        match value {
            ConfigValue::Object(obj) => obj
                .downcast::<ComparatorCell>()
                .ok()
                .map(|cell| cell.0),
            _ => None,
        }
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        // Disposers run in reverse insertion order.
        while self.entries.pop().is_some() {}
    }
}
