//! Tephra common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all Tephra components:
//! stable status codes, the workspace error type, the thread-local diagnostic
//! channel, the typed configuration bag, and the comparator trait.

pub mod comparator;
pub mod config;
pub mod error;
pub mod status;

pub use comparator::{BinaryComparator, Comparator, BINARY_COMPARATOR_NAME, COMPARATOR_NAME_MAX};
pub use config::{Config, ConfigValue, COMPARATOR_KEY};
pub use error::{Result, TephraError};
pub use status::{clear_errormsg, errormsg, set_errormsg, Status};
