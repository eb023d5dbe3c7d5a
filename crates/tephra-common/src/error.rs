//! Error types for Tephra.

use crate::status::Status;
use thiserror::Error;

/// Result type alias using TephraError.
pub type Result<T> = std::result::Result<T, TephraError>;

/// Errors that can occur in Tephra operations.
///
/// Internal code propagates these with `?`; the public boundary translates
/// each variant into its stable [`Status`] ordinal via [`TephraError::status`].
#[derive(Debug, Error)]
pub enum TephraError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Expected non-fatal outcomes
    #[error("key not found")]
    NotFound,

    #[error("operation not supported by this engine: {0}")]
    NotSupported(String),

    #[error("iteration stopped by callback")]
    StoppedByCallback,

    // Programmer errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration errors
    #[error("config parsing failed: {0}")]
    ConfigParse(String),

    #[error("config type error: {0}")]
    ConfigType(String),

    // Pool and transaction errors
    #[error("out of memory: requested {requested} bytes, {available} available in pool")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("transaction scope error: {0}")]
    TransactionScope(String),

    #[error("comparator mismatch: comparator with name \"{expected}\" expected")]
    ComparatorMismatch { expected: String },

    #[error("pool corrupted: {0}")]
    PoolCorrupted(String),

    // Catch-alls
    #[error("{0}")]
    Failed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl TephraError {
    /// Maps this error onto its stable public status ordinal.
    pub fn status(&self) -> Status {
        match self {
            TephraError::NotFound => Status::NotFound,
            TephraError::NotSupported(_) => Status::NotSupported,
            TephraError::StoppedByCallback => Status::StoppedByCb,
            TephraError::InvalidArgument(_) => Status::InvalidArgument,
            TephraError::ConfigParse(_) => Status::ConfigParsingError,
            TephraError::ConfigType(_) => Status::ConfigTypeError,
            TephraError::OutOfMemory { .. } => Status::OutOfMemory,
            TephraError::TransactionScope(_) => Status::TransactionScopeError,
            TephraError::ComparatorMismatch { .. } => Status::ComparatorMismatch,
            TephraError::Io(_) | TephraError::PoolCorrupted(_) | TephraError::Failed(_) => {
                Status::Failed
            }
            TephraError::Unknown(_) => Status::UnknownError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: TephraError = io_err.into();
        assert!(matches!(err, TephraError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.status(), Status::Failed);
    }

    #[test]
    fn test_not_found_display() {
        let err = TephraError::NotFound;
        assert_eq!(err.to_string(), "key not found");
        assert_eq!(err.status(), Status::NotFound);
    }

    #[test]
    fn test_not_supported_display() {
        let err = TephraError::NotSupported("count_above".to_string());
        assert_eq!(
            err.to_string(),
            "operation not supported by this engine: count_above"
        );
        assert_eq!(err.status(), Status::NotSupported);
    }

    #[test]
    fn test_out_of_memory_display() {
        let err = TephraError::OutOfMemory {
            requested: 4096,
            available: 512,
        };
        assert_eq!(
            err.to_string(),
            "out of memory: requested 4096 bytes, 512 available in pool"
        );
        assert_eq!(err.status(), Status::OutOfMemory);
    }

    #[test]
    fn test_comparator_mismatch_names_expected() {
        let err = TephraError::ComparatorMismatch {
            expected: "__pmemkv_binary_comparator".to_string(),
        };
        assert!(err.to_string().contains("__pmemkv_binary_comparator"));
        assert_eq!(err.status(), Status::ComparatorMismatch);
    }

    #[test]
    fn test_config_errors_map_to_distinct_statuses() {
        let parse = TephraError::ConfigParse("bad json".to_string());
        let typed = TephraError::ConfigType("wrong type".to_string());
        assert_eq!(parse.status(), Status::ConfigParsingError);
        assert_eq!(typed.status(), Status::ConfigTypeError);
    }

    #[test]
    fn test_transaction_scope_display() {
        let err = TephraError::TransactionScope("commit write failed".to_string());
        assert_eq!(
            err.to_string(),
            "transaction scope error: commit write failed"
        );
        assert_eq!(err.status(), Status::TransactionScopeError);
    }

    #[test]
    fn test_stopped_by_callback_status() {
        assert_eq!(
            TephraError::StoppedByCallback.status(),
            Status::StoppedByCb
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TephraError>();
    }
}
