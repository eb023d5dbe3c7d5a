//! Stable status codes and the thread-local diagnostic channel.

use std::cell::RefCell;

/// Result of a public store operation.
///
/// The ordinal values are part of the stable contract and must never be
/// reordered; language bindings rely on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Operation completed successfully.
    Ok = 0,
    /// Unexpected condition with no more specific classification.
    UnknownError = 1,
    /// Key (or config item) does not exist.
    NotFound = 2,
    /// Operation is not provided by this engine.
    NotSupported = 3,
    /// Caller-supplied argument was rejected (oversize key, bad option).
    InvalidArgument = 4,
    /// Configuration input could not be parsed.
    ConfigParsingError = 5,
    /// Configuration item exists but has the wrong type, or a required
    /// item is missing.
    ConfigTypeError = 6,
    /// Iteration was halted early by the caller's callback.
    StoppedByCb = 7,
    /// Pool space or memory exhausted; the transaction was aborted.
    OutOfMemory = 8,
    /// Reserved for dispatchers that distinguish bad engine names.
    WrongEngineName = 9,
    /// The pool rejected or aborted a transaction.
    TransactionScopeError = 10,
    /// Supplied comparator name differs from the one persisted in the pool.
    ComparatorMismatch = 11,
    /// Catch-all failure; the diagnostic channel carries details.
    Failed = 12,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::UnknownError => "UNKNOWN_ERROR",
            Status::NotFound => "NOT_FOUND",
            Status::NotSupported => "NOT_SUPPORTED",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::ConfigParsingError => "CONFIG_PARSING_ERROR",
            Status::ConfigTypeError => "CONFIG_TYPE_ERROR",
            Status::StoppedByCb => "STOPPED_BY_CB",
            Status::OutOfMemory => "OUT_OF_MEMORY",
            Status::WrongEngineName => "WRONG_ENGINE_NAME",
            Status::TransactionScopeError => "TRANSACTION_SCOPE_ERROR",
            Status::ComparatorMismatch => "COMPARATOR_MISMATCH",
            Status::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

thread_local! {
    static LAST_ERRORMSG: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Clears the diagnostic string for the calling thread.
///
/// Called at the start of every public operation so that a subsequent
/// [`errormsg`] only ever describes the most recent failure.
pub fn clear_errormsg() {
    LAST_ERRORMSG.with(|msg| msg.borrow_mut().clear());
}

/// Records a diagnostic for the calling thread. Written on failure paths only.
pub fn set_errormsg(text: impl Into<String>) {
    LAST_ERRORMSG.with(|msg| *msg.borrow_mut() = text.into());
}

/// Returns the diagnostic recorded by the last failed operation on this
/// thread, or an empty string if the last operation succeeded.
pub fn errormsg() -> String {
    LAST_ERRORMSG.with(|msg| msg.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordinals_are_stable() {
        assert_eq!(Status::Ok as i32, 0);
        assert_eq!(Status::UnknownError as i32, 1);
        assert_eq!(Status::NotFound as i32, 2);
        assert_eq!(Status::NotSupported as i32, 3);
        assert_eq!(Status::InvalidArgument as i32, 4);
        assert_eq!(Status::ConfigParsingError as i32, 5);
        assert_eq!(Status::ConfigTypeError as i32, 6);
        assert_eq!(Status::StoppedByCb as i32, 7);
        assert_eq!(Status::OutOfMemory as i32, 8);
        assert_eq!(Status::WrongEngineName as i32, 9);
        assert_eq!(Status::TransactionScopeError as i32, 10);
        assert_eq!(Status::ComparatorMismatch as i32, 11);
        assert_eq!(Status::Failed as i32, 12);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Ok.to_string(), "OK");
        assert_eq!(Status::NotFound.to_string(), "NOT_FOUND");
        assert_eq!(Status::StoppedByCb.to_string(), "STOPPED_BY_CB");
        assert_eq!(Status::ComparatorMismatch.to_string(), "COMPARATOR_MISMATCH");
    }

    #[test]
    fn test_errormsg_roundtrip() {
        clear_errormsg();
        assert_eq!(errormsg(), "");

        set_errormsg("something went wrong");
        assert_eq!(errormsg(), "something went wrong");

        clear_errormsg();
        assert_eq!(errormsg(), "");
    }

    #[test]
    fn test_errormsg_is_thread_local() {
        set_errormsg("main thread failure");
        let other = std::thread::spawn(errormsg).join().unwrap();
        assert_eq!(other, "");
        assert_eq!(errormsg(), "main thread failure");
        clear_errormsg();
    }
}
