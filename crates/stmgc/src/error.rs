//! Error Module - Transactional Heap Error Types
//!
//! Defines all error types used by the transactional heap.
//!
//! # Error Categories
//!
//! ## Protocol Violations
//! - `ProtocolViolation` - the compiled code broke the barrier discipline
//! - `NoActiveTransaction` / `TransactionAlreadyActive` - bad transaction boundaries
//! - `DuplicateMapping` - a shared object was copied twice in one transaction
//! - `MissingPrivateCopy` - a root lost its private copy before commit
//! - `ForeignAddress` / `InvalidAccess` - address outside the caller's view
//!
//! ## Resource Exhaustion
//! - `OutOfAddressSpace` - an arena or token space cannot grow any further
//!
//! ## Setup Errors
//! - `UnknownType` - the layout oracle has no entry for a type id
//! - `Configuration` - invalid heap configuration
//!
//! Everything except `Configuration` and `UnknownType` is fatal: the plain
//! barrier and commit entry points hand such errors to [`fatal`], which logs
//! and panics. The `try_*` entry points return them instead.

use crate::object::{Address, TypeId};
use thiserror::Error;

/// Main error type for all transactional heap operations
///
/// # Examples
///
/// ```rust
/// use stmgc::StmError;
///
/// fn describe(err: &StmError) -> &'static str {
///     if err.is_fatal() {
///         "runtime defect"
///     } else {
///         "setup problem"
///     }
/// }
///
/// assert_eq!(describe(&StmError::NoActiveTransaction { operation: "commit" }), "runtime defect");
/// ```
#[derive(Debug, Error)]
pub enum StmError {
    /// Barrier discipline broken by the caller
    ///
    /// **When returned:** a store targets a shared object from inside a
    /// transaction, the main thread is attached twice, an operation runs in
    /// the wrong transaction phase, and similar misuse.
    #[error("Protocol violation in {operation}: {detail}")]
    ProtocolViolation {
        operation: &'static str,
        detail: String,
    },

    /// Transactional operation on a thread without a transaction
    #[error("No active transaction for {operation}")]
    NoActiveTransaction { operation: &'static str },

    /// `start_transaction` on a thread that already runs one
    #[error("Transaction already active on thread {thread}")]
    TransactionAlreadyActive { thread: u32 },

    /// Second insertion of the same shared object into the object map
    #[error("Shared object {shared} already has private copy {existing}")]
    DuplicateMapping { shared: Address, existing: Address },

    /// A private working copy that is not registered as a root
    #[error("Private copy {private} of {shared} is missing from the object map")]
    MissingPrivateCopy { shared: Address, private: Address },

    /// Address outside the shared heap and the caller's nursery
    #[error("Address {address} is not visible from thread {thread}")]
    ForeignAddress { address: Address, thread: u32 },

    /// Read or write outside the allocated part of an arena or an object
    #[error("Invalid access of {len} bytes at {address:#x}")]
    InvalidAccess { address: usize, len: usize },

    /// Arena or identity space cannot satisfy a request
    ///
    /// **Recovery strategy:** none. There is no degraded mode.
    #[error("Out of address space: requested {requested} bytes, available {available} bytes")]
    OutOfAddressSpace { requested: usize, available: usize },

    /// Type id not known to the layout oracle
    #[error("Unknown type id {0:?}")]
    UnknownType(TypeId),

    /// Configuration error
    ///
    /// **When returned:** `StmHeap::new` or `TypeRegistry::register` rejects
    /// its input.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StmError {
    /// Check if this error indicates a defect in the surrounding runtime
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StmError::Configuration(_) | StmError::UnknownType(_))
    }

    /// Check if this error is resource exhaustion rather than misuse
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, StmError::OutOfAddressSpace { .. })
    }

    pub(crate) fn violation(operation: &'static str, detail: impl Into<String>) -> Self {
        StmError::ProtocolViolation {
            operation,
            detail: detail.into(),
        }
    }
}

/// Result type alias for transactional heap operations
pub type Result<T> = std::result::Result<T, StmError>;

/// Abort the process-level operation on an unrecoverable heap error.
///
/// Logs at `error` level before panicking so the failure is visible even
/// when the panic is caught further up.
#[cold]
#[track_caller]
pub fn fatal(err: StmError) -> ! {
    log::error!("fatal transactional heap error: {}", err);
    panic!("stmgc: {}", err)
}

/// Converts a `Result` into its value, routing errors through [`fatal`]
pub trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for Result<T> {
    #[inline]
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }
}

/// Ensure condition is true, otherwise return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
