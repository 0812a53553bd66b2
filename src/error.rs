//! Kernel error type.
//!
//! Queue-full is reported as a plain `bool` by the posting calls. Slot
//! exhaustion on the infallible scheduling calls and double initialisation
//! panic instead of returning these.

use thiserror::Error;

/// Errors returned by the fallible kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CmtError {
    /// Every scheduled-message slot is in use.
    #[error("no free scheduled-message slot")]
    NoFreeSlot,
    /// The kernel was initialised twice.
    #[error("kernel already initialised")]
    AlreadyInitialized,
}

pub type CmtResult<T> = Result<T, CmtError>;
