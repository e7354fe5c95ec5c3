//! Error types for the strand runtime

use core::fmt;

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in runtime operations
///
/// Resource exhaustion is reported here and is recoverable by the caller
/// (back off, or reduce concurrency). Invariant violations are not errors:
/// they panic. Guard-region faults abort the process from the fault handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// No strand record slots available
    NoSlotsAvailable,

    /// Stack pool and backing slab are both exhausted
    StackExhausted,

    /// Runtime (or this execution context) not initialized
    NotInitialized,

    /// Runtime (or this execution context) already initialized
    AlreadyInitialized,

    /// Memory allocation/mapping failed
    MemoryError(MemoryError),

    /// Platform-specific error (errno)
    PlatformError(i32),
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::NoSlotsAvailable => write!(f, "no strand slots available"),
            SchedError::StackExhausted => write!(f, "stack pool exhausted"),
            SchedError::NotInitialized => write!(f, "runtime not initialized"),
            SchedError::AlreadyInitialized => write!(f, "runtime already initialized"),
            SchedError::MemoryError(e) => write!(f, "memory error: {}", e),
            SchedError::PlatformError(code) => write!(f, "platform error: {}", code),
        }
    }
}

impl std::error::Error for SchedError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// Requested slab larger than the address space allows
    TooManyStacks,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "memory protection change failed"),
            MemoryError::TooManyStacks => write!(f, "too many stacks requested"),
        }
    }
}

impl From<MemoryError> for SchedError {
    fn from(e: MemoryError) -> Self {
        SchedError::MemoryError(e)
    }
}
