//! # Error Types
//!
//! General error handling for the host I/O layer.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

/// Main error type for host file operations
///
/// This enum represents all the ways a host file operation can fail.
/// Short transfers are deliberately absent: a read or write that moves
/// fewer bytes than requested reports the actual count through its
/// `Ok(usize)` return value, and a read of 0 bytes at end of input is
/// success, not an error.
///
/// ## Error Categories
///
/// 1. **Handle errors**: InvalidHandle (nothing is bound)
/// 2. **Host I/O errors**: Io (the underlying read/write/seek/flush/close failed)
/// 3. **Capability errors**: Unsupported (the backing representation cannot do this)
/// 4. **Adoption errors**: InvalidMode (unrecognized textual open mode)
#[derive(Error, Debug)]
pub enum HostError
{
    /// The file handle has no resource bound to it
    ///
    /// This happens when:
    /// - The handle was default-constructed and never bound
    /// - The handle was explicitly closed
    /// - A sharing handle closed the underlying resource first
    ///
    /// This is always checked before any delegation, so callers can rely
    /// on byte counts of 0 when they see it.
    #[error("invalid file handle")]
    InvalidHandle,

    /// An underlying host I/O call failed
    ///
    /// Wraps the OS error from `read(2)`, `write(2)`, `lseek(2)`,
    /// `close(2)`, the C stream functions, or a substituted I/O
    /// implementation. This is a standard `std::io::Error` converted to
    /// our error type.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not supported by the backing representation
    ///
    /// Examples:
    /// - Seeking a resource whose I/O is routed through a substituted
    ///   implementation (the override capability has no seek surface)
    /// - Syncing an override-backed resource to disk
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// A textual open mode could not be translated into open flags
    ///
    /// Raised by [`OpenFlags::from_mode`](crate::file::OpenFlags::from_mode)
    /// for anything outside the conventional `"r"`, `"w"`, `"a"`, `"r+"`,
    /// `"w+"`, `"a+"` family (an optional `b` is accepted and ignored).
    /// A bad mode coming from a foreign runtime fails loudly here rather
    /// than adopting a descriptor with the wrong access pattern.
    #[error("invalid open mode: {0:?}")]
    InvalidMode(String),
}

/// Convenience type alias for `Result<T, HostError>`
///
/// ```rust
/// use rift_host::error::HostResult;
/// fn foo() -> HostResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type HostResult<T> = std::result::Result<T, HostError>;
