//! # rift-host
//!
//! Host-level I/O abstractions for Rift.
//!
//! This crate gives the rest of the debugger one uniform way to talk to
//! "a place bytes can be read from or written to", whatever actually
//! backs it:
//! - A raw OS file descriptor
//! - A buffered stream handle from the host C runtime
//! - An I/O implementation substituted by an embedding scripting layer
//!
//! The two building blocks are [`file::FileResource`], the shared owner
//! that knows how to close the real resource and who performs raw I/O
//! for it, and [`file::FileHandle`], the cheap value type everything
//! else holds. Handles share resources; the resource is closed exactly
//! once no matter how many handles reference it.
//!
//! ## Why unsafe code is needed
//!
//! This crate requires `unsafe` code because it calls the host C
//! library directly: `read(2)`/`write(2)`/`lseek(2)` on descriptors,
//! the `FILE *` stream functions, and the terminal ioctls. We wrap
//! these calls in safe methods, but the calls themselves must be
//! `unsafe`.

#![allow(unsafe_code)] // Required for libc descriptor, stream, and terminal calls

pub mod error;
pub mod file;
pub mod prelude;

// Re-export commonly used types
pub use error::{HostError, HostResult};
pub use file::{FileHandle, FileResource, IoOverride, OpenFlags, StreamHandle};
