//! Common module for library exports

pub use crate::error::{HostError, HostResult};
pub use crate::file::{
    descriptor_is_valid, FileHandle, FileResource, IoOverride, OpenFlags, RawDescriptor, StreamHandle,
    INVALID_DESCRIPTOR,
};
