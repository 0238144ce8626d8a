//! # Shared File Resources
//!
//! A [`FileResource`] is the single point of truth for one underlying host
//! resource: which raw descriptor and/or C stream backs it, who is
//! responsible for closing each, and whether a substituted implementation
//! intercepts I/O instead of the raw handles.
//!
//! Any number of [`FileHandle`](crate::file::FileHandle) values may share
//! one resource through an `Arc`. The resource is closed exactly once:
//! either by the first explicit `close()` call, or when the last sharing
//! handle drops it, whichever comes first. A close, even a failed one, is
//! terminal. The resource reads as invalid afterward and retries must
//! operate on a new binding.

use std::io;
use std::sync::Mutex;

use libc::c_int;

use crate::error::{HostError, HostResult};

/// Raw host file descriptor.
pub type RawDescriptor = c_int;

/// Sentinel value for "no descriptor".
pub const INVALID_DESCRIPTOR: RawDescriptor = -1;

/// Check whether a raw descriptor value is valid.
///
/// This is a value check only. It says nothing about whether the
/// descriptor is still open.
#[must_use]
pub const fn descriptor_is_valid(descriptor: RawDescriptor) -> bool
{
    descriptor >= 0
}

/// Pointer-sized handle to a buffered C runtime stream (`FILE *`).
///
/// Null is the "no stream" sentinel. The wrapper itself is plain handle
/// identity: it never dereferences the pointer. All stream I/O happens
/// inside [`FileResource`], or in the caller's hands after an explicit
/// [`FileHandle::take_stream_and_clear`](crate::file::FileHandle::take_stream_and_clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(*mut libc::FILE);

// SAFETY: a StreamHandle is an opaque handle value. Dereferencing only
// happens in FileResource methods (behind its lock) or after the handle
// has been extracted and the caller holds sole responsibility for it.
unsafe impl Send for StreamHandle {}
unsafe impl Sync for StreamHandle {}

impl StreamHandle
{
    /// The "no stream" sentinel.
    #[must_use]
    pub const fn invalid() -> Self
    {
        Self(std::ptr::null_mut())
    }

    /// Wrap a raw `FILE *` obtained from the host C runtime.
    #[must_use]
    pub const fn from_raw(raw: *mut libc::FILE) -> Self
    {
        Self(raw)
    }

    /// Get the raw `FILE *` back out.
    #[must_use]
    pub const fn as_raw(self) -> *mut libc::FILE
    {
        self.0
    }

    /// True unless this is the null sentinel.
    #[must_use]
    pub fn is_valid(self) -> bool
    {
        !self.0.is_null()
    }

    /// The descriptor underlying this stream, via `fileno(3)`.
    ///
    /// Returns [`INVALID_DESCRIPTOR`] for the null sentinel.
    #[must_use]
    pub fn fileno(self) -> RawDescriptor
    {
        if self.is_valid() {
            unsafe { libc::fileno(self.0) }
        } else {
            INVALID_DESCRIPTOR
        }
    }
}

impl Default for StreamHandle
{
    fn default() -> Self
    {
        Self::invalid()
    }
}

/// Substituted I/O implementation.
///
/// A foreign runtime (typically the embedding scripting layer) can stand
/// in for the native descriptor/stream I/O by installing one of these on
/// a resource via [`FileResource::with_override`]. While installed, every
/// read, write, flush, and close is routed here; any raw descriptor or
/// stream the resource also records is advisory bookkeeping only.
pub trait IoOverride: Send + Sync
{
    /// Read into `buf`, returning the number of bytes read.
    ///
    /// A short read is not an error, and `Ok(0)` means end of input.
    fn read(&self, buf: &mut [u8]) -> HostResult<usize>;

    /// Write from `buf`, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> HostResult<usize>;

    /// Flush any buffered output.
    fn flush(&self) -> HostResult<()>;

    /// Close the substituted object.
    fn close(&self) -> HostResult<()>;
}

/// Descriptor / stream / ownership bookkeeping behind the resource lock.
#[derive(Debug)]
struct ResourceState
{
    descriptor: RawDescriptor,
    stream: StreamHandle,
    owns_descriptor: bool,
    owns_stream: bool,
    closed: bool,
}

/// Owner of one underlying host file resource.
///
/// Holds the raw descriptor and/or buffered stream, the ownership flags
/// that decide what `close()` actually closes, and optionally the
/// [`IoOverride`] hook that intercepts all I/O. Shared between file
/// handles via `Arc`; see the module docs for the once-only close
/// contract.
pub struct FileResource
{
    state: Mutex<ResourceState>,
    hook: Option<Box<dyn IoOverride>>,
}

impl std::fmt::Debug for FileResource
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let state = self.state.lock().unwrap();
        f.debug_struct("FileResource")
            .field("descriptor", &state.descriptor)
            .field("stream", &state.stream)
            .field("owns_descriptor", &state.owns_descriptor)
            .field("owns_stream", &state.owns_stream)
            .field("closed", &state.closed)
            .field("overrides_io", &self.hook.is_some())
            .finish()
    }
}

impl FileResource
{
    /// Adopt a raw descriptor.
    ///
    /// With `take_ownership` set, `close()` (or the last handle drop)
    /// will close the descriptor. Without it the descriptor is borrowed
    /// and this resource will never close it.
    #[must_use]
    pub fn from_descriptor(descriptor: RawDescriptor, take_ownership: bool) -> Self
    {
        Self {
            state: Mutex::new(ResourceState {
                descriptor,
                stream: StreamHandle::invalid(),
                owns_descriptor: take_ownership,
                owns_stream: false,
                closed: false,
            }),
            hook: None,
        }
    }

    /// Adopt a buffered C stream.
    ///
    /// With `take_ownership` set, `close()` will `fclose(3)` the stream.
    #[must_use]
    pub fn from_stream(stream: StreamHandle, take_ownership: bool) -> Self
    {
        Self {
            state: Mutex::new(ResourceState {
                descriptor: INVALID_DESCRIPTOR,
                stream,
                owns_descriptor: false,
                owns_stream: take_ownership,
                closed: false,
            }),
            hook: None,
        }
    }

    /// Build a resource whose I/O is fully routed through `hook`.
    ///
    /// The resource records no raw handles and owns nothing; closing it
    /// delegates entirely to the hook. This is the
    /// borrowed-and-forced-override adoption path for foreign objects
    /// whose read/write/close semantics differ from a plain descriptor
    /// or stream.
    #[must_use]
    pub fn with_override(hook: Box<dyn IoOverride>) -> Self
    {
        Self {
            state: Mutex::new(ResourceState {
                descriptor: INVALID_DESCRIPTOR,
                stream: StreamHandle::invalid(),
                owns_descriptor: false,
                owns_stream: false,
                closed: false,
            }),
            hook: Some(hook),
        }
    }

    /// True when a substituted implementation intercepts all I/O.
    #[must_use]
    pub fn overrides_io(&self) -> bool
    {
        self.hook.is_some()
    }

    /// Whether this resource still backs anything.
    ///
    /// Computed from bookkeeping only, never from blocking I/O. Reads
    /// false after `close()`, even a failed one.
    #[must_use]
    pub fn is_valid(&self) -> bool
    {
        let state = self.state.lock().unwrap();
        !state.closed
            && (descriptor_is_valid(state.descriptor) || state.stream.is_valid() || self.hook.is_some())
    }

    /// The raw descriptor, or [`INVALID_DESCRIPTOR`] once closed.
    #[must_use]
    pub fn descriptor(&self) -> RawDescriptor
    {
        self.state.lock().unwrap().descriptor
    }

    /// The buffered stream handle, or the null sentinel once closed.
    #[must_use]
    pub fn stream(&self) -> StreamHandle
    {
        self.state.lock().unwrap().stream
    }

    /// Read into `buf` at the implicit file position.
    ///
    /// Dispatch order: substituted implementation, then stream, then
    /// descriptor. Returns the number of bytes read; a short read is
    /// reported through the count and `Ok(0)` is end of input.
    ///
    /// ## Errors
    ///
    /// - `InvalidHandle`: nothing is bound (or the resource was closed)
    /// - `Io`: the underlying host read failed
    pub fn read(&self, buf: &mut [u8]) -> HostResult<usize>
    {
        let (descriptor, stream) = self.live_handles()?;
        if let Some(hook) = &self.hook {
            return hook.read(buf);
        }
        if stream.is_valid() {
            stream_read(stream, buf)
        } else if descriptor_is_valid(descriptor) {
            descriptor_read(descriptor, buf)
        } else {
            Err(HostError::InvalidHandle)
        }
    }

    /// Write from `buf` at the implicit file position.
    ///
    /// Symmetric to [`read`](Self::read): same dispatch order, short
    /// writes reported through the returned count.
    pub fn write(&self, buf: &[u8]) -> HostResult<usize>
    {
        let (descriptor, stream) = self.live_handles()?;
        if let Some(hook) = &self.hook {
            return hook.write(buf);
        }
        if stream.is_valid() {
            stream_write(stream, buf)
        } else if descriptor_is_valid(descriptor) {
            descriptor_write(descriptor, buf)
        } else {
            Err(HostError::InvalidHandle)
        }
    }

    /// Flush buffered output.
    ///
    /// A descriptor-only resource has no client-side buffer, so this is
    /// a successful no-op for it.
    pub fn flush(&self) -> HostResult<()>
    {
        let (descriptor, stream) = self.live_handles()?;
        if let Some(hook) = &self.hook {
            return hook.flush();
        }
        if stream.is_valid() {
            if unsafe { libc::fflush(stream.as_raw()) } != 0 {
                return Err(HostError::Io(io::Error::last_os_error()));
            }
            Ok(())
        } else if descriptor_is_valid(descriptor) {
            Ok(())
        } else {
            Err(HostError::InvalidHandle)
        }
    }

    /// Force written data down to durable storage.
    ///
    /// For a stream this flushes the client-side buffer first, then
    /// `fsync(2)`s the underlying descriptor.
    ///
    /// ## Errors
    ///
    /// - `Unsupported`: the resource is override-backed; the substituted
    ///   capability has no durability surface
    pub fn sync(&self) -> HostResult<()>
    {
        let (descriptor, stream) = self.live_handles()?;
        if self.hook.is_some() {
            return Err(HostError::Unsupported("sync of an override-backed resource"));
        }
        let target = if stream.is_valid() {
            if unsafe { libc::fflush(stream.as_raw()) } != 0 {
                return Err(HostError::Io(io::Error::last_os_error()));
            }
            stream.fileno()
        } else {
            descriptor
        };
        if !descriptor_is_valid(target) {
            return Err(HostError::InvalidHandle);
        }
        if unsafe { libc::fsync(target) } != 0 {
            return Err(HostError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Close whatever this resource owns.
    ///
    /// Delegates entirely to the substituted implementation when one is
    /// installed. Otherwise closes the owned stream and the owned
    /// descriptor, attempting both even if the first fails, and returns
    /// the first failure. Either way the resource reads as invalid
    /// afterward: a resource whose release was attempted is never
    /// claimed again. Calling `close()` on an already closed resource is
    /// a successful no-op.
    pub fn close(&self) -> HostResult<()>
    {
        let mut state = self.state.lock().unwrap();
        close_state(self.hook.as_deref(), &mut state)
    }

    /// Extract the stream handle without closing it.
    ///
    /// Clears the stream field and its ownership flag, transferring
    /// close responsibility to the caller. Backs
    /// [`FileHandle::take_stream_and_clear`](crate::file::FileHandle::take_stream_and_clear);
    /// see the warnings there.
    pub(crate) fn release_stream(&self) -> StreamHandle
    {
        let mut state = self.state.lock().unwrap();
        let stream = state.stream;
        state.stream = StreamHandle::invalid();
        state.owns_stream = false;
        stream
    }

    /// Snapshot the raw handles without holding the lock across I/O.
    ///
    /// A closed resource reports `InvalidHandle` here, before any
    /// dispatch: even an installed override must not be consulted once
    /// the resource has been released.
    fn live_handles(&self) -> HostResult<(RawDescriptor, StreamHandle)>
    {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(HostError::InvalidHandle);
        }
        Ok((state.descriptor, state.stream))
    }
}

impl Drop for FileResource
{
    fn drop(&mut self)
    {
        let hook = self.hook.as_deref();
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.closed {
            // Best effort close - nowhere to report the error from a drop.
            if let Err(err) = close_state(hook, state) {
                tracing::warn!("failed to close file resource on drop: {err}");
            }
        }
    }
}

/// Shared close path for `close()` and `Drop`.
///
/// Attempts every owned resource even after the first failure, reports
/// the first failure, and unconditionally invalidates the state.
fn close_state(hook: Option<&dyn IoOverride>, state: &mut ResourceState) -> HostResult<()>
{
    if state.closed {
        return Ok(());
    }

    let mut first_failure: Option<HostError> = None;
    if let Some(hook) = hook {
        first_failure = hook.close().err();
    } else {
        if state.owns_stream && state.stream.is_valid() {
            if unsafe { libc::fclose(state.stream.as_raw()) } != 0 {
                first_failure = Some(HostError::Io(io::Error::last_os_error()));
            }
        }
        if state.owns_descriptor && descriptor_is_valid(state.descriptor) {
            let rc = unsafe { libc::close(state.descriptor) };
            if rc != 0 && first_failure.is_none() {
                first_failure = Some(HostError::Io(io::Error::last_os_error()));
            }
        }
    }

    // Fail-safe invalidation: even a failed close relinquishes the
    // resource. Retries operate on a new binding, not this one.
    state.descriptor = INVALID_DESCRIPTOR;
    state.stream = StreamHandle::invalid();
    state.owns_descriptor = false;
    state.owns_stream = false;
    state.closed = true;

    match first_failure {
        Some(err) => {
            tracing::debug!("file resource close failed: {err}");
            Err(err)
        }
        None => Ok(()),
    }
}

#[allow(clippy::cast_sign_loss)]
fn descriptor_read(descriptor: RawDescriptor, buf: &mut [u8]) -> HostResult<usize>
{
    let n = unsafe { libc::read(descriptor, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(HostError::Io(io::Error::last_os_error()));
    }
    Ok(n as usize)
}

#[allow(clippy::cast_sign_loss)]
fn descriptor_write(descriptor: RawDescriptor, buf: &[u8]) -> HostResult<usize>
{
    let n = unsafe { libc::write(descriptor, buf.as_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(HostError::Io(io::Error::last_os_error()));
    }
    Ok(n as usize)
}

fn stream_read(stream: StreamHandle, buf: &mut [u8]) -> HostResult<usize>
{
    let n = unsafe { libc::fread(buf.as_mut_ptr().cast(), 1, buf.len(), stream.as_raw()) };
    if n < buf.len() && unsafe { libc::ferror(stream.as_raw()) } != 0 {
        return Err(HostError::Io(io::Error::last_os_error()));
    }
    Ok(n)
}

fn stream_write(stream: StreamHandle, buf: &[u8]) -> HostResult<usize>
{
    let n = unsafe { libc::fwrite(buf.as_ptr().cast(), 1, buf.len(), stream.as_raw()) };
    if n < buf.len() && unsafe { libc::ferror(stream.as_raw()) } != 0 {
        return Err(HostError::Io(io::Error::last_os_error()));
    }
    Ok(n)
}

#[cfg(test)]
mod tests
{
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Records every call so tests can assert on the routing.
    #[derive(Default)]
    struct CountingOverride
    {
        reads: AtomicUsize,
        writes: AtomicUsize,
        flushes: AtomicUsize,
        closes: AtomicUsize,
    }

    impl IoOverride for CountingOverride
    {
        fn read(&self, buf: &mut [u8]) -> HostResult<usize>
        {
            self.reads.fetch_add(1, Ordering::SeqCst);
            buf.fill(0xAB);
            Ok(buf.len())
        }

        fn write(&self, buf: &[u8]) -> HostResult<usize>
        {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(buf.len())
        }

        fn flush(&self) -> HostResult<()>
        {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> HostResult<()>
        {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_descriptor_validity_check()
    {
        assert!(descriptor_is_valid(0));
        assert!(descriptor_is_valid(42));
        assert!(!descriptor_is_valid(INVALID_DESCRIPTOR));
        assert!(!descriptor_is_valid(-7));
    }

    #[test]
    fn test_stream_handle_sentinel()
    {
        let invalid = StreamHandle::invalid();
        assert!(!invalid.is_valid());
        assert_eq!(invalid.fileno(), INVALID_DESCRIPTOR);
        assert_eq!(StreamHandle::default(), invalid);
    }

    #[test]
    fn test_unbound_resource_reports_invalid_handle()
    {
        let resource = FileResource::from_descriptor(INVALID_DESCRIPTOR, false);
        assert!(!resource.is_valid());

        let mut buf = [0u8; 4];
        assert!(matches!(resource.read(&mut buf), Err(HostError::InvalidHandle)));
        assert!(matches!(resource.write(&buf), Err(HostError::InvalidHandle)));
        assert!(matches!(resource.flush(), Err(HostError::InvalidHandle)));
        assert!(matches!(resource.sync(), Err(HostError::InvalidHandle)));
    }

    #[test]
    fn test_override_routes_every_operation()
    {
        let resource = FileResource::with_override(Box::<CountingOverride>::default());
        assert!(resource.overrides_io());
        assert!(resource.is_valid());

        let mut buf = [0u8; 8];
        assert_eq!(resource.read(&mut buf).unwrap(), 8);
        assert_eq!(buf, [0xAB; 8]);
        assert_eq!(resource.write(&buf).unwrap(), 8);
        resource.flush().unwrap();
        resource.close().unwrap();

        // No raw handle to fall back to once closed.
        assert!(!resource.is_valid());
    }

    #[test]
    fn test_override_sync_is_unsupported()
    {
        let resource = FileResource::with_override(Box::<CountingOverride>::default());
        assert!(matches!(resource.sync(), Err(HostError::Unsupported(_))));
    }

    #[test]
    fn test_closed_override_resource_rejects_io()
    {
        let resource = FileResource::with_override(Box::<CountingOverride>::default());
        resource.close().unwrap();

        let mut buf = [0u8; 4];
        assert!(matches!(resource.read(&mut buf), Err(HostError::InvalidHandle)));
        assert!(matches!(resource.write(&buf), Err(HostError::InvalidHandle)));
        assert!(matches!(resource.flush(), Err(HostError::InvalidHandle)));
    }

    #[test]
    fn test_close_is_idempotent()
    {
        let resource = FileResource::with_override(Box::<CountingOverride>::default());
        resource.close().unwrap();
        resource.close().unwrap();
        assert!(!resource.is_valid());
    }

    #[test]
    fn test_close_failure_still_invalidates()
    {
        struct FailingClose;

        impl IoOverride for FailingClose
        {
            fn read(&self, _buf: &mut [u8]) -> HostResult<usize>
            {
                Ok(0)
            }

            fn write(&self, buf: &[u8]) -> HostResult<usize>
            {
                Ok(buf.len())
            }

            fn flush(&self) -> HostResult<()>
            {
                Ok(())
            }

            fn close(&self) -> HostResult<()>
            {
                Err(HostError::Io(io::Error::other("substituted close failed")))
            }
        }

        let resource = FileResource::with_override(Box::new(FailingClose));
        assert!(resource.close().is_err());
        assert!(!resource.is_valid());
        // A failed close is terminal: the second attempt is a no-op.
        resource.close().unwrap();
    }
}
