//! # File Handles
//!
//! The uniform read/write/seek/flush/close surface the rest of the
//! debugger holds on to, regardless of what actually backs it: a raw OS
//! descriptor, a buffered C runtime stream, or a substituted I/O
//! implementation supplied by an embedding scripting layer.
//!
//! A [`FileHandle`] is a cheap value type. Cloning one shares the
//! underlying [`FileResource`], and with it the responsibility for
//! closing: whichever sharer closes first (or drops last) closes the
//! real resource, and every other sharer observes the invalidation.

pub mod flags;
pub mod resource;
mod terminal;

use std::io;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

pub use flags::OpenFlags;
pub use resource::{
    descriptor_is_valid, FileResource, IoOverride, RawDescriptor, StreamHandle, INVALID_DESCRIPTOR,
};

use crate::error::{HostError, HostResult};
use crate::file::terminal::TerminalTraits;

/// A handle to a host file, stream, or substituted I/O object.
///
/// Default-constructed handles are invalid; binding a descriptor, a
/// stream, or an existing resource makes them usable. Any number of
/// handles may share one resource; see the module docs for the shared
/// close contract.
///
/// ## Thread safety
///
/// The implicit-position [`read`](Self::read)/[`write`](Self::write) and
/// the seek family move a file position shared by every handle on the
/// same resource, so they are not safe under concurrent use of that
/// resource. The explicit-offset [`read_at`](Self::read_at)/
/// [`write_at`](Self::write_at) variants serialize their seek+operate
/// pair through a per-handle lock and are safe to call from multiple
/// threads on the *same* handle. Mixing either family across *different*
/// handles that share one resource remains the caller's hazard.
///
/// ## Example
///
/// ```rust,no_run
/// use rift_host::file::{FileHandle, OpenFlags};
///
/// let flags = OpenFlags::from_mode("r+")?;
/// let file = FileHandle::from_descriptor(3, flags, false);
/// let mut offset = 0;
/// let mut buf = [0u8; 16];
/// let n = file.read_at(&mut buf, &mut offset)?;
/// assert_eq!(offset, n as u64);
/// # Ok::<(), rift_host::error::HostError>(())
/// ```
pub struct FileHandle
{
    /// Shared owner of the underlying resource; `None` means invalid.
    resource: Option<Arc<FileResource>>,
    /// Cached copy of the descriptor for probe paths that should not
    /// dereference the owner. The resource stays authoritative.
    descriptor: RawDescriptor,
    /// Access pattern recorded when a descriptor was adopted.
    options: OpenFlags,
    /// Compute-once terminal traits; empty means not yet probed.
    terminal: OnceCell<TerminalTraits>,
    /// Serializes explicit-offset seek+operate pairs on this handle.
    offset_lock: Mutex<()>,
}

impl FileHandle
{
    /// Create an invalid, unbound handle.
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            resource: None,
            descriptor: INVALID_DESCRIPTOR,
            options: OpenFlags::empty(),
            terminal: OnceCell::new(),
            offset_lock: Mutex::new(()),
        }
    }

    /// Create a handle over a raw descriptor.
    ///
    /// `options` records the access pattern the descriptor was opened
    /// with (see [`OpenFlags::from_mode`] when only a textual mode is
    /// known). With `take_ownership` the descriptor is closed when the
    /// resource goes; without it the descriptor is borrowed and never
    /// closed by this crate.
    #[must_use]
    pub fn from_descriptor(descriptor: RawDescriptor, options: OpenFlags, take_ownership: bool) -> Self
    {
        let mut file = Self::new();
        file.set_descriptor(descriptor, options, take_ownership);
        file
    }

    /// Create a handle over a buffered C stream.
    #[must_use]
    pub fn from_stream(stream: StreamHandle, take_ownership: bool) -> Self
    {
        let mut file = Self::new();
        file.set_stream(stream, take_ownership);
        file
    }

    /// Adopt an existing, possibly shared, resource.
    ///
    /// This is how a scripting facade hands a foreign-backed resource
    /// (owned, borrowed, or override-routed) to debugger code, and how
    /// one handle comes to share another's resource.
    #[must_use]
    pub fn from_resource(resource: Arc<FileResource>) -> Self
    {
        let descriptor = resource.descriptor();
        Self::from_resource_with_descriptor(resource, descriptor)
    }

    /// Adopt an existing resource along with an advisory descriptor.
    ///
    /// The descriptor is cached for identity and probe purposes only;
    /// I/O still goes wherever the resource routes it.
    #[must_use]
    pub fn from_resource_with_descriptor(resource: Arc<FileResource>, descriptor: RawDescriptor) -> Self
    {
        let mut file = Self::new();
        file.set_resource(resource);
        file.descriptor = descriptor;
        file
    }

    /// Bind a raw descriptor, replacing whatever was bound before.
    ///
    /// The previous resource reference is released (closing it if this
    /// was the last handle on it) and the cached terminal traits reset
    /// to unknown.
    pub fn set_descriptor(&mut self, descriptor: RawDescriptor, options: OpenFlags, take_ownership: bool)
    {
        tracing::debug!(descriptor, take_ownership, "binding file handle to descriptor");
        self.replace_resource(
            Arc::new(FileResource::from_descriptor(descriptor, take_ownership)),
            descriptor,
            options,
        );
    }

    /// Bind a buffered C stream, replacing whatever was bound before.
    pub fn set_stream(&mut self, stream: StreamHandle, take_ownership: bool)
    {
        tracing::debug!(take_ownership, "binding file handle to stream");
        self.replace_resource(
            Arc::new(FileResource::from_stream(stream, take_ownership)),
            INVALID_DESCRIPTOR,
            OpenFlags::empty(),
        );
    }

    /// Bind an existing resource, replacing whatever was bound before.
    pub fn set_resource(&mut self, resource: Arc<FileResource>)
    {
        let descriptor = resource.descriptor();
        self.replace_resource(resource, descriptor, OpenFlags::empty());
    }

    fn replace_resource(&mut self, resource: Arc<FileResource>, descriptor: RawDescriptor, options: OpenFlags)
    {
        self.resource = Some(resource);
        self.descriptor = descriptor;
        self.options = options;
        self.terminal = OnceCell::new();
    }

    /// Whether this handle is backed by anything.
    ///
    /// True iff a resource is bound and that resource still holds a
    /// valid descriptor, a valid stream, or a substituted
    /// implementation. Never performs blocking I/O.
    #[must_use]
    pub fn is_valid(&self) -> bool
    {
        self.resource.as_ref().is_some_and(|resource| resource.is_valid())
    }

    /// The descriptor for this handle.
    ///
    /// Prefers the cached descriptor, then the resource's, then the
    /// descriptor under a bound stream via `fileno(3)`. Returns
    /// [`INVALID_DESCRIPTOR`] when none of those exist.
    #[must_use]
    pub fn descriptor(&self) -> RawDescriptor
    {
        if descriptor_is_valid(self.descriptor) {
            return self.descriptor;
        }
        match &self.resource {
            Some(resource) => {
                let descriptor = resource.descriptor();
                if descriptor_is_valid(descriptor) {
                    descriptor
                } else {
                    resource.stream().fileno()
                }
            }
            None => INVALID_DESCRIPTOR,
        }
    }

    /// The buffered stream handle, if a stream backs this handle.
    #[must_use]
    pub fn stream(&self) -> StreamHandle
    {
        match &self.resource {
            Some(resource) => resource.stream(),
            None => StreamHandle::invalid(),
        }
    }

    /// The access-pattern flags recorded at bind time.
    #[must_use]
    pub fn options(&self) -> OpenFlags
    {
        self.options
    }

    /// The resource backing this handle, for sharing with another handle.
    #[must_use]
    pub fn resource(&self) -> Option<Arc<FileResource>>
    {
        self.resource.clone()
    }

    /// Read bytes at the implicit file position.
    ///
    /// NOTE: not safe under concurrent use of the same resource from
    /// multiple threads; the shared position moves under every sharer.
    /// Use [`read_at`](Self::read_at) for concurrent access.
    ///
    /// Returns the number of bytes read. `Ok(0)` is end of input, and a
    /// short read is reported through the count, not an error.
    pub fn read(&self, buf: &mut [u8]) -> HostResult<usize>
    {
        match &self.resource {
            Some(resource) => resource.read(buf),
            None => Err(HostError::InvalidHandle),
        }
    }

    /// Write bytes at the implicit file position.
    ///
    /// NOTE: the same concurrency caveat as [`read`](Self::read); use
    /// [`write_at`](Self::write_at) for concurrent access.
    pub fn write(&self, buf: &[u8]) -> HostResult<usize>
    {
        match &self.resource {
            Some(resource) => resource.write(buf),
            None => Err(HostError::InvalidHandle),
        }
    }

    /// Read bytes from an explicit offset.
    ///
    /// `offset` is the caller's own position cursor: the read starts
    /// there and the cursor advances by the number of bytes read. The
    /// seek+read pair is atomic with respect to other explicit-offset
    /// calls on this same handle. Calls through *other* handles sharing
    /// the resource are not excluded; that hazard is the caller's.
    pub fn read_at(&self, buf: &mut [u8], offset: &mut u64) -> HostResult<usize>
    {
        let _guard = self.offset_lock.lock().unwrap();
        self.seek_from_start(*offset)?;
        let bytes_read = self.read(buf)?;
        *offset += bytes_read as u64;
        Ok(bytes_read)
    }

    /// Write bytes at an explicit offset.
    ///
    /// Symmetric to [`read_at`](Self::read_at): the cursor advances by
    /// the number of bytes written, and the seek+write pair is atomic
    /// per handle.
    pub fn write_at(&self, buf: &[u8], offset: &mut u64) -> HostResult<usize>
    {
        let _guard = self.offset_lock.lock().unwrap();
        self.seek_from_start(*offset)?;
        let bytes_written = self.write(buf)?;
        *offset += bytes_written as u64;
        Ok(bytes_written)
    }

    /// Seek to an offset relative to the beginning of the file.
    ///
    /// NOTE: moves the position shared by every handle on this
    /// resource; not safe against concurrent seeks from other sharers.
    ///
    /// Returns the resulting absolute offset.
    ///
    /// ## Errors
    ///
    /// - `InvalidHandle`: nothing seekable is bound
    /// - `Unsupported`: the resource routes I/O through a substituted
    ///   implementation, which has no seek surface
    /// - `Io`: the host `lseek(2)`/`fseeko(3)` failed
    #[allow(clippy::cast_possible_wrap)]
    pub fn seek_from_start(&self, offset: u64) -> HostResult<u64>
    {
        self.seek(libc::SEEK_SET, offset as i64)
    }

    /// Seek relative to the current position. Same caveats as
    /// [`seek_from_start`](Self::seek_from_start).
    pub fn seek_from_current(&self, offset: i64) -> HostResult<u64>
    {
        self.seek(libc::SEEK_CUR, offset)
    }

    /// Seek relative to the end of the file. Same caveats as
    /// [`seek_from_start`](Self::seek_from_start).
    pub fn seek_from_end(&self, offset: i64) -> HostResult<u64>
    {
        self.seek(libc::SEEK_END, offset)
    }

    #[allow(clippy::cast_sign_loss)]
    fn seek(&self, whence: libc::c_int, offset: i64) -> HostResult<u64>
    {
        let resource = self.resource.as_ref().ok_or(HostError::InvalidHandle)?;
        if resource.overrides_io() {
            return Err(HostError::Unsupported("seek of an override-backed resource"));
        }

        let descriptor = resource.descriptor();
        if descriptor_is_valid(descriptor) {
            let position = unsafe { libc::lseek(descriptor, offset as libc::off_t, whence) };
            if position < 0 {
                return Err(HostError::Io(io::Error::last_os_error()));
            }
            return Ok(position as u64);
        }

        let stream = resource.stream();
        if stream.is_valid() {
            if unsafe { libc::fseeko(stream.as_raw(), offset as libc::off_t, whence) } != 0 {
                return Err(HostError::Io(io::Error::last_os_error()));
            }
            let position = unsafe { libc::ftello(stream.as_raw()) };
            if position < 0 {
                return Err(HostError::Io(io::Error::last_os_error()));
            }
            return Ok(position as u64);
        }

        Err(HostError::InvalidHandle)
    }

    /// Flush buffered output. A successful no-op for descriptor-only
    /// handles, which have no client-side buffer.
    pub fn flush(&self) -> HostResult<()>
    {
        match &self.resource {
            Some(resource) => resource.flush(),
            None => Err(HostError::InvalidHandle),
        }
    }

    /// Force written data down to durable storage.
    pub fn sync(&self) -> HostResult<()>
    {
        match &self.resource {
            Some(resource) => resource.sync(),
            None => Err(HostError::InvalidHandle),
        }
    }

    /// Close the underlying resource and invalidate this handle.
    ///
    /// The close targets the resource this handle currently references,
    /// so every other handle sharing it observes the invalidation. This
    /// handle's own view (cached descriptor, options, terminal traits)
    /// is cleared whether or not the underlying close succeeds.
    pub fn close(&mut self) -> HostResult<()>
    {
        let result = match self.resource.take() {
            Some(resource) => {
                tracing::debug!(descriptor = self.descriptor, "closing file handle");
                resource.close()
            }
            None => Err(HostError::InvalidHandle),
        };
        self.descriptor = INVALID_DESCRIPTOR;
        self.options = OpenFlags::empty();
        self.terminal = OnceCell::new();
        result
    }

    /// DANGEROUS. Extract the underlying stream without closing it and
    /// reset this handle to the invalid state.
    ///
    /// Close responsibility for the returned stream transfers entirely
    /// to the caller; dropping the return value leaks the stream. This
    /// exists for exactly one purpose: handing a stream back to a
    /// foreign runtime whose lifetime this crate cannot track. It must
    /// not be used for ordinary control flow, and it is deliberately not
    /// made safer than that purpose allows.
    ///
    /// Returns `None` when no stream is bound; the handle is reset
    /// either way.
    pub fn take_stream_and_clear(&mut self) -> Option<StreamHandle>
    {
        let stream = self
            .resource
            .as_ref()
            .map(|resource| resource.release_stream())
            .filter(|stream| stream.is_valid());
        self.resource = None;
        self.descriptor = INVALID_DESCRIPTOR;
        self.options = OpenFlags::empty();
        self.terminal = OnceCell::new();
        stream
    }

    /// Whether this handle is a terminal (tty or pty).
    ///
    /// Computed on first query and cached until the next bind.
    #[must_use]
    pub fn is_interactive(&self) -> bool
    {
        self.terminal_traits().interactive
    }

    /// Whether this handle is a real terminal.
    ///
    /// Interactive alone is not enough for cursor movement and escape
    /// sequence output; the terminal must also report a non-zero width
    /// and height. A pty used purely as a pipe endpoint fails this.
    #[must_use]
    pub fn is_real_terminal(&self) -> bool
    {
        self.terminal_traits().real_terminal
    }

    /// Whether this handle is a terminal whose type supports color
    /// escape sequences.
    #[must_use]
    pub fn supports_colors(&self) -> bool
    {
        self.terminal_traits().supports_colors
    }

    fn terminal_traits(&self) -> TerminalTraits
    {
        *self
            .terminal
            .get_or_init(|| terminal::probe(self.descriptor()))
    }
}

impl Default for FileHandle
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Clone for FileHandle
{
    /// Cloning shares the resource (and with it, close responsibility)
    /// and copies the cached descriptor, options, and terminal traits.
    /// The offset lock is per handle and starts fresh.
    fn clone(&self) -> Self
    {
        Self {
            resource: self.resource.clone(),
            descriptor: self.descriptor,
            options: self.options,
            terminal: self.terminal.clone(),
            offset_lock: Mutex::new(()),
        }
    }
}

impl std::fmt::Debug for FileHandle
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("FileHandle")
            .field("descriptor", &self.descriptor)
            .field("options", &self.options)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

fn into_io_error(err: HostError) -> io::Error
{
    match err {
        HostError::Io(err) => err,
        other => io::Error::other(other),
    }
}

impl io::Read for FileHandle
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>
    {
        FileHandle::read(self, buf).map_err(into_io_error)
    }
}

impl io::Write for FileHandle
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        FileHandle::write(self, buf).map_err(into_io_error)
    }

    fn flush(&mut self) -> io::Result<()>
    {
        FileHandle::flush(self).map_err(into_io_error)
    }
}
