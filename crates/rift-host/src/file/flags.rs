//! Open-option flags for adopted descriptors.
//!
//! The numeric values of these flags are embedded verbatim in the remote
//! file-transfer protocol, so existing bit positions must never be
//! renumbered. New flags may only be appended above the current high bit.

use libc::c_int;

use crate::error::{HostError, HostResult};

bitflags::bitflags! {
    /// Access-pattern flags recorded when a descriptor is adopted.
    ///
    /// These describe how a file was (or should be) opened: access
    /// direction, append/truncate behavior, creation policy, and the
    /// descriptor-level niceties (`O_NONBLOCK`, `O_NOFOLLOW`,
    /// `O_CLOEXEC`).
    ///
    /// ## Example
    ///
    /// ```rust
    /// use rift_host::file::OpenFlags;
    ///
    /// let flags = OpenFlags::from_mode("w")?;
    /// assert!(flags.contains(OpenFlags::WRITE | OpenFlags::TRUNCATE | OpenFlags::CAN_CREATE));
    /// assert!(!flags.contains(OpenFlags::READ));
    /// # Ok::<(), rift_host::error::HostError>(())
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Open for reading.
        const READ = 1 << 0;
        /// Open for writing.
        const WRITE = 1 << 1;
        /// Do not truncate when opening, append to the end of the file.
        const APPEND = 1 << 2;
        /// Truncate the file when opening.
        const TRUNCATE = 1 << 3;
        /// Reads and writes do not block.
        const NON_BLOCKING = 1 << 4;
        /// Create the file if it does not already exist.
        const CAN_CREATE = 1 << 5;
        /// Create the file, failing if it already exists.
        const CAN_CREATE_NEW_ONLY = 1 << 6;
        /// Refuse to follow a symlink when opening.
        const DONT_FOLLOW_SYMLINKS = 1 << 7;
        /// Close the descriptor when executing a new process.
        const CLOSE_ON_EXEC = 1 << 8;
    }
}

impl OpenFlags
{
    /// Translate a conventional textual open mode into flags.
    ///
    /// Accepts the `fopen(3)` family: `"r"`, `"w"`, `"a"`, `"r+"`,
    /// `"w+"`, `"a+"`, with an optional `b` anywhere in the string
    /// (binary mode is meaningless on POSIX hosts and is ignored).
    /// This is used when a raw descriptor is adopted from a foreign
    /// runtime that only knows the mode it was opened with.
    ///
    /// ## Errors
    ///
    /// - `InvalidMode`: the string is not one of the recognized modes
    pub fn from_mode(mode: &str) -> HostResult<Self>
    {
        let stripped: String = mode.chars().filter(|&c| c != 'b').collect();
        match stripped.as_str() {
            "r" => Ok(OpenFlags::READ),
            "w" => Ok(OpenFlags::WRITE | OpenFlags::TRUNCATE | OpenFlags::CAN_CREATE),
            "a" => Ok(OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CAN_CREATE),
            "r+" => Ok(OpenFlags::READ | OpenFlags::WRITE),
            "w+" => Ok(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::TRUNCATE | OpenFlags::CAN_CREATE),
            "a+" => Ok(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CAN_CREATE),
            _ => Err(HostError::InvalidMode(mode.to_string())),
        }
    }

    /// Convert these flags into `open(2)` `O_*` bits.
    ///
    /// Useful when a path needs to be opened with the same access
    /// pattern an adopted descriptor was described with.
    #[must_use]
    pub fn to_posix(self) -> c_int
    {
        let mut oflags = match (self.contains(OpenFlags::READ), self.contains(OpenFlags::WRITE)) {
            (true, true) => libc::O_RDWR,
            (false, true) => libc::O_WRONLY,
            _ => libc::O_RDONLY,
        };
        if self.contains(OpenFlags::APPEND) {
            oflags |= libc::O_APPEND;
        }
        if self.contains(OpenFlags::TRUNCATE) {
            oflags |= libc::O_TRUNC;
        }
        if self.contains(OpenFlags::NON_BLOCKING) {
            oflags |= libc::O_NONBLOCK;
        }
        if self.contains(OpenFlags::CAN_CREATE) {
            oflags |= libc::O_CREAT;
        }
        if self.contains(OpenFlags::CAN_CREATE_NEW_ONLY) {
            oflags |= libc::O_CREAT | libc::O_EXCL;
        }
        if self.contains(OpenFlags::DONT_FOLLOW_SYMLINKS) {
            oflags |= libc::O_NOFOLLOW;
        }
        if self.contains(OpenFlags::CLOSE_ON_EXEC) {
            oflags |= libc::O_CLOEXEC;
        }
        oflags
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_bit_positions_are_stable()
    {
        // These values travel on the wire. Renumbering them is a
        // protocol break, not a refactor.
        assert_eq!(OpenFlags::READ.bits(), 1 << 0);
        assert_eq!(OpenFlags::WRITE.bits(), 1 << 1);
        assert_eq!(OpenFlags::APPEND.bits(), 1 << 2);
        assert_eq!(OpenFlags::TRUNCATE.bits(), 1 << 3);
        assert_eq!(OpenFlags::NON_BLOCKING.bits(), 1 << 4);
        assert_eq!(OpenFlags::CAN_CREATE.bits(), 1 << 5);
        assert_eq!(OpenFlags::CAN_CREATE_NEW_ONLY.bits(), 1 << 6);
        assert_eq!(OpenFlags::DONT_FOLLOW_SYMLINKS.bits(), 1 << 7);
        assert_eq!(OpenFlags::CLOSE_ON_EXEC.bits(), 1 << 8);
    }

    #[test]
    fn test_from_mode_read_only()
    {
        let flags = OpenFlags::from_mode("r").unwrap();
        assert_eq!(flags, OpenFlags::READ);
        assert!(!flags.intersects(
            OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::TRUNCATE | OpenFlags::CAN_CREATE
        ));
    }

    #[test]
    fn test_from_mode_write()
    {
        let flags = OpenFlags::from_mode("w").unwrap();
        assert_eq!(flags, OpenFlags::WRITE | OpenFlags::TRUNCATE | OpenFlags::CAN_CREATE);
    }

    #[test]
    fn test_from_mode_append()
    {
        let flags = OpenFlags::from_mode("a").unwrap();
        assert_eq!(flags, OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CAN_CREATE);
    }

    #[test]
    fn test_from_mode_update_variants()
    {
        assert_eq!(
            OpenFlags::from_mode("r+").unwrap(),
            OpenFlags::READ | OpenFlags::WRITE
        );
        assert_eq!(
            OpenFlags::from_mode("w+").unwrap(),
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::TRUNCATE | OpenFlags::CAN_CREATE
        );
        assert_eq!(
            OpenFlags::from_mode("a+").unwrap(),
            OpenFlags::READ | OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CAN_CREATE
        );
    }

    #[test]
    fn test_from_mode_ignores_binary_suffix()
    {
        assert_eq!(
            OpenFlags::from_mode("rb").unwrap(),
            OpenFlags::from_mode("r").unwrap()
        );
        assert_eq!(
            OpenFlags::from_mode("rb+").unwrap(),
            OpenFlags::from_mode("r+").unwrap()
        );
        assert_eq!(
            OpenFlags::from_mode("r+b").unwrap(),
            OpenFlags::from_mode("r+").unwrap()
        );
        assert_eq!(
            OpenFlags::from_mode("wb").unwrap(),
            OpenFlags::from_mode("w").unwrap()
        );
    }

    #[test]
    fn test_from_mode_rejects_unknown()
    {
        assert!(OpenFlags::from_mode("").is_err());
        assert!(OpenFlags::from_mode("x").is_err());
        assert!(OpenFlags::from_mode("rw").is_err());
        let err = OpenFlags::from_mode("q+").unwrap_err();
        assert!(format!("{err}").contains("q+"));
    }

    #[test]
    fn test_to_posix_access_bits()
    {
        assert_eq!(
            OpenFlags::from_mode("r").unwrap().to_posix() & libc::O_ACCMODE,
            libc::O_RDONLY
        );
        assert_eq!(
            OpenFlags::from_mode("w").unwrap().to_posix() & libc::O_ACCMODE,
            libc::O_WRONLY
        );
        assert_eq!(
            OpenFlags::from_mode("r+").unwrap().to_posix() & libc::O_ACCMODE,
            libc::O_RDWR
        );
    }

    #[test]
    fn test_to_posix_auxiliary_bits()
    {
        let posix = OpenFlags::from_mode("a").unwrap().to_posix();
        assert_ne!(posix & libc::O_APPEND, 0);
        assert_ne!(posix & libc::O_CREAT, 0);
        assert_eq!(posix & libc::O_TRUNC, 0);

        let exclusive = (OpenFlags::WRITE | OpenFlags::CAN_CREATE_NEW_ONLY).to_posix();
        assert_ne!(exclusive & libc::O_CREAT, 0);
        assert_ne!(exclusive & libc::O_EXCL, 0);
    }
}
