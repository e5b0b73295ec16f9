//! Error taxonomy shared by every backend.
//!
//! Errors fall into four groups:
//!
//! - resource access: a file, device or register block could not be opened or mapped
//! - protocol: the kernel rejected an ioctl
//! - policy: the pin is already owned, or the backend cannot do what was asked
//! - input validation: an argument was outside its documented range

use std::io;
use std::os::fd::RawFd;

/// Errors reported by the low-level device layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file, device or stream could not be opened.
    #[error("unable to access resource: {0}")]
    Access(String),

    /// The operating system refused to map the peripheral address range.
    #[error("direct access to the peripheral registers denied: {0}")]
    MemoryAccess(#[source] io::Error),

    /// The requested pin or channel is already owned by a live handle.
    #[error("requested pin has already been opened")]
    AccessViolation,

    /// A device, file or attribute could not be found.
    #[error("the requested device, file or content could not be found: {0}")]
    NotFound(String),

    /// No backend could provide the requested controller.
    #[error("the requested device controller could not be found on the system")]
    NoController,

    /// The backend does not support the requested operation or mode.
    #[error("requested operation or mode is not supported by the controller")]
    NotSupported,

    /// An argument was outside its valid range.
    #[error("invalid argument ({actual}) was passed into {function}; expected: {expected}")]
    InvalidArgument {
        function: &'static str,
        expected: String,
        actual: String,
    },

    /// An ioctl call on a device descriptor failed.
    #[error("ioctl {op} failed for descriptor {fd}: {source}")]
    Ioctl {
        fd: RawFd,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure while talking to a pseudo-file.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Build an [`Error::InvalidArgument`].
    pub fn invalid_argument(
        function: &'static str,
        expected: impl Into<String>,
        actual: impl ToString,
    ) -> Self {
        Error::InvalidArgument {
            function,
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// Build an [`Error::Ioctl`] from the calling thread's `errno`.
    pub fn ioctl(fd: RawFd, op: &'static str) -> Self {
        Error::Ioctl {
            fd,
            op,
            source: io::Error::last_os_error(),
        }
    }

    /// OS error code carried by this error, if any.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Error::MemoryAccess(e) | Error::Io(e) => e.raw_os_error(),
            Error::Ioctl { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = core::result::Result<T, Error>;
