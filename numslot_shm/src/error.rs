//! Error types for slot exchange operations.

use std::fmt;
use thiserror::Error;

/// Shared memory operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOp {
    /// `shm_open(3)`.
    Open,
    /// `ftruncate(2)`.
    Size,
    /// `fstat(2)`.
    Stat,
    /// `mmap(2)`.
    Map,
    /// `munmap(2)`.
    Unmap,
    /// `close(2)`.
    Close,
    /// `shm_unlink(3)`.
    Remove,
}

impl fmt::Display for ShmOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShmOp::Open => "shm_open",
            ShmOp::Size => "ftruncate",
            ShmOp::Stat => "fstat",
            ShmOp::Map => "mmap",
            ShmOp::Unmap => "munmap",
            ShmOp::Close => "close",
            ShmOp::Remove => "shm_unlink",
        };
        f.write_str(name)
    }
}

/// Failures creating, attaching, or releasing the shared object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The object name cannot be passed to `shm_open`.
    #[error("Invalid shared memory name `{name}`: {reason}")]
    InvalidName {
        /// Name as given.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An OS call on the object failed.
    #[error("{op} failed for `{name}`: {source}")]
    Os {
        /// Failing operation.
        op: ShmOp,
        /// Object name.
        name: String,
        /// Errno reported by the OS.
        #[source]
        source: nix::Error,
    },

    /// The object exists but has not been sized for a record yet.
    #[error("Shared memory `{name}` holds {actual} bytes, expected at least {expected}")]
    Undersized {
        /// Object name.
        name: String,
        /// Current object size.
        actual: u64,
        /// Size of one record.
        expected: usize,
    },

    /// The operation needs a descriptor that was already closed.
    #[error("Descriptor for `{name}` already closed")]
    Closed {
        /// Object name.
        name: String,
    },
}

impl ResourceError {
    pub(crate) fn os(op: ShmOp, name: &str, source: nix::Error) -> Self {
        Self::Os {
            op,
            name: name.to_string(),
            source,
        }
    }
}

/// Result type for shared memory operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Failures installing or removing the signal handlers.
#[derive(Error, Debug)]
pub enum SignalSetupError {
    /// Another control plane is already live in this process.
    #[error("A control plane is already installed in this process")]
    AlreadyInstalled,

    /// `sigaction(2)` rejected the handler.
    #[error("sigaction for {signal} failed: {source}")]
    Sigaction {
        /// Signal being configured.
        signal: nix::sys::signal::Signal,
        /// Errno reported by the OS.
        #[source]
        source: nix::Error,
    },
}

/// Protocol violations observed in the shared record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Text does not fit the payload buffer.
    #[error("Payload of {len} bytes exceeds capacity of {capacity}")]
    PayloadTooLong {
        /// Attempted length.
        len: usize,
        /// Buffer capacity.
        capacity: usize,
    },

    /// The stored payload length is out of bounds.
    #[error("Stored payload length {len} exceeds capacity of {capacity}")]
    CorruptLength {
        /// Length read from the record.
        len: u32,
        /// Buffer capacity.
        capacity: usize,
    },

    /// Payload bytes are not valid UTF-8.
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    /// Payload is not a decimal integer.
    #[error("Payload `{text}` is not a decimal integer")]
    NotANumber {
        /// Offending text.
        text: String,
    },

    /// The tag holds a value outside the state machine.
    #[error("Unknown slot tag {raw}")]
    UnknownTag {
        /// Raw tag value.
        raw: u32,
    },
}

/// Any fatal error of a session.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Shared memory setup failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Signal handlers could not be installed.
    #[error(transparent)]
    Signal(#[from] SignalSetupError),

    /// Configuration rejected before setup.
    #[error(transparent)]
    Config(#[from] numslot::config::ConfigError),
}
