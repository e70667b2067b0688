//! Shared memory object operations.
//!
//! Thin, one-syscall-per-method wrappers: [`SegmentHandle::create_or_open`],
//! [`SegmentHandle::open`], [`SegmentHandle::size`], [`SegmentHandle::map`], [`Mapping::unmap`],
//! [`SegmentHandle::close`] and [`remove`]. Release methods report whether
//! they did anything so repeated teardown is harmless.

use crate::error::{ResourceError, ResourceResult, ShmOp};
use crate::record::{MessageRecord, RECORD_SIZE};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use numslot::consts::SHM_NAME_MAX;
use std::fmt;
use std::fs::File;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::ptr::NonNull;

const MAP_LEN: NonZeroUsize = match NonZeroUsize::new(RECORD_SIZE) {
    Some(len) => len,
    None => panic!("record must not be zero-sized"),
};

/// Validated POSIX shared memory name, always with a single leading `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmName(String);

impl ShmName {
    /// Normalise and validate a user supplied name.
    pub fn new(raw: &str) -> ResourceResult<Self> {
        let bare = raw.strip_prefix('/').unwrap_or(raw);
        let reason = if bare.is_empty() {
            Some("name is empty")
        } else if bare.contains('/') {
            Some("only a leading `/` is allowed")
        } else if bare.contains('\0') {
            Some("name contains a NUL byte")
        } else if bare.len() > SHM_NAME_MAX {
            Some("name is longer than 255 bytes")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ResourceError::InvalidName {
                name: raw.to_string(),
                reason,
            }),
            None => Ok(Self(format!("/{bare}"))),
        }
    }

    /// Name as passed to `shm_open`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn errno_of(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(libc::EIO))
}

/// Open descriptor of the shared memory object.
pub struct SegmentHandle {
    name: ShmName,
    file: Option<File>,
}

impl SegmentHandle {
    /// Create the object if missing, otherwise open it. Read/write either way.
    pub fn create_or_open(name: &ShmName, permissions: u32) -> ResourceResult<Self> {
        let mode = Mode::from_bits_truncate(permissions as libc::mode_t);
        let fd = shm_open(name.as_str(), OFlag::O_CREAT | OFlag::O_RDWR, mode)
            .map_err(|e| ResourceError::os(ShmOp::Open, name.as_str(), e))?;

        Ok(Self {
            name: name.clone(),
            file: Some(File::from(fd)),
        })
    }

    /// Open an existing object read/write. Fails with `ENOENT` when it has
    /// not been created yet.
    pub fn open(name: &ShmName) -> ResourceResult<Self> {
        let fd = shm_open(name.as_str(), OFlag::O_RDWR, Mode::empty())
            .map_err(|e| ResourceError::os(ShmOp::Open, name.as_str(), e))?;

        Ok(Self {
            name: name.clone(),
            file: Some(File::from(fd)),
        })
    }

    /// Object name.
    pub fn name(&self) -> &ShmName {
        &self.name
    }

    /// Raw descriptor, `None` once closed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    fn file(&self) -> ResourceResult<&File> {
        self.file.as_ref().ok_or_else(|| ResourceError::Closed {
            name: self.name.to_string(),
        })
    }

    /// Set the object size to exactly `len` bytes.
    pub fn size(&self, len: usize) -> ResourceResult<()> {
        ftruncate(self.file()?, len as libc::off_t)
            .map_err(|e| ResourceError::os(ShmOp::Size, self.name.as_str(), e))
    }

    /// Current object size in bytes.
    pub fn len(&self) -> ResourceResult<u64> {
        let metadata = self
            .file()?
            .metadata()
            .map_err(|e| ResourceError::os(ShmOp::Stat, self.name.as_str(), errno_of(&e)))?;
        Ok(metadata.len())
    }

    /// Map one record, shared and read/write.
    pub fn map(&self) -> ResourceResult<Mapping> {
        let file = self.file()?;

        // SAFETY: fresh mapping at a kernel-chosen address; the object was
        // checked or sized to hold a record by the caller.
        let ptr = unsafe {
            mmap(
                None,
                MAP_LEN,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                0,
            )
        }
        .map_err(|e| ResourceError::os(ShmOp::Map, self.name.as_str(), e))?;

        Ok(Mapping {
            name: self.name.clone(),
            ptr: Some(ptr.cast::<MessageRecord>()),
        })
    }

    /// Close the descriptor. Returns `false` if it was already closed.
    ///
    /// The descriptor is given up even when `close(2)` reports an error.
    pub fn close(&mut self) -> ResourceResult<bool> {
        let Some(file) = self.file.take() else {
            return Ok(false);
        };

        let fd = file.into_raw_fd();
        // SAFETY: fd came out of an owned File and is closed exactly once.
        Errno::result(unsafe { libc::close(fd) })
            .map(|_| true)
            .map_err(|e| ResourceError::os(ShmOp::Close, self.name.as_str(), e))
    }
}

/// Mapped view of the shared record.
pub struct Mapping {
    name: ShmName,
    ptr: Option<NonNull<MessageRecord>>,
}

impl Mapping {
    /// The record, `None` once unmapped.
    pub fn record(&self) -> Option<&MessageRecord> {
        // SAFETY: ptr covers RECORD_SIZE mapped bytes until unmap(), which
        // needs &mut self and therefore cannot overlap this borrow.
        self.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Raw pointer for the signal handler, null once unmapped.
    pub fn as_ptr(&self) -> *mut MessageRecord {
        self.ptr.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Whether the record is still mapped.
    pub fn is_mapped(&self) -> bool {
        self.ptr.is_some()
    }

    /// Release the mapping. Returns `false` if it was already released.
    pub fn unmap(&mut self) -> ResourceResult<bool> {
        let Some(ptr) = self.ptr.take() else {
            return Ok(false);
        };

        // SAFETY: ptr/len are exactly what mmap returned; taken above so it
        // is never unmapped twice.
        unsafe { munmap(ptr.cast(), RECORD_SIZE) }
            .map(|_| true)
            .map_err(|e| ResourceError::os(ShmOp::Unmap, self.name.as_str(), e))
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            tracing::warn!("Dropping mapping: {}", e);
        }
    }
}

/// Remove the object name. Existing mappings stay valid until unmapped.
pub fn remove(name: &ShmName) -> ResourceResult<()> {
    shm_unlink(name.as_str()).map_err(|e| ResourceError::os(ShmOp::Remove, name.as_str(), e))
}
