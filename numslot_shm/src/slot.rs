//! Role-aware lifecycle of the shared slot.
//!
//! The consumer creates, sizes and initialises the object and is the only
//! side that removes it. The producer attaches to whatever the consumer set
//! up. Both release their own mapping and descriptor.

use crate::control;
use crate::error::{ResourceError, ResourceResult};
use crate::platform::get_current_pid;
use crate::record::{MessageRecord, RECORD_SIZE};
use crate::segment::{self, Mapping, SegmentHandle, ShmName};
use std::fmt;
use std::os::fd::RawFd;

/// Which side of the exchange this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// Publishes values ("client").
    Producer = 0,
    /// Drains values, owns the object ("server").
    Consumer = 1,
}

impl Role {
    /// Convert from raw `u8` value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Producer),
            1 => Some(Self::Consumer),
            _ => None,
        }
    }

    /// Pid of the other side as recorded in the slot.
    #[inline]
    pub fn peer_pid(self, record: &MessageRecord) -> i32 {
        match self {
            Role::Producer => record.consumer_pid(),
            Role::Consumer => record.producer_pid(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// Outcome of [`SharedSlot::teardown`].
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// The mapping was released by this call.
    pub unmapped: bool,
    /// The descriptor was closed by this call.
    pub closed: bool,
    /// The object name was removed by this call.
    pub removed: bool,
    /// Steps that failed; later steps still ran.
    pub errors: Vec<ResourceError>,
}

impl TeardownReport {
    /// True when no step failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The mapped slot plus the resources behind it.
pub struct SharedSlot {
    role: Role,
    handle: SegmentHandle,
    mapping: Mapping,
    remove_attempted: bool,
}

impl SharedSlot {
    /// Consumer side: create or reuse the object, size it to one record,
    /// map it, reset it to `Empty` and register our pid.
    pub fn create(name: &ShmName, permissions: u32) -> ResourceResult<Self> {
        let handle = SegmentHandle::create_or_open(name, permissions)?;
        handle.size(RECORD_SIZE)?;
        let mapping = handle.map()?;

        let slot = Self {
            role: Role::Consumer,
            handle,
            mapping,
            remove_attempted: false,
        };
        if let Some(record) = slot.record() {
            record.reset();
            record.set_consumer_pid(get_current_pid());
        }
        tracing::debug!("Created slot {} ({} bytes)", name, RECORD_SIZE);
        Ok(slot)
    }

    /// Producer side: open the object the consumer created, check that it
    /// has been sized, map it and register our pid.
    ///
    /// Never creates the object, so a missing consumer leaves nothing behind.
    pub fn attach(name: &ShmName) -> ResourceResult<Self> {
        let handle = SegmentHandle::open(name)?;
        let actual = handle.len()?;
        if actual < RECORD_SIZE as u64 {
            return Err(ResourceError::Undersized {
                name: name.to_string(),
                actual,
                expected: RECORD_SIZE,
            });
        }
        let mapping = handle.map()?;

        let slot = Self {
            role: Role::Producer,
            handle,
            mapping,
            remove_attempted: false,
        };
        if let Some(record) = slot.record() {
            record.set_producer_pid(get_current_pid());
        }
        tracing::debug!("Attached to slot {}", name);
        Ok(slot)
    }

    /// Role this slot was opened for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Object name.
    pub fn name(&self) -> &ShmName {
        self.handle.name()
    }

    /// Descriptor of the object, `None` once closed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.handle.raw_fd()
    }

    /// The shared record, `None` once unmapped.
    pub fn record(&self) -> Option<&MessageRecord> {
        self.mapping.record()
    }

    /// Raw record pointer for the signal handler, null once unmapped.
    pub fn record_ptr(&self) -> *mut MessageRecord {
        self.mapping.as_ptr()
    }

    /// Release the mapping. `Ok(false)` if already released.
    ///
    /// The record is unpublished from the signal handlers first.
    pub fn unmap(&mut self) -> ResourceResult<bool> {
        control::forget_record(self.record_ptr());
        self.mapping.unmap()
    }

    /// Close the descriptor. `Ok(false)` if already closed.
    pub fn close(&mut self) -> ResourceResult<bool> {
        self.handle.close()
    }

    /// Remove the object name. Only the consumer removes, and only once;
    /// every other call returns `Ok(false)`.
    pub fn remove(&mut self) -> ResourceResult<bool> {
        if self.role != Role::Consumer || self.remove_attempted {
            return Ok(false);
        }
        self.remove_attempted = true;
        segment::remove(self.handle.name()).map(|_| true)
    }

    /// Run every release step once, collecting failures instead of
    /// stopping at the first one.
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        match self.unmap() {
            Ok(done) => report.unmapped = done,
            Err(e) => report.errors.push(e),
        }
        match self.close() {
            Ok(done) => report.closed = done,
            Err(e) => report.errors.push(e),
        }
        match self.remove() {
            Ok(done) => report.removed = done,
            Err(e) => report.errors.push(e),
        }

        report
    }
}

impl Drop for SharedSlot {
    fn drop(&mut self) {
        // The mapping itself is released when its field drops.
        control::forget_record(self.record_ptr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShmOp;
    use crate::record::Tag;
    use nix::errno::Errno;

    fn unique(tag: &str) -> ShmName {
        ShmName::new(&format!("numslot_slot_{tag}_{}", std::process::id())).unwrap()
    }

    #[test]
    fn role_roundtrip() {
        for role in [Role::Producer, Role::Consumer] {
            assert_eq!(Role::from_u8(role as u8), Some(role));
        }
        assert!(Role::from_u8(2).is_none());
    }

    #[test]
    fn peer_pid_is_the_other_side() {
        let record = MessageRecord::new();
        record.set_producer_pid(10);
        record.set_consumer_pid(20);
        assert_eq!(Role::Producer.peer_pid(&record), 20);
        assert_eq!(Role::Consumer.peer_pid(&record), 10);
    }

    #[test]
    fn consumer_registers_pid_and_producer_joins() {
        let name = unique("join");
        let _ = segment::remove(&name);

        let mut consumer = SharedSlot::create(&name, 0o600).unwrap();
        let record = consumer.record().unwrap();
        assert_eq!(record.tag(), Ok(Tag::Empty));
        assert_eq!(record.consumer_pid(), get_current_pid());
        assert_eq!(record.producer_pid(), 0);

        let mut producer = SharedSlot::attach(&name).unwrap();
        assert_eq!(producer.role(), Role::Producer);
        assert_eq!(
            consumer.record().unwrap().producer_pid(),
            get_current_pid()
        );

        let report = producer.teardown();
        assert!(report.is_clean());
        assert!(report.unmapped && report.closed && !report.removed);

        let report = consumer.teardown();
        assert!(report.is_clean());
        assert!(report.unmapped && report.closed && report.removed);
    }

    #[test]
    fn producer_never_removes() {
        let name = unique("noremove");
        let _ = segment::remove(&name);

        let mut consumer = SharedSlot::create(&name, 0o600).unwrap();
        let mut producer = SharedSlot::attach(&name).unwrap();
        assert!(!producer.remove().unwrap());
        assert!(!producer.teardown().removed);

        assert!(consumer.teardown().removed);
    }

    #[test]
    fn attach_before_create_leaves_no_object() {
        let name = unique("missing");
        let _ = segment::remove(&name);

        let err = SharedSlot::attach(&name).err().unwrap();
        assert!(matches!(
            err,
            ResourceError::Os {
                op: ShmOp::Open,
                source: Errno::ENOENT,
                ..
            }
        ));
        assert!(segment::remove(&name).is_err());
    }

    #[test]
    fn attach_before_sizing_is_undersized() {
        let name = unique("early");
        let _ = segment::remove(&name);
        let unsized_handle = SegmentHandle::create_or_open(&name, 0o600).unwrap();

        let err = SharedSlot::attach(&name).err().unwrap();
        assert!(matches!(
            err,
            ResourceError::Undersized {
                actual: 0,
                expected: RECORD_SIZE,
                ..
            }
        ));
        drop(unsized_handle);

        // The consumer can still take over the empty object.
        let mut consumer = SharedSlot::create(&name, 0o600).unwrap();
        assert!(SharedSlot::attach(&name).is_ok());
        assert!(consumer.teardown().is_clean());
    }
}
