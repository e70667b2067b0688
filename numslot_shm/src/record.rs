//! Shared record layout and the slot tag.
//!
//! One `MessageRecord` lives in the shared object. The `tag` field is the
//! only synchronization point between the two processes:
//!
//! ```text
//! Empty ──(producer publishes)──► HasValue ──(consumer drains)──► Empty ...
//!   └──────────────(either side, at shutdown)──────────────► Finished
//! ```
//!
//! Whoever's turn it is owns the payload: the producer writes it only while
//! the tag reads `Empty`, the consumer reads it only while the tag reads
//! `HasValue`. Nothing enforces this; both loops follow it. The payload is
//! handed over by a release store of the tag and picked up by an acquire
//! load, which is what makes the plain payload bytes visible to the peer.

use crate::error::ProtocolError;
use numslot::consts::PAYLOAD_CAPACITY;
use static_assertions::const_assert;
use std::cell::UnsafeCell;
use std::fmt::Write;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// State of the single message slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Tag {
    /// Nothing to read; the producer may publish.
    Empty = 0,
    /// A value is waiting; the consumer may drain it.
    HasValue = 1,
    /// The exchange is over. Terminal.
    Finished = 2,
}

impl Tag {
    /// Convert from the raw field value. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Empty),
            1 => Some(Self::HasValue),
            2 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// Payload text without heap allocation.
pub type PayloadText = heapless::String<PAYLOAD_CAPACITY>;

/// The record shared by producer and consumer.
#[repr(C)]
pub struct MessageRecord {
    tag: AtomicU32,
    payload_len: AtomicU32,
    payload: UnsafeCell<[u8; PAYLOAD_CAPACITY]>,
    producer_pid: AtomicI32,
    consumer_pid: AtomicI32,
}

/// Bytes needed to hold one record; the object is sized to exactly this.
pub const RECORD_SIZE: usize = std::mem::size_of::<MessageRecord>();

const_assert!(RECORD_SIZE == 8 + PAYLOAD_CAPACITY + 8);
const_assert!(std::mem::align_of::<MessageRecord>() == 4);
// Every i64 renders in 20 bytes.
const_assert!(PAYLOAD_CAPACITY >= 20);

// SAFETY: every field except `payload` is atomic. `payload` is only touched
// by the side that currently owns it according to `tag`, and ownership moves
// through a release/acquire pair on `tag`.
unsafe impl Sync for MessageRecord {}

impl Default for MessageRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRecord {
    /// A zeroed record: `Empty`, no payload, no pids.
    pub const fn new() -> Self {
        Self {
            tag: AtomicU32::new(Tag::Empty as u32),
            payload_len: AtomicU32::new(0),
            payload: UnsafeCell::new([0; PAYLOAD_CAPACITY]),
            producer_pid: AtomicI32::new(0),
            consumer_pid: AtomicI32::new(0),
        }
    }

    /// Raw tag value with acquire ordering.
    #[inline]
    pub fn raw_tag(&self) -> u32 {
        self.tag.load(Ordering::Acquire)
    }

    /// Current tag.
    #[inline]
    pub fn tag(&self) -> Result<Tag, ProtocolError> {
        let raw = self.raw_tag();
        Tag::from_u32(raw).ok_or(ProtocolError::UnknownTag { raw })
    }

    /// Store a tag with release ordering.
    #[inline]
    pub fn store_tag(&self, tag: Tag) {
        self.tag.store(tag as u32, Ordering::Release);
    }

    /// Move the tag from `current` to `next`, but only if it still reads
    /// `current`. On failure returns the raw tag actually found.
    ///
    /// Keeps a concurrent `Finished` from being overwritten.
    #[inline]
    pub fn transition(&self, current: Tag, next: Tag) -> Result<(), u32> {
        self.tag
            .compare_exchange(
                current as u32,
                next as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
    }

    #[cfg(test)]
    pub(crate) fn store_raw_tag(&self, raw: u32) {
        self.tag.store(raw, Ordering::Release);
    }

    /// Mark the exchange finished. Idempotent and async-signal-safe.
    #[inline]
    pub fn finish(&self) {
        self.tag.store(Tag::Finished as u32, Ordering::SeqCst);
    }

    /// Reset to the freshly created state: `Empty` with no payload.
    pub fn reset(&self) {
        self.payload_len.store(0, Ordering::Relaxed);
        self.store_tag(Tag::Empty);
    }

    /// Copy `text` into the payload buffer.
    ///
    /// The caller must own the slot (tag is `Empty`). Text longer than
    /// [`PAYLOAD_CAPACITY`] is rejected and leaves the record untouched.
    pub fn write_payload(&self, text: &str) -> Result<(), ProtocolError> {
        let len = text.len();
        if len > PAYLOAD_CAPACITY {
            return Err(ProtocolError::PayloadTooLong {
                len,
                capacity: PAYLOAD_CAPACITY,
            });
        }

        // SAFETY: bounds checked above; the producer owns the buffer while
        // the tag reads Empty, so nobody reads it concurrently.
        unsafe {
            std::ptr::copy_nonoverlapping(text.as_ptr(), self.payload.get().cast::<u8>(), len);
        }
        self.payload_len.store(len as u32, Ordering::Relaxed);
        Ok(())
    }

    /// Write `text` and hand the slot to the consumer.
    pub fn publish(&self, text: &str) -> Result<(), ProtocolError> {
        self.write_payload(text)?;
        self.store_tag(Tag::HasValue);
        Ok(())
    }

    /// Copy the payload out of the record.
    ///
    /// Only meaningful after observing `HasValue`; the acquire load of the
    /// tag is what makes the producer's bytes visible.
    pub fn read_payload(&self) -> Result<PayloadText, ProtocolError> {
        let len = self.payload_len.load(Ordering::Relaxed);
        if len as usize > PAYLOAD_CAPACITY {
            return Err(ProtocolError::CorruptLength {
                len,
                capacity: PAYLOAD_CAPACITY,
            });
        }
        let len = len as usize;

        let mut bytes = [0u8; PAYLOAD_CAPACITY];
        // SAFETY: len is within the buffer; the consumer owns the buffer
        // while the tag reads HasValue.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.payload.get().cast::<u8>(),
                bytes.as_mut_ptr(),
                len,
            );
        }

        let text = std::str::from_utf8(&bytes[..len]).map_err(|_| ProtocolError::NotUtf8)?;
        PayloadText::try_from(text).map_err(|_| ProtocolError::PayloadTooLong {
            len,
            capacity: PAYLOAD_CAPACITY,
        })
    }

    /// Pid written by the producer at attach time (0 if none).
    #[inline]
    pub fn producer_pid(&self) -> i32 {
        self.producer_pid.load(Ordering::SeqCst)
    }

    /// Pid written by the consumer at creation time (0 if none).
    #[inline]
    pub fn consumer_pid(&self) -> i32 {
        self.consumer_pid.load(Ordering::SeqCst)
    }

    /// Register the producer's pid.
    pub fn set_producer_pid(&self, pid: i32) {
        self.producer_pid.store(pid, Ordering::SeqCst);
    }

    /// Register the consumer's pid.
    pub fn set_consumer_pid(&self, pid: i32) {
        self.consumer_pid.store(pid, Ordering::SeqCst);
    }
}

/// Render a value as the decimal payload text.
pub fn render_value(value: i64) -> Result<PayloadText, ProtocolError> {
    let mut text = PayloadText::new();
    write!(text, "{value}").map_err(|_| ProtocolError::PayloadTooLong {
        len: PAYLOAD_CAPACITY + 1,
        capacity: PAYLOAD_CAPACITY,
    })?;
    Ok(text)
}

/// Parse payload text back into a value. No surrounding whitespace allowed.
pub fn parse_value(text: &str) -> Result<i64, ProtocolError> {
    text.parse::<i64>().map_err(|_| ProtocolError::NotANumber {
        text: text.to_string(),
    })
}
