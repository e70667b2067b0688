//! Session events and sinks.
//!
//! The core never prints. Every observable step of a session is handed to an
//! [`EventSink`] supplied by the host; [`TracingSink`] renders them as log
//! lines, a `Vec<ExchangeEvent>` records them for tests.

use crate::error::{ProtocolError, ResourceError};
use crate::slot::Role;
use nix::sys::signal::Signal;
use std::fmt;

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A signal (or the host) asked this process to stop.
    StopRequested,
    /// The peer marked the slot finished.
    PeerFinished,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopRequested => f.write_str("stop requested"),
            ExitReason::PeerFinished => f.write_str("peer finished"),
        }
    }
}

/// Something that happened during a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    /// The object was opened.
    Opened {
        /// Normalised object name.
        name: String,
        /// Descriptor number.
        fd: i32,
    },
    /// The consumer sized the object.
    Sized {
        /// New size in bytes.
        bytes: usize,
    },
    /// The slot is mapped and our pid registered.
    Attached {
        /// Our role.
        role: Role,
        /// Our pid.
        pid: i32,
    },
    /// The producer could not attach yet and will try again.
    AttachRetry {
        /// Failed attempt number, starting at 1.
        attempt: u32,
        /// Why the attempt failed.
        error: ResourceError,
    },
    /// The producer loop started.
    Generating {
        /// Lower bound, inclusive.
        min: i64,
        /// Upper bound, inclusive.
        max: i64,
    },
    /// The consumer loop started.
    Waiting,
    /// A value was published.
    Sent {
        /// The value.
        value: i64,
    },
    /// A value was drained.
    Received {
        /// The payload text as read.
        text: String,
        /// Parsed value.
        value: i64,
    },
    /// The slot was found `Finished`.
    PeerFinished,
    /// The stop flag was observed.
    StopRequested {
        /// Last signal delivered, if any.
        signal: Option<Signal>,
    },
    /// The tag holds a value outside the state machine; the cycle was skipped.
    ProtocolViolation {
        /// Details.
        error: ProtocolError,
    },
    /// A payload could not be read or parsed and was dropped.
    MalformedPayload {
        /// Details.
        error: ProtocolError,
    },
    /// A teardown step failed; the remaining steps still ran.
    TeardownFailed {
        /// Details.
        error: ResourceError,
    },
    /// The consumer removed the object name.
    Removed {
        /// Normalised object name.
        name: String,
    },
    /// The session is over.
    Exited {
        /// Why the loop ended.
        reason: ExitReason,
    },
}

/// Receives session events.
pub trait EventSink {
    /// Handle one event.
    fn on_event(&mut self, event: &ExchangeEvent);
}

impl EventSink for Vec<ExchangeEvent> {
    fn on_event(&mut self, event: &ExchangeEvent) {
        self.push(event.clone());
    }
}

/// Discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: &ExchangeEvent) {}
}

/// Renders events through `tracing`.
pub struct TracingSink {
    role: Role,
}

impl TracingSink {
    /// Sink for a process playing `role`.
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl EventSink for TracingSink {
    fn on_event(&mut self, event: &ExchangeEvent) {
        let role = self.role;
        match event {
            ExchangeEvent::Opened { name, fd } => {
                tracing::info!(%role, "shared memory {} opened, fd = {}", name, fd);
            }
            ExchangeEvent::Sized { bytes } => {
                tracing::info!(%role, "shared memory size set to {} bytes", bytes);
            }
            ExchangeEvent::Attached { pid, .. } => {
                tracing::info!(%role, "attached, pid = {}", pid);
            }
            ExchangeEvent::AttachRetry { attempt, error } => {
                tracing::warn!(%role, "attach attempt {} failed: {}", attempt, error);
            }
            ExchangeEvent::Generating { min, max } => {
                tracing::info!(%role, "generating numbers from {} to {}", min, max);
            }
            ExchangeEvent::Waiting => {
                tracing::info!(%role, "waiting for numbers");
            }
            ExchangeEvent::Sent { value } => {
                tracing::info!(%role, "sent number = {}", value);
            }
            ExchangeEvent::Received { value, .. } => {
                tracing::info!(%role, "received number = {}", value);
            }
            ExchangeEvent::PeerFinished => {
                tracing::info!(%role, "got FINISH message");
            }
            ExchangeEvent::StopRequested { signal } => match signal {
                Some(signal) => tracing::info!(%role, "stop requested by {}", signal),
                None => tracing::info!(%role, "stop requested"),
            },
            ExchangeEvent::ProtocolViolation { error } => {
                tracing::warn!(%role, "protocol violation: {}", error);
            }
            ExchangeEvent::MalformedPayload { error } => {
                tracing::warn!(%role, "dropping malformed payload: {}", error);
            }
            ExchangeEvent::TeardownFailed { error } => {
                tracing::error!(%role, "teardown: {}", error);
            }
            ExchangeEvent::Removed { name } => {
                tracing::info!(%role, "shared memory segment {} removed", name);
            }
            ExchangeEvent::Exited { reason } => {
                tracing::info!(%role, "exiting: {}", reason);
            }
        }
    }
}
