//! # numslot shared slot exchange
//!
//! Two cooperating processes pass integers through a single-slot record in a
//! named POSIX shared memory object. The consumer ("server") creates the
//! object, drains values and removes the object when it leaves. The producer
//! ("client") attaches to it and publishes a random value whenever the slot
//! is free.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────────┐    ┌─────────────────┐
//! │   Producer      │    │  /posix-shar-object  │    │   Consumer      │
//! │                 │    │                      │    │                 │
//! │ producer_step   ├───►│ tag | len | payload  ├───►│ consumer_step   │
//! │                 │    │ producer | consumer  │    │                 │
//! └────────┬────────┘    └──────────────────────┘    └────────┬────────┘
//!          │                                                  │
//!          │            SIGINT handler sends SIGTERM          │
//!          └───────────────────◄──────────────►───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`record`] - Record layout, tag state machine, payload codec
//! - [`segment`] - One-syscall wrappers over the shared memory object
//! - [`slot`] - Role-aware create/attach and idempotent teardown
//! - [`control`] - SIGINT/SIGTERM handlers and the stop flag
//! - [`exchange`] - Step functions and the poll loop
//! - [`events`] - Session events and sinks
//! - [`runner`] - [`run`], one complete session
//!
//! ## Usage
//!
//! ```rust,no_run
//! use numslot::config::ExchangeConfig;
//! use numslot_shm::{Role, TracingSink, run};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExchangeConfig::default();
//! let mut sink = TracingSink::new(Role::Consumer);
//! let summary = run(Role::Consumer, &config, &mut sink)?;
//! println!("received {} values ({})", summary.values, summary.exit_reason);
//! # Ok(())
//! # }
//! ```
//!
//! ## Signal Handling
//!
//! Both signals stop the local loop and mark the slot `Finished`. Only
//! SIGINT is forwarded, as SIGTERM, to the peer pid stored in the record, so
//! an interrupt on either side shuts down both and nothing ping-pongs.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod control;
pub mod error;
pub mod events;
pub mod exchange;
pub mod platform;
pub mod record;
pub mod runner;
pub mod segment;
pub mod slot;

pub use control::ControlPlane;
pub use error::{ExchangeError, ProtocolError, ResourceError, ResourceResult, SignalSetupError};
pub use events::{EventSink, ExchangeEvent, ExitReason, NullSink, TracingSink};
pub use exchange::{StepOutcome, ValueRange, consumer_step, producer_step};
pub use record::{MessageRecord, RECORD_SIZE, Tag};
pub use runner::{ExchangeSummary, run};
pub use segment::ShmName;
pub use slot::{Role, SharedSlot, TeardownReport};

use numslot::config::LogLevel;

/// Install the global tracing subscriber for a host process.
///
/// `RUST_LOG` directives are honoured on top of `level`; `verbose` raises
/// the level to DEBUG and `json` switches to JSON lines. A second call is a
/// no-op.
pub fn init_tracing(level: LogLevel, verbose: bool, json: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let directive = if verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
