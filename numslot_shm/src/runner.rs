//! One complete session for either role.
//!
//! Setup errors are fatal and returned. Once the loop has run, teardown
//! failures are only collected into the [`ExchangeSummary`].

use crate::control::ControlPlane;
use crate::error::{ExchangeError, ResourceError, ShmOp};
use crate::events::{EventSink, ExchangeEvent, ExitReason};
use crate::exchange::{LoopReport, ValueRange, run_consumer_loop, run_producer_loop};
use crate::platform::get_current_pid;
use crate::record::RECORD_SIZE;
use crate::segment::ShmName;
use crate::slot::{Role, SharedSlot};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use numslot::config::{ConfigError, ExchangeConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Instant;

/// Result of a session that got past setup.
#[derive(Debug)]
pub struct ExchangeSummary {
    /// Role played.
    pub role: Role,
    /// Loop cycles executed.
    pub cycles: u64,
    /// Values sent (producer) or received (consumer).
    pub values: u64,
    /// Why the loop ended.
    pub exit_reason: ExitReason,
    /// Last SIGINT/SIGTERM delivered during the session.
    pub last_signal: Option<Signal>,
    /// Teardown steps that failed.
    pub teardown_errors: Vec<ResourceError>,
}

impl ExchangeSummary {
    /// True when every teardown step succeeded.
    pub fn is_clean(&self) -> bool {
        self.teardown_errors.is_empty()
    }
}

/// Run one session as `role` until a signal or the peer ends it.
///
/// The handlers stay installed until this returns, so a signal during
/// teardown only sets the stop flag again.
pub fn run(
    role: Role,
    config: &ExchangeConfig,
    sink: &mut dyn EventSink,
) -> Result<ExchangeSummary, ExchangeError> {
    config.validate()?;
    let name = ShmName::new(&config.shm_name)?;
    let range = ValueRange::new(config.value_min, config.value_max).ok_or_else(|| {
        ConfigError::ValidationError("value_min must not exceed value_max".to_string())
    })?;

    let mut slot = open_slot(role, &name, config, sink)?;
    sink.on_event(&ExchangeEvent::Attached {
        role,
        pid: get_current_pid(),
    });

    let control = match ControlPlane::initialize(&slot, config.forward_policy) {
        Ok(control) => control,
        Err(e) => {
            report_teardown(&mut slot, sink);
            return Err(e.into());
        }
    };

    let Some(record) = slot.record() else {
        return Err(ResourceError::Closed {
            name: name.to_string(),
        }
        .into());
    };

    let report: LoopReport = match role {
        Role::Producer => {
            sink.on_event(&ExchangeEvent::Generating {
                min: range.min(),
                max: range.max(),
            });
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            run_producer_loop(
                record,
                &range,
                &mut rng,
                config.producer_interval(),
                control.stop_flag(),
                sink,
            )
        }
        Role::Consumer => {
            sink.on_event(&ExchangeEvent::Waiting);
            run_consumer_loop(record, config.consumer_interval(), control.stop_flag(), sink)
        }
    };

    let last_signal = control.last_signal();
    if report.exit_reason == ExitReason::StopRequested {
        sink.on_event(&ExchangeEvent::StopRequested {
            signal: last_signal,
        });
    }

    control.detach_record();
    let teardown_errors = report_teardown(&mut slot, sink);

    sink.on_event(&ExchangeEvent::Exited {
        reason: report.exit_reason,
    });

    Ok(ExchangeSummary {
        role,
        cycles: report.cycles,
        values: report.values,
        exit_reason: report.exit_reason,
        last_signal,
        teardown_errors,
    })
}

fn open_slot(
    role: Role,
    name: &ShmName,
    config: &ExchangeConfig,
    sink: &mut dyn EventSink,
) -> Result<SharedSlot, ResourceError> {
    let slot = match role {
        Role::Consumer => SharedSlot::create(name, config.permissions)?,
        Role::Producer => attach_with_retry(name, config, sink)?,
    };

    sink.on_event(&ExchangeEvent::Opened {
        name: name.to_string(),
        fd: slot.raw_fd().unwrap_or(-1),
    });
    if role == Role::Consumer {
        sink.on_event(&ExchangeEvent::Sized { bytes: RECORD_SIZE });
    }
    Ok(slot)
}

/// The consumer has not created or sized the object yet.
fn not_ready(error: &ResourceError) -> bool {
    match error {
        ResourceError::Undersized { .. } => true,
        ResourceError::Os {
            op: ShmOp::Open,
            source,
            ..
        } => *source == Errno::ENOENT,
        _ => false,
    }
}

/// Attach, retrying while the consumer has not set the object up yet.
fn attach_with_retry(
    name: &ShmName,
    config: &ExchangeConfig,
    sink: &mut dyn EventSink,
) -> Result<SharedSlot, ResourceError> {
    let deadline = Instant::now() + config.attach_timeout();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match SharedSlot::attach(name) {
            Ok(slot) => return Ok(slot),
            Err(error) if not_ready(&error) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(error);
                }
                sink.on_event(&ExchangeEvent::AttachRetry { attempt, error });
                std::thread::sleep(config.producer_interval().min(deadline - now));
            }
            Err(error) => return Err(error),
        }
    }
}

fn report_teardown(slot: &mut SharedSlot, sink: &mut dyn EventSink) -> Vec<ResourceError> {
    let report = slot.teardown();
    for error in &report.errors {
        sink.on_event(&ExchangeEvent::TeardownFailed {
            error: error.clone(),
        });
    }
    if report.removed {
        sink.on_event(&ExchangeEvent::Removed {
            name: slot.name().to_string(),
        });
    }
    report.errors
}
