//! Producer and consumer loops.
//!
//! Each role is a single step function driven by a common poll loop. The
//! step functions do one transition of the slot and never sleep, so every
//! transition can be tested without timing.

use crate::events::{EventSink, ExchangeEvent, ExitReason};
use crate::record::{MessageRecord, Tag, parse_value, render_value};
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do this cycle.
    Idle,
    /// Producer published this value.
    Sent(i64),
    /// Consumer drained this value.
    Received(i64),
    /// Consumer drained a malformed payload.
    Dropped,
    /// The slot is `Finished`.
    PeerFinished,
    /// The tag was unreadable; nothing was changed.
    Skipped,
}

/// Non-empty inclusive range of generated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRange(RangeInclusive<i64>);

impl ValueRange {
    /// `None` when `min > max`.
    pub fn new(min: i64, max: i64) -> Option<Self> {
        (min <= max).then_some(Self(min..=max))
    }

    /// Lower bound.
    pub fn min(&self) -> i64 {
        *self.0.start()
    }

    /// Upper bound.
    pub fn max(&self) -> i64 {
        *self.0.end()
    }

    /// Whether `value` lies in the range.
    pub fn contains(&self, value: i64) -> bool {
        self.0.contains(&value)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        rng.gen_range(self.0.clone())
    }
}

/// One producer cycle.
///
/// On `Empty` a value is drawn from `range`, written, and handed over with
/// `HasValue`. A `HasValue` slot means the consumer has not drained yet, so
/// nothing is generated.
pub fn producer_step<R: Rng + ?Sized>(
    record: &MessageRecord,
    range: &ValueRange,
    rng: &mut R,
    sink: &mut dyn EventSink,
) -> StepOutcome {
    match record.tag() {
        Err(error) => {
            sink.on_event(&ExchangeEvent::ProtocolViolation { error });
            StepOutcome::Skipped
        }
        Ok(Tag::HasValue) => StepOutcome::Idle,
        Ok(Tag::Finished) => {
            sink.on_event(&ExchangeEvent::PeerFinished);
            StepOutcome::PeerFinished
        }
        Ok(Tag::Empty) => {
            let value = range.sample(rng);
            let written = render_value(value).and_then(|text| record.write_payload(&text));
            if let Err(error) = written {
                sink.on_event(&ExchangeEvent::ProtocolViolation { error });
                return StepOutcome::Skipped;
            }

            if record.transition(Tag::Empty, Tag::HasValue).is_err() {
                // Only `Finished` can replace `Empty` under our feet.
                sink.on_event(&ExchangeEvent::PeerFinished);
                return StepOutcome::PeerFinished;
            }
            sink.on_event(&ExchangeEvent::Sent { value });
            StepOutcome::Sent(value)
        }
    }
}

/// One consumer cycle.
///
/// On `HasValue` the payload is read, reported, and the slot handed back
/// with `Empty`. A malformed payload is reported and dropped the same way.
pub fn consumer_step(record: &MessageRecord, sink: &mut dyn EventSink) -> StepOutcome {
    match record.tag() {
        Err(error) => {
            sink.on_event(&ExchangeEvent::ProtocolViolation { error });
            StepOutcome::Skipped
        }
        Ok(Tag::Empty) => StepOutcome::Idle,
        Ok(Tag::Finished) => {
            sink.on_event(&ExchangeEvent::PeerFinished);
            StepOutcome::PeerFinished
        }
        Ok(Tag::HasValue) => {
            let drained = record
                .read_payload()
                .and_then(|text| parse_value(&text).map(|value| (text, value)));

            let outcome = match drained {
                Ok((text, value)) => {
                    sink.on_event(&ExchangeEvent::Received {
                        text: text.as_str().to_string(),
                        value,
                    });
                    StepOutcome::Received(value)
                }
                Err(error) => {
                    sink.on_event(&ExchangeEvent::MalformedPayload { error });
                    StepOutcome::Dropped
                }
            };

            // Fails only if the slot was finished meanwhile; the next cycle
            // sees that.
            let _ = record.transition(Tag::HasValue, Tag::Empty);
            outcome
        }
    }
}

/// Summary of one loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    /// Steps executed.
    pub cycles: u64,
    /// Values sent or received.
    pub values: u64,
    /// Why the loop ended.
    pub exit_reason: ExitReason,
}

/// Poll `step` every `interval` until `stop` is set or the slot is finished,
/// then mark the slot `Finished`.
pub fn poll_loop<F>(
    record: &MessageRecord,
    interval: Duration,
    stop: &AtomicBool,
    sink: &mut dyn EventSink,
    mut step: F,
) -> LoopReport
where
    F: FnMut(&MessageRecord, &mut dyn EventSink) -> StepOutcome,
{
    let mut cycles = 0u64;
    let mut values = 0u64;

    while !stop.load(Ordering::SeqCst) {
        cycles += 1;
        match step(record, &mut *sink) {
            StepOutcome::PeerFinished => break,
            StepOutcome::Sent(_) | StepOutcome::Received(_) => values += 1,
            StepOutcome::Idle | StepOutcome::Dropped | StepOutcome::Skipped => {}
        }
        std::thread::sleep(interval);
    }

    record.finish();

    // Our own handler also finishes the slot, so the stop flag decides.
    let exit_reason = if stop.load(Ordering::SeqCst) {
        ExitReason::StopRequested
    } else {
        ExitReason::PeerFinished
    };
    tracing::debug!(
        "Loop ended after {} cycles, {} values: {}",
        cycles,
        values,
        exit_reason
    );

    LoopReport {
        cycles,
        values,
        exit_reason,
    }
}

/// Producer loop: publish a value whenever the slot is free.
pub fn run_producer_loop<R: Rng + ?Sized>(
    record: &MessageRecord,
    range: &ValueRange,
    rng: &mut R,
    interval: Duration,
    stop: &AtomicBool,
    sink: &mut dyn EventSink,
) -> LoopReport {
    poll_loop(record, interval, stop, sink, |record, sink| {
        producer_step(record, range, rng, sink)
    })
}

/// Consumer loop: drain the slot whenever it holds a value.
pub fn run_consumer_loop(
    record: &MessageRecord,
    interval: Duration,
    stop: &AtomicBool,
    sink: &mut dyn EventSink,
) -> LoopReport {
    poll_loop(record, interval, stop, sink, consumer_step)
}
