//! Cross-process value handoff.
//!
//! Uses `fork()` so producer and consumer map the object from different
//! processes:
//! - Consumer creates the object in the parent
//! - Producer attaches from the child and publishes a seeded sequence
//! - Parent checks every value arrives once and in order.

use numslot_shm::exchange::{StepOutcome, ValueRange, consumer_step, producer_step};
use numslot_shm::segment;
use numslot_shm::{NullSink, SharedSlot, ShmName, Tag};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

const SEED: u64 = 0xC0FFEE;
const COUNT: usize = 200;

/// Producer side of the child. Returns the exit code.
fn produce(name: &ShmName) -> i32 {
    let Ok(mut slot) = SharedSlot::attach(name) else {
        return 10;
    };
    let Some(record) = slot.record() else {
        return 11;
    };
    let Some(range) = ValueRange::new(0, 999) else {
        return 12;
    };

    let mut rng = StdRng::seed_from_u64(SEED);
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut sent = 0;
    while sent < COUNT {
        if Instant::now() > deadline {
            return 13;
        }
        match producer_step(record, &range, &mut rng, &mut NullSink) {
            StepOutcome::Sent(_) => sent += 1,
            StepOutcome::Idle => std::thread::yield_now(),
            _ => return 14,
        }
    }

    // Wait for the last value to be drained, then end the exchange.
    while record.tag() == Ok(Tag::HasValue) {
        if Instant::now() > deadline {
            return 15;
        }
        std::thread::yield_now();
    }
    record.finish();

    if slot.teardown().is_clean() { 0 } else { 16 }
}

/// Test: seeded values cross the process boundary without loss or duplication.
///
/// 1. Parent creates the consumer slot.
/// 2. Child attaches and publishes `COUNT` values, then finishes the slot.
/// 3. Parent drains until finished and compares with the seeded sequence.
#[test]
fn cross_process_values_arrive_once_in_order() {
    let name = ShmName::new(&format!("numslot_handoff_{}", std::process::id())).unwrap();
    let _ = segment::remove(&name);
    let mut slot = SharedSlot::create(&name, 0o600).unwrap();

    // Safety: fork() is unsafe but this is a controlled test environment.
    let pid = unsafe { libc::fork() };

    if pid == 0 {
        // ── CHILD PROCESS (producer) ──
        let code = produce(&name);
        unsafe { libc::_exit(code) };
    }

    // ── PARENT PROCESS (consumer) ──
    assert!(pid > 0, "fork failed");

    let record = slot.record().unwrap();
    let deadline = Instant::now() + Duration::from_secs(15);
    let mut received = Vec::with_capacity(COUNT);
    loop {
        assert!(Instant::now() < deadline, "timeout waiting for producer");
        match consumer_step(record, &mut NullSink) {
            StepOutcome::Received(value) => received.push(value),
            StepOutcome::PeerFinished => break,
            StepOutcome::Idle => std::thread::yield_now(),
            other => panic!("unexpected step outcome {other:?}"),
        }
    }

    let mut status: libc::c_int = 0;
    unsafe {
        libc::waitpid(pid, &mut status, 0);
    }
    assert!(libc::WIFEXITED(status), "child did not exit normally");
    assert_eq!(libc::WEXITSTATUS(status), 0, "child reported failure");

    let mut rng = StdRng::seed_from_u64(SEED);
    let expected: Vec<i64> = (0..COUNT).map(|_| rng.gen_range(0..=999i64)).collect();
    assert_eq!(received, expected);

    let report = slot.teardown();
    assert!(report.is_clean());
    assert!(report.removed);
}
