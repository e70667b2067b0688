//! Signal control plane.
//!
//! SIGINT and SIGTERM both stop the local loop and mark the slot
//! `Finished`. Only SIGINT is forwarded: the handler sends SIGTERM to the
//! peer whose pid is recorded in the slot. Because SIGTERM is never
//! forwarded, a forwarded signal cannot bounce back.
//!
//! Signal handlers see nothing but process-wide state, so that state lives in
//! statics owned by a single live [`ControlPlane`]. The handler only touches
//! atomics and issues `kill(2)`.

use crate::error::SignalSetupError;
use crate::platform::{get_current_pid, is_process_alive};
use crate::record::MessageRecord;
use crate::slot::{Role, SharedSlot};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, sigaction};
use nix::unistd::Pid;
use numslot::config::ForwardPolicy;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, AtomicU8, Ordering};

const HANDLED: [Signal; 2] = [Signal::SIGINT, Signal::SIGTERM];

static INSTALLED: AtomicBool = AtomicBool::new(false);
static STOP: AtomicBool = AtomicBool::new(false);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);
static RECORD: AtomicPtr<MessageRecord> = AtomicPtr::new(ptr::null_mut());
static ROLE: AtomicU8 = AtomicU8::new(Role::Consumer as u8);
static FORWARD_IF_ALIVE: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(signo: libc::c_int) {
    LAST_SIGNAL.store(signo, Ordering::SeqCst);
    STOP.store(true, Ordering::SeqCst);

    let record = RECORD.load(Ordering::SeqCst);
    if record.is_null() {
        return;
    }
    // SAFETY: the pointer is cleared before the mapping goes away
    // (see `forget_record`).
    let record = unsafe { &*record };
    record.finish();

    if signo != libc::SIGINT {
        return;
    }
    let Some(role) = Role::from_u8(ROLE.load(Ordering::SeqCst)) else {
        return;
    };
    let peer = role.peer_pid(record);
    if peer <= 0 || peer == get_current_pid() {
        return;
    }
    if FORWARD_IF_ALIVE.load(Ordering::SeqCst) && !is_process_alive(peer) {
        return;
    }
    let _ = kill(Pid::from_raw(peer), Signal::SIGTERM);
}

/// Unpublish `record` if it is the one the handler currently sees.
///
/// Called by [`SharedSlot::unmap`] so the handler never writes into a
/// released mapping.
pub(crate) fn forget_record(record: *mut MessageRecord) {
    if record.is_null() {
        return;
    }
    let _ = RECORD.compare_exchange(
        record,
        ptr::null_mut(),
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
}

/// Guard for the installed SIGINT/SIGTERM handlers.
///
/// At most one exists per process. Dropping it unpublishes the record and
/// restores the dispositions that were in place before.
pub struct ControlPlane {
    previous: Vec<(Signal, SigAction)>,
    _not_send: PhantomData<*const ()>,
}

impl ControlPlane {
    /// Install the handlers for the process playing `slot.role()`.
    ///
    /// Clears any stop request and last signal left by an earlier session.
    pub fn initialize(slot: &SharedSlot, policy: ForwardPolicy) -> Result<Self, SignalSetupError> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(SignalSetupError::AlreadyInstalled);
        }

        STOP.store(false, Ordering::SeqCst);
        LAST_SIGNAL.store(0, Ordering::SeqCst);
        ROLE.store(slot.role() as u8, Ordering::SeqCst);
        FORWARD_IF_ALIVE.store(policy == ForwardPolicy::IfAlive, Ordering::SeqCst);
        RECORD.store(slot.record_ptr(), Ordering::SeqCst);

        let mut plane = Self {
            previous: Vec::with_capacity(HANDLED.len()),
            _not_send: PhantomData,
        };

        let action = SigAction::new(
            SigHandler::Handler(handle_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in HANDLED {
            // SAFETY: the handler only uses atomics, getpid(2) and kill(2).
            match unsafe { sigaction(signal, &action) } {
                Ok(previous) => plane.previous.push((signal, previous)),
                // Drop restores whatever was already installed.
                Err(source) => return Err(SignalSetupError::Sigaction { signal, source }),
            }
        }

        tracing::debug!(
            "Signal handlers installed for {} (forward policy {:?})",
            slot.role(),
            policy
        );
        Ok(plane)
    }

    /// The flag the handlers set; loops poll it.
    pub fn stop_flag(&self) -> &'static AtomicBool {
        &STOP
    }

    /// Whether a stop was requested since [`ControlPlane::initialize`].
    pub fn stop_requested(&self) -> bool {
        STOP.load(Ordering::SeqCst)
    }

    /// Request a stop from ordinary code, as if a signal had arrived but
    /// without touching the slot or the peer.
    pub fn request_stop(&self) {
        STOP.store(true, Ordering::SeqCst);
    }

    /// The most recent SIGINT/SIGTERM delivered, if any.
    pub fn last_signal(&self) -> Option<Signal> {
        match LAST_SIGNAL.load(Ordering::SeqCst) {
            0 => None,
            raw => Signal::try_from(raw).ok(),
        }
    }

    /// Stop the handlers from touching the record. Call before unmapping.
    pub fn detach_record(&self) {
        RECORD.store(ptr::null_mut(), Ordering::SeqCst);
    }

    /// Whether the handlers still see a record.
    pub fn has_record(&self) -> bool {
        !RECORD.load(Ordering::SeqCst).is_null()
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.detach_record();
        while let Some((signal, previous)) = self.previous.pop() {
            // SAFETY: reinstalling a disposition that was valid before.
            if let Err(e) = unsafe { sigaction(signal, &previous) } {
                tracing::warn!("Restoring {} disposition: {}", signal, e);
            }
        }
        INSTALLED.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::Tag;
    use crate::segment::ShmName;
    use nix::sys::signal::raise;
    use std::sync::{Mutex, MutexGuard};

    /// Serialises tests that install handlers or raise signals.
    pub(crate) static SIGNAL_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) fn lock() -> MutexGuard<'static, ()> {
        SIGNAL_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn consumer_slot(tag: &str) -> SharedSlot {
        let name = ShmName::new(&format!("numslot_ctl_{tag}_{}", std::process::id())).unwrap();
        SharedSlot::create(&name, 0o600).unwrap()
    }

    #[test]
    fn sigterm_stops_and_finishes_without_forwarding() {
        let _guard = lock();
        let mut slot = consumer_slot("term");

        let plane = ControlPlane::initialize(&slot, ForwardPolicy::Always).unwrap();
        assert!(!plane.stop_requested());
        assert_eq!(plane.last_signal(), None);

        raise(Signal::SIGTERM).unwrap();

        assert!(plane.stop_requested());
        assert_eq!(plane.last_signal(), Some(Signal::SIGTERM));
        assert_eq!(slot.record().unwrap().tag(), Ok(Tag::Finished));

        drop(plane);
        assert!(slot.teardown().is_clean());
    }

    #[test]
    fn second_plane_is_rejected() {
        let _guard = lock();
        let mut slot = consumer_slot("twice");

        let plane = ControlPlane::initialize(&slot, ForwardPolicy::Always).unwrap();
        assert!(matches!(
            ControlPlane::initialize(&slot, ForwardPolicy::Always),
            Err(SignalSetupError::AlreadyInstalled)
        ));
        drop(plane);

        // Released on drop, and state from the old session is cleared.
        let plane = ControlPlane::initialize(&slot, ForwardPolicy::IfAlive).unwrap();
        assert!(!plane.stop_requested());
        drop(plane);
        assert!(slot.teardown().is_clean());
    }

    #[test]
    fn detached_record_is_left_alone() {
        let _guard = lock();
        let mut slot = consumer_slot("detach");

        let plane = ControlPlane::initialize(&slot, ForwardPolicy::Always).unwrap();
        assert!(plane.has_record());
        plane.detach_record();
        assert!(!plane.has_record());

        raise(Signal::SIGINT).unwrap();
        assert!(plane.stop_requested());
        assert_eq!(plane.last_signal(), Some(Signal::SIGINT));
        assert_eq!(slot.record().unwrap().tag(), Ok(Tag::Empty));

        drop(plane);
        assert!(slot.teardown().is_clean());
    }

    #[test]
    fn unmapping_unpublishes_the_record() {
        let _guard = lock();
        let mut slot = consumer_slot("unmap");

        let plane = ControlPlane::initialize(&slot, ForwardPolicy::Always).unwrap();
        assert!(plane.has_record());
        assert!(slot.unmap().unwrap());
        assert!(!plane.has_record());

        raise(Signal::SIGTERM).unwrap();
        assert!(plane.stop_requested());

        drop(plane);
        assert!(slot.teardown().is_clean());
    }

    #[test]
    fn request_stop_leaves_the_slot_alone() {
        let _guard = lock();
        let mut slot = consumer_slot("request");

        let plane = ControlPlane::initialize(&slot, ForwardPolicy::Always).unwrap();
        plane.request_stop();
        assert!(plane.stop_flag().load(Ordering::SeqCst));
        assert_eq!(plane.last_signal(), None);
        assert_eq!(slot.record().unwrap().tag(), Ok(Tag::Empty));

        drop(plane);
        assert!(slot.teardown().is_clean());
    }

    #[test]
    fn drop_restores_previous_dispositions() {
        let _guard = lock();
        let mut slot = consumer_slot("restore");

        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: SIG_IGN needs no handler code.
        let original = unsafe { sigaction(Signal::SIGINT, &ignore) }.unwrap();

        let plane = ControlPlane::initialize(&slot, ForwardPolicy::Always).unwrap();
        // SAFETY: reads back and immediately reinstalls the same action.
        let during = unsafe { sigaction(Signal::SIGINT, &ignore) }.unwrap();
        assert!(matches!(during.handler(), SigHandler::Handler(_)));
        unsafe { sigaction(Signal::SIGINT, &during) }.unwrap();
        drop(plane);

        // SAFETY: puts back whatever the test harness had.
        let after = unsafe { sigaction(Signal::SIGINT, &original) }.unwrap();
        assert_eq!(after.handler(), SigHandler::SigIgn);

        assert!(slot.teardown().is_clean());
    }
}
