//! Process identity helpers.

use nix::sys::signal::kill;
use nix::unistd::{Pid, getpid};

/// Get current process ID.
pub fn get_current_pid() -> i32 {
    getpid().as_raw()
}

/// Check if process is alive using kill(pid, 0)
///
/// Async-signal-safe: only issues the `kill(2)` syscall.
pub fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }

    // Use a null signal (None) to test for process existence without sending a signal
    match kill(Pid::from_raw(pid), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}
