//! Protocol constants and configuration defaults.
//!
//! Single source of truth for the slot geometry and the defaults both
//! processes fall back to. Imported by all crates.

/// Maximum number of payload bytes the shared record can hold.
pub const PAYLOAD_CAPACITY: usize = 120;

/// Well-known name of the shared memory object (without the leading `/`).
pub const DEFAULT_SHM_NAME: &str = "posix-shar-object";

/// Default permission bits of the shared memory object (world read/write).
pub const DEFAULT_PERMISSIONS: u32 = 0o666;

/// Default producer poll interval in milliseconds.
pub const DEFAULT_PRODUCER_INTERVAL_MS: u64 = 500;

/// Default consumer poll interval in milliseconds.
pub const DEFAULT_CONSUMER_INTERVAL_MS: u64 = 100;

/// Default lower bound of generated values (inclusive).
pub const DEFAULT_VALUE_MIN: i64 = 0;

/// Default upper bound of generated values (inclusive).
pub const DEFAULT_VALUE_MAX: i64 = 999;

/// Default time the producer keeps retrying attachment before giving up.
pub const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 5000;

/// Longest object name accepted by `shm_open` (NAME_MAX).
pub const SHM_NAME_MAX: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        assert!(DEFAULT_VALUE_MIN <= DEFAULT_VALUE_MAX);
        assert!(DEFAULT_CONSUMER_INTERVAL_MS < DEFAULT_PRODUCER_INTERVAL_MS);
        assert!(DEFAULT_PERMISSIONS <= 0o777);
        assert!(!DEFAULT_SHM_NAME.contains('/'));
    }

    #[test]
    fn any_i64_fits_the_payload() {
        assert!(i64::MIN.to_string().len() <= PAYLOAD_CAPACITY);
    }
}
