//! Unix-time sampling helpers.
//!
//! The recognized time unit throughout the system is integer seconds; only
//! settle-time arithmetic (and the revisit deadlines derived from it) is
//! fractional.

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time with sub-second precision.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Current unix time truncated to whole seconds.
pub fn unix_now_secs() -> i64 {
    unix_now() as i64
}

/// Modification time of a stat result, truncated to whole seconds.
pub fn mtime_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_recent() {
        let now = unix_now();
        // Sometime after 2020 and before 2100.
        assert!(now > 1_577_836_800.0);
        assert!(now < 4_102_444_800.0);
    }

    #[test]
    fn test_secs_truncates() {
        let secs = unix_now_secs();
        let now = unix_now();
        assert!((now - secs as f64) < 2.0);
    }
}
