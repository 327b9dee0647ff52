//! Windows FILETIME conversion.
//!
//! Entry timestamps are stored as FILETIME values: 100-nanosecond ticks
//! since 1601-01-01 UTC, split over two 32-bit words.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Ticks between 1601-01-01 and the Unix epoch.
const UNIX_EPOCH_TICKS: u64 = 116_444_736_000_000_000;

/// Ticks per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

/// Convert a `SystemTime` to FILETIME ticks.
///
/// Times before 1601 clamp to zero.
pub fn from_system_time(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH_TICKS.saturating_add(duration_ticks(since)),
        Err(err) => UNIX_EPOCH_TICKS.saturating_sub(duration_ticks(err.duration())),
    }
}

/// Convert FILETIME ticks to a `SystemTime`.
pub fn to_system_time(ticks: u64) -> SystemTime {
    if ticks >= UNIX_EPOCH_TICKS {
        UNIX_EPOCH + ticks_duration(ticks - UNIX_EPOCH_TICKS)
    } else {
        UNIX_EPOCH - ticks_duration(UNIX_EPOCH_TICKS - ticks)
    }
}

/// Split ticks into the `(low, high)` word pair stored on disk.
#[inline]
pub const fn split(ticks: u64) -> (u32, u32) {
    (ticks as u32, (ticks >> 32) as u32)
}

/// Join a `(low, high)` word pair into ticks.
#[inline]
pub const fn join(low: u32, high: u32) -> u64 {
    (low as u64) | ((high as u64) << 32)
}

fn duration_ticks(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(u64::from(duration.subsec_nanos() / 100))
}

fn ticks_duration(ticks: u64) -> Duration {
    Duration::new(
        ticks / TICKS_PER_SECOND,
        ((ticks % TICKS_PER_SECOND) * 100) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        assert_eq!(from_system_time(UNIX_EPOCH), UNIX_EPOCH_TICKS);
        assert_eq!(to_system_time(UNIX_EPOCH_TICKS), UNIX_EPOCH);
    }

    #[test]
    fn test_conversion_keeps_tick_precision() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_700);
        assert_eq!(to_system_time(from_system_time(time)), time);
    }

    #[test]
    fn test_split_join() {
        let ticks = 0x01D9_ABCD_1234_5678;
        let (low, high) = split(ticks);
        assert_eq!(low, 0x1234_5678);
        assert_eq!(high, 0x01D9_ABCD);
        assert_eq!(join(low, high), ticks);
    }
}
