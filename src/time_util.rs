//! Timestamp helpers shared by the capture loop and diagnostics.
//!
//! Grounded on `examples/original_source/MeteorCaptureQt/util/timeutil.cpp`:
//! the device reports capture times on a monotonic uptime clock, so the
//! pipeline is configured once at startup with the wall-clock/uptime offset
//! and adds it to every reported timestamp.

use chrono::{TimeZone, Utc};

/// `epoch_time_diff_us = wall_clock_us - uptime_us`, computed once at
/// startup and added to every device-reported uptime timestamp.
pub fn epoch_time_diff_us(wall_clock_us: i64, uptime_us: i64) -> i64 {
    wall_clock_us - uptime_us
}

/// Converts a device uptime timestamp to epoch microseconds using a
/// previously-computed offset.
pub fn to_epoch_time_us(uptime_us: i64, epoch_time_diff_us: i64) -> i64 {
    uptime_us + epoch_time_diff_us
}

/// Formats an epoch-microseconds timestamp as `YYYY-M-D--H:M:S.µs`, matching
/// the diagnostic string emitted by the original C++ implementation (no
/// zero-padding; this is a logging aid, not a sortable or parseable format).
pub fn convert_to_utc_string(epoch_time_us: i64) -> String {
    let epoch_time_s = epoch_time_us.div_euclid(1_000_000);
    let remainder_us = epoch_time_us.rem_euclid(1_000_000);

    let dt = Utc
        .timestamp_opt(epoch_time_s, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is valid"));

    format!(
        "{}-{}-{}--{}:{}:{}.{}",
        dt.format("%Y"),
        dt.format("%-m"),
        dt.format("%-d"),
        dt.format("%-H"),
        dt.format("%-M"),
        dt.format("%-S"),
        remainder_us,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_recovers_wall_clock() {
        let wall = 1_700_000_000_000_000i64;
        let uptime = 123_456_789i64;
        let diff = epoch_time_diff_us(wall, uptime);
        assert_eq!(to_epoch_time_us(uptime, diff), wall);
    }

    #[test]
    fn utc_string_contains_microsecond_remainder() {
        // 2021-01-02T03:04:05.678901Z
        let epoch_us = 1_609_556_645_000_000i64 + 678_901;
        let s = convert_to_utc_string(epoch_us);
        assert!(s.ends_with(".678901"));
        assert!(s.contains("2021-1-2--3:4:5"));
    }
}
