//! Time and rate helpers shared by the sampler and the CLI.

use std::time::Duration;

pub const MICROS_PER_SEC: u64 = 1_000_000;
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Sampling period in microseconds for `hz`; `hz` is clamped to at least 1
/// and the result to at least 1 µs.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Same as [`period_us`] at millisecond resolution.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Saturating `Duration` to whole milliseconds.
#[inline]
pub fn as_millis_u64(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
