/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Absolute time instants on the monotonic clock.
//!
//! [`TimeSpec`] is a normalised `(seconds, nanoseconds)` pair read from
//! `CLOCK_MONOTONIC`.  Periodic tasks keep their next activation and next
//! absolute deadline as `TimeSpec`s and advance them in whole milliseconds,
//! so the activation grid never drifts: instant `n` is always
//! `first + n × period`, whatever the loop body cost.
//!
//! The arithmetic is pure.  Only [`TimeSpec::now`] and
//! [`TimeSpec::sleep_until`] touch the OS.

use std::cmp::Ordering;
use std::fmt;

// ── Constants ─────────────────────────────────────────────────────────────────

pub const NANOS_PER_SEC: i64 = 1_000_000_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const MILLIS_PER_SEC: u64 = 1_000;

// ── TimeSpec ──────────────────────────────────────────────────────────────────

/// An absolute instant on the monotonic clock.
///
/// Invariant: `0 <= nsec < 1_000_000_000`.  Every constructor and every
/// arithmetic helper keeps it, which is what makes the derived `Ord` (seconds
/// first, then nanoseconds) a correct total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    /// Build a normalised instant; `nsec` overflow is carried into `sec`.
    pub fn new(sec: i64, nsec: i64) -> Self {
        Self {
            sec: sec + nsec.div_euclid(NANOS_PER_SEC),
            nsec: nsec.rem_euclid(NANOS_PER_SEC),
        }
    }

    /// Current `CLOCK_MONOTONIC` reading.
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec; CLOCK_MONOTONIC is
        // always available on the supported targets.
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        Self::new(ts.tv_sec as i64, ts.tv_nsec as i64)
    }

    /// Total order over instants: `Greater` when `self` is later than `other`.
    pub fn compare(&self, other: &TimeSpec) -> Ordering {
        self.cmp(other)
    }

    /// Return this instant moved forward by `ms` milliseconds.
    ///
    /// Sub-second overflow is carried into the seconds field.  Because both
    /// the stored and the added nanoseconds are below one second, a single
    /// carry is always enough.
    pub fn advance_ms(self, ms: u64) -> Self {
        let whole_secs = i64::try_from(ms / MILLIS_PER_SEC).unwrap_or(i64::MAX);
        let mut sec = self.sec.saturating_add(whole_secs);
        let mut nsec = self.nsec + (ms % MILLIS_PER_SEC) as i64 * NANOS_PER_MILLI;
        if nsec >= NANOS_PER_SEC {
            nsec -= NANOS_PER_SEC;
            sec = sec.saturating_add(1);
        }
        Self { sec, nsec }
    }

    /// Signed distance `self − earlier` in whole milliseconds.
    pub fn millis_since(&self, earlier: &TimeSpec) -> i64 {
        (self.sec - earlier.sec) * 1_000 + (self.nsec - earlier.nsec) / NANOS_PER_MILLI
    }

    /// Signed distance `self − earlier` in whole microseconds.
    pub fn micros_since(&self, earlier: &TimeSpec) -> i64 {
        (self.sec - earlier.sec) * 1_000_000 + (self.nsec - earlier.nsec) / 1_000
    }

    /// Block the calling thread until the monotonic clock reaches `self`.
    ///
    /// Uses `clock_nanosleep(TIMER_ABSTIME)`, so a late wake-up in one period
    /// is never carried into the next.  Returns immediately if `self` is
    /// already in the past.  Signal interruptions resume the same absolute
    /// wait.
    #[cfg(target_os = "linux")]
    pub fn sleep_until(&self) {
        let target = libc::timespec {
            tv_sec: self.sec as libc::time_t,
            tv_nsec: self.nsec as libc::c_long,
        };
        loop {
            // SAFETY: `target` is a valid timespec; the remaining-time pointer
            // is unused for absolute sleeps and may be null.
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &target,
                    std::ptr::null_mut(),
                )
            };
            if rc != libc::EINTR {
                break;
            }
        }
    }

    /// Fallback for targets without `clock_nanosleep`: the remaining time is
    /// recomputed from the absolute target on every call, so the grid itself
    /// still does not drift.
    #[cfg(not(target_os = "linux"))]
    pub fn sleep_until(&self) {
        let remaining_us = self.micros_since(&Self::now());
        if remaining_us > 0 {
            std::thread::sleep(std::time::Duration::from_micros(remaining_us as u64));
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.sec, self.nsec)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── compare ───────────────────────────────────────────────────────────────

    #[test]
    fn compare_orders_by_seconds_first() {
        let a = TimeSpec::new(2, 0);
        let b = TimeSpec::new(1, 999_999_999);
        assert_eq!(a.compare(&b), Ordering::Greater);
        assert_eq!(b.compare(&a), Ordering::Less);
    }

    #[test]
    fn compare_falls_back_to_nanoseconds() {
        let a = TimeSpec::new(5, 10);
        let b = TimeSpec::new(5, 11);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
    }

    #[test]
    fn compare_equal_instants() {
        let a = TimeSpec::new(7, 123);
        assert_eq!(a.compare(&a), Ordering::Equal);
    }

    // ── advance_ms ────────────────────────────────────────────────────────────

    #[test]
    fn advance_by_zero_is_a_no_op() {
        let t = TimeSpec::new(42, 123_456_789);
        assert_eq!(t.advance_ms(0), t);
    }

    #[test]
    fn advance_1500ms_from_whole_second_carries_exactly() {
        let t = TimeSpec::new(10, 0);
        assert_eq!(t.advance_ms(1_500), TimeSpec::new(11, 500_000_000));
        let t = t.advance_ms(1_500);
        assert_eq!(t.sec, 11);
        assert_eq!(t.nsec, 500_000_000);
    }

    #[test]
    fn advance_carries_sub_second_overflow() {
        let t = TimeSpec::new(0, 999_000_000);
        assert_eq!(t.advance_ms(1), TimeSpec::new(1, 0));

        let t = TimeSpec::new(3, 600_000_000);
        assert_eq!(t.advance_ms(700), TimeSpec::new(4, 300_000_000));
    }

    #[test]
    fn advance_keeps_nanoseconds_normalised() {
        let mut t = TimeSpec::new(0, 999_999_999);
        for _ in 0..10_000 {
            t = t.advance_ms(333);
            assert!(t.nsec >= 0 && t.nsec < NANOS_PER_SEC, "denormalised: {t:?}");
        }
    }

    #[test]
    fn repeated_advance_matches_single_large_advance() {
        let start = TimeSpec::new(100, 250_000_000);
        let mut stepped = start;
        for _ in 0..37 {
            stepped = stepped.advance_ms(270);
        }
        assert_eq!(stepped, start.advance_ms(37 * 270));
    }

    // ── new / distances ───────────────────────────────────────────────────────

    #[test]
    fn new_normalises_overflowing_nanoseconds() {
        assert_eq!(TimeSpec::new(1, 2_500_000_000), TimeSpec::new(3, 500_000_000));
        assert_eq!(TimeSpec::new(1, -1), TimeSpec::new(0, 999_999_999));
    }

    #[test]
    fn millis_since_is_signed() {
        let a = TimeSpec::new(1, 0);
        let b = a.advance_ms(250);
        assert_eq!(b.millis_since(&a), 250);
        assert_eq!(a.millis_since(&b), -250);
        assert_eq!(b.micros_since(&a), 250_000);
    }

    // ── clock ─────────────────────────────────────────────────────────────────

    #[test]
    fn now_is_monotonic() {
        let a = TimeSpec::now();
        let b = TimeSpec::now();
        assert_ne!(a.compare(&b), Ordering::Greater);
    }

    #[test]
    fn sleep_until_reaches_the_target() {
        let target = TimeSpec::now().advance_ms(20);
        target.sleep_until();
        assert_ne!(TimeSpec::now().compare(&target), Ordering::Less);
    }

    #[test]
    fn sleep_until_past_instant_returns_immediately() {
        let before = TimeSpec::now();
        TimeSpec::new(0, 0).sleep_until();
        assert!(TimeSpec::now().millis_since(&before) < 50);
    }
}
