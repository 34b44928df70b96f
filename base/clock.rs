// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Clock interface and implementations for testability.
//!
//! Two distinct notions of time are exposed, deliberately not conflated:
//! `realtime` for human-visible timestamps (wall clock, subject to NTP
//! adjustment) and `monotonic` for state-machine timings (immune to clock
//! adjustments, used for persistence windows and cooldowns).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

/// Abstract interface to the system clocks. This is for testability.
pub trait Clocks: Send + Sync + 'static {
    /// Gets the current wall-clock time, for human-visible timestamps.
    fn realtime(&self) -> jiff::Timestamp;

    /// Gets the current time from a monotonic clock, immune to clock
    /// adjustments. Used for all state-machine timing decisions.
    fn monotonic(&self) -> Instant;

    /// Causes the current thread to sleep for the specified duration.
    fn sleep(&self, how_long: Duration);
}

#[derive(Copy, Clone, Default)]
pub struct RealClocks {}

impl Clocks for RealClocks {
    fn realtime(&self) -> jiff::Timestamp {
        jiff::Timestamp::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, how_long: Duration) {
        std::thread::sleep(how_long);
    }
}

/// Logs a warning if the guard lives "too long", using the label created by a
/// supplied function. Useful for instrumenting suspension points (frame
/// reads, detector calls, DB transactions) without cluttering call sites.
pub struct TimerGuard<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> {
    clocks: &'a C,
    label_f: Option<F>,
    start: Instant,
}

impl<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> TimerGuard<'a, C, S, F> {
    pub fn new(clocks: &'a C, label_f: F) -> Self {
        TimerGuard {
            clocks,
            label_f: Some(label_f),
            start: clocks.monotonic(),
        }
    }
}

impl<'a, C, S, F> Drop for TimerGuard<'a, C, S, F>
where
    C: Clocks + ?Sized,
    S: AsRef<str>,
    F: FnOnce() -> S + 'a,
{
    fn drop(&mut self) {
        let elapsed = self.clocks.monotonic().duration_since(self.start);
        if elapsed >= Duration::from_secs(1) {
            let label_f = self.label_f.take().unwrap();
            warn!("{} took {:?}!", label_f().as_ref(), elapsed);
        }
    }
}

/// Simulated clock for testing: advances only when told to, so property and
/// scenario tests can assert on exact persistence/cooldown/sampling timing
/// without real sleeps.
#[derive(Clone)]
pub struct SimulatedClocks(Arc<SimulatedClocksInner>);

struct SimulatedClocksInner {
    boot: jiff::Timestamp,
    elapsed: Mutex<Duration>,
}

impl SimulatedClocks {
    pub fn new(boot: jiff::Timestamp) -> Self {
        SimulatedClocks(Arc::new(SimulatedClocksInner {
            boot,
            elapsed: Mutex::new(Duration::ZERO),
        }))
    }
}

impl Clocks for SimulatedClocks {
    fn realtime(&self) -> jiff::Timestamp {
        let elapsed = *self.0.elapsed.lock().unwrap();
        let span = jiff::Span::try_from(elapsed).expect("simulated elapsed time fits in a Span");
        self.0
            .boot
            .checked_add(span)
            .expect("simulated boot + elapsed should not overflow")
    }

    fn monotonic(&self) -> Instant {
        // `Instant` has no "epoch" constructor, so we anchor to a single
        // process-lifetime instant and add the simulated elapsed time.
        static ANCHOR: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let anchor = *ANCHOR.get_or_init(Instant::now);
        anchor + *self.0.elapsed.lock().unwrap()
    }

    /// Advances the clock by the specified amount without actually sleeping.
    fn sleep(&self, how_long: Duration) {
        let mut l = self.0.elapsed.lock().unwrap();
        *l += how_long;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_clock_advances_on_sleep() {
        let c = SimulatedClocks::new(jiff::Timestamp::now());
        let m0 = c.monotonic();
        c.sleep(Duration::from_secs(5));
        let m1 = c.monotonic();
        assert_eq!(m1.duration_since(m0), Duration::from_secs(5));
    }

    #[test]
    fn real_clocks_monotonic_does_not_go_backwards() {
        let c = RealClocks {};
        let a = c.monotonic();
        let b = c.monotonic();
        assert!(b >= a);
    }
}
