// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Periodic compliance sampler (C6, §4.6): a single global per-camera tick
//! that persists a compliance sample for every currently-compliant worker.
//!
//! Canonical per §9: some source variants sample per worker on independent
//! timers; this implementation uses one shared per-camera tick, the
//! resolution the spec calls for.

use std::time::{Duration, Instant};

/// Interval between compliance sample ticks.
pub const COMPLIANCE_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// A per-camera tick gate. Initialised at stream start so the first tick is
/// a full interval away, avoiding an immediate flood (§4.6).
pub struct ComplianceSampler {
    last_tick: Instant,
    interval: Duration,
}

impl ComplianceSampler {
    /// `interval` normally comes from `Tuneables::compliance_sample_interval`
    /// (tests pass a fixed `Duration` directly).
    pub fn new(started_at: Instant, interval: Duration) -> Self {
        ComplianceSampler {
            last_tick: started_at,
            interval,
        }
    }

    /// Returns whether `now` crosses a tick boundary since the last one; if
    /// so, advances the internal clock so the next call measures from here.
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last_tick) >= self.interval {
            self.last_tick = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tick_before_interval_elapses() {
        let t0 = Instant::now();
        let mut s = ComplianceSampler::new(t0, Duration::from_secs(10));
        assert!(!s.tick(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn ticks_once_interval_elapses_then_waits_again() {
        let t0 = Instant::now();
        let mut s = ComplianceSampler::new(t0, Duration::from_secs(10));
        assert!(s.tick(t0 + Duration::from_secs(10)));
        assert!(!s.tick(t0 + Duration::from_secs(15)));
        assert!(s.tick(t0 + Duration::from_secs(20)));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// P4: however often `tick` is polled, consecutive `true` results are
        /// never closer together than the configured interval.
        #[test]
        fn p4_ticks_are_at_least_interval_apart(poll_ms in prop::collection::vec(1u64..50, 1..500)) {
            let t0 = Instant::now();
            let interval = Duration::from_secs(10);
            let mut s = ComplianceSampler::new(t0, interval);
            let mut elapsed = Duration::ZERO;
            let mut last_tick: Option<Duration> = None;

            for step in poll_ms {
                elapsed += Duration::from_millis(step);
                if s.tick(t0 + elapsed) {
                    if let Some(last) = last_tick {
                        prop_assert!(elapsed - last >= interval);
                    }
                    last_tick = Some(elapsed);
                }
            }
        }
    }
}
