// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Per-worker violation state machine (C5, §4.5): decides when a sustained
//! violation becomes a persisted event, respecting a cooldown between
//! events for the same `(camera, worker)`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base::Mutex;

use crate::compliance::Classification;

/// Default minimum continuous duration a violation must be observed before
/// it is persisted, used where no `Tuneables::violation_persistence` is
/// available (tests).
pub const VIOLATION_PERSISTENCE: Duration = Duration::from_secs(5);

/// Default minimum interval between two persisted violation events for the
/// same key, used where no `Tuneables::violation_cooldown` is available
/// (tests).
pub const VIOLATION_COOLDOWN: Duration = Duration::from_secs(5);

/// Default threshold for the stale sweep (§4.10 step 4), used where no
/// `Tuneables::stale_threshold` is available (tests).
pub const STALE_THRESHOLD: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, Default)]
struct Timers {
    violation_started_at: Option<Instant>,
    last_violation_saved_at: Option<Instant>,
    last_seen_at: Option<Instant>,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct WorkerKey {
    pub camera_id: u64,
    pub worker_id: i64,
}

/// What to do in response to a frame's classification for one worker.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Decision {
    /// Emit a violation event now: capture snapshot, persist, broadcast.
    Emit,
    /// No action this frame.
    Suppress,
}

/// Global per-`(camera, worker)` timer table (§3, §5: "may be read/written
/// by multiple camera tasks... protect with a single mutex or shard by
/// camera id"). Camera identity is hashed to a `u64` by the caller so this
/// table has no lifetime tie to the `ppe-db` camera string ids.
pub struct ViolationTracker {
    timers: Mutex<HashMap<WorkerKey, Timers>>,
    persistence: Duration,
    cooldown: Duration,
    stale_threshold: Duration,
}

impl Default for ViolationTracker {
    fn default() -> Self {
        ViolationTracker::new(VIOLATION_PERSISTENCE, VIOLATION_COOLDOWN, STALE_THRESHOLD)
    }
}

impl ViolationTracker {
    pub fn new(persistence: Duration, cooldown: Duration, stale_threshold: Duration) -> Self {
        ViolationTracker {
            timers: Mutex::new(HashMap::new()),
            persistence,
            cooldown,
            stale_threshold,
        }
    }

    /// Applies one frame's classification for `key` at time `now`, returning
    /// whether a violation event should be emitted (§4.5 steps 1-4).
    pub fn observe(&self, key: WorkerKey, classification: Classification, now: Instant) -> Decision {
        let mut timers = self.timers.lock();
        let t = timers.entry(key).or_default();
        t.last_seen_at = Some(now);

        match classification {
            Classification::Compliant | Classification::Unknown => {
                t.violation_started_at = None;
                Decision::Suppress
            }
            Classification::Violation(_) => {
                let started_at = *t.violation_started_at.get_or_insert(now);
                if now.duration_since(started_at) < self.persistence {
                    return Decision::Suppress;
                }
                if let Some(saved) = t.last_violation_saved_at {
                    if now.duration_since(saved) < self.cooldown {
                        return Decision::Suppress;
                    }
                }
                t.last_violation_saved_at = Some(now);
                Decision::Emit
            }
        }
    }

    /// Removes every key belonging to `camera_id` (§4.10 teardown, §9
    /// "cooldown reset on teardown").
    pub fn clear_camera(&self, camera_id: u64) {
        self.timers.lock().retain(|k, _| k.camera_id != camera_id);
    }

    /// Periodic sweep: purge keys not seen for longer than `stale_threshold`
    /// (§3 "entries purged by periodic sweep").
    pub fn sweep(&self, now: Instant) {
        let stale_threshold = self.stale_threshold;
        self.timers
            .lock()
            .retain(|_, t| t.last_seen_at.map_or(false, |seen| now.duration_since(seen) <= stale_threshold));
    }

    pub fn contains_camera(&self, camera_id: u64) -> bool {
        self.timers.lock().keys().any(|k| k.camera_id == camera_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::ViolationKind;

    fn key() -> WorkerKey {
        WorkerKey {
            camera_id: 1,
            worker_id: 7,
        }
    }

    #[test]
    fn first_violation_frame_emits_nothing() {
        let tracker = ViolationTracker::default();
        let now = Instant::now();
        let d = tracker.observe(
            key(),
            Classification::Violation(ViolationKind::MissingHardhat),
            now,
        );
        assert_eq!(d, Decision::Suppress);
    }

    #[test]
    fn sustained_violation_past_persistence_emits_once() {
        let tracker = ViolationTracker::default();
        let t0 = Instant::now();
        tracker.observe(key(), Classification::Violation(ViolationKind::MissingBoth), t0);
        let t1 = t0 + Duration::from_secs(5);
        let d = tracker.observe(key(), Classification::Violation(ViolationKind::MissingBoth), t1);
        assert_eq!(d, Decision::Emit);

        // Immediately re-observing within the cooldown suppresses.
        let t2 = t1 + Duration::from_secs(1);
        let d2 = tracker.observe(key(), Classification::Violation(ViolationKind::MissingBoth), t2);
        assert_eq!(d2, Decision::Suppress);

        // After the cooldown elapses, a new sustained violation (already
        // past persistence since violation_started_at was never cleared)
        // emits again.
        let t3 = t1 + Duration::from_secs(5);
        let d3 = tracker.observe(key(), Classification::Violation(ViolationKind::MissingBoth), t3);
        assert_eq!(d3, Decision::Emit);
    }

    #[test]
    fn compliance_clears_violation_start_but_not_last_saved() {
        let tracker = ViolationTracker::default();
        let t0 = Instant::now();
        tracker.observe(key(), Classification::Violation(ViolationKind::MissingHardhat), t0);
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(
            tracker.observe(key(), Classification::Violation(ViolationKind::MissingHardhat), t1),
            Decision::Emit
        );

        let t2 = t1 + Duration::from_secs(1);
        tracker.observe(key(), Classification::Compliant, t2);

        // Compliant cleared violation_started_at, so a fresh violation
        // immediately after must wait out persistence again before it can
        // even be considered against the cooldown.
        let t3 = t2 + Duration::from_millis(500);
        let d = tracker.observe(key(), Classification::Violation(ViolationKind::MissingHardhat), t3);
        assert_eq!(d, Decision::Suppress);
    }

    #[test]
    fn clear_camera_removes_only_that_cameras_keys() {
        let tracker = ViolationTracker::default();
        let now = Instant::now();
        tracker.observe(key(), Classification::Violation(ViolationKind::MissingHardhat), now);
        tracker.observe(
            WorkerKey {
                camera_id: 2,
                worker_id: 1,
            },
            Classification::Violation(ViolationKind::MissingHardhat),
            now,
        );
        tracker.clear_camera(1);
        assert!(!tracker.contains_camera(1));
        assert!(tracker.contains_camera(2));
    }

    #[test]
    fn sweep_purges_entries_older_than_stale_threshold() {
        let tracker = ViolationTracker::default();
        let now = Instant::now();
        tracker.observe(key(), Classification::Compliant, now);
        tracker.sweep(now + STALE_THRESHOLD + Duration::from_secs(1));
        assert!(!tracker.contains_camera(1));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use db::ViolationKind;
    use proptest::prelude::*;

    /// A scripted per-frame classification, replayed against the tracker one
    /// frame apart at a fixed step.
    #[derive(Clone, Copy, Debug)]
    enum Step {
        Violation,
        Compliant,
    }

    fn steps() -> impl Strategy<Value = Vec<Step>> {
        prop::collection::vec(prop_oneof![Just(Step::Violation), Just(Step::Compliant)], 0..200)
    }

    proptest! {
        /// P1: consecutive persisted violations for one key are never closer
        /// than `VIOLATION_COOLDOWN` apart in monotonic time.
        #[test]
        fn p1_emits_are_cooldown_apart(steps in steps(), step_ms in 50u64..500) {
            let tracker = ViolationTracker::default();
            let key = WorkerKey { camera_id: 1, worker_id: 1 };
            let t0 = Instant::now();
            let mut emits = Vec::new();

            for (i, step) in steps.iter().enumerate() {
                let now = t0 + Duration::from_millis(step_ms * i as u64);
                let classification = match step {
                    Step::Violation => Classification::Violation(ViolationKind::MissingHardhat),
                    Step::Compliant => Classification::Compliant,
                };
                if tracker.observe(key, classification, now) == Decision::Emit {
                    emits.push(now);
                }
            }

            for pair in emits.windows(2) {
                prop_assert!(pair[1].duration_since(pair[0]) >= VIOLATION_COOLDOWN);
            }
        }

        /// P2: no violation is persisted earlier than `VIOLATION_PERSISTENCE`
        /// after the first violation frame of its run.
        #[test]
        fn p2_no_emit_before_persistence(steps in steps(), step_ms in 50u64..500) {
            let tracker = ViolationTracker::default();
            let key = WorkerKey { camera_id: 1, worker_id: 1 };
            let t0 = Instant::now();
            let mut run_started_at: Option<Instant> = None;

            for (i, step) in steps.iter().enumerate() {
                let now = t0 + Duration::from_millis(step_ms * i as u64);
                match step {
                    Step::Compliant => {
                        tracker.observe(key, Classification::Compliant, now);
                        run_started_at = None;
                    }
                    Step::Violation => {
                        let started = *run_started_at.get_or_insert(now);
                        let decision = tracker.observe(
                            key,
                            Classification::Violation(ViolationKind::MissingHardhat),
                            now,
                        );
                        if decision == Decision::Emit {
                            prop_assert!(now.duration_since(started) >= VIOLATION_PERSISTENCE);
                        }
                    }
                }
            }
        }
    }
}
