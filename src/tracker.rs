// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Per-camera worker tracker (C3): stable worker-ID assignment across
//! frames by greedy IoU matching, with staleness eviction (§4.3).

use std::collections::HashMap;

use crate::detector::{Class, DetectionBox};
use crate::geometry::BBox;

/// Default minimum IoU for a detected person to be matched to a tracked
/// worker, used where no `Tuneables::iou_match` is available (tests).
pub const IOU_MATCH: f32 = 0.30;

/// Frames a worker may go unseen before eviction (~1s at 30 FPS).
pub const DEFAULT_MAX_MISSED_FRAMES: u64 = 30;

struct Tracked {
    bbox: BBox,
    last_seen_frame: u64,
}

/// A person detection with its assigned stable worker ID.
#[derive(Clone, Copy, Debug)]
pub struct TrackedPerson {
    pub worker_id: i64,
    pub bbox: BBox,
}

/// Per-camera tracking state. Not `Sync`: the contract requires frames of
/// one camera be fed in order, never interleaved (§4.3).
pub struct WorkerTracker {
    tracked: HashMap<i64, Tracked>,
    next_worker_id: i64,
    frame_counter: u64,
    max_missed_frames: u64,
    iou_match: f32,
}

impl WorkerTracker {
    pub fn new(max_missed_frames: u64, iou_match: f32) -> Self {
        WorkerTracker {
            tracked: HashMap::new(),
            next_worker_id: 0,
            frame_counter: 0,
            max_missed_frames,
            iou_match,
        }
    }

    /// Assigns a worker ID to each person detection in `persons`, then evicts
    /// stale entries. Returns the persons with their assigned IDs, order not
    /// guaranteed to match input order.
    pub fn update(&mut self, persons: &[DetectionBox]) -> Vec<TrackedPerson> {
        debug_assert!(persons.iter().all(|p| p.class == Class::Person));
        self.frame_counter += 1;

        let mut claimed: HashMap<i64, (f32, usize)> = HashMap::new();
        let mut assignment: Vec<Option<i64>> = vec![None; persons.len()];

        for (i, person) in persons.iter().enumerate() {
            let mut best: Option<(i64, f32)> = None;
            for (&worker_id, t) in self.tracked.iter() {
                let iou = person.bbox.iou(&t.bbox);
                if iou >= self.iou_match && best.map_or(true, |(_, b)| iou > b) {
                    best = Some((worker_id, iou));
                }
            }
            if let Some((worker_id, iou)) = best {
                match claimed.get(&worker_id) {
                    Some(&(prev_iou, prev_idx)) if prev_iou >= iou => {
                        // Tie-break (§4.3): the higher-IoU claimant keeps the
                        // ID, this one falls through to a new allocation.
                        let _ = prev_idx;
                    }
                    _ => {
                        claimed.insert(worker_id, (iou, i));
                    }
                }
            }
        }

        for (&worker_id, &(_, idx)) in claimed.iter() {
            assignment[idx] = Some(worker_id);
        }

        let mut out = Vec::with_capacity(persons.len());
        for (i, person) in persons.iter().enumerate() {
            let worker_id = match assignment[i] {
                Some(id) => id,
                None => {
                    let id = self.next_worker_id;
                    self.next_worker_id += 1;
                    id
                }
            };
            self.tracked.insert(
                worker_id,
                Tracked {
                    bbox: person.bbox,
                    last_seen_frame: self.frame_counter,
                },
            );
            out.push(TrackedPerson {
                worker_id,
                bbox: person.bbox,
            });
        }

        let frame_counter = self.frame_counter;
        let max_missed = self.max_missed_frames;
        self.tracked
            .retain(|_, t| frame_counter - t.last_seen_frame <= max_missed);

        out
    }

    pub fn tracked_worker_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.tracked.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(bbox: BBox) -> DetectionBox {
        DetectionBox {
            class: Class::Person,
            confidence: 0.9,
            bbox,
        }
    }

    #[test]
    fn first_sighting_allocates_sequential_ids() {
        let mut t = WorkerTracker::new(DEFAULT_MAX_MISSED_FRAMES, IOU_MATCH);
        let out = t.update(&[
            person(BBox::new(0.0, 0.0, 10.0, 10.0)),
            person(BBox::new(100.0, 100.0, 110.0, 110.0)),
        ]);
        let mut ids: Vec<_> = out.iter().map(|p| p.worker_id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn stable_id_across_frames_with_overlap() {
        let mut t = WorkerTracker::new(DEFAULT_MAX_MISSED_FRAMES, IOU_MATCH);
        let first = t.update(&[person(BBox::new(0.0, 0.0, 10.0, 10.0))]);
        let id = first[0].worker_id;
        let second = t.update(&[person(BBox::new(0.5, 0.5, 10.5, 10.5))]);
        assert_eq!(second[0].worker_id, id);
    }

    #[test]
    fn two_overlapping_persons_keep_distinct_ids_across_frames() {
        let mut t = WorkerTracker::new(DEFAULT_MAX_MISSED_FRAMES, IOU_MATCH);
        let a = BBox::new(0.0, 0.0, 20.0, 40.0);
        let b = BBox::new(15.0, 0.0, 35.0, 40.0);
        let first = t.update(&[person(a), person(b)]);
        let (id_a, id_b) = (first[0].worker_id, first[1].worker_id);
        assert_ne!(id_a, id_b);

        let second = t.update(&[person(a), person(b)]);
        let ids: HashMap<_, _> = second.iter().map(|p| (p.bbox.x1 as i64, p.worker_id)).collect();
        assert_eq!(ids[&(a.x1 as i64)], id_a);
        assert_eq!(ids[&(b.x1 as i64)], id_b);
    }

    #[test]
    fn eviction_after_missed_frames_issues_new_id() {
        let mut t = WorkerTracker::new(2, IOU_MATCH);
        let first = t.update(&[person(BBox::new(0.0, 0.0, 10.0, 10.0))]);
        let old_id = first[0].worker_id;
        // Three frames with no detections exceeds max_missed_frames=2.
        t.update(&[]);
        t.update(&[]);
        t.update(&[]);
        let returned = t.update(&[person(BBox::new(0.0, 0.0, 10.0, 10.0))]);
        assert_ne!(returned[0].worker_id, old_id);
    }
}
