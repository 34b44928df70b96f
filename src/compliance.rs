// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! PPE association + compliance evaluator (C4, §4.4): attributes PPE boxes
//! to tracked workers by overlap and classifies each as Compliant,
//! Violation(kind), or Unknown.

use std::collections::BTreeMap;

use db::ViolationKind;

use crate::detector::{Class, DetectionBox};
use crate::tracker::TrackedPerson;

/// Default minimum fraction of a PPE box's area that must fall inside a
/// person's box for that PPE item to be attributed to them, used where no
/// `Tuneables::ppe_overlap` is available (tests).
pub const PPE_OVERLAP: f32 = 0.50;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Classification {
    Compliant,
    Violation(ViolationKind),
    /// Person detected but neither head nor body region observed (§9:
    /// "partial visibility... must never produce a persisted record").
    Unknown,
}

#[derive(Clone, Copy, Default, Debug)]
struct Flags {
    hardhat: bool,
    no_hardhat: bool,
    vest: bool,
    no_vest: bool,
}

impl Flags {
    fn head_observed(&self) -> bool {
        self.hardhat || self.no_hardhat
    }

    fn body_observed(&self) -> bool {
        self.vest || self.no_vest
    }

    fn classify(&self) -> Classification {
        classify_raw(self.hardhat, self.no_hardhat, self.vest, self.no_vest)
    }
}

/// The classification rule tree (§4.4), independent of how the flags were
/// accumulated — per worker, or pooled across a whole frame (§6 scene-level
/// wire results).
pub fn classify_raw(hardhat: bool, no_hardhat: bool, vest: bool, no_vest: bool) -> Classification {
    let head_observed = hardhat || no_hardhat;
    let body_observed = vest || no_vest;

    if no_hardhat && no_vest {
        return Classification::Violation(ViolationKind::MissingBoth);
    }
    if no_hardhat {
        return Classification::Violation(ViolationKind::MissingHardhat);
    }
    if no_vest {
        return Classification::Violation(ViolationKind::MissingVest);
    }
    if head_observed && body_observed {
        return if hardhat && vest {
            Classification::Compliant
        } else if !hardhat {
            Classification::Violation(ViolationKind::MissingHardhat)
        } else {
            Classification::Violation(ViolationKind::MissingVest)
        };
    }
    if head_observed {
        return if hardhat {
            Classification::Compliant
        } else {
            Classification::Violation(ViolationKind::MissingHardhat)
        };
    }
    if body_observed {
        return if vest {
            Classification::Compliant
        } else {
            Classification::Violation(ViolationKind::MissingVest)
        };
    }
    Classification::Unknown
}

/// A worker's per-frame evaluation (§3 "Worker evaluation").
#[derive(Clone, Debug)]
pub struct WorkerEvaluation {
    pub worker_id: i64,
    pub bbox: crate::geometry::BBox,
    pub hardhat: bool,
    pub no_hardhat: bool,
    pub vest: bool,
    pub no_vest: bool,
    pub classification: Classification,
}

/// Aggregate per-frame fields broadcast to subscribers (§4.4).
#[derive(Clone, Debug, Default)]
pub struct FrameAggregate {
    pub total_workers: usize,
    pub compliant_count: usize,
    pub violation_count: usize,
    pub unknown_count: usize,
    pub total_violation_items: usize,
    pub status: String,
}

/// Attributes each non-person detection to the tracked person with the
/// greatest overlap (above `ppe_overlap`), then classifies every worker.
pub fn evaluate(
    persons: &[TrackedPerson],
    detections: &[DetectionBox],
    ppe_overlap: f32,
) -> (Vec<WorkerEvaluation>, FrameAggregate) {
    let mut flags: BTreeMap<i64, Flags> = persons.iter().map(|p| (p.worker_id, Flags::default())).collect();

    for det in detections {
        if det.class == Class::Person {
            continue;
        }
        let mut best: Option<(i64, f32)> = None;
        for p in persons {
            let overlap = det.bbox.overlap_fraction_of_self(&p.bbox);
            if overlap >= ppe_overlap && best.map_or(true, |(_, b)| overlap > b) {
                best = Some((p.worker_id, overlap));
            }
        }
        let Some((worker_id, _)) = best else { continue };
        let Some(f) = flags.get_mut(&worker_id) else { continue };
        match det.class {
            Class::Hardhat => f.hardhat = true,
            Class::NoHardhat => f.no_hardhat = true,
            Class::Vest => f.vest = true,
            Class::NoVest => f.no_vest = true,
            Class::Person => unreachable!(),
        }
    }

    let mut evaluations = Vec::with_capacity(persons.len());
    let mut agg = FrameAggregate::default();
    for p in persons {
        let f = flags[&p.worker_id];
        let classification = f.classify();
        match classification {
            Classification::Compliant => agg.compliant_count += 1,
            Classification::Violation(kind) => {
                agg.violation_count += 1;
                agg.total_violation_items += match kind {
                    ViolationKind::MissingBoth => 2,
                    _ => 1,
                };
            }
            Classification::Unknown => agg.unknown_count += 1,
        }
        evaluations.push(WorkerEvaluation {
            worker_id: p.worker_id,
            bbox: p.bbox,
            hardhat: f.hardhat,
            no_hardhat: f.no_hardhat,
            vest: f.vest,
            no_vest: f.no_vest,
            classification,
        });
    }
    agg.total_workers = persons.len();
    agg.status = if agg.violation_count > 0 {
        format!("{} violation(s) detected", agg.violation_count)
    } else if agg.total_workers == 0 {
        "no workers detected".to_owned()
    } else {
        "all workers compliant".to_owned()
    };

    (evaluations, agg)
}
