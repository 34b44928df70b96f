// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Persisted record shapes. These are deliberately plain data: the core
//! only ever opens a short-lived session per event (§4.8), so there's no
//! long-lived ORM-style object graph to maintain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A camera descriptor. Lifetime is owned by an external admin flow; the
/// core only ever reads this table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    /// Interpreted as one of {integer device index, local file path, network
    /// stream URL} by `ppe_nvr::source`.
    pub resource: String,
    pub name: String,
    pub location: String,
    pub enabled: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ViolationKind {
    MissingHardhat,
    MissingVest,
    MissingBoth,
}

impl ViolationKind {
    /// Severity policy per §4.5: MissingBoth and MissingHardhat are High;
    /// MissingVest is Medium (canonical per the source's two conflicting
    /// variants, see spec §9).
    pub fn severity(self) -> Severity {
        match self {
            ViolationKind::MissingBoth | ViolationKind::MissingHardhat => Severity::High,
            ViolationKind::MissingVest => Severity::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::MissingHardhat => "MissingHardhat",
            ViolationKind::MissingVest => "MissingVest",
            ViolationKind::MissingBoth => "MissingBoth",
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// Fields common to both violation records and compliance samples. The two
/// kinds are distinguished only by the values of `is_compliant`,
/// `violation_kind`, and `snapshot_url` (§3).
#[derive(Clone, Debug)]
pub struct DetectionFields {
    pub camera_id: String,
    pub worker_id: Option<i64>,
    pub timestamp: jiff::Timestamp,
    pub hardhat: bool,
    pub no_hardhat: bool,
    pub vest: bool,
    pub no_vest: bool,
    pub person_detected: bool,
    pub is_compliant: bool,
    pub violation_kind: Option<ViolationKind>,
    /// Highest confidence seen this frame, keyed by normalized class name.
    pub confidence_scores: BTreeMap<String, f32>,
    pub snapshot_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AlertFields {
    pub severity: Severity,
    pub message: String,
    pub created_at: jiff::Timestamp,
}

/// A detection row as read back from storage.
#[derive(Clone, Debug)]
pub struct DetectionRecord {
    pub id: i64,
    pub fields: DetectionFields,
    pub archived: bool,
    pub archived_at: Option<jiff::Timestamp>,
}

/// An alert row as read back from storage.
#[derive(Clone, Debug)]
pub struct AlertRecord {
    pub id: i64,
    pub detection_id: i64,
    pub fields: AlertFields,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<jiff::Timestamp>,
}
