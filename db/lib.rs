// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! SQLite-backed persistence: the camera directory, detection and alert
//! records, and schema migration (§3, §4.8).

pub mod models;
pub mod schema;
pub mod sink;

// Not cfg(test): also used by the dependent crate's tests, and #[cfg(test)]
// isn't propagated across crate boundaries.
pub mod testutil;

pub use models::{AlertFields, AlertRecord, Camera, DetectionFields, DetectionRecord, Severity, ViolationKind};
