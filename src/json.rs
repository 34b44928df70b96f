// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Wire protocol structs for the `/ws/monitor/{camera_id}` endpoint (§6).
//! These mirror the JSON shapes exactly; field names are on-the-wire names,
//! not idiomatic Rust naming, by design.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use db::Severity;

use crate::compliance::{self, Classification, FrameAggregate};
use crate::detector::{Class, DetectionBox};

/// The `results` object embedded in a `frame` message. This is scene-level,
/// not per-worker: it pools every detection box in the frame the same way
/// the PPE association evaluator pools per-worker boxes, which is why a
/// frame with several workers can still report a single `violation_type`
/// (§6).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ResultsWire {
    pub detected_classes: Vec<String>,
    pub is_compliant: bool,
    pub safety_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_type: Option<String>,
    pub confidence_scores: BTreeMap<String, f32>,
    pub person_detected: bool,
    pub person_count: usize,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_reason: Option<String>,
}

impl ResultsWire {
    /// Builds the wire results for one frame, pooling every detection box
    /// regardless of which worker it was attributed to (§4.4, §6).
    /// `confidence_scores` is the highest confidence seen this frame per
    /// normalised class name.
    pub fn for_frame(
        detections: &[DetectionBox],
        aggregate: &FrameAggregate,
        confidence_scores: BTreeMap<String, f32>,
    ) -> Self {
        let mut classes: BTreeSet<&'static str> = BTreeSet::new();
        let (mut hardhat, mut no_hardhat, mut vest, mut no_vest, mut person_detected) =
            (false, false, false, false, false);
        for d in detections {
            classes.insert(d.class.as_str());
            match d.class {
                Class::Person => person_detected = true,
                Class::Hardhat => hardhat = true,
                Class::NoHardhat => no_hardhat = true,
                Class::Vest => vest = true,
                Class::NoVest => no_vest = true,
            }
        }

        let (is_compliant, violation_type) = if person_detected {
            match compliance::classify_raw(hardhat, no_hardhat, vest, no_vest) {
                Classification::Compliant => (true, None),
                Classification::Violation(kind) => (false, Some(kind.as_str().to_owned())),
                Classification::Unknown => (false, None),
            }
        } else {
            (false, None)
        };

        // A person with no body-region evidence at all (neither vest nor
        // no-vest) is only partially in frame; head-only visibility is the
        // common case (camera mounted high, body below the frame edge).
        let is_partial = person_detected && !vest && !no_vest;
        let partial_reason = is_partial.then(|| "body region not visible this frame".to_owned());

        ResultsWire {
            detected_classes: classes.into_iter().map(str::to_owned).collect(),
            is_compliant,
            safety_status: aggregate.status.clone(),
            violation_type,
            confidence_scores,
            person_detected,
            person_count: aggregate.total_workers,
            is_partial,
            partial_reason,
        }
    }
}

/// Highest confidence observed this frame per normalised class name (§6).
pub fn confidence_scores_for(detections: &[DetectionBox]) -> BTreeMap<String, f32> {
    let mut scores: BTreeMap<String, f32> = BTreeMap::new();
    for d in detections {
        let name = d.class.as_str().to_owned();
        scores
            .entry(name)
            .and_modify(|c| {
                if d.confidence > *c {
                    *c = d.confidence;
                }
            })
            .or_insert(d.confidence);
    }
    scores
}

/// A severity as sent on the wire.
pub fn severity_wire(s: Severity) -> &'static str {
    s.as_str()
}

/// Server -> client messages, tagged by `type` (§6).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "status")]
    Status { message: String },
    #[serde(rename = "frame")]
    Frame {
        camera_id: String,
        frame: String,
        results: ResultsWire,
        timestamp: String,
    },
    #[serde(rename = "alert")]
    Alert { camera_id: String, alert: AlertWire },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Clone, Debug, Serialize)]
pub struct AlertWire {
    pub id: i64,
    pub severity: String,
    pub message: String,
    pub timestamp: String,
}

/// Client -> server messages. The only defined payload today is the literal
/// text `"ping"`; this type exists for callers that prefer to match on a
/// parsed value rather than a raw string (§6).
#[derive(Clone, Debug, Deserialize)]
pub enum ClientMessage {
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Option<ClientMessage> {
        if text.trim() == "ping" {
            Some(ClientMessage::Ping)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_serializes_with_type_tag() {
        let m = ServerMessage::Status {
            message: "connected".to_owned(),
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["message"], "connected");
    }

    #[test]
    fn client_ping_parses_from_plain_text() {
        assert!(matches!(ClientMessage::parse("ping"), Some(ClientMessage::Ping)));
        assert!(ClientMessage::parse("pong").is_none());
    }

    #[test]
    fn results_wire_omits_null_violation_type_and_partial_reason() {
        let r = ResultsWire {
            detected_classes: vec!["Hardhat".to_owned(), "Vest".to_owned()],
            is_compliant: true,
            safety_status: "all workers compliant".to_owned(),
            violation_type: None,
            confidence_scores: BTreeMap::new(),
            person_detected: true,
            person_count: 1,
            is_partial: false,
            partial_reason: None,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("violation_type").is_none());
        assert!(v.get("partial_reason").is_none());
    }

    fn det(class: Class, confidence: f32) -> DetectionBox {
        DetectionBox {
            class,
            confidence,
            bbox: crate::geometry::BBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn for_frame_pools_boxes_across_the_whole_scene() {
        let dets = vec![
            det(Class::Person, 0.9),
            det(Class::Person, 0.8),
            det(Class::NoHardhat, 0.7),
            det(Class::Vest, 0.6),
        ];
        let aggregate = FrameAggregate {
            total_workers: 2,
            ..Default::default()
        };
        let scores = confidence_scores_for(&dets);
        let wire = ResultsWire::for_frame(&dets, &aggregate, scores);
        assert!(!wire.is_compliant);
        assert_eq!(wire.violation_type.as_deref(), Some("MissingHardhat"));
        assert_eq!(wire.person_count, 2);
        assert!(wire.detected_classes.contains(&"Person".to_owned()));
    }

    #[test]
    fn for_frame_flags_partial_when_body_region_unobserved() {
        let dets = vec![det(Class::Person, 0.9), det(Class::Hardhat, 0.8)];
        let aggregate = FrameAggregate::default();
        let scores = confidence_scores_for(&dets);
        let wire = ResultsWire::for_frame(&dets, &aggregate, scores);
        assert!(wire.is_partial);
        assert!(wire.partial_reason.is_some());
    }

    #[test]
    fn confidence_scores_keep_the_highest_per_class() {
        let dets = vec![det(Class::Person, 0.4), det(Class::Person, 0.9)];
        let scores = confidence_scores_for(&dets);
        assert_eq!(scores["Person"], 0.9);
    }
}
