// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Persistence sink (C8): transactional detection + alert writes.
//!
//! Every operation opens a short-lived session scoped to the single event
//! being recorded (§4.8, §5) rather than holding a connection across the
//! camera task's lifetime. `rusqlite::Connection` isn't `Sync`, so each
//! caller is expected to own one (e.g. behind a `parking_lot::Mutex`, or one
//! per task as the resource-bounds section allows).

use base::Error;
use rusqlite::{params, Connection};

use crate::models::{AlertFields, AlertRecord, Camera, DetectionFields, DetectionRecord, Severity, ViolationKind};

fn confidence_scores_json(scores: &std::collections::BTreeMap<String, f32>) -> String {
    serde_json::to_string(scores).expect("confidence score map should serialize")
}

fn parse_confidence_scores(s: &str) -> std::collections::BTreeMap<String, f32> {
    serde_json::from_str(s).unwrap_or_default()
}

fn insert_detection(tx: &rusqlite::Transaction, f: &DetectionFields) -> Result<i64, Error> {
    tx.execute(
        "insert into detection (
            camera_id, worker_id, timestamp_unix_nanos, hardhat, no_hardhat,
            vest, no_vest, person_detected, is_compliant, violation_kind,
            confidence_scores, snapshot_url, archived
        ) values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)",
        params![
            f.camera_id,
            f.worker_id,
            f.timestamp.as_nanosecond() as i64,
            f.hardhat,
            f.no_hardhat,
            f.vest,
            f.no_vest,
            f.person_detected,
            f.is_compliant,
            f.violation_kind.map(ViolationKind::as_str),
            confidence_scores_json(&f.confidence_scores),
            f.snapshot_url,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

/// Inserts a violation detection and its alert in one transaction; rolls
/// back both on any error (§4.8). Returns the new alert id.
pub fn record_violation(
    conn: &mut Connection,
    detection: DetectionFields,
    alert: AlertFields,
) -> Result<i64, Error> {
    debug_assert!(!detection.is_compliant);
    debug_assert!(detection.violation_kind.is_some());
    debug_assert!(detection.person_detected);

    let tx = conn.transaction()?;
    let detection_id = insert_detection(&tx, &detection)?;
    tx.execute(
        "insert into alert (
            detection_id, severity, message, created_at_unix_nanos, acknowledged
        ) values (?1, ?2, ?3, ?4, 0)",
        params![
            detection_id,
            alert.severity.as_str(),
            alert.message,
            alert.created_at.as_nanosecond() as i64,
        ],
    )?;
    let alert_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(alert_id)
}

/// Inserts a compliance sample (no alert, no snapshot) in one transaction.
pub fn record_compliance(conn: &mut Connection, detection: DetectionFields) -> Result<i64, Error> {
    debug_assert!(detection.is_compliant);
    debug_assert!(detection.violation_kind.is_none());
    debug_assert!(detection.snapshot_url.is_none());

    let tx = conn.transaction()?;
    let id = insert_detection(&tx, &detection)?;
    tx.commit()?;
    Ok(id)
}

fn row_to_detection(row: &rusqlite::Row) -> rusqlite::Result<DetectionRecord> {
    let violation_kind: Option<String> = row.get("violation_kind")?;
    let violation_kind = violation_kind.map(|s| match s.as_str() {
        "MissingHardhat" => ViolationKind::MissingHardhat,
        "MissingVest" => ViolationKind::MissingVest,
        _ => ViolationKind::MissingBoth,
    });
    let confidence_scores: String = row.get("confidence_scores")?;
    let timestamp_nanos: i64 = row.get("timestamp_unix_nanos")?;
    let archived_at_nanos: Option<i64> = row.get("archived_at_unix_nanos")?;
    Ok(DetectionRecord {
        id: row.get("id")?,
        fields: DetectionFields {
            camera_id: row.get("camera_id")?,
            worker_id: row.get("worker_id")?,
            timestamp: jiff::Timestamp::from_nanosecond(timestamp_nanos as i128)
                .unwrap_or(jiff::Timestamp::UNIX_EPOCH),
            hardhat: row.get("hardhat")?,
            no_hardhat: row.get("no_hardhat")?,
            vest: row.get("vest")?,
            no_vest: row.get("no_vest")?,
            person_detected: row.get("person_detected")?,
            is_compliant: row.get("is_compliant")?,
            violation_kind,
            confidence_scores: parse_confidence_scores(&confidence_scores),
            snapshot_url: row.get("snapshot_url")?,
        },
        archived: row.get("archived")?,
        archived_at: archived_at_nanos
            .map(|n| jiff::Timestamp::from_nanosecond(n as i128).unwrap_or(jiff::Timestamp::UNIX_EPOCH)),
    })
}

/// Reads back a detection by id. Used by tests and by the out-of-core
/// archival worker mentioned in §6.
pub fn get_detection(conn: &Connection, id: i64) -> Result<Option<DetectionRecord>, Error> {
    conn.query_row(
        "select * from detection where id = ?1",
        params![id],
        row_to_detection,
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        e => Err(e.into()),
    })
}

/// Reads back an alert by id, for verifying P3 (every alert references an
/// existing violation detection).
pub fn get_alert(conn: &Connection, id: i64) -> Result<Option<AlertRecord>, Error> {
    conn.query_row(
        "select * from alert where id = ?1",
        params![id],
        |row| {
            let severity: String = row.get("severity")?;
            let severity = match severity.as_str() {
                "high" => Severity::High,
                "medium" => Severity::Medium,
                _ => Severity::Low,
            };
            let created_at_nanos: i64 = row.get("created_at_unix_nanos")?;
            let acknowledged_at_nanos: Option<i64> = row.get("acknowledged_at_unix_nanos")?;
            Ok(AlertRecord {
                id: row.get("id")?,
                detection_id: row.get("detection_id")?,
                fields: AlertFields {
                    severity,
                    message: row.get("message")?,
                    created_at: jiff::Timestamp::from_nanosecond(created_at_nanos as i128)
                        .unwrap_or(jiff::Timestamp::UNIX_EPOCH),
                },
                acknowledged: row.get("acknowledged")?,
                acknowledged_by: row.get("acknowledged_by")?,
                acknowledged_at: acknowledged_at_nanos
                    .map(|n| jiff::Timestamp::from_nanosecond(n as i128).unwrap_or(jiff::Timestamp::UNIX_EPOCH)),
            })
        },
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        e => Err(e.into()),
    })
}

/// Read-only camera directory (§3: "Lifetime: created by external admin
/// flow; the core only reads it").
pub fn get_camera(conn: &Connection, camera_id: &str) -> Result<Option<Camera>, Error> {
    conn.query_row(
        "select id, resource, name, location, enabled from camera where id = ?1",
        params![camera_id],
        |row| {
            Ok(Camera {
                id: row.get(0)?,
                resource: row.get(1)?,
                name: row.get(2)?,
                location: row.get(3)?,
                enabled: row.get(4)?,
            })
        },
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        e => Err(e.into()),
    })
}

pub fn list_cameras(conn: &Connection) -> Result<Vec<Camera>, Error> {
    let mut stmt =
        conn.prepare("select id, resource, name, location, enabled from camera order by id")?;
    let rows = stmt.query_map([], |row| {
        Ok(Camera {
            id: row.get(0)?,
            resource: row.get(1)?,
            name: row.get(2)?,
            location: row.get(3)?,
            enabled: row.get(4)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use std::collections::BTreeMap;

    fn sample_detection(compliant: bool) -> DetectionFields {
        DetectionFields {
            camera_id: "cam1".to_owned(),
            worker_id: Some(1),
            timestamp: jiff::Timestamp::now(),
            hardhat: compliant,
            no_hardhat: !compliant,
            vest: compliant,
            no_vest: false,
            person_detected: true,
            is_compliant: compliant,
            violation_kind: if compliant {
                None
            } else {
                Some(ViolationKind::MissingHardhat)
            },
            confidence_scores: BTreeMap::from([("person".to_owned(), 0.95)]),
            snapshot_url: if compliant {
                None
            } else {
                Some("https://example/snap.jpg".to_owned())
            },
        }
    }

    #[test]
    fn record_violation_inserts_detection_and_alert_together() {
        let mut conn = testutil::open_test_db();
        let alert_id = record_violation(
            &mut conn,
            sample_detection(false),
            AlertFields {
                severity: Severity::High,
                message: "missing hardhat".to_owned(),
                created_at: jiff::Timestamp::now(),
            },
        )
        .unwrap();
        let alert = get_alert(&conn, alert_id).unwrap().unwrap();
        let detection = get_detection(&conn, alert.detection_id).unwrap().unwrap();
        assert!(!detection.fields.is_compliant);
        assert_eq!(detection.fields.violation_kind, Some(ViolationKind::MissingHardhat));
    }

    #[test]
    fn record_compliance_has_no_alert() {
        let mut conn = testutil::open_test_db();
        let id = record_compliance(&mut conn, sample_detection(true)).unwrap();
        let detection = get_detection(&conn, id).unwrap().unwrap();
        assert!(detection.fields.is_compliant);
        assert!(detection.fields.snapshot_url.is_none());
    }
}
