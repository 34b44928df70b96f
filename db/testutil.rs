// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Test helpers: an in-memory database seeded with a couple of cameras.

use rusqlite::Connection;

use crate::models::Camera;

pub fn open_test_db() -> Connection {
    let conn = crate::schema::open_in_memory().expect("in-memory schema should initialize");
    seed_cameras(&conn);
    conn
}

fn seed_cameras(conn: &Connection) {
    let cameras = [
        Camera {
            id: "cam1".to_owned(),
            resource: "0".to_owned(),
            name: "Loading Dock".to_owned(),
            location: "Building A".to_owned(),
            enabled: true,
        },
        Camera {
            id: "cam2".to_owned(),
            resource: "rtsp://example.invalid/stream".to_owned(),
            name: "Warehouse Floor".to_owned(),
            location: "Building B".to_owned(),
            enabled: true,
        },
    ];
    for c in cameras {
        conn.execute(
            "insert into camera (id, resource, name, location, enabled) values (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![c.id, c.resource, c.name, c.location, c.enabled],
        )
        .expect("camera seed insert should succeed");
    }
}
