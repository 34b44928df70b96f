// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Schema definition and migration. There's a single schema version so far;
//! `upgrade()` is a no-op placeholder for the mechanism a real deployment
//! would grow as the schema evolves.

use base::Error;
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES: &str = r#"
create table if not exists meta (
  schema_version integer not null
);

create table if not exists camera (
  id text primary key,
  resource text not null,
  name text not null,
  location text not null,
  enabled integer not null
);

create table if not exists detection (
  id integer primary key,
  camera_id text not null,
  worker_id integer,
  timestamp_unix_nanos integer not null,
  hardhat integer not null,
  no_hardhat integer not null,
  vest integer not null,
  no_vest integer not null,
  person_detected integer not null,
  is_compliant integer not null,
  violation_kind text,
  confidence_scores text not null,
  snapshot_url text,
  archived integer not null default 0,
  archived_at_unix_nanos integer
);

create index if not exists detection_camera_timestamp
  on detection (camera_id, timestamp_unix_nanos);

create table if not exists alert (
  id integer primary key,
  detection_id integer not null references detection (id),
  severity text not null,
  message text not null,
  created_at_unix_nanos integer not null,
  acknowledged integer not null default 0,
  acknowledged_by text,
  acknowledged_at_unix_nanos integer
);

create index if not exists alert_detection on alert (detection_id);
"#;

/// Opens (creating if absent) and migrates the database at `path`.
pub fn open(path: &std::path::Path) -> Result<Connection, Error> {
    let conn = Connection::open(path)?;
    init(&conn)?;
    Ok(conn)
}

/// Opens an in-memory database, for tests.
pub fn open_in_memory() -> Result<Connection, Error> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(CREATE_TABLES)?;
    let version: Option<i64> = conn
        .query_row("select schema_version from meta", [], |r| r.get(0))
        .ok();
    match version {
        None => {
            conn.execute(
                "insert into meta (schema_version) values (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(v) if v < SCHEMA_VERSION => upgrade(conn, v)?,
        Some(v) if v > SCHEMA_VERSION => {
            return Err(base::err!(
                FailedPrecondition,
                msg("database schema version {v} is newer than this binary supports ({SCHEMA_VERSION})")
            ));
        }
        Some(_) => {}
    }
    Ok(())
}

fn upgrade(_conn: &Connection, from_version: i64) -> Result<(), Error> {
    // No upgrades defined yet; this is the hook a second schema version
    // would extend.
    Err(base::err!(
        Internal,
        msg("no upgrade path defined from schema version {from_version}")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_is_idempotent_to_reinit() {
        let conn = open_in_memory().unwrap();
        init(&conn).unwrap();
        let version: i64 = conn
            .query_row("select schema_version from meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
