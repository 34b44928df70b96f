// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Snapshot writer (C7, §4.7): persists an annotated JPEG for a violation
//! to an addressable store and returns a URL.

use std::path::PathBuf;

use rand::Rng;
use tracing::warn;

const JPEG_QUALITY: u8 = 95;

/// Contract for C7. Implementations must never propagate failure into the
/// pipeline: `save` logs and returns `None` on error, and the violation is
/// still persisted without a snapshot (§4.7).
pub trait SnapshotWriter: Send + Sync {
    fn save(&self, frame: &image::RgbImage, camera_id: &str, worker_id: i64, timestamp: jiff::Timestamp) -> Option<String>;
}

/// Writes JPEGs under `<root>/violations/<camera_id>/` and serves them from
/// `<base_url>/violations/<camera_id>/<file>`.
pub struct FilesystemSnapshotWriter {
    root: PathBuf,
    base_url: String,
}

impl FilesystemSnapshotWriter {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        FilesystemSnapshotWriter {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    fn filename(worker_id: i64, timestamp: jiff::Timestamp) -> String {
        let suffix: u32 = rand::thread_rng().gen();
        format!("{}_{}_{:08x}.jpg", timestamp.as_second(), worker_id, suffix)
    }
}

impl SnapshotWriter for FilesystemSnapshotWriter {
    fn save(&self, frame: &image::RgbImage, camera_id: &str, worker_id: i64, timestamp: jiff::Timestamp) -> Option<String> {
        let dir = self.root.join("violations").join(camera_id);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(camera_id, worker_id, error = %e, "failed to create snapshot directory");
            return None;
        }
        let filename = Self::filename(worker_id, timestamp);
        let path = dir.join(&filename);

        let mut bytes: Vec<u8> = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
        if let Err(e) = encoder.encode_image(frame) {
            warn!(camera_id, worker_id, error = %e, "failed to encode snapshot");
            return None;
        }
        if let Err(e) = std::fs::write(&path, &bytes) {
            warn!(camera_id, worker_id, error = %e, "failed to write snapshot");
            return None;
        }

        Some(format!("{}/violations/{}/{}", self.base_url.trim_end_matches('/'), camera_id, filename))
    }
}

/// A `SnapshotWriter` that never writes anything; used by tests that only
/// care about state-machine behaviour.
pub struct NullSnapshotWriter;

impl SnapshotWriter for NullSnapshotWriter {
    fn save(&self, _frame: &image::RgbImage, _camera_id: &str, _worker_id: i64, _timestamp: jiff::Timestamp) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_writer_returns_url_under_violations_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FilesystemSnapshotWriter::new(dir.path(), "https://snapshots.example");
        let frame = image::RgbImage::new(8, 8);
        let url = writer
            .save(&frame, "cam1", 3, jiff::Timestamp::now())
            .expect("write should succeed");
        assert!(url.starts_with("https://snapshots.example/violations/cam1/"));
        assert!(url.ends_with(".jpg"));
    }

    #[test]
    fn null_writer_always_returns_none() {
        let writer = NullSnapshotWriter;
        let frame = image::RgbImage::new(4, 4);
        assert!(writer.save(&frame, "cam1", 1, jiff::Timestamp::now()).is_none());
    }
}
