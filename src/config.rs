// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Tuneables (C12, §6): the configuration surface for the pipeline, loaded
//! from TOML and overridable from the command line, with the detector's
//! subset hot-reloadable at runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use base::Error;
use crate::detector::{Device, Settings as DetectorSettings};

fn default_target_fps() -> f32 {
    15.0
}
fn default_violation_persistence_secs() -> u64 {
    5
}
fn default_violation_cooldown_secs() -> u64 {
    5
}
fn default_compliance_sample_interval_secs() -> u64 {
    10
}
fn default_stale_threshold_secs() -> u64 {
    15
}
fn default_max_missed_frames() -> u64 {
    30
}
fn default_iou_match() -> f32 {
    0.30
}
fn default_ppe_overlap() -> f32 {
    0.50
}
fn default_stale_sweep_every_n_frames() -> u64 {
    150
}

/// Pipeline tuneables (§6). Field names match the on-disk TOML keys.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuneables {
    pub target_fps: f32,
    pub violation_persistence_secs: u64,
    pub violation_cooldown_secs: u64,
    pub compliance_sample_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub max_missed_frames: u64,
    pub iou_match: f32,
    pub ppe_overlap: f32,
    pub stale_sweep_every_n_frames: u64,
}

impl Default for Tuneables {
    fn default() -> Self {
        Tuneables {
            target_fps: default_target_fps(),
            violation_persistence_secs: default_violation_persistence_secs(),
            violation_cooldown_secs: default_violation_cooldown_secs(),
            compliance_sample_interval_secs: default_compliance_sample_interval_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            max_missed_frames: default_max_missed_frames(),
            iou_match: default_iou_match(),
            ppe_overlap: default_ppe_overlap(),
            stale_sweep_every_n_frames: default_stale_sweep_every_n_frames(),
        }
    }
}

impl Tuneables {
    pub fn violation_persistence(&self) -> Duration {
        Duration::from_secs(self.violation_persistence_secs)
    }

    pub fn violation_cooldown(&self) -> Duration {
        Duration::from_secs(self.violation_cooldown_secs)
    }

    pub fn compliance_sample_interval(&self) -> Duration {
        Duration::from_secs(self.compliance_sample_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }
}

/// On-disk representation of `DetectorSettings` (§4.2). `device` is the only
/// field not hot-reloadable from the TOML file; it's fixed at startup.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub input_size: u32,
    pub jpeg_quality: u8,
    pub confidence_threshold: f32,
    pub nms_iou: f32,
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let d = DetectorSettings::default();
        DetectorConfig {
            input_size: d.input_size,
            jpeg_quality: d.jpeg_quality,
            confidence_threshold: d.confidence_threshold,
            nms_iou: d.nms_iou,
            max_detections: d.max_detections,
        }
    }
}

impl From<DetectorConfig> for DetectorSettings {
    fn from(c: DetectorConfig) -> Self {
        DetectorSettings {
            input_size: c.input_size,
            jpeg_quality: c.jpeg_quality,
            confidence_threshold: c.confidence_threshold,
            nms_iou: c.nms_iou,
            max_detections: c.max_detections,
            device: Device::Cpu,
        }
    }
}

/// Top-level configuration file (TOML).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub db_path: PathBuf,
    pub http_addr: String,
    pub snapshot_root: PathBuf,
    pub snapshot_base_url: String,
    pub annotation_font_path: PathBuf,
    #[serde(default)]
    pub tuneables: Tuneables,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        let text = std::fs::read_to_string(path).map_err(Error::from)?;
        toml::from_str(&text).map_err(|e| base::err!(InvalidArgument, msg("invalid config at {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuneable_defaults_match_spec_values() {
        let t = Tuneables::default();
        assert_eq!(t.violation_persistence(), Duration::from_secs(5));
        assert_eq!(t.violation_cooldown(), Duration::from_secs(5));
        assert_eq!(t.compliance_sample_interval(), Duration::from_secs(10));
        assert_eq!(t.stale_threshold(), Duration::from_secs(15));
        assert_eq!(t.max_missed_frames, 30);
        assert!((t.iou_match - 0.30).abs() < 1e-6);
        assert!((t.ppe_overlap - 0.50).abs() < 1e-6);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = Config {
            db_path: PathBuf::from("/var/lib/ppe-nvr/db.sqlite3"),
            http_addr: "0.0.0.0:8080".to_owned(),
            snapshot_root: PathBuf::from("/var/lib/ppe-nvr/snapshots"),
            snapshot_base_url: "https://nvr.example/media".to_owned(),
            annotation_font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf"),
            tuneables: Tuneables::default(),
            detector: DetectorConfig::default(),
        };
        let text = toml::to_string(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.http_addr, cfg.http_addr);
        assert_eq!(parsed.tuneables.max_missed_frames, cfg.tuneables.max_missed_frames);
    }
}
