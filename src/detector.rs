// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Detector facade (C2). The PPE model itself is an opaque external
//! collaborator (§1, §6): this module defines the contract any such model
//! is plugged in behind, plus the hot-reloadable tuning knobs.

use std::sync::Arc;

use tokio::sync::watch;

use crate::geometry::BBox;

/// Fixed detection vocabulary (§4.2). Label spellings are normalised:
/// internal names have no whitespace.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Class {
    Person,
    Hardhat,
    NoHardhat,
    Vest,
    NoVest,
}

impl Class {
    pub fn as_str(self) -> &'static str {
        match self {
            Class::Person => "Person",
            Class::Hardhat => "Hardhat",
            Class::NoHardhat => "NoHardhat",
            Class::Vest => "Vest",
            Class::NoVest => "NoVest",
        }
    }

    pub fn parse(s: &str) -> Option<Class> {
        match s {
            "Person" => Some(Class::Person),
            "Hardhat" => Some(Class::Hardhat),
            "NoHardhat" => Some(Class::NoHardhat),
            "Vest" => Some(Class::Vest),
            "NoVest" => Some(Class::NoVest),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct DetectionBox {
    pub class: Class,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Device preference for model inference.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Device {
    Cpu,
    Accelerator,
}

/// Detector tuneables (§6), all hot-reloadable: changing one affects only
/// subsequent `detect()` calls (§4.2).
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// One of a small set, e.g. {320, 416, 512, 640, 1280}.
    pub input_size: u32,
    pub jpeg_quality: u8,
    pub confidence_threshold: f32,
    pub nms_iou: f32,
    pub max_detections: usize,
    pub device: Device,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            input_size: 640,
            jpeg_quality: 85,
            confidence_threshold: 0.45,
            nms_iou: 0.45,
            max_detections: 100,
            device: Device::Cpu,
        }
    }
}

/// A decoded frame, ready for detection and annotation.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: image::RgbImage,
}

/// The detector contract (§4.2). Implementations must be safe to call from
/// multiple per-camera tasks concurrently, or be accessed through a pool.
///
/// Per-frame errors never propagate into the pipeline: implementations
/// should log and return an empty list rather than fail `detect`. Only
/// unrecoverable model-load failures are fatal, and those are surfaced at
/// construction time, before the pipeline starts.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<DetectionBox>;

    /// Applies a new settings snapshot; affects only subsequent `detect`
    /// calls.
    fn reconfigure(&self, settings: Settings);
}

/// A `Detector` that never detects anything. Useful as a safe default while
/// no real model backend is wired in, and as a building block for tests.
pub struct NullDetector {
    settings: watch::Sender<Settings>,
}

impl Default for NullDetector {
    fn default() -> Self {
        NullDetector {
            settings: watch::Sender::new(Settings::default()),
        }
    }
}

impl Detector for NullDetector {
    fn detect(&self, _frame: &Frame) -> Vec<DetectionBox> {
        Vec::new()
    }

    fn reconfigure(&self, settings: Settings) {
        let _ = self.settings.send(settings);
    }
}

/// A `Detector` that replays a scripted sequence of per-frame detections,
/// one call at a time, then repeats the last entry. Used by pipeline and
/// scenario tests to drive the state machine deterministically.
pub struct ScriptedDetector {
    frames: Vec<Vec<DetectionBox>>,
    next: std::sync::atomic::AtomicUsize,
    settings: watch::Sender<Settings>,
}

impl ScriptedDetector {
    pub fn new(frames: Vec<Vec<DetectionBox>>) -> Arc<Self> {
        Arc::new(ScriptedDetector {
            frames,
            next: std::sync::atomic::AtomicUsize::new(0),
            settings: watch::Sender::new(Settings::default()),
        })
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, _frame: &Frame) -> Vec<DetectionBox> {
        if self.frames.is_empty() {
            return Vec::new();
        }
        let i = self
            .next
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |i| Some((i + 1).min(self.frames.len() - 1)),
            )
            .unwrap();
        self.frames[i.min(self.frames.len() - 1)].clone()
    }

    fn reconfigure(&self, settings: Settings) {
        let _ = self.settings.send(settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_round_trips_through_normalised_name() {
        for c in [
            Class::Person,
            Class::Hardhat,
            Class::NoHardhat,
            Class::Vest,
            Class::NoVest,
        ] {
            assert_eq!(Class::parse(c.as_str()), Some(c));
            assert!(!c.as_str().contains(' '));
        }
    }

    #[test]
    fn null_detector_always_empty() {
        let d = NullDetector::default();
        let frame = Frame {
            width: 4,
            height: 4,
            rgb: image::RgbImage::new(4, 4),
        };
        assert!(d.detect(&frame).is_empty());
    }
}
