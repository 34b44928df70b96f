// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Stream lifecycle manager (C10, §4.10): one capture/detect/evaluate/
//! persist loop per camera, started on first subscriber and torn down on
//! last. Each camera's loop owns a dedicated OS thread rather than an async
//! task — detection and capture are blocking, compute- or I/O-bound calls,
//! and a thread-per-stream model keeps one camera's latency from starving
//! another's tokio runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use base::clock::{Clocks, TimerGuard};
use base::Mutex;
use db::{AlertFields, Camera, DetectionFields};

use crate::annotate;
use crate::compliance::{self, Classification, WorkerEvaluation};
use crate::config::Tuneables;
use crate::detector::{Class, Detector};
use crate::hub::{Message as HubMessage, SubscriberHub, Subscription};
use crate::json::{self, ResultsWire};
use crate::sampler::ComplianceSampler;
use crate::snapshot::SnapshotWriter;
use crate::source::{FrameSource, SourceOpener};
use crate::tracker::WorkerTracker;
use crate::violation::{Decision, ViolationTracker, WorkerKey};

fn camera_key(camera_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    camera_id.hash(&mut h);
    h.finish()
}

fn frame_interval(target_fps: f32) -> Duration {
    if target_fps <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f32(1.0 / target_fps)
    }
}

/// Collaborators shared by every camera's pipeline thread, built once at
/// startup.
pub struct PipelineDeps {
    pub db_path: std::path::PathBuf,
    pub clocks: Arc<dyn Clocks>,
    pub detector: Arc<dyn Detector>,
    pub snapshot_writer: Arc<dyn SnapshotWriter>,
    pub font: rusttype::Font<'static>,
    pub hub: Arc<SubscriberHub>,
    pub violations: Arc<ViolationTracker>,
    pub tuneables: Tuneables,
    pub outbound_jpeg_quality: u8,
    pub open_source: Arc<dyn SourceOpener>,
}

struct CameraTask {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

/// Owns the set of running per-camera pipeline threads (§4.10).
pub struct PipelineManager {
    deps: Arc<PipelineDeps>,
    tasks: Mutex<HashMap<String, CameraTask>>,
}

impl PipelineManager {
    pub fn new(deps: PipelineDeps) -> Arc<Self> {
        Arc::new(PipelineManager {
            deps: Arc::new(deps),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a new subscriber for `camera` and, if no pipeline thread is
    /// running for it yet, spawns one (§4.10: "if there is >= 1 subscriber
    /// and no task, a task will be spawned within one subscribe call").
    /// Both the subscribe and the spawn decision happen under one lock, so
    /// concurrent subscribes to the same camera never race into two tasks.
    pub fn subscribe(self: &Arc<Self>, camera: Camera) -> Subscription {
        let mut tasks = self.tasks.lock();
        let (_, subscription) = self.deps.hub.subscribe(&camera.id);

        if !tasks.contains_key(&camera.id) {
            let task_key = camera.id.clone();
            let camera_id = camera.id.clone();
            let shutdown = Arc::new(AtomicBool::new(false));
            let thread_shutdown = Arc::clone(&shutdown);
            let deps = Arc::clone(&self.deps);
            let manager = Arc::clone(self);

            self.deps.hub.set_running(&camera_id, true);
            let handle = std::thread::Builder::new()
                .name(format!("ppe-camera-{}", camera.id))
                .spawn(move || {
                    run_camera(&deps, &camera, &thread_shutdown);
                    manager.tasks.lock().remove(&camera_id);
                    manager.deps.hub.set_running(&camera_id, false);
                })
                .expect("failed to spawn camera pipeline thread");

            tasks.insert(task_key, CameraTask { handle, shutdown });
        }

        subscription
    }

    /// Requests that `camera_id`'s pipeline thread stop at its next
    /// iteration boundary. Used by administrative shutdown, not by ordinary
    /// subscriber churn (which the thread observes on its own).
    pub fn stop(&self, camera_id: &str) {
        if let Some(task) = self.tasks.lock().get(camera_id) {
            task.shutdown.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_running(&self, camera_id: &str) -> bool {
        self.tasks.lock().contains_key(camera_id)
    }

    /// Blocks until `camera_id`'s thread has exited. Used by tests and by a
    /// clean process shutdown.
    pub fn join(&self, camera_id: &str) {
        let task = self.tasks.lock().remove(camera_id);
        if let Some(task) = task {
            let _ = task.handle.join();
        }
    }
}

fn run_camera(deps: &PipelineDeps, camera: &Camera, shutdown: &AtomicBool) {
    let clocks = deps.clocks.as_ref();
    let cam_key = camera_key(&camera.id);

    let mut source = {
        let _t = TimerGuard::new(clocks, || format!("opening {}", camera.resource));
        match deps.open_source.open(&camera.resource, 720) {
            Ok(s) => s,
            Err(e) => {
                warn!(camera_id = %camera.id, error = %e, "failed to open frame source");
                deps.hub.broadcast(
                    &camera.id,
                    HubMessage::Error {
                        message: format!("failed to open camera: {e}"),
                    },
                );
                return;
            }
        }
    };

    deps.hub.broadcast(
        &camera.id,
        HubMessage::Status {
            message: format!("connected to {}", camera.name),
        },
    );
    info!(camera_id = %camera.id, "camera pipeline started");

    let mut tracker = WorkerTracker::new(deps.tuneables.max_missed_frames, deps.tuneables.iou_match);
    let mut sampler = ComplianceSampler::new(clocks.monotonic(), deps.tuneables.compliance_sample_interval());
    let interval = frame_interval(deps.tuneables.target_fps);
    let mut frame_index: u64 = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) || deps.hub.subscriber_count(&camera.id) == 0 {
            break;
        }

        let frame = {
            let _t = TimerGuard::new(clocks, || "reading next frame");
            match source.next_frame() {
                Ok(f) => f,
                Err(e) => {
                    warn!(camera_id = %camera.id, error = %e, "frame source failed, stopping pipeline");
                    deps.hub.broadcast(
                        &camera.id,
                        HubMessage::Error {
                            message: format!("camera stream error: {e}"),
                        },
                    );
                    break;
                }
            }
        };
        frame_index += 1;

        let detections = {
            let _t = TimerGuard::new(clocks, || "running detector");
            deps.detector.detect(&frame)
        };
        let persons: Vec<_> = detections.iter().filter(|d| d.class == Class::Person).copied().collect();
        let tracked = tracker.update(&persons);
        let (evaluations, aggregate) = compliance::evaluate(&tracked, &detections, deps.tuneables.ppe_overlap);

        let now = clocks.monotonic();
        let wall_now = clocks.realtime();
        let confidence_scores = json::confidence_scores_for(&detections);

        let mut annotated = frame.rgb.clone();
        annotate::annotate(&mut annotated, &evaluations, &deps.font);

        if sampler.tick(now) {
            for eval in &evaluations {
                if eval.classification == Classification::Compliant {
                    persist_compliance(deps, &camera.id, eval, wall_now, &confidence_scores);
                }
            }
        }

        for eval in &evaluations {
            let key = WorkerKey {
                camera_id: cam_key,
                worker_id: eval.worker_id,
            };
            let decision = deps.violations.observe(key, eval.classification, now);
            if decision == Decision::Emit {
                if let Classification::Violation(kind) = eval.classification {
                    let snapshot_url = {
                        let _t = TimerGuard::new(clocks, || "writing violation snapshot");
                        deps.snapshot_writer.save(&annotated, &camera.id, eval.worker_id, wall_now)
                    };
                    persist_violation(deps, &camera.id, eval, kind, wall_now, &confidence_scores, snapshot_url);
                }
            }
        }

        let jpeg = {
            let _t = TimerGuard::new(clocks, || "encoding outbound jpeg");
            encode_jpeg(&annotated, deps.outbound_jpeg_quality)
        };
        let results = ResultsWire::for_frame(&detections, &aggregate, confidence_scores);
        deps.hub.broadcast(
            &camera.id,
            HubMessage::Frame {
                camera_id: camera.id.clone(),
                jpeg: Arc::new(jpeg),
                aggregate: results,
                timestamp: wall_now,
            },
        );

        if deps.tuneables.stale_sweep_every_n_frames > 0 && frame_index % deps.tuneables.stale_sweep_every_n_frames == 0 {
            deps.violations.sweep(now);
        }

        clocks.sleep(interval);
    }

    // Teardown (§4.10): drop the capture handle (its own `Drop` releases the
    // pipeline), then purge every (camera, worker) timer so a later restart
    // never inherits a stale cooldown.
    drop(source);
    deps.violations.clear_camera(cam_key);
    info!(camera_id = %camera.id, "camera pipeline stopped");
}

fn persist_violation(
    deps: &PipelineDeps,
    camera_id: &str,
    eval: &WorkerEvaluation,
    kind: db::ViolationKind,
    timestamp: jiff::Timestamp,
    confidence_scores: &std::collections::BTreeMap<String, f32>,
    snapshot_url: Option<String>,
) {
    let detection = DetectionFields {
        camera_id: camera_id.to_owned(),
        worker_id: Some(eval.worker_id),
        timestamp,
        hardhat: eval.hardhat,
        no_hardhat: eval.no_hardhat,
        vest: eval.vest,
        no_vest: eval.no_vest,
        person_detected: true,
        is_compliant: false,
        violation_kind: Some(kind),
        confidence_scores: confidence_scores.clone(),
        snapshot_url,
    };
    let severity = kind.severity();
    let message = format!("Worker #{} on {}: {}", eval.worker_id, camera_id, alert_message(kind));
    let alert = AlertFields {
        severity,
        message: message.clone(),
        created_at: timestamp,
    };

    let mut conn = match db::schema::open(&deps.db_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(camera_id, error = %e, "failed to open database for violation write");
            return;
        }
    };
    // Broadcast only after the detection + alert records are committed (§5).
    match db::sink::record_violation(&mut conn, detection, alert) {
        Ok(alert_id) => {
            deps.hub.broadcast(
                camera_id,
                HubMessage::Alert {
                    camera_id: camera_id.to_owned(),
                    alert_id,
                    severity,
                    message,
                    timestamp,
                },
            );
        }
        Err(e) => warn!(camera_id, error = %e, "failed to persist violation"),
    }
}

fn persist_compliance(
    deps: &PipelineDeps,
    camera_id: &str,
    eval: &WorkerEvaluation,
    timestamp: jiff::Timestamp,
    confidence_scores: &std::collections::BTreeMap<String, f32>,
) {
    let detection = DetectionFields {
        camera_id: camera_id.to_owned(),
        worker_id: Some(eval.worker_id),
        timestamp,
        hardhat: eval.hardhat,
        no_hardhat: eval.no_hardhat,
        vest: eval.vest,
        no_vest: eval.no_vest,
        person_detected: true,
        is_compliant: true,
        violation_kind: None,
        confidence_scores: confidence_scores.clone(),
        snapshot_url: None,
    };

    let mut conn = match db::schema::open(&deps.db_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(camera_id, error = %e, "failed to open database for compliance write");
            return;
        }
    };
    if let Err(e) = db::sink::record_compliance(&mut conn, detection) {
        warn!(camera_id, error = %e, "failed to persist compliance sample");
    }
}

fn alert_message(kind: db::ViolationKind) -> &'static str {
    match kind {
        db::ViolationKind::MissingHardhat => "missing hardhat",
        db::ViolationKind::MissingVest => "missing safety vest",
        db::ViolationKind::MissingBoth => "missing hardhat and safety vest",
    }
}

fn encode_jpeg(frame: &image::RgbImage, quality: u8) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
    if let Err(e) = encoder.encode_image(frame) {
        warn!(error = %e, "failed to encode outbound jpeg frame");
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::clock::SimulatedClocks;
    use db::Camera;

    use crate::detector::{Class, DetectionBox, ScriptedDetector};
    use crate::geometry::BBox;
    use crate::snapshot::NullSnapshotWriter;
    use crate::source::ScriptedSource;

    struct TestOpener;

    impl SourceOpener for TestOpener {
        fn open(&self, _resource: &str, _requested_height: u32) -> Result<Box<dyn FrameSource>, base::Error> {
            Ok(Box::new(ScriptedSource::new(vec![(64, 64)])))
        }
    }

    fn test_font() -> Option<rusttype::Font<'static>> {
        for candidate in [
            "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        ] {
            if let Ok(f) = crate::annotate::load_font(std::path::Path::new(candidate)) {
                return Some(f);
            }
        }
        None
    }

    fn det(class: Class, bbox: BBox) -> DetectionBox {
        DetectionBox {
            class,
            confidence: 0.9,
            bbox,
        }
    }

    fn test_camera() -> Camera {
        Camera {
            id: "cam1".to_owned(),
            resource: "rtsp://example.invalid/stream".to_owned(),
            name: "Front Door".to_owned(),
            location: "front".to_owned(),
            enabled: true,
        }
    }

    /// Drives one camera end to end against a scripted source and detector:
    /// subscribing starts the thread, a status then a frame message arrive,
    /// and dropping the last subscriber stops it (§4.10).
    #[test]
    fn camera_pipeline_broadcasts_frames_and_stops_on_last_unsubscribe() {
        let Some(font) = test_font() else { return };
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("db.sqlite3");
        db::schema::open(&db_path).unwrap();

        let clocks: Arc<dyn Clocks> = Arc::new(SimulatedClocks::new(jiff::Timestamp::now()));
        let deps = PipelineDeps {
            db_path,
            clocks,
            detector: ScriptedDetector::new(vec![vec![det(Class::Person, BBox::new(0.0, 0.0, 10.0, 20.0))]]),
            snapshot_writer: Arc::new(NullSnapshotWriter),
            font,
            hub: SubscriberHub::new(),
            violations: Arc::new(ViolationTracker::default()),
            tuneables: Tuneables::default(),
            outbound_jpeg_quality: 60,
            open_source: Arc::new(TestOpener),
        };
        let manager = PipelineManager::new(deps);

        let mut subscription = manager.subscribe(test_camera());
        assert!(manager.is_running("cam1"));

        let status = subscription.rx.blocking_recv().expect("expected a status message");
        assert!(matches!(status, HubMessage::Status { .. }));

        let frame = subscription.rx.blocking_recv().expect("expected a frame message");
        assert!(matches!(frame, HubMessage::Frame { .. }));

        drop(subscription);
        manager.join("cam1");
        assert!(!manager.is_running("cam1"));
    }

    /// A source that fails to open broadcasts an error and never starts a
    /// running task (§4.10 step 1).
    #[test]
    fn failed_open_broadcasts_error_and_exits_cleanly() {
        struct FailingOpener;
        impl SourceOpener for FailingOpener {
            fn open(&self, _resource: &str, _requested_height: u32) -> Result<Box<dyn FrameSource>, base::Error> {
                Err(base::err!(Unavailable, msg("camera offline")))
            }
        }

        let Some(font) = test_font() else { return };
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("db.sqlite3");
        db::schema::open(&db_path).unwrap();

        let clocks: Arc<dyn Clocks> = Arc::new(SimulatedClocks::new(jiff::Timestamp::now()));
        let deps = PipelineDeps {
            db_path,
            clocks,
            detector: ScriptedDetector::new(vec![vec![]]),
            snapshot_writer: Arc::new(NullSnapshotWriter),
            font,
            hub: SubscriberHub::new(),
            violations: Arc::new(ViolationTracker::default()),
            tuneables: Tuneables::default(),
            outbound_jpeg_quality: 60,
            open_source: Arc::new(FailingOpener),
        };
        let manager = PipelineManager::new(deps);

        let mut subscription = manager.subscribe(test_camera());
        let msg = subscription.rx.blocking_recv().expect("expected an error message");
        assert!(matches!(msg, HubMessage::Error { .. }));

        manager.join("cam1");
        assert!(!manager.is_running("cam1"));
    }

    #[test]
    fn camera_key_is_stable_and_distinguishes_ids() {
        assert_eq!(camera_key("cam1"), camera_key("cam1"));
        assert_ne!(camera_key("cam1"), camera_key("cam2"));
    }

    #[test]
    fn frame_interval_zero_fps_is_zero_duration() {
        assert_eq!(frame_interval(0.0), Duration::ZERO);
        assert_eq!(frame_interval(-1.0), Duration::ZERO);
        assert_eq!(frame_interval(10.0), Duration::from_millis(100));
    }
}
