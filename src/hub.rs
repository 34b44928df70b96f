// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Subscriber hub (C9, §4.9): per-camera subscriber set, broadcasting
//! status/frame/alert/error messages with a fire-and-forget backpressure
//! policy — a slow subscriber is disconnected, never blocking the pipeline.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use base::Mutex;
use tokio::sync::mpsc;

use db::Severity;

/// A message sent to one subscriber (§4.9 "message kinds").
#[derive(Clone, Debug)]
pub enum Message {
    Status { message: String },
    Frame {
        camera_id: String,
        jpeg: Arc<Vec<u8>>,
        aggregate: crate::json::ResultsWire,
        timestamp: jiff::Timestamp,
    },
    Alert {
        camera_id: String,
        alert_id: i64,
        severity: Severity,
        message: String,
        timestamp: jiff::Timestamp,
    },
    Error { message: String },
}

/// Bound on a subscriber's outbound queue. A subscriber that falls this far
/// behind is treated as unresponsive and dropped.
const SUBSCRIBER_QUEUE_DEPTH: usize = 8;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Message>,
}

/// Per-camera subscriber set plus the two booleans the lifecycle manager
/// reads to decide whether a pipeline task should be running (§4.9).
struct CameraState {
    subscribers: Vec<Subscriber>,
    is_running: bool,
    stop_requested: bool,
}

impl Default for CameraState {
    fn default() -> Self {
        CameraState {
            subscribers: Vec::new(),
            is_running: false,
            stop_requested: false,
        }
    }
}

pub struct Subscription {
    pub rx: mpsc::Receiver<Message>,
    camera_id: String,
    id: u64,
    hub: Arc<SubscriberHub>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.camera_id, self.id);
    }
}

/// Fan-out registry, one instance shared across all cameras.
pub struct SubscriberHub {
    cameras: Mutex<HashMap<String, CameraState>>,
    counter: std::sync::atomic::AtomicU64,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        SubscriberHub {
            cameras: Mutex::new(HashMap::new()),
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl SubscriberHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new subscriber for `camera_id`, returning the current
    /// subscriber count (including this one) and a `Subscription` handle
    /// whose drop unsubscribes automatically.
    pub fn subscribe(self: &Arc<Self>, camera_id: &str) -> (usize, Subscription) {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let mut cameras = self.cameras.lock();
        let state = cameras.entry(camera_id.to_owned()).or_default();
        state.subscribers.push(Subscriber { id, tx });
        let count = state.subscribers.len();
        drop(cameras);
        (
            count,
            Subscription {
                rx,
                camera_id: camera_id.to_owned(),
                id,
                hub: Arc::clone(self),
            },
        )
    }

    fn unsubscribe(&self, camera_id: &str, id: u64) {
        let mut cameras = self.cameras.lock();
        if let Some(state) = cameras.get_mut(camera_id) {
            state.subscribers.retain(|s| s.id != id);
            if state.subscribers.is_empty() {
                state.is_running = false;
            }
        }
    }

    /// Sends `message` to every current subscriber of `camera_id`. A
    /// subscriber whose queue is full is dropped rather than awaited — the
    /// hub never blocks the pipeline on a slow client (§4.9, P7).
    pub fn broadcast(&self, camera_id: &str, message: Message) {
        let recipients: Vec<mpsc::Sender<Message>> = {
            let cameras = self.cameras.lock();
            match cameras.get(camera_id) {
                Some(state) => state.subscribers.iter().map(|s| s.tx.clone()).collect(),
                None => return,
            }
        };
        for tx in recipients {
            let _ = tx.try_send(message.clone());
        }
    }

    pub fn subscriber_count(&self, camera_id: &str) -> usize {
        self.cameras.lock().get(camera_id).map_or(0, |s| s.subscribers.len())
    }

    /// Marks the camera as having a running pipeline task. Called by the
    /// lifecycle manager under its own start/stop lock.
    pub fn set_running(&self, camera_id: &str, running: bool) {
        let mut cameras = self.cameras.lock();
        cameras.entry(camera_id.to_owned()).or_default().is_running = running;
    }

    pub fn is_running(&self, camera_id: &str) -> bool {
        self.cameras.lock().get(camera_id).map_or(false, |s| s.is_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_increments_count_and_unsubscribe_on_drop_decrements() {
        let hub = SubscriberHub::new();
        let (count1, sub1) = hub.subscribe("cam1");
        assert_eq!(count1, 1);
        let (count2, sub2) = hub.subscribe("cam1");
        assert_eq!(count2, 2);
        drop(sub1);
        assert_eq!(hub.subscriber_count("cam1"), 1);
        drop(sub2);
        assert_eq!(hub.subscriber_count("cam1"), 0);
    }

    #[tokio::test]
    async fn broadcast_delivers_to_all_subscribers() {
        let hub = SubscriberHub::new();
        let (_, mut sub1) = hub.subscribe("cam1");
        let (_, mut sub2) = hub.subscribe("cam1");
        hub.broadcast(
            "cam1",
            Message::Status {
                message: "connected".to_owned(),
            },
        );
        assert!(matches!(sub1.rx.recv().await, Some(Message::Status { .. })));
        assert!(matches!(sub2.rx.recv().await, Some(Message::Status { .. })));
    }

    #[tokio::test]
    async fn broadcast_to_unknown_camera_is_a_noop() {
        let hub = SubscriberHub::new();
        hub.broadcast(
            "cam-nonexistent",
            Message::Error {
                message: "should not panic".to_owned(),
            },
        );
    }

    #[tokio::test]
    async fn unsubscribing_last_subscriber_clears_running() {
        let hub = SubscriberHub::new();
        hub.set_running("cam1", true);
        let (_, sub) = hub.subscribe("cam1");
        drop(sub);
        assert!(!hub.is_running("cam1"));
    }
}
