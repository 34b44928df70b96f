// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Frame source (C1): turns a camera's resource string into a stream of
//! decoded frames, backed by a GStreamer capture pipeline.

use std::path::Path;
use std::sync::Mutex;

use base::{bail, err, Error};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;

use crate::detector::Frame;

const KNOWN_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm"];

/// How a resource string was interpreted (§4.1).
#[derive(Clone, Debug, PartialEq, Eq)]
enum Resource {
    Device(u32),
    File(String),
    Url(String),
}

fn classify(resource: &str) -> Resource {
    if let Ok(index) = resource.parse::<u32>() {
        return Resource::Device(index);
    }
    let has_video_ext = Path::new(resource)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| KNOWN_VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if has_video_ext && Path::new(resource).exists() {
        return Resource::File(resource.to_owned());
    }
    Resource::Url(resource.to_owned())
}

/// Contract for C1 (§4.1): open once, then pull frames until EOF or error.
/// Implementations loop finite files internally; `next_frame` only returns
/// `Ok(None)` for genuinely unbounded live sources that ended unexpectedly.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Frame, Error>;
}

/// Opens a `FrameSource` for a camera's resource string. The stream
/// lifecycle manager (C10) holds one of these rather than calling
/// `GstSource::open` directly, so tests can substitute a scripted source
/// without a real GStreamer pipeline.
pub trait SourceOpener: Send + Sync {
    fn open(&self, resource: &str, requested_height: u32) -> Result<Box<dyn FrameSource>, Error>;
}

/// The production opener, backed by `GstSource`.
pub struct GstOpener;

impl SourceOpener for GstOpener {
    fn open(&self, resource: &str, requested_height: u32) -> Result<Box<dyn FrameSource>, Error> {
        Ok(Box::new(GstSource::open(resource, requested_height)?))
    }
}

/// A GStreamer-backed capture pipeline: `<src> ! decodebin ! videoconvert !
/// appsink` pulling RGB buffers synchronously from the calling thread.
pub struct GstSource {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    finite_file: bool,
}

impl GstSource {
    /// Opens a capture handle for `resource` (§4.1). `requested_height` is a
    /// hint; the source proceeds at whatever the device or file actually
    /// yields.
    pub fn open(resource: &str, requested_height: u32) -> Result<Self, Error> {
        gstreamer::init().map_err(|e| err!(Internal, msg("gstreamer init failed"), source(e)))?;

        let (src_desc, finite_file) = match classify(resource) {
            Resource::Device(index) => (format!("v4l2src device=/dev/video{index}"), false),
            Resource::File(path) => (format!("filesrc location={path}"), true),
            Resource::Url(url) => (format!("uridecodebin uri={url}"), false),
        };

        let pipeline_desc = format!(
            "{src_desc} ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB,height={requested_height} ! \
             appsink name=sink sync=false max-buffers=2 drop=true"
        );

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| err!(Unavailable, msg(format!("failed to build pipeline for {resource}")), source(e)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| err!(Unavailable, msg("pipeline is not a top-level Pipeline")))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| err!(Unavailable, msg("appsink element missing")))?
            .downcast::<AppSink>()
            .map_err(|_| err!(Unavailable, msg("sink element is not an AppSink")))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| err!(Unavailable, msg(format!("failed to start pipeline for {resource}")), source(e)))?;

        Ok(GstSource {
            pipeline,
            appsink,
            finite_file,
        })
    }

    fn rewind(&mut self) -> Result<(), Error> {
        self.pipeline
            .seek_simple(
                gstreamer::SeekFlags::FLUSH,
                gstreamer::ClockTime::ZERO,
            )
            .map_err(|e| err!(Aborted, msg("failed to rewind finite file"), source(e)))
    }
}

impl FrameSource for GstSource {
    fn next_frame(&mut self) -> Result<Frame, Error> {
        loop {
            match self.appsink.try_pull_sample(gstreamer::ClockTime::from_seconds(2)) {
                Some(sample) => {
                    let caps = sample
                        .caps()
                        .ok_or_else(|| err!(Aborted, msg("sample missing caps")))?;
                    let s = caps.structure(0).ok_or_else(|| err!(Aborted, msg("caps missing structure")))?;
                    let width: i32 = s.get("width").map_err(|_| err!(Aborted, msg("caps missing width")))?;
                    let height: i32 = s.get("height").map_err(|_| err!(Aborted, msg("caps missing height")))?;
                    let buffer = sample.buffer().ok_or_else(|| err!(Aborted, msg("sample missing buffer")))?;
                    let map = buffer
                        .map_readable()
                        .map_err(|e| err!(Aborted, msg("failed to map buffer"), source(e)))?;
                    let rgb = image::RgbImage::from_raw(width as u32, height as u32, map.as_slice().to_vec())
                        .ok_or_else(|| err!(Aborted, msg("buffer size does not match caps")))?;
                    return Ok(Frame {
                        width: width as u32,
                        height: height as u32,
                        rgb,
                    });
                }
                None if self.finite_file => {
                    self.rewind()?;
                    continue;
                }
                None => {
                    bail!(Aborted, msg("stream ended without EOF"));
                }
            }
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// A `FrameSource` that replays a fixed list of in-memory frames, looping
/// like a finite file. Used by pipeline tests that should not depend on
/// GStreamer or real hardware.
pub struct ScriptedSource {
    frames: Vec<(u32, u32)>,
    index: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(sizes: Vec<(u32, u32)>) -> Self {
        ScriptedSource {
            frames: sizes,
            index: Mutex::new(0),
        }
    }

    pub fn unavailable() -> Result<Self, Error> {
        Err(err!(Unavailable, msg("scripted source configured to fail open")))
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Frame, Error> {
        if self.frames.is_empty() {
            bail!(Unavailable, msg("scripted source has no frames"));
        }
        let mut i = self.index.lock().unwrap();
        let (w, h) = self.frames[*i % self.frames.len()];
        *i += 1;
        Ok(Frame {
            width: w,
            height: h,
            rgb: image::RgbImage::new(w, h),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_integer_as_device() {
        assert_eq!(classify("0"), Resource::Device(0));
        assert_eq!(classify("2"), Resource::Device(2));
    }

    #[test]
    fn classifies_unknown_string_as_url() {
        assert_eq!(
            classify("rtsp://example.invalid/stream"),
            Resource::Url("rtsp://example.invalid/stream".to_owned())
        );
    }

    #[test]
    fn scripted_source_loops() {
        let mut s = ScriptedSource::new(vec![(640, 480), (1280, 720)]);
        let a = s.next_frame().unwrap();
        let b = s.next_frame().unwrap();
        let c = s.next_frame().unwrap();
        assert_eq!((a.width, a.height), (640, 480));
        assert_eq!((b.width, b.height), (1280, 720));
        assert_eq!((c.width, c.height), (640, 480));
    }
}
