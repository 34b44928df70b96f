// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Annotator (C11, §2 "C11 annotate"): draws detection boxes, labels, and
//! worker-ID tags onto a frame before it's broadcast and before a violation
//! snapshot is captured.

use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use crate::compliance::{Classification, WorkerEvaluation};

const COMPLIANT_COLOR: image::Rgb<u8> = image::Rgb([0, 200, 0]);
const VIOLATION_COLOR: image::Rgb<u8> = image::Rgb([220, 30, 30]);
const UNKNOWN_COLOR: image::Rgb<u8> = image::Rgb([200, 180, 0]);

fn color_for(classification: Classification) -> image::Rgb<u8> {
    match classification {
        Classification::Compliant => COMPLIANT_COLOR,
        Classification::Violation(_) => VIOLATION_COLOR,
        Classification::Unknown => UNKNOWN_COLOR,
    }
}

fn label_for(eval: &WorkerEvaluation) -> String {
    match eval.classification {
        Classification::Compliant => format!("#{} OK", eval.worker_id),
        Classification::Violation(kind) => format!("#{} {}", eval.worker_id, kind.as_str()),
        Classification::Unknown => format!("#{} ?", eval.worker_id),
    }
}

/// Draws a bounding box plus a `#worker_id <status>` label for each worker,
/// colored by classification. Mutates `frame` in place.
pub fn annotate(frame: &mut image::RgbImage, evaluations: &[WorkerEvaluation], font: &Font<'static>) {
    let scale = Scale::uniform(16.0);
    for eval in evaluations {
        let color = color_for(eval.classification);
        let b = eval.bbox;
        let rect = Rect::at(b.x1.max(0.0) as i32, b.y1.max(0.0) as i32)
            .of_size((b.x2 - b.x1).max(1.0) as u32, (b.y2 - b.y1).max(1.0) as u32);
        draw_hollow_rect_mut(frame, rect, color);

        let label = label_for(eval);
        let text_y = (b.y1 - 18.0).max(0.0) as i32;
        draw_text_mut(frame, color, b.x1.max(0.0) as i32, text_y, scale, font, &label);
    }
}

/// Loads the label font from `path` (a configured TrueType font file, e.g. a
/// system DejaVu Sans Mono). The annotator needs exactly one font for the
/// process lifetime, so this is called once at startup.
pub fn load_font(path: &std::path::Path) -> Result<Font<'static>, base::Error> {
    let bytes = std::fs::read(path).map_err(base::Error::from)?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| base::err!(Internal, msg("failed to parse annotation font at {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use db::ViolationKind;

    fn eval(worker_id: i64, classification: Classification) -> WorkerEvaluation {
        WorkerEvaluation {
            worker_id,
            bbox: BBox::new(10.0, 10.0, 60.0, 140.0),
            hardhat: false,
            no_hardhat: false,
            vest: false,
            no_vest: false,
            classification,
        }
    }

    #[test]
    fn label_includes_worker_id_and_status() {
        assert_eq!(label_for(&eval(3, Classification::Compliant)), "#3 OK");
        assert_eq!(
            label_for(&eval(3, Classification::Violation(ViolationKind::MissingVest))),
            "#3 MissingVest"
        );
        assert_eq!(label_for(&eval(3, Classification::Unknown)), "#3 ?");
    }

    #[test]
    fn annotate_draws_without_panicking_at_frame_edge() {
        let mut frame = image::RgbImage::new(64, 64);
        let evals = vec![eval(0, Classification::Violation(ViolationKind::MissingHardhat))];
        // Font loading depends on a path the test environment may not have;
        // only exercise draw geometry when a system font is available.
        for candidate in [
            "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        ] {
            if let Ok(font) = load_font(std::path::Path::new(candidate)) {
                annotate(&mut frame, &evals, &font);
                return;
            }
        }
    }
}
