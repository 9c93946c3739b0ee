// src/annotate.rs
//
// Overlay for the annotated output video: gate polygon, tracked boxes
// with id and class, and a running IN/OUT banner.

use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};

use crate::backend::TrackedObject;
use crate::crossing::CrossingEvent;
use crate::geometry::Region;
use crate::ledger::CountingLedger;
use crate::types::class_name;

fn gate_color(flashing: bool) -> core::Scalar {
    if flashing {
        core::Scalar::new(0.0, 0.0, 255.0, 0.0) // red on event frames
    } else {
        core::Scalar::new(0.0, 255.0, 255.0, 0.0) // yellow
    }
}

fn class_color(class_id: u32) -> core::Scalar {
    match class_id {
        0 => core::Scalar::new(0.0, 255.0, 0.0, 0.0),   // person: green
        1 => core::Scalar::new(255.0, 255.0, 0.0, 0.0), // bicycle: cyan
        2 => core::Scalar::new(255.0, 0.0, 0.0, 0.0),   // car: blue
        3 => core::Scalar::new(255.0, 0.0, 255.0, 0.0), // motorcycle: magenta
        5 => core::Scalar::new(0.0, 165.0, 255.0, 0.0), // bus: orange
        7 => core::Scalar::new(0.0, 64.0, 255.0, 0.0),  // truck: red-orange
        _ => core::Scalar::new(200.0, 200.0, 200.0, 0.0),
    }
}

/// Render the RGB frame back to a BGR Mat with counting overlays.
pub fn render(
    frame: &[u8],
    width: i32,
    height: i32,
    region: &Region,
    objects: &[TrackedObject],
    events: &[CrossingEvent],
    ledger: &CountingLedger,
) -> Result<Mat> {
    let mat = Mat::from_slice(frame)?;
    let mat = mat.reshape(3, height)?;

    let mut output = Mat::default();
    imgproc::cvt_color(&mat, &mut output, imgproc::COLOR_RGB2BGR, 0)?;

    // Gate polygon; flashes red on frames that produced an event
    let gate_color = gate_color(!events.is_empty());
    let points = region.points();
    for i in 0..points.len() {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % points.len()];
        imgproc::line(
            &mut output,
            core::Point::new(x1 as i32, y1 as i32),
            core::Point::new(x2 as i32, y2 as i32),
            gate_color,
            2,
            imgproc::LINE_AA,
            0,
        )?;
    }

    // Tracked boxes with id and class label
    for obj in objects {
        let color = class_color(obj.class_id);
        let rect = core::Rect::new(
            obj.bbox[0] as i32,
            obj.bbox[1] as i32,
            obj.width() as i32,
            obj.height() as i32,
        );
        imgproc::rectangle(&mut output, rect, color, 2, imgproc::LINE_8, 0)?;

        let label = format!(
            "#{} {}",
            obj.track_id,
            class_name(obj.class_id).unwrap_or("?")
        );
        imgproc::put_text(
            &mut output,
            &label,
            core::Point::new(obj.bbox[0] as i32, (obj.bbox[1] as i32 - 6).max(12)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_8,
            false,
        )?;

        let (cx, cy) = obj.centroid();
        imgproc::circle(
            &mut output,
            core::Point::new(cx as i32, cy as i32),
            3,
            color,
            -1,
            imgproc::LINE_8,
            0,
        )?;
    }

    // Banner with running totals
    imgproc::rectangle(
        &mut output,
        core::Rect::new(5, 5, 300, 40),
        core::Scalar::new(40.0, 40.0, 40.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::put_text(
        &mut output,
        &format!("IN: {}  OUT: {}", ledger.total_in(), ledger.total_out()),
        core::Point::new(15, 32),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        core::Scalar::new(255.0, 255.0, 255.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;

    Ok(output)
}
