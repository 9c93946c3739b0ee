// src/pipeline.rs
//
// Per-video orchestration: decode, detect+track, count, annotate, report.
// Frame order is the only clock; every stage downstream of the decoder is
// keyed on the frame index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use crossbeam_channel::bounded;
use opencv::core::Mat;
use opencv::videoio::{VideoWriter, VideoWriterTrait};
use tracing::{info, warn};

use crate::annotate;
use crate::backend::DetectAndTrack;
use crate::geometry::Region;
use crate::ledger::LedgerView;
use crate::report::RunReport;
use crate::session::CountingSession;
use crate::types::Config;
use crate::video;

pub struct VideoStats {
    pub frames: u64,
    pub events: u64,
    pub duration_secs: f64,
    pub avg_fps: f64,
    pub counts: LedgerView,
    pub report_path: PathBuf,
    pub cancelled: bool,
}

/// Process one video end to end. `make_backend` receives the processing
/// frame width once the video is open; the production caller builds the
/// ONNX backend there.
pub fn process_video<B, F>(
    video_path: &Path,
    make_backend: F,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<VideoStats>
where
    B: DetectAndTrack,
    F: FnOnce(f32, f32) -> Result<B>,
{
    let started_at = Local::now();
    let start = Instant::now();

    let mut reader = video::open_video(video_path, config.video.resize_factor)?;
    let (frame_w, frame_h) = (reader.width as f32, reader.height as f32);

    let region = if config.counting.region.is_empty() {
        Region::default_center_strip(frame_w, frame_h, config.counting.default_gate_half_width)?
    } else {
        Region::new(config.counting.region.clone())?
    };

    let mut backend = make_backend(frame_w, frame_h)?;
    let mut session = CountingSession::new(region, &config.counting);

    let writer = video::create_writer(&config.video, video_path, reader.width, reader.height, reader.fps)?;

    // Annotated frames go to a dedicated writer thread so encoding does
    // not stall detection. The bounded channel applies backpressure.
    let (frame_tx, writer_handle) = writer.map(spawn_writer).unzip();

    let mut frame_count: u64 = 0;
    let mut event_count: u64 = 0;
    let mut cancelled = false;

    while let Some(frame) = reader.read_frame()? {
        if cancel.load(Ordering::Relaxed) {
            warn!("Cancellation requested, stopping at frame {}", frame_count);
            cancelled = true;
            break;
        }

        let frame_index = frame_count;
        frame_count += 1;

        let objects = backend.detect_and_track(&frame, frame_index)?;
        let events = session.process_frame(&objects, frame_index);

        for event in &events {
            event_count += 1;
            info!(
                "{} crossing: track {} ({}) at frame {} [IN: {} OUT: {}]",
                event.direction.as_str(),
                event.track_id,
                crate::types::class_name(event.class_id).unwrap_or("?"),
                event.frame_index,
                session.ledger().total_in(),
                session.ledger().total_out()
            );
        }

        if frame_count % config.counting.progress_every == 0 {
            info!(
                "Progress: {:.1}% ({}/{}) | tracks: {} | IN: {} OUT: {}",
                reader.progress(),
                reader.current_frame,
                reader.total_frames,
                session.live_tracks(),
                session.ledger().total_in(),
                session.ledger().total_out()
            );
        }

        if let Some(tx) = &frame_tx {
            let annotated = annotate::render(
                &frame.data,
                reader.width,
                reader.height,
                session.region(),
                &objects,
                &events,
                session.ledger(),
            )?;
            if tx.send(annotated).is_err() {
                anyhow::bail!("annotated-frame writer stopped unexpectedly");
            }
        }
    }

    drop(frame_tx);
    if let Some(handle) = writer_handle {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("writer thread panicked"))?
            .context("writing annotated video")?;
    }

    let duration = start.elapsed();
    let avg_fps = if duration.as_secs_f64() > 0.0 {
        frame_count as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    let counts = session.snapshot();
    let report = RunReport::new(
        video_path,
        started_at,
        frame_count,
        avg_fps,
        session.region().points().to_vec(),
        counts.clone(),
        config,
    );
    let report_path = report.write(&config.video.results_dir, video_path)?;

    Ok(VideoStats {
        frames: frame_count,
        events: event_count,
        duration_secs: duration.as_secs_f64(),
        avg_fps,
        counts,
        report_path,
        cancelled,
    })
}

fn spawn_writer(
    mut writer: VideoWriter,
) -> (
    crossbeam_channel::Sender<Mat>,
    std::thread::JoinHandle<Result<(), opencv::Error>>,
) {
    let (tx, rx) = bounded::<Mat>(2);
    let handle = std::thread::spawn(move || -> Result<(), opencv::Error> {
        for mat in rx {
            writer.write(&mat)?;
        }
        writer.release()?;
        Ok(())
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TrackedObject;
    use crate::types::Frame;

    /// Replays a scripted set of observations, one entry per frame.
    struct ReplayBackend {
        frames: Vec<Vec<TrackedObject>>,
    }

    impl DetectAndTrack for ReplayBackend {
        fn detect_and_track(
            &mut self,
            _frame: &Frame,
            frame_index: u64,
        ) -> Result<Vec<TrackedObject>> {
            Ok(self
                .frames
                .get(frame_index as usize)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn obj(track_id: u32, class_id: u32, cx: f32) -> TrackedObject {
        TrackedObject {
            track_id,
            class_id,
            bbox: [cx - 10.0, 40.0, cx + 10.0, 60.0],
            confidence: 0.9,
        }
    }

    #[test]
    fn replayed_observations_drive_the_session() {
        let region = Region::default_center_strip(100.0, 100.0, 5.0).unwrap();
        let counting = crate::types::CountingConfig {
            region: Vec::new(),
            default_gate_half_width: 5.0,
            classes: vec![0, 2],
            history_len: 8,
            max_absence: 60,
            progress_every: 30,
        };
        let mut session = CountingSession::new(region, &counting);
        let mut backend = ReplayBackend {
            frames: vec![
                vec![obj(1, 2, 30.0)],
                vec![obj(1, 2, 50.0)],
                vec![obj(1, 2, 70.0)],
                vec![obj(1, 2, 80.0)],
            ],
        };

        let mut total_events = 0;
        for i in 0..4u64 {
            let frame = Frame {
                data: Vec::new(),
                width: 100,
                height: 100,
                timestamp_ms: i as f64 * 33.3,
            };
            let objects = backend.detect_and_track(&frame, i).unwrap();
            total_events += session.process_frame(&objects, i).len();
        }

        assert_eq!(total_events, 1);
        assert_eq!(session.ledger().total_in(), 1);
    }
}
