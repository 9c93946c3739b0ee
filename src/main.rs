// src/main.rs

mod annotate;
mod backend;
mod config;
mod crossing;
mod detector;
mod error;
mod geometry;
mod ledger;
mod pipeline;
mod report;
mod session;
mod track_store;
mod tracker;
mod types;
mod video;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use tracker::OnnxBackend;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("gatecount={},ort=warn", config.logging.level))
        .init();

    info!("🚦 Gate Counting System Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Counting classes: {:?} | confidence >= {:.2}",
        config.counting.classes, config.detection.confidence_threshold
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, finishing current frame and shutting down");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let video_files = video::find_video_files(&config.video)?;
    if video_files.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }

    let mut grand_in: u64 = 0;
    let mut grand_out: u64 = 0;

    for (idx, video_path) in video_files.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!("Shutdown requested, skipping remaining videos");
            break;
        }

        info!("========================================");
        info!(
            "Processing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );
        info!("========================================");

        let result = pipeline::process_video(
            video_path,
            |frame_w, _frame_h| OnnxBackend::new(&config, frame_w),
            &config,
            &cancel,
        );

        match result {
            Ok(stats) => {
                info!("✓ Video processed{}", if stats.cancelled { " (partial)" } else { "" });
                info!("  Frames: {}", stats.frames);
                info!("  Crossings: {}", stats.events);
                info!(
                    "  IN: {} OUT: {}",
                    stats.counts.total_in, stats.counts.total_out
                );
                for (name, counts) in &stats.counts.by_class {
                    info!("    {}: in={} out={}", name, counts.in_count, counts.out_count);
                }
                info!("  Processing speed: {:.1} FPS", stats.avg_fps);
                info!("  Report: {}", stats.report_path.display());

                grand_in += stats.counts.total_in;
                grand_out += stats.counts.total_out;
            }
            Err(e) => {
                error!("Failed to process video: {:#}", e);
            }
        }
    }

    info!("📊 Run complete: IN={} OUT={} across all videos", grand_in, grand_out);
    Ok(())
}
