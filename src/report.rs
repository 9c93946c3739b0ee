// src/report.rs
//
// Per-video results file, written next to the annotated output so a run
// can be audited without replaying the video.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::ledger::LedgerView;
use crate::types::Config;

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub video: String,
    pub started_at: String,
    pub finished_at: String,
    pub frames_processed: u64,
    pub fps: f64,
    pub gate: Vec<(f32, f32)>,
    pub counts: LedgerView,
    pub config: Config,
}

impl RunReport {
    pub fn new(
        video: &Path,
        started_at: chrono::DateTime<Local>,
        frames_processed: u64,
        fps: f64,
        gate: Vec<(f32, f32)>,
        counts: LedgerView,
        config: &Config,
    ) -> Self {
        Self {
            run_id: started_at.format("%Y%m%d_%H%M%S").to_string(),
            video: video.display().to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Local::now().to_rfc3339(),
            frames_processed,
            fps,
            gate,
            counts,
            config: config.clone(),
        }
    }

    pub fn write(&self, results_dir: &str, video: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(results_dir)
            .with_context(|| format!("creating results dir {}", results_dir))?;

        let stem = video
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let path = PathBuf::from(results_dir).join(format!("{}_{}.json", stem, self.run_id));

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

        info!("Results written: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CountingLedger;

    #[test]
    fn report_serializes_counts_by_name() {
        use crate::crossing::{CrossingEvent, Direction};

        let mut ledger = CountingLedger::new();
        ledger.apply(&CrossingEvent {
            track_id: 1,
            class_id: 2,
            direction: Direction::In,
            frame_index: 10,
        });

        let view = ledger.snapshot();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["total_in"], 1);
        assert_eq!(json["by_class"]["car"]["in"], 1);
        assert_eq!(json["by_class"]["car"]["total"], 1);
    }
}
