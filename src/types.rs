// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub tracker: TrackerConfig,
    pub counting: CountingConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub input_size: usize,
    pub num_threads: usize,
    pub use_cuda: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Minimum IoU to match a detection to an existing track
    pub min_iou: f32,
    /// Frames a track survives without a detection before deletion
    pub max_coast_frames: u32,
    /// Consecutive hits required to promote Tentative → Confirmed
    pub min_hits_to_confirm: u32,
    /// Maximum centroid distance (fraction of frame width) for the
    /// fallback match when IoU fails
    pub max_centroid_distance_ratio: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.2,
            max_coast_frames: 30,
            min_hits_to_confirm: 2,
            max_centroid_distance_ratio: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountingConfig {
    /// Gate polygon in processing-resolution pixel coordinates, ≥3 points.
    /// Empty means "use the default vertical center strip".
    #[serde(default)]
    pub region: Vec<(f32, f32)>,
    /// Half-width of the default center strip when `region` is empty
    pub default_gate_half_width: f32,
    /// COCO class ids to count
    pub classes: Vec<u32>,
    /// Centroid history kept per track
    pub history_len: usize,
    /// Frames a track id may be absent before its history is evicted
    pub max_absence: u64,
    /// Progress is reported every this many frames
    pub progress_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub results_dir: String,
    /// Downscale factor applied before detection and counting
    pub resize_factor: f32,
    pub save_annotated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One decoded video frame in RGB24, already at processing resolution.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

// ============================================================================
// CLASS CATALOG
// ============================================================================

/// COCO subset handled by this system. Anything else coming out of the
/// detector is outside the catalog and gets dropped at the boundary.
pub const CLASS_CATALOG: [(u32, &str); 6] = [
    (0, "person"),
    (1, "bicycle"),
    (2, "car"),
    (3, "motorcycle"),
    (5, "bus"),
    (7, "truck"),
];

pub fn class_name(class_id: u32) -> Option<&'static str> {
    CLASS_CATALOG
        .iter()
        .find(|(id, _)| *id == class_id)
        .map(|(_, name)| *name)
}

pub fn in_catalog(class_id: u32) -> bool {
    class_name(class_id).is_some()
}
