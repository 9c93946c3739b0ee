// src/backend.rs
//
// Boundary with the external detector+tracker. The counting core consumes
// TrackedObject and nothing else, so any backend (ONNX model + IoU
// association, a learned tracker, a replay file in tests) can be swapped in.

use anyhow::Result;

use crate::geometry::Point;
use crate::types::Frame;

/// One tracked observation in one frame. This is the pinned canonical
/// schema at the boundary; backends normalize into it exactly once.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    /// Stable across consecutive frames for the same physical object, for
    /// as long as the tracker can maintain it. Opaque; may be reused after
    /// a track dies.
    pub track_id: u32,
    pub class_id: u32,
    /// [x1, y1, x2, y2] in processing-frame pixels
    pub bbox: [f32; 4],
    pub confidence: f32,
}

impl TrackedObject {
    pub fn centroid(&self) -> Point {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }
}

/// Capability interface for the external detector+tracker pair.
pub trait DetectAndTrack {
    fn detect_and_track(&mut self, frame: &Frame, frame_index: u64)
        -> Result<Vec<TrackedObject>>;
}
