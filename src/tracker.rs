// src/tracker.rs
//
// IoU-based multi-object tracker over per-frame detections.
//
// Design:
//   - Greedy IoU matching (sufficient for <20 objects per frame)
//   - Tracks coast through brief detection gaps
//   - Centroid-distance fallback with strict class matching rescues tracks
//     through fast bbox deformation where IoU collapses
//   - Class identity locks at confirmation so a track cannot hop between
//     car and truck across frames

use tracing::debug;

use crate::backend::{DetectAndTrack, TrackedObject};
use crate::detector::{calculate_iou, Detection, YoloDetector};
use crate::types::{Config, Frame, TrackerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Lost,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: [f32; 4],
    pub state: TrackState,
    pub class_id: u32,
    pub consecutive_hits: u32,
    pub age: u32,
    pub frames_since_hit: u32,
    pub last_confidence: f32,
    /// Class locked at confirmation. Cross-class IoU matches are penalized,
    /// centroid rescues rejected outright.
    confirmed_class_id: Option<u32>,
}

/// IoU penalty multiplier when detection class differs from a confirmed
/// track's locked class. Same-class matches win the greedy assignment
/// when both are available.
const CROSS_CLASS_IOU_PENALTY: f32 = 0.5;

/// Frames a confirmed track may miss before it is demoted to Lost.
const LOST_AFTER_MISSES: u32 = 5;

impl Track {
    fn new(id: u32, det: &Detection) -> Self {
        Self {
            id,
            bbox: det.bbox,
            state: TrackState::Tentative,
            class_id: det.class_id,
            consecutive_hits: 1,
            age: 1,
            frames_since_hit: 0,
            last_confidence: det.confidence,
            confirmed_class_id: None,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    fn update_with_detection(&mut self, det: &Detection, min_hits: u32) {
        self.bbox = det.bbox;
        self.last_confidence = det.confidence;
        self.consecutive_hits += 1;
        self.frames_since_hit = 0;
        self.age += 1;

        // Identity not locked yet, follow the detector
        if self.confirmed_class_id.is_none() {
            self.class_id = det.class_id;
        }

        if self.state == TrackState::Tentative && self.consecutive_hits >= min_hits {
            self.state = TrackState::Confirmed;
            self.confirmed_class_id = Some(self.class_id);
            debug!("Track {} confirmed with class={}", self.id, self.class_id);
        }
        if self.state == TrackState::Lost {
            self.state = TrackState::Confirmed;
            self.consecutive_hits = 1;
        }
    }

    fn mark_missed(&mut self) {
        self.frames_since_hit += 1;
        self.consecutive_hits = 0;
        self.age += 1;
        if self.state == TrackState::Confirmed && self.frames_since_hit > LOST_AFTER_MISSES {
            self.state = TrackState::Lost;
        }
    }
}

pub struct IouTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
    frame_w: f32,
}

impl IouTracker {
    pub fn new(config: TrackerConfig, frame_w: f32) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
            frame_w,
        }
    }

    /// Process one frame of detections. Returns the confirmed tracks.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackedObject> {
        // ── Phase 1: greedy IoU matching ──
        let mut matched_track: Vec<bool> = vec![false; self.tracks.len()];
        let mut matched_det: Vec<bool> = vec![false; detections.len()];

        let mut iou_pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                let raw_iou = calculate_iou(&track.bbox, &det.bbox);
                if raw_iou < self.config.min_iou {
                    continue;
                }

                let effective_iou = match track.confirmed_class_id {
                    Some(locked) if locked != det.class_id => raw_iou * CROSS_CLASS_IOU_PENALTY,
                    _ => raw_iou,
                };
                if effective_iou >= self.config.min_iou {
                    iou_pairs.push((ti, di, effective_iou));
                }
            }
        }
        iou_pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let min_hits = self.config.min_hits_to_confirm;
        for (ti, di, _score) in &iou_pairs {
            if matched_track[*ti] || matched_det[*di] {
                continue;
            }
            matched_track[*ti] = true;
            matched_det[*di] = true;
            self.tracks[*ti].update_with_detection(&detections[*di], min_hits);
        }

        // ── Phase 2: centroid-distance fallback ──
        // No geometric overlap validates the match here, so class agreement
        // is the only identity signal and cross-class pairs are rejected.
        let max_dist_px = self.frame_w * self.config.max_centroid_distance_ratio;
        let max_dist_sq = max_dist_px * max_dist_px;

        let mut centroid_pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            if matched_track[ti] {
                continue;
            }
            let required_class = track.confirmed_class_id.unwrap_or(track.class_id);
            let (tcx, tcy) = track.center();

            for (di, det) in detections.iter().enumerate() {
                if matched_det[di] || det.class_id != required_class {
                    continue;
                }
                let dcx = (det.bbox[0] + det.bbox[2]) * 0.5;
                let dcy = (det.bbox[1] + det.bbox[3]) * 0.5;
                let dist_sq = (tcx - dcx).powi(2) + (tcy - dcy).powi(2);
                if dist_sq < max_dist_sq {
                    centroid_pairs.push((ti, di, dist_sq));
                }
            }
        }
        centroid_pairs.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        for (ti, di, dist_sq) in &centroid_pairs {
            if matched_track[*ti] || matched_det[*di] {
                continue;
            }
            matched_track[*ti] = true;
            matched_det[*di] = true;
            debug!(
                "Centroid rescue: track {} ↔ det (dist={:.0}px, class={})",
                self.tracks[*ti].id,
                dist_sq.sqrt(),
                detections[*di].class_id
            );
            self.tracks[*ti].update_with_detection(&detections[*di], min_hits);
        }

        // ── Unmatched tracks coast ──
        for (ti, matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracks[ti].mark_missed();
            }
        }

        // ── Unmatched detections start new tracks ──
        for (di, matched) in matched_det.iter().enumerate() {
            if !matched {
                let track = Track::new(self.next_id, &detections[di]);
                debug!(
                    "New track {} created: class={}, bbox=[{:.0},{:.0},{:.0},{:.0}]",
                    self.next_id,
                    track.class_id,
                    track.bbox[0],
                    track.bbox[1],
                    track.bbox[2],
                    track.bbox[3]
                );
                self.next_id += 1;
                self.tracks.push(track);
            }
        }

        // ── Prune dead tracks ──
        let max_coast = self.config.max_coast_frames;
        let min_hits = self.config.min_hits_to_confirm;
        self.tracks.retain(|t| {
            if t.frames_since_hit > max_coast {
                debug!("Track {} pruned (coasted {} frames)", t.id, t.frames_since_hit);
                return false;
            }
            if t.state == TrackState::Tentative && t.age > min_hits * 3 {
                debug!("Track {} pruned (tentative too long: age={})", t.id, t.age);
                return false;
            }
            true
        });

        // Only confirmed tracks are observations the counting core may see.
        // Coasting tracks have no fresh detection behind them this frame.
        self.tracks
            .iter()
            .filter(|t| t.is_confirmed() && t.frames_since_hit == 0)
            .map(|t| TrackedObject {
                track_id: t.id,
                class_id: t.class_id,
                bbox: t.bbox,
                confidence: t.last_confidence,
            })
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

// ============================================================================
// ONNX BACKEND
// ============================================================================

/// The production detector+tracker pair: YOLO via onnxruntime, greedy IoU
/// association on top.
pub struct OnnxBackend {
    detector: YoloDetector,
    tracker: IouTracker,
    confidence_threshold: f32,
}

impl OnnxBackend {
    pub fn new(config: &Config, frame_w: f32) -> anyhow::Result<Self> {
        let detector = YoloDetector::new(&config.model, config.detection.nms_iou_threshold)?;
        let tracker = IouTracker::new(config.tracker.clone(), frame_w);
        Ok(Self {
            detector,
            tracker,
            confidence_threshold: config.detection.confidence_threshold,
        })
    }
}

impl DetectAndTrack for OnnxBackend {
    fn detect_and_track(
        &mut self,
        frame: &Frame,
        _frame_index: u64,
    ) -> anyhow::Result<Vec<TrackedObject>> {
        let detections = self.detector.detect(
            &frame.data,
            frame.width,
            frame.height,
            self.confidence_threshold,
        )?;
        Ok(self.tracker.update(&detections))
    }
}

// ============================================================================
// TESTS
// ============================================================================
