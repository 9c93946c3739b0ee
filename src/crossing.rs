// src/crossing.rs
//
// The stateful core: turns per-frame tracked observations into crossing
// events. A crossing is only counted when a track's last outer side and
// its new outer side are opposite, meaning both gate boundaries were
// crossed in one direction. Entering the strip arms nothing by itself,
// so jitter across a single boundary (Before→Inside→Before) can never count.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::backend::TrackedObject;
use crate::geometry::{GateSide, Region};
use crate::track_store::TrackStateStore;
use crate::types::in_catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Before → After crossing (left-to-right for a vertical gate)
    In,
    /// After → Before crossing
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

/// One confirmed gate crossing. Ephemeral: applied to the ledger and
/// dropped.
#[derive(Debug, Clone, Copy)]
pub struct CrossingEvent {
    pub track_id: u32,
    pub class_id: u32,
    pub direction: Direction,
    pub frame_index: u64,
}

pub struct CrossingDetector {
    region: Region,
    /// Classes that participate in counting; everything else is skipped
    allow_list: Vec<u32>,
}

impl CrossingDetector {
    pub fn new(region: Region, allow_list: Vec<u32>) -> Self {
        Self { region, allow_list }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Consume one frame's tracked observations and emit at most one
    /// crossing event per track id.
    pub fn process(
        &self,
        detections: &[TrackedObject],
        frame_index: u64,
        store: &mut TrackStateStore,
    ) -> Vec<CrossingEvent> {
        let mut events = Vec::new();
        let mut seen_ids: HashSet<u32> = HashSet::with_capacity(detections.len());

        for det in detections {
            if !seen_ids.insert(det.track_id) {
                warn!(
                    "Duplicate track id {} in frame {}, dropping duplicate",
                    det.track_id, frame_index
                );
                continue;
            }

            // Malformed detection: dropped with a warning, never fatal
            if det.width() <= 0.0 || det.height() <= 0.0 {
                warn!(
                    "Dropping zero-area detection (track {}, frame {})",
                    det.track_id, frame_index
                );
                continue;
            }
            if !in_catalog(det.class_id) {
                warn!(
                    "Dropping detection with out-of-catalog class {} (track {}, frame {})",
                    det.class_id, det.track_id, frame_index
                );
                continue;
            }

            // Outside the allow-list is not an anomaly, just not counted
            if !self.allow_list.contains(&det.class_id) {
                continue;
            }

            let (previous, current) =
                store.update(det.track_id, det.centroid(), frame_index, &self.region);

            if let Some(direction) = self.decide(det.track_id, previous, current, store) {
                debug!(
                    "Track {} crossed {} at frame {} (class {}, {}→{})",
                    det.track_id,
                    direction.as_str(),
                    frame_index,
                    det.class_id,
                    previous.as_str(),
                    current.as_str()
                );
                events.push(CrossingEvent {
                    track_id: det.track_id,
                    class_id: det.class_id,
                    direction,
                    frame_index,
                });
            }
        }

        events
    }

    /// The transition rule. `previous`/`current` are committed sides from
    /// the store; the history's `last_outer` holds the arming side.
    fn decide(
        &self,
        track_id: u32,
        previous: GateSide,
        current: GateSide,
        store: &mut TrackStateStore,
    ) -> Option<Direction> {
        // First observation: record, never count, even when the track
        // starts Inside, since it never crossed the entry boundary.
        if previous == GateSide::Unknown {
            if current.is_outer() {
                if let Some(h) = store.get_mut(track_id) {
                    h.last_outer = Some(current);
                }
            }
            return None;
        }

        if !current.is_outer() {
            // Still inside the strip (or holding a boundary), undecided
            return None;
        }

        let history = store.get_mut(track_id)?;
        let armed = history.last_outer;
        history.last_outer = Some(current);

        let direction = match armed {
            // Full traversal: opposite outer sides in temporal order
            Some(GateSide::Before) if current == GateSide::After => Direction::In,
            Some(GateSide::After) if current == GateSide::Before => Direction::Out,
            // Same outer side again (jitter, or wandered back out the way
            // it came) or never armed (first seen Inside)
            _ => return None,
        };

        // The recorded motion has to back the side transition: the net
        // displacement across the centroid buffer settles the direction
        // of travel, not a single-frame delta. An id switch can hand a
        // history an arming side its own motion never produced; such a
        // claim is refused here.
        let oldest = *history.centroids.front()?;
        let newest = *history.centroids.back()?;
        let net = self.region.signed_offset(newest) - self.region.signed_offset(oldest);
        let agrees = match direction {
            Direction::In => net > 0.0,
            Direction::Out => net < 0.0,
        };
        if !agrees {
            warn!(
                "Track {} claims a {} crossing but its net displacement is {:+.1}px, not counting",
                track_id,
                direction.as_str(),
                net
            );
            return None;
        }

        // Crossing consumed: the newest position becomes the displacement
        // baseline for a later return crossing by the same id.
        while history.centroids.len() > 1 {
            history.centroids.pop_front();
        }

        Some(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> Region {
        // Vertical gate at x=50±5 in a 100x100 frame
        Region::new(vec![(45.0, 0.0), (55.0, 0.0), (55.0, 100.0), (45.0, 100.0)]).unwrap()
    }

    fn detector() -> CrossingDetector {
        CrossingDetector::new(gate(), vec![0, 1, 2, 3, 5, 7])
    }

    fn obj(track_id: u32, class_id: u32, cx: f32) -> TrackedObject {
        TrackedObject {
            track_id,
            class_id,
            bbox: [cx - 4.0, 46.0, cx + 4.0, 54.0],
            confidence: 0.9,
        }
    }

    #[test]
    fn single_crossing_counts_once() {
        // Person at x=40, then x=54 (inside the strip), then x=70 → one IN
        let det = detector();
        let mut store = TrackStateStore::new(8);

        let e1 = det.process(&[obj(1, 0, 40.0)], 1, &mut store);
        let e2 = det.process(&[obj(1, 0, 54.0)], 2, &mut store);
        let e3 = det.process(&[obj(1, 0, 70.0)], 3, &mut store);

        assert!(e1.is_empty(), "first observation never counts");
        assert!(e2.is_empty(), "inside the gate is undecided");
        assert_eq!(e3.len(), 1);
        assert_eq!(e3[0].direction, Direction::In);
        assert_eq!(e3[0].class_id, 0);
        assert_eq!(e3[0].track_id, 1);
    }

    #[test]
    fn skipped_inside_frame_still_counts() {
        // Before → After directly, the Inside frame was missed
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 2, 30.0)], 1, &mut store);
        let events = det.process(&[obj(1, 2, 80.0)], 2, &mut store);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::In);
    }

    #[test]
    fn jitter_across_one_boundary_never_counts() {
        // Car at x=60 → x=50 (inside) → x=60 oscillation → zero events
        let det = detector();
        let mut store = TrackStateStore::new(8);

        let mut total = 0;
        for (frame, x) in [(1u64, 60.0f32), (2, 50.0), (3, 60.0), (4, 50.0), (5, 60.0)] {
            total += det.process(&[obj(2, 2, x)], frame, &mut store).len();
        }
        assert_eq!(total, 0, "oscillation without full traversal must not count");
    }

    #[test]
    fn opposite_directions_same_frame() {
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 0, 40.0), obj(2, 2, 70.0)], 1, &mut store);
        let events = det.process(&[obj(1, 0, 70.0), obj(2, 2, 40.0)], 2, &mut store);

        assert_eq!(events.len(), 2);
        let dirs: Vec<Direction> = events.iter().map(|e| e.direction).collect();
        assert!(dirs.contains(&Direction::In));
        assert!(dirs.contains(&Direction::Out));
    }

    #[test]
    fn round_trip_counts_both_ways() {
        // A long-lived id crossing twice must produce IN then OUT
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 3, 40.0)], 1, &mut store);
        let first = det.process(&[obj(1, 3, 70.0)], 2, &mut store);
        let second = det.process(&[obj(1, 3, 40.0)], 3, &mut store);

        assert_eq!(first[0].direction, Direction::In);
        assert_eq!(second[0].direction, Direction::Out);
    }

    #[test]
    fn first_seen_inside_then_exit_is_not_a_crossing() {
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 0, 50.0)], 1, &mut store);
        let events = det.process(&[obj(1, 0, 70.0)], 2, &mut store);
        assert!(events.is_empty(), "entry boundary was never observed crossed");

        // But a later full traversal from that side does count
        det.process(&[obj(1, 0, 50.0)], 3, &mut store);
        let events = det.process(&[obj(1, 0, 30.0)], 4, &mut store);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Out);
    }

    #[test]
    fn arming_side_contradicted_by_motion_is_refused() {
        // An id switch can leave a history armed on a side its recorded
        // motion never visited. The sides then claim a full traversal,
        // but the centroid buffer shows the object drifting the other
        // way, so no event may be emitted.
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 0, 72.0)], 1, &mut store);
        store.get_mut(1).unwrap().last_outer = Some(GateSide::Before);

        let events = det.process(&[obj(1, 0, 71.0)], 2, &mut store);
        assert!(events.is_empty(), "net displacement is leftward, IN claim refused");
    }

    #[test]
    fn displacement_baseline_resets_after_each_crossing() {
        // Three traversals by one long-lived id: the buffer baseline must
        // restart at every emission or the second crossing's net
        // displacement would cancel against the first.
        let det = detector();
        let mut store = TrackStateStore::new(8);

        let xs = [30.0, 70.0, 30.0, 70.0];
        let mut directions = Vec::new();
        for (frame, x) in xs.iter().enumerate() {
            for e in det.process(&[obj(1, 2, *x)], frame as u64, &mut store) {
                directions.push(e.direction);
            }
        }
        assert_eq!(
            directions,
            vec![Direction::In, Direction::Out, Direction::In]
        );
    }

    #[test]
    fn duplicate_track_id_in_frame_dropped() {
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 0, 40.0)], 1, &mut store);
        // Backend misbehaves: same id twice, both past the gate
        let events = det.process(&[obj(1, 0, 70.0), obj(1, 0, 72.0)], 2, &mut store);
        assert_eq!(events.len(), 1, "at most one event per track per frame");
    }

    #[test]
    fn malformed_and_unknown_detections_absorbed() {
        let det = detector();
        let mut store = TrackStateStore::new(8);

        let zero_area = TrackedObject {
            track_id: 1,
            class_id: 0,
            bbox: [40.0, 50.0, 40.0, 50.0],
            confidence: 0.9,
        };
        let bad_class = TrackedObject {
            track_id: 2,
            class_id: 42,
            bbox: [10.0, 10.0, 20.0, 20.0],
            confidence: 0.9,
        };

        let events = det.process(&[zero_area, bad_class], 1, &mut store);
        assert!(events.is_empty());
        assert!(store.is_empty(), "dropped detections leave no history");
    }

    #[test]
    fn allow_list_filters_classes() {
        let det = CrossingDetector::new(gate(), vec![0]); // persons only
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 2, 40.0)], 1, &mut store);
        let events = det.process(&[obj(1, 2, 70.0)], 2, &mut store);
        assert!(events.is_empty(), "car is outside the allow-list");
    }

    #[test]
    fn eviction_gap_reappearance_emits_nothing() {
        // Id vanishes past max_absence, then reappears on the opposite side
        let det = detector();
        let mut store = TrackStateStore::new(8);

        det.process(&[obj(1, 0, 40.0)], 1, &mut store);
        store.evict_stale(60, 30);
        assert!(store.is_empty());

        let events = det.process(&[obj(1, 0, 70.0)], 61, &mut store);
        assert!(events.is_empty(), "fresh history starts Unknown, no event");
    }
}
