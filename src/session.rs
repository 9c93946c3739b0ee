// src/session.rs
//
// One counting session per video. Owns the gate, the per-track state and
// the ledger; consumes tracked observations frame by frame.

use crate::backend::TrackedObject;
use crate::crossing::{CrossingDetector, CrossingEvent};
use crate::geometry::Region;
use crate::ledger::{CountingLedger, LedgerView};
use crate::track_store::TrackStateStore;
use crate::types::CountingConfig;

pub struct CountingSession {
    detector: CrossingDetector,
    store: TrackStateStore,
    ledger: CountingLedger,
    max_absence: u64,
}

impl CountingSession {
    pub fn new(region: Region, config: &CountingConfig) -> Self {
        Self {
            detector: CrossingDetector::new(region, config.classes.clone()),
            store: TrackStateStore::new(config.history_len),
            ledger: CountingLedger::new(),
            max_absence: config.max_absence,
        }
    }

    pub fn region(&self) -> &Region {
        self.detector.region()
    }

    /// Feed one frame's observations. Returns the crossings it produced,
    /// already applied to the ledger.
    pub fn process_frame(
        &mut self,
        objects: &[TrackedObject],
        frame_index: u64,
    ) -> Vec<CrossingEvent> {
        let events = self.detector.process(objects, frame_index, &mut self.store);
        for event in &events {
            self.ledger.apply(event);
        }
        self.store.evict_stale(frame_index, self.max_absence);
        events
    }

    pub fn ledger(&self) -> &CountingLedger {
        &self.ledger
    }

    pub fn snapshot(&self) -> LedgerView {
        self.ledger.snapshot()
    }

    pub fn live_tracks(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing::Direction;
    use crate::types::CountingConfig;

    fn config() -> CountingConfig {
        CountingConfig {
            region: Vec::new(),
            default_gate_half_width: 5.0,
            classes: vec![0, 1, 2, 3, 5, 7],
            history_len: 8,
            max_absence: 60,
            progress_every: 30,
        }
    }

    fn obj(track_id: u32, class_id: u32, cx: f32, cy: f32) -> TrackedObject {
        TrackedObject {
            track_id,
            class_id,
            bbox: [cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0],
            confidence: 0.9,
        }
    }

    #[test]
    fn full_crossing_updates_ledger() {
        let region = Region::default_center_strip(100.0, 100.0, 5.0).unwrap();
        let mut session = CountingSession::new(region, &config());

        session.process_frame(&[obj(1, 2, 30.0, 50.0)], 0);
        session.process_frame(&[obj(1, 2, 50.0, 50.0)], 1);
        let events = session.process_frame(&[obj(1, 2, 70.0, 50.0)], 2);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::In);
        assert_eq!(session.ledger().total_in(), 1);
        assert_eq!(session.ledger().total_out(), 0);

        let view = session.snapshot();
        assert_eq!(view.by_class["car"].in_count, 1);
    }

    #[test]
    fn stale_tracks_are_evicted_between_frames() {
        let region = Region::default_center_strip(100.0, 100.0, 5.0).unwrap();
        let mut counting = config();
        counting.max_absence = 2;
        let mut session = CountingSession::new(region, &counting);

        session.process_frame(&[obj(1, 0, 30.0, 50.0)], 0);
        assert_eq!(session.live_tracks(), 1);

        session.process_frame(&[], 1);
        session.process_frame(&[], 2);
        session.process_frame(&[], 3);
        assert_eq!(session.live_tracks(), 0);
    }
}
