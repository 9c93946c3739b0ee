// src/track_store.rs
//
// Per-track-id state between frames. Histories are created on first
// sighting, refreshed on every observation, and evicted after a
// configurable absence so memory stays bounded over long videos.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::geometry::{GateSide, Point, Region};

/// What the counting core remembers about one live track id.
#[derive(Debug, Clone)]
pub struct TrackHistory {
    /// Last committed side of the gate
    pub side: GateSide,
    /// Last outer side occupied (Before or After), the arming state for
    /// the both-boundaries crossing rule
    pub last_outer: Option<GateSide>,
    /// Recent centroids, oldest first, bounded length
    pub centroids: VecDeque<Point>,
    /// Frame index of the most recent observation
    pub last_seen: u64,
}

impl TrackHistory {
    fn new(frame_index: u64, cap: usize) -> Self {
        Self {
            side: GateSide::Unknown,
            last_outer: None,
            centroids: VecDeque::with_capacity(cap),
            last_seen: frame_index,
        }
    }
}

pub struct TrackStateStore {
    histories: HashMap<u32, TrackHistory>,
    history_len: usize,
}

impl TrackStateStore {
    pub fn new(history_len: usize) -> Self {
        Self {
            histories: HashMap::new(),
            history_len: history_len.max(1),
        }
    }

    /// Existing history for the id, or a fresh one starting at `Unknown`.
    pub fn get_or_create(&mut self, track_id: u32, frame_index: u64) -> &mut TrackHistory {
        let cap = self.history_len;
        self.histories
            .entry(track_id)
            .or_insert_with(|| TrackHistory::new(frame_index, cap))
    }

    /// Append a centroid observation and refresh the committed side.
    /// Returns the (previous, current) side pair the crossing detector
    /// decides on.
    pub fn update(
        &mut self,
        track_id: u32,
        centroid: Point,
        frame_index: u64,
        region: &Region,
    ) -> (GateSide, GateSide) {
        let cap = self.history_len;
        let history = self.get_or_create(track_id, frame_index);

        if history.centroids.len() == cap {
            history.centroids.pop_front();
        }
        history.centroids.push_back(centroid);

        let previous = history.side;
        let current = region.classify(centroid, previous);
        history.side = current;
        history.last_seen = frame_index;

        (previous, current)
    }

    pub fn get(&self, track_id: u32) -> Option<&TrackHistory> {
        self.histories.get(&track_id)
    }

    pub fn get_mut(&mut self, track_id: u32) -> Option<&mut TrackHistory> {
        self.histories.get_mut(&track_id)
    }

    /// Drop histories not updated within `max_absence` frames. Called once
    /// per frame by the orchestrator.
    pub fn evict_stale(&mut self, current_frame_index: u64, max_absence: u64) {
        let before = self.histories.len();
        self.histories
            .retain(|_, h| current_frame_index.saturating_sub(h.last_seen) <= max_absence);
        let evicted = before - self.histories.len();
        if evicted > 0 {
            debug!("Evicted {} stale track histories", evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> Region {
        Region::new(vec![(45.0, 0.0), (55.0, 0.0), (55.0, 100.0), (45.0, 100.0)]).unwrap()
    }

    #[test]
    fn creates_history_on_first_sighting() {
        let mut store = TrackStateStore::new(8);
        let (prev, cur) = store.update(1, (40.0, 50.0), 0, &gate());
        assert_eq!(prev, GateSide::Unknown);
        assert_eq!(cur, GateSide::Before);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn one_history_per_live_id() {
        let mut store = TrackStateStore::new(8);
        store.update(1, (40.0, 50.0), 0, &gate());
        store.update(1, (41.0, 50.0), 1, &gate());
        store.update(1, (42.0, 50.0), 2, &gate());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn centroid_buffer_is_bounded() {
        let mut store = TrackStateStore::new(4);
        for i in 0..20 {
            store.update(1, (i as f32, 50.0), i, &gate());
        }
        let h = store.get(1).unwrap();
        assert_eq!(h.centroids.len(), 4);
        // Oldest observations dropped, newest kept
        assert_eq!(h.centroids.back(), Some(&(19.0, 50.0)));
        assert_eq!(h.centroids.front(), Some(&(16.0, 50.0)));
    }

    #[test]
    fn evicts_after_absence() {
        let mut store = TrackStateStore::new(8);
        store.update(1, (40.0, 50.0), 0, &gate());
        store.update(2, (70.0, 50.0), 10, &gate());

        store.evict_stale(15, 10);
        assert!(store.get(1).is_none(), "track 1 absent for 15 > 10 frames");
        assert!(store.get(2).is_some());
    }

    #[test]
    fn evicted_id_restarts_unknown() {
        let mut store = TrackStateStore::new(8);
        store.update(1, (40.0, 50.0), 0, &gate());
        store.evict_stale(100, 10);

        // Same id reappears much later on the opposite side
        let (prev, cur) = store.update(1, (70.0, 50.0), 100, &gate());
        assert_eq!(prev, GateSide::Unknown);
        assert_eq!(cur, GateSide::After);
    }
}
