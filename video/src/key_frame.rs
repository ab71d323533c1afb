use crate::registry::TrackId;
use crate::tracking::PointTracker;
use crate::Result;
use cv_core::{AnyImage, AssociatedPair};
use nalgebra::Point2;
use std::collections::HashMap;

/// A track's location in the key frame paired with its current location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyFrameTrack {
    pub id: TrackId,
    pub key: Point2<f64>,
    pub current: Point2<f64>,
}

impl KeyFrameTrack {
    pub fn pair(&self) -> AssociatedPair {
        AssociatedPair::new(self.key, self.current)
    }
}

/// Wraps a point tracker and remembers where each track was at the key frame.
///
/// Tracks spawned after the key frame have no key location and are not paired
/// until the next [`set_key_frame`](KeyFramePointTracker::set_key_frame).
pub struct KeyFramePointTracker<T> {
    tracker: T,
    key_locations: HashMap<TrackId, Point2<f64>>,
}

impl<T: PointTracker> KeyFramePointTracker<T> {
    pub fn new(tracker: T) -> Self {
        Self {
            tracker,
            key_locations: HashMap::new(),
        }
    }

    pub fn process(&mut self, image: &AnyImage) -> Result<()> {
        self.tracker.process(image)?;
        for id in self.tracker.dropped_tracks() {
            self.key_locations.remove(id);
        }
        Ok(())
    }

    /// Makes the current frame the key frame for every live track.
    pub fn set_key_frame(&mut self) {
        self.key_locations = self
            .tracker
            .all_tracks()
            .into_iter()
            .map(|t| (t.id, t.location))
            .collect();
    }

    pub fn spawn_tracks(&mut self) -> usize {
        self.tracker.spawn_tracks()
    }

    /// Pairs for tracks seen in the current frame that also have a key location.
    pub fn active_pairs(&self) -> Vec<KeyFrameTrack> {
        self.tracker
            .active_tracks()
            .into_iter()
            .filter_map(|t| {
                self.key_locations.get(&t.id).map(|&key| KeyFrameTrack {
                    id: t.id,
                    key,
                    current: t.location,
                })
            })
            .collect()
    }

    pub fn drop_track(&mut self, id: TrackId) -> Result<bool> {
        self.key_locations.remove(&id);
        self.tracker.drop_track(id)
    }

    pub fn drop_all_tracks(&mut self) {
        self.key_locations.clear();
        self.tracker.drop_all_tracks();
    }

    pub fn reset(&mut self) {
        self.key_locations.clear();
        self.tracker.reset();
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }
}
