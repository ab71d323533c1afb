//! Point tracker interface

use crate::registry::{PointTrack, TrackId};
use crate::Result;
use cv_core::{AnyImage, TupleDesc};

/// Follows feature points across a sequence of frames.
///
/// Tracks are spawned only on request. A track is *active* when it was
/// associated (or spawned) in the most recent frame, and *inactive* while it
/// waits to be pruned.
pub trait PointTracker {
    type Descriptor: TupleDesc;

    fn process(&mut self, image: &AnyImage) -> Result<()>;

    /// Spawns tracks from detections of the last frame no track claimed.
    /// Returns how many were spawned.
    fn spawn_tracks(&mut self) -> usize;

    fn drop_track(&mut self, id: TrackId) -> Result<bool>;

    fn drop_all_tracks(&mut self);

    /// Drops all tracks and forgets frame history.
    fn reset(&mut self);

    /// Every live track.
    fn all_tracks(&self) -> Vec<&PointTrack<Self::Descriptor>>;

    fn active_tracks(&self) -> Vec<&PointTrack<Self::Descriptor>> {
        self.all_tracks()
            .into_iter()
            .filter(|t| t.frames_unmatched == 0)
            .collect()
    }

    fn inactive_tracks(&self) -> Vec<&PointTrack<Self::Descriptor>> {
        self.all_tracks()
            .into_iter()
            .filter(|t| t.frames_unmatched > 0)
            .collect()
    }

    /// Tracks created by the most recent [`spawn_tracks`](PointTracker::spawn_tracks)
    /// since the last processed frame.
    fn new_tracks(&self) -> Vec<&PointTrack<Self::Descriptor>>;

    /// Tracks pruned while processing the most recent frame.
    fn dropped_tracks(&self) -> &[TrackId];

    /// Number of frames processed since the last reset.
    fn frame_id(&self) -> u64;
}
