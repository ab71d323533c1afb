//! Arena of point tracks with slot recycling.

use cv_core::Error;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a track. Issued in increasing order and never reissued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PointTrack<D> {
    pub id: TrackId,
    /// Pixel location in the most recent frame it was seen.
    pub location: Point2<f64>,
    pub descriptor: D,
    /// Consecutive processed frames without an association.
    pub frames_unmatched: u32,
    /// Frame on which the track was spawned.
    pub spawn_frame: u64,
}

/// Owns every live track. Dropped tracks free their slot for the next spawn.
#[derive(Debug)]
pub struct TrackRegistry<D> {
    slots: Vec<Option<PointTrack<D>>>,
    free: Vec<usize>,
    /// Slot indices of live tracks in spawn order.
    active: Vec<usize>,
    lookup: HashMap<TrackId, usize>,
    next_id: u64,
}

impl<D> Default for TrackRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> TrackRegistry<D> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            active: Vec::new(),
            lookup: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn spawn_track(&mut self, location: Point2<f64>, descriptor: D, frame: u64) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;

        let track = PointTrack {
            id,
            location,
            descriptor,
            frames_unmatched: 0,
            spawn_frame: frame,
        };

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(track);
                slot
            }
            None => {
                self.slots.push(Some(track));
                self.slots.len() - 1
            }
        };

        self.active.push(slot);
        self.lookup.insert(id, slot);
        id
    }

    /// Returns `Ok(false)` for a track that was already dropped.
    pub fn drop_track(&mut self, id: TrackId) -> cv_core::Result<bool> {
        if id.0 >= self.next_id {
            return Err(Error::UnknownTrack(id.0));
        }
        let Some(slot) = self.lookup.remove(&id) else {
            return Ok(false);
        };
        self.slots[slot] = None;
        self.active.retain(|&s| s != slot);
        self.free.push(slot);
        Ok(true)
    }

    /// Drops every live track, returning how many there were.
    pub fn drop_all_tracks(&mut self) -> usize {
        let count = self.active.len();
        for slot in self.active.drain(..) {
            self.slots[slot] = None;
            self.free.push(slot);
        }
        self.lookup.clear();
        count
    }

    pub fn get(&self, id: TrackId) -> Option<&PointTrack<D>> {
        let slot = *self.lookup.get(&id)?;
        self.slots[slot].as_ref()
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut PointTrack<D>> {
        let slot = *self.lookup.get(&id)?;
        self.slots[slot].as_mut()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Live tracks in spawn order.
    pub fn active_tracks(&self) -> impl Iterator<Item = &PointTrack<D>> + '_ {
        self.active
            .iter()
            .filter_map(move |&slot| self.slots[slot].as_ref())
    }

    pub fn active_ids(&self) -> Vec<TrackId> {
        self.active_tracks().map(|t| t.id).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of slots ever allocated.
    pub fn high_water_mark(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point2<f64> {
        Point2::new(x, y)
    }

    #[test]
    fn spawn_assigns_unique_ids() {
        let mut reg = TrackRegistry::new();
        let a = reg.spawn_track(p(1.0, 2.0), 10u8, 0);
        let b = reg.spawn_track(p(3.0, 4.0), 20u8, 0);
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(b).unwrap().descriptor, 20);
        assert_eq!(reg.get(a).unwrap().location, p(1.0, 2.0));
    }

    #[test]
    fn recycles_slots() {
        let mut reg = TrackRegistry::new();
        let n = 5;
        let ids: Vec<_> = (0..n).map(|i| reg.spawn_track(p(i as f64, 0.0), i, 0)).collect();
        assert_eq!(reg.high_water_mark(), n);

        for id in &ids {
            assert!(reg.drop_track(*id).unwrap());
        }
        assert!(reg.is_empty());
        assert_eq!(reg.free_count(), n);

        let fresh = reg.spawn_track(p(9.0, 9.0), 99, 1);
        assert_eq!(reg.high_water_mark(), n);
        assert_eq!(reg.free_count(), n - 1);
        assert!(!ids.contains(&fresh));
    }

    #[test]
    fn drop_is_idempotent_for_issued_ids() {
        let mut reg = TrackRegistry::new();
        let a = reg.spawn_track(p(0.0, 0.0), (), 0);
        assert!(reg.drop_track(a).unwrap());
        assert!(!reg.drop_track(a).unwrap());
        assert_eq!(reg.free_count(), 1);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let mut reg: TrackRegistry<()> = TrackRegistry::new();
        assert!(matches!(
            reg.drop_track(TrackId(3)),
            Err(Error::UnknownTrack(3))
        ));
    }

    #[test]
    fn drop_all_keeps_order_of_remaining_spawns() {
        let mut reg = TrackRegistry::new();
        for i in 0..4 {
            reg.spawn_track(p(i as f64, 0.0), i, 0);
        }
        assert_eq!(reg.drop_all_tracks(), 4);
        assert!(reg.is_empty());
        assert_eq!(reg.free_count(), 4);

        let a = reg.spawn_track(p(0.0, 0.0), 7, 2);
        let b = reg.spawn_track(p(0.0, 0.0), 8, 2);
        assert_eq!(reg.active_ids(), vec![a, b]);
        assert_eq!(reg.high_water_mark(), 4);
    }

    #[test]
    fn active_order_survives_drop_in_middle() {
        let mut reg = TrackRegistry::new();
        let ids: Vec<_> = (0..3).map(|i| reg.spawn_track(p(0.0, 0.0), i, 0)).collect();
        reg.drop_track(ids[1]).unwrap();
        assert_eq!(reg.active_ids(), vec![ids[0], ids[2]]);
        assert!(reg.get(ids[1]).is_none());
        assert!(!reg.contains(ids[1]));
    }
}
