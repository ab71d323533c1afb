//! Detect, describe, associate point tracker.

use crate::registry::{PointTrack, TrackId, TrackRegistry};
use crate::tracking::PointTracker;
use crate::Result;
use cv_core::AnyImage;
use cv_features::{Associate, DescribeRegionPoint, InterestPointDetector};
use nalgebra::Point2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// A track is dropped once it goes unmatched for more than this many frames.
    pub prune_threshold: u32,
    /// Replace a track's descriptor with the one it was matched to.
    pub update_description: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            prune_threshold: 2,
            update_description: false,
        }
    }
}

impl TrackerConfig {
    pub fn with_prune_threshold(mut self, prune_threshold: u32) -> Self {
        self.prune_threshold = prune_threshold;
        self
    }

    pub fn with_update_description(mut self, update: bool) -> Self {
        self.update_description = update;
        self
    }
}

#[derive(Debug, Clone)]
struct Candidate<D> {
    location: Point2<f64>,
    descriptor: D,
}

/// Tracks points by detecting and describing features in every frame and
/// associating them with the descriptors of existing tracks.
pub struct DetectDescribeAssociate<Det, Desc, A>
where
    Desc: DescribeRegionPoint,
{
    detector: Det,
    describer: Desc,
    associator: A,
    config: TrackerConfig,
    registry: TrackRegistry<Desc::Descriptor>,
    candidates: Vec<Candidate<Desc::Descriptor>>,
    unassociated: Vec<usize>,
    new_ids: Vec<TrackId>,
    dropped: Vec<TrackId>,
    frame_id: u64,
}

impl<Det, Desc, A> DetectDescribeAssociate<Det, Desc, A>
where
    Det: InterestPointDetector,
    Desc: DescribeRegionPoint,
    A: Associate<Desc::Descriptor>,
{
    pub fn new(detector: Det, describer: Desc, associator: A, config: TrackerConfig) -> Self {
        Self {
            detector,
            describer,
            associator,
            config,
            registry: TrackRegistry::new(),
            candidates: Vec::new(),
            unassociated: Vec::new(),
            new_ids: Vec::new(),
            dropped: Vec::new(),
            frame_id: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn set_prune_threshold(&mut self, prune_threshold: u32) {
        self.config.prune_threshold = prune_threshold;
    }

    pub fn set_update_description(&mut self, update: bool) {
        self.config.update_description = update;
    }

    pub fn registry(&self) -> &TrackRegistry<Desc::Descriptor> {
        &self.registry
    }

    pub fn detector_mut(&mut self) -> &mut Det {
        &mut self.detector
    }

    /// Locations of the detections of the last frame not claimed by any track.
    pub fn unassociated_detections(&self) -> Vec<Point2<f64>> {
        self.unassociated
            .iter()
            .map(|&i| self.candidates[i].location)
            .collect()
    }

    fn detect_and_describe(&mut self, image: &AnyImage) -> Result<()> {
        self.describer.validate(image)?;
        self.detector.detect(image)?;

        let det = &self.detector;
        let regions: Vec<(Point2<f64>, f64, f64)> = (0..det.len())
            .map(|i| (det.location(i), det.scale(i), det.orientation(i)))
            .collect();

        let describer = &self.describer;
        self.candidates = regions
            .into_par_iter()
            .filter_map(|(location, scale, orientation)| {
                describer
                    .describe(image, location, scale, orientation)
                    .map(|descriptor| Candidate {
                        location,
                        descriptor,
                    })
            })
            .collect();
        Ok(())
    }
}

impl<Det, Desc, A> PointTracker for DetectDescribeAssociate<Det, Desc, A>
where
    Det: InterestPointDetector,
    Desc: DescribeRegionPoint,
    A: Associate<Desc::Descriptor>,
{
    type Descriptor = Desc::Descriptor;

    fn process(&mut self, image: &AnyImage) -> Result<()> {
        self.new_ids.clear();
        self.dropped.clear();
        self.unassociated.clear();

        self.detect_and_describe(image)?;
        self.frame_id += 1;

        let ids = self.registry.active_ids();
        {
            let src: Vec<&Desc::Descriptor> =
                self.registry.active_tracks().map(|t| &t.descriptor).collect();
            let dst: Vec<&Desc::Descriptor> =
                self.candidates.iter().map(|c| &c.descriptor).collect();
            self.associator.associate(&src, &dst)?;
        }

        let mut claimed = vec![false; self.candidates.len()];
        let pairs = self.associator.pairs();
        let mut matched = 0usize;

        for (i, &id) in ids.iter().enumerate() {
            let Some(track) = self.registry.get_mut(id) else {
                continue;
            };
            let j = pairs[i];
            if j >= 0 {
                let candidate = &self.candidates[j as usize];
                track.location = candidate.location;
                if self.config.update_description {
                    track.descriptor = candidate.descriptor.clone();
                }
                track.frames_unmatched = 0;
                claimed[j as usize] = true;
                matched += 1;
            } else {
                track.frames_unmatched += 1;
                if track.frames_unmatched > self.config.prune_threshold {
                    self.dropped.push(id);
                }
            }
        }

        for &id in &self.dropped {
            self.registry.drop_track(id)?;
        }

        self.unassociated = (0..self.candidates.len())
            .filter(|&j| !claimed[j])
            .collect();

        tracing::debug!(
            frame = self.frame_id,
            detections = self.candidates.len(),
            tracks = ids.len(),
            matched,
            dropped = self.dropped.len(),
            "processed frame"
        );
        Ok(())
    }

    fn spawn_tracks(&mut self) -> usize {
        let unassociated = std::mem::take(&mut self.unassociated);
        for &j in &unassociated {
            let candidate = &self.candidates[j];
            let id = self.registry.spawn_track(
                candidate.location,
                candidate.descriptor.clone(),
                self.frame_id,
            );
            self.new_ids.push(id);
        }
        tracing::debug!(
            frame = self.frame_id,
            spawned = unassociated.len(),
            total = self.registry.len(),
            "spawned tracks"
        );
        unassociated.len()
    }

    fn drop_track(&mut self, id: TrackId) -> Result<bool> {
        Ok(self.registry.drop_track(id)?)
    }

    fn drop_all_tracks(&mut self) {
        let count = self.registry.drop_all_tracks();
        self.new_ids.clear();
        tracing::trace!(count, "dropped all tracks");
    }

    fn reset(&mut self) {
        self.registry.drop_all_tracks();
        self.candidates.clear();
        self.unassociated.clear();
        self.new_ids.clear();
        self.dropped.clear();
        self.frame_id = 0;
    }

    fn all_tracks(&self) -> Vec<&PointTrack<Desc::Descriptor>> {
        self.registry.active_tracks().collect()
    }

    fn new_tracks(&self) -> Vec<&PointTrack<Desc::Descriptor>> {
        self.new_ids
            .iter()
            .filter_map(|&id| self.registry.get(id))
            .collect()
    }

    fn dropped_tracks(&self) -> &[TrackId] {
        &self.dropped
    }

    fn frame_id(&self) -> u64 {
        self.frame_id
    }
}
