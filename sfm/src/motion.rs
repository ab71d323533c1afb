//! Key-frame based motion accumulation.

use crate::estimator::{MotionEstimate, RobustMotionEstimator};
use crate::refine::ModelFitter;
use crate::Result;
use cv_core::{AnyImage, AssociatedPair, Error, InvertibleTransform, RobustModel};
use cv_video::{KeyFramePointTracker, KeyFrameTrack, PointTracker};

/// Estimates the motion of the current frame relative to a key frame and
/// chains it onto the key frame's pose in the world.
///
/// After every successful [`process`](KeyFrameMotion::process)
/// `world_to_curr == world_to_key.concat(key_to_curr)`.
pub struct KeyFrameMotion<T, R, F>
where
    R: RobustModel<AssociatedPair>,
{
    tracker: KeyFramePointTracker<T>,
    estimator: RobustMotionEstimator<R, F>,
    world_to_init: R::Model,
    world_to_key: R::Model,
    key_to_curr: R::Model,
    world_to_curr: R::Model,
    total_processed: u64,
    total_spawned: usize,
    last_estimate: Option<MotionEstimate<R::Model>>,
}

impl<T, R, F> KeyFrameMotion<T, R, F>
where
    T: PointTracker,
    R: RobustModel<AssociatedPair>,
    R::Model: InvertibleTransform,
    F: ModelFitter<R::Model>,
{
    /// Starts at the identity. No key frame is set until the first
    /// [`change_key_frame`](KeyFrameMotion::change_key_frame).
    pub fn new(tracker: T, estimator: RobustMotionEstimator<R, F>) -> Self {
        Self {
            tracker: KeyFramePointTracker::new(tracker),
            estimator,
            world_to_init: R::Model::identity(),
            world_to_key: R::Model::identity(),
            key_to_curr: R::Model::identity(),
            world_to_curr: R::Model::identity(),
            total_processed: 0,
            total_spawned: 0,
            last_estimate: None,
        }
    }

    /// Pose the world starts from after construction or [`reset`](KeyFrameMotion::reset).
    pub fn set_initial_transform(&mut self, initial: R::Model) {
        self.world_to_key = initial.clone();
        self.world_to_curr = initial.clone();
        self.world_to_init = initial;
        self.key_to_curr = R::Model::identity();
    }

    /// Forgets every track and restarts from the initial transform with a
    /// new key frame.
    pub fn reset(&mut self) {
        self.world_to_key = self.world_to_init.clone();
        self.world_to_curr = self.world_to_init.clone();
        self.key_to_curr = R::Model::identity();
        self.tracker.reset();
        self.tracker.spawn_tracks();
        self.tracker.set_key_frame();
        self.total_spawned = self.tracker.tracker().active_tracks().len();
        self.total_processed = 0;
        self.last_estimate = None;
    }

    /// Tracks the frame and estimates its motion from the key frame.
    ///
    /// Returns `Ok(false)` when no motion could be estimated, in which case the
    /// transforms keep their previous values. Tracker failures are errors.
    pub fn process(&mut self, image: &AnyImage) -> Result<bool> {
        self.tracker.process(image)?;
        self.total_processed += 1;

        let pairs: Vec<AssociatedPair> = self
            .tracker
            .active_pairs()
            .iter()
            .map(KeyFrameTrack::pair)
            .collect();
        if pairs.is_empty() {
            tracing::debug!(frame = self.total_processed, "no key frame pairs");
            self.last_estimate = None;
            return Ok(false);
        }

        let Some(estimate) = self.estimator.process(&pairs) else {
            self.last_estimate = None;
            return Ok(false);
        };

        self.key_to_curr = estimate.model.clone();
        self.world_to_curr = self.world_to_key.concat(&self.key_to_curr);
        self.last_estimate = Some(estimate);
        Ok(true)
    }

    /// Makes the current frame the key frame, spawning tracks from its
    /// unclaimed detections first.
    pub fn change_key_frame(&mut self) {
        let spawned = self.tracker.spawn_tracks();
        self.tracker.set_key_frame();
        self.total_spawned = self.tracker.tracker().active_tracks().len();
        self.world_to_key = self.world_to_curr.clone();
        self.key_to_curr = R::Model::identity();
        tracing::debug!(
            frame = self.total_processed,
            spawned,
            tracks = self.total_spawned,
            "key frame changed"
        );
    }

    /// Re-expresses the key frame in a new world frame.
    pub fn change_world(&mut self, old_world_to_new_world: &R::Model) -> Result<()> {
        let key_to_world = self
            .world_to_key
            .invert()
            .ok_or_else(|| Error::Numerical("world to key transform is singular".to_string()))?;
        self.world_to_init = key_to_world.concat(old_world_to_new_world);
        self.world_to_key = self.world_to_init.clone();
        self.world_to_curr = self.world_to_key.concat(&self.key_to_curr);
        Ok(())
    }

    pub fn world_to_init(&self) -> &R::Model {
        &self.world_to_init
    }

    pub fn world_to_key(&self) -> &R::Model {
        &self.world_to_key
    }

    pub fn key_to_curr(&self) -> &R::Model {
        &self.key_to_curr
    }

    pub fn world_to_curr(&self) -> &R::Model {
        &self.world_to_curr
    }

    /// Frames processed since construction or the last reset.
    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    /// Active tracks right after the key frame was last set.
    pub fn total_spawned(&self) -> usize {
        self.total_spawned
    }

    /// Estimate from the last call to [`process`](KeyFrameMotion::process), if it succeeded.
    pub fn last_estimate(&self) -> Option<&MotionEstimate<R::Model>> {
        self.last_estimate.as_ref()
    }

    pub fn tracker(&self) -> &KeyFramePointTracker<T> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut KeyFramePointTracker<T> {
        &mut self.tracker
    }

    pub fn estimator(&self) -> &RobustMotionEstimator<R, F> {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut RobustMotionEstimator<R, F> {
        &mut self.estimator
    }
}
