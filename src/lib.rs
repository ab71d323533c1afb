//! Feature point tracking and key-frame visual odometry.
//!
//! The pipeline is split across the workspace crates re-exported here:
//! detection, description and association live in [`features`], the track
//! registry and trackers in [`video`], motion estimation in [`sfm`].

pub use cv_core as core;
pub use cv_features as features;
pub use cv_optimize as optimize;
pub use cv_sfm as sfm;
pub use cv_video as video;

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before tracking.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `RUSTCV_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> cv_core::Result<()> {
    cv_core::init_global_thread_pool(num_threads)
}
