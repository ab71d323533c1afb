//! Point tracking across video frames
//!
//! Tracks live in an arena owned by [`TrackRegistry`]. The
//! [`DetectDescribeAssociate`] tracker follows them by matching descriptors
//! frame to frame and [`KeyFramePointTracker`] pairs their current locations
//! with where they were at the last key frame.

pub mod dda;
pub mod key_frame;
pub mod registry;
pub mod tracking;

pub use dda::*;
pub use key_frame::*;
pub use registry::*;
pub use tracking::*;

pub type Result<T> = std::result::Result<T, VideoError>;

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error(transparent)]
    Core(#[from] cv_core::Error),

    #[error(transparent)]
    Feature(#[from] cv_features::FeatureError),
}
