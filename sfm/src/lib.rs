//! Two-view motion estimation
//!
//! This crate fits image-to-image motion models to tracked point pairs with
//! sample consensus, refines them with Levenberg-Marquardt and accumulates the
//! motion of a key-frame based tracker.

pub mod distance;
pub mod estimator;
pub mod models;
pub mod motion;
pub mod refine;
pub mod triangulation;

pub use distance::*;
pub use estimator::*;
pub use models::*;
pub use motion::*;
pub use refine::*;
pub use triangulation::*;

/// Error type for SfM operations
#[derive(Debug, thiserror::Error)]
pub enum SfmError {
    #[error(transparent)]
    Core(#[from] cv_core::Error),

    #[error(transparent)]
    Video(#[from] cv_video::VideoError),

    #[error("Triangulation failed: {0}")]
    TriangulationFailed(String),
}

pub type Result<T> = std::result::Result<T, SfmError>;
