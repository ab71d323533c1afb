//! Interest point detection, region description and descriptor association.

pub mod associate;
pub mod brief;
pub mod describe;
pub mod detect;
pub mod fast;
pub mod score;

pub use associate::*;
pub use brief::*;
pub use describe::*;
pub use detect::*;
pub use fast::*;
pub use score::*;

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error(transparent)]
    Core(#[from] cv_core::Error),

    #[error("Detection error: {0}")]
    DetectionError(String),

    #[error("Descriptor error: {0}")]
    DescriptorError(String),
}
