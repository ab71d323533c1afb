/// Errors shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid image: {0}")]
    ImageShape(String),

    #[error("Descriptor shape mismatch: expected {expected} elements, got {actual}")]
    DescriptorShape { expected: usize, actual: usize },

    #[error("Unknown track id {0}")]
    UnknownTrack(u64),

    #[error("Numerical failure: {0}")]
    Numerical(String),
}

pub type Result<T> = std::result::Result<T, Error>;
