use crate::lrpt::DecompressError;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// Integrity check or correct error executing the algorithm.
    #[error("integrity algorithm error: {0}")]
    IntegrityAlgorithm(String),

    #[error(transparent)]
    Decompress(#[from] DecompressError),

    /// The stream ended without a single synchronized frame.
    #[error("no frames synchronized")]
    NoFrames,
    /// Frames were found but none of them produced image rows.
    #[error("no image rows decoded")]
    NoImage,
}

pub type Result<T> = std::result::Result<T, Error>;
