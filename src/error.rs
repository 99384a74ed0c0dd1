//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is [`NicknameError`]. Local data-quality gaps (a corpus token missing from
//! the vocabulary while encoding) are not errors and never show up here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by training, persistence and generation
#[derive(Debug, Error)]
pub enum NicknameError {
    /// A corpus or snapshot file does not exist
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A snapshot exists but fails validation
    #[error("corrupt model snapshot: {0}")]
    CorruptModel(String),

    /// Generation was requested before any model was trained or loaded
    #[error("model not ready: train or load a model first")]
    ModelNotReady,

    /// The corpus produced no tokens at all
    #[error("corpus yields an empty vocabulary")]
    DegenerateVocabulary,

    /// The output distribution could not be sampled (NaN or all-zero weights)
    #[error("sampling failed: {0}")]
    Sampling(String),

    /// One draw sequence kept landing on the end token before the minimum
    /// length; another seed may still succeed
    #[error("sampling stalled: end token keeps winning at position {position}")]
    SamplingStalled { position: usize },

    /// A background training run ended with an error
    #[error("training failed: {0}")]
    Training(String),

    /// Invalid configuration or request parameters
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NicknameError {
    /// Build a `NotFound` error for `path`
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        NicknameError::NotFound { path: path.into() }
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, NicknameError>;
