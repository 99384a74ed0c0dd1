//! Nickname RNN: A Recurrent Network That Invents Nicknames
//!
//! A single-layer tanh recurrent network, trained from scratch with
//! hand-written backpropagation through time, that learns the shape of a
//! nickname corpus and samples new ones.
//!
//! # Modules
//!
//! - [`tensor`] - Minimal dense matrices for the forward and backward passes
//! - [`segmenter`] - Splitting corpus lines into tokens
//! - [`vocab`] - Token to index mapping
//! - [`params`] - The five trainable tensors
//! - [`rnn`] - Forward pass and backpropagation through time
//! - [`gradients`] - Gradient tensors and clipping
//! - [`optimizer`] - SGD and the single optimize step
//! - [`sampler`] - Drawing and decoding new sequences
//! - [`checkpoint`] - Saving and loading model snapshots
//! - [`train`] - The training loop
//! - [`training_logger`] - CSV progress log
//! - [`generator`] - Caller-level generation with retries
//! - [`coordinator`] - Background training and the model status
//! - [`config`] - File-backed configuration
//!
//! # Example
//!
//! ```rust
//! use nickname_rnn::{train_on_lines, generate_nicknames, CharSegmenter, GenerateRequest, TrainingConfig};
//!
//! let corpus = ["小猫咪", "大狗狗", "小兔子", "猫猫头"];
//! let model = train_on_lines(corpus, &TrainingConfig::tiny(), None, &CharSegmenter, |_| {})?;
//!
//! let request = GenerateRequest { count: 3, seed: Some(1), ..GenerateRequest::default() };
//! for name in generate_nicknames(&model, &request)? {
//!     assert!(name.chars().count() >= 2);
//! }
//! # Ok::<(), nickname_rnn::NicknameError>(())
//! ```

pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod generator;
pub mod gradients;
pub mod optimizer;
pub mod params;
pub mod rnn;
pub mod sampler;
pub mod segmenter;
pub mod tensor;
pub mod train;
pub mod training_logger;
pub mod vocab;

// Re-export main types for convenience
pub use checkpoint::{NicknameModel, SnapshotMetadata};
pub use config::NicknameConfig;
pub use coordinator::{ModelStatus, StartOutcome, TrainingCoordinator};
pub use error::{NicknameError, Result};
pub use generator::{generate_nicknames, GenerateRequest, NicknameGenerator, SharedModel};
pub use gradients::{clip_gradients, compute_grad_norm, Gradients};
pub use optimizer::{optimize, sgd_update, StepOutput};
pub use params::Parameters;
pub use rnn::{backward, forward, ForwardTrace, TrainingExample};
pub use sampler::{decode, sample};
pub use segmenter::{CharSegmenter, JiebaSegmenter, Segmenter, SegmenterKind};
pub use tensor::Tensor;
pub use train::{
    initial_loss, smooth, train, train_on_lines, TrainingConfig, TrainingProgress,
};
pub use training_logger::TrainingLogger;
pub use vocab::{Vocabulary, END_TOKEN};
