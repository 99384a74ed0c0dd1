//! Training Driver
//!
//! Turns a corpus of nicknames (one per line) into trained parameters.
//!
//! ## Procedure
//!
//! ```text
//! vocab    = Vocabulary::build(lines)
//! params   = Parameters::initialize(H, V)
//! examples = shuffle(encode(lines), seed 0)
//! h        = 0
//! loss     = -ln(1/V) · num_monitor_samples
//!
//! for j in 0..iterations:
//!     step = optimize(examples[j % len], h, params)
//!     h    = step.hidden
//!     loss = 0.999 · loss + 0.001 · step.loss
//!     every K1: report progress (with samples every K2)
//!     every K3: save a checkpoint
//! save the final model
//! ```
//!
//! The hidden state is never reset between examples. The network sees the
//! shuffled corpus as one continuous stream, wrapping around at the end.
//!
//! ## Progress Reports
//!
//! Every `progress_every` iterations the caller's callback receives a
//! [`TrainingProgress`]. Reports on multiples of `sample_every` also carry
//! `num_monitor_samples` nicknames drawn with seeds `0, 1, 2, ...`; all other
//! reports carry an empty sample list.
//!
//! ## Checkpoints
//!
//! With a model path configured, a snapshot is written every
//! `checkpoint_every` iterations (never at iteration 0) and once more at the
//! end. A failed periodic checkpoint is logged and training continues, since
//! the in-memory parameters are still good. A failed final save is an error.

use crate::checkpoint::NicknameModel;
use crate::error::{NicknameError, Result};
use crate::gradients::{compute_grad_norm, DEFAULT_CLIP_VALUE};
use crate::optimizer::{optimize, DEFAULT_LEARNING_RATE};
use crate::params::{Parameters, INIT_SEED};
use crate::rnn::TrainingExample;
use crate::sampler::{decode, sample, DEFAULT_MIN_LENGTH};
use crate::segmenter::Segmenter;
use crate::training_logger::TrainingLogger;
use crate::vocab::{Vocabulary, END_TOKEN};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Training configuration
///
/// # Common Configurations
///
/// - **Default**: The production run (20 000 iterations, hidden width 50)
/// - **Tiny**: A few hundred iterations for tests and quick experiments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Hidden state width `H`
    pub hidden_size: usize,
    /// Number of optimize steps
    pub iterations: usize,
    /// SGD step size
    pub learning_rate: f32,
    /// Elementwise gradient bound
    pub clip_value: f32,
    /// Nicknames drawn per sampled progress report
    pub num_monitor_samples: usize,
    /// Report progress every N iterations (K1)
    pub progress_every: usize,
    /// Attach samples to reports on multiples of N (K2)
    pub sample_every: usize,
    /// Save a checkpoint every N iterations (K3)
    pub checkpoint_every: usize,
    /// Seed for the one-time example shuffle
    pub shuffle_seed: u64,
    /// Seed for weight initialization
    pub init_seed: u64,
    /// Token limit for monitor samples
    pub monitor_max_length: usize,
    /// Terminate every corpus line with the end token
    pub append_end_token: bool,
    /// Write progress rows to this CSV file
    pub csv_log_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hidden_size: 50,
            iterations: 20_000,
            learning_rate: DEFAULT_LEARNING_RATE,
            clip_value: DEFAULT_CLIP_VALUE,
            num_monitor_samples: 5,
            progress_every: 1000,
            sample_every: 2000,
            checkpoint_every: 5000,
            shuffle_seed: 0,
            init_seed: INIT_SEED,
            monitor_max_length: 50,
            append_end_token: false,
            csv_log_path: None,
        }
    }
}

impl TrainingConfig {
    /// Create a tiny configuration for quick experiments
    ///
    /// Good for:
    /// - Tests
    /// - Checking a new corpus end to end in seconds
    pub fn tiny() -> Self {
        Self {
            hidden_size: 16,
            iterations: 300,
            num_monitor_samples: 2,
            progress_every: 50,
            sample_every: 100,
            checkpoint_every: 100,
            monitor_max_length: 12,
            ..Self::default()
        }
    }

    /// Reject settings the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("hidden_size", self.hidden_size),
            ("progress_every", self.progress_every),
            ("sample_every", self.sample_every),
            ("checkpoint_every", self.checkpoint_every),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(NicknameError::Config(format!("{} must be positive", name)));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NicknameError::Config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(self.clip_value.is_finite() && self.clip_value > 0.0) {
            return Err(NicknameError::Config(format!(
                "clip_value must be a positive number, got {}",
                self.clip_value
            )));
        }
        Ok(())
    }
}

/// One progress report handed to the training callback
#[derive(Clone, Copy, Debug)]
pub struct TrainingProgress<'a> {
    /// Iteration just completed (0-based)
    pub iteration: usize,
    /// Total iterations of the run
    pub total: usize,
    pub smoothed_loss: f32,
    /// Monitor nicknames; empty unless this is a sampling iteration
    pub samples: &'a [String],
    /// Live parameters after this iteration's update
    pub parameters: &'a Parameters,
    pub vocab: &'a Vocabulary,
}

impl TrainingProgress<'_> {
    /// Completion as a whole percentage, capped at 100
    ///
    /// ```rust
    /// # use nickname_rnn::{Parameters, TrainingProgress, Vocabulary};
    /// # let vocab = Vocabulary::from_tokens(["a"]);
    /// # let parameters = Parameters::initialize(2, 1);
    /// let report = TrainingProgress {
    ///     iteration: 5000,
    ///     total: 20000,
    ///     smoothed_loss: 1.0,
    ///     samples: &[],
    ///     parameters: &parameters,
    ///     vocab: &vocab,
    /// };
    /// assert_eq!(report.percent(), 25);
    /// ```
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.iteration.saturating_mul(100) / self.total).min(100) as u8
    }
}

/// Exponential moving average of the loss
///
/// ```rust
/// use nickname_rnn::smooth;
///
/// assert!((smooth(10.0, 20.0) - 10.01).abs() < 1e-5);
/// ```
pub fn smooth(loss: f32, current: f32) -> f32 {
    loss * 0.999 + current * 0.001
}

/// Loss of a uniform prediction over `vocab_size` tokens, summed over
/// `seq_len` steps
pub fn initial_loss(vocab_size: usize, seq_len: usize) -> f32 {
    -(1.0 / vocab_size as f32).ln() * seq_len as f32
}

/// Segment and encode every non-blank corpus line
///
/// Tokens missing from `vocab` are skipped. With `append_end_token` set, each
/// line is terminated with [`END_TOKEN`] before encoding.
pub fn encode_examples<S, I>(
    lines: I,
    vocab: &Vocabulary,
    segmenter: &S,
    append_end_token: bool,
) -> Vec<TrainingExample>
where
    S: Segmenter + ?Sized,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let end_index = vocab.end_index();
    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.as_ref().trim();
            if line.is_empty() {
                return None;
            }
            let mut tokens = segmenter.segment(line);
            if append_end_token {
                tokens.push(END_TOKEN.to_string());
            }
            let indices = vocab.encode(&tokens);
            Some(TrainingExample::from_indices(&indices, end_index))
        })
        .collect()
}

/// Draw `count` monitor nicknames with seeds `0..count`
pub fn monitor_samples(
    params: &Parameters,
    vocab: &Vocabulary,
    count: usize,
    max_length: usize,
) -> Result<Vec<String>> {
    (0..count as u64)
        .map(|seed| {
            let indices = sample(params, vocab, seed, max_length, DEFAULT_MIN_LENGTH, false)?;
            Ok(decode(&indices, vocab))
        })
        .collect()
}

/// Train on the corpus file at `corpus_path`
///
/// # Arguments
///
/// * `corpus_path` - Text file with one nickname per line
/// * `config` - Hyperparameters and reporting cadence
/// * `model_path` - Where checkpoints and the final model go; `None` keeps
///   everything in memory
/// * `segmenter` - Splits lines into tokens
/// * `on_progress` - Called with every progress report
///
/// # Errors
///
/// [`NicknameError::NotFound`] when the corpus is missing,
/// [`NicknameError::DegenerateVocabulary`] when it has no tokens, plus any
/// error from the final save.
pub fn train<S, F>(
    corpus_path: &Path,
    config: &TrainingConfig,
    model_path: Option<&Path>,
    segmenter: &S,
    on_progress: F,
) -> Result<NicknameModel>
where
    S: Segmenter + ?Sized,
    F: FnMut(&TrainingProgress<'_>),
{
    let text = fs::read_to_string(corpus_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => NicknameError::not_found(corpus_path),
        _ => NicknameError::Io(e),
    })?;
    log::info!("loaded corpus from {}", corpus_path.display());
    train_on_lines(text.lines(), config, model_path, segmenter, on_progress)
}

/// Train on an in-memory corpus
///
/// See [`train`] for the arguments.
///
/// # Example
///
/// ```rust
/// use nickname_rnn::{train_on_lines, CharSegmenter, TrainingConfig};
///
/// let config = TrainingConfig {
///     iterations: 50,
///     ..TrainingConfig::tiny()
/// };
/// let mut reports = 0;
/// let model = train_on_lines(["小猫", "小狗"], &config, None, &CharSegmenter, |_| reports += 1)?;
///
/// assert_eq!(model.vocab.len(), 3);
/// assert_eq!(reports, 1);
/// # Ok::<(), nickname_rnn::NicknameError>(())
/// ```
pub fn train_on_lines<S, F, I>(
    lines: I,
    config: &TrainingConfig,
    model_path: Option<&Path>,
    segmenter: &S,
    mut on_progress: F,
) -> Result<NicknameModel>
where
    S: Segmenter + ?Sized,
    F: FnMut(&TrainingProgress<'_>),
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    config.validate()?;
    let lines: Vec<I::Item> = lines.into_iter().collect();

    let vocab = Vocabulary::build(lines.iter(), segmenter, config.append_end_token)?;
    let mut examples = encode_examples(lines.iter(), &vocab, segmenter, config.append_end_token);
    if examples.is_empty() {
        return Err(NicknameError::DegenerateVocabulary);
    }
    log::info!(
        "{} training examples, {} distinct tokens, end token {}",
        examples.len(),
        vocab.len(),
        if vocab.end_index().is_some() { "present" } else { "absent" }
    );

    let mut params =
        Parameters::initialize_with_seed(config.hidden_size, vocab.len(), config.init_seed);
    let mut shuffle_rng = StdRng::seed_from_u64(config.shuffle_seed);
    examples.shuffle(&mut shuffle_rng);

    let mut csv_logger = match &config.csv_log_path {
        Some(path) => Some(TrainingLogger::with_loss_scale(path, config.num_monitor_samples)?),
        None => None,
    };

    let mut loss = initial_loss(vocab.len(), config.num_monitor_samples);
    let mut hidden = params.zero_hidden();

    for j in 0..config.iterations {
        let example = &examples[j % examples.len()];
        let step = optimize(
            example,
            &hidden,
            &mut params,
            config.learning_rate,
            config.clip_value,
        );
        hidden = step.hidden;
        loss = smooth(loss, step.loss);

        if j % config.progress_every == 0 {
            let samples = if j % config.sample_every == 0 {
                monitor_samples(
                    &params,
                    &vocab,
                    config.num_monitor_samples,
                    config.monitor_max_length,
                )?
            } else {
                Vec::new()
            };

            let report = TrainingProgress {
                iteration: j,
                total: config.iterations,
                smoothed_loss: loss,
                samples: &samples,
                parameters: &params,
                vocab: &vocab,
            };
            log::info!(
                "iteration {}/{} ({}%), loss {:.4}",
                j,
                config.iterations,
                report.percent(),
                loss
            );
            log::debug!("clipped gradient norm {:.4}", compute_grad_norm(&step.gradients));
            if !samples.is_empty() {
                log::info!("samples: {}", samples.join(", "));
            }
            if let Some(logger) = csv_logger.as_mut() {
                if let Err(e) = logger.log(j, config.learning_rate, loss, &samples) {
                    log::warn!("failed to write training log row: {}", e);
                }
            }
            on_progress(&report);
        }

        if j > 0 && j % config.checkpoint_every == 0 {
            if let Some(path) = model_path {
                let snapshot = NicknameModel::new(params.clone(), vocab.clone());
                match snapshot.save(path, j, loss) {
                    Ok(()) => log::info!("checkpoint saved at iteration {}/{}", j, config.iterations),
                    Err(e) => log::warn!("checkpoint at iteration {} failed: {}", j, e),
                }
            }
        }
    }

    let model = NicknameModel::new(params, vocab);
    if let Some(path) = model_path {
        model.save(path, config.iterations, loss)?;
    }
    log::info!("training finished after {} iterations, loss {:.4}", config.iterations, loss);
    Ok(model)
}
