//! Nickname Generation
//!
//! The caller-facing side of sampling: validates a [`GenerateRequest`], draws
//! one sample per attempt, decodes it, and keeps the results that are long
//! enough.
//!
//! ## Attempts and Seeds
//!
//! Attempt `i` samples with seed `seed + i`, so a request with a fixed seed
//! always returns the same nicknames. Without a seed a random base in
//! `0..=10000` is picked. A request stops after `count` accepted nicknames or
//! `3 · count` attempts, whichever comes first; running out of attempts
//! returns the shorter list rather than an error. A seed whose draws stall on
//! the end token only uses up its attempt.
//!
//! ## Length Handling
//!
//! ```text
//! open length:   sample up to max_length tokens, keep if ≥ min_length chars
//! exact length:  sample 2·max_length tokens, truncate to max_length chars,
//!                keep only if exactly max_length chars remain
//! ```
//!
//! ## Sharing
//!
//! [`NicknameGenerator`] reads the model through a [`SharedModel`] slot. The
//! training coordinator publishes into the same slot, so generation works on
//! whatever model was loaded or published last. The slot holds an `Arc`; a
//! request takes its own handle and samples with the lock already released.

use crate::checkpoint::NicknameModel;
use crate::error::{NicknameError, Result};
use crate::sampler::{decode, sample, DEFAULT_MIN_LENGTH};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Shared, replaceable model slot
pub type SharedModel = Arc<RwLock<Option<Arc<NicknameModel>>>>;

/// Accepted range for [`GenerateRequest::count`]
pub const COUNT_RANGE: RangeInclusive<usize> = 1..=20;

/// Accepted range for [`GenerateRequest::max_length`]
pub const MAX_LENGTH_RANGE: RangeInclusive<usize> = 2..=20;

/// Upper bound for a randomly picked base seed
const RANDOM_SEED_MAX: u64 = 10_000;

/// Parameters of one generation call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    /// Nicknames wanted
    pub count: usize,
    /// Base seed; `None` picks one at random
    pub seed: Option<u64>,
    /// Character limit (the exact length in exact mode)
    pub max_length: usize,
    /// Shorter results are discarded
    pub min_length: usize,
    /// Produce nicknames of exactly `max_length` characters
    pub exact_length: bool,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self {
            count: 5,
            seed: None,
            max_length: 10,
            min_length: DEFAULT_MIN_LENGTH,
            exact_length: false,
        }
    }
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<()> {
        if !COUNT_RANGE.contains(&self.count) {
            return Err(NicknameError::Config(format!(
                "count must be in {:?}, got {}",
                COUNT_RANGE, self.count
            )));
        }
        if !MAX_LENGTH_RANGE.contains(&self.max_length) {
            return Err(NicknameError::Config(format!(
                "max_length must be in {:?}, got {}",
                MAX_LENGTH_RANGE, self.max_length
            )));
        }
        if self.min_length > self.max_length {
            return Err(NicknameError::Config(format!(
                "min_length {} exceeds max_length {}",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }
}

/// Generate nicknames from `model`
///
/// # Example
///
/// ```rust
/// use nickname_rnn::{generate_nicknames, GenerateRequest, NicknameModel, Parameters, Vocabulary};
///
/// let vocab = Vocabulary::from_tokens(["小", "猫", "狗", "\n"]);
/// let model = NicknameModel::new(Parameters::initialize(16, vocab.len()), vocab);
///
/// let request = GenerateRequest {
///     count: 3,
///     seed: Some(42),
///     max_length: 4,
///     exact_length: true,
///     ..GenerateRequest::default()
/// };
/// let names = generate_nicknames(&model, &request)?;
/// assert!(names.iter().all(|n| n.chars().count() == 4));
/// assert_eq!(names, generate_nicknames(&model, &request)?);
/// # Ok::<(), nickname_rnn::NicknameError>(())
/// ```
pub fn generate_nicknames(model: &NicknameModel, request: &GenerateRequest) -> Result<Vec<String>> {
    request.validate()?;

    let base_seed = request
        .seed
        .unwrap_or_else(|| rand::rng().random_range(0..=RANDOM_SEED_MAX));
    let (sample_length, required_chars) = if request.exact_length {
        (request.max_length * 2, request.max_length)
    } else {
        (request.max_length, request.min_length)
    };
    let max_attempts = request.count * 3;

    let mut nicknames = Vec::with_capacity(request.count);
    let mut attempts = 0;
    while nicknames.len() < request.count && attempts < max_attempts {
        let seed = base_seed.wrapping_add(attempts as u64);
        attempts += 1;

        let indices = match sample(
            &model.params,
            &model.vocab,
            seed,
            sample_length,
            request.min_length,
            request.exact_length,
        ) {
            Ok(indices) => indices,
            Err(NicknameError::SamplingStalled { position }) => {
                log::debug!("seed {} stalled at position {}", seed, position);
                continue;
            }
            Err(e) => return Err(e),
        };
        let mut nickname = decode(&indices, &model.vocab);
        if request.exact_length {
            nickname = nickname.chars().take(request.max_length).collect();
        }

        if nickname.chars().count() < required_chars {
            log::debug!("discarding short nickname {:?} (seed {})", nickname, seed);
            continue;
        }
        nicknames.push(nickname);
    }

    if nicknames.len() < request.count {
        log::warn!(
            "generated {} of {} nicknames in {} attempts",
            nicknames.len(),
            request.count,
            attempts
        );
    }
    Ok(nicknames)
}

/// Generates nicknames from a shared model slot
#[derive(Clone, Debug, Default)]
pub struct NicknameGenerator {
    model: SharedModel,
}

impl NicknameGenerator {
    /// Generator reading from an existing slot
    pub fn new(model: SharedModel) -> Self {
        Self { model }
    }

    /// Generator with its own slot, already holding `model`
    pub fn with_model(model: NicknameModel) -> Self {
        Self::new(Arc::new(RwLock::new(Some(Arc::new(model)))))
    }

    /// Handle to the underlying slot
    pub fn shared(&self) -> SharedModel {
        Arc::clone(&self.model)
    }

    /// Whether a model is available
    pub fn is_ready(&self) -> bool {
        self.model.read().is_some()
    }

    /// Handle to the model currently in the slot
    pub fn current(&self) -> Option<Arc<NicknameModel>> {
        self.model.read().clone()
    }

    /// Replace the model in the slot
    pub fn publish(&self, model: NicknameModel) {
        *self.model.write() = Some(Arc::new(model));
    }

    /// Generate nicknames from the current model
    ///
    /// # Errors
    ///
    /// [`NicknameError::ModelNotReady`] when the slot is empty, plus request
    /// validation and sampling errors.
    pub fn generate(&self, request: &GenerateRequest) -> Result<Vec<String>> {
        let model = self.current().ok_or(NicknameError::ModelNotReady)?;
        let nicknames = generate_nicknames(&model, request)?;
        log::debug!("generated {} nicknames", nicknames.len());
        Ok(nicknames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use crate::tensor::Tensor;
    use crate::vocab::Vocabulary;

    fn toy_model() -> NicknameModel {
        let vocab = Vocabulary::from_tokens(["的", "小", "猫", "狗", "兔", "\n"]);
        let params = Parameters::initialize_with_seed(16, vocab.len(), 5);
        NicknameModel::new(params, vocab)
    }

    #[test]
    fn test_fixed_seed_is_repeatable() {
        let model = toy_model();
        let request = GenerateRequest {
            seed: Some(7),
            ..GenerateRequest::default()
        };
        let a = generate_nicknames(&model, &request).unwrap();
        let b = generate_nicknames(&model, &request).unwrap();
        assert_eq!(a, b);
        assert!(a.len() <= 5);
        assert!(a.iter().all(|n| n.chars().count() >= 2 && !n.contains('\n')));
    }

    #[test]
    fn test_exact_length() {
        let model = toy_model();
        for max_length in [2, 5, 9] {
            let request = GenerateRequest {
                count: 6,
                seed: Some(100),
                max_length,
                exact_length: true,
                ..GenerateRequest::default()
            };
            let names = generate_nicknames(&model, &request).unwrap();
            assert!(!names.is_empty());
            for name in names {
                assert_eq!(name.chars().count(), max_length, "{:?}", name);
            }
        }
    }

    #[test]
    fn test_attempt_budget_bounds_output() {
        // Every sample is "的的" plus the end token, which decodes to a single
        // character
        let vocab = Vocabulary::from_tokens(["的", "\n"]);
        let mut params = Parameters::initialize(4, vocab.len());
        params.wya = Tensor::zeros(params.wya.shape.clone());
        params.by = Tensor::column(vec![0.0, -40.0]);
        let model = NicknameModel::new(params, vocab);

        let request = GenerateRequest {
            count: 4,
            seed: Some(1),
            max_length: 2,
            ..GenerateRequest::default()
        };
        assert!(generate_nicknames(&model, &request).unwrap().is_empty());
    }

    #[test]
    fn test_stalled_seeds_use_up_attempts() {
        let vocab = Vocabulary::from_tokens(["a", "\n"]);
        let mut params = Parameters::initialize(4, vocab.len());
        params.wya = Tensor::zeros(params.wya.shape.clone());
        params.by = Tensor::column(vec![0.0, 25.0]);
        let model = NicknameModel::new(params, vocab);

        let request = GenerateRequest {
            count: 3,
            seed: Some(0),
            max_length: 4,
            ..GenerateRequest::default()
        };
        assert_eq!(generate_nicknames(&model, &request).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_invalid_weights_still_fail() {
        let mut model = toy_model();
        model.params.by.data[0] = f32::NAN;
        assert!(matches!(
            generate_nicknames(&model, &GenerateRequest::default()),
            Err(NicknameError::Sampling(_))
        ));
    }

    #[test]
    fn test_request_validation() {
        let model = toy_model();
        for request in [
            GenerateRequest { count: 0, ..GenerateRequest::default() },
            GenerateRequest { count: 21, ..GenerateRequest::default() },
            GenerateRequest { max_length: 1, ..GenerateRequest::default() },
            GenerateRequest { max_length: 21, ..GenerateRequest::default() },
            GenerateRequest { min_length: 11, ..GenerateRequest::default() },
        ] {
            assert!(matches!(
                generate_nicknames(&model, &request),
                Err(NicknameError::Config(_))
            ));
        }
    }

    #[test]
    fn test_generator_requires_model() {
        let generator = NicknameGenerator::default();
        assert!(!generator.is_ready());
        assert!(matches!(
            generator.generate(&GenerateRequest::default()),
            Err(NicknameError::ModelNotReady)
        ));

        generator.publish(toy_model());
        assert!(generator.is_ready());
        assert!(generator.generate(&GenerateRequest::default()).is_ok());
    }

    #[test]
    fn test_shared_slot() {
        let generator = NicknameGenerator::default();
        let other = NicknameGenerator::new(generator.shared());
        generator.publish(toy_model());
        assert!(other.is_ready());
    }

    #[test]
    fn test_snapshot_outlives_publish() {
        let generator = NicknameGenerator::with_model(toy_model());
        let snapshot = generator.current().unwrap();

        let mut replacement = toy_model();
        replacement.params.by.data[0] = 3.0;
        generator.publish(replacement);

        // The slot is free for writers while a snapshot is in use
        assert!(generator.shared().try_write().is_some());
        assert_eq!(*snapshot, toy_model());
        assert_eq!(generator.current().unwrap().params.by.data[0], 3.0);
    }

    #[test]
    fn test_publish_during_generation() {
        let generator = NicknameGenerator::with_model(toy_model());
        let reader = generator.clone();
        let handle = std::thread::spawn(move || {
            let request = GenerateRequest {
                count: 20,
                seed: Some(9),
                max_length: 20,
                ..GenerateRequest::default()
            };
            for _ in 0..10 {
                reader.generate(&request).unwrap();
            }
        });
        for _ in 0..50 {
            generator.publish(toy_model());
        }
        handle.join().unwrap();
    }
}
