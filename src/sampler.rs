//! Sequence Sampling
//!
//! Generates new token sequences from trained parameters. Sampling starts from
//! the zero input and a zero hidden state, and each accepted draw becomes the
//! next step's input:
//!
//! ```text
//! h = tanh(Wax · x + Waa · h + b)
//! y = softmax(Wya · h + by)
//! i ~ Categorical(y)
//! x = onehot(i)
//! ```
//!
//! ## Stopping Rules
//!
//! Two modes decide when a sequence ends.
//!
//! **Open length** (`exact_length = false`): keep drawing until the end token
//! is drawn or `max_length` tokens were accepted, but never stop with fewer
//! than `min_length` tokens. A run that hits `max_length` without drawing the
//! end token gets it appended.
//!
//! **Exact length** (`exact_length = true`): the end token does not stop the
//! run. Exactly `max_length` tokens are drawn and the last one is overwritten
//! with the end token.
//!
//! In both modes an end token drawn while fewer than `min_length - 1` tokens
//! were accepted is rejected and redrawn. Rejected draws leave the hidden
//! state untouched.
//!
//! ## Determinism
//!
//! All randomness comes from a `StdRng` seeded with the caller's seed, so the
//! same parameters and seed always produce the same sequence.
//!
//! ## Example
//!
//! ```rust
//! use nickname_rnn::{sample, Parameters, Vocabulary};
//!
//! let vocab = Vocabulary::from_tokens(["苹", "果", "\n"]);
//! let params = Parameters::initialize(16, vocab.len());
//!
//! let a = sample(&params, &vocab, 7, 10, 2, false)?;
//! let b = sample(&params, &vocab, 7, 10, 2, false)?;
//! assert_eq!(a, b);
//! # Ok::<(), nickname_rnn::NicknameError>(())
//! ```

use crate::error::{NicknameError, Result};
use crate::params::Parameters;
use crate::rnn::step_forward;
use crate::vocab::{Vocabulary, END_TOKEN};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Default minimum number of tokens per sample
pub const DEFAULT_MIN_LENGTH: usize = 2;

/// Leading token stripped from decoded nicknames
pub const DISFAVORED_PREFIX: &str = "的";

/// Upper bound on consecutive rejected end-token draws at one position
const MAX_REDRAWS: usize = 10_000;

/// Draw a sequence of token indices from the network
///
/// # Arguments
///
/// * `params` - Network parameters
/// * `vocab` - Vocabulary the parameters were trained on
/// * `seed` - Seed for the draw sequence
/// * `max_length` - Token limit (the exact count in exact mode)
/// * `min_length` - No end token is accepted before this many tokens
/// * `exact_length` - Ignore the end token as a stop signal
///
/// # Errors
///
/// [`NicknameError::Sampling`] when the output distribution is not a valid
/// set of weights (NaN parameters), and [`NicknameError::SamplingStalled`]
/// when it puts so much mass on the end token that a required non-end draw
/// never happens.
pub fn sample(
    params: &Parameters,
    vocab: &Vocabulary,
    seed: u64,
    max_length: usize,
    min_length: usize,
    exact_length: bool,
) -> Result<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let end = vocab.end_index();

    let mut hidden = params.zero_hidden();
    let mut input: Option<usize> = None;
    let mut last: Option<usize> = None;
    let mut indices = Vec::new();

    let keep_going = |count: usize, last: Option<usize>| -> bool {
        if exact_length {
            return count < max_length;
        }
        let stopped_on_end = end.is_some() && last == end;
        (!stopped_on_end && count < max_length) || count < min_length
    };

    while keep_going(indices.len(), last) {
        let (next_hidden, probs) = step_forward(params, &hidden, input);
        let dist = WeightedIndex::<f32>::new(probs.data.iter())
            .map_err(|e| NicknameError::Sampling(e.to_string()))?;

        let mut index = dist.sample(&mut rng);
        let mut redraws = 0;
        while Some(index) == end && indices.len() + 1 < min_length {
            redraws += 1;
            if redraws > MAX_REDRAWS {
                return Err(NicknameError::SamplingStalled {
                    position: indices.len(),
                });
            }
            index = dist.sample(&mut rng);
        }

        indices.push(index);
        hidden = next_hidden;
        input = Some(index);
        last = Some(index);
    }

    if let (Some(end), Some(tail)) = (end, indices.last().copied()) {
        if tail != end {
            if exact_length {
                if let Some(slot) = indices.last_mut() {
                    *slot = end;
                }
            } else if indices.len() == max_length {
                indices.push(end);
            }
        }
    }

    Ok(indices)
}

/// Turn sampled indices into a nickname string
///
/// End tokens are dropped and a leading [`DISFAVORED_PREFIX`] is removed.
/// Indices outside the vocabulary contribute nothing.
///
/// ```rust
/// use nickname_rnn::{decode, Vocabulary};
///
/// let vocab = Vocabulary::from_tokens(["的", "小", "猫", "\n"]);
/// assert_eq!(decode(&[0, 1, 2, 3], &vocab), "小猫");
/// ```
pub fn decode(indices: &[usize], vocab: &Vocabulary) -> String {
    let mut tokens = indices
        .iter()
        .filter_map(|&i| vocab.token(i))
        .filter(|&t| t != END_TOKEN)
        .peekable();

    if tokens.peek() == Some(&DISFAVORED_PREFIX) {
        tokens.next();
    }
    tokens.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    fn toy_vocab() -> Vocabulary {
        Vocabulary::from_tokens(["的", "小", "猫", "狗", "\n"])
    }

    /// Parameters whose output ignores the hidden state: softmax(by)
    fn biased_params(vocab: &Vocabulary, logits: &[f32]) -> Parameters {
        let mut p = Parameters::initialize(8, vocab.len());
        p.wya = Tensor::zeros(p.wya.shape.clone());
        p.by = Tensor::column(logits.to_vec());
        p
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let vocab = toy_vocab();
        let params = Parameters::initialize_with_seed(12, vocab.len(), 3);
        for seed in 0..20 {
            let a = sample(&params, &vocab, seed, 12, 2, false).unwrap();
            let b = sample(&params, &vocab, seed, 12, 2, false).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_no_early_end_token() {
        let vocab = toy_vocab();
        let end = vocab.end_index().unwrap();
        // End token dominates, other tokens still reachable
        let params = biased_params(&vocab, &[0.0, 0.0, 0.0, 0.0, 3.0]);

        for min_length in 1..5 {
            for seed in 0..50 {
                let seq = sample(&params, &vocab, seed, 10, min_length, false).unwrap();
                assert!(seq.len() >= min_length);
                let first_end = seq.iter().position(|&i| i == end);
                if let Some(pos) = first_end {
                    assert!(pos + 1 >= min_length, "end at {} with min {}", pos, min_length);
                    assert_eq!(pos, seq.len() - 1);
                }
            }
        }
    }

    #[test]
    fn test_open_length_appends_end_at_limit() {
        let vocab = toy_vocab();
        let end = vocab.end_index().unwrap();
        // End token practically never drawn
        let params = biased_params(&vocab, &[0.0, 0.0, 0.0, 0.0, -30.0]);

        let seq = sample(&params, &vocab, 1, 6, 2, false).unwrap();
        assert_eq!(seq.len(), 7);
        assert_eq!(seq[6], end);
        assert!(seq[..6].iter().all(|&i| i != end));
    }

    #[test]
    fn test_exact_length_forces_final_end() {
        let vocab = toy_vocab();
        let end = vocab.end_index().unwrap();
        let params = Parameters::initialize_with_seed(12, vocab.len(), 9);

        for seed in 0..20 {
            let seq = sample(&params, &vocab, seed, 8, 2, true).unwrap();
            assert_eq!(seq.len(), 8);
            assert_eq!(seq[7], end);
        }
    }

    #[test]
    fn test_without_end_token_stops_at_max() {
        let vocab = Vocabulary::from_tokens(["a", "b", "c"]);
        let params = Parameters::initialize(6, vocab.len());
        assert_eq!(sample(&params, &vocab, 4, 5, 2, false).unwrap().len(), 5);
        assert_eq!(sample(&params, &vocab, 4, 5, 2, true).unwrap().len(), 5);
    }

    #[test]
    fn test_min_length_beats_zero_max() {
        let vocab = Vocabulary::from_tokens(["a", "b"]);
        let params = Parameters::initialize(4, vocab.len());
        assert_eq!(sample(&params, &vocab, 0, 0, 2, false).unwrap().len(), 2);
        assert!(sample(&params, &vocab, 0, 0, 2, true).unwrap().is_empty());
    }

    #[test]
    fn test_nan_parameters_fail() {
        let vocab = toy_vocab();
        let mut params = Parameters::initialize(4, vocab.len());
        params.by.data[0] = f32::NAN;
        let result = sample(&params, &vocab, 0, 5, 2, false);
        assert!(matches!(result, Err(NicknameError::Sampling(_))));
    }

    #[test]
    fn test_dominant_end_token_stalls() {
        let vocab = Vocabulary::from_tokens(["a", "\n"]);
        let params = biased_params(&vocab, &[0.0, 25.0]);
        let result = sample(&params, &vocab, 0, 4, 2, false);
        assert!(matches!(
            result,
            Err(NicknameError::SamplingStalled { position: 0 })
        ));
    }

    #[test]
    fn test_decode_strips_prefix_and_end() {
        let vocab = toy_vocab();
        assert_eq!(decode(&[0, 1, 2, 4], &vocab), "小猫");
        // Only a leading prefix is removed
        assert_eq!(decode(&[1, 0, 3], &vocab), "小的狗");
        assert_eq!(decode(&[0, 0, 2], &vocab), "的猫");
        assert_eq!(decode(&[], &vocab), "");
    }
}
