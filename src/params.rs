//! Network Parameters
//!
//! The five tensors of a single-layer tanh RNN:
//!
//! ```text
//! Wax [H, V]  input  -> hidden
//! Waa [H, H]  hidden -> hidden
//! Wya [V, H]  hidden -> output
//! b   [H, 1]  hidden bias
//! by  [V, 1]  output bias
//! ```
//!
//! `H` is the hidden width and `V` the vocabulary size. Only the optimizer
//! writes to these tensors; the forward engine and the sampler read them.
//!
//! ## Initialization
//!
//! Weights are drawn from `N(0, 1)` and scaled by 0.01; biases start at zero.
//! The generator is seeded with a fixed value, so the same `(H, V)` always
//! produces the same starting point.

use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Seed used for weight initialization
pub const INIT_SEED: u64 = 1;

/// Scale applied to standard-normal initial weights
pub const INIT_SCALE: f32 = 0.01;

/// The five trainable tensors
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    pub wax: Tensor,
    pub waa: Tensor,
    pub wya: Tensor,
    pub b: Tensor,
    pub by: Tensor,
}

impl Parameters {
    /// Freshly initialized parameters for hidden width `hidden` and vocabulary
    /// size `vocab`
    ///
    /// ```rust
    /// use nickname_rnn::Parameters;
    ///
    /// let p = Parameters::initialize(50, 3);
    /// assert_eq!(p.wax.shape, vec![50, 3]);
    /// assert_eq!(p, Parameters::initialize(50, 3));
    /// ```
    pub fn initialize(hidden: usize, vocab: usize) -> Self {
        Self::initialize_with_seed(hidden, vocab, INIT_SEED)
    }

    /// Like [`Parameters::initialize`] with an explicit seed
    pub fn initialize_with_seed(hidden: usize, vocab: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut randn = |rows: usize, cols: usize| {
            let data = (0..rows * cols)
                .map(|_| {
                    let z: f32 = StandardNormal.sample(&mut rng);
                    z * INIT_SCALE
                })
                .collect();
            Tensor::new(data, vec![rows, cols])
        };

        let wax = randn(hidden, vocab);
        let waa = randn(hidden, hidden);
        let wya = randn(vocab, hidden);

        Self {
            wax,
            waa,
            wya,
            b: Tensor::zeros(vec![hidden, 1]),
            by: Tensor::zeros(vec![vocab, 1]),
        }
    }

    /// Hidden width `H`
    pub fn hidden_size(&self) -> usize {
        self.waa.rows()
    }

    /// Vocabulary size `V`
    pub fn vocab_size(&self) -> usize {
        self.by.rows()
    }

    /// Zero hidden state `[H, 1]`
    pub fn zero_hidden(&self) -> Tensor {
        Tensor::zeros(vec![self.hidden_size(), 1])
    }

    /// Check that all five shapes agree with `(H, V)` taken from `Waa` and `by`
    pub fn validate_shapes(&self) -> std::result::Result<(), String> {
        let (h, v) = (self.hidden_size(), self.vocab_size());
        let expected = [
            ("Wax", &self.wax, [h, v]),
            ("Waa", &self.waa, [h, h]),
            ("Wya", &self.wya, [v, h]),
            ("b", &self.b, [h, 1]),
            ("by", &self.by, [v, 1]),
        ];
        for (name, tensor, shape) in expected {
            if tensor.shape != shape {
                return Err(format!(
                    "{} has shape {:?}, expected {:?}",
                    name, tensor.shape, shape
                ));
            }
        }
        Ok(())
    }

    /// Total number of scalar parameters
    pub fn count(&self) -> usize {
        [&self.wax, &self.waa, &self.wya, &self.b, &self.by]
            .iter()
            .map(|t| t.data.len())
            .sum()
    }
}
