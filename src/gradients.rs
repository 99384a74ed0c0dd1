//! Gradient Utilities
//!
//! Gradient tensors mirror [`Parameters`] one-to-one. They are zeroed at the
//! start of every optimize step, accumulated backwards in time, clipped, and
//! applied by the optimizer.
//!
//! ## Why Clipping?
//!
//! Backpropagating through many tanh steps multiplies by `Waa^T` over and
//! over, so an occasional example produces a huge gradient and one update
//! wrecks the weights:
//!
//! ```text
//! Iteration 4000: Loss = 21.3
//! Iteration 4001: Loss = 893.0  (gradient explosion!)
//! Iteration 4002: Loss = NaN    (training failed)
//! ```
//!
//! ## Algorithm
//!
//! Elementwise clamping, not norm rescaling:
//!
//! ```text
//! for every gradient g:
//!     g = min(max(g, -max_value), max_value)
//! ```
//!
//! Each element is bounded independently, so one exploding entry does not
//! shrink the well-behaved ones.

use crate::params::Parameters;
use crate::tensor::Tensor;
use rayon::prelude::*;

/// Default clipping bound
pub const DEFAULT_CLIP_VALUE: f32 = 5.0;

/// Gradients for each of the five parameter tensors
#[derive(Clone, Debug, PartialEq)]
pub struct Gradients {
    pub dwax: Tensor,
    pub dwaa: Tensor,
    pub dwya: Tensor,
    pub db: Tensor,
    pub dby: Tensor,
}

impl Gradients {
    /// Zero gradients shaped like `params`
    pub fn zeros_like(params: &Parameters) -> Self {
        Self {
            dwax: params.wax.zeros_like(),
            dwaa: params.waa.zeros_like(),
            dwya: params.wya.zeros_like(),
            db: params.b.zeros_like(),
            dby: params.by.zeros_like(),
        }
    }

    fn tensors(&self) -> [&Tensor; 5] {
        [&self.dwax, &self.dwaa, &self.dwya, &self.db, &self.dby]
    }

    fn tensors_mut(&mut self) -> [&mut Tensor; 5] {
        [
            &mut self.dwax,
            &mut self.dwaa,
            &mut self.dwya,
            &mut self.db,
            &mut self.dby,
        ]
    }

    /// Largest absolute gradient across all five tensors
    pub fn max_abs(&self) -> f32 {
        self.tensors()
            .iter()
            .map(|t| t.max_abs())
            .fold(0.0, f32::max)
    }
}

/// Clamp every gradient element into `[-max_value, max_value]` in place
///
/// # Example
///
/// ```rust
/// use nickname_rnn::{clip_gradients, Gradients, Parameters};
///
/// let params = Parameters::initialize(4, 3);
/// let mut grads = Gradients::zeros_like(&params);
/// grads.dwya.data[0] = 42.0;
/// clip_gradients(&mut grads, 5.0);
/// assert_eq!(grads.dwya.data[0], 5.0);
/// ```
pub fn clip_gradients(grads: &mut Gradients, max_value: f32) {
    for tensor in grads.tensors_mut() {
        tensor.clamp_inplace(-max_value, max_value);
    }
}

/// L2 norm over all gradient values, for monitoring
pub fn compute_grad_norm(grads: &Gradients) -> f32 {
    let sum_sq_parallel = |data: &Vec<f32>| -> f32 { data.par_iter().map(|&v| v * v).sum() };

    grads
        .tensors()
        .iter()
        .map(|t| sum_sq_parallel(&t.data))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_gradients() -> Gradients {
        let params = Parameters::initialize(6, 4);
        let mut grads = Gradients::zeros_like(&params);
        for (i, tensor) in grads.tensors_mut().into_iter().enumerate() {
            for (j, v) in tensor.data.iter_mut().enumerate() {
                *v = ((i * 31 + j * 7) % 23) as f32 - 11.0;
            }
        }
        grads
    }

    #[test]
    fn test_clip_bounds_every_element() {
        let mut grads = noisy_gradients();
        assert!(grads.max_abs() > DEFAULT_CLIP_VALUE);

        clip_gradients(&mut grads, DEFAULT_CLIP_VALUE);
        for tensor in grads.tensors() {
            assert!(tensor
                .data
                .iter()
                .all(|&v| (-DEFAULT_CLIP_VALUE..=DEFAULT_CLIP_VALUE).contains(&v)));
        }
    }

    #[test]
    fn test_clip_leaves_small_values_alone() {
        let mut grads = noisy_gradients();
        let before = grads.clone();
        clip_gradients(&mut grads, 100.0);
        assert_eq!(grads, before);
    }

    #[test]
    fn test_grad_norm() {
        let params = Parameters::initialize(2, 2);
        let mut grads = Gradients::zeros_like(&params);
        grads.db.data[0] = 3.0;
        grads.dby.data[1] = 4.0;
        assert!((compute_grad_norm(&grads) - 5.0).abs() < 1e-6);
    }
}
