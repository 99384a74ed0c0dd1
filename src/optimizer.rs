//! Plain Gradient Descent
//!
//! The update rule is vanilla SGD, applied to each of the five tensors:
//!
//! ```text
//! θ = θ - α · ∇θ
//! ```
//!
//! [`optimize`] is the atomic unit of training. It chains
//!
//! ```text
//! forward -> backward -> clip -> update
//! ```
//!
//! on a single example and touches nothing besides the parameters it is
//! handed.
//!
//! ## Example
//!
//! ```rust
//! use nickname_rnn::{optimize, Parameters, TrainingExample};
//!
//! let mut params = Parameters::initialize(16, 3);
//! let example = TrainingExample::from_indices(&[0, 1], Some(2));
//! let hidden = params.zero_hidden();
//!
//! let step = optimize(&example, &hidden, &mut params, 0.01, 5.0);
//! assert!(step.loss > 0.0);
//! assert_eq!(step.hidden.shape, vec![16, 1]);
//! ```

use crate::gradients::{clip_gradients, Gradients};
use crate::params::Parameters;
use crate::rnn::{backward, forward, TrainingExample};
use crate::tensor::Tensor;

/// Default SGD learning rate
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Everything one optimize step reports back
#[derive(Clone, Debug)]
pub struct StepOutput {
    /// Cross-entropy loss of the example before the update
    pub loss: f32,
    /// Clipped gradients that were applied
    pub gradients: Gradients,
    /// Hidden state after the example's last timestep
    pub hidden: Tensor,
}

/// Apply `param -= learning_rate * grad` to every tensor in place
pub fn sgd_update(params: &mut Parameters, grads: &Gradients, learning_rate: f32) {
    params.wax.sub_scaled_inplace(&grads.dwax, learning_rate);
    params.waa.sub_scaled_inplace(&grads.dwaa, learning_rate);
    params.wya.sub_scaled_inplace(&grads.dwya, learning_rate);
    params.b.sub_scaled_inplace(&grads.db, learning_rate);
    params.by.sub_scaled_inplace(&grads.dby, learning_rate);
}

/// Run forward, backward, clipping and the SGD update for one example
pub fn optimize(
    example: &TrainingExample,
    prev_hidden: &Tensor,
    params: &mut Parameters,
    learning_rate: f32,
    clip_value: f32,
) -> StepOutput {
    let (loss, trace) = forward(&example.inputs, &example.targets, prev_hidden, params);
    let (mut gradients, hidden) = backward(&example.targets, params, trace);

    clip_gradients(&mut gradients, clip_value);
    sgd_update(params, &gradients, learning_rate);

    StepOutput {
        loss,
        gradients,
        hidden,
    }
}
