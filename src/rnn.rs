//! Forward and Backward Engine
//!
//! One training example flows through the recurrent cell step by step:
//!
//! ```text
//! h[t] = tanh(Wax · x[t] + Waa · h[t-1] + b)
//! y[t] = softmax(Wya · h[t] + by)
//! loss = -Σ log y[t][target[t]]
//! ```
//!
//! `x[t]` is the one-hot encoding of `input[t]`, or the zero vector for the
//! start marker. The forward pass records everything the backward pass needs
//! in a [`ForwardTrace`]; the backward pass walks the trace in reverse and
//! accumulates gradients (backpropagation through time).
//!
//! ## Backward Pass
//!
//! ```text
//! for t = T-1 .. 0:
//!     dy    = y[t] - onehot(target[t])
//!     dWya += dy · h[t]^T
//!     dby  += dy
//!     dh    = Wya^T · dy + dh_next
//!     draw  = (1 - h[t]²) ⊙ dh
//!     db   += draw
//!     dWax += draw · x[t]^T
//!     dWaa += draw · h[t-1]^T
//!     dh_next = Waa^T · draw
//! ```
//!
//! One-hot inputs are never materialized: `Wax · x[t]` is a column lookup and
//! `draw · x[t]^T` touches a single column.

use crate::gradients::Gradients;
use crate::params::Parameters;
use crate::tensor::Tensor;

/// One encoded corpus line
///
/// `inputs[0]` is the start marker (`None`); `targets` is `inputs` shifted
/// left by one, ending in the end-token index (or 0 when the vocabulary has
/// no end token).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingExample {
    pub inputs: Vec<Option<usize>>,
    pub targets: Vec<usize>,
}

impl TrainingExample {
    /// Build an example from the token indices of one line
    ///
    /// ```rust
    /// use nickname_rnn::TrainingExample;
    ///
    /// let ex = TrainingExample::from_indices(&[0, 1], Some(2));
    /// assert_eq!(ex.inputs, vec![None, Some(0), Some(1)]);
    /// assert_eq!(ex.targets, vec![0, 1, 2]);
    /// ```
    pub fn from_indices(indices: &[usize], end_index: Option<usize>) -> Self {
        let mut inputs = Vec::with_capacity(indices.len() + 1);
        inputs.push(None);
        inputs.extend(indices.iter().copied().map(Some));

        let mut targets = indices.to_vec();
        targets.push(end_index.unwrap_or(0));

        Self { inputs, targets }
    }

    /// Number of timesteps, never zero since the start marker is always there
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }
}

/// Per-timestep record of a forward pass
#[derive(Clone, Debug)]
pub struct ForwardTrace {
    /// Input index per step (`None` is the zero vector)
    pub inputs: Vec<Option<usize>>,
    /// Hidden state before the first step (`h[-1]`)
    pub initial_hidden: Tensor,
    /// `h[t]` for each step
    pub hidden: Vec<Tensor>,
    /// `y[t]` for each step
    pub probs: Vec<Tensor>,
}

impl ForwardTrace {
    /// `h[t-1]`, with `h[-1]` being the initial hidden state
    fn previous_hidden(&self, t: usize) -> &Tensor {
        if t == 0 {
            &self.initial_hidden
        } else {
            &self.hidden[t - 1]
        }
    }

    /// Hidden state after the last step
    pub fn final_hidden(&self) -> &Tensor {
        self.hidden.last().unwrap_or(&self.initial_hidden)
    }
}

/// Advance the cell by one step, returning `(h[t], y[t])`
pub fn step_forward(
    params: &Parameters,
    hidden_prev: &Tensor,
    input: Option<usize>,
) -> (Tensor, Tensor) {
    let mut pre = match input {
        Some(index) => params.wax.column_at(index),
        None => params.zero_hidden(),
    };
    pre.add_assign(&params.waa.matmul(hidden_prev));
    pre.add_assign(&params.b);
    let hidden = pre.tanh();

    let logits = params.wya.matmul(&hidden).add(&params.by);
    let probs = logits.softmax();
    (hidden, probs)
}

/// Run one example forward, returning the summed cross-entropy loss and the
/// trace
///
/// # Panics
///
/// Panics if `inputs` and `targets` differ in length
pub fn forward(
    inputs: &[Option<usize>],
    targets: &[usize],
    initial_hidden: &Tensor,
    params: &Parameters,
) -> (f32, ForwardTrace) {
    assert_eq!(
        inputs.len(),
        targets.len(),
        "inputs and targets must have the same length"
    );

    let mut hidden = Vec::with_capacity(inputs.len());
    let mut probs = Vec::with_capacity(inputs.len());
    let mut loss = 0.0f32;

    let mut h_prev = initial_hidden.clone();
    for (&input, &target) in inputs.iter().zip(targets) {
        let (h, y) = step_forward(params, &h_prev, input);
        loss -= y.data[target].ln();
        h_prev = h.clone();
        hidden.push(h);
        probs.push(y);
    }

    let trace = ForwardTrace {
        inputs: inputs.to_vec(),
        initial_hidden: initial_hidden.clone(),
        hidden,
        probs,
    };
    (loss, trace)
}

/// Backpropagate through time, returning the gradients and the final hidden
/// state
///
/// The final hidden state seeds the next example so consecutive examples form
/// a continuous stream.
pub fn backward(targets: &[usize], params: &Parameters, trace: ForwardTrace) -> (Gradients, Tensor) {
    let mut grads = Gradients::zeros_like(params);
    let mut dh_next = params.zero_hidden();

    for t in (0..trace.probs.len()).rev() {
        let h = &trace.hidden[t];
        let h_prev = trace.previous_hidden(t);

        let mut dy = trace.probs[t].clone();
        dy.data[targets[t]] -= 1.0;

        grads.dwya.add_outer(&dy, h);
        grads.dby.add_assign(&dy);

        let mut dh = params.wya.transpose_matmul(&dy);
        dh.add_assign(&dh_next);

        // backprop through tanh: d/dx tanh(x) = 1 - tanh(x)^2
        let draw = Tensor::new(
            h.data
                .iter()
                .zip(&dh.data)
                .map(|(&a, &d)| (1.0 - a * a) * d)
                .collect(),
            h.shape.clone(),
        );

        grads.db.add_assign(&draw);
        if let Some(index) = trace.inputs[t] {
            grads.dwax.add_to_column(index, &draw);
        }
        grads.dwaa.add_outer(&draw, h_prev);

        dh_next = params.waa.transpose_matmul(&draw);
    }

    let final_hidden = trace.final_hidden().clone();
    (grads, final_hidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled_params(hidden: usize, vocab: usize, scale: f32) -> Parameters {
        let mut p = Parameters::initialize(hidden, vocab);
        for t in [&mut p.wax, &mut p.waa, &mut p.wya] {
            t.data.iter_mut().for_each(|v| *v *= scale);
        }
        p.b.data.iter_mut().enumerate().for_each(|(i, v)| *v = 0.1 * i as f32);
        p.by.data.iter_mut().enumerate().for_each(|(i, v)| *v = -0.05 * i as f32);
        p
    }

    fn tensor_mut(p: &mut Parameters, which: usize) -> &mut Tensor {
        match which {
            0 => &mut p.wax,
            1 => &mut p.waa,
            2 => &mut p.wya,
            3 => &mut p.b,
            _ => &mut p.by,
        }
    }

    #[test]
    fn test_empty_example_still_has_start_step() {
        let ex = TrainingExample::from_indices(&[], Some(3));
        assert_eq!(ex.len(), 1);
        assert_eq!(ex.inputs, vec![None]);
        assert_eq!(ex.targets, vec![3]);
    }

    #[test]
    fn test_forward_trace_shapes() {
        let params = Parameters::initialize(5, 3);
        let ex = TrainingExample::from_indices(&[0, 1], Some(2));
        let (loss, trace) = forward(&ex.inputs, &ex.targets, &params.zero_hidden(), &params);

        assert_eq!(trace.hidden.len(), 3);
        assert_eq!(trace.probs.len(), 3);
        assert_eq!(trace.hidden[0].shape, vec![5, 1]);
        assert_eq!(trace.probs[2].shape, vec![3, 1]);
        for y in &trace.probs {
            let total: f32 = y.data.iter().sum();
            assert!((total - 1.0).abs() < 1e-5);
        }

        // Near-uniform start: loss ≈ T·ln(V)
        let uniform = 3.0 * (3.0f32).ln();
        assert!((loss - uniform).abs() < 0.01, "loss {} vs {}", loss, uniform);
    }

    #[test]
    fn test_start_marker_is_zero_input() {
        let params = scaled_params(4, 3, 1.0);
        let h0 = params.zero_hidden();
        let (h, _) = step_forward(&params, &h0, None);
        // tanh(0 + 0 + b)
        for (i, v) in h.data.iter().enumerate() {
            assert!((v - (0.1 * i as f32).tanh()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let params = scaled_params(3, 4, 40.0);
        let ex = TrainingExample::from_indices(&[2, 0, 3], Some(1));
        let h0 = Tensor::column(vec![0.2, -0.1, 0.05]);

        let (_, trace) = forward(&ex.inputs, &ex.targets, &h0, &params);
        let (grads, _) = backward(&ex.targets, &params, trace);

        let loss_with = |p: &Parameters| forward(&ex.inputs, &ex.targets, &h0, p).0;
        let eps = 1e-2f32;

        let analytic = [&grads.dwax, &grads.dwaa, &grads.dwya, &grads.db, &grads.dby];
        for (which, analytic) in analytic.into_iter().enumerate() {
            for i in 0..analytic.data.len() {
                let mut plus = params.clone();
                tensor_mut(&mut plus, which).data[i] += eps;
                let mut minus = params.clone();
                tensor_mut(&mut minus, which).data[i] -= eps;

                let numeric = (loss_with(&plus) - loss_with(&minus)) / (2.0 * eps);
                let a = analytic.data[i];
                assert!(
                    (numeric - a).abs() < 1e-2 + 0.05 * a.abs(),
                    "element {}: numeric {} vs analytic {}",
                    i,
                    numeric,
                    a
                );
            }
        }
    }

    #[test]
    fn test_backward_returns_last_hidden() {
        let params = scaled_params(3, 3, 10.0);
        let ex = TrainingExample::from_indices(&[1, 2], None);
        let (_, trace) = forward(&ex.inputs, &ex.targets, &params.zero_hidden(), &params);
        let expected = trace.hidden[2].clone();
        let (_, last) = backward(&ex.targets, &params, trace);
        assert_eq!(last, expected);
    }

    #[test]
    fn test_example_without_end_token_targets_zero() {
        let ex = TrainingExample::from_indices(&[4, 5], None);
        assert_eq!(ex.targets, vec![4, 5, 0]);
        assert_eq!(ex.len(), 3);
    }
}
