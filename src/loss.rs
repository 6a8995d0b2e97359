//! Loss functions producing the gradient that seeds a backward pass.
//!
//! Losses are computed by the caller, outside the network; these helpers cover
//! the two used by the bundled models.

use crate::error::{EngineError, Result};
use crate::tensor::Tensor;
use crate::utils::activations::EPSILON;

/// Negative log-likelihood of `target` under a probability vector.
///
/// Returns the loss and its gradient with respect to the probabilities:
/// `-1 / p_target` at the target index, zero elsewhere. Fed through a softmax
/// layer's backward pass this becomes the familiar `p - onehot(target)`.
///
/// # Example
///
/// ```
/// use neural_layers::loss::cross_entropy;
/// use neural_layers::Tensor;
///
/// let (loss, grad) = cross_entropy(&Tensor::from_vec(vec![0.9, 0.1]), 0).unwrap();
/// assert!((loss + 0.9f32.ln()).abs() < 1e-6);
/// assert_eq!(grad.data()[1], 0.0);
/// ```
pub fn cross_entropy(probabilities: &Tensor, target: usize) -> Result<(f32, Tensor)> {
    if target >= probabilities.len() {
        return Err(EngineError::Index {
            index: target as i64,
            bound: probabilities.len(),
            operation: "cross entropy target".to_string(),
        });
    }
    let prob = probabilities.data()[target] + EPSILON;
    let mut grad = Tensor::zeros(probabilities.shape());
    grad.data_mut()[target] = -1.0 / prob;
    Ok((-prob.ln(), grad))
}

/// Half sum of squared errors, `½ Σ (o − t)²`, and its gradient `o − t`.
pub fn mean_squared_error(output: &Tensor, target: &Tensor) -> Result<(f32, Tensor)> {
    if output.len() != target.len() {
        return Err(EngineError::shape(output.shape(), target.shape(), "mean squared error"));
    }
    let diff = output.flatten().sub(&target.flatten())?.reshape(output.shape())?;
    let loss = 0.5 * diff.data().iter().map(|d| d * d).sum::<f32>();
    Ok((loss, diff))
}
