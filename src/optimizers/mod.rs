//! Optimizer abstractions for layer parameter updates
//!
//! Layers accumulate gradients during backward; an optimizer turns the
//! accumulated gradients into an in-place parameter update. The engine uses
//! plain gradient descent with a fixed learning rate.

pub mod sgd;

pub use sgd::SGD;

/// Core trait for parameter update rules.
///
/// # Example
///
/// ```
/// use neural_layers::optimizers::{Optimizer, SGD};
///
/// let mut optimizer = SGD::new(0.5);
/// let mut weights = vec![1.0, 2.0];
/// optimizer.update(&mut weights, &[1.0, -2.0]);
/// assert_eq!(weights, vec![0.5, 3.0]);
/// ```
pub trait Optimizer: Send {
    /// Update `parameters` in place from `gradients`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if parameters and gradients have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Get the learning rate for this optimizer.
    fn learning_rate(&self) -> f32;

    /// Set the learning rate for this optimizer.
    fn set_learning_rate(&mut self, lr: f32);
}
