//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Performs the basic gradient descent update:
//! `parameter = parameter - learning_rate * gradient`

use crate::optimizers::Optimizer;

/// Default step size used when no training configuration is supplied.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Gradient descent with a fixed learning rate:
///
/// `w = w - η * ∇L/∂w`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    /// Creates a new SGD optimizer with the specified learning rate.
    ///
    /// # Examples
    ///
    /// ```
    /// use neural_layers::optimizers::{Optimizer, SGD};
    ///
    /// let optimizer = SGD::new(0.01);
    /// assert_eq!(optimizer.learning_rate(), 0.01);
    /// ```
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Default for SGD {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE)
    }
}

impl Optimizer for SGD {
    /// Applies `parameter[i] -= learning_rate * gradient[i]`.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_update() {
        let mut optimizer = SGD::new(0.1);
        let mut params = vec![1.0, 2.0, 3.0];
        let grads = vec![0.1, 0.2, 0.3];

        optimizer.update(&mut params, &grads);

        assert!((params[0] - 0.99).abs() < 1e-6);
        assert!((params[1] - 1.98).abs() < 1e-6);
        assert!((params[2] - 2.97).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_default_learning_rate() {
        assert_eq!(SGD::default().learning_rate(), DEFAULT_LEARNING_RATE);
    }

    #[test]
    fn test_sgd_learning_rate_update() {
        let mut optimizer = SGD::new(0.1);
        optimizer.set_learning_rate(0.01);

        let mut params = vec![1.0];
        optimizer.update(&mut params, &[1.0]);
        assert!((params[0] - 0.99).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "Parameters and gradients must have the same length")]
    fn test_sgd_mismatched_lengths() {
        let mut optimizer = SGD::new(0.01);
        let mut params = vec![1.0, 2.0];
        optimizer.update(&mut params, &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_sgd_zero_gradient_leaves_parameters_bit_identical() {
        let mut optimizer = SGD::new(0.3);
        let mut params = vec![0.1f32, -7.25, 1e-20];
        let original = params.clone();
        optimizer.update(&mut params, &[0.0, 0.0, 0.0]);
        assert_eq!(params, original);
    }
}
