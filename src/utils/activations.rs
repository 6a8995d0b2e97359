//! Activation functions for neural network layers
//!
//! Activations form a closed set selected at construction time. Parsing a name
//! that is not in the set is a configuration error. Elementwise kinds are
//! dispatched through a lookup table of (forward, derivative) function pairs;
//! softmax is vector-wide and handled on its own.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Guard added to denominators that may underflow.
pub const EPSILON: f32 = 1e-8;

/// Elementwise forward function.
type ForwardFn = fn(f32) -> f32;

/// Elementwise derivative given (input, output) of the forward function.
type DerivativeFn = fn(f32, f32) -> f32;

/// Named nonlinearity applied after an affine or convolutional transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

const NAMES: [(&str, Activation); 6] = [
    ("identity", Activation::Identity),
    ("linear", Activation::Identity),
    ("relu", Activation::Relu),
    ("sigmoid", Activation::Sigmoid),
    ("tanh", Activation::Tanh),
    ("softmax", Activation::Softmax),
];

const ELEMENTWISE: [(Activation, ForwardFn, DerivativeFn); 4] = [
    (Activation::Identity, |x| x, |_, _| 1.0),
    (Activation::Relu, relu, |x, _| if x > 0.0 { 1.0 } else { 0.0 }),
    (Activation::Sigmoid, sigmoid, |_, y| y * (1.0 - y)),
    (Activation::Tanh, f32::tanh, |_, y| 1.0 - y * y),
];

impl Activation {
    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Activation::Identity => "identity",
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Softmax => "softmax",
        }
    }

    fn elementwise(self) -> Option<(ForwardFn, DerivativeFn)> {
        ELEMENTWISE
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|&(_, forward, derivative)| (forward, derivative))
    }

    /// Apply the activation in place. Softmax treats the whole slice as one
    /// vector.
    pub fn apply(self, values: &mut [f32]) {
        match self.elementwise() {
            Some((forward, _)) => values.iter_mut().for_each(|v| *v = forward(*v)),
            None => softmax_in_place(values),
        }
    }

    /// Gradient with respect to the pre-activation values.
    ///
    /// * `input` - pre-activation values seen by `apply`
    /// * `output` - values produced by `apply`
    /// * `upstream` - gradient of the loss with respect to `output`
    ///
    /// For softmax the full Jacobian reduces to `y ⊙ (g − (g·y))`, i.e.
    /// `(diag(y) − y·yᵗ)·g`.
    pub fn backward(self, input: &[f32], output: &[f32], upstream: &[f32]) -> Vec<f32> {
        match self.elementwise() {
            Some((_, derivative)) => input
                .iter()
                .zip(output.iter())
                .zip(upstream.iter())
                .map(|((&x, &y), &g)| g * derivative(x, y))
                .collect(),
            None => {
                let weighted: f32 = output.iter().zip(upstream.iter()).map(|(&y, &g)| y * g).sum();
                output
                    .iter()
                    .zip(upstream.iter())
                    .map(|(&y, &g)| y * (g - weighted))
                    .collect()
            }
        }
    }
}

impl FromStr for Activation {
    type Err = EngineError;

    fn from_str(name: &str) -> Result<Self> {
        let lowered = name.trim().to_lowercase();
        NAMES
            .iter()
            .find(|(candidate, _)| *candidate == lowered)
            .map(|&(_, kind)| kind)
            .ok_or_else(|| {
                EngineError::config(format!(
                    "Unknown activation '{}'. Must be one of: identity, relu, sigmoid, tanh, softmax",
                    name
                ))
            })
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ReLU: max(x, 0).
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Sigmoid: 1 / (1 + e^-x), evaluated in the branch that cannot overflow.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp() + EPSILON)
    } else {
        let e = x.exp();
        e / (1.0 + e + EPSILON)
    }
}

/// Softmax over a whole slice, in place.
///
/// Uses the max-subtraction trick for numerical stability and an epsilon guard
/// on the denominator.
pub fn softmax_in_place(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max_value = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for value in values.iter_mut() {
        *value = (*value - max_value).exp();
        sum += *value;
    }

    let inv_sum = 1.0f32 / (sum + EPSILON);
    for value in values.iter_mut() {
        *value *= inv_sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_parse_known_names() {
        assert_eq!("relu".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("Softmax".parse::<Activation>().unwrap(), Activation::Softmax);
        assert_eq!("linear".parse::<Activation>().unwrap(), Activation::Identity);
    }

    #[test]
    fn test_parse_unknown_name_is_config_error() {
        let err = "swish".parse::<Activation>().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_sigmoid_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < EPSILON_F32);
    }

    #[test]
    fn test_sigmoid_extremes_are_finite() {
        assert!(sigmoid(-100.0) >= 0.0);
        assert!(sigmoid(100.0) <= 1.0);
        assert!(!sigmoid(-1000.0).is_nan());
    }

    #[test]
    fn test_relu_mixed() {
        let mut data = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        Activation::Relu.apply(&mut data);
        assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_softmax_uniform_input() {
        let mut data = vec![1.0, 1.0, 1.0];
        Activation::Softmax.apply(&mut data);
        for &val in &data {
            assert!((val - 1.0 / 3.0).abs() < EPSILON_F32);
        }
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut data = vec![1000.0, 1001.0, 1002.0];
        softmax_in_place(&mut data);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
        assert!(!data.iter().any(|&x| x.is_nan() || x.is_infinite()));
    }

    #[test]
    fn test_tanh_backward_uses_output() {
        let input = [0.5f32];
        let output = [0.5f32.tanh()];
        let grad = Activation::Tanh.backward(&input, &output, &[2.0]);
        assert!((grad[0] - 2.0 * (1.0 - output[0] * output[0])).abs() < EPSILON_F32);
    }

    #[test]
    fn test_softmax_backward_sums_to_zero() {
        let input = [0.1f32, -0.4, 1.3];
        let mut output = input.to_vec();
        softmax_in_place(&mut output);
        let grad = Activation::Softmax.backward(&input, &output, &[0.3, -1.0, 0.7]);
        // Rows of the softmax Jacobian sum to zero.
        let total: f32 = grad.iter().sum();
        assert!(total.abs() < EPSILON_F32);
    }
}
