//! Fully connected layer implementation
//!
//! Performs `output = activation(weightsᵗ · input + biases)` where the weight
//! matrix is stored row-major as (input_size × output_size).

use crate::error::{EngineError, Result};
use crate::layers::{ActivationCache, Layer, LayerKind, Param};
use crate::tensor::Tensor;
use crate::utils::{Activation, SimpleRng};
use log::debug;

/// Fully connected layer with weights, biases and an activation.
///
/// # Example
///
/// ```
/// use neural_layers::layers::{FullyConnectedLayer, Layer};
/// use neural_layers::utils::Activation;
/// use neural_layers::Tensor;
///
/// let weights = Tensor::new(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap();
/// let biases = Tensor::from_vec(vec![0.0, 0.0]);
/// let layer = FullyConnectedLayer::from_parameters(weights, biases, Activation::Softmax).unwrap();
///
/// let output = layer.infer(&Tensor::from_vec(vec![1.0, 1.0])).unwrap();
/// assert!((output.data()[0] - 0.5).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct FullyConnectedLayer {
    input_size: usize,
    output_size: usize,
    activation: Activation,
    weights: Param,
    biases: Param,
    cache: Option<ActivationCache>,
}

impl FullyConnectedLayer {
    /// Create a layer with Xavier-uniform weights and zero biases.
    ///
    /// Weights are sampled from [-limit, limit) where
    /// limit = sqrt(6 / (input_size + output_size)).
    ///
    /// # Arguments
    ///
    /// * `input_size` - Number of input features
    /// * `output_size` - Number of output features
    /// * `activation` - Nonlinearity applied after the affine transform
    /// * `rng` - Random number generator for weight initialization
    ///
    /// # Returns
    ///
    /// The new layer, or a configuration error when either size is zero
    ///
    /// # Example
    ///
    /// ```
    /// use neural_layers::layers::{FullyConnectedLayer, Layer};
    /// use neural_layers::utils::{Activation, SimpleRng};
    ///
    /// let mut rng = SimpleRng::new(42);
    /// let layer = FullyConnectedLayer::new(128, 64, Activation::Relu, &mut rng).unwrap();
    /// assert_eq!(layer.parameter_count(), 128 * 64 + 64);
    /// ```
    pub fn new(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(EngineError::config(format!(
                "fully connected layer sizes must be positive, got {} -> {}",
                input_size, output_size
            )));
        }
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights = Tensor::random_uniform(&[input_size, output_size], -limit, limit, rng);
        debug!(
            "FullyConnectedLayer: {} -> {} ({})",
            input_size, output_size, activation
        );
        Self::from_parameters(weights, Tensor::zeros(&[output_size]), activation)
    }

    /// Build a layer from explicit parameters.
    ///
    /// `weights` must be (input_size × output_size) and `biases` must hold
    /// output_size elements.
    pub fn from_parameters(weights: Tensor, biases: Tensor, activation: Activation) -> Result<Self> {
        let (input_size, output_size) = match weights.shape() {
            &[rows, cols] => (rows, cols),
            other => return Err(EngineError::shape(&[0, 0], other, "fully connected weights")),
        };
        if biases.len() != output_size {
            return Err(EngineError::shape(&[output_size], biases.shape(), "fully connected biases"));
        }
        let biases = biases.reshape(&[output_size])?;
        Ok(Self {
            input_size,
            output_size,
            activation,
            weights: Param::new(weights),
            biases: Param::new(biases),
            cache: None,
        })
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn weights(&self) -> &Tensor {
        self.weights.value()
    }

    pub fn biases(&self) -> &Tensor {
        self.biases.value()
    }

    pub fn weight_gradients(&self) -> &Tensor {
        self.weights.grad()
    }

    pub fn bias_gradients(&self) -> &Tensor {
        self.biases.grad()
    }

    /// Forward pass returning everything a later backward needs, without
    /// storing it. Used by callers that run one layer over many timesteps.
    pub fn forward_traced(&self, input: &Tensor) -> Result<ActivationCache> {
        if input.len() != self.input_size {
            return Err(EngineError::shape(
                &[self.input_size],
                input.shape(),
                "fully connected forward",
            ));
        }
        let pre_activation = self
            .weights
            .value()
            .transpose_matvec(input)?
            .add(self.biases.value())?;
        let mut output = pre_activation.clone();
        self.activation.apply(output.data_mut());

        Ok(ActivationCache {
            input: input.clone(),
            pre_activation,
            output,
        })
    }

    /// Backward pass against an explicit trace from [`forward_traced`].
    ///
    /// [`forward_traced`]: FullyConnectedLayer::forward_traced
    pub fn backward_traced(&mut self, trace: &ActivationCache, grad_output: &Tensor) -> Result<Tensor> {
        if grad_output.len() != self.output_size {
            return Err(EngineError::shape(
                &[self.output_size],
                grad_output.shape(),
                "fully connected backward",
            ));
        }
        let local = Tensor::from_vec(self.activation.backward(
            trace.pre_activation.data(),
            trace.output.data(),
            grad_output.data(),
        ));

        // Input gradient uses the weights as they were during forward.
        let grad_input = self.weights.value().matvec(&local)?;

        self.weights.accumulate(&trace.input.outer(&local))?;
        self.biases.accumulate(&local)?;

        grad_input.reshape(trace.input.shape())
    }
}

impl Layer for FullyConnectedLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::FullyConnected
    }

    fn input_size(&self) -> Option<usize> {
        Some(self.input_size)
    }

    fn output_size(&self) -> Option<usize> {
        Some(self.output_size)
    }

    fn infer(&self, input: &Tensor) -> Result<Tensor> {
        Ok(self.forward_traced(input)?.output)
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let trace = self.forward_traced(input)?;
        let output = trace.output.clone();
        self.cache = Some(trace);
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let trace = self.cache.take().ok_or(EngineError::MissingCache {
            layer: "fully connected",
        })?;
        self.backward_traced(&trace, grad_output)
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.weights, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights, &mut self.biases]
    }
}
