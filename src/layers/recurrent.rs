//! Recurrent layer implementation
//!
//! A single tanh recurrent cell whose weights are shared across timesteps:
//!
//! `h_t = tanh(W_xᵗ · x_t + W_hᵗ · h_{t-1} + b)`
//!
//! The hidden state is not owned by the layer. Callers unroll a sequence with
//! [`RecurrentLayer::step`], keep the returned [`RecurrentStep`] records, and
//! feed them back in reverse order to [`RecurrentLayer::backward_step`] (or use
//! the `*_sequence` helpers). Gradients are summed over all timesteps and
//! applied once per sequence through [`Layer::apply_gradients`].

use crate::error::{EngineError, Result};
use crate::layers::{Layer, LayerKind, Param};
use crate::tensor::Tensor;
use crate::utils::{Activation, SimpleRng};
use log::{debug, trace};

/// State retained from one forward timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentStep {
    pub input: Tensor,
    pub previous_hidden: Tensor,
    pub hidden: Tensor,
}

/// Gradients produced by one backward timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct StepGradients {
    /// Gradient to propagate into that timestep's external input.
    pub input: Tensor,
    /// Gradient to propagate into the previous timestep's hidden state.
    pub previous_hidden: Tensor,
}

/// Gradients produced by backpropagation through a whole sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceGradients {
    /// Per-timestep input gradients, in timestep order.
    pub inputs: Vec<Tensor>,
    /// Gradient with respect to the initial hidden state.
    pub initial_hidden: Tensor,
}

/// Tanh recurrent cell with input-to-hidden and hidden-to-hidden weights.
#[derive(Debug, Clone)]
pub struct RecurrentLayer {
    input_size: usize,
    hidden_size: usize,
    sequence_length: usize,
    weights_x: Param,
    weights_h: Param,
    biases: Param,
    cache: Option<Vec<RecurrentStep>>,
}

impl RecurrentLayer {
    /// Create a cell with Xavier-uniform weights and zero biases.
    ///
    /// Input weights use limit = sqrt(6 / (input_size + hidden_size)) and
    /// hidden weights limit = sqrt(6 / (2 · hidden_size)).
    ///
    /// # Arguments
    ///
    /// * `input_size` - Features per timestep
    /// * `hidden_size` - Length of the hidden state
    /// * `rng` - Random number generator for weight initialization
    ///
    /// # Returns
    ///
    /// A cell consuming one timestep per [`Layer`] call, or a configuration
    /// error when either size is zero
    ///
    /// # Example
    ///
    /// ```
    /// use neural_layers::layers::RecurrentLayer;
    /// use neural_layers::utils::SimpleRng;
    /// use neural_layers::Tensor;
    ///
    /// let mut rng = SimpleRng::new(42);
    /// let cell = RecurrentLayer::new(3, 4, &mut rng).unwrap();
    /// let step = cell.step(&Tensor::zeros(&[3]), &cell.initial_hidden()).unwrap();
    /// assert_eq!(step.hidden.len(), 4);
    /// ```
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut SimpleRng) -> Result<Self> {
        if input_size == 0 || hidden_size == 0 {
            return Err(EngineError::config(format!(
                "recurrent layer sizes must be positive, got {} -> {}",
                input_size, hidden_size
            )));
        }
        let limit_x = (6.0f32 / (input_size + hidden_size) as f32).sqrt();
        let limit_h = (6.0f32 / (2 * hidden_size) as f32).sqrt();
        let weights_x = Tensor::random_uniform(&[input_size, hidden_size], -limit_x, limit_x, rng);
        let weights_h = Tensor::random_uniform(&[hidden_size, hidden_size], -limit_h, limit_h, rng);
        debug!("RecurrentLayer: {} -> {} (tanh)", input_size, hidden_size);
        Self::from_parameters(weights_x, weights_h, Tensor::zeros(&[hidden_size]))
    }

    /// Build a cell from explicit (input × hidden), (hidden × hidden) and
    /// (hidden) parameters.
    pub fn from_parameters(weights_x: Tensor, weights_h: Tensor, biases: Tensor) -> Result<Self> {
        let (input_size, hidden_size) = match weights_x.shape() {
            &[rows, cols] => (rows, cols),
            other => return Err(EngineError::shape(&[0, 0], other, "recurrent input weights")),
        };
        if weights_h.shape() != [hidden_size, hidden_size].as_slice() {
            return Err(EngineError::shape(
                &[hidden_size, hidden_size],
                weights_h.shape(),
                "recurrent hidden weights",
            ));
        }
        if biases.len() != hidden_size {
            return Err(EngineError::shape(&[hidden_size], biases.shape(), "recurrent biases"));
        }
        let biases = biases.reshape(&[hidden_size])?;
        Ok(Self {
            input_size,
            hidden_size,
            sequence_length: 1,
            weights_x: Param::new(weights_x),
            weights_h: Param::new(weights_h),
            biases: Param::new(biases),
            cache: None,
        })
    }

    /// Number of timesteps consumed per call when used through [`Layer`].
    pub fn with_sequence_length(mut self, sequence_length: usize) -> Result<Self> {
        if sequence_length == 0 {
            return Err(EngineError::config("sequence_length must be greater than 0"));
        }
        self.sequence_length = sequence_length;
        Ok(self)
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Per-timestep input size (not multiplied by the sequence length).
    pub fn step_input_size(&self) -> usize {
        self.input_size
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn input_weights(&self) -> &Tensor {
        self.weights_x.value()
    }

    pub fn hidden_weights(&self) -> &Tensor {
        self.weights_h.value()
    }

    pub fn biases(&self) -> &Tensor {
        self.biases.value()
    }

    pub fn input_weight_gradients(&self) -> &Tensor {
        self.weights_x.grad()
    }

    pub fn hidden_weight_gradients(&self) -> &Tensor {
        self.weights_h.grad()
    }

    pub fn bias_gradients(&self) -> &Tensor {
        self.biases.grad()
    }

    /// Zero hidden state to start a sequence from.
    pub fn initial_hidden(&self) -> Tensor {
        Tensor::zeros(&[self.hidden_size])
    }

    /// Run one timestep.
    pub fn step(&self, input: &Tensor, previous_hidden: &Tensor) -> Result<RecurrentStep> {
        if input.len() != self.input_size {
            return Err(EngineError::shape(&[self.input_size], input.shape(), "recurrent input"));
        }
        if previous_hidden.len() != self.hidden_size {
            return Err(EngineError::shape(
                &[self.hidden_size],
                previous_hidden.shape(),
                "recurrent hidden state",
            ));
        }

        let mut hidden = self
            .weights_x
            .value()
            .transpose_matvec(input)?
            .add(&self.weights_h.value().transpose_matvec(previous_hidden)?)?
            .add(self.biases.value())?;
        Activation::Tanh.apply(hidden.data_mut());

        Ok(RecurrentStep {
            input: input.flatten(),
            previous_hidden: previous_hidden.flatten(),
            hidden,
        })
    }

    /// Backpropagate one timestep.
    ///
    /// `grad_hidden` is the total gradient reaching this step's hidden output:
    /// the contribution flowing back from the next timestep plus any
    /// contribution from an output layer at this timestep. Weight and bias
    /// gradients are accumulated, not applied.
    pub fn backward_step(&mut self, step: &RecurrentStep, grad_hidden: &Tensor) -> Result<StepGradients> {
        if grad_hidden.len() != self.hidden_size {
            return Err(EngineError::shape(
                &[self.hidden_size],
                grad_hidden.shape(),
                "recurrent backward",
            ));
        }
        // tanh' = 1 - h², taken from the step's output.
        let local = Tensor::from_vec(Activation::Tanh.backward(
            step.hidden.data(),
            step.hidden.data(),
            grad_hidden.data(),
        ));

        let input = self.weights_x.value().matvec(&local)?;
        let previous_hidden = self.weights_h.value().matvec(&local)?;

        self.weights_x.accumulate(&step.input.outer(&local))?;
        self.weights_h.accumulate(&step.previous_hidden.outer(&local))?;
        self.biases.accumulate(&local)?;

        Ok(StepGradients {
            input,
            previous_hidden,
        })
    }

    /// Unroll over `inputs`, starting from `initial_hidden`.
    pub fn forward_sequence(&self, inputs: &[Tensor], initial_hidden: &Tensor) -> Result<Vec<RecurrentStep>> {
        let mut steps: Vec<RecurrentStep> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let previous = steps.last().map(|s| &s.hidden).unwrap_or(initial_hidden);
            let step = self.step(input, previous)?;
            steps.push(step);
        }
        trace!("RecurrentLayer: unrolled {} timesteps", steps.len());
        Ok(steps)
    }

    /// Backpropagation through time over `steps`, in reverse timestep order.
    ///
    /// `output_grads[t]` is the gradient an output layer sends into the hidden
    /// state of timestep `t` (zeros when there is none).
    pub fn backward_sequence(
        &mut self,
        steps: &[RecurrentStep],
        output_grads: &[Tensor],
    ) -> Result<SequenceGradients> {
        if steps.len() != output_grads.len() {
            return Err(EngineError::shape(
                &[steps.len()],
                &[output_grads.len()],
                "recurrent sequence backward (timesteps)",
            ));
        }

        let mut carry = self.initial_hidden();
        let mut inputs = Vec::with_capacity(steps.len());
        for (step, output_grad) in steps.iter().zip(output_grads.iter()).rev() {
            let total = output_grad.flatten().add(&carry)?;
            let grads = self.backward_step(step, &total)?;
            carry = grads.previous_hidden;
            inputs.push(grads.input);
        }
        inputs.reverse();

        Ok(SequenceGradients {
            inputs,
            initial_hidden: carry,
        })
    }

    fn split_sequence(&self, flat: &Tensor, width: usize, operation: &str) -> Result<Vec<Tensor>> {
        if flat.len() != self.sequence_length * width {
            return Err(EngineError::shape(
                &[self.sequence_length * width],
                flat.shape(),
                operation,
            ));
        }
        Ok(flat
            .data()
            .chunks_exact(width)
            .map(|chunk| Tensor::from_vec(chunk.to_vec()))
            .collect())
    }

    fn join_hidden(steps: &[RecurrentStep]) -> Tensor {
        let parts: Vec<&Tensor> = steps.iter().map(|s| &s.hidden).collect();
        Tensor::concat(&parts)
    }
}

/// As a [`Layer`], the input is `sequence_length` timestep inputs concatenated,
/// the hidden state starts at zero, and the output is every timestep's hidden
/// state concatenated.
impl Layer for RecurrentLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Recurrent
    }

    fn input_size(&self) -> Option<usize> {
        Some(self.sequence_length * self.input_size)
    }

    fn output_size(&self) -> Option<usize> {
        Some(self.sequence_length * self.hidden_size)
    }

    fn infer(&self, input: &Tensor) -> Result<Tensor> {
        let inputs = self.split_sequence(input, self.input_size, "recurrent forward")?;
        let steps = self.forward_sequence(&inputs, &self.initial_hidden())?;
        Ok(Self::join_hidden(&steps))
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let inputs = self.split_sequence(input, self.input_size, "recurrent forward")?;
        let steps = self.forward_sequence(&inputs, &self.initial_hidden())?;
        let output = Self::join_hidden(&steps);
        self.cache = Some(steps);
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let steps = self
            .cache
            .take()
            .ok_or(EngineError::MissingCache { layer: "recurrent" })?;
        let output_grads = self.split_sequence(grad_output, self.hidden_size, "recurrent backward")?;
        let grads = self.backward_sequence(&steps, &output_grads)?;
        let parts: Vec<&Tensor> = grads.inputs.iter().collect();
        Ok(Tensor::concat(&parts))
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.weights_x, &self.weights_h, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weights_x, &mut self.weights_h, &mut self.biases]
    }
}
