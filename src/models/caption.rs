//! Caption generator
//!
//! embedding(vocab → embed) → recurrent(features + embed → hidden, tanh) →
//! fully connected(hidden → vocab, softmax).
//!
//! At every timestep the image feature vector is concatenated in front of the
//! current token's embedding. Decoding is greedy, starting from
//! [`START_TOKEN`] and stopping at [`END_TOKEN`] or the length limit.

use crate::config::TrainingConfig;
use crate::error::{EngineError, Result};
use crate::layers::{ActivationCache, EmbeddingLayer, FullyConnectedLayer, Layer, RecurrentLayer};
use crate::loss::cross_entropy;
use crate::optimizers::SGD;
use crate::tensor::Tensor;
use crate::utils::{Activation, SimpleRng};
use log::{debug, trace};
use std::iter;

pub const END_TOKEN: usize = 0;
pub const START_TOKEN: usize = 1;

pub const DEFAULT_VOCAB_SIZE: usize = 1000;
pub const DEFAULT_EMBED_SIZE: usize = 128;
pub const DEFAULT_HIDDEN_SIZE: usize = 256;

/// Recurrent caption model conditioned on an image feature vector.
///
/// # Example
///
/// ```
/// use neural_layers::models::CaptionGenerator;
/// use neural_layers::utils::SimpleRng;
/// use neural_layers::Tensor;
///
/// let mut rng = SimpleRng::new(42);
/// let mut model = CaptionGenerator::new(12, 6, 4, 16, &mut rng, 0.1).unwrap();
/// let features = Tensor::from_vec(vec![0.5; 4]);
///
/// let loss = model.train_sequence(&features, &[5, 7, 3]).unwrap();
/// assert!(loss > 0.0);
/// assert!(model.generate(&features, 10).unwrap().len() <= 10);
/// ```
#[derive(Debug, Clone)]
pub struct CaptionGenerator {
    embedding: EmbeddingLayer,
    recurrent: RecurrentLayer,
    output: FullyConnectedLayer,
    optimizer: SGD,
    feature_size: usize,
}

impl CaptionGenerator {
    pub fn new(
        vocab_size: usize,
        embed_size: usize,
        feature_size: usize,
        hidden_size: usize,
        rng: &mut SimpleRng,
        learning_rate: f32,
    ) -> Result<Self> {
        if vocab_size <= START_TOKEN.max(END_TOKEN) {
            return Err(EngineError::config(format!(
                "vocabulary of {} tokens cannot hold the start and end tokens",
                vocab_size
            )));
        }
        let embedding = EmbeddingLayer::new(vocab_size, embed_size, rng)?;
        let recurrent = RecurrentLayer::new(feature_size + embed_size, hidden_size, rng)?;
        let output = FullyConnectedLayer::new(hidden_size, vocab_size, Activation::Softmax, rng)?;
        debug!(
            "CaptionGenerator: vocab {}, embed {}, features {}, hidden {}",
            vocab_size, embed_size, feature_size, hidden_size
        );

        Ok(Self {
            embedding,
            recurrent,
            output,
            optimizer: SGD::new(learning_rate),
            feature_size,
        })
    }

    /// Default-sized model with the seed and learning rate of `config`.
    pub fn from_config(feature_size: usize, config: &TrainingConfig) -> Result<Self> {
        let mut rng = SimpleRng::new(config.seed);
        Self::new(
            DEFAULT_VOCAB_SIZE,
            DEFAULT_EMBED_SIZE,
            feature_size,
            DEFAULT_HIDDEN_SIZE,
            &mut rng,
            config.learning_rate,
        )
    }

    pub fn vocab_size(&self) -> usize {
        self.embedding.vocab_size()
    }

    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    pub fn embedding(&self) -> &EmbeddingLayer {
        &self.embedding
    }

    pub fn recurrent(&self) -> &RecurrentLayer {
        &self.recurrent
    }

    pub fn output(&self) -> &FullyConnectedLayer {
        &self.output
    }

    fn step_input(&self, features: &Tensor, token: usize) -> Result<Tensor> {
        let embed = self.embedding.lookup(token)?;
        Ok(Tensor::concat(&[features, &embed]))
    }

    fn check_features(&self, features: &Tensor) -> Result<Tensor> {
        if features.len() != self.feature_size {
            return Err(EngineError::shape(
                &[self.feature_size],
                features.shape(),
                "caption image features",
            ));
        }
        Ok(features.flatten())
    }

    /// Greedy decode of at most `max_length` tokens. The end token is not
    /// included in the result.
    pub fn generate(&self, features: &Tensor, max_length: usize) -> Result<Vec<usize>> {
        let features = self.check_features(features)?;
        let mut caption = Vec::new();
        let mut token = START_TOKEN;
        let mut hidden = self.recurrent.initial_hidden();

        while caption.len() < max_length {
            let step = self.recurrent.step(&self.step_input(&features, token)?, &hidden)?;
            let probabilities = self.output.infer(&step.hidden)?;
            token = probabilities.argmax();
            if token == END_TOKEN {
                break;
            }
            caption.push(token);
            hidden = step.hidden;
        }
        trace!("CaptionGenerator: generated {} tokens", caption.len());
        Ok(caption)
    }

    /// Greedy decode limited by `max_caption_length` from `config`.
    pub fn generate_with_config(&self, features: &Tensor, config: &TrainingConfig) -> Result<Vec<usize>> {
        self.generate(features, config.max_caption_length)
    }

    /// Teacher-forced training on one caption, given without start or end
    /// tokens.
    ///
    /// The model reads `START, t₁ … tₙ` and is trained to emit
    /// `t₁ … tₙ, END`. Gradients from every timestep are accumulated through
    /// time and applied in one update. Returns the mean cross-entropy per
    /// timestep, measured before the update.
    pub fn train_sequence(&mut self, features: &Tensor, caption: &[usize]) -> Result<f32> {
        let features = self.check_features(features)?;
        match self.accumulate_sequence(&features, caption) {
            Ok(loss) => {
                self.embedding.apply_gradients(&mut self.optimizer);
                self.recurrent.apply_gradients(&mut self.optimizer);
                self.output.apply_gradients(&mut self.optimizer);
                Ok(loss)
            }
            Err(err) => {
                self.embedding.zero_gradients();
                self.recurrent.zero_gradients();
                self.output.zero_gradients();
                Err(err)
            }
        }
    }

    fn accumulate_sequence(&mut self, features: &Tensor, caption: &[usize]) -> Result<f32> {
        let inputs: Vec<usize> = iter::once(START_TOKEN).chain(caption.iter().copied()).collect();
        let targets: Vec<usize> = caption.iter().copied().chain(iter::once(END_TOKEN)).collect();
        if let Some(&bad) = targets.iter().find(|&&t| t >= self.vocab_size()) {
            return Err(EngineError::Index {
                index: bad as i64,
                bound: self.vocab_size(),
                operation: "caption token".to_string(),
            });
        }

        let step_inputs = inputs
            .iter()
            .map(|&token| self.step_input(features, token))
            .collect::<Result<Vec<_>>>()?;
        let steps = self
            .recurrent
            .forward_sequence(&step_inputs, &self.recurrent.initial_hidden())?;
        let traces = steps
            .iter()
            .map(|step| self.output.forward_traced(&step.hidden))
            .collect::<Result<Vec<ActivationCache>>>()?;

        let mut total_loss = 0.0;
        let mut hidden_grads = Vec::with_capacity(steps.len());
        for (trace, &target) in traces.iter().zip(targets.iter()) {
            let (loss, grad) = cross_entropy(&trace.output, target)?;
            total_loss += loss;
            hidden_grads.push(self.output.backward_traced(trace, &grad)?);
        }

        let grads = self.recurrent.backward_sequence(&steps, &hidden_grads)?;
        for (&token, grad) in inputs.iter().zip(grads.inputs.iter()) {
            let embed_grad = Tensor::from_vec(grad.data()[self.feature_size..].to_vec());
            self.embedding.accumulate(token, &embed_grad)?;
        }

        Ok(total_loss / targets.len() as f32)
    }
}
