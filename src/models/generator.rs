//! Image generator
//!
//! Maps a noise vector to an (height × width × channels) image:
//! fully connected(noise → hidden, tanh) → fully connected(hidden → H·W·C,
//! sigmoid). Intensities therefore lie in (0, 1).

use crate::config::TrainingConfig;
use crate::error::{EngineError, Result};
use crate::layers::FullyConnectedLayer;
use crate::loss::mean_squared_error;
use crate::network::Network;
use crate::tensor::Tensor;
use crate::utils::{Activation, SimpleRng};
use log::debug;

pub const DEFAULT_NOISE_SIZE: usize = 100;
pub const DEFAULT_HIDDEN_SIZE: usize = 256;
pub const DEFAULT_IMAGE_DIMS: (usize, usize, usize) = (64, 64, 3);
pub const DEFAULT_GENERATOR_LEARNING_RATE: f32 = 0.0002;

/// Noise-to-image generator.
#[derive(Debug)]
pub struct ImageGenerator {
    network: Network,
    noise_size: usize,
    image_dims: (usize, usize, usize),
}

impl ImageGenerator {
    /// Build a generator producing images of `image_dims` = (height, width,
    /// channels).
    pub fn new(
        noise_size: usize,
        hidden_size: usize,
        image_dims: (usize, usize, usize),
        rng: &mut SimpleRng,
        learning_rate: f32,
    ) -> Result<Self> {
        let (height, width, channels) = image_dims;
        let mut network = Network::new(learning_rate);
        network.push(FullyConnectedLayer::new(noise_size, hidden_size, Activation::Tanh, rng)?)?;
        network.push(FullyConnectedLayer::new(
            hidden_size,
            height * width * channels,
            Activation::Sigmoid,
            rng,
        )?)?;
        debug!(
            "ImageGenerator: noise {} -> {}x{}x{} ({} parameters)",
            noise_size,
            height,
            width,
            channels,
            network.parameter_count()
        );
        Ok(Self {
            network,
            noise_size,
            image_dims,
        })
    }

    /// Default-sized generator seeded from `config`. The learning rate comes
    /// from the configuration as well.
    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        let mut rng = SimpleRng::new(config.seed);
        Self::new(
            DEFAULT_NOISE_SIZE,
            DEFAULT_HIDDEN_SIZE,
            DEFAULT_IMAGE_DIMS,
            &mut rng,
            config.learning_rate,
        )
    }

    pub fn noise_size(&self) -> usize {
        self.noise_size
    }

    pub fn image_dims(&self) -> (usize, usize, usize) {
        self.image_dims
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Noise vector with entries uniform in [-1, 1).
    pub fn sample_noise(&self, rng: &mut SimpleRng) -> Tensor {
        Tensor::random_uniform(&[self.noise_size], -1.0, 1.0, rng)
    }

    fn image_shape(&self) -> [usize; 3] {
        let (h, w, c) = self.image_dims;
        [h, w, c]
    }

    /// Image for one noise vector, shaped (height, width, channels).
    pub fn generate(&self, noise: &Tensor) -> Result<Tensor> {
        self.network.infer(noise)?.reshape(&self.image_shape())
    }

    /// [`generate`](Self::generate) over many noise vectors in parallel.
    pub fn generate_batch(&self, noise: &[Tensor]) -> Result<Vec<Tensor>> {
        self.network
            .predict_batch(noise)?
            .iter()
            .map(|flat| flat.reshape(&self.image_shape()))
            .collect()
    }

    /// One SGD step pulling the image for `noise` towards `target`. Returns
    /// the squared-error loss measured before the update.
    pub fn train_step(&mut self, noise: &Tensor, target: &Tensor) -> Result<f32> {
        let shape = self.image_shape();
        if target.len() != shape.iter().product::<usize>() {
            return Err(EngineError::shape(&shape, target.shape(), "generator target"));
        }
        let output = self.network.forward(noise)?;
        let (loss, grad) = mean_squared_error(&output, target)?;
        self.network.backward(&grad)?;
        Ok(loss)
    }
}
