//! Image classifier
//!
//! Two convolutions followed by a softmax output layer:
//! conv(3×3, 1→8, stride 1, relu) → conv(3×3, 8→16, stride 2, relu) →
//! fully connected(→ num_classes, softmax).

use crate::config::{TrainingConfig, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::error::{EngineError, Result};
use crate::layers::{ConvolutionalLayer, FullyConnectedLayer};
use crate::loss::cross_entropy;
use crate::network::Network;
use crate::tensor::Tensor;
use crate::utils::{Activation, SimpleRng};
use log::debug;

pub const DEFAULT_NUM_CLASSES: usize = 10;

/// Top class of a prediction together with its probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: usize,
    pub confidence: f32,
}

/// Single-channel image classifier.
#[derive(Debug)]
pub struct ImageClassifier {
    network: Network,
    height: usize,
    width: usize,
    num_classes: usize,
    confidence_threshold: f32,
}

impl ImageClassifier {
    /// Build the classifier for (height × width) grayscale images.
    ///
    /// Images must be at least 5×5 so both convolutions have room to slide.
    pub fn new(
        height: usize,
        width: usize,
        num_classes: usize,
        rng: &mut SimpleRng,
        learning_rate: f32,
    ) -> Result<Self> {
        if num_classes == 0 {
            return Err(EngineError::config("num_classes must be greater than 0"));
        }
        let first = ConvolutionalLayer::new(3, 1, 8, 1, Activation::Relu, rng)?
            .with_input_geometry(height, width)?;
        let (h1, w1) = first.output_dims(height, width)?;
        let second = ConvolutionalLayer::new(3, 8, 16, 2, Activation::Relu, rng)?
            .with_input_geometry(h1, w1)?;
        let (h2, w2) = second.output_dims(h1, w1)?;
        let output = FullyConnectedLayer::new(h2 * w2 * 16, num_classes, Activation::Softmax, rng)?;

        let mut network = Network::new(learning_rate);
        network.push(first)?;
        network.push(second)?;
        network.push(output)?;
        debug!(
            "ImageClassifier: {}x{} input, {} classes, {} parameters",
            height,
            width,
            num_classes,
            network.parameter_count()
        );

        Ok(Self {
            network,
            height,
            width,
            num_classes,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        })
    }

    /// Build with the seed, learning rate and threshold from a training
    /// configuration.
    pub fn from_config(
        height: usize,
        width: usize,
        num_classes: usize,
        config: &TrainingConfig,
    ) -> Result<Self> {
        let mut rng = SimpleRng::new(config.seed);
        Self::new(height, width, num_classes, &mut rng, config.learning_rate)?
            .with_confidence_threshold(config.confidence_threshold)
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(EngineError::config(format!(
                "confidence_threshold must be in range [0.0, 1.0], got {}",
                threshold
            )));
        }
        self.confidence_threshold = threshold;
        Ok(self)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn input_dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Class probabilities for one image.
    pub fn predict(&self, image: &Tensor) -> Result<Tensor> {
        self.network.infer(image)
    }

    /// Most likely class, or `None` when its probability is below the
    /// confidence threshold.
    pub fn classify(&self, image: &Tensor) -> Result<Option<Classification>> {
        Ok(self.pick(&self.predict(image)?))
    }

    /// [`classify`](Self::classify) over many images in parallel.
    pub fn classify_batch(&self, images: &[Tensor]) -> Result<Vec<Option<Classification>>> {
        let probabilities = self.network.predict_batch(images)?;
        Ok(probabilities.iter().map(|p| self.pick(p)).collect())
    }

    fn pick(&self, probabilities: &Tensor) -> Option<Classification> {
        let label = probabilities.argmax();
        let confidence = probabilities.data()[label];
        (confidence >= self.confidence_threshold).then_some(Classification { label, confidence })
    }

    /// One SGD step on a labelled image. Returns the cross-entropy loss
    /// measured before the update.
    pub fn train_step(&mut self, image: &Tensor, label: usize) -> Result<f32> {
        if label >= self.num_classes {
            return Err(EngineError::Index {
                index: label as i64,
                bound: self.num_classes,
                operation: "classifier label".to_string(),
            });
        }
        let probabilities = self.network.forward(image)?;
        let (loss, grad) = cross_entropy(&probabilities, label)?;
        self.network.backward(&grad)?;
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_is_distribution() {
        let mut rng = SimpleRng::new(42);
        let classifier = ImageClassifier::new(8, 8, 4, &mut rng, 0.01).unwrap();
        let probabilities = classifier.predict(&Tensor::zeros(&[8, 8])).unwrap();
        assert_eq!(probabilities.len(), 4);
        assert!((probabilities.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_too_small_image_is_config_error() {
        let mut rng = SimpleRng::new(42);
        assert!(matches!(
            ImageClassifier::new(4, 4, 2, &mut rng, 0.01),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_threshold_one_rejects_uncertain_prediction() {
        let mut rng = SimpleRng::new(42);
        let classifier = ImageClassifier::new(6, 6, 3, &mut rng, 0.01)
            .unwrap()
            .with_confidence_threshold(1.0)
            .unwrap();
        assert_eq!(classifier.classify(&Tensor::zeros(&[6, 6, 1])).unwrap(), None);
    }
}
