//! Configuration structures for training
//!
//! Training hyperparameters are read from JSON. Every field is optional and
//! falls back to the engine defaults.

use crate::error::{EngineError, Result};
use crate::optimizers::sgd::DEFAULT_LEARNING_RATE;
use serde::{Deserialize, Serialize};
use std::fs;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_CAPTION_LENGTH: usize = 20;

/// Training configuration.
///
/// # Example
///
/// ```json
/// {
///   "learning_rate": 0.0002,
///   "seed": 7,
///   "confidence_threshold": 0.6,
///   "max_caption_length": 16
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fixed SGD learning rate
    pub learning_rate: f32,

    /// Seed for parameter initialisation and noise sampling
    pub seed: u64,

    /// Minimum probability for a classification to be reported
    pub confidence_threshold: f32,

    /// Upper bound on generated caption length, in tokens
    pub max_caption_length: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: DEFAULT_SEED,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_caption_length: DEFAULT_MAX_CAPTION_LENGTH,
        }
    }
}

/// Loads a training configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use neural_layers::config::load_config;
///
/// let cfg = load_config("config/training.json").unwrap();
/// assert!(cfg.learning_rate > 0.0);
/// ```
pub fn load_config(path: &str) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks ranges that serde cannot express.
pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    if !config.learning_rate.is_finite() || config.learning_rate <= 0.0 {
        return Err(EngineError::config(format!(
            "learning_rate must be positive and finite, got {}",
            config.learning_rate
        )));
    }

    if !(0.0..=1.0).contains(&config.confidence_threshold) {
        return Err(EngineError::config(format!(
            "confidence_threshold must be in range [0.0, 1.0], got {}",
            config.confidence_threshold
        )));
    }

    if config.max_caption_length == 0 {
        return Err(EngineError::config(
            "max_caption_length must be greater than 0",
        ));
    }

    Ok(())
}
