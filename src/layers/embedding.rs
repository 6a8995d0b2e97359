//! Embedding layer implementation
//!
//! A (vocab_size × embed_size) lookup table. Forward returns one row; backward
//! accumulates into that row only, and the optimizer step touches only rows
//! that received a gradient.

use crate::error::{EngineError, Result};
use crate::layers::{Layer, LayerKind, Param};
use crate::optimizers::Optimizer;
use crate::tensor::Tensor;
use crate::utils::SimpleRng;
use log::debug;
use std::collections::BTreeSet;

/// Learned lookup table mapping token ids to dense vectors.
///
/// # Example
///
/// ```
/// use neural_layers::layers::EmbeddingLayer;
/// use neural_layers::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = EmbeddingLayer::new(5, 3, &mut rng).unwrap();
/// assert_eq!(layer.lookup(4).unwrap().len(), 3);
/// assert!(layer.lookup(7).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddingLayer {
    vocab_size: usize,
    embed_size: usize,
    table: Param,
    touched: BTreeSet<usize>,
    cache: Option<usize>,
}

impl EmbeddingLayer {
    /// Create a table with entries uniform in [-1, 1).
    ///
    /// # Arguments
    ///
    /// * `vocab_size` - Number of token ids; valid ids are `0..vocab_size`
    /// * `embed_size` - Length of each embedding row
    /// * `rng` - Random number generator for table initialization
    ///
    /// # Returns
    ///
    /// The new layer, or a configuration error when either size is zero
    pub fn new(vocab_size: usize, embed_size: usize, rng: &mut SimpleRng) -> Result<Self> {
        if vocab_size == 0 || embed_size == 0 {
            return Err(EngineError::config(format!(
                "embedding sizes must be positive, got vocab={} embed={}",
                vocab_size, embed_size
            )));
        }
        debug!("EmbeddingLayer: vocab {} x embed {}", vocab_size, embed_size);
        Self::from_table(Tensor::random_uniform(&[vocab_size, embed_size], -1.0, 1.0, rng))
    }

    /// Build from an explicit (vocab_size × embed_size) table.
    pub fn from_table(table: Tensor) -> Result<Self> {
        let (vocab_size, embed_size) = match table.shape() {
            &[rows, cols] => (rows, cols),
            other => return Err(EngineError::shape(&[0, 0], other, "embedding table")),
        };
        Ok(Self {
            vocab_size,
            embed_size,
            table: Param::new(table),
            touched: BTreeSet::new(),
            cache: None,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn embed_size(&self) -> usize {
        self.embed_size
    }

    pub fn table(&self) -> &Tensor {
        self.table.value()
    }

    pub fn table_gradients(&self) -> &Tensor {
        self.table.grad()
    }

    fn check_token(&self, token: usize) -> Result<()> {
        if token >= self.vocab_size {
            return Err(EngineError::Index {
                index: token as i64,
                bound: self.vocab_size,
                operation: "embedding lookup".to_string(),
            });
        }
        Ok(())
    }

    /// Row for `token`. Fails with an index error outside [0, vocab_size).
    pub fn lookup(&self, token: usize) -> Result<Tensor> {
        self.check_token(token)?;
        Ok(Tensor::from_vec(self.table.value().row(token)?.to_vec()))
    }

    /// Accumulate `grad` into the gradient row of `token` only.
    pub fn accumulate(&mut self, token: usize, grad: &Tensor) -> Result<()> {
        self.check_token(token)?;
        if grad.len() != self.embed_size {
            return Err(EngineError::shape(&[self.embed_size], grad.shape(), "embedding backward"));
        }
        self.table.accumulate_row(token, grad.data())?;
        self.touched.insert(token);
        Ok(())
    }

    /// Token id carried by a layer input: a single non-negative integer value.
    fn token_from(&self, input: &Tensor) -> Result<usize> {
        if input.len() != 1 {
            return Err(EngineError::shape(&[1], input.shape(), "embedding forward"));
        }
        let value = input.data()[0];
        if value.fract() != 0.0 || value < 0.0 || value >= self.vocab_size as f32 {
            return Err(EngineError::Index {
                index: value.floor() as i64,
                bound: self.vocab_size,
                operation: "embedding lookup".to_string(),
            });
        }
        Ok(value as usize)
    }
}

/// As a [`Layer`], the input is a one-element tensor holding the token id and
/// the returned input gradient is a zero tensor of that shape: token ids are
/// not differentiable.
impl Layer for EmbeddingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Embedding
    }

    fn input_size(&self) -> Option<usize> {
        Some(1)
    }

    fn output_size(&self) -> Option<usize> {
        Some(self.embed_size)
    }

    fn infer(&self, input: &Tensor) -> Result<Tensor> {
        self.lookup(self.token_from(input)?)
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        let token = self.token_from(input)?;
        let output = self.lookup(token)?;
        self.cache = Some(token);
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor> {
        let token = self
            .cache
            .take()
            .ok_or(EngineError::MissingCache { layer: "embedding" })?;
        self.accumulate(token, grad_output)?;
        Ok(Tensor::zeros(&[1]))
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.table]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.table]
    }

    fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer) {
        let rows = std::mem::take(&mut self.touched);
        self.table.step_rows(&rows, optimizer);
    }

    fn zero_gradients(&mut self) {
        self.table.zero_grad();
        self.touched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;

    #[test]
    fn test_lookup_returns_row() {
        let table = Tensor::new(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let layer = EmbeddingLayer::from_table(table).unwrap();
        assert_eq!(layer.lookup(1).unwrap().data(), &[3.0, 4.0]);
    }

    #[test]
    fn test_out_of_range_token_is_index_error() {
        let mut rng = SimpleRng::new(3);
        let layer = EmbeddingLayer::new(5, 3, &mut rng).unwrap();
        assert!(matches!(layer.lookup(5), Err(EngineError::Index { .. })));
    }

    #[test]
    fn test_layer_input_rejects_negative_and_fractional_ids() {
        let mut rng = SimpleRng::new(3);
        let layer = EmbeddingLayer::new(5, 3, &mut rng).unwrap();
        assert!(matches!(
            layer.infer(&Tensor::from_vec(vec![-1.0])),
            Err(EngineError::Index { .. })
        ));
        assert!(layer.infer(&Tensor::from_vec(vec![1.5])).is_err());
        assert!(layer.infer(&Tensor::from_vec(vec![2.0])).is_ok());
    }

    #[test]
    fn test_step_only_updates_touched_rows() {
        let table = Tensor::new(vec![3, 2], vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let mut layer = EmbeddingLayer::from_table(table).unwrap();
        layer.accumulate(2, &Tensor::from_vec(vec![1.0, 2.0])).unwrap();
        layer.apply_gradients(&mut SGD::new(0.5));

        assert_eq!(layer.table().data(), &[1.0, 1.0, 1.0, 1.0, 0.5, 0.0]);
        assert!(layer.table_gradients().data().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_second_step_without_gradients_is_a_no_op() {
        let table = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut layer = EmbeddingLayer::from_table(table).unwrap();
        layer.accumulate(0, &Tensor::from_vec(vec![2.0, 2.0])).unwrap();

        let mut optimizer = SGD::new(0.5);
        layer.apply_gradients(&mut optimizer);
        let after_first = layer.table().clone();
        layer.apply_gradients(&mut optimizer);

        assert_eq!(after_first.data(), &[0.0, 1.0, 3.0, 4.0]);
        assert_eq!(layer.table(), &after_first);
    }
}
