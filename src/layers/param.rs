//! Trainable parameter paired with its gradient accumulator.

use crate::error::{EngineError, Result};
use crate::optimizers::Optimizer;
use crate::tensor::Tensor;
use std::collections::BTreeSet;

/// A parameter tensor and an equal-shaped gradient accumulator.
///
/// Both are allocated once and mutated in place; the accumulator's shape
/// always mirrors the value's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    value: Tensor,
    grad: Tensor,
}

impl Param {
    pub fn new(value: Tensor) -> Self {
        let grad = Tensor::zeros(value.shape());
        Self { value, grad }
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn grad(&self) -> &Tensor {
        &self.grad
    }

    /// Direct access to the value, e.g. for finite-difference checks.
    pub fn value_mut(&mut self) -> &mut [f32] {
        self.value.data_mut()
    }

    /// Replace the value with a tensor of identical shape.
    pub fn set_value(&mut self, value: Tensor) -> Result<()> {
        if value.shape() != self.value.shape() {
            return Err(EngineError::shape(
                self.value.shape(),
                value.shape(),
                "parameter assignment",
            ));
        }
        self.value = value;
        Ok(())
    }

    /// Add `grad` into the accumulator.
    pub fn accumulate(&mut self, grad: &Tensor) -> Result<()> {
        self.grad.add_assign(grad)
    }

    pub(crate) fn accumulate_row(&mut self, row: usize, grad: &[f32]) -> Result<()> {
        let target = self.grad.row_mut(row)?;
        if target.len() != grad.len() {
            return Err(EngineError::shape(&[target.len()], &[grad.len()], "row accumulation"));
        }
        for (g, &d) in target.iter_mut().zip(grad.iter()) {
            *g += d;
        }
        Ok(())
    }

    /// Whether any gradient has been accumulated since the last step.
    pub fn has_gradient(&self) -> bool {
        self.grad.data().iter().any(|&g| g != 0.0)
    }

    /// Update the value from the accumulator, then zero the accumulator.
    pub fn step(&mut self, optimizer: &mut dyn Optimizer) {
        optimizer.update(self.value.data_mut(), self.grad.data());
        self.grad.fill_zero();
    }

    /// Step only the given rows of a rank-2 parameter; other rows are not
    /// written at all. Indices past the last row are never visited.
    pub(crate) fn step_rows(&mut self, rows: &BTreeSet<usize>, optimizer: &mut dyn Optimizer) {
        let width = self.value.len() / self.value.shape()[0];
        let values = self.value.data_mut().chunks_exact_mut(width);
        let grads = self.grad.data_mut().chunks_exact_mut(width);
        for (row, (value, grad)) in values.zip(grads).enumerate() {
            if rows.contains(&row) {
                optimizer.update(value, grad);
                grad.fill(0.0);
            }
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill_zero();
    }
}
