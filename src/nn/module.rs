// --- File: src/nn/module.rs ---

//! Base trait for layer configurations.

use crate::analysis::shape_inference::ShapeError;
use crate::graph::{Shape, TensorShape};
use crate::initializers::{Initializer, Regularizer};
use crate::nn::ParamRole;

pub(crate) type Result<T> = std::result::Result<T, ShapeError>;

/// Identifies the layer a shape computation runs for, so errors can name it.
#[derive(Debug, Clone, Copy)]
pub struct LayerLabel<'a> {
    pub name: &'a str,
    pub kind: &'static str,
}

impl<'a> LayerLabel<'a> {
    pub fn new(name: &'a str, kind: &'static str) -> Self {
        Self { name, kind }
    }

    pub(crate) fn arity(&self, expected: &str, actual: usize) -> ShapeError {
        ShapeError::ArityMismatch {
            layer: self.name.to_string(),
            kind: self.kind.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }

    pub(crate) fn rank(&self, expected: usize, actual: usize) -> ShapeError {
        ShapeError::InvalidRank {
            layer: self.name.to_string(),
            kind: self.kind.to_string(),
            expected,
            actual,
        }
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> ShapeError {
        ShapeError::InvalidConfig {
            layer: self.name.to_string(),
            kind: self.kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the only inbound shape, or an arity error.
    pub(crate) fn single<'s>(&self, inputs: &'s [TensorShape]) -> Result<&'s TensorShape> {
        match inputs {
            [only] => Ok(only),
            _ => Err(self.arity("exactly 1", inputs.len())),
        }
    }

    /// Returns the only inbound shape after checking its rank (batch included).
    pub(crate) fn single_with_rank<'s>(
        &self,
        inputs: &'s [TensorShape],
        rank: usize,
    ) -> Result<&'s TensorShape> {
        let input = self.single(inputs)?;
        if input.rank() != rank {
            return Err(self.rank(rank, input.rank()));
        }
        Ok(input)
    }
}

/// Behaviour every layer configuration provides to the graph passes.
///
/// Only `output_shape` is mandatory: parameter-free layers keep the
/// defaults and contribute no slots.
pub trait Layer {
    /// Shape transfer function from the inbound shapes (in inbound order).
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape>;

    /// Parameter roles this configuration declares, in slot order.
    fn param_roles(&self) -> Vec<ParamRole> {
        Vec::new()
    }

    /// Shape of the parameter with `role`, given the resolved inbound shape.
    fn param_shape(&self, _role: ParamRole, _input: &TensorShape) -> Option<Shape> {
        None
    }

    /// Initializer used when the parameter is not bound from a store.
    fn initializer_for(&self, _role: ParamRole) -> Initializer {
        Initializer::Zeros
    }

    fn regularizer_for(&self, _role: ParamRole) -> Option<Regularizer> {
        None
    }
}
