//! Structural layers: Input, Flatten and the shape-preserving layers.

use crate::analysis::shape_inference::ShapeError;
use crate::graph::TensorShape;
use crate::nn::module::{Layer, LayerLabel, Result};
use serde::{Deserialize, Serialize};

/// Declared per-sample shape of the model input (batch dimension excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    pub dims: Vec<usize>,
}

impl InputConfig {
    pub fn new(dims: &[usize]) -> Self {
        Self { dims: dims.to_vec() }
    }
}

impl Layer for InputConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        if !inputs.is_empty() {
            return Err(label.arity("none", inputs.len()));
        }
        if self.dims.is_empty() {
            return Err(ShapeError::EmptyInputShape(label.name.to_string()));
        }
        Ok(TensorShape::new(self.dims.clone()))
    }
}

/// Flatten: `[None, d1, .., dn] -> [None, d1 * .. * dn]`.
pub fn flatten_shape(label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
    let input = label.single(inputs)?;
    if input.dims.is_empty() {
        return Err(label.rank(2, input.rank()));
    }
    Ok(TensorShape::new(vec![input.sample_size()]))
}

/// Shape transfer of Dropout and Activation layers.
pub fn identity_shape(label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
    Ok(label.single(inputs)?.clone())
}

/// Dropout rate must lie in `[0, 1)`.
pub(crate) fn check_dropout_rate(label: LayerLabel<'_>, rate: f32) -> Result<()> {
    if !(0.0..1.0).contains(&rate) {
        return Err(label.invalid(format!("dropout rate {} must be in [0, 1)", rate)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape_is_declared_dims() {
        let input = InputConfig::new(&[28, 28, 1]);
        let out = input.output_shape(LayerLabel::new("x", "Input"), &[]).unwrap();
        assert_eq!(out.to_string(), "[None, 28, 28, 1]");
    }

    #[test]
    fn test_empty_input_rejected() {
        let input = InputConfig::new(&[]);
        let err = input.output_shape(LayerLabel::new("x", "Input"), &[]).unwrap_err();
        assert_eq!(err, ShapeError::EmptyInputShape("x".to_string()));
    }

    #[test]
    fn test_flatten() {
        let label = LayerLabel::new("flat", "Flatten");
        let out = flatten_shape(label, &[TensorShape::new(vec![12, 12, 32])]).unwrap();
        assert_eq!(out.dims, vec![4608]);
    }

    #[test]
    fn test_dropout_rate_bounds() {
        let label = LayerLabel::new("drop", "Dropout");
        assert!(check_dropout_rate(label, 0.5).is_ok());
        assert!(check_dropout_rate(label, 1.0).is_err());
    }
}
