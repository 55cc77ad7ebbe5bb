//! Merge layers combining several inbound tensors.

use crate::analysis::shape_inference::ShapeError;
use crate::graph::TensorShape;
use crate::nn::module::{Layer, LayerLabel, Result};
use serde::{Deserialize, Serialize};

/// Shape transfer of the element-wise merges (Add, Multiply, Average, ...).
///
/// All inbound shapes must be identical. `exactly_two` restricts the arity,
/// as Subtract requires.
pub fn elementwise_shape(
    label: LayerLabel<'_>,
    inputs: &[TensorShape],
    exactly_two: bool,
) -> Result<TensorShape> {
    match (inputs.len(), exactly_two) {
        (2, _) => {}
        (n, true) => return Err(label.arity("exactly 2", n)),
        (n, false) if n < 2 => return Err(label.arity("at least 2", n)),
        _ => {}
    }
    let first = &inputs[0];
    if let Some(other) = inputs[1..].iter().find(|s| s.dims != first.dims) {
        return Err(ShapeError::IncompatibleMergeShapes {
            layer: label.name.to_string(),
            kind: label.kind.to_string(),
            first: first.clone(),
            other: other.clone(),
        });
    }
    Ok(first.clone())
}

/// Concatenation along one axis; every other dimension must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcatenateConfig {
    /// Axis over the full shape including the batch axis; negative counts from the end.
    pub axis: i64,
}

impl Default for ConcatenateConfig {
    fn default() -> Self {
        Self { axis: -1 }
    }
}

impl ConcatenateConfig {
    pub fn new(axis: i64) -> Self {
        Self { axis }
    }
}

impl Layer for ConcatenateConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        if inputs.len() < 2 {
            return Err(label.arity("at least 2", inputs.len()));
        }
        let first = &inputs[0];
        let rank = first.rank() as i64;
        let axis = if self.axis < 0 { self.axis + rank } else { self.axis };
        if !(1..rank).contains(&axis) {
            return Err(ShapeError::InvalidAxis {
                layer: label.name.to_string(),
                axis: self.axis,
                rank: first.rank(),
            });
        }
        let axis = (axis - 1) as usize;

        let mut dims = first.dims.clone();
        for other in &inputs[1..] {
            let compatible = other.dims.len() == first.dims.len()
                && other
                    .dims
                    .iter()
                    .zip(&first.dims)
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(ShapeError::IncompatibleMergeShapes {
                    layer: label.name.to_string(),
                    kind: label.kind.to_string(),
                    first: first.clone(),
                    other: other.clone(),
                });
            }
            dims[axis] += other.dims[axis];
        }
        Ok(TensorShape::new(dims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> TensorShape {
        TensorShape::new(dims.to_vec())
    }

    #[test]
    fn test_add_requires_equal_shapes() {
        let label = LayerLabel::new("sum", "Add");
        let out = elementwise_shape(label, &[shape(&[4, 4]), shape(&[4, 4]), shape(&[4, 4])], false);
        assert_eq!(out.unwrap().dims, vec![4, 4]);

        let err = elementwise_shape(label, &[shape(&[4, 4]), shape(&[4, 5])], false).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sum"));
        assert!(message.contains("[None, 4, 4]"));
        assert!(message.contains("[None, 4, 5]"));
    }

    #[test]
    fn test_subtract_is_binary() {
        let label = LayerLabel::new("diff", "Subtract");
        let inputs = [shape(&[2]), shape(&[2]), shape(&[2])];
        assert!(matches!(
            elementwise_shape(label, &inputs, true),
            Err(ShapeError::ArityMismatch { actual: 3, .. })
        ));
    }

    #[test]
    fn test_concatenate_sums_axis() {
        let label = LayerLabel::new("cat", "Concatenate");
        let out = ConcatenateConfig::default()
            .output_shape(label, &[shape(&[8, 8, 3]), shape(&[8, 8, 5])])
            .unwrap();
        assert_eq!(out.dims, vec![8, 8, 8]);
    }

    #[test]
    fn test_concatenate_rejects_mismatch_off_axis() {
        let label = LayerLabel::new("cat", "Concatenate");
        let err = ConcatenateConfig::new(-1)
            .output_shape(label, &[shape(&[8, 8, 3]), shape(&[8, 7, 3])])
            .unwrap_err();
        assert!(matches!(err, ShapeError::IncompatibleMergeShapes { .. }));
    }
}
