// --- File: src/nn/pooling.rs ---

//! Pooling layer configurations. Pooling layers carry no parameters.

use crate::graph::TensorShape;
use crate::nn::conv::{windowed_shape, Padding};
use crate::nn::module::{Layer, LayerLabel, Result};
use serde::{Deserialize, Serialize};

/// Window configuration shared by MaxPool2D and AvgPool2D.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool2dConfig::new((2, 2)); // strides default to the window size
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pool2dConfig {
    /// Window size (kH, kW).
    pub pool_size: (usize, usize),
    /// Stride; `None` means equal to `pool_size`.
    pub strides: Option<(usize, usize)>,
    pub padding: Padding,
}

impl Default for Pool2dConfig {
    fn default() -> Self {
        Self {
            pool_size: (2, 2),
            strides: None,
            padding: Padding::Valid,
        }
    }
}

impl Pool2dConfig {
    pub fn new(pool_size: (usize, usize)) -> Self {
        Self {
            pool_size,
            ..Default::default()
        }
    }

    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = Some(strides);
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }
}

impl Layer for Pool2dConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        let input = label.single_with_rank(inputs, 4)?;
        windowed_shape(
            &label,
            input,
            self.pool_size,
            self.strides.unwrap_or(self.pool_size),
            (1, 1),
            self.padding,
            input.dims[2],
        )
    }
}

/// GlobalAvgPool2D: `[None, H, W, C] -> [None, C]`.
pub fn global_pool_shape(label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
    let input = label.single_with_rank(inputs, 4)?;
    Ok(TensorShape::new(vec![input.dims[2]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pool_halves_spatial_dims() {
        let pool = Pool2dConfig::new((2, 2));
        let label = LayerLabel::new("pool", "MaxPool2D");
        let out = pool.output_shape(label, &[TensorShape::new(vec![24, 24, 32])]).unwrap();
        assert_eq!(out.dims, vec![12, 12, 32]);
    }

    #[test]
    fn test_pool_with_explicit_strides_and_same_padding() {
        let pool = Pool2dConfig::new((3, 3))
            .with_strides((2, 2))
            .with_padding(Padding::Same);
        let label = LayerLabel::new("pool", "AvgPool2D");
        let out = pool.output_shape(label, &[TensorShape::new(vec![7, 7, 4])]).unwrap();
        assert_eq!(out.dims, vec![4, 4, 4]);
    }

    #[test]
    fn test_global_pool_keeps_channels() {
        let label = LayerLabel::new("gap", "GlobalAvgPool2D");
        let out = global_pool_shape(label, &[TensorShape::new(vec![7, 7, 64])]).unwrap();
        assert_eq!(out.dims, vec![64]);
    }
}
