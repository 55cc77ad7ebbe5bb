//! Fully connected (Dense) layer configuration.

use crate::graph::{Shape, TensorShape};
use crate::initializers::{Initializer, Regularizer};
use crate::nn::activations::Activation;
use crate::nn::module::{Layer, LayerLabel, Result};
use crate::nn::ParamRole;
use serde::{Deserialize, Serialize};

/// Dense layer: `y = activation(x · kernel + bias)` over the last axis.
///
/// The kernel has shape `[in_features, units]`, where `in_features` is the
/// last dimension of the inbound shape, so it is only known after shape
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseConfig {
    /// Number of output features.
    pub units: usize,
    pub activation: Activation,
    pub use_bias: bool,
    pub kernel_initializer: Initializer,
    pub bias_initializer: Initializer,
    pub kernel_regularizer: Option<Regularizer>,
    pub bias_regularizer: Option<Regularizer>,
}

impl Default for DenseConfig {
    fn default() -> Self {
        Self {
            units: 128,
            activation: Activation::Relu,
            use_bias: true,
            kernel_initializer: Initializer::GlorotUniform,
            bias_initializer: Initializer::Zeros,
            kernel_regularizer: None,
            bias_regularizer: None,
        }
    }
}

impl DenseConfig {
    pub fn new(units: usize) -> Self {
        Self {
            units,
            ..Default::default()
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_kernel_initializer(mut self, initializer: Initializer) -> Self {
        self.kernel_initializer = initializer;
        self
    }

    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = Some(regularizer);
        self
    }

    pub fn with_bias_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.bias_regularizer = Some(regularizer);
        self
    }
}

impl Layer for DenseConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        let input = label.single(inputs)?;
        if input.dims.is_empty() {
            return Err(label.rank(2, input.rank()));
        }
        if self.units == 0 {
            return Err(label.invalid("units must be positive"));
        }
        let mut dims = input.dims.clone();
        if let Some(last) = dims.last_mut() {
            *last = self.units;
        }
        Ok(TensorShape::new(dims))
    }

    fn param_roles(&self) -> Vec<ParamRole> {
        let mut roles = vec![ParamRole::Kernel];
        if self.use_bias {
            roles.push(ParamRole::Bias);
        }
        roles
    }

    fn param_shape(&self, role: ParamRole, input: &TensorShape) -> Option<Shape> {
        match role {
            ParamRole::Kernel => Some(vec![input.last()?, self.units]),
            ParamRole::Bias if self.use_bias => Some(vec![self.units]),
            _ => None,
        }
    }

    fn initializer_for(&self, role: ParamRole) -> Initializer {
        match role {
            ParamRole::Kernel => self.kernel_initializer.clone(),
            _ => self.bias_initializer.clone(),
        }
    }

    fn regularizer_for(&self, role: ParamRole) -> Option<Regularizer> {
        match role {
            ParamRole::Kernel => self.kernel_regularizer.clone(),
            ParamRole::Bias => self.bias_regularizer.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_replaces_last_dimension() {
        let dense = DenseConfig::new(10);
        let label = LayerLabel::new("fc", "Dense");
        let out = dense.output_shape(label, &[TensorShape::new(vec![4, 64])]).unwrap();
        assert_eq!(out.dims, vec![4, 10]);
    }

    #[test]
    fn test_dense_param_shapes() {
        let dense = DenseConfig::new(10);
        let input = TensorShape::new(vec![576]);
        assert_eq!(dense.param_shape(ParamRole::Kernel, &input), Some(vec![576, 10]));
        assert_eq!(dense.param_shape(ParamRole::Bias, &input), Some(vec![10]));
        assert_eq!(dense.param_shape(ParamRole::Gamma, &input), None);
    }

    #[test]
    fn test_dense_rejects_two_inputs() {
        let dense = DenseConfig::new(3);
        let label = LayerLabel::new("fc", "Dense");
        let shape = TensorShape::new(vec![3]);
        assert!(dense.output_shape(label, &[shape.clone(), shape]).is_err());
    }
}
