//! BatchNorm layer configuration.
//!
//! Normalizes along one feature axis: `y = gamma * (x - mean) / sqrt(var + eps) + beta`.
//! The moving statistics are parameters too, but they are never trainable.

use crate::analysis::shape_inference::ShapeError;
use crate::graph::{Shape, TensorShape};
use crate::initializers::{Initializer, Regularizer};
use crate::nn::module::{Layer, LayerLabel, Result};
use crate::nn::ParamRole;
use serde::{Deserialize, Serialize};

/// Small constant for numerical stability.
const DEFAULT_EPSILON: f32 = 1e-3;

/// Momentum for the moving statistics.
const DEFAULT_MOMENTUM: f32 = 0.99;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchNormConfig {
    /// Feature axis, counted over the full shape including the batch axis.
    /// Negative values count from the end.
    pub axis: i64,
    pub momentum: f32,
    pub epsilon: f32,
    /// Learn an offset (`beta`).
    pub center: bool,
    /// Learn a scale (`gamma`).
    pub scale: bool,
    pub gamma_initializer: Initializer,
    pub beta_initializer: Initializer,
    pub moving_mean_initializer: Initializer,
    pub moving_variance_initializer: Initializer,
    pub gamma_regularizer: Option<Regularizer>,
    pub beta_regularizer: Option<Regularizer>,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        Self {
            axis: -1,
            momentum: DEFAULT_MOMENTUM,
            epsilon: DEFAULT_EPSILON,
            center: true,
            scale: true,
            gamma_initializer: Initializer::Ones,
            beta_initializer: Initializer::Zeros,
            moving_mean_initializer: Initializer::Zeros,
            moving_variance_initializer: Initializer::Ones,
            gamma_regularizer: None,
            beta_regularizer: None,
        }
    }
}

impl BatchNormConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, axis: i64) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Index of the feature axis inside `TensorShape::dims`.
    fn feature_index(&self, input: &TensorShape) -> Option<usize> {
        let rank = input.rank() as i64;
        let axis = if self.axis < 0 { self.axis + rank } else { self.axis };
        // Axis 0 is the batch axis and has no static size.
        (1..rank).contains(&axis).then(|| (axis - 1) as usize)
    }
}

impl Layer for BatchNormConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        let input = label.single(inputs)?;
        if self.feature_index(input).is_none() {
            return Err(ShapeError::InvalidAxis {
                layer: label.name.to_string(),
                axis: self.axis,
                rank: input.rank(),
            });
        }
        Ok(input.clone())
    }

    fn param_roles(&self) -> Vec<ParamRole> {
        let mut roles = Vec::with_capacity(4);
        if self.scale {
            roles.push(ParamRole::Gamma);
        }
        if self.center {
            roles.push(ParamRole::Beta);
        }
        roles.push(ParamRole::MovingMean);
        roles.push(ParamRole::MovingVariance);
        roles
    }

    fn param_shape(&self, role: ParamRole, input: &TensorShape) -> Option<Shape> {
        let features = input.dims[self.feature_index(input)?];
        match role {
            ParamRole::Gamma if self.scale => Some(vec![features]),
            ParamRole::Beta if self.center => Some(vec![features]),
            ParamRole::MovingMean | ParamRole::MovingVariance => Some(vec![features]),
            _ => None,
        }
    }

    fn initializer_for(&self, role: ParamRole) -> Initializer {
        match role {
            ParamRole::Gamma => self.gamma_initializer.clone(),
            ParamRole::Beta => self.beta_initializer.clone(),
            ParamRole::MovingMean => self.moving_mean_initializer.clone(),
            _ => self.moving_variance_initializer.clone(),
        }
    }

    fn regularizer_for(&self, role: ParamRole) -> Option<Regularizer> {
        match role {
            ParamRole::Gamma => self.gamma_regularizer.clone(),
            ParamRole::Beta => self.beta_regularizer.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_follow_center_and_scale() {
        assert_eq!(
            BatchNormConfig::new().param_roles(),
            vec![ParamRole::Gamma, ParamRole::Beta, ParamRole::MovingMean, ParamRole::MovingVariance]
        );
        assert_eq!(
            BatchNormConfig::new().with_scale(false).param_roles(),
            vec![ParamRole::Beta, ParamRole::MovingMean, ParamRole::MovingVariance]
        );
    }

    #[test]
    fn test_param_shape_uses_feature_axis() {
        let input = TensorShape::new(vec![8, 8, 16]);
        let bn = BatchNormConfig::new();
        assert_eq!(bn.param_shape(ParamRole::Gamma, &input), Some(vec![16]));
        let bn = BatchNormConfig::new().with_axis(1);
        assert_eq!(bn.param_shape(ParamRole::MovingMean, &input), Some(vec![8]));
    }

    #[test]
    fn test_batch_axis_rejected() {
        let bn = BatchNormConfig::new().with_axis(0);
        let label = LayerLabel::new("bn", "BatchNorm");
        assert!(bn.output_shape(label, &[TensorShape::new(vec![4])]).is_err());
    }
}
