//! # Layer Kinds
//!
//! Closed set of supported layer kinds with their configurations, their
//! shape-transfer functions and their parameter-role table.
//!
//! Every per-kind decision (shape transfer, which parameters exist, their
//! shapes, initializers and canonical names) is an exhaustive `match` on
//! [`LayerKind`], so adding a kind is a compile-checked addition here and
//! nowhere else.
//!
//! ## Available Layers
//!
//! ### Core Layers
//! - `Input`, `Flatten`, `Dropout`, `Activation`
//! - [`DenseConfig`]: fully connected layer
//!
//! ### Convolutions (NHWC)
//! - [`Conv2dConfig`], [`DepthwiseConv2dConfig`], [`SeparableConv2dConfig`]
//!
//! ### Normalization
//! - [`BatchNormConfig`]
//!
//! ### Pooling
//! - [`Pool2dConfig`] for MaxPool2D / AvgPool2D, and GlobalAvgPool2D
//!
//! ### Merges
//! - Add, Subtract, Multiply, Average, Maximum, Minimum, [`ConcatenateConfig`]
//!
//! ## Example
//!
//! ```ignore
//! use rustylayers::nn::{LayerKind, DenseConfig, ParamRole};
//!
//! let dense = LayerKind::Dense(DenseConfig::new(10));
//! assert_eq!(dense.param_roles(), vec![ParamRole::Kernel, ParamRole::Bias]);
//! assert_eq!(dense.canonical_name("fc", ParamRole::Kernel), "fc_dense_kernel");
//! ```

pub mod activations;
pub mod batchnorm;
pub mod conv;
pub mod structural;
pub mod linear;
pub mod merge;
pub mod module;
pub mod pooling;

pub use activations::Activation;
pub use batchnorm::BatchNormConfig;
pub use conv::{conv_output_length, Conv2dConfig, DepthwiseConv2dConfig, Padding, SeparableConv2dConfig};
pub use structural::InputConfig;
pub use linear::DenseConfig;
pub use merge::ConcatenateConfig;
pub use module::{Layer, LayerLabel};
pub use pooling::Pool2dConfig;

use crate::analysis::shape_inference::ShapeError;
use crate::graph::{ParamDecl, TensorShape};
use crate::initializers::{Initializer, Regularizer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a learnable parameter plays inside its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    Kernel,
    Bias,
    DepthwiseKernel,
    DepthwiseBias,
    PointwiseKernel,
    Gamma,
    Beta,
    MovingMean,
    MovingVariance,
}

/// Coarse grouping used by path templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClass {
    KernelLike,
    BiasLike,
    /// Not addressable by a kernel/bias template.
    Other,
}

impl ParamRole {
    pub const ALL: [ParamRole; 9] = [
        ParamRole::Kernel,
        ParamRole::Bias,
        ParamRole::DepthwiseKernel,
        ParamRole::DepthwiseBias,
        ParamRole::PointwiseKernel,
        ParamRole::Gamma,
        ParamRole::Beta,
        ParamRole::MovingMean,
        ParamRole::MovingVariance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamRole::Kernel => "kernel",
            ParamRole::Bias => "bias",
            ParamRole::DepthwiseKernel => "depthwise_kernel",
            ParamRole::DepthwiseBias => "depthwise_bias",
            ParamRole::PointwiseKernel => "pointwise_kernel",
            ParamRole::Gamma => "gamma",
            ParamRole::Beta => "beta",
            ParamRole::MovingMean => "moving_mean",
            ParamRole::MovingVariance => "moving_variance",
        }
    }

    /// Moving statistics are updated by the forward pass, never by gradients.
    pub fn is_trainable(&self) -> bool {
        !matches!(self, ParamRole::MovingMean | ParamRole::MovingVariance)
    }

    pub fn class(&self) -> RoleClass {
        match self {
            ParamRole::Kernel | ParamRole::DepthwiseKernel => RoleClass::KernelLike,
            ParamRole::Bias | ParamRole::DepthwiseBias => RoleClass::BiasLike,
            _ => RoleClass::Other,
        }
    }
}

impl fmt::Display for ParamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layer semantics plus kind-specific configuration.
///
/// Serialized with a `class_name` tag, e.g.
/// `{"class_name": "Conv2D", "filters": 32, "kernel_size": [5, 5]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum LayerKind {
    Input(InputConfig),
    Dense(DenseConfig),
    #[serde(rename = "Conv2D")]
    Conv2d(Conv2dConfig),
    #[serde(rename = "DepthwiseConv2D")]
    DepthwiseConv2d(DepthwiseConv2dConfig),
    #[serde(rename = "SeparableConv2D")]
    SeparableConv2d(SeparableConv2dConfig),
    BatchNorm(BatchNormConfig),
    #[serde(rename = "MaxPool2D")]
    MaxPool2d(Pool2dConfig),
    #[serde(rename = "AvgPool2D")]
    AvgPool2d(Pool2dConfig),
    #[serde(rename = "GlobalAvgPool2D")]
    GlobalAvgPool2d,
    Flatten,
    Dropout {
        #[serde(default)]
        rate: f32,
    },
    Activation {
        #[serde(default)]
        activation: Activation,
    },
    Add,
    Subtract,
    Multiply,
    Average,
    Maximum,
    Minimum,
    Concatenate(ConcatenateConfig),
}

impl LayerKind {
    /// Kind name as used in configuration files and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Input(_) => "Input",
            LayerKind::Dense(_) => "Dense",
            LayerKind::Conv2d(_) => "Conv2D",
            LayerKind::DepthwiseConv2d(_) => "DepthwiseConv2D",
            LayerKind::SeparableConv2d(_) => "SeparableConv2D",
            LayerKind::BatchNorm(_) => "BatchNorm",
            LayerKind::MaxPool2d(_) => "MaxPool2D",
            LayerKind::AvgPool2d(_) => "AvgPool2D",
            LayerKind::GlobalAvgPool2d => "GlobalAvgPool2D",
            LayerKind::Flatten => "Flatten",
            LayerKind::Dropout { .. } => "Dropout",
            LayerKind::Activation { .. } => "Activation",
            LayerKind::Add => "Add",
            LayerKind::Subtract => "Subtract",
            LayerKind::Multiply => "Multiply",
            LayerKind::Average => "Average",
            LayerKind::Maximum => "Maximum",
            LayerKind::Minimum => "Minimum",
            LayerKind::Concatenate(_) => "Concatenate",
        }
    }

    /// Configuration object behind this kind, for kinds that have one.
    pub fn as_layer(&self) -> Option<&dyn Layer> {
        match self {
            LayerKind::Input(c) => Some(c),
            LayerKind::Dense(c) => Some(c),
            LayerKind::Conv2d(c) => Some(c),
            LayerKind::DepthwiseConv2d(c) => Some(c),
            LayerKind::SeparableConv2d(c) => Some(c),
            LayerKind::BatchNorm(c) => Some(c),
            LayerKind::MaxPool2d(c) | LayerKind::AvgPool2d(c) => Some(c),
            LayerKind::Concatenate(c) => Some(c),
            LayerKind::GlobalAvgPool2d
            | LayerKind::Flatten
            | LayerKind::Dropout { .. }
            | LayerKind::Activation { .. }
            | LayerKind::Add
            | LayerKind::Subtract
            | LayerKind::Multiply
            | LayerKind::Average
            | LayerKind::Maximum
            | LayerKind::Minimum => None,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(
            self,
            LayerKind::Add
                | LayerKind::Subtract
                | LayerKind::Multiply
                | LayerKind::Average
                | LayerKind::Maximum
                | LayerKind::Minimum
                | LayerKind::Concatenate(_)
        )
    }

    /// Computes the output shape from the inbound shapes.
    pub fn output_shape(&self, name: &str, inputs: &[TensorShape]) -> Result<TensorShape, ShapeError> {
        let label = LayerLabel::new(name, self.type_name());
        match self {
            LayerKind::GlobalAvgPool2d => pooling::global_pool_shape(label, inputs),
            LayerKind::Flatten => structural::flatten_shape(label, inputs),
            LayerKind::Dropout { rate } => {
                structural::check_dropout_rate(label, *rate)?;
                structural::identity_shape(label, inputs)
            }
            LayerKind::Activation { .. } => structural::identity_shape(label, inputs),
            LayerKind::Subtract => merge::elementwise_shape(label, inputs, true),
            LayerKind::Add
            | LayerKind::Multiply
            | LayerKind::Average
            | LayerKind::Maximum
            | LayerKind::Minimum => merge::elementwise_shape(label, inputs, false),
            configured => match configured.as_layer() {
                Some(layer) => layer.output_shape(label, inputs),
                None => Err(ShapeError::UnsupportedKind(configured.type_name().to_string())),
            },
        }
    }

    /// The closed per-kind parameter-role table, in slot order.
    pub fn param_roles(&self) -> Vec<ParamRole> {
        self.as_layer().map(|l| l.param_roles()).unwrap_or_default()
    }

    /// Parameter declarations for the given resolved inbound shape.
    pub fn param_decls(&self, input: &TensorShape) -> Vec<ParamDecl> {
        let Some(layer) = self.as_layer() else {
            return Vec::new();
        };
        layer
            .param_roles()
            .into_iter()
            .filter_map(|role| layer.param_shape(role, input).map(|shape| ParamDecl { role, shape }))
            .collect()
    }

    /// Tag embedded in canonical parameter names, for kinds with parameters.
    pub fn variable_tag(&self) -> Option<&'static str> {
        match self {
            LayerKind::Dense(_) => Some("dense"),
            LayerKind::Conv2d(_) => Some("conv2d"),
            LayerKind::DepthwiseConv2d(_) => Some("depthwise_conv2d"),
            LayerKind::SeparableConv2d(_) => Some("separable_conv2d"),
            LayerKind::BatchNorm(_) => Some("batch_norm"),
            _ => None,
        }
    }

    /// Role suffix inside canonical names. A depthwise layer's own kernel and
    /// bias are named plainly, its tag already says "depthwise".
    fn slot_suffix(&self, role: ParamRole) -> &'static str {
        match (self, role) {
            (LayerKind::DepthwiseConv2d(_), ParamRole::DepthwiseKernel) => "kernel",
            (LayerKind::DepthwiseConv2d(_), ParamRole::DepthwiseBias) => "bias",
            _ => role.as_str(),
        }
    }

    /// Canonical parameter name `<layer>_<kind-tag>_<role>`.
    pub fn canonical_name(&self, layer: &str, role: ParamRole) -> String {
        let tag = self.variable_tag().unwrap_or("layer");
        format!("{}_{}_{}", layer, tag, self.slot_suffix(role))
    }

    pub fn initializer_for(&self, role: ParamRole) -> Initializer {
        self.as_layer()
            .map(|l| l.initializer_for(role))
            .unwrap_or(Initializer::Zeros)
    }

    pub fn regularizer_for(&self, role: ParamRole) -> Option<Regularizer> {
        self.as_layer().and_then(|l| l.regularizer_for(role))
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
