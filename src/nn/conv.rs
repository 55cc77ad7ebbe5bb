// --- File: src/nn/conv.rs ---

//! Convolutional layer configurations (NHWC layout).

use crate::graph::{Shape, TensorShape};
use crate::initializers::{Initializer, Regularizer};
use crate::nn::activations::Activation;
use crate::nn::module::{Layer, LayerLabel, Result};
use crate::nn::ParamRole;
use serde::{Deserialize, Serialize};

/// Padding mode for convolution and pooling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

/// Output length of one spatial axis.
///
/// `Same` keeps `ceil(input / stride)`; `Valid` only counts full windows of the
/// dilated kernel and yields 0 when the window does not fit at all.
pub fn conv_output_length(
    input: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
    padding: Padding,
) -> usize {
    let effective = effective_window(kernel, dilation).unwrap_or(usize::MAX);
    match padding {
        Padding::Same => input.div_ceil(stride),
        Padding::Valid if input >= effective => (input - effective) / stride + 1,
        Padding::Valid => 0,
    }
}

/// Extent of a dilated kernel, `None` on overflow.
fn effective_window(kernel: usize, dilation: usize) -> Option<usize> {
    kernel.saturating_sub(1).checked_mul(dilation)?.checked_add(1)
}

/// Validates the window geometry shared by convolution and pooling layers.
pub(crate) fn check_window(
    label: &LayerLabel<'_>,
    kernel: (usize, usize),
    strides: (usize, usize),
    dilation: (usize, usize),
) -> Result<()> {
    if kernel.0 == 0 || kernel.1 == 0 {
        return Err(label.invalid(format!("kernel size {:?} must be positive", kernel)));
    }
    if strides.0 == 0 || strides.1 == 0 {
        return Err(label.invalid(format!("strides {:?} must be positive", strides)));
    }
    if dilation.0 == 0 || dilation.1 == 0 {
        return Err(label.invalid(format!("dilation {:?} must be positive", dilation)));
    }
    if effective_window(kernel.0, dilation.0).is_none() || effective_window(kernel.1, dilation.1).is_none() {
        return Err(label.invalid(format!(
            "kernel size {:?} with dilation {:?} overflows the window extent",
            kernel, dilation
        )));
    }
    Ok(())
}

/// Output shape `[None, H', W', channels]` of a 2D window over a rank-4 input.
pub(crate) fn windowed_shape(
    label: &LayerLabel<'_>,
    input: &TensorShape,
    kernel: (usize, usize),
    strides: (usize, usize),
    dilation: (usize, usize),
    padding: Padding,
    channels: usize,
) -> Result<TensorShape> {
    check_window(label, kernel, strides, dilation)?;
    let h = conv_output_length(input.dims[0], kernel.0, strides.0, dilation.0, padding);
    let w = conv_output_length(input.dims[1], kernel.1, strides.1, dilation.1, padding);
    Ok(TensorShape::new(vec![h, w, channels]))
}

/// Configuration for a Conv2D layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conv2dConfig {
    /// Number of output channels (filters).
    pub filters: usize,
    /// Convolution kernel size (kH, kW).
    pub kernel_size: (usize, usize),
    pub strides: (usize, usize),
    /// Dilation (kernel expansion).
    pub dilation: (usize, usize),
    pub padding: Padding,
    pub activation: Activation,
    pub use_bias: bool,
    pub kernel_initializer: Initializer,
    pub bias_initializer: Initializer,
    pub kernel_regularizer: Option<Regularizer>,
    pub bias_regularizer: Option<Regularizer>,
}

impl Default for Conv2dConfig {
    fn default() -> Self {
        Self {
            filters: 32,
            kernel_size: (3, 3),
            strides: (1, 1),
            dilation: (1, 1),
            padding: Padding::Valid,
            activation: Activation::Relu,
            use_bias: true,
            kernel_initializer: Initializer::GlorotUniform,
            bias_initializer: Initializer::Zeros,
            kernel_regularizer: None,
            bias_regularizer: None,
        }
    }
}

impl Conv2dConfig {
    /// Creates Conv2D configuration.
    pub fn new(filters: usize, kernel_size: (usize, usize)) -> Self {
        Self {
            filters,
            kernel_size,
            ..Default::default()
        }
    }

    /// Sets convolution stride.
    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Sets dilation.
    pub fn with_dilation(mut self, dilation: (usize, usize)) -> Self {
        self.dilation = dilation;
        self
    }

    /// Enables/disables bias.
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = Some(regularizer);
        self
    }
}

impl Layer for Conv2dConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        let input = label.single_with_rank(inputs, 4)?;
        if self.filters == 0 {
            return Err(label.invalid("filters must be positive"));
        }
        windowed_shape(
            &label,
            input,
            self.kernel_size,
            self.strides,
            self.dilation,
            self.padding,
            self.filters,
        )
    }

    fn param_roles(&self) -> Vec<ParamRole> {
        let mut roles = vec![ParamRole::Kernel];
        if self.use_bias {
            roles.push(ParamRole::Bias);
        }
        roles
    }

    fn param_shape(&self, role: ParamRole, input: &TensorShape) -> Option<Shape> {
        let (kh, kw) = self.kernel_size;
        match role {
            ParamRole::Kernel => Some(vec![kh, kw, input.last()?, self.filters]),
            ParamRole::Bias if self.use_bias => Some(vec![self.filters]),
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

/// Configuration for a DepthwiseConv2D layer.
///
/// Each input channel is convolved with `depth_multiplier` kernels, so the
/// output has `channels * depth_multiplier` channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthwiseConv2dConfig {
    pub kernel_size: (usize, usize),
    pub strides: (usize, usize),
    pub dilation: (usize, usize),
    pub padding: Padding,
    pub depth_multiplier: usize,
    pub activation: Activation,
    pub use_bias: bool,
    pub depthwise_initializer: Initializer,
    pub bias_initializer: Initializer,
    pub depthwise_regularizer: Option<Regularizer>,
    pub bias_regularizer: Option<Regularizer>,
}

impl Default for DepthwiseConv2dConfig {
    fn default() -> Self {
        Self {
            kernel_size: (3, 3),
            strides: (1, 1),
            dilation: (1, 1),
            padding: Padding::Valid,
            depth_multiplier: 1,
            activation: Activation::Relu,
            use_bias: true,
            depthwise_initializer: Initializer::GlorotUniform,
            bias_initializer: Initializer::Zeros,
            depthwise_regularizer: None,
            bias_regularizer: None,
        }
    }
}

impl DepthwiseConv2dConfig {
    pub fn new(kernel_size: (usize, usize)) -> Self {
        Self {
            kernel_size,
            ..Default::default()
        }
    }

    pub fn with_depth_multiplier(mut self, depth_multiplier: usize) -> Self {
        self.depth_multiplier = depth_multiplier;
        self
    }

    pub fn with_strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }
}

impl Layer for DepthwiseConv2dConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        let input = label.single_with_rank(inputs, 4)?;
        if self.depth_multiplier == 0 {
            return Err(label.invalid("depth_multiplier must be positive"));
        }
        windowed_shape(
            &label,
            input,
            self.kernel_size,
            self.strides,
            self.dilation,
            self.padding,
            input.dims[2] * self.depth_multiplier,
        )
    }

    fn param_roles(&self) -> Vec<ParamRole> {
        let mut roles = vec![ParamRole::DepthwiseKernel];
        if self.use_bias {
            roles.push(ParamRole::DepthwiseBias);
        }
        roles
    }

    fn param_shape(&self, role: ParamRole, input: &TensorShape) -> Option<Shape> {
        let (kh, kw) = self.kernel_size;
        let channels = input.last()?;
        match role {
            ParamRole::DepthwiseKernel => Some(vec![kh, kw, channels, self.depth_multiplier]),
            ParamRole::DepthwiseBias if self.use_bias => {
                Some(vec![channels * self.depth_multiplier])
            }
            _ => None,
        }
    }

    fn initializer_for(&self, role: ParamRole) -> Initializer {
        match role {
            ParamRole::DepthwiseKernel => self.depthwise_initializer.clone(),
            _ => self.bias_initializer.clone(),
        }
    }

    fn regularizer_for(&self, role: ParamRole) -> Option<Regularizer> {
        match role {
            ParamRole::DepthwiseKernel => self.depthwise_regularizer.clone(),
            ParamRole::DepthwiseBias => self.bias_regularizer.clone(),
            _ => None,
        }
    }
}

/// Configuration for a SeparableConv2D layer: a depthwise convolution
/// followed by a 1x1 pointwise convolution to `filters` channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparableConv2dConfig {
    pub filters: usize,
    pub kernel_size: (usize, usize),
    pub strides: (usize, usize),
    pub dilation: (usize, usize),
    pub padding: Padding,
    pub depth_multiplier: usize,
    pub activation: Activation,
    pub use_bias: bool,
    pub depthwise_initializer: Initializer,
    pub pointwise_initializer: Initializer,
    pub bias_initializer: Initializer,
    pub depthwise_regularizer: Option<Regularizer>,
    pub pointwise_regularizer: Option<Regularizer>,
    pub bias_regularizer: Option<Regularizer>,
}

impl Default for SeparableConv2dConfig {
    fn default() -> Self {
        Self {
            filters: 32,
            kernel_size: (3, 3),
            strides: (1, 1),
            dilation: (1, 1),
            padding: Padding::Valid,
            depth_multiplier: 1,
            activation: Activation::Relu,
            use_bias: true,
            depthwise_initializer: Initializer::GlorotUniform,
            pointwise_initializer: Initializer::GlorotUniform,
            bias_initializer: Initializer::Zeros,
            depthwise_regularizer: None,
            pointwise_regularizer: None,
            bias_regularizer: None,
        }
    }
}

impl SeparableConv2dConfig {
    pub fn new(filters: usize, kernel_size: (usize, usize)) -> Self {
        Self {
            filters,
            kernel_size,
            ..Default::default()
        }
    }

    pub fn with_depth_multiplier(mut self, depth_multiplier: usize) -> Self {
        self.depth_multiplier = depth_multiplier;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }
}

impl Layer for SeparableConv2dConfig {
    fn output_shape(&self, label: LayerLabel<'_>, inputs: &[TensorShape]) -> Result<TensorShape> {
        let input = label.single_with_rank(inputs, 4)?;
        if self.filters == 0 || self.depth_multiplier == 0 {
            return Err(label.invalid("filters and depth_multiplier must be positive"));
        }
        windowed_shape(
            &label,
            input,
            self.kernel_size,
            self.strides,
            self.dilation,
            self.padding,
            self.filters,
        )
    }

    fn param_roles(&self) -> Vec<ParamRole> {
        let mut roles = vec![ParamRole::DepthwiseKernel, ParamRole::PointwiseKernel];
        if self.use_bias {
            roles.push(ParamRole::Bias);
        }
        roles
    }

    fn param_shape(&self, role: ParamRole, input: &TensorShape) -> Option<Shape> {
        let (kh, kw) = self.kernel_size;
        let channels = input.last()?;
        let dm = self.depth_multiplier;
        match role {
            ParamRole::DepthwiseKernel => Some(vec![kh, kw, channels, dm]),
            ParamRole::PointwiseKernel => Some(vec![1, 1, channels * dm, self.filters]),
            ParamRole::Bias if self.use_bias => Some(vec![self.filters]),
            _ => None,
        }
    }

    fn initializer_for(&self, role: ParamRole) -> Initializer {
        match role {
            ParamRole::DepthwiseKernel => self.depthwise_initializer.clone(),
            ParamRole::PointwiseKernel => self.pointwise_initializer.clone(),
            _ => self.bias_initializer.clone(),
        }
    }

    fn regularizer_for(&self, role: ParamRole) -> Option<Regularizer> {
        match role {
            ParamRole::DepthwiseKernel => self.depthwise_regularizer.clone(),
            ParamRole::PointwiseKernel => self.pointwise_regularizer.clone(),
            ParamRole::Bias => self.bias_regularizer.clone(),
            _ => None,
        }
    }
}
