//! Naming strategies: map a layer's parameter roles to store paths.

use crate::graph::{LayerNode, OrderedGraph};
use crate::nn::{ParamRole, RoleClass};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Placeholder replaced by the layer name in printf-style templates.
const TEMPLATE_PLACEHOLDER: &str = "%s";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NamingError {
    #[error("Path template '{0}' has no '%s' placeholder for the layer name.")]
    MissingPlaceholder(String),

    #[error("Explicit paths refer to layer '{0}', which is not in the model.")]
    UnknownLayer(String),

    #[error("Explicit paths list layer '{0}' more than once.")]
    DuplicateLayer(String),

    #[error("Explicit paths give role '{role}' for {kind} layer '{layer}', which has roles {available:?}.")]
    UnknownRole {
        layer: String,
        kind: String,
        role: ParamRole,
        available: Vec<ParamRole>,
    },
}

type Result<T> = std::result::Result<T, NamingError>;

/// Parameters of the default naming convention.
///
/// The path of a parameter is `template` with `{layer}` replaced by the layer
/// name and `{key}` by the role key (`kernel:0`, `bias:0`, ...). The
/// [`keras`](NamingConvention::keras) convention nests every entry as
/// `/<layer>/<layer>/<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConvention {
    pub template: String,
    /// Role keys that differ from `<role>:0`.
    #[serde(default)]
    pub keys: BTreeMap<ParamRole, String>,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self::keras()
    }
}

impl NamingConvention {
    pub fn keras() -> Self {
        Self {
            template: "/{layer}/{layer}/{key}".to_string(),
            keys: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }

    /// Overrides the key of one role.
    pub fn with_key(mut self, role: ParamRole, key: &str) -> Self {
        self.keys.insert(role, key.to_string());
        self
    }

    pub fn key_for(&self, role: ParamRole) -> String {
        self.keys
            .get(&role)
            .cloned()
            .unwrap_or_else(|| format!("{}:0", role.as_str()))
    }

    pub fn path(&self, layer: &str, role: ParamRole) -> String {
        self.template
            .replace("{layer}", layer)
            .replace("{key}", &self.key_for(role))
    }
}

/// Literal role-to-path table for one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerPaths {
    pub layer_name: String,
    pub paths: BTreeMap<ParamRole, String>,
}

impl LayerPaths {
    pub fn new(layer_name: &str) -> Self {
        Self {
            layer_name: layer_name.to_string(),
            paths: BTreeMap::new(),
        }
    }

    pub fn with(mut self, role: ParamRole, path: &str) -> Self {
        self.paths.insert(role, path.to_string());
        self
    }

    /// Kernel and bias of a Dense or Conv2D layer.
    pub fn conv_or_dense(layer_name: &str, kernel: &str, bias: &str) -> Self {
        Self::new(layer_name)
            .with(ParamRole::Kernel, kernel)
            .with(ParamRole::Bias, bias)
    }

    pub fn depthwise(layer_name: &str, kernel: &str, bias: &str) -> Self {
        Self::new(layer_name)
            .with(ParamRole::DepthwiseKernel, kernel)
            .with(ParamRole::DepthwiseBias, bias)
    }

    pub fn separable(layer_name: &str, depthwise: &str, pointwise: &str, bias: &str) -> Self {
        Self::new(layer_name)
            .with(ParamRole::DepthwiseKernel, depthwise)
            .with(ParamRole::PointwiseKernel, pointwise)
            .with(ParamRole::Bias, bias)
    }

    pub fn batch_norm(layer_name: &str, gamma: &str, beta: &str, moving_mean: &str, moving_variance: &str) -> Self {
        Self::new(layer_name)
            .with(ParamRole::Gamma, gamma)
            .with(ParamRole::Beta, beta)
            .with(ParamRole::MovingMean, moving_mean)
            .with(ParamRole::MovingVariance, moving_variance)
    }
}

/// How store paths are derived for in-scope slots. Chosen per binding call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamingStrategy {
    /// Deterministic convention over layer name and role.
    Default(NamingConvention),
    /// printf-style templates, one for kernel-like and one for bias-like
    /// roles; every `%s` is replaced by the layer name.
    Template { kernel: String, bias: String },
    /// Literal per-layer paths, no substitution.
    Explicit(Vec<LayerPaths>),
}

impl Default for NamingStrategy {
    fn default() -> Self {
        NamingStrategy::Default(NamingConvention::keras())
    }
}

impl NamingStrategy {
    pub fn template(kernel: &str, bias: &str) -> Self {
        NamingStrategy::Template {
            kernel: kernel.to_string(),
            bias: bias.to_string(),
        }
    }

    pub fn explicit(layers: Vec<LayerPaths>) -> Self {
        NamingStrategy::Explicit(layers)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            NamingStrategy::Default(_) => "default",
            NamingStrategy::Template { .. } => "template",
            NamingStrategy::Explicit(_) => "explicit",
        }
    }

    /// Checks the strategy against a graph before any lookup happens.
    pub fn validate(&self, graph: &OrderedGraph) -> Result<()> {
        match self {
            NamingStrategy::Default(_) => Ok(()),
            NamingStrategy::Template { kernel, bias } => {
                for template in [kernel, bias] {
                    if !template.contains(TEMPLATE_PLACEHOLDER) {
                        return Err(NamingError::MissingPlaceholder(template.clone()));
                    }
                }
                Ok(())
            }
            NamingStrategy::Explicit(layers) => {
                let mut seen = HashSet::new();
                for entry in layers {
                    if !seen.insert(entry.layer_name.as_str()) {
                        return Err(NamingError::DuplicateLayer(entry.layer_name.clone()));
                    }
                    let node = graph
                        .find(&entry.layer_name)
                        .ok_or_else(|| NamingError::UnknownLayer(entry.layer_name.clone()))?;
                    let available = node.kind.param_roles();
                    if let Some(&role) = entry.paths.keys().find(|r| !available.contains(r)) {
                        return Err(NamingError::UnknownRole {
                            layer: node.name.clone(),
                            kind: node.kind.type_name().to_string(),
                            role,
                            available,
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Store path for one parameter of `node`, or `None` if the strategy
    /// does not address it.
    pub fn path_for(&self, node: &LayerNode, role: ParamRole) -> Option<String> {
        match self {
            NamingStrategy::Default(convention) => Some(convention.path(&node.name, role)),
            NamingStrategy::Template { kernel, bias } => {
                let template = match role.class() {
                    RoleClass::KernelLike => kernel,
                    RoleClass::BiasLike => bias,
                    RoleClass::Other => return None,
                };
                Some(template.replace(TEMPLATE_PLACEHOLDER, &node.name))
            }
            NamingStrategy::Explicit(layers) => layers
                .iter()
                .find(|entry| entry.layer_name == node.name)
                .and_then(|entry| entry.paths.get(&role).cloned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphAssembler, GraphBuilder};
    use crate::nn::{BatchNormConfig, Conv2dConfig, DenseConfig, LayerKind};

    fn graph() -> OrderedGraph {
        let mut b = GraphBuilder::new();
        let x = b.input("input", &[8, 8, 3]);
        let c = b.layer("conv", LayerKind::Conv2d(Conv2dConfig::new(4, (3, 3))), &[x]);
        let n = b.layer("bn", LayerKind::BatchNorm(BatchNormConfig::new()), &[c]);
        let f = b.layer("flat", LayerKind::Flatten, &[n]);
        b.layer("dense", LayerKind::Dense(DenseConfig::new(2)), &[f]);
        GraphAssembler::assemble(b.into_nodes()).unwrap()
    }

    #[test]
    fn test_default_convention_paths() {
        let graph = graph();
        let strategy = NamingStrategy::default();
        let conv = graph.find("conv").unwrap();
        assert_eq!(strategy.path_for(conv, ParamRole::Kernel).unwrap(), "/conv/conv/kernel:0");
        let bn = graph.find("bn").unwrap();
        assert_eq!(
            strategy.path_for(bn, ParamRole::MovingVariance).unwrap(),
            "/bn/bn/moving_variance:0"
        );
    }

    #[test]
    fn test_custom_convention() {
        let convention = NamingConvention::keras()
            .with_template("model_weights/{layer}/{key}")
            .with_key(ParamRole::Kernel, "W");
        assert_eq!(convention.path("fc", ParamRole::Kernel), "model_weights/fc/W");
        assert_eq!(convention.path("fc", ParamRole::Bias), "model_weights/fc/bias:0");
    }

    #[test]
    fn test_template_substitutes_every_placeholder() {
        let graph = graph();
        let strategy = NamingStrategy::template("/%s/%s_W:0", "/%s/%s_b:0");
        strategy.validate(&graph).unwrap();
        let dense = graph.find("dense").unwrap();
        assert_eq!(strategy.path_for(dense, ParamRole::Kernel).unwrap(), "/dense/dense_W:0");
        assert_eq!(strategy.path_for(dense, ParamRole::Bias).unwrap(), "/dense/dense_b:0");
        assert_eq!(strategy.path_for(graph.find("bn").unwrap(), ParamRole::Gamma), None);
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let strategy = NamingStrategy::template("/fixed/kernel:0", "/%s/bias:0");
        assert_eq!(
            strategy.validate(&graph()),
            Err(NamingError::MissingPlaceholder("/fixed/kernel:0".to_string()))
        );
    }

    #[test]
    fn test_explicit_paths_are_literal() {
        let graph = graph();
        let strategy = NamingStrategy::explicit(vec![LayerPaths::conv_or_dense(
            "conv",
            "weights/c1/w",
            "weights/c1/b",
        )]);
        strategy.validate(&graph).unwrap();
        assert_eq!(
            strategy.path_for(graph.find("conv").unwrap(), ParamRole::Bias).unwrap(),
            "weights/c1/b"
        );
        assert_eq!(strategy.path_for(graph.find("dense").unwrap(), ParamRole::Kernel), None);
    }

    #[test]
    fn test_explicit_paths_validated_against_role_table() {
        let graph = graph();
        let wrong_role = NamingStrategy::explicit(vec![LayerPaths::conv_or_dense("bn", "a", "b")]);
        assert!(matches!(
            wrong_role.validate(&graph),
            Err(NamingError::UnknownRole { role: ParamRole::Kernel, .. })
        ));

        let unknown = NamingStrategy::explicit(vec![LayerPaths::new("ghost")]);
        assert_eq!(unknown.validate(&graph), Err(NamingError::UnknownLayer("ghost".into())));

        let twice = NamingStrategy::explicit(vec![LayerPaths::new("conv"), LayerPaths::new("conv")]);
        assert_eq!(twice.validate(&graph), Err(NamingError::DuplicateLayer("conv".into())));
    }
}
