//! # Layer Graph
//!
//! Data model for the layer graph: nodes live in an arena and refer to each
//! other by [`NodeId`], so the mutual inbound/outbound references never form
//! ownership cycles.
//!
//! ```text
//! GraphBuilder (unconnected nodes) -> GraphAssembler -> OrderedGraph
//! ```
//!
//! The [`assembler`] submodule validates the node set, derives outbound edges
//! and produces the topological order every later pass relies on.

pub mod assembler;

pub use assembler::{GraphAssembler, GraphBuilder, OrderedGraph};

use crate::nn::{LayerKind, ParamRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Index of a node inside its graph arena.
pub type NodeId = usize;

/// Concrete tensor shape (no dynamic dimensions).
pub type Shape = Vec<usize>;

/// Output shape of a layer: a dynamic batch dimension followed by concrete dims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    /// Non-batch dimensions.
    pub dims: Shape,
}

impl TensorShape {
    pub fn new(dims: Shape) -> Self {
        Self { dims }
    }

    /// Rank including the batch dimension.
    pub fn rank(&self) -> usize {
        self.dims.len() + 1
    }

    /// Last (channel) dimension, if any.
    pub fn last(&self) -> Option<usize> {
        self.dims.last().copied()
    }

    /// Number of elements of one sample.
    pub fn sample_size(&self) -> usize {
        self.dims.iter().product()
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[None")?;
        for d in &self.dims {
            write!(f, ", {}", d)?;
        }
        write!(f, "]")
    }
}

/// Declared learnable parameter of a node, known once the inbound shape is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub role: ParamRole,
    pub shape: Shape,
}

impl ParamDecl {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// One layer of the model graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    /// Arena index, assigned by the builder and rewritten by the assembler.
    pub id: NodeId,
    /// User-supplied name; empty means "generate one during assembly".
    pub name: String,
    /// Layer semantics and kind-specific configuration.
    pub kind: LayerKind,
    pub inbound: Vec<NodeId>,
    /// Derived from the `inbound` lists of the whole graph; never user-supplied.
    pub outbound: Vec<NodeId>,
    pub output_shape: Option<TensorShape>,
    /// Parameter declarations, filled by shape resolution.
    pub params: Vec<ParamDecl>,
    pub trainable: bool,
}

impl LayerNode {
    pub fn new(name: &str, kind: LayerKind) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            kind,
            inbound: Vec::new(),
            outbound: Vec::new(),
            output_shape: None,
            params: Vec::new(),
            trainable: true,
        }
    }

    /// Sets the inbound edges.
    pub fn with_inbound(mut self, inbound: &[NodeId]) -> Self {
        self.inbound = inbound.to_vec();
        self
    }

    /// Freezes or unfreezes the layer.
    pub fn with_trainable(mut self, trainable: bool) -> Self {
        self.trainable = trainable;
        self
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, LayerKind::Input(_))
    }

    /// Name used in diagnostics, also for nodes that are still unnamed.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("<unnamed {} #{}>", self.kind.type_name(), self.id)
        } else {
            self.name.clone()
        }
    }

    /// Total number of scalar parameters declared by this node.
    pub fn param_count(&self) -> usize {
        self.params.iter().map(ParamDecl::element_count).sum()
    }
}

/// Structural errors raised while assembling a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Model must contain exactly one Input layer, found {count}: {layers:?}. \
             Remove the extra Input layers or declare one.")]
    MultipleOrMissingInput { count: usize, layers: Vec<String> },

    #[error("The following layers are not reachable from the input: {}. \
             Check their inbound references.", format_layers(.0))]
    UnreachableLayer(Vec<(String, String)>),

    #[error("The following layers form a cycle: {}. \
             Layer connections must form a directed acyclic graph.", format_layers(.0))]
    CyclicGraph(Vec<(String, String)>),

    #[error("Layer name '{0}' is used more than once. Layer names must be unique within a model.")]
    RepeatableLayerName(String),

    #[error("Layer '{layer}' refers to inbound node {inbound}, which does not exist in the node set of size {size}.")]
    UnknownInbound { layer: String, inbound: NodeId, size: usize },

    #[error("Input layer '{0}' must not have inbound layers.")]
    InputWithInbound(String),

    #[error("Terminal node {0} does not exist in the node set.")]
    UnknownTerminal(NodeId),
}

fn format_layers(layers: &[(String, String)]) -> String {
    layers
        .iter()
        .map(|(name, kind)| format!("{} ({})", name, kind))
        .collect::<Vec<_>>()
        .join(", ")
}
